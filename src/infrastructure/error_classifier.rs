//! Maps remote failures onto typed [`CatalogError`] kinds
//!
//! The store reports "someone else is already creating this SKU" and media
//! problems only as free text, so those two kinds are recognised by phrase.
//! Everything else is decided by status code or transport failure.

use regex::{Regex, RegexBuilder};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::domain::CatalogError;

const CONFLICT_PHRASES: &[&str] = &[
    "already",
    "işleniyor",
    "i\\u015fleniyor",
    "processing",
    "claimed",
    "in-progress",
    "zaten",
];

const MEDIA_PHRASES: &[&str] = &["image", "görsel", "media", "forbidden", "upload"];

/// Extra phrases appended to the built-in lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub extra_conflict_phrases: Vec<String>,
    pub extra_media_phrases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    conflict: Regex,
    media: Regex,
}

impl ErrorClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            conflict: phrase_pattern(CONFLICT_PHRASES, &config.extra_conflict_phrases)?,
            media: phrase_pattern(MEDIA_PHRASES, &config.extra_media_phrases)?,
        })
    }

    pub fn is_conflict(&self, message: &str) -> bool {
        self.conflict.is_match(message)
    }

    pub fn is_media(&self, message: &str) -> bool {
        self.media.is_match(message)
    }

    /// Classifies a non-2xx response from its status and body
    pub fn classify_response(&self, status: StatusCode, body: &str) -> CatalogError {
        let message = describe_body(status, body);

        match (self.is_conflict(&message), self.is_media(&message)) {
            (true, true) => return CatalogError::media_conflict(message),
            (true, false) => return CatalogError::conflict(message),
            (false, true) => return CatalogError::media(message),
            (false, false) => {}
        }
        match status {
            StatusCode::NOT_FOUND => CatalogError::not_found(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => CatalogError::transient(message),
            s if s.is_server_error() => CatalogError::transient(message),
            _ => CatalogError::fatal(message),
        }
    }

    /// Classifies a failure that produced no response at all
    pub fn classify_transport(&self, error: &reqwest::Error) -> CatalogError {
        if error.is_timeout() || error.is_connect() {
            CatalogError::transient(error.to_string())
        } else {
            CatalogError::fatal(error.to_string())
        }
    }
}

fn phrase_pattern(base: &[&str], extra: &[String]) -> Result<Regex, regex::Error> {
    let alternation = base
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation).case_insensitive(true).build()
}

/// `"<status> <code>: <message>"` from a WooCommerce error body, raw text otherwise
fn describe_body(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let code = value.get("code").and_then(|v| v.as_str()).unwrap_or_default();
        let message = value.get("message").and_then(|v| v.as_str()).unwrap_or_default();
        if !code.is_empty() || !message.is_empty() {
            return format!("{} {}: {}", status.as_u16(), code, message);
        }
    }
    let trimmed: String = body.trim().chars().take(500).collect();
    format!("{} {}", status.as_u16(), trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::new(&ClassifierConfig::default()).unwrap()
    }

    #[rstest]
    #[case("SKU is already being processed")]
    #[case("Ürün işleniyor, lütfen bekleyin")]
    #[case(r"\u00dcr\u00fcn i\u015fleniyor")]
    #[case("Request CLAIMED by another worker")]
    #[case("create in-progress")]
    #[case("bu ürün zaten var")]
    fn test_conflict_phrases(#[case] message: &str) {
        assert!(classifier().is_conflict(message));
    }

    #[rstest]
    #[case(StatusCode::NOT_FOUND, r#"{"code":"woocommerce_rest_product_invalid_id","message":"Invalid ID."}"#, "not_found")]
    #[case(StatusCode::TOO_MANY_REQUESTS, "slow down", "transient")]
    #[case(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", "transient")]
    #[case(StatusCode::BAD_REQUEST, r#"{"code":"rest_invalid_param","message":"Invalid parameter(s): type"}"#, "fatal")]
    #[case(StatusCode::BAD_REQUEST, r#"{"code":"woocommerce_product_image_upload_error","message":"Error getting remote image"}"#, "media")]
    #[case(StatusCode::BAD_REQUEST, r#"{"code":"product_invalid_sku","message":"SKU is already processing."}"#, "conflict")]
    fn test_classify_response(#[case] status: StatusCode, #[case] body: &str, #[case] expected: &str) {
        let error = classifier().classify_response(status, body);
        let kind = match error {
            CatalogError::Conflict { .. } => "conflict",
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::Transient { .. } => "transient",
            CatalogError::Media { .. } => "media",
            CatalogError::Fatal { .. } => "fatal",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_extra_phrases_are_literal() {
        let classifier = ErrorClassifier::new(&ClassifierConfig {
            extra_conflict_phrases: vec!["locked (retry)".into(), "  ".into()],
            extra_media_phrases: Vec::new(),
        })
        .unwrap();
        assert!(classifier.is_conflict("row LOCKED (retry) later"));
        assert!(!classifier.is_conflict("locked retry"));
    }

    #[test]
    fn test_media_and_conflict_text_keeps_both_kinds() {
        let error = classifier().classify_response(
            StatusCode::BAD_REQUEST,
            r#"{"code":"woocommerce_product_image_upload_error","message":"Error getting remote image: upload already in progress"}"#,
        );
        assert!(error.is_media());
        assert!(error.is_conflict());
    }
}
