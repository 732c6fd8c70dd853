//! Profit margin transform for decimal-as-string prices
//!
//! Prices arrive in whatever locale the feed uses (`1.234,56`, `1,234.56`,
//! `₺ 99,90`). The last `.` or `,` is taken as the decimal point and every
//! other non-digit is dropped before the margin is applied with
//! [`rust_decimal`], so no binary float ever touches a price.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{ApplyMarginOn, SyncOptions};

/// Parses a locale-ambiguous decimal string
///
/// Returns `None` when no digit survives normalisation.
pub fn parse_locale_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let decimal_point = trimmed.rfind(['.', ',']);

    let mut normalized = String::with_capacity(trimmed.len());
    for (idx, ch) in trimmed.char_indices() {
        if ch.is_ascii_digit() {
            normalized.push(ch);
        } else if ch == '-' && normalized.is_empty() {
            normalized.push('-');
        } else if Some(idx) == decimal_point {
            normalized.push('.');
        }
    }

    if !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if normalized.ends_with('.') {
        normalized.pop();
    }
    if let Some(rest) = normalized.strip_prefix("-.") {
        normalized = format!("-0.{rest}");
    } else if normalized.starts_with('.') {
        normalized.insert(0, '0');
    }

    Decimal::from_str(&normalized).ok()
}

/// Applies `percent` to a price string
///
/// Absent stays absent. A value that does not parse is returned unchanged.
pub fn apply_margin(value: Option<&str>, percent: f64, round_to_integer: bool) -> Option<String> {
    let raw = value?;
    let Some(parsed) = parse_locale_decimal(raw) else {
        return Some(raw.to_string());
    };

    let percent = if percent.is_finite() {
        Decimal::from_str(&percent.to_string()).unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    let factor = Decimal::ONE + percent / Decimal::ONE_HUNDRED;
    let Some(scaled) = parsed.checked_mul(factor) else {
        return Some(raw.to_string());
    };

    if round_to_integer {
        let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Some(format!("{rounded:.0}"))
    } else {
        let rounded = scaled.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Some(format!("{rounded:.2}"))
    }
}

/// Margin settings of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginPolicy {
    pub percent: f64,
    pub apply_on: ApplyMarginOn,
    pub round_to_integer: bool,
}

impl MarginPolicy {
    pub fn from_options(options: &SyncOptions) -> Self {
        Self {
            percent: options.profit_margin_percent,
            apply_on: options.apply_margin_on,
            round_to_integer: options.round_to_integer,
        }
    }

    /// Returns the `(regular, sale)` pair with the margin applied where configured
    pub fn apply(&self, regular: Option<&str>, sale: Option<&str>) -> (Option<String>, Option<String>) {
        let regular = if self.apply_on.includes_regular() {
            apply_margin(regular, self.percent, self.round_to_integer)
        } else {
            regular.map(str::to_string)
        };
        let sale = if self.apply_on.includes_sale() {
            apply_margin(sale, self.percent, self.round_to_integer)
        } else {
            sale.map(str::to_string)
        };
        (regular, sale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("100", 10.0, true, "110")]
    #[case("99,90", 0.0, false, "99.90")]
    #[case("1.234,56", 0.0, false, "1234.56")]
    #[case("1,234.56", 0.0, false, "1234.56")]
    #[case("₺ 250", 20.0, true, "300")]
    #[case("10.5", 0.0, true, "11")]
    #[case("100", 12.5, false, "112.50")]
    #[case("19.99", -10.0, false, "17.99")]
    fn test_apply_margin_cases(
        #[case] input: &str,
        #[case] percent: f64,
        #[case] round: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(apply_margin(Some(input), percent, round).as_deref(), Some(expected));
    }

    #[test]
    fn test_absent_value_stays_absent() {
        assert_eq!(apply_margin(None, 10.0, true), None);
    }

    #[test]
    fn test_non_numeric_passes_through() {
        assert_eq!(apply_margin(Some("abc"), 10.0, true).as_deref(), Some("abc"));
        assert_eq!(apply_margin(Some(""), 10.0, false).as_deref(), Some(""));
    }

    #[test]
    fn test_parse_handles_dangling_separators() {
        assert_eq!(parse_locale_decimal("5."), Some(Decimal::from(5)));
        assert_eq!(parse_locale_decimal(",5"), Decimal::from_str("0.5").ok());
        assert_eq!(parse_locale_decimal("-"), None);
    }

    #[test]
    fn test_policy_targets_selected_fields() {
        let policy = MarginPolicy {
            percent: 10.0,
            apply_on: ApplyMarginOn::Sale,
            round_to_integer: true,
        };
        let (regular, sale) = policy.apply(Some("100"), Some("50"));
        assert_eq!(regular.as_deref(), Some("100"));
        assert_eq!(sale.as_deref(), Some("55"));

        let both = MarginPolicy {
            apply_on: ApplyMarginOn::Both,
            ..policy
        };
        assert_eq!(both.apply(Some("100"), None), (Some("110".into()), None));
    }

    proptest! {
        #[test]
        fn prop_rounded_margin_matches_integer_math(value in 0u64..1_000_000, percent in 0u64..200) {
            let numerator = value * (100 + percent);
            let mut expected = numerator / 100;
            if numerator % 100 >= 50 {
                expected += 1;
            }
            let out = apply_margin(Some(&value.to_string()), percent as f64, true);
            prop_assert_eq!(out, Some(expected.to_string()));
        }

        #[test]
        fn prop_unparseable_input_is_returned_verbatim(raw in "[a-zA-Z ]{1,12}") {
            let out = apply_margin(Some(&raw), 15.0, true);
            prop_assert_eq!(out, Some(raw.clone()));
        }
    }
}
