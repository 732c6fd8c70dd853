//! Sync run options
//!
//! [`RawSyncOptions`] is the boundary shape accepted from config files and the
//! command line. It still understands the legacy `onlyCreateNew` flag.
//! [`RawSyncOptions::migrate`] turns it into the canonical [`SyncOptions`]
//! which is the only thing the engine reads.

use serde::{Deserialize, Serialize};

/// Current version of the option bag layout
pub const OPTIONS_VERSION: u32 = 2;

/// Which price fields the profit margin applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMarginOn {
    #[default]
    Regular,
    Sale,
    Both,
}

impl ApplyMarginOn {
    pub fn includes_regular(self) -> bool {
        matches!(self, Self::Regular | Self::Both)
    }

    pub fn includes_sale(self) -> bool {
        matches!(self, Self::Sale | Self::Both)
    }
}

impl std::str::FromStr for ApplyMarginOn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "sale" => Ok(Self::Sale),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown margin target: {other}")),
        }
    }
}

/// How product images are sent to the remote catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    Upload,
    #[default]
    PreferExistingByFilename,
    None,
}

impl std::str::FromStr for MediaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "prefer_existing_by_filename" | "prefer-existing" => Ok(Self::PreferExistingByFilename),
            "none" => Ok(Self::None),
            other => Err(format!("unknown media mode: {other}")),
        }
    }
}

/// Order in which the input file is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessDirection {
    #[default]
    Asc,
    Desc,
}

impl ProcessDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::str::FromStr for ProcessDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Canonical, immutable per-run options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub delete_missing: bool,
    pub do_create_new: bool,
    pub do_update_existing: bool,
    pub update_stock_only: bool,
    pub update_stock_and_price_only: bool,
    pub update_images_on_update: bool,
    pub profit_margin_percent: f64,
    pub apply_margin_on: ApplyMarginOn,
    pub round_to_integer: bool,
    pub media_mode: MediaMode,
    pub limit: Option<usize>,
    pub per_item_delay_ms: u64,
    pub process_direction: ProcessDirection,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            delete_missing: false,
            do_create_new: true,
            do_update_existing: true,
            update_stock_only: false,
            update_stock_and_price_only: false,
            update_images_on_update: true,
            profit_margin_percent: 0.0,
            apply_margin_on: ApplyMarginOn::Regular,
            round_to_integer: true,
            media_mode: MediaMode::PreferExistingByFilename,
            limit: None,
            per_item_delay_ms: 0,
            process_direction: ProcessDirection::Asc,
        }
    }
}

impl SyncOptions {
    /// Stock-only modes never create products
    pub fn is_narrowed_update(&self) -> bool {
        self.update_stock_only || self.update_stock_and_price_only
    }
}

/// Option bag as it arrives from persisted settings or the CLI
///
/// Every field is optional so layers can be merged with [`RawSyncOptions::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSyncOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Legacy: create new products only, never touch existing ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_create_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_missing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_create_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_update_existing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_stock_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_stock_and_price_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_images_on_update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_margin_on: Option<ApplyMarginOn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_to_integer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_mode: Option<MediaMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_item_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_direction: Option<ProcessDirection>,
}

impl RawSyncOptions {
    /// Fields set on `other` win over the ones on `self`
    pub fn overlay(self, other: Self) -> Self {
        Self {
            version: other.version.or(self.version),
            only_create_new: other.only_create_new.or(self.only_create_new),
            delete_missing: other.delete_missing.or(self.delete_missing),
            do_create_new: other.do_create_new.or(self.do_create_new),
            do_update_existing: other.do_update_existing.or(self.do_update_existing),
            update_stock_only: other.update_stock_only.or(self.update_stock_only),
            update_stock_and_price_only: other
                .update_stock_and_price_only
                .or(self.update_stock_and_price_only),
            update_images_on_update: other.update_images_on_update.or(self.update_images_on_update),
            profit_margin_percent: other.profit_margin_percent.or(self.profit_margin_percent),
            apply_margin_on: other.apply_margin_on.or(self.apply_margin_on),
            round_to_integer: other.round_to_integer.or(self.round_to_integer),
            media_mode: other.media_mode.or(self.media_mode),
            limit: other.limit.or(self.limit),
            per_item_delay_ms: other.per_item_delay_ms.or(self.per_item_delay_ms),
            process_direction: other.process_direction.or(self.process_direction),
        }
    }

    /// Maps legacy fields to current ones and fills defaults
    ///
    /// `onlyCreateNew=true` means "create, never update, never delete". The
    /// explicit `doCreateNew` / `doUpdateExisting` / `deleteMissing` flags win
    /// when both the legacy and the current field are present.
    pub fn migrate(&self) -> SyncOptions {
        let defaults = SyncOptions::default();
        let legacy_create_only = self.only_create_new.unwrap_or(false);

        let do_update_existing = self
            .do_update_existing
            .unwrap_or(if legacy_create_only { false } else { defaults.do_update_existing });
        let delete_missing = self
            .delete_missing
            .unwrap_or(!legacy_create_only && defaults.delete_missing);

        let limit = self.limit.filter(|l| *l > 0);

        SyncOptions {
            delete_missing,
            do_create_new: self.do_create_new.unwrap_or(defaults.do_create_new),
            do_update_existing,
            update_stock_only: self.update_stock_only.unwrap_or(defaults.update_stock_only),
            update_stock_and_price_only: self
                .update_stock_and_price_only
                .unwrap_or(defaults.update_stock_and_price_only),
            update_images_on_update: self
                .update_images_on_update
                .unwrap_or(defaults.update_images_on_update),
            profit_margin_percent: self
                .profit_margin_percent
                .filter(|p| p.is_finite())
                .unwrap_or(defaults.profit_margin_percent),
            apply_margin_on: self.apply_margin_on.unwrap_or(defaults.apply_margin_on),
            round_to_integer: self.round_to_integer.unwrap_or(defaults.round_to_integer),
            media_mode: self.media_mode.unwrap_or(defaults.media_mode),
            limit,
            per_item_delay_ms: self.per_item_delay_ms.unwrap_or(defaults.per_item_delay_ms),
            process_direction: self.process_direction.unwrap_or(defaults.process_direction),
        }
    }
}

impl From<&SyncOptions> for RawSyncOptions {
    fn from(options: &SyncOptions) -> Self {
        Self {
            version: Some(OPTIONS_VERSION),
            only_create_new: None,
            delete_missing: Some(options.delete_missing),
            do_create_new: Some(options.do_create_new),
            do_update_existing: Some(options.do_update_existing),
            update_stock_only: Some(options.update_stock_only),
            update_stock_and_price_only: Some(options.update_stock_and_price_only),
            update_images_on_update: Some(options.update_images_on_update),
            profit_margin_percent: Some(options.profit_margin_percent),
            apply_margin_on: Some(options.apply_margin_on),
            round_to_integer: Some(options.round_to_integer),
            media_mode: Some(options.media_mode),
            limit: options.limit,
            per_item_delay_ms: Some(options.per_item_delay_ms),
            process_direction: Some(options.process_direction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let options = RawSyncOptions::default().migrate();
        assert_eq!(options, SyncOptions::default());
        assert!(options.do_create_new);
        assert!(options.do_update_existing);
        assert!(options.round_to_integer);
        assert_eq!(options.media_mode, MediaMode::PreferExistingByFilename);
    }

    #[test]
    fn test_legacy_only_create_new() {
        let raw = RawSyncOptions {
            only_create_new: Some(true),
            ..Default::default()
        };
        let options = raw.migrate();
        assert!(options.do_create_new);
        assert!(!options.do_update_existing);
        assert!(!options.delete_missing);
    }

    #[test]
    fn test_explicit_delete_missing_survives_legacy_flag() {
        let raw = RawSyncOptions {
            only_create_new: Some(true),
            delete_missing: Some(true),
            ..Default::default()
        };
        let options = raw.migrate();
        assert!(!options.do_update_existing);
        assert!(options.delete_missing);
    }

    #[test]
    fn test_explicit_fields_win_over_legacy() {
        let raw = RawSyncOptions {
            only_create_new: Some(true),
            do_update_existing: Some(true),
            delete_missing: Some(true),
            ..Default::default()
        };
        let options = raw.migrate();
        assert!(options.do_update_existing);
        assert!(options.delete_missing);
    }

    #[test]
    fn test_overlay_prefers_later_layer() {
        let persisted = RawSyncOptions {
            profit_margin_percent: Some(5.0),
            limit: Some(10),
            ..Default::default()
        };
        let cli = RawSyncOptions {
            profit_margin_percent: Some(12.5),
            ..Default::default()
        };
        let merged = persisted.overlay(cli).migrate();
        assert_eq!(merged.profit_margin_percent, 12.5);
        assert_eq!(merged.limit, Some(10));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let raw = RawSyncOptions {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(raw.migrate().limit, None);
    }

    #[test]
    fn test_camel_case_wire_names() {
        let raw: RawSyncOptions = serde_json::from_str(
            r#"{"onlyCreateNew":true,"applyMarginOn":"both","mediaMode":"none","processDirection":"desc"}"#,
        )
        .unwrap();
        assert_eq!(raw.only_create_new, Some(true));
        assert_eq!(raw.apply_margin_on, Some(ApplyMarginOn::Both));
        assert_eq!(raw.media_mode, Some(MediaMode::None));
        assert_eq!(raw.process_direction, Some(ProcessDirection::Desc));
    }
}
