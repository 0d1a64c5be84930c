use serde::Deserialize;

use crate::localization::SaveScope;

/// Settings shared by every overlay variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OverlayOptions {
    /// Name attached to log records emitted by the overlay.
    pub label: String,
    /// Drop a working copy once every tracked property is back at its baseline value.
    pub collapse_clean_working_copies: bool,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            label: "overlay".to_string(),
            collapse_clean_working_copies: true,
        }
    }
}

impl OverlayOptions {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct LocalizationOptions {
    pub overlay: OverlayOptions,
    /// Scope used when the overlay is committed through the generic `Overlay::save`.
    pub default_save_scope: SaveScope,
}
