//! Key naming and store routing
//!
//! The camera keeps one set of effect keys per filter. Index 0 lives in its
//! own preferences store without a suffix; every other index is suffixed and
//! shares the `mmkv` store. Existing on-device data depends on this layout.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{keys, stores};

/// Effect parameters the camera stores per filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    Filter,
    FilterIntensity,
    Saturation,
    /// Written for the preset's "tone" value
    Contrast,
    ColdWarm,
    CyanMagenta,
    Sharpness,
    Vignette,
    SoftLight,
}

impl ParamId {
    pub const ALL: [ParamId; 9] = [
        ParamId::Filter,
        ParamId::FilterIntensity,
        ParamId::Saturation,
        ParamId::Contrast,
        ParamId::ColdWarm,
        ParamId::CyanMagenta,
        ParamId::Sharpness,
        ParamId::Vignette,
        ParamId::SoftLight,
    ];

    /// Parameter name as it appears inside the key
    pub fn name(self) -> &'static str {
        match self {
            ParamId::Filter => "filter",
            ParamId::FilterIntensity => "filter_intensity",
            ParamId::Saturation => "saturation",
            ParamId::Contrast => "contrast",
            ParamId::ColdWarm => "cold_warm",
            ParamId::CyanMagenta => "cyan_magenta",
            ParamId::Sharpness => "sharpness",
            ParamId::Vignette => "vignette",
            ParamId::SoftLight => "soft_light",
        }
    }

    /// Build the store key for this parameter and filter index
    pub fn key(self, index: u32) -> String {
        if index == 0 {
            format!("{}{}", keys::EFFECT_PREFIX, self.name())
        } else {
            format!("{}{}_{}", keys::EFFECT_PREFIX, self.name(), index)
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two physical store files a write can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// `preferences_0`, filter index 0 only
    Preferences,
    /// `mmkv`, shared by filter indices >= 1
    Shared,
}

impl StoreKind {
    pub fn for_index(index: u32) -> Self {
        if index == 0 {
            StoreKind::Preferences
        } else {
            StoreKind::Shared
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            StoreKind::Preferences => stores::PREFERENCES,
            StoreKind::Shared => stores::SHARED,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}
