//! Text decoders for preset values
//!
//! None of these fail: each has a documented fallback, except the plain
//! integer path which yields `None` so the caller can skip the key.

use regex::Regex;
use std::sync::LazyLock;

use crate::constants::vendor;

/// `<name><optional space><digits><optional %>`; the name must end in a non-digit
static FILTER_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?\D)\s*(\d+)\s*%?$").expect("filter suffix pattern"));

const VIGNETTE_ON: [&str; 3] = ["开", "開", "On"];
const VIGNETTE_OFF: [&str; 3] = ["关", "關", "Off"];

const SOFT_LIGHT: [([&str; 3], i32); 4] = [
    (["无", "無", "None"], 0),
    (["朦胧", "朦朧", "Hazy"], 1),
    (["轻柔", "輕柔", "Gentle"], 2),
    (["梦幻", "夢幻", "Dreamy"], 3),
];

/// Filter text split into a name and an optional intensity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParseResult {
    pub name: String,
    /// `None` means "leave the device's intensity alone"
    pub intensity: Option<u32>,
}

/// Parse `"复古 100%"`, `"复古100%"`, `"复古 100"` or a bare `"复古"`
pub fn parse_filter(text: &str) -> FilterParseResult {
    let trimmed = text.trim();

    if let Some(caps) = FILTER_SUFFIX.captures(trimmed) {
        let name = caps[1].trim();
        let intensity = caps[2].parse::<u32>().ok().filter(|v| *v <= vendor::MAX_INTENSITY);
        if let (false, Some(intensity)) = (name.is_empty(), intensity) {
            return FilterParseResult {
                name: name.to_string(),
                intensity: Some(intensity),
            };
        }
    }

    FilterParseResult {
        name: trimmed.to_string(),
        intensity: None,
    }
}

/// Signed integer with an optional leading `+`
pub fn parse_int(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    // "+-5" is not a number
    if digits.len() != trimmed.len() && digits.starts_with('-') {
        return None;
    }
    digits.parse().ok()
}

pub fn decode_vignette(text: &str) -> i32 {
    let trimmed = text.trim();
    if VIGNETTE_ON.contains(&trimmed) {
        return vendor::VIGNETTE_ON;
    }
    if VIGNETTE_OFF.contains(&trimmed) {
        return vendor::VIGNETTE_OFF;
    }
    parse_int(trimmed).unwrap_or(vendor::VIGNETTE_OFF)
}

pub fn decode_soft_light(text: &str) -> i32 {
    let trimmed = text.trim();
    SOFT_LIGHT
        .iter()
        .find(|(spellings, _)| spellings.contains(&trimmed))
        .map(|(_, value)| *value)
        .or_else(|| parse_int(trimmed))
        .unwrap_or(vendor::SOFT_LIGHT_NONE)
}
