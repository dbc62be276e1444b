//! Preset records
//!
//! A preset carries its adjustments either as flat fields (the original
//! schema) or as labelled sections (the newer schema). Records converted
//! between versions may carry both; which one wins is decided by
//! [`crate::mapper::build_write_request`].

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

/// Flat adjustment fields of the original preset schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_cool: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cyan_magenta: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<i32>,
    /// Categorical label or raw level; numbers are kept as their text
    #[serde(default, deserialize_with = "text_or_number", skip_serializing_if = "Option::is_none")]
    pub vignette: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", skip_serializing_if = "Option::is_none")]
    pub soft_light: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(i64),
}

fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<TextOrNumber>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        TextOrNumber::Text(text) => text,
        TextOrNumber::Number(number) => number.to_string(),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionItem {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub items: Vec<SectionItem>,
}

/// One preset record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub flat: FlatFields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
}

/// Which schema shape produced a write set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetSource {
    Flat,
    Sections,
}

impl Preset {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse preset JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preset from {:?}", path))?;
        Self::from_json(&contents).with_context(|| format!("Invalid preset file {:?}", path))
    }

    /// Items of every section, in order
    pub fn items(&self) -> impl Iterator<Item = &SectionItem> {
        self.sections.iter().flat_map(|section| section.items.iter())
    }

    /// Filter text the preset names, flat field first, then the first filter item
    pub fn filter_text(&self) -> Option<&str> {
        if let Some(filter) = self.flat.filter.as_deref() {
            return Some(filter);
        }
        self.items()
            .find(|item| {
                matches!(
                    crate::mapper::labels::resolve_label(&item.label),
                    Some((crate::mapper::ParamId::Filter, _))
                )
            })
            .map(|item| item.value.as_str())
    }
}
