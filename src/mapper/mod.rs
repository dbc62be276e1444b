//! Preset to key-value mapping
//!
//! Turns a preset and a resolved filter index into the exact set of integer
//! writes for the camera's store. Only values the preset specifies are
//! written; everything else keeps whatever the device already has.

pub mod decode;
pub mod keys;
pub mod labels;

pub use decode::{FilterParseResult, parse_filter};
pub use keys::{ParamId, StoreKind};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::preset::{FlatFields, Preset, PresetSource, Section};
use labels::ValueKind;

/// Writes for one store file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRequest {
    pub target_file: StoreKind,
    pub filter_index: u32,
    pub source: PresetSource,
    /// Store key to value, in emission order
    pub params: IndexMap<String, i32>,
}

impl WriteRequest {
    fn new(filter_index: u32) -> Self {
        let mut params = IndexMap::new();
        params.insert(ParamId::Filter.key(filter_index), filter_index as i32);
        Self {
            target_file: StoreKind::for_index(filter_index),
            filter_index,
            source: PresetSource::Flat,
            params,
        }
    }

    fn set(&mut self, param: ParamId, value: i32) {
        self.params.insert(param.key(self.filter_index), value);
    }

    pub fn get(&self, param: ParamId) -> Option<i32> {
        self.params.get(&param.key(self.filter_index)).copied()
    }

    /// True when nothing beyond the filter selection would be written
    fn selection_only(&self) -> bool {
        self.params.len() == 1
    }
}

/// Build the write set for `preset` at `filter_index`
///
/// Flat fields are used first. When they contribute nothing beyond the
/// selection key the labelled sections are used instead.
pub fn build_write_request(preset: &Preset, filter_index: u32) -> WriteRequest {
    let mut request = WriteRequest::new(filter_index);
    apply_flat(&mut request, &preset.flat);

    if request.selection_only() && !preset.sections.is_empty() {
        request.source = PresetSource::Sections;
        apply_sections(&mut request, &preset.sections);
    }

    debug!(
        index = filter_index,
        store = %request.target_file,
        source = ?request.source,
        count = request.params.len(),
        "Built write request"
    );
    request
}

fn apply_flat(request: &mut WriteRequest, flat: &FlatFields) {
    if let Some(filter) = &flat.filter {
        if let Some(intensity) = parse_filter(filter).intensity {
            request.set(ParamId::FilterIntensity, intensity as i32);
        }
    }

    let numeric = [
        (ParamId::Saturation, flat.saturation),
        (ParamId::Contrast, flat.tone),
        (ParamId::ColdWarm, flat.warm_cool),
        (ParamId::CyanMagenta, flat.cyan_magenta),
        (ParamId::Sharpness, flat.sharpness),
    ];
    for (param, value) in numeric {
        if let Some(value) = value {
            request.set(param, value);
        }
    }

    if let Some(vignette) = &flat.vignette {
        request.set(ParamId::Vignette, decode::decode_vignette(vignette));
    }
    if let Some(soft_light) = &flat.soft_light {
        request.set(ParamId::SoftLight, decode::decode_soft_light(soft_light));
    }
}

fn apply_sections(request: &mut WriteRequest, sections: &[Section]) {
    for item in sections.iter().flat_map(|s| s.items.iter()) {
        let Some((param, kind)) = labels::resolve_label(&item.label) else {
            debug!(label = %item.label, "Skipping unrecognized preset label");
            continue;
        };

        match kind {
            // The index is fixed by the caller; only the intensity is taken from text
            ValueKind::Filter => {
                if let Some(intensity) = parse_filter(&item.value).intensity {
                    request.set(ParamId::FilterIntensity, intensity as i32);
                }
            }
            ValueKind::Vignette => request.set(param, decode::decode_vignette(&item.value)),
            ValueKind::SoftLight => request.set(param, decode::decode_soft_light(&item.value)),
            ValueKind::Integer => match decode::parse_int(&item.value) {
                Some(value) => request.set(param, value),
                None => debug!(label = %item.label, value = %item.value, "Dropping unparseable value"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::SectionItem;

    fn item(label: &str, value: &str) -> SectionItem {
        SectionItem {
            label: label.to_string(),
            value: value.to_string(),
        }
    }

    fn sectioned(items: Vec<SectionItem>) -> Preset {
        Preset {
            sections: vec![Section {
                title: "All".to_string(),
                items,
            }],
            ..Preset::default()
        }
    }

    #[test]
    fn test_end_to_end_flat_preset() {
        let preset = Preset {
            flat: FlatFields {
                filter: Some("清新 80%".to_string()),
                saturation: Some(10),
                ..FlatFields::default()
            },
            ..Preset::default()
        };

        let request = build_write_request(&preset, 2);
        assert_eq!(request.target_file, StoreKind::Shared);
        assert_eq!(request.source, PresetSource::Flat);

        let expected: IndexMap<String, i32> = [
            ("key_master_mode_effect_filter_2".to_string(), 2),
            ("key_master_mode_effect_filter_intensity_2".to_string(), 80),
            ("key_master_mode_effect_saturation_2".to_string(), 10),
        ]
        .into_iter()
        .collect();
        assert_eq!(request.params, expected);
    }

    #[test]
    fn test_flat_fields_one_key_each_and_no_fallback() {
        let preset = Preset {
            flat: FlatFields {
                filter: Some("复古 50%".to_string()),
                saturation: Some(-3),
                tone: Some(12),
                warm_cool: Some(4),
                cyan_magenta: Some(-8),
                sharpness: Some(20),
                vignette: Some("关".to_string()),
                soft_light: Some("梦幻".to_string()),
            },
            // Would add keys if the mapper fell back to sections
            sections: vec![Section {
                title: String::new(),
                items: vec![item("饱和度", "99")],
            }],
            ..Preset::default()
        };

        let request = build_write_request(&preset, 0);
        assert_eq!(request.source, PresetSource::Flat);
        assert_eq!(request.target_file, StoreKind::Preferences);
        assert_eq!(request.params.len(), 9);
        assert_eq!(request.get(ParamId::Filter), Some(0));
        assert_eq!(request.get(ParamId::FilterIntensity), Some(50));
        assert_eq!(request.get(ParamId::Saturation), Some(-3));
        assert_eq!(request.get(ParamId::Contrast), Some(12));
        assert_eq!(request.get(ParamId::ColdWarm), Some(4));
        assert_eq!(request.get(ParamId::CyanMagenta), Some(-8));
        assert_eq!(request.get(ParamId::Sharpness), Some(20));
        assert_eq!(request.get(ParamId::Vignette), Some(101));
        assert_eq!(request.get(ParamId::SoftLight), Some(3));
    }

    #[test]
    fn test_absent_fields_are_not_written() {
        let preset = Preset {
            flat: FlatFields {
                sharpness: Some(7),
                ..FlatFields::default()
            },
            ..Preset::default()
        };
        let request = build_write_request(&preset, 3);
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.get(ParamId::Saturation), None);
        assert_eq!(request.get(ParamId::FilterIntensity), None);
    }

    #[test]
    fn test_sections_used_when_flat_is_empty() {
        let preset = sectioned(vec![
            item("滤镜", "复古 70%"),
            item("{{saturation}}", "+5"),
            item("Tone", "-2"),
            item("暗角", "开"),
            item("Soft Light", "Hazy"),
            item("颗粒", "30"),
            item("锐度", "n/a"),
        ]);

        let request = build_write_request(&preset, 4);
        assert_eq!(request.source, PresetSource::Sections);
        assert_eq!(request.get(ParamId::Filter), Some(4));
        assert_eq!(request.get(ParamId::FilterIntensity), Some(70));
        assert_eq!(request.get(ParamId::Saturation), Some(5));
        assert_eq!(request.get(ParamId::Contrast), Some(-2));
        assert_eq!(request.get(ParamId::Vignette), Some(0));
        assert_eq!(request.get(ParamId::SoftLight), Some(1));
        assert_eq!(request.get(ParamId::Sharpness), None);
        assert_eq!(request.params.len(), 6);
    }

    #[test]
    fn test_sections_never_exceed_recognized_labels() {
        let items = vec![
            item("饱和度", "1"),
            item("Unknown", "2"),
            item("冷暖", "oops"),
            item("青品", "3"),
        ];
        let recognized = items
            .iter()
            .filter(|i| labels::resolve_label(&i.label).is_some())
            .count();

        let request = build_write_request(&sectioned(items), 1);
        // selection key plus at most one key per recognized label
        assert!(request.params.len() - 1 <= recognized);
    }

    #[test]
    fn test_filter_without_intensity_falls_back_to_sections() {
        let mut preset = sectioned(vec![item("Saturation", "8")]);
        preset.flat.filter = Some("原图".to_string());

        let request = build_write_request(&preset, 0);
        assert_eq!(request.source, PresetSource::Sections);
        assert_eq!(request.get(ParamId::Saturation), Some(8));
    }

    #[test]
    fn test_section_filter_never_changes_index() {
        let request = build_write_request(&sectioned(vec![item("Filter", "清新 30%")]), 7);
        assert_eq!(request.get(ParamId::Filter), Some(7));
        assert_eq!(request.get(ParamId::FilterIntensity), Some(30));
    }

    #[test]
    fn test_later_item_overrides_earlier() {
        let request = build_write_request(
            &sectioned(vec![item("饱和度", "1"), item("Saturation", "9")]),
            2,
        );
        assert_eq!(request.get(ParamId::Saturation), Some(9));
        assert_eq!(request.params.len(), 2);
    }

    #[test]
    fn test_empty_preset_writes_selection_only() {
        let request = build_write_request(&Preset::default(), 5);
        assert_eq!(request.params.len(), 1);
        assert_eq!(request.source, PresetSource::Flat);
    }
}
