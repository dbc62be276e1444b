//! Section item labels recognized in sectioned presets

use super::keys::ParamId;

/// How an item's value text is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Filter text; only the intensity suffix is used
    Filter,
    /// Categorical text table
    Vignette,
    SoftLight,
    /// Signed integer
    Integer,
}

struct LabelEntry {
    param: ParamId,
    kind: ValueKind,
    /// Template reference, Chinese name, English name
    spellings: [&'static str; 3],
}

const LABELS: &[LabelEntry] = &[
    LabelEntry {
        param: ParamId::Filter,
        kind: ValueKind::Filter,
        spellings: ["{{filter}}", "滤镜", "Filter"],
    },
    LabelEntry {
        param: ParamId::Saturation,
        kind: ValueKind::Integer,
        spellings: ["{{saturation}}", "饱和度", "Saturation"],
    },
    LabelEntry {
        param: ParamId::Contrast,
        kind: ValueKind::Integer,
        spellings: ["{{tone}}", "影调", "Tone"],
    },
    LabelEntry {
        param: ParamId::ColdWarm,
        kind: ValueKind::Integer,
        spellings: ["{{warm_cool}}", "冷暖", "Warm/Cool"],
    },
    LabelEntry {
        param: ParamId::CyanMagenta,
        kind: ValueKind::Integer,
        spellings: ["{{cyan_magenta}}", "青品", "Cyan/Magenta"],
    },
    LabelEntry {
        param: ParamId::Sharpness,
        kind: ValueKind::Integer,
        spellings: ["{{sharpness}}", "锐度", "Sharpness"],
    },
    LabelEntry {
        param: ParamId::Vignette,
        kind: ValueKind::Vignette,
        spellings: ["{{vignette}}", "暗角", "Vignette"],
    },
    LabelEntry {
        param: ParamId::SoftLight,
        kind: ValueKind::SoftLight,
        spellings: ["{{soft_light}}", "柔光", "Soft Light"],
    },
];

/// Look up a label (surrounding whitespace ignored)
pub fn resolve_label(label: &str) -> Option<(ParamId, ValueKind)> {
    let label = label.trim();
    LABELS
        .iter()
        .find(|entry| entry.spellings.contains(&label))
        .map(|entry| (entry.param, entry.kind))
}
