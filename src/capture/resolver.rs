//! Filter name to index resolution

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::FilterEntry;

static PERCENT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d+%$").expect("percent suffix pattern"));

/// Index of the entry matching `text`, or `None`
///
/// Exact name match wins; otherwise the first entry whose name contains the
/// clean text or is contained in it. Entry order breaks ties.
pub fn resolve_filter(entries: &[FilterEntry], text: &str) -> Option<u32> {
    let clean = PERCENT_SUFFIX.replace(text.trim(), "");
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }

    if let Some(entry) = entries.iter().find(|e| e.name == clean) {
        return Some(entry.index);
    }

    let fuzzy = entries
        .iter()
        .find(|e| !e.name.is_empty() && (e.name.contains(clean) || clean.contains(e.name.as_str())));
    if let Some(entry) = fuzzy {
        debug!(text = %text, matched = %entry.name, index = entry.index, "Resolved filter by substring");
    }
    fuzzy.map(|e| e.index)
}
