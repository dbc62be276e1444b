//! Filter list captured from the camera process
//!
//! The hook inside the camera dumps its filter enumeration to a JSON file.
//! `CaptureStore` parses it, keeps the latest snapshot and tells
//! subscribers whenever the snapshot is replaced. Readers always get a
//! complete `Arc<CaptureState>`; loads never mutate a published state.

pub mod resolver;

pub use resolver::resolve_filter;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::constants::capture;
use crate::shell::{self, PrivilegedChannel};

/// One filter as the camera enumerates it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    /// Position in its mode's list; also the key suffix
    pub index: u32,
    pub name: String,
    pub lut_file: String,
    pub is_master: i64,
    pub resource_id: i64,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSnapshot {
    /// Epoch milliseconds from the capture file
    pub capture_time: i64,
    pub camera_package: String,
    pub modes: IndexMap<String, Vec<FilterEntry>>,
}

impl CaptureSnapshot {
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.capture_time)
    }

    /// `master-back` when present, otherwise the first mode in the file
    fn default_mode(&self) -> Option<String> {
        if self.modes.contains_key(capture::DEFAULT_MODE) {
            return Some(capture::DEFAULT_MODE.to_string());
        }
        self.modes.keys().next().cloned()
    }
}

/// Published capture state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub snapshot: Option<CaptureSnapshot>,
    pub active_mode: Option<String>,
}

impl CaptureState {
    pub fn is_available(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Filters of `mode`, or of the active mode when `None`
    pub fn filters(&self, mode: Option<&str>) -> &[FilterEntry] {
        let mode = mode.or(self.active_mode.as_deref());
        match (&self.snapshot, mode) {
            (Some(snapshot), Some(mode)) => snapshot.modes.get(mode).map(Vec::as_slice).unwrap_or(&[]),
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A new snapshot replaced the previous one
    Loaded { modes: usize, active_mode: Option<String> },
    /// Loading failed and the state was reset
    Cleared,
    ModeChanged(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCapture {
    #[serde(default)]
    capture_time: i64,
    #[serde(default)]
    camera_package: String,
    modes: IndexMap<String, Vec<RawFilter>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    lut_file: String,
    #[serde(default)]
    is_master: i64,
    #[serde(default)]
    resource_id: i64,
}

/// Parse a capture document
pub fn parse_capture(json: &str) -> Result<CaptureSnapshot> {
    let raw: RawCapture = serde_json::from_str(json).context("Invalid capture JSON")?;

    let modes = raw
        .modes
        .into_iter()
        .map(|(mode, filters)| {
            let entries = filters
                .into_iter()
                .enumerate()
                .map(|(position, f)| FilterEntry {
                    index: f.index.unwrap_or(position as u32),
                    name: f.name,
                    lut_file: f.lut_file,
                    is_master: f.is_master,
                    resource_id: f.resource_id,
                    mode: mode.clone(),
                })
                .collect();
            (mode, entries)
        })
        .collect();

    Ok(CaptureSnapshot {
        capture_time: raw.capture_time,
        camera_package: raw.camera_package,
        modes,
    })
}

/// Holder of the current capture snapshot
#[derive(Default)]
pub struct CaptureStore {
    state: RwLock<Arc<CaptureState>>,
    subscribers: Mutex<Vec<Sender<CaptureEvent>>>,
}

impl CaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; stays valid even if a load replaces it afterwards
    pub fn snapshot(&self) -> Arc<CaptureState> {
        match self.state.read() {
            Ok(state) => Arc::clone(&state),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.snapshot().is_available()
    }

    pub fn subscribe(&self) -> Receiver<CaptureEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock_subscribers().push(tx);
        rx
    }

    /// Parse `json` and publish it; on failure the store becomes unavailable
    pub fn load_str(&self, json: &str) -> bool {
        match parse_capture(json) {
            Ok(snapshot) => {
                let active_mode = snapshot.default_mode();
                let modes = snapshot.modes.len();
                info!(
                    modes = modes,
                    filters = snapshot.modes.values().map(Vec::len).sum::<usize>(),
                    active_mode = ?active_mode,
                    captured_at = ?snapshot.captured_at(),
                    "Loaded filter capture"
                );
                self.publish(
                    CaptureState {
                        snapshot: Some(snapshot),
                        active_mode: active_mode.clone(),
                    },
                    CaptureEvent::Loaded { modes, active_mode },
                );
                true
            }
            Err(e) => {
                error!(error = ?e, "Failed to parse filter capture, clearing state");
                self.clear();
                false
            }
        }
    }

    /// Load a capture file readable by this process
    pub fn load_file(&self, path: &Path) -> bool {
        match std::fs::read_to_string(path) {
            Ok(contents) => self.load_str(&contents),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read capture file");
                self.clear();
                false
            }
        }
    }

    /// Load a capture file from the camera's private storage
    pub fn load_via(&self, channel: &dyn PrivilegedChannel, path: &Path) -> bool {
        let result = channel
            .run(&format!("cat {}", shell::quote_path(path)))
            .map(|output| output.stdout.join("\n"));
        match result {
            Ok(contents) => self.load_str(&contents),
            Err(e) => {
                error!(path = %path.display(), error = ?e, "Failed to read capture through privileged shell");
                self.clear();
                false
            }
        }
    }

    /// Switch the active mode; false when the mode is not in the snapshot
    pub fn set_active_mode(&self, mode: &str) -> bool {
        let current = self.snapshot();
        let known = current
            .snapshot
            .as_ref()
            .is_some_and(|s| s.modes.contains_key(mode));
        if !known {
            warn!(mode = %mode, "Unknown capture mode");
            return false;
        }

        let mut next = (*current).clone();
        next.active_mode = Some(mode.to_string());
        self.publish(next, CaptureEvent::ModeChanged(mode.to_string()));
        true
    }

    pub fn active_mode(&self) -> Option<String> {
        self.snapshot().active_mode.clone()
    }

    pub fn modes(&self) -> Vec<String> {
        self.snapshot()
            .snapshot
            .as_ref()
            .map(|s| s.modes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Filters of `mode`, or of the active mode
    pub fn filters(&self, mode: Option<&str>) -> Vec<FilterEntry> {
        self.snapshot().filters(mode).to_vec()
    }

    /// Filter with `index` in the active mode
    pub fn find_by_index(&self, index: u32) -> Option<FilterEntry> {
        self.snapshot()
            .filters(None)
            .iter()
            .find(|f| f.index == index)
            .cloned()
    }

    /// Resolve filter text against `mode`, or the active mode
    pub fn resolve(&self, text: &str, mode: Option<&str>) -> Option<u32> {
        resolve_filter(self.snapshot().filters(mode), text)
    }

    fn clear(&self) {
        self.publish(CaptureState::default(), CaptureEvent::Cleared);
    }

    fn publish(&self, state: CaptureState, event: CaptureEvent) {
        {
            let mut guard = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Arc::new(state);
        }

        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(subscribers = subscribers.len(), event = ?event, "Published capture event");
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Sender<CaptureEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Error for callers that need a capture to proceed
pub fn unavailable_error() -> anyhow::Error {
    anyhow!("No filter capture loaded. Open the camera once with the hook active, then retry.")
}
