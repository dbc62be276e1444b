//! Injection pipeline: capture lookup, value mapping and the transfer worker

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::{info, warn};

use crate::capture::{self, CaptureStore};
use crate::mapper::{self, WriteRequest};
use crate::preset::Preset;
use crate::transfer::{TransferError, TransferJob, TransferTicket, TransferWorker};

pub struct Injector {
    capture: Arc<CaptureStore>,
    worker: TransferWorker,
}

impl Injector {
    pub fn new(capture: Arc<CaptureStore>, worker: TransferWorker) -> Self {
        Self { capture, worker }
    }

    /// Filter index for `preset`
    ///
    /// An explicit index is used as given. Otherwise the preset's filter text
    /// is resolved against the active capture mode, and a miss is an error.
    pub fn resolve_index(&self, preset: &Preset, explicit: Option<u32>) -> Result<u32> {
        if let Some(index) = explicit {
            if self.capture.is_available() && self.capture.find_by_index(index).is_none() {
                warn!(index = index, mode = ?self.capture.active_mode(), "Index not present in capture, using it anyway");
            }
            return Ok(index);
        }

        let text = preset
            .filter_text()
            .ok_or_else(|| anyhow!("Preset '{}' names no filter; pass --index", preset.name))?;
        if !self.capture.is_available() {
            return Err(capture::unavailable_error());
        }

        let index = self.capture.resolve(text, None).ok_or_else(|| {
            anyhow!(
                "Filter '{}' not found in capture mode {}",
                text,
                self.capture.active_mode().unwrap_or_default()
            )
        })?;
        info!(filter = %text, index = index, "Resolved preset filter");
        Ok(index)
    }

    /// Writes `preset` would perform, without touching the device
    pub fn plan(&self, preset: &Preset, explicit: Option<u32>) -> Result<WriteRequest> {
        let index = self
            .resolve_index(preset, explicit)
            .with_context(|| format!("Failed to plan preset '{}'", preset.name))?;
        Ok(mapper::build_write_request(preset, index))
    }

    /// Plan `preset` and queue the write on the worker
    pub fn submit_apply(
        &self,
        preset: &Preset,
        explicit: Option<u32>,
    ) -> Result<(WriteRequest, TransferTicket)> {
        let request = self.plan(preset, explicit)?;
        let ticket = self.worker.submit(TransferJob::Apply(request.clone()))?;
        Ok((request, ticket))
    }

    pub fn submit_rollback(&self) -> Result<TransferTicket, TransferError> {
        self.worker.submit(TransferJob::Rollback)
    }
}
