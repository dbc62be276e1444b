//! Privileged transfer of a camera store
//!
//! The camera's store files are owned by another user and protected by
//! SELinux labels, so they are never patched in place. One attempt runs:
//!
//! 1. `StoppingTarget`: force-stop the camera so it cannot rewrite the file
//! 2. `Backing`: snapshot the whole store directory (best effort)
//! 3. `CopyingIn`: copy the store file and its `.crc` sidecar to scratch
//! 4. `Patching`: write the keys with the key-value engine and close it
//! 5. `CopyingBack`: copy back, restore owner, mode bits and label
//!
//! Nothing in the camera's directory changes before step 5. A failure from
//! step 5 on may leave it partially written, which is what
//! [`TransferController::rollback`] is for.

pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use worker::{TransferEvent, TransferJob, TransferTicket, TransferWorker};

use anyhow::{Context, Result, anyhow};
use nix::unistd::{getgid, getuid};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::constants::{android, stores};
use crate::kv::KvEngineFactory;
use crate::mapper::{StoreKind, WriteRequest};
use crate::shell::{PrivilegedChannel, quote, quote_path};

/// Where one transfer attempt stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    StoppingTarget,
    Backing,
    CopyingIn,
    Patching,
    CopyingBack,
    RollingBack,
    Success,
    Error,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferPhase::Idle => "idle",
            TransferPhase::StoppingTarget => "stopping camera",
            TransferPhase::Backing => "backing up",
            TransferPhase::CopyingIn => "copying store to scratch",
            TransferPhase::Patching => "patching store",
            TransferPhase::CopyingBack => "copying store back",
            TransferPhase::RollingBack => "restoring backup",
            TransferPhase::Success => "done",
            TransferPhase::Error => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("another transfer is already running")]
    Busy,

    #[error("{phase} failed: {cause}")]
    Step { phase: TransferPhase, cause: String },

    #[error("no backup found at {}", .0.display())]
    NoBackup(PathBuf),

    #[error("transfer worker stopped")]
    WorkerStopped,
}

impl TransferError {
    fn step(phase: TransferPhase, err: anyhow::Error) -> Self {
        TransferError::Step {
            phase,
            cause: format!("{err:#}"),
        }
    }

    pub fn phase(&self) -> Option<TransferPhase> {
        match self {
            TransferError::Step { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// True when the camera's directory may already have been modified
    pub fn may_have_modified_store(&self) -> bool {
        matches!(
            self.phase(),
            Some(TransferPhase::CopyingBack) | Some(TransferPhase::RollingBack)
        )
    }
}

/// Result of a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Applied {
        store: StoreKind,
        keys_written: usize,
        backup_taken: bool,
    },
    RolledBack,
}

/// Paths and package a controller operates on
#[derive(Debug, Clone)]
pub struct TransferTarget {
    pub package: String,
    pub store_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub rollback_settle: Duration,
}

impl TransferTarget {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            package: settings.camera_package.clone(),
            store_dir: settings.store_dir(),
            backup_dir: settings.backup_dir.clone(),
            scratch_dir: settings.scratch_dir.clone(),
            rollback_settle: Duration::from_millis(settings.rollback_settle_ms),
        }
    }
}

/// Owner and mode of the store directory, read before copying back
struct DirAttrs {
    owner: String,
    mode: String,
}

/// Runs transfer attempts one at a time
pub struct TransferController {
    channel: Arc<dyn PrivilegedChannel>,
    engine: Arc<dyn KvEngineFactory>,
    target: TransferTarget,
    busy: Mutex<()>,
    phase: Mutex<TransferPhase>,
    events: Option<Sender<TransferEvent>>,
}

impl TransferController {
    pub fn new(
        channel: Arc<dyn PrivilegedChannel>,
        engine: Arc<dyn KvEngineFactory>,
        target: TransferTarget,
    ) -> Self {
        Self {
            channel,
            engine,
            target,
            busy: Mutex::new(()),
            phase: Mutex::new(TransferPhase::Idle),
            events: None,
        }
    }

    /// Publish phase changes on `events`, or stop publishing with `None`
    pub fn set_event_sender(&mut self, events: Option<Sender<TransferEvent>>) {
        self.events = events;
    }

    pub fn phase(&self) -> TransferPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Write `request` into the camera's store
    pub fn apply(&self, request: &WriteRequest) -> Result<TransferOutcome, TransferError> {
        let _guard = self.acquire()?;
        self.enter(TransferPhase::Idle);

        let result = self.run_apply(request);
        self.finish(&result);
        result
    }

    /// Copy the last backup over the store directory
    ///
    /// The camera is left stopped; the caller relaunches it.
    pub fn rollback(&self) -> Result<TransferOutcome, TransferError> {
        let _guard = self.acquire()?;
        self.enter(TransferPhase::Idle);

        let result = self.run_rollback();
        self.finish(&result);
        result
    }

    /// Integer values of a store, read from a scratch copy
    ///
    /// Values that are not integers are reported as `None`.
    pub fn inspect(&self, store: StoreKind) -> Result<Vec<(String, Option<i32>)>, TransferError> {
        let _guard = self.acquire()?;
        let file = store.file_name();

        self.copy_in(file)
            .map_err(|e| TransferError::step(TransferPhase::CopyingIn, e))?;
        let engine = self
            .engine
            .open(&self.target.scratch_dir, file)
            .map_err(|e| TransferError::step(TransferPhase::CopyingIn, e))?;

        let values = engine
            .keys()
            .into_iter()
            .map(|key| {
                let a = engine.decode_int(&key, 0);
                let b = engine.decode_int(&key, 1);
                let value = (a == b).then_some(a);
                (key, value)
            })
            .collect();
        engine
            .close()
            .map_err(|e| TransferError::step(TransferPhase::CopyingIn, e))?;
        Ok(values)
    }

    fn run_apply(&self, request: &WriteRequest) -> Result<TransferOutcome, TransferError> {
        use TransferPhase::{Backing, CopyingBack, CopyingIn, Patching, StoppingTarget};
        let file = request.target_file.file_name();
        info!(
            package = %self.target.package,
            store = %file,
            keys = request.params.len(),
            "Starting store transfer"
        );

        self.enter(StoppingTarget);
        self.stop_target().map_err(|e| TransferError::step(StoppingTarget, e))?;

        self.enter(Backing);
        let backup_taken = match self.backup() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = ?e, backup = %self.target.backup_dir.display(), "Backup failed, continuing without a restore point");
                false
            }
        };

        self.enter(CopyingIn);
        let sidecar = self.copy_in(file).map_err(|e| TransferError::step(CopyingIn, e))?;

        self.enter(Patching);
        self.patch(file, request).map_err(|e| TransferError::step(Patching, e))?;

        self.enter(CopyingBack);
        self.copy_back(file, sidecar)
            .map_err(|e| TransferError::step(CopyingBack, e))?;

        Ok(TransferOutcome::Applied {
            store: request.target_file,
            keys_written: request.params.len(),
            backup_taken,
        })
    }

    fn run_rollback(&self) -> Result<TransferOutcome, TransferError> {
        let phase = TransferPhase::RollingBack;
        let dir = quote_path(&self.target.store_dir);
        let backup = &self.target.backup_dir;

        self.enter(phase);
        self.stop_target().map_err(|e| TransferError::step(phase, e))?;
        if !self.target.rollback_settle.is_zero() {
            debug!(wait = ?self.target.rollback_settle, "Waiting for camera to exit");
            std::thread::sleep(self.target.rollback_settle);
        }

        let exists = self
            .channel
            .execute(&format!("[ -d {} ]", quote_path(backup)))
            .map_err(|e| TransferError::step(phase, e))?;
        if !exists.success {
            return Err(TransferError::NoBackup(backup.clone()));
        }

        let attrs = self.dir_attrs().map_err(|e| TransferError::step(phase, e))?;
        let restore = || -> Result<()> {
            self.channel
                .run(&format!("cp -af {}/. {}/", quote_path(backup), dir))?;
            self.channel
                .run(&format!("chown -R {} {}", attrs.owner, dir))?;
            self.channel.run(&format!(
                "find {} -type f -exec chmod {} {{}} +",
                dir,
                android::STORE_FILE_MODE
            ))?;
            self.channel.run(&format!("chmod {} {}", attrs.mode, dir))?;
            self.channel.run(&format!("restorecon -R {}", dir))?;
            Ok(())
        };
        restore().map_err(|e| TransferError::step(phase, e))?;

        info!(store_dir = %self.target.store_dir.display(), "Restored store directory from backup");
        Ok(TransferOutcome::RolledBack)
    }

    fn stop_target(&self) -> Result<()> {
        self.channel
            .run(&format!("am force-stop {}", quote(&self.target.package)))
            .context("Failed to stop camera")?;
        Ok(())
    }

    fn backup(&self) -> Result<()> {
        let backup = quote_path(&self.target.backup_dir);
        let command = format!(
            "rm -rf {b} && mkdir -p {b} && cp -a {}/. {b}/",
            quote_path(&self.target.store_dir),
            b = backup
        );
        if let Err(e) = self.channel.run(&command) {
            // a partial snapshot must not be mistaken for a restore point
            let _ = self.channel.execute(&format!("rm -rf {}", backup));
            return Err(e);
        }
        info!(backup = %self.target.backup_dir.display(), "Backed up store directory");
        Ok(())
    }

    /// Copy `file` (and its sidecar when present) into scratch; returns whether the sidecar was copied
    fn copy_in(&self, file: &str) -> Result<bool> {
        let source = self.target.store_dir.join(file);
        let source_crc = crc_path(&self.target.store_dir, file);
        let scratch_dir = quote_path(&self.target.scratch_dir);
        let scratch = self.target.scratch_dir.join(file);
        let scratch_crc = crc_path(&self.target.scratch_dir, file);

        self.channel.run(&format!(
            "mkdir -p {} && rm -f {} {}",
            scratch_dir,
            quote_path(&scratch),
            quote_path(&scratch_crc)
        ))?;
        self.channel
            .run(&format!("cp -f {} {}", quote_path(&source), quote_path(&scratch)))
            .with_context(|| format!("Store file {} not readable", source.display()))?;

        let sidecar = self
            .channel
            .execute(&format!("[ -f {} ]", quote_path(&source_crc)))?
            .success;
        let mut copied = vec![quote_path(&scratch)];
        if sidecar {
            self.channel
                .run(&format!("cp -f {} {}", quote_path(&source_crc), quote_path(&scratch_crc)))?;
            copied.push(quote_path(&scratch_crc));
        }

        let owner = format!("{}:{}", getuid(), getgid());
        self.channel
            .run(&format!("chown {} {} {}", owner, scratch_dir, copied.join(" ")))?;
        self.channel.run(&format!(
            "chmod {} {}",
            android::SCRATCH_FILE_MODE,
            copied.join(" ")
        ))?;

        debug!(file = %file, sidecar = sidecar, "Copied store to scratch");
        Ok(sidecar)
    }

    fn patch(&self, file: &str, request: &WriteRequest) -> Result<()> {
        let mut engine = self.engine.open(&self.target.scratch_dir, file)?;
        for (key, value) in &request.params {
            engine
                .encode_int(key, *value)
                .with_context(|| format!("Failed to write {key}"))?;
        }
        // must reach the file before it is copied back
        engine.close().context("Failed to flush patched store")?;
        info!(file = %file, keys = request.params.len(), "Patched scratch copy");
        Ok(())
    }

    fn copy_back(&self, file: &str, sidecar: bool) -> Result<()> {
        let attrs = self.dir_attrs()?;
        let dir = quote_path(&self.target.store_dir);
        let dest = quote_path(&self.target.store_dir.join(file));
        let dest_crc = quote_path(&crc_path(&self.target.store_dir, file));
        let scratch = quote_path(&self.target.scratch_dir.join(file));
        let scratch_crc = quote_path(&crc_path(&self.target.scratch_dir, file));

        self.channel.run(&format!("cp -f {} {}", scratch, dest))?;
        if sidecar {
            self.tolerate(&format!("cp -f {} {}", scratch_crc, dest_crc));
        }

        self.channel.run(&format!("chown {} {}", attrs.owner, dest))?;
        self.channel
            .run(&format!("chmod {} {}", android::STORE_FILE_MODE, dest))?;
        if sidecar {
            self.tolerate(&format!("chown {} {}", attrs.owner, dest_crc));
            self.tolerate(&format!("chmod {} {}", android::STORE_FILE_MODE, dest_crc));
        }

        self.channel.run(&format!("chmod {} {}", attrs.mode, dir))?;
        self.channel.run(&format!("restorecon -R {}", dir))?;

        info!(file = %file, owner = %attrs.owner, mode = %attrs.mode, "Copied patched store back");
        Ok(())
    }

    fn dir_attrs(&self) -> Result<DirAttrs> {
        let output = self
            .channel
            .run(&format!("stat -c '%u:%g %a' {}", quote_path(&self.target.store_dir)))?;
        let line = output
            .first_line()
            .ok_or_else(|| anyhow!("stat printed nothing for {}", self.target.store_dir.display()))?;
        parse_dir_attrs(line)
    }

    /// Sidecar steps: a missing `.crc` must not fail the transfer
    fn tolerate(&self, command: &str) {
        if let Err(e) = self.channel.run(command) {
            warn!(command = %command, error = ?e, "Ignoring sidecar failure");
        }
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>, TransferError> {
        match self.busy.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                warn!("Rejecting transfer, another one is in flight");
                Err(TransferError::Busy)
            }
        }
    }

    fn enter(&self, phase: TransferPhase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
        debug!(phase = %phase, "Transfer phase");
        if let Some(events) = &self.events {
            let _ = events.send(TransferEvent::Phase(phase));
        }
    }

    fn finish(&self, result: &Result<TransferOutcome, TransferError>) {
        match result {
            Ok(outcome) => {
                info!(outcome = ?outcome, "Transfer finished");
                self.enter(TransferPhase::Success);
            }
            Err(e) => {
                error!(error = %e, "Transfer failed");
                self.enter(TransferPhase::Error);
            }
        }
    }
}

fn crc_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(format!("{file}{}", stores::CRC_SUFFIX))
}

/// Parse `uid:gid mode` as printed by `stat -c '%u:%g %a'`
fn parse_dir_attrs(line: &str) -> Result<DirAttrs> {
    let mut parts = line.split_whitespace();
    let (Some(owner), Some(mode), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(anyhow!("unexpected stat output '{line}'"));
    };

    let valid_owner = owner
        .split_once(':')
        .is_some_and(|(u, g)| is_digits(u) && is_digits(g));
    if !valid_owner || !is_digits(mode) {
        return Err(anyhow!("unexpected stat output '{line}'"));
    }
    Ok(DirAttrs {
        owner: owner.to_string(),
        mode: mode.to_string(),
    })
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::kv::{KvEngineFactory, MmkvFactory};
    use crate::mapper::ParamId;
    use indexmap::IndexMap;
    use std::fs;
    use std::sync::mpsc;

    fn request(index: u32, values: &[(ParamId, i32)]) -> WriteRequest {
        let mut params = IndexMap::new();
        params.insert(ParamId::Filter.key(index), index as i32);
        for (param, value) in values {
            params.insert(param.key(index), *value);
        }
        WriteRequest {
            target_file: StoreKind::for_index(index),
            filter_index: index,
            source: crate::preset::PresetSource::Flat,
            params,
        }
    }

    #[test]
    fn test_parse_dir_attrs() {
        let attrs = parse_dir_attrs("10045:10045 771").unwrap();
        assert_eq!(attrs.owner, "10045:10045");
        assert_eq!(attrs.mode, "771");
        assert!(parse_dir_attrs("root 771").is_err());
        assert!(parse_dir_attrs("1:1").is_err());
        assert!(parse_dir_attrs("1:1 7x1").is_err());
    }

    #[test]
    fn test_apply_writes_keys_and_reports_phases() {
        let fixture = Fixture::new();
        let (tx, rx) = mpsc::channel();
        let mut controller = fixture.controller(TestChannel::new());
        controller.set_event_sender(Some(tx));

        let outcome = controller
            .apply(&request(2, &[(ParamId::FilterIntensity, 80), (ParamId::Saturation, 10)]))
            .unwrap();
        assert_eq!(
            outcome,
            TransferOutcome::Applied {
                store: StoreKind::Shared,
                keys_written: 3,
                backup_taken: true
            }
        );

        let store = MmkvFactory.open(&fixture.store_dir(), "mmkv").unwrap();
        assert_eq!(store.decode_int("key_master_mode_effect_filter_2", -1), 2);
        assert_eq!(store.decode_int("key_master_mode_effect_filter_intensity_2", -1), 80);
        assert_eq!(store.decode_int("key_master_mode_effect_saturation_2", -1), 10);
        // untouched keys survive
        assert_eq!(store.decode_int("existing", -1), 42);

        let phases: Vec<TransferPhase> = rx
            .try_iter()
            .filter_map(|e| match e {
                TransferEvent::Phase(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                TransferPhase::Idle,
                TransferPhase::StoppingTarget,
                TransferPhase::Backing,
                TransferPhase::CopyingIn,
                TransferPhase::Patching,
                TransferPhase::CopyingBack,
                TransferPhase::Success,
            ]
        );
        assert_eq!(controller.phase(), TransferPhase::Success);
        assert!(fixture.backup_dir().join("mmkv").exists());
    }

    #[test]
    fn test_apply_updates_sidecar_in_store_dir() {
        let fixture = Fixture::new();
        let before = fs::read(fixture.store_dir().join("mmkv.crc")).unwrap();

        let controller = fixture.controller(TestChannel::new());
        controller.apply(&request(1, &[(ParamId::Sharpness, 3)])).unwrap();

        let after = fs::read(fixture.store_dir().join("mmkv.crc")).unwrap();
        assert_ne!(before, after);
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn test_copy_in_failure_leaves_store_untouched() {
        let fixture = Fixture::new();
        let before = dir_digest(&fixture.store_dir());

        let channel = TestChannel::failing(|cmd| cmd.starts_with("chmod 666"));
        let controller = fixture.controller(channel);
        let err = controller
            .apply(&request(3, &[(ParamId::Saturation, 5)]))
            .unwrap_err();

        assert_eq!(err.phase(), Some(TransferPhase::CopyingIn));
        assert!(!err.may_have_modified_store());
        assert_eq!(controller.phase(), TransferPhase::Error);
        assert_eq!(dir_digest(&fixture.store_dir()), before);
    }

    #[test]
    fn test_stop_failure_aborts_before_backup() {
        let fixture = Fixture::new();
        let channel = TestChannel::failing(|cmd| cmd.starts_with("am force-stop"));
        let log = channel.log();
        let controller = fixture.controller(channel);

        let err = controller.apply(&request(1, &[])).unwrap_err();
        assert_eq!(err.phase(), Some(TransferPhase::StoppingTarget));
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(!fixture.backup_dir().exists());
    }

    #[test]
    fn test_backup_failure_is_not_fatal() {
        let fixture = Fixture::new();
        let channel = TestChannel::failing(|cmd| cmd.contains("cp -a"));
        let controller = fixture.controller(channel);

        let outcome = controller.apply(&request(1, &[(ParamId::Vignette, 101)])).unwrap();
        assert!(matches!(outcome, TransferOutcome::Applied { backup_taken: false, .. }));
        assert!(!fixture.backup_dir().exists());
    }

    #[test]
    fn test_missing_store_file_fails_copy_in() {
        let fixture = Fixture::new();
        let controller = fixture.controller(TestChannel::new());

        // index 0 targets preferences_0, which the fixture does not create
        let err = controller.apply(&request(0, &[])).unwrap_err();
        assert_eq!(err.phase(), Some(TransferPhase::CopyingIn));
        assert!(!fixture.store_dir().join("preferences_0").exists());
    }

    #[test]
    fn test_store_without_sidecar() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.store_dir().join("mmkv.crc")).unwrap();

        let controller = fixture.controller(TestChannel::new());
        controller.apply(&request(4, &[(ParamId::ColdWarm, -6)])).unwrap();

        assert!(!fixture.store_dir().join("mmkv.crc").exists());
        let store = MmkvFactory.open(&fixture.store_dir(), "mmkv").unwrap();
        assert_eq!(store.decode_int("key_master_mode_effect_cold_warm_4", 0), -6);
    }

    #[test]
    fn test_rollback_restores_every_file() {
        let fixture = Fixture::new();
        let before = dir_digest(&fixture.store_dir());

        let controller = fixture.controller(TestChannel::new());
        controller.apply(&request(5, &[(ParamId::Contrast, 9)])).unwrap();
        assert_ne!(dir_digest(&fixture.store_dir()), before);

        assert_eq!(controller.rollback().unwrap(), TransferOutcome::RolledBack);
        assert_eq!(dir_digest(&fixture.store_dir()), before);
    }

    #[test]
    fn test_rollback_without_backup() {
        let fixture = Fixture::new();
        let controller = fixture.controller(TestChannel::new());
        let err = controller.rollback().unwrap_err();
        assert!(matches!(err, TransferError::NoBackup(_)));
        assert_eq!(controller.phase(), TransferPhase::Error);
    }

    #[test]
    fn test_copy_back_failure_then_rollback_from_error() {
        let fixture = Fixture::new();
        let before = dir_digest(&fixture.store_dir());

        // owner restore on the store file itself, after the patched copy landed
        let channel = TestChannel::failing(|cmd| cmd.starts_with("chown ") && cmd.ends_with("/store/mmkv'"));
        let controller = fixture.controller(channel);
        let err = controller
            .apply(&request(2, &[(ParamId::Saturation, 30)]))
            .unwrap_err();

        assert_eq!(err.phase(), Some(TransferPhase::CopyingBack));
        assert!(err.may_have_modified_store());
        assert_eq!(controller.phase(), TransferPhase::Error);
        assert_ne!(dir_digest(&fixture.store_dir()), before);

        assert_eq!(controller.rollback().unwrap(), TransferOutcome::RolledBack);
        assert_eq!(controller.phase(), TransferPhase::Success);
        assert_eq!(dir_digest(&fixture.store_dir()), before);
    }

    #[test]
    fn test_sidecar_copy_back_failure_is_tolerated() {
        let fixture = Fixture::new();
        let before = dir_digest(&fixture.store_dir());

        let channel = TestChannel::failing(|cmd| cmd.starts_with("cp -f") && cmd.ends_with("/store/mmkv.crc'"));
        let log = channel.log();
        let controller = fixture.controller(channel);
        controller.apply(&request(3, &[(ParamId::Sharpness, 4)])).unwrap();

        assert_eq!(controller.phase(), TransferPhase::Success);
        assert!(log.lock().unwrap().iter().any(|c| c.ends_with("/store/mmkv.crc'") && c.starts_with("cp -f")));
        let after = dir_digest(&fixture.store_dir());
        assert_ne!(after["mmkv"], before["mmkv"]);
        assert_eq!(after["mmkv.crc"], before["mmkv.crc"]);

        let store = MmkvFactory.open(&fixture.store_dir(), "mmkv").unwrap();
        assert_eq!(store.decode_int("key_master_mode_effect_sharpness_3", -1), 4);
    }

    #[test]
    fn test_rollback_failure_is_reported_as_modifying() {
        let fixture = Fixture::new();
        let channel = TestChannel::failing(|cmd| cmd.starts_with("cp -af"));
        let controller = fixture.controller(channel);
        controller.apply(&request(1, &[(ParamId::Contrast, 2)])).unwrap();

        let err = controller.rollback().unwrap_err();
        assert_eq!(err.phase(), Some(TransferPhase::RollingBack));
        assert!(err.may_have_modified_store());
    }

    #[test]
    fn test_second_attempt_rejected_while_busy() {
        let fixture = Fixture::new();
        let controller = fixture.controller(TestChannel::new());

        let _held = controller.busy.lock().unwrap();
        assert!(matches!(controller.apply(&request(1, &[])), Err(TransferError::Busy)));
        assert!(matches!(controller.rollback(), Err(TransferError::Busy)));
    }

    #[test]
    fn test_inspect_lists_values_without_touching_store() {
        let fixture = Fixture::new();
        let before = dir_digest(&fixture.store_dir());
        let channel = TestChannel::new();
        let log = channel.log();
        let controller = fixture.controller(channel);

        let values = controller.inspect(StoreKind::Shared).unwrap();
        assert!(values.contains(&("existing".to_string(), Some(42))));
        assert!(values.contains(&("label".to_string(), None)));
        assert_eq!(dir_digest(&fixture.store_dir()), before);
        assert!(!log.lock().unwrap().iter().any(|c| c.starts_with("am force-stop")));
    }
}
