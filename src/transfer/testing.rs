//! Test doubles for transfer tests

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::{TransferController, TransferTarget};
use crate::constants::mmkv;
use crate::kv::MmkvFactory;
use crate::shell::{CommandOutput, PrivilegedChannel, ShellChannel};

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Runs commands with plain `sh`, except the Android-only ones
pub(crate) struct TestChannel {
    shell: ShellChannel,
    log: Arc<Mutex<Vec<String>>>,
    fail: Option<Predicate>,
}

impl TestChannel {
    pub(crate) fn new() -> Self {
        Self {
            shell: ShellChannel::new(""),
            log: Arc::new(Mutex::new(Vec::new())),
            fail: None,
        }
    }

    /// Commands matching `fail` exit non-zero without running
    pub(crate) fn failing(fail: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail: Some(Box::new(fail)),
            ..Self::new()
        }
    }

    pub(crate) fn log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

impl PrivilegedChannel for TestChannel {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.log.lock().unwrap().push(command.to_string());

        if self.fail.as_ref().is_some_and(|fail| fail(command)) {
            return Ok(CommandOutput {
                success: false,
                stdout: Vec::new(),
                stderr: vec!["injected failure".to_string()],
            });
        }
        if command.starts_with("am force-stop") || command.starts_with("restorecon") {
            return Ok(CommandOutput {
                success: true,
                ..CommandOutput::default()
            });
        }
        self.shell.execute(command)
    }
}

/// A fake camera store directory with an `mmkv` store, its sidecar and an unrelated file
pub(crate) struct Fixture {
    root: TempDir,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = root.path().join("store");
        fs::create_dir(&store).unwrap();

        fs::write(store.join("mmkv"), store_bytes(&[("existing", vec![42]), ("label", b"\x05hello".to_vec())])).unwrap();
        let mut meta = vec![0u8; 128];
        LittleEndian::write_u32(&mut meta[mmkv::META_VERSION_OFFSET..], 3);
        fs::write(store.join("mmkv.crc"), meta).unwrap();
        fs::write(store.join("other.xml"), "<map />").unwrap();

        Self { root }
    }

    pub(crate) fn store_dir(&self) -> PathBuf {
        self.root.path().join("store")
    }

    pub(crate) fn backup_dir(&self) -> PathBuf {
        self.root.path().join("backup")
    }

    pub(crate) fn target(&self) -> TransferTarget {
        TransferTarget {
            package: "com.android.camera".to_string(),
            store_dir: self.store_dir(),
            backup_dir: self.backup_dir(),
            scratch_dir: self.root.path().join("scratch"),
            rollback_settle: Duration::ZERO,
        }
    }

    pub(crate) fn controller(&self, channel: TestChannel) -> TransferController {
        TransferController::new(Arc::new(channel), Arc::new(MmkvFactory), self.target())
    }
}

/// Contents of every file directly under `dir`
pub(crate) fn dir_digest(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.path().is_file())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (name, fs::read(entry.path()).unwrap())
        })
        .collect()
}

/// Single-byte-length records only
fn store_bytes(records: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut items = Vec::new();
    for (key, value) in records {
        items.push(key.len() as u8);
        items.extend_from_slice(key.as_bytes());
        items.push(value.len() as u8);
        items.extend_from_slice(value);
    }
    let mut payload = vec![items.len() as u8];
    payload.extend_from_slice(&items);

    let mut file = vec![0u8; mmkv::HEADER_LEN];
    LittleEndian::write_u32(&mut file, payload.len() as u32);
    file.extend_from_slice(&payload);
    file.resize(mmkv::PAGE_SIZE, 0);
    file
}
