//! Key-value engine used to patch a scratch copy of a camera store

pub mod mmkv;

pub use mmkv::MmkvFactory;

use anyhow::Result;
use std::path::Path;

/// An open store
pub trait KvEngine {
    fn encode_int(&mut self, key: &str, value: i32) -> Result<()>;

    /// Stored integer, or `default` when missing or not an integer
    fn decode_int(&self, key: &str, default: i32) -> i32;

    fn keys(&self) -> Vec<String>;

    /// Flush every write to the backing file and release the store
    ///
    /// Consumes the engine so nothing can copy the file back while writes
    /// are still pending.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens stores rooted at a directory in single-process mode
pub trait KvEngineFactory: Send + Sync {
    fn open(&self, dir: &Path, name: &str) -> Result<Box<dyn KvEngine>>;
}
