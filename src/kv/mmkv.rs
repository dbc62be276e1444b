//! MMKV store files
//!
//! Layout: a little-endian `u32` payload size, the payload, then zero
//! padding up to a page multiple. The payload starts with a varint size
//! header followed by `varint len, key, varint len, value` records. Records
//! are appended by the camera, so a later record for a key overrides an
//! earlier one and an empty value deletes the key. Integers are protobuf
//! varints; other value types are kept as opaque bytes.

use anyhow::{Context, Result, anyhow, bail};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use indexmap::IndexMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{KvEngine, KvEngineFactory};
use crate::constants::{mmkv, stores};

/// Opens [`MmkvStore`] instances
#[derive(Debug, Clone, Copy, Default)]
pub struct MmkvFactory;

impl KvEngineFactory for MmkvFactory {
    fn open(&self, dir: &Path, name: &str) -> Result<Box<dyn KvEngine>> {
        Ok(Box::new(MmkvStore::open(dir, name)?))
    }
}

/// One store file loaded into memory
#[derive(Debug)]
pub struct MmkvStore {
    path: PathBuf,
    crc_path: PathBuf,
    entries: IndexMap<String, Vec<u8>>,
    file_len: usize,
    dirty: bool,
}

impl MmkvStore {
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(name);
        let crc_path = dir.join(format!("{name}{}", stores::CRC_SUFFIX));

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read store {:?}", path)),
        };
        let entries = decode_file(&bytes).with_context(|| format!("Corrupt store {:?}", path))?;
        debug!(path = %path.display(), keys = entries.len(), bytes = bytes.len(), "Opened MMKV store");

        Ok(Self {
            path,
            crc_path,
            entries,
            file_len: bytes.len(),
            dirty: false,
        })
    }

    /// Write the compacted store and refresh its checksum sidecar
    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let payload = encode_payload(&self.entries);
        let used = mmkv::HEADER_LEN + payload.len();
        let padded = used.div_ceil(mmkv::PAGE_SIZE).max(1) * mmkv::PAGE_SIZE;

        let mut file = Vec::with_capacity(padded.max(self.file_len));
        file.write_u32::<LittleEndian>(payload.len() as u32)?;
        file.extend_from_slice(&payload);
        file.resize(padded.max(self.file_len), 0);

        fs::write(&self.path, &file).with_context(|| format!("Failed to write store {:?}", self.path))?;
        update_sidecar(&self.crc_path, &payload)?;

        info!(path = %self.path.display(), keys = self.entries.len(), payload = payload.len(), "Flushed MMKV store");
        self.file_len = file.len();
        self.dirty = false;
        Ok(())
    }
}

impl KvEngine for MmkvStore {
    fn encode_int(&mut self, key: &str, value: i32) -> Result<()> {
        if key.is_empty() {
            bail!("MMKV keys must not be empty");
        }
        let mut bytes = Vec::with_capacity(10);
        write_varint(&mut bytes, value as i64 as u64);
        self.entries.insert(key.to_string(), bytes);
        self.dirty = true;
        Ok(())
    }

    fn decode_int(&self, key: &str, default: i32) -> i32 {
        let Some(bytes) = self.entries.get(key) else {
            return default;
        };
        let mut reader = Reader::new(bytes);
        match reader.varint() {
            Ok(value) if reader.at_end() => value as i64 as i32,
            _ => default,
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush()
    }
}

fn decode_file(bytes: &[u8]) -> Result<IndexMap<String, Vec<u8>>> {
    if bytes.len() < mmkv::HEADER_LEN {
        return Ok(IndexMap::new());
    }
    let size = LittleEndian::read_u32(&bytes[..mmkv::HEADER_LEN]) as usize;
    let end = mmkv::HEADER_LEN
        .checked_add(size)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| anyhow!("payload size {} exceeds file length {}", size, bytes.len()))?;
    decode_payload(&bytes[mmkv::HEADER_LEN..end])
}

fn decode_payload(payload: &[u8]) -> Result<IndexMap<String, Vec<u8>>> {
    let mut entries = IndexMap::new();
    if payload.is_empty() {
        return Ok(entries);
    }

    let mut reader = Reader::new(payload);
    // size header, rewritten on every full write
    reader.varint()?;

    while !reader.at_end() {
        let key = reader.length_delimited()?;
        let key = String::from_utf8(key.to_vec()).context("key is not UTF-8")?;
        if key.is_empty() {
            bail!("empty key at offset {}", reader.pos);
        }
        let value = reader.length_delimited()?;
        if value.is_empty() {
            entries.shift_remove(&key);
        } else {
            entries.insert(key, value.to_vec());
        }
    }
    Ok(entries)
}

fn encode_payload(entries: &IndexMap<String, Vec<u8>>) -> Vec<u8> {
    let mut items = Vec::new();
    for (key, value) in entries {
        write_varint(&mut items, key.len() as u64);
        items.extend_from_slice(key.as_bytes());
        write_varint(&mut items, value.len() as u64);
        items.extend_from_slice(value);
    }

    let mut payload = Vec::with_capacity(items.len() + 5);
    write_varint(&mut payload, items.len() as u64);
    payload.extend_from_slice(&items);
    payload
}

/// Refresh the CRC (and for newer meta versions the size fields) in `<store>.crc`
///
/// A missing sidecar is left missing; the camera recreates it on next open.
fn update_sidecar(crc_path: &Path, payload: &[u8]) -> Result<()> {
    let mut meta = match fs::read(crc_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read sidecar {:?}", crc_path)),
    };
    if meta.len() < mmkv::META_CRC_OFFSET + 4 {
        warn!(path = %crc_path.display(), len = meta.len(), "Sidecar too short, leaving it untouched");
        return Ok(());
    }

    let digest = crc32fast::hash(payload);
    let size = payload.len() as u32;
    LittleEndian::write_u32(&mut meta[mmkv::META_CRC_OFFSET..], digest);

    let version = if meta.len() >= mmkv::META_VERSION_OFFSET + 4 {
        LittleEndian::read_u32(&meta[mmkv::META_VERSION_OFFSET..])
    } else {
        0
    };
    if version >= mmkv::META_VERSION_ACTUAL_SIZE && meta.len() >= mmkv::META_LAST_CRC_OFFSET + 4 {
        LittleEndian::write_u32(&mut meta[mmkv::META_ACTUAL_SIZE_OFFSET..], size);
        LittleEndian::write_u32(&mut meta[mmkv::META_LAST_ACTUAL_SIZE_OFFSET..], size);
        LittleEndian::write_u32(&mut meta[mmkv::META_LAST_CRC_OFFSET..], digest);
    }

    fs::write(crc_path, &meta).with_context(|| format!("Failed to write sidecar {:?}", crc_path))?;
    debug!(path = %crc_path.display(), crc = digest, version = version, "Updated store sidecar");
    Ok(())
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| anyhow!("truncated varint at offset {}", self.pos))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        bail!("varint longer than 10 bytes at offset {}", self.pos)
    }

    fn length_delimited(&mut self) -> Result<&'a [u8]> {
        let len = self.varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| anyhow!("record of {} bytes overruns payload at offset {}", len, self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}
