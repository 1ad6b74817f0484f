//! # Boot File Codec
//!
//! The boot file (`<index>.boot`) carries the tree metadata that is not
//! recoverable from the index file alone. It is a flat sequence of 16-byte
//! big-endian unsigned records:
//!
//! ```text
//! Record  Content
//! ------  ---------------------------------------------
//! 0       root offset (INVALID_OFFSET for an empty tree)
//! 1       block size
//! 2       file size
//! 3..     free-block offsets
//! last    INVALID_OFFSET terminator
//! ```
//!
//! The three fixed records are read unconditionally — the root offset is
//! allowed to be the sentinel — and only the free-list tail is
//! sentinel-terminated. A missing boot file means a fresh tree.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use eyre::{bail, ensure, Result, WrapErr};

use crate::config::INVALID_OFFSET;

/// Width of one boot record on disk.
pub const BOOT_RECORD_SIZE: usize = 16;

/// In-memory image of the boot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRecord {
    pub root: u64,
    pub block_size: u64,
    pub file_size: u64,
    pub free_blocks: Vec<u64>,
}

impl BootRecord {
    /// Loads the boot file at `path`; `Ok(None)` when no boot file exists.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("failed to read boot file {:?}", path))
            }
        };

        ensure!(
            bytes.len() % BOOT_RECORD_SIZE == 0,
            "boot file {:?} length {} is not a multiple of {}",
            path,
            bytes.len(),
            BOOT_RECORD_SIZE
        );

        let mut records = bytes
            .chunks_exact(BOOT_RECORD_SIZE)
            .map(decode_record);

        let root = match records.next() {
            Some(r) => r?,
            None => bail!("boot file {:?} is empty", path),
        };
        let block_size = match records.next() {
            Some(r) => r?,
            None => bail!("boot file {:?} is missing the block size record", path),
        };
        let file_size = match records.next() {
            Some(r) => r?,
            None => bail!("boot file {:?} is missing the file size record", path),
        };

        let mut free_blocks = Vec::new();
        for record in records {
            let offset = record?;
            if offset == INVALID_OFFSET {
                break;
            }
            free_blocks.push(offset);
        }

        Ok(Some(Self {
            root,
            block_size,
            file_size,
            free_blocks,
        }))
    }

    /// Writes the boot file at `path`, replacing any previous contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut bytes =
            Vec::with_capacity((4 + self.free_blocks.len()) * BOOT_RECORD_SIZE);

        encode_record(&mut bytes, self.root);
        encode_record(&mut bytes, self.block_size);
        encode_record(&mut bytes, self.file_size);
        for &offset in &self.free_blocks {
            encode_record(&mut bytes, offset);
        }
        encode_record(&mut bytes, INVALID_OFFSET);

        fs::write(path, &bytes)
            .wrap_err_with(|| format!("failed to write boot file {:?}", path))
    }
}

fn decode_record(chunk: &[u8]) -> Result<u64> {
    let raw = u128::from_be_bytes(chunk.try_into().unwrap());
    ensure!(
        raw <= u64::MAX as u128,
        "boot record {:#x} does not fit in 64 bits",
        raw
    );
    Ok(raw as u64)
}

fn encode_record(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&(value as u128).to_be_bytes());
}
