//! # Positioned Block I/O
//!
//! One block per read, one block per write, always at a block-aligned offset.
//! The file handle is never seeked; all access goes through the positioned
//! `read_exact_at`/`write_all_at` calls so a failed operation cannot leave a
//! stray cursor behind.
//!
//! Short reads and writes are I/O failures, not recoverable conditions: the
//! caller aborts the operation and surfaces the error. There is no journaling
//! and no retry.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

/// Read/write handle over the index file, in fixed-size block units.
#[derive(Debug)]
pub struct BlockFile {
    file: File,
    path: PathBuf,
    block_size: usize,
}

impl BlockFile {
    /// Opens (or creates) the index file at `path`.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open index file {:?}", path))?;

        Ok(Self {
            file,
            path,
            block_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Reads the block at `offset` into `buf`.
    pub fn read_block(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_offset(offset)?;
        ensure!(
            buf.len() == self.block_size,
            "block buffer is {} bytes, block size is {}",
            buf.len(),
            self.block_size
        );

        self.file
            .read_exact_at(buf, offset)
            .wrap_err_with(|| format!("short read of block at offset {}", offset))
    }

    /// Writes `buf` as the block at `offset`, extending the file if needed.
    pub fn write_block(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.check_offset(offset)?;
        ensure!(
            buf.len() == self.block_size,
            "block buffer is {} bytes, block size is {}",
            buf.len(),
            self.block_size
        );

        self.file
            .write_all_at(buf, offset)
            .wrap_err_with(|| format!("short write of block at offset {}", offset))
    }

    /// Shrinks (or grows) the file to exactly `len` bytes.
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .wrap_err_with(|| format!("failed to truncate {:?} to {} bytes", self.path, len))
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync {:?}", self.path))
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn check_offset(&self, offset: u64) -> Result<()> {
        ensure!(
            offset % self.block_size as u64 == 0,
            "offset {} is not aligned to block size {}",
            offset,
            self.block_size
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BS: usize = 128;

    fn open_test_file() -> (tempfile::TempDir, BlockFile) {
        let dir = tempdir().unwrap();
        let file = BlockFile::open(dir.path().join("test.index"), BS).unwrap();
        (dir, file)
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_dir, file) = open_test_file();

        let mut block = vec![0u8; BS];
        block[0] = 0xAB;
        block[BS - 1] = 0xCD;
        file.write_block(0, &block).unwrap();

        let mut read = vec![0u8; BS];
        file.read_block(0, &mut read).unwrap();
        assert_eq!(read, block);
    }

    #[test]
    fn write_extends_file() {
        let (_dir, file) = open_test_file();

        let block = vec![0x11u8; BS];
        file.write_block(3 * BS as u64, &block).unwrap();

        assert_eq!(file.len().unwrap(), 4 * BS as u64);
    }

    #[test]
    fn read_past_end_fails() {
        let (_dir, file) = open_test_file();

        let mut buf = vec![0u8; BS];
        assert!(file.read_block(0, &mut buf).is_err());
    }

    #[test]
    fn unaligned_offset_rejected() {
        let (_dir, file) = open_test_file();

        let mut buf = vec![0u8; BS];
        let err = file.read_block(13, &mut buf).unwrap_err();
        assert!(err.to_string().contains("not aligned"));
    }

    #[test]
    fn wrong_buffer_size_rejected() {
        let (_dir, file) = open_test_file();

        let mut buf = vec![0u8; BS / 2];
        assert!(file.read_block(0, &mut buf).is_err());
    }

    #[test]
    fn truncate_reclaims_tail() {
        let (_dir, file) = open_test_file();

        let block = vec![0u8; BS];
        file.write_block(0, &block).unwrap();
        file.write_block(BS as u64, &block).unwrap();

        file.truncate(BS as u64).unwrap();
        assert_eq!(file.len().unwrap(), BS as u64);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.index");

        {
            let file = BlockFile::open(&path, BS).unwrap();
            let mut block = vec![0u8; BS];
            block[7] = 0x77;
            file.write_block(0, &block).unwrap();
            file.sync().unwrap();
        }

        let file = BlockFile::open(&path, BS).unwrap();
        let mut read = vec![0u8; BS];
        file.read_block(0, &mut read).unwrap();
        assert_eq!(read[7], 0x77);
    }
}
