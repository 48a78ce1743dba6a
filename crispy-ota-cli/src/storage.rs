// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! File-backed flash simulation.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crispy_ota::{FlashError, FlashStorage, Region};

const ERASED: [u8; 4096] = [0xFF; 4096];

/// A flash chip stored in a regular file. Erased bytes read as `0xFF`.
pub struct FileFlash {
    file: File,
    size: u64,
    write_size: usize,
}

impl FileFlash {
    /// Create a fully erased flash image of `size` bytes.
    pub fn create(path: &Path, size: u64, write_size: usize) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut left = size;
        while left > 0 {
            let n = left.min(ERASED.len() as u64) as usize;
            file.write_all(&ERASED[..n])?;
            left -= n as u64;
        }
        file.flush()?;

        Ok(Self {
            file,
            size,
            write_size,
        })
    }

    /// Open an existing image, which must hold at least `min_size` bytes.
    pub fn open(path: &Path, min_size: u64, write_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| {
                format!(
                    "Failed to open {} (create it with 'crispy-ota init')",
                    path.display()
                )
            })?;
        let size = file.metadata()?.len();
        if size < min_size {
            bail!(
                "{} holds {} bytes, layout needs {}",
                path.display(),
                size,
                min_size
            );
        }

        Ok(Self {
            file,
            size,
            write_size,
        })
    }

    /// Second handle on the same file, for a separate owner such as the boot store.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            size: self.size,
            write_size: self.write_size,
        })
    }

    fn seek_to(&mut self, region: &Region, offset: u32, len: usize) -> Result<(), FlashError> {
        let at = u64::from(region.offset) + u64::from(offset);
        if !region.contains(offset, len as u32) || at + len as u64 > self.size {
            log::warn!("flash: access 0x{:08x}+{} outside the image", at, len);
            return Err(FlashError::OpFailed);
        }
        self.file.seek(SeekFrom::Start(at)).map_err(io_error)?;
        Ok(())
    }
}

fn io_error(err: io::Error) -> FlashError {
    log::warn!("flash: {}", err);
    match err.kind() {
        io::ErrorKind::TimedOut => FlashError::Timeout,
        _ => FlashError::OpFailed,
    }
}

impl FlashStorage for FileFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase(&mut self, region: &Region) -> Result<(), FlashError> {
        if !region.is_erase_aligned() {
            log::warn!("flash: unaligned erase at 0x{:08x}", region.offset);
            return Err(FlashError::OpFailed);
        }
        self.seek_to(region, 0, region.size as usize)?;

        let mut left = region.size as usize;
        while left > 0 {
            let n = left.min(ERASED.len());
            self.file.write_all(&ERASED[..n]).map_err(io_error)?;
            left -= n;
        }
        Ok(())
    }

    fn write(&mut self, region: &Region, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        if offset as usize % self.write_size != 0 || bytes.len() % self.write_size != 0 {
            log::warn!("flash: unaligned write at +0x{:x}", offset);
            return Err(FlashError::OpFailed);
        }
        self.seek_to(region, offset, bytes.len())?;
        self.file.write_all(bytes).map_err(io_error)
    }

    fn read(&mut self, region: &Region, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.seek_to(region, offset, buf.len())?;
        self.file.read_exact(buf).map_err(io_error)
    }
}
