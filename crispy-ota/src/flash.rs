// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash storage interface and the sequential image writer.

use crate::error::{FlashError, OtaError};
use crate::region::Region;

/// Largest program granularity the writer can buffer.
pub const MAX_WRITE_SIZE: usize = 256;

/// Raw flash access. Offsets are relative to the region passed alongside;
/// erase regions are erase-aligned.
pub trait FlashStorage {
    /// Program granularity in bytes. Writes are always a multiple of this.
    fn write_size(&self) -> usize;

    /// Erase every sector covered by `region`.
    fn erase(&mut self, region: &Region) -> Result<(), FlashError>;

    /// Program `bytes` at `offset` within `region`. The range must be erased.
    fn write(&mut self, region: &Region, offset: u32, bytes: &[u8]) -> Result<(), FlashError>;

    fn read(&mut self, region: &Region, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

impl<F: FlashStorage + ?Sized> FlashStorage for &mut F {
    fn write_size(&self) -> usize {
        (**self).write_size()
    }

    fn erase(&mut self, region: &Region) -> Result<(), FlashError> {
        (**self).erase(region)
    }

    fn write(&mut self, region: &Region, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        (**self).write(region, offset, bytes)
    }

    fn read(&mut self, region: &Region, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(region, offset, buf)
    }
}

/// When the target region gets erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseMode {
    /// The whole region up front.
    Bulk,
    /// Sector by sector, just ahead of the write cursor.
    Incremental,
}

/// Writes an image sequentially into a region.
///
/// Bytes that do not fill a whole program unit are held back until more data
/// arrives or [`FlashWriter::flush`] pads them with `0xFF`. The cursor only
/// moves forward and never leaves the region.
pub struct FlashWriter<'a, F: FlashStorage + ?Sized> {
    flash: &'a mut F,
    region: Region,
    mode: EraseMode,
    write_size: usize,
    /// Image bytes handed to `write`.
    accepted: u32,
    /// Bytes programmed, relative to the region start. Includes flush padding.
    written: u32,
    /// Bytes erased, relative to the region start.
    erased: u32,
    tail: heapless::Vec<u8, MAX_WRITE_SIZE>,
}

impl<'a, F: FlashStorage + ?Sized> FlashWriter<'a, F> {
    pub fn new(flash: &'a mut F, region: Region, mode: EraseMode) -> Result<Self, OtaError> {
        let write_size = flash.write_size();
        if write_size == 0 || write_size > MAX_WRITE_SIZE {
            error!("flash: unsupported write size {}", write_size);
            return Err(OtaError::InvalidArgument);
        }

        if !region.is_erase_aligned() {
            error!(
                "flash: region 0x{:08x}+{} not erase aligned",
                region.offset,
                region.size
            );
            return Err(OtaError::InvalidArgument);
        }

        Ok(Self {
            flash,
            region,
            mode,
            write_size,
            accepted: 0,
            written: 0,
            erased: 0,
            tail: heapless::Vec::new(),
        })
    }

    /// Erase the whole region. Called once before the first write in bulk mode.
    pub fn erase_all(&mut self) -> Result<(), OtaError> {
        debug!(
            "flash: erasing 0x{:08x}+{}",
            self.region.offset,
            self.region.size
        );
        self.flash.erase(&self.region)?;
        self.erased = self.region.size;
        Ok(())
    }

    /// Append `data` to the image.
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), OtaError> {
        if !self.region.contains(self.accepted, data.len() as u32) {
            error!(
                "flash: image exceeds region ({} + {} > {})",
                self.accepted,
                data.len(),
                self.region.size
            );
            return Err(OtaError::ImageValidationFailed);
        }
        self.accepted += data.len() as u32;

        // Complete a partial program unit first.
        if !self.tail.is_empty() {
            let take = (self.write_size - self.tail.len()).min(data.len());
            let _ = self.tail.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.tail.len() == self.write_size {
                self.program_tail()?;
            }
        }

        let aligned = data.len() - data.len() % self.write_size;
        if aligned > 0 {
            self.program(&data[..aligned])?;
        }

        // Fewer than `write_size` bytes remain.
        let _ = self.tail.extend_from_slice(&data[aligned..]);
        Ok(())
    }

    /// Program any held-back bytes, padded with `0xFF`.
    pub fn flush(&mut self) -> Result<(), OtaError> {
        if self.tail.is_empty() {
            return Ok(());
        }
        trace!("flash: padding {} trailing byte(s)", self.tail.len());
        let _ = self.tail.resize(self.write_size, 0xFF);
        self.program_tail()
    }

    /// Bytes handed to [`FlashWriter::write`], including held-back ones.
    pub fn bytes_accepted(&self) -> u32 {
        self.accepted
    }

    /// Bytes actually programmed, flush padding included.
    pub fn bytes_programmed(&self) -> u32 {
        self.written
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    fn program_tail(&mut self) -> Result<(), OtaError> {
        let mut unit = [0xFFu8; MAX_WRITE_SIZE];
        let len = self.tail.len();
        unit[..len].copy_from_slice(&self.tail);
        self.tail.clear();
        self.program(&unit[..len])
    }

    fn program(&mut self, bytes: &[u8]) -> Result<(), OtaError> {
        let end = self.written + bytes.len() as u32;
        self.ensure_erased(end)?;
        self.flash.write(&self.region, self.written, bytes)?;
        self.written = end;
        Ok(())
    }

    fn ensure_erased(&mut self, end: u32) -> Result<(), OtaError> {
        if end <= self.erased {
            return Ok(());
        }
        if self.mode == EraseMode::Bulk {
            // Bulk mode erases in `erase_all`; anything past it is a logic error.
            return Err(OtaError::InvalidState);
        }

        let span = self.region.erase_span(end);
        let sectors = self
            .region
            .sub(self.erased, span - self.erased)
            .ok_or(OtaError::ImageValidationFailed)?;
        trace!("flash: erasing 0x{:08x}+{}", sectors.offset, sectors.size);
        self.flash.erase(&sectors)?;
        self.erased = span;
        Ok(())
    }
}

#[cfg(feature = "embedded-storage")]
pub use nor::NorFlashStorage;

#[cfg(feature = "embedded-storage")]
mod nor {
    use embedded_storage::nor_flash::NorFlash;

    use super::FlashStorage;
    use crate::error::FlashError;
    use crate::region::Region;

    /// [`FlashStorage`] over any `embedded-storage` NOR flash driver.
    pub struct NorFlashStorage<F> {
        inner: F,
    }

    impl<F: NorFlash> NorFlashStorage<F> {
        pub fn new(inner: F) -> Self {
            Self { inner }
        }

        /// Erase granularity reported by the driver.
        pub fn erase_size(&self) -> u32 {
            F::ERASE_SIZE as u32
        }

        pub fn into_inner(self) -> F {
            self.inner
        }
    }

    impl<F: NorFlash> FlashStorage for NorFlashStorage<F> {
        fn write_size(&self) -> usize {
            F::WRITE_SIZE
        }

        fn erase(&mut self, region: &Region) -> Result<(), FlashError> {
            self.inner.erase(region.offset, region.end()).map_err(|_| {
                warn!("flash: erase 0x{:08x}+{} failed", region.offset, region.size);
                FlashError::OpFailed
            })
        }

        fn write(&mut self, region: &Region, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
            let at = absolute(region, offset, bytes.len())?;
            self.inner.write(at, bytes).map_err(|_| {
                warn!("flash: write at 0x{:08x} failed", at);
                FlashError::OpFailed
            })
        }

        fn read(&mut self, region: &Region, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            let at = absolute(region, offset, buf.len())?;
            self.inner.read(at, buf).map_err(|_| {
                warn!("flash: read at 0x{:08x} failed", at);
                FlashError::OpFailed
            })
        }
    }

    fn absolute(region: &Region, offset: u32, len: usize) -> Result<u32, FlashError> {
        if !region.contains(offset, len as u32) {
            warn!("flash: access outside region at +0x{:x}", offset);
            return Err(FlashError::OpFailed);
        }
        Ok(region.offset + offset)
    }
}
