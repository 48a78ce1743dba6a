// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot target selection.
//!
//! [`BootStore`] is what the update engine needs from the platform: where the
//! running image lives, where the next image may go, and a way to make the
//! bootloader start from a freshly written region. [`BankTable`] implements it
//! for a classic A/B layout with a boot-data sector.

use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};

use crate::error::BootStoreError;
use crate::flash::{FlashStorage, MAX_WRITE_SIZE};
use crate::region::{align_up, Region};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const BOOT_DATA_MAGIC: u32 = 0xB007_DA7A;

/// Encoded record size limit: length byte, postcard body, CRC-32.
pub const BOOT_RECORD_LEN: usize = 64;

/// Size and checksum of an image handed to the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootImage {
    pub size: u32,
    /// CRC-32 (ISO-HDLC) over the `size` bytes written to the bank.
    pub crc32: u32,
}

pub trait BootStore {
    /// Region the device is currently running from.
    fn current_region(&self) -> Region;

    /// Region an update may be written to, if any.
    fn next_updatable_region(&self) -> Option<Region>;

    /// Make `region` the boot target for the next reset.
    fn set_next_boot(&mut self, region: &Region, image: &BootImage) -> Result<(), BootStoreError>;
}

/// Persistent boot record shared with the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootData {
    pub magic: u32,
    /// 0 = bank A, 1 = bank B.
    pub active_bank: u8,
    /// Set by the application once the new image has proven itself.
    pub confirmed: bool,
    /// Boots of an unconfirmed image; the bootloader rolls back past its limit.
    pub boot_attempts: u8,
    /// Incremented on every boot target change.
    pub sequence: u32,
    pub image_a: BootImage,
    pub image_b: BootImage,
}

impl Default for BootData {
    fn default() -> Self {
        Self::default_new()
    }
}

impl BootData {
    /// Fresh record booting bank A.
    pub const fn default_new() -> Self {
        Self {
            magic: BOOT_DATA_MAGIC,
            active_bank: 0,
            confirmed: true,
            boot_attempts: 0,
            sequence: 0,
            image_a: BootImage { size: 0, crc32: 0 },
            image_b: BootImage { size: 0, crc32: 0 },
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == BOOT_DATA_MAGIC && self.active_bank < 2
    }

    pub fn image(&self, bank: u8) -> &BootImage {
        if bank == 0 {
            &self.image_a
        } else {
            &self.image_b
        }
    }

    /// Point the record at `bank`, unconfirmed.
    pub fn select(&mut self, bank: u8, image: BootImage) {
        self.active_bank = bank;
        self.confirmed = false;
        self.boot_attempts = 0;
        self.sequence = self.sequence.wrapping_add(1);
        if bank == 0 {
            self.image_a = image;
        } else {
            self.image_b = image;
        }
    }

    /// Encode as `len | postcard body | crc32(body)`.
    pub fn encode(&self, buf: &mut [u8; BOOT_RECORD_LEN]) -> Result<usize, BootStoreError> {
        let body_len = postcard::to_slice(self, &mut buf[1..BOOT_RECORD_LEN - 4])
            .map_err(|_| BootStoreError::Encode)?
            .len();
        buf[0] = body_len as u8;
        let crc = CRC32.checksum(&buf[1..1 + body_len]);
        buf[1 + body_len..5 + body_len].copy_from_slice(&crc.to_le_bytes());
        Ok(body_len + 5)
    }

    /// Decode a record written by [`BootData::encode`]. `None` for erased,
    /// corrupt or foreign data.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let body_len = *bytes.first()? as usize;
        if body_len == 0 || body_len > BOOT_RECORD_LEN - 5 {
            return None;
        }
        let body = bytes.get(1..1 + body_len)?;
        let stored = bytes.get(1 + body_len..5 + body_len)?;
        if CRC32.checksum(body).to_le_bytes() != stored {
            return None;
        }
        postcard::from_bytes::<BootData>(body)
            .ok()
            .filter(BootData::is_valid)
    }
}

/// A/B bank layout with a dedicated boot-data sector.
pub struct BankTable<F: FlashStorage> {
    flash: F,
    banks: [Region; 2],
    boot_region: Region,
    data: BootData,
    /// Bank the device booted from; fixed for the lifetime of the table.
    running: u8,
}

impl<F: FlashStorage> BankTable<F> {
    /// Load the boot record. A missing or corrupt record falls back to bank A.
    pub fn open(
        mut flash: F,
        banks: [Region; 2],
        boot_region: Region,
    ) -> Result<Self, BootStoreError> {
        let mut buf = [0xFFu8; BOOT_RECORD_LEN];
        flash.read(&boot_region, 0, &mut buf)?;

        let data = match BootData::decode(&buf) {
            Some(data) => data,
            None => {
                warn!("boot: no valid boot record, defaulting to bank A");
                BootData::default_new()
            }
        };
        info!(
            "boot: bank {} active (sequence {})",
            data.active_bank,
            data.sequence
        );

        Ok(Self {
            flash,
            banks,
            boot_region,
            running: data.active_bank,
            data,
        })
    }

    pub fn boot_data(&self) -> &BootData {
        &self.data
    }

    pub fn banks(&self) -> &[Region; 2] {
        &self.banks
    }

    pub fn bank_index(&self, region: &Region) -> Option<u8> {
        self.banks
            .iter()
            .position(|bank| bank == region)
            .map(|index| index as u8)
    }

    /// Mark the active image as good.
    pub fn confirm(&mut self) -> Result<(), BootStoreError> {
        if self.data.confirmed {
            return Ok(());
        }
        let mut data = self.data;
        data.confirmed = true;
        data.boot_attempts = 0;
        self.persist(&data)?;
        self.data = data;
        Ok(())
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    fn persist(&mut self, data: &BootData) -> Result<(), BootStoreError> {
        let mut record = [0xFFu8; BOOT_RECORD_LEN];
        let len = data.encode(&mut record)?;

        let write_size = self.flash.write_size().max(1);
        let padded = align_up(len as u32, write_size as u32) as usize;
        if padded > MAX_WRITE_SIZE || padded > self.boot_region.size as usize {
            return Err(BootStoreError::Encode);
        }
        let mut page = [0xFFu8; MAX_WRITE_SIZE];
        page[..len].copy_from_slice(&record[..len]);

        self.flash.erase(&self.boot_region)?;
        self.flash.write(&self.boot_region, 0, &page[..padded])?;
        Ok(())
    }
}

impl<F: FlashStorage> BootStore for BankTable<F> {
    fn current_region(&self) -> Region {
        self.banks[self.running as usize]
    }

    fn next_updatable_region(&self) -> Option<Region> {
        Some(self.banks[1 - self.running as usize])
    }

    fn set_next_boot(&mut self, region: &Region, image: &BootImage) -> Result<(), BootStoreError> {
        let bank = self.bank_index(region).ok_or_else(|| {
            error!("boot: 0x{:08x} is not a bank", region.offset);
            BootStoreError::UnknownRegion
        })?;

        let mut data = self.data;
        data.select(bank, *image);
        self.persist(&data)?;
        self.data = data;

        info!(
            "boot: next boot from bank {} ({} bytes, crc 0x{:08x})",
            bank,
            image.size,
            image.crc32
        );
        Ok(())
    }
}
