// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image header, first segment header and application descriptor.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::{ChipId, DeviceIdentity};
use crate::error::OtaError;

pub const IMAGE_MAGIC: u8 = 0xE9;
pub const APP_DESC_MAGIC: u32 = 0xABCD_5432;

pub const IMAGE_HEADER_LEN: usize = 24;
pub const SEGMENT_HEADER_LEN: usize = 8;
pub const APP_DESC_LEN: usize = 256;

/// Bytes needed before the application descriptor can be read.
pub const IMAGE_PREFIX_LEN: usize = IMAGE_HEADER_LEN + SEGMENT_HEADER_LEN + APP_DESC_LEN;

/// Segment limit of the ESP-IDF bootloader.
pub const MAX_SEGMENTS: u8 = 16;

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C, packed)]
struct RawImageHeader {
    magic: u8,
    segment_count: u8,
    flash_mode: u8,
    flash_config: u8,
    entry: u32,
    wp_pin: u8,
    clk_q_drv: u8,
    d_cs_drv: u8,
    gd_wp_drv: u8,
    chip_id: u16,
    min_rev: u8,
    min_chip_rev_full: u16,
    max_chip_rev_full: u16,
    reserved: [u8; 4],
    hash_appended: u8,
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C, packed)]
struct RawSegmentHeader {
    addr: u32,
    length: u32,
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C, packed)]
struct RawAppDescriptor {
    magic_word: u32,
    secure_version: u32,
    reserv1: [u32; 2],
    version: [u8; 32],
    project_name: [u8; 32],
    time: [u8; 16],
    date: [u8; 16],
    idf_ver: [u8; 32],
    app_elf_sha256: [u8; 32],
    min_efuse_blk_rev_full: u16,
    max_efuse_blk_rev_full: u16,
    mmu_page_size: u8,
    reserv3: [u8; 3],
    reserv2: [u32; 18],
}

const _: () = assert!(core::mem::size_of::<RawImageHeader>() == IMAGE_HEADER_LEN);
const _: () = assert!(core::mem::size_of::<RawSegmentHeader>() == SEGMENT_HEADER_LEN);
const _: () = assert!(core::mem::size_of::<RawAppDescriptor>() == APP_DESC_LEN);

/// Decoded image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageHeader {
    pub segment_count: u8,
    pub flash_mode: u8,
    pub flash_config: u8,
    pub entry: u32,
    pub chip: ChipId,
    pub min_chip_rev: u16,
    pub max_chip_rev: u16,
    /// A SHA-256 digest of the image follows the checksum byte.
    pub hash_appended: bool,
}

impl ImageHeader {
    /// Header for `chip` with no revision constraints.
    pub fn new(chip: ChipId, segment_count: u8) -> Self {
        Self {
            segment_count,
            flash_mode: 0,
            flash_config: 0,
            entry: 0,
            chip,
            min_chip_rev: 0,
            max_chip_rev: u16::MAX,
            hash_appended: true,
        }
    }

    /// Decode and structurally validate the first [`IMAGE_HEADER_LEN`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, OtaError> {
        let raw: RawImageHeader = bytes
            .get(..IMAGE_HEADER_LEN)
            .map(bytemuck::pod_read_unaligned::<RawImageHeader>)
            .ok_or(OtaError::ImageValidationFailed)?;

        if raw.magic != IMAGE_MAGIC {
            error!("image: bad magic 0x{:x}", raw.magic);
            return Err(OtaError::ImageValidationFailed);
        }

        if raw.segment_count == 0 || raw.segment_count > MAX_SEGMENTS {
            error!("image: bad segment count {}", raw.segment_count);
            return Err(OtaError::ImageValidationFailed);
        }

        Ok(Self {
            segment_count: raw.segment_count,
            flash_mode: raw.flash_mode,
            flash_config: raw.flash_config,
            entry: raw.entry,
            chip: ChipId(raw.chip_id),
            min_chip_rev: raw.min_chip_rev_full,
            max_chip_rev: raw.max_chip_rev_full,
            hash_appended: raw.hash_appended == 1,
        })
    }

    /// Encode back to the on-flash layout.
    pub fn to_bytes(&self) -> [u8; IMAGE_HEADER_LEN] {
        let raw = RawImageHeader {
            magic: IMAGE_MAGIC,
            segment_count: self.segment_count,
            flash_mode: self.flash_mode,
            flash_config: self.flash_config,
            entry: self.entry,
            wp_pin: 0xEE,
            clk_q_drv: 0,
            d_cs_drv: 0,
            gd_wp_drv: 0,
            chip_id: self.chip.0,
            min_rev: (self.min_chip_rev / 100).min(u8::MAX as u16) as u8,
            min_chip_rev_full: self.min_chip_rev,
            max_chip_rev_full: self.max_chip_rev,
            reserved: [0; 4],
            hash_appended: self.hash_appended as u8,
        };
        bytemuck::cast(raw)
    }
}

/// Load address and length of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentHeader {
    pub load_addr: u32,
    pub data_len: u32,
}

impl SegmentHeader {
    pub fn parse(bytes: &[u8; SEGMENT_HEADER_LEN]) -> Self {
        let raw: RawSegmentHeader = bytemuck::pod_read_unaligned(bytes);
        Self {
            load_addr: raw.addr,
            data_len: raw.length,
        }
    }

    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_LEN] {
        bytemuck::cast(RawSegmentHeader {
            addr: self.load_addr,
            length: self.data_len,
        })
    }
}

/// Application descriptor embedded at the start of the first segment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub secure_version: u32,
    pub version: heapless::String<32>,
    pub project_name: heapless::String<32>,
    pub time: heapless::String<16>,
    pub date: heapless::String<16>,
    pub idf_version: heapless::String<32>,
    pub elf_sha256: [u8; 32],
    pub min_efuse_rev: u16,
    pub max_efuse_rev: u16,
    /// Chip the image was built for, copied from the image header.
    pub chip: ChipId,
}

impl AppDescriptor {
    /// Decode the descriptor bytes. `chip` comes from the image header.
    pub fn parse(bytes: &[u8; APP_DESC_LEN], chip: ChipId) -> Result<Self, OtaError> {
        let raw: RawAppDescriptor = bytemuck::pod_read_unaligned(bytes);

        if raw.magic_word != APP_DESC_MAGIC {
            let magic = raw.magic_word;
            error!("image: bad app descriptor magic 0x{:08x}", magic);
            return Err(OtaError::ImageValidationFailed);
        }

        Ok(Self {
            secure_version: raw.secure_version,
            version: c_string(&raw.version),
            project_name: c_string(&raw.project_name),
            time: c_string(&raw.time),
            date: c_string(&raw.date),
            idf_version: c_string(&raw.idf_ver),
            elf_sha256: raw.app_elf_sha256,
            min_efuse_rev: raw.min_efuse_blk_rev_full,
            max_efuse_rev: raw.max_efuse_blk_rev_full,
            chip,
        })
    }

    pub fn to_bytes(&self) -> [u8; APP_DESC_LEN] {
        let mut raw = RawAppDescriptor::zeroed();
        raw.magic_word = APP_DESC_MAGIC;
        raw.secure_version = self.secure_version;
        raw.version = c_bytes(&self.version);
        raw.project_name = c_bytes(&self.project_name);
        raw.time = c_bytes(&self.time);
        raw.date = c_bytes(&self.date);
        raw.idf_ver = c_bytes(&self.idf_version);
        raw.app_elf_sha256 = self.elf_sha256;
        raw.min_efuse_blk_rev_full = self.min_efuse_rev;
        raw.max_efuse_blk_rev_full = self.max_efuse_rev;
        bytemuck::cast(raw)
    }
}

/// NUL-terminated field to string. Invalid UTF-8 truncates at the first bad byte.
fn c_string<const N: usize>(field: &[u8; N]) -> heapless::String<N> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(N);
    let text = match core::str::from_utf8(&field[..end]) {
        Ok(text) => text,
        Err(err) => core::str::from_utf8(&field[..err.valid_up_to()]).unwrap_or_default(),
    };
    let mut out = heapless::String::new();
    // `text` is at most N bytes.
    let _ = out.push_str(text);
    out
}

fn c_bytes<const N: usize>(text: &heapless::String<N>) -> [u8; N] {
    let mut field = [0u8; N];
    field[..text.len()].copy_from_slice(text.as_bytes());
    field
}

/// Accumulates the image prefix until the header and descriptor are complete.
///
/// The chip check runs as soon as the 24-byte image header is in, so an image
/// for the wrong device is refused before anything reaches flash.
pub struct HeaderParser {
    buf: [u8; IMAGE_PREFIX_LEN],
    len: usize,
    header: Option<ImageHeader>,
    descriptor: Option<AppDescriptor>,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    pub const fn new() -> Self {
        Self {
            buf: [0; IMAGE_PREFIX_LEN],
            len: 0,
            header: None,
            descriptor: None,
        }
    }

    /// Take up to the missing prefix bytes from `data`; returns how many were used.
    pub fn feed(&mut self, data: &[u8], device: &DeviceIdentity) -> Result<usize, OtaError> {
        let take = data.len().min(IMAGE_PREFIX_LEN - self.len);
        self.buf[self.len..self.len + take].copy_from_slice(&data[..take]);
        self.len += take;

        if self.header.is_none() && self.len >= IMAGE_HEADER_LEN {
            let header = ImageHeader::parse(&self.buf[..IMAGE_HEADER_LEN])?;
            device.check(&header)?;
            debug!(
                "image: {} segment(s), chip 0x{:x}",
                header.segment_count,
                header.chip.0
            );
            self.header = Some(header);
        }

        if self.descriptor.is_none() && self.len == IMAGE_PREFIX_LEN {
            if let Some(header) = self.header {
                self.descriptor = Some(self.parse_descriptor(header.chip)?);
            }
        }

        Ok(take)
    }

    fn parse_descriptor(&self, chip: ChipId) -> Result<AppDescriptor, OtaError> {
        let mut seg = [0u8; SEGMENT_HEADER_LEN];
        seg.copy_from_slice(&self.buf[IMAGE_HEADER_LEN..IMAGE_HEADER_LEN + SEGMENT_HEADER_LEN]);
        let first = SegmentHeader::parse(&seg);
        if (first.data_len as usize) < APP_DESC_LEN {
            error!("image: first segment too short ({})", first.data_len);
            return Err(OtaError::ImageValidationFailed);
        }

        let mut desc = [0u8; APP_DESC_LEN];
        desc.copy_from_slice(&self.buf[IMAGE_HEADER_LEN + SEGMENT_HEADER_LEN..]);
        AppDescriptor::parse(&desc, chip)
    }

    /// Image header, once the first 24 bytes are in and accepted.
    pub fn header(&self) -> Option<&ImageHeader> {
        self.header.as_ref()
    }

    pub fn descriptor(&self) -> Option<&AppDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Prefix bytes gathered so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}
