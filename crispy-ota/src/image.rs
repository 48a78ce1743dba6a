// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Application image format.
//!
//! Images use the ESP-IDF application layout:
//!
//! ```text
//! +---------------------+  0
//! | image header (24 B) |  magic, segment count, chip id, revision window
//! +---------------------+ 24
//! | segment header (8B) |  load address, data length
//! +---------------------+ 32
//! | app descriptor      |  first 256 bytes of the first segment
//! | ... segment data    |
//! +---------------------+
//! | more segments       |
//! | zero padding        |  up to the 16-byte aligned checksum byte
//! | checksum (1 B)      |  0xEF ^ xor of all segment data
//! | sha256 (32 B)       |  only when `hash_appended`
//! +---------------------+
//! ```

mod header;
mod verify;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OtaError;

pub use header::{
    AppDescriptor, HeaderParser, ImageHeader, SegmentHeader, APP_DESC_LEN, APP_DESC_MAGIC,
    IMAGE_HEADER_LEN, IMAGE_MAGIC, IMAGE_PREFIX_LEN, MAX_SEGMENTS, SEGMENT_HEADER_LEN,
};
pub use verify::{segment_checksum, ImageVerifier, CHECKSUM_SEED, DIGEST_LEN};

/// Chip identifier carried in the extended image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipId(pub u16);

impl ChipId {
    pub const ESP32: Self = Self(0x0000);
    pub const ESP32_S2: Self = Self(0x0002);
    pub const ESP32_C3: Self = Self(0x0005);
    pub const ESP32_S3: Self = Self(0x0009);
    pub const ESP32_C2: Self = Self(0x000C);
    pub const ESP32_C6: Self = Self(0x000D);
    pub const ESP32_H2: Self = Self(0x0010);
    pub const ESP32_P4: Self = Self(0x0012);
    pub const ESP32_C61: Self = Self(0x0014);
    pub const ESP32_C5: Self = Self(0x0017);

    const KNOWN: [(Self, &'static str); 10] = [
        (Self::ESP32, "esp32"),
        (Self::ESP32_S2, "esp32s2"),
        (Self::ESP32_C3, "esp32c3"),
        (Self::ESP32_S3, "esp32s3"),
        (Self::ESP32_C2, "esp32c2"),
        (Self::ESP32_C6, "esp32c6"),
        (Self::ESP32_H2, "esp32h2"),
        (Self::ESP32_P4, "esp32p4"),
        (Self::ESP32_C61, "esp32c61"),
        (Self::ESP32_C5, "esp32c5"),
    ];

    /// Lower-case chip name, if the id is a known one.
    pub fn name(self) -> Option<&'static str> {
        Self::KNOWN
            .iter()
            .find(|(id, _)| *id == self)
            .map(|(_, name)| *name)
    }

    /// Look up a chip by name (`esp32c3`, `ESP32-C3` and `esp32_c3` all match).
    pub fn from_name(name: &str) -> Option<Self> {
        let mut normalized = heapless::String::<16>::new();
        for c in name.chars().filter(|c| *c != '-' && *c != '_') {
            normalized.push(c.to_ascii_lowercase()).ok()?;
        }
        Self::KNOWN
            .iter()
            .find(|(_, known)| *known == normalized.as_str())
            .map(|(id, _)| *id)
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "chip 0x{:04x}", self.0),
        }
    }
}

/// Identity of the running device, checked against every incoming image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    pub chip: ChipId,
    /// Chip revision as `major * 100 + minor`.
    pub revision: u16,
}

/// `max_chip_rev_full` value meaning "no upper bound".
const REVISION_UNBOUNDED: u16 = u16::MAX;

impl DeviceIdentity {
    pub const fn new(chip: ChipId, revision: u16) -> Self {
        Self { chip, revision }
    }

    /// Refuse images built for another chip or outside this revision window.
    pub fn check(&self, header: &ImageHeader) -> Result<(), OtaError> {
        if header.chip != self.chip {
            error!(
                "image: built for chip 0x{:x}, device is 0x{:x}",
                header.chip.0,
                self.chip.0
            );
            return Err(OtaError::UnsupportedTarget);
        }

        if self.revision < header.min_chip_rev {
            error!(
                "image: needs chip revision >= {}, device is {}",
                header.min_chip_rev,
                self.revision
            );
            return Err(OtaError::UnsupportedTarget);
        }

        if header.max_chip_rev != REVISION_UNBOUNDED && self.revision > header.max_chip_rev {
            error!(
                "image: needs chip revision <= {}, device is {}",
                header.max_chip_rev,
                self.revision
            );
            return Err(OtaError::UnsupportedTarget);
        }

        Ok(())
    }
}
