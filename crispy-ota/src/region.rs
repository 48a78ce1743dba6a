// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash region descriptors.

use serde::{Deserialize, Serialize};

/// Default erase unit (one 4 KiB sector).
pub const DEFAULT_ERASE_SIZE: u32 = 4096;

/// A contiguous flash area: an update bank, the boot-data sector, or a
/// sub-range of either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    /// Absolute flash offset of the first byte.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
    /// Erase granularity of the underlying flash.
    pub erase_size: u32,
}

impl Region {
    pub const fn new(offset: u32, size: u32, erase_size: u32) -> Self {
        Self {
            offset,
            size,
            erase_size,
        }
    }

    /// Absolute offset one past the last byte, saturating at `u32::MAX`.
    pub const fn end(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }

    /// Like [`end`](Self::end), but `None` when the region runs past the
    /// 32-bit address space.
    pub const fn checked_end(&self) -> Option<u32> {
        self.offset.checked_add(self.size)
    }

    /// Whether `len` bytes starting at the relative `offset` lie inside the region.
    pub fn contains(&self, offset: u32, len: u32) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size)
    }

    /// Whether both ends of the region fall on erase boundaries.
    pub fn is_erase_aligned(&self) -> bool {
        self.erase_size != 0
            && self.offset % self.erase_size == 0
            && self.size % self.erase_size == 0
    }

    /// Relative sub-range of this region, or `None` if it does not fit.
    pub fn sub(&self, offset: u32, len: u32) -> Option<Region> {
        if !self.contains(offset, len) {
            return None;
        }
        Some(Region {
            offset: self.offset + offset,
            size: len,
            erase_size: self.erase_size,
        })
    }

    /// Round `len` up to the next erase boundary, clamped to the region size.
    pub fn erase_span(&self, len: u32) -> u32 {
        align_up(len, self.erase_size).min(self.size)
    }
}

/// Round `value` up to a multiple of `align` (`align` of zero is a no-op).
pub fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align).saturating_mul(align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_near_address_space_limit() {
        let region = Region::new(0xFFFF_F000, 0x2000, DEFAULT_ERASE_SIZE);
        assert_eq!(region.checked_end(), None);
        assert_eq!(region.end(), u32::MAX);

        let last = Region::new(0xFFFF_E000, 0x1000, DEFAULT_ERASE_SIZE);
        assert_eq!(last.checked_end(), Some(0xFFFF_F000));
        assert_eq!(Region::new(0x1000, 0x1000, 0).checked_end(), Some(0x2000));
    }

    #[test]
    fn test_sub_stays_inside() {
        let region = Region::new(0x10000, 0x1000, DEFAULT_ERASE_SIZE);
        assert_eq!(
            region.sub(0x100, 0x200),
            Some(Region::new(0x10100, 0x200, DEFAULT_ERASE_SIZE))
        );
        assert_eq!(region.sub(0xF00, 0x200), None);
        assert_eq!(region.sub(u32::MAX, 2), None);
    }
}
