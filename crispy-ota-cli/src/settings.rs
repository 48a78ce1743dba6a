// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash layout and update settings, optionally loaded from a JSON file.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crispy_ota::region::DEFAULT_ERASE_SIZE;
use crispy_ota::{OtaConfig, Region};

/// Where the boot record and the two banks live in the flash image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub boot: Region,
    pub bank_a: Region,
    pub bank_b: Region,
    /// Program granularity of the simulated flash.
    pub write_size: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            boot: Region::new(0x0000_9000, 0x1000, DEFAULT_ERASE_SIZE),
            bank_a: Region::new(0x0001_0000, 0x0010_0000, DEFAULT_ERASE_SIZE),
            bank_b: Region::new(0x0011_0000, 0x0010_0000, DEFAULT_ERASE_SIZE),
            write_size: 4,
        }
    }
}

impl Layout {
    pub fn banks(&self) -> [Region; 2] {
        [self.bank_a, self.bank_b]
    }

    /// Bytes needed to hold every region.
    pub fn flash_size(&self) -> u64 {
        [self.boot, self.bank_a, self.bank_b]
            .iter()
            .map(|r| u64::from(r.end()))
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("boot", self.boot),
            ("bank A", self.bank_a),
            ("bank B", self.bank_b),
        ];
        for (name, region) in named {
            if region.checked_end().is_none() {
                bail!(
                    "{} region 0x{:08x}+0x{:x} runs past the 32-bit address space",
                    name,
                    region.offset,
                    region.size
                );
            }
            if region.size == 0 || !region.is_erase_aligned() {
                bail!(
                    "{} region 0x{:08x}+0x{:x} is not erase aligned",
                    name,
                    region.offset,
                    region.size
                );
            }
        }
        for (i, (name_a, a)) in named.iter().enumerate() {
            for (name_b, b) in &named[i + 1..] {
                if a.offset < b.end() && b.offset < a.end() {
                    bail!("{} and {} regions overlap", name_a, name_b);
                }
            }
        }
        if self.write_size == 0 || self.write_size > crispy_ota::flash::MAX_WRITE_SIZE {
            bail!("unsupported write size {}", self.write_size);
        }
        Ok(())
    }
}

/// Contents of the `--config` file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub layout: Layout,
    pub ota: OtaConfig,
}

impl Settings {
    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid settings in {}", path.display()))?
            }
            None => Self::default(),
        };
        settings.layout.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        let layout = Layout::default();
        layout.validate().unwrap();
        assert_eq!(layout.flash_size(), 0x0021_0000);
    }

    #[test]
    fn test_overlapping_layout_is_rejected() {
        let mut layout = Layout::default();
        layout.bank_b = layout.bank_a;
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_region_past_address_space_is_rejected() {
        let mut layout = Layout::default();
        layout.bank_b = Region::new(0xFFFF_F000, 0x2000, DEFAULT_ERASE_SIZE);
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("address space"));
    }

    #[test]
    fn test_partial_settings_file() {
        let json = r#"{
            "layout": { "write_size": 16 },
            "ota": { "bulk_erase": true, "partial_download": { "max_request_size": 8192 } }
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.layout.write_size, 16);
        assert_eq!(settings.layout.bank_a, Layout::default().bank_a);
        assert!(settings.ota.bulk_erase);
        assert_eq!(
            settings.ota.partial_download.map(|p| p.max_request_size),
            Some(8192)
        );
        assert!(settings.ota.verify_image);
        assert!(settings.ota.http.is_none());
    }

    #[test]
    fn test_load_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
