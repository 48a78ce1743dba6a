// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand};

use crispy_ota::transport::MAX_URL_LEN;
use crispy_ota::{ChipId, HttpConfig, OtaConfig, PartialDownload};

use crate::commands;
use crate::settings::Settings;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "crispy-ota", version)]
#[command(about = "Over-the-network firmware update into a simulated A/B flash")]
pub struct Cli {
    /// Flash image file
    #[arg(short, long, default_value = "flash.bin")]
    pub flash: PathBuf,

    /// JSON settings file (layout and update options)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create an erased flash image sized for the layout
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Download an image into the inactive bank and make it the next boot target
    Fetch(FetchArgs),

    /// Check an image file without flashing it
    Inspect {
        /// Image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Also check compatibility with this chip (e.g. esp32c3)
        #[arg(long, value_parser = parse_chip)]
        chip: Option<ChipId>,

        /// Device chip revision for the compatibility check
        #[arg(long, default_value = "0")]
        revision: u16,
    },

    /// Show the boot record and bank contents
    Status,

    /// Mark the active bank as good
    Confirm,
}

/// Options of the `fetch` subcommand. Each one overrides the settings file.
#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Image URL (defaults to the settings file)
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Device chip (e.g. esp32c3)
    #[arg(long, value_parser = parse_chip)]
    pub chip: Option<ChipId>,

    /// Device chip revision as major * 100 + minor
    #[arg(long)]
    pub revision: Option<u16>,

    /// Erase the whole target bank before downloading
    #[arg(long)]
    pub bulk_erase: bool,

    /// Download with range requests of at most this many bytes
    #[arg(long, value_name = "BYTES")]
    pub range_size: Option<u32>,

    /// Bytes read per step
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Skip checksum and digest verification
    #[arg(long)]
    pub no_verify: bool,

    /// Print the image descriptor and abort without writing
    #[arg(long)]
    pub header_only: bool,

    /// Per-request timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u32>,
}

impl FetchArgs {
    /// Fold the command-line overrides into `config`.
    pub fn apply(&self, config: &mut OtaConfig) -> Result<()> {
        if let Some(url) = &self.url {
            let mut http = config.http.clone().unwrap_or_default();
            http.url.clear();
            http.url
                .push_str(url)
                .map_err(|_| anyhow!("URL longer than {} bytes", MAX_URL_LEN))?;
            config.http = Some(http);
        }
        let http = config.http.get_or_insert_with(HttpConfig::default);
        if let Some(timeout) = self.timeout {
            http.timeout_ms = timeout;
        }

        if let Some(chip) = self.chip {
            config.device.chip = chip;
        }
        if let Some(revision) = self.revision {
            config.device.revision = revision;
        }
        if self.bulk_erase {
            config.bulk_erase = true;
        }
        if let Some(size) = self.range_size {
            config.partial_download = Some(PartialDownload {
                max_request_size: size,
            });
        }
        if let Some(chunk) = self.chunk_size {
            config.read_chunk_size = chunk;
        }
        if self.no_verify {
            config.verify_image = false;
        }
        Ok(())
    }
}

/// Parse a chip name or a hex chip id (`0x5`).
fn parse_chip(s: &str) -> Result<ChipId, String> {
    if let Some(chip) = ChipId::from_name(s) {
        return Ok(chip);
    }
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| format!("unknown chip '{s}'"))?;
    u16::from_str_radix(hex, 16)
        .map(ChipId)
        .map_err(|e| format!("invalid chip id: {e}"))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { force } => commands::init(&cli.flash, &settings.layout, force),
        Commands::Fetch(args) => {
            let mut config = settings.ota.clone();
            args.apply(&mut config)?;
            commands::fetch(&cli.flash, &settings.layout, &config, args.header_only)
        }
        Commands::Inspect {
            file,
            chip,
            revision,
        } => commands::inspect(&file, chip, revision),
        Commands::Status => commands::status(&cli.flash, &settings.layout),
        Commands::Confirm => commands::confirm(&cli.flash, &settings.layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "crispy-ota",
            "-vv",
            "--flash",
            "dev.bin",
            "fetch",
            "https://example.com/app.bin",
            "--chip",
            "esp32-c3",
            "--range-size",
            "16384",
            "--bulk-erase",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.flash, PathBuf::from("dev.bin"));
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.chip, Some(ChipId::ESP32_C3));

        let mut config = OtaConfig::default();
        args.apply(&mut config).unwrap();
        assert_eq!(
            config.http.as_ref().map(|h| h.url.as_str()),
            Some("https://example.com/app.bin")
        );
        assert_eq!(config.device.chip, ChipId::ESP32_C3);
        assert_eq!(
            config.partial_download.map(|p| p.max_request_size),
            Some(16384)
        );
        assert!(config.bulk_erase);
        assert!(config.verify_image);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_keeps_settings_without_overrides() {
        let mut config = OtaConfig::new(
            HttpConfig::new("http://fw.local/a.bin").unwrap(),
            Default::default(),
        )
        .with_chunk_size(1024);
        let before = config.clone();

        FetchArgs::default().apply(&mut config).unwrap();
        assert_eq!(config, before);
    }

    #[test]
    fn test_parse_chip() {
        assert_eq!(parse_chip("esp32s3"), Ok(ChipId::ESP32_S3));
        assert_eq!(parse_chip("0x0042"), Ok(ChipId(0x42)));
        assert!(parse_chip("esp8266").is_err());
    }

    #[test]
    fn test_unknown_chip_is_rejected() {
        assert!(Cli::try_parse_from(["crispy-ota", "fetch", "--chip", "z80"]).is_err());
    }
}
