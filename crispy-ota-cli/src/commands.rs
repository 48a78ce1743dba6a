// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use crispy_ota::image::{HeaderParser, ImageVerifier};
use crispy_ota::{
    AppDescriptor, BankTable, BootStore, ChipId, DeviceIdentity, FlashStorage, ImageHeader,
    OtaConfig, OtaError, OtaEvent, StepOutcome, Updater,
};

use crate::settings::Layout;
use crate::storage::FileFlash;
use crate::transport::HttpTransport;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn bank_name(index: usize) -> &'static str {
    if index == 0 {
        "A"
    } else {
        "B"
    }
}

fn open_flash(path: &Path, layout: &Layout) -> Result<FileFlash> {
    FileFlash::open(path, layout.flash_size(), layout.write_size)
}

fn open_banks<F: FlashStorage>(flash: F, layout: &Layout) -> Result<BankTable<F>> {
    BankTable::open(flash, layout.banks(), layout.boot)
        .map_err(OtaError::from)
        .context("Failed to read the boot record")
}

/// Descriptor of the image at the start of `bytes`, if there is one.
fn describe(bytes: &[u8]) -> Option<AppDescriptor> {
    let header = ImageHeader::parse(bytes).ok()?;
    let mut parser = HeaderParser::new();
    parser
        .feed(bytes, &DeviceIdentity::new(header.chip, header.min_chip_rev))
        .ok()?;
    parser.descriptor().cloned()
}

fn print_descriptor(descriptor: &AppDescriptor) {
    println!("  Project:     {}", descriptor.project_name);
    println!("  Version:     {}", descriptor.version);
    println!("  Chip:        {}", descriptor.chip);
    println!("  Built:       {} {}", descriptor.date, descriptor.time);
    println!("  IDF:         {}", descriptor.idf_version);
    println!("  Secure ver.: {}", descriptor.secure_version);
}

/// Create an erased flash image.
pub fn init(path: &Path, layout: &Layout, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    let size = layout.flash_size();
    FileFlash::create(path, size, layout.write_size)?;

    println!("Created {} ({} bytes)", path.display(), size);
    println!(
        "  Boot record: 0x{:08x}..0x{:08x}",
        layout.boot.offset,
        layout.boot.end()
    );
    for (index, bank) in layout.banks().iter().enumerate() {
        println!(
            "  Bank {}:      0x{:08x}..0x{:08x}",
            bank_name(index),
            bank.offset,
            bank.end()
        );
    }
    Ok(())
}

/// Download an image into the inactive bank and switch the boot target to it.
pub fn fetch(path: &Path, layout: &Layout, config: &OtaConfig, header_only: bool) -> Result<()> {
    let http = config.validate()?;
    println!("Source:   {}", http.url);

    let mut flash = open_flash(path, layout)?;
    let mut banks = open_banks(flash.try_clone()?, layout)?;
    let mut transport = HttpTransport::new()?;
    let mut events = |event: OtaEvent| log::debug!("event: {:?}", event);

    let mut session = Updater::new(&mut transport, &mut flash, &mut banks)
        .with_events(&mut events)
        .begin(config)
        .context("Failed to start the update")?;

    let target = *session.target_region();
    println!(
        "Target:   0x{:08x} ({} bytes{})",
        target.offset,
        target.size,
        if config.bulk_erase { ", erased" } else { "" }
    );

    let descriptor = match session.parse_header() {
        Ok(descriptor) => descriptor.clone(),
        Err(err) => {
            let _ = session.abort();
            return Err(err).context("Image header rejected");
        }
    };
    println!("Image:");
    print_descriptor(&descriptor);
    println!();

    if header_only {
        session.abort()?;
        println!("Header only, nothing written");
        return Ok(());
    }

    let pb = match session.declared_total_size() {
        Some(total) => {
            let pb = ProgressBar::new(u64::from(total));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})")?,
            );
            pb
        }
    };

    loop {
        match session.step() {
            Ok(StepOutcome::Continue) => pb.set_position(u64::from(session.bytes_received())),
            Ok(StepOutcome::Done) => break,
            Err(err) => {
                pb.abandon();
                let _ = session.abort();
                return Err(err).with_context(|| {
                    format!("Download failed after {} bytes", session.bytes_received())
                });
            }
        }
    }
    pb.set_position(u64::from(session.bytes_received()));
    pb.finish();

    let written = session.bytes_written();
    if let Err(err) = session.finish() {
        let _ = session.abort();
        return Err(err).context("Image rejected, boot target unchanged");
    }
    drop(session);

    let data = *banks.boot_data();
    let bank = data.active_bank as usize;
    println!("Written:  {} bytes", written);
    println!(
        "Next boot: bank {} (CRC32: 0x{:08x}, unconfirmed)",
        bank_name(bank),
        data.image(data.active_bank).crc32
    );
    Ok(())
}

/// Parse and verify an image file.
pub fn inspect(file: &Path, chip: Option<ChipId>, revision: u16) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let header = ImageHeader::parse(&image).context("Not an application image")?;

    println!(
        "Image: {} ({} bytes, CRC32: 0x{:08x})",
        file.display(),
        image.len(),
        CRC32.checksum(&image)
    );
    println!("  Segments:    {}", header.segment_count);
    println!("  Entry:       0x{:08x}", header.entry);
    println!(
        "  Chip rev.:   {}..{}",
        header.min_chip_rev,
        header.max_chip_rev
    );
    println!(
        "  Digest:      {}",
        if header.hash_appended {
            "SHA-256"
        } else {
            "none"
        }
    );

    let Some(descriptor) = describe(&image) else {
        bail!("Image has no application descriptor");
    };
    print_descriptor(&descriptor);

    let mut verifier = ImageVerifier::new(&header);
    verifier.update(&image);
    let len = verifier.finish().context("Image verification failed")?;
    if (len as usize) < image.len() {
        let trailing = image.len() - len as usize;
        println!("  Verified:    {} bytes (+{} trailing)", len, trailing);
    } else {
        println!("  Verified:    {} bytes", len);
    }

    if let Some(chip) = chip {
        DeviceIdentity::new(chip, revision)
            .check(&header)
            .with_context(|| format!("Image does not run on {} rev {}", chip, revision))?;
        println!("  Compatible with {} rev {}", chip, revision);
    }
    Ok(())
}

/// Print the boot record and check the bank contents against it.
pub fn status(path: &Path, layout: &Layout) -> Result<()> {
    let mut flash = open_flash(path, layout)?;
    let data = *open_banks(&mut flash, layout)?.boot_data();

    println!("Boot record:");
    println!(
        "  Active bank: {} ({})",
        data.active_bank,
        bank_name(data.active_bank as usize)
    );
    println!("  Confirmed:   {}", data.confirmed);
    println!("  Attempts:    {}", data.boot_attempts);
    println!("  Sequence:    {}", data.sequence);

    for (index, region) in layout.banks().iter().enumerate() {
        let image = data.image(index as u8);
        print!("Bank {}: ", bank_name(index));
        if image.size == 0 {
            println!("empty");
            continue;
        }
        if image.size > region.size {
            println!("invalid size {}", image.size);
            continue;
        }

        let mut bytes = vec![0u8; image.size as usize];
        flash
            .read(region, 0, &mut bytes)
            .map_err(OtaError::from)
            .with_context(|| format!("Failed to read bank {}", bank_name(index)))?;
        let crc = CRC32.checksum(&bytes);
        println!(
            "{} bytes, CRC32 0x{:08x} ({})",
            image.size,
            image.crc32,
            if crc == image.crc32 { "ok" } else { "MISMATCH" }
        );
        if let Some(descriptor) = describe(&bytes) {
            println!(
                "  {} {} for {}",
                descriptor.project_name,
                descriptor.version,
                descriptor.chip
            );
        }
    }
    Ok(())
}

/// Confirm the active bank.
pub fn confirm(path: &Path, layout: &Layout) -> Result<()> {
    let mut flash = open_flash(path, layout)?;
    let mut banks = open_banks(&mut flash, layout)?;

    if banks.boot_data().confirmed {
        let bank = banks.boot_data().active_bank as usize;
        println!("Bank {} already confirmed", bank_name(bank));
        return Ok(());
    }
    banks
        .confirm()
        .map_err(OtaError::from)
        .context("Failed to write the boot record")?;

    let region = banks.current_region();
    println!(
        "Confirmed bank {} at 0x{:08x}",
        bank_name(banks.boot_data().active_bank as usize),
        region.offset
    );
    Ok(())
}
