// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the boot record and the A/B bank table.

mod common;

use common::*;
use crispy_ota::boot::BOOT_RECORD_LEN;
use crispy_ota::{
    BankTable, BootData, BootImage, BootStore, BootStoreError, ChipId, Region, UpdateSlot,
    Updater, BOOT_DATA_MAGIC,
};

fn image(size: u32, crc32: u32) -> BootImage {
    BootImage { size, crc32 }
}

fn write_record(flash: &mut SpyFlash, data: &BootData) {
    let mut buf = [0u8; BOOT_RECORD_LEN];
    let len = data.encode(&mut buf).unwrap();
    let start = BOOT_REGION.offset as usize;
    flash.mem[start..start + BOOT_REGION.size as usize].fill(0xFF);
    flash.mem[start..start + len].copy_from_slice(&buf[..len]);
}

fn read_record(flash: &SpyFlash) -> Option<BootData> {
    BootData::decode(flash.region_bytes(&BOOT_REGION, BOOT_RECORD_LEN))
}

#[test]
fn test_boot_data_default_new() {
    let bd = BootData::default_new();

    assert_eq!(bd.magic, BOOT_DATA_MAGIC);
    assert_eq!(bd.active_bank, 0);
    assert!(bd.confirmed);
    assert_eq!(bd.boot_attempts, 0);
    assert_eq!(bd.sequence, 0);
    assert_eq!(bd.image_a, BootImage::default());
    assert_eq!(bd.image_b, BootImage::default());
}

#[test]
fn test_boot_data_is_valid() {
    let mut bd = BootData::default_new();
    assert!(bd.is_valid());

    bd.magic = 0;
    assert!(!bd.is_valid());

    bd.magic = BOOT_DATA_MAGIC;
    bd.active_bank = 2;
    assert!(!bd.is_valid());
}

#[test]
fn test_boot_data_select() {
    let mut bd = BootData::default_new();
    bd.boot_attempts = 2;

    bd.select(1, image(4096, 0x1234_5678));
    assert_eq!(bd.active_bank, 1);
    assert!(!bd.confirmed);
    assert_eq!(bd.boot_attempts, 0);
    assert_eq!(bd.sequence, 1);
    assert_eq!(*bd.image(1), image(4096, 0x1234_5678));
    assert_eq!(*bd.image(0), BootImage::default());
}

#[test]
fn test_boot_data_sequence_wraps() {
    let mut bd = BootData::default_new();
    bd.sequence = u32::MAX;
    bd.select(0, image(1, 1));
    assert_eq!(bd.sequence, 0);
}

#[test]
fn test_boot_data_encode_decode() {
    let mut bd = BootData::default_new();
    bd.select(1, image(123_456, 0xDEAD_BEEF));

    let mut buf = [0xFFu8; BOOT_RECORD_LEN];
    let len = bd.encode(&mut buf).unwrap();
    assert!(len <= BOOT_RECORD_LEN);
    assert_eq!(BootData::decode(&buf[..len]), Some(bd));
}

#[test]
fn test_boot_data_decode_rejects_erased_flash() {
    assert_eq!(BootData::decode(&[0xFF; BOOT_RECORD_LEN]), None);
    assert_eq!(BootData::decode(&[0x00; BOOT_RECORD_LEN]), None);
    assert_eq!(BootData::decode(&[]), None);
}

#[test]
fn test_boot_data_decode_rejects_corruption() {
    let bd = BootData::default_new();
    let mut buf = [0xFFu8; BOOT_RECORD_LEN];
    let len = bd.encode(&mut buf).unwrap();

    for i in 1..len {
        let mut corrupt = buf;
        corrupt[i] ^= 0x10;
        assert_eq!(BootData::decode(&corrupt), None, "flip at byte {i} accepted");
    }
}

#[test]
fn test_bank_table_defaults_to_bank_a() {
    let mut flash = SpyFlash::new(4);
    let table = BankTable::open(&mut flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();

    assert_eq!(*table.boot_data(), BootData::default_new());
    assert_eq!(table.current_region(), BANK_A);
    assert_eq!(table.next_updatable_region(), Some(BANK_B));
}

#[test]
fn test_bank_table_loads_existing_record() {
    let mut flash = SpyFlash::new(4);
    let mut bd = BootData::default_new();
    bd.select(1, image(2048, 7));
    bd.confirmed = true;
    write_record(&mut flash, &bd);

    let table = BankTable::open(&mut flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();
    assert_eq!(*table.boot_data(), bd);
    assert_eq!(table.current_region(), BANK_B);
    assert_eq!(table.next_updatable_region(), Some(BANK_A));
    assert_eq!(table.bank_index(&BANK_B), Some(1));
    assert_eq!(table.bank_index(&BOOT_REGION), None);
}

#[test]
fn test_set_next_boot_persists_record() {
    let mut flash = SpyFlash::new(16);
    let mut table = BankTable::open(&mut flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();

    table.set_next_boot(&BANK_B, &image(8448, 0xCAFE_F00D)).unwrap();

    // The running bank does not change until reboot.
    assert_eq!(table.current_region(), BANK_A);
    assert_eq!(table.boot_data().active_bank, 1);
    drop(table);

    assert_eq!(flash.erases, vec![(BOOT_REGION.offset, BOOT_REGION.size)]);
    assert_eq!(flash.writes.len(), 1);
    assert_eq!(flash.writes[0].1 % 16, 0);

    let stored = read_record(&flash).unwrap();
    assert_eq!(stored.active_bank, 1);
    assert!(!stored.confirmed);
    assert_eq!(stored.image_b, image(8448, 0xCAFE_F00D));
    assert_eq!(stored.sequence, 1);
}

#[test]
fn test_set_next_boot_rejects_foreign_region() {
    let mut flash = SpyFlash::new(4);
    let mut table = BankTable::open(&mut flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();

    let other = Region::new(0x30000, 0x10000, SECTOR);
    assert_eq!(
        table.set_next_boot(&other, &image(1, 1)),
        Err(BootStoreError::UnknownRegion)
    );
    drop(table);
    assert!(flash.writes.is_empty());
}

#[test]
fn test_confirm() {
    let mut flash = SpyFlash::new(4);
    let mut bd = BootData::default_new();
    bd.select(1, image(2048, 7));
    bd.boot_attempts = 2;
    write_record(&mut flash, &bd);

    let mut table = BankTable::open(&mut flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();
    table.confirm().unwrap();
    assert!(table.boot_data().confirmed);
    drop(table);

    let stored = read_record(&flash).unwrap();
    assert!(stored.confirmed);
    assert_eq!(stored.boot_attempts, 0);
    assert_eq!(stored.active_bank, 1);

    // Confirming a confirmed record does not touch flash.
    let writes = flash.writes.len();
    let mut table = BankTable::open(&mut flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();
    table.confirm().unwrap();
    drop(table);
    assert_eq!(flash.writes.len(), writes);
}

#[test]
fn test_update_through_bank_table() {
    let image_bytes = ImageBuilder::sized(ChipId::ESP32_C3, 4096);
    let mut transport = ScriptedTransport::new(image_bytes.clone());
    let mut flash = SpyFlash::new(4);
    let mut boot_flash = SpyFlash::new(4);
    let mut banks = BankTable::open(&mut boot_flash, [BANK_A, BANK_B], BOOT_REGION).unwrap();
    let slot = UpdateSlot::new();

    Updater::new(&mut transport, &mut flash, &mut banks)
        .run_in(&slot, &config())
        .unwrap();

    let crc = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(&image_bytes);
    assert_eq!(banks.boot_data().image_b, image(4096, crc));
    drop(banks);

    let stored = read_record(&boot_flash).unwrap();
    assert_eq!(stored.active_bank, 1);
    assert_eq!(stored.image_b.crc32, crc);
    assert_eq!(flash.region_bytes(&BANK_B, 4096), &image_bytes[..]);
}
