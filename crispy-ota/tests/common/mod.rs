// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;

use crispy_ota::boot::BootImage;
use crispy_ota::image::{segment_checksum, SegmentHeader};
use crispy_ota::{
    AppDescriptor, BootStore, BootStoreError, ByteRange, ChipId, DecryptError, DeviceIdentity,
    FlashError, FlashStorage, HttpConfig, ImageDecryptor, ImageHeader, OtaConfig, Region,
    Request, ResponseHead, Transport, TransportError, Url,
};
use sha2::{Digest, Sha256};

pub const FLASH_SIZE: usize = 0x40000;
pub const SECTOR: u32 = 4096;
pub const BOOT_REGION: Region = Region::new(0x0F000, 0x1000, SECTOR);
pub const BANK_A: Region = Region::new(0x10000, 0x10000, SECTOR);
pub const BANK_B: Region = Region::new(0x20000, 0x10000, SECTOR);

pub const URL: &str = "https://updates.example.com/fw.bin";
pub const MIRROR_URL: &str = "https://mirror.example.com/fw.bin";

pub fn device() -> DeviceIdentity {
    DeviceIdentity::new(ChipId::ESP32_C3, 3)
}

pub fn config() -> OtaConfig {
    OtaConfig::new(HttpConfig::new(URL).unwrap(), device())
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub url: String,
    pub range: Option<ByteRange>,
}

#[derive(Debug)]
pub struct MockConnection {
    head: ResponseHead,
    pos: u32,
    end: u32,
    location: Option<&'static str>,
}

/// Serves `body` over scripted responses.
pub struct ScriptedTransport {
    pub body: Vec<u8>,
    /// Bytes returned per read call, cycling on the last entry. Empty = as much as asked.
    pub chunk_sizes: Vec<usize>,
    /// Send `Content-Length` on full responses.
    pub announce_length: bool,
    /// Answer `Range` requests with 206.
    pub honor_ranges: bool,
    /// Length announced when it differs from what is actually served.
    pub announced_len: Option<u32>,
    /// Body offsets at which the connection drops once each.
    pub drops: VecDeque<u32>,
    /// Statuses answered before serving, one per request.
    pub statuses: VecDeque<u16>,
    /// Redirects answered before serving.
    pub redirects: usize,
    pub refuse_connect: bool,
    pub requests: Vec<RequestRecord>,
    pub opened: usize,
    pub closed: usize,
    reads: usize,
}

impl ScriptedTransport {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            chunk_sizes: Vec::new(),
            announce_length: true,
            honor_ranges: true,
            announced_len: None,
            drops: VecDeque::new(),
            statuses: VecDeque::new(),
            redirects: 0,
            refuse_connect: false,
            requests: Vec::new(),
            opened: 0,
            closed: 0,
            reads: 0,
        }
    }

    pub fn with_chunks(mut self, sizes: &[usize]) -> Self {
        self.chunk_sizes = sizes.to_vec();
        self
    }

    pub fn chunked(mut self) -> Self {
        self.announce_length = false;
        self
    }

    pub fn open_connections(&self) -> usize {
        self.opened - self.closed
    }

    fn announced(&self) -> u32 {
        self.announced_len.unwrap_or(self.body.len() as u32)
    }

    fn next_chunk_size(&mut self) -> usize {
        let size = self
            .chunk_sizes
            .get(self.reads)
            .or(self.chunk_sizes.last())
            .copied()
            .unwrap_or(usize::MAX);
        self.reads += 1;
        size
    }
}

impl Transport for ScriptedTransport {
    type Connection = MockConnection;

    fn open(&mut self, request: &Request<'_>) -> Result<MockConnection, TransportError> {
        self.requests.push(RequestRecord {
            url: request.url.to_string(),
            range: request.range,
        });
        if self.refuse_connect {
            return Err(TransportError::ConnectFailed);
        }
        self.opened += 1;

        let status_only = |status: u16, location| MockConnection {
            head: ResponseHead {
                status,
                content_length: Some(0),
                total_length: None,
            },
            pos: 0,
            end: 0,
            location,
        };

        if let Some(status) = self.statuses.pop_front() {
            return Ok(status_only(status, None));
        }
        if self.redirects > 0 {
            self.redirects -= 1;
            return Ok(status_only(302, Some(MIRROR_URL)));
        }

        let served = self.body.len() as u32;
        let announced = self.announced();
        let connection = match request.range {
            Some(range) if self.honor_ranges => {
                let end = (range.end_inclusive + 1).min(announced);
                MockConnection {
                    head: ResponseHead {
                        status: 206,
                        content_length: Some(end - range.start),
                        total_length: Some(announced),
                    },
                    pos: range.start,
                    end: end.min(served),
                    location: None,
                }
            }
            _ => MockConnection {
                head: ResponseHead {
                    status: 200,
                    content_length: self.announce_length.then_some(announced),
                    total_length: None,
                },
                pos: 0,
                end: served,
                location: None,
            },
        };
        Ok(connection)
    }

    fn head(&self, connection: &MockConnection) -> ResponseHead {
        connection.head
    }

    fn read(
        &mut self,
        connection: &mut MockConnection,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        if self.drops.front() == Some(&connection.pos) {
            self.drops.pop_front();
            return Err(TransportError::Dropped);
        }

        let mut limit = connection.end;
        if let Some(&drop_at) = self.drops.front() {
            if drop_at > connection.pos {
                limit = limit.min(drop_at);
            }
        }

        let available = (limit - connection.pos) as usize;
        let n = buf.len().min(available).min(self.next_chunk_size());
        let start = connection.pos as usize;
        buf[..n].copy_from_slice(&self.body[start..start + n]);
        connection.pos += n as u32;
        Ok(n)
    }

    fn close(&mut self, _connection: MockConnection) {
        self.closed += 1;
    }

    fn redirect(&mut self, connection: &MockConnection, url: &mut Url) -> Result<(), TransportError> {
        let location = connection.location.ok_or(TransportError::Redirect)?;
        url.clear();
        url.push_str(location).map_err(|_| TransportError::Redirect)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Flash
// ---------------------------------------------------------------------------

/// RAM-backed NOR flash that records every erase and write.
pub struct SpyFlash {
    pub mem: Vec<u8>,
    pub write_size: usize,
    /// `(absolute offset, len)` of each erase.
    pub erases: Vec<(u32, u32)>,
    /// `(absolute offset, len)` of each write.
    pub writes: Vec<(u32, usize)>,
    /// Fail the write call with this index.
    pub fail_write: Option<(usize, FlashError)>,
}

impl SpyFlash {
    pub fn new(write_size: usize) -> Self {
        Self {
            mem: vec![0xA5; FLASH_SIZE],
            write_size,
            erases: Vec::new(),
            writes: Vec::new(),
            fail_write: None,
        }
    }

    pub fn region_bytes(&self, region: &Region, len: usize) -> &[u8] {
        let start = region.offset as usize;
        &self.mem[start..start + len]
    }

    pub fn bytes_written(&self) -> usize {
        self.writes.iter().map(|(_, len)| len).sum()
    }
}

impl FlashStorage for SpyFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase(&mut self, region: &Region) -> Result<(), FlashError> {
        assert_eq!(region.offset % SECTOR, 0, "unaligned erase start");
        assert_eq!(region.size % SECTOR, 0, "unaligned erase length");
        let start = region.offset as usize;
        self.mem[start..start + region.size as usize].fill(0xFF);
        self.erases.push((region.offset, region.size));
        Ok(())
    }

    fn write(&mut self, region: &Region, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        if let Some((index, err)) = self.fail_write {
            if index == self.writes.len() {
                return Err(err);
            }
        }
        assert!(region.contains(offset, bytes.len() as u32), "write outside region");
        assert_eq!(offset as usize % self.write_size, 0, "unaligned write offset");
        assert_eq!(bytes.len() % self.write_size, 0, "unaligned write length");

        let start = (region.offset + offset) as usize;
        let target = &mut self.mem[start..start + bytes.len()];
        assert!(target.iter().all(|&b| b == 0xFF), "write to unerased flash");
        target.copy_from_slice(bytes);
        self.writes.push((region.offset + offset, bytes.len()));
        Ok(())
    }

    fn read(&mut self, region: &Region, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let start = (region.offset + offset) as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Boot store
// ---------------------------------------------------------------------------

pub struct MemBootStore {
    pub current: Region,
    pub next: Option<Region>,
    pub committed: Option<(Region, BootImage)>,
    pub fail: bool,
}

impl MemBootStore {
    pub fn new() -> Self {
        Self {
            current: BANK_A,
            next: Some(BANK_B),
            committed: None,
            fail: false,
        }
    }
}

impl BootStore for MemBootStore {
    fn current_region(&self) -> Region {
        self.current
    }

    fn next_updatable_region(&self) -> Option<Region> {
        self.next
    }

    fn set_next_boot(&mut self, region: &Region, image: &BootImage) -> Result<(), BootStoreError> {
        if self.fail {
            return Err(BootStoreError::Flash(FlashError::OpFailed));
        }
        self.committed = Some((*region, *image));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Builds well-formed application images.
pub struct ImageBuilder {
    pub header: ImageHeader,
    pub descriptor: AppDescriptor,
    /// Payload of each segment; the first one follows the descriptor.
    pub segments: Vec<Vec<u8>>,
}

impl ImageBuilder {
    pub fn new(chip: ChipId) -> Self {
        let mut descriptor = AppDescriptor::default();
        descriptor.project_name.push_str("blinky").unwrap();
        descriptor.version.push_str("1.2.3").unwrap();
        descriptor.date.push_str("Oct 16 2026").unwrap();
        descriptor.time.push_str("12:00:00").unwrap();
        descriptor.idf_version.push_str("v5.3").unwrap();
        descriptor.chip = chip;

        Self {
            header: ImageHeader::new(chip, 1),
            descriptor,
            segments: vec![pattern(1024, 1)],
        }
    }

    /// Single-segment image of exactly `total` bytes (multiple of 16, digest appended).
    pub fn sized(chip: ChipId, total: usize) -> Vec<u8> {
        assert_eq!(total % 16, 0);
        // header + segment header + descriptor + payload + checksum + digest
        let payload = total - 24 - 8 - 256 - 1 - 32;
        let mut builder = Self::new(chip);
        builder.segments = vec![pattern(payload, 1)];
        let image = builder.build();
        assert_eq!(image.len(), total);
        image
    }

    pub fn build(&self) -> Vec<u8> {
        let mut header = self.header;
        header.segment_count = self.segments.len() as u8;

        let mut image = header.to_bytes().to_vec();
        let mut data_blocks = Vec::new();
        for (index, payload) in self.segments.iter().enumerate() {
            let mut data = Vec::new();
            if index == 0 {
                data.extend_from_slice(&self.descriptor.to_bytes());
            }
            data.extend_from_slice(payload);

            let segment = SegmentHeader {
                load_addr: 0x3C00_0020 + index as u32 * 0x1_0000,
                data_len: data.len() as u32,
            };
            image.extend_from_slice(&segment.to_bytes());
            image.extend_from_slice(&data);
            data_blocks.push(data);
        }

        let padding = 15 - image.len() % 16;
        image.resize(image.len() + padding, 0);
        image.push(segment_checksum(data_blocks.iter().map(Vec::as_slice)));

        if header.hash_appended {
            let digest = Sha256::digest(&image);
            image.extend_from_slice(&digest);
        }
        image
    }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

pub const XOR_KEY: u8 = 0x5A;

pub fn xor(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ XOR_KEY).collect()
}

/// XOR "cipher" that can be told to reject a given call.
pub struct XorDecryptor {
    pub calls: usize,
    pub fail_on_call: Option<usize>,
    /// Smallest output room seen, relative to `2 * ciphertext.len() + 64`.
    pub min_spare: Option<isize>,
}

impl XorDecryptor {
    pub fn new() -> Self {
        Self {
            calls: 0,
            fail_on_call: None,
            min_spare: None,
        }
    }
}

impl ImageDecryptor for XorDecryptor {
    fn decrypt(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<usize, DecryptError> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on_call == Some(call) {
            return Err(DecryptError::Rejected);
        }
        let spare = plaintext.len() as isize - (2 * ciphertext.len() as isize + 64);
        self.min_spare = Some(self.min_spare.map_or(spare, |min| min.min(spare)));
        if spare < 0 {
            return Err(DecryptError::OutputTooSmall);
        }
        for (out, byte) in plaintext.iter_mut().zip(ciphertext) {
            *out = byte ^ XOR_KEY;
        }
        Ok(ciphertext.len())
    }
}
