// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming whole-image verification.
//!
//! Walks the segment table as plaintext goes by, folding segment data into
//! the XOR checksum and every byte before the digest into SHA-256. Nothing is
//! buffered besides the current segment header and the trailing digest.

use sha2::{Digest, Sha256};

use super::header::{ImageHeader, IMAGE_HEADER_LEN, SEGMENT_HEADER_LEN};
use super::SegmentHeader;
use crate::error::OtaError;

/// Initial value of the XOR checksum.
pub const CHECKSUM_SEED: u8 = 0xEF;

pub const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ImageHeader,
    SegmentHeader,
    SegmentData,
    Padding,
    Checksum,
    Digest,
    Done,
}

#[derive(Clone)]
pub struct ImageVerifier {
    phase: Phase,
    /// Bytes left in the current phase.
    remaining: u32,
    segments_left: u8,
    hash_appended: bool,
    /// Plaintext bytes seen so far.
    offset: u32,
    checksum: u8,
    stored_checksum: u8,
    segment: [u8; SEGMENT_HEADER_LEN],
    digest: [u8; DIGEST_LEN],
    hasher: Sha256,
}

impl ImageVerifier {
    pub fn new(header: &ImageHeader) -> Self {
        Self {
            phase: Phase::ImageHeader,
            remaining: IMAGE_HEADER_LEN as u32,
            segments_left: header.segment_count,
            hash_appended: header.hash_appended,
            offset: 0,
            checksum: CHECKSUM_SEED,
            stored_checksum: 0,
            segment: [0; SEGMENT_HEADER_LEN],
            digest: [0; DIGEST_LEN],
            hasher: Sha256::new(),
        }
    }

    /// Feed the next plaintext bytes, in image order. Bytes after the
    /// image trailer are ignored.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() && self.phase != Phase::Done {
            let take = data.len().min(self.remaining as usize);
            let (chunk, rest) = data.split_at(take);
            data = rest;

            match self.phase {
                Phase::SegmentHeader => {
                    let at = SEGMENT_HEADER_LEN - self.remaining as usize;
                    self.segment[at..at + take].copy_from_slice(chunk);
                }
                Phase::SegmentData => {
                    self.checksum = chunk.iter().fold(self.checksum, |acc, b| acc ^ b);
                }
                Phase::Checksum => self.stored_checksum = chunk[0],
                Phase::Digest => {
                    let at = DIGEST_LEN - self.remaining as usize;
                    self.digest[at..at + take].copy_from_slice(chunk);
                }
                Phase::ImageHeader | Phase::Padding | Phase::Done => {}
            }

            if self.phase != Phase::Digest {
                self.hasher.update(chunk);
            }
            self.offset += take as u32;
            self.remaining -= take as u32;
            if self.remaining == 0 {
                self.advance();
            }
        }
    }

    /// Whether the trailer has been fully seen.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Plaintext bytes consumed so far.
    pub fn bytes_seen(&self) -> u32 {
        self.offset
    }

    /// Check the checksum and, when present, the appended digest.
    /// Returns the image length on success.
    pub fn finish(self) -> Result<u32, OtaError> {
        if self.phase != Phase::Done {
            error!("verify: image truncated after {} bytes", self.offset);
            return Err(OtaError::ImageValidationFailed);
        }

        if self.checksum != self.stored_checksum {
            error!(
                "verify: checksum 0x{:x}, image says 0x{:x}",
                self.checksum,
                self.stored_checksum
            );
            return Err(OtaError::ImageValidationFailed);
        }

        if self.hash_appended {
            let computed = self.hasher.finalize();
            if computed.as_slice() != &self.digest[..] {
                error!("verify: sha256 mismatch");
                return Err(OtaError::ImageValidationFailed);
            }
        }

        debug!("verify: {} byte image ok", self.offset);
        Ok(self.offset)
    }

    fn advance(&mut self) {
        match self.phase {
            Phase::ImageHeader | Phase::SegmentData => self.next_segment(),
            Phase::SegmentHeader => {
                let segment = SegmentHeader::parse(&self.segment);
                trace!(
                    "verify: segment at 0x{:08x}, {} bytes",
                    segment.load_addr,
                    segment.data_len
                );
                self.phase = Phase::SegmentData;
                self.remaining = segment.data_len;
                if self.remaining == 0 {
                    self.next_segment();
                }
            }
            Phase::Padding => {
                self.phase = Phase::Checksum;
                self.remaining = 1;
            }
            Phase::Checksum if self.hash_appended => {
                self.phase = Phase::Digest;
                self.remaining = DIGEST_LEN as u32;
            }
            Phase::Checksum | Phase::Digest | Phase::Done => self.phase = Phase::Done,
        }
    }

    fn next_segment(&mut self) {
        if self.segments_left > 0 {
            self.segments_left -= 1;
            self.phase = Phase::SegmentHeader;
            self.remaining = SEGMENT_HEADER_LEN as u32;
            return;
        }

        // Checksum byte sits at the last position of a 16-byte block.
        let padding = 15 - self.offset % 16;
        if padding > 0 {
            self.phase = Phase::Padding;
            self.remaining = padding;
        } else {
            self.phase = Phase::Checksum;
            self.remaining = 1;
        }
    }
}

/// Checksum over a complete segment payload, for building images.
pub fn segment_checksum<'a>(segments: impl IntoIterator<Item = &'a [u8]>) -> u8 {
    segments
        .into_iter()
        .flat_map(|data| data.iter())
        .fold(CHECKSUM_SEED, |acc, b| acc ^ b)
}
