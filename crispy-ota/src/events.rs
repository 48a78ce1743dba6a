// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Progress notifications emitted by an update session.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::image::ChipId;

/// Lifecycle milestones, in the order a successful update emits them.
///
/// `DecryptInvoked` and `FlashWrite` repeat once per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaEvent {
    Started,
    Connected,
    /// Image header parsed.
    HeaderRead { segments: u8 },
    ChipIdVerified { chip: ChipId },
    /// Decryption stage called on `len` transport bytes.
    DecryptInvoked { len: u32 },
    /// `len` image bytes handed to flash at the region-relative `offset`.
    FlashWrite { offset: u32, len: u32 },
    /// Boot target switched to the region at absolute `offset`.
    BootTargetUpdated { offset: u32 },
    Finished,
    Aborted,
}

/// Receiver for session notifications. Must not block.
pub trait EventSink {
    fn notify(&mut self, event: OtaEvent);
}

impl<F: FnMut(OtaEvent)> EventSink for F {
    fn notify(&mut self, event: OtaEvent) {
        self(event)
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl EventSink for NoEvents {
    fn notify(&mut self, _event: OtaEvent) {}
}

/// Fixed-capacity event recorder. Events past capacity are dropped.
#[derive(Debug, Default)]
pub struct EventLog<const N: usize> {
    events: Vec<OtaEvent, N>,
    dropped: u32,
}

impl<const N: usize> EventLog<N> {
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            dropped: 0,
        }
    }

    pub fn events(&self) -> &[OtaEvent] {
        &self.events
    }

    /// Events lost because the log was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn contains(&self, event: &OtaEvent) -> bool {
        self.events.contains(event)
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }
}

impl<const N: usize> EventSink for EventLog<N> {
    fn notify(&mut self, event: OtaEvent) {
        if self.events.push(event).is_err() {
            self.dropped += 1;
        }
    }
}
