// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Session lifecycle state and progress reporting.

use serde::{Deserialize, Serialize};

/// Where an update session stands.
///
/// ```text
/// Init -> Connected -> HeaderValidated -> Receiving -> Complete -> Finished
///            \______________ any failure ______________/
///                              Failed -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaState {
    Init,
    /// Transport opened, no image bytes seen yet.
    Connected,
    /// Image header and descriptor accepted, nothing written yet.
    HeaderValidated,
    /// Image bytes are being written.
    Receiving,
    /// Every image byte is in flash; waiting for `finish`.
    Complete,
    /// A step failed. Only `abort` is accepted.
    Failed,
    Aborted,
    /// Image verified and boot target switched.
    Finished,
}

impl OtaState {
    /// Whether the session can still make progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::HeaderValidated | Self::Receiving | Self::Complete
        )
    }

    /// Whether the session has been closed by `finish` or `abort`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Finished)
    }
}

/// Transport bytes received against the announced image length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Progress {
    pub received: u32,
    /// `None` while the length is unknown.
    pub total: Option<u32>,
}

impl Progress {
    /// Completion in whole percent, `None` when the total is unknown.
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(0) => Some(100),
            Some(total) => {
                let pct = u64::from(self.received.min(total)) * 100 / u64::from(total);
                Some(pct as u8)
            }
            None => None,
        }
    }
}
