// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update session configuration.

use serde::{Deserialize, Serialize};

use crate::error::OtaError;
use crate::image::DeviceIdentity;
use crate::region::Region;
use crate::transport::Url;

/// Upper bound for a single transport read.
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Default size of a single transport read.
pub const DEFAULT_CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

const DEFAULT_MAX_REDIRECTS: u8 = 10;
const DEFAULT_TIMEOUT_MS: u32 = 30_000;

/// HTTP(S) request settings handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Image location.
    pub url: Url,
    /// Non-blocking transports are rejected; every step must make observable progress.
    pub non_blocking: bool,
    /// Redirects followed before giving up.
    pub max_redirects: u8,
    /// Per-request timeout passed through to the transport.
    pub timeout_ms: u32,
}

impl HttpConfig {
    /// Settings for `url`, or `None` if it exceeds the URL capacity.
    pub fn new(url: &str) -> Option<Self> {
        let mut config = Self::default();
        config.url.push_str(url).ok()?;
        Some(config)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: Url::new(),
            non_blocking: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Download the image through successive bounded range requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDownload {
    /// Largest byte count requested by a single range request.
    pub max_request_size: u32,
}

/// Bounded retry behaviour of the stream reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Reconnects allowed per range request after the connection drops.
    pub reconnects_per_request: u8,
    /// Times a non-redirect HTTP error status is re-requested before failing.
    pub status_retries: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnects_per_request: 1,
            status_retries: 1,
        }
    }
}

/// Everything [`Updater::begin`](crate::session::Updater::begin) needs besides
/// its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    pub http: Option<HttpConfig>,
    /// Erase the whole target region during `begin` instead of sector by sector.
    pub bulk_erase: bool,
    pub partial_download: Option<PartialDownload>,
    pub retry: RetryPolicy,
    /// Bytes requested from the transport per step.
    pub read_chunk_size: usize,
    /// Region to program. `None` picks the boot store's next updatable region.
    pub target: Option<Region>,
    /// Identity of the running device; images built for another chip are refused.
    pub device: DeviceIdentity,
    /// Verify the image checksum and digest before committing the boot target.
    pub verify_image: bool,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            http: None,
            bulk_erase: false,
            partial_download: None,
            retry: RetryPolicy::default(),
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            target: None,
            device: DeviceIdentity::default(),
            verify_image: true,
        }
    }
}

impl OtaConfig {
    /// Configuration fetching `http` onto a device with identity `device`.
    pub fn new(http: HttpConfig, device: DeviceIdentity) -> Self {
        Self {
            http: Some(http),
            device,
            ..Self::default()
        }
    }

    pub fn with_bulk_erase(mut self, bulk_erase: bool) -> Self {
        self.bulk_erase = bulk_erase;
        self
    }

    pub fn with_partial_download(mut self, max_request_size: u32) -> Self {
        self.partial_download = Some(PartialDownload { max_request_size });
        self
    }

    pub fn with_target(mut self, target: Region) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }

    pub fn with_verification(mut self, verify_image: bool) -> Self {
        self.verify_image = verify_image;
        self
    }

    /// Reject inconsistent settings before anything touches the network or flash.
    pub fn validate(&self) -> Result<&HttpConfig, OtaError> {
        let Some(http) = self.http.as_ref() else {
            warn!("config: missing transport configuration");
            return Err(OtaError::InvalidArgument);
        };

        if http.url.is_empty() {
            warn!("config: empty url");
            return Err(OtaError::InvalidArgument);
        }

        if http.non_blocking {
            warn!("config: non-blocking transport is not supported");
            return Err(OtaError::InvalidArgument);
        }

        if self.read_chunk_size == 0 || self.read_chunk_size > MAX_CHUNK_SIZE {
            warn!(
                "config: chunk size {} outside 1..={}",
                self.read_chunk_size,
                MAX_CHUNK_SIZE
            );
            return Err(OtaError::InvalidArgument);
        }

        if self
            .partial_download
            .is_some_and(|p| p.max_request_size == 0)
        {
            warn!("config: partial download with zero request size");
            return Err(OtaError::InvalidArgument);
        }

        Ok(http)
    }
}
