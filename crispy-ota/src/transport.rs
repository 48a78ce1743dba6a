// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transport collaborator interface.
//!
//! TLS, redirect resolution and header handling belong to the transport. The
//! engine only issues [`Request`]s, inspects the [`ResponseHead`] and pulls body
//! bytes.

use core::fmt::{self, Write};

use crate::error::TransportError;

/// Longest URL the engine carries around.
pub const MAX_URL_LEN: usize = 256;

/// Fixed-capacity URL string.
pub type Url = heapless::String<MAX_URL_LEN>;

/// Inclusive byte range, rendered as an HTTP `Range` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ByteRange {
    pub start: u32,
    pub end_inclusive: u32,
}

impl ByteRange {
    /// Range covering `len` bytes from `start`. `len` must be non-zero.
    pub fn new(start: u32, len: u32) -> Self {
        debug_assert!(len > 0);
        Self {
            start,
            end_inclusive: start + len - 1,
        }
    }

    /// Value of the `Range` request header, e.g. `bytes=0-4095`.
    pub fn header_value(&self) -> heapless::String<32> {
        let mut value = heapless::String::new();
        // 32 bytes always fits "bytes=" plus two u32 values.
        let _ = write!(value, "{}", self);
        value
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end_inclusive)
    }
}

/// One request issued by the stream reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub url: &'a str,
    /// `None` requests the whole resource.
    pub range: Option<ByteRange>,
    pub timeout_ms: u32,
}

/// Status line and size information of an opened response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseHead {
    pub status: u16,
    /// `Content-Length` of this response, `None` for chunked transfer.
    pub content_length: Option<u32>,
    /// Full resource length from `Content-Range`, when the server sent one.
    pub total_length: Option<u32>,
}

impl ResponseHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_partial(&self) -> bool {
        self.status == 206
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// HTTP(S) client the engine drives. All calls block.
pub trait Transport {
    /// One open request/response exchange.
    type Connection;

    /// Send `request` and wait for the response head.
    fn open(&mut self, request: &Request<'_>) -> Result<Self::Connection, TransportError>;

    /// Response head of an open connection.
    fn head(&self, connection: &Self::Connection) -> ResponseHead;

    /// Read body bytes into `buf`. `Ok(0)` signals end of body.
    fn read(
        &mut self,
        connection: &mut Self::Connection,
        buf: &mut [u8],
    ) -> Result<usize, TransportError>;

    /// Release the connection.
    fn close(&mut self, connection: Self::Connection);

    /// Rewrite `url` to the redirect target announced by `connection`.
    ///
    /// Transports that follow redirects on their own never see a redirect
    /// status, so the default refuses.
    fn redirect(
        &mut self,
        _connection: &Self::Connection,
        _url: &mut Url,
    ) -> Result<(), TransportError> {
        Err(TransportError::Redirect)
    }
}
