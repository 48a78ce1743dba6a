// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Forward-only byte stream over one or more transport requests.
//!
//! In single-request mode one response carries the whole body. In ranged mode
//! the reader issues successive range requests of at most `max_request_size`
//! bytes. When a range request drops, the reader reconnects from the last
//! byte it handed out, so the caller never sees a gap or a repeated byte.

use crate::config::{HttpConfig, PartialDownload, RetryPolicy};
use crate::error::{OtaError, TransportError};
use crate::transport::{ByteRange, Request, ResponseHead, Transport, Url};

pub struct StreamReader<'a, T: Transport> {
    transport: &'a mut T,
    connection: Option<T::Connection>,
    url: Url,
    timeout_ms: u32,
    max_redirects: u8,
    retry: RetryPolicy,
    /// `Some` in ranged mode.
    max_request: Option<u32>,
    /// Bytes handed to the caller so far.
    consumed: u32,
    total: Option<u32>,
    /// Exclusive end of the current range request.
    request_end: u32,
    /// Reconnects spent on the current range request.
    reconnects: u8,
    eof: bool,
    requests: u32,
}

impl<'a, T: Transport> StreamReader<'a, T> {
    /// Open the first request. Redirects and retryable statuses are handled here.
    pub fn open(
        transport: &'a mut T,
        http: &HttpConfig,
        retry: RetryPolicy,
        partial: Option<PartialDownload>,
    ) -> Result<Self, OtaError> {
        let mut reader = Self {
            transport,
            connection: None,
            url: http.url.clone(),
            timeout_ms: http.timeout_ms,
            max_redirects: http.max_redirects,
            retry,
            max_request: partial.map(|p| p.max_request_size),
            consumed: 0,
            total: None,
            request_end: 0,
            reconnects: 0,
            eof: false,
            requests: 0,
        };
        reader.connect(0, None)?;
        Ok(reader)
    }

    /// Bytes delivered to the caller so far.
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Full image length, `None` while the server has not announced one.
    pub fn total_len(&self) -> Option<u32> {
        self.total
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn is_ranged(&self) -> bool {
        self.max_request.is_some()
    }

    /// Requests sent to the transport, redirects and reconnects included.
    pub fn requests_issued(&self) -> u32 {
        self.requests
    }

    /// Read the next bytes of the image into `buf`. `Ok(0)` marks the end.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, OtaError> {
        loop {
            if self.eof || buf.is_empty() {
                return Ok(0);
            }

            if self.total.is_some_and(|total| self.consumed >= total) {
                self.end_of_stream();
                return Ok(0);
            }

            let Some(connection) = self.connection.as_mut() else {
                // Previous range request fully consumed.
                self.reconnects = 0;
                self.connect(self.consumed, None)?;
                continue;
            };

            let want = match self.max_request {
                Some(_) => buf.len().min((self.request_end - self.consumed) as usize),
                None => buf.len(),
            };

            match self.transport.read(connection, &mut buf[..want]) {
                Ok(0) if self.is_ranged() => {
                    if self.consumed >= self.request_end {
                        self.release();
                    } else {
                        warn!(
                            "stream: range ended early at {} (expected {})",
                            self.consumed,
                            self.request_end
                        );
                        self.reconnect()?;
                    }
                }
                Ok(0) => {
                    if let Some(total) = self.total.filter(|&total| self.consumed < total) {
                        error!(
                            "stream: body ended at {} of {} bytes",
                            self.consumed,
                            total
                        );
                        self.release();
                        return Err(OtaError::TransferError);
                    }
                    self.end_of_stream();
                    return Ok(0);
                }
                Ok(n) => {
                    let n = n.min(want);
                    self.consumed += n as u32;
                    if self.is_ranged() && self.consumed >= self.request_end {
                        self.release();
                    }
                    return Ok(n);
                }
                Err(err) if self.is_ranged() => {
                    warn!("stream: read failed at {}: {:?}", self.consumed, err);
                    self.reconnect()?;
                }
                Err(err) => {
                    error!("stream: read failed at {}: {:?}", self.consumed, err);
                    self.release();
                    return Err(err.into());
                }
            }
        }
    }

    /// Close the current connection, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.release();
    }

    fn reconnect(&mut self) -> Result<(), OtaError> {
        self.release();
        if self.reconnects >= self.retry.reconnects_per_request {
            error!(
                "stream: giving up at {} after {} reconnect(s)",
                self.consumed,
                self.reconnects
            );
            return Err(OtaError::TransferError);
        }
        self.reconnects += 1;
        info!("stream: resuming at {}", self.consumed);
        self.connect(self.consumed, Some(self.request_end))
    }

    /// Issue a request starting at `start`. `resume_end` keeps the boundary of
    /// an interrupted range request.
    fn connect(&mut self, start: u32, resume_end: Option<u32>) -> Result<(), OtaError> {
        let range = self.max_request.map(|max| {
            let end = resume_end.unwrap_or_else(|| {
                let end = start.saturating_add(max);
                self.total.map_or(end, |total| end.min(total))
            });
            ByteRange::new(start, end - start)
        });

        let mut redirects = 0u8;
        let mut status_failures = 0u8;
        loop {
            let request = Request {
                url: self.url.as_str(),
                range,
                timeout_ms: self.timeout_ms,
            };
            self.requests += 1;
            let connection = self.transport.open(&request).map_err(|err| {
                error!("stream: open failed: {:?}", err);
                OtaError::from(err)
            })?;
            let head = self.transport.head(&connection);
            trace!("stream: status {} for request {}", head.status, self.requests);

            if head.is_redirect() {
                if redirects >= self.max_redirects {
                    error!("stream: too many redirects");
                    self.transport.close(connection);
                    return Err(OtaError::TransferError);
                }
                redirects += 1;
                let followed = self.transport.redirect(&connection, &mut self.url);
                self.transport.close(connection);
                followed.map_err(|err| {
                    error!("stream: redirect {} not followed", head.status);
                    OtaError::from(err)
                })?;
                debug!("stream: redirected ({})", redirects);
                continue;
            }

            if !head.is_success() {
                self.transport.close(connection);
                if status_failures >= self.retry.status_retries {
                    error!("stream: HTTP status {}", head.status);
                    return Err(TransportError::Status(head.status).into());
                }
                status_failures += 1;
                warn!("stream: HTTP status {}, retrying", head.status);
                continue;
            }

            if let Err(err) = self.accept(start, range, &head) {
                self.transport.close(connection);
                return Err(err);
            }
            self.connection = Some(connection);
            return Ok(());
        }
    }

    /// Record size information from a successful response head.
    fn accept(
        &mut self,
        start: u32,
        range: Option<ByteRange>,
        head: &ResponseHead,
    ) -> Result<(), OtaError> {
        match range {
            Some(range) if head.is_partial() => {
                let Some(total) = head.total_length.or(self.total) else {
                    error!("stream: partial response without total length");
                    return Err(OtaError::TransferError);
                };
                if self.total.is_some_and(|known| known != total) {
                    error!("stream: image length changed to {}", total);
                    return Err(OtaError::TransferError);
                }
                self.total = Some(total);
                self.request_end = range.end_inclusive.saturating_add(1).min(total);
                debug!("stream: range {}-{} of {}", start, self.request_end, total);
            }
            Some(_) => {
                if start != 0 {
                    error!("stream: server ignored range request at {}", start);
                    return Err(OtaError::TransferError);
                }
                warn!("stream: server ignored range request, using a single request");
                self.max_request = None;
                self.total = head.content_length;
            }
            None => {
                self.total = head.content_length;
                match self.total {
                    Some(total) => debug!("stream: {} byte body", total),
                    None => debug!("stream: body length unknown"),
                }
            }
        }
        Ok(())
    }

    fn end_of_stream(&mut self) {
        if !self.eof {
            debug!("stream: end of image after {} bytes", self.consumed);
        }
        self.eof = true;
        self.release();
    }

    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.transport.close(connection);
        }
    }
}

impl<T: Transport> Drop for StreamReader<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}
