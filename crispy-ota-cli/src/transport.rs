// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Blocking HTTP(S) transport built on reqwest.

use std::io::{self, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::redirect::Policy;

use crispy_ota::{Request, ResponseHead, Transport, TransportError, Url};

/// HTTP client handed to the update engine.
///
/// Redirects are left to the engine so it can enforce its own limit.
pub struct HttpTransport {
    client: Client,
}

/// One in-flight response.
pub struct HttpConnection {
    response: Response,
    head: ResponseHead,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("crispy-ota/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    type Connection = HttpConnection;

    fn open(&mut self, request: &Request<'_>) -> Result<HttpConnection, TransportError> {
        let mut builder = self.client.get(request.url);
        if let Some(range) = request.range {
            builder = builder.header(RANGE, range.header_value().as_str());
        }
        if request.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(u64::from(request.timeout_ms)));
        }

        let response = builder.send().map_err(|err| {
            log::warn!("http: GET {} failed: {}", request.url, err);
            if err.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::ConnectFailed
            }
        })?;

        let total_length = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);
        let head = ResponseHead {
            status: response.status().as_u16(),
            content_length: response
                .content_length()
                .and_then(|len| u32::try_from(len).ok()),
            total_length,
        };
        log::debug!(
            "http: GET {} -> {} (length {:?}, total {:?})",
            request.url,
            head.status,
            head.content_length,
            head.total_length
        );

        Ok(HttpConnection { response, head })
    }

    fn head(&self, connection: &HttpConnection) -> ResponseHead {
        connection.head
    }

    fn read(
        &mut self,
        connection: &mut HttpConnection,
        buf: &mut [u8],
    ) -> Result<usize, TransportError> {
        connection.response.read(buf).map_err(|err| {
            log::warn!("http: read failed: {}", err);
            match err.kind() {
                io::ErrorKind::TimedOut => TransportError::Timeout,
                _ => TransportError::Dropped,
            }
        })
    }

    fn close(&mut self, connection: HttpConnection) {
        drop(connection);
    }

    fn redirect(
        &mut self,
        connection: &HttpConnection,
        url: &mut Url,
    ) -> Result<(), TransportError> {
        let location = connection
            .response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(TransportError::Redirect)?;
        let target = connection
            .response
            .url()
            .join(location)
            .map_err(|_| TransportError::Redirect)?;

        url.clear();
        url.push_str(target.as_str()).map_err(|_| {
            log::warn!("http: redirect target too long: {}", target);
            TransportError::Redirect
        })?;
        log::info!("http: redirected to {}", target);
        Ok(())
    }
}

/// Full resource length from a `Content-Range: bytes a-b/total` value.
pub fn parse_content_range_total(value: &str) -> Option<u32> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}
