// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error taxonomy for the update engine and its collaborators.

use core::fmt;

/// Every failure the engine can surface to a caller.
///
/// Each variant maps to exactly one numeric code (see [`OtaError::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaError {
    /// Configuration is inconsistent or incomplete.
    InvalidArgument,
    /// Another update session currently owns the update slot.
    AlreadyInProgress,
    /// The transport could not establish a connection.
    ConnectionFailed,
    /// The transfer failed after the connection was established.
    TransferError,
    /// The image is structurally invalid or failed final verification.
    ImageValidationFailed,
    /// The image targets a different chip or chip revision.
    UnsupportedTarget,
    /// The decryption stage rejected a chunk.
    DecryptionFailed,
    /// A flash operation timed out.
    FlashTimeout,
    /// A flash operation failed.
    FlashOpFailed,
    /// The operation is not valid in the current session state.
    InvalidState,
    /// A fixed-capacity buffer was too small for the data it had to hold.
    OutOfMemory,
}

impl OtaError {
    /// Stable numeric code, also used as the host tool's exit status.
    pub const fn code(self) -> u8 {
        match self {
            Self::InvalidArgument => 1,
            Self::AlreadyInProgress => 2,
            Self::ConnectionFailed => 3,
            Self::TransferError => 4,
            Self::ImageValidationFailed => 5,
            Self::UnsupportedTarget => 6,
            Self::DecryptionFailed => 7,
            Self::FlashTimeout => 8,
            Self::FlashOpFailed => 9,
            Self::InvalidState => 10,
            Self::OutOfMemory => 11,
        }
    }

    /// Inverse of [`OtaError::code`].
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::InvalidArgument,
            2 => Self::AlreadyInProgress,
            3 => Self::ConnectionFailed,
            4 => Self::TransferError,
            5 => Self::ImageValidationFailed,
            6 => Self::UnsupportedTarget,
            7 => Self::DecryptionFailed,
            8 => Self::FlashTimeout,
            9 => Self::FlashOpFailed,
            10 => Self::InvalidState,
            11 => Self::OutOfMemory,
            _ => return None,
        })
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidArgument => "invalid argument",
            Self::AlreadyInProgress => "an update is already in progress",
            Self::ConnectionFailed => "connection failed",
            Self::TransferError => "transfer error",
            Self::ImageValidationFailed => "image validation failed",
            Self::UnsupportedTarget => "image does not support this chip",
            Self::DecryptionFailed => "decryption failed",
            Self::FlashTimeout => "flash operation timed out",
            Self::FlashOpFailed => "flash operation failed",
            Self::InvalidState => "invalid state for this operation",
            Self::OutOfMemory => "out of memory",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OtaError {}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The request could not be sent or the connection not established.
    ConnectFailed,
    /// The server answered with a status the reader cannot use.
    Status(u16),
    /// The connection dropped while reading the body.
    Dropped,
    /// The transport gave up waiting for data.
    Timeout,
    /// A redirect could not be followed.
    Redirect,
}

impl From<TransportError> for OtaError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectFailed => Self::ConnectionFailed,
            TransportError::Status(_)
            | TransportError::Dropped
            | TransportError::Timeout
            | TransportError::Redirect => Self::TransferError,
        }
    }
}

/// Errors reported by a [`FlashStorage`](crate::flash::FlashStorage) driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    Timeout,
    OpFailed,
}

impl From<FlashError> for OtaError {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::Timeout => Self::FlashTimeout,
            FlashError::OpFailed => Self::FlashOpFailed,
        }
    }
}

/// Errors reported by an [`ImageDecryptor`](crate::decrypt::ImageDecryptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecryptError {
    /// The ciphertext could not be decrypted.
    Rejected,
    /// The plaintext does not fit in the output buffer.
    OutputTooSmall,
}

impl From<DecryptError> for OtaError {
    fn from(err: DecryptError) -> Self {
        match err {
            DecryptError::Rejected => Self::DecryptionFailed,
            DecryptError::OutputTooSmall => Self::OutOfMemory,
        }
    }
}

/// Errors reported by a [`BootStore`](crate::boot::BootStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootStoreError {
    /// The region is not one of the store's boot banks.
    UnknownRegion,
    /// The persisted boot record could not be encoded.
    Encode,
    /// The underlying flash operation failed.
    Flash(FlashError),
}

impl From<FlashError> for BootStoreError {
    fn from(err: FlashError) -> Self {
        Self::Flash(err)
    }
}

impl From<BootStoreError> for OtaError {
    fn from(err: BootStoreError) -> Self {
        match err {
            BootStoreError::UnknownRegion => Self::InvalidArgument,
            BootStoreError::Encode => Self::OutOfMemory,
            BootStoreError::Flash(e) => e.into(),
        }
    }
}
