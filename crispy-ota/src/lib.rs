// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware-over-the-network update engine.
//!
//! The engine streams a firmware image from a remote server, validates its
//! header against the running device, optionally decrypts it, and programs it
//! into the inactive bank. The boot target only changes once the whole image
//! has been received and verified.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std`, fixed-capacity buffers, no allocator
//! - `std` feature: `std::error::Error` impls for host tools
//! - `defmt` / `log` features: route engine logging to either facade
//! - `embedded-storage` feature: adapt any `NorFlash` driver as update storage
//!
//! Typical use:
//!
//! ```ignore
//! let mut session = Updater::new(&mut http, &mut flash, &mut banks).begin(&config)?;
//! while session.step()? == StepOutcome::Continue {}
//! session.finish()?;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

pub mod boot;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod events;
pub mod flash;
pub mod image;
pub mod region;
pub mod session;
pub mod slot;
pub mod state;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use boot::{BankTable, BootData, BootImage, BootStore, BOOT_DATA_MAGIC};
pub use config::{HttpConfig, OtaConfig, PartialDownload, RetryPolicy, MAX_CHUNK_SIZE};
pub use decrypt::{ImageDecryptor, PassThrough};
pub use error::{BootStoreError, DecryptError, FlashError, OtaError, TransportError};
pub use events::{EventLog, EventSink, NoEvents, OtaEvent};
pub use flash::{EraseMode, FlashStorage, FlashWriter};
pub use image::{AppDescriptor, ChipId, DeviceIdentity, ImageHeader, IMAGE_PREFIX_LEN};
pub use region::Region;
pub use session::{StepOutcome, UpdateSession, Updater};
pub use slot::{UpdatePermit, UpdateSlot};
pub use state::{OtaState, Progress};
pub use stream::StreamReader;
pub use transport::{ByteRange, Request, ResponseHead, Transport, Url};

#[cfg(feature = "embedded-storage")]
pub use flash::NorFlashStorage;
