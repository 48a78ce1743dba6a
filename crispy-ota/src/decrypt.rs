// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Optional decryption stage between the transport and flash.

use crate::error::DecryptError;

/// Transforms transport bytes into image bytes before they are parsed and
/// written.
///
/// Implementations may hold back bytes (block ciphers, authentication tags)
/// and release them later, so one call may produce fewer or more bytes than
/// it was given. The engine always offers an output buffer of at least
/// `2 * ciphertext.len() + 64` bytes.
pub trait ImageDecryptor {
    /// Decrypt `ciphertext` into `plaintext`, returning the number of bytes produced.
    fn decrypt(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<usize, DecryptError>;

    /// Flush any bytes still held back once the transport is exhausted.
    fn finish(&mut self, _plaintext: &mut [u8]) -> Result<usize, DecryptError> {
        Ok(0)
    }
}

/// Identity transform, used when no decryptor is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ImageDecryptor for PassThrough {
    fn decrypt(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<usize, DecryptError> {
        let out = plaintext
            .get_mut(..ciphertext.len())
            .ok_or(DecryptError::OutputTooSmall)?;
        out.copy_from_slice(ciphertext);
        Ok(ciphertext.len())
    }
}

impl<D: ImageDecryptor + ?Sized> ImageDecryptor for &mut D {
    fn decrypt(&mut self, ciphertext: &[u8], plaintext: &mut [u8]) -> Result<usize, DecryptError> {
        (**self).decrypt(ciphertext, plaintext)
    }

    fn finish(&mut self, plaintext: &mut [u8]) -> Result<usize, DecryptError> {
        (**self).finish(plaintext)
    }
}
