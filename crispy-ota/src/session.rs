// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update controller: `begin`, repeated `step`, then `finish` or `abort`.
//!
//! Data path per step:
//!
//! ```text
//! StreamReader -> chunk -> ImageDecryptor -> plain -> HeaderParser
//!                                                  -> FlashWriter + ImageVerifier + CRC
//! ```
//!
//! Nothing reaches flash until the header and application descriptor have
//! been accepted. The boot target only changes in [`UpdateSession::finish`].

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

use crate::boot::{BootImage, BootStore};
use crate::config::{OtaConfig, MAX_CHUNK_SIZE};
use crate::decrypt::{ImageDecryptor, PassThrough};
use crate::error::OtaError;
use crate::events::{EventSink, OtaEvent};
use crate::flash::{EraseMode, FlashStorage, FlashWriter};
use crate::image::{AppDescriptor, DeviceIdentity, HeaderParser, ImageVerifier};
use crate::region::Region;
use crate::slot::{UpdatePermit, UpdateSlot};
use crate::state::{OtaState, Progress};
use crate::stream::StreamReader;
use crate::transport::Transport;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Room for one decrypted chunk, block padding included.
const PLAIN_CAPACITY: usize = 2 * MAX_CHUNK_SIZE + 64;

/// Result of one [`UpdateSession::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepOutcome {
    /// More data expected; call `step` again.
    Continue,
    /// Every image byte is in flash; call `finish`.
    Done,
}

/// Collects the collaborators of an update before it starts.
pub struct Updater<'a, T: Transport, F: FlashStorage, B: BootStore> {
    transport: &'a mut T,
    flash: &'a mut F,
    boot: &'a mut B,
    decryptor: Option<&'a mut dyn ImageDecryptor>,
    events: Option<&'a mut dyn EventSink>,
}

impl<'a, T: Transport, F: FlashStorage, B: BootStore> Updater<'a, T, F, B> {
    pub fn new(transport: &'a mut T, flash: &'a mut F, boot: &'a mut B) -> Self {
        Self {
            transport,
            flash,
            boot,
            decryptor: None,
            events: None,
        }
    }

    /// Route every transport chunk through `decryptor` before it is parsed or written.
    pub fn with_decryptor(mut self, decryptor: &'a mut dyn ImageDecryptor) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn with_events(mut self, events: &'a mut dyn EventSink) -> Self {
        self.events = Some(events);
        self
    }

    /// Start an update, claiming the process-wide update slot.
    pub fn begin(self, config: &OtaConfig) -> Result<UpdateSession<'a, T, F, B>, OtaError> {
        self.begin_in(UpdateSlot::global(), config)
    }

    /// Start an update guarded by `slot`.
    pub fn begin_in(
        mut self,
        slot: &'a UpdateSlot,
        config: &OtaConfig,
    ) -> Result<UpdateSession<'a, T, F, B>, OtaError> {
        let http = config.validate()?;

        let Some(permit) = slot.acquire() else {
            warn!("ota: an update is already in progress");
            return Err(OtaError::AlreadyInProgress);
        };

        let region = resolve_target(&*self.boot, config)?;
        notify(&mut self.events, OtaEvent::Started);
        info!(
            "ota: starting update into 0x{:08x}+{}",
            region.offset,
            region.size
        );

        let reader = StreamReader::open(
            self.transport,
            http,
            config.retry,
            config.partial_download,
        )?;
        notify(&mut self.events, OtaEvent::Connected);

        if let Some(total) = reader.total_len() {
            if total > region.size {
                error!(
                    "ota: image of {} bytes does not fit region of {}",
                    total,
                    region.size
                );
                return Err(OtaError::InvalidArgument);
            }
        }

        let mode = if config.bulk_erase {
            EraseMode::Bulk
        } else {
            EraseMode::Incremental
        };
        let mut writer = FlashWriter::new(self.flash, region, mode)?;
        if mode == EraseMode::Bulk {
            writer.erase_all()?;
        }

        Ok(UpdateSession {
            permit: Some(permit),
            state: OtaState::Connected,
            reader,
            sink: ImageSink {
                writer,
                verifier: None,
                crc: Some(CRC32.digest()),
                verify_image: config.verify_image,
            },
            boot: self.boot,
            decryptor: self.decryptor,
            events: self.events,
            device: config.device,
            chunk_size: config.read_chunk_size,
            parser: HeaderParser::new(),
            header_written: false,
            drained: false,
            chunk: [0; MAX_CHUNK_SIZE],
            plain: [0; PLAIN_CAPACITY],
            plain_len: 0,
        })
    }

    /// Run a whole update: begin, step until done, finish. Any failure aborts.
    pub fn run(self, config: &OtaConfig) -> Result<(), OtaError> {
        self.run_in(UpdateSlot::global(), config)
    }

    pub fn run_in(self, slot: &'a UpdateSlot, config: &OtaConfig) -> Result<(), OtaError> {
        let mut session = self.begin_in(slot, config)?;
        let result = session.drive();
        if result.is_err() {
            let _ = session.abort();
        }
        result
    }
}

fn resolve_target<B: BootStore>(boot: &B, config: &OtaConfig) -> Result<Region, OtaError> {
    let Some(region) = config.target.or_else(|| boot.next_updatable_region()) else {
        warn!("ota: no updatable region");
        return Err(OtaError::InvalidArgument);
    };

    if region.checked_end().is_none() {
        warn!("ota: target 0x{:08x} runs past the address space", region.offset);
        return Err(OtaError::InvalidArgument);
    }

    let running = boot.current_region();
    if region.offset < running.end() && running.offset < region.end() {
        warn!(
            "ota: target 0x{:08x} overlaps the running image",
            region.offset
        );
        return Err(OtaError::InvalidArgument);
    }

    if region.size == 0 || !region.is_erase_aligned() {
        warn!("ota: target 0x{:08x} is not erase aligned", region.offset);
        return Err(OtaError::InvalidArgument);
    }

    Ok(region)
}

fn notify(events: &mut Option<&mut dyn EventSink>, event: OtaEvent) {
    if let Some(sink) = events.as_mut() {
        sink.notify(event);
    }
}

/// Everything that sees plaintext once it is cleared for flash.
struct ImageSink<'a, F: FlashStorage> {
    writer: FlashWriter<'a, F>,
    verifier: Option<ImageVerifier>,
    /// Running CRC-32 of the written image, taken by `commit`.
    crc: Option<Digest<'static, u32>>,
    verify_image: bool,
}

impl<F: FlashStorage> ImageSink<'_, F> {
    fn write(&mut self, data: &[u8]) -> Result<(), OtaError> {
        self.writer.write(data)?;
        if let Some(verifier) = self.verifier.as_mut() {
            verifier.update(data);
        }
        if let Some(crc) = self.crc.as_mut() {
            crc.update(data);
        }
        Ok(())
    }
}

/// A running update. Dropping it closes the connection and frees the slot
/// without touching the boot target.
pub struct UpdateSession<'a, T: Transport, F: FlashStorage, B: BootStore> {
    permit: Option<UpdatePermit<'a>>,
    state: OtaState,
    reader: StreamReader<'a, T>,
    sink: ImageSink<'a, F>,
    boot: &'a mut B,
    decryptor: Option<&'a mut dyn ImageDecryptor>,
    events: Option<&'a mut dyn EventSink>,
    device: DeviceIdentity,
    chunk_size: usize,
    parser: HeaderParser,
    /// The buffered header prefix has been handed to flash.
    header_written: bool,
    /// `ImageDecryptor::finish` has been called.
    drained: bool,
    chunk: [u8; MAX_CHUNK_SIZE],
    /// Decrypted bytes not yet parsed or written.
    plain: [u8; PLAIN_CAPACITY],
    plain_len: usize,
}

impl<'a, T: Transport, F: FlashStorage, B: BootStore> UpdateSession<'a, T, F, B> {
    /// Do one transport read and push the result towards flash.
    ///
    /// The first steps also parse and validate the image header; nothing is
    /// written before that succeeds. On error the session is `Failed` and only
    /// [`abort`](Self::abort) remains.
    pub fn step(&mut self) -> Result<StepOutcome, OtaError> {
        match self.state {
            OtaState::Complete => return Ok(StepOutcome::Done),
            OtaState::Connected | OtaState::HeaderValidated | OtaState::Receiving => {}
            state => {
                warn!("ota: step in state {:?}", state);
                return Err(OtaError::InvalidState);
            }
        }

        let result = self.advance();
        if let Err(err) = result {
            self.fail(err);
        }
        result
    }

    /// Read until the header and application descriptor are parsed, without
    /// writing anything. Later steps write the buffered bytes first.
    pub fn parse_header(&mut self) -> Result<&AppDescriptor, OtaError> {
        match self.state {
            OtaState::Connected => {
                if let Err(err) = self.pre_parse() {
                    self.fail(err);
                    return Err(err);
                }
            }
            OtaState::HeaderValidated | OtaState::Receiving | OtaState::Complete => {}
            _ => return Err(OtaError::InvalidState),
        }
        self.read_descriptor()
    }

    /// The application descriptor, once the header has been parsed.
    pub fn read_descriptor(&self) -> Result<&AppDescriptor, OtaError> {
        self.parser.descriptor().ok_or(OtaError::InvalidState)
    }

    /// All image bytes received and written.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, OtaState::Complete | OtaState::Finished)
    }

    /// Transport bytes received so far.
    pub fn bytes_received(&self) -> u32 {
        self.reader.consumed()
    }

    /// Image bytes handed to flash so far.
    pub fn bytes_written(&self) -> u32 {
        self.sink.writer.bytes_accepted()
    }

    /// Image length announced by the server, `None` for chunked transfers.
    pub fn declared_total_size(&self) -> Option<u32> {
        self.reader.total_len()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            received: self.bytes_received(),
            total: self.declared_total_size(),
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    pub fn target_region(&self) -> &Region {
        self.sink.writer.region()
    }

    /// Verify the image and make the target region the next boot target.
    ///
    /// Valid once `step` has returned `Done`. A verification or commit failure
    /// leaves the boot target untouched and the session `Failed`.
    pub fn finish(&mut self) -> Result<(), OtaError> {
        match self.state {
            OtaState::Complete => {}
            OtaState::Connected | OtaState::HeaderValidated | OtaState::Receiving => {
                warn!(
                    "ota: finish before the image is complete ({} bytes in)",
                    self.bytes_received()
                );
                return Err(OtaError::InvalidState);
            }
            _ => return Err(OtaError::InvalidState),
        }

        if let Err(err) = self.commit() {
            self.fail(err);
            return Err(err);
        }

        self.reader.close();
        self.state = OtaState::Finished;
        self.emit(OtaEvent::Finished);
        self.permit = None;
        info!("ota: update finished");
        Ok(())
    }

    /// Stop the update. The boot target is never touched; whatever reached
    /// flash stays unreferenced.
    pub fn abort(&mut self) -> Result<(), OtaError> {
        if self.state.is_terminal() {
            return Err(OtaError::InvalidState);
        }

        self.reader.close();
        self.state = OtaState::Aborted;
        self.emit(OtaEvent::Aborted);
        self.permit = None;
        info!("ota: update aborted after {} bytes", self.bytes_received());
        Ok(())
    }

    fn drive(&mut self) -> Result<(), OtaError> {
        while self.step()? == StepOutcome::Continue {}
        self.finish()
    }

    fn advance(&mut self) -> Result<StepOutcome, OtaError> {
        // `decrypt` always starts with an empty plaintext buffer.
        if self.plain_len > 0 && self.parser.is_complete() {
            self.write_pending()?;
        }

        let n = self.reader.read(&mut self.chunk[..self.chunk_size])?;
        if n > 0 {
            self.decrypt(n)?;
        }

        let done = n == 0
            || self
                .reader
                .total_len()
                .is_some_and(|total| self.reader.consumed() >= total);
        if done {
            self.drain()?;
        }

        if self.parse_pending()? {
            self.write_pending()?;
        }

        if !done {
            trace!(
                "ota: {} bytes received, {} written",
                self.bytes_received(),
                self.bytes_written()
            );
            return Ok(StepOutcome::Continue);
        }

        if !self.parser.is_complete() {
            error!(
                "ota: stream ended inside the image header ({} bytes)",
                self.bytes_received()
            );
            return Err(OtaError::ImageValidationFailed);
        }

        self.sink.writer.flush()?;
        self.reader.close();
        self.state = OtaState::Complete;
        info!(
            "ota: received {} bytes, wrote {}",
            self.bytes_received(),
            self.bytes_written()
        );
        Ok(StepOutcome::Done)
    }

    fn pre_parse(&mut self) -> Result<(), OtaError> {
        loop {
            let n = self.reader.read(&mut self.chunk[..self.chunk_size])?;
            if n > 0 {
                self.decrypt(n)?;
            } else {
                self.drain()?;
            }

            if self.parse_pending()? {
                return Ok(());
            }

            if n == 0 {
                error!("ota: stream ended before the image header");
                return Err(OtaError::ImageValidationFailed);
            }
        }
    }

    /// Decrypt the first `n` bytes of `chunk` onto the end of `plain`.
    fn decrypt(&mut self, n: usize) -> Result<(), OtaError> {
        let input = &self.chunk[..n];
        let out = &mut self.plain[self.plain_len..];

        let produced = match self.decryptor.as_mut() {
            Some(decryptor) => decryptor.decrypt(input, out).map_err(|err| {
                error!("ota: decryption failed at {}: {:?}", self.reader.consumed(), err);
                OtaError::from(err)
            })?,
            None => PassThrough.decrypt(input, out)?,
        };

        if produced > PLAIN_CAPACITY - self.plain_len {
            error!("ota: decryptor produced {} bytes, no room", produced);
            return Err(OtaError::OutOfMemory);
        }
        self.plain_len += produced;

        if self.decryptor.is_some() {
            self.emit(OtaEvent::DecryptInvoked { len: n as u32 });
        }
        Ok(())
    }

    /// Collect bytes the decryptor held back. Runs once, at end of stream.
    fn drain(&mut self) -> Result<(), OtaError> {
        if self.drained {
            return Ok(());
        }
        self.drained = true;

        let Some(decryptor) = self.decryptor.as_mut() else {
            return Ok(());
        };
        let out = &mut self.plain[self.plain_len..];
        let room = out.len();
        let produced = decryptor.finish(out).map_err(|err| {
            error!("ota: decryptor finish failed: {:?}", err);
            OtaError::from(err)
        })?;
        if produced > room {
            return Err(OtaError::OutOfMemory);
        }
        self.plain_len += produced;
        Ok(())
    }

    /// Feed pending plaintext to the header parser. `true` once the header
    /// and descriptor are accepted.
    fn parse_pending(&mut self) -> Result<bool, OtaError> {
        if self.parser.is_complete() {
            return Ok(true);
        }

        let had_header = self.parser.header().is_some();
        let used = self
            .parser
            .feed(&self.plain[..self.plain_len], &self.device)?;
        self.plain.copy_within(used..self.plain_len, 0);
        self.plain_len -= used;

        if !had_header {
            if let Some(header) = self.parser.header().copied() {
                self.emit(OtaEvent::HeaderRead {
                    segments: header.segment_count,
                });
                self.emit(OtaEvent::ChipIdVerified { chip: header.chip });
                if self.sink.verify_image {
                    self.sink.verifier = Some(ImageVerifier::new(&header));
                }
            }
        }

        if !self.parser.is_complete() {
            return Ok(false);
        }

        self.state = OtaState::HeaderValidated;
        if let Some(desc) = self.parser.descriptor() {
            info!(
                "ota: image {} version {}",
                desc.project_name.as_str(),
                desc.version.as_str()
            );
        }
        Ok(true)
    }

    /// Write the header prefix once, then any pending plaintext.
    fn write_pending(&mut self) -> Result<(), OtaError> {
        let offset = self.sink.writer.bytes_accepted();

        if !self.header_written {
            self.sink.write(self.parser.bytes())?;
            self.header_written = true;
            self.state = OtaState::Receiving;
        }

        if self.plain_len > 0 {
            self.sink.write(&self.plain[..self.plain_len])?;
            self.plain_len = 0;
        }

        let len = self.sink.writer.bytes_accepted() - offset;
        if len > 0 {
            self.emit(OtaEvent::FlashWrite { offset, len });
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), OtaError> {
        if let Some(total) = self.reader.total_len() {
            if self.reader.consumed() != total {
                error!(
                    "ota: received {} of {} bytes",
                    self.reader.consumed(),
                    total
                );
                return Err(OtaError::ImageValidationFailed);
            }
        }

        if let Some(verifier) = self.sink.verifier.take() {
            verifier.finish()?;
        }

        let image = BootImage {
            size: self.sink.writer.bytes_accepted(),
            crc32: self.sink.crc.take().map_or(0, |digest| digest.finalize()),
        };
        let region = *self.sink.writer.region();
        self.boot.set_next_boot(&region, &image)?;
        self.emit(OtaEvent::BootTargetUpdated {
            offset: region.offset,
        });
        Ok(())
    }

    fn fail(&mut self, err: OtaError) {
        error!("ota: update failed in {:?}: {:?}", self.state, err);
        self.reader.close();
        self.state = OtaState::Failed;
    }

    fn emit(&mut self, event: OtaEvent) {
        notify(&mut self.events, event);
    }
}

impl<T: Transport, F: FlashStorage, B: BootStore> Drop for UpdateSession<'_, T, F, B> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!("ota: session dropped in state {:?}", self.state);
        }
    }
}
