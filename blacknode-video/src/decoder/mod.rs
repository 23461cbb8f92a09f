/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The decoder session state machine and the interfaces it drives.
//!
//! A [`DecoderBackend`] is the stateful platform decoder (hardware session,
//! software codec, recorder). An [`OutputSink`] is the surface pictures are
//! presented on. [`DecoderSession`] sequences the two so that a failed setup
//! never leaves a half-running session behind.

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{DecoderError, DecoderResult};
use crate::frame::{DecodedPicture, OutputFormat};

mod mjpeg;
mod sink;

pub use self::mjpeg::MjpegBackend;
pub use self::sink::MailboxSink;

/// An enumeration of the coded formats a backend may be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Whole JPEG images, one per reassembled frame.
    Mjpeg,
    /// H.264 Annex B elementary stream.
    H264,
}

impl CodecKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            CodecKind::Mjpeg => "video/mjpeg",
            CodecKind::H264 => "video/avc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Configured,
    Running,
    /// The backend reported new output dimensions that the sink has not
    /// been resized for yet.
    FormatPending,
    Released,
}

/// Answer of [`DecoderBackend::submit_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Accepted,
    /// No input slot free right now; resubmit later.
    Busy,
}

/// Answer of [`DecoderBackend::poll_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    None,
    PictureReady(DecodedPicture),
    /// New dimensions are available from [`DecoderBackend::output_format`].
    FormatChanged,
}

/// A stateful video decoder.
pub trait DecoderBackend: Send {
    fn configure(&mut self, codec: CodecKind) -> DecoderResult<()>;

    fn start(&mut self) -> DecoderResult<()>;

    fn stop(&mut self);

    /// Frees every resource. A released backend may be configured again.
    fn release(&mut self);

    fn submit_input(&mut self, data: &[u8], presentation_time: Duration)
        -> DecoderResult<InputStatus>;

    fn poll_output(&mut self) -> DecoderResult<OutputEvent>;

    fn output_format(&self) -> Option<OutputFormat>;
}

/// Where decoded pictures end up: a render surface, a texture upload, a
/// mailbox.
pub trait OutputSink: Send {
    fn bind(&mut self) -> DecoderResult<()>;

    fn set_geometry(&mut self, width: u32, height: u32) -> DecoderResult<()>;

    fn present(&mut self, picture: DecodedPicture) -> DecoderResult<()>;

    fn unbind(&mut self);
}

/// Result of [`DecoderSession::feed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Queued,
    /// The unit was not taken; the caller keeps it and retries.
    Busy,
}

/// One thing [`DecoderSession::drain`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEvent {
    Presented {
        presentation_time: Duration,
        width: u32,
        height: u32,
    },
    FormatChanged(OutputFormat),
}

pub struct DecoderSession<B: DecoderBackend> {
    backend: B,
    codec: CodecKind,
    sink: Option<Box<dyn OutputSink>>,
    state: SessionState,
    format: Option<OutputFormat>,
}

fn init_error(stage: &str, err: DecoderError) -> DecoderError {
    match err {
        DecoderError::Init(msg) => DecoderError::Init(format!("{stage}: {msg}")),
        other => DecoderError::Init(format!("{stage}: {other}")),
    }
}

impl<B: DecoderBackend> DecoderSession<B> {
    pub fn new(backend: B, codec: CodecKind) -> Self {
        Self {
            backend,
            codec,
            sink: None,
            state: SessionState::Uninitialized,
            format: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    /// Output dimensions the sink was last resized to.
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.format
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Configures the backend, binds `sink` and starts decoding. Any failure
    /// tears down whatever was set up and leaves the session `Released`.
    /// Calling this on a live session releases it first.
    pub fn configure(&mut self, mut sink: Box<dyn OutputSink>) -> DecoderResult<()> {
        if self.is_live() {
            self.release();
        }

        if let Err(err) = self.backend.configure(self.codec) {
            self.backend.release();
            self.state = SessionState::Released;
            return Err(init_error("configure", err));
        }
        self.state = SessionState::Configured;

        if let Err(err) = sink.bind() {
            self.backend.release();
            self.state = SessionState::Released;
            return Err(init_error("bind sink", err));
        }

        if let Err(err) = self.backend.start() {
            sink.unbind();
            self.backend.release();
            self.state = SessionState::Released;
            return Err(init_error("start", err));
        }

        self.sink = Some(sink);
        self.format = None;
        self.state = SessionState::Running;
        info!("Decoder running ({})", self.codec.mime_type());
        Ok(())
    }

    /// Submits one coded unit. `Busy` is flow control, not failure.
    pub fn feed(&mut self, unit: &[u8], presentation_time: Duration) -> DecoderResult<FeedStatus> {
        if self.state != SessionState::Running {
            return Err(DecoderError::NotReady { state: self.state });
        }
        match self.backend.submit_input(unit, presentation_time)? {
            InputStatus::Accepted => Ok(FeedStatus::Queued),
            InputStatus::Busy => Ok(FeedStatus::Busy),
        }
    }

    /// Presents every picture the backend has ready, resizing the sink on
    /// format changes.
    pub fn drain(&mut self) -> DecoderResult<Vec<DrainEvent>> {
        match self.state {
            SessionState::Running => {}
            SessionState::FormatPending => {
                self.apply_format()?;
            }
            state => return Err(DecoderError::NotReady { state }),
        }

        let mut events = Vec::new();
        loop {
            match self.backend.poll_output()? {
                OutputEvent::None => break,
                OutputEvent::PictureReady(picture) => {
                    let event = DrainEvent::Presented {
                        presentation_time: picture.presentation_time,
                        width: picture.width,
                        height: picture.height,
                    };
                    self.sink_mut()?.present(picture)?;
                    events.push(event);
                }
                OutputEvent::FormatChanged => {
                    self.state = SessionState::FormatPending;
                    let format = self.apply_format()?;
                    events.push(DrainEvent::FormatChanged(format));
                }
            }
        }
        Ok(events)
    }

    fn apply_format(&mut self) -> DecoderResult<OutputFormat> {
        let format = self.backend.output_format().ok_or_else(|| {
            DecoderError::Backend("format change reported without an output format".into())
        })?;
        self.sink_mut()?.set_geometry(format.width, format.height)?;
        if self.format != Some(format) {
            debug!("Output format {}x{}", format.width, format.height);
        }
        self.format = Some(format);
        self.state = SessionState::Running;
        Ok(format)
    }

    fn sink_mut(&mut self) -> DecoderResult<&mut Box<dyn OutputSink>> {
        self.sink
            .as_mut()
            .ok_or_else(|| DecoderError::Sink("no sink bound".into()))
    }

    fn is_live(&self) -> bool {
        matches!(
            self.state,
            SessionState::Configured | SessionState::Running | SessionState::FormatPending
        )
    }

    /// Same as [`Self::release`]; a later `configure` starts from scratch.
    pub fn reset(&mut self) {
        self.release();
    }

    /// Stops the backend and frees the backend and sink.
    pub fn release(&mut self) {
        if self.is_live() {
            self.backend.stop();
            self.backend.release();
        }
        if let Some(mut sink) = self.sink.take() {
            sink.unbind();
        }
        if self.state != SessionState::Uninitialized && self.state != SessionState::Released {
            info!("Decoder released");
        }
        if self.state != SessionState::Uninitialized {
            self.state = SessionState::Released;
        }
        self.format = None;
    }
}

impl<B: DecoderBackend> Drop for DecoderSession<B> {
    fn drop(&mut self) {
        if self.is_live() {
            warn!("Decoder session dropped while {:?}", self.state);
        }
        self.release();
    }
}
