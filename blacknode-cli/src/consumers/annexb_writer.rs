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

//! A recording decoder backend: every coded unit is appended to a file as
//! is, producing an Annex B stream playable by common tools.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use blacknode_video::decoder::{CodecKind, DecoderBackend, InputStatus, OutputEvent};
use blacknode_video::error::{DecoderError, DecoderResult};
use blacknode_video::OutputFormat;
use tracing::{info, warn};

pub struct AnnexBWriter {
    path: PathBuf,
    configured: bool,
    writer: Option<BufWriter<File>>,
    units: u64,
    bytes: u64,
}

impl AnnexBWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            configured: false,
            writer: None,
            units: 0,
            bytes: 0,
        }
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush {}: {e}", self.path.display());
            }
        }
    }
}

impl DecoderBackend for AnnexBWriter {
    fn configure(&mut self, codec: CodecKind) -> DecoderResult<()> {
        if codec != CodecKind::H264 {
            return Err(DecoderError::Init(format!(
                "cannot record {} as Annex B",
                codec.mime_type()
            )));
        }
        self.configured = true;
        Ok(())
    }

    fn start(&mut self) -> DecoderResult<()> {
        if !self.configured {
            return Err(DecoderError::Backend("start before configure".into()));
        }
        let file = File::create(&self.path).map_err(|e| {
            DecoderError::Init(format!("cannot create {}: {e}", self.path.display()))
        })?;
        self.writer = Some(BufWriter::new(file));
        info!("Recording to {}", self.path.display());
        Ok(())
    }

    fn stop(&mut self) {
        self.flush();
    }

    fn release(&mut self) {
        self.flush();
        if self.writer.take().is_some() {
            info!(
                "Wrote {} units ({} bytes) to {}",
                self.units,
                self.bytes,
                self.path.display()
            );
        }
        self.configured = false;
    }

    fn submit_input(
        &mut self,
        data: &[u8],
        _presentation_time: Duration,
    ) -> DecoderResult<InputStatus> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DecoderError::Backend("recorder not started".into()))?;
        writer
            .write_all(data)
            .map_err(|e| DecoderError::Backend(e.to_string()))?;
        self.units += 1;
        self.bytes += data.len() as u64;
        Ok(InputStatus::Accepted)
    }

    fn poll_output(&mut self) -> DecoderResult<OutputEvent> {
        Ok(OutputEvent::None)
    }

    fn output_format(&self) -> Option<OutputFormat> {
        None
    }
}
