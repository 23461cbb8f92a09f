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

//! A software backend for whole-image MJPEG frames.

use std::collections::VecDeque;
use std::time::Duration;

use log::warn;

use super::{CodecKind, DecoderBackend, InputStatus, OutputEvent};
use crate::error::{DecoderError, DecoderResult};
use crate::frame::{DecodedPicture, OutputFormat};
use crate::image_decode::decode_jpeg;

enum Pending {
    Format(OutputFormat),
    Picture(DecodedPicture),
}

/// Decodes each submitted JPEG synchronously and queues the result until it
/// is polled.
pub struct MjpegBackend {
    queue_depth: usize,
    configured: bool,
    started: bool,
    pending: VecDeque<Pending>,
    /// Dimensions of the newest decoded picture.
    decoded_format: Option<OutputFormat>,
    /// Dimensions announced by the last polled format change.
    reported_format: Option<OutputFormat>,
}

impl Default for MjpegBackend {
    fn default() -> Self {
        Self::new(4)
    }
}

impl MjpegBackend {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queue_depth: queue_depth.max(1),
            configured: false,
            started: false,
            pending: VecDeque::new(),
            decoded_format: None,
            reported_format: None,
        }
    }

    fn queued_pictures(&self) -> usize {
        self.pending
            .iter()
            .filter(|p| matches!(p, Pending::Picture(_)))
            .count()
    }
}

impl DecoderBackend for MjpegBackend {
    fn configure(&mut self, codec: CodecKind) -> DecoderResult<()> {
        if codec != CodecKind::Mjpeg {
            return Err(DecoderError::Init(format!(
                "software backend cannot decode {}",
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
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        self.pending.clear();
    }

    fn release(&mut self) {
        self.stop();
        self.configured = false;
        self.decoded_format = None;
        self.reported_format = None;
    }

    fn submit_input(
        &mut self,
        data: &[u8],
        presentation_time: Duration,
    ) -> DecoderResult<InputStatus> {
        if !self.started {
            return Err(DecoderError::Backend("submit before start".into()));
        }
        if self.queued_pictures() >= self.queue_depth {
            return Ok(InputStatus::Busy);
        }

        match decode_jpeg(data) {
            Ok(mut picture) => {
                picture.presentation_time = presentation_time;
                let format = picture.format();
                if self.decoded_format != Some(format) {
                    self.decoded_format = Some(format);
                    self.pending.push_back(Pending::Format(format));
                }
                self.pending.push_back(Pending::Picture(picture));
            }
            Err(err) => warn!("Dropping undecodable picture ({} bytes): {err}", data.len()),
        }
        Ok(InputStatus::Accepted)
    }

    fn poll_output(&mut self) -> DecoderResult<OutputEvent> {
        Ok(match self.pending.pop_front() {
            None => OutputEvent::None,
            Some(Pending::Picture(picture)) => OutputEvent::PictureReady(picture),
            Some(Pending::Format(format)) => {
                self.reported_format = Some(format);
                OutputEvent::FormatChanged
            }
        })
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.reported_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecoderSession, DrainEvent, FeedStatus, MailboxSink, SessionState};
    use crate::image_decode::{encode_jpeg, test_pattern};
    use crate::mailbox::Mailbox;
    use std::sync::Arc;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        encode_jpeg(&test_pattern(width, height, 1), width, height, 80).unwrap()
    }

    #[test]
    fn refuses_h264() {
        let mut backend = MjpegBackend::default();
        assert!(matches!(
            backend.configure(CodecKind::H264),
            Err(DecoderError::Init(_))
        ));
    }

    #[test]
    fn reports_format_before_first_picture_and_on_resize() {
        let mut backend = MjpegBackend::new(8);
        backend.configure(CodecKind::Mjpeg).unwrap();
        backend.start().unwrap();

        for (w, h) in [(16, 16), (16, 16), (32, 8)] {
            assert_eq!(
                backend.submit_input(&jpeg(w, h), Duration::ZERO).unwrap(),
                InputStatus::Accepted
            );
        }

        let mut kinds = Vec::new();
        loop {
            match backend.poll_output().unwrap() {
                OutputEvent::None => break,
                OutputEvent::FormatChanged => {
                    let f = backend.output_format().unwrap();
                    kinds.push(format!("format {}x{}", f.width, f.height));
                }
                OutputEvent::PictureReady(p) => {
                    kinds.push(format!("picture {}x{}", p.width, p.height))
                }
            }
        }
        assert_eq!(
            kinds,
            vec![
                "format 16x16",
                "picture 16x16",
                "picture 16x16",
                "format 32x8",
                "picture 32x8"
            ]
        );
    }

    #[test]
    fn full_queue_answers_busy_and_garbage_is_dropped() {
        let mut backend = MjpegBackend::new(1);
        backend.configure(CodecKind::Mjpeg).unwrap();
        backend.start().unwrap();

        assert_eq!(
            backend.submit_input(b"garbage", Duration::ZERO).unwrap(),
            InputStatus::Accepted
        );
        assert_eq!(backend.poll_output().unwrap(), OutputEvent::None);

        let frame = jpeg(8, 8);
        assert_eq!(backend.submit_input(&frame, Duration::ZERO).unwrap(), InputStatus::Accepted);
        assert_eq!(backend.submit_input(&frame, Duration::ZERO).unwrap(), InputStatus::Busy);
    }

    #[test]
    fn session_delivers_pictures_to_the_mailbox() {
        let mailbox = Arc::new(Mailbox::new());
        let mut session = DecoderSession::new(MjpegBackend::default(), CodecKind::Mjpeg);
        session
            .configure(Box::new(MailboxSink::new(mailbox.clone())))
            .unwrap();

        let pts = Duration::from_millis(66);
        assert_eq!(session.feed(&jpeg(24, 12), pts), Ok(FeedStatus::Queued));
        let events = session.drain().unwrap();

        assert_eq!(
            events,
            vec![
                DrainEvent::FormatChanged(OutputFormat {
                    width: 24,
                    height: 12
                }),
                DrainEvent::Presented {
                    presentation_time: pts,
                    width: 24,
                    height: 12
                }
            ]
        );
        let picture = mailbox.take().unwrap();
        assert_eq!(picture.presentation_time, pts);
        assert_eq!(picture.pixels.len(), 24 * 12 * 4);
        assert_eq!(session.state(), SessionState::Running);
    }
}
