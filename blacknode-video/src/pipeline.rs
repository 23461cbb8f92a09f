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

//! Receive-thread handlers that wire the stages together.
//!
//! [`FramePipeline`] reassembles whole frames into a mailbox.
//! [`StreamPipeline`] additionally extracts coded units and drives a
//! [`DecoderSession`], so reassembly, extraction and decode all run on the
//! socket's thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, trace, warn};

use crate::config::{ExtractorConfig, ReassemblyConfig, StreamConfig};
use crate::decoder::{
    CodecKind, DecoderBackend, DecoderSession, DrainEvent, FeedStatus, MailboxSink,
};
use crate::error::{DecoderError, DecoderResult, HeaderError, ReassemblyError};
use crate::extractor::{CodedPictureUnit, ElementaryStreamExtractor, NAL_PPS, NAL_SPS};
use crate::frame::{CompletedFrame, DecodedPicture};
use crate::mailbox::Mailbox;
use crate::reassembly::FrameReassemblyEngine;
use crate::receiver::DatagramHandler;
use crate::stats::ReceiverStats;

/// Units waiting for a decoder input slot beyond this are dropped oldest
/// first.
const MAX_PENDING_UNITS: usize = 64;

pub struct FramePipeline {
    engine: FrameReassemblyEngine,
    frames: Arc<Mailbox<CompletedFrame>>,
    stats: Arc<ReceiverStats>,
}

impl FramePipeline {
    pub fn new(
        config: ReassemblyConfig,
        frames: Arc<Mailbox<CompletedFrame>>,
        stats: Arc<ReceiverStats>,
    ) -> Self {
        Self {
            engine: FrameReassemblyEngine::with_stats(config, stats.clone()),
            frames,
            stats,
        }
    }

    pub fn engine(&self) -> &FrameReassemblyEngine {
        &self.engine
    }
}

impl DatagramHandler for FramePipeline {
    fn on_datagram(&mut self, datagram: &[u8], now: Instant) {
        self.stats.datagram();
        if let Some(frame) = self.engine.ingest_at(datagram, now) {
            if let Some(unread) = self.frames.put(frame) {
                trace!("Frame {} replaced before it was read", unread.frame_id);
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        self.engine.sweep(now);
    }
}

/// Where a [`StreamPipeline`] gets its bytes from.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSource {
    /// Fragment-protocol datagrams, reassembled into frames first.
    Fragmented(ReassemblyConfig),
    /// Raw RTP datagrams; the fixed header is stripped and the payload is
    /// appended to the elementary stream.
    Rtp { header_len: usize },
}

enum Ingress {
    /// Every reassembled frame is one unit (whole-image codecs).
    WholeFrames(FrameReassemblyEngine),
    /// Reassembled frames are a slice of a continuous elementary stream.
    FragmentedStream(FrameReassemblyEngine),
    Rtp { header_len: usize },
}

pub struct StreamPipeline<B: DecoderBackend> {
    ingress: Ingress,
    extractor: ElementaryStreamExtractor,
    session: DecoderSession<B>,
    stream: StreamConfig,
    pending: VecDeque<(Bytes, Duration)>,
    units_seen: u64,
    stats: Arc<ReceiverStats>,
}

impl<B: DecoderBackend> StreamPipeline<B> {
    /// Configures a decoder session presenting into `pictures`. Fails with
    /// [`DecoderError::Init`] when the session cannot be set up.
    pub fn new(
        backend: B,
        codec: CodecKind,
        source: StreamSource,
        extractor: &ExtractorConfig,
        stream: StreamConfig,
        pictures: Arc<Mailbox<DecodedPicture>>,
        stats: Arc<ReceiverStats>,
    ) -> DecoderResult<Self> {
        let ingress = match (source, codec) {
            (StreamSource::Fragmented(config), CodecKind::Mjpeg) => {
                Ingress::WholeFrames(FrameReassemblyEngine::with_stats(config, stats.clone()))
            }
            (StreamSource::Fragmented(config), CodecKind::H264) => {
                Ingress::FragmentedStream(FrameReassemblyEngine::with_stats(config, stats.clone()))
            }
            (StreamSource::Rtp { header_len }, CodecKind::H264) => Ingress::Rtp { header_len },
            (StreamSource::Rtp { .. }, CodecKind::Mjpeg) => {
                return Err(DecoderError::Init(
                    "MJPEG frames need the fragmented source".into(),
                ))
            }
        };

        let mut session = DecoderSession::new(backend, codec);
        session.configure(Box::new(MailboxSink::new(pictures)))?;

        Ok(Self {
            ingress,
            extractor: ElementaryStreamExtractor::with_stats(extractor, stats.clone()),
            session,
            stream,
            pending: VecDeque::new(),
            units_seen: 0,
            stats,
        })
    }

    pub fn session(&self) -> &DecoderSession<B> {
        &self.session
    }

    /// Units accepted from the network but not yet taken by the decoder.
    pub fn pending_units(&self) -> usize {
        self.pending.len()
    }

    fn next_presentation_time(&mut self) -> Duration {
        let pts = self.stream.presentation_time(self.units_seen);
        self.units_seen += 1;
        pts
    }

    fn enqueue(&mut self, unit: Bytes) {
        let pts = self.next_presentation_time();
        if self.pending.len() >= MAX_PENDING_UNITS {
            warn!("Decoder backlog full, dropping oldest unit");
            self.pending.pop_front();
        }
        self.pending.push_back((unit, pts));
    }

    fn enqueue_coded(&mut self, unit: CodedPictureUnit) {
        match unit.nal_type() {
            Some(NAL_SPS) => debug!("SPS ({} bytes)", unit.len()),
            Some(NAL_PPS) => debug!("PPS ({} bytes)", unit.len()),
            _ => {}
        }
        self.enqueue(unit.into_bytes());
    }

    fn extract_all(&mut self) {
        while let Some(unit) = self.extractor.extract_next() {
            self.enqueue_coded(unit);
        }
    }

    /// Feeds queued units in order until the decoder stops accepting.
    fn pump(&mut self) {
        while let Some((unit, pts)) = self.pending.front() {
            match self.session.feed(unit, *pts) {
                Ok(FeedStatus::Queued) => {
                    self.pending.pop_front();
                }
                Ok(FeedStatus::Busy) => {
                    self.stats.decoder_busy();
                    break;
                }
                Err(e) => {
                    warn!("Dropping unit the decoder refused: {e}");
                    self.pending.pop_front();
                }
            }
        }
    }

    fn drain(&mut self) {
        match self.session.drain() {
            Ok(events) => {
                for event in events {
                    match event {
                        DrainEvent::Presented { .. } => self.stats.picture_decoded(),
                        DrainEvent::FormatChanged(format) => {
                            info!("Decoder output is now {}x{}", format.width, format.height)
                        }
                    }
                }
            }
            Err(e) => warn!("Decoder drain failed: {e}"),
        }
    }
}

impl<B: DecoderBackend + 'static> DatagramHandler for StreamPipeline<B> {
    fn on_datagram(&mut self, datagram: &[u8], now: Instant) {
        self.stats.datagram();
        match &mut self.ingress {
            Ingress::WholeFrames(engine) => {
                if let Some(frame) = engine.ingest_at(datagram, now) {
                    self.enqueue(Bytes::from(frame.data));
                }
            }
            Ingress::FragmentedStream(engine) => {
                if let Some(frame) = engine.ingest_at(datagram, now) {
                    self.extractor.append(&frame.data);
                    self.extract_all();
                }
            }
            Ingress::Rtp { header_len } => {
                let header_len = *header_len;
                if datagram.len() <= header_len {
                    let err = ReassemblyError::MalformedHeader(HeaderError::TooShort {
                        needed: header_len + 1,
                        actual: datagram.len(),
                    });
                    trace!("Dropping datagram: {err}");
                    self.stats.record(&err);
                    return;
                }
                self.extractor.append(&datagram[header_len..]);
                self.extract_all();
            }
        }
        self.pump();
        self.drain();
    }

    fn tick(&mut self, now: Instant) {
        if let Ingress::WholeFrames(engine) | Ingress::FragmentedStream(engine) =
            &mut self.ingress
        {
            engine.sweep(now);
        }
        self.pump();
        self.drain();
    }

    fn on_stop(&mut self) {
        if let Some(unit) = self.extractor.flush() {
            self.enqueue_coded(unit);
        }
        self.pump();
        self.drain();
        if !self.pending.is_empty() {
            debug!("{} units left undecoded at stop", self.pending.len());
        }
        self.session.release();
    }
}
