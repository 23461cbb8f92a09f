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

//! The object an embedding application holds for one video feed.
//!
//! It owns the receive thread and the mailboxes; the application keeps the
//! context (or a handle to it) and polls it from its render loop.

use std::net::SocketAddr;
use std::sync::Arc;

use log::info;

use crate::config::FeedConfig;
use crate::decoder::{CodecKind, DecoderBackend};
use crate::error::{ConfigError, FeedError};
use crate::frame::{CompletedFrame, DecodedPicture};
use crate::mailbox::Mailbox;
use crate::pipeline::{FramePipeline, StreamPipeline, StreamSource};
use crate::receiver::{ReceiverHandle, UdpReceiver};
use crate::stats::{ReceiverStats, StatsSnapshot};

pub struct FeedContext {
    config: FeedConfig,
    frames: Arc<Mailbox<CompletedFrame>>,
    pictures: Arc<Mailbox<DecodedPicture>>,
    stats: Arc<ReceiverStats>,
    receiver: Option<ReceiverHandle>,
}

impl FeedContext {
    pub fn new(config: FeedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            frames: Arc::new(Mailbox::new()),
            pictures: Arc::new(Mailbox::new()),
            stats: Arc::new(ReceiverStats::new()),
            receiver: None,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Receives fragmented frames into the frame mailbox. A receiver that is
    /// already running is stopped first.
    pub fn start_frames(&mut self) -> Result<SocketAddr, FeedError> {
        self.stop();
        let pipeline = FramePipeline::new(
            self.config.reassembly.clone(),
            self.frames.clone(),
            self.stats.clone(),
        );
        self.install(UdpReceiver::spawn(&self.config.socket, pipeline)?)
    }

    /// Receives a coded stream, decodes it with `backend` and publishes
    /// pictures to the picture mailbox. A receiver that is already running
    /// is stopped first.
    pub fn start_stream<B: DecoderBackend + 'static>(
        &mut self,
        backend: B,
        codec: CodecKind,
        source: StreamSource,
    ) -> Result<SocketAddr, FeedError> {
        self.stop();
        let pipeline = StreamPipeline::new(
            backend,
            codec,
            source,
            &self.config.extractor,
            self.config.stream.clone(),
            self.pictures.clone(),
            self.stats.clone(),
        )?;
        self.install(UdpReceiver::spawn(&self.config.socket, pipeline)?)
    }

    fn install(&mut self, receiver: ReceiverHandle) -> Result<SocketAddr, FeedError> {
        let addr = receiver.local_addr();
        self.receiver = Some(receiver);
        Ok(addr)
    }

    pub fn is_running(&self) -> bool {
        self.receiver.as_ref().is_some_and(ReceiverHandle::is_running)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(ReceiverHandle::local_addr)
    }

    /// Copy of the newest verified frame, or an empty buffer if none has
    /// arrived yet.
    pub fn latest_frame(&self) -> Vec<u8> {
        self.frames.peek(|f| f.map(|f| f.data.clone()).unwrap_or_default())
    }

    /// Removes the newest verified frame from the mailbox.
    pub fn take_frame(&self) -> Option<CompletedFrame> {
        self.frames.take()
    }

    pub fn take_picture(&self) -> Option<DecodedPicture> {
        self.pictures.take()
    }

    pub fn frames(&self) -> Arc<Mailbox<CompletedFrame>> {
        self.frames.clone()
    }

    pub fn pictures(&self) -> Arc<Mailbox<DecodedPicture>> {
        self.pictures.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            info!("Stopping feed on {}", receiver.local_addr());
            receiver.stop();
        }
    }
}

impl Drop for FeedContext {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketConfig;
    use crate::decoder::MjpegBackend;

    fn loopback() -> FeedConfig {
        FeedConfig {
            socket: SocketConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                read_timeout_ms: 10,
                ..SocketConfig::default()
            },
            ..FeedConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = FeedConfig::default();
        config.reassembly.pool_size = 0;
        assert!(FeedContext::new(config).is_err());
    }

    #[test]
    fn latest_frame_is_empty_before_anything_arrives() {
        let context = FeedContext::new(loopback()).unwrap();
        assert!(context.latest_frame().is_empty());
        assert!(context.take_picture().is_none());
        assert!(!context.is_running());
    }

    #[test]
    fn restarting_replaces_the_running_receiver() {
        let mut context = FeedContext::new(loopback()).unwrap();
        let first = context.start_frames().unwrap();
        assert!(context.is_running());

        let reassembly = context.config().reassembly.clone();
        let second = context
            .start_stream(
                MjpegBackend::default(),
                CodecKind::Mjpeg,
                StreamSource::Fragmented(reassembly),
            )
            .unwrap();
        assert!(context.is_running());
        assert_eq!(context.local_addr(), Some(second));
        assert_eq!(first.ip(), second.ip());

        context.stop();
        assert!(!context.is_running());
        assert!(context.local_addr().is_none());
    }

    #[test]
    fn decoder_init_failure_is_surfaced() {
        let mut context = FeedContext::new(loopback()).unwrap();
        let result = context.start_stream(
            MjpegBackend::default(),
            CodecKind::H264,
            StreamSource::Rtp { header_len: 12 },
        );
        assert!(matches!(result, Err(FeedError::Decoder(_))));
        assert!(!context.is_running());
    }
}
