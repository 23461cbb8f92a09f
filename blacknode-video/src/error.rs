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

//! Error types for every stage of the feed pipeline.
//!
//! Network-input errors ([`HeaderError`], [`ReassemblyError`]) never leave the
//! receive thread: they are logged, counted and the datagram is dropped.
//! [`DecoderError`] and [`ConfigError`] are surfaced to the embedding
//! application.

use thiserror::Error;

use crate::decoder::SessionState;

/// Failures while decoding or encoding a fragment header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("datagram too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("field {field} value {value} does not fit the header layout")]
    FieldOverflow { field: &'static str, value: u64 },
}

/// The reason a structurally valid header was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundsViolation {
    #[error("total_packets is zero")]
    ZeroTotalPackets,

    #[error("payload_len is zero")]
    ZeroPayload,

    #[error("total_packets {0} exceeds the configured ceiling {1}")]
    TooManyPackets(u32, u32),

    #[error("payload_len {0} exceeds the per-fragment capacity {1}")]
    PayloadTooLarge(u32, usize),

    #[error("payload_len {declared} exceeds the {available} bytes carried by the datagram")]
    TruncatedPayload { declared: u32, available: usize },

    #[error("packet_index {index} out of range for {total} packets")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("total_packets changed mid-frame from {slot} to {packet}")]
    InconsistentTotal { slot: u32, packet: u32 },
}

/// Everything that can make the reassembly engine drop input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("malformed header: {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error("protocol bounds violation: {0}")]
    ProtocolBoundsViolation(#[from] BoundsViolation),

    #[error("frame {frame_id} timed out before all fragments arrived")]
    FrameTimeout { frame_id: u32 },

    #[error("frame {frame_id} failed CRC-32: expected {expected:#010x}, computed {actual:#010x}")]
    IntegrityMismatch {
        frame_id: u32,
        expected: u32,
        actual: u32,
    },

    #[error("frame {frame_id} is {size} bytes, above the {limit} byte limit")]
    FrameTooLarge {
        frame_id: u32,
        size: usize,
        limit: usize,
    },
}

/// Result type for decoder session operations
pub type DecoderResult<T> = std::result::Result<T, DecoderError>;

/// Errors reported by [`crate::decoder::DecoderSession`] and its backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// Creating, binding or starting the decoder failed.
    #[error("decoder initialization failed: {0}")]
    Init(String),

    /// `feed`/`drain` called while the session is not running.
    #[error("decoder not ready (state {state:?})")]
    NotReady { state: SessionState },

    #[error("decoder backend error: {0}")]
    Backend(String),

    #[error("output sink error: {0}")]
    Sink(String),

    #[error("image decode failed: {0}")]
    Image(String),
}

/// Failures starting a receiver from a [`crate::context::FeedContext`].
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("socket setup failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decoder(#[from] DecoderError),
}

/// Errors raised while loading or validating a [`crate::config::FeedConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}
