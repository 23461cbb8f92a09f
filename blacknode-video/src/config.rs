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

//! Runtime configuration. Every field has a default so a JSON file only needs
//! to name what it changes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::header::{HeaderLayout, RTP_HEADER_LEN};

/// UDP port of the fragmented image feed.
pub const VIDEO_PORT: u16 = 50000;
/// UDP port of the RTP elementary stream.
pub const RTP_VIDEO_PORT: u16 = 1001;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub socket: SocketConfig,
    pub reassembly: ReassemblyConfig,
    pub extractor: ExtractorConfig,
    pub stream: StreamConfig,
}

impl FeedConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: FeedConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket.validate()?;
        self.reassembly.validate()?;
        self.extractor.validate()?;
        self.stream.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub bind_addr: SocketAddr,
    /// Blocking receive timeout; also the sweep cadence when the link is idle.
    pub read_timeout_ms: u64,
    pub recv_buffer_bytes: usize,
    pub max_datagram_bytes: usize,
    /// Warn once when nothing has arrived for this long.
    pub stall_warning_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], VIDEO_PORT)),
            read_timeout_ms: 50,
            recv_buffer_bytes: 4 * 1024 * 1024,
            max_datagram_bytes: 65536,
            stall_warning_secs: 10,
        }
    }
}

impl SocketConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stall_warning(&self) -> Duration {
        Duration::from_secs(self.stall_warning_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "socket.read_timeout_ms must be positive".into(),
            ));
        }
        if self.max_datagram_bytes == 0 {
            return Err(ConfigError::Invalid(
                "socket.max_datagram_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters of one [`crate::reassembly::FrameReassemblyEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    pub layout: HeaderLayout,
    pub pool_size: usize,
    /// Largest payload a single fragment may carry.
    pub fragment_payload_cap: usize,
    /// Ceiling on a claimed `total_packets`.
    pub max_total_packets: u32,
    /// Hard limit on an assembled frame.
    pub max_frame_bytes: usize,
    pub frame_timeout_ms: u64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            layout: HeaderLayout::compact(),
            pool_size: 32,
            fragment_payload_cap: 1400,
            max_total_packets: 10_000,
            max_frame_bytes: 6 * 1024 * 1024,
            frame_timeout_ms: 200,
        }
    }
}

impl ReassemblyConfig {
    pub fn with_layout(layout: HeaderLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "reassembly.pool_size must be positive".into(),
            ));
        }
        if self.fragment_payload_cap == 0 {
            return Err(ConfigError::Invalid(
                "reassembly.fragment_payload_cap must be positive".into(),
            ));
        }
        let width_max = self.layout.field_width.max_value();
        if self.fragment_payload_cap as u64 > width_max as u64 {
            return Err(ConfigError::Invalid(format!(
                "reassembly.fragment_payload_cap {} cannot be expressed by {:?} counters",
                self.fragment_payload_cap, self.layout.field_width
            )));
        }
        if self.max_total_packets == 0 || self.max_total_packets > width_max {
            return Err(ConfigError::Invalid(format!(
                "reassembly.max_total_packets must be within 1..={width_max}"
            )));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "reassembly.max_frame_bytes must be positive".into(),
            ));
        }
        if self.frame_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "reassembly.frame_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub initial_capacity: usize,
    /// Marker-less data beyond this many bytes is trimmed by half.
    pub soft_limit: usize,
    /// A unit still waiting for its terminating marker past this size is
    /// dropped whole.
    pub max_unit_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024 * 1024,
            soft_limit: 512 * 1024,
            max_unit_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ExtractorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.soft_limit == 0 {
            return Err(ConfigError::Invalid(
                "extractor.soft_limit must be positive".into(),
            ));
        }
        if self.max_unit_bytes < self.soft_limit {
            return Err(ConfigError::Invalid(
                "extractor.max_unit_bytes must be at least extractor.soft_limit".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frame rate assumed when synthesizing presentation times.
    pub nominal_fps: u32,
    pub rtp_header_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            nominal_fps: 30,
            rtp_header_len: RTP_HEADER_LEN,
        }
    }
}

impl StreamConfig {
    /// Presentation time of the `index`-th coded unit.
    pub fn presentation_time(&self, index: u64) -> Duration {
        Duration::from_micros(index * 1_000_000 / self.nominal_fps as u64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nominal_fps == 0 {
            return Err(ConfigError::Invalid(
                "stream.nominal_fps must be positive".into(),
            ));
        }
        Ok(())
    }
}
