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

//! Contains the fundamental data structures handed out of the pipeline.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A fully reassembled, checksum-verified frame. Owns its bytes; nothing
/// points back into the reassembly pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    /// The frame identifier from the fragment headers.
    pub frame_id: u32,
    /// The assembled payload, concatenated in fragment index order.
    pub data: Vec<u8>,
    /// When the first fragment of this frame arrived.
    pub first_fragment_at: Instant,
    /// When the last missing fragment arrived.
    pub completed_at: Instant,
}

impl CompletedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time spent between the first and the last fragment.
    pub fn assembly_time(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.first_fragment_at)
    }
}

/// Dimensions reported by a decoder after a format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
}

/// Represents a fully decoded picture, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    /// When the sink should show this picture, relative to stream start.
    pub presentation_time: Duration,
    /// Tightly packed RGBA8 rows.
    pub pixels: Vec<u8>,
}

impl DecodedPicture {
    pub fn format(&self) -> OutputFormat {
        OutputFormat {
            width: self.width,
            height: self.height,
        }
    }
}
