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

//! Drop and delivery counters for a feed.
//!
//! The receive thread is the only writer; any thread may read a
//! [`StatsSnapshot`]. Counters are monotonic and use relaxed ordering since
//! they are informational only.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ReassemblyError;

#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    malformed_headers: AtomicU64,
    bounds_violations: AtomicU64,
    duplicate_fragments: AtomicU64,
    frames_completed: AtomicU64,
    integrity_mismatches: AtomicU64,
    frame_timeouts: AtomicU64,
    oversize_frames: AtomicU64,
    slot_evictions: AtomicU64,
    extractor_overflows: AtomicU64,
    units_extracted: AtomicU64,
    decoder_busy: AtomicU64,
    pictures_decoded: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub datagrams: u64,
    pub malformed_headers: u64,
    pub bounds_violations: u64,
    pub duplicate_fragments: u64,
    pub frames_completed: u64,
    pub integrity_mismatches: u64,
    pub frame_timeouts: u64,
    pub oversize_frames: u64,
    pub slot_evictions: u64,
    pub extractor_overflows: u64,
    pub units_extracted: u64,
    pub decoder_busy: u64,
    pub pictures_decoded: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagram(&self) {
        bump(&self.datagrams);
    }

    pub fn duplicate(&self) {
        bump(&self.duplicate_fragments);
    }

    pub fn frame_completed(&self) {
        bump(&self.frames_completed);
    }

    pub fn slot_evicted(&self) {
        bump(&self.slot_evictions);
    }

    pub fn extractor_overflow(&self) {
        bump(&self.extractor_overflows);
    }

    pub fn unit_extracted(&self) {
        bump(&self.units_extracted);
    }

    pub fn decoder_busy(&self) {
        bump(&self.decoder_busy);
    }

    pub fn picture_decoded(&self) {
        bump(&self.pictures_decoded);
    }

    /// Counts a dropped datagram or frame under its taxonomy bucket.
    pub fn record(&self, error: &ReassemblyError) {
        let counter = match error {
            ReassemblyError::MalformedHeader(_) => &self.malformed_headers,
            ReassemblyError::ProtocolBoundsViolation(_) => &self.bounds_violations,
            ReassemblyError::FrameTimeout { .. } => &self.frame_timeouts,
            ReassemblyError::IntegrityMismatch { .. } => &self.integrity_mismatches,
            ReassemblyError::FrameTooLarge { .. } => &self.oversize_frames,
        };
        bump(counter);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            datagrams: get(&self.datagrams),
            malformed_headers: get(&self.malformed_headers),
            bounds_violations: get(&self.bounds_violations),
            duplicate_fragments: get(&self.duplicate_fragments),
            frames_completed: get(&self.frames_completed),
            integrity_mismatches: get(&self.integrity_mismatches),
            frame_timeouts: get(&self.frame_timeouts),
            oversize_frames: get(&self.oversize_frames),
            slot_evictions: get(&self.slot_evictions),
            extractor_overflows: get(&self.extractor_overflows),
            units_extracted: get(&self.units_extracted),
            decoder_busy: get(&self.decoder_busy),
            pictures_decoded: get(&self.pictures_decoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HeaderError;

    #[test]
    fn errors_land_in_their_own_bucket() {
        let stats = ReceiverStats::new();
        stats.record(&ReassemblyError::MalformedHeader(HeaderError::TooShort {
            needed: 18,
            actual: 2,
        }));
        stats.record(&ReassemblyError::FrameTimeout { frame_id: 1 });
        stats.record(&ReassemblyError::FrameTimeout { frame_id: 2 });
        stats.frame_completed();

        let snap = stats.snapshot();
        assert_eq!(snap.malformed_headers, 1);
        assert_eq!(snap.frame_timeouts, 2);
        assert_eq!(snap.frames_completed, 1);
        assert_eq!(snap.integrity_mismatches, 0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let stats = ReceiverStats::new();
        stats.datagram();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"datagrams\":1"));
    }
}
