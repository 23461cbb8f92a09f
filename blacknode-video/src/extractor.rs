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

//! Splits an Annex B style byte stream into start-marker delimited units.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use log::{trace, warn};

use crate::config::ExtractorConfig;
use crate::stats::ReceiverStats;

const LONG_MARKER: [u8; 4] = [0, 0, 0, 1];
const SHORT_MARKER: [u8; 3] = [0, 0, 1];

/// H.264 sequence parameter set.
pub const NAL_SPS: u8 = 7;
/// H.264 picture parameter set.
pub const NAL_PPS: u8 = 8;
/// H.264 IDR slice.
pub const NAL_IDR: u8 = 5;

/// One coded unit, including its leading start marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedPictureUnit {
    data: Bytes,
    marker_len: usize,
}

impl CodedPictureUnit {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// 3 or 4.
    pub fn marker_len(&self) -> usize {
        self.marker_len
    }

    /// The unit without its start marker.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.marker_len..]
    }

    /// H.264 `nal_unit_type` of the unit, if it has a header byte.
    pub fn nal_type(&self) -> Option<u8> {
        self.payload().first().map(|b| b & 0x1F)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self.nal_type(), Some(NAL_SPS) | Some(NAL_PPS))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Finds the first start marker at or after `from`. At every position the
/// 4-byte form is tested before the 3-byte form.
fn find_marker(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    if buf.len() < SHORT_MARKER.len() {
        return None;
    }
    (from..=buf.len() - SHORT_MARKER.len()).find_map(|i| {
        if buf[i..].starts_with(&LONG_MARKER) {
            Some((i, LONG_MARKER.len()))
        } else if buf[i..].starts_with(&SHORT_MARKER) {
            Some((i, SHORT_MARKER.len()))
        } else {
            None
        }
    })
}

pub struct ElementaryStreamExtractor {
    buffer: BytesMut,
    soft_limit: usize,
    max_unit_bytes: usize,
    /// Where the search for the pending unit's end resumes. Everything
    /// before it has already been scanned with at least four bytes in view.
    scan_from: usize,
    stats: Arc<ReceiverStats>,
}

impl ElementaryStreamExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self::with_stats(config, Arc::new(ReceiverStats::new()))
    }

    pub fn with_stats(config: &ExtractorConfig, stats: Arc<ReceiverStats>) -> Self {
        Self {
            buffer: BytesMut::with_capacity(config.initial_capacity),
            soft_limit: config.soft_limit,
            max_unit_bytes: config.max_unit_bytes,
            scan_from: 0,
            stats,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next unit whose end is confirmed by a following marker.
    pub fn extract_next(&mut self) -> Option<CodedPictureUnit> {
        let Some((start, marker_len)) = find_marker(&self.buffer, 0) else {
            self.trim_unmarked();
            return None;
        };
        if start > 0 {
            trace!("Skipping {start} bytes before start marker");
            self.buffer.advance(start);
            self.scan_from = 0;
        }

        let resume = self.scan_from.max(marker_len);
        match find_marker(&self.buffer, resume) {
            Some((end, _)) => {
                self.scan_from = 0;
                self.stats.unit_extracted();
                Some(CodedPictureUnit {
                    data: self.buffer.split_to(end).freeze(),
                    marker_len,
                })
            }
            None => {
                if self.buffer.len() > self.max_unit_bytes {
                    warn!(
                        "Dropping unterminated unit of {} bytes (limit {})",
                        self.buffer.len(),
                        self.max_unit_bytes
                    );
                    self.stats.extractor_overflow();
                    self.buffer.clear();
                    self.scan_from = 0;
                } else {
                    self.scan_from = self
                        .buffer
                        .len()
                        .saturating_sub(LONG_MARKER.len() - 1)
                        .max(marker_len);
                }
                None
            }
        }
    }

    /// Emits whatever follows the last marker as a final unit. Called at end
    /// of stream, when no further marker will arrive to terminate it.
    pub fn flush(&mut self) -> Option<CodedPictureUnit> {
        let found = find_marker(&self.buffer, 0);
        self.scan_from = 0;
        let Some((start, marker_len)) = found else {
            self.buffer.clear();
            return None;
        };
        self.buffer.advance(start);
        self.stats.unit_extracted();
        Some(CodedPictureUnit {
            data: self.buffer.split().freeze(),
            marker_len,
        })
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
    }

    fn trim_unmarked(&mut self) {
        if self.buffer.len() <= self.soft_limit {
            return;
        }
        let half = self.buffer.len() / 2;
        warn!(
            "No start marker in {} buffered bytes, discarding {half}",
            self.buffer.len()
        );
        self.stats.extractor_overflow();
        self.buffer.advance(half);
        self.scan_from = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: [u8; 14] = [
        0x00, 0x00, 0x00, 0x01, 0xAA, 0x00, 0x00, 0x01, 0xBB, 0x00, 0x00, 0x00, 0x01, 0xCC,
    ];

    fn extractor() -> ElementaryStreamExtractor {
        ElementaryStreamExtractor::new(&ExtractorConfig::default())
    }

    fn drain(extractor: &mut ElementaryStreamExtractor) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| extractor.extract_next())
            .map(|u| u.as_bytes().to_vec())
            .collect()
    }

    #[test]
    fn mixed_markers_across_arbitrary_splits() {
        for first in 0..=STREAM.len() {
            for second in first..=STREAM.len() {
                let mut extractor = extractor();
                let mut units = Vec::new();
                for chunk in [
                    &STREAM[..first],
                    &STREAM[first..second],
                    &STREAM[second..],
                ] {
                    extractor.append(chunk);
                    units.extend(drain(&mut extractor));
                }
                assert_eq!(
                    units,
                    vec![vec![0, 0, 0, 1, 0xAA], vec![0, 0, 1, 0xBB]],
                    "split at {first}/{second}"
                );

                let last = extractor.flush().unwrap();
                assert_eq!(last.as_bytes(), &[0, 0, 0, 1, 0xCC]);
                assert_eq!(last.marker_len(), 4);
                assert_eq!(extractor.pending(), 0);
            }
        }
    }

    #[test]
    fn last_unit_is_released_by_the_next_marker() {
        let mut extractor = extractor();
        extractor.append(&STREAM);
        assert_eq!(drain(&mut extractor).len(), 2);

        extractor.append(&[0x00, 0x00, 0x01, 0xDD]);
        let unit = extractor.extract_next().unwrap();
        assert_eq!(unit.as_bytes(), &[0, 0, 0, 1, 0xCC]);
        assert!(extractor.extract_next().is_none());
    }

    #[test]
    fn n_units_come_out_in_order_and_drain_the_buffer() {
        let mut stream = Vec::new();
        for i in 0..50u8 {
            if i % 3 == 0 {
                stream.extend_from_slice(&SHORT_MARKER);
            } else {
                stream.extend_from_slice(&LONG_MARKER);
            }
            stream.extend_from_slice(&[0x65, i, i.wrapping_add(1), 0xFF]);
        }

        let mut extractor = extractor();
        for chunk in stream.chunks(7) {
            extractor.append(chunk);
        }
        let mut units = drain(&mut extractor);
        units.extend(extractor.flush().map(|u| u.as_bytes().to_vec()));

        assert_eq!(units.len(), 50);
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit[unit.len() - 3], i as u8);
        }
        assert_eq!(units.concat(), stream);
        assert_eq!(extractor.pending(), 0);
    }

    #[test]
    fn four_byte_marker_is_not_read_as_three() {
        let mut extractor = extractor();
        extractor.append(&[0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x68]);
        let unit = extractor.extract_next().unwrap();
        assert_eq!(unit.marker_len(), 4);
        assert_eq!(unit.payload(), &[0x67, 0x42]);
        assert_eq!(unit.nal_type(), Some(NAL_SPS));
        assert!(unit.is_parameter_set());

        let pps = extractor.flush().unwrap();
        assert_eq!(pps.marker_len(), 4);
        assert_eq!(pps.nal_type(), Some(NAL_PPS));
    }

    #[test]
    fn bytes_before_first_marker_are_skipped() {
        let mut extractor = extractor();
        extractor.append(&[0x12, 0x34, 0x00, 0x00, 0x01, 0x65, 0x00, 0x00, 0x01, 0x41]);
        let unit = extractor.extract_next().unwrap();
        assert_eq!(unit.as_bytes(), &[0, 0, 1, 0x65]);
        assert_eq!(unit.nal_type(), Some(NAL_IDR));
    }

    #[test]
    fn markerless_data_is_trimmed_by_half() {
        let config = ExtractorConfig {
            initial_capacity: 64,
            soft_limit: 100,
            max_unit_bytes: 1000,
        };
        let stats = Arc::new(ReceiverStats::new());
        let mut extractor = ElementaryStreamExtractor::with_stats(&config, stats.clone());

        extractor.append(&[0xAB; 100]);
        assert!(extractor.extract_next().is_none());
        assert_eq!(extractor.pending(), 100);

        extractor.append(&[0xAB; 20]);
        assert!(extractor.extract_next().is_none());
        assert_eq!(extractor.pending(), 60);
        assert_eq!(stats.snapshot().extractor_overflows, 1);

        // A marker arriving afterwards is still found.
        extractor.append(&[0, 0, 1, 0x41, 0, 0, 1]);
        let unit = extractor.extract_next().unwrap();
        assert_eq!(unit.as_bytes(), &[0, 0, 1, 0x41]);
    }

    #[test]
    fn unterminated_unit_beyond_the_cap_is_dropped() {
        let config = ExtractorConfig {
            initial_capacity: 64,
            soft_limit: 16,
            max_unit_bytes: 32,
        };
        let stats = Arc::new(ReceiverStats::new());
        let mut extractor = ElementaryStreamExtractor::with_stats(&config, stats.clone());

        extractor.append(&[0, 0, 0, 1]);
        extractor.append(&[0x41; 20]);
        assert!(extractor.extract_next().is_none());
        assert_eq!(extractor.pending(), 24);

        extractor.append(&[0x41; 20]);
        assert!(extractor.extract_next().is_none());
        assert_eq!(extractor.pending(), 0);
        assert_eq!(stats.snapshot().extractor_overflows, 1);
    }

    #[test]
    fn flush_without_marker_yields_nothing() {
        let mut extractor = extractor();
        extractor.append(&[1, 2, 3]);
        assert!(extractor.flush().is_none());
        assert_eq!(extractor.pending(), 0);
    }
}
