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

//! The FrameReassemblyEngine, which rebuilds whole frames from lossy,
//! out-of-order fragment datagrams.
//!
//! Frames live in a fixed pool of slots addressed by `frame_id % pool_size`.
//! A fragment for a different frame than the one a slot is filling evicts
//! the older frame: with no retransmission, the newest frame is the one worth
//! finishing. Partial frames that stop receiving fragments are reclaimed by
//! [`FrameReassemblyEngine::sweep`].

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::config::ReassemblyConfig;
use crate::error::{BoundsViolation, ReassemblyError};
use crate::frame::CompletedFrame;
use crate::header::PacketHeader;
use crate::integrity;
use crate::stats::ReceiverStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Empty,
    Filling,
    /// The slot's frame was delivered. Late duplicates of that frame are
    /// ignored until the frame timeout passes or another frame claims the
    /// slot.
    Delivered,
}

/// Per-frame working storage.
///
/// Fragments are appended to `storage` as they arrive and `spans` records
/// where each index landed, so memory follows the bytes actually received
/// rather than the fragment count a header claims.
#[derive(Debug)]
struct ReassemblySlot {
    status: SlotStatus,
    frame_id: u32,
    total_packets: u32,
    expected_checksum: u32,
    /// First fragment while filling, delivery time once delivered.
    created_at: Instant,
    storage: Vec<u8>,
    spans: Vec<Option<Range<usize>>>,
    received_count: u32,
    declared_bytes: usize,
    storage_limit: usize,
}

impl ReassemblySlot {
    fn new(now: Instant, storage_limit: usize) -> Self {
        Self {
            status: SlotStatus::Empty,
            frame_id: 0,
            total_packets: 0,
            expected_checksum: 0,
            created_at: now,
            storage: Vec::new(),
            spans: Vec::new(),
            received_count: 0,
            declared_bytes: 0,
            storage_limit,
        }
    }

    fn reset(&mut self) {
        self.status = SlotStatus::Empty;
        self.total_packets = 0;
        self.received_count = 0;
        self.declared_bytes = 0;
        self.storage.clear();
        self.storage.shrink_to(self.storage_limit);
        self.spans.clear();
    }

    fn begin(&mut self, header: &PacketHeader, now: Instant) {
        self.reset();
        self.status = SlotStatus::Filling;
        self.frame_id = header.frame_id;
        self.total_packets = header.total_packets;
        self.expected_checksum = header.frame_checksum;
        self.created_at = now;
        self.spans.resize(header.total_packets as usize, None);
    }

    /// Stores one fragment. Returns whether the index was new.
    fn write(&mut self, index: u32, payload: &[u8]) -> Result<bool, BoundsViolation> {
        let span = self
            .spans
            .get_mut(index as usize)
            .ok_or(BoundsViolation::IndexOutOfRange {
                index,
                total: self.total_packets,
            })?;

        let fresh = span.is_none();
        let previous_len = span.as_ref().map_or(0, |r| r.len());
        // A repeat that fits is rewritten in place, anything else is appended.
        let range = match span.take() {
            Some(old) if old.len() >= payload.len() => {
                let range = old.start..old.start + payload.len();
                self.storage[range.clone()].copy_from_slice(payload);
                range
            }
            _ => {
                let start = self.storage.len();
                self.storage.extend_from_slice(payload);
                start..self.storage.len()
            }
        };
        *span = Some(range);

        self.declared_bytes = self.declared_bytes - previous_len + payload.len();
        if fresh {
            self.received_count += 1;
        }
        Ok(fresh)
    }

    fn is_over_limit(&self, max_frame_bytes: usize) -> bool {
        self.declared_bytes > max_frame_bytes || self.storage.len() > self.storage_limit
    }

    fn is_complete(&self) -> bool {
        self.received_count == self.total_packets && self.spans.iter().all(Option::is_some)
    }

    /// Concatenates the fragments in index order using their declared lengths.
    fn assemble(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.declared_bytes);
        for range in self.spans.iter().flatten() {
            frame.extend_from_slice(&self.storage[range.clone()]);
        }
        frame
    }

    fn mark_delivered(&mut self, now: Instant) {
        self.reset();
        self.status = SlotStatus::Delivered;
        self.created_at = now;
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    fn allocated_bytes(&self) -> usize {
        self.storage.capacity()
            + self.spans.capacity() * std::mem::size_of::<Option<Range<usize>>>()
    }
}

pub struct FrameReassemblyEngine {
    config: ReassemblyConfig,
    slots: Vec<ReassemblySlot>,
    stats: Arc<ReceiverStats>,
}

impl FrameReassemblyEngine {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self::with_stats(config, Arc::new(ReceiverStats::new()))
    }

    pub fn with_stats(config: ReassemblyConfig, stats: Arc<ReceiverStats>) -> Self {
        let now = Instant::now();
        let storage_limit = config.max_frame_bytes + config.fragment_payload_cap;
        let slots = (0..config.pool_size.max(1))
            .map(|_| ReassemblySlot::new(now, storage_limit))
            .collect();
        Self {
            config,
            slots,
            stats,
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<ReceiverStats> {
        &self.stats
    }

    /// Accepts one datagram and returns the frame it completed, if any.
    pub fn ingest(&mut self, datagram: &[u8]) -> Option<CompletedFrame> {
        self.ingest_at(datagram, Instant::now())
    }

    /// [`Self::ingest`] with an explicit clock. Invalid input is dropped
    /// silently apart from a log line and a counter.
    pub fn ingest_at(&mut self, datagram: &[u8], now: Instant) -> Option<CompletedFrame> {
        match self.try_ingest(datagram, now) {
            Ok(frame) => frame,
            Err(err) => {
                match &err {
                    ReassemblyError::IntegrityMismatch { .. }
                    | ReassemblyError::FrameTooLarge { .. } => warn!("Dropping frame: {err}"),
                    _ => trace!("Dropping datagram: {err}"),
                }
                self.stats.record(&err);
                None
            }
        }
    }

    fn try_ingest(
        &mut self,
        datagram: &[u8],
        now: Instant,
    ) -> Result<Option<CompletedFrame>, ReassemblyError> {
        let (header, rest) = PacketHeader::decode(&self.config.layout, datagram)?;
        self.check_bounds(&header, rest.len())?;
        let payload = &rest[..header.payload_len as usize];

        let max_frame_bytes = self.config.max_frame_bytes;
        let timeout = self.config.frame_timeout();
        let index = header.frame_id as usize % self.slots.len();
        let slot = &mut self.slots[index];

        match slot.status {
            SlotStatus::Filling if slot.frame_id != header.frame_id => {
                debug!(
                    "Frame {} evicts incomplete frame {} ({}/{} fragments)",
                    header.frame_id, slot.frame_id, slot.received_count, slot.total_packets
                );
                self.stats.slot_evicted();
                slot.begin(&header, now);
            }
            SlotStatus::Filling => {}
            SlotStatus::Delivered
                if slot.frame_id == header.frame_id && slot.age(now) <= timeout =>
            {
                trace!("Late fragment for delivered frame {}", header.frame_id);
                self.stats.duplicate();
                return Ok(None);
            }
            SlotStatus::Delivered | SlotStatus::Empty => {
                slot.begin(&header, now);
            }
        }

        if slot.total_packets != header.total_packets {
            return Err(BoundsViolation::InconsistentTotal {
                slot: slot.total_packets,
                packet: header.total_packets,
            }
            .into());
        }

        if !slot.write(header.packet_index, payload)? {
            self.stats.duplicate();
        }

        if slot.is_over_limit(max_frame_bytes) {
            let size = slot.declared_bytes.max(slot.storage.len());
            slot.reset();
            return Err(ReassemblyError::FrameTooLarge {
                frame_id: header.frame_id,
                size,
                limit: max_frame_bytes,
            });
        }

        if !slot.is_complete() {
            return Ok(None);
        }

        let data = slot.assemble();
        let expected = slot.expected_checksum;
        if !integrity::verify(&data, expected) {
            slot.reset();
            return Err(ReassemblyError::IntegrityMismatch {
                frame_id: header.frame_id,
                expected,
                actual: integrity::checksum(&data),
            });
        }

        let first_fragment_at = slot.created_at;
        slot.mark_delivered(now);
        self.stats.frame_completed();
        trace!("Frame {} complete, {} bytes", header.frame_id, data.len());
        Ok(Some(CompletedFrame {
            frame_id: header.frame_id,
            data,
            first_fragment_at,
            completed_at: now,
        }))
    }

    fn check_bounds(&self, header: &PacketHeader, available: usize) -> Result<(), BoundsViolation> {
        if header.total_packets == 0 {
            return Err(BoundsViolation::ZeroTotalPackets);
        }
        if header.payload_len == 0 {
            return Err(BoundsViolation::ZeroPayload);
        }
        if header.total_packets > self.config.max_total_packets {
            return Err(BoundsViolation::TooManyPackets(
                header.total_packets,
                self.config.max_total_packets,
            ));
        }
        if header.payload_len as usize > self.config.fragment_payload_cap {
            return Err(BoundsViolation::PayloadTooLarge(
                header.payload_len,
                self.config.fragment_payload_cap,
            ));
        }
        if header.payload_len as usize > available {
            return Err(BoundsViolation::TruncatedPayload {
                declared: header.payload_len,
                available,
            });
        }
        if header.packet_index >= header.total_packets {
            return Err(BoundsViolation::IndexOutOfRange {
                index: header.packet_index,
                total: header.total_packets,
            });
        }
        Ok(())
    }

    /// Reclaims every filling slot older than the frame timeout and forgets
    /// delivered frames once their stragglers can no longer arrive. Returns
    /// the number of partial frames dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.config.frame_timeout();
        let mut reclaimed = 0;
        for slot in self.slots.iter_mut() {
            if slot.age(now) <= timeout {
                continue;
            }
            match slot.status {
                SlotStatus::Filling => {
                    let err = ReassemblyError::FrameTimeout {
                        frame_id: slot.frame_id,
                    };
                    debug!(
                        "{err} ({}/{} fragments)",
                        slot.received_count, slot.total_packets
                    );
                    self.stats.record(&err);
                    slot.reset();
                    reclaimed += 1;
                }
                SlotStatus::Delivered => slot.reset(),
                SlotStatus::Empty => {}
            }
        }
        reclaimed
    }

    /// Number of slots currently collecting fragments.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Filling)
            .count()
    }

    /// Status of the slot `frame_id` maps to, as seen by that frame.
    pub fn status_of(&self, frame_id: u32) -> SlotStatus {
        let slot = &self.slots[frame_id as usize % self.slots.len()];
        match slot.status {
            SlotStatus::Empty => SlotStatus::Empty,
            _ if slot.frame_id != frame_id => SlotStatus::Empty,
            status => status,
        }
    }

    /// Bytes held by the slot pool.
    pub fn allocated_bytes(&self) -> usize {
        self.slots.iter().map(ReassemblySlot::allocated_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FrameFragmenter;
    use crate::header::HeaderLayout;
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    fn config() -> ReassemblyConfig {
        ReassemblyConfig {
            fragment_payload_cap: 300,
            ..ReassemblyConfig::default()
        }
    }

    fn test_frame(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn fragments(frame_id: u32, frame: &[u8]) -> Vec<Vec<u8>> {
        FrameFragmenter::new(HeaderLayout::compact(), 300)
            .fragment(frame_id, frame)
            .unwrap()
    }

    #[test]
    fn out_of_order_fragments_assemble_in_index_order() {
        let mut engine = FrameReassemblyEngine::new(config());
        let frame = test_frame(1000, 1);
        let datagrams = fragments(7, &frame);
        let now = Instant::now();

        assert!(engine.ingest_at(&datagrams[1], now).is_none());
        assert!(engine.ingest_at(&datagrams[3], now).is_none());
        assert!(engine.ingest_at(&datagrams[0], now).is_none());
        let completed = engine.ingest_at(&datagrams[2], now).unwrap();

        assert_eq!(completed.frame_id, 7);
        assert_eq!(completed.len(), 1000);
        assert_eq!(completed.data, frame);
        assert_eq!(engine.stats().snapshot().frames_completed, 1);
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn every_permutation_reproduces_the_original_frame() {
        let frame = test_frame(2345, 9);
        let datagrams = fragments(100, &frame);
        let mut rng = thread_rng();

        for _ in 0..50 {
            let mut engine = FrameReassemblyEngine::new(config());
            let mut order = datagrams.clone();
            order.shuffle(&mut rng);

            let delivered: Vec<CompletedFrame> =
                order.iter().filter_map(|d| engine.ingest(d)).collect();
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].data, frame);
        }
    }

    #[test]
    fn missing_fragment_times_out_and_slot_is_reusable() {
        let mut engine = FrameReassemblyEngine::new(config());
        let frame = test_frame(1000, 2);
        let datagrams = fragments(7, &frame);
        let start = Instant::now();

        for i in [1, 3, 0] {
            assert!(engine.ingest_at(&datagrams[i], start).is_none());
        }
        assert_eq!(engine.status_of(7), SlotStatus::Filling);

        assert_eq!(engine.sweep(start + Duration::from_millis(150)), 0);
        assert_eq!(engine.sweep(start + Duration::from_millis(250)), 1);
        assert_eq!(engine.status_of(7), SlotStatus::Empty);
        assert_eq!(engine.stats().snapshot().frame_timeouts, 1);

        // The late fragment alone cannot complete anything.
        let later = start + Duration::from_millis(260);
        assert!(engine.ingest_at(&datagrams[2], later).is_none());
        assert_eq!(engine.status_of(7), SlotStatus::Filling);

        // A full resend of frame 7 starts cleanly in the reclaimed slot.
        let mut engine = FrameReassemblyEngine::new(config());
        for i in [1, 3, 0] {
            engine.ingest_at(&datagrams[i], start);
        }
        engine.sweep(start + Duration::from_millis(250));
        let completed: Vec<_> = datagrams
            .iter()
            .filter_map(|d| engine.ingest_at(d, later))
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data, frame);
    }

    #[test]
    fn bad_magic_leaves_the_pool_untouched() {
        let mut engine = FrameReassemblyEngine::new(config());
        let frame = test_frame(1000, 3);
        let datagrams = fragments(7, &frame);
        let now = Instant::now();

        engine.ingest_at(&datagrams[0], now);
        engine.ingest_at(&datagrams[1], now);

        let mut bogus = datagrams[2].clone();
        bogus[0] = b'X';
        assert!(engine.ingest_at(&bogus, now).is_none());
        assert!(engine.ingest_at(&[0x4D, 0x4A], now).is_none());
        assert_eq!(engine.stats().snapshot().malformed_headers, 2);
        assert_eq!(engine.in_flight(), 1);

        engine.ingest_at(&datagrams[2], now);
        let completed = engine.ingest_at(&datagrams[3], now).unwrap();
        assert_eq!(completed.data, frame);
    }

    #[test]
    fn checksum_mismatch_drops_frame_and_resets_slot() {
        let mut engine = FrameReassemblyEngine::new(config());
        let frame = test_frame(1000, 4);
        let mut corrupted = fragments(7, &frame);
        let last = corrupted[3].len() - 1;
        corrupted[3][last] ^= 0xFF;
        let now = Instant::now();

        let delivered: Vec<_> = corrupted
            .iter()
            .filter_map(|d| engine.ingest_at(d, now))
            .collect();
        assert!(delivered.is_empty());
        assert_eq!(engine.status_of(7), SlotStatus::Empty);
        assert_eq!(engine.stats().snapshot().integrity_mismatches, 1);

        let good = fragments(7, &frame);
        let delivered: Vec<_> = good.iter().filter_map(|d| engine.ingest_at(d, now)).collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, frame);
    }

    #[test]
    fn duplicate_fragment_does_not_double_count() {
        let mut engine = FrameReassemblyEngine::new(config());
        let frame = test_frame(600, 5);
        let datagrams = fragments(1, &frame);
        let now = Instant::now();

        assert!(engine.ingest_at(&datagrams[0], now).is_none());
        assert!(engine.ingest_at(&datagrams[0], now).is_none());
        let completed = engine.ingest_at(&datagrams[1], now).unwrap();
        assert_eq!(completed.data, frame);
        assert_eq!(engine.stats().snapshot().duplicate_fragments, 1);

        // A straggler for the delivered frame does not restart it.
        assert!(engine.ingest_at(&datagrams[1], now).is_none());
        assert_eq!(engine.status_of(1), SlotStatus::Delivered);
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn newer_frame_evicts_incomplete_frame_in_same_slot() {
        let cfg = ReassemblyConfig {
            pool_size: 4,
            ..config()
        };
        let mut engine = FrameReassemblyEngine::new(cfg);
        let old = fragments(3, &test_frame(900, 6));
        let new_frame = test_frame(900, 7);
        let new = fragments(7, &new_frame);
        let now = Instant::now();

        engine.ingest_at(&old[0], now);
        engine.ingest_at(&old[1], now);
        assert_eq!(engine.status_of(3), SlotStatus::Filling);

        let delivered: Vec<_> = new.iter().filter_map(|d| engine.ingest_at(d, now)).collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, new_frame);
        assert_eq!(engine.status_of(3), SlotStatus::Empty);
        assert_eq!(engine.stats().snapshot().slot_evictions, 1);

        // The evicted frame's last fragment now starts over and never completes.
        assert!(engine.ingest_at(&old[2], now).is_none());
    }

    fn datagram(header: PacketHeader, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        header.encode(&HeaderLayout::compact(), &mut out).unwrap();
        out.extend_from_slice(payload);
        out
    }

    fn header(index: u32, total: u32, len: u32) -> PacketHeader {
        PacketHeader {
            magic: crate::header::MJPG_MAGIC,
            frame_id: 5,
            packet_index: index,
            total_packets: total,
            payload_len: len,
            frame_checksum: 0,
        }
    }

    #[test]
    fn bounds_violations_are_dropped_before_touching_slots() {
        let mut engine = FrameReassemblyEngine::new(config());
        let now = Instant::now();
        let payload = [1u8; 400];

        let cases = [
            datagram(header(0, 0, 10), &payload[..10]),
            datagram(header(0, 2, 0), &[]),
            datagram(header(0, 20_000, 10), &payload[..10]),
            datagram(header(0, 2, 400), &payload),
            datagram(header(0, 2, 50), &payload[..20]),
            datagram(header(2, 2, 10), &payload[..10]),
        ];
        for case in &cases {
            assert!(engine.ingest_at(case, now).is_none());
        }
        assert_eq!(engine.stats().snapshot().bounds_violations, cases.len() as u64);
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn inconsistent_total_is_rejected_without_resetting() {
        let mut engine = FrameReassemblyEngine::new(config());
        let now = Instant::now();

        engine.ingest_at(&datagram(header(0, 3, 10), &[1; 10]), now);
        assert!(engine
            .ingest_at(&datagram(header(1, 2, 10), &[1; 10]), now)
            .is_none());
        assert_eq!(engine.status_of(5), SlotStatus::Filling);
        assert_eq!(engine.stats().snapshot().bounds_violations, 1);
    }

    #[test]
    fn oversized_frame_resets_slot() {
        let cfg = ReassemblyConfig {
            max_frame_bytes: 500,
            ..config()
        };
        let mut engine = FrameReassemblyEngine::new(cfg);
        let datagrams = fragments(2, &test_frame(1000, 8));
        let now = Instant::now();

        engine.ingest_at(&datagrams[0], now);
        assert_eq!(engine.status_of(2), SlotStatus::Filling);
        assert!(engine.ingest_at(&datagrams[1], now).is_none());
        assert_eq!(engine.status_of(2), SlotStatus::Empty);
        assert_eq!(engine.stats().snapshot().oversize_frames, 1);
    }

    #[test]
    fn repeated_timeouts_do_not_grow_the_pool() {
        let mut engine = FrameReassemblyEngine::new(config());
        let frame = test_frame(1000, 10);
        let mut now = Instant::now();

        let mut high_water = 0;
        for cycle in 0..500u32 {
            let datagrams = fragments(cycle, &frame);
            engine.ingest_at(&datagrams[0], now);
            now += Duration::from_millis(250);
            engine.sweep(now);
            if cycle == 64 {
                high_water = engine.allocated_bytes();
            }
        }
        assert_eq!(engine.allocated_bytes(), high_water);
        assert_eq!(engine.in_flight(), 0);
        assert_eq!(engine.stats().snapshot().frame_timeouts, 500);
    }

    #[test]
    fn delivered_frame_id_is_accepted_again_after_the_timeout() {
        let mut engine = FrameReassemblyEngine::new(config());
        let start = Instant::now();
        let first = test_frame(600, 12);
        let delivered: Vec<_> = fragments(0, &first)
            .iter()
            .filter_map(|d| engine.ingest_at(d, start))
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(engine.status_of(0), SlotStatus::Delivered);

        // A sender that restarts its ids reuses frame 0 much later.
        let later = start + Duration::from_secs(10);
        assert_eq!(engine.sweep(later), 0);
        assert_eq!(engine.status_of(0), SlotStatus::Empty);

        let second = test_frame(600, 13);
        let delivered: Vec<_> = fragments(0, &second)
            .iter()
            .filter_map(|d| engine.ingest_at(d, later))
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, second);
        assert_eq!(engine.stats().snapshot().frames_completed, 2);
    }

    #[test]
    fn delivered_marker_expires_even_without_a_sweep() {
        let mut engine = FrameReassemblyEngine::new(config());
        let start = Instant::now();
        for d in fragments(3, &test_frame(600, 14)) {
            engine.ingest_at(&d, start);
        }

        let resent = test_frame(600, 15);
        let later = start + Duration::from_millis(500);
        let delivered: Vec<_> = fragments(3, &resent)
            .iter()
            .filter_map(|d| engine.ingest_at(d, later))
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, resent);
    }

    #[test]
    fn claimed_fragment_count_does_not_reserve_frame_memory() {
        let cfg = ReassemblyConfig::default();
        let mut engine = FrameReassemblyEngine::new(cfg.clone());
        let now = Instant::now();

        for frame_id in 0..cfg.pool_size as u32 {
            let claim = PacketHeader {
                frame_id,
                ..header(0, cfg.max_total_packets, 1)
            };
            assert!(engine.ingest_at(&datagram(claim, &[7]), now).is_none());
        }
        assert_eq!(engine.in_flight(), cfg.pool_size);
        engine.sweep(now + Duration::from_secs(1));

        let index_tables = cfg.pool_size
            * cfg.max_total_packets as usize
            * std::mem::size_of::<Option<Range<usize>>>();
        assert!(engine.allocated_bytes() <= index_tables + cfg.pool_size * 64);
        assert!(engine.allocated_bytes() <= cfg.pool_size * cfg.max_frame_bytes);
    }

    #[test]
    fn growing_duplicates_cannot_grow_storage_without_bound() {
        let cfg = ReassemblyConfig {
            max_frame_bytes: 500,
            ..config()
        };
        let limit = cfg.max_frame_bytes + cfg.fragment_payload_cap;
        let mut engine = FrameReassemblyEngine::new(cfg);
        let now = Instant::now();
        let payload = [9u8; 300];

        for len in 1..=300 {
            let d = datagram(header(0, 2, len), &payload[..len as usize]);
            assert!(engine.ingest_at(&d, now).is_none());
        }
        assert!(engine.stats().snapshot().oversize_frames >= 1);
        assert!(engine.allocated_bytes() <= 2 * limit + 64);
    }

    #[test]
    fn wide_layout_is_supported_by_the_same_engine() {
        let cfg = ReassemblyConfig {
            layout: HeaderLayout::wide(),
            fragment_payload_cap: 1400,
            ..ReassemblyConfig::default()
        };
        let mut engine = FrameReassemblyEngine::new(cfg);
        let frame = test_frame(5000, 11);
        let datagrams = FrameFragmenter::new(HeaderLayout::wide(), 1400)
            .fragment(42, &frame)
            .unwrap();

        let delivered: Vec<_> = datagrams.iter().rev().filter_map(|d| engine.ingest(d)).collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, frame);
    }
}
