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

//! Sender side of the fragment protocol: splits a frame into datagrams the
//! reassembly engine accepts. Used by test harnesses and the CLI sender.

use bytes::BufMut;

use crate::error::HeaderError;
use crate::header::{HeaderLayout, PacketHeader, RTP_HEADER_LEN};
use crate::integrity;

const RTP_VERSION: u8 = 2;
const RTP_DYNAMIC_PAYLOAD_TYPE: u8 = 96;
const RTP_VIDEO_CLOCK_HZ: u64 = 90_000;

pub struct FrameFragmenter {
    layout: HeaderLayout,
    payload_cap: usize,
    ssrc: u32,
    rtp_sequence: u16,
}

impl FrameFragmenter {
    pub fn new(layout: HeaderLayout, payload_cap: usize) -> Self {
        Self {
            layout,
            payload_cap: payload_cap.max(1),
            ssrc: 0x424E_4F44,
            rtp_sequence: 0,
        }
    }

    pub fn layout(&self) -> &HeaderLayout {
        &self.layout
    }

    /// Splits `frame` into `ceil(len / payload_cap)` datagrams, each carrying
    /// the CRC-32 of the whole frame.
    pub fn fragment(&mut self, frame_id: u32, frame: &[u8]) -> Result<Vec<Vec<u8>>, HeaderError> {
        let checksum = integrity::checksum(frame);
        let chunks: Vec<&[u8]> = frame.chunks(self.payload_cap).collect();
        let total_packets = u32::try_from(chunks.len()).map_err(|_| HeaderError::FieldOverflow {
            field: "total_packets",
            value: chunks.len() as u64,
        })?;

        let mut datagrams = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let header = PacketHeader {
                magic: self.layout.magic,
                frame_id,
                packet_index: index as u32,
                total_packets,
                payload_len: chunk.len() as u32,
                frame_checksum: checksum,
            };
            let mut datagram = Vec::with_capacity(self.layout.overhead() + chunk.len());
            self.put_outer_header(&mut datagram, frame_id);
            header.encode(&self.layout, &mut datagram)?;
            datagram.extend_from_slice(chunk);
            datagrams.push(datagram);
        }
        Ok(datagrams)
    }

    fn put_outer_header(&mut self, out: &mut Vec<u8>, frame_id: u32) {
        if self.layout.outer_header_len == 0 {
            return;
        }
        let start = out.len();
        if self.layout.outer_header_len >= RTP_HEADER_LEN {
            put_rtp_header(out, self.rtp_sequence, frame_id, self.ssrc);
            self.rtp_sequence = self.rtp_sequence.wrapping_add(1);
        }
        out.resize(start + self.layout.outer_header_len, 0);
    }
}

/// Writes a minimal RTP v2 header: no padding, extension or CSRCs.
pub fn put_rtp_header(out: &mut Vec<u8>, sequence: u16, frame_index: u32, ssrc: u32) {
    let timestamp = (frame_index as u64 * RTP_VIDEO_CLOCK_HZ / 30) as u32;
    out.put_u8(RTP_VERSION << 6);
    out.put_u8(RTP_DYNAMIC_PAYLOAD_TYPE);
    out.put_u16(sequence);
    out.put_u32(timestamp);
    out.put_u32(ssrc);
}
