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

//! Fixed-size fragment header, big-endian on the wire.
//!
//! ```text
//! +--------+----------+--------------+---------------+-------------+----------------+
//! | magic  | frame_id | packet_index | total_packets | payload_len | frame_checksum |
//! |  4 B   |   4 B    |   2 or 4 B   |   2 or 4 B    |  2 or 4 B   |      4 B       |
//! +--------+----------+--------------+---------------+-------------+----------------+
//! ```
//!
//! The RTP-style transport prefixes an outer header of fixed length which is
//! skipped before the fragment header is read.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::HeaderError;

/// ASCII "MJPG", the protocol tag of every fragment datagram.
pub const MJPG_MAGIC: u32 = 0x4D4A_5047;

/// Length of the minimal RTP header carried by the RTP-style variant.
pub const RTP_HEADER_LEN: usize = 12;

/// Width of the three per-fragment counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldWidth {
    U16,
    U32,
}

impl FieldWidth {
    pub fn bytes(self) -> usize {
        match self {
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
        }
    }

    /// Largest value a field of this width can carry.
    pub fn max_value(self) -> u32 {
        match self {
            FieldWidth::U16 => u16::MAX as u32,
            FieldWidth::U32 => u32::MAX,
        }
    }
}

/// Describes one transport variant's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLayout {
    pub magic: u32,
    pub field_width: FieldWidth,
    /// Bytes of outer transport header stripped before parsing.
    pub outer_header_len: usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self::compact()
    }
}

impl HeaderLayout {
    /// 16-bit counters, 18 byte header.
    pub const fn compact() -> Self {
        Self {
            magic: MJPG_MAGIC,
            field_width: FieldWidth::U16,
            outer_header_len: 0,
        }
    }

    /// 32-bit counters, 24 byte header.
    pub const fn wide() -> Self {
        Self {
            magic: MJPG_MAGIC,
            field_width: FieldWidth::U32,
            outer_header_len: 0,
        }
    }

    pub const fn with_outer_header(mut self, len: usize) -> Self {
        self.outer_header_len = len;
        self
    }

    /// Size of the fragment header itself.
    pub fn header_len(&self) -> usize {
        4 + 4 + 3 * self.field_width.bytes() + 4
    }

    /// Bytes in front of the payload in every datagram.
    pub fn overhead(&self) -> usize {
        self.outer_header_len + self.header_len()
    }
}

/// A decoded fragment header. Every counter is held as `u32` regardless of
/// its wire width so the engine never truncates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub frame_id: u32,
    pub packet_index: u32,
    pub total_packets: u32,
    pub payload_len: u32,
    pub frame_checksum: u32,
}

impl PacketHeader {
    /// Parses the header at the front of `datagram`, returning it together
    /// with the bytes that follow it. Fails before anything else looks at
    /// the datagram when it is too short or carries the wrong magic.
    pub fn decode<'a>(
        layout: &HeaderLayout,
        datagram: &'a [u8],
    ) -> Result<(PacketHeader, &'a [u8]), HeaderError> {
        let needed = layout.overhead();
        if datagram.len() < needed {
            return Err(HeaderError::TooShort {
                needed,
                actual: datagram.len(),
            });
        }

        let mut buf = &datagram[layout.outer_header_len..];
        let magic = buf.get_u32();
        if magic != layout.magic {
            return Err(HeaderError::BadMagic {
                expected: layout.magic,
                found: magic,
            });
        }
        let frame_id = buf.get_u32();
        let packet_index = read_counter(&mut buf, layout.field_width);
        let total_packets = read_counter(&mut buf, layout.field_width);
        let payload_len = read_counter(&mut buf, layout.field_width);
        let frame_checksum = buf.get_u32();

        Ok((
            PacketHeader {
                magic,
                frame_id,
                packet_index,
                total_packets,
                payload_len,
                frame_checksum,
            },
            buf,
        ))
    }

    /// Appends the wire form of this header to `out`. The outer transport
    /// header, if any, is the sender's business.
    pub fn encode<B: BufMut>(&self, layout: &HeaderLayout, out: &mut B) -> Result<(), HeaderError> {
        let max = layout.field_width.max_value();
        for (field, value) in [
            ("packet_index", self.packet_index),
            ("total_packets", self.total_packets),
            ("payload_len", self.payload_len),
        ] {
            if value > max {
                return Err(HeaderError::FieldOverflow {
                    field,
                    value: value as u64,
                });
            }
        }

        out.put_u32(self.magic);
        out.put_u32(self.frame_id);
        write_counter(out, layout.field_width, self.packet_index);
        write_counter(out, layout.field_width, self.total_packets);
        write_counter(out, layout.field_width, self.payload_len);
        out.put_u32(self.frame_checksum);
        Ok(())
    }
}

fn read_counter(buf: &mut &[u8], width: FieldWidth) -> u32 {
    match width {
        FieldWidth::U16 => buf.get_u16() as u32,
        FieldWidth::U32 => buf.get_u32(),
    }
}

// Callers check the value against the width first.
fn write_counter<B: BufMut>(out: &mut B, width: FieldWidth, value: u32) {
    match width {
        FieldWidth::U16 => out.put_u16(value as u16),
        FieldWidth::U32 => out.put_u32(value),
    }
}
