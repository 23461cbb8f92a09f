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

//! Whole-frame CRC-32 (IEEE 802.3, reflected, init and xor-out `0xFFFFFFFF`).

/// Checksum of exactly `bytes`; callers pass the assembled frame, never a
/// padded buffer.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

pub fn verify(bytes: &[u8], expected: u32) -> bool {
    checksum(bytes) == expected
}
