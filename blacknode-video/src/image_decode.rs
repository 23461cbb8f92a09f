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

//! Direct image decode of reassembled MJPEG frames.

use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

use crate::error::DecoderError;
use crate::frame::DecodedPicture;

/// Decodes one JPEG image to tightly packed RGBA8.
pub fn decode_jpeg(data: &[u8]) -> Result<DecodedPicture, DecoderError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| DecoderError::Image(e.to_string()))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedPicture {
        width,
        height,
        presentation_time: Duration::ZERO,
        pixels: rgba.into_raw(),
    })
}

/// Encodes packed RGB8 rows as a baseline JPEG.
pub fn encode_jpeg(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, DecoderError> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected {
        return Err(DecoderError::Image(format!(
            "expected {expected} RGB bytes for {width}x{height}, got {}",
            rgb.len()
        )));
    }
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| DecoderError::Image(e.to_string()))?;
    Ok(out)
}

/// A moving diagonal gradient, handy as a synthetic camera.
pub fn test_pattern(width: u32, height: u32, frame_index: u32) -> Vec<u8> {
    let shift = frame_index.wrapping_mul(4);
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            rgb.push(x.wrapping_add(shift) as u8);
            rgb.push(y.wrapping_add(shift) as u8);
            rgb.push((x ^ y) as u8);
        }
    }
    rgb
}
