// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Software JPEG/MJPEG decode. Grounded on the `mozjpeg` usage pattern seen
//! in capture-library MJPEG decoders: `Decompress::new_mem` followed by
//! either a packed or raw-component decompression path depending on the
//! source's chroma subsampling.

use byteorder::{BigEndian, ByteOrder};
use mozjpeg::Decompress;

use crate::{Error, Frame, PixelFormat, Result};

const SOI_MARKER: u16 = 0xFFD8;

/// Decode a complete JPEG/MJPEG bitstream held in `src.as_used()`.
///
/// Emits `I420` (`Yuv420`) when the source is 4:2:0 subsampled, or `RGB24`
/// otherwise. Never writes past the frame it allocates; any decompression
/// failure is reported as a single `Error::JpegDecode` and leaves no partial
/// state behind (mozjpeg's `Decompress` is dropped on every return path).
pub fn decode(src: &Frame) -> Result<Frame> {
    let bytes = src.as_used();
    if bytes.len() < 2 || BigEndian::read_u16(&bytes[0..2]) != SOI_MARKER {
        return Err(Error::Decode("not a JPEG bitstream (missing SOI marker)".into()));
    }

    let decompress =
        Decompress::new_mem(bytes).map_err(|e| Error::JpegDecode(e.to_string()))?;

    let width = decompress.width() as u32;
    let height = decompress.height() as u32;
    let is_420 = is_420_subsampled(&decompress);

    if is_420 {
        decode_planar_420(decompress, width, height)
    } else {
        decode_packed_rgb(decompress, width, height)
    }
}

/// Parse headers only; no pixel storage is allocated. Used when a caller
/// only needs geometry before deciding how to handle a frame.
pub fn probe(src: &Frame) -> Result<(u32, u32, bool)> {
    let bytes = src.as_used();
    if bytes.len() < 2 || BigEndian::read_u16(&bytes[0..2]) != SOI_MARKER {
        return Err(Error::Decode("not a JPEG bitstream (missing SOI marker)".into()));
    }
    let decompress =
        Decompress::new_mem(bytes).map_err(|e| Error::JpegDecode(e.to_string()))?;
    let is_420 = is_420_subsampled(&decompress);
    Ok((decompress.width() as u32, decompress.height() as u32, is_420))
}

fn is_420_subsampled(decompress: &Decompress) -> bool {
    let comps = decompress.components();
    if comps.len() < 3 {
        return false;
    }
    let luma = &comps[0];
    let chroma_a = &comps[1];
    let chroma_b = &comps[2];
    luma.h_samp_factor == 2
        && luma.v_samp_factor == 2
        && chroma_a.h_samp_factor == 1
        && chroma_a.v_samp_factor == 1
        && chroma_b.h_samp_factor == 1
        && chroma_b.v_samp_factor == 1
}

fn decode_packed_rgb(decompress: Decompress, width: u32, height: u32) -> Result<Frame> {
    let mut started = decompress
        .rgb()
        .map_err(|e| Error::JpegDecode(e.to_string()))?;
    let mut out = Frame::empty(PixelFormat::Rgb24);
    out.width = width;
    out.height = height;
    out.stride = width * 3;

    let mut pixels = Vec::with_capacity((width as usize) * (height as usize) * 3);
    while let Some(row) = started
        .read_scanlines::<[u8; 3]>()
        .map_err(|e| Error::JpegDecode(e.to_string()))?
    {
        for px in row {
            pixels.extend_from_slice(&px);
        }
    }
    started
        .finish()
        .map_err(|e| Error::JpegDecode(e.to_string()))?;

    out.set_payload(&pixels)?;
    Ok(out)
}

fn decode_planar_420(decompress: Decompress, width: u32, height: u32) -> Result<Frame> {
    let mut started = decompress
        .raw()
        .map_err(|e| Error::JpegDecode(e.to_string()))?;
    let mut out = Frame::empty(PixelFormat::Yuv420);
    out.width = width;
    out.height = height;
    out.stride = width;

    let planes = started
        .read_scanlines::<u8>()
        .map_err(|e| Error::JpegDecode(e.to_string()))?;
    started
        .finish_decompress()
        .map_err(|e| Error::JpegDecode(e.to_string()))?;

    let mut payload = Vec::new();
    for plane in planes {
        payload.extend_from_slice(&plane);
    }
    out.set_payload(&payload)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_rejected_without_allocating() {
        let mut f = Frame::empty(PixelFormat::Mjpeg);
        f.set_payload(&[0xFF]).unwrap();
        let err = decode(&f).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn missing_soi_marker_is_rejected() {
        let mut f = Frame::empty(PixelFormat::Mjpeg);
        f.set_payload(&[0x00, 0x01, 0x02, 0x03]).unwrap();
        let err = decode(&f).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
