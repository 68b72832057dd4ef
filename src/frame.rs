// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The frame container: a resizable byte buffer plus the metadata every
//! downstream component needs to interpret it.

use crate::{Error, PixelFormat, Resolution, Result};

/// A rectangular image (or compressed bitstream) with format metadata.
///
/// `used` bytes of `data` are valid; `data.len()` is the allocated capacity.
/// `stride` is the byte pitch of the dominant (luma, for planar formats)
/// plane. `grab_ts` is a monotonic timestamp in nanoseconds, taken at the
/// source, and is not interpreted by this crate beyond being copied along.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub used: usize,
    pub data: Vec<u8>,
    pub grab_ts: u64,
}

impl Frame {
    /// An empty frame with no backing storage yet.
    pub fn empty(format: PixelFormat) -> Self {
        Self {
            width: 0,
            height: 0,
            stride: 0,
            format,
            used: 0,
            data: Vec::new(),
            grab_ts: 0,
        }
    }

    /// Allocate a frame sized exactly for `format` at `resolution`.
    ///
    /// For compressed formats the caller must still call [`Frame::ensure_capacity`]
    /// once the real bitstream size is known.
    pub fn new_raw(format: PixelFormat, resolution: Resolution, stride: u32) -> Self {
        let size = format.payload_size(resolution).unwrap_or(0);
        Self {
            width: resolution.width,
            height: resolution.height,
            stride,
            format,
            used: 0,
            data: vec![0u8; size],
            grab_ts: 0,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Copy every scalar field except `data`/`used`/`allocated` from `other`.
    pub fn clone_meta_from(&mut self, other: &Frame) {
        self.width = other.width;
        self.height = other.height;
        self.stride = other.stride;
        self.format = other.format;
        self.grab_ts = other.grab_ts;
    }

    /// Grow the backing buffer so at least `n` bytes are allocated.
    ///
    /// Never shrinks. Existing bytes in `[0, used)` are preserved.
    pub fn ensure_capacity(&mut self, n: usize) -> Result<()> {
        if self.data.len() < n {
            self.data
                .try_reserve(n - self.data.len())
                .map_err(|_| Error::OutOfMemory)?;
            self.data.resize(n, 0);
        }
        Ok(())
    }

    /// Append `src` to the buffer, growing it first if necessary, and
    /// advance `used` by `src.len()`.
    pub fn append_bytes(&mut self, src: &[u8]) -> Result<()> {
        let need = self.used + src.len();
        self.ensure_capacity(need)?;
        self.data[self.used..need].copy_from_slice(src);
        self.used = need;
        Ok(())
    }

    /// Overwrite the used region with `src`, growing the buffer first if
    /// necessary. Used by the raw pixel writers in `format`/`jpeg`.
    pub fn set_payload(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_capacity(src.len())?;
        self.data[..src.len()].copy_from_slice(src);
        self.used = src.len();
        Ok(())
    }

    pub fn as_used(&self) -> &[u8] {
        &self.data[..self.used]
    }

    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    /// CRC32 of the used region, logged by codec processors at debug level
    /// as a cheap corruption tripwire; never interpreted by this crate.
    #[cfg(feature = "backend")]
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(self.as_used())
    }

    /// Drop the buffer back to zero length. The metadata fields are left
    /// untouched so the frame can be immediately reused by the same owner.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_capacity_preserves_prefix_and_never_shrinks() {
        let mut f = Frame::empty(PixelFormat::Rgb24);
        f.append_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(f.allocated(), 3);

        f.ensure_capacity(10).unwrap();
        assert!(f.allocated() >= 10);
        assert_eq!(&f.data[..3], &[1, 2, 3]);

        let before = f.allocated();
        f.ensure_capacity(1).unwrap();
        assert_eq!(f.allocated(), before);
    }

    #[test]
    fn append_bytes_advances_used_only() {
        let mut f = Frame::empty(PixelFormat::Yuyv);
        f.append_bytes(&[9, 9]).unwrap();
        f.append_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(f.used, 5);
        assert_eq!(f.as_used(), &[9, 9, 1, 2, 3]);
    }

    #[test]
    fn clone_meta_from_does_not_touch_data() {
        let mut dst = Frame::empty(PixelFormat::Nv12);
        dst.append_bytes(&[7, 7, 7]).unwrap();
        let mut src = Frame::empty(PixelFormat::Rgb24);
        src.width = 64;
        src.height = 32;
        src.stride = 192;
        src.grab_ts = 42;

        dst.clone_meta_from(&src);
        assert_eq!(dst.width, 64);
        assert_eq!(dst.format, PixelFormat::Rgb24);
        assert_eq!(dst.used, 3);
        assert_eq!(dst.as_used(), &[7, 7, 7]);
    }

    #[test]
    fn new_raw_sizes_exactly_for_scenario_resolutions() {
        let f = Frame::new_raw(PixelFormat::Nv12, Resolution::new(1280, 720), 1280);
        assert_eq!(f.allocated(), 1_382_400);
    }
}
