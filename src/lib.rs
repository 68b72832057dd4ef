// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame pipeline core for a low-latency video passthrough/streaming node.
//!
//! This crate owns the hard, systems-level middle of the pipeline: the frame
//! container, pixel format conversion, a software JPEG decoder, a vendor
//! hardware codec front end (MJPEG decode / H.264 encode), a transcoder that
//! chains the two, and a DRM/KMS display engine. The HTTP/MJPEG server,
//! option parsing, GPIO hooks and the binary-level vendor codec and ioctl
//! bindings live outside this crate and are reached only through the traits
//! declared in [`sink`] and [`codec::vendor`].

use std::fmt;

pub mod config;
pub mod format;
pub mod frame;
pub mod jpeg;
pub mod sink;
pub mod telemetry;
pub mod text;

#[cfg(feature = "backend")]
pub mod codec;
#[cfg(feature = "backend")]
pub mod display;
#[cfg(feature = "backend")]
pub mod transcoder;

pub use frame::Frame;

/// Error taxonomy shared across every component in this crate.
///
/// `InfoChange` and `Eos` are soft/transient: callers are expected to retry
/// rather than treat them as failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("initialization failed: {0}")]
    Init(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("JPEG decode failed: {0}")]
    JpegDecode(String),
    #[error("unsupported format conversion: {src:?} -> {dst:?}")]
    FormatUnsupported {
        src: PixelFormat,
        dst: PixelFormat,
    },
    #[error("display device not present")]
    NoDevice,
    #[error("display device busy")]
    DeviceBusy,
    #[error("codec context not initialized")]
    NotInitialized,
    #[error("buffer overflow: need {need} bytes, have {have}")]
    BufferOverflow { need: usize, have: usize },
    #[error("operation timed out")]
    Timeout,
    /// Soft: the codec's output geometry just became known (or changed).
    /// The caller must reconfigure buffers and resubmit.
    #[error("codec output format changed")]
    InfoChange,
    /// Soft: end of stream reached.
    #[error("end of stream")]
    Eos,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Width/height pair in pixels, rounded as needed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn get_area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Round both dimensions up to the next even number, as required before
    /// computing 4:2:0 plane sizes.
    pub fn round_up_even(&self) -> Self {
        Self {
            width: (self.width + 1) & !1,
            height: (self.height + 1) & !1,
        }
    }

    pub fn can_contain(&self, other: &Resolution) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Round `n` up to the next multiple of 16, the stride alignment the vendor
/// codec requires for both decode output and encode input.
pub const fn align16(n: u32) -> u32 {
    (n + 15) & !15
}

#[cfg(feature = "backend")]
static_assertions::const_assert_eq!(align16(640), 640);
#[cfg(feature = "backend")]
static_assertions::const_assert_eq!(align16(639), 640);
#[cfg(feature = "backend")]
static_assertions::const_assert_eq!(align16(0), 0);

/// Pixel format tags used across the capture, codec, and display surfaces.
///
/// These are opaque identifiers, not bit-level descriptions: the system
/// never interprets their value beyond equality and the fixed conversion
/// table in [`format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuyv,
    Rgb24,
    Bgr24,
    Nv12,
    Nv16,
    Yuv420,
    Mjpeg,
    Jpeg,
    H264,
    Xrgb8888,
    Rgb888,
    Bgr888,
    Rgb565,
}

impl PixelFormat {
    /// Whether this format is a compressed bitstream rather than raw pixels.
    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Mjpeg | PixelFormat::Jpeg | PixelFormat::H264)
    }

    /// Exact payload size in bytes for a raw pixel format at `resolution`.
    ///
    /// Panics (via `None`) for compressed formats, whose size depends on
    /// content rather than geometry.
    pub fn payload_size(&self, resolution: Resolution) -> Option<usize> {
        let w = resolution.width as u64;
        let h = resolution.height as u64;
        let size = match self {
            PixelFormat::Yuyv => w * h * 2,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Rgb888 | PixelFormat::Bgr888 => {
                w * h * 3
            }
            PixelFormat::Nv12 | PixelFormat::Yuv420 => (w * h * 3) / 2,
            PixelFormat::Nv16 => w * h * 2,
            PixelFormat::Xrgb8888 => w * h * 4,
            PixelFormat::Rgb565 => w * h * 2,
            PixelFormat::Mjpeg | PixelFormat::Jpeg | PixelFormat::H264 => return None,
        };
        Some(size as usize)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv16 => "NV16",
            PixelFormat::Yuv420 => "YUV420",
            PixelFormat::Mjpeg => "MJPEG",
            PixelFormat::Jpeg => "JPEG",
            PixelFormat::H264 => "H264",
            PixelFormat::Xrgb8888 => "XRGB8888",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Bgr888 => "BGR888",
            PixelFormat::Rgb565 => "RGB565",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_matches_scenario_values() {
        let hd = Resolution::new(1920, 1080);
        assert_eq!(PixelFormat::Yuv420.payload_size(hd), Some(3_110_400));
        assert_eq!(PixelFormat::Nv12.payload_size(hd), Some(3_110_400));

        let hd720 = Resolution::new(1280, 720);
        assert_eq!(PixelFormat::Nv12.payload_size(hd720), Some(1_382_400));

        let vga = Resolution::new(640, 480);
        assert_eq!(PixelFormat::Rgb24.payload_size(vga), Some(921_600));
    }

    #[test]
    fn compressed_formats_have_no_fixed_payload_size() {
        assert_eq!(PixelFormat::Mjpeg.payload_size(Resolution::new(1, 1)), None);
        assert_eq!(PixelFormat::H264.payload_size(Resolution::new(1, 1)), None);
    }

    #[test]
    fn align16_rounds_up() {
        assert_eq!(align16(640), 640);
        assert_eq!(align16(639), 640);
        assert_eq!(align16(1), 16);
        assert_eq!(align16(0), 0);
    }
}
