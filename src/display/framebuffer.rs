// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Framebuffer bookkeeping: dumb (CPU-mappable) surfaces and DMA-imported
//! surfaces, plus the stub-path pixel format fallback sequence.
//!
//! The DMA-import/pin lifecycle is grounded on `GenericDmaVideoFrame` and
//! `DmaMapping` in the teacher crate: a framebuffer that imports a capture
//! buffer's PRIME fd does not own the underlying storage, it holds a weak
//! reference whose validity the display runtime maintains by keeping the
//! source buffer pinned (via `dup()`'d fd ownership) until the next vsync.

use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use drm::control::dumbbuffer::DumbBuffer;

use crate::{Error, PixelFormat, Resolution, Result};

/// Pixel formats tried in order when allocating a stub dumb surface; a
/// driver that rejects the preferred 32-bit format may still support one of
/// these.
pub const STUB_FORMAT_FALLBACK: &[PixelFormat] = &[PixelFormat::Xrgb8888, PixelFormat::Rgb565];

/// One scan-out surface. `fb_id` is the modesetting layer's framebuffer id;
/// `kind` carries whatever backing storage (`drm`/`gbm` handle) the
/// allocation strategy produced.
#[derive(Debug)]
pub struct Framebuffer {
    pub resolution: Resolution,
    pub format: PixelFormat,
    pub pitch: u32,
    pub fb_id: u32,
    pub kind: FramebufferKind,
}

#[derive(Debug)]
pub enum FramebufferKind {
    /// CPU-writable. `buffer` is the owned, driver-allocated dumb buffer;
    /// the runtime maps it on demand via `drm::control::Device::map_dumb_buffer`
    /// for each write rather than holding a long-lived mapping, since the
    /// mapping borrows `buffer` and the runtime needs `buffer` to stay plain
    /// owned data it can keep in a `Vec`.
    Dumb { buffer: DumbBuffer },
    /// Imports a capture buffer's PRIME fd. `source_fd` is a `dup()`'d,
    /// owned copy of the capture buffer's fd so the import survives the
    /// original buffer being recycled by its producer before the next
    /// vsync.
    Dma { source_fd: PinnedFd, gem_handle: u32 },
}

/// An owned, duplicated file descriptor kept alive for as long as a DMA
/// import is exposed on screen. Closed on drop.
#[derive(Debug)]
pub struct PinnedFd(File);

impl PinnedFd {
    /// Duplicate `fd` so the caller's original descriptor can be closed or
    /// reused without invalidating this pin.
    pub fn dup(fd: RawFd) -> Result<Self> {
        let dup = nix::unistd::dup(fd).map_err(|e| Error::Init(format!("dup dma fd: {e}")))?;
        Ok(Self(unsafe { File::from_raw_fd(dup) }))
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// Choose the pixel depth to retry an allocation with after `attempted`
/// formats have all failed. Returns `None` once the fallback list is
/// exhausted.
pub fn next_fallback_format(attempted: &[PixelFormat]) -> Option<PixelFormat> {
    STUB_FORMAT_FALLBACK
        .iter()
        .copied()
        .find(|f| !attempted.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_sequence_is_32_then_16_bit() {
        assert_eq!(next_fallback_format(&[]), Some(PixelFormat::Xrgb8888));
        assert_eq!(next_fallback_format(&[PixelFormat::Xrgb8888]), Some(PixelFormat::Rgb565));
        assert_eq!(next_fallback_format(&[PixelFormat::Xrgb8888, PixelFormat::Rgb565]), None);
    }
}
