// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! External interface traits: the capture source and memory sinks this
//! crate consumes/produces, but does not implement. Concrete
//! implementations (V4L2 capture, shared-memory IPC sinks, the HTTP/MJPEG
//! server) are external collaborators out of scope for this crate.

use crate::{Frame, Resolution, Result};

/// A single capture buffer handed to this crate by the capture source.
#[derive(Debug)]
pub struct CaptureBuffer {
    pub index: u32,
    /// A PRIME file descriptor for cross-subsystem sharing, when the
    /// producer supports it.
    pub dma_fd: Option<i32>,
    pub raw: Frame,
}

#[derive(Debug, Clone)]
pub struct CaptureState {
    pub resolution: Resolution,
    pub hz: u32,
    pub format: crate::PixelFormat,
    pub n_bufs: u32,
}

/// The capture device this crate pulls frames from.
pub trait CaptureSource {
    fn open(&mut self) -> Result<CaptureState>;
    fn poll(&mut self) -> Result<Option<CaptureBuffer>>;
    fn release(&mut self, index: u32) -> Result<()>;
}

/// A downstream consumer of finished frames (H.264, JPEG, or raw).
///
/// The wire format of what's behind this trait (shared memory, a socket, a
/// file) is entirely the implementor's concern.
pub trait MemSink: Send {
    fn publish(&mut self, frame: &Frame) -> Result<()>;
}
