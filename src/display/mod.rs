// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! DRM/KMS display engine: connector/mode/CRTC selection, dumb and
//! DMA-imported framebuffers, per-platform scan-out, stub overlays, DPMS,
//! and disconnect handling.

pub mod framebuffer;
pub mod mode;
pub mod platform;
pub mod runtime;

pub use platform::Platform;
pub use runtime::{DisplayRuntime, Liveness};
