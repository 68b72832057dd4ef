// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The vendor hardware codec front end: state-machined drivers for
//! MJPEG-decode and H.264-encode contexts.

pub mod context;
pub mod decoder;
pub mod encoder;
pub mod vendor;

pub use context::{CodecState, Stats};
pub use decoder::DecodeProcessor;
pub use encoder::{EncodeOutcome, EncodeProcessor};
pub use vendor::{MetaKey, NullVendorCodec, VendorCodec};
