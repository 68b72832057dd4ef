// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! End-to-end scenarios exercising the frame pipeline core without a real
//! capture device or DRM/KMS display (those remain collaborators behind
//! `CaptureSource`/`DisplayRuntime`'s real modesetting device).

use streamnode_core::codec::{EncodeOutcome, NullVendorCodec};
use streamnode_core::config::RateControlConfig;
use streamnode_core::format::{self, Center};
use streamnode_core::transcoder::Transcoder;
use streamnode_core::{Frame, PixelFormat, Resolution};

fn yuyv_frame(w: u32, h: u32) -> Frame {
    let mut f = Frame::empty(PixelFormat::Yuyv);
    f.width = w;
    f.height = h;
    f.stride = w * 2;
    f.set_payload(&vec![16u8; (w * h * 2) as usize]).unwrap();
    f
}

#[test]
fn scenario_yuyv_pass_through() {
    let src = yuyv_frame(1280, 720);
    assert_eq!(src.stride, 2560);

    let mut dst = Frame::empty(PixelFormat::Nv12);
    dst.width = 1280;
    dst.height = 720;
    dst.stride = 1280;
    format::convert(&src, &mut dst, None).unwrap();
    assert_eq!(dst.format, PixelFormat::Nv12);
    assert_eq!(dst.used, 1_382_400);
}

#[test]
fn scenario_nv12_encode_keyframe_request() {
    let transcoder = Transcoder::new(
        NullVendorCodec::new(),
        NullVendorCodec::new(),
        Resolution::new(64, 64),
        &RateControlConfig::default(),
    )
    .unwrap();

    let mut input = Frame::empty(PixelFormat::Nv12);
    input.width = 64;
    input.height = 64;
    input.stride = 64;
    input.set_payload(&vec![0u8; 64 * 64 * 3 / 2]).unwrap();

    let mut out = Frame::empty(PixelFormat::H264);
    let outcome = transcoder.process(&input, &mut out, true).unwrap();
    assert!(matches!(outcome, EncodeOutcome::Packet { intra: true }));
    assert_eq!(out.format, PixelFormat::H264);
    assert_eq!(transcoder.stats().encode.keyframe_count, 1);
}

#[test]
fn scenario_mjpeg_through_transcoder_surfaces_info_change_then_encodes() {
    let transcoder = Transcoder::new(
        NullVendorCodec::new(),
        NullVendorCodec::new(),
        Resolution::new(640, 480),
        &RateControlConfig::default(),
    )
    .unwrap();

    let mut input = Frame::empty(PixelFormat::Mjpeg);
    input.set_payload(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]).unwrap();
    let mut out = Frame::empty(PixelFormat::H264);

    let first = transcoder.process(&input, &mut out, false);
    assert!(first.is_err());
    transcoder.process(&input, &mut out, false).unwrap();
    assert_eq!(out.format, PixelFormat::H264);
}

#[test]
fn scenario_centered_sub_display_source() {
    let center = Center::compute(Resolution::new(640, 480), Resolution::new(320, 200));
    assert_eq!(center.offset_x, (640 - 320) / 2);
    assert_eq!(center.offset_y, (480 - 200) / 2);
}
