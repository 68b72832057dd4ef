// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! MJPEG -> NV12 hardware decode front end. See module-level notes in
//! `codec::encoder` for the mirrored NV12 -> H.264 side.

use std::sync::Mutex;
use std::time::Instant;

use crate::codec::context::{CodecState, Stats, StopFlag};
use crate::codec::vendor::{CodecEvent, DecoderInitConfig, MetaKey, VendorCodec};
use crate::telemetry::{FrameCounter, Telemetry};
use crate::{align16, Error, Frame, PixelFormat, Resolution, Result};

/// Output buffer count allocated both at initial configure and again on
/// every info-change.
const OUTPUT_BUFFER_COUNT: u32 = 24;
/// Over-allocation factor covering the legal 4:2:2 JPEG case even though the
/// output format is NV12 4:2:0.
const OUTPUT_BUFFER_FACTOR: usize = 4;

struct Geometry {
    width: u32,
    height: u32,
    hor_stride: u32,
    ver_stride: u32,
}

/// Drives one hardware MJPEG-decode context through its full lifecycle.
pub struct DecodeProcessor<C: VendorCodec> {
    codec: Mutex<C>,
    state: Mutex<CodecState>,
    stop: StopFlag,
    stats: Mutex<Stats>,
    geometry: Mutex<Option<Geometry>>,
    telemetry: Telemetry,
    frames: Mutex<FrameCounter>,
}

impl<C: VendorCodec> DecodeProcessor<C> {
    pub fn new(codec: C) -> Self {
        Self::with_telemetry(codec, Telemetry::default())
    }

    /// Same as [`DecodeProcessor::new`] but with an explicit `log` target
    /// and periodic-logging cadence instead of the default, silent one.
    pub fn with_telemetry(codec: C, telemetry: Telemetry) -> Self {
        Self {
            codec: Mutex::new(codec),
            state: Mutex::new(CodecState::Created),
            stop: StopFlag::new(),
            stats: Mutex::new(Stats::default()),
            geometry: Mutex::new(None),
            telemetry,
            frames: Mutex::new(FrameCounter::new()),
        }
    }

    /// One-shot init: chooses NV12 output and turns on `split_parse`, then
    /// pre-allocates the first generation of output buffers sized from the
    /// caller's best-guess max geometry.
    pub fn configure(&self, max: Resolution) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let hor_stride = align16(max.width);
        let ver_stride = align16(max.height);
        let mut codec = self.codec.lock().unwrap();
        codec.init_decoder(DecoderInitConfig {
            width: max.width,
            height: max.height,
            hor_stride,
            ver_stride,
            split_parse: true,
        })?;
        let buf_size = hor_stride as usize * ver_stride as usize * OUTPUT_BUFFER_FACTOR;
        codec.alloc_buffer_group(OUTPUT_BUFFER_COUNT, buf_size)?;
        *state = CodecState::Configured;
        log::info!("decoder configured: max={max}, hor_stride={hor_stride}, ver_stride={ver_stride}");
        Ok(())
    }

    /// Submit one compressed JPEG/MJPEG frame and attempt to retrieve one
    /// decoded NV12 frame into `out`.
    ///
    /// Returns `Error::InfoChange` after handling an info-change handshake
    /// internally (caller resubmits the same input on the next call),
    /// `Error::Eos`/`Error::Timeout` as transient soft failures, or
    /// `Error::Decode` on a hard decode error.
    pub fn decode(&self, input: &Frame, out: &mut Frame) -> Result<()> {
        if self.stop.is_set() {
            return Err(Error::NotInitialized);
        }
        {
            let state = self.state.lock().unwrap();
            if *state == CodecState::Created {
                return Err(Error::NotInitialized);
            }
        }

        let bytes = input.as_used();
        if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
            self.stats.lock().unwrap().record_error();
            return Err(Error::Decode("missing JPEG SOI marker".into()));
        }

        let started = Instant::now();
        {
            let mut state = self.state.lock().unwrap();
            *state = CodecState::Running;
        }
        let mut codec = self.codec.lock().unwrap();
        codec.decode_put_packet(bytes, MetaKey::OutputFrame)?;

        match codec.decode_get_frame()? {
            CodecEvent::InfoChange { width, height, hor_stride, ver_stride } => {
                let buf_size = hor_stride as usize * ver_stride as usize * OUTPUT_BUFFER_FACTOR;
                codec.alloc_buffer_group(OUTPUT_BUFFER_COUNT, buf_size)?;
                *self.geometry.lock().unwrap() = Some(Geometry { width, height, hor_stride, ver_stride });
                log::debug!("decoder info-change: {width}x{height} hor_stride={hor_stride} ver_stride={ver_stride}");
                Err(Error::InfoChange)
            }
            CodecEvent::Eos => {
                *self.state.lock().unwrap() = CodecState::Draining;
                Err(Error::Eos)
            }
            CodecEvent::Timeout => Err(Error::Timeout),
            CodecEvent::Data { bytes: nv12, intra: _ } => {
                let geom = self.geometry.lock().unwrap();
                let geom = geom.as_ref().ok_or(Error::NotInitialized)?;
                out.format = PixelFormat::Nv12;
                out.width = geom.width;
                out.height = geom.height;
                out.stride = geom.hor_stride;
                out.set_payload(&nv12)?;
                out.used = (geom.hor_stride as usize * geom.ver_stride as usize * 3) / 2;

                let elapsed_us = started.elapsed().as_micros() as f64;
                self.stats.lock().unwrap().record_success(elapsed_us, bytes.len(), out.used, false);
                *self.state.lock().unwrap() = CodecState::Configured;

                let mut frames = self.frames.lock().unwrap();
                let n = frames.tick();
                if frames.should_log(self.telemetry.log_every) {
                    log::debug!(target: self.telemetry.target, "decoded {n} frames");
                }
                Ok(())
            }
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().unwrap().clone()
    }

    pub fn destroy(&self) -> Result<()> {
        self.stop.set();
        let mut codec = self.codec.lock().unwrap();
        codec.reset()?;
        *self.state.lock().unwrap() = CodecState::Destroyed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vendor::NullVendorCodec;

    fn jpeg_input(first_byte: u8) -> Frame {
        let mut f = Frame::empty(PixelFormat::Mjpeg);
        f.set_payload(&[0xFF, 0xD8, first_byte, 0xFF, 0xD9]).unwrap();
        f
    }

    #[test]
    fn first_call_returns_info_change_then_frame() {
        let p = DecodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(640, 480)).unwrap();

        let input = jpeg_input(7);
        let mut out = Frame::empty(PixelFormat::Nv12);

        let first = p.decode(&input, &mut out);
        assert!(matches!(first, Err(Error::InfoChange)));

        p.decode(&input, &mut out).unwrap();
        assert_eq!(out.format, PixelFormat::Nv12);
        assert_eq!(out.width, 640);
        assert_eq!(out.used, (align16(640) as usize * align16(480) as usize * 3) / 2);
        assert_eq!(p.stats().frames_processed, 1);
    }

    #[test]
    fn malformed_input_is_rejected_before_submission() {
        let p = DecodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(64, 64)).unwrap();
        let mut bad = Frame::empty(PixelFormat::Mjpeg);
        bad.set_payload(&[0x00, 0x01]).unwrap();
        let mut out = Frame::empty(PixelFormat::Nv12);
        let err = p.decode(&bad, &mut out).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(p.stats().consecutive_errors, 1);
    }

    #[test]
    fn decode_before_configure_is_not_initialized() {
        let p = DecodeProcessor::new(NullVendorCodec::new());
        let input = jpeg_input(1);
        let mut out = Frame::empty(PixelFormat::Nv12);
        let err = p.decode(&input, &mut out).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn destroy_stops_further_calls() {
        let p = DecodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(64, 64)).unwrap();
        p.destroy().unwrap();
        let input = jpeg_input(1);
        let mut out = Frame::empty(PixelFormat::Nv12);
        let err = p.decode(&input, &mut out).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }
}
