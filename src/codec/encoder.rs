// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! NV12 -> H.264 hardware encode front end.

use std::sync::Mutex;
use std::thread::sleep;
use std::time::Instant;

use crate::codec::context::{CodecState, Stats, StopFlag, MAX_RETRIES, RETRY_BACKOFF};
use crate::codec::vendor::{CodecEvent, EncoderInitConfig, MetaKey, VendorCodec};
use crate::config::{RateControlConfig, RateControlMode};
use crate::telemetry::{FrameCounter, Telemetry};
use crate::{align16, Error, Frame, PixelFormat, Resolution, Result};

const INPUT_BUFFER_COUNT: u32 = 4;
const OUTPUT_BUFFER_COUNT: u32 = 4;

struct Geometry {
    hor_stride: u32,
    ver_stride: u32,
}

/// Outcome of one `encode()` call. Because the hardware pipeline buffers
/// frames internally, a submitted frame does not always produce a packet
/// synchronously.
#[derive(Debug)]
pub enum EncodeOutcome {
    /// A bitstream packet was produced for this (or an earlier) input.
    Packet { intra: bool },
    /// The frame was accepted but no bitstream is ready yet. Not an error:
    /// the caller should submit the next frame.
    Pending,
}

pub struct EncodeProcessor<C: VendorCodec> {
    codec: Mutex<C>,
    state: Mutex<CodecState>,
    stop: StopFlag,
    stats: Mutex<Stats>,
    geometry: Mutex<Option<Geometry>>,
    resolution: Mutex<Option<Resolution>>,
    rc: Mutex<RateControlConfig>,
    telemetry: Telemetry,
    frames: Mutex<FrameCounter>,
}

impl<C: VendorCodec> EncodeProcessor<C> {
    pub fn new(codec: C) -> Self {
        Self::with_telemetry(codec, Telemetry::default())
    }

    /// Same as [`EncodeProcessor::new`] but with an explicit `log` target
    /// and periodic-logging cadence instead of the default, silent one.
    pub fn with_telemetry(codec: C, telemetry: Telemetry) -> Self {
        Self {
            codec: Mutex::new(codec),
            state: Mutex::new(CodecState::Created),
            stop: StopFlag::new(),
            stats: Mutex::new(Stats::default()),
            geometry: Mutex::new(None),
            resolution: Mutex::new(None),
            rc: Mutex::new(RateControlConfig::default()),
            telemetry,
            frames: Mutex::new(FrameCounter::new()),
        }
    }

    pub fn configure(&self, resolution: Resolution, rc: &RateControlConfig) -> Result<()> {
        *self.resolution.lock().unwrap() = Some(resolution);
        *self.rc.lock().unwrap() = rc.clone();
        self.apply_config(resolution, rc)?;
        *self.state.lock().unwrap() = CodecState::Configured;
        Ok(())
    }

    fn apply_config(&self, resolution: Resolution, rc: &RateControlConfig) -> Result<()> {
        let hor_stride = align16(resolution.width);
        let ver_stride = align16(resolution.height);
        let mut codec = self.codec.lock().unwrap();
        codec.init_encoder(EncoderInitConfig {
            width: resolution.width,
            height: resolution.height,
            hor_stride,
            ver_stride,
            fps_num: rc.fps_num,
            fps_den: rc.fps_den,
            gop_size: rc.gop_size,
            profile: rc.profile,
            level: rc.level,
            rc_mode: rc.mode as u32,
            bps_target: rc.bps_target,
            bps_max: rc.bps_max(),
            bps_min: rc.bps_min(),
            qp_init: rc.qp_init,
            qp_min: rc.qp_min,
            qp_max: rc.qp_max,
        })?;
        let input_size = hor_stride as usize * ver_stride as usize * 3 / 2;
        codec.alloc_buffer_group(INPUT_BUFFER_COUNT, input_size)?;
        codec.alloc_buffer_group(OUTPUT_BUFFER_COUNT, input_size)?;
        *self.geometry.lock().unwrap() = Some(Geometry { hor_stride, ver_stride });
        log::info!("encoder configured: {resolution}, hor_stride={hor_stride}, ver_stride={ver_stride}");
        Ok(())
    }

    /// Re-apply the full configuration block with a new H.264 profile/level.
    /// Valid before and after `configure`; when the context is already live
    /// the whole block (not just profile/level) is re-applied atomically
    /// under the codec lock, mirroring the vendor library's own
    /// re-initialize-on-mutate contract.
    pub fn set_profile(&self, profile: u32, level: u32) -> Result<()> {
        let mut rc = self.rc.lock().unwrap();
        rc.profile = profile;
        rc.level = level;
        self.reapply_if_live(&rc)
    }

    /// Switch rate-control mode and target bitrate (min/max are derived).
    pub fn set_rc_mode(&self, mode: RateControlMode, bps_target: u32) -> Result<()> {
        let mut rc = self.rc.lock().unwrap();
        rc.mode = mode;
        rc.bps_target = bps_target;
        self.reapply_if_live(&rc)
    }

    /// Set the QP search range. `qp_min <= qp_max <= 51` is enforced; the
    /// current `qp_init` is clamped into the new range.
    pub fn set_qp_range(&self, qp_min: u32, qp_max: u32) -> Result<()> {
        if !(qp_min <= qp_max && qp_max <= 51) {
            return Err(Error::InvalidParam(format!(
                "invalid QP range: qp_min={qp_min} qp_max={qp_max} (require qp_min <= qp_max <= 51)"
            )));
        }
        let mut rc = self.rc.lock().unwrap();
        rc.qp_min = qp_min;
        rc.qp_max = qp_max;
        rc.qp_init = rc.qp_init.clamp(qp_min, qp_max);
        self.reapply_if_live(&rc)
    }

    fn reapply_if_live(&self, rc: &RateControlConfig) -> Result<()> {
        let resolution = *self.resolution.lock().unwrap();
        let is_live = !matches!(*self.state.lock().unwrap(), CodecState::Created);
        if is_live {
            if let Some(resolution) = resolution {
                self.apply_config(resolution, rc)?;
            }
        }
        Ok(())
    }

    /// Submit one NV12 frame and perform a single, non-blocking poll for its
    /// bitstream. A pipeline-latency timeout is not an error: see
    /// [`EncodeOutcome::Pending`].
    pub fn encode(&self, input: &Frame, out: &mut Frame, force_key: bool) -> Result<EncodeOutcome> {
        if self.stop.is_set() {
            return Err(Error::NotInitialized);
        }
        if input.format != PixelFormat::Nv12 {
            return Err(Error::InvalidParam(format!("encoder expects NV12, got {}", input.format)));
        }
        {
            let state = self.state.lock().unwrap();
            if *state == CodecState::Created {
                return Err(Error::NotInitialized);
            }
        }

        let started = Instant::now();
        *self.state.lock().unwrap() = CodecState::Running;
        let mut codec = self.codec.lock().unwrap();
        codec.encode_put_frame(input.as_used(), force_key, MetaKey::OutputPacket, MetaKey::OutputIntra)?;

        match codec.encode_get_packet()? {
            CodecEvent::Data { bytes, intra } => {
                self.write_packet(out, &bytes, intra);
                let elapsed_us = started.elapsed().as_micros() as f64;
                self.stats.lock().unwrap().record_success(elapsed_us, input.used, bytes.len(), intra);
                *self.state.lock().unwrap() = CodecState::Configured;

                let mut frames = self.frames.lock().unwrap();
                let n = frames.tick();
                if frames.should_log(self.telemetry.log_every) {
                    log::debug!(target: self.telemetry.target, "encoded {n} frames");
                }
                Ok(EncodeOutcome::Packet { intra })
            }
            CodecEvent::Timeout => {
                // First timeout after a submission is ordinary pipeline
                // latency, not a failure.
                *self.state.lock().unwrap() = CodecState::Configured;
                Ok(EncodeOutcome::Pending)
            }
            CodecEvent::Eos => {
                *self.state.lock().unwrap() = CodecState::Draining;
                Err(Error::Eos)
            }
            CodecEvent::InfoChange { .. } => {
                Err(Error::Init("encoder does not emit info-change".into()))
            }
        }
    }

    /// Drain every packet still buffered inside the codec, bounded by
    /// `MAX_RETRIES` polls with `RETRY_BACKOFF` between them. The first
    /// timeout encountered is tolerated and retried (the pipeline may still
    /// be flushing); any timeout after that is terminal.
    pub fn drain(&self, out: &mut Vec<(Vec<u8>, bool)>) -> Result<()> {
        let mut codec = self.codec.lock().unwrap();
        let mut seen_timeout = false;
        for attempt in 0..MAX_RETRIES {
            match codec.encode_get_packet()? {
                CodecEvent::Data { bytes, intra } => {
                    self.stats.lock().unwrap().record_success(0.0, 0, bytes.len(), intra);
                    out.push((bytes, intra));
                }
                CodecEvent::Eos => return Ok(()),
                CodecEvent::Timeout => {
                    if !seen_timeout {
                        seen_timeout = true;
                        if attempt + 1 < MAX_RETRIES {
                            sleep(RETRY_BACKOFF);
                            continue;
                        }
                    }
                    self.stats.lock().unwrap().record_error();
                    return Err(Error::Timeout);
                }
                CodecEvent::InfoChange { .. } => {
                    return Err(Error::Init("encoder does not emit info-change".into()));
                }
            }
        }
        Err(Error::Timeout)
    }

    fn write_packet(&self, out: &mut Frame, bytes: &[u8], _intra: bool) {
        out.format = PixelFormat::H264;
        out.stride = 0;
        let _ = out.set_payload(bytes);
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

    fn nv12_input(resolution: Resolution) -> Frame {
        let mut f = Frame::empty(PixelFormat::Nv12);
        f.width = resolution.width;
        f.height = resolution.height;
        f.stride = resolution.width;
        f.set_payload(&vec![0u8; resolution.get_area() as usize * 3 / 2]).unwrap();
        f
    }

    #[test]
    fn keyframe_request_is_reflected_in_packet() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(64, 64), &RateControlConfig::default()).unwrap();
        let input = nv12_input(Resolution::new(64, 64));
        let mut out = Frame::empty(PixelFormat::H264);

        p.encode(&input, &mut out, false).unwrap();
        let outcome = p.encode(&input, &mut out, true).unwrap();
        assert!(matches!(outcome, EncodeOutcome::Packet { intra: true }));
        assert_eq!(p.stats().keyframe_count, 1);
    }

    #[test]
    fn consecutive_keyframe_requests_both_produce_keyframe_packets() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(64, 64), &RateControlConfig::default()).unwrap();
        let input = nv12_input(Resolution::new(64, 64));
        let mut out = Frame::empty(PixelFormat::H264);

        let first = p.encode(&input, &mut out, true).unwrap();
        assert!(matches!(first, EncodeOutcome::Packet { intra: true }));
        let second = p.encode(&input, &mut out, true).unwrap();
        assert!(matches!(second, EncodeOutcome::Packet { intra: true }));
        assert_eq!(p.stats().keyframe_count, 2);
    }

    #[test]
    fn encode_before_configure_is_not_initialized() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        let input = nv12_input(Resolution::new(4, 4));
        let mut out = Frame::empty(PixelFormat::H264);
        let err = p.encode(&input, &mut out, false).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn wrong_input_format_is_rejected() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(4, 4), &RateControlConfig::default()).unwrap();
        let bad = Frame::empty(PixelFormat::Rgb24);
        let mut out = Frame::empty(PixelFormat::H264);
        let err = p.encode(&bad, &mut out, false).unwrap_err();
        assert!(matches!(err, Error::InvalidParam(_)));
    }

    #[test]
    fn set_qp_range_rejects_out_of_order_or_over_51() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(64, 64), &RateControlConfig::default()).unwrap();
        assert!(p.set_qp_range(30, 10).is_err());
        assert!(p.set_qp_range(10, 52).is_err());
        assert!(p.set_qp_range(16, 40).is_ok());
    }

    #[test]
    fn set_profile_before_configure_is_deferred_not_an_error() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        assert!(p.set_profile(66, 30).is_ok());
        p.configure(Resolution::new(16, 16), &RateControlConfig::default()).unwrap();
        let input = nv12_input(Resolution::new(16, 16));
        let mut out = Frame::empty(PixelFormat::H264);
        p.encode(&input, &mut out, false).unwrap();
    }

    #[test]
    fn set_rc_mode_reapplies_live_configuration() {
        let p = EncodeProcessor::new(NullVendorCodec::new());
        p.configure(Resolution::new(32, 32), &RateControlConfig::default()).unwrap();
        p.set_rc_mode(RateControlMode::Cbr, 2_000_000).unwrap();
        let input = nv12_input(Resolution::new(32, 32));
        let mut out = Frame::empty(PixelFormat::H264);
        p.encode(&input, &mut out, false).unwrap();
    }
}
