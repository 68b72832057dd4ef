// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Dispatches input-format -> NV12 (hardware decode, CPU convert, or
//! zero-copy pass-through) and then NV12 -> H.264.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::codec::{DecodeProcessor, EncodeOutcome, EncodeProcessor, Stats, VendorCodec};
use crate::config::RateControlConfig;
use crate::telemetry::{FrameCounter, Telemetry};
use crate::{format, jpeg, Error, Frame, PixelFormat, Resolution, Result};

pub struct TranscoderStats {
    pub decode: Stats,
    pub encode: Stats,
}

/// Chains §4.C/§4.D/§4.B into a single per-frame call.
pub struct Transcoder<D: VendorCodec, E: VendorCodec> {
    decoder: DecodeProcessor<D>,
    decoder_configured: AtomicBool,
    encoder: EncodeProcessor<E>,
    nv12: Mutex<Frame>,
    conv: Mutex<Frame>,
    last_format: Mutex<Option<PixelFormat>>,
    resolution: Resolution,
    telemetry: Telemetry,
    frames: Mutex<FrameCounter>,
}

impl<D: VendorCodec, E: VendorCodec> Transcoder<D, E> {
    pub fn new(decoder_codec: D, encoder_codec: E, resolution: Resolution, rc: &RateControlConfig) -> Result<Self> {
        Self::with_telemetry(decoder_codec, encoder_codec, resolution, rc, Telemetry::default())
    }

    /// Same as [`Transcoder::new`] but with an explicit `log` target and
    /// periodic-logging cadence instead of the default, silent one.
    pub fn with_telemetry(
        decoder_codec: D,
        encoder_codec: E,
        resolution: Resolution,
        rc: &RateControlConfig,
        telemetry: Telemetry,
    ) -> Result<Self> {
        let encoder = EncodeProcessor::new(encoder_codec);
        encoder.configure(resolution, rc)?;
        Ok(Self {
            decoder: DecodeProcessor::new(decoder_codec),
            decoder_configured: AtomicBool::new(false),
            encoder,
            nv12: Mutex::new(Frame::new_raw(PixelFormat::Nv12, resolution, resolution.width)),
            conv: Mutex::new(Frame::empty(PixelFormat::Nv12)),
            last_format: Mutex::new(None),
            resolution,
            telemetry,
            frames: Mutex::new(FrameCounter::new()),
        })
    }

    /// Process one input frame, producing at most one H.264 packet in
    /// `h264_out`. `force_key` requests the next produced packet be a
    /// keyframe; it is forwarded to the encoder on every dispatch path.
    /// Returns `Error::InfoChange` transparently when the hardware decoder's
    /// geometry just became known; the caller should resubmit the same
    /// input on its next call.
    pub fn process(&self, input: &Frame, h264_out: &mut Frame, force_key: bool) -> Result<EncodeOutcome> {
        *self.last_format.lock().unwrap() = Some(input.format);

        let outcome = match input.format {
            PixelFormat::Mjpeg | PixelFormat::Jpeg => {
                if !self.decoder_configured.load(Ordering::SeqCst) {
                    // Use the first frame's real decoded geometry when it can
                    // be probed; fall back to the constructor's resolution if
                    // the bitstream can't be parsed yet (e.g. a corrupt first
                    // frame).
                    let geometry = jpeg::probe(input)
                        .map(|(w, h, _is_420)| Resolution::new(w, h))
                        .unwrap_or(self.resolution);
                    self.decoder.configure(geometry)?;
                    self.decoder_configured.store(true, Ordering::SeqCst);
                }
                let mut nv12 = self.nv12.lock().unwrap();
                self.decoder.decode(input, &mut nv12)?;
                self.encoder.encode(&nv12, h264_out, force_key)
            }
            PixelFormat::Nv12 => self.encoder.encode(input, h264_out, force_key),
            other => {
                let mut conv = self.conv.lock().unwrap();
                conv.format = PixelFormat::Nv12;
                conv.width = input.width;
                conv.height = input.height;
                conv.stride = input.width;
                format::convert(input, &mut conv, None)
                    .map_err(|_| Error::FormatUnsupported { src: other, dst: PixelFormat::Nv12 })?;
                self.encoder.encode(&conv, h264_out, force_key)
            }
        };

        if outcome.is_ok() {
            let mut frames = self.frames.lock().unwrap();
            let n = frames.tick();
            if frames.should_log(self.telemetry.log_every) {
                log::debug!(target: self.telemetry.target, "transcoded {n} frames");
            }
        }
        outcome
    }

    pub fn stats(&self) -> TranscoderStats {
        TranscoderStats { decode: self.decoder.stats(), encode: self.encoder.stats() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NullVendorCodec;

    #[test]
    fn nv12_input_is_zero_copy_to_the_encoder() {
        let t = Transcoder::new(
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
        t.process(&input, &mut out, false).unwrap();
        assert_eq!(out.format, PixelFormat::H264);
    }

    #[test]
    fn mjpeg_input_surfaces_info_change_once() {
        let t = Transcoder::new(
            NullVendorCodec::new(),
            NullVendorCodec::new(),
            Resolution::new(64, 64),
            &RateControlConfig::default(),
        )
        .unwrap();

        let mut input = Frame::empty(PixelFormat::Mjpeg);
        input.set_payload(&[0xFF, 0xD8, 1, 0xFF, 0xD9]).unwrap();
        let mut out = Frame::empty(PixelFormat::H264);

        let first = t.process(&input, &mut out, false);
        assert!(matches!(first, Err(Error::InfoChange)));
        t.process(&input, &mut out, false).unwrap();
    }

    #[test]
    fn force_key_is_forwarded_on_every_dispatch_path() {
        let t = Transcoder::new(
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
        let outcome = t.process(&input, &mut out, true).unwrap();
        assert!(matches!(outcome, EncodeOutcome::Packet { intra: true }));
    }
}
