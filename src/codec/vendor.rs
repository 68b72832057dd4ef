// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The injected hardware codec boundary.
//!
//! A real binary wires a concrete MPP-class decode/encode backend behind
//! this trait; this crate only ships the trait, the meta-key map, and
//! [`NullVendorCodec`], a deterministic test double that exercises every
//! state transition in [`super::decoder`]/[`super::encoder`] without any
//! hardware. Grounded on the `C2DecoderBackend`/`C2EncoderBackend` traits in
//! the teacher crate, which keep the concrete accelerator pluggable behind
//! an associated trait rather than hard-wiring a vendor SDK into the state
//! machine.

use crate::Result;

/// Per-packet/per-frame metadata keys exchanged with the vendor codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    OutputFrame,
    OutputPacket,
    OutputIntra,
    MotionInfo,
}

#[derive(Debug, Clone, Copy)]
pub struct DecoderInitConfig {
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub split_parse: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EncoderInitConfig {
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub gop_size: u32,
    pub profile: u32,
    pub level: u32,
    pub rc_mode: u32,
    pub bps_target: u32,
    pub bps_max: u32,
    pub bps_min: u32,
    pub qp_init: u32,
    pub qp_min: u32,
    pub qp_max: u32,
}

/// What a `*_get_*` poll produced this call.
#[derive(Debug)]
pub enum CodecEvent {
    /// Output geometry just became known (decoder only). The caller must
    /// (re)provision buffers and retry.
    InfoChange { width: u32, height: u32, hor_stride: u32, ver_stride: u32 },
    /// A decoded NV12 frame, or an encoded H.264 packet.
    Data { bytes: Vec<u8>, intra: bool },
    /// No output ready yet; the caller should poll again up to its retry
    /// budget.
    Timeout,
    /// The stream is finished.
    Eos,
}

/// The hardware codec boundary this crate drives but does not implement.
pub trait VendorCodec: Send {
    fn init_decoder(&mut self, cfg: DecoderInitConfig) -> Result<()>;
    fn init_encoder(&mut self, cfg: EncoderInitConfig) -> Result<()>;

    /// Allocate `count` buffers of `size` bytes each in the codec's internal
    /// buffer group, returning an opaque group handle.
    fn alloc_buffer_group(&mut self, count: u32, size: usize) -> Result<u32>;

    /// `output_key` names the meta key the codec must attach the decoded
    /// frame under once it is ready (`MetaKey::OutputFrame`).
    fn decode_put_packet(&mut self, jpeg_bytes: &[u8], output_key: MetaKey) -> Result<()>;
    fn decode_get_frame(&mut self) -> Result<CodecEvent>;

    /// `packet_key`/`intra_key` name the meta keys the codec must attach the
    /// encoded packet and its intra flag under (`MetaKey::OutputPacket`,
    /// `MetaKey::OutputIntra`).
    fn encode_put_frame(
        &mut self,
        nv12_bytes: &[u8],
        force_key: bool,
        packet_key: MetaKey,
        intra_key: MetaKey,
    ) -> Result<()>;
    fn encode_get_packet(&mut self) -> Result<CodecEvent>;

    fn reset(&mut self) -> Result<()>;
}

/// Deterministic loopback double used by this crate's own tests.
///
/// Decode: the first `decode_get_frame` after init always reports
/// `InfoChange`; every call after that echoes back an all-zero NV12 frame
/// sized to the configured geometry. Encode: every `encode_get_packet`
/// immediately returns a packet whose length equals the input frame length
/// shrunk by a fixed factor, with `intra` mirroring the `force_key` flag
/// passed to `encode_put_frame`.
pub struct NullVendorCodec {
    decoder_cfg: Option<DecoderInitConfig>,
    encoder_cfg: Option<EncoderInitConfig>,
    info_change_sent: bool,
    pending_frame: Option<Vec<u8>>,
    last_force_key: bool,
    pending_packet_len: Option<usize>,
    /// Meta keys observed on the most recent `*_put_*` call, so tests can
    /// assert the processors attach the keys the spec requires.
    last_decode_key: Option<MetaKey>,
    last_encode_keys: Option<(MetaKey, MetaKey)>,
}

impl NullVendorCodec {
    pub fn new() -> Self {
        Self {
            decoder_cfg: None,
            encoder_cfg: None,
            info_change_sent: false,
            pending_frame: None,
            last_force_key: false,
            pending_packet_len: None,
            last_decode_key: None,
            last_encode_keys: None,
        }
    }

    /// The meta key passed to the most recent `decode_put_packet`, if any.
    pub fn last_decode_key(&self) -> Option<MetaKey> {
        self.last_decode_key
    }

    /// The `(packet_key, intra_key)` pair passed to the most recent
    /// `encode_put_frame`, if any.
    pub fn last_encode_keys(&self) -> Option<(MetaKey, MetaKey)> {
        self.last_encode_keys
    }
}

impl Default for NullVendorCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorCodec for NullVendorCodec {
    fn init_decoder(&mut self, cfg: DecoderInitConfig) -> Result<()> {
        self.decoder_cfg = Some(cfg);
        self.info_change_sent = false;
        Ok(())
    }

    fn init_encoder(&mut self, cfg: EncoderInitConfig) -> Result<()> {
        self.encoder_cfg = Some(cfg);
        Ok(())
    }

    fn alloc_buffer_group(&mut self, count: u32, _size: usize) -> Result<u32> {
        Ok(count)
    }

    fn decode_put_packet(&mut self, jpeg_bytes: &[u8], output_key: MetaKey) -> Result<()> {
        let cfg = self.decoder_cfg.as_ref().ok_or(crate::Error::NotInitialized)?;
        let size = (cfg.hor_stride as usize * cfg.ver_stride as usize * 3) / 2;
        let mut out = vec![0u8; size];
        if let Some(b) = jpeg_bytes.first() {
            out[0] = *b;
        }
        self.pending_frame = Some(out);
        self.last_decode_key = Some(output_key);
        Ok(())
    }

    fn decode_get_frame(&mut self) -> Result<CodecEvent> {
        let cfg = *self.decoder_cfg.as_ref().ok_or(crate::Error::NotInitialized)?;
        if !self.info_change_sent {
            self.info_change_sent = true;
            return Ok(CodecEvent::InfoChange {
                width: cfg.width,
                height: cfg.height,
                hor_stride: cfg.hor_stride,
                ver_stride: cfg.ver_stride,
            });
        }
        match self.pending_frame.take() {
            Some(bytes) => Ok(CodecEvent::Data { bytes, intra: false }),
            None => Ok(CodecEvent::Timeout),
        }
    }

    fn encode_put_frame(
        &mut self,
        nv12_bytes: &[u8],
        force_key: bool,
        packet_key: MetaKey,
        intra_key: MetaKey,
    ) -> Result<()> {
        self.encoder_cfg.as_ref().ok_or(crate::Error::NotInitialized)?;
        self.last_force_key = force_key;
        self.pending_packet_len = Some((nv12_bytes.len() / 8).max(64));
        self.last_encode_keys = Some((packet_key, intra_key));
        Ok(())
    }

    fn encode_get_packet(&mut self) -> Result<CodecEvent> {
        match self.pending_packet_len.take() {
            Some(len) => Ok(CodecEvent::Data { bytes: vec![0u8; len], intra: self.last_force_key }),
            None => Ok(CodecEvent::Timeout),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.info_change_sent = false;
        self.pending_frame = None;
        self.pending_packet_len = None;
        Ok(())
    }
}
