// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Plain configuration structs handed to components at construction time.
//!
//! None of these types read argv or the environment; the embedding binary
//! (out of scope for this crate) owns option parsing and builds these by
//! hand, the same way the teacher crate's `C2Worker::Options` is a plain
//! `Clone` struct supplied by the caller rather than parsed internally.

use crate::telemetry::Telemetry;

/// Rate-control mode for the hardware H.264 encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControlMode {
    /// Variable bitrate.
    Vbr,
    /// Constant bitrate.
    Cbr,
}

#[derive(Debug, Clone)]
pub struct RateControlConfig {
    pub mode: RateControlMode,
    pub bps_target: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub gop_size: u32,
    pub profile: u32,
    pub level: u32,
    pub qp_init: u32,
    pub qp_min: u32,
    pub qp_max: u32,
}

impl RateControlConfig {
    pub fn bps_max(&self) -> u32 {
        (self.bps_target as f64 * 1.2) as u32
    }

    pub fn bps_min(&self) -> u32 {
        (self.bps_target as f64 * 0.8) as u32
    }
}

impl Default for RateControlConfig {
    fn default() -> Self {
        Self {
            mode: RateControlMode::Vbr,
            bps_target: 4_000_000,
            fps_num: 30,
            fps_den: 1,
            gop_size: 60,
            profile: 100, // High
            level: 40,    // 4.0
            qp_init: 24,
            qp_min: 16,
            qp_max: 40,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub hz: u32,
    /// Forced connector port name (e.g. `"HDMI-A-1"`); `None` picks the
    /// first connected connector.
    pub port: Option<String>,
    /// Seconds of no live frame before the display is DPMS-powered off.
    pub blank_after: u32,
    /// Log target and periodic-logging cadence for the display runtime.
    pub telemetry: Telemetry,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub display: DisplayConfig,
    pub rate_control: RateControlConfig,
    /// Log target and periodic-logging cadence for the transcoder; codec
    /// processors take their own via `with_telemetry`.
    pub telemetry: Telemetry,
}
