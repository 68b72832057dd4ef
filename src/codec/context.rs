// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared state-machine and statistics plumbing for the decode and encode
//! processors. Grounded on the `Arc<(Mutex<C2State>, Condvar)>` pattern in
//! the teacher crate's `c2_wrapper.rs`, simplified: each processor here is a
//! synchronous per-call state machine guarded by a single `Mutex`, not a
//! worker-thread/work-queue component.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of one codec processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Created,
    Initialized,
    Configured,
    Running,
    Draining,
    Destroyed,
}

/// Output-fetch timeout, set once at setup per §4.D.
pub const OUTPUT_TIMEOUT_MS: u64 = 100;
/// Cap on encoder `get_packet` retry iterations.
pub const MAX_RETRIES: u32 = 30;
/// Backoff between retries.
pub const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(1);

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub frames_processed: u64,
    pub avg_processing_time_us: f64,
    pub success_count: u64,
    pub error_count: u64,
    pub keyframe_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub consecutive_errors: u32,
}

impl Stats {
    pub fn record_success(&mut self, elapsed_us: f64, bytes_in: usize, bytes_out: usize, is_keyframe: bool) {
        self.frames_processed += 1;
        self.success_count += 1;
        self.consecutive_errors = 0;
        self.bytes_in += bytes_in as u64;
        self.bytes_out += bytes_out as u64;
        if is_keyframe {
            self.keyframe_count += 1;
        }
        let n = self.success_count as f64;
        self.avg_processing_time_us += (elapsed_us - self.avg_processing_time_us) / n;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.consecutive_errors += 1;
    }
}

/// A cooperative stop flag inspected at the top of every codec call.
/// Cloned cheaply (it's just an `Arc`-free `AtomicBool` wrapper owned by a
/// single processor; no cross-thread sharing is required by this crate).
#[derive(Debug, Default)]
pub struct StopFlag(AtomicBool);

impl StopFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_consecutive_errors() {
        let mut s = Stats::default();
        s.record_error();
        s.record_error();
        assert_eq!(s.consecutive_errors, 2);
        s.record_success(10.0, 100, 50, false);
        assert_eq!(s.consecutive_errors, 0);
        assert_eq!(s.frames_processed, 1);
    }

    #[test]
    fn stop_flag_is_observed() {
        let flag = StopFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }
}
