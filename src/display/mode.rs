// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pure mode-scoring logic, kept separate from the real `drm::control::Mode`
//! type so it can be unit tested without a modesetting device.

/// A modesetting-independent view of one display mode candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeCandidate {
    pub index: usize,
    pub hdisplay: u32,
    pub vdisplay: u32,
    pub vrefresh: u32,
    pub preferred: bool,
    pub interlaced: bool,
}

/// Special-case coercion: some panels advertise a `640x416` capture
/// geometry that should scan out on a standard `640x480` mode with the
/// active vertical area clipped to `416`.
pub fn coerce_640x416(want_w: u32, want_h: u32) -> (u32, u32) {
    if want_w == 640 && want_h == 416 {
        (640, 480)
    } else {
        (want_w, want_h)
    }
}

/// Score and select the best mode for `(want_w, want_h, want_hz)`.
///
/// Scoring order (lower is better): exact resolution+refresh; exact
/// resolution any refresh; same width and smaller height; the driver's
/// preferred mode; anything else. Interlaced modes are never selected.
pub fn select_mode(modes: &[ModeCandidate], want_w: u32, want_h: u32, want_hz: u32) -> Option<ModeCandidate> {
    let (search_w, search_h) = coerce_640x416(want_w, want_h);
    let coerced_640x416 = want_w == 640 && want_h == 416;

    let mut best: Option<(u32, ModeCandidate)> = None;
    for m in modes {
        if m.interlaced {
            continue;
        }
        let score = if m.hdisplay == search_w && m.vdisplay == search_h && m.vrefresh == want_hz {
            0
        } else if m.hdisplay == search_w && m.vdisplay == search_h {
            1
        } else if m.hdisplay == search_w && m.vdisplay < search_h {
            2
        } else if m.preferred {
            3
        } else {
            4
        };
        if best.map(|(s, _)| score < s).unwrap_or(true) {
            best = Some((score, *m));
        }
    }
    // The hardware timing stays whatever real mode was picked (e.g. the
    // physical 640x480 timing); only the *active area* we report back is
    // coerced to the requested 416, so buffer sizing downstream matches the
    // capture geometry instead of the panel's native one.
    best.map(|(_, m)| if coerced_640x416 { ModeCandidate { vdisplay: 416, ..m } } else { m })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(i: usize, w: u32, h: u32, hz: u32, pref: bool, interlaced: bool) -> ModeCandidate {
        ModeCandidate { index: i, hdisplay: w, vdisplay: h, vrefresh: hz, preferred: pref, interlaced }
    }

    #[test]
    fn prefers_exact_match() {
        let modes = vec![
            cand(0, 1920, 1080, 60, true, false),
            cand(1, 1280, 720, 60, false, false),
        ];
        let picked = select_mode(&modes, 1280, 720, 60).unwrap();
        assert_eq!(picked.index, 1);
    }

    #[test]
    fn falls_back_to_preferred_when_nothing_matches() {
        let modes = vec![cand(0, 1920, 1080, 60, true, false), cand(1, 720, 480, 60, false, false)];
        let picked = select_mode(&modes, 3840, 2160, 60).unwrap();
        assert_eq!(picked.index, 0);
    }

    #[test]
    fn rejects_interlaced_modes() {
        let modes = vec![cand(0, 1920, 1080, 60, true, true)];
        assert!(select_mode(&modes, 1920, 1080, 60).is_none());
    }

    #[test]
    fn coerces_640x416_capture_onto_640x480_mode() {
        let modes = vec![cand(0, 640, 480, 60, true, false)];
        let picked = select_mode(&modes, 640, 416, 60).unwrap();
        // The real hardware timing (index 0, 640x480) is still selected, but
        // the reported active area is coerced down to the requested 416.
        assert_eq!(picked.index, 0);
        assert_eq!((picked.hdisplay, picked.vdisplay), (640, 416));
    }
}
