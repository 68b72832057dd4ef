// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! BT.601 studio-range RGB <-> YUV matrix, used by every converter in
//! [`super`] instead of fixed-point LibYUV-style coefficients.

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// RGB (0..255 each) -> (Y, U, V), all 0..255.
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.147 * r - 0.289 * g + 0.436 * b + 128.0;
    let v = 0.615 * r - 0.515 * g - 0.100 * b + 128.0;
    (clamp_u8(y), clamp_u8(u), clamp_u8(v))
}

/// (Y, U, V) -> RGB, inverse of [`rgb_to_yuv`].
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.140 * v;
    let g = y - 0.395 * u - 0.581 * v;
    let b = y + 2.032 * u;
    (clamp_u8(r), clamp_u8(g), clamp_u8(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_and_white_round_trip() {
        let (y, u, v) = rgb_to_yuv(0, 0, 0);
        assert_eq!((y, u, v), (0, 128, 128));
        let (y, u, v) = rgb_to_yuv(255, 255, 255);
        assert_eq!(y, 255);
        assert_eq!(u, 128);
        assert_eq!(v, 128);
    }

    #[test]
    fn approximate_round_trip() {
        for &(r, g, b) in &[(200u8, 40u8, 90u8), (10, 200, 230), (128, 128, 128)] {
            let (y, u, v) = rgb_to_yuv(r, g, b);
            let (r2, g2, b2) = yuv_to_rgb(y, u, v);
            assert!((r as i32 - r2 as i32).abs() <= 2);
            assert!((g as i32 - g2 as i32).abs() <= 2);
            assert!((b as i32 - b2 as i32).abs() <= 2);
        }
    }
}
