// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pixel format conversion: a finite, enumerated table of source/destination
//! pairs, each a pure function over plane bytes. Grounded on the
//! `convert_video_frame`/`SUPPORTED_CONVERSION` dispatch shape used for
//! NV12/I420/ARGB conversion in hardware-codec front ends, generalized to
//! this crate's wider set of capture formats.

pub mod bt601;

use zerocopy::{Immutable, IntoBytes, KnownLayout};

use crate::{jpeg, Error, Frame, PixelFormat, Resolution, Result};
use bt601::{rgb_to_yuv, yuv_to_rgb};

/// One XRGB8888 texel, laid out byte-for-byte the way the display engine's
/// dumb buffers expect it (little-endian BGRX in memory).
#[derive(Clone, Copy, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
struct BgrxTexel {
    b: u8,
    g: u8,
    r: u8,
    x: u8,
}

/// Every `(src, dst)` pair this module can convert between.
pub const SUPPORTED_CONVERSION: &[(PixelFormat, PixelFormat)] = &[
    (PixelFormat::Yuyv, PixelFormat::Nv12),
    (PixelFormat::Yuyv, PixelFormat::Xrgb8888),
    (PixelFormat::Rgb24, PixelFormat::Nv12),
    (PixelFormat::Bgr24, PixelFormat::Nv12),
    (PixelFormat::Rgb24, PixelFormat::Xrgb8888),
    (PixelFormat::Bgr24, PixelFormat::Xrgb8888),
    (PixelFormat::Yuv420, PixelFormat::Nv12),
    (PixelFormat::Nv16, PixelFormat::Nv12),
    (PixelFormat::Nv12, PixelFormat::Nv12),
    (PixelFormat::Mjpeg, PixelFormat::Yuv420),
    (PixelFormat::Jpeg, PixelFormat::Yuv420),
    (PixelFormat::Mjpeg, PixelFormat::Xrgb8888),
    (PixelFormat::Jpeg, PixelFormat::Xrgb8888),
];

/// Where in the destination the source rectangle should land. `None` means
/// the destination is exactly the source's size (a plain, full-frame write).
#[derive(Debug, Clone, Copy, Default)]
pub struct Center {
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Center {
    /// Compute the centering offset for a source placed inside `mode`.
    pub fn compute(mode: Resolution, src: Resolution) -> Self {
        Self {
            offset_x: (mode.width.saturating_sub(src.width)) / 2 & !1,
            offset_y: (mode.height.saturating_sub(src.height)) / 2 & !1,
        }
    }
}

/// Convert `src` into `dst`, which must already have `dst.format`,
/// `dst.width`/`dst.height` (the destination's own geometry, which may be
/// larger than `src` when `center` is given) and `dst.stride` set by the
/// caller. Returns `Error::FormatUnsupported` for any pair not in
/// [`SUPPORTED_CONVERSION`].
pub fn convert(src: &Frame, dst: &mut Frame, center: Option<Center>) -> Result<()> {
    let pair = (src.format, dst.format);
    if !SUPPORTED_CONVERSION.contains(&pair) {
        return Err(Error::FormatUnsupported { src: src.format, dst: dst.format });
    }
    let c = center.unwrap_or_default();
    match pair {
        (PixelFormat::Yuyv, PixelFormat::Nv12) => yuyv_to_nv12(src, dst, c),
        (PixelFormat::Yuyv, PixelFormat::Xrgb8888) => yuyv_to_argb(src, dst, c),
        (PixelFormat::Rgb24, PixelFormat::Nv12) => packed_rgb_to_nv12(src, dst, c, false),
        (PixelFormat::Bgr24, PixelFormat::Nv12) => packed_rgb_to_nv12(src, dst, c, true),
        (PixelFormat::Rgb24, PixelFormat::Xrgb8888) => packed_rgb_to_argb(src, dst, c, false),
        (PixelFormat::Bgr24, PixelFormat::Xrgb8888) => packed_rgb_to_argb(src, dst, c, true),
        (PixelFormat::Yuv420, PixelFormat::Nv12) => i420_to_nv12(src, dst, c),
        (PixelFormat::Nv16, PixelFormat::Nv12) => nv16_to_nv12(src, dst, c),
        (PixelFormat::Nv12, PixelFormat::Nv12) => nv12_to_nv12(src, dst, c),
        (PixelFormat::Mjpeg, PixelFormat::Yuv420) | (PixelFormat::Jpeg, PixelFormat::Yuv420) => {
            jpeg_to_yuv420(src, dst)
        }
        (PixelFormat::Mjpeg, PixelFormat::Xrgb8888) | (PixelFormat::Jpeg, PixelFormat::Xrgb8888) => {
            jpeg_to_argb(src, dst, c)
        }
        _ => unreachable!("pair checked against SUPPORTED_CONVERSION above"),
    }
}

fn nv12_plane_offsets(stride: u32, height: u32) -> (usize, usize) {
    let y_size = stride as usize * height as usize;
    (0, y_size)
}

fn yuyv_to_nv12(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let dstride = dst.stride as usize;
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (y_off, uv_off) = nv12_plane_offsets(dst.stride, dst.height);
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);

    let src_row_bytes = sw * 2;
    for row_pair in 0..(sh / 2) {
        let r0 = row_pair * 2;
        let r1 = r0 + 1;
        let row0 = &src.as_used()[r0 * src_row_bytes..r0 * src_row_bytes + src_row_bytes];
        let row1 = &src.as_used()[r1 * src_row_bytes..r1 * src_row_bytes + src_row_bytes];
        for x in 0..sw {
            let y0 = row0[x * 2];
            dst.data[y_off + (oy + r0) * dstride + ox + x] = y0;
            let y1 = row1[x * 2];
            dst.data[y_off + (oy + r1) * dstride + ox + x] = y1;
        }
        for cx in 0..(sw / 2) {
            let (u0, v0) = (row0[cx * 4 + 1], row0[cx * 4 + 3]);
            let (u1, v1) = (row1[cx * 4 + 1], row1[cx * 4 + 3]);
            let u = ((u0 as u16 + u1 as u16) / 2) as u8;
            let v = ((v0 as u16 + v1 as u16) / 2) as u8;
            let uv_row = oy / 2 + row_pair;
            let idx = uv_off + uv_row * dstride + ox + cx * 2;
            dst.data[idx] = u;
            dst.data[idx + 1] = v;
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

fn write_argb(dst: &mut Frame, x: usize, y: usize, r: u8, g: u8, b: u8) {
    let stride = dst.stride as usize;
    let idx = y * stride + x * 4;
    let texel = BgrxTexel { b, g, r, x: 0xFF };
    dst.data[idx..idx + 4].copy_from_slice(texel.as_bytes());
}

fn yuyv_to_argb(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);
    let src_row_bytes = sw * 2;

    for row in 0..sh {
        let r = &src.as_used()[row * src_row_bytes..row * src_row_bytes + src_row_bytes];
        for cx in 0..(sw / 2) {
            let y0 = r[cx * 4];
            let u = r[cx * 4 + 1];
            let y1 = r[cx * 4 + 2];
            let v = r[cx * 4 + 3];
            let (r0, g0, b0) = yuv_to_rgb(y0, u, v);
            let (r1, g1, b1) = yuv_to_rgb(y1, u, v);
            write_argb(dst, ox + cx * 2, oy + row, r0, g0, b0);
            write_argb(dst, ox + cx * 2 + 1, oy + row, r1, g1, b1);
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

fn packed_rgb_to_nv12(src: &Frame, dst: &mut Frame, c: Center, swapped: bool) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (y_off, uv_off) = nv12_plane_offsets(dst.stride, dst.height);
    let dstride = dst.stride as usize;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);
    let src_row_bytes = sw * 3;

    for row_pair in 0..(sh / 2) {
        for sub in 0..2 {
            let row = row_pair * 2 + sub;
            let r = &src.as_used()[row * src_row_bytes..row * src_row_bytes + src_row_bytes];
            for x in 0..sw {
                let (a, _b1, c1) = (r[x * 3], r[x * 3 + 1], r[x * 3 + 2]);
                let (rr, gg, bb) = if swapped { (c1, r[x * 3 + 1], a) } else { (a, r[x * 3 + 1], c1) };
                let (y, _, _) = rgb_to_yuv(rr, gg, bb);
                dst.data[y_off + (oy + row) * dstride + ox + x] = y;
            }
        }
        for cx in 0..(sw / 2) {
            let mut usum = 0u32;
            let mut vsum = 0u32;
            for sub in 0..2 {
                let row = row_pair * 2 + sub;
                let r = &src.as_used()[row * src_row_bytes..row * src_row_bytes + src_row_bytes];
                for dx in 0..2 {
                    let px = cx * 2 + dx;
                    let (a, g, c1) = (r[px * 3], r[px * 3 + 1], r[px * 3 + 2]);
                    let (rr, gg, bb) = if swapped { (c1, g, a) } else { (a, g, c1) };
                    let (_, u, v) = rgb_to_yuv(rr, gg, bb);
                    usum += u as u32;
                    vsum += v as u32;
                }
            }
            let uv_row = oy / 2 + row_pair;
            let idx = uv_off + uv_row * dstride + ox + cx * 2;
            dst.data[idx] = (usum / 4) as u8;
            dst.data[idx + 1] = (vsum / 4) as u8;
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

fn packed_rgb_to_argb(src: &Frame, dst: &mut Frame, c: Center, swapped: bool) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);
    let src_row_bytes = sw * 3;

    for row in 0..sh {
        let r = &src.as_used()[row * src_row_bytes..row * src_row_bytes + src_row_bytes];
        for x in 0..sw {
            let (a, g, c1) = (r[x * 3], r[x * 3 + 1], r[x * 3 + 2]);
            let (rr, gg, bb) = if swapped { (c1, g, a) } else { (a, g, c1) };
            write_argb(dst, ox + x, oy + row, rr, gg, bb);
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

/// Copy a single subsampled plane from `src` into `dst` at `(dst_x, dst_y)`.
fn copy_plane(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    dst_x: usize,
    dst_y: usize,
    width: usize,
    height: usize,
) {
    for row in 0..height {
        let s = &src[row * src_stride..row * src_stride + width];
        let d_start = (dst_y + row) * dst_stride + dst_x;
        dst[d_start..d_start + width].copy_from_slice(s);
    }
}

fn i420_to_nv12(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (y_off, uv_off) = nv12_plane_offsets(dst.stride, dst.height);
    let dstride = dst.stride as usize;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);

    let sy = &src.as_used()[0..sw * sh];
    let su_off = sw * sh;
    let su = &src.as_used()[su_off..su_off + (sw / 2) * (sh / 2)];
    let sv_off = su_off + (sw / 2) * (sh / 2);
    let sv = &src.as_used()[sv_off..sv_off + (sw / 2) * (sh / 2)];

    let mut y_plane = vec![0u8; dstride * dst.height as usize];
    copy_plane(sy, sw, &mut y_plane, dstride, ox, oy, sw, sh);
    dst.data[y_off..y_off + y_plane.len()].copy_from_slice(&y_plane);

    for row in 0..(sh / 2) {
        for cx in 0..(sw / 2) {
            let uv_row = oy / 2 + row;
            let idx = uv_off + uv_row * dstride + ox + cx * 2;
            dst.data[idx] = su[row * (sw / 2) + cx];
            dst.data[idx + 1] = sv[row * (sw / 2) + cx];
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

fn nv16_to_nv12(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (y_off, uv_off) = nv12_plane_offsets(dst.stride, dst.height);
    let dstride = dst.stride as usize;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);

    let sy = &src.as_used()[0..sw * sh];
    let suv_off = sw * sh;
    let suv = &src.as_used()[suv_off..suv_off + sw * sh];

    let mut y_plane = vec![0u8; dstride * dst.height as usize];
    copy_plane(sy, sw, &mut y_plane, dstride, ox, oy, sw, sh);
    dst.data[y_off..y_off + y_plane.len()].copy_from_slice(&y_plane);

    for row_pair in 0..(sh / 2) {
        let r0 = &suv[(row_pair * 2) * sw..(row_pair * 2) * sw + sw];
        let r1 = &suv[(row_pair * 2 + 1) * sw..(row_pair * 2 + 1) * sw + sw];
        for cx in 0..(sw / 2) {
            let u = ((r0[cx * 2] as u16 + r1[cx * 2] as u16) / 2) as u8;
            let v = ((r0[cx * 2 + 1] as u16 + r1[cx * 2 + 1] as u16) / 2) as u8;
            let uv_row = oy / 2 + row_pair;
            let idx = uv_off + uv_row * dstride + ox + cx * 2;
            dst.data[idx] = u;
            dst.data[idx + 1] = v;
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

fn nv12_to_nv12(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    if c.offset_x == 0 && c.offset_y == 0 && dst.width == src.width && dst.height == src.height && dst.stride == src.stride {
        dst.set_payload(src.as_used())?;
        return Ok(());
    }
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (y_off, uv_off) = nv12_plane_offsets(dst.stride, dst.height);
    let dstride = dst.stride as usize;
    let sstride = src.stride as usize;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);

    let sy = &src.as_used()[0..sstride * sh];
    let mut y_plane = vec![0u8; dstride * dst.height as usize];
    copy_plane(sy, sstride, &mut y_plane, dstride, ox, oy, sw, sh);
    dst.data[y_off..y_off + y_plane.len()].copy_from_slice(&y_plane);

    let suv_off = sstride * sh;
    let suv = &src.as_used()[suv_off..suv_off + sstride * (sh / 2)];
    for row in 0..(sh / 2) {
        let uv_row = oy / 2 + row;
        let d_start = uv_off + uv_row * dstride + ox;
        let s_start = row * sstride;
        dst.data[d_start..d_start + sw].copy_from_slice(&suv[s_start..s_start + sw]);
    }
    dst.used = dst.data.len();
    Ok(())
}

fn jpeg_to_yuv420(src: &Frame, dst: &mut Frame) -> Result<()> {
    let decoded = jpeg::decode(src)?;
    if decoded.format != PixelFormat::Yuv420 {
        return Err(Error::FormatUnsupported { src: PixelFormat::Mjpeg, dst: PixelFormat::Yuv420 });
    }
    *dst = decoded;
    Ok(())
}

fn jpeg_to_argb(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    let decoded = jpeg::decode(src)?;
    match decoded.format {
        PixelFormat::Rgb24 => packed_rgb_to_argb(&decoded, dst, c, false),
        PixelFormat::Yuv420 => i420_to_argb(&decoded, dst, c),
        other => Err(Error::FormatUnsupported { src: other, dst: PixelFormat::Xrgb8888 }),
    }
}

fn i420_to_argb(src: &Frame, dst: &mut Frame, c: Center) -> Result<()> {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let need = dst.format.payload_size(dst.resolution()).ok_or(Error::InvalidParam("dst size".into()))?;
    dst.ensure_capacity(need)?;
    let (ox, oy) = (c.offset_x as usize, c.offset_y as usize);

    let sy = &src.as_used()[0..sw * sh];
    let su_off = sw * sh;
    let su = &src.as_used()[su_off..su_off + (sw / 2) * (sh / 2)];
    let sv_off = su_off + (sw / 2) * (sh / 2);
    let sv = &src.as_used()[sv_off..sv_off + (sw / 2) * (sh / 2)];

    for row in 0..sh {
        for x in 0..sw {
            let y = sy[row * sw + x];
            let u = su[(row / 2) * (sw / 2) + x / 2];
            let v = sv[(row / 2) * (sw / 2) + x / 2];
            let (r, g, b) = yuv_to_rgb(y, u, v);
            write_argb(dst, ox + x, oy + row, r, g, b);
        }
    }
    dst.used = dst.data.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yuyv_frame(w: u32, h: u32, fill: u8) -> Frame {
        let mut f = Frame::empty(PixelFormat::Yuyv);
        f.width = w;
        f.height = h;
        f.stride = w * 2;
        f.set_payload(&vec![fill; (w * h * 2) as usize]).unwrap();
        f
    }

    fn nv12_dst(w: u32, h: u32) -> Frame {
        let mut f = Frame::empty(PixelFormat::Nv12);
        f.width = w;
        f.height = h;
        f.stride = w;
        f
    }

    #[test]
    fn yuyv_pass_through_scenario_sizes() {
        let src = yuyv_frame(1280, 720, 128);
        let mut dst = nv12_dst(1280, 720);
        convert(&src, &mut dst, None).unwrap();
        assert_eq!(dst.stride, 1280);
        assert_eq!(dst.used, 1_382_400);
    }

    #[test]
    fn nv12_identity_is_byte_identical() {
        let mut src = Frame::empty(PixelFormat::Nv12);
        src.width = 4;
        src.height = 4;
        src.stride = 4;
        let payload: Vec<u8> = (0..24u8).collect();
        src.set_payload(&payload).unwrap();

        let mut dst = nv12_dst(4, 4);
        convert(&src, &mut dst, None).unwrap();
        assert_eq!(dst.as_used(), payload.as_slice());
    }

    #[test]
    fn i420_roundtrips_through_nv12() {
        let mut i420 = Frame::empty(PixelFormat::Yuv420);
        i420.width = 4;
        i420.height = 4;
        i420.stride = 4;
        let y = vec![10u8, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120, 130, 140, 150, 160];
        let u = vec![1u8, 2, 3, 4];
        let v = vec![5u8, 6, 7, 8];
        let mut payload = y.clone();
        payload.extend_from_slice(&u);
        payload.extend_from_slice(&v);
        i420.set_payload(&payload).unwrap();

        let mut nv12 = nv12_dst(4, 4);
        convert(&i420, &mut nv12, None).unwrap();

        assert_eq!(&nv12.as_used()[0..16], y.as_slice());
        for i in 0..4 {
            assert_eq!(nv12.as_used()[16 + i * 2], u[i]);
            assert_eq!(nv12.as_used()[16 + i * 2 + 1], v[i]);
        }
    }

    #[test]
    fn centering_computes_even_offsets() {
        let c = Center::compute(Resolution::new(640, 480), Resolution::new(320, 200));
        assert_eq!(c.offset_x, 160);
        assert_eq!(c.offset_y, 140);
    }

    #[test]
    fn unsupported_pair_is_rejected() {
        let src = Frame::empty(PixelFormat::H264);
        let mut dst = Frame::empty(PixelFormat::Nv12);
        let err = convert(&src, &mut dst, None).unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported { .. }));
    }
}
