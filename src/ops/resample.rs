// ============================================================================
// RESAMPLER: scale / rotate BGRA buffers on the CPU
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{Bgra, PixelBuffer, TRANSPARENT};

/// Filter used when a pending scale is baked into the floating buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleFilter {
    #[default]
    Nearest,
    Bilinear,
    /// Eric Johnston's 2× pixel-art upscaler.
    Epx,
    /// AdvMAME Scale2x.
    Scale2x,
}

impl ScaleFilter {
    pub fn name(&self) -> &'static str {
        match self {
            ScaleFilter::Nearest => "nearest",
            ScaleFilter::Bilinear => "bilinear",
            ScaleFilter::Epx => "epx",
            ScaleFilter::Scale2x => "scale2x",
        }
    }

    /// Parse a filter name. Anything unrecognised falls back to `Nearest`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bilinear" | "linear" => ScaleFilter::Bilinear,
            "epx" => ScaleFilter::Epx,
            "scale2x" | "advmame2x" => ScaleFilter::Scale2x,
            _ => ScaleFilter::Nearest,
        }
    }
}

/// Algorithm used when a pending rotation is baked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationMode {
    #[default]
    Nearest,
    /// Rotate an 8× Scale2x upscale and sample it back down.
    RotSpriteApprox,
}

impl RotationMode {
    pub fn name(&self) -> &'static str {
        match self {
            RotationMode::Nearest => "nearest",
            RotationMode::RotSpriteApprox => "rotsprite",
        }
    }

    /// Parse a mode name. Anything unrecognised falls back to `Nearest`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "rotsprite" | "rotsprite_approx" | "rotspriteapprox" => RotationMode::RotSpriteApprox,
            _ => RotationMode::Nearest,
        }
    }
}

/// Largest pixel count the 8× RotSprite intermediate may reach.
const ROTSPRITE_MAX_PIXELS: u64 = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
//  Scaling
// ---------------------------------------------------------------------------

/// Scale to exactly `w × h` (each at least 1) with the chosen filter.
pub fn scale_buffer(src: &PixelBuffer, w: u32, h: u32, filter: ScaleFilter) -> PixelBuffer {
    let (w, h) = (w.max(1), h.max(1));
    if src.is_empty() {
        return PixelBuffer::new(w, h);
    }
    if src.dimensions() == (w, h) {
        return src.clone();
    }
    match filter {
        ScaleFilter::Nearest => resize_nearest(src, w, h),
        ScaleFilter::Bilinear => resize_bilinear(src, w, h),
        ScaleFilter::Epx => upscale_pixel_art(src, w, h, epx),
        ScaleFilter::Scale2x => upscale_pixel_art(src, w, h, scale2x),
    }
}

/// Nearest-neighbour resize using integer source indexing.
pub fn resize_nearest(src: &PixelBuffer, w: u32, h: u32) -> PixelBuffer {
    let mut out = PixelBuffer::new(w, h);
    if src.is_empty() || w == 0 || h == 0 {
        return out;
    }
    let (sw, sh) = (src.width() as u64, src.height() as u64);
    let row_bytes = w as usize * 4;
    out.as_raw_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = (y as u64 * sh / h as u64) as u32;
            for x in 0..w as usize {
                let sx = (x as u64 * sw / w as u64) as u32;
                row[x * 4..x * 4 + 4].copy_from_slice(&src.get_pixel(sx, sy));
            }
        });
    out
}

/// Center-aligned bilinear resize with clamp-to-edge sampling.
pub fn resize_bilinear(src: &PixelBuffer, w: u32, h: u32) -> PixelBuffer {
    let mut out = PixelBuffer::new(w, h);
    if src.is_empty() || w == 0 || h == 0 {
        return out;
    }
    let fx = src.width() as f32 / w as f32;
    let fy = src.height() as f32 / h as f32;
    let row_bytes = w as usize * 4;
    out.as_raw_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = (y as f32 + 0.5) * fy - 0.5;
            for x in 0..w as usize {
                let sx = (x as f32 + 0.5) * fx - 0.5;
                row[x * 4..x * 4 + 4].copy_from_slice(&sample_bilinear(src, sx, sy));
            }
        });
    out
}

/// Bilinear sample at fractional coords, clamping to the nearest edge so
/// borders don't darken against out-of-range transparent black.
#[inline]
fn sample_bilinear(img: &PixelBuffer, x: f32, y: f32) -> Bgra {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.pixel_clamped(x0, y0);
    let p10 = img.pixel_clamped(x0 + 1, y0);
    let p01 = img.pixel_clamped(x0, y0 + 1);
    let p11 = img.pixel_clamped(x0 + 1, y0 + 1);

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let v = p00[c] as f32 * w00 + p10[c] as f32 * w10 + p01[c] as f32 * w01 + p11[c] as f32 * w11;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Repeated 2× pixel-art steps while both axes still fit inside the target,
/// then a nearest-neighbour pass to land on the exact size.
fn upscale_pixel_art(
    src: &PixelBuffer,
    w: u32,
    h: u32,
    step: fn(&PixelBuffer) -> PixelBuffer,
) -> PixelBuffer {
    let mut cur = src.clone();
    while cur.width() * 2 <= w && cur.height() * 2 <= h {
        cur = step(&cur);
    }
    if cur.dimensions() != (w, h) {
        cur = resize_nearest(&cur, w, h);
    }
    cur
}

/// Neighbourhood around `(x, y)`: (top, left, right, bottom), clamped at edges.
#[inline]
fn neighbours(src: &PixelBuffer, x: i32, y: i32) -> (Bgra, Bgra, Bgra, Bgra) {
    (
        src.pixel_clamped(x, y - 1),
        src.pixel_clamped(x - 1, y),
        src.pixel_clamped(x + 1, y),
        src.pixel_clamped(x, y + 1),
    )
}

/// Generic 2× driver: `rule` maps (P, top, left, right, bottom) to the
/// 2×2 output block `[top-left, top-right, bottom-left, bottom-right]`.
fn double_with(src: &PixelBuffer, rule: fn(Bgra, Bgra, Bgra, Bgra, Bgra) -> [Bgra; 4]) -> PixelBuffer {
    let (w, h) = src.dimensions();
    let mut out = PixelBuffer::new(w * 2, h * 2);
    let out_row = w as usize * 2 * 4;
    out.as_raw_mut()
        .par_chunks_mut(out_row * 2)
        .enumerate()
        .for_each(|(y, rows)| {
            let (upper, lower) = rows.split_at_mut(out_row);
            for x in 0..w as usize {
                let p = src.get_pixel(x as u32, y as u32);
                let (t, l, r, b) = neighbours(src, x as i32, y as i32);
                let [e0, e1, e2, e3] = rule(p, t, l, r, b);
                let o = x * 8;
                upper[o..o + 4].copy_from_slice(&e0);
                upper[o + 4..o + 8].copy_from_slice(&e1);
                lower[o..o + 4].copy_from_slice(&e2);
                lower[o + 4..o + 8].copy_from_slice(&e3);
            }
        });
    out
}

/// Scale2x: a corner takes a neighbour's colour only when the two edges
/// meeting there agree and the opposite edges don't.
pub fn scale2x(src: &PixelBuffer) -> PixelBuffer {
    double_with(src, |p, t, l, r, b| {
        let e0 = if t == l && t != r && l != b { t } else { p };
        let e1 = if t == r && t != l && r != b { r } else { p };
        let e2 = if l == b && l != t && b != r { l } else { p };
        let e3 = if r == b && r != t && b != l { r } else { p };
        [e0, e1, e2, e3]
    })
}

/// EPX: same corner test without the opposite-edge guard, but a pixel whose
/// neighbourhood has three or more identical edges is copied unchanged.
pub fn epx(src: &PixelBuffer) -> PixelBuffer {
    double_with(src, |p, t, l, r, b| {
        let edges = [t, l, r, b];
        let crowded = edges
            .iter()
            .any(|e| edges.iter().filter(|o| *o == e).count() >= 3);
        if crowded {
            return [p; 4];
        }
        [
            if l == t { t } else { p },
            if t == r { r } else { p },
            if b == l { l } else { p },
            if r == b { b } else { p },
        ]
    })
}

// ---------------------------------------------------------------------------
//  Rotation
// ---------------------------------------------------------------------------

/// Bounding box of a `w × h` buffer rotated by `angle_deg`.
pub fn rotated_size(w: u32, h: u32, angle_deg: f32) -> (u32, u32) {
    let rad = (angle_deg as f64).to_radians();
    let (s, c) = (rad.sin().abs(), rad.cos().abs());
    let nw = (w as f64 * c + h as f64 * s - 1e-4).ceil().max(1.0);
    let nh = (w as f64 * s + h as f64 * c - 1e-4).ceil().max(1.0);
    (nw as u32, nh as u32)
}

/// Rotate about the buffer's own center (positive = clockwise on screen).
/// The result grows to the rotated bounding box; uncovered pixels are
/// transparent. Multiples of 90° are remapped losslessly.
pub fn rotate_buffer(src: &PixelBuffer, angle_deg: f32, mode: RotationMode) -> PixelBuffer {
    if src.is_empty() {
        return src.clone();
    }
    let norm = angle_deg.rem_euclid(360.0);
    let quarter = (norm / 90.0).round();
    if (norm - quarter * 90.0).abs() < 1e-3 {
        return rotate_quarter(src, quarter as u32 % 4);
    }
    match mode {
        RotationMode::Nearest => rotate_sampled(src, angle_deg, src, 1),
        RotationMode::RotSpriteApprox => {
            let (w, h) = src.dimensions();
            if w as u64 * h as u64 * 64 > ROTSPRITE_MAX_PIXELS {
                log_warn!("RotSprite: {}x{} too large for 8x upscale, using nearest", w, h);
                return rotate_sampled(src, angle_deg, src, 1);
            }
            let big = scale2x(&scale2x(&scale2x(src)));
            rotate_sampled(src, angle_deg, &big, 8)
        }
    }
}

fn rotate_quarter(src: &PixelBuffer, turns: u32) -> PixelBuffer {
    let (w, h) = src.dimensions();
    if turns == 0 {
        return src.clone();
    }
    let (ow, oh) = if turns % 2 == 1 { (h, w) } else { (w, h) };
    let mut out = PixelBuffer::new(ow, oh);
    for y in 0..oh {
        for x in 0..ow {
            let (sx, sy) = match turns {
                1 => (y, h - 1 - x),
                2 => (w - 1 - x, h - 1 - y),
                _ => (w - 1 - y, x),
            };
            out.put_pixel(x, y, src.get_pixel(sx, sy));
        }
    }
    out
}

/// Inverse-map each output pixel center into `src` space and sample
/// `sampler` (which is `src` upscaled by `factor`) with nearest lookup.
fn rotate_sampled(src: &PixelBuffer, angle_deg: f32, sampler: &PixelBuffer, factor: u32) -> PixelBuffer {
    let (w, h) = src.dimensions();
    let (ow, oh) = rotated_size(w, h, angle_deg);
    let rad = (angle_deg as f64).to_radians();
    let (sin, cos) = rad.sin_cos();
    let (scx, scy) = (w as f64 / 2.0, h as f64 / 2.0);
    let (ocx, ocy) = (ow as f64 / 2.0, oh as f64 / 2.0);
    let f = factor as f64;

    let mut out = PixelBuffer::new(ow, oh);
    out.as_raw_mut()
        .par_chunks_mut(ow as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let ry = y as f64 + 0.5 - ocy;
            for x in 0..ow as usize {
                let rx = x as f64 + 0.5 - ocx;
                let sx = rx * cos + ry * sin + scx;
                let sy = -rx * sin + ry * cos + scy;
                if sx < 0.0 || sy < 0.0 || sx >= w as f64 || sy >= h as f64 {
                    continue;
                }
                let px = sampler
                    .pixel_checked((sx * f).floor() as i32, (sy * f).floor() as i32)
                    .unwrap_or(TRANSPARENT);
                row[x * 4..x * 4 + 4].copy_from_slice(&px);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                buf.put_pixel(x, y, [v, v, v, 255]);
            }
        }
        buf
    }

    #[test]
    fn unknown_names_fall_back_to_nearest() {
        assert_eq!(ScaleFilter::from_name("lanczos"), ScaleFilter::Nearest);
        assert_eq!(ScaleFilter::from_name("EPX"), ScaleFilter::Epx);
        assert_eq!(RotationMode::from_name("bogus"), RotationMode::Nearest);
        assert_eq!(RotationMode::from_name("rotsprite"), RotationMode::RotSpriteApprox);
    }

    #[test]
    fn nearest_doubles_pixels() {
        let src = checker(2, 2);
        let out = resize_nearest(&src, 4, 4);
        assert_eq!(out.get_pixel(0, 0), src.get_pixel(0, 0));
        assert_eq!(out.get_pixel(1, 1), src.get_pixel(0, 0));
        assert_eq!(out.get_pixel(2, 0), src.get_pixel(1, 0));
        assert_eq!(out.get_pixel(3, 3), src.get_pixel(1, 1));
    }

    #[test]
    fn bilinear_keeps_flat_color() {
        let src = PixelBuffer::new_filled(3, 3, [10, 20, 30, 200]);
        let out = resize_bilinear(&src, 7, 5);
        assert_eq!(out.dimensions(), (7, 5));
        assert!(out.as_raw().chunks_exact(4).all(|p| p == [10, 20, 30, 200]));
    }

    #[test]
    fn scale2x_rounds_a_diagonal_corner() {
        // X .
        // X X   top-left of (1,0) should stay, bottom-left corner of (1,0) picks up X
        let x = [0, 0, 0, 255];
        let mut src = PixelBuffer::new(2, 2);
        src.put_pixel(0, 0, x);
        src.put_pixel(0, 1, x);
        src.put_pixel(1, 1, x);
        let out = scale2x(&src);
        assert_eq!(out.dimensions(), (4, 4));
        // Block of (1,0): left=X, bottom=X, top clamps to self, right clamps to self.
        assert_eq!(out.get_pixel(2, 1), x);
        assert_eq!(out.get_pixel(3, 0), TRANSPARENT);
    }

    #[test]
    fn epx_copies_crowded_pixels() {
        let src = PixelBuffer::new_filled(3, 3, [5, 5, 5, 255]);
        let out = epx(&src);
        assert!(out.as_raw().chunks_exact(4).all(|p| p == [5, 5, 5, 255]));
    }

    #[test]
    fn pixel_art_filters_hit_exact_size() {
        let src = checker(5, 3);
        for filter in [ScaleFilter::Epx, ScaleFilter::Scale2x] {
            assert_eq!(scale_buffer(&src, 15, 9, filter).dimensions(), (15, 9));
            assert_eq!(scale_buffer(&src, 20, 12, filter).dimensions(), (20, 12));
            assert_eq!(scale_buffer(&src, 2, 1, filter).dimensions(), (2, 1));
        }
    }

    #[test]
    fn scale_clamps_to_one_pixel() {
        let out = scale_buffer(&checker(4, 4), 0, 0, ScaleFilter::Bilinear);
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn quarter_turn_is_lossless() {
        let mut src = PixelBuffer::new(3, 2);
        src.put_pixel(0, 0, [1, 2, 3, 255]);
        let cw = rotate_buffer(&src, 90.0, RotationMode::Nearest);
        assert_eq!(cw.dimensions(), (2, 3));
        assert_eq!(cw.get_pixel(1, 0), [1, 2, 3, 255]);
        let back = rotate_buffer(&cw, -90.0, RotationMode::RotSpriteApprox);
        assert_eq!(back, src);
        let half = rotate_buffer(&src, 180.0, RotationMode::Nearest);
        assert_eq!(half.get_pixel(2, 1), [1, 2, 3, 255]);
    }

    #[test]
    fn arbitrary_rotation_grows_bounds() {
        assert_eq!(rotated_size(10, 10, 45.0), (15, 15));
        assert_eq!(rotated_size(10, 4, 0.0), (10, 4));
        let src = PixelBuffer::new_filled(10, 10, [0, 0, 255, 255]);
        for mode in [RotationMode::Nearest, RotationMode::RotSpriteApprox] {
            let out = rotate_buffer(&src, 45.0, mode);
            assert_eq!(out.dimensions(), (15, 15));
            assert_eq!(out.get_pixel(7, 7), [0, 0, 255, 255]);
            assert_eq!(out.get_pixel(0, 0), TRANSPARENT);
        }
    }
}
