// ============================================================================
// COMPOSITOR: straight-alpha source-over blending
// ============================================================================

use rayon::prelude::*;

use crate::canvas::{Bgra, Layer, PixRect, PixelBuffer};

/// Porter-Duff source-over on straight-alpha BGRA pixels, integer arithmetic.
///
/// `srcA == 0` leaves `dst` untouched and `srcA == 255` copies `src` exactly.
/// Otherwise:
/// `outA = srcA + dstA*(255-srcA)/255`,
/// `outC = (srcC*srcA + dstC*dstA*(255-srcA)/255) / outA`.
#[inline]
pub fn blend_pixel(dst: Bgra, src: Bgra) -> Bgra {
    let sa = src[3] as u32;
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let da = dst[3] as u32;
    let inv = 255 - sa;
    let out_a = sa + da * inv / 255;
    if out_a == 0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let sc = src[c] as u32;
        let dc = dst[c] as u32;
        // Flooring in out_a can push the quotient past 255 for tiny alphas.
        out[c] = ((sc * sa + dc * da * inv / 255) / out_a).min(255) as u8;
    }
    out[3] = out_a as u8;
    out
}

/// In-place variant over 4-byte slices.
#[inline]
pub fn blend(dst: &mut [u8], src: &[u8]) {
    let out = blend_pixel([dst[0], dst[1], dst[2], dst[3]], [src[0], src[1], src[2], src[3]]);
    dst[..4].copy_from_slice(&out);
}

/// Blend `src` onto `dst` with its top-left at `(x, y)`, clipped to `dst`.
/// Returns the touched area (empty when nothing overlapped).
pub fn blit(dst: &mut PixelBuffer, src: &PixelBuffer, x: i32, y: i32) -> PixRect {
    let target = PixRect::new(x, y, src.width(), src.height());
    let clip = target.intersect(&dst.bounds());
    if clip.is_empty() {
        return PixRect::EMPTY;
    }
    let dst_w = dst.width() as usize;
    let src_w = src.width() as usize;
    let src_raw = src.as_raw();
    let rows = dst.as_raw_mut().par_chunks_mut(dst_w * 4);
    rows.enumerate()
        .skip(clip.y as usize)
        .take(clip.h as usize)
        .for_each(|(dy, row)| {
            let sy = (dy as i32 - y) as usize;
            for dx in clip.x..clip.right() {
                let sx = (dx - x) as usize;
                let s = (sy * src_w + sx) * 4;
                let d = dx as usize * 4;
                blend(&mut row[d..d + 4], &src_raw[s..s + 4]);
            }
        });
    clip
}

/// Flatten visible layers bottom-to-top onto a transparent surface.
/// Layers whose size disagrees with the document are skipped.
pub fn composite_layers(layers: &[Layer], width: u32, height: u32) -> PixelBuffer {
    let mut out = PixelBuffer::new(width, height);
    for layer in layers.iter().filter(|l| l.visible) {
        if layer.pixels.dimensions() != (width, height) {
            continue;
        }
        blit(&mut out, &layer.pixels, 0, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_source_copies_exactly() {
        for dst in [[0, 0, 0, 0], [10, 20, 30, 128], [255, 255, 255, 255]] {
            assert_eq!(blend_pixel(dst, [1, 2, 3, 255]), [1, 2, 3, 255]);
        }
    }

    #[test]
    fn transparent_source_is_noop() {
        for dst in [[0, 0, 0, 0], [10, 20, 30, 128], [255, 0, 7, 255]] {
            assert_eq!(blend_pixel(dst, [99, 99, 99, 0]), dst);
        }
    }

    #[test]
    fn half_alpha_over_opaque() {
        // outA = 128 + 255*127/255 = 255
        // outC = (200*128 + 0*255*127/255) / 255 = 25600/255 = 100
        assert_eq!(blend_pixel([0, 0, 0, 255], [200, 100, 50, 128]), [100, 50, 25, 255]);
    }

    #[test]
    fn half_alpha_over_transparent_keeps_color() {
        // outA = 128; outC = src*128/128 = src
        assert_eq!(blend_pixel([0, 0, 0, 0], [200, 100, 50, 128]), [200, 100, 50, 128]);
    }

    #[test]
    fn half_alpha_over_half_alpha() {
        // inv = 155; outA = 100 + 100*155/255 = 100 + 60 = 160
        // B: (40*100 + 200*100*155/255) / 160 = (4000 + 12156) / 160 = 100
        // G: (80*100 + 0) / 160 = 50
        // R: (120*100 + 100*100*155/255) / 160 = (12000 + 6078) / 160 = 112
        assert_eq!(blend_pixel([200, 0, 100, 100], [40, 80, 120, 100]), [100, 50, 112, 160]);
    }

    #[test]
    fn tiny_alphas_saturate_instead_of_wrapping() {
        // outA = 1 + 1*254/255 = 1; B: (255*1 + 255*1*254/255) / 1 = 509 -> 255
        assert_eq!(blend_pixel([255, 0, 0, 1], [255, 0, 0, 1]), [255, 0, 0, 1]);
    }

    #[test]
    fn slice_blend_matches_pixel_blend() {
        let mut dst = [10u8, 20, 30, 40];
        blend(&mut dst, &[50, 60, 70, 80]);
        assert_eq!(dst, blend_pixel([10, 20, 30, 40], [50, 60, 70, 80]));
    }

    #[test]
    fn blit_clips_and_reports_area() {
        let mut dst = PixelBuffer::new_filled(4, 4, [0, 0, 0, 255]);
        let src = PixelBuffer::new_filled(3, 3, [9, 8, 7, 255]);
        let touched = blit(&mut dst, &src, 2, -1);
        assert_eq!(touched, PixRect::new(2, 0, 2, 2));
        assert_eq!(dst.get_pixel(2, 0), [9, 8, 7, 255]);
        assert_eq!(dst.get_pixel(3, 1), [9, 8, 7, 255]);
        assert_eq!(dst.get_pixel(1, 0), [0, 0, 0, 255]);
        assert_eq!(dst.get_pixel(2, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn blit_entirely_outside_is_noop() {
        let mut dst = PixelBuffer::new(4, 4);
        let before = dst.clone();
        assert!(blit(&mut dst, &PixelBuffer::new_filled(2, 2, [1, 1, 1, 255]), 10, 10).is_empty());
        assert_eq!(dst, before);
    }

    #[test]
    fn composite_skips_hidden_layers() {
        let mut bottom = Layer::new("a".into(), 2, 2, [0, 0, 255, 255]);
        let mut top = Layer::new("b".into(), 2, 2, [255, 0, 0, 255]);
        top.visible = false;
        let out = composite_layers(&[bottom.clone(), top.clone()], 2, 2);
        assert_eq!(out.get_pixel(0, 0), [0, 0, 255, 255]);
        top.visible = true;
        bottom.visible = false;
        let out = composite_layers(&[bottom, top], 2, 2);
        assert_eq!(out.get_pixel(1, 1), [255, 0, 0, 255]);
    }
}
