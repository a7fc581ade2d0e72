// ============================================================================
// TRANSFORM STATE: live parameters of a floating selection
// ============================================================================
//
// The buffer sits at (float_x, float_y). Pending scale and rotation are kept
// as parameters until `bake()` rasterises them; the center recorded at the
// last bake (or moved since) is the anchor both operations pivot around.

use egui::{Pos2, Rect, pos2};

use crate::canvas::{PixRect, PixelBuffer, TRANSPARENT};
use crate::ops::resample::{self, RotationMode, ScaleFilter};
use crate::selection::Region;

const SCALE_EPSILON: f32 = 1e-4;
const ROTATION_EPSILON_DEG: f32 = 0.1;

/// Immutable value copy of the transform, captured for history.
///
/// `buffer` and `region` are only filled for operations that rewrite pixel
/// data (scale, rotate, flip, lift, commit); moves and pivot edits leave them
/// out and carry just the region offset.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub float_x: i32,
    pub float_y: i32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub angle_deg: f32,
    pub cumulative_angle_deg: f32,
    pub orig_center_x: i32,
    pub orig_center_y: i32,
    pub pivot_offset_x: f32,
    pub pivot_offset_y: f32,
    pub pivot_custom: bool,
    pub region_offset: (i32, i32),
    pub buffer: Option<PixelBuffer>,
    pub region: Option<Region>,
}

impl Snapshot {
    pub fn has_pixels(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn memory_size(&self) -> usize {
        let buf = self.buffer.as_ref().map_or(0, |b| b.memory_bytes());
        let mask = self
            .region
            .as_ref()
            .map_or(0, |r| r.width() as usize * r.height() as usize);
        buf + mask
    }

    /// Same placement as `other` (ignores pixel payloads).
    pub fn same_placement(&self, other: &Snapshot) -> bool {
        self.float_x == other.float_x
            && self.float_y == other.float_y
            && self.orig_center_x == other.orig_center_x
            && self.orig_center_y == other.orig_center_y
            && self.pivot_offset_x == other.pivot_offset_x
            && self.pivot_offset_y == other.pivot_offset_y
            && self.pivot_custom == other.pivot_custom
    }
}

/// Pivot and center captured when a rotation starts, so the live angle can
/// be re-applied from a fixed origin on every pointer move.
#[derive(Clone, Copy, Debug)]
struct RotateOrigin {
    center: Pos2,
    pivot: Pos2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PreviewKey {
    center: (i32, i32),
    scale: (u32, u32),
    angle: u32,
    doc: (u32, u32),
    generation: u64,
}

#[derive(Clone, Debug)]
pub struct TransformState {
    pub active: bool,
    pub floating: bool,
    buffer: Option<PixelBuffer>,
    /// Bumped whenever `buffer` is replaced or edited.
    generation: u64,

    pub float_x: i32,
    pub float_y: i32,

    pub scale_x: f32,
    pub scale_y: f32,
    pub scale_link: bool,
    pub scale_filter: ScaleFilter,

    pub angle_deg: f32,
    pub cumulative_angle_deg: f32,
    pub rotation_mode: RotationMode,

    pub orig_w: u32,
    pub orig_h: u32,
    pub orig_center_x: i32,
    pub orig_center_y: i32,

    /// Pivot relative to the selection center.
    pub pivot_offset_x: f32,
    pub pivot_offset_y: f32,
    pub pivot_custom: bool,

    pub drag_start_snapshot: Option<Snapshot>,
    rotate_origin: Option<RotateOrigin>,
    cached_preview: Option<(PreviewKey, PixelBuffer)>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new(ScaleFilter::Nearest, RotationMode::Nearest, false)
    }
}

impl TransformState {
    pub fn new(scale_filter: ScaleFilter, rotation_mode: RotationMode, scale_link: bool) -> Self {
        Self {
            active: false,
            floating: false,
            buffer: None,
            generation: 0,
            float_x: 0,
            float_y: 0,
            scale_x: 1.0,
            scale_y: 1.0,
            scale_link,
            scale_filter,
            angle_deg: 0.0,
            cumulative_angle_deg: 0.0,
            rotation_mode,
            orig_w: 0,
            orig_h: 0,
            orig_center_x: 0,
            orig_center_y: 0,
            pivot_offset_x: 0.0,
            pivot_offset_y: 0.0,
            pivot_custom: false,
            drag_start_snapshot: None,
            rotate_origin: None,
            cached_preview: None,
        }
    }

    // ---- buffer ownership ---------------------------------------------------

    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_size(&self) -> (u32, u32) {
        self.buffer.as_ref().map_or((0, 0), |b| b.dimensions())
    }

    /// Start floating `buffer` with its top-left at `(x, y)`.
    pub fn begin_float(&mut self, buffer: PixelBuffer, x: i32, y: i32) {
        self.reset_parameters();
        self.active = true;
        self.floating = true;
        self.float_x = x;
        self.float_y = y;
        self.set_buffer(buffer);
    }

    /// Stop floating and hand back the buffer. Scale, rotation and pivot
    /// return to identity.
    pub fn end_float(&mut self) -> Option<PixelBuffer> {
        self.floating = false;
        self.reset_parameters();
        self.cached_preview = None;
        self.generation += 1;
        self.buffer.take()
    }

    fn set_buffer(&mut self, buffer: PixelBuffer) {
        let (w, h) = buffer.dimensions();
        self.orig_w = w;
        self.orig_h = h;
        self.orig_center_x = self.float_x + (w / 2) as i32;
        self.orig_center_y = self.float_y + (h / 2) as i32;
        self.buffer = Some(buffer);
        self.generation += 1;
        self.cached_preview = None;
    }

    fn reset_parameters(&mut self) {
        self.scale_x = 1.0;
        self.scale_y = 1.0;
        self.angle_deg = 0.0;
        self.cumulative_angle_deg = 0.0;
        self.pivot_offset_x = 0.0;
        self.pivot_offset_y = 0.0;
        self.pivot_custom = false;
        self.drag_start_snapshot = None;
        self.rotate_origin = None;
    }

    // ---- snapshots ------------------------------------------------------------

    pub fn snapshot(&self, region: &Region, with_pixels: bool) -> Snapshot {
        Snapshot {
            float_x: self.float_x,
            float_y: self.float_y,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            angle_deg: self.angle_deg,
            cumulative_angle_deg: self.cumulative_angle_deg,
            orig_center_x: self.orig_center_x,
            orig_center_y: self.orig_center_y,
            pivot_offset_x: self.pivot_offset_x,
            pivot_offset_y: self.pivot_offset_y,
            pivot_custom: self.pivot_custom,
            region_offset: region.offset(),
            buffer: if with_pixels { self.buffer.clone() } else { None },
            region: if with_pixels { Some(region.clone()) } else { None },
        }
    }

    /// Put the floating selection back exactly as captured. Pixel-carrying
    /// snapshots also replace the buffer and the region; placement-only ones
    /// just re-apply the region offset.
    pub fn restore(&mut self, snap: &Snapshot, region: &mut Region) {
        self.active = true;
        self.floating = true;
        self.float_x = snap.float_x;
        self.float_y = snap.float_y;
        if let Some(buffer) = &snap.buffer {
            self.set_buffer(buffer.clone());
        }
        self.scale_x = snap.scale_x;
        self.scale_y = snap.scale_y;
        self.angle_deg = snap.angle_deg;
        self.cumulative_angle_deg = snap.cumulative_angle_deg;
        self.orig_center_x = snap.orig_center_x;
        self.orig_center_y = snap.orig_center_y;
        self.pivot_offset_x = snap.pivot_offset_x;
        self.pivot_offset_y = snap.pivot_offset_y;
        self.pivot_custom = snap.pivot_custom;
        self.rotate_origin = None;
        self.cached_preview = None;
        match &snap.region {
            Some(r) => *region = r.clone(),
            None => region.set_offset(snap.region_offset.0, snap.region_offset.1),
        }
    }

    // ---- geometry ---------------------------------------------------------------

    pub fn center(&self) -> Pos2 {
        pos2(self.orig_center_x as f32, self.orig_center_y as f32)
    }

    /// Rect the floating selection currently occupies, pending scale included
    /// (pending rotation is not reflected).
    pub fn display_rect(&self) -> Rect {
        let w = self.orig_w as f32 * self.scale_x;
        let h = self.orig_h as f32 * self.scale_y;
        if self.has_pending_scale() {
            Rect::from_center_size(self.center(), egui::vec2(w, h))
        } else {
            PixRect::new(self.float_x, self.float_y, self.orig_w, self.orig_h).to_egui()
        }
    }

    pub fn pivot_point(&self) -> Pos2 {
        self.center() + egui::vec2(self.pivot_offset_x, self.pivot_offset_y)
    }

    /// Place the pivot at a document position; it then travels with the selection.
    pub fn set_pivot_point(&mut self, p: Pos2) {
        let c = self.center();
        self.pivot_offset_x = p.x - c.x;
        self.pivot_offset_y = p.y - c.y;
        self.pivot_custom = true;
        self.cached_preview = None;
    }

    pub fn reset_pivot(&mut self) {
        self.pivot_offset_x = 0.0;
        self.pivot_offset_y = 0.0;
        self.pivot_custom = false;
    }

    pub fn has_pending_scale(&self) -> bool {
        (self.scale_x - 1.0).abs() > SCALE_EPSILON || (self.scale_y - 1.0).abs() > SCALE_EPSILON
    }

    pub fn has_pending_rotation(&self) -> bool {
        self.angle_deg.abs() > ROTATION_EPSILON_DEG
    }

    // ---- parameter edits ----------------------------------------------------

    /// Shift the buffer, its anchor center and the region offset together.
    pub fn translate(&mut self, region: &mut Region, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        self.float_x += dx;
        self.float_y += dy;
        self.orig_center_x += dx;
        self.orig_center_y += dy;
        region.translate(dx, dy);
        self.cached_preview = None;
    }

    /// Pending scale around the current anchor center. Factors below one
    /// pixel of output are clamped.
    pub fn set_pending_scale(&mut self, sx: f32, sy: f32) {
        let (sx, sy) = if self.scale_link { (sx, sx) } else { (sx, sy) };
        let min_x = 1.0 / self.orig_w.max(1) as f32;
        let min_y = 1.0 / self.orig_h.max(1) as f32;
        self.scale_x = if sx.is_finite() { sx.max(min_x) } else { 1.0 };
        self.scale_y = if sy.is_finite() { sy.max(min_y) } else { 1.0 };
    }

    /// Move the anchor center without touching the buffer position; scale
    /// drags use this to keep the opposite edge fixed.
    pub fn set_anchor_center(&mut self, cx: i32, cy: i32) {
        self.orig_center_x = cx;
        self.orig_center_y = cy;
    }

    /// Remember the current center and pivot as the origin for `set_pending_angle`.
    pub fn begin_rotate(&mut self) {
        self.rotate_origin = Some(RotateOrigin {
            center: self.center(),
            pivot: self.pivot_point(),
        });
    }

    /// Set the pending angle (degrees, clockwise on screen). With a custom
    /// pivot the center orbits the pivot rigidly; the pivot stays put.
    pub fn set_pending_angle(&mut self, angle_deg: f32) {
        self.angle_deg = angle_deg;
        self.cached_preview = None;
        if !self.pivot_custom {
            return;
        }
        if self.rotate_origin.is_none() {
            self.begin_rotate();
        }
        let Some(origin) = self.rotate_origin else {
            return;
        };
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let d = origin.center - origin.pivot;
        let rotated = egui::vec2(d.x * cos - d.y * sin, d.x * sin + d.y * cos);
        let c = origin.pivot + rotated;
        let (cx, cy) = (c.x.round() as i32, c.y.round() as i32);
        let (dx, dy) = (cx - self.orig_center_x, cy - self.orig_center_y);
        self.orig_center_x = cx;
        self.orig_center_y = cy;
        self.float_x += dx;
        self.float_y += dy;
        self.pivot_offset_x = origin.pivot.x - cx as f32;
        self.pivot_offset_y = origin.pivot.y - cy as f32;
    }

    // ---- bake ---------------------------------------------------------------

    /// Rasterise pending scale and rotation into the buffer, recenter on the
    /// anchor, and rebuild `region` from the buffer's alpha. Returns whether
    /// anything was baked.
    pub fn bake(&mut self, region: &mut Region) -> bool {
        let has_scale = self.has_pending_scale();
        let has_rotation = self.has_pending_rotation();
        self.rotate_origin = None;
        if !has_scale && !has_rotation {
            self.scale_x = 1.0;
            self.scale_y = 1.0;
            self.angle_deg = 0.0;
            return false;
        }
        let Some(mut buf) = self.buffer.take() else {
            return false;
        };
        if buf.is_empty() {
            self.buffer = Some(buf);
            return false;
        }
        let (cx, cy) = (self.orig_center_x, self.orig_center_y);

        if has_scale {
            let tw = ((buf.width() as f32 * self.scale_x).round() as u32).max(1);
            let th = ((buf.height() as f32 * self.scale_y).round() as u32).max(1);
            buf = resample::scale_buffer(&buf, tw, th, self.scale_filter);
            log_info!("Bake: scaled floating buffer to {}x{} ({})", tw, th, self.scale_filter.name());
        }
        self.scale_x = 1.0;
        self.scale_y = 1.0;

        if has_rotation {
            buf = resample::rotate_buffer(&buf, self.angle_deg, self.rotation_mode);
            self.cumulative_angle_deg = (self.cumulative_angle_deg + self.angle_deg).rem_euclid(360.0);
            log_info!("Bake: rotated floating buffer by {:.1} deg ({})", self.angle_deg, self.rotation_mode.name());
        }
        self.angle_deg = 0.0;

        let (w, h) = buf.dimensions();
        self.float_x = cx - (w / 2) as i32;
        self.float_y = cy - (h / 2) as i32;
        self.set_buffer(buf);
        self.orig_center_x = cx;
        self.orig_center_y = cy;
        self.rebuild_region(region);
        true
    }

    /// Mirror the buffer in place; the region follows the new alpha.
    pub fn flip(&mut self, region: &mut Region, horizontal: bool) -> bool {
        let Some(mut buf) = self.buffer.take() else {
            return false;
        };
        if horizontal {
            buf.flip_horizontal();
        } else {
            buf.flip_vertical();
        }
        let (cx, cy) = (self.orig_center_x, self.orig_center_y);
        self.set_buffer(buf);
        self.orig_center_x = cx;
        self.orig_center_y = cy;
        self.rebuild_region(region);
        true
    }

    fn rebuild_region(&self, region: &mut Region) {
        if let Some(buf) = &self.buffer {
            *region = Region::from_alpha(region.width(), region.height(), buf, self.float_x, self.float_y);
        }
    }

    // ---- preview ----------------------------------------------------------------

    /// Document-sized image of the buffer with pending scale and rotation
    /// applied (nearest sampling). Cached until the transform changes.
    pub fn render_preview(&mut self, doc_w: u32, doc_h: u32) -> Option<&PixelBuffer> {
        if !self.floating || self.buffer.is_none() {
            return None;
        }
        let key = PreviewKey {
            center: (self.orig_center_x, self.orig_center_y),
            scale: (self.scale_x.to_bits(), self.scale_y.to_bits()),
            angle: self.angle_deg.to_bits(),
            doc: (doc_w, doc_h),
            generation: self.generation,
        };
        let fresh = matches!(&self.cached_preview, Some((k, _)) if *k == key);
        if !fresh {
            let img = self.rasterise_preview(doc_w, doc_h)?;
            self.cached_preview = Some((key, img));
        }
        self.cached_preview.as_ref().map(|(_, img)| img)
    }

    fn rasterise_preview(&self, doc_w: u32, doc_h: u32) -> Option<PixelBuffer> {
        let buf = self.buffer.as_ref()?;
        let mut out = PixelBuffer::new(doc_w, doc_h);
        if !self.has_pending_scale() && !self.has_pending_rotation() {
            out.write_region(self.float_x, self.float_y, buf);
            return Some(out);
        }

        let (bw, bh) = (buf.width() as f32, buf.height() as f32);
        let (sx, sy) = (self.scale_x, self.scale_y);
        let (sin, cos) = self.angle_deg.to_radians().sin_cos();
        // Buffer center in document space (integer division matches bake).
        let cx = self.orig_center_x as f32 + (bw - (buf.width() / 2 * 2) as f32) / 2.0;
        let cy = self.orig_center_y as f32 + (bh - (buf.height() / 2 * 2) as f32) / 2.0;

        // Screen-space extent of the transformed quad, to bound the scan.
        let hw = bw * sx / 2.0;
        let hh = bh * sy / 2.0;
        let ex = (hw * cos).abs() + (hh * sin).abs();
        let ey = (hw * sin).abs() + (hh * cos).abs();
        let scan = PixRect::from_corners(
            (cx - ex).floor() as i32,
            (cy - ey).floor() as i32,
            (cx + ex).ceil() as i32,
            (cy + ey).ceil() as i32,
        )
        .intersect(&out.bounds());

        for y in scan.y..scan.bottom() {
            for x in scan.x..scan.right() {
                let rx = x as f32 + 0.5 - cx;
                let ry = y as f32 + 0.5 - cy;
                let lx = (rx * cos + ry * sin) / sx + bw / 2.0;
                let ly = (-rx * sin + ry * cos) / sy + bh / 2.0;
                if lx < 0.0 || ly < 0.0 || lx >= bw || ly >= bh {
                    continue;
                }
                let px = buf.pixel_checked(lx as i32, ly as i32).unwrap_or(TRANSPARENT);
                out.put_pixel(x as u32, y as u32, px);
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionShape;

    fn floating(x: i32, y: i32, w: u32, h: u32) -> (TransformState, Region) {
        let mut t = TransformState::default();
        t.begin_float(PixelBuffer::new_filled(w, h, [10, 20, 30, 255]), x, y);
        let region = Region::from_shape(100, 100, &SelectionShape::Rectangle(PixRect::new(x, y, w, h)));
        (t, region)
    }

    #[test]
    fn scale_bake_keeps_center() {
        let (mut t, mut region) = floating(10, 10, 20, 20);
        t.set_pending_scale(2.0, 2.0);
        assert!(t.bake(&mut region));
        assert_eq!(t.buffer_size(), (40, 40));
        assert_eq!((t.float_x, t.float_y), (0, 0));
        assert_eq!((t.scale_x, t.scale_y), (1.0, 1.0));
        assert_eq!(region.bounds(), PixRect::new(0, 0, 40, 40));
    }

    #[test]
    fn bake_without_pending_changes_is_noop() {
        let (mut t, mut region) = floating(5, 5, 4, 4);
        let before = region.clone();
        assert!(!t.bake(&mut region));
        assert_eq!(region, before);
    }

    #[test]
    fn scale_link_forces_uniform_factor() {
        let (mut t, _) = floating(0, 0, 10, 10);
        t.scale_link = true;
        t.set_pending_scale(3.0, 0.5);
        assert_eq!((t.scale_x, t.scale_y), (3.0, 3.0));
    }

    #[test]
    fn rotation_accumulates_after_bake() {
        let (mut t, mut region) = floating(0, 0, 10, 4);
        t.set_pending_angle(90.0);
        assert!(t.bake(&mut region));
        assert_eq!(t.buffer_size(), (4, 10));
        assert_eq!(t.cumulative_angle_deg, 90.0);
        assert_eq!(t.angle_deg, 0.0);
        // Center (5, 2) is kept.
        assert_eq!((t.float_x, t.float_y), (3, -3));
    }

    #[test]
    fn custom_pivot_orbits_center() {
        // 20x20 at (40,40) is centered on (50,50); pivot at (40,50).
        let (mut t, _) = floating(40, 40, 20, 20);
        t.set_pivot_point(pos2(40.0, 50.0));
        t.begin_rotate();
        t.set_pending_angle(90.0);
        assert_eq!((t.orig_center_x, t.orig_center_y), (40, 60));
        assert_eq!(t.pivot_point(), pos2(40.0, 50.0));
        t.set_pending_angle(-90.0);
        assert_eq!((t.orig_center_x, t.orig_center_y), (40, 40));
        assert_eq!(t.pivot_point(), pos2(40.0, 50.0));
    }

    #[test]
    fn translate_moves_region_offset() {
        let (mut t, mut region) = floating(10, 10, 5, 5);
        t.translate(&mut region, 3, -2);
        assert_eq!((t.float_x, t.float_y), (13, 8));
        assert_eq!(region.rect(), PixRect::new(13, 8, 5, 5));
    }

    #[test]
    fn restore_placement_only_snapshot() {
        let (mut t, mut region) = floating(10, 10, 5, 5);
        let snap = t.snapshot(&region, false);
        assert!(!snap.has_pixels());
        t.translate(&mut region, 7, 7);
        t.restore(&snap, &mut region);
        assert_eq!((t.float_x, t.float_y), (10, 10));
        assert_eq!(region.offset(), (0, 0));
    }

    #[test]
    fn preview_matches_buffer_when_untransformed() {
        let (mut t, _) = floating(2, 3, 2, 2);
        let img = t.render_preview(8, 8).cloned();
        let img = img.unwrap();
        assert_eq!(img.get_pixel(2, 3), [10, 20, 30, 255]);
        assert_eq!(img.get_pixel(4, 3), TRANSPARENT);
    }

    #[test]
    fn preview_shows_pending_scale() {
        let (mut t, _) = floating(4, 4, 2, 2);
        t.set_pending_scale(2.0, 2.0);
        let img = t.render_preview(16, 16).unwrap();
        // Center (5,5); scaled 4x4 covers [3,7).
        assert_eq!(img.get_pixel(3, 3), [10, 20, 30, 255]);
        assert_eq!(img.get_pixel(6, 6), [10, 20, 30, 255]);
        assert_eq!(img.get_pixel(7, 7), TRANSPARENT);
    }

    #[test]
    fn flip_mirrors_buffer() {
        let mut t = TransformState::default();
        let mut buf = PixelBuffer::new(2, 1);
        buf.put_pixel(0, 0, [1, 1, 1, 255]);
        t.begin_float(buf, 0, 0);
        let mut region = Region::new(10, 10);
        assert!(t.flip(&mut region, true));
        assert_eq!(t.buffer().unwrap().get_pixel(1, 0), [1, 1, 1, 255]);
        assert_eq!(region.bounds(), PixRect::new(1, 0, 1, 1));
    }
}
