use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::selection::Region;

/// One BGRA8 pixel, straight (non-premultiplied) alpha.
pub type Bgra = [u8; 4];

pub const TRANSPARENT: Bgra = [0, 0, 0, 0];

// ============================================================================
// PIXEL RECT – integer, half-open document rectangle
// ============================================================================

/// Integer rectangle covering `[x, x + w) × [y, y + h)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl PixRect {
    pub const EMPTY: PixRect = PixRect { x: 0, y: 0, w: 0, h: 0 };

    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from two corner points in any order (max corner exclusive).
    pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let (min_x, max_x) = (x0.min(x1), x0.max(x1));
        let (min_y, max_y) = (y0.min(y1), y0.max(y1));
        Self {
            x: min_x,
            y: min_y,
            w: (max_x - min_x) as u32,
            h: (max_y - min_y) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..*self }
    }

    /// Smallest rect covering both. Empty rects are ignored.
    pub fn union(&self, other: &PixRect) -> PixRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        PixRect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn intersect(&self, other: &PixRect) -> PixRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            PixRect::EMPTY
        } else {
            PixRect::from_corners(x0, y0, x1, y1)
        }
    }

    /// Float rect for the renderer / hit-testing.
    pub fn to_egui(&self) -> egui::Rect {
        egui::Rect::from_min_max(
            egui::pos2(self.x as f32, self.y as f32),
            egui::pos2(self.right() as f32, self.bottom() as f32),
        )
    }
}

// ============================================================================
// PIXEL BUFFER – flat BGRA8 storage
// ============================================================================

/// Row-major BGRA8 pixel buffer, 4 bytes per pixel, straight alpha.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PixelBuffer({}x{})", self.width, self.height)
    }
}

impl PixelBuffer {
    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn new_filled(width: u32, height: u32, color: Bgra) -> Self {
        let mut buf = Self::new(width, height);
        buf.fill(color);
        buf
    }

    /// Wrap raw BGRA bytes. Returns `None` when the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self { width, height, data })
    }

    /// Swizzle an RGBA image into BGRA storage.
    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let mut data = img.as_raw().clone();
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        Self { width: img.width(), height: img.height(), data }
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for (dst, src) in img.pixels_mut().zip(self.data.chunks_exact(4)) {
            *dst = Rgba([src[2], src[1], src[0], src[3]]);
        }
        img
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Panics when out of bounds, like `ImageBuffer::get_pixel`.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> Bgra {
        let o = self.offset(x, y);
        [self.data[o], self.data[o + 1], self.data[o + 2], self.data[o + 3]]
    }

    /// Bounds-checked read with signed coordinates.
    #[inline]
    pub fn pixel_checked(&self, x: i32, y: i32) -> Option<Bgra> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(self.get_pixel(x as u32, y as u32))
    }

    /// Read with clamp-to-edge for out-of-range coordinates.
    #[inline]
    pub fn pixel_clamped(&self, x: i32, y: i32) -> Bgra {
        let cx = x.clamp(0, self.width as i32 - 1) as u32;
        let cy = y.clamp(0, self.height as i32 - 1) as u32;
        self.get_pixel(cx, cy)
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, px: Bgra) {
        let o = self.offset(x, y);
        self.data[o..o + 4].copy_from_slice(&px);
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 4;
        &self.data[y as usize * stride..(y as usize + 1) * stride]
    }

    pub fn fill(&mut self, color: Bgra) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn bounds(&self) -> PixRect {
        PixRect::new(0, 0, self.width, self.height)
    }

    /// Copy a region out. Parts of `rect` outside the buffer read as transparent.
    pub fn extract_region(&self, rect: PixRect) -> PixelBuffer {
        let mut out = PixelBuffer::new(rect.w, rect.h);
        let clip = rect.intersect(&self.bounds());
        if clip.is_empty() {
            return out;
        }
        let row_bytes = clip.w as usize * 4;
        for y in clip.y..clip.bottom() {
            let src = self.offset(clip.x as u32, y as u32);
            let dst = out.offset((clip.x - rect.x) as u32, (y - rect.y) as u32);
            out.data[dst..dst + row_bytes].copy_from_slice(&self.data[src..src + row_bytes]);
        }
        out
    }

    /// Overwrite pixels at `(x, y)` with `src` (no blending), clipped to bounds.
    pub fn write_region(&mut self, x: i32, y: i32, src: &PixelBuffer) {
        let target = PixRect::new(x, y, src.width, src.height);
        let clip = target.intersect(&self.bounds());
        if clip.is_empty() {
            return;
        }
        let row_bytes = clip.w as usize * 4;
        for yy in clip.y..clip.bottom() {
            let s = src.offset((clip.x - x) as u32, (yy - y) as u32);
            let d = self.offset(clip.x as u32, yy as u32);
            self.data[d..d + row_bytes].copy_from_slice(&src.data[s..s + row_bytes]);
        }
    }

    pub fn flip_horizontal(&mut self) {
        let w = self.width as usize;
        for y in 0..self.height as usize {
            let row = &mut self.data[y * w * 4..(y + 1) * w * 4];
            for x in 0..w / 2 {
                let (a, b) = (x * 4, (w - 1 - x) * 4);
                for c in 0..4 {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    pub fn flip_vertical(&mut self) {
        let stride = self.width as usize * 4;
        let h = self.height as usize;
        for y in 0..h / 2 {
            let (top, bottom) = self.data.split_at_mut((h - 1 - y) * stride);
            top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }
}

// ============================================================================
// LAYER + DOCUMENT STATE
// ============================================================================

#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub pixels: PixelBuffer,
}

impl Layer {
    pub fn new(name: String, width: u32, height: u32, fill_color: Bgra) -> Self {
        Self {
            name,
            visible: true,
            pixels: PixelBuffer::new_filled(width, height, fill_color),
        }
    }
}

/// The editable document: layers plus the active selection region.
pub struct CanvasState {
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
    pub width: u32,
    pub height: u32,
    /// Selection mask over document coordinates.
    pub selection: Region,
    /// Accumulated area needing a repaint since the renderer last looked.
    pub dirty_rect: Option<PixRect>,
    /// Monotonically increasing counter, bumped on each mark_dirty call
    pub dirty_generation: u64,
}

impl CanvasState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layers: vec![Layer::new("Background".to_string(), width, height, TRANSPARENT)],
            active_layer_index: 0,
            width,
            height,
            selection: Region::new(width, height),
            dirty_rect: None,
            dirty_generation: 0,
        }
    }

    /// Single-layer document wrapping existing pixels.
    pub fn from_pixels(pixels: PixelBuffer) -> Self {
        let (w, h) = pixels.dimensions();
        let mut state = Self::new(w, h);
        state.layers[0].pixels = pixels;
        state
    }

    pub fn bounds(&self) -> PixRect {
        PixRect::new(0, 0, self.width, self.height)
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer_index)
    }

    /// Record an area as needing a repaint (`None` = whole document).
    pub fn mark_dirty(&mut self, rect: Option<PixRect>) {
        let rect = rect.unwrap_or_else(|| self.bounds());
        self.dirty_rect = Some(match self.dirty_rect {
            Some(prev) => prev.union(&rect),
            None => rect,
        });
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    /// Hand the accumulated dirty area to the renderer and reset it.
    pub fn take_dirty(&mut self) -> Option<PixRect> {
        self.dirty_rect.take()
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    /// Flatten visible layers into one buffer.
    pub fn composite(&self) -> PixelBuffer {
        crate::ops::compositor::composite_layers(&self.layers, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_from_corners_normalises_order() {
        let r = PixRect::from_corners(30, 5, 10, 25);
        assert_eq!(r, PixRect::new(10, 5, 20, 20));
        assert_eq!(r.right(), 30);
        assert!(r.contains(10, 5));
        assert!(!r.contains(30, 5));
    }

    #[test]
    fn rect_intersect_and_union() {
        let a = PixRect::new(0, 0, 10, 10);
        let b = PixRect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), PixRect::new(5, 5, 5, 5));
        assert_eq!(a.union(&b), PixRect::new(0, 0, 15, 15));
        assert!(a.intersect(&PixRect::new(20, 20, 2, 2)).is_empty());
        assert_eq!(PixRect::EMPTY.union(&b), b);
    }

    #[test]
    fn rgba_roundtrip_swizzles_channels() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 40]));
        let buf = PixelBuffer::from_rgba_image(&img);
        assert_eq!(buf.get_pixel(0, 0), [30, 20, 10, 40]);
        assert_eq!(buf.to_rgba_image(), img);
    }

    #[test]
    fn extract_region_pads_outside_with_transparent() {
        let buf = PixelBuffer::new_filled(4, 4, [1, 2, 3, 255]);
        let part = buf.extract_region(PixRect::new(2, 2, 4, 4));
        assert_eq!(part.dimensions(), (4, 4));
        assert_eq!(part.get_pixel(0, 0), [1, 2, 3, 255]);
        assert_eq!(part.get_pixel(3, 3), TRANSPARENT);
    }

    #[test]
    fn write_region_clips() {
        let mut buf = PixelBuffer::new(4, 4);
        let src = PixelBuffer::new_filled(3, 3, [9, 9, 9, 9]);
        buf.write_region(-1, 2, &src);
        assert_eq!(buf.get_pixel(0, 2), [9, 9, 9, 9]);
        assert_eq!(buf.get_pixel(1, 3), [9, 9, 9, 9]);
        assert_eq!(buf.get_pixel(2, 2), TRANSPARENT);
        assert_eq!(buf.get_pixel(0, 1), TRANSPARENT);
    }

    #[test]
    fn flips_mirror_pixels() {
        let mut buf = PixelBuffer::new(3, 2);
        buf.put_pixel(0, 0, [1, 1, 1, 1]);
        buf.flip_horizontal();
        assert_eq!(buf.get_pixel(2, 0), [1, 1, 1, 1]);
        buf.flip_vertical();
        assert_eq!(buf.get_pixel(2, 1), [1, 1, 1, 1]);
        assert_eq!(buf.get_pixel(2, 0), TRANSPARENT);
    }

    #[test]
    fn mark_dirty_accumulates() {
        let mut state = CanvasState::new(32, 32);
        state.mark_dirty(Some(PixRect::new(0, 0, 4, 4)));
        state.mark_dirty(Some(PixRect::new(10, 10, 2, 2)));
        assert_eq!(state.take_dirty(), Some(PixRect::new(0, 0, 12, 12)));
        assert_eq!(state.take_dirty(), None);
    }
}
