// ============================================================================
// SELECTION REGION: document-sized mask with tight bounds and float offset
// ============================================================================

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::canvas::{PixRect, PixelBuffer};

/// How a new selection shape interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new shape.
    #[default]
    Replace,
    /// Union – add to the existing mask.
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
    /// Keep only pixels present in both the existing mask AND the new shape.
    Intersect,
}

impl SelectionMode {
    /// Mode locked at marquee start from the held modifiers:
    /// Shift+Alt → Intersect, Shift → Add, Alt → Subtract, else Replace.
    pub fn from_modifiers(shift: bool, alt: bool) -> Self {
        match (shift, alt) {
            (true, true) => SelectionMode::Intersect,
            (true, false) => SelectionMode::Add,
            (false, true) => SelectionMode::Subtract,
            (false, false) => SelectionMode::Replace,
        }
    }
}

/// Outline drawn by a marquee drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarqueeShape {
    #[default]
    Rectangle,
    Ellipse,
}

impl MarqueeShape {
    pub fn name(&self) -> &'static str {
        match self {
            MarqueeShape::Rectangle => "rectangle",
            MarqueeShape::Ellipse => "ellipse",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ellipse" | "oval" => MarqueeShape::Ellipse,
            _ => MarqueeShape::Rectangle,
        }
    }

    /// Shape inscribed in the dragged rectangle.
    pub fn shape_for(&self, rect: PixRect) -> SelectionShape {
        match self {
            MarqueeShape::Rectangle => SelectionShape::Rectangle(rect),
            MarqueeShape::Ellipse => SelectionShape::Ellipse {
                cx: rect.x as f32 + rect.w as f32 / 2.0,
                cy: rect.y as f32 + rect.h as f32 / 2.0,
                rx: rect.w as f32 / 2.0,
                ry: rect.h as f32 / 2.0,
            },
        }
    }
}

/// Shape used during a selection drag.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionShape {
    Rectangle(PixRect),
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl SelectionShape {
    /// Whether the pixel (x, y) is inside the shape (sampled at the pixel center).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        match self {
            SelectionShape::Rectangle(r) => r.contains(x, y),
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return false;
                }
                let dx = (x as f32 + 0.5 - cx) / rx;
                let dy = (y as f32 + 0.5 - cy) / ry;
                dx * dx + dy * dy <= 1.0
            }
        }
    }

    /// Bounding box in pixel coordinates (unclamped).
    pub fn bounds(&self) -> PixRect {
        match self {
            SelectionShape::Rectangle(r) => *r,
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return PixRect::EMPTY;
                }
                PixRect::from_corners(
                    (cx - rx).floor() as i32,
                    (cy - ry).floor() as i32,
                    (cx + rx).ceil() as i32,
                    (cy + ry).ceil() as i32,
                )
            }
        }
    }
}

// ============================================================================
// REGION
// ============================================================================

/// Pixel-accurate selection mask over document coordinates.
///
/// `bounds` is always the tight rectangle of set mask cells (empty when
/// nothing is selected). `offset` shifts the whole mask while the selection
/// is floating away from where it was lifted; `realize_offset` bakes it in.
#[derive(Clone, Debug)]
pub struct Region {
    width: u32,
    height: u32,
    mask: GrayImage,
    bounds: PixRect,
    offset: (i32, i32),
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.offset == other.offset
            && self.mask.as_raw() == other.mask.as_raw()
    }
}

impl Region {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mask: GrayImage::new(width, height),
            bounds: PixRect::EMPTY,
            offset: (0, 0),
        }
    }

    pub fn from_shape(width: u32, height: u32, shape: &SelectionShape) -> Self {
        let mut region = Self::new(width, height);
        region.apply_shape(shape, SelectionMode::Replace);
        region
    }

    /// Rebuild from a raw 0/255 mask. Returns `None` on a size mismatch.
    pub fn from_mask_bytes(width: u32, height: u32, bytes: Vec<u8>) -> Option<Self> {
        let mask = GrayImage::from_raw(width, height, bytes)?;
        let mut region = Self { width, height, mask, bounds: PixRect::EMPTY, offset: (0, 0) };
        region.recompute_bounds();
        Some(region)
    }

    /// Every pixel of `buffer` with alpha > 0 becomes a selected cell at
    /// `(float_x + bx, float_y + by)`. A buffer hanging off the document is
    /// stored on-document and shifted out through the offset, so its cells
    /// survive until the offset is realized.
    pub fn from_alpha(width: u32, height: u32, buffer: &PixelBuffer, float_x: i32, float_y: i32) -> Self {
        let px = keep_on_document(float_x, buffer.width(), width);
        let py = keep_on_document(float_y, buffer.height(), height);
        let mut region = Self::new(width, height);
        region.stamp_alpha(buffer, px, py);
        region.offset = (float_x - px, float_y - py);
        region.recompute_bounds();
        region
    }

    /// Realize the offset, then add the opaque cells of `buffer` placed at
    /// `(x, y)`. Cells outside the document are dropped.
    pub fn add_alpha(&mut self, buffer: &PixelBuffer, x: i32, y: i32) {
        self.realize_offset();
        self.stamp_alpha(buffer, x, y);
        self.recompute_bounds();
    }

    fn stamp_alpha(&mut self, buffer: &PixelBuffer, x0: i32, y0: i32) {
        for by in 0..buffer.height() {
            let y = y0 + by as i32;
            if y < 0 || y >= self.height as i32 {
                continue;
            }
            let row = buffer.row(by);
            for bx in 0..buffer.width() {
                let x = x0 + bx as i32;
                if x < 0 || x >= self.width as i32 {
                    continue;
                }
                if row[bx as usize * 4 + 3] > 0 {
                    self.mask.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Tight bounds of the mask, ignoring the floating offset.
    pub fn bounds(&self) -> PixRect {
        self.bounds
    }

    /// Bounds as currently displayed (mask bounds shifted by the offset).
    pub fn rect(&self) -> PixRect {
        self.bounds.translated(self.offset.0, self.offset.1)
    }

    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    pub fn set_offset(&mut self, dx: i32, dy: i32) {
        self.offset = (dx, dy);
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.offset = (self.offset.0 + dx, self.offset.1 + dy);
    }

    /// Whether the document pixel (x, y) is selected, honouring the offset.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.is_set(x - self.offset.0, y - self.offset.1)
    }

    /// Mask lookup in un-shifted mask coordinates.
    #[inline]
    pub fn is_set(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.mask.get_pixel(x as u32, y as u32).0[0] > 0
    }

    pub fn cell_count(&self) -> usize {
        self.mask.as_raw().iter().filter(|&&v| v > 0).count()
    }

    pub fn clear(&mut self) {
        for p in self.mask.pixels_mut() {
            *p = Luma([0]);
        }
        self.bounds = PixRect::EMPTY;
        self.offset = (0, 0);
    }

    pub fn select_all(&mut self) {
        for p in self.mask.pixels_mut() {
            *p = Luma([255]);
        }
        self.offset = (0, 0);
        self.recompute_bounds();
    }

    /// Complement within the document.
    pub fn invert(&mut self) {
        self.realize_offset();
        for p in self.mask.pixels_mut() {
            p.0[0] = if p.0[0] > 0 { 0 } else { 255 };
        }
        self.recompute_bounds();
    }

    /// Apply a selection shape to the mask according to `mode`.
    pub fn apply_shape(&mut self, shape: &SelectionShape, mode: SelectionMode) {
        self.realize_offset();
        let doc = PixRect::new(0, 0, self.width, self.height);
        let area = shape.bounds().intersect(&doc);

        match mode {
            SelectionMode::Replace => {
                for p in self.mask.pixels_mut() {
                    *p = Luma([0]);
                }
                self.stamp(shape, area, 255);
            }
            SelectionMode::Add => self.stamp(shape, area, 255),
            SelectionMode::Subtract => self.stamp(shape, area, 0),
            SelectionMode::Intersect => {
                let old = std::mem::replace(&mut self.mask, GrayImage::new(self.width, self.height));
                for y in area.y..area.bottom() {
                    for x in area.x..area.right() {
                        if shape.contains(x, y) && old.get_pixel(x as u32, y as u32).0[0] > 0 {
                            self.mask.put_pixel(x as u32, y as u32, Luma([255]));
                        }
                    }
                }
            }
        }
        self.recompute_bounds();
    }

    fn stamp(&mut self, shape: &SelectionShape, area: PixRect, value: u8) {
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if shape.contains(x, y) {
                    self.mask.put_pixel(x as u32, y as u32, Luma([value]));
                }
            }
        }
    }

    /// Shift the mask by its offset and reset the offset to zero.
    /// Cells shifted off the document are clipped.
    pub fn realize_offset(&mut self) {
        let (dx, dy) = self.offset;
        if dx == 0 && dy == 0 {
            return;
        }
        let mut shifted = GrayImage::new(self.width, self.height);
        let b = self.bounds;
        for y in b.y..b.bottom() {
            for x in b.x..b.right() {
                if !self.is_set(x, y) {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                if nx >= 0 && ny >= 0 && nx < self.width as i32 && ny < self.height as i32 {
                    shifted.put_pixel(nx as u32, ny as u32, Luma([255]));
                }
            }
        }
        self.mask = shifted;
        self.offset = (0, 0);
        self.recompute_bounds();
    }

    /// Re-home the mask onto a document of a new size, keeping the cells that
    /// still land inside it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.realize_offset();
        let mut mask = GrayImage::new(width, height);
        let keep = self.bounds.intersect(&PixRect::new(0, 0, width, height));
        for y in keep.y..keep.bottom() {
            for x in keep.x..keep.right() {
                if self.is_set(x, y) {
                    mask.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }
        self.width = width;
        self.height = height;
        self.mask = mask;
        self.recompute_bounds();
    }

    /// Whether the displayed selection fits inside a `width × height` document.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let r = self.rect();
        r.is_empty() || (r.x >= 0 && r.y >= 0 && r.right() <= width as i32 && r.bottom() <= height as i32)
    }

    fn recompute_bounds(&mut self) {
        let (w, h) = (self.width, self.height);
        let raw = self.mask.as_raw();
        let mut min_x = w;
        let mut min_y = h;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        for y in 0..h {
            let row = &raw[y as usize * w as usize..(y as usize + 1) * w as usize];
            for (x, &v) in row.iter().enumerate() {
                if v > 0 {
                    let x = x as u32;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        self.bounds = if min_x > max_x {
            PixRect::EMPTY
        } else {
            PixRect::from_corners(min_x as i32, min_y as i32, max_x as i32 + 1, max_y as i32 + 1)
        };
    }
}

/// Mask position for a span of `len` cells wanted at `pos` on an axis of
/// `extent` cells: as close to `pos` as possible while staying on the axis.
fn keep_on_document(pos: i32, len: u32, extent: u32) -> i32 {
    let slack = extent as i32 - len as i32;
    pos.clamp(slack.min(0), slack.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_region(x: i32, y: i32, w: u32, h: u32) -> Region {
        Region::from_shape(64, 64, &SelectionShape::Rectangle(PixRect::new(x, y, w, h)))
    }

    #[test]
    fn bounds_are_tight() {
        let r = rect_region(4, 6, 10, 3);
        assert_eq!(r.bounds(), PixRect::new(4, 6, 10, 3));
        assert_eq!(r.cell_count(), 30);
    }

    #[test]
    fn empty_region_has_zero_bounds() {
        let r = Region::new(16, 16);
        assert!(r.is_empty());
        assert_eq!(r.bounds(), PixRect::EMPTY);
    }

    #[test]
    fn add_is_union() {
        let a = rect_region(0, 0, 10, 10);
        let mut r = a.clone();
        r.apply_shape(&SelectionShape::Rectangle(PixRect::new(5, 5, 10, 10)), SelectionMode::Add);
        for y in 0..64 {
            for x in 0..64 {
                let expect = PixRect::new(0, 0, 10, 10).contains(x, y) || PixRect::new(5, 5, 10, 10).contains(x, y);
                assert_eq!(r.contains(x, y), expect, "({x},{y})");
            }
        }
        assert_eq!(r.bounds(), PixRect::new(0, 0, 15, 15));
    }

    #[test]
    fn subtract_is_difference() {
        let mut r = rect_region(0, 0, 10, 10);
        r.apply_shape(&SelectionShape::Rectangle(PixRect::new(5, 0, 10, 10)), SelectionMode::Subtract);
        assert_eq!(r.bounds(), PixRect::new(0, 0, 5, 10));
        assert!(!r.contains(5, 5));
        assert!(r.contains(4, 9));
    }

    #[test]
    fn intersect_keeps_overlap() {
        let mut r = rect_region(0, 0, 10, 10);
        r.apply_shape(&SelectionShape::Rectangle(PixRect::new(5, 5, 10, 10)), SelectionMode::Intersect);
        assert_eq!(r.bounds(), PixRect::new(5, 5, 5, 5));
        assert_eq!(r.cell_count(), 25);
    }

    #[test]
    fn zero_area_replace_is_empty() {
        let mut r = rect_region(0, 0, 10, 10);
        r.apply_shape(&SelectionShape::Rectangle(PixRect::new(3, 3, 0, 0)), SelectionMode::Replace);
        assert!(r.is_empty());
    }

    #[test]
    fn offset_shifts_contains_and_realizes() {
        let mut r = rect_region(10, 10, 4, 4);
        r.translate(5, -2);
        assert!(r.contains(15, 8));
        assert!(!r.contains(10, 10));
        assert_eq!(r.rect(), PixRect::new(15, 8, 4, 4));
        r.realize_offset();
        assert_eq!(r.offset(), (0, 0));
        assert_eq!(r.bounds(), PixRect::new(15, 8, 4, 4));
    }

    #[test]
    fn realize_clips_off_document_cells() {
        let mut r = rect_region(0, 0, 4, 4);
        r.translate(-2, 0);
        r.realize_offset();
        assert_eq!(r.bounds(), PixRect::new(0, 0, 2, 4));
    }

    #[test]
    fn invert_complements() {
        let mut r = rect_region(0, 0, 64, 32);
        r.invert();
        assert_eq!(r.bounds(), PixRect::new(0, 32, 64, 32));
    }

    #[test]
    fn from_alpha_uses_nonzero_alpha_only() {
        let mut buf = PixelBuffer::new(3, 3);
        buf.put_pixel(1, 1, [0, 0, 0, 1]);
        buf.put_pixel(2, 2, [9, 9, 9, 0]);
        let r = Region::from_alpha(64, 64, &buf, 20, 30);
        assert_eq!(r.bounds(), PixRect::new(21, 31, 1, 1));
        assert_eq!(r.cell_count(), 1);
    }

    #[test]
    fn from_alpha_keeps_cells_hanging_off_the_edge() {
        let buf = PixelBuffer::new_filled(4, 2, [1, 1, 1, 255]);
        let mut r = Region::from_alpha(16, 16, &buf, -3, 15);
        assert_eq!(r.rect(), PixRect::new(-3, 15, 4, 2));
        assert_eq!(r.cell_count(), 8);
        assert!(r.contains(-3, 16));
        r.translate(5, -10);
        r.realize_offset();
        assert_eq!(r.bounds(), PixRect::new(2, 5, 4, 2));
    }

    #[test]
    fn add_alpha_unions_after_realizing() {
        let mut r = rect_region(0, 0, 2, 2);
        r.translate(1, 0);
        let mut buf = PixelBuffer::new(2, 1);
        buf.put_pixel(1, 0, [0, 0, 0, 9]);
        r.add_alpha(&buf, 62, 5);
        assert_eq!(r.offset(), (0, 0));
        assert_eq!(r.cell_count(), 5);
        assert!(r.contains(63, 5));
        assert!(!r.contains(62, 5));
    }

    #[test]
    fn ellipse_marquee_stays_inside_rect() {
        let shape = MarqueeShape::Ellipse.shape_for(PixRect::new(0, 0, 10, 6));
        let r = Region::from_shape(64, 64, &shape);
        assert!(!r.is_empty());
        assert!(PixRect::new(0, 0, 10, 6).intersect(&r.bounds()) == r.bounds());
        assert!(!r.contains(0, 0));
        assert!(r.contains(5, 3));
    }

    #[test]
    fn resize_keeps_overlapping_cells() {
        let mut r = rect_region(30, 30, 10, 10);
        r.resize(35, 100);
        assert_eq!(r.width(), 35);
        assert_eq!(r.bounds(), PixRect::new(30, 30, 5, 10));
    }

    #[test]
    fn modifier_mapping() {
        assert_eq!(SelectionMode::from_modifiers(true, true), SelectionMode::Intersect);
        assert_eq!(SelectionMode::from_modifiers(true, false), SelectionMode::Add);
        assert_eq!(SelectionMode::from_modifiers(false, true), SelectionMode::Subtract);
        assert_eq!(SelectionMode::from_modifiers(false, false), SelectionMode::Replace);
    }
}
