// ============================================================================
// GUIDES: snap targets for floating-selection moves
// ============================================================================

/// Source of guide lines the move gesture can snap to.
///
/// `is_horizontal` selects horizontal guides (lines at a fixed y, used for
/// top/bottom edges); otherwise vertical guides (fixed x, left/right edges).
/// Implementations return the nearest guide coordinate; the caller decides
/// whether it is close enough to snap.
pub trait GuideSnap {
    fn snap_position(&self, coord: i32, is_horizontal: bool) -> Option<i32>;
}

/// No guides at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGuides;

impl GuideSnap for NoGuides {
    fn snap_position(&self, _coord: i32, _is_horizontal: bool) -> Option<i32> {
        None
    }
}

/// Plain list of document-space guides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GuideSet {
    /// y coordinates of horizontal guides.
    pub horizontal: Vec<i32>,
    /// x coordinates of vertical guides.
    pub vertical: Vec<i32>,
}

impl GuideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_horizontal(&mut self, y: i32) {
        if !self.horizontal.contains(&y) {
            self.horizontal.push(y);
        }
    }

    pub fn add_vertical(&mut self, x: i32) {
        if !self.vertical.contains(&x) {
            self.vertical.push(x);
        }
    }

    pub fn clear(&mut self) {
        self.horizontal.clear();
        self.vertical.clear();
    }
}

impl GuideSnap for GuideSet {
    fn snap_position(&self, coord: i32, is_horizontal: bool) -> Option<i32> {
        let lines = if is_horizontal { &self.horizontal } else { &self.vertical };
        lines.iter().copied().min_by_key(|g| (g - coord).abs())
    }
}

/// Resolve a snap for one axis of a `lo..hi` span. The nearer of the two
/// edges wins; returns the delta that lands it on the guide, if within
/// `threshold`.
pub fn snap_span(guides: &dyn GuideSnap, lo: i32, hi: i32, is_horizontal: bool, threshold: i32) -> Option<i32> {
    [lo, hi]
        .into_iter()
        .filter_map(|edge| guides.snap_position(edge, is_horizontal).map(|g| g - edge))
        .filter(|d| d.abs() <= threshold)
        .min_by_key(|d| d.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_guide_on_the_right_axis() {
        let mut g = GuideSet::new();
        g.add_vertical(100);
        g.add_vertical(10);
        g.add_horizontal(50);
        assert_eq!(g.snap_position(97, false), Some(100));
        assert_eq!(g.snap_position(12, false), Some(10));
        assert_eq!(g.snap_position(97, true), Some(50));
        assert_eq!(NoGuides.snap_position(3, true), None);
    }

    #[test]
    fn span_snaps_either_edge_within_threshold() {
        let mut g = GuideSet::new();
        g.add_vertical(100);
        // Left edge 97 → +3
        assert_eq!(snap_span(&g, 97, 117, false, 4), Some(3));
        // Right edge 102 → -2
        assert_eq!(snap_span(&g, 82, 102, false, 4), Some(-2));
        // Too far
        assert_eq!(snap_span(&g, 90, 95, false, 4), None);
    }
}
