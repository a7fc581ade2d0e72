// ============================================================================
// SELECTION GESTURES: pointer state machine for marquee / move / scale /
// rotate / pivot, plus the programmatic selection operations
// ============================================================================

use egui::{CursorIcon, Pos2, Rect, pos2};

use crate::canvas::{CanvasState, PixRect, PixelBuffer, TRANSPARENT};
use crate::components::history::{
    ApplyDirection, FloatTransition, HistoryManager, HistoryRecord, RegionChangeKind, TransformChangeKind,
};
use crate::guides::{self, GuideSnap, NoGuides};
use crate::ops::compositor;
use crate::ops::transform::{Snapshot, TransformState};
use crate::selection::{Region, SelectionMode, SelectionShape};
use crate::settings::SelectionSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GestureState {
    /// Nothing selected.
    #[default]
    None,
    /// A region exists but its pixels are still in the layer.
    Armed,
    /// The region's pixels live in the floating buffer.
    Floating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DragKind {
    #[default]
    None,
    Marquee,
    Move,
    Scale,
    Rotate,
    Pivot,
}

/// The 8 scale handles around the selection rect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl HandleKind {
    pub fn all() -> [HandleKind; 8] {
        use HandleKind::*;
        [NW, N, NE, E, SE, S, SW, W]
    }

    pub fn position(&self, rect: Rect) -> Pos2 {
        let c = rect.center();
        match self {
            HandleKind::N => pos2(c.x, rect.min.y),
            HandleKind::S => pos2(c.x, rect.max.y),
            HandleKind::E => pos2(rect.max.x, c.y),
            HandleKind::W => pos2(rect.min.x, c.y),
            HandleKind::NE => pos2(rect.max.x, rect.min.y),
            HandleKind::NW => rect.min,
            HandleKind::SE => rect.max,
            HandleKind::SW => pos2(rect.min.x, rect.max.y),
        }
    }

    fn moves_left(&self) -> bool {
        matches!(self, HandleKind::W | HandleKind::NW | HandleKind::SW)
    }

    fn moves_right(&self) -> bool {
        matches!(self, HandleKind::E | HandleKind::NE | HandleKind::SE)
    }

    fn moves_top(&self) -> bool {
        matches!(self, HandleKind::N | HandleKind::NE | HandleKind::NW)
    }

    fn moves_bottom(&self) -> bool {
        matches!(self, HandleKind::S | HandleKind::SE | HandleKind::SW)
    }

    pub fn cursor(&self) -> CursorIcon {
        match self {
            HandleKind::N => CursorIcon::ResizeNorth,
            HandleKind::S => CursorIcon::ResizeSouth,
            HandleKind::E => CursorIcon::ResizeEast,
            HandleKind::W => CursorIcon::ResizeWest,
            HandleKind::NE => CursorIcon::ResizeNorthEast,
            HandleKind::NW => CursorIcon::ResizeNorthWest,
            HandleKind::SE => CursorIcon::ResizeSouthEast,
            HandleKind::SW => CursorIcon::ResizeSouthWest,
        }
    }
}

/// Result of hit-testing a document position against the selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTarget {
    Pivot,
    Rotate(HandleKind),
    Scale(HandleKind),
    Body,
    Outside,
}

impl HitTarget {
    pub fn cursor_icon(&self) -> CursorIcon {
        match self {
            HitTarget::Pivot => CursorIcon::Crosshair,
            HitTarget::Rotate(_) => CursorIcon::Alias,
            HitTarget::Scale(h) => h.cursor(),
            HitTarget::Body => CursorIcon::Move,
            HitTarget::Outside => CursorIcon::Default,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
}

impl From<egui::Modifiers> for Modifiers {
    fn from(m: egui::Modifiers) -> Self {
        Self { shift: m.shift, alt: m.alt, ctrl: m.ctrl || m.command }
    }
}

/// Pointer input already converted to document coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pos: Pos2,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(x: f32, y: f32) -> Self {
        Self { pos: pos2(x, y), modifiers: Modifiers::default() }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Read-only view handed to the renderer each frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderView<'a> {
    pub active: bool,
    pub floating: bool,
    pub rect: Option<Rect>,
    pub buffer: Option<&'a PixelBuffer>,
    pub buffer_w: u32,
    pub buffer_h: u32,
    pub float_x: i32,
    pub float_y: i32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub angle_deg: f32,
    pub pivot: Option<Pos2>,
    pub hover_handle: Option<HitTarget>,
    pub drag: DragKind,
}

struct DragState {
    kind: DragKind,
    start_pos: Pos2,
    handle: Option<HandleKind>,
    start_rect: Rect,
    start_float: (i32, i32),
    start_angle_rad: f32,
    start_angle_deg: f32,
    marquee_mode: SelectionMode,
    region_before: Option<Region>,
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct GestureController {
    pub transform: TransformState,
    pub settings: SelectionSettings,
    /// Screen pixels per document pixel; scales handle radii.
    pub zoom: f32,
    guides: Box<dyn GuideSnap>,
    state: GestureState,
    drag: Option<DragState>,
    hover_handle: Option<HitTarget>,
}

impl Default for GestureController {
    fn default() -> Self {
        Self::new(SelectionSettings::default())
    }
}

impl GestureController {
    pub fn new(settings: SelectionSettings) -> Self {
        Self {
            transform: TransformState::new(settings.scale_filter, settings.rotation_mode, settings.scale_link),
            settings,
            zoom: 1.0,
            guides: Box::new(NoGuides),
            state: GestureState::None,
            drag: None,
            hover_handle: None,
        }
    }

    pub fn set_guides(&mut self, guides: Box<dyn GuideSnap>) {
        self.guides = guides;
    }

    pub fn apply_settings(&mut self, settings: SelectionSettings) {
        self.transform.scale_filter = settings.scale_filter;
        self.transform.rotation_mode = settings.rotation_mode;
        self.transform.scale_link = settings.scale_link;
        self.settings = settings;
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != GestureState::None
    }

    pub fn is_floating(&self) -> bool {
        self.state == GestureState::Floating
    }

    pub fn drag_kind(&self) -> DragKind {
        self.drag.as_ref().map_or(DragKind::None, |d| d.kind)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn hover_handle(&self) -> Option<HitTarget> {
        self.hover_handle
    }

    fn refresh_state(&mut self, canvas: &CanvasState) {
        self.state = if self.transform.floating {
            GestureState::Floating
        } else if !canvas.selection.is_empty() {
            GestureState::Armed
        } else {
            GestureState::None
        };
        self.transform.active = self.state != GestureState::None;
    }

    /// Rect the handles are drawn around.
    pub fn selection_rect(&self, canvas: &CanvasState) -> Option<Rect> {
        match self.state {
            GestureState::Floating => Some(self.transform.display_rect()),
            GestureState::Armed => Some(canvas.selection.rect().to_egui()),
            GestureState::None => None,
        }
    }

    fn pivot_point(&self, canvas: &CanvasState) -> Option<Pos2> {
        match self.state {
            GestureState::Floating => Some(self.transform.pivot_point()),
            GestureState::Armed => self.selection_rect(canvas).map(|r| r.center()),
            GestureState::None => None,
        }
    }

    pub fn render_view<'a>(&'a self, canvas: &CanvasState) -> RenderView<'a> {
        let t = &self.transform;
        let (buffer_w, buffer_h) = t.buffer_size();
        RenderView {
            active: self.is_active(),
            floating: self.is_floating(),
            rect: self.selection_rect(canvas),
            buffer: t.buffer(),
            buffer_w,
            buffer_h,
            float_x: t.float_x,
            float_y: t.float_y,
            scale_x: t.scale_x,
            scale_y: t.scale_y,
            angle_deg: t.angle_deg,
            pivot: self.pivot_point(canvas),
            hover_handle: self.hover_handle,
            drag: self.drag_kind(),
        }
    }

    // ---- hit testing ------------------------------------------------------------

    /// Priority: pivot, rotation ring, scale handle, body, outside.
    pub fn hit_test(&self, canvas: &CanvasState, pos: Pos2) -> HitTarget {
        let Some(rect) = self.selection_rect(canvas) else {
            return HitTarget::Outside;
        };
        let zoom = self.zoom.max(1e-3);
        let grab = self.settings.handle_radius / zoom;
        let ring = self.settings.rotate_ring / zoom;

        if let Some(p) = self.pivot_point(canvas)
            && pos.distance(p) <= grab
        {
            return HitTarget::Pivot;
        }

        let nearest = HandleKind::all()
            .into_iter()
            .map(|h| (h, pos.distance(h.position(rect))))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((handle, dist)) = nearest {
            if !rect.contains(pos) && dist > grab && dist <= ring {
                return HitTarget::Rotate(handle);
            }
            if dist <= grab {
                return HitTarget::Scale(handle);
            }
        }

        let inside = match self.state {
            GestureState::Floating => rect.contains(pos),
            _ => canvas.selection.contains(pos.x.floor() as i32, pos.y.floor() as i32),
        };
        if inside { HitTarget::Body } else { HitTarget::Outside }
    }

    pub fn hover(&mut self, canvas: &CanvasState, pos: Pos2) -> HitTarget {
        let target = if self.is_dragging() {
            self.hover_handle.unwrap_or(HitTarget::Outside)
        } else {
            self.hit_test(canvas, pos)
        };
        self.hover_handle = (target != HitTarget::Outside).then_some(target);
        target
    }

    // ---- pointer events ---------------------------------------------------------

    pub fn pointer_down(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, ev: PointerEvent) {
        if self.is_dragging() {
            return;
        }
        let wants_marquee = ev.modifiers.shift || ev.modifiers.alt;
        let target = if wants_marquee || !self.is_active() {
            HitTarget::Outside
        } else {
            self.hit_test(canvas, ev.pos)
        };

        let (kind, handle) = match target {
            HitTarget::Outside => {
                self.begin_marquee(canvas, history, ev);
                return;
            }
            HitTarget::Pivot => (DragKind::Pivot, None),
            HitTarget::Rotate(h) => (DragKind::Rotate, Some(h)),
            HitTarget::Scale(h) => (DragKind::Scale, Some(h)),
            HitTarget::Body => (DragKind::Move, None),
        };
        if !self.lift(canvas, history) {
            return;
        }

        let with_pixels = matches!(kind, DragKind::Scale | DragKind::Rotate);
        self.transform.drag_start_snapshot = Some(self.transform.snapshot(&canvas.selection, with_pixels));
        let pivot = self.transform.pivot_point();
        let v = ev.pos - pivot;
        if kind == DragKind::Rotate {
            self.transform.begin_rotate();
        }
        self.drag = Some(DragState {
            kind,
            start_pos: ev.pos,
            handle,
            start_rect: self.transform.display_rect(),
            start_float: (self.transform.float_x, self.transform.float_y),
            start_angle_rad: v.y.atan2(v.x),
            start_angle_deg: self.transform.angle_deg,
            marquee_mode: SelectionMode::Replace,
            region_before: None,
        });
        self.hover_handle = Some(target);
    }

    fn begin_marquee(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, ev: PointerEvent) {
        if self.transform.floating && !self.commit(canvas, history) {
            return;
        }
        self.drag = Some(DragState {
            kind: DragKind::Marquee,
            start_pos: ev.pos,
            handle: None,
            start_rect: Rect::NOTHING,
            start_float: (0, 0),
            start_angle_rad: 0.0,
            start_angle_deg: 0.0,
            marquee_mode: SelectionMode::from_modifiers(ev.modifiers.shift, ev.modifiers.alt),
            region_before: Some(canvas.selection.clone()),
        });
    }

    pub fn pointer_move(&mut self, canvas: &mut CanvasState, ev: PointerEvent) {
        let Some(drag) = self.drag.as_ref() else {
            self.hover(canvas, ev.pos);
            return;
        };
        match drag.kind {
            DragKind::None => {}
            DragKind::Marquee => {
                let rect = marquee_rect(drag.start_pos, ev.pos);
                let shape = self.settings.marquee_shape.shape_for(rect);
                if let Some(before) = &drag.region_before {
                    canvas.selection = before.clone();
                }
                canvas.selection.apply_shape(&shape, drag.marquee_mode);
                canvas.mark_dirty(None);
            }
            DragKind::Move => {
                let d = ev.pos - drag.start_pos;
                let mut tx = drag.start_float.0 + d.x.round() as i32;
                let mut ty = drag.start_float.1 + d.y.round() as i32;
                let (w, h) = self.transform.buffer_size();
                let threshold = self.settings.snap_threshold;
                if let Some(s) = guides::snap_span(self.guides.as_ref(), tx, tx + w as i32, false, threshold) {
                    tx += s;
                }
                if let Some(s) = guides::snap_span(self.guides.as_ref(), ty, ty + h as i32, true, threshold) {
                    ty += s;
                }
                let (dx, dy) = (tx - self.transform.float_x, ty - self.transform.float_y);
                self.transform.translate(&mut canvas.selection, dx, dy);
                canvas.mark_dirty(None);
            }
            DragKind::Scale => {
                if let Some(handle) = drag.handle {
                    let link = self.transform.scale_link || ev.modifiers.shift;
                    let (sx, sy, center) = scale_from_handle(handle, drag.start_rect, ev.pos, link);
                    self.transform.set_pending_scale(sx, sy);
                    self.transform.set_anchor_center(center.0, center.1);
                    canvas.mark_dirty(None);
                }
            }
            DragKind::Rotate => {
                let pivot = self.transform.pivot_point();
                let v = ev.pos - pivot;
                let delta = normalize_degrees((v.y.atan2(v.x) - drag.start_angle_rad).to_degrees());
                let step = if ev.modifiers.shift {
                    self.settings.rotate_snap_step
                } else {
                    self.settings.rotate_step
                };
                let angle = ((drag.start_angle_deg + delta) / step).round() * step;
                self.transform.set_pending_angle(angle);
                canvas.mark_dirty(None);
            }
            DragKind::Pivot => {
                self.transform.set_pivot_point(ev.pos);
                canvas.mark_dirty(None);
            }
        }
    }

    pub fn pointer_up(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, ev: PointerEvent) {
        if self.drag.is_none() {
            return;
        }
        self.pointer_move(canvas, ev);
        let Some(drag) = self.drag.take() else { return };
        let before = self.transform.drag_start_snapshot.take();

        match drag.kind {
            DragKind::None => {}
            DragKind::Marquee => {
                let before_region = drag.region_before.unwrap_or_else(|| Region::new(canvas.width, canvas.height));
                let kind = kind_for_mode(drag.marquee_mode);
                Self::record_region_change(canvas, history, kind, before_region);
            }
            DragKind::Move | DragKind::Pivot => {
                let after = self.transform.snapshot(&canvas.selection, false);
                if let Some(before) = before
                    && !before.same_placement(&after)
                {
                    history.push(HistoryRecord::TransformChange { kind: TransformChangeKind::Move, before, after });
                }
            }
            DragKind::Scale | DragKind::Rotate => {
                let kind = if drag.kind == DragKind::Scale {
                    TransformChangeKind::Scale
                } else {
                    TransformChangeKind::Rotate
                };
                if let Some(before) = before {
                    if self.transform.bake(&mut canvas.selection) {
                        let after = self.transform.snapshot(&canvas.selection, true);
                        history.push(HistoryRecord::TransformChange { kind, before, after });
                    } else {
                        self.transform.restore(&before, &mut canvas.selection);
                    }
                }
            }
        }
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
        self.hover(canvas, ev.pos);
    }

    /// Abort an in-progress drag, or cancel the floating selection when idle.
    pub fn escape(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) {
        if let Some(drag) = self.drag.take() {
            if let Some(region) = drag.region_before {
                canvas.selection = region;
            }
            if let Some(snap) = self.transform.drag_start_snapshot.take() {
                self.transform.restore(&snap, &mut canvas.selection);
            }
            canvas.mark_dirty(None);
            self.refresh_state(canvas);
            return;
        }
        if self.transform.floating {
            self.cancel(canvas, history);
        }
    }

    /// Switching away from the selection tools: commit and deselect.
    pub fn deactivate(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) {
        if self.is_dragging() {
            self.escape(canvas, history);
        }
        if self.transform.floating {
            self.commit(canvas, history);
        }
        self.deselect(canvas, history);
        self.hover_handle = None;
    }

    // ---- lift / commit / cancel -------------------------------------------------

    /// Move the selected pixels of the active layer into the floating buffer.
    /// No-op (returning true) when already floating.
    pub fn lift(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        if self.transform.floating {
            return true;
        }
        canvas.selection.realize_offset();
        let rect = canvas.selection.bounds().intersect(&canvas.bounds());
        if rect.is_empty() {
            return false;
        }
        let layer_index = canvas.active_layer_index;
        let (doc_w, doc_h) = (canvas.width, canvas.height);
        let Some(layer) = canvas.layers.get_mut(layer_index) else {
            return false;
        };
        if layer.pixels.dimensions() != (doc_w, doc_h) {
            log_warn!(
                "Lift skipped: layer {}x{} does not match document {}x{}",
                layer.pixels.width(),
                layer.pixels.height(),
                doc_w,
                doc_h
            );
            return false;
        }

        let before = layer.pixels.extract_region(rect);
        let mut buffer = PixelBuffer::new(rect.w, rect.h);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if !canvas.selection.is_set(x, y) {
                    continue;
                }
                let (ux, uy) = (x as u32, y as u32);
                buffer.put_pixel((x - rect.x) as u32, (y - rect.y) as u32, layer.pixels.get_pixel(ux, uy));
                layer.pixels.put_pixel(ux, uy, TRANSPARENT);
            }
        }
        let after = layer.pixels.extract_region(rect);

        let region = canvas.selection.clone();
        self.transform.begin_float(buffer, rect.x, rect.y);
        let snapshot = self.transform.snapshot(&canvas.selection, true);
        history.push(HistoryRecord::PixelPatch {
            layer_index,
            rect,
            before,
            after,
            transition: FloatTransition::Lift { snapshot, region },
        });
        canvas.mark_dirty(Some(rect));
        self.refresh_state(canvas);
        log_info!("Lifted {}x{} selection at ({}, {})", rect.w, rect.h, rect.x, rect.y);
        true
    }

    /// Blend the floating buffer back into the active layer.
    pub fn commit(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        if !self.transform.floating || self.is_dragging() {
            return false;
        }
        let layer_index = canvas.active_layer_index;
        let (doc_w, doc_h) = (canvas.width, canvas.height);
        let snapshot = self.transform.snapshot(&canvas.selection, true);
        let region_before = canvas.selection.clone();
        let (fx, fy) = (self.transform.float_x, self.transform.float_y);

        let Some(layer) = canvas.layers.get_mut(layer_index) else {
            log_warn!("Commit skipped: no active layer {}", layer_index);
            return false;
        };
        if layer.pixels.dimensions() != (doc_w, doc_h) {
            log_warn!(
                "Commit skipped: layer {}x{} does not match document {}x{}",
                layer.pixels.width(),
                layer.pixels.height(),
                doc_w,
                doc_h
            );
            return false;
        }
        let Some(buffer) = self.transform.buffer() else {
            return false;
        };
        let rect = PixRect::new(fx, fy, buffer.width(), buffer.height()).intersect(&layer.pixels.bounds());
        let before = layer.pixels.extract_region(rect);
        compositor::blit(&mut layer.pixels, buffer, fx, fy);
        let after = layer.pixels.extract_region(rect);
        // Cells a buffer bigger than the document could not hold while floating.
        canvas.selection.add_alpha(buffer, fx, fy);

        self.transform.end_float();
        let region_after = canvas.selection.clone();
        history.push(HistoryRecord::PixelPatch {
            layer_index,
            rect,
            before,
            after,
            transition: FloatTransition::Commit { snapshot, region_before, region_after },
        });
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
        log_info!("Committed floating selection at ({}, {})", fx, fy);
        true
    }

    /// Abandon the floating selection: restore the pre-lift pixels and region
    /// and drop every history record since the lift without replaying them.
    pub fn cancel(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        if !self.transform.floating {
            return false;
        }
        self.drag = None;
        self.transform.drag_start_snapshot = None;

        let Some(serial) = history.last_lift().map(|e| e.serial) else {
            log_warn!("Cancel: lift is no longer in history, committing instead");
            return self.commit(canvas, history);
        };
        if let Some(entry) = history.last_lift()
            && let HistoryRecord::PixelPatch {
                layer_index,
                rect,
                before,
                transition: FloatTransition::Lift { region, .. },
                ..
            } = &entry.record
        {
            if let Some(layer) = canvas.layers.get_mut(*layer_index) {
                layer.pixels.write_region(rect.x, rect.y, before);
            }
            canvas.selection = region.clone();
        }
        let dropped = history.discard_from(serial);
        self.transform.end_float();
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
        log_info!("Cancelled floating selection ({} history records dropped)", dropped);
        true
    }

    /// Floating: throw the buffer away and deselect. Armed: clear the
    /// selected pixels of the active layer and keep the selection.
    pub fn delete(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        if self.is_dragging() {
            return false;
        }
        let layer_index = canvas.active_layer_index;
        if self.transform.floating {
            let snapshot = self.transform.snapshot(&canvas.selection, true);
            let region_before = canvas.selection.clone();
            self.transform.end_float();
            canvas.selection.clear();
            history.push(HistoryRecord::PixelPatch {
                layer_index,
                rect: PixRect::EMPTY,
                before: PixelBuffer::default(),
                after: PixelBuffer::default(),
                transition: FloatTransition::Discard { snapshot, region_before },
            });
        } else {
            let rect = canvas.selection.rect().intersect(&canvas.bounds());
            if rect.is_empty() {
                return false;
            }
            let Some(layer) = canvas.layers.get_mut(layer_index) else {
                return false;
            };
            let before = layer.pixels.extract_region(rect);
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    if canvas.selection.contains(x, y) {
                        layer.pixels.put_pixel(x as u32, y as u32, TRANSPARENT);
                    }
                }
            }
            let after = layer.pixels.extract_region(rect);
            history.push(HistoryRecord::PixelPatch {
                layer_index,
                rect,
                before,
                after,
                transition: FloatTransition::None,
            });
        }
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
        true
    }

    // ---- programmatic transforms --------------------------------------------------

    pub fn nudge(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, dx: i32, dy: i32) -> bool {
        if self.is_dragging() || (dx == 0 && dy == 0) || !self.lift(canvas, history) {
            return false;
        }
        let before = self.transform.snapshot(&canvas.selection, false);
        self.transform.translate(&mut canvas.selection, dx, dy);
        let after = self.transform.snapshot(&canvas.selection, false);
        history.push(HistoryRecord::TransformChange { kind: TransformChangeKind::Move, before, after });
        canvas.mark_dirty(None);
        true
    }

    /// Place the pivot at a document position (lifting first if needed).
    pub fn set_pivot(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, pivot: Pos2) -> bool {
        if self.is_dragging() || !self.lift(canvas, history) {
            return false;
        }
        let before = self.transform.snapshot(&canvas.selection, false);
        self.transform.set_pivot_point(pivot);
        self.push_placement_change(history, before, &canvas.selection)
    }

    pub fn reset_pivot(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        if self.is_dragging() || !self.transform.floating {
            return false;
        }
        let before = self.transform.snapshot(&canvas.selection, false);
        self.transform.reset_pivot();
        self.push_placement_change(history, before, &canvas.selection)
    }

    fn push_placement_change(&mut self, history: &mut HistoryManager, before: Snapshot, region: &Region) -> bool {
        let after = self.transform.snapshot(region, false);
        if before.same_placement(&after) {
            return false;
        }
        history.push(HistoryRecord::TransformChange { kind: TransformChangeKind::Move, before, after });
        true
    }

    pub fn flip_horizontal(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        self.pixel_transform(canvas, history, TransformChangeKind::Flip, |t, r| t.flip(r, true))
    }

    pub fn flip_vertical(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        self.pixel_transform(canvas, history, TransformChangeKind::Flip, |t, r| t.flip(r, false))
    }

    /// Numeric scale entry: scale about the center and bake immediately.
    pub fn set_scale(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, sx: f32, sy: f32) -> bool {
        self.pixel_transform(canvas, history, TransformChangeKind::Scale, |t, r| {
            t.set_pending_scale(sx, sy);
            t.bake(r)
        })
    }

    /// Numeric rotation entry (degrees, clockwise); orbits a custom pivot.
    pub fn rotate_by(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager, angle_deg: f32) -> bool {
        self.pixel_transform(canvas, history, TransformChangeKind::Rotate, |t, r| {
            t.begin_rotate();
            t.set_pending_angle(t.angle_deg + angle_deg);
            t.bake(r)
        })
    }

    fn pixel_transform(
        &mut self,
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
        kind: TransformChangeKind,
        op: impl FnOnce(&mut TransformState, &mut Region) -> bool,
    ) -> bool {
        if self.is_dragging() || !self.lift(canvas, history) {
            return false;
        }
        let before = self.transform.snapshot(&canvas.selection, true);
        if !op(&mut self.transform, &mut canvas.selection) {
            self.transform.restore(&before, &mut canvas.selection);
            return false;
        }
        let after = self.transform.snapshot(&canvas.selection, true);
        history.push(HistoryRecord::TransformChange { kind, before, after });
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
        true
    }

    // ---- region operations --------------------------------------------------------

    pub fn select_shape(
        &mut self,
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
        shape: &SelectionShape,
        mode: SelectionMode,
    ) -> bool {
        self.region_op(canvas, history, kind_for_mode(mode), |r| r.apply_shape(shape, mode))
    }

    pub fn select_rect(
        &mut self,
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
        rect: PixRect,
        mode: SelectionMode,
    ) -> bool {
        self.select_shape(canvas, history, &SelectionShape::Rectangle(rect), mode)
    }

    pub fn select_all(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        self.region_op(canvas, history, RegionChangeKind::Create, |r| r.select_all())
    }

    pub fn invert(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        self.region_op(canvas, history, RegionChangeKind::Invert, |r| r.invert())
    }

    pub fn deselect(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> bool {
        self.region_op(canvas, history, RegionChangeKind::Clear, |r| r.clear())
    }

    fn region_op(
        &mut self,
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
        kind: RegionChangeKind,
        op: impl FnOnce(&mut Region),
    ) -> bool {
        if self.is_dragging() {
            return false;
        }
        if self.transform.floating && !self.commit(canvas, history) {
            return false;
        }
        let before = canvas.selection.clone();
        op(&mut canvas.selection);
        let changed = Self::record_region_change(canvas, history, kind, before);
        self.refresh_state(canvas);
        changed
    }

    /// Push a `RegionChange` if the selection differs from `before`. An empty
    /// `Create` result is recorded as `Clear`.
    fn record_region_change(
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
        kind: RegionChangeKind,
        before: Region,
    ) -> bool {
        if canvas.selection == before {
            return false;
        }
        let kind = if kind == RegionChangeKind::Create && canvas.selection.is_empty() {
            RegionChangeKind::Clear
        } else {
            kind
        };
        history.push(HistoryRecord::RegionChange { kind, before, after: canvas.selection.clone() });
        canvas.mark_dirty(None);
        true
    }

    /// The document was resized to `width × height` (layers already resized).
    pub fn on_document_resized(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) {
        self.drag = None;
        self.transform.drag_start_snapshot = None;
        if self.transform.floating && !self.commit(canvas, history) {
            log_warn!("Document resize dropped the floating selection");
            self.transform.end_float();
        }
        let (w, h) = (canvas.width, canvas.height);
        if canvas.selection.fits_within(w, h) {
            canvas.selection.resize(w, h);
        } else {
            canvas.selection = Region::new(w, h);
        }
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
    }

    // ---- history replay -----------------------------------------------------------

    pub fn undo(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> Option<String> {
        if self.is_dragging() {
            return None;
        }
        let entry = history.undo()?;
        self.apply_record(canvas, &entry.record, ApplyDirection::Undo);
        Some(entry.record.description())
    }

    pub fn redo(&mut self, canvas: &mut CanvasState, history: &mut HistoryManager) -> Option<String> {
        if self.is_dragging() {
            return None;
        }
        let entry = history.redo()?;
        self.apply_record(canvas, &entry.record, ApplyDirection::Redo);
        Some(entry.record.description())
    }

    /// Put the document and the floating state into the record's `before`
    /// (undo) or `after` (redo) state. Sets absolute values, so applying the
    /// same direction twice is harmless.
    pub fn apply_record(&mut self, canvas: &mut CanvasState, record: &HistoryRecord, dir: ApplyDirection) {
        let undo = dir == ApplyDirection::Undo;
        match record {
            HistoryRecord::RegionChange { before, after, .. } => {
                if self.transform.floating {
                    self.transform.end_float();
                }
                canvas.selection = if undo { before.clone() } else { after.clone() };
            }
            HistoryRecord::TransformChange { before, after, .. } => {
                let snap = if undo { before } else { after };
                self.transform.restore(snap, &mut canvas.selection);
            }
            HistoryRecord::PixelPatch { layer_index, rect, before, after, transition } => {
                let bytes = if undo { before } else { after };
                if !rect.is_empty()
                    && let Some(layer) = canvas.layers.get_mut(*layer_index)
                {
                    layer.pixels.write_region(rect.x, rect.y, bytes);
                }
                match (transition, undo) {
                    (FloatTransition::None, _) => {}
                    (FloatTransition::Lift { region, .. }, true) => {
                        self.transform.end_float();
                        canvas.selection = region.clone();
                    }
                    (FloatTransition::Lift { snapshot, .. }, false) => {
                        self.transform.restore(snapshot, &mut canvas.selection);
                    }
                    (FloatTransition::Commit { snapshot, region_before, .. }, true) => {
                        canvas.selection = region_before.clone();
                        self.transform.restore(snapshot, &mut canvas.selection);
                    }
                    (FloatTransition::Commit { region_after, .. }, false) => {
                        self.transform.end_float();
                        canvas.selection = region_after.clone();
                    }
                    (FloatTransition::Discard { snapshot, region_before }, true) => {
                        canvas.selection = region_before.clone();
                        self.transform.restore(snapshot, &mut canvas.selection);
                    }
                    (FloatTransition::Discard { .. }, false) => {
                        self.transform.end_float();
                        canvas.selection.clear();
                    }
                }
            }
        }
        canvas.mark_dirty(None);
        self.refresh_state(canvas);
        log_info!("History {:?}: {}", dir, record.description());
    }
}

fn kind_for_mode(mode: SelectionMode) -> RegionChangeKind {
    match mode {
        SelectionMode::Replace => RegionChangeKind::Create,
        SelectionMode::Add => RegionChangeKind::Add,
        SelectionMode::Subtract => RegionChangeKind::Subtract,
        SelectionMode::Intersect => RegionChangeKind::Intersect,
    }
}

fn marquee_rect(a: Pos2, b: Pos2) -> PixRect {
    PixRect::from_corners(
        a.x.floor() as i32,
        a.y.floor() as i32,
        b.x.floor() as i32,
        b.y.floor() as i32,
    )
}

/// Wrap to (-180, 180].
fn normalize_degrees(mut deg: f32) -> f32 {
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg <= -180.0 {
        deg += 360.0;
    }
    deg
}

/// Scale factors and new anchor center for dragging `handle` of `start` to
/// `pos`; the opposite edge/corner stays put. Edge handles in linked mode
/// scale the other axis around the center.
fn scale_from_handle(handle: HandleKind, start: Rect, pos: Pos2, link: bool) -> (f32, f32, (i32, i32)) {
    let (w0, h0) = (start.width().max(1.0), start.height().max(1.0));
    let mut sx = 1.0;
    let mut sy = 1.0;
    if handle.moves_right() {
        sx = (pos.x - start.min.x) / w0;
    } else if handle.moves_left() {
        sx = (start.max.x - pos.x) / w0;
    }
    if handle.moves_bottom() {
        sy = (pos.y - start.min.y) / h0;
    } else if handle.moves_top() {
        sy = (start.max.y - pos.y) / h0;
    }
    sx = sx.max(1.0 / w0);
    sy = sy.max(1.0 / h0);

    if link {
        let horizontal = handle.moves_left() || handle.moves_right();
        let vertical = handle.moves_top() || handle.moves_bottom();
        let s = match (horizontal, vertical) {
            (true, true) => {
                if (sx - 1.0).abs() >= (sy - 1.0).abs() {
                    sx
                } else {
                    sy
                }
            }
            (true, false) => sx,
            _ => sy,
        };
        sx = s;
        sy = s;
    }

    let (nw, nh) = (w0 * sx, h0 * sy);
    let c = start.center();
    let left = if handle.moves_left() {
        start.max.x - nw
    } else if handle.moves_right() {
        start.min.x
    } else {
        c.x - nw / 2.0
    };
    let top = if handle.moves_top() {
        start.max.y - nh
    } else if handle.moves_bottom() {
        start.min.y
    } else {
        c.y - nh / 2.0
    };
    let center = ((left + nw / 2.0).floor() as i32, (top + nh / 2.0).floor() as i32);
    (sx, sy, center)
}
