// ============================================================================
// CANVAS — view transform, brush parameters, interaction state machine
// ============================================================================
//
// Everything the pointer does flows through here before it touches the GPU.
// The interaction machine is deliberately egui-free: the app translates raw
// input into `InteractionMachine` method calls, and the machine answers with
// plain actions (pan deltas, warp steps, stroke commits).  That keeps the
// trickiest logic — touch debouncing, gesture preemption, commit ordering —
// unit-testable without a window.

use std::time::{Duration, Instant};

use egui::{Pos2, Rect, Vec2};

use crate::settings::{
    BRUSH_SIZE_MAX, BRUSH_SIZE_MIN, BRUSH_STRENGTH_MAX, BRUSH_STRENGTH_MIN, ZOOM_MIN,
};

/// A touch drag must move at least this many points before it can become a
/// warp stroke (filters out taps and scroll starts).
pub const TOUCH_DRAG_THRESHOLD: f32 = 6.0;
/// ...and this much time must also pass.  Mouse pointers skip both gates.
pub const TOUCH_WARP_DELAY: Duration = Duration::from_millis(60);

// ============================================================================
// VIEW TRANSFORM
// ============================================================================

/// Zoom + pan of the displayed image.  Affects only where the composite is
/// drawn on screen — never the displacement buffers themselves.
pub struct ViewTransform {
    pub zoom: f32,
    pub pan: Vec2,
    pub max_zoom: f32,
}

impl ViewTransform {
    pub fn new(max_zoom: f32) -> Self {
        Self {
            zoom: 1.0,
            pan: Vec2::ZERO,
            max_zoom,
        }
    }

    /// Fit the image inside the viewport and center it.
    pub fn fit(&mut self, viewport: Rect, img_w: u32, img_h: u32) {
        if img_w == 0 || img_h == 0 {
            return;
        }
        let fit = (viewport.width() / img_w as f32)
            .min(viewport.height() / img_h as f32)
            .min(1.0);
        self.zoom = fit.clamp(ZOOM_MIN, self.max_zoom);
        self.pan = Vec2::ZERO;
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.pan = Vec2::ZERO;
    }

    pub fn apply_zoom(&mut self, factor: f32) {
        self.zoom = (self.zoom * factor).clamp(ZOOM_MIN, self.max_zoom);
    }

    /// Zoom so the image point under `screen_pos` stays put.
    pub fn zoom_around(&mut self, factor: f32, screen_pos: Pos2, viewport: Rect) {
        let old_zoom = self.zoom;
        self.apply_zoom(factor);
        let applied = self.zoom / old_zoom;
        let center = viewport.center() + self.pan;
        let offset = screen_pos - center;
        self.pan += offset - offset * applied;
    }

    /// Screen rectangle the image occupies: centered in the viewport at the
    /// current zoom, shifted by the pan offset.
    pub fn image_rect(&self, viewport: Rect, img_w: u32, img_h: u32) -> Rect {
        let size = Vec2::new(img_w as f32, img_h as f32) * self.zoom;
        let center = viewport.center() + self.pan;
        Rect::from_center_size(center, size)
    }

    /// Screen position → image UV.  Positions outside the image map outside
    /// [0,1]; the brush shader handles that naturally.
    pub fn screen_to_uv(&self, pos: Pos2, image_rect: Rect) -> (f32, f32) {
        (
            (pos.x - image_rect.min.x) / image_rect.width().max(1e-6),
            (pos.y - image_rect.min.y) / image_rect.height().max(1e-6),
        )
    }
}

// ============================================================================
// BRUSH PARAMETERS
// ============================================================================

/// Externally configured brush: radius in device-independent pixels and
/// strength in percent.  Clamped on write so the GPU passes never see
/// out-of-range values.
pub struct BrushParams {
    pub size: f32,
    pub strength_pct: f32,
}

impl BrushParams {
    pub fn new(size: f32, strength_pct: f32) -> Self {
        Self {
            size: size.clamp(BRUSH_SIZE_MIN, BRUSH_SIZE_MAX),
            strength_pct: strength_pct.clamp(BRUSH_STRENGTH_MIN, BRUSH_STRENGTH_MAX),
        }
    }

    pub fn strength(&self) -> f32 {
        (self.strength_pct / 100.0).clamp(0.0, 1.0)
    }

    /// Brush radius in v-axis UV units.
    ///
    /// This is the single source of truth for the brush extent: the cursor
    /// preview diameter below is derived from it, so the accumulation pass
    /// and the on-screen circle can never disagree about the effective
    /// image-space radius.
    pub fn radius_uv(&self, zoom: f32, image_h: u32) -> f32 {
        let size = self.size.clamp(BRUSH_SIZE_MIN, BRUSH_SIZE_MAX);
        size / (zoom.max(1e-6) * image_h.max(1) as f32)
    }

    /// Screen-space diameter of the cursor circle, derived from the same
    /// conversion as `radius_uv`.
    pub fn preview_diameter(&self, zoom: f32, image_h: u32) -> f32 {
        2.0 * self.radius_uv(zoom, image_h) * image_h as f32 * zoom
    }
}

/// CPU reference of the brush falloff in the accumulation shader
/// (shaders.rs, `fs_brush`) — keep the two in sync.  Full strength at the
/// brush center, exactly zero at and beyond the radius; strength shapes the
/// edge (1 → soft linear, 8 → hard peak).
pub fn brush_falloff(dist: f32, radius: f32, strength: f32) -> f32 {
    if dist >= radius || radius <= 0.0 {
        return 0.0;
    }
    let n = dist / radius;
    let expo = 1.0 + 7.0 * strength.clamp(0.0, 1.0);
    (1.0 - n).clamp(0.0, 1.0).powf(expo)
}

// ============================================================================
// INTERACTION STATE MACHINE
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InteractionState {
    Idle,
    Warping,
    Panning,
    TwoFingerGesture,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointerKind {
    Mouse,
    Touch,
}

/// What the caller should do in response to a pointer event.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum InputAction {
    None,
    /// Shift the view by this screen-space delta.
    Pan(Vec2),
    /// Run one brush accumulation pass from `prev` to `curr` (screen space).
    WarpStep { prev: Pos2, curr: Pos2 },
    /// The stroke ended with accumulated passes — commit it to history.
    CommitStroke,
}

/// Interprets pointer/touch events into {Idle, Warping, Panning,
/// TwoFingerGesture}.  Exactly one state holds at any time; a second touch
/// always preempts single-pointer warping or panning.
pub struct InteractionMachine {
    state: InteractionState,
    /// Movement exceeded the drag threshold since pointer-down.
    drag_started: bool,
    /// The warp is actually engaged: accumulation passes may run and
    /// pointer-up commits.  For mouse pointers this is set immediately; for
    /// touch it waits for the debounce gates.
    warp_delayed: bool,
    /// Pending touch-warp anchor: set on touch-down, cleared on engage or
    /// pointer-up/cancel/preemption.
    touch_anchor: Option<(Pos2, Instant)>,
    /// Last accepted position, the `prev` of the next warp step.
    last_pos: Pos2,
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self {
            state: InteractionState::Idle,
            drag_started: false,
            warp_delayed: false,
            touch_anchor: None,
            last_pos: Pos2::ZERO,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn is_warping(&self) -> bool {
        self.state == InteractionState::Warping && self.warp_delayed
    }

    /// Primary pointer pressed over the canvas.
    ///
    /// `pan_modifier` is the held-spacebar (or equivalent) override;
    /// `compare_active` disables stroke initiation entirely.
    pub fn pointer_down(
        &mut self,
        pos: Pos2,
        kind: PointerKind,
        pan_modifier: bool,
        compare_active: bool,
        now: Instant,
    ) {
        if self.state == InteractionState::TwoFingerGesture {
            return;
        }
        self.last_pos = pos;
        self.drag_started = false;

        if pan_modifier {
            self.state = InteractionState::Panning;
            return;
        }
        if compare_active {
            // Comparing shows the unwarped original; strokes stay off.
            self.state = InteractionState::Idle;
            return;
        }

        match kind {
            PointerKind::Mouse => {
                // Mouse intent is unambiguous — warp immediately.
                self.state = InteractionState::Warping;
                self.warp_delayed = true;
                self.touch_anchor = None;
            }
            PointerKind::Touch => {
                // Anchor only; Warping waits for the distance + time gates.
                self.state = InteractionState::Warping;
                self.warp_delayed = false;
                self.touch_anchor = Some((pos, now));
            }
        }
    }

    /// Pointer moved.  Returns the action the caller should take.
    ///
    /// Callers may invoke this every frame; a stationary pointer is ignored,
    /// so a motionless click never counts as a drag (and never commits a
    /// no-op history entry).
    pub fn pointer_move(&mut self, pos: Pos2, now: Instant) -> InputAction {
        if pos == self.last_pos && self.touch_anchor.is_none() {
            return InputAction::None;
        }
        match self.state {
            InteractionState::Panning => {
                let delta = pos - self.last_pos;
                self.last_pos = pos;
                InputAction::Pan(delta)
            }
            InteractionState::Warping => {
                if !self.warp_delayed {
                    self.try_engage_touch_warp(pos, now);
                    if !self.warp_delayed {
                        return InputAction::None;
                    }
                }
                self.drag_started = true;
                let prev = self.last_pos;
                self.last_pos = pos;
                InputAction::WarpStep { prev, curr: pos }
            }
            _ => InputAction::None,
        }
    }

    /// Primary pointer released.  A quick tap (delay never elapsed) returns
    /// to Idle without a commit; an engaged drag commits the stroke.
    pub fn pointer_up(&mut self) -> InputAction {
        let commit = self.state == InteractionState::Warping
            && self.warp_delayed
            && self.drag_started;
        self.reset_to_idle();
        if commit {
            InputAction::CommitStroke
        } else {
            InputAction::None
        }
    }

    /// Pointer left the canvas or the platform cancelled the gesture — same
    /// cleanup as pointer-up (the caller also clears the preview cursor).
    pub fn pointer_cancel(&mut self) -> InputAction {
        self.pointer_up()
    }

    /// A second touch point appeared: preempt whatever single-pointer
    /// interaction was running and cancel any pending warp-delay timer.
    /// An in-flight engaged stroke is committed first so displacement
    /// writes are never left outside history.
    pub fn second_touch_down(&mut self) -> InputAction {
        let commit = self.state == InteractionState::Warping
            && self.warp_delayed
            && self.drag_started;
        self.touch_anchor = None;
        self.drag_started = false;
        self.warp_delayed = false;
        self.state = InteractionState::TwoFingerGesture;
        if commit {
            InputAction::CommitStroke
        } else {
            InputAction::None
        }
    }

    /// The gesture dropped below two touch points.  Back to Idle — a fresh
    /// pointer-down is required before any new stroke.
    pub fn gesture_end(&mut self) {
        if self.state == InteractionState::TwoFingerGesture {
            self.reset_to_idle();
        }
    }

    /// Time-based half of the touch debounce: a finger that moved past the
    /// threshold, then held still while the timer ran out, still engages.
    pub fn tick(&mut self, now: Instant) {
        if self.state == InteractionState::Warping && !self.warp_delayed {
            let pos = self.last_pos;
            self.try_engage_touch_warp(pos, now);
        }
    }

    fn try_engage_touch_warp(&mut self, pos: Pos2, now: Instant) {
        let Some((anchor, t0)) = self.touch_anchor else {
            return;
        };
        let moved = (pos - anchor).length() >= TOUCH_DRAG_THRESHOLD;
        let waited = now.duration_since(t0) >= TOUCH_WARP_DELAY;
        if moved && waited {
            self.warp_delayed = true;
            self.touch_anchor = None;
            // The stroke starts where the finger is now, not at the anchor —
            // the pre-engage travel was the debounce, not painting.
            self.last_pos = pos;
        } else if moved {
            // Remember progress; the timer may still be running.
            self.last_pos = pos;
        }
    }

    fn reset_to_idle(&mut self) {
        self.state = InteractionState::Idle;
        self.drag_started = false;
        self.warp_delayed = false;
        self.touch_anchor = None;
    }
}

impl Default for InteractionMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CANVAS STATE
// ============================================================================

/// Session state shared between the app shell, the interaction handlers and
/// the exporter — passed by reference, never ambient.
pub struct WarpCanvas {
    pub view: ViewTransform,
    pub brush: BrushParams,
    pub machine: InteractionMachine,
    /// Temporarily display the unwarped original.  While set, stroke
    /// initiation is disabled; clearing it re-shows the history-indexed
    /// buffer (the renderer's authoritative pair is untouched throughout).
    pub compare: bool,
    /// Latest hover position over the canvas, for the cursor circle.
    pub hover_pos: Option<Pos2>,
}

impl WarpCanvas {
    pub fn new(max_zoom: f32, brush_size: f32, brush_strength_pct: f32) -> Self {
        Self {
            view: ViewTransform::new(max_zoom),
            brush: BrushParams::new(brush_size, brush_strength_pct),
            machine: InteractionMachine::new(),
            compare: false,
            hover_pos: None,
        }
    }

    /// Cursor circle for brush-size visualization: screen position and
    /// diameter.  None while a two-finger gesture is active, while
    /// comparing, or with no relevant hover.
    ///
    /// The diameter comes from the same conversion as the accumulation
    /// pass's UV radius (`BrushParams`), never computed independently.
    pub fn pointer_preview(&self, image_h: u32) -> Option<(Pos2, f32)> {
        if self.compare || self.machine.state() == InteractionState::TwoFingerGesture {
            return None;
        }
        let pos = self.hover_pos?;
        Some((
            pos,
            self.brush.preview_diameter(self.view.zoom, image_h),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    fn after(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    // ---- falloff ----

    #[test]
    fn falloff_is_monotonically_non_increasing() {
        for &strength in &[0.0, 0.3, 0.7, 1.0] {
            let mut prev = f32::INFINITY;
            for i in 0..=100 {
                let dist = i as f32 / 100.0 * 0.05;
                let f = brush_falloff(dist, 0.05, strength);
                assert!(
                    f <= prev + 1e-6,
                    "falloff rose at dist {} (strength {})",
                    dist,
                    strength
                );
                prev = f;
            }
        }
    }

    #[test]
    fn falloff_is_zero_at_and_beyond_radius() {
        assert_eq!(brush_falloff(0.05, 0.05, 0.5), 0.0);
        assert_eq!(brush_falloff(0.1, 0.05, 0.5), 0.0);
        assert_eq!(brush_falloff(1.0, 0.0, 0.5), 0.0);
    }

    #[test]
    fn falloff_is_full_at_center() {
        for &strength in &[0.0, 0.5, 1.0] {
            assert!((brush_falloff(0.0, 0.05, strength) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_stroke_delta_is_zero_everywhere() {
        // delta = (curr - prev) * falloff * strength; with curr == prev the
        // delta vanishes regardless of falloff, so the buffer is unchanged.
        let (curr, prev) = ((0.5f32, 0.5f32), (0.5f32, 0.5f32));
        for i in 0..50 {
            let dist = i as f32 / 50.0 * 0.1;
            let f = brush_falloff(dist, 0.08, 0.9);
            let delta = ((curr.0 - prev.0) * f * 0.9, (curr.1 - prev.1) * f * 0.9);
            assert_eq!(delta, (0.0, 0.0));
        }
    }

    #[test]
    fn stronger_strokes_have_harder_edges() {
        // Same mid-radius distance: high strength must fall off more.
        let soft = brush_falloff(0.025, 0.05, 0.0);
        let hard = brush_falloff(0.025, 0.05, 1.0);
        assert!(hard < soft);
    }

    // ---- brush size conversions ----

    #[test]
    fn preview_diameter_matches_uv_radius() {
        let brush = BrushParams::new(60.0, 50.0);
        for &zoom in &[0.1, 0.5, 1.0, 2.0, 8.0] {
            for &img_h in &[480u32, 1080, 4320] {
                let uv = brush.radius_uv(zoom, img_h);
                let diameter = brush.preview_diameter(zoom, img_h);
                // Round-trip through image space: both must describe the
                // same effective radius.
                assert!(
                    (diameter - 2.0 * uv * img_h as f32 * zoom).abs() < 1e-3,
                    "conversion drift at zoom {} img_h {}",
                    zoom,
                    img_h
                );
                assert!((diameter - 120.0).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn brush_params_clamp_to_bounds() {
        let b = BrushParams::new(1000.0, 500.0);
        assert_eq!(b.size, BRUSH_SIZE_MAX);
        assert_eq!(b.strength_pct, BRUSH_STRENGTH_MAX);
        let b = BrushParams::new(0.0, 0.0);
        assert_eq!(b.size, BRUSH_SIZE_MIN);
        assert_eq!(b.strength_pct, BRUSH_STRENGTH_MIN);
    }

    // ---- view transform ----

    #[test]
    fn zoom_is_bounded() {
        let mut v = ViewTransform::new(48.0);
        v.apply_zoom(1e9);
        assert_eq!(v.zoom, 48.0);
        v.apply_zoom(1e-9);
        assert_eq!(v.zoom, ZOOM_MIN);
    }

    #[test]
    fn screen_to_uv_maps_corners() {
        let v = ViewTransform::new(48.0);
        let rect = Rect::from_min_size(Pos2::new(100.0, 50.0), Vec2::new(200.0, 100.0));
        assert_eq!(v.screen_to_uv(Pos2::new(100.0, 50.0), rect), (0.0, 0.0));
        assert_eq!(v.screen_to_uv(Pos2::new(300.0, 150.0), rect), (1.0, 1.0));
        let (u, vv) = v.screen_to_uv(Pos2::new(200.0, 100.0), rect);
        assert!((u - 0.5).abs() < 1e-6 && (vv - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zoom_around_keeps_point_fixed() {
        let mut v = ViewTransform::new(48.0);
        let viewport = Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 600.0));
        let target = Pos2::new(600.0, 150.0);
        let rect_before = v.image_rect(viewport, 400, 300);
        let uv_before = v.screen_to_uv(target, rect_before);
        v.zoom_around(2.0, target, viewport);
        let rect_after = v.image_rect(viewport, 400, 300);
        let uv_after = v.screen_to_uv(target, rect_after);
        assert!((uv_before.0 - uv_after.0).abs() < 1e-4);
        assert!((uv_before.1 - uv_after.1).abs() < 1e-4);
    }

    // ---- interaction machine ----

    #[test]
    fn mouse_warps_immediately_and_commits_on_release() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Mouse, false, false, now);
        assert_eq!(m.state(), InteractionState::Warping);
        assert!(m.is_warping());

        let action = m.pointer_move(Pos2::new(14.0, 10.0), now);
        assert_eq!(
            action,
            InputAction::WarpStep {
                prev: Pos2::new(10.0, 10.0),
                curr: Pos2::new(14.0, 10.0)
            }
        );
        assert_eq!(m.pointer_up(), InputAction::CommitStroke);
        assert_eq!(m.state(), InteractionState::Idle);
    }

    #[test]
    fn mouse_click_without_drag_does_not_commit() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Mouse, false, false, now);
        // Frame loops report the pointer every frame; a stationary pointer
        // is not a drag.
        assert_eq!(m.pointer_move(Pos2::new(10.0, 10.0), now), InputAction::None);
        assert_eq!(m.pointer_move(Pos2::new(10.0, 10.0), now), InputAction::None);
        assert_eq!(m.pointer_up(), InputAction::None);
    }

    #[test]
    fn touch_tap_never_engages() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Touch, false, false, now);
        assert!(!m.is_warping());
        // Tiny wiggle below the threshold, then release before the delay.
        let action = m.pointer_move(Pos2::new(11.0, 10.0), after(now, 10));
        assert_eq!(action, InputAction::None);
        assert_eq!(m.pointer_up(), InputAction::None);
    }

    #[test]
    fn touch_engages_after_distance_and_delay() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Touch, false, false, now);

        // Past the distance threshold but before the timer: still gated.
        let action = m.pointer_move(Pos2::new(30.0, 10.0), after(now, 5));
        assert_eq!(action, InputAction::None);
        assert!(!m.is_warping());

        // After both gates: the first step starts from the current finger
        // position, not the anchor.
        let action = m.pointer_move(Pos2::new(40.0, 10.0), after(now, 120));
        assert!(matches!(action, InputAction::WarpStep { .. }));
        assert!(m.is_warping());
        assert_eq!(m.pointer_up(), InputAction::CommitStroke);
    }

    #[test]
    fn touch_engages_via_tick_when_held_still() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Touch, false, false, now);
        m.pointer_move(Pos2::new(30.0, 10.0), after(now, 5));
        assert!(!m.is_warping());
        m.tick(after(now, 120));
        assert!(m.is_warping());
    }

    #[test]
    fn space_pan_takes_priority_over_warp() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Mouse, true, false, now);
        assert_eq!(m.state(), InteractionState::Panning);
        let action = m.pointer_move(Pos2::new(15.0, 12.0), now);
        assert_eq!(action, InputAction::Pan(Vec2::new(5.0, 2.0)));
        assert_eq!(m.pointer_up(), InputAction::None);
    }

    #[test]
    fn compare_mode_blocks_stroke_initiation() {
        let mut m = InteractionMachine::new();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Mouse, false, true, t0());
        assert_eq!(m.state(), InteractionState::Idle);
    }

    #[test]
    fn second_touch_preempts_warping_and_halts_steps() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Mouse, false, false, now);
        m.pointer_move(Pos2::new(20.0, 10.0), now);
        assert!(m.is_warping());

        // The in-flight stroke commits at preemption, then no further steps.
        assert_eq!(m.second_touch_down(), InputAction::CommitStroke);
        assert_eq!(m.state(), InteractionState::TwoFingerGesture);
        assert_eq!(m.pointer_move(Pos2::new(40.0, 10.0), now), InputAction::None);
        assert!(!m.is_warping());
    }

    #[test]
    fn second_touch_cancels_pending_warp_timer() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Touch, false, false, now);
        assert_eq!(m.second_touch_down(), InputAction::None);
        // Even after the delay would have elapsed, nothing engages.
        m.tick(after(now, 500));
        assert!(!m.is_warping());
        assert_eq!(m.state(), InteractionState::TwoFingerGesture);
    }

    #[test]
    fn gesture_end_requires_fresh_pointer_down() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Touch, false, false, now);
        m.second_touch_down();
        m.gesture_end();
        assert_eq!(m.state(), InteractionState::Idle);
        assert_eq!(m.pointer_move(Pos2::new(50.0, 50.0), now), InputAction::None);
    }

    #[test]
    fn cancel_cleans_up_like_pointer_up() {
        let mut m = InteractionMachine::new();
        let now = t0();
        m.pointer_down(Pos2::new(10.0, 10.0), PointerKind::Mouse, false, false, now);
        m.pointer_move(Pos2::new(30.0, 10.0), now);
        // Pointer-out mid-stroke still commits the accumulated passes.
        assert_eq!(m.pointer_cancel(), InputAction::CommitStroke);
        assert_eq!(m.state(), InteractionState::Idle);
    }

    // ---- pointer preview ----

    #[test]
    fn pointer_preview_hidden_during_gesture_and_compare() {
        let mut c = WarpCanvas::new(48.0, 60.0, 50.0);
        c.hover_pos = Some(Pos2::new(100.0, 100.0));
        assert!(c.pointer_preview(1080).is_some());

        c.machine.second_touch_down();
        assert!(c.pointer_preview(1080).is_none());
        c.machine.gesture_end();

        c.compare = true;
        assert!(c.pointer_preview(1080).is_none());
        c.compare = false;
        let (_, diameter) = c.pointer_preview(1080).unwrap();
        assert!((diameter - 120.0).abs() < 1e-3);
    }
}
