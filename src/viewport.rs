// ============================================================================
// VIEWPORT: pan/zoom state and screen ↔ document coordinate mapping
// ============================================================================
//
// Screen points are in the host's display units (CSS pixels, logical points).
// `SurfaceLayout` maps them onto the display surface's buffer pixels; the
// translation and scale then map buffer pixels onto document pixels:
//
//     local    = (screen − origin) / pixel_ratio
//     document = (local − translation) / scale

use egui::{Pos2, Vec2, pos2, vec2};

/// Where the display surface sits on screen and how many display units one
/// of its buffer pixels covers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceLayout {
    pub origin: Pos2,
    pub pixel_ratio: Vec2,
}

impl Default for SurfaceLayout {
    fn default() -> Self {
        Self {
            origin: Pos2::ZERO,
            pixel_ratio: vec2(1.0, 1.0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PinchState {
    start_distance: f32,
    start_scale: f32,
    /// Document point that was under the midpoint when the pinch began.
    anchor: Pos2,
}

#[derive(Clone, Copy, Debug)]
struct PanState {
    start_local: Pos2,
    start_translation: Vec2,
}

#[derive(Clone, Debug)]
pub struct ViewportTransform {
    pub translation: Vec2,
    scale: f32,
    min_scale: f32,
    max_scale: f32,
    zoom_step: f32,
    pub layout: SurfaceLayout,
    pinch: Option<PinchState>,
    pan: Option<PanState>,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::new(0.1, 10.0, 1.2)
    }
}

impl ViewportTransform {
    pub fn new(min_scale: f32, max_scale: f32, zoom_step: f32) -> Self {
        let min_scale = min_scale.max(f32::EPSILON);
        Self {
            translation: Vec2::ZERO,
            scale: 1.0_f32.clamp(min_scale, max_scale.max(min_scale)),
            min_scale,
            max_scale: max_scale.max(min_scale),
            zoom_step: zoom_step.max(1.0 + f32::EPSILON),
            layout: SurfaceLayout::default(),
            pinch: None,
            pan: None,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = self.clamp_scale(scale);
    }

    fn clamp_scale(&self, scale: f32) -> f32 {
        if scale.is_nan() {
            return self.scale;
        }
        scale.clamp(self.min_scale, self.max_scale)
    }

    // ---- mapping ------------------------------------------------------------

    fn to_local(&self, screen: Pos2) -> Pos2 {
        let d = screen - self.layout.origin;
        pos2(d.x / self.layout.pixel_ratio.x, d.y / self.layout.pixel_ratio.y)
    }

    fn from_local(&self, local: Pos2) -> Pos2 {
        self.layout.origin + vec2(local.x * self.layout.pixel_ratio.x, local.y * self.layout.pixel_ratio.y)
    }

    pub fn screen_to_document(&self, screen: Pos2) -> Pos2 {
        let local = self.to_local(screen);
        pos2(
            (local.x - self.translation.x) / self.scale,
            (local.y - self.translation.y) / self.scale,
        )
    }

    pub fn document_to_screen(&self, doc: Pos2) -> Pos2 {
        self.from_local(pos2(
            doc.x * self.scale + self.translation.x,
            doc.y * self.scale + self.translation.y,
        ))
    }

    /// Translation that puts document point `doc` under local point `local`.
    fn translation_for(&self, doc: Pos2, local: Pos2) -> Vec2 {
        vec2(local.x - doc.x * self.scale, local.y - doc.y * self.scale)
    }

    // ---- zoom ---------------------------------------------------------------

    pub fn zoom_in(&mut self) {
        self.scale = self.clamp_scale(self.scale * self.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.scale = self.clamp_scale(self.scale / self.zoom_step);
    }

    /// Zoom while keeping the document point under `anchor` (screen) fixed.
    pub fn zoom_around(&mut self, factor: f32, anchor: Pos2) {
        let doc = self.screen_to_document(anchor);
        self.scale = self.clamp_scale(self.scale * factor);
        self.translation = self.translation_for(doc, self.to_local(anchor));
    }

    pub fn reset(&mut self) {
        self.translation = Vec2::ZERO;
        self.scale = self.clamp_scale(1.0);
        self.pinch = None;
        self.pan = None;
    }

    /// Scale and centre a `canvas` (document pixels) inside a `container`
    /// (surface buffer pixels).
    pub fn fit_to(&mut self, container: Vec2, canvas: Vec2) {
        if canvas.x <= 0.0 || canvas.y <= 0.0 {
            return;
        }
        self.scale = self.clamp_scale((container.x / canvas.x).min(container.y / canvas.y));
        self.translation = vec2(
            (container.x - canvas.x * self.scale) / 2.0,
            (container.y - canvas.y * self.scale) / 2.0,
        );
    }

    // ---- pinch --------------------------------------------------------------

    pub fn pinch_start(&mut self, a: Pos2, b: Pos2) {
        let distance = a.distance(b);
        if distance <= f32::EPSILON {
            return;
        }
        let mid = pos2((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
        self.pan = None;
        self.pinch = Some(PinchState {
            start_distance: distance,
            start_scale: self.scale,
            anchor: self.screen_to_document(mid),
        });
    }

    /// New scale = start scale × distance ratio, clamped; the document point
    /// under the starting midpoint follows the current midpoint.
    pub fn pinch_update(&mut self, a: Pos2, b: Pos2) {
        let Some(pinch) = self.pinch else { return };
        let distance = a.distance(b);
        let mid = pos2((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
        self.scale = self.clamp_scale(pinch.start_scale * distance / pinch.start_distance);
        self.translation = self.translation_for(pinch.anchor, self.to_local(mid));
    }

    pub fn pinch_end(&mut self) {
        self.pinch = None;
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    // ---- pan ----------------------------------------------------------------

    pub fn pan_start(&mut self, screen: Pos2) {
        self.pan = Some(PanState {
            start_local: self.to_local(screen),
            start_translation: self.translation,
        });
    }

    pub fn pan_update(&mut self, screen: Pos2) {
        let Some(pan) = self.pan else { return };
        self.translation = pan.start_translation + (self.to_local(screen) - pan.start_local);
    }

    pub fn pan_end(&mut self) {
        self.pan = None;
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    /// Pan by a screen-space delta.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.translation += vec2(delta.x / self.layout.pixel_ratio.x, delta.y / self.layout.pixel_ratio.y);
    }
}
