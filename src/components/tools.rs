// ============================================================================
// BRUSH ENGINE: turns pointer samples into paint on the active layer
// ============================================================================

use egui::{Pos2, Rect, Vec2, pos2, vec2};
use image::Rgba;

use crate::canvas::{Document, LayerId, SymmetryMode};
use crate::error::{EditError, EditResult};
use crate::surface::{PixelSurface, destination_out, source_over};

/// Largest brush diameter accepted, in document pixels.
pub const MAX_BRUSH_SIZE: f32 = 1000.0;

/// Dots scattered into a textured tip.
const TIP_DOT_COUNT: u32 = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BrushShape {
    #[default]
    Round,
    Square,
    Textured,
}

impl BrushShape {
    pub fn label(&self) -> &'static str {
        match self {
            BrushShape::Round => "Round",
            BrushShape::Square => "Square",
            BrushShape::Textured => "Textured",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushType {
    #[default]
    Pen,
    Marker,
    Spray,
    Eraser,
    Clone,
}

impl BrushType {
    pub fn label(&self) -> &'static str {
        match self {
            BrushType::Pen => "Pen",
            BrushType::Marker => "Marker",
            BrushType::Spray => "Spray",
            BrushType::Eraser => "Eraser",
            BrushType::Clone => "Clone Stamp",
        }
    }

    /// Opacity before flow and falloff are applied.
    pub fn base_alpha(&self) -> f32 {
        match self {
            BrushType::Marker => 0.5,
            _ => 1.0,
        }
    }

    /// History label for a finished stroke of this type.
    pub fn stroke_description(&self) -> &'static str {
        match self {
            BrushType::Pen => "Brush Stroke",
            BrushType::Marker => "Marker Stroke",
            BrushType::Spray => "Spray",
            BrushType::Eraser => "Eraser",
            BrushType::Clone => "Clone Stamp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolProperties {
    /// Diameter in document pixels.
    pub size: f32,
    pub shape: BrushShape,
    pub color: Rgba<u8>,
    pub brush_type: BrushType,
    /// 0–100, scales the per-sample opacity.
    pub flow: f32,
    /// Positional noise: each sample moves by up to ±jitter/2 per axis.
    pub jitter: f32,
    /// 0–100. Paint fades out over a stroke length of 2000/falloff pixels.
    pub falloff: f32,
    pub symmetry: SymmetryMode,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            size: 10.0,
            shape: BrushShape::Round,
            color: Rgba([0, 0, 0, 255]),
            brush_type: BrushType::Pen,
            flow: 100.0,
            jitter: 0.0,
            falloff: 0.0,
            symmetry: SymmetryMode::None,
        }
    }
}

impl ToolProperties {
    fn radius(&self) -> f32 {
        self.size.clamp(1.0, MAX_BRUSH_SIZE) / 2.0
    }

    /// Stroke length over which falloff fades paint to nothing.
    pub fn falloff_distance(&self) -> Option<f32> {
        (self.falloff > 0.0).then(|| 2000.0 / self.falloff.min(100.0))
    }

    /// baseAlpha(type) × flow/100 × falloff factor at `distance` along the stroke.
    pub fn effective_alpha(&self, distance: f32) -> f32 {
        let falloff = match self.falloff_distance() {
            Some(limit) => (1.0 - distance / limit).max(0.0),
            None => 1.0,
        };
        self.brush_type.base_alpha() * (self.flow.clamp(0.0, 100.0) / 100.0) * falloff
    }

    /// Interval between textured stamps / clone samples along a segment.
    fn stamp_step(&self) -> f32 {
        (self.size / 8.0).max(1.0)
    }
}

/// Clone stamp anchor (document coordinates) and the per-stroke offset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CloneStampState {
    pub source: Option<Pos2>,
    /// Source minus first paint point, fixed on the first sample of a stroke.
    pub offset: Option<Vec2>,
}

// ============================================================================
// RANDOMNESS: integer hash generator, seedable for reproducible strokes
// ============================================================================

fn stamp_hash(a: u32, b: u32, counter: u32) -> u32 {
    let mut h = a
        .wrapping_mul(374761393)
        .wrapping_add(b.wrapping_mul(668265263))
        .wrapping_add(counter.wrapping_mul(1013904223));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StampRng {
    seed: u32,
    counter: u32,
}

impl StampRng {
    pub fn new(seed: u32) -> Self {
        Self { seed, counter: 0 }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.counter = self.counter.wrapping_add(1);
        stamp_hash(self.seed, self.seed.rotate_left(16), self.counter)
    }

    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform in [lo, hi).
    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }
}

// ============================================================================
// TEXTURED TIP CACHE
// ============================================================================

#[derive(Clone, Debug)]
struct BrushTip {
    key: (u32, Rgba<u8>),
    image: PixelSurface,
}

impl BrushTip {
    fn render(size: f32, color: Rgba<u8>) -> EditResult<Self> {
        let side = size.clamp(1.0, MAX_BRUSH_SIZE).ceil() as u32;
        let mut image = PixelSurface::new(side, side)?;
        let key = (size.to_bits(), color);
        let seed = stamp_hash(size.to_bits(), u32::from_le_bytes(color.0), 0x7E47);
        let mut rng = StampRng::new(seed);

        let radius = side as f32 / 2.0;
        let dot_radius = (size / 12.0).max(1.0);
        let dot_color = Rgba([color[0], color[1], color[2], 255]);
        for _ in 0..TIP_DOT_COUNT {
            let r = radius * rng.next_f32().sqrt();
            let theta = std::f32::consts::TAU * rng.next_f32();
            let centre = pos2(radius + r * theta.cos(), radius + r * theta.sin());
            let alpha = rng.range(0.25, 0.6);
            let ink = Ink::Paint(dot_color, alpha);
            paint_segment(&mut image, centre, centre, dot_radius, false, ink);
        }
        Ok(Self { key, image })
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// What a covered pixel receives.
#[derive(Clone, Copy, Debug)]
enum Ink {
    Paint(Rgba<u8>, f32),
    Erase(f32),
}

impl Ink {
    fn new(props: &ToolProperties, alpha: f32) -> Self {
        match props.brush_type {
            BrushType::Eraser => Ink::Erase(alpha),
            _ => Ink::Paint(props.color, alpha),
        }
    }

    #[inline]
    fn apply(self, dst: Rgba<u8>, coverage: f32) -> Rgba<u8> {
        match self {
            Ink::Paint(color, alpha) => source_over(dst, color, alpha * coverage),
            Ink::Erase(alpha) => destination_out(dst, alpha * coverage),
        }
    }
}

/// Inclusive pixel box of pixel centres within `pad` of the segment,
/// clipped to the surface.
fn pixel_box(surface: &PixelSurface, a: Pos2, b: Pos2, pad: f32) -> Option<(u32, u32, u32, u32)> {
    let min_x = (a.x.min(b.x) - pad - 0.5).floor().max(0.0);
    let min_y = (a.y.min(b.y) - pad - 0.5).floor().max(0.0);
    let max_x = (a.x.max(b.x) + pad - 0.5).ceil().min(surface.width() as f32 - 1.0);
    let max_y = (a.y.max(b.y) + pad - 0.5).ceil().min(surface.height() as f32 - 1.0);
    if !(min_x <= max_x && min_y <= max_y) {
        return None;
    }
    Some((min_x as u32, min_y as u32, max_x as u32, max_y as u32))
}

fn pixel_rect(x0: u32, y0: u32, x1: u32, y1: u32) -> Rect {
    Rect::from_min_max(pos2(x0 as f32, y0 as f32), pos2(x1 as f32 + 1.0, y1 as f32 + 1.0))
}

/// Round-capped: is `q` within `r` of segment `ab`?
fn capsule_covers(q: Pos2, a: Pos2, b: Pos2, r: f32) -> bool {
    let ab = b - a;
    let len_sq = ab.length_sq();
    let t = if len_sq > 0.0 { ((q - a).dot(ab) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
    let closest = a + ab * t;
    (q - closest).length_sq() <= r * r
}

/// Square dab: axis-aligned square of half-side `r` centred on `p`.
fn square_covers(q: Pos2, p: Pos2, r: f32) -> bool {
    (q.x - p.x).abs() <= r && (q.y - p.y).abs() <= r
}

/// Square-capped: is `q` inside the segment `ab` stroked at half-width `r`,
/// extended by `r` past both ends? The rectangle follows the segment's
/// direction, so diagonal strokes keep their width.
fn square_capped_covers(q: Pos2, a: Pos2, b: Pos2, r: f32) -> bool {
    let ab = b - a;
    let len = ab.length();
    if len < f32::EPSILON {
        return square_covers(q, a, r);
    }
    let dir = ab / len;
    let rel = q - a;
    let along = rel.dot(dir);
    let across = rel.x * dir.y - rel.y * dir.x;
    across.abs() <= r && (-r..=len + r).contains(&along)
}

/// Hard-edged line segment (or dab when `a == b`). Each covered pixel is
/// touched once. Returns the painted pixel bounds.
fn paint_segment(surface: &mut PixelSurface, a: Pos2, b: Pos2, radius: f32, square: bool, ink: Ink) -> Rect {
    // Keep tiny brushes from falling between pixel centres
    let r = radius.max(0.75);
    // Oriented square caps reach r·√2 from the endpoints
    let pad = if square { r * std::f32::consts::SQRT_2 } else { r };
    let Some((x0, y0, x1, y1)) = pixel_box(surface, a, b, pad) else {
        return Rect::NOTHING;
    };
    let mut dirty = Rect::NOTHING;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let q = pos2(x as f32 + 0.5, y as f32 + 0.5);
            let covered = if square {
                square_capped_covers(q, a, b, r)
            } else {
                capsule_covers(q, a, b, r)
            };
            if !covered {
                continue;
            }
            if let Some(px) = surface.pixel_mut(x, y) {
                *px = ink.apply(*px, 1.0);
            }
            dirty = dirty.union(pixel_rect(x, y, x, y));
        }
    }
    dirty
}

/// Stamp the cached tip centred on `p`.
fn stamp_tip(surface: &mut PixelSurface, tip: &PixelSurface, p: Pos2, ink: Ink) -> Rect {
    let side = tip.width() as i64;
    let left = (p.x - side as f32 / 2.0).round() as i64;
    let top = (p.y - side as f32 / 2.0).round() as i64;
    let mut dirty = Rect::NOTHING;
    for ty in 0..side {
        let y = top + ty;
        if y < 0 || y >= surface.height() as i64 {
            continue;
        }
        for tx in 0..side {
            let x = left + tx;
            if x < 0 || x >= surface.width() as i64 {
                continue;
            }
            let texel = tip.get_pixel(tx as u32, ty as u32);
            if texel[3] == 0 {
                continue;
            }
            let coverage = texel[3] as f32 / 255.0;
            if let Some(px) = surface.pixel_mut(x as u32, y as u32) {
                *px = ink.apply(*px, coverage);
            }
            dirty = dirty.union(pixel_rect(x as u32, y as u32, x as u32, y as u32));
        }
    }
    dirty
}

/// Scatter 1–2px dots uniformly over the brush disc around `p`.
fn spray_at(surface: &mut PixelSurface, props: &ToolProperties, p: Pos2, alpha: f32, rng: &mut StampRng) -> Rect {
    let radius = props.radius();
    let count = ((props.size * props.flow.clamp(0.0, 100.0) / 100.0 / 2.0).round() as u32).max(1);
    let mut dirty = Rect::NOTHING;
    for _ in 0..count {
        let r = radius * rng.next_f32().sqrt();
        let theta = std::f32::consts::TAU * rng.next_f32();
        let dot = if rng.next_u32() & 1 == 0 { 1 } else { 2 };
        let dot_alpha = alpha * rng.range(0.2, 1.0);
        let x = (p.x + r * theta.cos()).floor() as i64;
        let y = (p.y + r * theta.sin()).floor() as i64;
        for dy in 0..dot {
            for dx in 0..dot {
                let (px_x, px_y) = (x + dx, y + dy);
                if px_x < 0 || px_y < 0 {
                    continue;
                }
                if let Some(px) = surface.pixel_mut(px_x as u32, px_y as u32) {
                    *px = source_over(*px, props.color, dot_alpha);
                    dirty = dirty.union(pixel_rect(px_x as u32, px_y as u32, px_x as u32, px_y as u32));
                }
            }
        }
    }
    dirty
}

/// Copy the source composite shifted by `offset` into the brush footprint at `p`.
///
/// `source` is the composite captured when the stroke began, not a live
/// recomposite per sample, so a stroke never picks up its own fresh paint.
fn clone_at(surface: &mut PixelSurface, source: &PixelSurface, props: &ToolProperties, p: Pos2, offset: (i64, i64), alpha: f32) -> Rect {
    let r = props.radius().max(0.75);
    let square = props.shape == BrushShape::Square;
    let Some((x0, y0, x1, y1)) = pixel_box(surface, p, p, r) else {
        return Rect::NOTHING;
    };
    let mut dirty = Rect::NOTHING;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let q = pos2(x as f32 + 0.5, y as f32 + 0.5);
            let covered = if square {
                square_covers(q, p, r)
            } else {
                capsule_covers(q, p, p, r)
            };
            if !covered {
                continue;
            }
            let src = source.get_pixel_i(x as i64 + offset.0, y as i64 + offset.1);
            if src[3] == 0 {
                continue;
            }
            if let Some(px) = surface.pixel_mut(x, y) {
                *px = source_over(*px, src, alpha);
            }
            dirty = dirty.union(pixel_rect(x, y, x, y));
        }
    }
    dirty
}

/// Evenly spaced points along `a → b` at roughly `step` intervals,
/// excluding `a` itself (already painted by the previous sample).
fn steps_along(a: Pos2, b: Pos2, step: f32) -> impl Iterator<Item = Pos2> {
    let dist = a.distance(b);
    let n = if dist < 0.1 { 0 } else { (dist / step).ceil() as u32 };
    (1..=n).map(move |i| a + (b - a) * (i as f32 / n as f32))
}

// ============================================================================
// STROKE STATE
// ============================================================================

#[derive(Debug)]
struct StrokeState {
    layer: LayerId,
    /// Last painted point per symmetry replica.
    last_points: Vec<Pos2>,
    last_raw: Pos2,
    distance: f32,
    /// Composite captured at pointer-down, used by clone strokes.
    clone_source: Option<PixelSurface>,
    clone_offset: Option<(i64, i64)>,
    painted: bool,
}

// ============================================================================
// BRUSH ENGINE
// ============================================================================

#[derive(Debug)]
pub struct BrushEngine {
    pub properties: ToolProperties,
    pub clone_stamp: CloneStampState,
    tip: Option<BrushTip>,
    rng: StampRng,
    stroke: Option<StrokeState>,
}

impl Default for BrushEngine {
    fn default() -> Self {
        Self::new(ToolProperties::default())
    }
}

impl BrushEngine {
    pub fn new(properties: ToolProperties) -> Self {
        Self::with_seed(properties, 0x9E37_79B9)
    }

    /// Engine whose jitter/spray/tip randomness is reproducible from `seed`.
    pub fn with_seed(properties: ToolProperties, seed: u32) -> Self {
        Self {
            properties,
            clone_stamp: CloneStampState::default(),
            tip: None,
            rng: StampRng::new(seed),
            stroke: None,
        }
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// Anchor the clone source (document coordinates). Nothing is painted.
    pub fn set_clone_source(&mut self, p: Pos2) {
        self.clone_stamp.source = Some(p);
        self.clone_stamp.offset = None;
        tracing::debug!(x = p.x, y = p.y, "Clone source set");
    }

    /// Whether the next stroke needs a composite snapshot to sample from.
    pub fn needs_composite(&self) -> bool {
        self.properties.brush_type == BrushType::Clone && self.clone_stamp.source.is_some()
    }

    /// Pointer-down: start a stroke on the active layer and paint the first dab.
    /// `composite` is only consulted by clone strokes.
    ///
    /// Fails with [`EditError::StrokeInProgress`] while an earlier stroke is
    /// still open; end it first so its history entry is not lost.
    pub fn begin_stroke(&mut self, doc: &mut Document, p: Pos2, composite: Option<PixelSurface>) -> EditResult<Option<Rect>> {
        if self.stroke.is_some() {
            return Err(EditError::StrokeInProgress);
        }
        let layer = doc.active_layer_id().ok_or(EditError::NoActiveLayer)?;

        let clone_offset = match (self.properties.brush_type, self.clone_stamp.source) {
            (BrushType::Clone, Some(source)) => {
                let offset = source - p;
                self.clone_stamp.offset = Some(offset);
                Some((offset.x.round() as i64, offset.y.round() as i64))
            }
            (BrushType::Clone, None) => {
                tracing::debug!("Clone stroke without a source point; nothing painted");
                None
            }
            _ => None,
        };

        let point = self.jittered(p);
        let replicas = self.properties.symmetry.replicas(point, doc.width(), doc.height());
        self.stroke = Some(StrokeState {
            layer,
            last_points: replicas.clone(),
            last_raw: p,
            distance: 0.0,
            clone_source: composite,
            clone_offset,
            painted: false,
        });

        let segments: Vec<(Pos2, Pos2)> = replicas.iter().map(|q| (*q, *q)).collect();
        Ok(self.paint(doc, &segments, true))
    }

    /// Pointer-move while a stroke is active. Returns the region that changed.
    pub fn stroke_to(&mut self, doc: &mut Document, p: Pos2) -> Option<Rect> {
        let point = self.jittered(p);
        let stroke = self.stroke.as_mut()?;
        stroke.distance += stroke.last_raw.distance(p);
        stroke.last_raw = p;

        let replicas = self.properties.symmetry.replicas(point, doc.width(), doc.height());
        let segments: Vec<(Pos2, Pos2)> = stroke
            .last_points
            .iter()
            .zip(&replicas)
            .map(|(a, b)| (*a, *b))
            .collect();
        stroke.last_points = replicas;
        self.paint(doc, &segments, false)
    }

    /// Pointer-up/leave. Returns the history description if anything was
    /// painted during the stroke.
    pub fn end_stroke(&mut self) -> Option<&'static str> {
        let stroke = self.stroke.take()?;
        self.clone_stamp.offset = None;
        tracing::debug!(distance = stroke.distance, painted = stroke.painted, "Stroke ended");
        stroke
            .painted
            .then(|| self.properties.brush_type.stroke_description())
    }

    fn jittered(&mut self, p: Pos2) -> Pos2 {
        let j = self.properties.jitter;
        if j <= 0.0 {
            return p;
        }
        let dx = self.rng.range(-j / 2.0, j / 2.0);
        let dy = self.rng.range(-j / 2.0, j / 2.0);
        p + vec2(dx, dy)
    }

    fn ensure_tip(&mut self) -> EditResult<()> {
        let props = &self.properties;
        let key = (props.size.to_bits(), props.color);
        if self.tip.as_ref().is_some_and(|t| t.key == key) {
            return Ok(());
        }
        self.tip = Some(BrushTip::render(props.size, props.color)?);
        Ok(())
    }

    /// Dispatch one sample's segments (one per replica) by type and shape.
    fn paint(&mut self, doc: &mut Document, segments: &[(Pos2, Pos2)], first: bool) -> Option<Rect> {
        if self.properties.shape == BrushShape::Textured && !matches!(self.properties.brush_type, BrushType::Spray | BrushType::Clone) {
            if let Err(err) = self.ensure_tip() {
                tracing::warn!("Brush tip unavailable: {err}");
                return None;
            }
        }

        let props = self.properties;
        let stroke = self.stroke.as_mut()?;
        let Some(layer) = doc.layer_mut(stroke.layer) else {
            tracing::warn!(layer = %stroke.layer, "Stroke target layer vanished");
            return None;
        };
        let surface = &mut layer.pixels;
        let alpha = props.effective_alpha(stroke.distance);
        let ink = Ink::new(&props, alpha);
        let mut dirty = Rect::NOTHING;

        match props.brush_type {
            BrushType::Spray => {
                for (_, b) in segments {
                    dirty = dirty.union(spray_at(surface, &props, *b, alpha, &mut self.rng));
                }
            }
            BrushType::Clone => {
                let (Some(source), Some(offset)) = (stroke.clone_source.as_ref(), stroke.clone_offset) else {
                    return None;
                };
                // Primary point only; replicas would sample unrelated regions.
                let (a, b) = segments.first().copied()?;
                if first {
                    dirty = dirty.union(clone_at(surface, source, &props, b, offset, alpha));
                }
                for q in steps_along(a, b, props.stamp_step()) {
                    dirty = dirty.union(clone_at(surface, source, &props, q, offset, alpha));
                }
            }
            _ => match (props.shape, self.tip.as_ref()) {
                (BrushShape::Textured, Some(tip)) => {
                    for (a, b) in segments {
                        if first {
                            dirty = dirty.union(stamp_tip(surface, &tip.image, *b, ink));
                        }
                        for q in steps_along(*a, *b, props.stamp_step()) {
                            dirty = dirty.union(stamp_tip(surface, &tip.image, q, ink));
                        }
                    }
                }
                (shape, _) => {
                    let square = shape == BrushShape::Square;
                    for (a, b) in segments {
                        dirty = dirty.union(paint_segment(surface, *a, *b, props.radius(), square, ink));
                    }
                }
            },
        }

        if dirty.min.x <= dirty.max.x && dirty.min.y <= dirty.max.y {
            stroke.painted = true;
            Some(dirty)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn engine(props: ToolProperties) -> BrushEngine {
        BrushEngine::with_seed(props, 7)
    }

    fn alpha_at(doc: &Document, x: u32, y: u32) -> u8 {
        doc.active_pixel(x, y).map(|p| p[3]).unwrap_or(0)
    }

    #[test]
    fn single_dab_paints_disc() {
        let mut doc = Document::new(50, 50).unwrap();
        let mut brush = engine(ToolProperties { color: RED, ..Default::default() });
        let dirty = brush.begin_stroke(&mut doc, pos2(25.0, 25.0), None).unwrap();
        assert!(dirty.is_some());
        assert_eq!(doc.active_pixel(25, 25), Some(RED));
        assert_eq!(doc.active_pixel(22, 25), Some(RED));
        assert_eq!(alpha_at(&doc, 31, 25), 0);
        assert_eq!(brush.end_stroke(), Some("Brush Stroke"));
    }

    #[test]
    fn segment_connects_samples() {
        let mut doc = Document::new(40, 10).unwrap();
        let mut brush = engine(ToolProperties { size: 2.0, ..Default::default() });
        brush.begin_stroke(&mut doc, pos2(5.0, 5.0), None).unwrap();
        brush.stroke_to(&mut doc, pos2(35.0, 5.0));
        for x in 5..35 {
            assert_eq!(alpha_at(&doc, x, 4), 255, "x={x}");
        }
        assert_eq!(alpha_at(&doc, 20, 8), 0);
    }

    #[test]
    fn square_shape_fills_corners() {
        let mut doc = Document::new(20, 20).unwrap();
        let props = ToolProperties { shape: BrushShape::Square, size: 6.0, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(10.0, 10.0), None).unwrap();
        assert_eq!(alpha_at(&doc, 7, 7), 255);
        assert_eq!(alpha_at(&doc, 12, 12), 255);
        assert_eq!(alpha_at(&doc, 13, 13), 0);

        let mut round = Document::new(20, 20).unwrap();
        let mut brush = engine(ToolProperties { size: 6.0, ..Default::default() });
        brush.begin_stroke(&mut round, pos2(10.0, 10.0), None).unwrap();
        assert_eq!(alpha_at(&round, 7, 7), 0);
    }

    #[test]
    fn diagonal_square_stroke_keeps_its_width() {
        let mut doc = Document::new(80, 80).unwrap();
        let props = ToolProperties { shape: BrushShape::Square, size: 10.0, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(20.0, 20.0), None).unwrap();
        brush.stroke_to(&mut doc, pos2(60.0, 60.0));
        assert_eq!(alpha_at(&doc, 40, 40), 255);
        // 2.8px from the line
        assert_eq!(alpha_at(&doc, 42, 38), 255);
        // 6.4px from the line, outside a half-width of 5
        assert_eq!(alpha_at(&doc, 44, 35), 0);
        assert_eq!(alpha_at(&doc, 35, 44), 0);
        // square cap runs 5px past the end along the stroke direction
        assert_eq!(alpha_at(&doc, 63, 63), 255);
        assert_eq!(alpha_at(&doc, 64, 64), 0);
    }

    #[test]
    fn marker_paints_half_alpha() {
        let mut doc = Document::new(10, 10).unwrap();
        let props = ToolProperties { brush_type: BrushType::Marker, color: RED, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(5.0, 5.0), None).unwrap();
        assert_eq!(alpha_at(&doc, 5, 5), 128);
    }

    #[test]
    fn eraser_removes_alpha() {
        let mut doc = Document::new(10, 10).unwrap();
        doc.active_layer_mut().unwrap().pixels.fill(RED);
        let props = ToolProperties { brush_type: BrushType::Eraser, size: 4.0, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(5.0, 5.0), None).unwrap();
        assert_eq!(alpha_at(&doc, 5, 5), 0);
        assert_eq!(alpha_at(&doc, 0, 0), 255);
        assert_eq!(brush.end_stroke(), Some("Eraser"));
    }

    #[test]
    fn flow_and_falloff_scale_alpha() {
        let props = ToolProperties { flow: 50.0, falloff: 20.0, ..Default::default() };
        assert_eq!(props.falloff_distance(), Some(100.0));
        assert!((props.effective_alpha(0.0) - 0.5).abs() < 1e-6);
        assert!((props.effective_alpha(50.0) - 0.25).abs() < 1e-6);
        assert_eq!(props.effective_alpha(150.0), 0.0);
        assert_eq!(ToolProperties::default().effective_alpha(1e6), 1.0);
    }

    #[test]
    fn falloff_fades_long_strokes() {
        let mut doc = Document::new(200, 10).unwrap();
        let props = ToolProperties { size: 2.0, falloff: 100.0, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(1.0, 5.0), None).unwrap();
        brush.stroke_to(&mut doc, pos2(100.0, 5.0));
        assert_eq!(alpha_at(&doc, 1, 4), 255);
        // 20px falloff distance: painted nothing on the long segment
        assert_eq!(alpha_at(&doc, 60, 4), 0);
    }

    #[test]
    fn vertical_symmetry_mirrors_dab() {
        let mut doc = Document::new(40, 20).unwrap();
        let props = ToolProperties { size: 2.0, symmetry: SymmetryMode::Vertical, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(10.5, 10.5), None).unwrap();
        assert_eq!(alpha_at(&doc, 10, 10), 255);
        assert_eq!(alpha_at(&doc, 29, 10), 255);
    }

    #[test]
    fn spray_is_reproducible_and_bounded() {
        let props = ToolProperties { brush_type: BrushType::Spray, size: 20.0, ..Default::default() };
        let mut a = Document::new(60, 60).unwrap();
        let mut b = Document::new(60, 60).unwrap();
        engine(props).begin_stroke(&mut a, pos2(30.0, 30.0), None).unwrap();
        engine(props).begin_stroke(&mut b, pos2(30.0, 30.0), None).unwrap();
        assert_eq!(a.layers()[0].pixels, b.layers()[0].pixels);

        let painted: Vec<(u32, u32)> = (0..60)
            .flat_map(|y| (0..60).map(move |x| (x, y)))
            .filter(|(x, y)| alpha_at(&a, *x, *y) > 0)
            .collect();
        assert!(!painted.is_empty() && painted.len() <= 40);
        for (x, y) in painted {
            assert!((x as f32 - 30.0).abs() <= 12.0 && (y as f32 - 30.0).abs() <= 12.0);
        }
    }

    #[test]
    fn textured_tip_is_cached_and_translucent() {
        let mut doc = Document::new(40, 40).unwrap();
        let props = ToolProperties { shape: BrushShape::Textured, size: 16.0, color: RED, ..Default::default() };
        let mut brush = engine(props);
        brush.begin_stroke(&mut doc, pos2(20.0, 20.0), None).unwrap();
        let key = brush.tip.as_ref().map(|t| t.key);
        brush.stroke_to(&mut doc, pos2(24.0, 20.0));
        assert_eq!(brush.tip.as_ref().map(|t| t.key), key);
        let max_alpha = doc.layers()[0].pixels.pixels().chunks(4).map(|p| p[3]).max().unwrap();
        assert!(max_alpha > 0);

        brush.properties.size = 8.0;
        brush.stroke_to(&mut doc, pos2(26.0, 20.0));
        assert_ne!(brush.tip.as_ref().map(|t| t.key), key);
    }

    #[test]
    fn clone_copies_offset_composite() {
        let mut doc = Document::new(60, 60).unwrap();
        let mut composite = PixelSurface::new(60, 60).unwrap();
        composite.put_pixel(20, 20, Rgba([0, 200, 0, 255]));
        composite.put_pixel(25, 20, Rgba([0, 0, 200, 255]));

        let props = ToolProperties { brush_type: BrushType::Clone, size: 2.0, ..Default::default() };
        let mut brush = engine(props);
        brush.set_clone_source(pos2(10.0, 10.0));
        assert!(brush.needs_composite());
        brush.begin_stroke(&mut doc, pos2(30.0, 30.0), Some(composite)).unwrap();
        assert_eq!(brush.clone_stamp.offset, Some(vec2(-20.0, -20.0)));
        brush.stroke_to(&mut doc, pos2(40.5, 40.5));
        assert_eq!(doc.active_pixel(40, 40), Some(Rgba([0, 200, 0, 255])));
        brush.stroke_to(&mut doc, pos2(45.5, 40.5));
        assert_eq!(doc.active_pixel(45, 40), Some(Rgba([0, 0, 200, 255])));

        assert_eq!(brush.end_stroke(), Some("Clone Stamp"));
        assert_eq!(brush.clone_stamp.offset, None);
        assert_eq!(brush.clone_stamp.source, Some(pos2(10.0, 10.0)));
    }

    #[test]
    fn clone_without_source_paints_nothing() {
        let mut doc = Document::new(10, 10).unwrap();
        let props = ToolProperties { brush_type: BrushType::Clone, ..Default::default() };
        let mut brush = engine(props);
        assert_eq!(brush.begin_stroke(&mut doc, pos2(5.0, 5.0), None).unwrap(), None);
        assert_eq!(brush.end_stroke(), None);
    }

    #[test]
    fn begin_without_active_layer_fails() {
        let mut doc = Document::empty(10, 10).unwrap();
        let mut brush = BrushEngine::default();
        assert!(matches!(
            brush.begin_stroke(&mut doc, pos2(1.0, 1.0), None),
            Err(EditError::NoActiveLayer)
        ));
        assert!(!brush.is_stroking());
    }

    #[test]
    fn second_begin_is_refused_until_the_stroke_ends() {
        let mut doc = Document::new(20, 20).unwrap();
        let mut brush = engine(ToolProperties::default());
        brush.begin_stroke(&mut doc, pos2(5.0, 5.0), None).unwrap();
        assert!(matches!(
            brush.begin_stroke(&mut doc, pos2(15.0, 15.0), None),
            Err(EditError::StrokeInProgress)
        ));
        assert_eq!(alpha_at(&doc, 15, 15), 0);
        assert_eq!(brush.end_stroke(), Some("Brush Stroke"));
        assert!(brush.begin_stroke(&mut doc, pos2(15.0, 15.0), None).is_ok());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut brush = engine(ToolProperties { jitter: 6.0, ..Default::default() });
        for _ in 0..200 {
            let p = brush.jittered(pos2(50.0, 50.0));
            assert!((p.x - 50.0).abs() <= 3.0 && (p.y - 50.0).abs() <= 3.0);
        }
    }
}
