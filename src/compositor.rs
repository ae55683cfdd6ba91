// ============================================================================
// COMPOSITOR: flattens the layer stack and schedules redraws on a dirty flag
// ============================================================================

use egui::Rect;
use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{BlendMode, Document};
use crate::error::EditResult;
use crate::surface::PixelSurface;

// ============================================================================
// PIXEL BLENDING
// ============================================================================

/// Composite `top` onto `base` with `mode`, scaling `top`'s alpha by
/// `opacity`. Straight alpha in and out.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fully transparent top pixel: nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    // Normal, fully opaque: plain overwrite
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let cb = [base[0] as f32 / 255.0, base[1] as f32 / 255.0, base[2] as f32 / 255.0];
    let ab = base[3] as f32 / 255.0;
    let cs = [top[0] as f32 / 255.0, top[1] as f32 / 255.0, top[2] as f32 / 255.0];
    let a_s = (top[3] as f32 / 255.0) * opacity;

    let mixed = blend_color(cb, cs, mode);

    // cs' = (1 - ab)·cs + ab·B(cb, cs), then source-over.
    let out_a = a_s + ab * (1.0 - a_s);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let src = (1.0 - ab) * cs[c] + ab * mixed[c];
        let v = (a_s * src + ab * cb[c] * (1.0 - a_s)) / out_a;
        out[c] = to_u8(v);
    }
    out[3] = to_u8(out_a);
    Rgba(out)
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blend function B(cb, cs) on unit-range RGB.
fn blend_color(cb: [f32; 3], cs: [f32; 3], mode: BlendMode) -> [f32; 3] {
    let sep = |f: fn(f32, f32) -> f32| per_channel(cb, cs, f);
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => sep(multiply),
        BlendMode::Screen => sep(screen),
        BlendMode::Overlay => sep(overlay),
        BlendMode::Darken => sep(f32::min),
        BlendMode::Lighten => sep(f32::max),
        BlendMode::ColorDodge => sep(color_dodge),
        BlendMode::ColorBurn => sep(color_burn),
        BlendMode::HardLight => sep(hard_light),
        BlendMode::SoftLight => sep(soft_light),
        BlendMode::Difference => sep(difference),
        BlendMode::Exclusion => sep(exclusion),
        BlendMode::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        BlendMode::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        BlendMode::Color => set_lum(cs, lum(cb)),
        BlendMode::Luminosity => set_lum(cb, lum(cs)),
    }
}

#[inline]
fn per_channel(cb: [f32; 3], cs: [f32; 3], f: fn(f32, f32) -> f32) -> [f32; 3] {
    [f(cb[0], cs[0]), f(cb[1], cs[1]), f(cb[2], cs[2])]
}

fn multiply(b: f32, s: f32) -> f32 {
    b * s
}

fn overlay(b: f32, s: f32) -> f32 {
    hard_light(s, b)
}

fn difference(b: f32, s: f32) -> f32 {
    (b - s).abs()
}

fn exclusion(b: f32, s: f32) -> f32 {
    b + s - 2.0 * b * s
}

fn screen(b: f32, s: f32) -> f32 {
    b + s - b * s
}

fn hard_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 {
        b * 2.0 * s
    } else {
        screen(b, 2.0 * s - 1.0)
    }
}

fn color_dodge(b: f32, s: f32) -> f32 {
    if b <= 0.0 {
        0.0
    } else if s >= 1.0 {
        1.0
    } else {
        (b / (1.0 - s)).min(1.0)
    }
}

fn color_burn(b: f32, s: f32) -> f32 {
    if b >= 1.0 {
        1.0
    } else if s <= 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - b) / s).min(1.0)
    }
}

fn soft_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 {
        b - (1.0 - 2.0 * s) * b * (1.0 - b)
    } else {
        let d = if b <= 0.25 {
            ((16.0 * b - 12.0) * b + 4.0) * b
        } else {
            b.sqrt()
        };
        b + (2.0 * s - 1.0) * (d - b)
    }
}

// ---- non-separable helpers --------------------------------------------------

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|a, b| c[*a].total_cmp(&c[*b]));
    let (min_i, mid_i, max_i) = (idx[0], idx[1], idx[2]);
    let mut out = [0.0f32; 3];
    let range = c[max_i] - c[min_i];
    if range > 0.0 {
        out[mid_i] = (c[mid_i] - c[min_i]) * s / range;
        out[max_i] = s;
    }
    out
}

// ============================================================================
// COMPOSE
// ============================================================================

/// Inputs to a composite besides the document itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositeOptions {
    pub background: Rgba<u8>,
    /// Transient blend mode shown on the active layer while browsing modes.
    pub preview_blend: Option<BlendMode>,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            background: Rgba([0, 0, 0, 255]),
            preview_blend: None,
        }
    }
}

/// Flatten every visible layer, bottom to top, onto the background colour.
/// Pure: an unchanged document always yields the same bytes.
pub fn compose(doc: &Document, opts: &CompositeOptions) -> EditResult<PixelSurface> {
    let mut out = PixelSurface::filled(doc.width(), doc.height(), opts.background)?;
    compose_rows(doc, opts, &mut out, 0, doc.width(), 0, doc.height());
    Ok(out)
}

/// Recompose only pixels inside `[x0, x1) × [y0, y1)` of an existing
/// canvas-sized output.
fn compose_rows(doc: &Document, opts: &CompositeOptions, out: &mut PixelSurface, x0: u32, x1: u32, y0: u32, y1: u32) {
    let width = doc.width() as usize;
    let active = doc.active_layer_id();
    let passes: Vec<(&PixelSurface, BlendMode, f32)> = doc
        .layers()
        .iter()
        .filter(|l| l.visible && l.opacity > 0.0)
        .map(|l| {
            let mode = match opts.preview_blend {
                Some(preview) if Some(l.id) == active => preview,
                _ => l.blend_mode,
            };
            (&l.pixels, mode, l.opacity)
        })
        .collect();
    let bg = opts.background;
    let stride = width * 4;

    out.pixels_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let row_start = y * stride;
            for x in x0 as usize..x1 as usize {
                let mut acc = bg;
                for (pixels, mode, opacity) in &passes {
                    let i = row_start + x * 4;
                    let src = &pixels.pixels()[i..i + 4];
                    acc = blend_pixel(acc, Rgba([src[0], src[1], src[2], src[3]]), *mode, *opacity);
                }
                row[x * 4..x * 4 + 4].copy_from_slice(&acc.0);
            }
        });
}

// ============================================================================
// RENDER SCHEDULER
// ============================================================================

/// Coalesces mutations into at most one recomposite per render tick.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    dirty: bool,
    dirty_rect: Option<Rect>,
    output: Option<PixelSurface>,
    frames_rendered: u64,
    mutations_since_render: u64,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self {
            dirty: true,
            ..Default::default()
        }
    }

    /// Flag the composite as stale. `rect` limits the region that changed;
    /// `None` means the whole canvas.
    pub fn mark_dirty(&mut self, rect: Option<Rect>) {
        self.mutations_since_render += 1;
        self.dirty_rect = match (self.dirty, self.dirty_rect, rect) {
            (false, _, Some(r)) => Some(r),
            (true, Some(existing), Some(r)) => Some(existing.union(r)),
            _ => None,
        };
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn mutations_since_render(&self) -> u64 {
        self.mutations_since_render
    }

    /// Most recent composite, if any has been rendered.
    pub fn last_frame(&self) -> Option<&PixelSurface> {
        self.output.as_ref()
    }

    /// Called once per display refresh. Recomposes only if something changed
    /// since the last tick and returns the fresh frame; otherwise `None`.
    pub fn tick(&mut self, doc: &Document, opts: &CompositeOptions) -> Option<&PixelSurface> {
        if !self.dirty {
            return None;
        }

        let reuse = self
            .output
            .as_ref()
            .is_some_and(|o| o.dimensions() == (doc.width(), doc.height()));
        match (reuse, self.dirty_rect) {
            (true, Some(rect)) => {
                if let Some(out) = self.output.as_mut() {
                    if let Some((x0, y0, x1, y1)) = out.pixel_span(rect.expand(1.0)) {
                        compose_rows(doc, opts, out, x0, x1, y0, y1);
                    }
                }
            }
            _ => match compose(doc, opts) {
                Ok(surface) => self.output = Some(surface),
                Err(err) => {
                    tracing::warn!("Render tick skipped: {err}");
                    return None;
                }
            },
        }

        tracing::debug!(
            frame = self.frames_rendered,
            mutations = self.mutations_since_render,
            partial = self.dirty_rect.is_some(),
            "Recomposited"
        );
        self.dirty = false;
        self.dirty_rect = None;
        self.frames_rendered += 1;
        self.mutations_since_render = 0;
        self.output.as_ref()
    }

    /// Drop the cached frame and force a full recomposite on the next tick.
    pub fn invalidate(&mut self) {
        self.output = None;
        self.mark_dirty(None);
    }
}
