// ============================================================================
// TRANSFORM OPERATIONS: resize, crop, rotate, flip and flatten the canvas
// ============================================================================
//
// Every whole-canvas transform builds all new layer surfaces first and only
// swaps them into the document once every allocation has succeeded.

use egui::{Rect, pos2, vec2};
use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{Document, Layer};
use crate::compositor::{CompositeOptions, compose};
use crate::error::{EditError, EditResult};
use crate::surface::{PixelSurface, ResampleFilter, check_dimensions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Cw90,
    Ccw90,
    Half,
}

impl Rotation {
    pub fn label(&self) -> &'static str {
        match self {
            Rotation::Cw90 => "Rotate 90° CW",
            Rotation::Ccw90 => "Rotate 90° CCW",
            Rotation::Half => "Rotate 180°",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "cw" | "90" | "cw90" => Some(Rotation::Cw90),
            "ccw" | "-90" | "270" | "ccw90" => Some(Rotation::Ccw90),
            "180" | "half" => Some(Rotation::Half),
            _ => None,
        }
    }

    fn swaps_axes(self) -> bool {
        !matches!(self, Rotation::Half)
    }
}

/// Collect per-layer results; any failure aborts the whole transform.
fn rebuild_all<F>(doc: &Document, f: F) -> EditResult<Vec<PixelSurface>>
where
    F: Fn(&PixelSurface) -> EditResult<PixelSurface> + Sync + Send,
{
    doc.layers().par_iter().map(|layer| f(&layer.pixels)).collect()
}

// ---------------------------------------------------------------------------
//  Whole-canvas transforms (affect ALL layers)
// ---------------------------------------------------------------------------

/// Resample every layer to `new_w × new_h`.
pub fn resize_image(doc: &mut Document, new_w: u32, new_h: u32, filter: ResampleFilter) -> EditResult<()> {
    check_dimensions(new_w, new_h)?;
    let surfaces = rebuild_all(doc, |px| px.resized(new_w, new_h, filter))?;
    tracing::info!(from_w = doc.width(), from_h = doc.height(), new_w, new_h, filter = filter.name(), "Resize image");
    doc.replace_surfaces(new_w, new_h, surfaces);
    Ok(())
}

/// Crop every layer to `rect`. Position and size are floored; the region
/// may extend past the canvas, in which case the overhang is transparent.
pub fn crop(doc: &mut Document, rect: Rect) -> EditResult<()> {
    let x = rect.min.x.floor();
    let y = rect.min.y.floor();
    let w = rect.width().floor();
    let h = rect.height().floor();
    if !(w >= 1.0 && h >= 1.0) {
        return Err(EditError::InvalidGeometry { width: w as i64, height: h as i64 });
    }
    let (x, y, w, h) = (x as i64, y as i64, w as u32, h as u32);
    check_dimensions(w, h)?;
    let surfaces = rebuild_all(doc, |px| px.cropped(x, y, w, h))?;
    tracing::info!(x, y, w, h, "Crop");
    doc.replace_surfaces(w, h, surfaces);
    Ok(())
}

/// Rotate the canvas; quarter turns swap width and height.
pub fn rotate(doc: &mut Document, rotation: Rotation) -> EditResult<()> {
    let surfaces: Vec<PixelSurface> = doc
        .layers()
        .par_iter()
        .map(|layer| match rotation {
            Rotation::Cw90 => layer.pixels.rotated_90_cw(),
            Rotation::Ccw90 => layer.pixels.rotated_90_ccw(),
            Rotation::Half => layer.pixels.rotated_180(),
        })
        .collect();
    let (w, h) = if rotation.swaps_axes() {
        (doc.height(), doc.width())
    } else {
        (doc.width(), doc.height())
    };
    tracing::info!(rotation = rotation.label(), "Rotate canvas");
    doc.replace_surfaces(w, h, surfaces);
    Ok(())
}

/// Mirror the entire canvas left↔right.
pub fn flip_horizontal(doc: &mut Document) {
    let surfaces = doc.layers().par_iter().map(|l| l.pixels.flipped_horizontal()).collect();
    doc.replace_surfaces(doc.width(), doc.height(), surfaces);
}

/// Mirror the entire canvas top↔bottom.
pub fn flip_vertical(doc: &mut Document) {
    let surfaces = doc.layers().par_iter().map(|l| l.pixels.flipped_vertical()).collect();
    doc.replace_surfaces(doc.width(), doc.height(), surfaces);
}

/// Flatten all visible layers into a single "Background" layer.
pub fn flatten_image(doc: &mut Document) -> EditResult<()> {
    let opts = CompositeOptions {
        background: Rgba([0, 0, 0, 0]),
        preview_blend: None,
    };
    let flat = compose(doc, &opts)?;
    let id = doc.allocate_id();
    let (w, h) = (doc.width(), doc.height());
    doc.replace_all(w, h, vec![Layer::new(id, "Background", flat)]);
    Ok(())
}

// ---------------------------------------------------------------------------
//  Placing external images
// ---------------------------------------------------------------------------

/// Scale `image` to fit inside `width × height` preserving aspect ratio,
/// centred on a transparent surface of exactly that size.
pub fn fit_to_canvas(image: &PixelSurface, width: u32, height: u32) -> EditResult<PixelSurface> {
    let mut out = PixelSurface::new(width, height)?;
    let (iw, ih) = (image.width() as f32, image.height() as f32);
    let scale = (width as f32 / iw).min(height as f32 / ih);
    let (dw, dh) = (iw * scale, ih * scale);
    let origin = pos2((width as f32 - dw) / 2.0, (height as f32 - dh) / 2.0);
    let filter = if image.dimensions() == (width, height) {
        ResampleFilter::Nearest
    } else {
        ResampleFilter::Bilinear
    };
    out.draw_image(image, image.bounds(), Rect::from_min_size(origin, vec2(dw, dh)), filter);
    Ok(out)
}
