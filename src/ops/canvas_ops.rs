// ============================================================================
// CANVAS-LEVEL OPERATIONS: layer and canvas edits that record undo history
// ============================================================================

use egui::Rect;

use crate::canvas::{BlendMode, Document, LayerId};
use crate::components::history::HistoryManager;
use crate::compositor::blend_pixel;
use crate::error::{EditError, EditResult};
use crate::ops::transform::{self, Rotation};
use crate::surface::{PixelSurface, ResampleFilter};

/// Run `op` on the document and, if it succeeds, snapshot the result under
/// `description`. A failed op leaves both document and history untouched.
pub fn do_snapshot_op<T>(
    doc: &mut Document,
    history: &mut HistoryManager,
    description: &str,
    op: impl FnOnce(&mut Document) -> EditResult<T>,
) -> EditResult<T> {
    match op(doc) {
        Ok(out) => {
            history.snapshot(doc, description);
            tracing::info!("{description}");
            Ok(out)
        }
        Err(err) => {
            tracing::warn!("{description} rejected: {err}");
            Err(err)
        }
    }
}

// ---------------------------------------------------------------------------
//  Layer stack
// ---------------------------------------------------------------------------

/// Add a new transparent layer on top; it becomes active.
pub fn add_layer(doc: &mut Document, history: &mut HistoryManager) -> EditResult<LayerId> {
    let name = format!("Layer {}", doc.layer_count() + 1);
    do_snapshot_op(doc, history, "New Layer", |d| d.add_layer(&name))
}

/// Delete a layer (the last remaining layer is kept).
pub fn delete_layer(doc: &mut Document, history: &mut HistoryManager, id: LayerId) -> EditResult<()> {
    do_snapshot_op(doc, history, "Delete Layer", |d| d.delete_layer(id).map(|_| ()))
}

pub fn duplicate_layer(doc: &mut Document, history: &mut HistoryManager, id: LayerId) -> EditResult<LayerId> {
    do_snapshot_op(doc, history, "Duplicate Layer", |d| d.duplicate_layer(id))
}

pub fn toggle_visibility(doc: &mut Document, history: &mut HistoryManager, id: LayerId) -> EditResult<bool> {
    do_snapshot_op(doc, history, "Toggle Visibility", |d| d.toggle_visibility(id))
}

pub fn set_opacity(doc: &mut Document, history: &mut HistoryManager, id: LayerId, value: f32) -> EditResult<f32> {
    do_snapshot_op(doc, history, "Layer Opacity", |d| d.set_opacity(id, value))
}

pub fn set_blend_mode(doc: &mut Document, history: &mut HistoryManager, id: LayerId, mode: BlendMode) -> EditResult<()> {
    do_snapshot_op(doc, history, "Blend Mode", |d| d.set_blend_mode(id, mode))
}

pub fn rename_layer(doc: &mut Document, history: &mut HistoryManager, id: LayerId, name: &str) -> EditResult<()> {
    do_snapshot_op(doc, history, "Rename Layer", |d| d.rename_layer(id, name))
}

pub fn reorder_layer(doc: &mut Document, history: &mut HistoryManager, from: usize, to: usize) -> EditResult<()> {
    do_snapshot_op(doc, history, "Move Layer", |d| d.reorder(from, to))
}

pub fn clear_active_layer(doc: &mut Document, history: &mut HistoryManager) -> EditResult<()> {
    do_snapshot_op(doc, history, "Clear Layer", Document::clear_active_layer)
}

/// Composite `id` onto the layer directly below it using its blend mode and
/// opacity, then remove it. The lower layer becomes active.
pub fn merge_down(doc: &mut Document, history: &mut HistoryManager, id: LayerId) -> EditResult<()> {
    do_snapshot_op(doc, history, "Merge Down", |d| merge_layer_down(d, id))
}

fn merge_layer_down(doc: &mut Document, id: LayerId) -> EditResult<()> {
    let index = doc.index_of(id).ok_or(EditError::LayerNotFound(id))?;
    if index == 0 {
        return Err(EditError::IndexOutOfRange { index, len: doc.layer_count() });
    }
    let top = &doc.layers()[index];
    let below = &doc.layers()[index - 1];
    let below_id = below.id;

    let mut merged: PixelSurface = below.pixels.clone();
    if top.visible {
        let (mode, opacity) = (top.blend_mode, top.opacity);
        for (dst, src) in merged.pixels_mut().chunks_exact_mut(4).zip(top.pixels.pixels().chunks_exact(4)) {
            let out = blend_pixel(
                image::Rgba([dst[0], dst[1], dst[2], dst[3]]),
                image::Rgba([src[0], src[1], src[2], src[3]]),
                mode,
                opacity,
            );
            dst.copy_from_slice(&out.0);
        }
    }

    doc.delete_layer(id)?;
    if let Some(layer) = doc.layer_mut(below_id) {
        layer.pixels = merged;
    }
    doc.set_active_layer(below_id)
}

pub fn flatten(doc: &mut Document, history: &mut HistoryManager) -> EditResult<()> {
    do_snapshot_op(doc, history, "Flatten Image", transform::flatten_image)
}

// ---------------------------------------------------------------------------
//  Whole-canvas transforms
// ---------------------------------------------------------------------------

pub fn resize_image(doc: &mut Document, history: &mut HistoryManager, width: u32, height: u32, filter: ResampleFilter) -> EditResult<()> {
    do_snapshot_op(doc, history, "Resize Image", |d| transform::resize_image(d, width, height, filter))
}

pub fn crop(doc: &mut Document, history: &mut HistoryManager, rect: Rect) -> EditResult<()> {
    do_snapshot_op(doc, history, "Crop", |d| transform::crop(d, rect))
}

pub fn rotate(doc: &mut Document, history: &mut HistoryManager, rotation: Rotation) -> EditResult<()> {
    do_snapshot_op(doc, history, rotation.label(), |d| transform::rotate(d, rotation))
}

pub fn flip_horizontal(doc: &mut Document, history: &mut HistoryManager) -> EditResult<()> {
    do_snapshot_op(doc, history, "Flip Horizontal", |d| {
        transform::flip_horizontal(d);
        Ok(())
    })
}

pub fn flip_vertical(doc: &mut Document, history: &mut HistoryManager) -> EditResult<()> {
    do_snapshot_op(doc, history, "Flip Vertical", |d| {
        transform::flip_vertical(d);
        Ok(())
    })
}

/// Fit an image into the canvas (aspect preserved, centred) as a new
/// topmost, active layer.
pub fn install_image_layer(doc: &mut Document, history: &mut HistoryManager, image: &PixelSurface, name: &str) -> EditResult<LayerId> {
    let fitted = transform::fit_to_canvas(image, doc.width(), doc.height())?;
    install_fitted_layer(doc, history, fitted, name)
}

/// Add a surface already sized to the canvas as the topmost, active layer.
pub fn install_fitted_layer(doc: &mut Document, history: &mut HistoryManager, surface: PixelSurface, name: &str) -> EditResult<LayerId> {
    do_snapshot_op(doc, history, "Insert Image", |d| d.push_layer_surface(name, surface))
}
