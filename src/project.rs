use egui::{Pos2, Rect, Vec2};
use uuid::Uuid;

use crate::canvas::{BlendMode, Document, LayerId};
use crate::components::history::HistoryManager;
use crate::components::tools::BrushEngine;
use crate::compositor::{self, CompositeOptions, RenderScheduler};
use crate::error::{EditError, EditResult};
use crate::io;
use crate::ops::ai::RemoteEditService;
use crate::ops::canvas_ops;
use crate::ops::gallery::{Artifact, ArtifactStore};
use crate::ops::transform::{self, Rotation};
use crate::settings::EditorSettings;
use crate::surface::{PixelSurface, ResampleFilter};
use crate::viewport::ViewportTransform;

/// One open document plus everything that edits or views it.
///
/// All editing goes through this object; nothing is kept in statics.
pub struct EditorSession {
    pub id: Uuid,
    pub document: Document,
    pub history: HistoryManager,
    pub viewport: ViewportTransform,
    pub brush: BrushEngine,
    pub composite_options: CompositeOptions,
    scheduler: RenderScheduler,
    settings: EditorSettings,
}

impl EditorSession {
    /// Blank document at the configured default size.
    pub fn new(settings: EditorSettings) -> EditResult<Self> {
        let document = Document::new(settings.default_width, settings.default_height)?;
        Ok(Self::from_document(settings, document))
    }

    /// Document sized to a decoded image, with the image drawn on the
    /// background layer before the first snapshot is taken.
    pub fn with_image(settings: EditorSettings, bytes: &[u8]) -> EditResult<Self> {
        let image = io::decode_image(bytes)?;
        let (w, h) = image.dimensions();
        let mut document = Document::new(w, h)?;
        if let Some(layer) = document.active_layer_mut() {
            layer.pixels = image;
        }
        Ok(Self::from_document(settings, document))
    }

    fn from_document(settings: EditorSettings, document: Document) -> Self {
        let mut history = HistoryManager::new(settings.max_undo_steps);
        history.snapshot(&document, "Open");
        let viewport = ViewportTransform::new(settings.zoom_min, settings.zoom_max, settings.zoom_step);
        let composite_options = CompositeOptions {
            background: settings.background,
            preview_blend: None,
        };
        let id = Uuid::new_v4();
        tracing::info!(session = %id, w = document.width(), h = document.height(), "Session opened");
        Self {
            id,
            document,
            history,
            viewport,
            brush: BrushEngine::default(),
            composite_options,
            scheduler: RenderScheduler::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Replace the document with a blank one and start a fresh history.
    pub fn reset(&mut self, width: u32, height: u32) -> EditResult<()> {
        let document = Document::new(width, height)?;
        if self.brush.is_stroking() {
            self.brush.end_stroke();
        }
        self.document = document;
        self.history.clear();
        self.history.snapshot(&self.document, "Open");
        self.viewport.reset();
        self.composite_options.preview_blend = None;
        self.scheduler.invalidate();
        tracing::info!(session = %self.id, width, height, "Session reset");
        Ok(())
    }

    // ---- pointer input ------------------------------------------------------

    /// Start a stroke at a screen point. A stroke still open from a missed
    /// pointer-up is committed first.
    pub fn pointer_down(&mut self, screen: Pos2) -> EditResult<()> {
        self.finish_stroke();
        let p = self.viewport.screen_to_document(screen);
        let composite = if self.brush.needs_composite() {
            Some(compositor::compose(&self.document, &self.composite_options)?)
        } else {
            None
        };
        match self.brush.begin_stroke(&mut self.document, p, composite) {
            Ok(dirty) => {
                self.mark_painted(dirty);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Paint ignored: {err}");
                Err(err)
            }
        }
    }

    pub fn pointer_move(&mut self, screen: Pos2) {
        if !self.brush.is_stroking() {
            return;
        }
        let p = self.viewport.screen_to_document(screen);
        let dirty = self.brush.stroke_to(&mut self.document, p);
        self.mark_painted(dirty);
    }

    /// Finish the stroke; a stroke that painted anything becomes one
    /// history entry.
    pub fn pointer_up(&mut self) {
        if let Some(description) = self.brush.end_stroke() {
            self.history.snapshot(&self.document, description);
        }
    }

    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Anchor the clone source under a screen point.
    pub fn set_clone_source(&mut self, screen: Pos2) {
        let p = self.viewport.screen_to_document(screen);
        self.brush.set_clone_source(p);
    }

    fn mark_painted(&mut self, dirty: Option<Rect>) {
        if let Some(rect) = dirty {
            self.scheduler.mark_dirty(Some(rect));
        }
    }

    // ---- layers -------------------------------------------------------------

    pub fn add_layer(&mut self) -> EditResult<LayerId> {
        let id = canvas_ops::add_layer(&mut self.document, &mut self.history)?;
        self.scheduler.mark_dirty(None);
        Ok(id)
    }

    pub fn delete_layer(&mut self, id: LayerId) -> EditResult<()> {
        canvas_ops::delete_layer(&mut self.document, &mut self.history, id)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn duplicate_layer(&mut self, id: LayerId) -> EditResult<LayerId> {
        let copy = canvas_ops::duplicate_layer(&mut self.document, &mut self.history, id)?;
        self.scheduler.mark_dirty(None);
        Ok(copy)
    }

    /// Selection is not an edit and is not recorded in history.
    pub fn set_active_layer(&mut self, id: LayerId) -> EditResult<()> {
        self.composite_options.preview_blend = None;
        self.document.set_active_layer(id)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> EditResult<bool> {
        let visible = canvas_ops::toggle_visibility(&mut self.document, &mut self.history, id)?;
        self.scheduler.mark_dirty(None);
        Ok(visible)
    }

    pub fn set_opacity(&mut self, id: LayerId, value: f32) -> EditResult<f32> {
        let opacity = canvas_ops::set_opacity(&mut self.document, &mut self.history, id, value)?;
        self.scheduler.mark_dirty(None);
        Ok(opacity)
    }

    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> EditResult<()> {
        canvas_ops::set_blend_mode(&mut self.document, &mut self.history, id, mode)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> EditResult<()> {
        canvas_ops::rename_layer(&mut self.document, &mut self.history, id, name)
    }

    pub fn reorder_layer(&mut self, from: usize, to: usize) -> EditResult<()> {
        canvas_ops::reorder_layer(&mut self.document, &mut self.history, from, to)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn clear_active_layer(&mut self) -> EditResult<()> {
        canvas_ops::clear_active_layer(&mut self.document, &mut self.history)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn merge_down(&mut self, id: LayerId) -> EditResult<()> {
        canvas_ops::merge_down(&mut self.document, &mut self.history, id)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn flatten(&mut self) -> EditResult<()> {
        canvas_ops::flatten(&mut self.document, &mut self.history)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    // ---- blend preview ------------------------------------------------------

    /// Show `mode` on the active layer without touching the document.
    pub fn preview_blend_mode(&mut self, mode: BlendMode) {
        self.composite_options.preview_blend = Some(mode);
        self.scheduler.mark_dirty(None);
    }

    /// Apply the previewed mode to the active layer as a real edit.
    pub fn commit_blend_preview(&mut self) -> EditResult<()> {
        let Some(mode) = self.composite_options.preview_blend.take() else {
            return Ok(());
        };
        let id = self.document.active_layer_id().ok_or(EditError::NoActiveLayer)?;
        self.set_blend_mode(id, mode)
    }

    pub fn cancel_blend_preview(&mut self) {
        if self.composite_options.preview_blend.take().is_some() {
            self.scheduler.mark_dirty(None);
        }
    }

    // ---- canvas transforms --------------------------------------------------

    /// Resize with the configured resample filter.
    pub fn resize_image(&mut self, width: u32, height: u32) -> EditResult<()> {
        let filter = self.settings.resample;
        self.resize_image_with(width, height, filter)
    }

    pub fn resize_image_with(&mut self, width: u32, height: u32, filter: ResampleFilter) -> EditResult<()> {
        canvas_ops::resize_image(&mut self.document, &mut self.history, width, height, filter)?;
        self.scheduler.invalidate();
        Ok(())
    }

    pub fn crop(&mut self, rect: Rect) -> EditResult<()> {
        canvas_ops::crop(&mut self.document, &mut self.history, rect)?;
        self.scheduler.invalidate();
        Ok(())
    }

    pub fn rotate(&mut self, rotation: Rotation) -> EditResult<()> {
        canvas_ops::rotate(&mut self.document, &mut self.history, rotation)?;
        self.scheduler.invalidate();
        Ok(())
    }

    pub fn flip_horizontal(&mut self) -> EditResult<()> {
        canvas_ops::flip_horizontal(&mut self.document, &mut self.history)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    pub fn flip_vertical(&mut self) -> EditResult<()> {
        canvas_ops::flip_vertical(&mut self.document, &mut self.history)?;
        self.scheduler.mark_dirty(None);
        Ok(())
    }

    /// Centre the canvas inside a display surface of `container` buffer pixels.
    pub fn fit_to_view(&mut self, container: Vec2) {
        let canvas = Vec2::new(self.document.width() as f32, self.document.height() as f32);
        self.viewport.fit_to(container, canvas);
    }

    // ---- history ------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        self.finish_stroke();
        let changed = self.history.undo(&mut self.document);
        if changed {
            self.scheduler.invalidate();
            tracing::info!(step = self.history.step(), "Undo");
        }
        changed
    }

    pub fn redo(&mut self) -> bool {
        self.finish_stroke();
        let changed = self.history.redo(&mut self.document);
        if changed {
            self.scheduler.invalidate();
            tracing::info!(step = self.history.step(), "Redo");
        }
        changed
    }

    pub fn undo_to(&mut self, step: usize) -> bool {
        self.finish_stroke();
        let changed = self.history.undo_to(step, &mut self.document);
        if changed {
            self.scheduler.invalidate();
        }
        changed
    }

    /// Commit any in-flight stroke before history moves.
    fn finish_stroke(&mut self) {
        if self.brush.is_stroking() {
            self.pointer_up();
        }
    }

    // ---- rendering ----------------------------------------------------------

    /// Per-frame callback. Recomposes only if something changed since the
    /// last frame.
    pub fn render_tick(&mut self) -> Option<&PixelSurface> {
        self.scheduler.tick(&self.document, &self.composite_options)
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn composite(&self) -> EditResult<PixelSurface> {
        compositor::compose(&self.document, &self.composite_options)
    }

    /// Current composite as PNG bytes.
    pub fn composite_png(&self) -> EditResult<Vec<u8>> {
        io::encode_png(&self.composite()?)
    }

    // ---- collaborators ------------------------------------------------------

    /// Decode an image, fit it into the canvas and add it as the topmost,
    /// active layer.
    pub fn install_result_as_layer(&mut self, bytes: &[u8], name: &str) -> EditResult<LayerId> {
        let image = io::decode_image(bytes)?;
        self.add_image_layer(&image, name)
    }

    /// Same as [`Self::install_result_as_layer`] for an already decoded surface.
    pub fn add_image_layer(&mut self, image: &PixelSurface, name: &str) -> EditResult<LayerId> {
        let id = canvas_ops::install_image_layer(&mut self.document, &mut self.history, image, name)?;
        self.scheduler.mark_dirty(None);
        Ok(id)
    }

    /// Send the composite to a remote edit service and install every image
    /// it returns. A failed request or an empty result leaves the document
    /// and history unchanged.
    pub fn request_remote_edit(&mut self, service: &mut dyn RemoteEditService, prompt: &str) -> EditResult<Vec<LayerId>> {
        let png = self.composite_png()?;
        let results = service.request_edit(&png, prompt).map_err(|err| {
            tracing::warn!("Remote edit failed: {err}");
            EditError::RemoteService(err.to_string())
        })?;
        if results.is_empty() {
            tracing::info!("Remote edit returned no images");
            return Ok(Vec::new());
        }

        // Decode and fit everything first so a bad image installs nothing.
        let (width, height) = (self.document.width(), self.document.height());
        let fitted = results
            .iter()
            .map(|bytes| transform::fit_to_canvas(&io::decode_image(bytes)?, width, height))
            .collect::<EditResult<Vec<_>>>()?;
        let count = fitted.len();
        let mut ids = Vec::with_capacity(count);
        for (i, surface) in fitted.into_iter().enumerate() {
            let name = if count == 1 {
                prompt.to_string()
            } else {
                format!("{prompt} ({})", i + 1)
            };
            ids.push(canvas_ops::install_fitted_layer(&mut self.document, &mut self.history, surface, &name)?);
        }
        self.scheduler.mark_dirty(None);
        tracing::info!(count = ids.len(), "Installed remote edit results");
        Ok(ids)
    }

    /// Persist the current composite as a gallery artifact.
    pub fn save_artifact(&self, store: &mut dyn ArtifactStore, name: &str) -> EditResult<Uuid> {
        let artifact = Artifact::new(name, self.composite_png()?);
        let id = store.persist(artifact)?;
        tracing::info!(artifact = %id, "Saved artifact");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tools::BrushType;
    use crate::ops::ai::RemoteEditError;
    use crate::ops::gallery::MemoryGallery;
    use egui::pos2;
    use image::Rgba;

    fn small_session() -> EditorSession {
        let settings = EditorSettings {
            default_width: 20,
            default_height: 20,
            ..Default::default()
        };
        EditorSession::new(settings).unwrap()
    }

    fn png_of(w: u32, h: u32, color: Rgba<u8>) -> Vec<u8> {
        io::encode_png(&PixelSurface::filled(w, h, color).unwrap()).unwrap()
    }

    #[test]
    fn new_session_starts_with_one_snapshot() {
        let session = small_session();
        assert_eq!(session.history.descriptions(), vec!["Open"]);
        assert!(!session.history.can_undo());
        assert_eq!(session.document.layer_count(), 1);
    }

    #[test]
    fn image_is_drawn_before_first_snapshot() {
        let bytes = png_of(6, 4, Rgba([1, 2, 3, 255]));
        let mut session = EditorSession::with_image(EditorSettings::default(), &bytes).unwrap();
        assert_eq!((session.document.width(), session.document.height()), (6, 4));
        session.clear_active_layer().unwrap();
        assert!(session.undo());
        assert_eq!(session.document.active_pixel(5, 3), Some(Rgba([1, 2, 3, 255])));
    }

    #[test]
    fn stroke_becomes_one_history_entry() {
        let mut session = small_session();
        session.pointer_down(pos2(5.0, 5.0)).unwrap();
        session.pointer_move(pos2(10.0, 5.0));
        session.pointer_move(pos2(15.0, 5.0));
        session.pointer_up();
        assert_eq!(session.history.descriptions(), vec!["Open", "Brush Stroke"]);
        assert!(session.scheduler().is_dirty());
    }

    #[test]
    fn pointer_down_without_pointer_up_keeps_both_strokes() {
        let mut session = small_session();
        session.pointer_down(pos2(5.0, 5.0)).unwrap();
        session.pointer_move(pos2(10.0, 5.0));
        session.pointer_down(pos2(15.0, 15.0)).unwrap();
        session.pointer_up();
        assert_eq!(session.history.descriptions(), vec!["Open", "Brush Stroke", "Brush Stroke"]);

        assert!(session.undo());
        assert_eq!(session.document.active_pixel(15, 15).map(|p| p[3]), Some(0));
        assert_eq!(session.document.active_pixel(8, 5).map(|p| p[3]), Some(255));
    }

    #[test]
    fn moves_without_a_stroke_do_nothing() {
        let mut session = small_session();
        session.render_tick();
        session.pointer_move(pos2(5.0, 5.0));
        session.pointer_up();
        assert_eq!(session.history.len(), 1);
        assert!(!session.scheduler().is_dirty());
    }

    #[test]
    fn painting_without_an_active_layer_is_rejected() {
        let mut session = small_session();
        session.document = Document::empty(20, 20).unwrap();
        assert!(matches!(session.pointer_down(pos2(5.0, 5.0)), Err(EditError::NoActiveLayer)));
        session.pointer_up();
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn render_tick_only_fires_after_changes() {
        let mut session = small_session();
        assert!(session.render_tick().is_some());
        assert!(session.render_tick().is_none());
        session.add_layer().unwrap();
        assert!(session.render_tick().is_some());
        assert!(session.undo());
        assert!(session.render_tick().is_some());
    }

    #[test]
    fn blend_preview_commits_as_an_edit() {
        let mut session = small_session();
        session.preview_blend_mode(BlendMode::Multiply);
        assert_eq!(session.history.len(), 1);
        session.commit_blend_preview().unwrap();
        assert_eq!(session.document.active_layer().unwrap().blend_mode, BlendMode::Multiply);
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.composite_options.preview_blend, None);

        session.preview_blend_mode(BlendMode::Screen);
        session.cancel_blend_preview();
        assert_eq!(session.document.active_layer().unwrap().blend_mode, BlendMode::Multiply);
    }

    #[test]
    fn remote_edit_installs_each_result() {
        let mut session = small_session();
        let reply = png_of(10, 5, Rgba([0, 255, 0, 255]));
        let mut service = |image: &[u8], prompt: &str| {
            assert_eq!(&image[1..4], b"PNG");
            assert_eq!(prompt, "grass");
            Ok::<_, RemoteEditError>(vec![reply.clone(), reply.clone()])
        };
        let ids = session.request_remote_edit(&mut service, "grass").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(session.document.layer_count(), 3);
        assert_eq!(session.document.active_layer_id(), Some(ids[1]));
        // 10×5 fitted into 20×20 → 20×10 centred vertically.
        let top = session.document.layer(ids[1]).unwrap();
        assert_eq!(top.pixels.get_pixel(10, 10), Rgba([0, 255, 0, 255]));
        assert_eq!(top.pixels.get_pixel(10, 2)[3], 0);
    }

    #[test]
    fn failed_or_empty_remote_edit_changes_nothing() {
        let mut session = small_session();
        let mut failing = |_: &[u8], _: &str| Err::<Vec<Vec<u8>>, _>(RemoteEditError::Timeout);
        assert!(matches!(
            session.request_remote_edit(&mut failing, "x"),
            Err(EditError::RemoteService(_))
        ));
        let mut empty = |_: &[u8], _: &str| Ok::<_, RemoteEditError>(Vec::new());
        assert!(session.request_remote_edit(&mut empty, "x").unwrap().is_empty());
        let mut garbage = |_: &[u8], _: &str| Ok::<_, RemoteEditError>(vec![b"junk".to_vec()]);
        assert!(session.request_remote_edit(&mut garbage, "x").is_err());
        assert_eq!(session.document.layer_count(), 1);
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn remote_results_install_all_or_nothing() {
        let mut session = small_session();
        let good = png_of(4, 4, Rgba([0, 255, 0, 255]));
        let mut mixed = |_: &[u8], _: &str| Ok::<_, RemoteEditError>(vec![good.clone(), good.clone(), b"junk".to_vec()]);
        assert!(session.request_remote_edit(&mut mixed, "x").is_err());
        assert_eq!(session.document.layer_count(), 1);
        assert_eq!(session.history.descriptions(), vec!["Open"]);
    }

    #[test]
    fn artifacts_hold_the_composite() {
        let session = small_session();
        let mut gallery = MemoryGallery::default();
        let id = session.save_artifact(&mut gallery, "render").unwrap();
        assert_eq!(gallery.list(), vec![id]);
        let stored = io::decode_image(&gallery.get(id).unwrap().png).unwrap();
        assert_eq!(stored, session.composite().unwrap());
    }

    #[test]
    fn reset_starts_over() {
        let mut session = small_session();
        session.add_layer().unwrap();
        session.reset(8, 9).unwrap();
        assert_eq!((session.document.width(), session.document.height()), (8, 9));
        assert_eq!(session.history.descriptions(), vec!["Open"]);
        assert!(session.reset(0, 9).is_err());
        assert_eq!(session.document.width(), 8);
    }

    #[test]
    fn clone_source_is_set_in_document_space() {
        let mut session = small_session();
        session.viewport.set_scale(2.0);
        session.brush.properties.brush_type = BrushType::Clone;
        session.set_clone_source(pos2(10.0, 10.0));
        assert_eq!(session.brush.clone_stamp.source, Some(pos2(5.0, 5.0)));
    }
}
