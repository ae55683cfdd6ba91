// ============================================================================
// DOCUMENT MODEL: layers, blend modes, symmetry and the ordered layer stack
// ============================================================================

use std::fmt;

use egui::{Pos2, pos2};
use image::Rgba;

use crate::error::{EditError, EditResult};
use crate::surface::PixelSurface;

// ============================================================================
// BLEND MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Returns all blend modes in menu order
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Luminosity => "Luminosity",
        }
    }

    /// Parse a display name or a kebab/snake-case key ("color-dodge").
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Self::all().iter().copied().find(|mode| {
            let candidate: String = mode
                .name()
                .chars()
                .filter(|c| *c != ' ')
                .flat_map(char::to_lowercase)
                .collect();
            candidate == key
        })
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// Stable layer identifier, unique for the lifetime of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub pixels: PixelSurface,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>, pixels: PixelSurface) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            pixels,
        }
    }
}

// ============================================================================
// SYMMETRY
// ============================================================================

/// Paint symmetry applied by the brush engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SymmetryMode {
    #[default]
    None,
    /// Mirror across the vertical centre line (x' = width − x).
    Vertical,
    /// Mirror across the horizontal centre line (y' = height − y).
    Horizontal,
    /// N copies rotated about the canvas centre. N < 2 behaves like `None`.
    Radial(u32),
}

impl SymmetryMode {
    pub fn is_active(self) -> bool {
        match self {
            SymmetryMode::None => false,
            SymmetryMode::Radial(n) => n >= 2,
            _ => true,
        }
    }

    pub fn replica_count(self) -> usize {
        match self {
            SymmetryMode::None => 1,
            SymmetryMode::Vertical | SymmetryMode::Horizontal => 2,
            SymmetryMode::Radial(n) if n >= 2 => n as usize,
            SymmetryMode::Radial(_) => 1,
        }
    }

    /// All replica points for `p` on a `width × height` canvas, `p` first.
    pub fn replicas(self, p: Pos2, width: u32, height: u32) -> Vec<Pos2> {
        let w = width as f32;
        let h = height as f32;
        match self {
            SymmetryMode::Vertical => vec![p, pos2(w - p.x, p.y)],
            SymmetryMode::Horizontal => vec![p, pos2(p.x, h - p.y)],
            SymmetryMode::Radial(n) if n >= 2 => {
                let cx = w / 2.0;
                let cy = h / 2.0;
                let dx = p.x - cx;
                let dy = p.y - cy;
                let mut out = Vec::with_capacity(n as usize);
                out.push(p);
                for k in 1..n {
                    let theta = std::f32::consts::TAU * k as f32 / n as f32;
                    let (sin, cos) = theta.sin_cos();
                    out.push(pos2(cx + dx * cos - dy * sin, cy + dx * sin + dy * cos));
                }
                out
            }
            _ => vec![p],
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Canvas size plus the ordered layer stack (index 0 is painted first).
#[derive(Clone, Debug)]
pub struct Document {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    active_layer: Option<LayerId>,
    next_layer_id: u64,
}

impl Document {
    /// New document with a single transparent "Background" layer.
    pub fn new(width: u32, height: u32) -> EditResult<Self> {
        let mut doc = Self::empty(width, height)?;
        doc.add_layer("Background")?;
        Ok(doc)
    }

    /// New document with no layers at all.
    pub fn empty(width: u32, height: u32) -> EditResult<Self> {
        crate::surface::check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            layers: Vec::new(),
            active_layer: None,
            next_layer_id: 1,
        })
    }

    // ---- queries ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.active_layer
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer.and_then(|id| self.layer(id))
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        let id = self.active_layer?;
        self.layer_mut(id)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_layer.and_then(|id| self.index_of(id))
    }

    fn require(&mut self, id: LayerId) -> EditResult<&mut Layer> {
        self.layer_mut(id).ok_or(EditError::LayerNotFound(id))
    }

    pub(crate) fn allocate_id(&mut self) -> LayerId {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        id
    }

    // ---- structural edits ---------------------------------------------------

    /// Append a transparent layer on top and make it active.
    pub fn add_layer(&mut self, name: &str) -> EditResult<LayerId> {
        let surface = PixelSurface::new(self.width, self.height)?;
        self.push_layer_surface(name, surface)
    }

    /// Append an existing canvas-sized surface as the new topmost, active layer.
    pub fn push_layer_surface(&mut self, name: &str, surface: PixelSurface) -> EditResult<LayerId> {
        let index = self.layers.len();
        self.insert_layer_surface(index, name, surface)
    }

    pub fn insert_layer_surface(&mut self, index: usize, name: &str, surface: PixelSurface) -> EditResult<LayerId> {
        if surface.dimensions() != (self.width, self.height) {
            return Err(EditError::InvalidGeometry {
                width: surface.width() as i64,
                height: surface.height() as i64,
            });
        }
        if index > self.layers.len() {
            return Err(EditError::IndexOutOfRange { index, len: self.layers.len() });
        }
        let id = self.allocate_id();
        self.layers.insert(index, Layer::new(id, name, surface));
        self.active_layer = Some(id);
        Ok(id)
    }

    /// Remove a layer. The last remaining layer cannot be deleted; if the
    /// active layer goes away the new topmost layer becomes active.
    pub fn delete_layer(&mut self, id: LayerId) -> EditResult<Layer> {
        let index = self.index_of(id).ok_or(EditError::LayerNotFound(id))?;
        if self.layers.len() <= 1 {
            return Err(EditError::LastLayer);
        }
        let removed = self.layers.remove(index);
        if self.active_layer == Some(id) || self.active_index().is_none() {
            self.active_layer = self.layers.last().map(|l| l.id);
        }
        Ok(removed)
    }

    /// Copy a layer (pixels and properties) directly above itself.
    pub fn duplicate_layer(&mut self, id: LayerId) -> EditResult<LayerId> {
        let index = self.index_of(id).ok_or(EditError::LayerNotFound(id))?;
        let mut copy = self.layers[index].clone();
        copy.id = self.allocate_id();
        copy.name = format!("{} copy", copy.name);
        let new_id = copy.id;
        self.layers.insert(index + 1, copy);
        self.active_layer = Some(new_id);
        Ok(new_id)
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> EditResult<()> {
        self.require(id)?;
        self.active_layer = Some(id);
        Ok(())
    }

    /// Flip visibility; returns the new state.
    pub fn toggle_visibility(&mut self, id: LayerId) -> EditResult<bool> {
        let layer = self.require(id)?;
        layer.visible = !layer.visible;
        Ok(layer.visible)
    }

    /// Set opacity clamped to [0, 1]. NaN is treated as 0.
    pub fn set_opacity(&mut self, id: LayerId, value: f32) -> EditResult<f32> {
        let layer = self.require(id)?;
        layer.opacity = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        Ok(layer.opacity)
    }

    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> EditResult<()> {
        self.require(id)?.blend_mode = mode;
        Ok(())
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> EditResult<()> {
        self.require(id)?.name = name.to_string();
        Ok(())
    }

    /// Move the layer at `from` so it ends up at index `to`; everything else
    /// keeps its relative order.
    pub fn reorder(&mut self, from: usize, to: usize) -> EditResult<()> {
        let len = self.layers.len();
        if from >= len {
            return Err(EditError::IndexOutOfRange { index: from, len });
        }
        if to >= len {
            return Err(EditError::IndexOutOfRange { index: to, len });
        }
        if from != to {
            let layer = self.layers.remove(from);
            self.layers.insert(to, layer);
        }
        Ok(())
    }

    /// Zero the active layer's pixels in place.
    pub fn clear_active_layer(&mut self) -> EditResult<()> {
        let layer = self.active_layer_mut().ok_or(EditError::NoActiveLayer)?;
        layer.pixels.clear();
        Ok(())
    }

    // ---- wholesale replacement ----------------------------------------------

    /// Swap in a new canvas size and layer stack. Used by transforms and
    /// history restore. Keeps the active layer when its id survives,
    /// otherwise falls back to the topmost layer.
    pub(crate) fn replace_all(&mut self, width: u32, height: u32, layers: Vec<Layer>) {
        debug_assert!(layers.iter().all(|l| l.pixels.dimensions() == (width, height)));
        self.width = width;
        self.height = height;
        self.layers = layers;
        let keep = self
            .active_layer
            .filter(|id| self.layers.iter().any(|l| l.id == *id));
        self.active_layer = keep.or_else(|| self.layers.last().map(|l| l.id));
        let max_id = self.layers.iter().map(|l| l.id.0).max().unwrap_or(0);
        self.next_layer_id = self.next_layer_id.max(max_id + 1);
    }

    /// Replace every layer's surface in order; the surfaces must already be
    /// `width × height`.
    pub(crate) fn replace_surfaces(&mut self, width: u32, height: u32, surfaces: Vec<PixelSurface>) {
        debug_assert_eq!(surfaces.len(), self.layers.len());
        self.width = width;
        self.height = height;
        for (layer, surface) in self.layers.iter_mut().zip(surfaces) {
            layer.pixels = surface;
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.pixels.memory_bytes()).sum()
    }

    /// Pixel of the active layer, for eyedropper-style reads.
    pub fn active_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.active_layer().map(|l| l.pixels.get_pixel(x, y))
    }
}
