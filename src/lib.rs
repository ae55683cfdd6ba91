//! LayerFE: a raster layer compositing and editing engine.
//!
//! [`project::EditorSession`] is the entry point for hosts: it owns the
//! [`canvas::Document`], its undo history, the viewport and the brush engine.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;
pub mod surface;
pub mod viewport;

pub use canvas::{BlendMode, Document, Layer, LayerId, SymmetryMode};
pub use error::{EditError, EditResult};
pub use project::EditorSession;
pub use surface::PixelSurface;
