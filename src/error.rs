// ============================================================================
// ERRORS: failures reported synchronously by document, transform and I/O ops
// ============================================================================

use thiserror::Error;

use crate::canvas::LayerId;

/// Errors surfaced by editing operations.
///
/// Every operation that returns one of these leaves the document in its
/// last-known-good state: nothing is partially applied.
#[derive(Debug, Error)]
pub enum EditError {
    /// Non-positive width or height requested for a surface, resize or crop.
    #[error("invalid geometry: {width}×{height}")]
    InvalidGeometry { width: i64, height: i64 },

    /// Paint or clear requested while no layer is active.
    #[error("no active layer")]
    NoActiveLayer,

    /// Pointer-down while the previous stroke has not ended.
    #[error("a stroke is already in progress")]
    StrokeInProgress,

    /// A pixel buffer of the requested size could not be allocated.
    #[error("could not allocate a {width}×{height} surface")]
    AllocationFailure { width: u32, height: u32 },

    #[error("layer {0} does not exist")]
    LayerNotFound(LayerId),

    #[error("layer index {index} out of range (layer count {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Deleting the only remaining layer is refused.
    #[error("cannot delete the last remaining layer")]
    LastLayer,

    /// Pixel buffer length does not match the surface dimensions.
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),

    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("remote edit failed: {0}")]
    RemoteService(String),

    #[error("artifact store: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EditResult<T> = Result<T, EditError>;
