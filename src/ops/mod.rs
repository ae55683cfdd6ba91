pub mod ai;
pub mod canvas_ops;
pub mod gallery;
pub mod transform;
