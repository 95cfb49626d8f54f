//! PixelFE engine: the raster core of a pixel-art / sprite editor.
//!
//! What lives here: per-layer RGBA pixel buffers with a scaling
//! compositor, a bounded transactional undo/redo ledger with exact
//! replay, brush/fill/shape rasterization (including the pixel-perfect
//! cleanup brush), a selection mask whose polygon variant is rasterized
//! by a parallel worker pool, a drag/rotate transform engine with
//! optional anti-aliased commits, and the framed RLE-compressed project
//! file format.
//!
//! What does not: widgets, input normalization, and image codecs. The
//! surrounding application delivers canvas-space pointer gestures to
//! [`Editor`] and renders the frames [`Editor::render`] returns.

pub mod canvas;
pub mod cli;
pub mod color;
pub mod config;
pub mod editor;
pub mod error;
pub mod history;
pub mod ops;
pub mod pool;
pub mod project;
pub mod selection;

pub use canvas::{CanvasState, Layer, PixelCanvas};
pub use color::{Color, TRANSPARENT};
pub use config::EngineSettings;
pub use editor::{Editor, ReplaySpeed};
pub use error::EngineError;
pub use history::{EditLedger, Transaction};
pub use selection::SelectionMask;
