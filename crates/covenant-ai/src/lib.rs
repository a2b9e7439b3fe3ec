//! Analysis engine: clause segmentation, centroid-based disposition,
//! retrieval-based rewrite suggestions, and redline/clean builders.
//! The ONNX sentence embedder sits behind the `onnx` feature.

pub mod disposition;
pub mod engine;
pub mod library;
pub mod redline;
pub mod segment;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::{OnnxEncoder, SentenceEmbedder};

pub use disposition::{Disposition, DispositionModel};
pub use engine::ClauseEngine;
pub use library::ClauseLibrary;
