//! Text post-processing: hallucination filtering and long-audio chunking.

pub mod chunker;
pub mod hallucination;
