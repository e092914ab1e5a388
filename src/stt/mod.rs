//! Speech-to-text: the Transcriber seam and the Whisper implementation.

pub mod transcriber;
pub mod whisper;
