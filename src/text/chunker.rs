//! Long-audio chunking.
//!
//! Whisper degrades past ~30 s of input, so longer recordings are split.
//! Each split point is nudged to the quietest 100 ms window in the last
//! 3 s of the chunk so words aren't cut in half, consecutive chunks share a
//! 1.5 s overlap so the model sees context across the boundary, and the
//! words duplicated by that overlap are dropped from the second chunk.

use crate::audio::vad::compute_rms;
use crate::defaults::{CHUNK_OVERLAP_SAMPLES, MAX_CHUNK_SAMPLES};
use crate::error::Result;
use crate::stt::transcriber::{Transcriber, TranscriptionResult};
use std::time::Instant;

/// Span of the quiet-boundary search before a raw chunk end (3 s).
const BOUNDARY_SEARCH_SAMPLES: usize = 48_000;

/// Window size for the quiet-boundary search (100 ms).
const BOUNDARY_WINDOW_SAMPLES: usize = 1_600;

/// Most words considered for overlap de-duplication.
const DEDUP_MAX_WORDS: usize = 10;

/// Fewest words that still count as an overlap match.
const DEDUP_MIN_WORDS: usize = 3;

/// Chars of chunk text carried forward as the next chunk's prompt.
const PROMPT_SUFFIX_CHARS: usize = 200;

/// Transcribe a buffer longer than one chunk, merging the per-chunk results.
pub fn transcribe_chunked(
    samples: &[f32],
    transcriber: &dyn Transcriber,
) -> Result<TranscriptionResult> {
    let start = Instant::now();
    let total_len = samples.len();

    let mut merged = TranscriptionResult {
        segments: Vec::new(),
        audio_duration_ms: total_len as f64 / 16.0,
        transcription_time_ms: 0.0,
        model_name: transcriber.model_name().to_string(),
    };

    let mut offset = 0usize;
    let mut prev_suffix: Option<String> = None;

    while offset < total_len {
        let raw_end = (offset + MAX_CHUNK_SAMPLES).min(total_len);
        let end = if raw_end < total_len {
            quiet_boundary(samples, offset, raw_end)
        } else {
            raw_end
        };

        let chunk_result = transcriber.transcribe(&samples[offset..end], prev_suffix.as_deref())?;

        let offset_ms = (offset / 16) as i64;
        let mut segments = chunk_result.segments;
        for seg in &mut segments {
            seg.start_ms += offset_ms;
            seg.end_ms += offset_ms;
        }

        if let Some(suffix) = &prev_suffix {
            if let Some(first) = segments.first_mut() {
                match dedup_overlap(suffix, &first.text) {
                    Deduped::Unchanged => {}
                    Deduped::Trimmed(text) => first.text = text,
                    Deduped::Empty => {
                        segments.remove(0);
                    }
                }
            }
        }

        let chunk_text: String = segments.iter().map(|s| s.text.as_str()).collect();
        prev_suffix = Some(tail_chars(chunk_text.trim(), PROMPT_SUFFIX_CHARS));

        merged.segments.extend(segments);

        if end >= total_len {
            break;
        }
        // A tail shorter than the overlap holds nothing the previous chunk
        // didn't already cover.
        if total_len - end < CHUNK_OVERLAP_SAMPLES {
            break;
        }
        offset = end - CHUNK_OVERLAP_SAMPLES;
    }

    merged.transcription_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    Ok(merged)
}

/// Find the right edge of the quietest 100 ms window in the last 3 s before
/// `raw_end`. Falls back to `raw_end` when the search span is too short to
/// hold a single window.
fn quiet_boundary(samples: &[f32], chunk_start: usize, raw_end: usize) -> usize {
    let search_start = raw_end
        .saturating_sub(BOUNDARY_SEARCH_SAMPLES)
        .max(chunk_start);
    if raw_end - search_start < BOUNDARY_WINDOW_SAMPLES {
        return raw_end;
    }

    let mut best_end = raw_end;
    let mut best_rms = f32::INFINITY;

    let mut window_start = search_start;
    while window_start + BOUNDARY_WINDOW_SAMPLES <= raw_end {
        let window_end = window_start + BOUNDARY_WINDOW_SAMPLES;
        let rms = compute_rms(&samples[window_start..window_end]);
        if rms < best_rms {
            best_rms = rms;
            best_end = window_end;
        }
        window_start = window_end;
    }

    best_end
}

enum Deduped {
    Unchanged,
    Trimmed(String),
    Empty,
}

/// Drop the run of leading words in `first_text` that duplicates the tail of
/// `prev_suffix`. Longest match wins, down to [`DEDUP_MIN_WORDS`].
fn dedup_overlap(prev_suffix: &str, first_text: &str) -> Deduped {
    let prev_words: Vec<String> = prev_suffix
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let prev_tail: Vec<&str> = prev_words
        .iter()
        .rev()
        .take(DEDUP_MAX_WORDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let first_words: Vec<&str> = first_text.split_whitespace().collect();
    let first_lower: Vec<String> = first_words.iter().map(|w| w.to_lowercase()).collect();

    let max_len = DEDUP_MAX_WORDS.min(first_words.len()).min(prev_tail.len());
    for len in (DEDUP_MIN_WORDS..=max_len).rev() {
        let prev_slice = &prev_tail[prev_tail.len() - len..];
        let first_slice: Vec<&str> = first_lower[..len].iter().map(String::as_str).collect();
        if prev_slice == first_slice.as_slice() {
            let rest = &first_words[len..];
            if rest.is_empty() {
                return Deduped::Empty;
            }
            return Deduped::Trimmed(format!(" {}", rest.join(" ")));
        }
    }
    Deduped::Unchanged
}

/// Last `max` chars of a string, on a char boundary.
fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}
