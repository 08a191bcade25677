//! Sliding-window text chunker.
//!
//! Splits the concatenated knowledge-base text into overlapping [`Chunk`]s.
//! Each window targets `chunk_size` bytes and the next window starts
//! `overlap` bytes before the previous one ended, so consecutive chunks
//! share a run of identical text. Window ends prefer natural boundaries
//! (paragraph break, line break, sentence end, word gap) over a hard cut.
//!
//! Empty input produces zero chunks; callers treat that as "nothing to
//! embed", not an error.

use crate::models::Chunk;

/// Boundary patterns tried in order of preference when closing a window.
const SPLIT_PATTERNS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into overlapping chunks of at most `chunk_size` bytes.
///
/// Invariants:
/// - chunk order matches order of occurrence in `text`, indices contiguous
///   from 0;
/// - every two consecutive chunks share at least `overlap` bytes of
///   identical content (bounded by the earlier chunk's length);
/// - the chunks jointly cover all of `text` with no gaps.
///
/// `overlap` must be smaller than `chunk_size`; config validation enforces
/// this before the chunker ever runs.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let hard_end = floor_char_boundary(text, (start + chunk_size).min(len));
        let end = if hard_end >= len {
            len
        } else {
            pick_split(text, start, hard_end, overlap)
        };

        chunks.push(Chunk {
            chunk_index: index,
            text: text[start..end].to_string(),
        });
        index += 1;

        if end >= len {
            break;
        }

        // Step back so the next window re-covers the overlap tail. The
        // boundary clamp can only move backwards, so guard against a window
        // that would fail to advance.
        let next = floor_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }

    chunks
}

/// Choose where to close the window `[start, hard_end)`.
///
/// Prefers the latest natural boundary inside the window; falls back to the
/// hard byte cut. A boundary is only usable if it leaves the window longer
/// than `overlap`, otherwise the next window would not advance.
fn pick_split(text: &str, start: usize, hard_end: usize, overlap: usize) -> usize {
    let window = &text[start..hard_end];
    let min_end = start + overlap;

    for pattern in SPLIT_PATTERNS {
        if let Some(pos) = window.rfind(pattern) {
            let cut = start + pos + pattern.len();
            if cut > min_end {
                return cut;
            }
        }
    }

    hard_end
}

/// Largest char boundary at or below `i`. `str::floor_char_boundary` in
/// spirit, done by hand on stable.
fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
