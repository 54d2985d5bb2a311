//! Sliding-window chunking and chunk hashing.

use sha2::{Digest, Sha256};

/// Split `text` into windows of `chunk_size` characters, each starting
/// `overlap` characters before the previous one ended.
///
/// Text no longer than `chunk_size` comes back as a single chunk. The last
/// window always ends exactly at the end of the text. `overlap` is capped at
/// `chunk_size - 1` so the window always advances.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(chunk_size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// SHA-256 hex digest used as the per-session uniqueness key of a chunk.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
