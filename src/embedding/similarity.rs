//! Cosine similarity between embedding vectors.
//!
//! [`cosine_similarity`] runs on `ndarray` views and is what retrieval uses.
//! [`manual_cosine_similarity`] is the plain dot-over-magnitudes reference
//! formula, kept for checking the `ndarray` path; nothing calls it at
//! runtime. Both return `0.0` for malformed
//! input (length mismatch, empty, non-finite values) and for zero-magnitude
//! vectors, so a bad stored vector can never rank above a good one.

use ndarray::ArrayView1;

/// Cosine similarity in `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if !well_formed(a, b) {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    clamp_unit(a.dot(&b) / (norm_a * norm_b))
}

/// Cosine similarity computed element by element without `ndarray`.
pub fn manual_cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if !well_formed(a, b) {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let magnitude = mag_a.sqrt() * mag_b.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    clamp_unit(dot / magnitude)
}

fn well_formed(a: &[f32], b: &[f32]) -> bool {
    !a.is_empty() && a.len() == b.len() && a.iter().chain(b).all(|x| x.is_finite())
}

// Rounding can push identical vectors a hair past 1.0
fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
