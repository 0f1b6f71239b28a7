pub mod matcher;
pub mod resurface;
pub mod search;
pub mod store;
pub mod types;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert raw little-endian bytes back to an f32 embedding.
///
/// Returns `None` if the byte length is not a multiple of 4.
pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Cosine similarity between two vectors. Returns 0.0 when either norm is zero
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x * y) as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (x * x) as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (x * x) as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Clip a raw cosine in `[-1, 1]` into the score range `[0, 1]`.
///
/// `(1 + cos) / 2` — identical vectors score 1.0, opposite vectors 0.0. This
/// is the single similarity metric shared by search, matching, and
/// resurfacing.
pub fn clipped_cosine(cos: f64) -> f64 {
    ((1.0 + cos) / 2.0).clamp(0.0, 1.0)
}

/// Recover the clipped-cosine score from a vec0 L2 distance.
///
/// All indexed vectors are L2-normalized, so `d² = 2 - 2·cos` and
/// `cos = 1 - d²/2`.
pub fn l2_to_similarity(distance: f64) -> f64 {
    clipped_cosine(1.0 - distance * distance / 2.0)
}
