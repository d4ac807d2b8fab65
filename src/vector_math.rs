use crate::core::errors::KnowledgeError;

/// Cosine similarity of two equal-length vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, KnowledgeError> {
    if query.len() != candidate.len() {
        return Err(KnowledgeError::DimensionMismatch {
            expected: candidate.len(),
            actual: query.len(),
        });
    }

    let dot: f32 = query.iter().zip(candidate.iter()).map(|(x, y)| x * y).sum();
    let query_norm = l2_norm(query);
    let candidate_norm = l2_norm(candidate);

    if query_norm == 0.0 || candidate_norm == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (query_norm * candidate_norm))
}

/// Rejects vectors holding NaN or infinite components.
pub fn ensure_finite(vector: &[f32]) -> Result<(), KnowledgeError> {
    match vector.iter().position(|x| !x.is_finite()) {
        Some(position) => Err(KnowledgeError::InvalidEmbedding(format!(
            "component {} is {}",
            position, vector[position]
        ))),
        None => Ok(()),
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}
