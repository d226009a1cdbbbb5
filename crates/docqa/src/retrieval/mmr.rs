//! Maximal Marginal Relevance (MMR) for diversity-aware retrieval
//!
//! MMR = λ × similarity(query, chunk) - (1-λ) × max(similarity(chunk, selected))
//!
//! λ = 1.0: pure relevance, λ = 0.0: pure diversity.

/// Cosine similarity; zero when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (mag_a * mag_b)
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Candidate for MMR reranking
#[derive(Debug, Clone, Copy)]
pub struct MmrCandidate<'a> {
    /// Position in the index
    pub index: usize,
    /// Relevance to the query
    pub score: f32,
    pub vector: &'a [f32],
}

/// Rerank candidates (sorted by relevance, descending) for diversity.
///
/// Returns up to `k` `(index, relevance)` pairs in selection order. Equal MMR
/// scores keep the earlier candidate.
pub fn mmr_rerank(candidates: Vec<MmrCandidate<'_>>, k: usize, lambda: f32) -> Vec<(usize, f32)> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let k = k.min(candidates.len());
    let mut selected: Vec<MmrCandidate<'_>> = Vec::with_capacity(k);
    let mut remaining = candidates;

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let max_similarity = selected
                .iter()
                .map(|s| cosine_similarity(candidate.vector, s.vector))
                .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |a| a.max(sim))))
                .unwrap_or(0.0);

            let mmr_score = lambda * candidate.score - (1.0 - lambda) * max_similarity;
            if mmr_score > best_mmr {
                best_mmr = mmr_score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected.into_iter().map(|c| (c.index, c.score)).collect()
}
