//! Lexical and vector scoring used by the in-memory context store.

use std::collections::HashMap;

/// BM25 term-frequency saturation.
pub const BM25_K1: f64 = 1.2;
/// BM25 length normalization.
pub const BM25_B: f64 = 0.75;
/// Reciprocal rank fusion constant.
pub const RRF_K: f64 = 60.0;

/// Lowercased alphanumeric tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// BM25 score of every document against the query, in document order.
///
/// Documents sharing no token with the query score exactly zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bm25_scores(query: &str, documents: &[Vec<String>]) -> Vec<f64> {
    let mut terms = tokenize(query);
    terms.sort();
    terms.dedup();

    let n = documents.len() as f64;
    if documents.is_empty() || terms.is_empty() {
        return vec![0.0; documents.len()];
    }
    let avg_len = documents.iter().map(Vec::len).sum::<usize>() as f64 / n;

    let idf: HashMap<&str, f64> = terms
        .iter()
        .map(|term| {
            let df = documents.iter().filter(|doc| doc.contains(term)).count() as f64;
            (term.as_str(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
        })
        .collect();

    documents
        .iter()
        .map(|doc| {
            let len = doc.len() as f64;
            terms
                .iter()
                .map(|term| {
                    let tf = doc.iter().filter(|t| *t == term).count() as f64;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    let norm = if avg_len > 0.0 { len / avg_len } else { 0.0 };
                    idf[term.as_str()] * (tf * (BM25_K1 + 1.0)) / BM25_B.mul_add(norm, 1.0 - BM25_B).mul_add(BM25_K1, tf)
                })
                .sum()
        })
        .collect()
}

/// Cosine similarity, zero when either vector has no magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Indices sorted by descending score. Equal scores keep their input order.
#[must_use]
pub fn rank_desc(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
    order
}

/// Fuses rankings (lists of document indices, best first) with RRF.
///
/// A document absent from a ranking gets no contribution from it.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn reciprocal_rank_fusion(rankings: &[Vec<usize>], len: usize) -> Vec<f64> {
    let mut fused = vec![0.0; len];
    for ranking in rankings {
        for (rank, doc) in ranking.iter().enumerate() {
            fused[*doc] += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Large-Language Model (LLM)!"), vec!["large", "language", "model", "llm"]);
    }

    #[test]
    fn test_bm25_ranks_matching_document_first() {
        let corpus = docs(&["RAG retrieval augmented generation", "LLM large language model", "weather today"]);
        let scores = bm25_scores("what is an LLM", &corpus);

        assert!(scores[1] > 0.0);
        assert_eq!(scores[0], 0.0);
        assert_eq!(scores[2], 0.0);
        assert_eq!(rank_desc(&scores)[0], 1);
    }

    #[test]
    fn test_bm25_prefers_higher_term_frequency() {
        let corpus = docs(&["vacuum battery", "vacuum vacuum battery"]);
        let scores = bm25_scores("vacuum", &corpus);
        assert!(scores[1] > scores[0]);
    }

    #[test]
    fn test_bm25_empty_query() {
        let corpus = docs(&["anything"]);
        assert_eq!(bm25_scores("  ?? ", &corpus), vec![0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_desc_is_stable() {
        assert_eq!(rank_desc(&[0.5, 0.9, 0.5]), vec![1, 0, 2]);
    }

    #[test]
    fn test_rrf_rewards_agreement() {
        let fused = reciprocal_rank_fusion(&[vec![0, 1, 2], vec![1, 0]], 3);
        assert!((fused[0] - fused[1]).abs() < 1e-12);
        assert!(fused[0] > fused[2]);
        assert!((fused[2] - 1.0 / 63.0).abs() < 1e-12);
    }
}
