//! Cosine similarity and brute-force top-K ranking.
//!
//! Ranking is a full scan followed by a stable comparison sort and
//! truncation, i.e. O(n log n) per query. That is fine for a corpus in the
//! low thousands of records; anything larger needs a real vector index
//! (see the `vec-index` store backend).

use tracing::debug;

/// Cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Vectors of different length, empty
/// vectors, and vectors with zero magnitude all yield `0.0`; callers that
/// rank candidates must exclude length mismatches themselves (see [`rank`]).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
        (d + x * y, na + x * x, nb + y * y)
    });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// `true` when every component is zero, i.e. the vector has no direction.
pub fn is_zero_magnitude(vector: &[f32]) -> bool {
    vector.iter().all(|x| *x == 0.0)
}

/// A ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub item: T,
    pub score: f32,
}

/// Rank `candidates` against `query` and keep the best `k`.
///
/// `vector_of` extracts each candidate's embedding. Candidates whose vector
/// length differs from the query (or is empty) are skipped, never padded or
/// truncated. Ties keep scan order.
pub fn rank<T, I, F>(query: &[f32], candidates: I, k: usize, vector_of: F) -> Vec<Scored<T>>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &[f32],
{
    if query.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut skipped = 0usize;
    let mut scored: Vec<Scored<T>> = candidates
        .into_iter()
        .filter_map(|item| {
            let vector = vector_of(&item);
            if vector.len() != query.len() {
                skipped += 1;
                None
            } else {
                let score = cosine_similarity(query, vector);
                Some(Scored { item, score })
            }
        })
        .collect();
    if skipped > 0 {
        debug!(skipped, dimension = query.len(), "skipped candidates with mismatched dimension");
    }
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_is_minus_one() {
        let a = vec![1.0f32, 2.0, 3.0];
        let b = vec![-1.0f32, -2.0, -3.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn mismatched_and_empty_vectors_are_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn zero_magnitude_detection() {
        assert!(is_zero_magnitude(&[0.0, -0.0, 0.0]));
        assert!(!is_zero_magnitude(&[0.0, 1e-30, 0.0]));
    }

    #[test]
    fn magnitude_does_not_matter() {
        let s = cosine_similarity(&[1.0, 1.0], &[10.0, 10.0]);
        assert!((s - 1.0).abs() < 1e-6);
    }

    fn by_vec<T>(c: &(T, Vec<f32>)) -> &[f32] {
        &c.1
    }

    #[test]
    fn rank_orders_descending_and_truncates() {
        let candidates = vec![
            ("far", vec![0.0f32, 0.0, 1.0]),
            ("near", vec![1.0f32, 0.1, 0.0]),
            ("mid", vec![1.0f32, 1.0, 0.0]),
            ("exact", vec![1.0f32, 0.0, 0.0]),
        ];
        let ranked = rank(&[1.0, 0.0, 0.0], candidates, 3, by_vec);
        let names: Vec<_> = ranked.iter().map(|s| s.item.0).collect();
        assert_eq!(names, vec!["exact", "near", "mid"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn rank_returns_min_of_k_and_eligible() {
        let candidates = vec![("a", vec![1.0f32, 0.0]), ("b", vec![0.0f32, 1.0])];
        assert_eq!(rank(&[1.0, 0.0], candidates, 10, by_vec).len(), 2);
    }

    #[test]
    fn rank_skips_mismatched_dimensions() {
        let candidates = vec![
            ("three", vec![1.0f32, 0.0, 0.0]),
            ("two", vec![1.0f32, 0.0]),
            ("empty", vec![]),
        ];
        let ranked = rank(&[1.0, 0.0], candidates, 5, by_vec);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.0, "two");
    }

    #[test]
    fn rank_keeps_zero_vectors_with_zero_score() {
        let candidates = vec![("zero", vec![0.0f32, 0.0]), ("neg", vec![-1.0f32, 0.0])];
        let ranked = rank(&[1.0, 0.0], candidates, 5, by_vec);
        assert_eq!(ranked[0].item.0, "zero");
        assert_eq!(ranked[0].score, 0.0);
        assert!((ranked[1].score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn rank_ties_keep_scan_order() {
        let candidates = vec![
            (1, vec![1.0f32, 0.0]),
            (2, vec![2.0f32, 0.0]),
            (3, vec![3.0f32, 0.0]),
        ];
        let ranked = rank(&[1.0, 0.0], candidates, 3, by_vec);
        let ids: Vec<_> = ranked.iter().map(|s| s.item.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn rank_empty_query_or_zero_k_is_empty() {
        let candidates = vec![("a", vec![1.0f32])];
        assert!(rank(&[], candidates.clone(), 5, by_vec).is_empty());
        assert!(rank(&[1.0], candidates, 0, by_vec).is_empty());
    }
}
