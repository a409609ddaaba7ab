//! Similarity scoring and top-k ranking shared by all backends

use std::cmp::Ordering;

use super::Distance;

/// Cosine similarity; 0 when either vector has no length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (dot / denom) as f32
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn score(distance: Distance, query: &[f32], vector: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(query, vector),
        Distance::Dot => dot_product(query, vector),
    }
}

/// Rank `(id, vector)` candidates against `query` and keep the best `k`.
///
/// Returns `(id, score)` pairs, best first; equal scores are ordered by id.
pub fn top_k<'a, I>(distance: Distance, query: &[f32], candidates: I, k: usize) -> Vec<(u64, f32)>
where
    I: IntoIterator<Item = (u64, &'a [f32])>,
{
    let mut scored: Vec<(u64, f32)> = candidates
        .into_iter()
        .map(|(id, vector)| (id, score(distance, query, vector)))
        .collect();

    scored.sort_by(|a, b| compare_scores(b.1, a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// NaN sorts below every real score
fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.total_cmp(&b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let v1 = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&v1, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((cosine_similarity(&v1, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&v1, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_top_k_orders_by_score_then_id() {
        let vectors: Vec<(u64, Vec<f32>)> = vec![
            (4, vec![0.0, 1.0]),
            (2, vec![1.0, 0.0]),
            (7, vec![1.0, 1.0]),
            (1, vec![3.0, 0.0]),
        ];
        let candidates = vectors.iter().map(|(id, v)| (*id, v.as_slice()));

        let ranked = top_k(Distance::Cosine, &[1.0, 0.0], candidates, 3);
        let ids: Vec<u64> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 7]);
    }

    #[test]
    fn test_dot_prefers_magnitude() {
        let vectors: Vec<(u64, Vec<f32>)> = vec![(0, vec![1.0, 0.0]), (1, vec![3.0, 0.0])];
        let candidates = vectors.iter().map(|(id, v)| (*id, v.as_slice()));

        let ranked = top_k(Distance::Dot, &[1.0, 0.0], candidates, 1);
        assert_eq!(ranked, vec![(1, 3.0)]);
    }

    #[test]
    fn test_nan_sorts_last() {
        assert_eq!(compare_scores(f32::NAN, -5.0), Ordering::Less);
        assert_eq!(compare_scores(0.1, f32::NAN), Ordering::Greater);
    }
}
