//! Vector and string-distance primitives for the similarity engine.
//!
//! Pure functions, no state. Embedding vectors are `f32` (the provider wire
//! format); scores are returned as `f64`.

use anyhow::{anyhow, Result};

/// Dot product; rejects vectors of unequal length.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(anyhow!(
            "vector length mismatch: {} vs {}",
            a.len(),
            b.len()
        ));
    }
    Ok(a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum())
}

/// Euclidean magnitude.
pub fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Unit-normalize a vector. The zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mag = magnitude(v);
    if mag <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| ((*x as f64) / mag) as f32).collect()
}

/// Cosine similarity; rejects vectors of unequal length.
///
/// Either vector having zero magnitude yields 0.0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    let dot = dot_product(a, b)?;
    let denom = magnitude(a) * magnitude(b);
    if denom <= 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// Euclidean distance; rejects vectors of unequal length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(anyhow!(
            "vector length mismatch: {} vs {}",
            a.len(),
            b.len()
        ));
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt())
}

/// Classic two-row Levenshtein edit distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `levenshtein(a, b) / max(|a|, |b|)`, or 0.0 when both strings are empty.
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    levenshtein(a, b) as f64 / max_len as f64
}
