//! Distance functions for the supported metrics. Smaller is closer; all
//! results are non-negative.

use semdex_core::DistanceMetric;

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::L2sq => squared_l2(a, b),
        DistanceMetric::Dot => dot_distance(a, b),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `1 - cos(a, b)`; a zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let cos = (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (1.0 - cos).max(0.0)
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// `exp(-a·b)`: strictly decreasing in the inner product, so larger
/// products always rank closer, whatever the vector norms.
pub fn dot_distance(a: &[f32], b: &[f32]) -> f32 {
    (-dot(a, b)).exp()
}
