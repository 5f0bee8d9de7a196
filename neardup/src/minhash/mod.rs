mod banding;
mod min_hasher;

pub use self::banding::{BandBytes, Bands};
pub use self::min_hasher::MinHasher;

/// Estimated Jaccard similarity between two signatures: the fraction of
/// equal slots.
pub fn compute_minhash_similarity(min_hashes_1: &[u64], min_hashes_2: &[u64]) -> f64 {
    assert_eq!(min_hashes_1.len(), min_hashes_2.len());
    let num_hashes = min_hashes_1.len();
    let matches: u64 = min_hashes_1
        .iter()
        .zip(min_hashes_2.iter())
        .map(|(min_hash_1, min_hash_2)| (min_hash_1 == min_hash_2) as u64)
        .sum();
    (matches as f64) / (num_hashes as f64)
}

/// Derives the banding parameters `(num_bands, band_width)` for a Jaccard
/// threshold and signature length.
///
/// Minimizes the weighted sum of the false-positive and false-negative
/// integrals of the S-curve `1 - (1 - s^r)^b` over `[0, 1]`, with equal
/// weights, subject to `b * r <= num_perm`.
pub fn calculate_minhash_params(jaccard_threshold: f64, num_perm: usize) -> (usize, usize) {
    calculate_minhash_params_with_weights(jaccard_threshold, num_perm, 0.5, 0.5)
}

pub fn calculate_minhash_params_with_weights(
    jaccard_threshold: f64,
    num_perm: usize,
    false_positive_weight: f64,
    false_negative_weight: f64,
) -> (usize, usize) {
    let mut min_error = f64::MAX;
    let mut opt = (1, num_perm);
    for b in 1..=num_perm {
        let max_r = num_perm / b;
        for r in 1..=max_r {
            let false_positive = integrate(
                |s| 1.0 - (1.0 - s.powi(r as i32)).powi(b as i32),
                0.0,
                jaccard_threshold,
            );
            let false_negative = integrate(
                |s| (1.0 - s.powi(r as i32)).powi(b as i32),
                jaccard_threshold,
                1.0,
            );
            let error =
                false_positive * false_positive_weight + false_negative * false_negative_weight;
            if error < min_error {
                min_error = error;
                opt = (b, r);
            }
        }
    }
    opt
}

fn integrate<F: Fn(f64) -> f64>(f: F, a: f64, b: f64) -> f64 {
    const PRECISION: f64 = 0.001;
    let mut area = 0.0;
    let mut x = a;
    while x < b {
        area += f(x + 0.5 * PRECISION) * PRECISION;
        x += PRECISION;
    }
    area
}
