use std::hash::{BuildHasher, Hash, Hasher};

use fnv::FnvBuildHasher;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

static MERSENNE_PRIME: u64 = (1 << 61) - 1;
static MAX_HASH: u64 = (1 << 32) - 1;

/// Seed used when none is supplied, so independent runs agree bit-for-bit.
pub const DEFAULT_SEED: u64 = 1;

/// Computes fixed-length MinHash signatures from token streams.
///
/// The `num_perm` hash permutations are parameterized by `(a, b)` pairs
/// sampled from a seeded RNG; the same `(num_perm, seed)` therefore yields
/// identical signatures across runs and platforms. Token base hashes use
/// FNV-64, which is stable everywhere.
#[derive(Clone)]
pub struct MinHasher<B: BuildHasher = FnvBuildHasher> {
    build_hasher: B,
    a: Vec<u64>,
    b: Vec<u64>,
    num_perm: usize,
}

impl MinHasher<FnvBuildHasher> {
    pub fn new(num_perm: usize) -> Self {
        Self::new_with_seed(num_perm, DEFAULT_SEED)
    }

    pub fn new_with_seed(num_perm: usize, seed: u64) -> Self {
        Self::new_with_hasher_and_seed(num_perm, FnvBuildHasher::default(), seed)
    }
}

impl<B: BuildHasher> MinHasher<B> {
    pub fn new_with_hasher_and_seed(num_perm: usize, build_hasher: B, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let rand_range1 = Uniform::from(1..MERSENNE_PRIME);
        let rand_range2 = Uniform::from(0..MERSENNE_PRIME);
        MinHasher {
            build_hasher,
            a: (0..num_perm)
                .map(|_| rand_range1.sample(&mut rng))
                .collect(),
            b: (0..num_perm)
                .map(|_| rand_range2.sample(&mut rng))
                .collect(),
            num_perm,
        }
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    /// Creates the signature of a token stream, or `None` when the stream
    /// is empty. Duplicate tokens are harmless: the per-slot minimum is
    /// invariant under repetition.
    pub fn signature<T, U>(&self, iter: T) -> Option<Vec<u64>>
    where
        T: Iterator<Item = U>,
        U: Hash,
    {
        let hashes: Vec<u64> = iter
            .map(|item| {
                let mut hasher = self.build_hasher.build_hasher();
                item.hash(&mut hasher);
                hasher.finish()
            })
            .collect::<Vec<_>>();

        match hashes.len() {
            len if len > 0 => Some(
                self.a
                    .iter()
                    .zip(self.b.iter())
                    .map(|ab| {
                        hashes
                            .iter()
                            .map(|hash| {
                                (hash.wrapping_mul(*ab.0).wrapping_add(*ab.1) % MERSENNE_PRIME)
                                    & MAX_HASH
                            })
                            .min()
                            .unwrap_or(MAX_HASH)
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Signature of a document body: whitespace tokens, `None` when the
    /// body holds no tokens.
    pub fn text_signature(&self, text: &str) -> Option<Vec<u64>> {
        self.signature(crate::text::whitespace_split(text))
    }

    pub fn compute_similarity<T, U>(&self, iter_1: T, iter_2: T) -> Option<f64>
    where
        T: Iterator<Item = U>,
        U: Hash,
    {
        match (self.signature(iter_1), self.signature(iter_2)) {
            (Some(sig_1), Some(sig_2)) => {
                Some(super::compute_minhash_similarity(&sig_1, &sig_2))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{compute_jaccard_similarity, whitespace_split};

    static S1: &'static str = "local sensitive hashing is cool";
    static S3: &'static str = "local sensitive hashing is awesome";

    static S10: &'static str = "If you're still searching, we can visit a few open houses together in the next few weeks. It might help give clarity on what you're looking for. What do you think? - Gail's assistant w/eXp Realty";
    static S11: &'static str = "If you're still searching, we can visit a few open houses together in the next few weeks. It might help give clarity on what you're looking for. What do you think? - Elle's assistant w/Bright Birch Real Estate";

    #[test]
    fn test_min_hash_similarity() {
        let min_hash = MinHasher::new(200);
        let similarity = min_hash
            .compute_similarity(whitespace_split(S10), whitespace_split(S11))
            .unwrap();
        let actual_similarity =
            compute_jaccard_similarity(whitespace_split(S10), whitespace_split(S11));
        println!("actual {} estimated {}", actual_similarity, similarity);
        assert!(f64::abs(similarity - actual_similarity) < 0.15);

        let estimated_similarity = min_hash
            .compute_similarity(whitespace_split(S1), whitespace_split(S3))
            .unwrap();
        let actual_similarity =
            compute_jaccard_similarity(whitespace_split(S1), whitespace_split(S3));
        assert!(f64::abs(estimated_similarity - actual_similarity) < 0.15);
    }

    #[test]
    fn test_estimate_tracks_jaccard_on_large_sets() {
        let min_hash = MinHasher::new(128);
        let set_a: Vec<String> = (0..100).map(|i| format!("tok{}", i)).collect();
        let set_b: Vec<String> = (50..150).map(|i| format!("tok{}", i)).collect();
        let estimated = min_hash
            .compute_similarity(set_a.iter(), set_b.iter())
            .unwrap();
        let actual = compute_jaccard_similarity(set_a.iter(), set_b.iter());
        assert!((actual - 1.0 / 3.0).abs() < 1e-9);
        assert!(f64::abs(estimated - actual) < 0.15);
    }

    #[test]
    fn test_deterministic_across_instances() {
        let h1 = MinHasher::new(128);
        let h2 = MinHasher::new(128);
        assert_eq!(h1.text_signature(S10), h2.text_signature(S10));

        let seeded = MinHasher::new_with_seed(128, 42);
        assert_ne!(h1.text_signature(S10), seeded.text_signature(S10));
    }

    #[test]
    fn test_signature_invariant_under_token_repetition() {
        let min_hash = MinHasher::new(64);
        let once = min_hash.text_signature("alpha beta gamma");
        let repeated = min_hash.text_signature("alpha beta gamma alpha beta gamma");
        assert_eq!(once, repeated);
    }

    #[test]
    fn test_empty_token_stream_has_no_signature() {
        let min_hash = MinHasher::new(128);
        assert_eq!(min_hash.text_signature(""), None);
        assert_eq!(min_hash.text_signature("   \t \n"), None);
    }

    #[test]
    fn test_single_perm_degenerate() {
        let min_hash = MinHasher::new(1);
        let sig = min_hash.text_signature("one two three").unwrap();
        assert_eq!(sig.len(), 1);
        assert_eq!(sig, min_hash.text_signature("one two three").unwrap());
    }

    #[test]
    fn test_slots_fit_in_hash_range() {
        let min_hash = MinHasher::new(128);
        let sig = min_hash.text_signature(S10).unwrap();
        assert!(sig.iter().all(|&v| v <= (1 << 32) - 1));
    }
}
