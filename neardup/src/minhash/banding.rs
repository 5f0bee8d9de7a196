use smallvec::SmallVec;

use crate::{DedupError, Result};

/// Serialized rows of one band: fixed-width little-endian bytes, inline up
/// to eight rows.
pub type BandBytes = SmallVec<[u8; 64]>;

/// Deterministic projection of a signature into `b` band keys.
///
/// Band `i` covers the contiguous slice `sig[i*r..(i+1)*r]`; collisions on
/// the serialized slice are the candidate-retrieval mechanism for both
/// index backends. The parameters are fixed at construction and shared by
/// every signature an index ever sees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bands {
    b: usize,
    r: usize,
    num_perm: usize,
}

impl Bands {
    pub fn new(num_bands: usize, band_width: usize, num_perm: usize) -> Result<Self> {
        if num_bands < 1 || band_width < 1 {
            return Err(DedupError::Config(format!(
                "banding requires b >= 1 and r >= 1, got b={} r={}",
                num_bands, band_width
            )));
        }
        if num_bands * band_width > num_perm {
            return Err(DedupError::Config(format!(
                "banding requires b*r <= num_perm, got b={} r={} num_perm={}",
                num_bands, band_width, num_perm
            )));
        }
        Ok(Bands {
            b: num_bands,
            r: band_width,
            num_perm,
        })
    }

    /// Derives `(b, r)` from a Jaccard threshold via
    /// [`calculate_minhash_params`](super::calculate_minhash_params).
    pub fn from_threshold(jaccard_threshold: f64, num_perm: usize) -> Result<Self> {
        if !(jaccard_threshold > 0.0 && jaccard_threshold <= 1.0) {
            return Err(DedupError::Config(format!(
                "similarity threshold must be in (0, 1], got {}",
                jaccard_threshold
            )));
        }
        if num_perm < 1 {
            return Err(DedupError::Config("num_perm must be >= 1".to_string()));
        }
        let (b, r) = super::calculate_minhash_params(jaccard_threshold, num_perm);
        Bands::new(b, r, num_perm)
    }

    pub fn num_bands(&self) -> usize {
        self.b
    }

    pub fn band_width(&self) -> usize {
        self.r
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    /// Serializes the rows of band `band` of `signature`.
    pub fn band_bytes(&self, signature: &[u64], band: usize) -> BandBytes {
        debug_assert!(signature.len() >= self.b * self.r);
        let rows = &signature[band * self.r..(band + 1) * self.r];
        let mut bytes = BandBytes::with_capacity(self.r * 8);
        for row in rows {
            bytes.extend_from_slice(&row.to_le_bytes());
        }
        bytes
    }

    /// Iterates `(band_index, band_bytes)` over all bands of `signature`.
    pub fn iter_bands<'a>(
        &'a self,
        signature: &'a [u64],
    ) -> impl Iterator<Item = (usize, BandBytes)> + 'a {
        (0..self.b).map(move |band| (band, self.band_bytes(signature, band)))
    }

    /// True when any band of the two signatures collides, i.e. the pair
    /// would be retrieved as duplicate candidates.
    pub fn collides(&self, signature_1: &[u64], signature_2: &[u64]) -> bool {
        (0..self.b).any(|band| {
            let start = band * self.r;
            signature_1[start..start + self.r] == signature_2[start..start + self.r]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash::MinHasher;

    #[test]
    fn test_band_bytes_are_fixed_width_le() {
        let bands = Bands::new(4, 2, 8).unwrap();
        let signature = vec![1u64, 2, 3, 4, 5, 6, 7, 0x0102030405060708];
        let bytes = bands.band_bytes(&signature, 0);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        let last = bands.band_bytes(&signature, 3);
        assert_eq!(&last[8..], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_banding_is_deterministic() {
        let hasher = MinHasher::new(128);
        let bands = Bands::from_threshold(0.8, 128).unwrap();
        let sig = hasher.text_signature("some document body here").unwrap();
        for (band, bytes) in bands.iter_bands(&sig) {
            assert_eq!(bytes, bands.band_bytes(&sig, band));
        }
    }

    #[test]
    fn test_identical_signatures_collide_in_every_band() {
        let hasher = MinHasher::new(128);
        let bands = Bands::from_threshold(0.8, 128).unwrap();
        let sig = hasher.text_signature("the quick brown fox").unwrap();
        assert!(bands.collides(&sig, &sig));
        assert_eq!(bands.iter_bands(&sig).count(), bands.num_bands());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(Bands::new(0, 4, 128).is_err());
        assert!(Bands::new(4, 0, 128).is_err());
        assert!(Bands::new(33, 4, 128).is_err());
        assert!(Bands::from_threshold(0.0, 128).is_err());
        assert!(Bands::from_threshold(1.5, 128).is_err());
        assert!(Bands::from_threshold(0.8, 0).is_err());
    }

    #[test]
    fn test_threshold_one_requires_exact_signature_match() {
        let bands = Bands::from_threshold(1.0, 128).unwrap();
        assert_eq!(bands.num_bands(), 1);
        assert_eq!(bands.band_width(), 128);

        let hasher = MinHasher::new(128);
        let sig_a = hasher.text_signature("a b c d e f g h").unwrap();
        let sig_b = hasher.text_signature("a b c d e f g z").unwrap();
        assert!(bands.collides(&sig_a, &sig_a));
        assert!(!bands.collides(&sig_a, &sig_b));
    }

    #[test]
    fn test_partial_overlap_rarely_collides_at_high_threshold() {
        // Jaccard 7/9 against threshold 0.9: the optimized (b=5, r=25)
        // S-curve keeps the collision probability under one percent, so
        // over 100 independent hashers at most a handful may report.
        let bands = Bands::from_threshold(0.9, 128).unwrap();
        let doc_a = "a b c d e f g h";
        let doc_b = "a b c d e f g z";
        let mut reported = 0;
        for seed in 0..100 {
            let hasher = MinHasher::new_with_seed(128, seed);
            let sig_a = hasher.text_signature(doc_a).unwrap();
            let sig_b = hasher.text_signature(doc_b).unwrap();
            if bands.collides(&sig_a, &sig_b) {
                reported += 1;
            }
        }
        assert!(reported <= 5, "reported {} of 100 trials", reported);
    }
}
