/*!
This library implements near-duplicate document detection over large text
corpora using [MinHash](https://en.wikipedia.org/wiki/MinHash) signatures
and Locality Sensitive Hashing.

Documents are whitespace-tokenized and summarized into fixed-length MinHash
signatures. Signatures are projected into `b` band keys; two documents are
duplicate candidates when any band key collides. Two interchangeable index
backends record band-key occupancy: a Redis-backed inverted index that
remembers which documents occupy each bucket, and a disk-backed
Bloom-filter-per-band index ("LSHBloom") that remembers band-key membership
only, trading duplicate attribution for a footprint that stays flat in the
number of indexed documents.

## Example

```
use neardup::minhash::{calculate_minhash_params, Bands, MinHasher};
use neardup::text::whitespace_split;

let hasher = MinHasher::new(128);
let a = hasher.signature(whitespace_split("the quick brown fox")).unwrap();
let b = hasher.signature(whitespace_split("the quick brown fox")).unwrap();
assert_eq!(a, b);

let (num_bands, band_width) = calculate_minhash_params(0.8, 128);
let bands = Bands::new(num_bands, band_width, 128).unwrap();
assert_eq!(bands.band_bytes(&a, 0), bands.band_bytes(&b, 0));
```

## References
[[1] Chapter 3, Mining of Massive Datasets](http://www.mmds.org)

[[2] Bloom, Space/Time Trade-offs in Hash Coding with Allowable Errors](https://dl.acm.org/doi/10.1145/362686.362692)
*/

pub mod corpus;
pub mod dedup;
mod error;
pub mod index;
pub mod minhash;
pub mod sink;
pub mod store;
pub mod text;

pub use error::{DedupError, Result};

/// Default signature length.
pub const DEFAULT_NUM_PERM: usize = 128;

/// Default Jaccard similarity threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Default overall false-positive budget for the LSHBloom backend.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;
