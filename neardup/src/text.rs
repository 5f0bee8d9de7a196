use std::collections::HashSet;
use std::hash::Hash;

/// Splits text on any run of whitespace.
///
/// Tokens are taken as-is: no casefolding, no punctuation stripping, no
/// Unicode normalization. Duplicate detection operates on the raw token
/// set by design.
pub fn whitespace_split(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// Exact Jaccard similarity over two token streams.
pub fn compute_jaccard_similarity<T, U>(iter_1: T, iter_2: T) -> f64
where
    T: Iterator<Item = U>,
    U: Hash + Eq,
{
    let h1 = HashSet::<U>::from_iter(iter_1);
    let h2 = HashSet::<U>::from_iter(iter_2);
    let intersection_len = h1.intersection(&h2).count();
    intersection_len as f64 / (h1.len() + h2.len() - intersection_len) as f64
}
