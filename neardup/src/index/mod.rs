mod bloom;
mod redis;

pub use self::bloom::{clear_backing, BloomLshIndex, BloomParams};
pub use self::redis::{RedisLshIndex, RedisParams};

use crate::Result;

/// An edge asserting similarity. `dup_key` names the previously indexed
/// counterpart when the backend stores document identifiers; the Bloom
/// backend only knows the observer side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    pub key: String,
    pub dup_key: Option<String>,
}

/// The query-then-maybe-insert protocol both backends implement.
///
/// A backend decides whether the arriving document is a duplicate of
/// something already indexed, inserts it when it is not, and reports the
/// duplicate relationships it can attribute. For a stream of
/// near-duplicates only the first seen is indexed; later arrivals are
/// reported.
pub trait DedupIndex {
    fn dedup_and_insert(&mut self, key: &str, signature: &[u64]) -> Result<Vec<DuplicateRecord>>;

    fn num_bands(&self) -> usize;

    /// Flushes backend state to durable storage. Called once on clean
    /// shutdown.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
