//! Redis-backed banded inverted index.
//!
//! Each band maps serialized band keys to the set of document keys that
//! produced them, under the key namespace `<basename>_bucket_<band>_<hex>`.
//! Set insertion is idempotent, so retrying a document after a partial
//! failure is safe.

use std::thread;
use std::time::Duration;

use ahash::AHashSet;
use redis::{Client, Connection};
use tracing::{debug, warn};

use super::{DedupIndex, DuplicateRecord};
use crate::minhash::Bands;
use crate::Result;

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Connection settings for the Redis backend.
#[derive(Clone, Debug)]
pub struct RedisParams {
    pub host: String,
    pub port: u16,
    /// Namespace prefix for all bucket keys, allowing several indices to
    /// share one server.
    pub basename: String,
}

impl Default for RedisParams {
    fn default() -> Self {
        RedisParams {
            host: "localhost".to_string(),
            port: 6379,
            basename: "neardup".to_string(),
        }
    }
}

pub struct RedisLshIndex {
    conn: Connection,
    bands: Bands,
    basename: String,
}

impl RedisLshIndex {
    /// Connects and fixes the banding parameters for the lifetime of the
    /// index.
    pub fn connect(params: &RedisParams, jaccard_threshold: f64, num_perm: usize) -> Result<Self> {
        let bands = Bands::from_threshold(jaccard_threshold, num_perm)?;
        let client = Client::open(format!("redis://{}:{}/", params.host, params.port))?;
        let conn = client.get_connection()?;
        debug!(
            host = %params.host,
            port = params.port,
            num_bands = bands.num_bands(),
            band_width = bands.band_width(),
            "connected redis lsh index"
        );
        Ok(RedisLshIndex {
            conn,
            bands,
            basename: params.basename.clone(),
        })
    }

    fn bucket_key(&self, band: usize, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}_bucket_{}_{}", self.basename, band, hex)
    }

    /// Union of the document-key sets behind every band of `signature`.
    pub fn query(&mut self, signature: &[u64]) -> Result<AHashSet<String>> {
        let mut pipe = redis::pipe();
        for (band, bytes) in self.bands.iter_bands(signature) {
            pipe.smembers(self.bucket_key(band, &bytes));
        }
        let members: Vec<Vec<String>> = with_retry(&mut self.conn, |conn| pipe.query(conn))?;
        let mut matches = AHashSet::new();
        for bucket in members {
            matches.extend(bucket);
        }
        Ok(matches)
    }

    /// Adds `key` to every band bucket of `signature`. Idempotent.
    pub fn insert(&mut self, key: &str, signature: &[u64]) -> Result<()> {
        let mut pipe = redis::pipe();
        for (band, bytes) in self.bands.iter_bands(signature) {
            pipe.sadd(self.bucket_key(band, &bytes), key).ignore();
        }
        with_retry(&mut self.conn, |conn| pipe.query::<()>(conn))?;
        Ok(())
    }

    pub fn bands(&self) -> &Bands {
        &self.bands
    }
}

fn with_retry<T>(
    conn: &mut Connection,
    mut op: impl FnMut(&mut Connection) -> redis::RedisResult<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op(conn) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_RETRIES && (err.is_io_error() || err.is_timeout()) => {
                attempt += 1;
                warn!(attempt, error = %err, "transient redis failure, retrying");
                thread::sleep(RETRY_BACKOFF * attempt);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

impl DedupIndex for RedisLshIndex {
    /// Inserts when the index has never seen these band keys, or when the
    /// only match is `key` itself (a self-echo left by an earlier partial
    /// insert of the same document). Every other match is reported.
    fn dedup_and_insert(&mut self, key: &str, signature: &[u64]) -> Result<Vec<DuplicateRecord>> {
        let result = self.query(signature)?;
        let fresh = result.is_empty() || (result.len() == 1 && result.contains(key));
        if fresh {
            self.insert(key, signature)?;
        }
        Ok(result
            .into_iter()
            .filter(|dup_key| dup_key != key)
            .map(|dup_key| DuplicateRecord {
                key: key.to_string(),
                dup_key: Some(dup_key),
            })
            .collect())
    }

    fn num_bands(&self) -> usize {
        self.bands.num_bands()
    }
}
