//! The dedup coordinator: a single logical stream of signatures through
//! one index backend.
//!
//! Signature computation parallelizes freely, but the query-then-insert
//! sequence must be serialized per index to keep the
//! at-most-one-indexed-instance invariant, so the coordinator consumes
//! pre-computed signature files in a plain loop and owns the backend
//! handle exclusively for the session.

use std::path::Path;

use tracing::{error, info};

use crate::corpus;
use crate::index::DedupIndex;
use crate::sink::DuplicateSink;
use crate::store;
use crate::{DedupError, Result};

pub struct Deduplicator<I: DedupIndex> {
    index: I,
}

impl<I: DedupIndex> Deduplicator<I> {
    pub fn new(index: I) -> Self {
        Deduplicator { index }
    }

    /// Streams one signature file through the index. Duplicate records go
    /// to the sink in processing order; the sink is flushed before
    /// returning so a later abort cannot lose reported duplicates.
    pub fn dedup_signature_file(
        &mut self,
        path: &Path,
        corpus_name: &str,
        sink: &mut DuplicateSink,
    ) -> Result<usize> {
        let records = store::read_signature_file(path)?;
        let mut duplicates = 0;
        for (key, signature) in &records {
            for record in self.index.dedup_and_insert(key, signature)? {
                sink.write(corpus_name, &record)?;
                duplicates += 1;
            }
        }
        sink.flush()?;
        info!(
            file = %path.display(),
            documents = records.len(),
            duplicates,
            "deduplicated signature file"
        );
        Ok(duplicates)
    }

    /// Streams every signature file of a corpus directory, in
    /// lexicographic order. A corrupt file aborts that file only; backend
    /// failures abort the run.
    pub fn dedup_corpus(
        &mut self,
        minhash_dir: &Path,
        corpus_name: &str,
        sink: &mut DuplicateSink,
    ) -> Result<usize> {
        let mut total = 0;
        for file in corpus::signature_files(minhash_dir)? {
            match self.dedup_signature_file(&file, corpus_name, sink) {
                Ok(count) => total += count,
                Err(DedupError::SignatureFile { path, reason }) => {
                    error!(file = %path.display(), %reason, "skipping corrupt signature file");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }

    /// Flushes the backend and hands the index back.
    pub fn finish(mut self) -> Result<I> {
        self.index.flush()?;
        Ok(self.index)
    }

    pub fn index(&self) -> &I {
        &self.index
    }
}
