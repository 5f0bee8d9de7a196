//! Append-only CSV log of duplicate relationships.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};

use crate::index::DuplicateRecord;
use crate::{DedupError, Result};

/// Column layout of the duplicate log, fixed by workflow and backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkLayout {
    /// `key,dup_key` — Redis backend, single-file workflow.
    KeyPair,
    /// `corpus,key,dup_key` — Redis backend, corpus workflows.
    CorpusKeyPair,
    /// `corpus,dup_key` — Bloom backend; only the observer side is known.
    CorpusKey,
}

impl SinkLayout {
    fn header(&self) -> &'static [&'static str] {
        match self {
            SinkLayout::KeyPair => &["key", "dup_key"],
            SinkLayout::CorpusKeyPair => &["corpus", "key", "dup_key"],
            SinkLayout::CorpusKey => &["corpus", "dup_key"],
        }
    }
}

/// Appends duplicate records to a CSV file under a single-writer
/// assumption. The header row is written only when the file is empty at
/// open.
pub struct DuplicateSink {
    writer: Writer<File>,
    layout: SinkLayout,
    path: PathBuf,
}

impl DuplicateSink {
    pub fn append(path: &Path, layout: SinkLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DedupError::io(path, e))?;
        let is_empty = file.metadata().map_err(|e| DedupError::io(path, e))?.len() == 0;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_empty {
            writer.write_record(layout.header())?;
        }
        Ok(DuplicateSink {
            writer,
            layout,
            path: path.to_path_buf(),
        })
    }

    pub fn write(&mut self, corpus: &str, record: &DuplicateRecord) -> Result<()> {
        let dup_key = record.dup_key.as_deref().unwrap_or_default();
        match self.layout {
            SinkLayout::KeyPair => self.writer.write_record([record.key.as_str(), dup_key])?,
            SinkLayout::CorpusKeyPair => {
                self.writer
                    .write_record([corpus, record.key.as_str(), dup_key])?
            }
            SinkLayout::CorpusKey => self.writer.write_record([corpus, record.key.as_str()])?,
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| DedupError::io(&self.path, e))
    }
}
