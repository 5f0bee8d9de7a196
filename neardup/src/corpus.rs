//! JSONL corpus ingestion and signature computation.
//!
//! Each input line is one JSON document; only the `text` field is read.
//! Document keys are `<file>-<lineNo>` with 1-based line numbers, unique
//! within a corpus. Hashing is pure, so documents of one file fan out over
//! the rayon pool; file outputs land in the signature store.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use crate::minhash::MinHasher;
use crate::store;
use crate::{DedupError, Result};

#[derive(Deserialize)]
struct DocumentRecord {
    #[serde(default)]
    text: String,
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Computes signatures for one jsonl file into the signature store.
///
/// Malformed lines, blank lines, and documents with an empty token set are
/// skipped. With `skip_existing` set, a pre-existing signature file is
/// trusted and returned untouched.
pub fn compute_signatures_for_file(
    infile: &Path,
    minhash_dir: &Path,
    hasher: &MinHasher,
    skip_existing: bool,
) -> Result<PathBuf> {
    let out_path = store::signature_path(minhash_dir, infile);
    if skip_existing && out_path.exists() {
        info!(file = %out_path.display(), "reusing existing signature file");
        return Ok(out_path);
    }

    let fname = file_label(infile);
    let file = File::open(infile).map_err(|e| DedupError::io(infile, e))?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .collect::<io::Result<_>>()
        .map_err(|e| DedupError::io(infile, e))?;

    let signatures: Vec<(String, Vec<u64>)> = lines
        .par_iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                return None;
            }
            let record: DocumentRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(err) => {
                    warn!(file = %fname, line = line_no, %err, "skipping malformed json line");
                    return None;
                }
            };
            let signature = hasher.text_signature(&record.text)?;
            Some((format!("{}-{}", fname, line_no), signature))
        })
        .collect();

    store::write_signature_file(&out_path, &signatures)?;
    info!(
        file = %fname,
        documents = signatures.len(),
        "generated minhash signatures"
    );
    Ok(out_path)
}

/// Computes signatures for every `*.jsonl` file in `input_dir`, in
/// lexicographic order.
pub fn compute_signatures_for_dir(
    input_dir: &Path,
    minhash_dir: &Path,
    hasher: &MinHasher,
    skip_existing: bool,
) -> Result<Vec<PathBuf>> {
    jsonl_files(input_dir)?
        .iter()
        .map(|infile| compute_signatures_for_file(infile, minhash_dir, hasher, skip_existing))
        .collect()
}

/// `*.jsonl` files in `dir`, lexicographically sorted.
pub fn jsonl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extension(dir, "jsonl")
}

/// Signature files in `dir`, lexicographically sorted.
pub fn signature_files(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extension(dir, store::SIGNATURE_EXT)
}

fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DedupError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| DedupError::io(dir, e))?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == ext) {
            files.push(path);
        }
    }
    Ok(files.into_iter().sorted().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_signature_file;
    use std::io::Write;

    fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_keys_are_file_and_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let infile = write_jsonl(
            dir.path(),
            "part.jsonl",
            &[
                r#"{"text": "alpha beta gamma"}"#,
                r#"{"text": "delta epsilon zeta"}"#,
            ],
        );
        let hasher = MinHasher::new(32);
        let out = compute_signatures_for_file(&infile, dir.path(), &hasher, false).unwrap();
        let records = read_signature_file(&out).unwrap();
        let keys: Vec<_> = records.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["part.jsonl-1", "part.jsonl-2"]);
    }

    #[test]
    fn test_skip_policies() {
        let dir = tempfile::tempdir().unwrap();
        let infile = write_jsonl(
            dir.path(),
            "messy.jsonl",
            &[
                r#"{"text": "kept document one"}"#,
                "",
                "this is not json",
                r#"{"text": ""}"#,
                r#"{"text": "   "}"#,
                r#"{"title": "no text field"}"#,
                r#"{"text": "kept document two", "meta": {"x": 1}}"#,
            ],
        );
        let hasher = MinHasher::new(32);
        let out = compute_signatures_for_file(&infile, dir.path(), &hasher, false).unwrap();
        let records = read_signature_file(&out).unwrap();
        let keys: Vec<_> = records.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["messy.jsonl-1", "messy.jsonl-7"]);
    }

    #[test]
    fn test_skip_existing_reuses_file() {
        let dir = tempfile::tempdir().unwrap();
        let infile = write_jsonl(dir.path(), "reuse.jsonl", &[r#"{"text": "a b c"}"#]);
        let hasher = MinHasher::new(32);
        let out = compute_signatures_for_file(&infile, dir.path(), &hasher, false).unwrap();

        // Plant a sentinel store; skip_existing must not rewrite it.
        let sentinel = vec![("sentinel-1".to_string(), vec![7u64; 32])];
        crate::store::write_signature_file(&out, &sentinel).unwrap();
        compute_signatures_for_file(&infile, dir.path(), &hasher, true).unwrap();
        assert_eq!(read_signature_file(&out).unwrap(), sentinel);

        // Without the flag the file is recomputed.
        compute_signatures_for_file(&infile, dir.path(), &hasher, false).unwrap();
        let records = read_signature_file(&out).unwrap();
        assert_eq!(records[0].0, "reuse.jsonl-1");
    }

    #[test]
    fn test_directory_listing_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_jsonl(dir.path(), "b.jsonl", &[r#"{"text": "b"}"#]);
        write_jsonl(dir.path(), "a.jsonl", &[r#"{"text": "a"}"#]);
        write_jsonl(dir.path(), "notes.txt", &["ignored"]);
        let files = jsonl_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|p| file_label(p)).collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }
}
