//! Durable per-file persistence of `(key, signature)` pairs.
//!
//! One signature file per source file, so signature computation and index
//! querying can run as decoupled phases. Records are length-prefixed and
//! endian-explicit: `u32 key_len | key bytes | u32 num_perm | num_perm x
//! u64 LE`.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{DedupError, Result};

/// Extension of signature files.
pub const SIGNATURE_EXT: &str = "sig";

// Guards against reading garbage lengths out of a damaged file.
const MAX_KEY_LEN: u32 = 1 << 16;
const MAX_NUM_PERM: u32 = 1 << 20;

/// Signature file path for a source file: `<dir>/<stem>.sig`.
pub fn signature_path(minhash_dir: &Path, input_file: &Path) -> PathBuf {
    let stem = input_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    minhash_dir.join(format!("{}.{}", stem, SIGNATURE_EXT))
}

/// Writes all records to `path`, replacing any previous content.
pub fn write_signature_file(path: &Path, records: &[(String, Vec<u64>)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DedupError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| DedupError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for (key, signature) in records {
        write_record(&mut writer, key, signature).map_err(|e| DedupError::io(path, e))?;
    }
    writer.flush().map_err(|e| DedupError::io(path, e))?;
    Ok(())
}

fn write_record<W: Write>(writer: &mut W, key: &str, signature: &[u64]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(key.len() as u32)?;
    writer.write_all(key.as_bytes())?;
    writer.write_u32::<LittleEndian>(signature.len() as u32)?;
    for slot in signature {
        writer.write_u64::<LittleEndian>(*slot)?;
    }
    Ok(())
}

/// Reads a whole signature file back in record order.
///
/// A clean EOF between records ends the file; anything else (truncated
/// record, oversized length prefix, non-UTF-8 key) is reported as a
/// corrupt signature file.
pub fn read_signature_file(path: &Path) -> Result<Vec<(String, Vec<u64>)>> {
    let file = File::open(path).map_err(|e| DedupError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    loop {
        let key_len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(DedupError::io(path, e)),
        };
        records.push(read_record_body(&mut reader, key_len).map_err(|reason| {
            DedupError::SignatureFile {
                path: path.to_path_buf(),
                reason,
            }
        })?);
    }
    Ok(records)
}

fn read_record_body<R: Read>(reader: &mut R, key_len: u32) -> std::result::Result<(String, Vec<u64>), String> {
    if key_len == 0 || key_len > MAX_KEY_LEN {
        return Err(format!("implausible key length {}", key_len));
    }
    let mut key_bytes = vec![0u8; key_len as usize];
    reader
        .read_exact(&mut key_bytes)
        .map_err(|_| "truncated record key".to_string())?;
    let key = String::from_utf8(key_bytes).map_err(|_| "key is not utf-8".to_string())?;

    let num_perm = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| "truncated signature length".to_string())?;
    if num_perm == 0 || num_perm > MAX_NUM_PERM {
        return Err(format!("implausible signature length {}", num_perm));
    }
    let mut signature = Vec::with_capacity(num_perm as usize);
    for _ in 0..num_perm {
        signature.push(
            reader
                .read_u64::<LittleEndian>()
                .map_err(|_| "truncated signature".to_string())?,
        );
    }
    Ok((key, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minhash::{Bands, MinHasher};

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.sig");
        let records = vec![
            ("a.jsonl-1".to_string(), vec![1u64, 2, 3, 4]),
            ("a.jsonl-2".to_string(), vec![u64::MAX, 0, 7, 9]),
        ];
        write_signature_file(&path, &records).unwrap();
        assert_eq!(read_signature_file(&path).unwrap(), records);
    }

    #[test]
    fn test_empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sig");
        write_signature_file(&path, &[]).unwrap();
        assert!(read_signature_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_band_keys_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sigs.sig");
        let hasher = MinHasher::new(128);
        let bands = Bands::from_threshold(0.8, 128).unwrap();
        let sig = hasher
            .text_signature("documents keep their band keys across serialization")
            .unwrap();
        let before: Vec<_> = bands.iter_bands(&sig).collect();

        write_signature_file(&path, &[("f.jsonl-1".to_string(), sig)]).unwrap();
        let reloaded = read_signature_file(&path).unwrap();
        let after: Vec<_> = bands.iter_bands(&reloaded[0].1).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.sig");
        let records = vec![("key-1".to_string(), vec![5u64; 16])];
        write_signature_file(&path, &records).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();
        match read_signature_file(&path) {
            Err(DedupError::SignatureFile { .. }) => {}
            other => panic!("expected corrupt signature file, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_garbage_prefix_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.sig");
        fs::write(&path, [0xFFu8; 64]).unwrap();
        assert!(matches!(
            read_signature_file(&path),
            Err(DedupError::SignatureFile { .. })
        ));
    }

    #[test]
    fn test_signature_path_naming() {
        let path = signature_path(Path::new("/tmp/minhash"), Path::new("/data/part-01.jsonl"));
        assert_eq!(path, Path::new("/tmp/minhash/part-01.sig"));
    }
}
