//! LSHBloom: a disk-backed Bloom filter per band.
//!
//! The Redis index's footprint grows with every stored document key. For
//! corpora in the tens of billions of documents we only need one-sided
//! reporting (is this a duplicate of anything already indexed?), so each
//! band keeps a memory-mapped Bloom filter of band-key membership instead
//! of an inverted index. Membership is one-way: once a band key is
//! inserted it stays present, and nothing can be deleted.
//!
//! Backing layout per band, file `band-<i>.bf`: a fixed header
//! `{magic, version, m, k, n_inserted}` followed by `ceil(m/8)` bytes of
//! bit array. The maps are exclusive to one process; a crash mid-insert
//! leaves some bands updated, which on restart is indistinguishable from a
//! not-yet-inserted document or reports the document as a duplicate of
//! itself. Both outcomes are benign.

use std::fs::{self, OpenOptions};
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use siphasher::sip::SipHasher24;
use tracing::{debug, info};

use super::{DedupIndex, DuplicateRecord};
use crate::minhash::Bands;
use crate::{DedupError, Result};

const MAGIC: &[u8; 8] = b"NDBLOOM1";
const VERSION: u32 = 1;

// Header offsets.
const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 8;
const NUM_BITS_OFFSET: usize = 12;
const NUM_HASHES_OFFSET: usize = 20;
const NUM_INSERTED_OFFSET: usize = 24;
const HEADER_LEN: usize = 32;

/// Sizing parameters for the Bloom backend.
#[derive(Clone, Debug)]
pub struct BloomParams {
    /// Expected total number of distinct documents the index will hold.
    pub expected_items: u64,
    /// Overall false-positive budget for the banded system. The per-band
    /// budget is derived as `1 - (1 - fp)^(1/b)` so that a match in any of
    /// the `b` bands stays within the overall budget.
    pub false_positive_rate: f64,
    /// Directory holding one `band-<i>.bf` file per band.
    pub save_dir: PathBuf,
}

impl BloomParams {
    fn validate(&self) -> Result<()> {
        if self.expected_items < 1 {
            return Err(DedupError::Config(
                "bloom index needs an expected corpus size of at least 1".to_string(),
            ));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(DedupError::Config(format!(
                "false positive rate must be in (0, 1), got {}",
                self.false_positive_rate
            )));
        }
        Ok(())
    }
}

/// One memory-mapped Bloom filter.
struct BandFilter {
    map: MmapMut,
    path: PathBuf,
    num_bits: u64,
    num_hashes: u32,
}

impl BandFilter {
    fn open(path: &Path, num_bits: u64, num_hashes: u32) -> Result<Self> {
        let byte_len = HEADER_LEN as u64 + (num_bits + 7) / 8;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| DedupError::io(path, e))?;
        let existing_len = file.metadata().map_err(|e| DedupError::io(path, e))?.len();
        let fresh = existing_len == 0;
        if fresh {
            file.set_len(byte_len).map_err(|e| DedupError::io(path, e))?;
        } else if existing_len != byte_len {
            return Err(DedupError::BloomHeader {
                path: path.to_path_buf(),
                reason: format!("expected {} bytes, found {}", byte_len, existing_len),
            });
        }

        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| DedupError::io(path, e))?;
        if fresh {
            map[MAGIC_OFFSET..MAGIC_OFFSET + 8].copy_from_slice(MAGIC);
            LittleEndian::write_u32(&mut map[VERSION_OFFSET..NUM_BITS_OFFSET], VERSION);
            LittleEndian::write_u64(&mut map[NUM_BITS_OFFSET..NUM_HASHES_OFFSET], num_bits);
            LittleEndian::write_u32(&mut map[NUM_HASHES_OFFSET..NUM_INSERTED_OFFSET], num_hashes);
            LittleEndian::write_u64(&mut map[NUM_INSERTED_OFFSET..HEADER_LEN], 0);
        } else {
            Self::validate_header(&map, path, num_bits, num_hashes)?;
        }
        Ok(BandFilter {
            map,
            path: path.to_path_buf(),
            num_bits,
            num_hashes,
        })
    }

    fn validate_header(map: &MmapMut, path: &Path, num_bits: u64, num_hashes: u32) -> Result<()> {
        let mismatch = |reason: String| DedupError::BloomHeader {
            path: path.to_path_buf(),
            reason,
        };
        if &map[MAGIC_OFFSET..MAGIC_OFFSET + 8] != MAGIC {
            return Err(mismatch("bad magic".to_string()));
        }
        let version = LittleEndian::read_u32(&map[VERSION_OFFSET..NUM_BITS_OFFSET]);
        if version != VERSION {
            return Err(mismatch(format!("unsupported version {}", version)));
        }
        let stored_bits = LittleEndian::read_u64(&map[NUM_BITS_OFFSET..NUM_HASHES_OFFSET]);
        if stored_bits != num_bits {
            return Err(mismatch(format!(
                "bit array holds {} bits, parameters require {}",
                stored_bits, num_bits
            )));
        }
        let stored_hashes = LittleEndian::read_u32(&map[NUM_HASHES_OFFSET..NUM_INSERTED_OFFSET]);
        if stored_hashes != num_hashes {
            return Err(mismatch(format!(
                "filter uses {} hashes, parameters require {}",
                stored_hashes, num_hashes
            )));
        }
        Ok(())
    }

    fn contains(&self, element: &[u8]) -> bool {
        bit_positions(self.num_bits, self.num_hashes, element).all(|pos| {
            let byte = self.map[HEADER_LEN + (pos / 8) as usize];
            byte & (1 << (pos % 8)) != 0
        })
    }

    fn set(&mut self, element: &[u8]) {
        for pos in bit_positions(self.num_bits, self.num_hashes, element) {
            self.map[HEADER_LEN + (pos / 8) as usize] |= 1 << (pos % 8);
        }
        let inserted = self.num_inserted() + 1;
        LittleEndian::write_u64(&mut self.map[NUM_INSERTED_OFFSET..HEADER_LEN], inserted);
    }

    fn num_inserted(&self) -> u64 {
        LittleEndian::read_u64(&self.map[NUM_INSERTED_OFFSET..HEADER_LEN])
    }

    fn flush(&self) -> Result<()> {
        self.map.flush().map_err(|e| DedupError::io(&self.path, e))
    }
}

impl Drop for BandFilter {
    fn drop(&mut self) {
        let _ = self.map.flush();
    }
}

/// Array of `b` band filters over one backing directory.
pub struct BloomLshIndex {
    bands: Bands,
    filters: Vec<BandFilter>,
}

impl BloomLshIndex {
    /// Opens (or creates) the backing files under `params.save_dir`.
    ///
    /// Existing files must have been created with the same derived
    /// `(m, k)`; a mismatch fails startup rather than silently degrading
    /// the false-positive budget.
    pub fn open(params: &BloomParams, jaccard_threshold: f64, num_perm: usize) -> Result<Self> {
        params.validate()?;
        let bands = Bands::from_threshold(jaccard_threshold, num_perm)?;

        let band_fp = per_band_fp(params.false_positive_rate, bands.num_bands());
        let num_bits = optimal_num_bits(params.expected_items, band_fp);
        let num_hashes = optimal_num_hashes(num_bits, params.expected_items);

        fs::create_dir_all(&params.save_dir).map_err(|e| DedupError::io(&params.save_dir, e))?;
        let filters = (0..bands.num_bands())
            .map(|band| BandFilter::open(&band_path(&params.save_dir, band), num_bits, num_hashes))
            .collect::<Result<Vec<_>>>()?;

        info!(
            num_bands = bands.num_bands(),
            band_width = bands.band_width(),
            bits_per_band = num_bits,
            hashes_per_band = num_hashes,
            band_fp,
            "opened bloom lsh index"
        );
        Ok(BloomLshIndex { bands, filters })
    }

    /// True when any band reports all bits set for its band key.
    pub fn contains(&self, signature: &[u64]) -> bool {
        self.bands
            .iter_bands(signature)
            .any(|(band, bytes)| self.filters[band].contains(&bytes))
    }

    /// Marks every band key of `signature` present.
    pub fn insert(&mut self, signature: &[u64]) {
        for (band, bytes) in self.bands.iter_bands(signature) {
            self.filters[band].set(&bytes);
        }
    }

    /// Documents inserted so far, as recorded in the backing headers.
    pub fn num_inserted(&self) -> u64 {
        self.filters.first().map_or(0, BandFilter::num_inserted)
    }

    pub fn bands(&self) -> &Bands {
        &self.bands
    }
}

impl DedupIndex for BloomLshIndex {
    /// A membership hit in any band declares the document a duplicate and
    /// leaves the index untouched; only unseen documents are inserted.
    fn dedup_and_insert(&mut self, key: &str, signature: &[u64]) -> Result<Vec<DuplicateRecord>> {
        if self.contains(signature) {
            debug!(key, "duplicate band key membership");
            return Ok(vec![DuplicateRecord {
                key: key.to_string(),
                dup_key: None,
            }]);
        }
        self.insert(signature);
        Ok(Vec::new())
    }

    fn num_bands(&self) -> usize {
        self.bands.num_bands()
    }

    fn flush(&mut self) -> Result<()> {
        for filter in &self.filters {
            filter.flush()?;
        }
        Ok(())
    }
}

/// The `k` bit positions of an element, by double hashing two fixed-key
/// SipHash-2-4 digests.
fn bit_positions(num_bits: u64, num_hashes: u32, element: &[u8]) -> impl Iterator<Item = u64> {
    let mut sip_1 = SipHasher24::new_with_keys(1, 2);
    let mut sip_2 = SipHasher24::new_with_keys(3, 4);
    sip_1.write(element);
    sip_2.write(element);
    let (h1, h2) = (sip_1.finish(), sip_2.finish());
    (0..num_hashes as u64).map(move |j| h1.wrapping_add(j.wrapping_mul(h2)) % num_bits)
}

fn band_path(save_dir: &Path, band: usize) -> PathBuf {
    save_dir.join(format!("band-{}.bf", band))
}

/// Removes the `band-<i>.bf` backing files under `save_dir`, if any.
pub fn clear_backing(save_dir: &Path) -> Result<()> {
    if !save_dir.exists() {
        return Ok(());
    }
    let entries = fs::read_dir(save_dir).map_err(|e| DedupError::io(save_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DedupError::io(save_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("band-") && name.ends_with(".bf") {
            fs::remove_file(entry.path()).map_err(|e| DedupError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

fn per_band_fp(overall_fp: f64, num_bands: usize) -> f64 {
    1.0 - (1.0 - overall_fp).powf(1.0 / num_bands as f64)
}

fn optimal_num_bits(expected_items: u64, fp: f64) -> u64 {
    let ln2 = std::f64::consts::LN_2;
    (-(expected_items as f64) * fp.ln() / (ln2 * ln2)).ceil() as u64
}

fn optimal_num_hashes(num_bits: u64, expected_items: u64) -> u32 {
    let k = (num_bits as f64 / expected_items as f64) * std::f64::consts::LN_2;
    (k.round() as u32).max(1)
}
