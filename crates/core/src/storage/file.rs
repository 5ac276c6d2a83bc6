//! File-based storage for native platforms
//!
//! Every file is a bincode payload followed by an 8-byte integrity footer:
//!
//! ```text
//! [bincode payload][magic 4 bytes][CRC32 of payload, 4 bytes BE]
//! ```
//!
//! Index files use magic `SXI1`, point dumps use `SXD1`, so a point dump
//! passed where an index is expected fails with a clear error instead of a
//! confusing deserialization failure.
//!
//! # Features
//!
//! - **Atomic Writes**: Write to temporary files and rename to prevent corruption
//! - **Integrity**: CRC32 footer checked on every load
//! - **Version Check**: Files from a different format version are rejected
//!
//! # Examples
//!
//! ```no_run
//! use simdex_core::storage::{load_points, save_points, data_path};
//! use simdex_core::{Point, PointData};
//! use std::path::Path;
//!
//! # fn main() -> simdex_core::Result<()> {
//! let points = vec![Point::new(7, PointData::Text(b"hello".to_vec()))];
//! let path = data_path(Path::new("/tmp/words.idx"));
//! save_points(&path, &points)?;
//! assert_eq!(load_points(&path)?, points);
//! # Ok(())
//! # }
//! ```

use crate::config::{DATA_FILE_SUFFIX, STORAGE_VERSION};
use crate::point::{DistanceKind, Point, PointKind};
use crate::{Params, Result, SimdexError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const INDEX_MAGIC: &[u8; 4] = b"SXI1";
const POINTS_MAGIC: &[u8; 4] = b"SXD1";
const FOOTER_LEN: usize = 8;
const TMP_EXTENSION: &str = ".tmp";

/// Everything needed to recreate an index's space and method on load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFileHeader {
    /// Storage format version
    pub version: u32,
    /// Unix timestamp when the file was written
    pub created_at: u64,
    pub point_kind: PointKind,
    pub distance_kind: DistanceKind,
    pub space_name: String,
    pub space_params: Params,
    pub method_name: String,
    /// Dimension inferred from the indexed points, if any
    pub dimension: Option<usize>,
    /// Number of points the saved structure covers
    pub point_count: usize,
}

impl IndexFileHeader {
    pub fn new(
        point_kind: PointKind,
        distance_kind: DistanceKind,
        space_name: impl Into<String>,
        space_params: Params,
        method_name: impl Into<String>,
        dimension: Option<usize>,
        point_count: usize,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            version: STORAGE_VERSION,
            created_at,
            point_kind,
            distance_kind,
            space_name: space_name.into(),
            space_params,
            method_name: method_name.into(),
            dimension,
            point_count,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    header: IndexFileHeader,
    state: Vec<u8>,
}

/// Path of the point dump that accompanies the index at `path`.
///
/// # Examples
///
/// ```
/// use simdex_core::storage::data_path;
/// use std::path::Path;
///
/// assert_eq!(data_path(Path::new("/tmp/a.idx")), Path::new("/tmp/a.idx.dat"));
/// ```
pub fn data_path(path: &Path) -> PathBuf {
    with_suffix(path, DATA_FILE_SUFFIX)
}

/// Write an index header and serialized method structure to `path`.
pub fn save_index_file(path: &Path, header: &IndexFileHeader, state: &[u8]) -> Result<()> {
    let file = IndexFile {
        header: header.clone(),
        state: state.to_vec(),
    };
    let payload = bincode::serialize(&file)?;
    let crc = write_atomic(path, &payload, INDEX_MAGIC)?;

    tracing::info!(
        path = %path.display(),
        bytes = payload.len(),
        space = %header.space_name,
        method = %header.method_name,
        "Saved index (CRC32={:#010x})",
        crc
    );
    Ok(())
}

/// Read an index file written by [`save_index_file`].
pub fn load_index_file(path: &Path) -> Result<(IndexFileHeader, Vec<u8>)> {
    let payload = read_verified(path, INDEX_MAGIC)?;
    let file: IndexFile = bincode::deserialize(&payload)?;

    if file.header.version != STORAGE_VERSION {
        return Err(SimdexError::StorageError(format!(
            "Incompatible storage version: expected {}, got {}",
            STORAGE_VERSION, file.header.version
        )));
    }

    tracing::info!(
        path = %path.display(),
        space = %file.header.space_name,
        method = %file.header.method_name,
        points = file.header.point_count,
        "Loaded index"
    );
    Ok((file.header, file.state))
}

/// Write the raw point dump.
pub fn save_points(path: &Path, points: &[Point]) -> Result<()> {
    let payload = bincode::serialize(&(STORAGE_VERSION, points))?;
    write_atomic(path, &payload, POINTS_MAGIC)?;

    tracing::info!(path = %path.display(), points = points.len(), "Saved point data");
    Ok(())
}

/// Read a point dump written by [`save_points`].
pub fn load_points(path: &Path) -> Result<Vec<Point>> {
    let payload = read_verified(path, POINTS_MAGIC)?;
    let (version, points): (u32, Vec<Point>) = bincode::deserialize(&payload)?;

    if version != STORAGE_VERSION {
        return Err(SimdexError::StorageError(format!(
            "Incompatible point data version: expected {}, got {}",
            STORAGE_VERSION, version
        )));
    }

    tracing::info!(path = %path.display(), points = points.len(), "Loaded point data");
    Ok(points)
}

/// Atomic write: `[payload][magic][crc]` to a temp file, then rename.
fn write_atomic(path: &Path, payload: &[u8], magic: &[u8; 4]) -> Result<u32> {
    let crc = crc32fast::hash(payload);
    let tmp_path = with_suffix(path, TMP_EXTENSION);

    {
        let mut file = File::create(&tmp_path).map_err(|e| {
            SimdexError::StorageError(format!(
                "Failed to create {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        file.write_all(payload)?;
        file.write_all(magic)?;
        file.write_all(&crc.to_be_bytes())?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(crc)
}

fn read_verified(path: &Path, magic: &[u8; 4]) -> Result<Vec<u8>> {
    let mut raw = fs::read(path).map_err(|e| {
        SimdexError::StorageError(format!("Failed to read {}: {}", path.display(), e))
    })?;

    if raw.len() < FOOTER_LEN || &raw[raw.len() - FOOTER_LEN..raw.len() - 4] != magic {
        return Err(SimdexError::StorageError(format!(
            "{} is not a {} file",
            path.display(),
            String::from_utf8_lossy(magic)
        )));
    }

    let footer_start = raw.len() - FOOTER_LEN;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&raw[raw.len() - 4..]);
    let stored_crc = u32::from_be_bytes(crc_bytes);

    raw.truncate(footer_start);
    let computed_crc = crc32fast::hash(&raw);
    if computed_crc != stored_crc {
        return Err(SimdexError::StorageError(format!(
            "CRC32 mismatch: expected {:#010x}, got {:#010x}. File may be corrupted: {}",
            stored_crc,
            computed_crc,
            path.display()
        )));
    }

    tracing::debug!("CRC32 verified: {:#010x}", stored_crc);
    Ok(raw)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PointData, SparseElem};
    use tempfile::TempDir;

    fn sample_header() -> IndexFileHeader {
        IndexFileHeader::new(
            PointKind::Dense,
            DistanceKind::Real,
            "l2",
            Params::parse(["dim=2"]).unwrap(),
            "hnsw",
            Some(2),
            3,
        )
    }

    #[test]
    fn test_index_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.bin");

        let header = sample_header();
        save_index_file(&path, &header, &[1, 2, 3, 4]).unwrap();

        let (loaded, state) = load_index_file(&path).unwrap();
        assert_eq!(loaded, header);
        assert_eq!(state, vec![1, 2, 3, 4]);
        assert!(!with_suffix(&path, TMP_EXTENSION).exists());
    }

    #[test]
    fn test_points_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = data_path(&temp_dir.path().join("index.bin"));

        let points = vec![
            Point::new(1, PointData::Sparse(vec![SparseElem::new(2, 0.5)])),
            Point::new(2, PointData::Bytes(vec![1, 2, 3])),
            Point::new(3, PointData::Integer(vec![-4, 5])),
        ];
        save_points(&path, &points).unwrap();
        assert_eq!(load_points(&path).unwrap(), points);
    }

    #[test]
    fn test_corruption_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.bin");
        save_index_file(&path, &sample_header(), &[9; 64]).unwrap();

        let mut raw = fs::read(&path).unwrap();
        raw[10] ^= 0xff;
        fs::write(&path, &raw).unwrap();

        let err = load_index_file(&path).unwrap_err();
        assert!(err.to_string().contains("CRC32 mismatch"));
    }

    #[test]
    fn test_wrong_file_kind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("points.dat");
        save_points(&path, &[]).unwrap();

        let result = load_index_file(&path);
        assert!(matches!(result, Err(SimdexError::StorageError(_))));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_points(&temp_dir.path().join("nope.dat"));
        assert!(matches!(result, Err(SimdexError::StorageError(_))));
    }
}
