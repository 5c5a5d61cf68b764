//! Warm-start persistence for the similarity index.
//!
//! The snapshot stores the tree's insertion sequence, not its shape:
//! replaying the same insertions reproduces the identical tree, and the
//! format stays trivial. Snapshot problems are never fatal; the caller falls
//! back to rebuilding from the fingerprint store.

use std::{
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vpdq::FrameHash;

use super::{BackPointer, SimilarityIndex};
use crate::MediaId;

const SNAPSHOT_MAGIC: [u8; 8] = *b"VPDQIDX\0";

pub const SNAPSHOT_VERSION: u32 = 1;

/// Why a snapshot could not be used. Every variant is recoverable by
/// rebuilding from the store.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("no index snapshot at {0}")]
    Missing(PathBuf),

    #[error("index snapshot io error at {path}: {src}")]
    Io {
        path: PathBuf,
        #[source]
        src: std::io::Error,
    },

    #[error("index snapshot at {path} is unreadable: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("index snapshot at {path} has version {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    hash: [u8; 32],
    media_id: MediaId,
    frame_index: u32,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    magic: [u8; 8],
    version: u32,
    records: Vec<SnapshotRecord>,
}

/// Write the index's insertion sequence to `path`, via a temp file and
/// rename like the store itself.
pub fn snapshot_to(index: &SimilarityIndex, path: &Path) -> Result<(), SnapshotError> {
    let io_err = |src| SnapshotError::Io {
        path: path.to_path_buf(),
        src,
    };

    let records = index
        .insertion_sequence()
        .map(|(hash, back_pointer)| SnapshotRecord {
            hash: hash.to_bytes(),
            media_id: back_pointer.media_id.clone(),
            frame_index: back_pointer.frame_index,
        })
        .collect::<Vec<_>>();

    let file = SnapshotFile {
        magic: SNAPSHOT_MAGIC,
        version: SNAPSHOT_VERSION,
        records,
    };

    let temp_path = path.with_extension("tmp");
    let temp_file = std::fs::File::create(&temp_path).map_err(io_err)?;
    let mut writer = BufWriter::new(temp_file);
    bincode::serialize_into(&mut writer, &file).map_err(|e| SnapshotError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let temp_file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    temp_file.sync_all().map_err(io_err)?;
    drop(temp_file);
    std::fs::rename(&temp_path, path).map_err(io_err)?;

    info!("snapshotted similarity index ({} frames) to {}", index.len(), path.display());
    Ok(())
}

/// Rebuild an index from a snapshot.
pub fn load_from(path: &Path) -> Result<SimilarityIndex, SnapshotError> {
    if !path.exists() {
        return Err(SnapshotError::Missing(path.to_path_buf()));
    }

    let file = std::fs::File::open(path).map_err(|src| SnapshotError::Io {
        path: path.to_path_buf(),
        src,
    })?;
    let reader = BufReader::new(file);

    let parsed: SnapshotFile =
        bincode::deserialize_from(reader).map_err(|e| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if parsed.magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::Corrupt {
            path: path.to_path_buf(),
            detail: "unrecognized magic".to_string(),
        });
    }
    if parsed.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            path: path.to_path_buf(),
            found: parsed.version,
            expected: SNAPSHOT_VERSION,
        });
    }

    let mut index = SimilarityIndex::new();
    for record in parsed.records {
        index.add(
            FrameHash::from_bytes(record.hash),
            BackPointer {
                media_id: record.media_id,
                frame_index: record.frame_index,
            },
        );
    }
    Ok(index)
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use vpdq::FrameHash;

    use super::*;

    fn populated_index(rng: &mut StdRng) -> SimilarityIndex {
        let mut index = SimilarityIndex::new();
        let shared = FrameHash::random_hash(rng);
        for i in 0..100u32 {
            let hash = if i % 10 == 0 {
                shared
            } else {
                FrameHash::random_hash(rng)
            };
            index.add(
                hash,
                BackPointer {
                    media_id: MediaId::from_bytes(vec![(i % 25) as u8; 8]),
                    frame_index: i,
                },
            );
        }
        index
    }

    #[test]
    fn test_snapshot_round_trip_preserves_queries() {
        let mut rng = StdRng::seed_from_u64(70);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("similarity_index.bin");

        let index = populated_index(&mut rng);
        snapshot_to(&index, &path).unwrap();
        let reloaded = load_from(&path).unwrap();

        assert_eq!(reloaded.len(), index.len());
        assert_eq!(reloaded.indexed_ids(), index.indexed_ids());

        for _i in 0..20 {
            let probe = FrameHash::random_hash(&mut rng);
            for radius in [0, 16, 64, 128] {
                let mut a = index.radius_query(&probe, radius);
                let mut b = reloaded.radius_query(&probe, radius);
                a.sort_by(|x, y| (&x.media_id, x.frame_index).cmp(&(&y.media_id, y.frame_index)));
                b.sort_by(|x, y| (&x.media_id, x.frame_index).cmp(&(&y.media_id, y.frame_index)));
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_missing_snapshot_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let res = load_from(&dir.path().join("nope.bin"));
        assert!(matches!(res, Err(SnapshotError::Missing(_))));
    }

    #[test]
    fn test_garbage_snapshot_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("similarity_index.bin");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(matches!(
            load_from(&path),
            Err(SnapshotError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_version_mismatch_is_detected() {
        let mut rng = StdRng::seed_from_u64(71);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("similarity_index.bin");

        let index = populated_index(&mut rng);
        snapshot_to(&index, &path).unwrap();

        //the version sits directly after the 8-byte magic; bincode writes
        //the array verbatim and the u32 little-endian
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8..12].copy_from_slice(&9u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            load_from(&path),
            Err(SnapshotError::VersionMismatch { found: 9, .. })
        ));
    }
}
