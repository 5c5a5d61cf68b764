use std::{
    collections::HashMap,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, Ordering::Relaxed},
};

use log::{info, trace, warn};
use parking_lot::RwLock;
use vpdq::{FrameHash, FrameRecord, VideoFingerprint};

use crate::{
    entry::{EntryFlags, Flag, StoreEntry},
    errors::StoreError,
    MediaId,
};

const STORE_MAGIC: [u8; 8] = *b"VPDQFPDB";

/// The schema version this build reads and writes. Files carrying any other
/// version are refused, never migrated.
pub const STORE_VERSION: u32 = 1;

const DEFAULT_SAVE_THRESHOLD: u32 = 512;

/// A disk-backed map from media id to [`StoreEntry`].
///
/// All methods take `&self`; interior mutability allows hashing workers and
/// the writer to share the store behind one reference. The store expects a
/// single writing process.
///
/// Mutations accumulate in memory and are flushed to disk every
/// `save_threshold` modifications. The store does not save on drop; callers
/// must invoke [`save`][FingerprintStore::save] after their last
/// modification. Each save writes the complete file to a sibling temp path,
/// fsyncs, and renames it over the store, so readers never observe a torn
/// file.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    save_threshold: u32,
    modified_count: AtomicU32,
    entries: RwLock<HashMap<MediaId, StoreEntry>>,
}

impl FingerprintStore {
    /// Open the store at `path`, creating an empty one if the file does not
    /// exist yet.
    ///
    /// # Errors
    /// * [`StoreError::Corrupt`] if the file cannot be parsed.
    /// * [`StoreError::VersionMismatch`] if it was written by a different
    ///   schema version.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        Self::with_save_threshold(path, DEFAULT_SAVE_THRESHOLD)
    }

    pub fn with_save_threshold(path: PathBuf, save_threshold: u32) -> Result<Self, StoreError> {
        let entries = if path.exists() {
            let loaded = load_entries(&path)?;
            trace!(target: "store_startup", "loaded store at {} with {} entries", path.display(), loaded.len());
            loaded
        } else {
            info!(target: "store_startup", "creating new fingerprint store at {}", path.display());
            HashMap::new()
        };

        Ok(Self {
            path,
            save_threshold: save_threshold.max(1),
            modified_count: AtomicU32::new(0),
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, media_id: &MediaId) -> Option<StoreEntry> {
        self.entries.read().get(media_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// A consistent snapshot of every entry, in no particular order.
    pub fn entries(&self) -> Vec<StoreEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Insert or replace the entry for `entry.media_id`, atomically for this
    /// entry.
    pub fn upsert(&self, entry: StoreEntry) -> Result<(), StoreError> {
        check_id_width(&entry.media_id)?;
        if let Some(cursor) = &entry.searched_through {
            check_id_width(cursor)?;
        }

        trace!(target: "store_transactions", "upsert {}", entry.media_id);
        {
            let mut entries = self.entries.write();
            entries.insert(entry.media_id.clone(), entry);
        }
        self.note_modified()
    }

    /// Set one lifecycle flag. Unknown ids are ignored with a warning; the
    /// caller observed an entry that has since been deleted.
    pub fn mark(&self, media_id: &MediaId, flag: Flag, value: bool) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write();
            match entries.get_mut(media_id) {
                Some(entry) => entry.flags.set(flag, value),
                None => {
                    warn!("mark {flag:?} on missing store entry {media_id}");
                    return Ok(());
                }
            }
        }
        self.note_modified()
    }

    /// Record that a search pass finished comparing this entry against every
    /// hashed entry up to `watermark`. The watermark and the
    /// `search_complete` flag move together, in one store update.
    pub fn complete_search(
        &self,
        media_id: &MediaId,
        watermark: Option<MediaId>,
    ) -> Result<(), StoreError> {
        if let Some(cursor) = &watermark {
            check_id_width(cursor)?;
        }
        {
            let mut entries = self.entries.write();
            match entries.get_mut(media_id) {
                Some(entry) => {
                    entry.searched_through = watermark;
                    entry.flags.search_complete = true;
                }
                None => {
                    warn!("complete_search on missing store entry {media_id}");
                    return Ok(());
                }
            }
        }
        self.note_modified()
    }

    /// Forget all search progress, forcing the next search phase to compare
    /// everything again.
    pub fn clear_search_state(&self) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write();
            for entry in entries.values_mut() {
                entry.flags.search_complete = false;
                entry.searched_through = None;
            }
        }
        self.note_modified()
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, media_id: &MediaId) -> Result<bool, StoreError> {
        let existed = {
            let mut entries = self.entries.write();
            entries.remove(media_id).is_some()
        };
        if existed {
            trace!(target: "store_transactions", "delete {media_id}");
            self.note_modified()?;
        }
        Ok(existed)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write();
            entries.clear();
        }
        info!(target: "store_transactions", "cleared fingerprint store");
        self.note_modified()
    }

    /// Flush to disk if there are unsaved modifications.
    pub fn save(&self) -> Result<(), StoreError> {
        if self.modified_count.swap(0, Relaxed) > 0 {
            self.save_inner()
        } else {
            Ok(())
        }
    }

    fn note_modified(&self) -> Result<(), StoreError> {
        let prev_count = self.modified_count.fetch_add(1, Relaxed);
        if prev_count == self.save_threshold - 1 {
            self.modified_count.store(0, Relaxed);
            self.save_inner()
        } else {
            Ok(())
        }
    }

    fn save_inner(&self) -> Result<(), StoreError> {
        let io_err = |src| StoreError::Io {
            path: self.path.clone(),
            src,
        };

        if let Some(parent_dir) = self.path.parent() {
            if !parent_dir.as_os_str().is_empty() {
                std::fs::create_dir_all(parent_dir).map_err(io_err)?;
            }
        }

        //If the process dies while saving we must not lose the previous
        //store, so write a temp file and rename it into place.
        let temp_path = self.path.with_extension("tmp");

        let readable_entries = self.entries.read();
        info!(
            target: "store_transactions",
            "saving store at {} with {} entries",
            self.path.display(),
            readable_entries.len()
        );

        let temp_file = std::fs::File::create(&temp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(temp_file);
        write_entries(&mut writer, &readable_entries).map_err(io_err)?;

        let temp_file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        temp_file.sync_all().map_err(io_err)?;
        drop(temp_file);

        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn check_id_width(id: &MediaId) -> Result<(), StoreError> {
    if id.len() > usize::from(u16::MAX) {
        Err(StoreError::OversizeId(id.len()))
    } else {
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////
// On-disk format
//
// header:  magic 8B | version u32 | entry_count u64
// entry:   media_id_len u16 | media_id bytes
//          flags u8
//          cursor_len u16 | cursor bytes
//          frame_count u32
//          frame_count * (frame_hash 32B | quality u8 | timestamp f32)
//
// All integers little-endian.

fn write_entries(
    w: &mut impl Write,
    entries: &HashMap<MediaId, StoreEntry>,
) -> std::io::Result<()> {
    w.write_all(&STORE_MAGIC)?;
    w.write_all(&STORE_VERSION.to_le_bytes())?;
    w.write_all(&(entries.len() as u64).to_le_bytes())?;

    for entry in entries.values() {
        let id = entry.media_id.as_bytes();
        w.write_all(&(id.len() as u16).to_le_bytes())?;
        w.write_all(id)?;

        w.write_all(&[entry.flags.to_byte()])?;

        let cursor = entry
            .searched_through
            .as_ref()
            .map_or(&[] as &[u8], |c| c.as_bytes());
        w.write_all(&(cursor.len() as u16).to_le_bytes())?;
        w.write_all(cursor)?;

        let records = entry
            .fingerprint
            .as_ref()
            .map_or(&[] as &[FrameRecord], |fp| fp.records());
        w.write_all(&(records.len() as u32).to_le_bytes())?;
        for record in records {
            w.write_all(&record.hash.to_bytes())?;
            w.write_all(&[record.quality])?;
            w.write_all(&record.timestamp.to_le_bytes())?;
        }
    }

    Ok(())
}

fn load_entries(path: &Path) -> Result<HashMap<MediaId, StoreEntry>, StoreError> {
    let io_err = |src| StoreError::Io {
        path: path.to_path_buf(),
        src,
    };
    let corrupt = |detail: &str| StoreError::Corrupt {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    };

    let file = std::fs::File::open(path).map_err(io_err)?;
    let mut r = BufReader::new(file);

    let magic = read_array::<8>(&mut r).map_err(|_| corrupt("bad header"))?;
    if magic != STORE_MAGIC {
        return Err(corrupt("unrecognized magic"));
    }
    let version = read_u32(&mut r).map_err(|_| corrupt("bad header"))?;
    if version != STORE_VERSION {
        return Err(StoreError::VersionMismatch {
            path: path.to_path_buf(),
            found: version,
            expected: STORE_VERSION,
        });
    }
    let entry_count = read_u64(&mut r).map_err(|_| corrupt("bad header"))?;

    let mut entries = HashMap::new();
    for _i in 0..entry_count {
        let entry = read_entry(&mut r).map_err(|detail| corrupt(&detail))?;
        if entries.insert(entry.media_id.clone(), entry).is_some() {
            return Err(corrupt("duplicate media id"));
        }
    }

    //the declared entry count must consume the whole file
    let mut scratch = [0u8; 1];
    match r.read(&mut scratch) {
        Ok(0) => Ok(entries),
        Ok(_) => Err(corrupt("trailing data after the last entry")),
        Err(e) => Err(io_err(e)),
    }
}

fn read_entry(r: &mut impl Read) -> Result<StoreEntry, String> {
    let truncated = |_| "truncated entry".to_string();

    let id_len = read_u16(r).map_err(truncated)?;
    let media_id = MediaId::from_bytes(read_vec(r, usize::from(id_len)).map_err(truncated)?);

    let flags_byte = read_array::<1>(r).map_err(truncated)?[0];
    let flags = EntryFlags::from_byte(flags_byte)
        .ok_or_else(|| format!("unknown flag bits {flags_byte:#04x}"))?;

    let cursor_len = read_u16(r).map_err(truncated)?;
    let searched_through = if cursor_len == 0 {
        None
    } else {
        Some(MediaId::from_bytes(
            read_vec(r, usize::from(cursor_len)).map_err(truncated)?,
        ))
    };

    let frame_count = read_u32(r).map_err(truncated)?;
    if frame_count > 0 && !flags.hashed {
        return Err("frame records on an unhashed entry".to_string());
    }

    let fingerprint = if flags.hashed {
        let mut records = Vec::with_capacity(frame_count as usize);
        let mut prev_timestamp = 0f32;
        for _i in 0..frame_count {
            let hash = FrameHash::from_bytes(read_array::<32>(r).map_err(truncated)?);
            let quality = read_array::<1>(r).map_err(truncated)?[0];
            if quality > 100 {
                return Err(format!("quality {quality} out of range"));
            }
            let timestamp = f32::from_le_bytes(read_array::<4>(r).map_err(truncated)?);
            if !timestamp.is_finite() || timestamp < 0.0 || timestamp < prev_timestamp {
                return Err(format!("bad frame timestamp {timestamp}"));
            }
            prev_timestamp = timestamp;
            records.push(FrameRecord {
                hash,
                quality,
                timestamp,
            });
        }
        Some(VideoFingerprint::from_records(records))
    } else {
        None
    };

    Ok(StoreEntry {
        media_id,
        fingerprint,
        searched_through,
        flags,
    })
}

fn read_array<const N: usize>(r: &mut impl Read) -> std::io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_vec(r: &mut impl Read, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u16(r: &mut impl Read) -> std::io::Result<u16> {
    read_array::<2>(r).map(u16::from_le_bytes)
}

fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    read_array::<4>(r).map(u32::from_le_bytes)
}

fn read_u64(r: &mut impl Read) -> std::io::Result<u64> {
    read_array::<8>(r).map(u64::from_le_bytes)
}
