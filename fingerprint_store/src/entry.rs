use serde::{Deserialize, Serialize};
use vpdq::VideoFingerprint;

use crate::MediaId;

/// The per-file lifecycle flags, packed into one byte on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    /// A fingerprint has been computed and stored.
    pub hashed: bool,
    /// The search phase has compared this entry against every other hashed
    /// entry it had not already covered.
    pub search_complete: bool,
    /// Decoding or hashing failed unrecoverably. Failed entries are not
    /// indexed, not searched, and not retried until the cache is cleared.
    pub failed: bool,
}

const FLAG_HASHED: u8 = 1 << 0;
const FLAG_SEARCH_COMPLETE: u8 = 1 << 1;
const FLAG_FAILED: u8 = 1 << 2;
const KNOWN_FLAGS: u8 = FLAG_HASHED | FLAG_SEARCH_COMPLETE | FLAG_FAILED;

impl EntryFlags {
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.hashed {
            byte |= FLAG_HASHED;
        }
        if self.search_complete {
            byte |= FLAG_SEARCH_COMPLETE;
        }
        if self.failed {
            byte |= FLAG_FAILED;
        }
        byte
    }

    /// `None` if unknown flag bits are set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte & !KNOWN_FLAGS != 0 {
            return None;
        }
        Some(Self {
            hashed: byte & FLAG_HASHED != 0,
            search_complete: byte & FLAG_SEARCH_COMPLETE != 0,
            failed: byte & FLAG_FAILED != 0,
        })
    }

    pub fn set(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::Hashed => self.hashed = value,
            Flag::SearchComplete => self.search_complete = value,
            Flag::Failed => self.failed = value,
        }
    }
}

/// Selector for [`crate::FingerprintStore::mark`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Hashed,
    SearchComplete,
    Failed,
}

/// One record of the fingerprint store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub media_id: MediaId,
    /// Present exactly when `flags.hashed` is set.
    pub fingerprint: Option<VideoFingerprint>,
    /// The greatest media id this entry has been compared against in a
    /// completed search pass. Candidates at or below the watermark are
    /// skipped when the entry is searched again.
    pub searched_through: Option<MediaId>,
    pub flags: EntryFlags,
}

impl StoreEntry {
    /// An entry for a successfully fingerprinted video. The fingerprint and
    /// the `hashed` flag are set together; one is never observed without the
    /// other.
    pub fn new_hashed(media_id: MediaId, fingerprint: VideoFingerprint) -> Self {
        Self {
            media_id,
            fingerprint: Some(fingerprint),
            searched_through: None,
            flags: EntryFlags {
                hashed: true,
                search_complete: false,
                failed: false,
            },
        }
    }

    /// An entry recording an unrecoverable decode or hash failure.
    pub fn new_failed(media_id: MediaId) -> Self {
        Self {
            media_id,
            fingerprint: None,
            searched_through: None,
            flags: EntryFlags {
                hashed: false,
                search_complete: false,
                failed: true,
            },
        }
    }

    /// Eligible for indexing and for being a search candidate.
    pub fn is_searchable(&self) -> bool {
        self.flags.hashed && !self.flags.failed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flag_byte_round_trip() {
        for byte in 0..=KNOWN_FLAGS {
            let flags = EntryFlags::from_byte(byte).unwrap();
            assert_eq!(flags.to_byte(), byte);
        }
    }

    #[test]
    fn test_unknown_flag_bits_are_rejected() {
        assert!(EntryFlags::from_byte(0b1000).is_none());
        assert!(EntryFlags::from_byte(0xff).is_none());
    }
}
