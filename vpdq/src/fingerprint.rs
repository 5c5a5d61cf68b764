use serde::{Deserialize, Serialize};

use crate::definitions::QUALITY_THRESHOLD;
use crate::FrameHash;

/// One sampled frame of a fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub hash: FrameHash,
    /// Gradient-energy quality in `0..=100`. Records below
    /// [`QUALITY_THRESHOLD`] stay in the fingerprint but are skipped when
    /// scoring similarity.
    pub quality: u8,
    /// Seconds from the start of the video, non-negative and non-decreasing
    /// across a fingerprint.
    pub timestamp: f32,
}

impl FrameRecord {
    pub fn is_retained(&self) -> bool {
        self.quality >= QUALITY_THRESHOLD
    }
}

/// The vPDQ fingerprint of one video: frame records ordered by timestamp,
/// with runs of identical consecutive hashes collapsed to their first record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoFingerprint {
    records: Vec<FrameRecord>,
}

impl VideoFingerprint {
    /// Build a fingerprint from records already ordered by timestamp.
    /// Adjacent duplicate hashes are collapsed, so this is idempotent over
    /// its own output.
    pub fn from_records(records: impl IntoIterator<Item = FrameRecord>) -> Self {
        let mut ret = Self::default();
        for record in records {
            ret.push_collapsing(record);
        }
        ret
    }

    /// Append a record unless its hash equals the previously retained one.
    pub fn push_collapsing(&mut self, record: FrameRecord) {
        debug_assert!(record.timestamp >= 0.0);
        debug_assert!(self
            .records
            .last()
            .map_or(true, |prev| prev.timestamp <= record.timestamp));

        if self.records.last().map(|prev| prev.hash) == Some(record.hash) {
            return;
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// The records that take part in similarity scoring.
    pub fn retained(&self) -> impl Iterator<Item = &FrameRecord> {
        self.records.iter().filter(|r| r.is_retained())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;

    fn record(hash: FrameHash, quality: u8, timestamp: f32) -> FrameRecord {
        FrameRecord {
            hash,
            quality,
            timestamp,
        }
    }

    #[test]
    fn test_adjacent_duplicates_are_collapsed() {
        let mut rng = StdRng::seed_from_u64(20);
        let a = FrameHash::random_hash(&mut rng);
        let b = FrameHash::random_hash(&mut rng);

        let fp = VideoFingerprint::from_records(vec![
            record(a, 90, 0.0),
            record(a, 91, 1.0),
            record(a, 92, 2.0),
            record(b, 90, 3.0),
            record(a, 90, 4.0),
        ]);

        //the static run collapses to its first record; the later reappearance
        //of `a` is not adjacent and stays
        let hashes: Vec<_> = fp.records().iter().map(|r| r.hash).collect();
        assert_eq!(hashes, vec![a, b, a]);
        assert_eq!(fp.records()[0].quality, 90);
    }

    #[test]
    fn test_no_two_adjacent_records_share_a_hash() {
        let mut rng = StdRng::seed_from_u64(21);
        let hashes: Vec<_> = (0..8).map(|_| FrameHash::random_hash(&mut rng)).collect();

        let records = (0..100).map(|i| {
            let hash = hashes[rng.gen_range(0..hashes.len())];
            record(hash, 80, i as f32)
        });
        let fp = VideoFingerprint::from_records(records);

        use itertools::Itertools;
        for (r1, r2) in fp.records().iter().tuple_windows() {
            assert_ne!(r1.hash, r2.hash);
            assert!(r1.timestamp <= r2.timestamp);
        }
    }

    #[test]
    fn test_retained_skips_low_quality() {
        let mut rng = StdRng::seed_from_u64(22);
        let fp = VideoFingerprint::from_records(vec![
            record(FrameHash::random_hash(&mut rng), 90, 0.0),
            record(FrameHash::random_hash(&mut rng), 49, 1.0),
            record(FrameHash::random_hash(&mut rng), 50, 2.0),
            record(FrameHash::random_hash(&mut rng), 0, 3.0),
        ]);

        assert_eq!(fp.len(), 4);
        assert_eq!(fp.retained().count(), 2);
    }
}
