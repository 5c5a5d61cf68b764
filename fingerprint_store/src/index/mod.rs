//! A BK-tree over frame hashes, for Hamming radius queries.
//!
//! Every scored frame of every non-failed fingerprint is inserted, keyed by
//! its hash and carrying a back-pointer to `(media_id, frame_index)`. The
//! tree is the classic Burkhard-Keller layout: each node holds one hash and
//! children indexed by their distance to it, so a radius query only descends
//! edges whose distance is compatible with the triangle inequality. Frame
//! hashes of real libraries are low entropy (static shots, shared intros),
//! which is exactly where BK-trees do well.
//!
//! The index is a derived view of the [`FingerprintStore`] and is always
//! rebuildable from it; the snapshot file exists only to skip the rebuild on
//! startup.

mod snapshot;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use vpdq::FrameHash;

use crate::{FingerprintStore, MediaId};

pub use snapshot::{load_from, snapshot_to, SnapshotError, SNAPSHOT_VERSION};

/// Points from an indexed frame hash back to the fingerprint frame that
/// produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackPointer {
    pub media_id: MediaId,
    /// Index into the fingerprint's record list.
    pub frame_index: u32,
}

#[derive(Debug)]
struct Node {
    hash: FrameHash,
    //back-pointers accumulate here when the same hash is inserted again
    refs: Vec<BackPointer>,
    children: HashMap<u32, usize>,
}

/// The in-memory similarity index.
#[derive(Debug, Default)]
pub struct SimilarityIndex {
    nodes: Vec<Node>,
    indexed_ids: HashSet<MediaId>,
    ref_count: usize,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one frame hash.
    pub fn add(&mut self, hash: FrameHash, back_pointer: BackPointer) {
        self.indexed_ids.insert(back_pointer.media_id.clone());
        self.ref_count += 1;

        if self.nodes.is_empty() {
            self.nodes.push(Node {
                hash,
                refs: vec![back_pointer],
                children: HashMap::new(),
            });
            return;
        }

        let mut cur = 0;
        loop {
            let dist = self.nodes[cur].hash.hamming_distance(&hash);
            if dist == 0 {
                self.nodes[cur].refs.push(back_pointer);
                return;
            }
            match self.nodes[cur].children.get(&dist) {
                Some(&child) => cur = child,
                None => {
                    let new_index = self.nodes.len();
                    self.nodes.push(Node {
                        hash,
                        refs: vec![back_pointer],
                        children: HashMap::new(),
                    });
                    self.nodes[cur].children.insert(dist, new_index);
                    return;
                }
            }
        }
    }

    /// Index every scored frame of a fingerprint. Returns the number of
    /// frames added.
    pub fn add_fingerprint(&mut self, media_id: &MediaId, fingerprint: &vpdq::VideoFingerprint) -> usize {
        let mut added = 0;
        for (frame_index, record) in fingerprint.records().iter().enumerate() {
            if !record.is_retained() {
                continue;
            }
            self.add(
                record.hash,
                BackPointer {
                    media_id: media_id.clone(),
                    frame_index: frame_index as u32,
                },
            );
            added += 1;
        }
        added
    }

    /// Visit every back-pointer whose hash is within `radius` of `hash`.
    pub fn for_each_within<F>(&self, hash: &FrameHash, radius: u32, mut visit: F)
    where
        F: FnMut(&FrameHash, &BackPointer),
    {
        if self.nodes.is_empty() {
            return;
        }

        let mut stack = vec![0usize];
        while let Some(cur) = stack.pop() {
            let node = &self.nodes[cur];
            let dist = node.hash.hamming_distance(hash);
            if dist <= radius {
                for back_pointer in &node.refs {
                    visit(&node.hash, back_pointer);
                }
            }

            //only edges with |edge - dist| <= radius can hold matches
            for (edge, &child) in &node.children {
                if edge.abs_diff(dist) <= radius {
                    stack.push(child);
                }
            }
        }
    }

    /// The radius query as a collected list, for callers that want one.
    pub fn radius_query(&self, hash: &FrameHash, radius: u32) -> Vec<BackPointer> {
        let mut found = Vec::new();
        self.for_each_within(hash, radius, |_hash, back_pointer| {
            found.push(back_pointer.clone());
        });
        found
    }

    /// Build a fresh index over every searchable entry of the store.
    pub fn rebuild_from(store: &FingerprintStore) -> Self {
        let mut index = Self::new();
        for entry in store.entries() {
            if !entry.is_searchable() {
                continue;
            }
            if let Some(fingerprint) = &entry.fingerprint {
                index.add_fingerprint(&entry.media_id, fingerprint);
            }
        }
        index
    }

    /// Whether any frame of this media id is indexed.
    pub fn contains(&self, media_id: &MediaId) -> bool {
        self.indexed_ids.contains(media_id)
    }

    /// The media ids with at least one indexed frame.
    pub fn indexed_ids(&self) -> &HashSet<MediaId> {
        &self.indexed_ids
    }

    /// Total number of indexed frames.
    pub fn len(&self) -> usize {
        self.ref_count
    }

    //the insertion sequence that reproduces this tree: nodes in creation
    //order, each with its collision refs in arrival order
    fn insertion_sequence(&self) -> impl Iterator<Item = (&FrameHash, &BackPointer)> {
        self.nodes
            .iter()
            .flat_map(|node| node.refs.iter().map(move |bp| (&node.hash, bp)))
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use vpdq::{FrameHash, FrameRecord, VideoFingerprint};

    use super::*;
    use crate::{FingerprintStore, StoreEntry};

    fn id(byte: u8) -> MediaId {
        MediaId::from_bytes(vec![byte; 4])
    }

    fn bp(byte: u8, frame: u32) -> BackPointer {
        BackPointer {
            media_id: id(byte),
            frame_index: frame,
        }
    }

    fn sorted(mut v: Vec<BackPointer>) -> Vec<BackPointer> {
        v.sort_by(|a, b| (&a.media_id, a.frame_index).cmp(&(&b.media_id, b.frame_index)));
        v
    }

    #[test]
    fn test_exact_and_near_lookup() {
        let mut rng = StdRng::seed_from_u64(60);
        let mut index = SimilarityIndex::new();

        let target = FrameHash::random_hash(&mut rng);
        let near = target.hash_at_distance(10, &mut rng);
        index.add(target, bp(1, 0));
        index.add(near, bp(2, 7));
        for i in 0..50u8 {
            index.add(FrameHash::random_hash(&mut rng), bp(100 + i / 10, u32::from(i)));
        }

        let exact = index.radius_query(&target, 0);
        assert_eq!(exact, vec![bp(1, 0)]);

        let within = sorted(index.radius_query(&target, 10));
        assert_eq!(within, sorted(vec![bp(1, 0), bp(2, 7)]));
    }

    #[test]
    fn test_collisions_accumulate_back_pointers() {
        let mut rng = StdRng::seed_from_u64(61);
        let mut index = SimilarityIndex::new();
        let hash = FrameHash::random_hash(&mut rng);

        index.add(hash, bp(1, 0));
        index.add(hash, bp(2, 3));
        index.add(hash, bp(1, 9));

        let found = sorted(index.radius_query(&hash, 0));
        assert_eq!(found, sorted(vec![bp(1, 0), bp(2, 3), bp(1, 9)]));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_radius_monotonicity() {
        let mut rng = StdRng::seed_from_u64(62);
        let mut index = SimilarityIndex::new();
        for i in 0..200u32 {
            index.add(FrameHash::random_hash(&mut rng), bp((i % 20) as u8, i));
        }

        let probe = FrameHash::random_hash(&mut rng);
        let mut prev: Vec<BackPointer> = Vec::new();
        for radius in [0, 8, 32, 64, 96, 128, 256] {
            let found = sorted(index.radius_query(&probe, radius));
            for bp in &prev {
                assert!(found.contains(bp), "radius widening lost a result");
            }
            prev = found;
        }

        //radius 256 covers the whole space
        assert_eq!(prev.len(), 200);
    }

    #[test]
    fn test_query_agrees_with_linear_scan() {
        let mut rng = StdRng::seed_from_u64(63);
        let hashes: Vec<FrameHash> = (0..300).map(|_| FrameHash::random_hash(&mut rng)).collect();

        let mut index = SimilarityIndex::new();
        for (i, hash) in hashes.iter().enumerate() {
            index.add(*hash, bp((i % 10) as u8, i as u32));
        }

        for radius in [16, 100, 120] {
            let probe = FrameHash::random_hash(&mut rng);
            let expected: Vec<BackPointer> = hashes
                .iter()
                .enumerate()
                .filter(|(_i, h)| h.hamming_distance(&probe) <= radius)
                .map(|(i, _h)| bp((i % 10) as u8, i as u32))
                .collect();

            assert_eq!(
                sorted(index.radius_query(&probe, radius)),
                sorted(expected)
            );
        }
    }

    #[test]
    fn test_low_quality_frames_are_not_indexed() {
        let mut rng = StdRng::seed_from_u64(64);
        let fp = VideoFingerprint::from_records(vec![
            FrameRecord {
                hash: FrameHash::random_hash(&mut rng),
                quality: 90,
                timestamp: 0.0,
            },
            FrameRecord {
                hash: FrameHash::random_hash(&mut rng),
                quality: 10,
                timestamp: 1.0,
            },
        ]);

        let mut index = SimilarityIndex::new();
        let added = index.add_fingerprint(&id(1), &fp);
        assert_eq!(added, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rebuild_matches_incremental_build() {
        let mut rng = StdRng::seed_from_u64(65);
        let dir = tempfile::tempdir().unwrap();
        let store = FingerprintStore::open(dir.path().join("fingerprints.db")).unwrap();

        let mut incremental = SimilarityIndex::new();
        for i in 0..20u8 {
            let fp = VideoFingerprint::from_records((0..5).map(|k| FrameRecord {
                hash: FrameHash::random_hash(&mut rng),
                quality: 90,
                timestamp: k as f32,
            }));
            incremental.add_fingerprint(&id(i), &fp);
            store.upsert(StoreEntry::new_hashed(id(i), fp)).unwrap();
        }
        //failed entries must not be indexed
        store.upsert(StoreEntry::new_failed(id(99))).unwrap();

        let rebuilt = SimilarityIndex::rebuild_from(&store);
        assert_eq!(rebuilt.len(), incremental.len());
        assert!(!rebuilt.contains(&id(99)));

        for _i in 0..20 {
            let probe = FrameHash::random_hash(&mut rng);
            for radius in [0, 32, 64, 128] {
                assert_eq!(
                    sorted(rebuilt.radius_query(&probe, radius)),
                    sorted(incremental.radius_query(&probe, radius)),
                );
            }
        }
    }
}
