//! The pair search: for every hashed entry not yet searched, find candidate
//! fingerprints through the similarity index, score them with the vPDQ
//! set-similarity, and report qualifying pairs to the host.
//!
//! Restart bookkeeping lives on the store entries themselves. Completing an
//! entry records a watermark (the greatest media id of the hashed population
//! it was compared against) together with `search_complete`; a later run
//! with new files only compares the new entries, and pairs between old and
//! new are found from the new side. Cancellation between entries loses only
//! the entry in progress.

use std::collections::{BTreeSet, HashMap, HashSet};

use fingerprint_store::{index::SimilarityIndex, FingerprintStore, MediaId, StoreEntry};
use log::{debug, info, warn};
use vpdq::{similarity, VideoFingerprint};

use crate::{host::with_retries, CancelToken, DedupConfig, FatalError, HostClient};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub searched: u64,
    pub pairs_reported: u64,
    pub cancelled: bool,
}

pub fn run_search(
    store: &FingerprintStore,
    index: &SimilarityIndex,
    cfg: &DedupConfig,
    reporter: &dyn HostClient,
    cancel: &CancelToken,
) -> Result<SearchOutcome, FatalError> {
    let threshold = cfg.similarity_threshold;
    let radius = similarity::frame_match_radius(threshold);

    //one consistent snapshot of the store for the whole phase; entries
    //hashed while we search are picked up on the next run
    let mut entries = store.entries();
    entries.sort_by(|a, b| a.media_id.cmp(&b.media_id));

    let fingerprints: HashMap<&MediaId, &VideoFingerprint> = entries
        .iter()
        .filter(|e| e.is_searchable())
        .filter_map(|e| e.fingerprint.as_ref().map(|fp| (&e.media_id, fp)))
        .collect();

    //every completed entry advances its watermark to the end of the hashed
    //population as it stands now
    let watermark = fingerprints.keys().max().map(|id| (*id).clone());

    //entries completed earlier in this same phase have already been compared
    //against everything still pending, so their ids are excluded from later
    //candidate sets; this is what keeps each pair to one emission per run
    let mut done_this_run: HashSet<MediaId> = HashSet::new();

    let mut outcome = SearchOutcome::default();
    for entry in &entries {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        if !entry.is_searchable() || entry.flags.search_complete {
            continue;
        }
        let Some(fingerprint) = &entry.fingerprint else {
            continue;
        };

        let candidates = candidate_ids(entry, fingerprint, index, radius, &done_this_run);
        debug!(
            "searching {} against {} candidates",
            entry.media_id,
            candidates.len()
        );

        for other_id in candidates {
            let Some(other_fp) = fingerprints.get(&other_id).copied() else {
                //back-pointer to an entry that is failed, unhashed, or gone
                continue;
            };

            let Some(sim) = similarity::set_similarity(fingerprint, other_fp, radius) else {
                continue;
            };
            let passes = if cfg.one_sided_match {
                sim.passes_one_sided(threshold)
            } else {
                sim.passes_symmetric(threshold)
            };
            if !passes {
                continue;
            }

            //canonical pair order, so the host sees one identity per pair
            let (first, second) = if entry.media_id <= other_id {
                (&entry.media_id, &other_id)
            } else {
                (&other_id, &entry.media_id)
            };

            let report = with_retries(
                "report_potential_duplicate",
                cfg.host_retry_attempts,
                cfg.host_retry_base_delay,
                || reporter.report_potential_duplicate(first, second, sim.score()),
            );
            match report {
                Ok(()) => outcome.pairs_reported += 1,
                Err(e) => warn!("could not report pair ({first}, {second}): {e}"),
            }
        }

        store.complete_search(&entry.media_id, watermark.clone())?;
        done_this_run.insert(entry.media_id.clone());
        outcome.searched += 1;
    }

    info!(
        "search phase: {} entries searched, {} pairs reported",
        outcome.searched, outcome.pairs_reported
    );
    Ok(outcome)
}

//All media ids worth scoring against this entry: whatever the index returns
//within the radius around any of its scored frames, minus itself, minus
//everything at or below its watermark from an earlier completed pass, and
//minus entries that finished earlier in this phase (those already compared
//themselves against this entry).
fn candidate_ids(
    entry: &StoreEntry,
    fingerprint: &VideoFingerprint,
    index: &SimilarityIndex,
    radius: u32,
    done_this_run: &HashSet<MediaId>,
) -> BTreeSet<MediaId> {
    let mut candidates = BTreeSet::new();
    for record in fingerprint.retained() {
        index.for_each_within(&record.hash, radius, |_hash, back_pointer| {
            if back_pointer.media_id == entry.media_id {
                return;
            }
            if let Some(cursor) = &entry.searched_through {
                if back_pointer.media_id <= *cursor {
                    return;
                }
            }
            if done_this_run.contains(&back_pointer.media_id) {
                return;
            }
            if !candidates.contains(&back_pointer.media_id) {
                candidates.insert(back_pointer.media_id.clone());
            }
        });
    }
    candidates
}

#[cfg(test)]
mod test {
    use fingerprint_store::index::BackPointer;
    use rand::prelude::*;
    use vpdq::{FrameHash, FrameRecord};

    use super::*;

    fn id(byte: u8) -> MediaId {
        MediaId::from_bytes(vec![byte; 4])
    }

    fn fingerprint_of(hashes: &[FrameHash]) -> VideoFingerprint {
        VideoFingerprint::from_records(hashes.iter().enumerate().map(|(i, hash)| FrameRecord {
            hash: *hash,
            quality: 90,
            timestamp: i as f32,
        }))
    }

    #[test]
    fn test_candidates_exclude_self_and_watermarked() {
        let mut rng = StdRng::seed_from_u64(80);
        let shared = FrameHash::random_hash(&mut rng);

        let mut index = SimilarityIndex::new();
        for byte in [1u8, 2, 3, 4] {
            index.add(
                shared,
                BackPointer {
                    media_id: id(byte),
                    frame_index: 0,
                },
            );
        }

        let fingerprint = fingerprint_of(&[shared]);
        let mut entry = StoreEntry::new_hashed(id(2), fingerprint.clone());

        let none_done = HashSet::new();
        let all = candidate_ids(&entry, &fingerprint, &index, 0, &none_done);
        assert_eq!(all, [id(1), id(3), id(4)].into_iter().collect());

        //ids at or below the watermark were compared in an earlier pass
        entry.searched_through = Some(id(3));
        let beyond = candidate_ids(&entry, &fingerprint, &index, 0, &none_done);
        assert_eq!(beyond, [id(4)].into_iter().collect());

        //entries that finished earlier in this phase are excluded too
        entry.searched_through = None;
        let done: HashSet<MediaId> = [id(1)].into_iter().collect();
        let remaining = candidate_ids(&entry, &fingerprint, &index, 0, &done);
        assert_eq!(remaining, [id(3), id(4)].into_iter().collect());
    }
}
