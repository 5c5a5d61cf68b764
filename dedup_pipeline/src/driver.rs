//! Phase sequencing for one deduplication run: discover, hash, index,
//! search.
//!
//! Only frame hashing runs on the worker pool. Fingerprints travel back over
//! a bounded channel to the driver thread, which is the store's single
//! writer; index construction and the search loop are single-threaded.

use std::collections::HashSet;

use crossbeam_channel::bounded;
use fingerprint_store::{
    index::{self, SimilarityIndex},
    FingerprintStore, MediaId, StoreEntry,
};
use log::{info, warn};
use rayon::prelude::*;
use vpdq::{FingerprintError, VideoFingerprint};

use crate::{
    host::with_retries, search, CancelToken, DedupConfig, FatalError, FingerprintSource,
    HostClient, HostError, PdqFingerprintSource, RunSummary, SNAPSHOT_FILE_NAME, STORE_FILE_NAME,
};

/// Run the full pipeline with the production hasher.
pub fn run(
    cfg: &DedupConfig,
    host: &dyn HostClient,
    cancel: &CancelToken,
) -> Result<RunSummary, FatalError> {
    let hasher = PdqFingerprintSource::new(cfg.sample_rate);
    run_with_sources(cfg, host, &hasher, cancel)
}

/// Run the full pipeline with a caller-supplied fingerprint source.
pub fn run_with_sources(
    cfg: &DedupConfig,
    host: &dyn HostClient,
    hasher: &dyn FingerprintSource,
    cancel: &CancelToken,
) -> Result<RunSummary, FatalError> {
    let dir = cfg.resolved_database_dir();
    std::fs::create_dir_all(&dir).map_err(|src| FatalError::DataDir {
        path: dir.clone(),
        src,
    })?;
    let store_path = dir.join(STORE_FILE_NAME);
    let snapshot_path = dir.join(SNAPSHOT_FILE_NAME);

    if cfg.clear_entire_cache {
        info!("clearing the entire fingerprint cache");
        remove_if_present(&store_path);
        remove_if_present(&snapshot_path);
    }

    let store = FingerprintStore::open(store_path)?;

    if cfg.clear_search_cache && !cfg.clear_entire_cache {
        info!("clearing cached search progress");
        store.clear_search_state()?;
    }

    let mut summary = RunSummary::default();

    if !cfg.skip_hashing {
        let media_ids = with_retries(
            "list_media",
            cfg.host_retry_attempts,
            cfg.host_retry_base_delay,
            || host.list_media(&cfg.query),
        )
        .map_err(FatalError::Discovery)?;
        summary.discovered = media_ids.len() as u64;

        run_hash_phase(cfg, host, hasher, cancel, &store, media_ids, &mut summary)?;
        store.save()?;
    }

    if !cfg.skip_search && !cancel.is_cancelled() {
        let index = prepare_index(&store, &snapshot_path);

        let outcome = search::run_search(&store, &index, cfg, host, cancel)?;
        summary.searched = outcome.searched;
        summary.pairs_reported = outcome.pairs_reported;
        summary.cancelled |= outcome.cancelled;
        store.save()?;
    }

    summary.cancelled |= cancel.is_cancelled();
    info!(
        "run finished: {} discovered, {} hashed, {} failed, {} skipped, {} searched, {} pairs{}",
        summary.discovered,
        summary.hashed,
        summary.failed,
        summary.skipped,
        summary.searched,
        summary.pairs_reported,
        if summary.cancelled { " (cancelled)" } else { "" },
    );
    Ok(summary)
}

enum HashOutcome {
    Hashed(VideoFingerprint),
    Failed(FingerprintError),
    Skipped(HostError),
}

fn run_hash_phase(
    cfg: &DedupConfig,
    host: &dyn HostClient,
    hasher: &dyn FingerprintSource,
    cancel: &CancelToken,
    store: &FingerprintStore,
    media_ids: Vec<MediaId>,
    summary: &mut RunSummary,
) -> Result<(), FatalError> {
    //hashed entries are done, and failed ones are not worth retrying until
    //the user clears the cache
    let pending: Vec<MediaId> = media_ids
        .into_iter()
        .filter(|id| {
            store
                .get(id)
                .map_or(true, |e| !e.flags.hashed && !e.flags.failed)
        })
        .collect();
    if pending.is_empty() {
        info!("hash phase: nothing new to hash");
        return Ok(());
    }
    info!("hash phase: {} videos to fingerprint", pending.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.job_count)
        .build()?;

    let (tx, rx) = bounded::<(MediaId, HashOutcome)>(cfg.job_count.max(1) * 2);

    let mut write_error: Option<FatalError> = None;
    std::thread::scope(|scope| {
        let pending = &pending;
        let worker = scope.spawn(move || {
            pool.install(|| {
                pending.par_iter().for_each_with(tx, |tx, media_id| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let outcome = hash_one(cfg, host, hasher, media_id);
                    //the receiver only disappears after a fatal write error;
                    //nothing useful to do with the result then
                    let _ = tx.send((media_id.clone(), outcome));
                });
            });
        });

        //single writer: every store mutation in the hash phase happens here
        for (media_id, outcome) in rx.iter() {
            if write_error.is_some() {
                continue; //keep draining so the workers can finish
            }
            let write_result = match outcome {
                HashOutcome::Hashed(fingerprint) => {
                    info!("hashed {media_id} ({} frames)", fingerprint.len());
                    summary.hashed += 1;
                    store.upsert(StoreEntry::new_hashed(media_id, fingerprint))
                }
                HashOutcome::Failed(e) => {
                    warn!("could not fingerprint {media_id}: {e}");
                    summary.failed += 1;
                    store.upsert(StoreEntry::new_failed(media_id))
                }
                HashOutcome::Skipped(e) => {
                    warn!("skipping {media_id} this run: {e}");
                    summary.skipped += 1;
                    Ok(())
                }
            };
            if let Err(e) = write_result {
                write_error = Some(e.into());
            }
        }

        if worker.join().is_err() {
            warn!("a hashing worker panicked");
        }
    });

    match write_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn hash_one(
    cfg: &DedupConfig,
    host: &dyn HostClient,
    hasher: &dyn FingerprintSource,
    media_id: &MediaId,
) -> HashOutcome {
    let bytes = with_retries(
        "fetch_bytes",
        cfg.host_retry_attempts,
        cfg.host_retry_base_delay,
        || host.fetch_bytes(media_id),
    );
    match bytes {
        Ok(bytes) => match hasher.fingerprint(media_id, bytes) {
            Ok(fingerprint) => HashOutcome::Hashed(fingerprint),
            Err(e) => HashOutcome::Failed(e),
        },
        Err(e) => HashOutcome::Skipped(e),
    }
}

//Make the index reflect the store: load the snapshot if it is usable, add
//whatever the store has that the snapshot predates, and rebuild outright if
//indexed entries have vanished. Snapshot trouble is repaired, not reported.
fn prepare_index(store: &FingerprintStore, snapshot_path: &std::path::Path) -> SimilarityIndex {
    let current: Vec<StoreEntry> = store
        .entries()
        .into_iter()
        .filter(StoreEntry::is_searchable)
        .collect();
    let current_ids: HashSet<&MediaId> = current.iter().map(|e| &e.media_id).collect();

    let (mut index, mut dirty) = match index::load_from(snapshot_path) {
        Ok(index) => {
            if index.indexed_ids().iter().any(|id| !current_ids.contains(id)) {
                info!("index snapshot covers deleted entries, rebuilding");
                (SimilarityIndex::rebuild_from(store), true)
            } else {
                (index, false)
            }
        }
        Err(e) => {
            info!("rebuilding similarity index: {e}");
            (SimilarityIndex::rebuild_from(store), true)
        }
    };

    for entry in &current {
        if index.contains(&entry.media_id) {
            continue;
        }
        if let Some(fingerprint) = &entry.fingerprint {
            dirty |= index.add_fingerprint(&entry.media_id, fingerprint) > 0;
        }
    }

    if dirty {
        if let Err(e) = index::snapshot_to(&index, snapshot_path) {
            warn!("could not snapshot the similarity index: {e}");
        }
    }

    index
}

fn remove_if_present(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", path.display()),
    }
}
