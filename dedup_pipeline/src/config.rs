use std::{path::PathBuf, time::Duration};

use vpdq::{DEFAULT_SAMPLE_RATE, DEFAULT_SIMILARITY};

/// Environment variable that overrides where the fingerprint store and index
/// snapshot live.
pub const DATABASE_DIR_ENV: &str = "DEDUP_DATABASE_DIR";

/// The fingerprint store file, inside the database directory.
pub const STORE_FILE_NAME: &str = "fingerprints.db";

/// The index snapshot, sibling of the store.
pub const SNAPSHOT_FILE_NAME: &str = "similarity_index.bin";

/// Everything a run needs to know, owned by the front-end and handed to
/// [`crate::run`] by reference.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Similarity percentage in `0..=100`. Drives both the per-frame Hamming
    /// radius and the match-fraction gate.
    pub similarity_threshold: u8,

    /// Gate pairs on only the queried side's match fraction, the legacy
    /// behavior. The default symmetric gate stops short clips inside long
    /// films from matching.
    pub one_sided_match: bool,

    /// Predicate string passed through verbatim to the host's media listing.
    pub query: String,

    /// Worker pool size for the hash phase.
    pub job_count: usize,

    pub skip_hashing: bool,
    pub skip_search: bool,

    /// Forget search progress before running, so every pair is re-examined.
    pub clear_search_cache: bool,

    /// Drop the entire fingerprint store and index snapshot before running.
    pub clear_entire_cache: bool,

    /// CA bundle path, passed through to the host client's transport by the
    /// front-end that builds both.
    pub verify_cert: Option<PathBuf>,

    /// Where the store and snapshot live. `None` resolves via
    /// [`default_database_dir`].
    pub database_dir: Option<PathBuf>,

    /// Frames sampled per second of video when hashing.
    pub sample_rate: f64,

    /// Attempts per host call before a transient error becomes a skip.
    pub host_retry_attempts: u32,

    /// Backoff before the second attempt; doubles per retry.
    pub host_retry_base_delay: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY,
            one_sided_match: false,
            query: String::new(),
            job_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
            skip_hashing: false,
            skip_search: false,
            clear_search_cache: false,
            clear_entire_cache: false,
            verify_cert: None,
            database_dir: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            host_retry_attempts: 3,
            host_retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl DedupConfig {
    pub fn resolved_database_dir(&self) -> PathBuf {
        self.database_dir.clone().unwrap_or_else(default_database_dir)
    }
}

/// The per-user data directory for the deduplicator, unless overridden by
/// the `DEDUP_DATABASE_DIR` environment variable.
pub fn default_database_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATABASE_DIR_ENV) {
        return PathBuf::from(dir);
    }

    directories_next::ProjectDirs::from("", "", "hydrus-video-dedup")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
