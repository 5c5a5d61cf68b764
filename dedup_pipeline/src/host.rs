use std::{io::Read, time::Duration};

use fingerprint_store::MediaId;
use log::warn;
use thiserror::Error;

/// An error from the host media service.
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Network trouble, timeouts: worth retrying.
    #[error("transient host error: {0}")]
    Transient(String),

    /// The host answered and said no (missing file, auth). Retrying will not
    /// help, but the file may reappear later, so the caller skips rather
    /// than recording a failure.
    #[error("permanent host error: {0}")]
    Permanent(String),
}

/// The client for the host media service that owns the files. Implemented
/// outside this crate (an HTTP client in production, an in-memory fake in
/// tests); the pipeline only consumes the interface.
pub trait HostClient: Send + Sync {
    /// Media ids matching a host-side predicate string, passed through
    /// verbatim.
    fn list_media(&self, query: &str) -> Result<Vec<MediaId>, HostError>;

    /// A streaming reader over one file's bytes.
    fn fetch_bytes(&self, media_id: &MediaId) -> Result<Box<dyn Read + Send>, HostError>;

    /// Tell the host two files are potential duplicates. Idempotent at the
    /// host: re-reporting a known pair is a no-op there.
    fn report_potential_duplicate(
        &self,
        a: &MediaId,
        b: &MediaId,
        score: f64,
    ) -> Result<(), HostError>;
}

/// Run a host call with exponential backoff on transient errors. Permanent
/// errors and exhausted retries are returned to the caller, which skips the
/// work item.
pub(crate) fn with_retries<T>(
    what: &str,
    attempts: u32,
    base_delay: Duration,
    mut call: impl FnMut() -> Result<T, HostError>,
) -> Result<T, HostError> {
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    for attempt in 1..=attempts {
        match call() {
            Ok(value) => return Ok(value),
            Err(e @ HostError::Permanent(_)) => return Err(e),
            Err(e @ HostError::Transient(_)) => {
                if attempt == attempts {
                    return Err(e);
                }
                warn!("{what} failed (attempt {attempt}/{attempts}), retrying in {delay:?}: {e}");
                std::thread::sleep(delay);
                delay *= 2;
            }
        }
    }
    unreachable!("the loop always returns on its final attempt")
}
