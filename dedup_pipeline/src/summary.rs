use serde::Serialize;

/// What a run did, returned by [`crate::run`] and logged at the end. Counts
/// are per-run, not cumulative over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Media ids the host listed for the query.
    pub discovered: u64,
    /// Fingerprints computed and stored this run.
    pub hashed: u64,
    /// Entries recorded as failed this run (undecodable or unhashable).
    pub failed: u64,
    /// Ids skipped over host trouble; they carry no store entry and will be
    /// tried again next run.
    pub skipped: u64,
    /// Entries the search phase completed this run.
    pub searched: u64,
    /// Pairs reported to the host this run.
    pub pairs_reported: u64,
    /// The run stopped early on the cancellation token.
    pub cancelled: bool,
}
