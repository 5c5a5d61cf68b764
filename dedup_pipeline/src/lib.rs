#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unwrap_used)]

//! # Overview
//! `dedup_pipeline` drives the whole deduplication run against a host media
//! service: discover media ids, fingerprint the ones not seen before, keep
//! the similarity index in sync, then search for duplicate pairs and report
//! them back.
//!
//! The host service owns the files and the pair decisions; this crate never
//! mutates media. Its durable output is the fingerprint store (plus the index
//! snapshot beside it), which makes every phase restartable: hashing skips
//! ids that already have an entry, and searching skips entries already marked
//! complete. Cancelling a run loses at most the work in flight.
//!
//! The front-end supplies three things: a [`HostClient`] implementation, a
//! populated [`DedupConfig`], and (optionally) a [`CancelToken`] wired to its
//! interrupt handling. Everything else lives behind [`run`].

mod cancel;
mod config;
mod driver;
mod errors;
mod hasher;
mod host;
pub mod search;
mod summary;

pub use cancel::CancelToken;
pub use config::{default_database_dir, DedupConfig, DATABASE_DIR_ENV, SNAPSHOT_FILE_NAME, STORE_FILE_NAME};
pub use driver::{run, run_with_sources};
pub use errors::FatalError;
pub use hasher::{FingerprintSource, PdqFingerprintSource};
pub use host::{HostClient, HostError};
pub use summary::RunSummary;
