#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unwrap_used)]

//! # Overview
//! `fingerprint_store` is the persistence layer of the deduplicator. It owns
//! two artifacts, both living in the same data directory:
//!
//! * the **fingerprint store**: one file mapping each media id to its video
//!   fingerprint and lifecycle flags (`hashed`, `search_complete`, `failed`)
//!   plus the search watermark used for idempotent restart. Writes are
//!   batched and committed copy-on-write (write a temp file, fsync, rename),
//!   so a crash mid-save leaves either the old file or the new one, never a
//!   torn entry.
//! * the **similarity index**: an in-memory BK-tree over every scored frame
//!   hash in the store, answering Hamming radius queries. It is a derived
//!   view; its snapshot file is just a warm-start cache, and a missing or
//!   corrupt snapshot is repaired by rebuilding from the store.
//!
//! The store refuses to open files with an unknown schema version rather
//! than migrating them: fingerprints are cheap to regenerate and silent
//! migration of a half-understood file is how caches get corrupted.

mod entry;
mod errors;
pub mod index;
mod media_id;
mod store;

pub use entry::{EntryFlags, Flag, StoreEntry};
pub use errors::StoreError;
pub use media_id::MediaId;
pub use store::{FingerprintStore, STORE_VERSION};
