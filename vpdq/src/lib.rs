#![allow(clippy::let_and_return)]
#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::doc_markdown)]

//! # Overview
//! `vpdq` turns a video into a compact perceptual fingerprint and compares
//! fingerprints for similarity.
//!
//! A fingerprint is an ordered list of per-frame records, one per sampled
//! frame: a 256-bit PDQ hash, a quality score in `0..=100`, and the frame's
//! timestamp. Runs of identical consecutive hashes are collapsed to a single
//! record, so long static shots contribute one frame each.
//!
//! ```no_run
//! use vpdq::VideoFingerprinter;
//!
//! let video = std::fs::File::open("some.mp4").unwrap();
//! let fingerprinter = VideoFingerprinter::default();
//! let fingerprint = fingerprinter.fingerprint_reader(video).unwrap();
//! assert!(!fingerprint.is_empty());
//! ```
//!
//! Two fingerprints are compared with [`similarity::set_similarity`]: every
//! scored frame of one side is matched against its nearest frame on the other
//! side within a Hamming radius, giving a match fraction per side. The caller
//! gates on those fractions (see `similarity`).
//!
//! # How the frame hash works
//! Each sampled luminance plane is low-passed with a Jarosz box filter,
//! decimated to 64x64, and transformed with a 2-D DCT-II. The top-left 16x16
//! coefficient block is compared against its own median, one bit per
//! coefficient. Perceptually similar frames end up within a small Hamming
//! distance of each other. The quality score measures gradient energy of the
//! decimated plane; near-flat frames (black slates, fades) score low and are
//! excluded from matching.

mod definitions;
mod error;
mod fingerprint;
mod frame_hash;
pub mod pdq;
pub mod similarity;
mod video_fingerprinter;

pub use definitions::{
    DEFAULT_SAMPLE_RATE, DEFAULT_SIMILARITY, HASH_BITS, HASH_BYTES, HASH_FRAME_DIM,
    QUALITY_THRESHOLD,
};
pub use error::{FingerprintError, HashError};
pub use fingerprint::{FrameRecord, VideoFingerprint};
pub use frame_hash::FrameHash;
pub use video_fingerprinter::{FingerprintOptions, VideoFingerprinter};
