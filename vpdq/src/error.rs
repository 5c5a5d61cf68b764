use thiserror::Error;

use crate::definitions::HASH_FRAME_DIM;

/// An error from hashing a single frame. Hashing never fails for content
/// reasons, only for malformed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("frame must be {HASH_FRAME_DIM}x{HASH_FRAME_DIM} but is {width}x{height}")]
    BadDimensions { width: u32, height: u32 },
}

/// An error that prevented a video fingerprint from being created.
#[derive(Error, Debug, Clone)]
pub enum FingerprintError {
    #[error(transparent)]
    Extract(#[from] ffmpeg_frame_source::ExtractError),

    #[error(transparent)]
    Hash(#[from] HashError),
}
