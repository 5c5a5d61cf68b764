use thiserror::Error;

/// An error that prevented any frames from being extracted.
///
/// Decoder failures *after* the first frame do not surface here; they
/// terminate the frame sequence early and the prefix remains usable.
#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    /// The ffmpeg binary could not be started at all.
    #[error("could not spawn ffmpeg (is it installed and on the PATH?): {0}")]
    Spawn(String),

    /// The container has no decodable video stream.
    #[error("no decodable video stream: {detail}")]
    Decode { detail: String },

    /// A video stream exists but the decoder failed before producing the
    /// first frame.
    #[error("decoder failed before the first frame: {detail}")]
    CorruptStream { detail: String },
}
