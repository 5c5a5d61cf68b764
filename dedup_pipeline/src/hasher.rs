use std::io::Read;

use fingerprint_store::MediaId;
use vpdq::{FingerprintError, FingerprintOptions, VideoFingerprint, VideoFingerprinter};

/// Turns one video's byte stream into a fingerprint. The production
/// implementation decodes and hashes; tests substitute a deterministic fake
/// so the pipeline can be exercised without ffmpeg.
pub trait FingerprintSource: Send + Sync {
    fn fingerprint(
        &self,
        media_id: &MediaId,
        bytes: Box<dyn Read + Send>,
    ) -> Result<VideoFingerprint, FingerprintError>;
}

/// The real thing: frame extraction via ffmpeg, PDQ per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdqFingerprintSource {
    fingerprinter: VideoFingerprinter,
}

impl PdqFingerprintSource {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            fingerprinter: VideoFingerprinter::from_options(FingerprintOptions { sample_rate }),
        }
    }
}

impl FingerprintSource for PdqFingerprintSource {
    fn fingerprint(
        &self,
        _media_id: &MediaId,
        bytes: Box<dyn Read + Send>,
    ) -> Result<VideoFingerprint, FingerprintError> {
        self.fingerprinter.fingerprint_reader(bytes)
    }
}
