use std::io::Read;

use ffmpeg_frame_source::{FrameStream, FrameStreamCfg};
use image::GrayImage;

use crate::definitions::{DEFAULT_SAMPLE_RATE, HASH_FRAME_DIM};
use crate::{pdq, FingerprintError, FrameRecord, VideoFingerprint};

/// Options for how videos are sampled when generating fingerprints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerprintOptions {
    /// Frames sampled per second of video time. Higher rates produce larger
    /// fingerprints and catch shorter shots; one frame per second is plenty
    /// for duplicate detection.
    pub sample_rate: f64,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// A factory for video fingerprints: drives the frame extractor, hashes each
/// sampled frame, and collapses static runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct VideoFingerprinter {
    options: FingerprintOptions,
}

impl VideoFingerprinter {
    pub fn from_options(options: FingerprintOptions) -> Self {
        Self { options }
    }

    /// Fingerprint a video from its byte stream.
    ///
    /// # Errors
    /// Returns an error if the stream has no decodable video, or the decoder
    /// fails before its first frame. Decoder failures later in the stream
    /// truncate the fingerprint instead.
    pub fn fingerprint_reader<R>(&self, src: R) -> Result<VideoFingerprint, FingerprintError>
    where
        R: Read + Send + 'static,
    {
        let cfg = FrameStreamCfg {
            sample_rate: self.options.sample_rate,
            frame_dim: HASH_FRAME_DIM,
            ..FrameStreamCfg::default()
        };
        let frames = FrameStream::open(src, cfg)?;
        self.fingerprint_frames(frames)
    }

    /// Fingerprint an already-decoded frame sequence. Frames must arrive in
    /// timestamp order.
    pub fn fingerprint_frames<I>(&self, frames: I) -> Result<VideoFingerprint, FingerprintError>
    where
        I: IntoIterator<Item = (f32, GrayImage)>,
    {
        let mut fingerprint = VideoFingerprint::default();
        for (timestamp, frame) in frames {
            let (hash, quality) = pdq::hash_frame(&frame)?;
            fingerprint.push_collapsing(FrameRecord {
                hash,
                quality,
                timestamp,
            });
        }
        Ok(fingerprint)
    }
}

#[cfg(test)]
mod test {
    use image::GrayImage;
    use rand::prelude::*;

    use super::*;
    use crate::definitions::HASH_FRAME_DIM;

    fn frame_of_noise(rng: &mut StdRng) -> GrayImage {
        GrayImage::from_fn(HASH_FRAME_DIM, HASH_FRAME_DIM, |_x, _y| {
            image::Luma([rng.gen()])
        })
    }

    #[test]
    fn test_static_shot_collapses_to_one_record() {
        let mut rng = StdRng::seed_from_u64(40);
        let frame = frame_of_noise(&mut rng);

        let frames = (0..5).map(|i| (i as f32, frame.clone()));
        let fp = VideoFingerprinter::default()
            .fingerprint_frames(frames)
            .unwrap();

        assert_eq!(fp.len(), 1);
        assert_eq!(fp.records()[0].timestamp, 0.0);
    }

    #[test]
    fn test_distinct_shots_are_all_recorded() {
        let mut rng = StdRng::seed_from_u64(41);
        let frames: Vec<_> = (0..4)
            .map(|i| (i as f32, frame_of_noise(&mut rng)))
            .collect();

        let fp = VideoFingerprinter::default()
            .fingerprint_frames(frames)
            .unwrap();

        assert_eq!(fp.len(), 4);
        let timestamps: Vec<_> = fp.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_oversized_frame_fails_the_fingerprint() {
        let frames = vec![(0.0, GrayImage::new(1024, 1024))];
        let err = VideoFingerprinter::default().fingerprint_frames(frames);
        assert!(matches!(err, Err(FingerprintError::Hash(_))));
    }

    #[test]
    fn test_empty_sequence_gives_empty_fingerprint() {
        let fp = VideoFingerprinter::default()
            .fingerprint_frames(std::iter::empty())
            .unwrap();
        assert!(fp.is_empty());
    }
}
