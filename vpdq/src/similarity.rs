//! The vPDQ set-similarity metric between two fingerprints.
//!
//! Low-quality records are excluded on both sides. Each retained frame of one
//! side matches if its nearest frame on the other side (by Hamming distance)
//! is within the permitted radius; the fraction of matched frames is computed
//! per side, against that side's own frame count. The symmetric gate requires
//! both fractions to reach the threshold, which stops a short clip embedded
//! in a long film from matching while still allowing substantial-overlap
//! matches.

use crate::definitions::HASH_BITS;
use crate::{FrameRecord, VideoFingerprint};

/// The per-frame Hamming radius for a similarity percentage `s` in
/// `0..=100`: `round((100 - s) * 256 / 100 / 2)`.
#[must_use]
pub fn frame_match_radius(s: u8) -> u32 {
    let s = u32::from(s.min(100));
    (f64::from((100 - s) * HASH_BITS as u32) / 100.0 / 2.0).round() as u32
}

/// The two directed match fractions between a pair of fingerprints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetSimilarity {
    /// Fraction of A's retained frames with a match in B.
    pub fraction_a: f64,
    /// Fraction of B's retained frames with a match in A.
    pub fraction_b: f64,
}

impl SetSimilarity {
    /// Both sides must reach the threshold percentage.
    #[must_use]
    pub fn passes_symmetric(&self, s: u8) -> bool {
        let needed = f64::from(s) / 100.0;
        self.fraction_a >= needed && self.fraction_b >= needed
    }

    /// The legacy one-sided gate: a single side reaching the threshold is
    /// enough. (The legacy search queried every file in turn, so a pair was
    /// admitted whenever either direction passed.)
    #[must_use]
    pub fn passes_one_sided(&self, s: u8) -> bool {
        let needed = f64::from(s) / 100.0;
        self.fraction_a >= needed || self.fraction_b >= needed
    }

    /// The reported pair score: the mean of the two fractions.
    #[must_use]
    pub fn score(&self) -> f64 {
        (self.fraction_a + self.fraction_b) / 2.0
    }
}

/// Compute the set-similarity of two fingerprints at the given per-frame
/// radius. Returns `None` when either side has no retained frames to score.
#[must_use]
pub fn set_similarity(
    a: &VideoFingerprint,
    b: &VideoFingerprint,
    radius: u32,
) -> Option<SetSimilarity> {
    let retained_a: Vec<&FrameRecord> = a.retained().collect();
    let retained_b: Vec<&FrameRecord> = b.retained().collect();
    if retained_a.is_empty() || retained_b.is_empty() {
        return None;
    }

    Some(SetSimilarity {
        fraction_a: matched_fraction(&retained_a, &retained_b, radius),
        fraction_b: matched_fraction(&retained_b, &retained_a, radius),
    })
}

fn matched_fraction(from: &[&FrameRecord], to: &[&FrameRecord], radius: u32) -> f64 {
    let matched = from
        .iter()
        .filter(|rec| {
            let nearest = to
                .iter()
                .map(|other| rec.hash.hamming_distance(&other.hash))
                .min()
                .expect("callers guarantee `to` is non-empty");
            nearest <= radius
        })
        .count();

    matched as f64 / from.len() as f64
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;
    use crate::{FrameHash, FrameRecord, VideoFingerprint};

    fn fingerprint_of(hashes: &[FrameHash], quality: u8) -> VideoFingerprint {
        VideoFingerprint::from_records(hashes.iter().enumerate().map(|(i, hash)| FrameRecord {
            hash: *hash,
            quality,
            timestamp: i as f32,
        }))
    }

    #[test]
    fn test_radius_values() {
        assert_eq!(frame_match_radius(100), 0);
        assert_eq!(frame_match_radius(75), 32);
        assert_eq!(frame_match_radius(50), 64);
        assert_eq!(frame_match_radius(0), 128);
    }

    #[test]
    fn test_identical_fingerprints_score_one() {
        let mut rng = StdRng::seed_from_u64(30);
        let hashes: Vec<_> = (0..10).map(|_| FrameHash::random_hash(&mut rng)).collect();
        let a = fingerprint_of(&hashes, 90);
        let b = fingerprint_of(&hashes, 90);

        let sim = set_similarity(&a, &b, 0).unwrap();
        assert_eq!(sim.fraction_a, 1.0);
        assert_eq!(sim.fraction_b, 1.0);
        assert_eq!(sim.score(), 1.0);
        assert!(sim.passes_symmetric(100));
    }

    #[test]
    fn test_symmetry() {
        let mut rng = StdRng::seed_from_u64(31);
        for _i in 0..50 {
            let hashes_a: Vec<_> = (0..6).map(|_| FrameHash::random_hash(&mut rng)).collect();
            let hashes_b: Vec<_> = (0..9).map(|_| FrameHash::random_hash(&mut rng)).collect();
            let a = fingerprint_of(&hashes_a, 90);
            let b = fingerprint_of(&hashes_b, 90);

            let ab = set_similarity(&a, &b, 40).unwrap();
            let ba = set_similarity(&b, &a, 40).unwrap();
            assert_eq!(ab.fraction_a, ba.fraction_b);
            assert_eq!(ab.fraction_b, ba.fraction_a);
            assert_eq!(ab.score(), ba.score());
        }
    }

    #[test]
    fn test_short_clip_in_long_film_fails_the_symmetric_gate() {
        let mut rng = StdRng::seed_from_u64(32);
        //the film: many mutually distant frames
        let film_hashes: Vec<_> = (0..100).map(|_| FrameHash::random_hash(&mut rng)).collect();
        //the clip: an exact excerpt
        let clip_hashes = film_hashes[10..20].to_vec();

        let clip = fingerprint_of(&clip_hashes, 90);
        let film = fingerprint_of(&film_hashes, 90);

        let sim = set_similarity(&clip, &film, 16).unwrap();
        assert_eq!(sim.fraction_a, 1.0);
        assert!(sim.fraction_b <= 0.2);
        assert!(!sim.passes_symmetric(75));
        assert!(sim.passes_one_sided(75));
    }

    #[test]
    fn test_low_quality_frames_are_not_scored() {
        let mut rng = StdRng::seed_from_u64(33);
        let shared = FrameHash::random_hash(&mut rng);

        //both sides share one high-quality frame and disagree on the rest,
        //which are low quality on side A
        let mut records_a = vec![FrameRecord {
            hash: shared,
            quality: 90,
            timestamp: 0.0,
        }];
        records_a.extend((1..5).map(|i| FrameRecord {
            hash: FrameHash::random_hash(&mut rng),
            quality: 10,
            timestamp: i as f32,
        }));
        let a = VideoFingerprint::from_records(records_a);
        let b = fingerprint_of(&[shared], 90);

        let sim = set_similarity(&a, &b, 0).unwrap();
        assert_eq!(sim.fraction_a, 1.0);
        assert_eq!(sim.fraction_b, 1.0);
    }

    #[test]
    fn test_all_low_quality_is_unscorable() {
        let mut rng = StdRng::seed_from_u64(34);
        let a = fingerprint_of(
            &(0..4)
                .map(|_| FrameHash::random_hash(&mut rng))
                .collect::<Vec<_>>(),
            10,
        );
        let b = fingerprint_of(&[FrameHash::random_hash(&mut rng)], 90);

        assert!(set_similarity(&a, &b, 128).is_none());
        assert!(set_similarity(&b, &a, 128).is_none());
    }

    #[test]
    fn test_near_matches_within_radius() {
        let mut rng = StdRng::seed_from_u64(35);
        let base: Vec<_> = (0..8).map(|_| FrameHash::random_hash(&mut rng)).collect();
        let wobbled: Vec<_> = base
            .iter()
            .map(|h| h.hash_at_distance(20, &mut rng))
            .collect();

        let a = fingerprint_of(&base, 90);
        let b = fingerprint_of(&wobbled, 90);

        let sim = set_similarity(&a, &b, 32).unwrap();
        assert_eq!(sim.fraction_a, 1.0);
        assert_eq!(sim.fraction_b, 1.0);

        let tight = set_similarity(&a, &b, 8).unwrap();
        assert!(tight.fraction_a < 1.0);
    }
}
