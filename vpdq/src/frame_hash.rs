use std::fmt;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::definitions::{HASH_BITS, HASH_BYTES, HASH_WORDS};

/// A 256-bit PDQ hash of one video frame, compared under Hamming distance.
///
/// Bit `k` of the hash corresponds to DCT coefficient row `k / 16`, column
/// `k % 16`; in the 32-byte wire form, bit `i` of byte `j` is bit `i + 8*j`.
/// Every producer and consumer of these hashes must agree on that ordering or
/// Hamming distances become meaningless.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameHash {
    words: [u64; HASH_WORDS],
}

impl FrameHash {
    /// Pack a hash from its bits, lowest linear index first. Missing bits are
    /// zero; excess bits are ignored.
    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        let mut bitarr: BitArray<[u64; HASH_WORDS], Lsb0> = BitArray::ZERO;
        for (mut slot, bit) in bitarr.iter_mut().zip(bits) {
            *slot = bit;
        }
        Self {
            words: bitarr.into_inner(),
        }
    }

    /// The 32-byte wire form: words in order, each little-endian.
    #[must_use]
    pub fn to_bytes(self) -> [u8; HASH_BYTES] {
        let mut out = [0u8; HASH_BYTES];
        for (chunk, word) in out.chunks_exact_mut(8).zip(self.words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Self {
        let mut words = [0u64; HASH_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            *word = u64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes"));
        }
        Self { words }
    }

    /// The raw hamming distance from this hash to another hash.
    #[must_use]
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .fold(0, |acc, (x, y)| acc + (x ^ y).count_ones())
    }

    #[must_use]
    pub fn bit(&self, k: usize) -> bool {
        debug_assert!(k < HASH_BITS);
        (self.words[k / 64] >> (k % 64)) & 1 == 1
    }
}

impl fmt::Debug for FrameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameHash(")?;
        for byte in self.to_bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

//Utilities for testing
#[doc(hidden)]
#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use rand::prelude::*;

    use super::FrameHash;
    use crate::definitions::HASH_WORDS;

    #[doc(hidden)]
    impl FrameHash {
        pub fn zero_hash() -> Self {
            Self {
                words: [0; HASH_WORDS],
            }
        }

        pub fn random_hash(rng: &mut StdRng) -> Self {
            let mut words = [0u64; HASH_WORDS];
            for word in &mut words {
                *word = rng.gen();
            }
            Self { words }
        }

        //generate a hash with a given distance from this one, by flipping
        //random bits until the required distance is reached.
        #[must_use]
        pub fn hash_at_distance(&self, target_distance: u32, rng: &mut StdRng) -> Self {
            let mut ret = *self;
            while self.hamming_distance(&ret) < target_distance {
                let chosen_word = rng.gen_range(0..ret.words.len());
                let chosen_bit = rng.gen_range(0..u64::BITS);
                ret.words[chosen_word] ^= 1u64 << chosen_bit;
            }
            assert_eq!(self.hamming_distance(&ret), target_distance);
            ret
        }
    }
}
