/// Side length of the luminance planes fed to the frame hasher. The frame
/// extractor emits planes of this size; [`crate::pdq::hash_frame`] rejects
/// anything else.
pub const HASH_FRAME_DIM: u32 = 512;

/// Side length of the decimated buffer the DCT runs over.
pub const DOWNSAMPLE_DIM: usize = 64;

/// Side length of the DCT coefficient block that becomes the hash. The block
/// holds `DCT_BLOCK_DIM * DCT_BLOCK_DIM` coefficients, one hash bit each.
pub const DCT_BLOCK_DIM: usize = 16;

/// Total number of bits in a frame hash.
pub const HASH_BITS: usize = DCT_BLOCK_DIM * DCT_BLOCK_DIM;

/// Number of 64-bit words backing a frame hash.
pub const HASH_WORDS: usize = HASH_BITS / 64;

/// Number of bytes in the wire form of a frame hash.
pub const HASH_BYTES: usize = HASH_BITS / 8;

/// Frames with a quality score below this value are retained in fingerprints
/// but excluded from similarity scoring. Storing the score itself (rather
/// than a precomputed marker bit) means the threshold can be changed without
/// rehashing anything.
pub const QUALITY_THRESHOLD: u8 = 50;

/// The default similarity percentage for searches. Two fingerprints whose
/// mutual frame-match fractions both reach this percentage are reported as
/// potential duplicates.
pub const DEFAULT_SIMILARITY: u8 = 75;

/// The default number of frames sampled per second of video time.
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;
