//! The PDQ frame hasher: one 512x512 luminance plane in, a 256-bit hash and
//! a quality score out.
//!
//! The steps are the ones published in Meta's PDQ reference, and the filter
//! footprints here must stay bit-compatible with it: low-pass with a Jarosz
//! box filter, decimate to 64x64 by nearest sample, 2-D DCT-II, then compare
//! the top-left 16x16 coefficient block against its own median. Quality is
//! the gradient energy of the decimated plane, scaled into `0..=100`.

use image::GrayImage;
use ndarray::Array2;

use crate::definitions::{DCT_BLOCK_DIM, DOWNSAMPLE_DIM, HASH_BITS, HASH_FRAME_DIM};
use crate::{FrameHash, HashError};

mod dct_ops;
mod jarosz;

/// Hash one frame.
///
/// # Errors
/// Fails only if the frame is not `512x512`; never for content reasons.
pub fn hash_frame(frame: &GrayImage) -> Result<(FrameHash, u8), HashError> {
    let (width, height) = frame.dimensions();
    if width != HASH_FRAME_DIM || height != HASH_FRAME_DIM {
        return Err(HashError::BadDimensions { width, height });
    }

    let n = HASH_FRAME_DIM as usize;
    let mut plane = Array2::zeros((n, n));
    for (col, row, pix) in frame.enumerate_pixels() {
        let image::Luma([luma]) = *pix;
        plane[(row as usize, col as usize)] = f64::from(luma);
    }

    jarosz::jarosz_filter(&mut plane, jarosz::filter_window(n));

    let mut decimated = decimate(&plane, DOWNSAMPLE_DIM);
    let quality = gradient_quality(&decimated, DOWNSAMPLE_DIM);

    dct_ops::dct_2d_in_place(&mut decimated, DOWNSAMPLE_DIM);

    //keep the lowest frequency bins. The DC cell takes part in the median
    //comparison like every other cell.
    let mut block = [0f64; HASH_BITS];
    for r in 0..DCT_BLOCK_DIM {
        for c in 0..DCT_BLOCK_DIM {
            block[r * DCT_BLOCK_DIM + c] = decimated[r * DOWNSAMPLE_DIM + c];
        }
    }

    let median = median_of(&block);
    let hash = FrameHash::from_bits(block.iter().map(|coeff| *coeff > median));

    Ok((hash, quality))
}

//nearest-sample selection on a uniform grid: out[k] samples the input at
//floor((k + 0.5) * n / out_dim)
fn decimate(plane: &Array2<f64>, out_dim: usize) -> Vec<f64> {
    let n = plane.nrows();
    let src = |k: usize| (2 * k + 1) * n / (2 * out_dim);

    let mut out = Vec::with_capacity(out_dim * out_dim);
    for r in 0..out_dim {
        for c in 0..out_dim {
            out.push(plane[(src(r), src(c))]);
        }
    }
    out
}

//Gradient energy of the decimated plane, as in the reference: adjacent
//differences are scaled to hundredths-of-full-range and truncated before
//being accumulated, and the sum is divided down so that busy natural frames
//land near 100.
fn gradient_quality(buf: &[f64], dim: usize) -> u8 {
    let mut gradient_sum = 0i64;

    let scaled = |u: f64, v: f64| ((((u - v) * 100.0) / 255.0) as i64).abs();

    for r in 0..dim - 1 {
        for c in 0..dim {
            gradient_sum += scaled(buf[r * dim + c], buf[(r + 1) * dim + c]);
        }
    }
    for r in 0..dim {
        for c in 0..dim - 1 {
            gradient_sum += scaled(buf[r * dim + c], buf[r * dim + c + 1]);
        }
    }

    (gradient_sum / 90).min(100) as u8
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    (sorted[mid - 1] + sorted[mid]) / 2.0
}
