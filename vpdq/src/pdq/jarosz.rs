use ndarray::{Array2, Axis};

//The Jarosz low-pass: a separable box filter run twice along each axis, so
//the composite kernel per axis is a symmetric triangle. The two passes use
//mirrored half-window offsets because the window width is even.
pub fn jarosz_filter(buf: &mut Array2<f64>, window: usize) {
    assert!(window >= 2 && window % 2 == 0, "window must be even and >= 2");

    let half = window / 2;
    let passes = [(half, half - 1), (half - 1, half)];

    let mut prefix = Vec::new();
    let mut lane_scratch = Vec::new();
    for (left, right) in passes {
        //rows are contiguous in memory
        for mut row in buf.rows_mut() {
            let lane = row.as_slice_mut().expect("rows of a standard layout array are contiguous");
            box_mean_pass(lane, left, right, &mut prefix);
        }

        //columns are strided, so go through a scratch lane
        for mut col in buf.lanes_mut(Axis(0)) {
            lane_scratch.clear();
            lane_scratch.extend(col.iter());
            box_mean_pass(&mut lane_scratch, left, right, &mut prefix);
            for (dst, src) in col.iter_mut().zip(&lane_scratch) {
                *dst = *src;
            }
        }
    }
}

/// The box window width for an `n`-pixel side: `max(2, round(n / 64))`,
/// rounded up to an even integer.
pub fn filter_window(n: usize) -> usize {
    let rounded = (n as f64 / 64.0).round() as usize;
    let window = rounded.max(2);
    window + window % 2
}

//One box pass: each sample becomes the mean of the window [i-left, i+right],
//clamped to the lane. Edge windows are truncated and divided by the real
//sample count.
fn box_mean_pass(lane: &mut [f64], left: usize, right: usize, prefix: &mut Vec<f64>) {
    let n = lane.len();

    prefix.clear();
    prefix.reserve(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for v in lane.iter() {
        acc += v;
        prefix.push(acc);
    }

    for i in 0..n {
        let lo = i.saturating_sub(left);
        let hi = (i + right + 1).min(n);
        lane[i] = (prefix[hi] - prefix[lo]) / (hi - lo) as f64;
    }
}

#[cfg(test)]
mod test {
    use ndarray::Array2;

    use super::*;

    #[test]
    fn test_filter_window_values() {
        assert_eq!(filter_window(512), 8);
        assert_eq!(filter_window(256), 4);
        assert_eq!(filter_window(64), 2);
        assert_eq!(filter_window(16), 2);
        //round(200/64) = 3, bumped up to even
        assert_eq!(filter_window(200), 4);
    }

    #[test]
    fn test_flat_image_is_unchanged() {
        let mut buf = Array2::from_elem((32, 32), 42.0);
        jarosz_filter(&mut buf, 4);
        for val in buf.iter() {
            assert!((val - 42.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_filter_preserves_mean_in_the_interior() {
        //away from the edges every window is complete, so a single impulse
        //spreads but its weight within any full window stays bounded by 1
        let mut buf = Array2::zeros((64, 64));
        buf[(32, 32)] = 1.0;
        jarosz_filter(&mut buf, 4);

        let total: f64 = buf.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        //the impulse must have spread off its original cell
        assert!(buf[(32, 32)] < 0.5);
        assert!(buf[(32, 31)] > 0.0);
    }

    #[test]
    fn test_composite_kernel_is_symmetric() {
        let mut buf = Array2::zeros((33, 33));
        buf[(16, 16)] = 1.0;
        jarosz_filter(&mut buf, 4);

        for dr in 0..5i64 {
            for dc in 0..5i64 {
                let a = buf[((16 + dr) as usize, (16 + dc) as usize)];
                let b = buf[((16 - dr) as usize, (16 - dc) as usize)];
                assert!(
                    (a - b).abs() < 1e-12,
                    "asymmetric response at offset ({dr}, {dc}): {a} vs {b}"
                );
            }
        }
    }
}
