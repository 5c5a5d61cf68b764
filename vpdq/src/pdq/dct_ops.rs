use rustdct::DctPlanner;

//A separable 2-D DCT-II over a square row-major buffer. rustdct only
//transforms contiguous slices, so the column pass is done by physically
//transposing the buffer, repeating the row transform, and transposing back.
pub fn dct_2d_in_place(buf: &mut [f64], dim: usize) {
    assert_eq!(buf.len(), dim * dim);

    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(dim);

    //first axis
    buf.chunks_exact_mut(dim).for_each(|row| {
        dct.process_dct2(row);
    });

    let mut scratch = vec![0f64; dim];
    transpose::transpose_inplace(buf, &mut scratch, dim, dim);

    //second axis
    buf.chunks_exact_mut(dim).for_each(|col| {
        dct.process_dct2(col);
    });

    transpose::transpose_inplace(buf, &mut scratch, dim, dim);

    //The output is left unnormalized. The hash thresholds each coefficient
    //against the block median, and a uniform scale cannot move any
    //coefficient across it.
}

#[cfg(test)]
mod test {
    use super::dct_2d_in_place;

    #[test]
    fn test_dct_of_flat_image_has_dc_only() {
        let dim = 64;
        let mut buf = vec![100.0f64; dim * dim];
        dct_2d_in_place(&mut buf, dim);

        assert!(buf[0] > 0.0);
        for (i, val) in buf.iter().enumerate().skip(1) {
            assert!(
                val.abs() < 1e-6,
                "coefficient {i} should be ~0 but is {val}"
            );
        }
    }

    #[test]
    fn test_dct_row_frequency_lands_in_first_row() {
        let dim = 64;
        //a horizontal cosine of frequency 1 should excite coefficient [0][1]
        let mut buf = vec![0f64; dim * dim];
        for r in 0..dim {
            for c in 0..dim {
                let x = (std::f64::consts::PI / dim as f64) * (c as f64 + 0.5);
                buf[r * dim + c] = x.cos();
            }
        }
        dct_2d_in_place(&mut buf, dim);

        let target = buf[1].abs();
        for (i, val) in buf.iter().enumerate() {
            if i != 1 {
                assert!(val.abs() < target / 100.0, "unexpected energy at {i}: {val}");
            }
        }
    }
}
