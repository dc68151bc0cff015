//! The DCT block convolver (component C5): computes, for an 8x8 block `X`
//! and a `(k, l)` basis pair, `Y += w * DCT(iDCT(X) * phi_{k,l})` without
//! ever leaving the DCT domain.
//!
//! `outline.c`'s `mj_convolve` implements this as a two-pass separable
//! stencil: an 8-case row stencil (indexed by `l`) applied independently to
//! each of the 8 rows of the block, followed by an 8-case stencil (indexed
//! by `k`) applied across the 8 rows. Lining the two switch statements up
//! side by side shows they are the *same* 8 stencils — the row pass treats
//! each entry as a lone `f32`, the column pass treats each "entry" as the
//! 8-wide row produced by the first pass — so both passes are implemented
//! here by one generic stencil table, applied once with 1-wide lanes and
//! once with 8-wide lanes. The coefficients themselves (including the
//! `M_SQRT2` terms at the block boundaries) are reproduced verbatim from the
//! reference.

use std::f32::consts::SQRT_2;

use crate::geometry::DCTSIZE2;

/// Applies stencil `case` (0..8) to 8 input lanes, each of width `N`,
/// producing 8 output lanes of width `N`.
///
/// With `N = 1` this is the reference's row pass (`l`); with `N = 8` it is
/// the reference's column pass (`k`), operating on the 8 rows produced by
/// the row pass as if they were single wide "entries".
fn stencil<const N: usize>(case: usize, inp: &[[f32; N]; 8]) -> [[f32; N]; 8] {
    let add = |a: [f32; N], b: [f32; N]| -> [f32; N] {
        let mut r = [0.0f32; N];
        for i in 0..N {
            r[i] = a[i] + b[i];
        }
        r
    };
    let sub = |a: [f32; N], b: [f32; N]| -> [f32; N] {
        let mut r = [0.0f32; N];
        for i in 0..N {
            r[i] = a[i] - b[i];
        }
        r
    };
    let scale = |a: [f32; N], s: f32| -> [f32; N] {
        let mut r = [0.0f32; N];
        for i in 0..N {
            r[i] = a[i] * s;
        }
        r
    };

    let x = inp;
    match case {
        0 => [
            scale(x[0], 2.0),
            scale(x[1], 2.0),
            scale(x[2], 2.0),
            scale(x[3], 2.0),
            scale(x[4], 2.0),
            scale(x[5], 2.0),
            scale(x[6], 2.0),
            scale(x[7], 2.0),
        ],
        1 => [
            scale(x[1], SQRT_2),
            add(scale(x[0], SQRT_2), x[2]),
            add(x[1], x[3]),
            add(x[2], x[4]),
            add(x[3], x[5]),
            add(x[4], x[6]),
            add(x[5], x[7]),
            x[6],
        ],
        2 => [
            scale(x[2], SQRT_2),
            add(x[1], x[3]),
            add(scale(x[0], SQRT_2), x[4]),
            add(x[1], x[5]),
            add(x[2], x[6]),
            add(x[3], x[7]),
            x[4],
            sub(x[5], x[7]),
        ],
        3 => [
            scale(x[3], SQRT_2),
            add(x[2], x[4]),
            add(x[1], x[5]),
            add(scale(x[0], SQRT_2), x[6]),
            add(x[1], x[7]),
            x[2],
            sub(x[3], x[7]),
            sub(x[4], x[6]),
        ],
        4 => [
            scale(x[4], SQRT_2),
            add(x[3], x[5]),
            add(x[2], x[6]),
            add(x[1], x[7]),
            scale(x[0], SQRT_2),
            sub(x[1], x[7]),
            sub(x[2], x[6]),
            sub(x[3], x[5]),
        ],
        5 => [
            scale(x[5], SQRT_2),
            add(x[4], x[6]),
            add(x[3], x[7]),
            x[2],
            sub(x[1], x[7]),
            sub(scale(x[0], SQRT_2), x[6]),
            sub(x[1], x[5]),
            sub(x[2], x[4]),
        ],
        6 => [
            scale(x[6], SQRT_2),
            add(x[5], x[7]),
            x[4],
            sub(x[3], x[7]),
            sub(x[2], x[6]),
            sub(x[1], x[5]),
            sub(scale(x[0], SQRT_2), x[4]),
            sub(x[1], x[3]),
        ],
        7 => [
            scale(x[7], SQRT_2),
            x[6],
            sub(x[5], x[7]),
            sub(x[4], x[6]),
            sub(x[3], x[5]),
            sub(x[2], x[4]),
            sub(x[1], x[3]),
            sub(scale(x[0], SQRT_2), x[2]),
        ],
        _ => unreachable!("DCT basis index must be in 0..8"),
    }
}

/// Accumulates `Y += w * DCT(iDCT(X) * phi_{k,l})` into `y`, for the `(k, l)`
/// DCT-II basis pair.
///
/// `x` and `y` are 8x8 blocks in natural (row-major) order. Returns
/// immediately without touching `y` when `w == 0.0`, matching the reference
/// short-circuit (most `(k, l)` pairs have zero weight for a typical mask
/// block, so this keeps the O(64^2) compositor loop cheap in practice).
pub fn convolve(x: &[f32; DCTSIZE2], y: &mut [f32; DCTSIZE2], w: f32, k: usize, l: usize) {
    if w == 0.0 {
        return;
    }
    debug_assert!(k < 8 && l < 8);

    // Pass A: row stencil case `l`, applied independently to each of the 8
    // rows (1-wide lanes).
    let mut z = [0.0f32; DCTSIZE2];
    for row in 0..8 {
        let o = row * 8;
        let row_in: [[f32; 1]; 8] = std::array::from_fn(|c| [x[o + c]]);
        let row_out = stencil::<1>(l, &row_in);
        for c in 0..8 {
            z[o + c] = row_out[c][0];
        }
    }

    // Pass B: column stencil case `k`, applied once across the 8 rows
    // (8-wide lanes), scaled by `w` and accumulated into `y`.
    let groups: [[f32; 8]; 8] = std::array::from_fn(|row| {
        let o = row * 8;
        std::array::from_fn(|c| z[o + c])
    });
    let out_groups = stencil::<8>(k, &groups);
    for row in 0..8 {
        let o = row * 8;
        for c in 0..8 {
            y[o + c] += out_groups[row][c] * w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(a: usize, b: usize) -> [f32; DCTSIZE2] {
        let mut x = [0.0f32; DCTSIZE2];
        x[a * 8 + b] = 1.0;
        x
    }

    #[test]
    fn zero_weight_is_a_no_op() {
        let x = impulse(0, 0);
        let mut y = [1.0f32; DCTSIZE2];
        let before = y;
        convolve(&x, &mut y, 0.0, 3, 5);
        assert_eq!(y, before);
    }

    #[test]
    fn dc_case_is_plain_scale_by_four() {
        // (k, l) = (0, 0): pass A doubles every entry, pass B doubles again,
        // so the DC basis pair convolution is just a 4x uniform scale.
        let mut x = [0.0f32; DCTSIZE2];
        for (i, v) in x.iter_mut().enumerate() {
            *v = i as f32;
        }
        let mut y = [0.0f32; DCTSIZE2];
        convolve(&x, &mut y, 1.0, 0, 0);
        for i in 0..DCTSIZE2 {
            assert!((y[i] - 4.0 * x[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn linearity_holds() {
        // I4: convolve(aX + bX', Y, w, k, l) == a*contrib(X) + b*contrib(X')
        let x1 = impulse(2, 3);
        let x2 = impulse(5, 1);
        let (a, b) = (0.7f32, -1.3f32);
        let mut combined = [0.0f32; DCTSIZE2];
        for i in 0..DCTSIZE2 {
            combined[i] = a * x1[i] + b * x2[i];
        }

        let mut y_combined = [0.0f32; DCTSIZE2];
        convolve(&combined, &mut y_combined, 1.0, 4, 6);

        let mut y1 = [0.0f32; DCTSIZE2];
        convolve(&x1, &mut y1, 1.0, 4, 6);
        let mut y2 = [0.0f32; DCTSIZE2];
        convolve(&x2, &mut y2, 1.0, 4, 6);

        for i in 0..DCTSIZE2 {
            let expected = a * y1[i] + b * y2[i];
            assert!((y_combined[i] - expected).abs() < 1e-3, "index {i}: {} vs {}", y_combined[i], expected);
        }
    }

    #[test]
    fn accumulates_across_all_64_basis_pairs_without_panicking() {
        let x = impulse(1, 1);
        let mut y = [0.0f32; DCTSIZE2];
        for k in 0..8 {
            for l in 0..8 {
                convolve(&x, &mut y, 1.0, k, l);
            }
        }
        assert!(y.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn pass_a_and_pass_b_share_the_same_stencil_table() {
        // Sanity check on the lane-width generalisation itself: running the
        // scalar stencil on 8 independent lanes must equal running the
        // 8-wide stencil once on the same data packed into a single lane
        // set, for every case.
        let lanes: [f32; 8] = [1.0, -2.0, 3.0, 0.5, -0.25, 4.0, -1.5, 2.25];
        for case in 0..8 {
            let scalar_in: [[f32; 1]; 8] = std::array::from_fn(|i| [lanes[i]]);
            let scalar_out = stencil::<1>(case, &scalar_in);
            let wide_in: [[f32; 8]; 8] = std::array::from_fn(|i| {
                let mut row = [0.0f32; 8];
                row[0] = lanes[i];
                row
            });
            let wide_out = stencil::<8>(case, &wide_in);
            for i in 0..8 {
                assert!((scalar_out[i][0] - wide_out[i][0]).abs() < 1e-6, "case {case} lane {i}");
            }
        }
    }
}
