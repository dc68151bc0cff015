//! Mask Block-Operator Builder (component C4): turns an alpha JPEG's
//! DC-centred coefficient blocks into a per-block 8x8 DCT-domain operator.

use crate::coef::JpegImage;
use crate::geometry::DCTSIZE2;

/// DCT-II orthonormalisation scale factor `c(k)`: `1/(2*sqrt(2))` for the DC
/// term, `1/2` for every AC term.
fn c(k: usize) -> f32 {
    if k == 0 {
        std::f32::consts::FRAC_1_SQRT_2 / 2.0
    } else {
        0.5
    }
}

/// Normalisation divisor for the mask operator (spec.md §4.4, §9 "Numerical
/// precision": `1020`, not `1024` — preserved exactly to match the
/// reference's output).
const MASK_NORMALIZER: f32 = 1020.0;

/// DC shift applied before scaling (spec.md §4.4, §9 Q2): the dequantised DC
/// coefficient's natural range is `[-1024, 1016]`; adding `1024` maps "mask
/// fully white" to the top of an unsigned `[0, 2040]` strength scale.
const DC_SHIFT: f32 = 1024.0;

/// Per-component array of 8x8 block operators, one per block of the
/// corresponding alpha-stream component.
#[derive(Debug, Clone)]
pub struct MaskOperator {
    components: Vec<MaskComponent>,
}

#[derive(Debug, Clone)]
struct MaskComponent {
    width_in_blocks: usize,
    height_in_blocks: usize,
    blocks: Vec<[f32; DCTSIZE2]>,
}

impl MaskOperator {
    /// Builds a block operator from an adapted alpha [`JpegImage`] (the Y
    /// channel of an RGB/grayscale mask JPEG whose luma encodes the alpha
    /// signal, see spec.md §6 "Dropon mask format").
    ///
    /// This is the corrected form of `outline.c`'s `mj_read_jpegmask_from_mem`:
    /// the reference's inner loop only ever writes `b[(i<<3) + 0]` for rows
    /// `i = 1..7` instead of `b[(i<<3) + j]` for all `j`, which spec.md §9
    /// (Q1) identifies as a typo and mandates fixing. Every one of the 64
    /// entries is populated here.
    pub fn build(alpha: &JpegImage) -> Self {
        let components = alpha
            .components
            .iter()
            .map(|comp| {
                let mut blocks = Vec::with_capacity(comp.width_in_blocks * comp.height_in_blocks);
                for by in 0..comp.height_in_blocks {
                    for bx in 0..comp.width_in_blocks {
                        let coef = comp.block_at(by, bx);
                        let dc = coef[0] as f32 + DC_SHIFT;
                        let mut b = [0.0f32; DCTSIZE2];
                        for i in 0..8 {
                            for j in 0..8 {
                                let source = if i == 0 && j == 0 { dc } else { coef[i * 8 + j] as f32 };
                                b[i * 8 + j] = source * c(i) * c(j) / MASK_NORMALIZER;
                            }
                        }
                        blocks.push(b);
                    }
                }
                MaskComponent { width_in_blocks: comp.width_in_blocks, height_in_blocks: comp.height_in_blocks, blocks }
            })
            .collect();
        MaskOperator { components }
    }

    /// The block operator `B` for component `c`'s block `(by, bx)`.
    pub fn block_at(&self, c: usize, by: usize, bx: usize) -> &[f32; DCTSIZE2] {
        let comp = &self.components[c];
        debug_assert!(bx < comp.width_in_blocks && by < comp.height_in_blocks);
        &comp.blocks[by * comp.width_in_blocks + bx]
    }

    pub fn width_in_blocks(&self, c: usize) -> usize {
        self.components[c].width_in_blocks
    }

    pub fn height_in_blocks(&self, c: usize) -> usize {
        self.components[c].height_in_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coef::Component;
    use crate::error::Colorspace;
    use crate::geometry::SampFactor;

    fn single_block_alpha(dc_dequantized: i32, ac: [i32; 63]) -> JpegImage {
        let mut comp = Component::new(SampFactor { h: 1, v: 1 }, 1, 1, [1; DCTSIZE2]);
        let block = comp.block_at_mut(0, 0);
        block[0] = dc_dequantized;
        block[1..].copy_from_slice(&ac);
        JpegImage::new(Colorspace::Grayscale, 8, 8, 1, 1, vec![comp])
    }

    #[test]
    fn opaque_white_mask_normalizes_close_to_one() {
        // DC dequantised to 0 (mid-grey DC in a codec where 0 maps to the
        // shifted midpoint would be 1024 after shift; full white saturates
        // near the top of the unsigned range, here approximated directly).
        let alpha = single_block_alpha(1016, [0; 63]);
        let op = MaskOperator::build(&alpha);
        let b = op.block_at(0, 0, 0);
        // B[0] = (1016 + 1024) * c(0)^2 / 1020 ~= 2040 * 0.125 / 1020 ~= 0.25
        // (c(0)^2 = (1/(2 sqrt 2))^2 = 1/8)
        let expected = (1016.0 + 1024.0) * c(0) * c(0) / MASK_NORMALIZER;
        assert!((b[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn all_64_entries_are_populated_not_just_column_zero() {
        // Regression test for the Q1 typo: every (i, j) must be distinct
        // from zero when the source coefficients are all distinct nonzero
        // values, in particular entries at j != 0 for i >= 1.
        let mut ac = [0i32; 63];
        for (idx, v) in ac.iter_mut().enumerate() {
            *v = (idx as i32 + 1) * 7;
        }
        let alpha = single_block_alpha(0, ac);
        let op = MaskOperator::build(&alpha);
        let b = op.block_at(0, 0, 0);
        for i in 1..8 {
            for j in 1..8 {
                assert_ne!(b[i * 8 + j], 0.0, "entry ({i},{j}) was left at zero");
            }
        }
    }

    #[test]
    fn dc_scale_factor_is_smaller_than_ac_scale_factor() {
        assert!(c(0) < c(1));
        assert!((c(1) - 0.5).abs() < 1e-7);
    }
}
