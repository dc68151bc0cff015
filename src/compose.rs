//! The compositor (component C6): places an adapted dropon on a host's
//! coefficient grid and blends it in, block by block, entirely in the DCT
//! domain.

use log::{debug, trace};

use crate::coef::JpegImage;
use crate::convolve::convolve;
use crate::dropon::{Blend, Dropon};
use crate::error::Result;
use crate::geometry::{align_offset, check_fits, AlignOffsetKind, Alignment, DCTSIZE2};
use crate::mask::MaskOperator;

/// Blends `dropon` onto `host` at `alignment`, mutating `host`'s coefficient
/// planes in place (spec.md §4.6).
///
/// Handles the reload check (re-adapting the dropon whenever the host's
/// colour space or per-component sampling no longer matches what the dropon
/// was last adapted to) and the `blend = NONE` shortcut itself; callers
/// never need to call [`Dropon::adapt`] directly.
pub fn compose(host: &mut JpegImage, dropon: &mut Dropon, alignment: Alignment) -> Result<()> {
    if dropon.blend() == Blend::None {
        debug!("blend = NONE, composition is a no-op");
        return Ok(());
    }

    let sampling = host.sampling_signature();
    debug!(
        "composing onto a {:?} host ({} component(s)) with blend {:?}",
        host.colorspace,
        sampling.len(),
        dropon.blend()
    );
    let adapted = dropon.adapt(host.colorspace, &sampling)?;
    let (host_h_blocks, host_v_blocks) = host.block_extent();

    for (c, component) in adapted.image.components.iter().enumerate() {
        let samp = host.components[c].samp;
        let w_c = component.width_in_blocks;
        let h_c = component.height_in_blocks;

        let off_h = align_offset(AlignOffsetKind::from(alignment.align_h), host_h_blocks, samp.h, w_c)
            + blocks_from_pixel_offset(alignment.offset_x, samp.h);
        let off_v = align_offset(AlignOffsetKind::from(alignment.align_v), host_v_blocks, samp.v, h_c)
            + blocks_from_pixel_offset(alignment.offset_y, samp.v);

        let host_component_w = samp.h as usize * host_h_blocks;
        let host_component_h = samp.v as usize * host_v_blocks;
        check_fits(w_c, h_c, off_h, off_v, host_component_w, host_component_h)?;
        trace!("component {c}: placing {w_c}x{h_c} blocks at ({off_h},{off_v})");

        blend_component(
            host,
            c,
            component,
            adapted.mask.as_ref(),
            dropon.blend(),
            off_h as usize,
            off_v as usize,
        );
    }

    Ok(())
}

/// Converts a pixel offset to whole blocks, rounding toward zero (spec.md
/// §3: "Offsets are in pixels, quantised internally to block units").
fn blocks_from_pixel_offset(offset_px: i32, samp: u8) -> i32 {
    offset_px / (8 * samp as i32)
}

fn blend_component(
    host: &mut JpegImage,
    c: usize,
    dropon_component: &crate::coef::Component,
    mask: Option<&MaskOperator>,
    blend: Blend,
    off_h: usize,
    off_v: usize,
) {
    // `Blend::Uniform(n)`'s strength is already baked into the mask operator:
    // `Dropon::build_adaptation` encodes `raw_alpha` as a constant-`n` plane,
    // so the adapted mask's DC term alone carries the `n/255` scaling (the
    // same per-block operator a real non-uniform mask would produce for a
    // flat region). Re-multiplying by `n/255` here would apply the strength
    // twice, so both `Uniform` and `NonUniform` share one code path.
    for by in 0..dropon_component.height_in_blocks {
        for bx in 0..dropon_component.width_in_blocks {
            let x0 = *dropon_component.block_at(by, bx);
            let host_by = off_v + by;
            let host_bx = off_h + bx;
            let x1 = host.block_at_mut(c, host_by, host_bx);

            if blend == Blend::Full {
                *x1 = x0;
                continue;
            }

            let b = mask
                .expect("NonUniform/Uniform blend requires an adapted mask operator")
                .block_at(c, by, bx);

            let mut d = [0.0f32; DCTSIZE2];
            for n in 0..DCTSIZE2 {
                d[n] = (x0[n] - x1[n]) as f32;
            }

            let mut y = [0.0f32; DCTSIZE2];
            for i in 0..8 {
                for j in 0..8 {
                    convolve(&d, &mut y, b[i * 8 + j], i, j);
                }
            }

            for n in 0..DCTSIZE2 {
                x1[n] += y[n] as i32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coef::Component;
    use crate::dropon::RawPixels;
    use crate::error::Colorspace;
    use crate::geometry::{AlignH, AlignV, SampFactor};

    fn flat_host(colorspace: Colorspace, n_comp: usize, blocks: usize, samp: SampFactor) -> JpegImage {
        let comps = (0..n_comp)
            .map(|_| {
                let mut comp = Component::new(samp, blocks, blocks, [1; DCTSIZE2]);
                for by in 0..blocks {
                    for bx in 0..blocks {
                        *comp.block_at_mut(by, bx) = [10; DCTSIZE2];
                    }
                }
                comp
            })
            .collect();
        JpegImage::new(colorspace, blocks * 8 * samp.h as usize, blocks * 8 * samp.v as usize, samp.h, samp.v, comps)
    }

    #[test]
    fn blend_none_mutates_nothing() {
        let mut host = flat_host(Colorspace::Grayscale, 1, 4, SampFactor { h: 1, v: 1 });
        let before = host.clone();
        let mut dropon = Dropon::from_raw(&[255; 3], RawPixels::Rgb, Blend::None, 1, 1);
        compose(&mut host, &mut dropon, Alignment::new(AlignH::Center, AlignV::Center)).unwrap();
        assert_eq!(host.block_at(0, 0, 0), before.block_at(0, 0, 0));
    }

    #[test]
    fn pixel_offset_shifts_placement_by_whole_blocks() {
        // 4x4-block grayscale host, 1x1-block (8x8px) dropon, placed at the
        // top-left corner but nudged right by one whole block (8px at 1:1
        // sampling) via `Alignment::with_offset` / `blocks_from_pixel_offset`.
        let mut host = flat_host(Colorspace::Grayscale, 1, 4, SampFactor { h: 1, v: 1 });
        let pixels = vec![200u8; 8 * 8 * 3];
        let mut dropon = Dropon::from_raw(&pixels, RawPixels::Rgb, Blend::Full, 8, 8);
        let alignment = Alignment::new(AlignH::Left, AlignV::Top).with_offset(8, 0);
        compose(&mut host, &mut dropon, alignment).unwrap();

        // The origin block was never touched...
        assert_eq!(host.block_at(0, 0, 0), &[10; DCTSIZE2]);
        // ...but the block one whole MCU to the right was overwritten by the
        // dropon's (quality-100-adapted) coefficients, which are not the
        // host's flat `10` fill.
        assert_ne!(host.block_at(0, 0, 1), &[10; DCTSIZE2]);
    }

    #[test]
    fn oversized_dropon_is_rejected() {
        let mut host = flat_host(Colorspace::Grayscale, 1, 1, SampFactor { h: 1, v: 1 });
        // A 16x16 RGB dropon is 2 blocks wide at 4:4:4 subsampling, wider
        // than the 1-block host.
        let pixels = vec![128u8; 16 * 16 * 3];
        let mut dropon = Dropon::from_raw(&pixels, RawPixels::Rgb, Blend::Full, 16, 16);
        let result = compose(&mut host, &mut dropon, Alignment::new(AlignH::Right, AlignV::Bottom));
        assert!(result.is_err());
    }
}
