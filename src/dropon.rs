//! The dropon source (component C2) and its adapter (component C3): the
//! logo's raw pixels, plus the machinery that re-encodes them through a real
//! JPEG encoder so their coefficient blocks land on the host's quantisation
//! grid.

use log::debug;

use crate::coef::JpegImage;
use crate::codec;
use crate::error::{Colorspace, Result};
use crate::geometry::SampFactor;
use crate::mask::MaskOperator;

/// How strongly the dropon replaces the host at composite time.
///
/// `NONE` is a pure no-op (the compositor returns without touching the
/// host); `FULL` replaces the host block outright with no convolution;
/// `NonUniform` derives the per-block mask operator from a real per-pixel
/// alpha image; `Uniform(n)` replicates the scalar `n` into a flat alpha
/// plane before adaptation, so it is driven by exactly the same mask
/// operator machinery — a flat plane's per-block DC term already carries
/// the `n / 255` strength once it passes through the encoder and C4.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Blend {
    None,
    Full,
    NonUniform,
    Uniform(u8),
}

impl Blend {
    /// Builds a [`Blend`] from the raw `{NONE=0, FULL=255, NONUNIFORM=-1} ∪
    /// [1,254]` encoding used throughout spec.md.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Blend::None,
            255 => Blend::Full,
            -1 => Blend::NonUniform,
            n @ 1..=254 => Blend::Uniform(n as u8),
            other => panic!("blend code {other} out of range"),
        }
    }

    fn is_none(self) -> bool {
        matches!(self, Blend::None)
    }

    fn is_full(self) -> bool {
        matches!(self, Blend::Full)
    }
}

/// The pixel layout of the bytes passed to [`Dropon::from_raw`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RawPixels {
    /// 3 bytes per pixel.
    Rgb,
    /// 4 bytes per pixel; the 4th is per-pixel alpha.
    Rgba,
}

/// A logo plus blend strength, held as raw pixels until adapted against a
/// particular host colour space/sampling (spec.md §3 "Dropon (C2)").
pub struct Dropon {
    raw_image: Vec<u8>,
    raw_alpha: Vec<u8>,
    width: usize,
    height: usize,
    blend: Blend,
    cached: Option<CachedAdaptation>,
}

struct CachedAdaptation {
    colorspace: Colorspace,
    sampling: Vec<SampFactor>,
    adapted: AdaptedDropon,
}

/// The two coefficient stores derived from a [`Dropon`] once adapted to a
/// host's colour space and sampling (spec.md §3 "AdaptedDropon").
pub struct AdaptedDropon {
    pub image: JpegImage,
    pub mask: Option<MaskOperator>,
}

impl Dropon {
    /// Builds a dropon from raw RGB or RGBA pixels (spec.md §4.2). RGBA
    /// input forces `blend` to [`Blend::NonUniform`], taking the per-pixel
    /// alpha channel as the mask; RGB input replicates `blend`'s numeric
    /// strength uniformly.
    pub fn from_raw(bytes: &[u8], layout: RawPixels, blend: Blend, width: usize, height: usize) -> Self {
        let pixels = width * height;
        let (raw_image, raw_alpha, blend) = match layout {
            RawPixels::Rgba => {
                assert_eq!(bytes.len(), pixels * 4, "RGBA input length mismatch");
                let mut image = Vec::with_capacity(pixels * 3);
                let mut alpha = Vec::with_capacity(pixels * 3);
                for px in bytes.chunks_exact(4) {
                    image.extend_from_slice(&px[..3]);
                    alpha.extend_from_slice(&[px[3]; 3]);
                }
                (image, alpha, Blend::NonUniform)
            }
            RawPixels::Rgb => {
                assert_eq!(bytes.len(), pixels * 3, "RGB input length mismatch");
                let value = match blend {
                    Blend::Uniform(n) => n,
                    Blend::Full => 255,
                    Blend::None => 0,
                    Blend::NonUniform => {
                        panic!("RawPixels::Rgb cannot carry a NonUniform blend without a mask")
                    }
                };
                (bytes.to_vec(), vec![value; pixels * 3], blend)
            }
        };
        Dropon { raw_image, raw_alpha, width, height, blend, cached: None }
    }

    /// Builds a dropon from an in-memory logo JPEG and an optional in-memory
    /// mask JPEG (spec.md §4.2). When `mask_bytes` is present its Y plane
    /// replaces the per-pixel alpha and `blend` becomes
    /// [`Blend::NonUniform`]; without a mask, `blend` is used as given.
    pub fn from_jpeg_bytes(image_bytes: &[u8], mask_bytes: Option<&[u8]>, blend: Blend) -> Result<Self> {
        let (raw_image, width, height) = codec::decode_to_pixels(image_bytes)?;
        let (raw_alpha, blend) = match mask_bytes {
            Some(mask_bytes) => {
                let (mask_rgb, mask_w, mask_h) = codec::decode_to_pixels(mask_bytes)?;
                assert_eq!((mask_w, mask_h), (width, height), "mask dimensions must match the logo");
                (mask_rgb, Blend::NonUniform)
            }
            None => {
                let value = match blend {
                    Blend::Uniform(n) => n,
                    Blend::Full => 255,
                    Blend::None => 0,
                    Blend::NonUniform => {
                        panic!("from_jpeg_bytes needs a mask to use a NonUniform blend")
                    }
                };
                (vec![value; width * height * 3], blend)
            }
        };
        Ok(Dropon { raw_image, raw_alpha, width, height, blend, cached: None })
    }

    pub fn blend(&self) -> Blend {
        self.blend
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the dropon adapted to `colorspace`/`sampling`, rebuilding it
    /// (spec.md §4.3, §9) only when the cached adaptation's signature
    /// doesn't match.
    pub fn adapt(&mut self, colorspace: Colorspace, sampling: &[SampFactor]) -> Result<&AdaptedDropon> {
        let stale = match &self.cached {
            Some(cached) => cached.colorspace != colorspace || cached.sampling != sampling,
            None => true,
        };
        if stale {
            debug!("reloading dropon: adapting to {colorspace:?} sampling {sampling:?}");
            let adapted = self.build_adaptation(colorspace, sampling)?;
            self.cached = Some(CachedAdaptation { colorspace, sampling: sampling.to_vec(), adapted });
        }
        Ok(&self.cached.as_ref().unwrap().adapted)
    }

    /// Re-encodes `raw_image` and `raw_alpha` at `colorspace`/`sampling` and
    /// decodes both back to coefficients.
    ///
    /// `raw_alpha` is adapted at the *same* colour space as `raw_image`
    /// rather than forced to YCbCr the way `outline.c`'s
    /// `mj_update_jpegdropon` does. Every channel of `raw_alpha` is already
    /// equal (the alpha value replicated 3x), so adapting it at the host's
    /// own colour space still gives each of the resulting mask's components
    /// the correct alpha-derived operator — and keeps the mask's component
    /// count aligned 1:1 with the image's, so `compose::blend_component`
    /// never has to borrow one channel's operator for another (see
    /// `DESIGN.md`).
    fn build_adaptation(&self, colorspace: Colorspace, sampling: &[SampFactor]) -> Result<AdaptedDropon> {
        let image_bytes =
            codec::encode_pixels(&self.raw_image, self.width, self.height, colorspace, sampling, 100)?;
        let image = codec::decode_coefficients(&image_bytes)?;
        debug!(
            "adapted dropon image: {}x{} px, {} component(s)",
            image.width,
            image.height,
            image.components.len()
        );

        let mask = if self.blend.is_none() || self.blend.is_full() {
            None
        } else {
            let alpha_bytes =
                codec::encode_pixels(&self.raw_alpha, self.width, self.height, colorspace, sampling, 100)?;
            let alpha_image = codec::decode_coefficients(&alpha_bytes)?;
            Some(MaskOperator::build(&alpha_image))
        };

        Ok(AdaptedDropon { image, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_from_code_covers_named_values() {
        assert_eq!(Blend::from_code(0), Blend::None);
        assert_eq!(Blend::from_code(255), Blend::Full);
        assert_eq!(Blend::from_code(-1), Blend::NonUniform);
        assert_eq!(Blend::from_code(128), Blend::Uniform(128));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn blend_from_code_rejects_out_of_range() {
        Blend::from_code(1000);
    }

    #[test]
    fn from_raw_rgba_replicates_alpha_into_rgb_triplet() {
        // 1x1 RGBA pixel: red, half-transparent.
        let dropon = Dropon::from_raw(&[255, 0, 0, 128], RawPixels::Rgba, Blend::Full, 1, 1);
        assert_eq!(dropon.blend(), Blend::NonUniform);
        assert_eq!(dropon.raw_image, vec![255, 0, 0]);
        assert_eq!(dropon.raw_alpha, vec![128, 128, 128]);
    }

    #[test]
    fn from_raw_rgb_uses_uniform_blend_as_alpha() {
        let dropon = Dropon::from_raw(&[10, 20, 30], RawPixels::Rgb, Blend::Uniform(200), 1, 1);
        assert_eq!(dropon.blend(), Blend::Uniform(200));
        assert_eq!(dropon.raw_alpha, vec![200, 200, 200]);
    }

    #[test]
    fn width_and_height_report_the_pixel_dimensions_given_at_construction() {
        let dropon = Dropon::from_raw(&[0; 3 * 4 * 6], RawPixels::Rgb, Blend::Full, 4, 6);
        assert_eq!(dropon.width(), 4);
        assert_eq!(dropon.height(), 6);
    }
}
