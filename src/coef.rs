//! Typed view over a decoded JPEG's per-component dequantised DCT coefficient
//! planes (component C1 of the design).

use std::fmt;

use crate::codec::HostSession;
use crate::error::Colorspace;
use crate::geometry::{mcu_blocks, DCTSIZE2, SampFactor};

/// One component's coefficient plane plus its sampling and quantisation
/// metadata.
///
/// Blocks are stored dequantised (coefficient × quantisation-table entry),
/// matching what `outline.c`'s `mj_read_jpegimage_from_mem` does on read; the
/// quantisation table is retained so that [`JpegImage`] can re-quantise on
/// encode.
#[derive(Debug, Clone)]
pub struct Component {
    pub samp: SampFactor,
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    pub quant_table: [u16; DCTSIZE2],
    blocks: Vec<[i32; DCTSIZE2]>,
}

impl Component {
    pub fn new(samp: SampFactor, width_in_blocks: usize, height_in_blocks: usize, quant_table: [u16; DCTSIZE2]) -> Self {
        Component {
            samp,
            width_in_blocks,
            height_in_blocks,
            quant_table,
            blocks: vec![[0i32; DCTSIZE2]; width_in_blocks * height_in_blocks],
        }
    }

    fn index(&self, by: usize, bx: usize) -> usize {
        debug_assert!(bx < self.width_in_blocks, "block x out of range");
        debug_assert!(by < self.height_in_blocks, "block y out of range");
        by * self.width_in_blocks + bx
    }

    pub fn block_at(&self, by: usize, bx: usize) -> &[i32; DCTSIZE2] {
        &self.blocks[self.index(by, bx)]
    }

    pub fn block_at_mut(&mut self, by: usize, bx: usize) -> &mut [i32; DCTSIZE2] {
        let idx = self.index(by, bx);
        &mut self.blocks[idx]
    }

    /// Dequantises a raw (just-decoded) coefficient plane in place:
    /// `coef[n] *= quant_table[n]`, four lanes at a time as the reference
    /// does.
    pub(crate) fn dequantize(&mut self) {
        for block in &mut self.blocks {
            for i in (0..DCTSIZE2).step_by(4) {
                block[i] *= self.quant_table[i] as i32;
                block[i + 1] *= self.quant_table[i + 1] as i32;
                block[i + 2] *= self.quant_table[i + 2] as i32;
                block[i + 3] *= self.quant_table[i + 3] as i32;
            }
        }
    }

    /// Re-quantises a dequantised coefficient plane in place, truncating
    /// toward zero (integer division in Rust already truncates toward zero,
    /// matching the `(int)coefs[i] / quantval[i]` cast in the reference).
    pub(crate) fn requantize(&self, out: &mut Vec<[i32; DCTSIZE2]>) {
        out.clear();
        out.extend(self.blocks.iter().map(|block| {
            let mut q = [0i32; DCTSIZE2];
            for i in (0..DCTSIZE2).step_by(4) {
                q[i] = block[i] / self.quant_table[i] as i32;
                q[i + 1] = block[i + 1] / self.quant_table[i + 1] as i32;
                q[i + 2] = block[i + 2] / self.quant_table[i + 2] as i32;
                q[i + 3] = block[i + 3] / self.quant_table[i + 3] as i32;
            }
            q
        }));
    }
}

/// A decoded JPEG's coefficient planes plus enough geometry to place and
/// re-encode them (spec.md §3 "JpegImage (C1)").
///
/// An image built by [`JpegImage::decode`] carries a live codec session
/// (spec.md §9: the decompress struct and its `jvirt_barray_ptr` workspace
/// must outlive the mutate step so [`JpegImage::encode`] can write the
/// composited coefficients back into the same virtual arrays libjpeg
/// allocated for them); an image built directly with [`JpegImage::new`] (as
/// every unit test in this crate does, and as the dropon adapter does for
/// its own throwaway coefficient reads) carries none and cannot be
/// re-encoded. [`JpegImage`] still implements [`Clone`] for the "owned
/// scratch copy" rollback spec.md §7 calls for — the clone never carries a
/// session, since it exists only to be discarded or have its data copied
/// back, never to be encoded itself.
pub struct JpegImage {
    pub colorspace: Colorspace,
    pub width: usize,
    pub height: usize,
    pub max_h_samp: u8,
    pub max_v_samp: u8,
    pub components: Vec<Component>,
    pub(crate) session: Option<HostSession>,
}

impl Clone for JpegImage {
    fn clone(&self) -> Self {
        JpegImage {
            colorspace: self.colorspace,
            width: self.width,
            height: self.height,
            max_h_samp: self.max_h_samp,
            max_v_samp: self.max_v_samp,
            components: self.components.clone(),
            session: None,
        }
    }
}

impl fmt::Debug for JpegImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JpegImage")
            .field("colorspace", &self.colorspace)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("max_h_samp", &self.max_h_samp)
            .field("max_v_samp", &self.max_v_samp)
            .field("components", &self.components)
            .field("session", &self.session.is_some())
            .finish()
    }
}

impl JpegImage {
    pub fn new(
        colorspace: Colorspace,
        width: usize,
        height: usize,
        max_h_samp: u8,
        max_v_samp: u8,
        components: Vec<Component>,
    ) -> Self {
        JpegImage { colorspace, width, height, max_h_samp, max_v_samp, components, session: None }
    }

    pub fn block_at(&self, c: usize, by: usize, bx: usize) -> &[i32; DCTSIZE2] {
        self.components[c].block_at(by, bx)
    }

    pub fn block_at_mut(&mut self, c: usize, by: usize, bx: usize) -> &mut [i32; DCTSIZE2] {
        self.components[c].block_at_mut(by, bx)
    }

    /// The host's overall MCU block extent `(H_blocks, V_blocks)`, using the
    /// reference's "round up past half an MCU" rule (spec.md §4.6 step 3).
    pub fn block_extent(&self) -> (usize, usize) {
        (mcu_blocks(self.width, self.max_h_samp), mcu_blocks(self.height, self.max_v_samp))
    }

    /// Per-component sampling signature used to decide whether a cached
    /// adapted dropon must be rebuilt (spec.md §9, §4.6 step 1).
    pub fn sampling_signature(&self) -> Vec<SampFactor> {
        self.components.iter().map(|c| c.samp).collect()
    }

    /// Decodes a host JPEG's dequantised DCT coefficients (spec.md §4.1
    /// `open_from_bytes`), rejecting progressive, arithmetic-coded and
    /// CMYK/YCCK streams (spec.md §6). The returned image keeps the codec
    /// session that produced it alive, so it can be mutated in place (e.g.
    /// by [`crate::compose()`]) and handed to [`JpegImage::encode`].
    pub fn decode(bytes: &[u8]) -> crate::error::Result<JpegImage> {
        crate::codec::open_host(bytes)
    }

    /// Re-quantises this image's coefficients and writes a compliant JPEG,
    /// copying the host's quantisation tables and sampling factors verbatim
    /// (spec.md §4.1 `write_to_bytes`). Only an image produced by
    /// [`JpegImage::decode`] carries the live session this needs; a clone,
    /// or an image built directly with [`JpegImage::new`], has none.
    pub fn encode(mut self) -> crate::error::Result<Vec<u8>> {
        let session = self.session.take().ok_or_else(|| {
            crate::error::Error::Encode(
                "image has no live codec session (only JpegImage::decode()'s result can be re-encoded)"
                    .to_string(),
            )
        })?;
        session.encode(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_quant() -> [u16; DCTSIZE2] {
        [1; DCTSIZE2]
    }

    #[test]
    fn dequantize_then_requantize_round_trips_with_unit_quant() {
        let mut comp = Component::new(SampFactor { h: 1, v: 1 }, 2, 2, flat_quant());
        for (n, block) in [(0usize, [5i32; DCTSIZE2]), (1, [7; DCTSIZE2])] {
            *comp.block_at_mut(n / 2, n % 2) = block;
        }
        comp.dequantize();
        let mut out = Vec::new();
        comp.requantize(&mut out);
        assert_eq!(out[0], [5; DCTSIZE2]);
        assert_eq!(out[1], [7; DCTSIZE2]);
    }

    #[test]
    fn dequantize_multiplies_by_quant_table() {
        let mut quant = [1u16; DCTSIZE2];
        quant[0] = 16;
        let mut comp = Component::new(SampFactor { h: 1, v: 1 }, 1, 1, quant);
        comp.block_at_mut(0, 0)[0] = 3;
        comp.dequantize();
        assert_eq!(comp.block_at(0, 0)[0], 48);
    }

    #[test]
    fn block_extent_uses_mcu_rounding() {
        let img = JpegImage::new(Colorspace::YCbCr, 640, 480, 2, 2, Vec::new());
        assert_eq!(img.block_extent(), (40, 30));
    }

    #[test]
    fn sampling_signature_reflects_components() {
        let comps = vec![
            Component::new(SampFactor { h: 2, v: 2 }, 1, 1, flat_quant()),
            Component::new(SampFactor { h: 1, v: 1 }, 1, 1, flat_quant()),
        ];
        let img = JpegImage::new(Colorspace::YCbCr, 16, 16, 2, 2, comps);
        assert_eq!(
            img.sampling_signature(),
            vec![SampFactor { h: 2, v: 2 }, SampFactor { h: 1, v: 1 }]
        );
    }
}
