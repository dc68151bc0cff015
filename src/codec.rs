//! The codec facade (component C7): the only module that touches libjpeg
//! directly. Everything above this layer works with [`crate::coef::JpegImage`]
//! and plain RGB byte buffers.
//!
//! This is a close relative of `Blobfolio-flaca`'s `jpegtran_mem`: the
//! coefficient round trip (decode -> `jpeg_read_coefficients` -> mutate ->
//! `jpeg_write_coefficients`) reuses its `jtransform_request_workspace` /
//! `JXFORM_NONE` passthrough trick to obtain a `jvirt_barray_ptr` workspace
//! we can write into, rather than hand-rolling `outline.c`'s own
//! `modjpeg_dest_mgr`. The plain-pixel paths (used only by the dropon
//! adapter, never by the host round trip) follow the ordinary
//! `jpeg_start_compress`/`jpeg_write_scanlines` and
//! `jpeg_start_decompress`/`jpeg_read_scanlines` sequences common to every
//! mozjpeg-sys wrapper in this ecosystem.
//!
//! `libjpeg`'s default error manager calls `exit()` on a fatal error, which
//! is unacceptable inside a library. Like the error managers used by
//! mozjpeg-rust wrappers in the wild, we start from `jpeg_std_error` (so the
//! standard message table and `format_message` are populated) and then
//! override `error_exit` with a callback that formats the message and
//! panics; every call into libjpeg is wrapped in `catch_unwind` at the point
//! where we still hold enough context to convert that panic into an
//! [`Error::CodecPanic`].

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::{mem, ptr, slice};

use log::{debug, trace};
use mozjpeg_sys::{
    boolean, jpeg_CreateCompress, jpeg_CreateDecompress, jpeg_common_struct, jpeg_compress_struct,
    jpeg_copy_critical_parameters, jpeg_decompress_struct, jpeg_destroy_compress,
    jpeg_destroy_decompress, jpeg_error_mgr, jpeg_finish_compress, jpeg_finish_decompress,
    jpeg_mem_dest, jpeg_mem_src, jpeg_read_coefficients, jpeg_read_header, jpeg_read_scanlines,
    jpeg_set_colorspace, jpeg_set_defaults, jpeg_set_quality,
    jpeg_start_compress, jpeg_start_decompress, jpeg_std_error, jpeg_write_coefficients,
    jpeg_write_scanlines, jtransform_adjust_parameters, jtransform_execute_transform,
    jtransform_request_workspace, jvirt_barray_ptr, jpeg_transform_info, J_COLOR_SPACE,
    JCROP_CODE_JCROP_UNSET, JPEG_LIB_VERSION, JXFORM_CODE_JXFORM_NONE,
};

use crate::buf::OwnedBuf;
use crate::coef::{Component, JpegImage};
use crate::error::{Colorspace, Error, Result};
use crate::geometry::{DCTSIZE2, SampFactor};

const JMSG_LENGTH_MAX: usize = 200;

/// Converts a `usize` length/dimension to the (narrower, on most targets)
/// integer type libjpeg's C API expects, rejecting values that don't fit
/// rather than silently truncating them.
fn checked_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::IntegerOverflow(what))
}

fn checked_c_ulong(value: usize, what: &'static str) -> Result<libc::c_ulong> {
    libc::c_ulong::try_from(value).map_err(|_| Error::IntegerOverflow(what))
}

unsafe extern "C" fn error_exit(cinfo: *mut jpeg_common_struct) {
    let mut buf = [0 as c_char; JMSG_LENGTH_MAX];
    let err = (*cinfo).err;
    if let Some(format_message) = (*err).format_message {
        format_message(cinfo, buf.as_mut_ptr());
    }
    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned();
    panic!("{msg}");
}

/// Runs `f` with libjpeg's default error manager rewired so a fatal error
/// panics instead of calling `exit()`, and turns that panic into
/// [`Error::CodecPanic`] rather than unwinding past our API boundary.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "unknown libjpeg error".to_string());
            Err(Error::CodecPanic(msg))
        }
    }
}

unsafe fn std_error_with_panic_exit(jerr: &mut jpeg_error_mgr) -> *mut jpeg_error_mgr {
    let ptr = jpeg_std_error(jerr);
    (*ptr).error_exit = Some(error_exit);
    ptr
}

fn colorspace_to_jcs(cs: Colorspace) -> J_COLOR_SPACE {
    match cs {
        Colorspace::Rgb => J_COLOR_SPACE::JCS_RGB,
        Colorspace::YCbCr => J_COLOR_SPACE::JCS_YCbCr,
        Colorspace::Grayscale => J_COLOR_SPACE::JCS_GRAYSCALE,
    }
}

fn jcs_to_colorspace(cs: J_COLOR_SPACE) -> Result<Colorspace> {
    match cs {
        J_COLOR_SPACE::JCS_RGB => Ok(Colorspace::Rgb),
        J_COLOR_SPACE::JCS_YCbCr => Ok(Colorspace::YCbCr),
        J_COLOR_SPACE::JCS_GRAYSCALE => Ok(Colorspace::Grayscale),
        other => Err(Error::UnsupportedColorspace(format!("{other:?}"))),
    }
}

/// Rejects progressive, arithmetic-coded and CMYK/YCCK JPEGs (spec.md §6:
/// only baseline sequential Huffman-coded RGB/YCbCr/grayscale is supported).
unsafe fn reject_unsupported(srcinfo: &jpeg_decompress_struct) -> Result<()> {
    if srcinfo.progressive_mode != 0 {
        return Err(Error::UnsupportedFormat("progressive JPEG"));
    }
    if srcinfo.arith_code != 0 {
        return Err(Error::UnsupportedFormat("arithmetic-coded JPEG"));
    }
    match srcinfo.jpeg_color_space {
        J_COLOR_SPACE::JCS_CMYK | J_COLOR_SPACE::JCS_YCCK => {
            return Err(Error::UnsupportedFormat("CMYK/YCCK JPEG"))
        }
        _ => {}
    }
    Ok(())
}

/// A live decode session kept open across a compose/mutate/encode cycle.
///
/// Mirrors `outline.c`'s `modjpeg_jpegimage_t`: the decompress struct (and
/// the `jvirt_barray_ptr` workspace it owns) must stay alive for as long as
/// we intend to write the coefficients back out, because the virtual array
/// handles are only meaningful to the memory manager that allocated them.
pub(crate) struct HostSession {
    srcinfo: Box<jpeg_decompress_struct>,
    jsrcerr: Box<jpeg_error_mgr>,
    transform: Box<jpeg_transform_info>,
    coef_arrays: *mut jvirt_barray_ptr,
    _data: Vec<u8>,
}

impl HostSession {
    pub(crate) fn open(bytes: &[u8]) -> Result<Self> {
        guarded(|| unsafe {
            let mut jsrcerr: Box<jpeg_error_mgr> = Box::new(mem::zeroed());
            let mut srcinfo: Box<jpeg_decompress_struct> = Box::new(mem::zeroed());
            srcinfo.common.err = std_error_with_panic_exit(&mut jsrcerr);
            jpeg_CreateDecompress(
                srcinfo.as_mut(),
                JPEG_LIB_VERSION as i32,
                mem::size_of::<jpeg_decompress_struct>(),
            );

            let data = bytes.to_vec();
            let data_len = checked_c_ulong(data.len(), "host JPEG byte length")?;
            jpeg_mem_src(srcinfo.as_mut(), data.as_ptr(), data_len);
            jpeg_read_header(srcinfo.as_mut(), true as boolean);
            reject_unsupported(&srcinfo)?;

            let mut transform: Box<jpeg_transform_info> = Box::new(jpeg_transform_info {
                transform: JXFORM_CODE_JXFORM_NONE,
                perfect: 0,
                trim: 0,
                force_grayscale: 0,
                crop: 0,
                slow_hflip: 0,
                crop_width: 0,
                crop_width_set: JCROP_CODE_JCROP_UNSET,
                crop_height: 0,
                crop_height_set: JCROP_CODE_JCROP_UNSET,
                crop_xoffset: 0,
                crop_xoffset_set: JCROP_CODE_JCROP_UNSET,
                crop_yoffset: 0,
                crop_yoffset_set: JCROP_CODE_JCROP_UNSET,
                num_components: 0,
                workspace_coef_arrays: ptr::null_mut(),
                output_width: 0,
                output_height: 0,
                x_crop_offset: 0,
                y_crop_offset: 0,
                iMCU_sample_width: 0,
                iMCU_sample_height: 0,
            });
            if jtransform_request_workspace(srcinfo.as_mut(), transform.as_mut()) == 0 {
                return Err(Error::Decode("jtransform_request_workspace failed".into()));
            }

            let coef_arrays = jpeg_read_coefficients(srcinfo.as_mut());
            if coef_arrays.is_null() {
                return Err(Error::Null);
            }
            trace!(
                "opened host session: {}x{} px, {} component(s), {:?}",
                srcinfo.image_width,
                srcinfo.image_height,
                srcinfo.num_components,
                srcinfo.jpeg_color_space
            );

            Ok(HostSession { srcinfo, jsrcerr, transform, coef_arrays, _data: data })
        })
    }

    /// Materialises the session's coefficient planes into an owned
    /// [`JpegImage`], dequantising on the way in (spec.md §4.1).
    pub(crate) fn to_jpeg_image(&mut self) -> Result<JpegImage> {
        guarded(|| unsafe {
            let srcinfo = self.srcinfo.as_mut();
            let colorspace = jcs_to_colorspace(srcinfo.jpeg_color_space)?;
            let max_h_samp = srcinfo.max_h_samp_factor as u8;
            let max_v_samp = srcinfo.max_v_samp_factor as u8;
            let comp_infos = slice::from_raw_parts(srcinfo.comp_info, srcinfo.num_components as usize);

            let mut components = Vec::with_capacity(comp_infos.len());
            for (ci, comp_info) in comp_infos.iter().enumerate() {
                let samp = SampFactor { h: comp_info.h_samp_factor as u8, v: comp_info.v_samp_factor as u8 };
                let width_in_blocks = comp_info.width_in_blocks as usize;
                let height_in_blocks = comp_info.height_in_blocks as usize;
                let quant_tbl = comp_info.quant_table;
                if quant_tbl.is_null() {
                    return Err(Error::Null);
                }
                let mut quant_table = [0u16; DCTSIZE2];
                quant_table.copy_from_slice(&(*quant_tbl).quantval);

                let mut component = Component::new(samp, width_in_blocks, height_in_blocks, quant_table);
                let array_ptr = *self.coef_arrays.add(ci);
                let buf = ((*srcinfo.mem).access_virt_barray.unwrap())(
                    &mut srcinfo.common,
                    array_ptr,
                    0,
                    height_in_blocks as u32,
                    false as boolean,
                );
                for by in 0..height_in_blocks {
                    let row = *buf.add(by);
                    for bx in 0..width_in_blocks {
                        let block_ptr = row.add(bx);
                        let block = component.block_at_mut(by, bx);
                        for (i, v) in block.iter_mut().enumerate() {
                            *v = (*block_ptr)[i] as i32;
                        }
                    }
                }
                component.dequantize();
                components.push(component);
            }

            Ok(JpegImage::new(
                colorspace,
                srcinfo.image_width as usize,
                srcinfo.image_height as usize,
                max_h_samp,
                max_v_samp,
                components,
            ))
        })
    }

    /// Writes `image`'s (mutated) coefficients back into this session's
    /// workspace, re-quantising on the way out, then finishes the compressor
    /// and returns the encoded bytes.
    pub(crate) fn encode(mut self, image: &JpegImage) -> Result<Vec<u8>> {
        guarded(|| unsafe {
            let srcinfo = self.srcinfo.as_mut();
            let mut scratch = Vec::new();
            for (ci, component) in image.components.iter().enumerate() {
                component.requantize(&mut scratch);
                let array_ptr = *self.coef_arrays.add(ci);
                let buf = ((*srcinfo.mem).access_virt_barray.unwrap())(
                    &mut srcinfo.common,
                    array_ptr,
                    0,
                    component.height_in_blocks as u32,
                    true as boolean,
                );
                for by in 0..component.height_in_blocks {
                    let row = *buf.add(by);
                    for bx in 0..component.width_in_blocks {
                        let block_ptr = row.add(bx);
                        let requantized = &scratch[by * component.width_in_blocks + bx];
                        for (i, v) in requantized.iter().enumerate() {
                            (*block_ptr)[i] = *v as i16;
                        }
                    }
                }
            }

            let mut jdsterr: Box<jpeg_error_mgr> = Box::new(mem::zeroed());
            let mut dstinfo: Box<jpeg_compress_struct> = Box::new(mem::zeroed());
            dstinfo.common.err = std_error_with_panic_exit(&mut jdsterr);
            jpeg_CreateCompress(
                dstinfo.as_mut(),
                JPEG_LIB_VERSION as i32,
                mem::size_of::<jpeg_compress_struct>(),
            );

            jpeg_copy_critical_parameters(srcinfo, dstinfo.as_mut());
            let dst_coef_arrays =
                jtransform_adjust_parameters(srcinfo, dstinfo.as_mut(), self.coef_arrays, self.transform.as_mut());

            let mut out = OwnedBuf::new();
            jpeg_mem_dest(dstinfo.as_mut(), out.as_mut_ptr_slot(), out.as_mut_len_slot());
            dstinfo.optimize_coding = true as boolean;

            jpeg_write_coefficients(dstinfo.as_mut(), dst_coef_arrays);
            jtransform_execute_transform(srcinfo, dstinfo.as_mut(), self.coef_arrays, self.transform.as_mut());
            jpeg_finish_compress(dstinfo.as_mut());

            let bytes = out.to_vec();
            jpeg_destroy_compress(dstinfo.as_mut());
            debug!("re-encoded host session to {} bytes", bytes.len());
            Ok(bytes)
        })
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        unsafe {
            jpeg_finish_decompress(self.srcinfo.as_mut());
            jpeg_destroy_decompress(self.srcinfo.as_mut());
        }
    }
}

impl HostSession {
    /// Like [`HostSession::to_jpeg_image`], but consumes the session and
    /// stashes it inside the returned [`JpegImage`] so [`JpegImage::encode`]
    /// can later write mutated coefficients back into the same
    /// `jvirt_barray_ptr` workspace libjpeg allocated for this decode.
    pub(crate) fn into_jpeg_image(mut self) -> Result<JpegImage> {
        let mut image = self.to_jpeg_image()?;
        image.session = Some(self);
        Ok(image)
    }
}

/// Decodes a host or dropon/mask JPEG's coefficients into an owned
/// [`JpegImage`], dropping the codec session immediately afterwards. Used
/// for the dropon adapter's round trip, which never needs to write the
/// coefficients back out.
pub fn decode_coefficients(bytes: &[u8]) -> Result<JpegImage> {
    trace!("decoding {} bytes to coefficients", bytes.len());
    let mut session = HostSession::open(bytes)?;
    session.to_jpeg_image()
}

/// Decodes a host JPEG's coefficients, keeping the codec session alive in
/// the returned [`JpegImage`] so it can be mutated in place and later
/// re-encoded (spec.md §4.1's `open_from_bytes`).
pub fn open_host(bytes: &[u8]) -> Result<JpegImage> {
    trace!("opening {} bytes as a host image", bytes.len());
    HostSession::open(bytes)?.into_jpeg_image()
}

/// Decodes a JPEG to interleaved RGB pixels, forcing colour conversion to
/// RGB regardless of the source colour space (spec.md §4.3 step 1).
pub fn decode_to_pixels(bytes: &[u8]) -> Result<(Vec<u8>, usize, usize)> {
    guarded(|| unsafe {
        let mut jerr: jpeg_error_mgr = mem::zeroed();
        let mut cinfo: jpeg_decompress_struct = mem::zeroed();
        cinfo.common.err = std_error_with_panic_exit(&mut jerr);
        jpeg_CreateDecompress(&mut cinfo, JPEG_LIB_VERSION as i32, mem::size_of::<jpeg_decompress_struct>());

        let bytes_len = checked_c_ulong(bytes.len(), "dropon JPEG byte length")?;
        jpeg_mem_src(&mut cinfo, bytes.as_ptr(), bytes_len);
        jpeg_read_header(&mut cinfo, true as boolean);
        reject_unsupported(&cinfo)?;

        cinfo.out_color_space = J_COLOR_SPACE::JCS_RGB;
        jpeg_start_decompress(&mut cinfo);

        let width = cinfo.output_width as usize;
        let height = cinfo.output_height as usize;
        let components = cinfo.output_components as usize;
        let row_stride = width * components;
        let mut pixels = vec![0u8; row_stride * height];

        while cinfo.output_scanline < cinfo.output_height {
            let row = cinfo.output_scanline as usize;
            let mut row_ptr: [*mut u8; 1] = [pixels.as_mut_ptr().add(row * row_stride)];
            jpeg_read_scanlines(&mut cinfo, row_ptr.as_mut_ptr(), 1);
        }

        jpeg_finish_decompress(&mut cinfo);
        jpeg_destroy_decompress(&mut cinfo);
        Ok((pixels, width, height))
    })
}

/// Encodes interleaved RGB pixels (always 3 bytes/pixel, source-side RGB) as
/// a JPEG in `target_colorspace` with `sampling`'s per-component subsampling
/// factors (spec.md §4.3 steps 1-2: both the dropon's image stream and its
/// alpha stream are RGB source pixels that the encoder colour-converts to
/// the host's colour space during compression — for the alpha stream the
/// caller passes an RGB triplet with every channel set to the alpha value,
/// so a YCbCr or grayscale target's luma plane ends up carrying the alpha
/// exactly).
pub fn encode_pixels(
    rgb: &[u8],
    width: usize,
    height: usize,
    target_colorspace: Colorspace,
    sampling: &[SampFactor],
    quality: i32,
) -> Result<Vec<u8>> {
    guarded(|| unsafe {
        let mut jerr: jpeg_error_mgr = mem::zeroed();
        let mut cinfo: jpeg_compress_struct = mem::zeroed();
        cinfo.common.err = std_error_with_panic_exit(&mut jerr);
        jpeg_CreateCompress(&mut cinfo, JPEG_LIB_VERSION as i32, mem::size_of::<jpeg_compress_struct>());

        let mut out = OwnedBuf::new();
        jpeg_mem_dest(&mut cinfo, out.as_mut_ptr_slot(), out.as_mut_len_slot());

        cinfo.image_width = checked_u32(width, "dropon pixel width")?;
        cinfo.image_height = checked_u32(height, "dropon pixel height")?;
        cinfo.input_components = 3;
        cinfo.in_color_space = J_COLOR_SPACE::JCS_RGB;
        jpeg_set_defaults(&mut cinfo);
        jpeg_set_colorspace(&mut cinfo, colorspace_to_jcs(target_colorspace));
        jpeg_set_quality(&mut cinfo, quality, true as boolean);

        for (ci, samp) in sampling.iter().enumerate() {
            let comp = &mut *cinfo.comp_info.add(ci);
            comp.h_samp_factor = samp.h as i32;
            comp.v_samp_factor = samp.v as i32;
        }
        cinfo.optimize_coding = true as boolean;

        jpeg_start_compress(&mut cinfo, true as boolean);

        let row_stride = width * 3;
        let mut row_pointer: [*const u8; 1] = [ptr::null()];
        while cinfo.next_scanline < cinfo.image_height {
            let row = cinfo.next_scanline as usize;
            row_pointer[0] = rgb.as_ptr().add(row * row_stride);
            jpeg_write_scanlines(&mut cinfo, row_pointer.as_ptr() as *mut *const u8, 1);
        }

        jpeg_finish_compress(&mut cinfo);
        let bytes = out.to_vec();
        jpeg_destroy_compress(&mut cinfo);
        Ok(bytes)
    })
}
