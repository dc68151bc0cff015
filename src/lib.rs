//! DCT-domain JPEG logo compositing.
//!
//! This crate blends a logo (a "dropon") onto a baseline JPEG photograph
//! without ever decoding the host to pixels. The host's quantised DCT
//! coefficients are read directly from the file, the dropon is re-encoded
//! into the same colour space/subsampling/block grid as the host, and the
//! alpha blend is carried out as a linear operator applied to the DCT
//! coefficients themselves. Regions the dropon doesn't touch pass through
//! untouched, so the output JPEG's unaltered pixels are bit-identical to the
//! input's.
//!
//! # Basic usage
//!
//! ```no_run
//! use dropon::{compose, AlignH, AlignV, Alignment, Blend, Dropon, JpegImage};
//!
//! # fn run() -> dropon::Result<()> {
//! let host_bytes = std::fs::read("host.jpg")?;
//! let mut host = JpegImage::decode(&host_bytes)?;
//!
//! let logo_bytes = std::fs::read("logo.jpg")?;
//! let mut dropon = Dropon::from_jpeg_bytes(&logo_bytes, None, Blend::Full)?;
//!
//! compose(&mut host, &mut dropon, Alignment::new(AlignH::Center, AlignV::Center))?;
//!
//! std::fs::write("out.jpg", host.encode()?)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module map
//!
//! - [`error`] — the crate's [`Error`]/[`Result`] and [`Colorspace`].
//! - [`geometry`] — block-grid arithmetic and dropon [`Alignment`].
//! - [`coef`] — [`JpegImage`]/[`Component`], the coefficient store (C1).
//! - [`dropon`] — [`Dropon`]/[`Blend`], the dropon source and adapter (C2, C3).
//! - [`mask`] — [`MaskOperator`], the alpha-to-block-operator builder (C4).
//! - [`convolve`] — the 16-case DCT block convolver (C5).
//! - [`compose`] — the compositor entry point, [`compose()`] (C6).
//! - `codec` — the `mozjpeg-sys` facade (C7); internal, not part of the public API.
#![warn(missing_docs)]

mod buf;
mod codec;
mod coef;
mod compose;
mod convolve;
mod dropon;
mod error;
mod geometry;
mod mask;

pub use self::coef::{Component, JpegImage};
pub use self::compose::compose;
pub use self::dropon::{AdaptedDropon, Blend, Dropon, RawPixels};
pub use self::error::{Colorspace, Error, Result};
pub use self::geometry::{AlignH, AlignV, Alignment};
pub use self::mask::MaskOperator;
