use std::fmt;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while decoding, adapting, compositing or
/// re-encoding a JPEG.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The codec rejected the input while reading it.
    #[error("failed to decode JPEG: {0}")]
    Decode(String),
    /// The codec rejected the coefficients/parameters while writing them out.
    #[error("failed to encode JPEG: {0}")]
    Encode(String),
    /// The input is not a baseline sequential Huffman-coded JPEG (progressive,
    /// arithmetic-coded or CMYK streams are rejected, see spec §6).
    #[error("unsupported JPEG format: {0}")]
    UnsupportedFormat(&'static str),
    /// The adapter could not reconcile the dropon's colour space with the
    /// host's.
    #[error("unsupported colour space combination: {0}")]
    UnsupportedColorspace(String),
    /// Placement would put a dropon block off the host's block grid.
    #[error("dropon placement ({width_blocks}x{height_blocks} blocks at offset ({offset_x},{offset_y})) does not fit the host's {host_width_blocks}x{host_height_blocks} block grid")]
    InvalidPlacement {
        width_blocks: usize,
        height_blocks: usize,
        offset_x: i32,
        offset_y: i32,
        host_width_blocks: usize,
        host_height_blocks: usize,
    },
    /// The codec reported an allocation failure.
    #[error("out of memory")]
    OutOfMemory,
    /// A codec handle that should never be null was null.
    #[error("codec returned a null handle")]
    Null,
    /// `libjpeg`'s error_exit callback panicked across the FFI boundary; this
    /// variant carries whatever message we managed to recover before
    /// unwinding.
    #[error("codec panicked: {0}")]
    CodecPanic(String),
    /// A size would not fit in the integer type the codec's C API expects.
    #[error("integer overflow computing {0}")]
    IntegerOverflow(&'static str),
}

impl Error {
    pub(crate) fn invalid_placement(
        width_blocks: usize,
        height_blocks: usize,
        offset_x: i32,
        offset_y: i32,
        host_width_blocks: usize,
        host_height_blocks: usize,
    ) -> Self {
        Error::InvalidPlacement {
            width_blocks,
            height_blocks,
            offset_x,
            offset_y,
            host_width_blocks,
            host_height_blocks,
        }
    }
}

/// Colour space of a decoded or to-be-encoded JPEG.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Colorspace {
    Rgb,
    YCbCr,
    Grayscale,
}

impl Colorspace {
    pub(crate) fn num_components(self) -> usize {
        match self {
            Colorspace::Rgb | Colorspace::YCbCr => 3,
            Colorspace::Grayscale => 1,
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Colorspace::Rgb => "RGB",
            Colorspace::YCbCr => "YCbCr",
            Colorspace::Grayscale => "grayscale",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_components_matches_colorspace() {
        assert_eq!(Colorspace::Rgb.num_components(), 3);
        assert_eq!(Colorspace::YCbCr.num_components(), 3);
        assert_eq!(Colorspace::Grayscale.num_components(), 1);
    }

    #[test]
    fn invalid_placement_message_mentions_grids() {
        let err = Error::invalid_placement(4, 4, 0, 0, 3, 3);
        let msg = err.to_string();
        assert!(msg.contains("4x4"));
        assert!(msg.contains("3x3"));
    }
}
