use std::ops::Deref;
use std::{ptr, slice};

/// Owned buffer holding JPEG bytes allocated by the codec's compressor.
///
/// `mozjpeg-sys`'s `jpeg_mem_dest` grows its own output buffer inside
/// libjpeg (the same chunked growth `outline.c` hand-rolls as
/// `modjpeg_dest_mgr`/`MODJPEG_DESTBUFFER_CHUNKSIZE`); this type just takes
/// ownership of whatever pointer/length `jpeg_mem_dest` leaves behind and
/// frees it with `libc::free` on drop, the same "weird little dance" around
/// `jpeg_mem_dest` that mozjpeg's own consumers do.
#[derive(Debug)]
pub(crate) struct OwnedBuf {
    ptr: *mut u8,
    len: usize,
}

impl Deref for OwnedBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            debug_assert!(!self.ptr.is_null());
            unsafe { slice::from_raw_parts(self.ptr, self.len) }
        }
    }
}

impl OwnedBuf {
    /// An empty buffer; `ptr`/`len` are filled in by `jpeg_mem_dest` before
    /// compression starts.
    pub(crate) fn new() -> OwnedBuf {
        OwnedBuf { ptr: ptr::null_mut(), len: 0 }
    }

    /// Pointer libjpeg's `jpeg_mem_dest` writes its buffer pointer through.
    pub(crate) fn as_mut_ptr_slot(&mut self) -> *mut *mut u8 {
        &mut self.ptr
    }

    /// Pointer libjpeg's `jpeg_mem_dest` writes the buffer length through.
    ///
    /// `jpeg_mem_dest` takes an `unsigned long *`; on every platform this
    /// crate targets that is the same width as `usize`, so we hand it a
    /// pointer to `self.len` directly rather than staging through a
    /// separately-sized temporary.
    pub(crate) fn as_mut_len_slot(&mut self) -> *mut libc::c_ulong {
        (&mut self.len as *mut usize).cast()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies the buffer out into an owned `Vec<u8>`.
    pub(crate) fn to_vec(&self) -> Vec<u8> {
        self.deref().to_vec()
    }
}

impl Drop for OwnedBuf {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { libc::free(self.ptr.cast()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_derefs_to_empty_slice() {
        let buf = OwnedBuf::new();
        assert!(buf.is_empty());
        assert_eq!(&buf[..], &[] as &[u8]);
    }
}
