use std::fmt::{Debug, Formatter};
use bytes::Bytes;

/// JPEG Start-Of-Image marker, including the first byte of the following segment marker
pub const SOI: [u8; 3] = [0xff, 0xd8, 0xff];
/// JPEG End-Of-Image marker
pub const EOI: [u8; 2] = [0xff, 0xd9];


/// A complete byte range extracted from the stream, starting with [SOI] and (normally) ending
///  with [EOI]. Frames are immutable once emitted.
///
/// NB: A frame is a byte range, not a validated image - decoding is the consumer's concern.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub(crate) fn new(bytes: Bytes) -> Frame {
        Frame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `false` for frames that were cut off by the start of the next frame before their own
    ///  EOI marker arrived (e.g. because the datagram carrying it was lost)
    pub fn is_terminated(&self) -> bool {
        self.0.ends_with(&EOI)
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.len() <= 16 {
            write!(f, "Frame{{{:02x?}}}", self.0.as_ref())
        }
        else {
            write!(f, "Frame{{len:{}, terminated:{}}}", self.0.len(), self.is_terminated())
        }
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
