use crate::stream::frame::{EOI, SOI};

/// Creates a byte sequence that looks like a JPEG image as far as frame markers are concerned:
///  [SOI], a deterministic payload of the given length, [EOI]. The payload contains no markers.
///  Different `seed` values produce different payloads.
pub fn test_jpeg(seed: u8, payload_len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(SOI.len() + payload_len + EOI.len());
    result.extend_from_slice(&SOI);
    result.extend((0..payload_len).map(|i| {
        // bytes stay below 0xd8 so that no marker can form, not even with SOI's trailing 0xff
        ((i as u32 * 31 + seed as u32) % 0xd8) as u8
    }));
    result.extend_from_slice(&EOI);
    result
}

/// splits a byte sequence into datagram payloads of at most `chunk_size` bytes
pub fn chunked(bytes: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(chunk_size)
        .map(|c| c.to_vec())
        .collect()
}
