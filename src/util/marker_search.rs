
/// Byte pattern search on raw buffers. Markers are short (2 or 3 bytes), so a sliding window
///  scan is all we need here.
pub trait MarkerSearch {
    /// offset of the first occurrence of `marker`, if any
    fn find_first(&self, marker: &[u8]) -> Option<usize>;

    /// offset of the last occurrence of `marker`, if any
    fn find_last(&self, marker: &[u8]) -> Option<usize>;
}

impl MarkerSearch for [u8] {
    fn find_first(&self, marker: &[u8]) -> Option<usize> {
        if marker.is_empty() || marker.len() > self.len() {
            return None;
        }
        self.windows(marker.len())
            .position(|w| w == marker)
    }

    fn find_last(&self, marker: &[u8]) -> Option<usize> {
        if marker.is_empty() || marker.len() > self.len() {
            return None;
        }
        self.windows(marker.len())
            .rposition(|w| w == marker)
    }
}
