use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, debug_span, trace, warn, Span};

use crate::stream::frame::{Frame, EOI, SOI};
use crate::util::marker_search::MarkerSearch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub datagrams: u64,
    pub bytes: u64,
    pub frames_emitted: u64,
    /// frames that were emitted without their own EOI because the next frame started first
    pub unterminated_frames: u64,
    /// EOI markers without a preceding SOI
    pub orphan_eois: u64,
    /// number of times the accumulator exceeded its size limit and was discarded
    pub overflow_resets: u64,
    pub discarded_bytes: u64,
}

/// The reassembler turns a sequence of datagram payloads into a sequence of frames, using
///  nothing but the embedded SOI / EOI markers as frame boundaries - there is no header,
///  length or sequence number on the wire.
///
/// It owns a single accumulator holding the tentative current frame. After every call to
///  [FrameReassembler::feed], the accumulator is empty, or it starts with [SOI] (a frame is in
///  progress), or it contains no SOI at all (bytes received before synchronization, or
///  trailing an EOI). It never exceeds `max_frame_size`.
///
/// Frames are returned in the order they are discovered.
pub struct FrameReassembler {
    accumulator: BytesMut,
    max_frame_size: usize,
    stats: ReassemblyStats,
    span: Span,
}

impl FrameReassembler {
    pub fn new(max_frame_size: usize) -> FrameReassembler {
        FrameReassembler {
            accumulator: BytesMut::new(),
            max_frame_size,
            stats: Default::default(),
            span: debug_span!("frame_reassembler", max_frame_size),
        }
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// the bytes currently buffered for a frame that is not complete yet
    pub fn pending(&self) -> &[u8] {
        self.accumulator.as_ref()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.accumulator.starts_with(&SOI)
    }

    /// Consumes a single datagram's payload, returning the frames it completed (usually zero or
    ///  one, at most two).
    pub fn feed(&mut self, datagram: &[u8]) -> Vec<Frame> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.stats.datagrams += 1;
        self.stats.bytes += datagram.len() as u64;

        let soi = datagram.find_first(&SOI);
        let mut eoi = datagram.find_last(&EOI);
        trace!(len = datagram.len(), ?soi, ?eoi, "datagram");

        let mut frames = Vec::new();

        // offset of the EOI inside the accumulator, if it still needs handling
        let eoi_offset = match soi {
            Some(soi) => {
                if self.is_frame_in_progress() {
                    if let Some(e) = eoi.filter(|&e| e < soi) {
                        // the EOI terminates the frame in progress
                        self.accumulator.extend_from_slice(&datagram[..e + EOI.len()]);
                        eoi = None;
                    }
                    else {
                        self.accumulator.extend_from_slice(&datagram[..soi]);
                    }
                    let frame = self.accumulator.split().freeze();
                    frames.push(self.emit(frame));
                }
                else if !self.accumulator.is_empty() {
                    debug!(len = self.accumulator.len(), "discarding unsynchronized bytes before SOI");
                    self.discard_all();
                }

                self.accumulator.clear();
                self.accumulator.extend_from_slice(&datagram[soi..]);

                match eoi {
                    Some(e) if e < soi => {
                        // NB: the discarded prefix was never part of a frame
                        warn!("EOI without matching SOI - discarding");
                        self.stats.orphan_eois += 1;
                        self.stats.discarded_bytes += soi as u64;
                        None
                    }
                    Some(e) => Some(e - soi),
                    None => None,
                }
            }
            None => {
                let prev_len = self.accumulator.len();
                self.accumulator.extend_from_slice(datagram);
                eoi.map(|e| prev_len + e)
            }
        };

        if let Some(eoi_offset) = eoi_offset {
            let consumed = self.accumulator.split_to(eoi_offset + EOI.len());
            if consumed.starts_with(&SOI) {
                frames.push(self.emit(consumed.freeze()));
            }
            else {
                warn!(len = consumed.len(), "EOI without matching SOI - discarding");
                self.stats.orphan_eois += 1;
                self.stats.discarded_bytes += consumed.len() as u64;
            }
        }

        self.resync();

        if self.accumulator.len() > self.max_frame_size {
            warn!(len = self.accumulator.len(), max_frame_size = self.max_frame_size, "no EOI within maximum frame size - lost synchronization, discarding buffered data");
            self.stats.overflow_resets += 1;
            self.discard_all();
        }

        frames
    }

    fn emit(&mut self, bytes: Bytes) -> Frame {
        let frame = Frame::new(bytes);
        self.stats.frames_emitted += 1;
        if !frame.is_terminated() {
            warn!(len = frame.len(), "frame was cut off by the next SOI before its EOI arrived");
            self.stats.unterminated_frames += 1;
        }
        debug!(len = frame.len(), "frame complete");
        frame
    }

    /// Drops unsynchronized bytes in front of an SOI that is not at the start of the accumulator.
    ///  This happens when the bytes after a consumed EOI contain the start of the next frame, or
    ///  when an SOI is split across two datagrams while no frame is in progress.
    fn resync(&mut self) {
        if self.is_frame_in_progress() {
            return;
        }
        if let Some(soi) = self.accumulator.find_first(&SOI) {
            debug!(len = soi, "discarding bytes in front of SOI");
            self.stats.discarded_bytes += soi as u64;
            self.accumulator.advance(soi);
        }
    }

    fn discard_all(&mut self) {
        self.stats.discarded_bytes += self.accumulator.len() as u64;
        self.accumulator.clear();
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    fn frames_as_vecs(frames: &[Frame]) -> Vec<Vec<u8>> {
        frames.iter()
            .map(|f| f.as_bytes().to_vec())
            .collect()
    }

    /// parses hex bytes, e.g. `"ff d8 ff"`
    fn hex(s: &str) -> Vec<u8> {
        s.split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect()
    }

    /// parses a `|` separated list of hex byte sequences, e.g. `"ff d8 | ff d9"`
    fn hex_list(s: &str) -> Vec<Vec<u8>> {
        if s.trim().is_empty() {
            return vec![];
        }
        s.split('|')
            .map(hex)
            .collect()
    }

    #[rstest]
    #[case::single_datagram("ff d8 ff 10 20 ff d9", "ff d8 ff 10 20 ff d9", "")]
    #[case::split_frame("00 01 ff d8 ff 10 | 20 30 ff d9", "ff d8 ff 10 20 30 ff d9", "")]
    #[case::split_over_three("ff d8 ff 01 | 02 | 03 ff d9", "ff d8 ff 01 02 03 ff d9", "")]
    #[case::garbage_then_frame("00 01 02 | ff d8 ff 10 20 ff d9", "ff d8 ff 10 20 ff d9", "")]
    #[case::eoi_then_next_soi("ff d8 ff 01 | 02 ff d9 ff d8 ff 03", "ff d8 ff 01 02 ff d9", "ff d8 ff 03")]
    #[case::new_soi_without_eoi("ff d8 ff 01 | 02 ff d8 ff 03", "ff d8 ff 01 02", "ff d8 ff 03")]
    #[case::soi_at_start_of_datagram("ff d8 ff 01 | ff d8 ff 02", "ff d8 ff 01", "ff d8 ff 02")]
    #[case::cut_off_frame_then_complete_frame(
        "ff d8 ff 01 | 02 ff d8 ff 03 ff d9",
        "ff d8 ff 01 02 | ff d8 ff 03 ff d9",
        "")]
    #[case::end_of_frame_plus_complete_frame(
        "ff d8 ff 01 | 02 ff d9 ff d8 ff 03 ff d9 ff d8 ff 04",
        "ff d8 ff 01 02 ff d9 | ff d8 ff 03 ff d9",
        "ff d8 ff 04")]
    #[case::trailing_bytes_after_eoi("ff d8 ff 01 | 02 ff d9 77 78", "ff d8 ff 01 02 ff d9", "77 78")]
    #[case::next_frame_after_gap_behind_eoi(
        "ff d8 ff 01 ff d9 03 ff d8 ff 02 | 04 ff d9",
        "ff d8 ff 01 ff d9 | ff d8 ff 02 04 ff d9",
        "")]
    #[case::next_frame_after_gap_pending("ff d8 ff 01 ff d9 03 ff d8 ff 02", "ff d8 ff 01 ff d9", "ff d8 ff 02")]
    #[case::soi_split_across_datagrams("00 ff d8 | ff 01 | 02 ff d9", "ff d8 ff 01 02 ff d9", "")]
    #[case::last_eoi_wins("ff d8 ff 01 ff d9 02 ff d9", "ff d8 ff 01 ff d9 02 ff d9", "")]
    #[case::orphan_eoi("00 01 | 02 ff d9 03", "", "03")]
    #[case::orphan_eoi_before_soi("00 01 | 02 ff d9 ff d8 ff 03", "", "ff d8 ff 03")]
    #[case::empty_datagrams(" | ff d8 ff | | ff d9 | ", "ff d8 ff ff d9", "")]
    fn test_feed(#[case] datagrams: &str, #[case] expected_frames: &str, #[case] expected_pending: &str) {
        let mut reassembler = FrameReassembler::new(1024);

        let mut actual = Vec::new();
        for datagram in hex_list(datagrams) {
            actual.extend(frames_as_vecs(&reassembler.feed(&datagram)));
        }

        assert_eq!(actual, hex_list(expected_frames));
        assert_eq!(reassembler.pending(), hex(expected_pending).as_slice());
    }

    #[test]
    fn test_garbage_is_accumulated_but_not_emitted() {
        let mut reassembler = FrameReassembler::new(1024);

        assert!(reassembler.feed(b"\x00\x01\x02").is_empty());
        assert_eq!(reassembler.pending(), b"\x00\x01\x02");
        assert!(!reassembler.is_frame_in_progress());

        let frames = reassembler.feed(b"\xff\xd8\xff\x10\x20\xff\xd9");
        assert_eq!(frames_as_vecs(&frames), vec![b"\xff\xd8\xff\x10\x20\xff\xd9".to_vec()]);
        assert!(reassembler.pending().is_empty());

        let stats = reassembler.stats();
        assert_eq!(stats.datagrams, 2);
        assert_eq!(stats.bytes, 10);
        assert_eq!(stats.frames_emitted, 1);
        assert_eq!(stats.discarded_bytes, 3);
    }

    #[test]
    fn test_unterminated_frame_is_flagged() {
        let mut reassembler = FrameReassembler::new(1024);

        assert!(reassembler.feed(b"\xff\xd8\xff\x01").is_empty());
        let frames = reassembler.feed(b"\x02\xff\xd8\xff\x03");

        assert_eq!(frames.len(), 1);
        assert!(!frames[0].is_terminated());
        assert!(reassembler.is_frame_in_progress());
        assert_eq!(reassembler.stats().unterminated_frames, 1);
        assert_eq!(reassembler.stats().frames_emitted, 1);
    }

    #[test]
    fn test_orphan_eoi_is_counted() {
        let mut reassembler = FrameReassembler::new(1024);

        assert!(reassembler.feed(b"\x00\xff\xd9").is_empty());
        assert!(reassembler.feed(b"\x01\xff\xd9\xff\xd8\xff").is_empty());

        let stats = reassembler.stats();
        assert_eq!(stats.orphan_eois, 2);
        assert_eq!(stats.frames_emitted, 0);
        assert_eq!(reassembler.pending(), b"\xff\xd8\xff");
    }

    #[test]
    fn test_garbage_is_bounded() {
        let mut reassembler = FrameReassembler::new(16);
        let garbage = [0x42u8; 7];

        for _ in 0..100 {
            assert!(reassembler.feed(&garbage).is_empty());
            assert!(reassembler.pending().len() <= 16);
        }
        assert!(reassembler.stats().overflow_resets > 0);
        assert_eq!(reassembler.stats().frames_emitted, 0);
    }

    #[test]
    fn test_oversized_frame_is_discarded_and_stream_resyncs() {
        let mut reassembler = FrameReassembler::new(16);

        assert!(reassembler.feed(b"\xff\xd8\xff\x00\x00\x00\x00\x00").is_empty());
        assert!(reassembler.feed(b"\x00\x00\x00\x00\x00\x00\x00\x00\x00").is_empty());
        assert!(reassembler.pending().is_empty());
        assert_eq!(reassembler.stats().overflow_resets, 1);

        // the rest of the lost frame ends in an EOI without SOI
        assert!(reassembler.feed(b"\x00\xff\xd9").is_empty());
        assert_eq!(reassembler.stats().orphan_eois, 1);

        let frames = reassembler.feed(b"\xff\xd8\xff\x05\xff\xd9");
        assert_eq!(frames_as_vecs(&frames), vec![b"\xff\xd8\xff\x05\xff\xd9".to_vec()]);
    }

    #[test]
    fn test_frames_are_independent_of_later_feeds() {
        let mut reassembler = FrameReassembler::new(1024);

        let first = reassembler.feed(b"\xff\xd8\xff\x01\xff\xd9\xff\xd8\xff");
        assert_eq!(frames_as_vecs(&first), vec![b"\xff\xd8\xff\x01\xff\xd9".to_vec()]);

        let second = reassembler.feed(b"\x02\xff\xd9");
        assert_eq!(frames_as_vecs(&second), vec![b"\xff\xd8\xff\x02\xff\xd9".to_vec()]);
        assert_eq!(first[0].as_bytes(), b"\xff\xd8\xff\x01\xff\xd9");
    }

    /// feeds a long pseudo-random stream in arbitrary chunks and checks the accumulator
    ///  invariant after every call
    #[test]
    fn test_accumulator_invariant() {
        let mut reassembler = FrameReassembler::new(64);

        let mut state: u32 = 12345;
        let mut next = move || {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        };

        for _ in 0..2000 {
            let len = (next() % 24) as usize;
            let datagram: Vec<u8> = (0..len)
                .map(|_| match next() % 8 {
                    0 | 1 => 0xff,
                    2 => 0xd8,
                    3 => 0xd9,
                    _ => next(),
                })
                .collect();

            let datagram_has_soi = datagram.find_first(&SOI).is_some();
            for (i, frame) in reassembler.feed(&datagram).iter().enumerate() {
                assert!(frame.as_bytes().starts_with(&SOI));
                // only the frame in progress can be cut off, and only by an SOI in this datagram
                assert!(frame.is_terminated() || (i == 0 && datagram_has_soi));
            }

            let pending = reassembler.pending();
            assert!(pending.len() <= 64);
            assert!(pending.is_empty() || pending.starts_with(&SOI) || pending.find_first(&SOI).is_none(), "{:02x?}", pending);
        }
    }
}
