//! Frame synchronization for the inverter's telemetry stream.
//!
//! The inverter streams 31-byte telemetry reports back to back, each starting
//! with the marker byte `0x57`. There is no checksum and no length field, so
//! recovering report boundaries from the raw byte stream is a scan for the
//! marker: anything ahead of it is line noise and gets dropped, and a report
//! is only carved out once the bytes following it have started to arrive
//! (otherwise a report still in flight could be truncated).
//!
//! A marker byte occurring *inside* a report payload cannot be told apart
//! from a real report start. Such misaligned candidates decode to nonsense
//! values and are weeded out by [`crate::filter`]; this module makes no
//! attempt to detect them.

/// Marker byte opening every telemetry report.
pub const FRAME_MARKER: u8 = 0x57;

/// Length of one telemetry report on the wire, marker included.
pub const FRAME_LEN: usize = 31;

/// The inverter keeps transmitting, so by the time a report is complete the
/// first bytes of the next one have already arrived. Requiring this much
/// trailing data before carving a frame guarantees the frame itself is whole.
const LOOKAHEAD: usize = 2;

/// One 31-byte telemetry report as captured from the wire.
///
/// The only guarantees are the length and, when produced by [`FrameBuffer`],
/// the leading marker byte. The payload may still be garbage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame([u8; FRAME_LEN]);

impl RawFrame {
    /// The raw report bytes, marker included.
    pub fn bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl From<[u8; FRAME_LEN]> for RawFrame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        RawFrame(bytes)
    }
}

/// Accumulates raw serial bytes and carves [`RawFrame`]s out of them.
///
/// No upper bound is imposed on the buffer; backpressure, if any, is the
/// transport's concern, and the inverter produces at most a handful of
/// reports per second.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    discarded: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes to the tail of the buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to carve the next telemetry report out of the buffered bytes.
    ///
    /// Returns `None` when no marker has been seen yet, or when a marker is
    /// present but the report behind it has not fully arrived; in both
    /// cases every buffered byte is kept and the caller should read more.
    /// On success the report and everything ahead of it are consumed, so
    /// repeated calls drain all reports buffered in one chunk.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        let start = self.buf.iter().position(|&b| b == FRAME_MARKER)?;
        if self.buf.len() - start < FRAME_LEN + LOOKAHEAD {
            // Report still arriving, keep waiting.
            return None;
        }

        if start > 0 {
            log::trace!("dropping {start} noise bytes ahead of frame marker");
            self.discarded += start as u64;
        }

        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.buf[start..start + FRAME_LEN]);
        self.buf.drain(..start + FRAME_LEN);
        Some(RawFrame(frame))
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total noise bytes silently dropped ahead of frame markers so far.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A well formed report: marker followed by 30 bytes of `fill`.
    fn report(fill: u8) -> [u8; FRAME_LEN] {
        assert_ne!(fill, FRAME_MARKER);
        let mut frame = [fill; FRAME_LEN];
        frame[0] = FRAME_MARKER;
        frame
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut buffer = FrameBuffer::new();
        assert_eq!(buffer.next_frame(), None);
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn partial_frame_is_kept_until_complete() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&report(0xAA)[..20]);
        assert_eq!(buffer.next_frame(), None);
        // Nothing may be dropped while a report could still be arriving.
        assert_eq!(buffer.buffered(), 20);
    }

    #[test]
    fn frame_is_carved_only_after_lookahead_arrives() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&report(0xAA));
        buffer.extend(&[0x00]);
        // 32 bytes buffered: complete report, not enough lookahead.
        assert_eq!(buffer.next_frame(), None);

        buffer.extend(&[0x00]);
        let frame = buffer.next_frame().expect("frame should now be complete");
        assert_eq!(frame.bytes(), &report(0xAA));
        // The lookahead bytes stay buffered for the next report.
        assert_eq!(buffer.buffered(), 2);
    }

    #[test]
    fn noise_before_marker_is_dropped_silently() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&[0x01, 0x02, 0x03]);
        buffer.extend(&report(0xBB));
        buffer.extend(&[0x00, 0x00]);

        let frame = buffer.next_frame().expect("frame behind noise");
        assert_eq!(frame.bytes(), &report(0xBB));
        assert_eq!(buffer.discarded_bytes(), 3);
    }

    #[test]
    fn multiple_frames_in_one_chunk_are_all_recovered() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&report(0x10));
        stream.extend_from_slice(&report(0x20));
        stream.extend_from_slice(&report(0x30));
        stream.extend_from_slice(&[0x00, 0x00]);

        let mut buffer = FrameBuffer::new();
        buffer.extend(&stream);

        assert_eq!(buffer.next_frame().unwrap().bytes(), &report(0x10));
        assert_eq!(buffer.next_frame().unwrap().bytes(), &report(0x20));
        assert_eq!(buffer.next_frame().unwrap().bytes(), &report(0x30));
        assert_eq!(buffer.next_frame(), None);
    }

    #[test]
    fn frames_interleaved_with_noise_come_out_in_order() {
        // N well formed reports with marker-free noise between them must
        // yield exactly N frames, byte-identical and in order.
        let reports = [report(0x11), report(0x22), report(0x33), report(0x44)];
        let mut stream = Vec::new();
        for (i, r) in reports.iter().enumerate() {
            stream.extend_from_slice(&vec![0xFF; i * 3]);
            stream.extend_from_slice(r);
        }
        stream.extend_from_slice(&[0xFF, 0xFF]);

        let mut buffer = FrameBuffer::new();
        let mut recovered = Vec::new();
        // Feed in small chunks to exercise the partial-frame path too.
        for chunk in stream.chunks(7) {
            buffer.extend(chunk);
            while let Some(frame) = buffer.next_frame() {
                recovered.push(frame);
            }
        }

        assert_eq!(recovered.len(), reports.len());
        for (frame, expected) in recovered.iter().zip(&reports) {
            assert_eq!(frame.bytes(), expected);
        }
    }

    #[test]
    fn spurious_marker_in_noise_resynchronizes_on_later_frames() {
        // A 0x57 inside noise produces one garbage candidate; the stream
        // must still recover the real frames that follow without help.
        let mut stream = Vec::new();
        stream.push(FRAME_MARKER);
        stream.extend_from_slice(&[0xEE; FRAME_LEN - 1]); // swallowed as payload
        stream.extend_from_slice(&report(0x44));
        stream.extend_from_slice(&report(0x66));
        stream.extend_from_slice(&[0x00, 0x00]);

        let mut buffer = FrameBuffer::new();
        buffer.extend(&stream);

        let candidate = buffer.next_frame().expect("misaligned candidate");
        assert_eq!(candidate.bytes()[0], FRAME_MARKER);
        assert_eq!(&candidate.bytes()[1..], &[0xEE; FRAME_LEN - 1]);

        assert_eq!(buffer.next_frame().unwrap().bytes(), &report(0x44));
        assert_eq!(buffer.next_frame().unwrap().bytes(), &report(0x66));
        assert_eq!(buffer.next_frame(), None);
    }
}
