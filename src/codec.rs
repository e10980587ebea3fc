use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::frame::{Error, Frame};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Streams [`Frame`]s in and out of any byte transport: client sockets and the append-only file
/// alike.
///
/// Request arrays are decoded element by element: every element that is complete is taken out of
/// the buffer and kept here until the rest of the array arrives, so data that trickles in is never
/// parsed twice.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    partial: Option<PartialArray>,
}

#[derive(Debug, Clone)]
struct PartialArray {
    length: usize,
    frames: Vec<Frame>,
    /// Bytes of the array already taken out of the buffer.
    consumed: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec {
            max_frame_size,
            partial: None,
        }
    }

    /// Bytes of a frame that started decoding but isn't complete yet, whether still buffered or
    /// already held by the codec.
    pub fn pending(&self, src: &BytesMut) -> usize {
        self.partial.as_ref().map_or(0, |partial| partial.consumed) + src.len()
    }

    fn incomplete(&self, size: usize) -> Result<Option<Frame>, Error> {
        // A partial frame this large will never be accepted, stop buffering it.
        if size > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(None)
    }

    fn decode_whole(&self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(Error::Incomplete) => return self.incomplete(src.len()),
            Err(err) => return Err(err),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }

    fn decode_array(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let mut partial = match self.partial.take() {
            Some(partial) => partial,
            None => {
                if src.is_empty() {
                    return Ok(None);
                }
                if src[0] != b'*' {
                    return self.decode_whole(src);
                }

                let mut cursor = Cursor::new(&src[..]);
                let length = match Frame::parse_array_header(&mut cursor) {
                    Ok(length) => length,
                    Err(Error::Incomplete) => return self.incomplete(src.len()),
                    Err(err) => return Err(err),
                };
                let consumed = cursor.position() as usize;
                src.advance(consumed);

                let Some(length) = length else {
                    return Ok(Some(Frame::Null));
                };

                PartialArray {
                    length,
                    // The declared length is untrusted, don't let it drive the allocation.
                    frames: Vec::with_capacity(length.min(src.len())),
                    consumed,
                }
            }
        };

        while partial.frames.len() < partial.length {
            let mut cursor = Cursor::new(&src[..]);
            match Frame::parse_element(&mut cursor) {
                Ok(frame) => {
                    let position = cursor.position() as usize;
                    src.advance(position);
                    partial.consumed += position;
                    partial.frames.push(frame);
                }
                Err(Error::Incomplete) => {
                    let size = partial.consumed + src.len();
                    self.partial = Some(partial);
                    return self.incomplete(size);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Some(Frame::Array(partial.frames)))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let result = self.decode_array(src);
        if result.is_err() {
            self.partial = None;
        }
        result
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                let pending = self.pending(src);
                if pending > 0 {
                    // Typically the tail of a write torn by a crash.
                    warn!(pending, "Discarding incomplete frame at end of stream");
                    self.partial = None;
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(&frame.serialize());
        Ok(())
    }
}

impl Encoder<&Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(&frame.serialize());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn decode_waits_for_whole_frame() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nke"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        // The header and the complete first element are already taken.
        assert_eq!(&buf[..], b"$3\r\nke");
        assert_eq!(codec.pending(&buf), 19);

        buf.extend_from_slice(b"y\r\n");
        let frame = codec.decode(&mut buf).unwrap();

        assert_eq!(frame, Some(Frame::command(["GET", "key"])));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_consumes_one_frame_at_a_time() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*0\r\n"[..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::command(["PING"]))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Array(vec![])));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_rejects_oversized_partial_frame() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::from(&b"$100\r\n0123456789abcdef"[..]);

        let err = codec.decode(&mut buf).unwrap_err();

        assert!(matches!(err, Error::FrameTooLarge { size: 22, max: 16 }));
    }

    #[test]
    fn decode_eof_discards_torn_tail() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"$1\r\na\r\n*3\r\n$3\r\nSET"[..]);

        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Frame::Bulk(Bytes::from("a")))
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_keeps_progress_across_reads() {
        let mut codec = FrameCodec::default();
        let request = Frame::command(["HSET", "h", "field", "value"]).serialize();
        let mut buf = BytesMut::new();

        for (i, byte) in request.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let frame = codec.decode(&mut buf).unwrap();
            if i + 1 < request.len() {
                assert_eq!(frame, None);
                assert!(buf.len() < 12, "completed elements stay buffered");
            } else {
                assert_eq!(frame, Some(Frame::command(["HSET", "h", "field", "value"])));
            }
        }

        assert!(buf.is_empty());
        assert_eq!(codec.pending(&buf), 0);
    }

    #[test]
    fn decode_counts_taken_elements_against_the_limit() {
        let mut codec = FrameCodec::new(24);
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"$64\r\n0123");
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { max: 24, .. }));
        assert_eq!(codec.pending(&buf), buf.len());
    }

    #[test]
    fn decode_rejects_deep_nesting() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*1\r\n".repeat(100_000)[..]);

        assert!(matches!(codec.decode(&mut buf), Err(Error::Framing(_))));
    }

    #[test]
    fn decode_eof_discards_partial_array() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
        assert_eq!(codec.pending(&buf), 13);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert_eq!(codec.pending(&buf), 0);

        buf.extend_from_slice(b"*1\r\n$4\r\nPING\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::command(["PING"])));
    }

    #[test]
    fn decode_surfaces_framing_errors() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*x\r\n"[..]);

        assert!(matches!(codec.decode(&mut buf), Err(Error::Framing(_))));
    }

    #[test]
    fn encode_appends_wire_bytes() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        codec.encode(Frame::ok(), &mut buf).unwrap();
        codec.encode(&Frame::Null, &mut buf).unwrap();

        assert_eq!(&buf[..], b"+OK\r\n$-1\r\n");
    }
}
