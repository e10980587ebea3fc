use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{Error, Frame};

/// A client connection over any byte stream, usually a `TcpStream`.
pub struct Connection<S> {
    pub id: Uuid,
    // Data read from the stream is buffered by the codec until a whole frame can be parsed; the
    // parsed bytes are then dropped from the buffer.
    frames: Framed<S, FrameCodec>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Connection<S> {
        Connection::with_codec(stream, FrameCodec::default())
    }

    pub fn with_codec(stream: S, codec: FrameCodec) -> Connection<S> {
        Connection {
            id: Uuid::new_v4(),
            frames: Framed::new(stream, codec),
        }
    }

    /// Reads the next frame. `Ok(None)` means the peer closed the stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.frames.next().await.transpose()
    }

    /// Writes `frame` and flushes it to the stream.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.frames.send(frame).await
    }
}
