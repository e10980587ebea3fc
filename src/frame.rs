// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io;
use std::str;

use bytes::Buf;
use bytes::Bytes;
use std::io::Cursor;
use thiserror::Error as ThisError;
use tracing::warn;

static CRLF: &[u8; 2] = b"\r\n";

/// Null bulk string, the only representation of `Frame::Null` on the wire.
static NULL: &[u8; 5] = b"$-1\r\n";

/// Deepest array nesting accepted on input. Requests are flat arrays of bulk strings.
pub const MAX_NESTING: usize = 8;

/// Longest length field accepted, sign and CRLF included. Enough for any `i64`.
const MAX_LENGTH_LINE: usize = 32;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    /// Malformed length field or terminator.
    #[error("protocol error; {0}")]
    Framing(String),
    #[error("protocol error; unsupported frame data type {:?}", char::from(*.0))]
    UnsupportedType(u8),
    #[error("frame size {size} exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    pub fn simple(s: impl Into<String>) -> Frame {
        Frame::Simple(s.into())
    }

    pub fn error(msg: impl Into<String>) -> Frame {
        Frame::Error(msg.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Frame {
        Frame::Bulk(data.into())
    }

    /// Builds a request the way clients send it: an array of bulk strings.
    pub fn command<I, T>(parts: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Frame::Array(parts.into_iter().map(|p| Frame::Bulk(p.into())).collect())
    }

    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(frames) => Some(frames),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(frames) => Some(frames),
            _ => None,
        }
    }

    /// Text payload of simple strings, errors and UTF-8 bulk strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) | Frame::Error(s) => Some(s),
            Frame::Bulk(bytes) => str::from_utf8(bytes).ok(),
            _ => None,
        }
    }
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Parses one request frame from `src`.
    ///
    /// Clients only ever send arrays of bulk strings, so only `*` and `$` are accepted here even
    /// though every kind can be serialized. Returns [`Error::Incomplete`] when `src` does not yet
    /// hold a whole frame; the cursor position is meaningless in that case.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    /// Reads the `*<length>\r\n` header of a request array. `None` is the null array.
    pub(crate) fn parse_array_header(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
        match get_byte(src)? {
            b'*' => get_length(src),
            byte => Err(Error::UnsupportedType(byte)),
        }
    }

    /// Parses one element of a request array whose header was read with
    /// [`Frame::parse_array_header`].
    pub(crate) fn parse_element(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 1)
    }

    /// `depth` is the number of arrays enclosing the frame at `src`.
    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;

        match DataType::try_from(first_byte) {
            // *<number-of-elements>\r\n<element-1>...<element-n>
            Ok(DataType::Array) => {
                if depth >= MAX_NESTING {
                    return Err(Error::Framing("nested arrays too deep".to_string()));
                }

                let length = match get_length(src)? {
                    Some(length) => length,
                    None => return Ok(Frame::Null),
                };

                // The declared length is untrusted, don't let it drive the allocation.
                let mut frames = Vec::with_capacity(length.min(src.remaining()));
                for _ in 0..length {
                    let frame = Self::parse_nested(src, depth + 1)?;
                    frames.push(frame);
                }

                Ok(Frame::Array(frames))
            }
            // $<length>\r\n<data>\r\n
            Ok(DataType::BulkString) => {
                let length = match get_length(src)? {
                    Some(length) => length,
                    None => return Ok(Frame::Null),
                };

                if src.remaining() < length + CRLF.len() {
                    return Err(Error::Incomplete);
                }

                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + length]);
                src.advance(length);

                if &src.chunk()[..CRLF.len()] != CRLF {
                    return Err(Error::Framing(
                        "bulk string is not terminated by CRLF".to_string(),
                    ));
                }
                src.advance(CRLF.len());

                Ok(Frame::Bulk(data))
            }
            _ => {
                warn!(
                    data_type = ?char::from(first_byte),
                    "Unsupported frame data type on input"
                );
                Err(Error::UnsupportedType(first_byte))
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let digits = i.to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(bytes) => {
                let length_str = bytes.len().to_string();
                let mut result = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len(),
                );
                result.push(u8::from(DataType::BulkString));
                result.extend_from_slice(length_str.as_bytes());
                result.extend_from_slice(CRLF);
                result.extend_from_slice(bytes);
                result.extend_from_slice(CRLF);
                result
            }
            Frame::Null => NULL.to_vec(),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Reads a decimal length field. `None` is the `-1` null marker.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
    let line = get_line(src)?;
    let length = str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            Error::Framing(format!(
                "invalid length field {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;

    match length {
        -1 => Ok(None),
        length if length < 0 => Err(Error::Framing(format!("negative length {}", length))),
        length => usize::try_from(length)
            .map(Some)
            .map_err(|_| Error::Framing(format!("length {} out of range", length))),
    }
}

/// Returns the bytes up to the next `\r`, which must be followed by `\n`.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf.len().min(start + MAX_LENGTH_LINE);
    let cr = match buf[start..end].iter().position(|&b| b == b'\r') {
        Some(index) => start + index,
        None if end - start < MAX_LENGTH_LINE => return Err(Error::Incomplete),
        None => return Err(Error::Framing("length field too long".to_string())),
    };

    match buf.get(cr + 1) {
        None => Err(Error::Incomplete),
        Some(b'\n') => {
            src.set_position((cr + CRLF.len()) as u64);
            Ok(&buf[start..cr])
        }
        Some(_) => Err(Error::Framing(
            "length field is not terminated by CRLF".to_string(),
        )),
    }
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::UnsupportedType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
