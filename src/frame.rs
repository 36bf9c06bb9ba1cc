// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;
use std::str;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strum_macros::{AsRefStr, Display};
use thiserror::Error as ThisError;

use crate::stream::Stream;

static CRLF: &[u8; 2] = b"\r\n";

/// Deepest array nesting accepted by [`Frame::parse`]. Requests are flat arrays, so anything
/// deeper is rejected before it can exhaust the stack.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("protocol error; invalid length")]
    InvalidLength,
    #[error("protocol error; invalid integer")]
    InvalidInteger,
    #[error("protocol error; invalid boolean value: {0}")]
    InvalidBoolean(u8),
    #[error("protocol error; expected CRLF at position {0}")]
    ExpectedCrlf(usize),
    #[error("protocol error; invalid UTF-8 string")]
    InvalidUtf8,
    #[error("protocol error; arrays nested deeper than {} levels", MAX_NESTING_DEPTH)]
    NestingTooDeep,
}

impl Error {
    /// Whether more bytes could turn the input into a valid frame. Every other error means the
    /// input is malformed and can never be parsed.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Incomplete)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Boolean(bool),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    Stream(Stream),
}

/// The type name reported by `TYPE` for a stored value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TypeTag {
    String,
    List,
    Stream,
    /// Reported for keys that do not exist.
    None,
    #[strum(serialize = "")]
    NotApplicable,
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let line = get_line(src)?;
                Ok(Frame::Simple(to_string(line)?))
            }
            DataType::SimpleError => {
                let line = get_line(src)?;
                Ok(Frame::Error(to_string(line)?))
            }
            DataType::Integer => {
                let line = get_line(src)?;
                let integer = str::from_utf8(line)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(Error::InvalidInteger)?;

                Ok(Frame::Integer(integer))
            }
            // #<t|f>\r\n
            DataType::Boolean => {
                let value = match get_byte(src)? {
                    b't' => true,
                    b'f' => false,
                    byte => return Err(Error::InvalidBoolean(byte)),
                };
                expect_crlf(src)?;

                Ok(Frame::Boolean(value))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                // RESP2 encodes the null bulk string as a negative length: $-1\r\n
                if peek_byte(src)? == b'-' {
                    src.advance(1);
                    if get_length(src)? != 1 {
                        return Err(Error::InvalidLength);
                    }
                    expect_crlf(src)?;
                    return Ok(Frame::Null);
                }

                let length = get_length(src)?;
                expect_crlf(src)?;
                let data = get_bytes(src, length)?;
                expect_crlf(src)?;

                Ok(Frame::Bulk(Bytes::copy_from_slice(data)))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(Error::NestingTooDeep);
                }

                let length = get_length(src)?;
                expect_crlf(src)?;

                // The length is untrusted, so it does not drive the allocation on its own.
                let mut frames = Vec::with_capacity(length.min(src.remaining()));
                for _ in 0..length {
                    let frame = Self::parse_nested(src, depth + 1)?;
                    frames.push(frame);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = BytesMut::new();
        self.write_to(&mut bytes);
        bytes.to_vec()
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(DataType::SimpleString.into());
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Error(s) => {
                dst.put_u8(DataType::SimpleError.into());
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Integer(i) => {
                dst.put_u8(DataType::Integer.into());
                dst.put_slice(i.to_string().as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Boolean(b) => {
                dst.put_u8(DataType::Boolean.into());
                dst.put_u8(if *b { b't' } else { b'f' });
                dst.put_slice(CRLF);
            }
            Frame::Bulk(bytes) => {
                dst.put_u8(DataType::BulkString.into());
                dst.put_slice(bytes.len().to_string().as_bytes());
                dst.put_slice(CRLF);
                dst.put_slice(bytes);
                dst.put_slice(CRLF);
            }
            Frame::Null => {
                dst.put_u8(DataType::BulkString.into());
                dst.put_slice(b"-1");
                dst.put_slice(CRLF);
            }
            Frame::Array(arr) => {
                dst.put_u8(DataType::Array.into());
                dst.put_slice(arr.len().to_string().as_bytes());
                dst.put_slice(CRLF);
                for frame in arr {
                    frame.write_to(dst);
                }
            }
            Frame::Stream(stream) => stream.to_frame().write_to(dst),
        }
    }

    /// Integer value of the frame. Strings are parsed as base-10 numbers.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Frame::Simple(s) => s.parse().ok(),
            Frame::Bulk(bytes) => str::from_utf8(bytes).ok()?.parse().ok(),
            Frame::Integer(i) => Some(*i),
            Frame::Error(_)
            | Frame::Boolean(_)
            | Frame::Null
            | Frame::Array(_)
            | Frame::Stream(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::Simple(s) => Some(s.clone()),
            Frame::Bulk(bytes) => str::from_utf8(bytes).ok().map(str::to_string),
            Frame::Integer(i) => Some(i.to_string()),
            Frame::Error(_)
            | Frame::Boolean(_)
            | Frame::Null
            | Frame::Array(_)
            | Frame::Stream(_) => None,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Frame::Simple(_) | Frame::Bulk(_) => TypeTag::String,
            Frame::Array(_) => TypeTag::List,
            Frame::Stream(_) => TypeTag::Stream,
            Frame::Error(_) | Frame::Integer(_) | Frame::Boolean(_) | Frame::Null => {
                TypeTag::NotApplicable
            }
        }
    }
}

/// Decodes a single frame from the start of `buf`, returning it with the number of bytes it
/// occupied.
pub fn decode(buf: &[u8]) -> Result<(Frame, usize), Error> {
    let mut cursor = Cursor::new(buf);
    let frame = Frame::parse(&mut cursor)?;

    Ok((frame, cursor.position() as usize))
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

// TODO: Not sure about this display implementation, should we log the actual bytes? I think not,
// but maybe it will be useful for debugging.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Boolean(b) => write!(f, "#{}", if *b { 't' } else { 'f' }),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}\r\n", arr.len())?;
                for frame in arr {
                    write!(f, "{}\r\n", frame)?;
                }
                Ok(())
            }
            Frame::Stream(stream) => write!(f, "stream({} entries)", stream.len()),
        }
    }
}

fn to_string(bytes: &[u8]) -> Result<String, Error> {
    str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| Error::InvalidUtf8)
}

/// Returns the bytes up to the next CRLF and moves the cursor past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;

    let end = buf[start..]
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

/// Reads an unsigned decimal length. Only ASCII digits are consumed.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<usize, Error> {
    let buf: &[u8] = *src.get_ref();
    let start = src.position() as usize;

    let digits = buf[start..]
        .iter()
        .take_while(|byte| byte.is_ascii_digit())
        .count();

    // The number may continue in bytes that have not arrived yet.
    if start + digits == buf.len() {
        return Err(Error::Incomplete);
    }
    if digits == 0 {
        return Err(Error::InvalidLength);
    }

    let length = str::from_utf8(&buf[start..start + digits])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(Error::InvalidLength)?;

    src.set_position((start + digits) as u64);

    Ok(length)
}

fn get_bytes<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    if src.remaining() < length {
        return Err(Error::Incomplete);
    }

    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;
    src.advance(length);

    Ok(&buf[start..start + length])
}

fn expect_crlf(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    let position = src.position() as usize;
    let chunk = src.chunk();

    if !CRLF.starts_with(&chunk[..chunk.len().min(CRLF.len())]) {
        return Err(Error::ExpectedCrlf(position));
    }
    if chunk.len() < CRLF.len() {
        return Err(Error::Incomplete);
    }

    src.advance(CRLF.len());
    Ok(())
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn peek_byte(src: &Cursor<&[u8]>) -> Result<u8, Error> {
    src.chunk().first().copied().ok_or(Error::Incomplete)
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    Boolean,      // '#'
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
            b'#' => Ok(Self::Boolean),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::Boolean => b'#',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
