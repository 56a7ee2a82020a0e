//! Wire frame codec for the chat-room service (CRS) control protocol.
//!
//! Every frame on a control connection begins with a little-endian 32-bit
//! `MessageType` tag. CREATE/JOIN carry a null-terminated room name after the
//! tag; DELETE/LIST carry nothing; RESPONSE carries a 32-bit `Status` and a
//! command-specific tail. Chat-mode traffic on a room socket is raw bytes,
//! except that a frame whose first four bytes equal the DELETE tag is a
//! server-originated teardown signal.

use std::array::TryFromSliceError;
use std::str::Utf8Error;

use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug)]
pub enum Error {
    /// Frame shorter than the minimum size for its kind.
    InvalidInput,
    /// First four bytes don't match a known `MessageType`.
    UnknownMessageType,
    /// Status field doesn't match a known `Status`.
    UnknownStatus,
    /// Room/argument name wasn't valid UTF-8.
    Utf8Error(Utf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}

/// Little-endian 32-bit tag prefixing every control frame.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum MessageType {
    Create = 0,
    Delete = 1,
    Join = 2,
    List = 3,
    Response = 4,
    Invalid = 5,
}

/// Status carried in the body of a RESPONSE frame.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum Status {
    Success = 0,
    FailureAlreadyExists = 1,
    FailureNotExists = 2,
    FailureInvalid = 3,
    FailureInvalidUsername = 4,
    FailureUnknown = 5,
}

/// Raw little-endian bytes of the DELETE tag, used both to encode a
/// teardown frame and to recognise one on the client side.
pub const DELETE_TAG_BYTES: [u8; 4] = (MessageType::Delete as u32).to_le_bytes();

/// Returns true if `bytes` begins with the DELETE tag.
///
/// # Test
///
/// ```
/// use crs_wire::{encode_delete_teardown, is_delete_tag};
///
/// assert!(is_delete_tag(&encode_delete_teardown()));
/// assert!(!is_delete_tag(b"hello\0"));
/// ```
pub fn is_delete_tag(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == DELETE_TAG_BYTES
}

/// A decoded command frame sent client-to-server on a control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(String),
    Delete(String),
    Join(String),
    List,
}

fn read_tag(bytes: &[u8]) -> Result<(MessageType, &[u8]), Error> {
    if bytes.len() < 4 {
        return Err(Error::InvalidInput);
    }

    let mut head = &bytes[..4];
    let tag = head.get_u32_le();
    let kind = MessageType::try_from(tag).map_err(|_| Error::UnknownMessageType)?;
    Ok((kind, &bytes[4..]))
}

fn read_c_string(bytes: &[u8]) -> Result<&str, Error> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    Ok(std::str::from_utf8(&bytes[..end])?)
}

/// Decodes a command frame sent to the control server.
///
/// # Test
///
/// ```
/// use crs_wire::{decode_command, encode_create, Command};
///
/// let frame = encode_create("r1");
/// assert_eq!(decode_command(&frame).unwrap(), Command::Create("r1".to_string()));
/// ```
pub fn decode_command(bytes: &[u8]) -> Result<Command, Error> {
    let (kind, rest) = read_tag(bytes)?;

    Ok(match kind {
        MessageType::Create => Command::Create(read_c_string(rest)?.to_string()),
        MessageType::Delete => Command::Delete(read_c_string(rest)?.to_string()),
        MessageType::Join => Command::Join(read_c_string(rest)?.to_string()),
        MessageType::List => Command::List,
        MessageType::Response | MessageType::Invalid => return Err(Error::UnknownMessageType),
    })
}

fn push_c_string(buf: &mut BytesMut, value: &str) {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

/// # Test
///
/// ```
/// use crs_wire::{decode_command, encode_create, Command};
///
/// assert_eq!(decode_command(&encode_create("lobby")).unwrap(), Command::Create("lobby".to_string()));
/// ```
pub fn encode_create(name: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + name.len() + 1);
    buf.put_u32_le(MessageType::Create.into());
    push_c_string(&mut buf, name);
    buf.to_vec()
}

pub fn encode_delete(name: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + name.len() + 1);
    buf.put_u32_le(MessageType::Delete.into());
    push_c_string(&mut buf, name);
    buf.to_vec()
}

pub fn encode_join(name: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + name.len() + 1);
    buf.put_u32_le(MessageType::Join.into());
    push_c_string(&mut buf, name);
    buf.to_vec()
}

pub fn encode_list() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32_le(MessageType::List.into());
    buf.to_vec()
}

/// Server-to-client teardown frame: the DELETE tag plus a trailing nul,
/// mirroring the reference implementation's `buffer[sizeof(message)] = '\0'`.
pub fn encode_delete_teardown() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u32_le(MessageType::Delete.into());
    buf.put_u8(0);
    buf.to_vec()
}

/// Which request a RESPONSE frame is answering, needed because the wire
/// format doesn't echo the original command tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRequest {
    Create,
    Delete,
    Join,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseTail {
    Empty,
    /// Room names in server order; an empty vec means "no live rooms".
    List(Vec<String>),
    Join { port: u16, member_count: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub tail: ResponseTail,
}

pub fn encode_response_status(status: Status) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32_le(MessageType::Response.into());
    buf.put_u32_le(status.into());
    buf.to_vec()
}

/// Encodes the LIST response tail: a comma-separated, trailing-comma list
/// of room names, or the literal string `"empty"` if there are none.
///
/// # Test
///
/// ```
/// use crs_wire::encode_response_list;
///
/// assert!(String::from_utf8(encode_response_list(&[])).unwrap().ends_with("empty"));
/// let names = vec!["r1".to_string(), "r2".to_string()];
/// assert!(String::from_utf8(encode_response_list(&names)).unwrap().ends_with("r1,r2,"));
/// ```
pub fn encode_response_list(names: &[String]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + 16 * names.len());
    buf.put_u32_le(MessageType::Response.into());
    buf.put_u32_le(Status::Success.into());

    if names.is_empty() {
        buf.put_slice(b"empty");
    } else {
        for name in names {
            buf.put_slice(name.as_bytes());
            buf.put_u8(b',');
        }
    }

    buf.to_vec()
}

pub fn encode_response_join_success(port: u16, member_count: u32) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u32_le(MessageType::Response.into());
    buf.put_u32_le(Status::Success.into());
    buf.put_u32_le(port as u32);
    buf.put_u32_le(member_count);
    buf.to_vec()
}

/// Decodes a RESPONSE frame. The caller supplies `pending` because the wire
/// format carries no indication of which request this answers.
pub fn decode_response(bytes: &[u8], pending: PendingRequest) -> Result<Response, Error> {
    let (kind, mut rest) = read_tag(bytes)?;
    if kind != MessageType::Response {
        return Err(Error::UnknownMessageType);
    }

    if rest.len() < 4 {
        return Err(Error::InvalidInput);
    }

    let status = Status::try_from(rest.get_u32_le()).map_err(|_| Error::UnknownStatus)?;

    let tail = match (pending, status) {
        (PendingRequest::List, Status::Success) => {
            let text = std::str::from_utf8(rest)?;
            let names = if text == "empty" {
                Vec::new()
            } else {
                text.trim_end_matches(',')
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            };
            ResponseTail::List(names)
        }
        (PendingRequest::Join, Status::Success) => {
            if rest.len() < 8 {
                return Err(Error::InvalidInput);
            }
            let port = rest.get_u32_le() as u16;
            let member_count = rest.get_u32_le();
            ResponseTail::Join { port, member_count }
        }
        _ => ResponseTail::Empty,
    };

    Ok(Response { status, tail })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_create_and_join() {
        assert_eq!(
            decode_command(&encode_create("room")).unwrap(),
            Command::Create("room".to_string())
        );
        assert_eq!(
            decode_command(&encode_join("room")).unwrap(),
            Command::Join("room".to_string())
        );
        assert_eq!(decode_command(&encode_list()).unwrap(), Command::List);
    }

    #[test]
    fn list_response_roundtrip_empty() {
        let frame = encode_response_list(&[]);
        let resp = decode_response(&frame, PendingRequest::List).unwrap();
        assert_eq!(resp.status, Status::Success);
        assert_eq!(resp.tail, ResponseTail::List(Vec::new()));
    }

    #[test]
    fn list_response_roundtrip_nonempty() {
        let names = vec!["r1".to_string(), "r2".to_string()];
        let frame = encode_response_list(&names);
        let resp = decode_response(&frame, PendingRequest::List).unwrap();
        assert_eq!(resp.tail, ResponseTail::List(names));
    }

    #[test]
    fn join_response_roundtrip() {
        let frame = encode_response_join_success(4242, 3);
        let resp = decode_response(&frame, PendingRequest::Join).unwrap();
        assert_eq!(
            resp.tail,
            ResponseTail::Join {
                port: 4242,
                member_count: 3
            }
        );
    }

    #[test]
    fn status_only_response_roundtrip() {
        let frame = encode_response_status(Status::FailureAlreadyExists);
        let resp = decode_response(&frame, PendingRequest::Create).unwrap();
        assert_eq!(resp.status, Status::FailureAlreadyExists);
        assert_eq!(resp.tail, ResponseTail::Empty);
    }

    #[test]
    fn teardown_frame_is_recognised() {
        let frame = encode_delete_teardown();
        assert!(is_delete_tag(&frame));
        assert!(!is_delete_tag(b"hi\0"));
        assert!(!is_delete_tag(&[0, 1]));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = 99u32.to_le_bytes();
        assert!(matches!(decode_command(&bytes), Err(Error::UnknownMessageType)));
    }
}
