use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::{Error, Result};
use tokio_util::codec::LengthDelimitedCodec;

// Command type identifiers
pub const CMD_PING: u8 = 0x00;
pub const CMD_SET: u8 = 0x01;
pub const CMD_GET: u8 = 0x02;
pub const CMD_DELETE: u8 = 0x03;
pub const CMD_GET_MULTI: u8 = 0x04;
pub const CMD_DELETE_ALL: u8 = 0x05;
pub const CMD_COMPARE_AND_SET: u8 = 0x06;

// Response type identifiers
pub const RESP_PONG: u8 = 0x00;
pub const RESP_OK: u8 = 0x01;
pub const RESP_VALUE: u8 = 0x02;
pub const RESP_NOT_FOUND: u8 = 0x03;
pub const RESP_ERROR: u8 = 0x04;
pub const RESP_VALUES: u8 = 0x05;
pub const RESP_DELETED: u8 = 0x06;
pub const RESP_SWAPPED: u8 = 0x07;

pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Length-delimited codec shared by server and client: 4-byte big-endian prefix.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Get { key: String },
    GetMulti { keys: Vec<String> },
    Set { key: String, value: Bytes },
    CompareAndSet { key: String, expected: Bytes, value: Bytes },
    Delete { key: String },
    DeleteAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Pong,
    Ok,
    Value { value: Bytes },
    /// Only the keys that were present, in request order.
    Values { items: Vec<(String, Bytes)> },
    NotFound,
    Deleted { existed: bool },
    Swapped { swapped: bool },
    Error { msg: String },
}

impl Request {
    /// Encode a Request into Bytes for transmission
    ///
    /// Format (strings and blobs are prefixed with a u32 length):
    /// - PING: [0x00]
    /// - SET: [0x01][key][value]
    /// - GET: [0x02][key]
    /// - DELETE: [0x03][key]
    /// - GET_MULTI: [0x04][count: u32][key]*
    /// - DELETE_ALL: [0x05]
    /// - COMPARE_AND_SET: [0x06][key][expected][value]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Request::Ping => buf.put_u8(CMD_PING),
            Request::Get { key } => {
                buf.put_u8(CMD_GET);
                put_blob(&mut buf, key.as_bytes());
            }
            Request::GetMulti { keys } => {
                buf.put_u8(CMD_GET_MULTI);
                buf.put_u32(keys.len() as u32);
                for key in keys {
                    put_blob(&mut buf, key.as_bytes());
                }
            }
            Request::Set { key, value } => {
                buf.put_u8(CMD_SET);
                put_blob(&mut buf, key.as_bytes());
                put_blob(&mut buf, value);
            }
            Request::CompareAndSet {
                key,
                expected,
                value,
            } => {
                buf.put_u8(CMD_COMPARE_AND_SET);
                put_blob(&mut buf, key.as_bytes());
                put_blob(&mut buf, expected);
                put_blob(&mut buf, value);
            }
            Request::Delete { key } => {
                buf.put_u8(CMD_DELETE);
                put_blob(&mut buf, key.as_bytes());
            }
            Request::DeleteAll => buf.put_u8(CMD_DELETE_ALL),
        }

        buf.freeze()
    }

    /// Decode a Request from one frame already split out by the codec
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(Error::Protocol("Empty buffer".to_string()));
        }

        let cmd = buf.get_u8();
        let request = match cmd {
            CMD_PING => Request::Ping,
            CMD_GET => Request::Get {
                key: get_string(&mut buf, "GET key")?,
            },
            CMD_GET_MULTI => {
                let count = get_u32(&mut buf, "GET_MULTI count")? as usize;
                // Each key needs at least its length prefix.
                if buf.remaining() < count.saturating_mul(4) {
                    return Err(Error::Protocol(format!(
                        "Invalid GET_MULTI: {} keys announced, {} bytes left",
                        count,
                        buf.remaining()
                    )));
                }
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(get_string(&mut buf, "GET_MULTI key")?);
                }
                Request::GetMulti { keys }
            }
            CMD_SET => {
                let key = get_string(&mut buf, "SET key")?;
                let value = get_blob(&mut buf, "SET value")?;
                Request::Set { key, value }
            }
            CMD_COMPARE_AND_SET => Request::CompareAndSet {
                key: get_string(&mut buf, "COMPARE_AND_SET key")?,
                expected: get_blob(&mut buf, "COMPARE_AND_SET expected")?,
                value: get_blob(&mut buf, "COMPARE_AND_SET value")?,
            },
            CMD_DELETE => Request::Delete {
                key: get_string(&mut buf, "DELETE key")?,
            },
            CMD_DELETE_ALL => Request::DeleteAll,
            _ => {
                return Err(Error::Protocol(format!("Unknown command: 0x{:02X}", cmd)));
            }
        };

        ensure_consumed(&buf, "request")?;
        Ok(request)
    }
}

impl Response {
    /// Encode a Response into Bytes for transmission
    ///
    /// Format:
    /// - PONG: [0x00]
    /// - OK: [0x01]
    /// - VALUE: [0x02][value]
    /// - NOT_FOUND: [0x03]
    /// - ERROR: [0x04][msg]
    /// - VALUES: [0x05][count: u32]([key][value])*
    /// - DELETED: [0x06][existed: u8]
    /// - SWAPPED: [0x07][swapped: u8]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Response::Pong => buf.put_u8(RESP_PONG),
            Response::Ok => buf.put_u8(RESP_OK),
            Response::Value { value } => {
                buf.put_u8(RESP_VALUE);
                put_blob(&mut buf, value);
            }
            Response::Values { items } => {
                buf.put_u8(RESP_VALUES);
                buf.put_u32(items.len() as u32);
                for (key, value) in items {
                    put_blob(&mut buf, key.as_bytes());
                    put_blob(&mut buf, value);
                }
            }
            Response::NotFound => buf.put_u8(RESP_NOT_FOUND),
            Response::Deleted { existed } => {
                buf.put_u8(RESP_DELETED);
                buf.put_u8(u8::from(*existed));
            }
            Response::Swapped { swapped } => {
                buf.put_u8(RESP_SWAPPED);
                buf.put_u8(u8::from(*swapped));
            }
            Response::Error { msg } => {
                buf.put_u8(RESP_ERROR);
                put_blob(&mut buf, msg.as_bytes());
            }
        }

        buf.freeze()
    }

    /// Decode a Response from Bytes received from the network
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(Error::Protocol("Empty buffer".to_string()));
        }

        let resp_type = buf.get_u8();
        let response = match resp_type {
            RESP_PONG => Response::Pong,
            RESP_OK => Response::Ok,
            RESP_VALUE => Response::Value {
                value: get_blob(&mut buf, "VALUE")?,
            },
            RESP_VALUES => {
                let count = get_u32(&mut buf, "VALUES count")? as usize;
                if buf.remaining() < count.saturating_mul(8) {
                    return Err(Error::Protocol(format!(
                        "Invalid VALUES: {} items announced, {} bytes left",
                        count,
                        buf.remaining()
                    )));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = get_string(&mut buf, "VALUES key")?;
                    let value = get_blob(&mut buf, "VALUES value")?;
                    items.push((key, value));
                }
                Response::Values { items }
            }
            RESP_NOT_FOUND => Response::NotFound,
            RESP_DELETED => {
                if !buf.has_remaining() {
                    return Err(Error::Protocol("Invalid DELETED: missing flag".to_string()));
                }
                Response::Deleted {
                    existed: buf.get_u8() != 0,
                }
            }
            RESP_SWAPPED => {
                if !buf.has_remaining() {
                    return Err(Error::Protocol("Invalid SWAPPED: missing flag".to_string()));
                }
                Response::Swapped {
                    swapped: buf.get_u8() != 0,
                }
            }
            RESP_ERROR => {
                let msg = get_blob(&mut buf, "ERROR")?;
                Response::Error {
                    msg: String::from_utf8_lossy(&msg).to_string(),
                }
            }
            _ => {
                return Err(Error::Protocol(format!(
                    "Unknown response type: 0x{:02X}",
                    resp_type
                )));
            }
        };

        ensure_consumed(&buf, "response")?;
        Ok(response)
    }
}

fn put_blob(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn get_u32(buf: &mut Bytes, what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::Protocol(format!("Invalid {}: missing length", what)));
    }
    Ok(buf.get_u32())
}

fn get_blob(buf: &mut Bytes, what: &str) -> Result<Bytes> {
    let len = get_u32(buf, what)? as usize;
    if buf.remaining() < len {
        return Err(Error::Protocol(format!(
            "Invalid {}: expected {} bytes, got {}",
            what,
            len,
            buf.remaining()
        )));
    }
    // Zero-copy slice of the frame
    Ok(buf.copy_to_bytes(len))
}

fn get_string(buf: &mut Bytes, what: &str) -> Result<String> {
    let raw = get_blob(buf, what)?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| Error::Protocol(format!("Invalid {} UTF-8: {}", what, e)))
}

fn ensure_consumed(buf: &Bytes, what: &str) -> Result<()> {
    if buf.has_remaining() {
        return Err(Error::Protocol(format!(
            "Trailing {} byte(s) after {}",
            buf.remaining(),
            what
        )));
    }
    Ok(())
}
