/// RESP (Redis Serialization Protocol) framing for the cache-store client

use bytes::{BufMut, Bytes, BytesMut};
use std::str;

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple String (+OK\r\n)
    SimpleString(String),
    /// Error (-ERR message\r\n)
    Error(String),
    /// Integer (:123\r\n)
    Integer(i64),
    /// Bulk String ($5\r\nhello\r\n), None is the NULL bulk string
    BulkString(Option<Bytes>),
    /// Array (*2\r\n...), None is the NULL array
    Array(Option<Vec<RespValue>>),
}

/// Parse error types
#[derive(Debug, thiserror::Error)]
pub enum RespParseError {
    #[error("Invalid RESP format: {0}")]
    InvalidFormat(String),
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] str::Utf8Error),
    #[error("Invalid integer: {0}")]
    InvalidInteger(#[from] std::num::ParseIntError),
}

/// Frame parser. Never consumes input: callers advance their buffer by the
/// returned length once a complete frame is available.
pub struct RespParser;

impl RespParser {
    /// Parse one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn parse(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let Some(&first_byte) = buf.first() else {
            return Ok(None);
        };

        match first_byte {
            b'+' | b'-' | b':' => {
                let Some((line, used)) = Self::read_line(buf) else {
                    return Ok(None);
                };
                let content = str::from_utf8(&line[1..])?;
                let value = match first_byte {
                    b'+' => RespValue::SimpleString(content.to_string()),
                    b'-' => RespValue::Error(content.to_string()),
                    _ => RespValue::Integer(content.parse()?),
                };
                Ok(Some((value, used)))
            }
            b'$' => Self::parse_bulk_string(buf),
            b'*' => Self::parse_array(buf),
            _ => Err(RespParseError::InvalidFormat(format!(
                "Unknown RESP type: {}",
                first_byte as char
            ))),
        }
    }

    fn parse_bulk_string(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let Some((header, header_len)) = Self::read_line(buf) else {
            return Ok(None);
        };
        let size: i64 = str::from_utf8(&header[1..])?.parse()?;

        if size == -1 {
            return Ok(Some((RespValue::BulkString(None), header_len)));
        }
        if size < 0 {
            return Err(RespParseError::InvalidFormat(
                "Invalid bulk string size".to_string(),
            ));
        }

        let Some(end) = usize::try_from(size)
            .ok()
            .and_then(|size| header_len.checked_add(size))
            .filter(|end| end.checked_add(2).is_some())
        else {
            return Err(RespParseError::InvalidFormat(
                "Bulk string size out of range".to_string(),
            ));
        };
        if buf.len() < end + 2 {
            return Ok(None);
        }
        if &buf[end..end + 2] != b"\r\n" {
            return Err(RespParseError::InvalidFormat(
                "Missing \\r\\n after bulk string".to_string(),
            ));
        }

        let content = Bytes::copy_from_slice(&buf[header_len..end]);
        Ok(Some((RespValue::BulkString(Some(content)), end + 2)))
    }

    fn parse_array(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let Some((header, mut used)) = Self::read_line(buf) else {
            return Ok(None);
        };
        let size: i64 = str::from_utf8(&header[1..])?.parse()?;

        if size == -1 {
            return Ok(Some((RespValue::Array(None), used)));
        }
        if size < 0 {
            return Err(RespParseError::InvalidFormat("Invalid array size".to_string()));
        }

        // Every element takes at least one byte, so the buffer bounds the count
        let hint = usize::try_from(size).unwrap_or(usize::MAX).min(buf.len() - used);
        let mut elements = Vec::with_capacity(hint);
        for _ in 0..size {
            match Self::parse(&buf[used..])? {
                Some((element, len)) => {
                    elements.push(element);
                    used += len;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(Some(elements)), used)))
    }

    /// Line content without the trailing \r\n, and the bytes it spans
    fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
        buf.windows(2)
            .position(|w| w == b"\r\n")
            .map(|pos| (&buf[..pos], pos + 2))
    }
}

/// Encode a RESP value into an existing buffer
pub fn encode_into(buf: &mut BytesMut, value: &RespValue) {
    match value {
        RespValue::SimpleString(s) => {
            buf.put_u8(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf.put_slice(b"\r\n");
        }
        RespValue::Error(s) => {
            buf.put_u8(b'-');
            buf.extend_from_slice(s.as_bytes());
            buf.put_slice(b"\r\n");
        }
        RespValue::Integer(n) => {
            buf.put_u8(b':');
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.put_slice(b"\r\n");
        }
        RespValue::BulkString(Some(data)) => {
            buf.put_u8(b'$');
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.put_slice(b"\r\n");
            buf.extend_from_slice(data);
            buf.put_slice(b"\r\n");
        }
        RespValue::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
        RespValue::Array(Some(elements)) => {
            buf.put_u8(b'*');
            buf.extend_from_slice(elements.len().to_string().as_bytes());
            buf.put_slice(b"\r\n");
            for element in elements {
                encode_into(buf, element);
            }
        }
        RespValue::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
    }
}

/// Encode a command as an array of bulk strings
pub fn encode_command(args: &[&[u8]]) -> Bytes {
    let elements = args
        .iter()
        .map(|arg| RespValue::BulkString(Some(Bytes::copy_from_slice(arg))))
        .collect();

    let mut buf = BytesMut::new();
    encode_into(&mut buf, &RespValue::Array(Some(elements)));
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let (value, used) = RespParser::parse(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(used, 5);
    }

    #[test]
    fn test_parse_error() {
        let (value, _) = RespParser::parse(b"-ERR unknown command\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Error("ERR unknown command".to_string()));
    }

    #[test]
    fn test_parse_integer() {
        let (value, _) = RespParser::parse(b":1000\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(1000));
    }

    #[test]
    fn test_parse_null_bulk_string() {
        let (value, used) = RespParser::parse(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(None));
        assert_eq!(used, 5);
    }

    #[test]
    fn test_parse_array_with_trailing_bytes() {
        let input = b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n+OK\r\n";
        let (value, used) = RespParser::parse(input).unwrap().unwrap();

        assert_eq!(
            value,
            RespValue::Array(Some(vec![
                RespValue::BulkString(Some(Bytes::from("hello"))),
                RespValue::BulkString(Some(Bytes::from("world"))),
            ]))
        );
        assert_eq!(&input[used..], b"+OK\r\n");
    }

    #[test]
    fn test_incomplete_data() {
        assert!(RespParser::parse(b"+OK\r").unwrap().is_none());
        assert!(RespParser::parse(b"$5\r\nhel").unwrap().is_none());
        assert!(RespParser::parse(b"*2\r\n$5\r\nhello\r\n").unwrap().is_none());
        assert!(RespParser::parse(b"").unwrap().is_none());
    }

    #[test]
    fn test_huge_declared_lengths_do_not_preallocate() {
        assert!(RespParser::parse(b"*9223372036854775807\r\n").unwrap().is_none());
        assert!(RespParser::parse(b"*9223372036854775807\r\n:1\r\n").unwrap().is_none());
        assert!(RespParser::parse(b"$9223372036854775807\r\nabc").unwrap().is_none());
        assert!(RespParser::parse(b"*-7\r\n").is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(RespParser::parse(b"?what\r\n").is_err());
    }

    #[test]
    fn test_encode_command() {
        let encoded = encode_command(&[b"SET", b"key", b"value"]);
        let expected = "*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n";
        assert_eq!(encoded, Bytes::from(expected));
    }
}
