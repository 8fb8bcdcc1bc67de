//! The Redis wire protocol (RESP): requests are multi-bulk arrays of
//! strings, responses are one of status/error/integer/bulk/nil, optionally
//! wrapped in a multi-bulk array of several such items.

use wrpc_core::{Code, Result, WrpcError};

use crate::io::{Readable, Writable};
use crate::message::{IRequest, IResponse};

const LINE_BUF: usize = 1024;

/// A command plus its arguments, serialized as a RESP multi-bulk array.
#[derive(Default)]
pub struct RedisRequest {
    params: Vec<String>,
}

impl RedisRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the command to issue, clearing whatever was set before.
    /// `command` and every item in `args` are stringified with `ToString`.
    pub fn set_command<I, S>(&mut self, command: impl Into<String>, args: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.params.clear();
        self.params.push(command.into());
        self.params.extend(args.into_iter().map(|a| a.to_string()));
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl IRequest for RedisRequest {
    fn write_to(&mut self, writable: &mut dyn Writable, timeout_ms: i32) -> Result<()> {
        if self.params.is_empty() {
            return Err(WrpcError::new(Code::InvalidArgument));
        }
        let mut message = format!("*{}\r\n", self.params.len());
        for param in &self.params {
            message.push_str(&format!("${}\r\n{}\r\n", param.len(), param));
        }
        writable.write_all(message.as_bytes(), timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisResponseType {
    Unknown,
    Error,
    Status,
    Integer,
    Bulk,
    Nil,
}

#[derive(Debug, Clone, Default)]
pub struct RedisResponseItem {
    pub response_type: Option<RedisResponseType>,
    pub integer: i64,
    pub message: String,
    pub detail: String,
    pub data: Vec<u8>,
}

impl RedisResponseItem {
    fn new(response_type: RedisResponseType) -> Self {
        Self {
            response_type: Some(response_type),
            ..Default::default()
        }
    }
}

/// A parsed redis reply: either a single item, or (when the wire reply was a
/// multi-bulk array) several.
#[derive(Default)]
pub struct RedisResponse {
    items: Vec<RedisResponseItem>,
}

impl RedisResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[RedisResponseItem] {
        &self.items
    }

    fn read_line_string(readable: &mut dyn Readable, timeout_ms: i32) -> Result<String> {
        let mut buf = vec![0u8; LINE_BUF];
        let n = readable.read_line(&mut buf, timeout_ms)?;
        if n <= 3 {
            return Err(WrpcError::new(Code::ParseMessageFail));
        }
        buf.truncate(n);
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        String::from_utf8(buf).map_err(|_| WrpcError::new(Code::ParseMessageFail))
    }

    fn read_one_item(
        &mut self,
        readable: &mut dyn Readable,
        line: &str,
        timeout_ms: i32,
    ) -> Result<()> {
        let (tag, rest) = line.split_at(1);
        match tag {
            "+" => {
                self.items.push(RedisResponseItem {
                    message: rest.to_string(),
                    ..RedisResponseItem::new(RedisResponseType::Status)
                });
                Ok(())
            }
            "-" => {
                let mut item = RedisResponseItem::new(RedisResponseType::Error);
                match rest.split_once(' ') {
                    Some((msg, detail)) => {
                        item.message = msg.to_string();
                        item.detail = detail.to_string();
                    }
                    None => item.message = rest.to_string(),
                }
                self.items.push(item);
                Ok(())
            }
            ":" => {
                let value: i64 = rest
                    .trim()
                    .parse()
                    .map_err(|_| WrpcError::new(Code::ParseMessageFail))?;
                self.items.push(RedisResponseItem {
                    integer: value,
                    ..RedisResponseItem::new(RedisResponseType::Integer)
                });
                Ok(())
            }
            "$" => {
                let len: i64 = rest
                    .trim()
                    .parse()
                    .map_err(|_| WrpcError::new(Code::ParseMessageFail))?;
                if len < 0 {
                    self.items.push(RedisResponseItem::new(RedisResponseType::Nil));
                    return Ok(());
                }
                let len = len as usize;
                let mut data = vec![0u8; len + 2];
                let n = readable.read(&mut data, timeout_ms)?;
                if n != len + 2 {
                    return Err(WrpcError::new(Code::RecvFail));
                }
                data.truncate(len);
                self.items.push(RedisResponseItem {
                    data,
                    ..RedisResponseItem::new(RedisResponseType::Bulk)
                });
                Ok(())
            }
            _ => Err(WrpcError::new(Code::MessageNotMatch)),
        }
    }
}

impl IResponse for RedisResponse {
    fn read_from(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()> {
        self.items.clear();
        let first_line = Self::read_line_string(readable, timeout_ms)?;

        if let Some(rest) = first_line.strip_prefix('*') {
            let count: usize = rest
                .trim()
                .parse()
                .map_err(|_| WrpcError::new(Code::ParseMessageFail))?;
            for _ in 0..count {
                let line = Self::read_line_string(readable, timeout_ms)?;
                self.read_one_item(readable, &line, timeout_ms)?;
            }
            Ok(())
        } else {
            self.read_one_item(readable, &first_line, timeout_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{MemoryReader, MemoryWriter};

    #[test]
    fn request_serializes_as_resp_multi_bulk() {
        let mut req = RedisRequest::new();
        req.set_command("SET", ["key", "value"]);
        let mut out = MemoryWriter::default();
        req.write_to(&mut out, -1).unwrap();
        assert_eq!(
            out.written,
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"
        );
    }

    #[test]
    fn empty_command_is_invalid_argument() {
        let mut req = RedisRequest::new();
        let mut out = MemoryWriter::default();
        let err = req.write_to(&mut out, -1).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[test]
    fn parses_status_reply() {
        let mut reader = MemoryReader::new(b"+OK\r\n".to_vec());
        let mut resp = RedisResponse::new();
        resp.read_from(&mut reader, -1).unwrap();
        assert_eq!(resp.items().len(), 1);
        assert_eq!(resp.items()[0].response_type, Some(RedisResponseType::Status));
        assert_eq!(resp.items()[0].message, "OK");
    }

    #[test]
    fn parses_error_reply_with_detail() {
        let mut reader = MemoryReader::new(b"-WRONGTYPE operation not supported\r\n".to_vec());
        let mut resp = RedisResponse::new();
        resp.read_from(&mut reader, -1).unwrap();
        assert_eq!(resp.items()[0].message, "WRONGTYPE");
        assert_eq!(resp.items()[0].detail, "operation not supported");
    }

    #[test]
    fn parses_multi_bulk_array_of_mixed_items() {
        let raw = b"*3\r\n:1\r\n$-1\r\n$5\r\nhello\r\n";
        let mut reader = MemoryReader::new(raw.to_vec());
        let mut resp = RedisResponse::new();
        resp.read_from(&mut reader, -1).unwrap();

        assert_eq!(resp.items().len(), 3);
        assert_eq!(resp.items()[0].response_type, Some(RedisResponseType::Integer));
        assert_eq!(resp.items()[0].integer, 1);
        assert_eq!(resp.items()[1].response_type, Some(RedisResponseType::Nil));
        assert_eq!(resp.items()[2].data, b"hello");
    }
}
