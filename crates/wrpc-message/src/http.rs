//! HTTP/1.x as a pair of message strategies: a request that serializes a
//! method line, headers, and an optional body, and a response that parses a
//! status line, headers, and either a `Content-Length` body or a chunked one.

use std::collections::BTreeMap;

use wrpc_core::{Code, Result, WrpcError};

use crate::io::{Readable, Writable};
use crate::message::{IRequest, IResponse};

const CRLF: &str = "\r\n";
const MAX_HEADER_LINE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
}

impl HttpMethod {
    fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

pub type HttpVersion = (u16, u16);
pub type HttpHeaders = BTreeMap<String, String>;

const DEFAULT_VERSION: HttpVersion = (1, 1);

/// An HTTP request. `Content-Length` is filled in automatically from the
/// body at `write_to` time unless the caller already set
/// `Transfer-Encoding` (chunked request bodies are the caller's problem to
/// frame; this strategy only appends what's already in `body`).
pub struct HttpRequest {
    method: HttpMethod,
    version: HttpVersion,
    uri: String,
    host: String,
    headers: HttpHeaders,
    body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            version: DEFAULT_VERSION,
            uri: "/".to_string(),
            host: String::new(),
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn set_method(&mut self, method: HttpMethod) {
        self.method = method;
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn set_version(&mut self, major: u16, minor: u16) {
        self.version = (major, minor);
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    pub fn set_content_type(&mut self, value: impl Into<String>) {
        self.set_header("Content-Type", value);
    }

    pub fn set_user_agent(&mut self, value: impl Into<String>) {
        self.set_header("User-Agent", value);
    }

    pub fn set_cache_control(&mut self, value: impl Into<String>) {
        self.set_header("Cache-Control", value);
    }

    pub fn set_referer(&mut self, value: impl Into<String>) {
        self.set_header("Referer", value);
    }

    pub fn set_accept(&mut self, value: impl Into<String>) {
        self.set_header("Accept", value);
    }

    pub fn set_accept_charset(&mut self, value: impl Into<String>) {
        self.set_header("Accept-Charset", value);
    }

    pub fn set_accept_encoding(&mut self, value: impl Into<String>) {
        self.set_header("Accept-Encoding", value);
    }

    pub fn set_accept_language(&mut self, value: impl Into<String>) {
        self.set_header("Accept-Language", value);
    }

    pub fn set_authorization(&mut self, value: impl Into<String>) {
        self.set_header("Authorization", value);
    }

    pub fn set_from(&mut self, value: impl Into<String>) {
        self.set_header("From", value);
    }

    pub fn append_body(&mut self, buf: &[u8]) {
        self.body.extend_from_slice(buf);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    fn pre_process(&mut self) {
        if !self.has_header("Transfer-Encoding") {
            self.set_header("Content-Length", self.body_len().to_string());
        }
    }
}

impl IRequest for HttpRequest {
    fn write_to(&mut self, writable: &mut dyn Writable, timeout_ms: i32) -> Result<()> {
        self.pre_process();

        let mut header = format!(
            "{} {} HTTP/{}.{}{CRLF}Host: {}{CRLF}",
            self.method.as_str(),
            self.uri,
            self.version.0,
            self.version.1,
            self.host,
        );
        for (key, value) in &self.headers {
            header.push_str(&format!("{key}: {value}{CRLF}"));
        }
        header.push_str(CRLF);

        writable.write_all(header.as_bytes(), timeout_ms)?;
        if !self.body.is_empty() {
            writable.write_all(&self.body, timeout_ms)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChunkData {
    extension: String,
    data: Vec<u8>,
}

impl ChunkData {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// An HTTP response, parsed incrementally off a [`Readable`].
pub struct HttpResponse {
    code: u16,
    reason: String,
    version: HttpVersion,
    headers: HttpHeaders,
    is_chunked: bool,
    body: Vec<u8>,
    chunks: Vec<ChunkData>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            code: 200,
            reason: String::new(),
            version: DEFAULT_VERSION,
            headers: HttpHeaders::new(),
            is_chunked: false,
            body: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    pub fn is_chunked(&self) -> bool {
        self.is_chunked
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn chunks(&self) -> &[ChunkData] {
        &self.chunks
    }

    fn read_line_string(readable: &mut dyn Readable, timeout_ms: i32) -> Result<String> {
        let mut buf = vec![0u8; MAX_HEADER_LINE];
        let n = readable.read_line(&mut buf, timeout_ms)?;
        if n == 0 {
            return Err(WrpcError::new(Code::RecvFail));
        }
        buf.truncate(n);
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        String::from_utf8(buf).map_err(|_| WrpcError::new(Code::ParseMessageFail))
    }

    fn read_header(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()> {
        loop {
            let line = Self::read_line_string(readable, timeout_ms)?;
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((key, value)) => {
                    self.headers
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => continue,
            }
        }
        Ok(())
    }

    fn read_normal_body(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()> {
        let len: usize = self
            .get_header("Content-Length")
            .unwrap_or("0")
            .parse()
            .map_err(|_| WrpcError::new(Code::ParseMessageFail))?;
        if len == 0 {
            return Ok(());
        }
        self.body = vec![0u8; len];
        let n = readable.read(&mut self.body, timeout_ms)?;
        if n != len {
            return Err(WrpcError::new(Code::RecvFail));
        }
        Ok(())
    }

    fn read_one_chunk(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<usize> {
        let line = Self::read_line_string(readable, timeout_ms)?;
        let (size_part, extension) = line
            .split_once(';')
            .map(|(s, e)| (s, e.to_string()))
            .unwrap_or((line.as_str(), String::new()));
        let size = usize::from_str_radix(size_part.trim(), 16)
            .map_err(|_| WrpcError::new(Code::MessageNotMatch))?;
        if size == 0 {
            // trailing CRLF after the zero-length terminator chunk.
            Self::read_line_string(readable, timeout_ms)?;
            return Ok(0);
        }
        let mut data = vec![0u8; size + 2];
        let n = readable.read(&mut data, timeout_ms)?;
        if n != size + 2 {
            return Err(WrpcError::new(Code::RecvFail));
        }
        data.truncate(size);
        self.chunks.push(ChunkData { extension, data });
        Ok(size)
    }

    fn read_chunked_body(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()> {
        loop {
            if self.read_one_chunk(readable, timeout_ms)? == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl IResponse for HttpResponse {
    fn read_from(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()> {
        self.headers.clear();
        self.body.clear();
        self.chunks.clear();
        self.is_chunked = false;

        let status_line = Self::read_line_string(readable, timeout_ms)?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().unwrap_or_default();
        let reason = parts.next().unwrap_or_default();

        let version = version
            .strip_prefix("HTTP/")
            .ok_or_else(|| WrpcError::new(Code::MessageNotMatch))?;
        let (major, minor) = version
            .split_once('.')
            .ok_or_else(|| WrpcError::new(Code::MessageNotMatch))?;
        self.version = (
            major
                .parse()
                .map_err(|_| WrpcError::new(Code::MessageNotMatch))?,
            minor
                .parse()
                .map_err(|_| WrpcError::new(Code::MessageNotMatch))?,
        );
        self.code = code
            .parse()
            .map_err(|_| WrpcError::new(Code::MessageNotMatch))?;
        self.reason = reason.to_string();

        self.read_header(readable, timeout_ms)?;

        if self.has_header("Content-Length") {
            self.read_normal_body(readable, timeout_ms)
        } else if self.get_header("Transfer-Encoding") == Some("chunked") {
            self.is_chunked = true;
            self.read_chunked_body(readable, timeout_ms)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{MemoryReader, MemoryWriter};

    #[test]
    fn request_serializes_method_line_headers_and_body() {
        let mut req = HttpRequest::new(HttpMethod::Post);
        req.set_uri("/v1/echo");
        req.set_host("example.com");
        req.set_content_type("application/json");
        req.append_body(b"{}");

        let mut out = MemoryWriter::default();
        req.write_to(&mut out, -1).unwrap();
        let text = String::from_utf8(out.written).unwrap();
        assert!(text.starts_with("POST /v1/echo HTTP/1.1\r\nHost: example.com\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.ends_with("\r\n\r\n{}"));
    }

    #[test]
    fn response_parses_status_line_headers_and_fixed_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nX-Test: yes\r\n\r\nhello";
        let mut reader = MemoryReader::new(raw.to_vec());
        let mut resp = HttpResponse::new();
        resp.read_from(&mut reader, -1).unwrap();

        assert_eq!(resp.code(), 200);
        assert_eq!(resp.reason(), "OK");
        assert_eq!(resp.get_header("X-Test"), Some("yes"));
        assert_eq!(resp.body(), b"hello");
        assert!(!resp.is_chunked());
    }

    #[test]
    fn response_parses_chunked_body_into_chunk_list() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut reader = MemoryReader::new(raw.to_vec());
        let mut resp = HttpResponse::new();
        resp.read_from(&mut reader, -1).unwrap();

        assert!(resp.is_chunked());
        assert_eq!(resp.chunks().len(), 2);
        assert_eq!(resp.chunks()[0].data(), b"Wiki");
        assert_eq!(resp.chunks()[1].data(), b"pedia");
    }

    #[test]
    fn malformed_status_line_is_message_not_match() {
        let mut reader = MemoryReader::new(b"garbage\r\n".to_vec());
        let mut resp = HttpResponse::new();
        let err = resp.read_from(&mut reader, -1).unwrap_err();
        assert_eq!(err.code, Code::MessageNotMatch);
    }
}
