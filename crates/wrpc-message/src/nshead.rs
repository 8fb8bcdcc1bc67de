//! The nshead framing used by a family of internal Baidu services: a fixed
//! 36-byte binary header (magic number, log id, body length, a provider tag)
//! immediately followed by an opaque body. Request and response share the
//! same wire type, since nshead itself doesn't distinguish direction.

use wrpc_core::{Code, Result, WrpcError};

use crate::io::{Readable, Writable};
use crate::message::{IRequest, IResponse};

/// The nshead magic number, `0xfb709394`.
pub const NSHEAD_MAGIC_NUM: u32 = 0xfb709394;

pub const NSHEAD_HEADER_LEN: usize = 36;

/// The fixed-size header preceding every nshead body. Serialized in native
/// byte order; nshead peers are assumed to share endianness.
#[derive(Debug, Clone, Copy, Default)]
pub struct NsheadHeader {
    pub id: u16,
    pub version: u16,
    pub log_id: u32,
    pub provider: [u8; 16],
    pub magic_num: u32,
    pub reserved: u32,
    pub body_len: u32,
}

impl NsheadHeader {
    fn to_bytes(self) -> [u8; NSHEAD_HEADER_LEN] {
        let mut out = [0u8; NSHEAD_HEADER_LEN];
        let mut offset = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let bytes = $bytes;
                out[offset..offset + bytes.len()].copy_from_slice(&bytes);
                offset += bytes.len();
            }};
        }
        put!(self.id.to_ne_bytes());
        put!(self.version.to_ne_bytes());
        put!(self.log_id.to_ne_bytes());
        put!(self.provider);
        put!(self.magic_num.to_ne_bytes());
        put!(self.reserved.to_ne_bytes());
        put!(self.body_len.to_ne_bytes());
        out
    }

    fn from_bytes(buf: &[u8; NSHEAD_HEADER_LEN]) -> Self {
        let mut offset = 0;
        macro_rules! take {
            ($ty:ty) => {{
                const N: usize = std::mem::size_of::<$ty>();
                let mut a = [0u8; N];
                a.copy_from_slice(&buf[offset..offset + N]);
                offset += N;
                <$ty>::from_ne_bytes(a)
            }};
        }
        let id = take!(u16);
        let version = take!(u16);
        let log_id = take!(u32);
        let mut provider = [0u8; 16];
        provider.copy_from_slice(&buf[offset..offset + 16]);
        offset += 16;
        let magic_num = take!(u32);
        let reserved = take!(u32);
        let body_len = take!(u32);
        Self {
            id,
            version,
            log_id,
            provider,
            magic_num,
            reserved,
            body_len,
        }
    }
}

/// An nshead message: the fixed header plus an opaque body buffer. Used as
/// both request and response, since nshead framing doesn't distinguish them.
#[derive(Default)]
pub struct NsheadMessage {
    header: NsheadHeader,
    buffer: Vec<u8>,
}

impl NsheadMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            header: NsheadHeader::default(),
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn header(&self) -> &NsheadHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut NsheadHeader {
        &mut self.header
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn append(&mut self, buf: &[u8]) {
        self.buffer.extend_from_slice(buf);
    }

    pub fn body(&self) -> &[u8] {
        &self.buffer
    }
}

impl IRequest for NsheadMessage {
    fn write_to(&mut self, writable: &mut dyn Writable, timeout_ms: i32) -> Result<()> {
        if self.buffer.is_empty() {
            return Err(WrpcError::new(Code::InvalidArgument));
        }
        self.header.body_len = self.buffer.len() as u32;
        self.header.magic_num = NSHEAD_MAGIC_NUM;

        writable.write_all(&self.header.to_bytes(), timeout_ms)?;
        writable.write_all(&self.buffer, timeout_ms)
    }
}

impl IResponse for NsheadMessage {
    fn read_from(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()> {
        let mut header_buf = [0u8; NSHEAD_HEADER_LEN];
        let n = readable.read(&mut header_buf, timeout_ms)?;
        if n != NSHEAD_HEADER_LEN {
            return Err(WrpcError::new(Code::RecvFail));
        }
        self.header = NsheadHeader::from_bytes(&header_buf);
        if self.header.magic_num != NSHEAD_MAGIC_NUM {
            return Err(WrpcError::new(Code::MessageNotMatch));
        }

        self.clear();
        let body_len = self.header.body_len as usize;
        self.buffer = vec![0u8; body_len];
        if body_len > 0 {
            let n = readable.read(&mut self.buffer, timeout_ms)?;
            if n != body_len {
                return Err(WrpcError::new(Code::RecvFail));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{MemoryReader, MemoryWriter};

    #[test]
    fn round_trips_header_and_body() {
        let mut msg = NsheadMessage::new();
        msg.header_mut().log_id = 42;
        msg.append(b"payload");

        let mut out = MemoryWriter::default();
        msg.write_to(&mut out, -1).unwrap();
        assert_eq!(out.written.len(), NSHEAD_HEADER_LEN + 7);

        let mut reader = MemoryReader::new(out.written);
        let mut received = NsheadMessage::new();
        received.read_from(&mut reader, -1).unwrap();

        assert_eq!(received.header().log_id, 42);
        assert_eq!(received.header().magic_num, NSHEAD_MAGIC_NUM);
        assert_eq!(received.body(), b"payload");
    }

    #[test]
    fn empty_body_is_invalid_argument_on_write() {
        let mut msg = NsheadMessage::new();
        let mut out = MemoryWriter::default();
        let err = msg.write_to(&mut out, -1).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[test]
    fn magic_number_mismatch_is_rejected() {
        let mut header = NsheadHeader::default();
        header.magic_num = 0xdeadbeef;
        header.body_len = 0;
        let mut reader = MemoryReader::new(header.to_bytes().to_vec());
        let mut msg = NsheadMessage::new();
        let err = msg.read_from(&mut reader, -1).unwrap_err();
        assert_eq!(err.code, Code::MessageNotMatch);
    }
}
