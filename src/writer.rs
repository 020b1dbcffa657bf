use crate::{OPAQUE, Result, STR_I, WbxmlError};

/// Byte sink for a WBXML token stream
pub struct TokenWriter {
    buf: Vec<u8>,
}

impl TokenWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Write a single byte
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a multi-byte unsigned integer: 7 bits per byte, most significant
    /// group first, continuation bit on every byte but the last.
    pub fn write_mb_u_int32(&mut self, value: u32) {
        let mut groups = [0u8; 5];
        let mut count = 0;
        let mut v = value;
        loop {
            groups[count] = (v & 0x7F) as u8;
            count += 1;
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        for i in (0..count).rev() {
            let continuation = if i > 0 { 0x80 } else { 0x00 };
            self.buf.push(groups[i] | continuation);
        }
    }

    /// Write a null-terminated string
    pub fn write_cstring(&mut self, value: &str) -> Result<()> {
        if let Some(pos) = value.bytes().position(|b| b == 0) {
            return Err(WbxmlError::Encoding(format!(
                "string contains a NUL byte at position {pos}"
            )));
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    /// Write a length-prefixed byte sequence
    pub fn write_length_prefixed(&mut self, data: &[u8]) -> Result<()> {
        let length = u32::try_from(data.len()).map_err(|_| {
            WbxmlError::Encoding(format!("{} bytes do not fit a length prefix", data.len()))
        })?;
        self.write_mb_u_int32(length);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Write STR_I followed by the inline string
    pub fn write_inline_string(&mut self, value: &str) -> Result<()> {
        self.write_u8(STR_I);
        self.write_cstring(value)
    }

    /// Write OPAQUE followed by the length-prefixed data
    pub fn write_opaque(&mut self, data: &[u8]) -> Result<()> {
        self.write_u8(OPAQUE);
        self.write_length_prefixed(data)
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for TokenWriter {
    fn default() -> Self {
        Self::new()
    }
}
