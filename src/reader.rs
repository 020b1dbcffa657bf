use crate::{Result, WbxmlError};

/// Bounds-checked reader over a WBXML byte buffer
pub struct TokenReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> TokenReader<'a> {
    /// Create a new reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn truncated(&self, wanted: &'static str) -> WbxmlError {
        WbxmlError::TruncatedStream {
            offset: self.position,
            wanted,
        }
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self.peek_u8().ok_or_else(|| self.truncated("byte"))?;
        self.position += 1;
        Ok(byte)
    }

    /// Look at the next byte without consuming it
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    /// Read a multi-byte unsigned integer
    pub fn read_mb_u_int32(&mut self) -> Result<u32> {
        let start = self.position;
        let mut value: u32 = 0;
        loop {
            let Some(&byte) = self.data.get(self.position) else {
                self.position = start;
                return Err(WbxmlError::TruncatedStream {
                    offset: start,
                    wanted: "mb_u_int32",
                });
            };
            if value > (u32::MAX >> 7) {
                return Err(WbxmlError::Decoding(format!(
                    "mb_u_int32 at offset {start} overflows 32 bits"
                )));
            }
            self.position += 1;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Read a null-terminated string, returning its bytes without the terminator
    pub fn read_cstring(&mut self) -> Result<&'a [u8]> {
        let data = self.data;
        let start = self.position;
        let rest = &data[start..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(WbxmlError::UnterminatedString { offset: start })?;
        self.position += end + 1;
        Ok(&rest[..end])
    }

    /// Read a byte array of specified length
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.truncated("bytes"))?;
        let data = self.data;
        let bytes = &data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read a length-prefixed byte array
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let length = self.read_mb_u_int32()?;
        self.read_bytes(length as usize)
    }

    /// Get current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if we've reached the end of the buffer
    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_mb_u_int32() {
        let mut reader = TokenReader::new(&[0x82, 0x2C, 0x6A, 0x81, 0x00]);
        assert_eq!(reader.read_mb_u_int32().unwrap(), 300);
        assert_eq!(reader.read_mb_u_int32().unwrap(), 0x6A);
        assert_eq!(reader.read_mb_u_int32().unwrap(), 128);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_truncated_mb_u_int32() {
        let mut reader = TokenReader::new(&[0x03, 0x82]);
        reader.read_u8().unwrap();
        let err = reader.read_mb_u_int32().unwrap_err();
        assert!(matches!(
            err,
            WbxmlError::TruncatedStream {
                offset: 1,
                wanted: "mb_u_int32"
            }
        ));
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_mb_u_int32_overflow() {
        let mut reader = TokenReader::new(&[0x90, 0x80, 0x80, 0x80, 0x00]);
        assert!(matches!(
            reader.read_mb_u_int32().unwrap_err(),
            WbxmlError::Decoding(_)
        ));
        let mut reader = TokenReader::new(&[0x8F, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(reader.read_mb_u_int32().unwrap(), u32::MAX);
    }

    #[test]
    fn test_read_cstring() {
        let mut reader = TokenReader::new(b"Sync\0abc");
        assert_eq!(reader.read_cstring().unwrap(), b"Sync");
        assert_eq!(reader.position(), 5);
        assert!(matches!(
            reader.read_cstring().unwrap_err(),
            WbxmlError::UnterminatedString { offset: 5 }
        ));
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_read_bytes_is_bounds_checked() {
        let mut reader = TokenReader::new(&[0x03, 0xAA, 0xBB]);
        assert!(matches!(
            reader.read_length_prefixed().unwrap_err(),
            WbxmlError::TruncatedStream { .. }
        ));
        let mut reader = TokenReader::new(&[0x02, 0xAA, 0xBB]);
        assert_eq!(reader.read_length_prefixed().unwrap(), [0xAA, 0xBB]);
        assert!(reader.read_u8().is_err());
        assert!(reader.read_bytes(usize::MAX).is_err());
    }
}
