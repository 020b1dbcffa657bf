//! WBXML string table.
//!
//! The table is a block of null-terminated strings that follows the header.
//! `STR_T` and `LITERAL` tokens reference a string by its byte offset.

use std::collections::HashMap;

use crate::{Result, WbxmlError};

/// Read-side view of a string table
pub struct StringTable<'a> {
    data: &'a [u8],
}

impl<'a> StringTable<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn empty() -> Self {
        Self { data: &[] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes of the string starting at `offset`, up to the next NUL.
    pub fn get(&self, offset: u32) -> Result<&'a [u8]> {
        let start = offset as usize;
        let rest = self
            .data
            .get(start..)
            .filter(|rest| !rest.is_empty())
            .ok_or(WbxmlError::InvalidStringTableOffset(offset))?;
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(WbxmlError::InvalidStringTableOffset(offset))?;
        Ok(&rest[..end])
    }
}

/// Deduplicating string table builder used while encoding
#[derive(Default)]
pub struct StringTableBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl StringTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of `value`, adding it on first use
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        if let Some(&offset) = self.offsets.get(value) {
            return Ok(offset);
        }
        if value.as_bytes().contains(&0) {
            return Err(WbxmlError::Encoding(format!(
                "string table entry {value:?} contains a NUL byte"
            )));
        }
        let offset = u32::try_from(self.data.len())
            .map_err(|_| WbxmlError::Encoding("string table exceeds 4 GiB".to_string()))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.offsets.insert(value.to_string(), offset);
        Ok(offset)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.offsets.contains_key(value)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_deduplicates() {
        let mut builder = StringTableBuilder::new();
        assert_eq!(builder.intern("abc").unwrap(), 0);
        assert_eq!(builder.intern("de").unwrap(), 4);
        assert_eq!(builder.intern("abc").unwrap(), 0);
        assert!(builder.contains("de"));
        assert_eq!(builder.as_bytes(), b"abc\0de\0");
        assert!(builder.intern("x\0y").is_err());
    }

    #[test]
    fn test_lookup_by_offset() {
        let table = StringTable::new(b"abc\0de\0");
        assert_eq!(table.get(0).unwrap(), b"abc");
        assert_eq!(table.get(4).unwrap(), b"de");
        // Offsets may point into the middle of a string
        assert_eq!(table.get(1).unwrap(), b"bc");
        assert!(matches!(
            table.get(7).unwrap_err(),
            WbxmlError::InvalidStringTableOffset(7)
        ));
        assert!(StringTable::empty().get(0).is_err());
    }

    #[test]
    fn test_unterminated_entry() {
        let table = StringTable::new(b"abc");
        assert!(matches!(
            table.get(0).unwrap_err(),
            WbxmlError::InvalidStringTableOffset(0)
        ));
    }
}
