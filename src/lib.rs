//! A codec between XML and WBXML (WAP Binary XML) for the ActiveSync language.
//!
//! Encoding walks a parsed XML document and replaces tag names with one-byte
//! tokens taken from the code pages of a [`Profile`]. Decoding reads such a
//! token stream back into a document and serialises it as XML text.
//!
//! # Examples
//!
//! ```
//! use wbxml::{decode, encode, DecoderOptions, EncoderOptions};
//!
//! let xml = br#"<Sync xmlns="AirSync"><Collections/></Sync>"#;
//! let binary = encode(xml, &EncoderOptions::default()).unwrap();
//! assert_eq!(binary, [0x03, 0x01, 0x6A, 0x00, 0x45, 0x1C, 0x01]);
//!
//! let text = decode(&binary, &DecoderOptions::default()).unwrap();
//! assert!(String::from_utf8(text).unwrap().ends_with(r#"<Sync xmlns="AirSync:"><Collections/></Sync>"#));
//! ```

use std::io;
use thiserror::Error;

mod activesync;
pub mod cli;
mod code_page;
mod converter;
mod decoder;
pub mod dom;
mod encoder;
mod options;
mod reader;
mod string_table;
mod writer;
pub mod xml;

pub use activesync::ACTIVESYNC;
pub use code_page::{
    AttrStartEntry, AttrValueEntry, CodePage, Profile, TagToken, lookup_profile, profiles,
};
pub use converter::{Converter, Direction};
pub use decoder::{Decoder, decode};
pub use encoder::{Encoder, encode};
pub use options::{Charset, DecoderOptions, EncoderOptions, OpaqueEncoding, OutputForm};
pub use reader::TokenReader;
pub use string_table::{StringTable, StringTableBuilder};
pub use writer::TokenWriter;

/// Error types for WBXML encoding and decoding
#[derive(Error, Debug)]
pub enum WbxmlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed XML: {0}")]
    MalformedXml(String),
    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(String),
    #[error("Unknown {context} token 0x{token:02X} on code page {page}")]
    UnknownToken {
        token: u8,
        page: u8,
        context: &'static str,
    },
    #[error("Stream truncated at offset {offset} while reading {wanted}")]
    TruncatedStream { offset: usize, wanted: &'static str },
    #[error("Unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("Unsupported WBXML version 0x{0:02X}")]
    UnsupportedVersion(u8),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Decoding error: {0}")]
    Decoding(String),
    #[error("Invalid string table offset: {0}")]
    InvalidStringTableOffset(u32),
    #[error("Element nesting exceeds the limit of {limit}")]
    LimitExceeded { limit: usize },
    #[error("Usage error: {0}")]
    Usage(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, WbxmlError>;

pub const ERROR_OK: u32 = 0;
pub const ERROR_MALFORMED_XML: u32 = 1;
pub const ERROR_UNSUPPORTED_CONSTRUCT: u32 = 2;
pub const ERROR_UNKNOWN_TOKEN: u32 = 3;
pub const ERROR_TRUNCATED_STREAM: u32 = 4;
pub const ERROR_UNTERMINATED_STRING: u32 = 5;
pub const ERROR_UNSUPPORTED_VERSION: u32 = 6;
pub const ERROR_ENCODING: u32 = 7;
pub const ERROR_DECODING: u32 = 8;
pub const ERROR_INVALID_STRING_TABLE_OFFSET: u32 = 9;
pub const ERROR_LIMIT_EXCEEDED: u32 = 10;
pub const ERROR_IO: u32 = 11;
pub const ERROR_USAGE: u32 = 12;

static ERROR_MESSAGES: &[(u32, &str)] = &[
    (ERROR_OK, "No error"),
    (ERROR_MALFORMED_XML, "Input is not well-formed XML"),
    (
        ERROR_UNSUPPORTED_CONSTRUCT,
        "XML construct cannot be represented in this language",
    ),
    (ERROR_UNKNOWN_TOKEN, "Token has no entry in the code page"),
    (ERROR_TRUNCATED_STREAM, "WBXML stream ended unexpectedly"),
    (ERROR_UNTERMINATED_STRING, "Inline string is not null-terminated"),
    (ERROR_UNSUPPORTED_VERSION, "WBXML version is not supported"),
    (ERROR_ENCODING, "Internal error while encoding"),
    (ERROR_DECODING, "Internal error while decoding"),
    (
        ERROR_INVALID_STRING_TABLE_OFFSET,
        "String table reference is out of range",
    ),
    (ERROR_LIMIT_EXCEEDED, "Document nesting is too deep"),
    (ERROR_IO, "Input/output failure"),
    (ERROR_USAGE, "Invalid command-line usage"),
];

/// Static description of an error code returned by [`WbxmlError::code`].
pub fn error_message(code: u32) -> &'static str {
    ERROR_MESSAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, message)| *message)
        .unwrap_or("Unknown error code")
}

impl WbxmlError {
    /// Numeric code of the error class.
    pub fn code(&self) -> u32 {
        match self {
            WbxmlError::Io(_) => ERROR_IO,
            WbxmlError::MalformedXml(_) => ERROR_MALFORMED_XML,
            WbxmlError::UnsupportedConstruct(_) => ERROR_UNSUPPORTED_CONSTRUCT,
            WbxmlError::UnknownToken { .. } => ERROR_UNKNOWN_TOKEN,
            WbxmlError::TruncatedStream { .. } => ERROR_TRUNCATED_STREAM,
            WbxmlError::UnterminatedString { .. } => ERROR_UNTERMINATED_STRING,
            WbxmlError::UnsupportedVersion(_) => ERROR_UNSUPPORTED_VERSION,
            WbxmlError::Encoding(_) => ERROR_ENCODING,
            WbxmlError::Decoding(_) => ERROR_DECODING,
            WbxmlError::InvalidStringTableOffset(_) => ERROR_INVALID_STRING_TABLE_OFFSET,
            WbxmlError::LimitExceeded { .. } => ERROR_LIMIT_EXCEEDED,
            WbxmlError::Usage(_) => ERROR_USAGE,
        }
    }

    /// Static description of this error's class.
    pub fn message(&self) -> &'static str {
        error_message(self.code())
    }

    /// True when the caller supplied bad input, false for internal or I/O failures.
    pub fn is_input_error(&self) -> bool {
        !matches!(
            self,
            WbxmlError::Io(_) | WbxmlError::Encoding(_) | WbxmlError::Decoding(_)
        )
    }
}

// WBXML versions (major - 1) << 4 | minor
pub const WBXML_VERSION_1_0: u8 = 0x00;
pub const WBXML_VERSION_1_1: u8 = 0x01;
pub const WBXML_VERSION_1_2: u8 = 0x02;
pub const WBXML_VERSION_1_3: u8 = 0x03;

// Public identifiers
pub const PUBLIC_ID_STRING_TABLE: u32 = 0x00;
pub const PUBLIC_ID_UNKNOWN: u32 = 0x01;

// Global tokens, shared by every code page
pub const SWITCH_PAGE: u8 = 0x00;
pub const END: u8 = 0x01;
pub const ENTITY: u8 = 0x02;
pub const STR_I: u8 = 0x03;
pub const LITERAL: u8 = 0x04;
pub const EXT_I_0: u8 = 0x40;
pub const EXT_I_1: u8 = 0x41;
pub const EXT_I_2: u8 = 0x42;
pub const PI: u8 = 0x43;
pub const LITERAL_C: u8 = 0x44;
pub const EXT_T_0: u8 = 0x80;
pub const EXT_T_1: u8 = 0x81;
pub const EXT_T_2: u8 = 0x82;
pub const STR_T: u8 = 0x83;
pub const LITERAL_A: u8 = 0x84;
pub const EXT_0: u8 = 0xC0;
pub const EXT_1: u8 = 0xC1;
pub const EXT_2: u8 = 0xC2;
pub const OPAQUE: u8 = 0xC3;
pub const LITERAL_AC: u8 = 0xC4;

// Tag token flags
pub const TAG_HAS_ATTRIBUTES: u8 = 0x80;
pub const TAG_HAS_CONTENT: u8 = 0x40;
pub const TAG_TOKEN_MASK: u8 = 0x3F;

/// Lowest token value a code page may assign to a tag or attribute start.
pub const FIRST_PAGE_TOKEN: u8 = 0x05;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_have_messages() {
        for code in ERROR_OK..=ERROR_USAGE {
            assert_ne!(error_message(code), "Unknown error code");
        }
        assert_eq!(error_message(999), "Unknown error code");
    }

    #[test]
    fn test_input_error_classes() {
        assert!(WbxmlError::UnsupportedVersion(9).is_input_error());
        assert!(
            WbxmlError::TruncatedStream {
                offset: 3,
                wanted: "charset"
            }
            .is_input_error()
        );
        assert!(!WbxmlError::Encoding("buffer".to_string()).is_input_error());
        assert!(WbxmlError::Usage("-i".to_string()).is_input_error());
        assert_eq!(
            WbxmlError::MalformedXml("x".to_string()).message(),
            "Input is not well-formed XML"
        );
    }
}
