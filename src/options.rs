use base64::Engine;

use crate::WBXML_VERSION_1_3;
use crate::activesync::ACTIVESYNC;
use crate::code_page::Profile;

/// How the decoder lays out the XML it writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputForm {
    /// No whitespace added between markup
    #[default]
    Compact,
    /// Element-only content indented by `DecoderOptions::indent` spaces
    Pretty,
}

/// Character sets understood in the WBXML header and for XML output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    UsAscii,
    Latin1,
}

impl Charset {
    /// IANA MIBenum value written in the WBXML header
    pub fn mib_enum(self) -> u32 {
        match self {
            Charset::Utf8 => 106,
            Charset::UsAscii => 3,
            Charset::Latin1 => 4,
        }
    }

    pub fn from_mib_enum(mib: u32) -> Option<Self> {
        match mib {
            106 => Some(Charset::Utf8),
            3 => Some(Charset::UsAscii),
            4 => Some(Charset::Latin1),
            _ => None,
        }
    }

    /// Name used in the XML declaration
    pub fn xml_name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    pub fn can_encode(self, c: char) -> bool {
        match self {
            Charset::Utf8 => true,
            Charset::UsAscii => c.is_ascii(),
            Charset::Latin1 => (c as u32) <= 0xFF,
        }
    }
}

/// Text form of OPAQUE data inside XML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpaqueEncoding {
    #[default]
    Base64,
    Hex,
}

impl OpaqueEncoding {
    pub fn encode(self, data: &[u8]) -> String {
        match self {
            OpaqueEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(data),
            OpaqueEncoding::Hex => hex::encode_upper(data),
        }
    }

    /// Inverse of [`OpaqueEncoding::encode`]; `None` unless `text` is exactly
    /// what `encode` writes for the decoded bytes.
    pub fn decode(self, text: &str) -> Option<Vec<u8>> {
        let data = match self {
            OpaqueEncoding::Base64 => base64::engine::general_purpose::STANDARD.decode(text).ok(),
            OpaqueEncoding::Hex => hex::decode(text).ok(),
        }?;
        (self.encode(&data) == text).then_some(data)
    }
}

/// XML to WBXML settings
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub language: &'static Profile,
    pub version: u8,
    /// Write the language's public identifier instead of "unknown"
    pub include_public_id: bool,
    /// Store literal names and repeated text in a string table
    pub use_string_table: bool,
    /// Keep whitespace-only text and leading/trailing blanks
    pub preserve_whitespace: bool,
    pub opaque_encoding: OpaqueEncoding,
    pub max_depth: usize,
}

impl EncoderOptions {
    /// ActiveSync settings: no public identifier, no string table,
    /// whitespace preserved.
    pub fn activesync() -> Self {
        Self {
            language: &ACTIVESYNC,
            version: WBXML_VERSION_1_3,
            include_public_id: false,
            use_string_table: false,
            preserve_whitespace: true,
            opaque_encoding: OpaqueEncoding::Base64,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self::activesync()
    }
}

/// WBXML to XML settings
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Language used to resolve tokens, whatever the stream's public identifier says
    pub language: &'static Profile,
    pub output_form: OutputForm,
    pub indent: usize,
    pub charset: Charset,
    pub preserve_whitespace: bool,
    pub opaque_encoding: OpaqueEncoding,
    pub max_depth: usize,
}

impl DecoderOptions {
    /// ActiveSync settings: compact UTF-8 output, whitespace preserved.
    pub fn activesync() -> Self {
        Self {
            language: &ACTIVESYNC,
            output_form: OutputForm::Compact,
            indent: 2,
            charset: Charset::Utf8,
            preserve_whitespace: true,
            opaque_encoding: OpaqueEncoding::Base64,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self::activesync()
    }
}

pub(crate) const DEFAULT_MAX_DEPTH: usize = 256;

/// Whitespace policy applied to text when blanks are not preserved:
/// whitespace-only text disappears, other text loses leading and trailing blanks.
pub(crate) fn normalize_text(text: &str, preserve_whitespace: bool) -> Option<&str> {
    if preserve_whitespace {
        return (!text.is_empty()).then_some(text);
    }
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activesync_defaults() {
        let options = EncoderOptions::default();
        assert!(!options.include_public_id);
        assert!(!options.use_string_table);
        assert!(options.preserve_whitespace);
        assert_eq!(options.version, 0x03);
        assert_eq!(options.language.name, "ActiveSync");

        let options = DecoderOptions::default();
        assert_eq!(options.output_form, OutputForm::Compact);
        assert_eq!(options.charset, Charset::Utf8);
    }

    #[test]
    fn test_charset_mib_enum() {
        assert_eq!(Charset::Utf8.mib_enum(), 0x6A);
        assert_eq!(Charset::from_mib_enum(4), Some(Charset::Latin1));
        assert_eq!(Charset::from_mib_enum(17), None);
        assert!(Charset::Latin1.can_encode('é'));
        assert!(!Charset::UsAscii.can_encode('é'));
    }

    #[test]
    fn test_opaque_encoding() {
        let data = [0x01, 0xAB, 0xFF];
        assert_eq!(OpaqueEncoding::Hex.encode(&data), "01ABFF");
        assert_eq!(OpaqueEncoding::Base64.encode(&data), "Aav/");
        assert_eq!(OpaqueEncoding::Hex.decode("01ABFF").unwrap(), data);
        assert_eq!(OpaqueEncoding::Base64.decode("Aav/").unwrap(), data);
        // Anything that would not come back byte for byte stays text
        assert!(OpaqueEncoding::Hex.decode("01abff").is_none());
        assert!(OpaqueEncoding::Base64.decode(" Aav/\n").is_none());
        assert!(OpaqueEncoding::Base64.decode("not base64!").is_none());
        assert!(OpaqueEncoding::Hex.decode("xyz").is_none());
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("\n  \t", true), Some("\n  \t"));
        assert_eq!(normalize_text("\n  \t", false), None);
        assert_eq!(normalize_text("  a b ", false), Some("a b"));
        assert_eq!(normalize_text("", true), None);
    }
}
