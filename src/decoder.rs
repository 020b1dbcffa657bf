//! WBXML to XML.

use tracing::{trace, warn};

use crate::dom::{Attribute, Document, Element, Node};
use crate::options::{Charset, DecoderOptions, normalize_text};
use crate::reader::TokenReader;
use crate::string_table::StringTable;
use crate::{
    END, ENTITY, EXT_0, EXT_2, EXT_I_0, EXT_I_2, EXT_T_0, EXT_T_2, FIRST_PAGE_TOKEN, LITERAL,
    LITERAL_A, LITERAL_AC, LITERAL_C, OPAQUE, PI, PUBLIC_ID_STRING_TABLE, PUBLIC_ID_UNKNOWN,
    Result, STR_I, STR_T, SWITCH_PAGE, TAG_HAS_ATTRIBUTES, TAG_HAS_CONTENT, TAG_TOKEN_MASK,
    WBXML_VERSION_1_3, WbxmlError, xml,
};

/// MIBenum written by encoders that do not know the charset
const CHARSET_UNKNOWN: u32 = 0;

/// Decodes WBXML streams with one fixed set of options.
///
/// Tokens are always resolved against `options.language`, whatever public
/// identifier the stream announces.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    options: DecoderOptions,
}

impl Decoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Decode `wbxml` and serialise the result as XML text.
    ///
    /// # Examples
    ///
    /// ```
    /// use wbxml::{Decoder, DecoderOptions};
    ///
    /// let decoder = Decoder::new(DecoderOptions::activesync());
    /// let xml = decoder.decode(&[0x03, 0x01, 0x6A, 0x00, 0x05]).unwrap();
    /// assert!(String::from_utf8(xml).unwrap().ends_with(r#"<Sync xmlns="AirSync:"/>"#));
    /// ```
    pub fn decode(&self, wbxml: &[u8]) -> Result<Vec<u8>> {
        let document = self.decode_document(wbxml)?;
        xml::write_document(&document, self.options.language, &self.options)
    }

    /// Decode `wbxml` into a document tree.
    pub fn decode_document(&self, wbxml: &[u8]) -> Result<Document> {
        let mut reader = TokenReader::new(wbxml);

        let version = reader.read_u8()?;
        if version > WBXML_VERSION_1_3 {
            return Err(WbxmlError::UnsupportedVersion(version));
        }
        let public_id = reader.read_mb_u_int32()?;
        let public_id_index = if public_id == PUBLIC_ID_STRING_TABLE {
            Some(reader.read_mb_u_int32()?)
        } else {
            None
        };
        let charset = match reader.read_mb_u_int32()? {
            CHARSET_UNKNOWN => Charset::Utf8,
            mib => Charset::from_mib_enum(mib).ok_or_else(|| {
                WbxmlError::Decoding(format!("unsupported charset MIBenum {mib}"))
            })?,
        };
        let table = StringTable::new(reader.read_length_prefixed()?);

        let language = self.options.language;
        match public_id_index {
            Some(index) => {
                let fpi = table.get(index)?;
                if fpi != language.fpi.as_bytes() {
                    warn!(
                        public_id = %String::from_utf8_lossy(fpi),
                        language = language.name,
                        "public identifier does not match the language, decoding anyway"
                    );
                }
            }
            None if public_id != PUBLIC_ID_UNKNOWN && language.public_id != Some(public_id) => {
                warn!(
                    public_id,
                    language = language.name,
                    "public identifier does not match the language, decoding anyway"
                );
            }
            None => {}
        }

        let mut body = BodyDecoder {
            options: &self.options,
            reader,
            table,
            charset,
            tag_page: 0,
            attr_page: 0,
        };
        body.decode_body().map(Document::new)
    }
}

/// Decode `wbxml` with `options`.
pub fn decode(wbxml: &[u8], options: &DecoderOptions) -> Result<Vec<u8>> {
    Decoder::new(options.clone()).decode(wbxml)
}

struct BodyDecoder<'a> {
    options: &'a DecoderOptions,
    reader: TokenReader<'a>,
    table: StringTable<'a>,
    /// Character set of inline and string-table strings
    charset: Charset,
    tag_page: u8,
    attr_page: u8,
}

impl<'a> BodyDecoder<'a> {
    fn decode_body(&mut self) -> Result<Element> {
        while self.reader.peek_u8() == Some(SWITCH_PAGE) {
            self.reader.read_u8()?;
            self.switch_tag_page()?;
        }
        let token = self.reader.read_u8()?;
        let root = self.decode_element(token, 1)?;
        if !self.reader.is_eof() {
            return Err(WbxmlError::Decoding(format!(
                "unexpected data after the root element at offset {}",
                self.reader.position()
            )));
        }
        Ok(root)
    }

    fn decode_element(&mut self, token: u8, depth: usize) -> Result<Element> {
        if depth > self.options.max_depth {
            return Err(WbxmlError::LimitExceeded {
                limit: self.options.max_depth,
            });
        }

        let profile = self.options.language;
        let base = token & TAG_TOKEN_MASK;
        let mut element = if base == LITERAL {
            Element::new(self.read_literal_name()?)
        } else if base >= FIRST_PAGE_TOKEN {
            let name = profile
                .tag_name(self.tag_page, base)
                .ok_or(WbxmlError::UnknownToken {
                    token,
                    page: self.tag_page,
                    context: "tag",
                })?;
            let mut element = Element::new(name);
            element.namespace = profile.namespace(self.tag_page).map(str::to_string);
            element
        } else {
            return Err(WbxmlError::UnknownToken {
                token,
                page: self.tag_page,
                context: "tag",
            });
        };

        if token & TAG_HAS_ATTRIBUTES != 0 {
            self.decode_attributes(&mut element)?;
        }
        if token & TAG_HAS_CONTENT != 0 {
            self.decode_content(&mut element, depth)?;
        }
        Ok(element)
    }

    fn decode_attributes(&mut self, element: &mut Element) -> Result<()> {
        let profile = self.options.language;
        let mut current: Option<Attribute> = None;
        loop {
            let token = self.reader.read_u8()?;
            match token {
                END => break,
                SWITCH_PAGE => {
                    self.attr_page = self.reader.read_u8()?;
                    trace!(page = self.attr_page, "switching attribute code page");
                }
                LITERAL => {
                    element.attributes.extend(current.take());
                    current = Some(Attribute {
                        name: self.read_literal_name()?,
                        value: String::new(),
                    });
                }
                STR_I | STR_T | ENTITY | OPAQUE => {
                    let text = self.read_string_token(token)?;
                    attribute_value(&mut current)?.push_str(&text);
                }
                PI | LITERAL_A | LITERAL_C | LITERAL_AC | EXT_I_0..=EXT_I_2
                | EXT_T_0..=EXT_T_2 | EXT_0..=EXT_2 => {
                    return Err(WbxmlError::UnknownToken {
                        token,
                        page: self.attr_page,
                        context: "attribute",
                    });
                }
                token if token < 0x80 => {
                    let entry = profile.attr_start_by_token(self.attr_page, token).ok_or(
                        WbxmlError::UnknownToken {
                            token,
                            page: self.attr_page,
                            context: "attribute start",
                        },
                    )?;
                    element.attributes.extend(current.take());
                    current = Some(Attribute {
                        name: entry.name.to_string(),
                        value: entry.value_prefix.to_string(),
                    });
                }
                token => {
                    let entry = profile.attr_value_by_token(self.attr_page, token).ok_or(
                        WbxmlError::UnknownToken {
                            token,
                            page: self.attr_page,
                            context: "attribute value",
                        },
                    )?;
                    attribute_value(&mut current)?.push_str(entry.value);
                }
            }
        }
        element.attributes.extend(current);
        Ok(())
    }

    fn decode_content(&mut self, element: &mut Element, depth: usize) -> Result<()> {
        loop {
            let token = self.reader.read_u8()?;
            match token {
                END => break,
                SWITCH_PAGE => self.switch_tag_page()?,
                STR_I | STR_T | ENTITY | OPAQUE => {
                    let text = self.read_string_token(token)?;
                    element.push_text(text);
                }
                PI | EXT_I_0..=EXT_I_2 | EXT_T_0..=EXT_T_2 | EXT_0..=EXT_2 => {
                    return Err(WbxmlError::UnknownToken {
                        token,
                        page: self.tag_page,
                        context: "content",
                    });
                }
                token => {
                    let child = self.decode_element(token, depth + 1)?;
                    element.children.push(Node::Element(child));
                }
            }
        }

        if !self.options.preserve_whitespace {
            element.children.retain_mut(|node| match node {
                Node::Text(text) => match normalize_text(text, false) {
                    Some(trimmed) => {
                        *text = trimmed.to_string();
                        true
                    }
                    None => false,
                },
                _ => true,
            });
        }
        Ok(())
    }

    /// Text carried by STR_I, STR_T, ENTITY or OPAQUE
    fn read_string_token(&mut self, token: u8) -> Result<String> {
        match token {
            STR_I => {
                let bytes = self.reader.read_cstring()?;
                self.text(bytes)
            }
            STR_T => {
                let offset = self.reader.read_mb_u_int32()?;
                self.table_string(offset)
            }
            ENTITY => {
                let code = self.reader.read_mb_u_int32()?;
                char::from_u32(code).map(String::from).ok_or_else(|| {
                    WbxmlError::Decoding(format!("entity {code:#X} is not a character"))
                })
            }
            _ => {
                let data = self.reader.read_length_prefixed()?;
                Ok(self.options.opaque_encoding.encode(data))
            }
        }
    }

    /// Operand of a LITERAL token: an inline string when the stream has no
    /// string table, otherwise a string-table offset.
    fn read_literal_name(&mut self) -> Result<String> {
        if self.table.is_empty() {
            let bytes = self.reader.read_cstring()?;
            return self.text(bytes);
        }
        let offset = self.reader.read_mb_u_int32()?;
        self.table_string(offset)
    }

    fn table_string(&self, offset: u32) -> Result<String> {
        let bytes = self.table.get(offset)?;
        self.text(bytes)
    }

    fn text(&self, bytes: &[u8]) -> Result<String> {
        match self.charset {
            Charset::Latin1 => Ok(bytes.iter().copied().map(char::from).collect()),
            Charset::UsAscii if !bytes.is_ascii() => Err(WbxmlError::Decoding(format!(
                "string {:?} is not valid US-ASCII",
                String::from_utf8_lossy(bytes)
            ))),
            Charset::Utf8 | Charset::UsAscii => String::from_utf8(bytes.to_vec()).map_err(|e| {
                WbxmlError::Decoding(format!("string is not valid {}: {e}", self.charset.xml_name()))
            }),
        }
    }

    fn switch_tag_page(&mut self) -> Result<()> {
        self.tag_page = self.reader.read_u8()?;
        trace!(page = self.tag_page, "switching tag code page");
        Ok(())
    }
}

fn attribute_value(current: &mut Option<Attribute>) -> Result<&mut String> {
    current
        .as_mut()
        .map(|attr| &mut attr.value)
        .ok_or_else(|| WbxmlError::Decoding("attribute value without an attribute name".to_string()))
}
