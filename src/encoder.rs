//! XML to WBXML.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::code_page::TagToken;
use crate::dom::{Attribute, Document, Element, Node};
use crate::options::{Charset, EncoderOptions, normalize_text};
use crate::string_table::StringTableBuilder;
use crate::writer::TokenWriter;
use crate::{
    END, LITERAL, PUBLIC_ID_STRING_TABLE, PUBLIC_ID_UNKNOWN, Result, STR_T, SWITCH_PAGE,
    TAG_HAS_ATTRIBUTES, TAG_HAS_CONTENT, WBXML_VERSION_1_3, WbxmlError, xml,
};

/// Shortest text worth sharing through the string table
const MIN_SHARED_TEXT_LEN: usize = 4;

/// Encodes XML documents with one fixed set of options.
///
/// An `Encoder` holds no per-call state and may be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    options: EncoderOptions,
}

impl Encoder {
    pub fn new(options: EncoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Parse `xml` and encode it.
    ///
    /// # Examples
    ///
    /// ```
    /// use wbxml::{Encoder, EncoderOptions};
    ///
    /// let encoder = Encoder::new(EncoderOptions::activesync());
    /// let wbxml = encoder.encode(br#"<Sync xmlns="AirSync"/>"#).unwrap();
    /// assert_eq!(wbxml, [0x03, 0x01, 0x6A, 0x00, 0x05]);
    /// ```
    pub fn encode(&self, xml: &[u8]) -> Result<Vec<u8>> {
        let document = xml::parse_document(xml, self.options.language, self.options.max_depth)?;
        self.encode_document(&document)
    }

    /// Encode an already parsed document.
    pub fn encode_document(&self, document: &Document) -> Result<Vec<u8>> {
        let options = &self.options;
        if options.version > WBXML_VERSION_1_3 {
            return Err(WbxmlError::UnsupportedVersion(options.version));
        }

        let mut table = StringTableBuilder::new();
        let public_id = match (options.include_public_id, options.language.public_id) {
            (false, _) => PublicId::Numeric(PUBLIC_ID_UNKNOWN),
            (true, Some(id)) => PublicId::Numeric(id),
            (true, None) => PublicId::Indexed(table.intern(options.language.fpi)?),
        };

        let shared_text = if options.use_string_table {
            shared_text(&document.root, options.preserve_whitespace)
        } else {
            HashSet::new()
        };

        let mut body = BodyEncoder {
            options,
            literals_in_table: options.use_string_table || !table.is_empty(),
            table,
            shared_text,
            writer: TokenWriter::new(),
            tag_page: 0,
            attr_page: 0,
        };
        body.encode_element(&document.root, 1)?;
        let BodyEncoder { table, writer, .. } = body;
        let body = writer.into_inner();

        let mut out = TokenWriter::with_capacity(body.len() + table.as_bytes().len() + 8);
        out.write_u8(options.version);
        match public_id {
            PublicId::Numeric(id) => out.write_mb_u_int32(id),
            PublicId::Indexed(index) => {
                out.write_mb_u_int32(PUBLIC_ID_STRING_TABLE);
                out.write_mb_u_int32(index);
            }
        }
        out.write_mb_u_int32(Charset::Utf8.mib_enum());
        out.write_length_prefixed(table.as_bytes())?;
        out.write_bytes(&body);
        Ok(out.into_inner())
    }
}

/// Encode `xml` with `options`.
pub fn encode(xml: &[u8], options: &EncoderOptions) -> Result<Vec<u8>> {
    Encoder::new(options.clone()).encode(xml)
}

enum PublicId {
    Numeric(u32),
    Indexed(u32),
}

/// Child of an element after comments are dropped and the whitespace policy applied
enum Content<'d> {
    Element(&'d Element),
    Text(&'d str),
}

/// Text that occurs more than once in the document and is long enough to share
fn shared_text(root: &Element, preserve_whitespace: bool) -> HashSet<&str> {
    fn count<'d>(element: &'d Element, preserve: bool, counts: &mut HashMap<&'d str, usize>) {
        for child in &element.children {
            match child {
                Node::Element(child) => count(child, preserve, counts),
                Node::Text(text) => {
                    if let Some(text) = normalize_text(text, preserve)
                        && text.len() >= MIN_SHARED_TEXT_LEN
                    {
                        *counts.entry(text).or_default() += 1;
                    }
                }
                Node::Comment(_) => {}
            }
        }
    }

    let mut counts = HashMap::new();
    count(root, preserve_whitespace, &mut counts);
    counts
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .map(|(text, _)| text)
        .collect()
}

struct BodyEncoder<'a> {
    options: &'a EncoderOptions,
    table: StringTableBuilder,
    /// LITERAL names are string-table offsets rather than inline strings
    literals_in_table: bool,
    shared_text: HashSet<&'a str>,
    writer: TokenWriter,
    tag_page: u8,
    attr_page: u8,
}

impl<'a> BodyEncoder<'a> {
    fn encode_element(&mut self, element: &'a Element, depth: usize) -> Result<()> {
        if depth > self.options.max_depth {
            return Err(WbxmlError::LimitExceeded {
                limit: self.options.max_depth,
            });
        }

        let preserve = self.options.preserve_whitespace;
        let content: Vec<Content<'a>> = element
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Element(child) => Some(Content::Element(child)),
                Node::Text(text) => normalize_text(text, preserve).map(Content::Text),
                Node::Comment(_) => None,
            })
            .collect();

        let mut flags = 0;
        if !element.attributes.is_empty() {
            flags |= TAG_HAS_ATTRIBUTES;
        }
        if !content.is_empty() {
            flags |= TAG_HAS_CONTENT;
        }

        let profile = self.options.language;
        let tag = profile.tag_token(element.namespace.as_deref(), &element.name, self.tag_page);
        match tag {
            Some(tag) => {
                self.switch_tag_page(tag.page);
                self.writer.write_u8(tag.token | flags);
            }
            None => {
                debug!(element = %element.name, namespace = ?element.namespace, "no tag token, writing literal");
                self.writer.write_u8(LITERAL | flags);
                self.write_name(&element.name)?;
            }
        }

        if !element.attributes.is_empty() {
            for attr in &element.attributes {
                self.encode_attribute(attr)?;
            }
            self.writer.write_u8(END);
        }

        if content.is_empty() {
            return Ok(());
        }
        match tag.and_then(|tag| self.opaque_data(tag, &element.name, &content)) {
            Some(data) => self.writer.write_opaque(&data)?,
            None => {
                for item in content {
                    match item {
                        Content::Element(child) => self.encode_element(child, depth + 1)?,
                        Content::Text(text) => self.encode_text(text)?,
                    }
                }
            }
        }
        self.writer.write_u8(END);
        Ok(())
    }

    /// Binary content of an opaque tag, if its text is in the configured encoding
    fn opaque_data(&self, tag: TagToken, name: &str, content: &[Content<'_>]) -> Option<Vec<u8>> {
        if !self.options.language.is_opaque(tag) {
            return None;
        }
        let encoding = self.options.opaque_encoding;
        let data = match content {
            [Content::Text(text)] => encoding.decode(text),
            _ => None,
        };
        if data.is_none() {
            debug!(element = name, ?encoding, "opaque content is not encoded data, writing a string");
        }
        data
    }

    fn encode_attribute(&mut self, attr: &Attribute) -> Result<()> {
        let profile = self.options.language;
        let value = match profile.attr_start(&attr.name, &attr.value, self.attr_page) {
            Some(start) => {
                self.switch_attr_page(start.page);
                self.writer.write_u8(start.token);
                &attr.value[start.value_prefix.len()..]
            }
            None => {
                debug!(attribute = %attr.name, "no attribute token, writing literal");
                self.writer.write_u8(LITERAL);
                self.write_name(&attr.name)?;
                attr.value.as_str()
            }
        };
        if value.is_empty() {
            return Ok(());
        }
        match profile.attr_value(value, self.attr_page) {
            Some(entry) => {
                self.switch_attr_page(entry.page);
                self.writer.write_u8(entry.token);
                Ok(())
            }
            None => self.encode_text(value),
        }
    }

    fn encode_text(&mut self, text: &str) -> Result<()> {
        if self.shared_text.contains(text) {
            let offset = self.table.intern(text)?;
            self.writer.write_u8(STR_T);
            self.writer.write_mb_u_int32(offset);
            return Ok(());
        }
        self.writer.write_inline_string(text)
    }

    /// Operand of a LITERAL token
    fn write_name(&mut self, name: &str) -> Result<()> {
        if self.literals_in_table {
            let offset = self.table.intern(name)?;
            self.writer.write_mb_u_int32(offset);
            Ok(())
        } else {
            self.writer.write_cstring(name)
        }
    }

    fn switch_tag_page(&mut self, page: u8) {
        if page != self.tag_page {
            trace!(from = self.tag_page, to = page, "switching tag code page");
            self.writer.write_u8(SWITCH_PAGE);
            self.writer.write_u8(page);
            self.tag_page = page;
        }
    }

    fn switch_attr_page(&mut self, page: u8) {
        if page != self.attr_page {
            trace!(from = self.attr_page, to = page, "switching attribute code page");
            self.writer.write_u8(SWITCH_PAGE);
            self.writer.write_u8(page);
            self.attr_page = page;
        }
    }
}
