//! XML text to [`Document`] and back, on top of quick-xml.
//!
//! Namespace declarations are resolved while parsing and are not kept as
//! attributes. The serialiser writes `xmlns` only where an element's
//! namespace differs from the one in scope.

use std::borrow::Cow;

use quick_xml::Writer;
use quick_xml::escape::{escape, partial_escape, resolve_predefined_entity, unescape};
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::code_page::{Profile, same_namespace};
use crate::dom::{Attribute, Document, Element, Node};
use crate::options::{Charset, DecoderOptions, OutputForm};
use crate::{Result, WbxmlError};

fn malformed(message: impl Into<String>) -> WbxmlError {
    WbxmlError::MalformedXml(message.into())
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| malformed(e.to_string()))
}

/// Parse XML text into a document tree.
///
/// A DOCTYPE must name `profile`'s root or public identifier. Processing
/// instructions other than the XML declaration are rejected.
pub fn parse_document(xml: &[u8], profile: &Profile, max_depth: usize) -> Result<Document> {
    let mut reader = NsReader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            malformed(format!("{e} at offset {}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => {
                let element = start_element(&reader, &e, &stack, root.is_some(), max_depth)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = start_element(&reader, &e, &stack, root.is_some(), max_depth)?;
                close_element(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("end tag without a start tag"))?;
                close_element(&mut stack, &mut root, element);
            }
            Event::Text(e) => {
                let text = unescape(utf8(&*e)?).map_err(|e| malformed(e.to_string()))?;
                push_character_data(&mut stack, text.into_owned())?;
            }
            Event::CData(e) => {
                let text = utf8(&e.into_inner())?.to_string();
                push_character_data(&mut stack, text)?;
            }
            Event::GeneralRef(e) => {
                let name = utf8(e.as_ref())?;
                let text = resolve_reference(name)
                    .ok_or_else(|| malformed(format!("unknown entity &{name};")))?;
                push_character_data(&mut stack, text)?;
            }
            Event::Comment(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(utf8(e.as_ref())?.to_string()));
                }
            }
            Event::DocType(e) => {
                if !stack.is_empty() || root.is_some() {
                    return Err(malformed("DOCTYPE after the root element"));
                }
                check_doctype(utf8(e.as_ref())?, profile)?;
            }
            Event::PI(e) => {
                return Err(WbxmlError::UnsupportedConstruct(format!(
                    "processing instruction <?{}?>",
                    String::from_utf8_lossy(e.target())
                )));
            }
            Event::Decl(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("element <{}> is not closed", open.name)));
    }
    root.map(Document::new)
        .ok_or_else(|| malformed("document has no root element"))
}

fn start_element(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    stack: &[Element],
    has_root: bool,
    max_depth: usize,
) -> Result<Element> {
    if stack.is_empty() && has_root {
        return Err(malformed("more than one root element"));
    }
    if stack.len() >= max_depth {
        return Err(WbxmlError::LimitExceeded { limit: max_depth });
    }

    let (ns, local) = reader.resolver().resolve_element(e.name());
    let mut element = Element::new(utf8(local.as_ref())?);
    element.namespace = match ns {
        ResolveResult::Bound(ns) => Some(utf8(ns.as_ref())?.to_string()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            return Err(malformed(format!(
                "unknown namespace prefix {}",
                String::from_utf8_lossy(&prefix)
            )));
        }
    };

    for attr in e.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let value = unescape(utf8(&attr.value)?).map_err(|e| malformed(e.to_string()))?;
        element.attributes.push(Attribute {
            name: utf8(key)?.to_string(),
            value: value.into_owned(),
        });
    }
    Ok(element)
}

fn close_element(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_character_data(stack: &mut [Element], text: String) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_text(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(malformed("character data outside the root element")),
    }
}

/// Text of a `&name;` reference without the delimiters: `#49`, `#x31` or a predefined entity.
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(digits) = name.strip_prefix('#') {
        let code_point = match digits.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => digits.parse::<u32>().ok()?,
        };
        return char::from_u32(code_point).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}

fn check_doctype(content: &str, profile: &Profile) -> Result<()> {
    let root = content.split_whitespace().next().unwrap_or_default();
    if root == profile.doctype_root || content.contains(profile.fpi) {
        return Ok(());
    }
    Err(WbxmlError::UnsupportedConstruct(format!(
        "DOCTYPE {root} is not a {} document",
        profile.name
    )))
}

/// Serialise a document with the XML declaration and `profile`'s DOCTYPE.
///
/// Pretty output only indents element-only content. Elements holding text are
/// written compactly so their character data stays as decoded.
pub fn write_document(
    document: &Document,
    profile: &Profile,
    options: &DecoderOptions,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let charset = options.charset;
    let layout = match options.output_form {
        OutputForm::Compact => None,
        OutputForm::Pretty => Some(Layout {
            width: options.indent,
            level: 0,
        }),
    };

    let encoding = (charset != Charset::Utf8).then(|| charset.xml_name());
    write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", encoding, None)))?;
    let doctype = format!(
        r#"{} PUBLIC "{}" "{}""#,
        profile.doctype_root, profile.fpi, profile.dtd
    );
    if let Some(layout) = layout {
        write_break(&mut writer, layout)?;
    }
    write_event(&mut writer, Event::DocType(BytesText::from_escaped(doctype)))?;
    if let Some(layout) = layout {
        write_break(&mut writer, layout)?;
    }
    write_element(&mut writer, &document.root, None, charset, layout)?;

    let output = writer.into_inner();
    match charset {
        Charset::Latin1 => to_latin1(output),
        Charset::Utf8 | Charset::UsAscii => Ok(output),
    }
}

/// Indentation of pretty output: `width` spaces per nesting `level`
#[derive(Clone, Copy)]
struct Layout {
    width: usize,
    level: usize,
}

impl Layout {
    fn nested(self) -> Self {
        Self {
            level: self.level + 1,
            ..self
        }
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| WbxmlError::Decoding(format!("cannot write XML: {e}")))
}

/// Newline followed by the indentation of `layout`
fn write_break(writer: &mut Writer<Vec<u8>>, layout: Layout) -> Result<()> {
    let indent = format!("\n{}", " ".repeat(layout.width * layout.level));
    write_event(writer, Event::Text(BytesText::from_escaped(indent)))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    in_scope: Option<&str>,
    charset: Charset,
    layout: Option<Layout>,
) -> Result<()> {
    check_name(&element.name, charset)?;
    let mut start = BytesStart::new(element.name.as_str());

    let mut scope = in_scope;
    if let Some(ns) = element.namespace.as_deref()
        && !in_scope.is_some_and(|current| same_namespace(current, ns))
    {
        start.push_attribute(escaped_attribute("xmlns", ns, charset));
        scope = Some(ns);
    }
    for attr in &element.attributes {
        check_name(&attr.name, charset)?;
        start.push_attribute(escaped_attribute(&attr.name, &attr.value, charset));
    }

    if element.children.is_empty() {
        return write_event(writer, Event::Empty(start));
    }
    write_event(writer, Event::Start(start))?;

    let mixed = element
        .children
        .iter()
        .any(|node| matches!(node, Node::Text(_)));
    let layout = layout.filter(|_| !mixed);
    for child in &element.children {
        if let Some(layout) = layout {
            write_break(writer, layout.nested())?;
        }
        match child {
            Node::Element(child) => {
                write_element(writer, child, scope, charset, layout.map(Layout::nested))?
            }
            Node::Text(text) => {
                let escaped = escape_markup(text, charset, false);
                write_event(writer, Event::Text(BytesText::from_escaped(escaped)))?;
            }
            Node::Comment(text) => {
                let text: String = text
                    .chars()
                    .map(|c| if charset.can_encode(c) { c } else { '?' })
                    .collect();
                write_event(writer, Event::Comment(BytesText::from_escaped(text)))?;
            }
        }
    }
    if let Some(layout) = layout {
        write_break(writer, layout)?;
    }
    write_event(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

fn escaped_attribute<'a>(name: &'a str, value: &str, charset: Charset) -> XmlAttribute<'a> {
    XmlAttribute {
        key: QName(name.as_bytes()),
        value: Cow::Owned(escape_markup(value, charset, true).into_bytes()),
    }
}

/// Escape markup characters, then turn characters outside `charset` into references.
fn escape_markup(text: &str, charset: Charset, attribute: bool) -> String {
    let escaped = if attribute {
        escape(text)
    } else {
        partial_escape(text)
    };
    if charset == Charset::Utf8 {
        return escaped.into_owned();
    }
    let mut out = String::with_capacity(escaped.len());
    for c in escaped.chars() {
        if charset.can_encode(c) {
            out.push(c);
        } else {
            out.push_str(&format!("&#x{:X};", u32::from(c)));
        }
    }
    out
}

fn check_name(name: &str, charset: Charset) -> Result<()> {
    if name.chars().all(|c| charset.can_encode(c)) {
        return Ok(());
    }
    Err(WbxmlError::Decoding(format!(
        "name {name:?} cannot be written in {}",
        charset.xml_name()
    )))
}

fn to_latin1(output: Vec<u8>) -> Result<Vec<u8>> {
    let text = String::from_utf8(output).map_err(|e| WbxmlError::Decoding(e.to_string()))?;
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| WbxmlError::Decoding(format!("{c:?} is not in ISO-8859-1")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activesync::ACTIVESYNC;

    fn parse(xml: &str) -> Result<Document> {
        parse_document(xml.as_bytes(), &ACTIVESYNC, 256)
    }

    fn write(document: &Document, options: &DecoderOptions) -> String {
        String::from_utf8(write_document(document, &ACTIVESYNC, options).unwrap()).unwrap()
    }

    #[test]
    fn test_namespaces_are_resolved_and_dropped() {
        let doc = parse(
            r#"<Sync xmlns="AirSync" xmlns:email="Email"><email:To a="1">x</email:To></Sync>"#,
        )
        .unwrap();
        assert_eq!(doc.root.name, "Sync");
        assert_eq!(doc.root.namespace.as_deref(), Some("AirSync"));
        assert!(doc.root.attributes.is_empty());
        let to = doc.root.child_elements().next().unwrap();
        assert_eq!(to.name, "To");
        assert_eq!(to.namespace.as_deref(), Some("Email"));
        assert_eq!(to.attribute("a"), Some("1"));
    }

    #[test]
    fn test_character_data_is_coalesced() {
        let doc = parse("<Data>a&lt;b&#49;&#x32;<![CDATA[<c>]]></Data>").unwrap();
        assert_eq!(doc.root.children, vec![Node::Text("a<b12<c>".to_string())]);
    }

    #[test]
    fn test_whitespace_is_kept() {
        let doc = parse("<Data>\n  \t</Data>").unwrap();
        assert_eq!(doc.root.text(), "\n  \t");
    }

    #[test]
    fn test_comments_are_kept() {
        let doc = parse("<!-- head --><Data><!--c-->1</Data>").unwrap();
        assert_eq!(
            doc.root.children,
            vec![Node::Comment("c".to_string()), Node::Text("1".to_string())]
        );
    }

    #[test]
    fn test_malformed_inputs() {
        for xml in [
            "",
            "abcdef",
            "<Sync>",
            "<Sync></Status>",
            "<Sync/><Sync/>",
            "<a:Sync/>",
            "<Sync>&bogus;</Sync>",
            "<Sync/>trailing",
        ] {
            assert!(
                matches!(parse(xml), Err(WbxmlError::MalformedXml(_))),
                "{xml:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_doctype_and_processing_instructions() {
        let accepted = r#"<?xml version="1.0"?><!DOCTYPE ActiveSync PUBLIC "-//MICROSOFT//DTD ActiveSync//EN" "http://www.microsoft.com/"><Sync/>"#;
        assert!(parse(accepted).is_ok());
        assert!(matches!(
            parse("<!DOCTYPE html><Sync/>"),
            Err(WbxmlError::UnsupportedConstruct(_))
        ));
        assert!(matches!(
            parse("<?php echo 1; ?><Sync/>"),
            Err(WbxmlError::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        assert!(parse_document(b"<a><b><c/></b></a>", &ACTIVESYNC, 3).is_ok());
        assert!(matches!(
            parse_document(b"<a><b><c/></b></a>", &ACTIVESYNC, 2),
            Err(WbxmlError::LimitExceeded { limit: 2 })
        ));
    }

    fn sample() -> Document {
        Document::new(
            Element::new("Sync")
                .with_namespace("AirSync:")
                .with_child(Element::new("Collections").with_namespace("AirSync:"))
                .with_child(
                    Element::new("Subject")
                        .with_namespace("Email:")
                        .with_text("a < b"),
                ),
        )
    }

    #[test]
    fn test_write_compact() {
        let xml = write(&sample(), &DecoderOptions::default());
        assert_eq!(
            xml,
            concat!(
                r#"<?xml version="1.0"?>"#,
                r#"<!DOCTYPE ActiveSync PUBLIC "-//MICROSOFT//DTD ActiveSync//EN" "http://www.microsoft.com/">"#,
                r#"<Sync xmlns="AirSync:"><Collections/><Subject xmlns="Email:">a &lt; b</Subject></Sync>"#
            )
        );
    }

    #[test]
    fn test_write_pretty() {
        let options = DecoderOptions {
            output_form: OutputForm::Pretty,
            ..DecoderOptions::default()
        };
        let xml = write(&sample(), &options);
        assert!(xml.contains("\n<Sync xmlns=\"AirSync:\">\n  <Collections/>\n"));
        assert!(xml.ends_with("  <Subject xmlns=\"Email:\">a &lt; b</Subject>\n</Sync>"));
    }

    #[test]
    fn test_write_pretty_leaves_mixed_content_alone() {
        let document = Document::new(
            Element::new("Sync").with_namespace("AirSync:").with_child(
                Element::new("Status")
                    .with_text("a")
                    .with_child(Element::new("Collections").with_child(Element::new("Class"))),
            ),
        );
        let options = DecoderOptions {
            output_form: OutputForm::Pretty,
            indent: 4,
            ..DecoderOptions::default()
        };
        let xml = write(&document, &options);
        assert!(xml.ends_with(
            "<Sync xmlns=\"AirSync:\">\n    <Status>a<Collections><Class/></Collections></Status>\n</Sync>"
        ));

        let reparsed = parse(&xml).unwrap();
        let status = reparsed.root.child_elements().next().unwrap();
        assert_eq!(status.children[0], Node::Text("a".to_string()));
        assert_eq!(status.children.len(), 2);
    }

    #[test]
    fn test_write_character_references() {
        let document = Document::new(Element::new("Subject").with_text("caf\u{e9} \u{20ac}"));
        let options = DecoderOptions {
            charset: Charset::UsAscii,
            ..DecoderOptions::default()
        };
        let xml = write(&document, &options);
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="US-ASCII"?>"#));
        assert!(xml.ends_with("<Subject>caf&#xE9; &#x20AC;</Subject>"));

        let options = DecoderOptions {
            charset: Charset::Latin1,
            ..DecoderOptions::default()
        };
        let bytes = write_document(&document, &ACTIVESYNC, &options).unwrap();
        assert!(bytes.ends_with(b"<Subject>caf\xE9 &#x20AC;</Subject>"));

        let document = Document::new(Element::new("Sub\u{e9}"));
        let options = DecoderOptions {
            charset: Charset::UsAscii,
            ..DecoderOptions::default()
        };
        assert!(matches!(
            write_document(&document, &ACTIVESYNC, &options),
            Err(WbxmlError::Decoding(_))
        ));
    }
}
