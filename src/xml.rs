//! XML reading and writing helpers shared by every part codec.

use crate::error::{Error, Result};
use crate::security;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::{BufRead, Write};

pub(crate) const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const NS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const NS_PACKAGE_REL: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
pub(crate) const NS_CONTENT_TYPES: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

/// Create a reader that keeps all whitespace.
pub(crate) fn reader_from_str(xml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader
}

/// Create a reader over a buffered stream that keeps all whitespace.
pub(crate) fn reader_from_bufread<R: BufRead>(input: R) -> Reader<R> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    reader
}

/// Read the next event, rejecting entity-declaring DTDs.
pub(crate) fn read_event<'b, R: BufRead>(
    reader: &mut Reader<R>,
    buf: &'b mut Vec<u8>,
    part: &str,
) -> Result<Event<'b>> {
    match reader.read_event_into(buf) {
        Ok(Event::DocType(dt)) => {
            security::check_doctype(part, &dt)?;
            Ok(Event::DocType(dt))
        }
        Ok(event) => Ok(event),
        Err(e) => Err(map_xml_error(part, e)),
    }
}

/// Skip to the end of the element whose start tag was just read.
pub(crate) fn skip_element<R: BufRead>(
    reader: &mut Reader<R>,
    name: &[u8],
    scratch: &mut Vec<u8>,
    part: &str,
) -> Result<()> {
    scratch.clear();
    reader
        .read_to_end_into(quick_xml::name::QName(name), scratch)
        .map_err(|e| map_xml_error(part, e))?;
    Ok(())
}

/// Convert a parser error, surfacing guard violations raised by the underlying reader.
pub(crate) fn map_xml_error(part: &str, err: quick_xml::Error) -> Error {
    if let quick_xml::Error::Io(io) = &err {
        if let Some(v) = security::violation_of(io) {
            return Error::Security(v);
        }
    }
    Error::xml(part, err)
}

/// Unescaped value of an attribute, matched on its local name.
pub(crate) fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == key {
            a.unescape_value().ok().map(Cow::into_owned)
        } else {
            None
        }
    })
}

pub(crate) fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr(e, key).and_then(|v| v.trim().parse().ok())
}

pub(crate) fn attr_f64(e: &BytesStart, key: &[u8]) -> Option<f64> {
    attr(e, key).and_then(|v| v.trim().parse().ok())
}

/// SpreadsheetML boolean: `1`/`true` are true, absent is `default`.
pub(crate) fn attr_bool(e: &BytesStart, key: &[u8], default: bool) -> bool {
    match attr(e, key).as_deref() {
        Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        _ => default,
    }
}

/// Copy of a start tag with one attribute replaced (or removed when `value` is `None`).
pub(crate) fn with_attr(e: &BytesStart, key: &str, value: Option<&str>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut replaced = false;
    for a in e.attributes().flatten() {
        if a.key.as_ref() == key.as_bytes() {
            if let Some(v) = value {
                out.push_attribute((key, v));
            }
            replaced = true;
        } else {
            out.push_attribute(a);
        }
    }
    if !replaced {
        if let Some(v) = value {
            out.push_attribute((key, v));
        }
    }
    out
}

/// Build an XML writer, indented when `pretty`.
pub(crate) fn writer<W: Write>(inner: W, pretty: bool) -> quick_xml::Writer<W> {
    if pretty {
        quick_xml::Writer::new_with_indent(inner, b' ', 2)
    } else {
        quick_xml::Writer::new(inner)
    }
}

/// Write the standard declaration.
pub(crate) fn write_decl<W: Write>(w: &mut quick_xml::Writer<W>) -> Result<()> {
    w.write_event(Event::Decl(quick_xml::events::BytesDecl::new(
        "1.0",
        Some("UTF-8"),
        Some("yes"),
    )))?;
    Ok(())
}

/// Whether a text value needs `xml:space="preserve"` to survive a round trip.
pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace)
        || s.ends_with(char::is_whitespace)
        || s.contains('\n')
        || s.contains('\t')
        || s.contains("  ")
}

/// Convert CRLF and lone CR to LF.
pub(crate) fn normalize_newlines(s: &str) -> Cow<'_, str> {
    if s.contains('\r') {
        Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(s)
    }
}

fn hex4(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(std::str::from_utf8(bytes).ok()?, 16).ok()
}

/// Decode `_xHHHH_` character escapes.
pub(crate) fn decode_escapes(s: &str) -> Cow<'_, str> {
    if !s.contains("_x") {
        return Cow::Borrowed(s);
    }
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    let mut last = 0;
    while i + 7 <= bytes.len() {
        if bytes[i] == b'_' && bytes[i + 1] == b'x' && bytes[i + 6] == b'_' {
            if let Some(c) = hex4(&bytes[i + 2..i + 6]).and_then(char::from_u32) {
                out.push_str(&s[last..i]);
                out.push(c);
                i += 7;
                last = i;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&s[last..]);
    Cow::Owned(out)
}

/// Encode characters XML cannot carry, and literal `_xHHHH_` sequences, as escapes.
pub(crate) fn encode_escapes(s: &str) -> Cow<'_, str> {
    let needs_control = s
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n'));
    let looks_escaped = s.contains("_x") && decode_escapes(s) != s;
    if !needs_control && !looks_escaped {
        return Cow::Borrowed(s);
    }

    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        if c.is_control() && !matches!(c, '\t' | '\n') {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_'
            && i + 7 <= bytes.len()
            && bytes[i + 1] == b'x'
            && bytes[i + 6] == b'_'
            && hex4(&bytes[i + 2..i + 6]).is_some()
        {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_preserve_rules() {
        assert!(!needs_space_preserve("plain text"));
        assert!(needs_space_preserve(" lead"));
        assert!(needs_space_preserve("trail "));
        assert!(needs_space_preserve("two\nlines"));
        assert!(needs_space_preserve("tab\there"));
        assert!(needs_space_preserve("double  space"));
        assert!(!needs_space_preserve(""));
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert!(matches!(normalize_newlines("abc"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_codec() {
        assert_eq!(decode_escapes("a_x000D_b"), "a\rb");
        assert_eq!(decode_escapes("_x0041__x0042_"), "AB");
        assert_eq!(decode_escapes("no_xescape_"), "no_xescape_");

        assert_eq!(encode_escapes("bell\u{7}"), "bell_x0007_");
        assert_eq!(encode_escapes("cr\r\nlf"), "cr_x000D_\nlf");
        assert_eq!(encode_escapes("literal _x0041_"), "literal _x005F_x0041_");
        assert_eq!(decode_escapes(&encode_escapes("literal _x0041_")), "literal _x0041_");
        assert!(matches!(encode_escapes("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_with_attr() {
        let start = BytesStart::new("workbookView").with_attributes([("activeTab", "5"), ("x", "1")]);
        let patched = with_attr(&start, "activeTab", Some("1"));
        assert_eq!(attr(&patched, b"activeTab").as_deref(), Some("1"));
        assert_eq!(attr(&patched, b"x").as_deref(), Some("1"));

        let removed = with_attr(&start, "activeTab", None);
        assert!(attr(&removed, b"activeTab").is_none());
    }

    #[test]
    fn test_doctype_rejected_by_read_event() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE x [<!ENTITY e SYSTEM "file:///etc/passwd">]><x>&e;</x>"#;
        let mut reader = reader_from_str(xml);
        let mut buf = Vec::new();
        let err = loop {
            buf.clear();
            match read_event(&mut reader, &mut buf, "x.xml") {
                Ok(Event::Eof) => panic!("doctype accepted"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(err.is_security());
    }
}
