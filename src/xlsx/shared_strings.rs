//! XLSX shared strings parsing and generation.

use super::styles::{read_font, write_font};
use crate::error::{Error, Result};
use crate::model::{CellValue, RichText, TextRun};
use crate::security::{self, SecurityLimits};
use crate::xml::{self, NS_MAIN};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufRead, Write};

pub(crate) const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// One string item: plain text or formatted runs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StringItem {
    Plain(String),
    Rich(RichText),
}

impl StringItem {
    /// Dedup key. Rich items never collide with plain ones.
    fn key(&self) -> String {
        match self {
            StringItem::Plain(s) => s.clone(),
            StringItem::Rich(rich) => {
                let runs = serde_json::to_string(&rich.runs)
                    .unwrap_or_else(|_| format!("{:?}", rich.runs));
                format!("\u{0}rich{runs}")
            }
        }
    }

    /// Cell value for this item.
    pub fn to_value(&self) -> CellValue {
        match self {
            StringItem::Plain(s) => CellValue::Text(s.clone()),
            StringItem::Rich(rich) => CellValue::RichText(rich.clone()),
        }
    }

    /// The item a text-like cell value stores, if any.
    pub fn from_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Text(s) => Some(StringItem::Plain(s.clone())),
            CellValue::RichText(rich) => Some(StringItem::Rich(rich.clone())),
            _ => None,
        }
    }
}

fn push_text(out: &mut String, t: &BytesText, part: &str) -> Result<()> {
    // Literal line breaks are XML line ends; escaped `_x000D_` survives decoding.
    let text = t.unescape().map_err(|e| Error::xml(part, e))?;
    out.push_str(&xml::normalize_newlines(&text));
    Ok(())
}

/// Read a string item until the closing `end` tag (`si` or `is`).
pub(crate) fn read_string_item<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    scratch: &mut Vec<u8>,
    part: &str,
    end: &[u8],
    limits: &SecurityLimits,
) -> Result<StringItem> {
    let mut plain = String::new();
    let mut runs: Vec<TextRun> = Vec::new();
    let mut run: Option<TextRun> = None;
    let mut in_text = false;

    loop {
        buf.clear();
        match xml::read_event(reader, buf, part)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"r" => run = Some(TextRun::default()),
                b"rPr" => {
                    let font = read_font(reader, scratch, part, b"rPr")?;
                    if let Some(r) = run.as_mut() {
                        r.font = Some(font);
                    }
                }
                b"rPh" | b"phoneticPr" => {
                    let name = e.name().as_ref().to_vec();
                    xml::skip_element(reader, &name, scratch, part)?;
                }
                _ => {}
            },
            Event::Text(t) if in_text => match run.as_mut() {
                Some(r) => push_text(&mut r.text, &t, part)?,
                None => push_text(&mut plain, &t, part)?,
            },
            Event::CData(c) if in_text => {
                let raw = String::from_utf8_lossy(&c);
                let text = xml::normalize_newlines(&raw);
                match run.as_mut() {
                    Some(r) => r.text.push_str(&text),
                    None => plain.push_str(&text),
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == b"r" {
                    if let Some(r) = run.take() {
                        runs.push(r);
                    }
                } else if name.as_ref() == end {
                    break;
                }
            }
            Event::Eof => return Err(Error::xml(part, "unexpected end of string item")),
            _ => {}
        }
    }

    let item = if runs.is_empty() {
        let text = xml::decode_escapes(&plain).into_owned();
        security::check_string(part, &text, limits)?;
        StringItem::Plain(text)
    } else {
        let mut total = 0;
        for r in &mut runs {
            if r.text.contains("_x") {
                r.text = xml::decode_escapes(&r.text).into_owned();
            }
            total += r.text.len();
        }
        if total > limits.max_string_length {
            let text: String = runs.iter().map(|r| r.text.as_str()).collect();
            security::check_string(part, &text, limits)?;
        }
        StringItem::Rich(RichText { runs })
    };
    Ok(item)
}

fn write_text<W: Write>(w: &mut quick_xml::Writer<W>, text: &str) -> Result<()> {
    let mut t = BytesStart::new("t");
    if xml::needs_space_preserve(text) {
        t.push_attribute(("xml:space", "preserve"));
    }
    w.write_event(Event::Start(t))?;
    w.write_event(Event::Text(BytesText::new(&xml::encode_escapes(text))))?;
    w.write_event(Event::End(BytesEnd::new("t")))?;
    Ok(())
}

/// Write the children of an `<si>` or `<is>` element.
pub(crate) fn write_string_item<W: Write>(
    w: &mut quick_xml::Writer<W>,
    item: &StringItem,
) -> Result<()> {
    match item {
        StringItem::Plain(s) => write_text(w, s),
        StringItem::Rich(rich) => {
            for run in &rich.runs {
                w.write_event(Event::Start(BytesStart::new("r")))?;
                if let Some(font) = &run.font {
                    write_font(w, font, true)?;
                }
                write_text(w, &run.text)?;
                w.write_event(Event::End(BytesEnd::new("r")))?;
            }
            Ok(())
        }
    }
}

/// Shared string table.
///
/// Index `i` resolves to the same item for the table's lifetime: source items keep
/// their positions (duplicates included) and new items are only ever appended.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedStringTable {
    items: Vec<StringItem>,
    lookup: HashMap<String, u32>,
    source_len: usize,
    references: usize,
}

impl SharedStringTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse shared strings from XML content.
    #[cfg(test)]
    pub fn parse(content: &str, limits: &SecurityLimits) -> Result<Self> {
        Self::parse_reader(xml::reader_from_str(content), limits)
    }

    /// Parse shared strings from a streamed part.
    pub fn parse_from<R: BufRead>(input: R, limits: &SecurityLimits) -> Result<Self> {
        Self::parse_reader(xml::reader_from_bufread(input), limits)
    }

    fn parse_reader<R: BufRead>(mut reader: Reader<R>, limits: &SecurityLimits) -> Result<Self> {
        let mut table = Self::new();
        let mut buf = Vec::new();
        let mut item_buf = Vec::new();
        let mut scratch = Vec::new();

        loop {
            buf.clear();
            match xml::read_event(&mut reader, &mut buf, SHARED_STRINGS_PART)? {
                Event::Start(e) if e.local_name().as_ref() == b"si" => {
                    let item = read_string_item(
                        &mut reader,
                        &mut item_buf,
                        &mut scratch,
                        SHARED_STRINGS_PART,
                        b"si",
                        limits,
                    )?;
                    table.push_source(item);
                }
                Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                    table.push_source(StringItem::Plain(String::new()))
                }
                Event::Eof => break,
                _ => {}
            }
        }

        table.source_len = table.items.len();
        Ok(table)
    }

    fn push_source(&mut self, item: StringItem) {
        let index = self.items.len() as u32;
        self.lookup.entry(item.key()).or_insert(index);
        self.items.push(item);
    }

    /// Item at an index; `None` for a reference beyond the table.
    pub fn resolve(&self, index: usize) -> Option<&StringItem> {
        self.items.get(index)
    }

    /// Index of an equal item, appending it if new.
    pub fn intern_or_lookup(&mut self, item: StringItem) -> u32 {
        self.references += 1;
        let key = item.key();
        if let Some(i) = self.lookup.get(&key) {
            return *i;
        }
        let index = self.items.len() as u32;
        self.items.push(item);
        self.lookup.insert(key, index);
        index
    }

    /// Whether items were appended after the source items.
    pub fn has_new_strings(&self) -> bool {
        self.items.len() > self.source_len
    }

    /// Number of unique items.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Serialize as `xl/sharedStrings.xml`.
    ///
    /// `count` is only written when every reference in the workbook was interned
    /// through this table.
    pub fn to_xml(&self, pretty: bool, complete_count: bool) -> Result<Vec<u8>> {
        let mut w = xml::writer(Vec::new(), pretty);
        xml::write_decl(&mut w)?;
        let mut sst = BytesStart::new("sst");
        sst.push_attribute(("xmlns", NS_MAIN));
        if complete_count {
            sst.push_attribute(("count", self.references.to_string().as_str()));
        }
        sst.push_attribute(("uniqueCount", self.items.len().to_string().as_str()));
        w.write_event(Event::Start(sst))?;
        for item in &self.items {
            w.write_event(Event::Start(BytesStart::new("si")))?;
            write_string_item(&mut w, item)?;
            w.write_event(Event::End(BytesEnd::new("si")))?;
        }
        w.write_event(Event::End(BytesEnd::new("sst")))?;
        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Font;

    fn limits() -> SecurityLimits {
        SecurityLimits::default()
    }

    #[test]
    fn test_parse_shared_strings() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="5" uniqueCount="3">
    <si><t>Hello</t></si>
    <si><t>World</t></si>
    <si><t xml:space="preserve">  padded </t></si>
</sst>"#;

        let sst = SharedStringTable::parse(xml, &limits()).unwrap();
        assert_eq!(sst.len(), 3);
        assert_eq!(sst.resolve(0), Some(&StringItem::Plain("Hello".into())));
        assert_eq!(sst.resolve(2), Some(&StringItem::Plain("  padded ".into())));
        assert_eq!(sst.resolve(3), None);
        assert!(!sst.has_new_strings());
    }

    #[test]
    fn test_rich_text_and_phonetics() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <si><r><rPr><b/><sz val="12"/><rFont val="Arial"/></rPr><t>Hello</t></r><r><t xml:space="preserve"> World</t></r></si>
    <si><t>漢字</t><rPh sb="0" eb="2"><t>かんじ</t></rPh><phoneticPr fontId="1"/></si>
</sst>"#;

        let sst = SharedStringTable::parse(xml, &limits()).unwrap();
        match sst.resolve(0) {
            Some(StringItem::Rich(rich)) => {
                assert_eq!(rich.plain_text(), "Hello World");
                let font = rich.runs[0].font.as_ref().unwrap();
                assert!(font.bold);
                assert_eq!(font.name.as_deref(), Some("Arial"));
                assert_eq!(font.size, Some(12.0));
                assert!(rich.runs[1].font.is_none());
            }
            other => panic!("expected rich text, got {other:?}"),
        }
        assert_eq!(sst.resolve(1), Some(&StringItem::Plain("漢字".into())));
    }

    #[test]
    fn test_escaped_carriage_returns_survive() {
        let xml = "<sst><si><t>a_x000D__x000A_b</t></si><si><t>tab_x0009_</t></si><si><t>raw\r\nline</t></si></sst>";
        let mut sst = SharedStringTable::parse(xml, &limits()).unwrap();
        assert_eq!(sst.resolve(0), Some(&StringItem::Plain("a\r\nb".into())));
        assert_eq!(sst.resolve(1), Some(&StringItem::Plain("tab\t".into())));
        // Literal line ends in the markup are plain newlines.
        assert_eq!(sst.resolve(2), Some(&StringItem::Plain("raw\nline".into())));

        assert_eq!(sst.intern_or_lookup(StringItem::Plain("a\r\nb".into())), 0);
        assert_eq!(sst.intern_or_lookup(StringItem::Plain("raw\nline".into())), 2);
        assert!(!sst.has_new_strings());

        let text = String::from_utf8(sst.to_xml(false, false).unwrap()).unwrap();
        assert!(text.contains("a_x000D_\nb"));
        let reparsed = SharedStringTable::parse(&text, &limits()).unwrap();
        assert_eq!(reparsed.resolve(0), sst.resolve(0));
    }

    #[test]
    fn test_intern_keeps_source_indices() {
        let xml = "<sst><si><t>x</t></si><si><t>x</t></si><si><t>y</t></si></sst>";
        let mut sst = SharedStringTable::parse(xml, &limits()).unwrap();
        assert_eq!(sst.intern_or_lookup(StringItem::Plain("x".into())), 0);
        assert_eq!(sst.intern_or_lookup(StringItem::Plain("y".into())), 2);
        assert_eq!(sst.intern_or_lookup(StringItem::Plain("z".into())), 3);
        assert!(sst.has_new_strings());

        let rich = StringItem::Rich(RichText {
            runs: vec![TextRun::plain("x")],
        });
        assert_eq!(sst.intern_or_lookup(rich), 4);
        assert_eq!(sst.resolve(1), Some(&StringItem::Plain("x".into())));
    }

    #[test]
    fn test_string_length_guard() {
        let long = "a".repeat(40);
        let xml = format!("<sst><si><t>{long}</t></si></sst>");
        let err = SharedStringTable::parse(&xml, &limits().with_max_string_length(32)).unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_whitespace_preserved_on_write() {
        let mut sst = SharedStringTable::new();
        sst.intern_or_lookup(StringItem::Plain(" lead".into()));
        sst.intern_or_lookup(StringItem::Plain("two  spaces".into()));
        sst.intern_or_lookup(StringItem::Plain("line\nbreak".into()));
        sst.intern_or_lookup(StringItem::Plain("plain".into()));
        sst.intern_or_lookup(StringItem::Rich(RichText {
            runs: vec![
                TextRun {
                    text: "Bold".into(),
                    font: Some(Font {
                        bold: true,
                        ..Default::default()
                    }),
                },
                TextRun::plain(" tail"),
            ],
        }));

        let bytes = sst.to_xml(false, true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"<t xml:space="preserve"> lead</t>"#));
        assert!(text.contains(r#"<t xml:space="preserve">two  spaces</t>"#));
        assert!(text.contains("<t>plain</t>"));
        assert!(text.contains(r#"count="5" uniqueCount="5""#));

        let reparsed = SharedStringTable::parse(&text, &limits()).unwrap();
        for i in 0..5 {
            assert_eq!(reparsed.resolve(i), sst.resolve(i));
        }
    }
}
