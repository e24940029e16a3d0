//! `xl/workbook.xml`: sheet list parsing, patching and generation.

use crate::error::{Error, Result};
use crate::model::SheetState;
use crate::xml::{self, NS_MAIN, NS_REL};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use std::io::Write;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";

/// One `<sheet>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub state: SheetState,
}

/// Parsed sheet list plus the prefix bound to the relationships namespace.
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkbookPart {
    pub sheets: Vec<SheetEntry>,
    pub rel_prefix: String,
}

fn rel_id_attr(e: &BytesStart) -> Option<(String, String)> {
    e.attributes().flatten().find_map(|a| {
        let key = a.key;
        if key.local_name().as_ref() != b"id" {
            return None;
        }
        let prefix = key
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())?;
        let value = a.unescape_value().ok()?.into_owned();
        Some((prefix, value))
    })
}

impl WorkbookPart {
    pub fn parse(content: &str) -> Result<Self> {
        let mut part = Self {
            sheets: Vec::new(),
            rel_prefix: "r".to_string(),
        };
        let mut reader = xml::reader_from_str(content);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match xml::read_event(&mut reader, &mut buf, WORKBOOK_PART)? {
                Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                    let name = xml::attr(&e, b"name").ok_or_else(|| {
                        Error::xml(WORKBOOK_PART, "sheet without a name")
                    })?;
                    let (prefix, rel_id) = rel_id_attr(&e).ok_or_else(|| {
                        Error::xml(WORKBOOK_PART, format!("sheet {name:?} has no relationship id"))
                    })?;
                    part.rel_prefix = prefix;
                    part.sheets.push(SheetEntry {
                        sheet_id: xml::attr_u32(&e, b"sheetId").unwrap_or(0),
                        state: xml::attr(&e, b"state")
                            .map_or(SheetState::Visible, |s| SheetState::from_attr(&s)),
                        name,
                        rel_id,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(part)
    }
}

fn write_sheets<W: Write>(
    w: &mut quick_xml::Writer<W>,
    sheets: &[SheetEntry],
    rel_prefix: &str,
) -> Result<()> {
    let id_key = format!("{rel_prefix}:id");
    w.write_event(Event::Start(BytesStart::new("sheets")))?;
    for sheet in sheets {
        let mut e = BytesStart::new("sheet");
        e.push_attribute(("name", sheet.name.as_str()));
        e.push_attribute(("sheetId", sheet.sheet_id.to_string().as_str()));
        if let Some(state) = sheet.state.as_attr() {
            e.push_attribute(("state", state));
        }
        e.push_attribute((id_key.as_str(), sheet.rel_id.as_str()));
        w.write_event(Event::Empty(e))?;
    }
    w.write_event(Event::End(BytesEnd::new("sheets")))?;
    Ok(())
}

/// Generate a workbook part for a fresh package.
pub(crate) fn write_workbook(sheets: &[SheetEntry], pretty: bool) -> Result<Vec<u8>> {
    let mut w = xml::writer(Vec::new(), pretty);
    xml::write_decl(&mut w)?;
    w.write_event(Event::Start(
        BytesStart::new("workbook").with_attributes([("xmlns", NS_MAIN), ("xmlns:r", NS_REL)]),
    ))?;
    w.write_event(Event::Start(BytesStart::new("bookViews")))?;
    w.write_event(Event::Empty(
        BytesStart::new("workbookView").with_attributes([("activeTab", "0")]),
    ))?;
    w.write_event(Event::End(BytesEnd::new("bookViews")))?;
    write_sheets(&mut w, sheets, "r")?;
    w.write_event(Event::End(BytesEnd::new("workbook")))?;
    Ok(w.into_inner())
}

/// Patch the original workbook part for a new sheet list.
///
/// `positions[i]` is the new position of source sheet `i`, `None` when deleted. Only
/// `<sheets>` is regenerated; sheet-scoped defined names and view indices are
/// remapped, names scoped to deleted sheets are dropped.
pub(crate) fn patch_workbook(
    original: &str,
    sheets: &[SheetEntry],
    rel_prefix: &str,
    positions: &[Option<usize>],
) -> Result<Vec<u8>> {
    let remap = |raw: Option<u32>| raw.and_then(|i| positions.get(i as usize).copied().flatten());
    let last = sheets.len().saturating_sub(1);
    let remap_view = |e: &BytesStart| -> BytesStart<'static> {
        let mut view = e.clone().into_owned();
        for key in ["activeTab", "firstSheet"] {
            if let Some(old) = xml::attr_u32(&view, key.as_bytes()) {
                let new = remap(Some(old)).unwrap_or(0).min(last).to_string();
                view = xml::with_attr(&view, key, Some(&new));
            }
        }
        view
    };

    let mut reader = xml::reader_from_str(original);
    let mut w = quick_xml::Writer::new(Vec::with_capacity(original.len() + 256));
    let mut buf = Vec::new();
    let mut scratch = Vec::new();

    loop {
        buf.clear();
        match xml::read_event(&mut reader, &mut buf, WORKBOOK_PART)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheets" => {
                let name = e.name().as_ref().to_vec();
                xml::skip_element(&mut reader, &name, &mut scratch, WORKBOOK_PART)?;
                write_sheets(&mut w, sheets, rel_prefix)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheets" => {
                write_sheets(&mut w, sheets, rel_prefix)?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"definedName" => {
                match xml::attr_u32(&e, b"localSheetId") {
                    None => w.write_event(Event::Start(e))?,
                    Some(old) => match remap(Some(old)) {
                        Some(new) => {
                            let new = new.to_string();
                            w.write_event(Event::Start(xml::with_attr(
                                &e,
                                "localSheetId",
                                Some(&new),
                            )))?;
                        }
                        None => {
                            let name = e.name().as_ref().to_vec();
                            xml::skip_element(&mut reader, &name, &mut scratch, WORKBOOK_PART)?;
                        }
                    },
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                w.write_event(Event::Empty(remap_view(&e)))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"workbookView" => {
                w.write_event(Event::Start(remap_view(&e)))?;
            }
            Event::Eof => break,
            other => w.write_event(other)?,
        }
    }
    Ok(w.into_inner())
}
