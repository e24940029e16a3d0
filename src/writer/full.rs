//! Full regeneration: every part built from the model.

use super::put_part;
use crate::content_types::{
    ContentTypes, CONTENT_TYPES_PART, CT_SHARED_STRINGS, CT_STYLES, CT_WORKBOOK, CT_WORKSHEET,
};
use crate::error::{Error, Result};
use crate::model::{CellValue, Sheet};
use crate::options::{SharedStringsPolicy, WriteOptions};
use crate::relationships::{
    rels_path_for, Relationship, Relationships, REL_OFFICE_DOCUMENT, REL_SHARED_STRINGS,
    REL_STYLES, REL_WORKSHEET,
};
use crate::xlsx::shared_strings::{SharedStringTable, SHARED_STRINGS_PART};
use crate::xlsx::styles::{write_styles_part, StyleIndex, STYLES_PART};
use crate::xlsx::workbook_xml::{write_workbook, SheetEntry, WORKBOOK_PART};
use crate::xlsx::worksheet_writer::{write_worksheet, CellEmitter, StringSink};
use std::io::{Seek, Write};
use zip::ZipWriter;

/// Part name of the `n`th generated worksheet (0-based).
pub(crate) fn fresh_sheet_part(n: usize) -> String {
    format!("xl/worksheets/sheet{}.xml", n + 1)
}

/// Sheet list entries for a freshly generated package.
pub(crate) fn fresh_entries<'a>(
    sheets: impl IntoIterator<Item = (&'a str, crate::model::SheetState)>,
) -> Vec<SheetEntry> {
    sheets
        .into_iter()
        .enumerate()
        .map(|(i, (name, state))| SheetEntry {
            name: name.to_string(),
            sheet_id: i as u32 + 1,
            rel_id: format!("rId{}", i + 1),
            state,
        })
        .collect()
}

fn relationship(id: String, rel_type: &str, target: &str) -> Relationship {
    Relationship {
        id,
        rel_type: rel_type.to_string(),
        target: target.to_string(),
        external: false,
    }
}

/// Write the parts every generated package starts with: content types, package and
/// workbook relationships, the workbook part and the styles part.
///
/// Worksheet `i` is expected at [`fresh_sheet_part`]`(i)`.
pub(crate) fn write_skeleton<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    entries: &[SheetEntry],
    shared_strings: bool,
    styles: &[u8],
    options: &WriteOptions,
) -> Result<()> {
    let mut content_types = ContentTypes::minimal();
    content_types.set_override(WORKBOOK_PART, CT_WORKBOOK);
    for i in 0..entries.len() {
        content_types.set_override(&fresh_sheet_part(i), CT_WORKSHEET);
    }
    content_types.set_override(STYLES_PART, CT_STYLES);
    if shared_strings {
        content_types.set_override(SHARED_STRINGS_PART, CT_SHARED_STRINGS);
    }
    put_part(zip, CONTENT_TYPES_PART, &content_types.to_xml()?, options)?;

    let mut package_rels = Relationships::new();
    package_rels.add(relationship("rId1".to_string(), REL_OFFICE_DOCUMENT, WORKBOOK_PART));
    put_part(zip, &rels_path_for(""), &package_rels.to_xml()?, options)?;

    let mut workbook_rels = Relationships::new();
    for (i, entry) in entries.iter().enumerate() {
        let target = format!("worksheets/sheet{}.xml", i + 1);
        workbook_rels.add(relationship(entry.rel_id.clone(), REL_WORKSHEET, &target));
    }
    let styles_id = workbook_rels.next_id();
    workbook_rels.add(relationship(styles_id, REL_STYLES, "styles.xml"));
    if shared_strings {
        let sst_id = workbook_rels.next_id();
        workbook_rels.add(relationship(sst_id, REL_SHARED_STRINGS, "sharedStrings.xml"));
    }

    put_part(zip, WORKBOOK_PART, &write_workbook(entries, options.pretty_print)?, options)?;
    put_part(zip, &rels_path_for(WORKBOOK_PART), &workbook_rels.to_xml()?, options)?;
    put_part(zip, STYLES_PART, styles, options)?;
    Ok(())
}

fn has_text(sheet: &Sheet) -> bool {
    sheet
        .cells
        .values()
        .any(|c| matches!(c.value, CellValue::Text(_) | CellValue::RichText(_)))
}

/// Generate a complete package from sheets.
pub(crate) fn write_full<W: Write + Seek>(
    sheets: &[Sheet],
    zip: &mut ZipWriter<W>,
    options: &WriteOptions,
) -> Result<()> {
    if sheets.is_empty() {
        return Err(Error::InvalidData(
            "a workbook needs at least one sheet".to_string(),
        ));
    }

    let refs: Vec<&Sheet> = sheets.iter().collect();
    let (index, maps) = StyleIndex::from_model(None, &refs);
    let use_shared = match options.shared_strings {
        SharedStringsPolicy::Never => false,
        SharedStringsPolicy::Always => true,
        SharedStringsPolicy::Auto => sheets.iter().any(has_text),
    };
    log::debug!(
        "full regeneration: {} sheets, {} styles, shared strings {}",
        sheets.len(),
        index.len(),
        if use_shared { "on" } else { "off" }
    );

    let entries = fresh_entries(sheets.iter().map(|s| (s.name.as_str(), s.state)));
    let styles = write_styles_part(&index, options.pretty_print)?;
    write_skeleton(zip, &entries, use_shared, &styles, options)?;

    let mut sst = SharedStringTable::new();
    for (i, (sheet, map)) in sheets.iter().zip(&maps).enumerate() {
        let sink = if use_shared {
            StringSink::Shared(&mut sst)
        } else {
            StringSink::Inline
        };
        let mut emitter = CellEmitter::new(sink, options.escape_formulas);
        let bytes = write_worksheet(sheet, map, &mut emitter, i == 0, options.pretty_print)?;
        put_part(zip, &fresh_sheet_part(i), &bytes, options)?;
    }

    if use_shared {
        put_part(zip, SHARED_STRINGS_PART, &sst.to_xml(options.pretty_print, true)?, options)?;
    }
    Ok(())
}
