//! Streaming write: rows go from the caller's iterator straight into the archive.
//!
//! Static parts are written first, then each worksheet entry is opened, filled row by
//! row and closed before the next one starts. Without a dimension hint a sheet is
//! written in two phases: the row body goes to an anonymous temporary file while its
//! bounds are tracked, then the header with the exact `<dimension>`, the body and the
//! footer are copied into the entry.
//!
//! Text is always written inline; a shared string table would have to be held in
//! memory until the last row.

use super::RowData;
use crate::error::{Error, Result};
use crate::fs::atomic_write;
use crate::model::{validate_sheet_name, CellRange, CellRef, SheetState, StyleRegistry, MAX_COL, MAX_ROW};
use crate::options::WriteOptions;
use crate::writer::{fresh_entries, fresh_sheet_part, write_skeleton};
use crate::xlsx::styles::{write_styles_part, SheetStyleMap, StyleIndex};
use crate::xlsx::worksheet_writer::{
    dimension_ref, worksheet_start, write_page_margins, write_sheet_views, CellEmitter, RowAttrs,
    StringSink,
};
use crate::xml;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use std::collections::HashSet;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use zip::ZipWriter;

/// One sheet of a streaming write.
pub struct StreamSheet<'a> {
    name: String,
    rows: Box<dyn Iterator<Item = Result<RowData>> + 'a>,
    dimension: Option<CellRange>,
    styles: StyleRegistry,
}

impl<'a> StreamSheet<'a> {
    /// A sheet fed by an infallible row source. Rows must come in ascending order.
    pub fn new<I>(name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = RowData>,
        I::IntoIter: 'a,
    {
        Self::try_new(name, rows.into_iter().map(Ok))
    }

    /// A sheet fed by a fallible row source; the first error aborts the write.
    pub fn try_new<I>(name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Result<RowData>>,
        I::IntoIter: 'a,
    {
        Self {
            name: name.into(),
            rows: Box::new(rows.into_iter()),
            dimension: None,
            styles: StyleRegistry::new(),
        }
    }

    /// Declare the used range up front, enabling single-pass output.
    pub fn with_dimension(mut self, range: CellRange) -> Self {
        self.dimension = Some(range);
        self
    }

    /// Formats referenced by [`RowCell::style`](super::RowCell::style).
    pub fn with_styles(mut self, styles: StyleRegistry) -> Self {
        self.styles = styles;
        self
    }

    /// Sheet name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for StreamSheet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSheet")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .field("styles", &self.styles.len())
            .finish_non_exhaustive()
    }
}

/// Stream rows into a new single-sheet workbook at `path`.
///
/// # Example
///
/// ```no_run
/// use xlpack::RowData;
///
/// let rows = (0..100_000u32).map(|i| RowData::from_values(i, [f64::from(i), f64::from(i) * 2.0]));
/// xlpack::write_stream("big.xlsx", "Data", rows, None)?;
/// # Ok::<(), xlpack::Error>(())
/// ```
pub fn write_stream(
    path: impl AsRef<Path>,
    sheet_name: &str,
    rows: impl IntoIterator<Item = RowData>,
    dimension: Option<CellRange>,
) -> Result<()> {
    let mut sheet = StreamSheet::new(sheet_name, rows);
    if let Some(range) = dimension {
        sheet = sheet.with_dimension(range);
    }
    write_stream_with_options(path, sheet, &WriteOptions::default())
}

/// Stream one sheet into a new workbook at `path`.
pub fn write_stream_with_options(
    path: impl AsRef<Path>,
    sheet: StreamSheet<'_>,
    options: &WriteOptions,
) -> Result<()> {
    write_stream_multi_sheet(path, vec![sheet], options)
}

/// Stream several sheets, one after another, into a new workbook at `path`.
///
/// Sheets are written in order; a ZIP archive cannot interleave two open entries.
pub fn write_stream_multi_sheet(
    path: impl AsRef<Path>,
    sheets: Vec<StreamSheet<'_>>,
    options: &WriteOptions,
) -> Result<()> {
    if sheets.is_empty() {
        return Err(Error::InvalidData(
            "a workbook needs at least one sheet".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for sheet in &sheets {
        validate_sheet_name(&sheet.name)?;
        if !seen.insert(sheet.name.to_lowercase()) {
            return Err(Error::InvalidData(format!(
                "duplicate sheet name {:?}",
                sheet.name
            )));
        }
    }

    let mut index = StyleIndex::new();
    let maps: Vec<SheetStyleMap> = sheets.iter().map(|s| index.map_palette(&s.styles)).collect();
    let styles = write_styles_part(&index, options.pretty_print)?;
    let entries = fresh_entries(sheets.iter().map(|s| (s.name.as_str(), SheetState::Visible)));

    atomic_write(path, |file| {
        let mut zip = ZipWriter::new(file);
        write_skeleton(&mut zip, &entries, false, &styles, options)?;
        for (position, (sheet, map)) in sheets.into_iter().zip(&maps).enumerate() {
            write_sheet(&mut zip, position, sheet, map, options)?;
        }
        zip.finish()?;
        Ok(())
    })
}

fn write_head<W: Write>(w: &mut quick_xml::Writer<W>, dimension: &str, selected: bool) -> Result<()> {
    xml::write_decl(w)?;
    w.write_event(Event::Start(worksheet_start()))?;
    w.write_event(Event::Empty(
        BytesStart::new("dimension").with_attributes([("ref", dimension)]),
    ))?;
    write_sheet_views(w, selected)?;
    w.write_event(Event::Empty(
        BytesStart::new("sheetFormatPr").with_attributes([("defaultRowHeight", "15")]),
    ))?;
    w.write_event(Event::Start(BytesStart::new("sheetData")))?;
    Ok(())
}

fn write_tail<W: Write>(w: &mut quick_xml::Writer<W>) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new("sheetData")))?;
    write_page_margins(w)?;
    w.write_event(Event::End(BytesEnd::new("worksheet")))?;
    Ok(())
}

/// Write the rows of one sheet; returns the bounds of what was written.
fn write_rows<W: Write>(
    w: &mut quick_xml::Writer<W>,
    sheet: &str,
    rows: impl Iterator<Item = Result<RowData>>,
    styles: &SheetStyleMap,
    emitter: &mut CellEmitter<'_>,
) -> Result<Option<CellRange>> {
    let mut last_row: Option<u32> = None;
    let mut bounds: Option<CellRange> = None;
    let mut count = 0u64;

    for row in rows {
        let row = row?;
        if row.index > MAX_ROW {
            return Err(Error::InvalidReference(format!(
                "sheet {sheet:?}: row {} is past the last row",
                u64::from(row.index) + 1
            )));
        }
        if let Some(prev) = last_row.filter(|prev| row.index <= *prev) {
            return Err(Error::InvalidData(format!(
                "sheet {sheet:?}: row {} follows row {}",
                row.index + 1,
                prev + 1
            )));
        }
        last_row = Some(row.index);

        let mut last_col: Option<u32> = None;
        let mut cells = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            if cell.col > MAX_COL || last_col.is_some_and(|prev| cell.col <= prev) {
                return Err(Error::InvalidData(format!(
                    "sheet {sheet:?}: column {} out of order in row {}",
                    cell.col + 1,
                    row.index + 1
                )));
            }
            last_col = Some(cell.col);
            let xf = styles.value_xf(cell.style, &cell.value);
            if !cell.value.is_empty() || xf != 0 {
                let at = CellRef::new(cell.col, row.index);
                match bounds.as_mut() {
                    Some(range) => range.extend(at),
                    None => bounds = Some(CellRange::new(at, at)),
                }
            }
            cells.push((cell.col, &cell.value, xf));
        }

        let attrs = RowAttrs {
            height: row.height,
            hidden: row.hidden,
            xf: None,
        };
        emitter.row(w, row.index, &attrs, cells)?;
        count += 1;
    }

    log::debug!("sheet {sheet:?}: {count} rows streamed");
    Ok(bounds)
}

fn write_sheet<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    position: usize,
    sheet: StreamSheet<'_>,
    styles: &SheetStyleMap,
    options: &WriteOptions,
) -> Result<()> {
    let StreamSheet {
        name,
        rows,
        dimension,
        ..
    } = sheet;
    let pretty = options.pretty_print;
    let selected = position == 0;
    let mut emitter = CellEmitter::new(StringSink::Inline, options.escape_formulas);
    zip.start_file(fresh_sheet_part(position), options.file_options())?;

    match dimension {
        Some(hint) => {
            let mut w = xml::writer(&mut *zip, pretty);
            write_head(&mut w, &hint.to_a1(), selected)?;
            let bounds = write_rows(&mut w, &name, rows, styles, &mut emitter)?;
            write_tail(&mut w)?;
            if let Some(actual) = bounds {
                if !hint.contains(actual.start) || !hint.contains(actual.end) {
                    log::warn!(
                        "sheet {name:?}: rows cover {} but the declared dimension is {}",
                        actual.to_a1(),
                        hint.to_a1()
                    );
                }
            }
        }
        None => {
            let mut body = tempfile::tempfile()?;
            let bounds = {
                let mut out = BufWriter::new(&mut body);
                let bounds = {
                    let mut w = xml::writer(&mut out, pretty);
                    write_rows(&mut w, &name, rows, styles, &mut emitter)?
                };
                out.flush()?;
                bounds
            };
            body.seek(SeekFrom::Start(0))?;

            write_head(&mut xml::writer(&mut *zip, pretty), &dimension_ref(bounds), selected)?;
            let copied = io::copy(&mut body, zip)?;
            write_tail(&mut xml::writer(&mut *zip, pretty))?;
            log::trace!("sheet {name:?}: {copied} body bytes copied from spool");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellValue;
    use crate::stream::RowCell;

    fn rows_xml(rows: Vec<RowData>) -> (String, Option<CellRange>) {
        let map = SheetStyleMap::default();
        let mut emitter = CellEmitter::new(StringSink::Inline, false);
        let mut w = xml::writer(Vec::new(), false);
        let bounds = write_rows(&mut w, "S", rows.into_iter().map(Ok), &map, &mut emitter).unwrap();
        (String::from_utf8(w.into_inner()).unwrap(), bounds)
    }

    #[test]
    fn test_rows_track_bounds() {
        let (xml, bounds) = rows_xml(vec![
            RowData::from_values(1, ["a", "b"]),
            RowData::new(4, vec![RowCell::new(3, 7.5)]),
        ]);
        assert!(xml.contains(r#"<row r="2">"#));
        assert!(xml.contains(r#"<c r="D5"><v>7.5</v></c>"#));
        assert_eq!(bounds.unwrap().to_a1(), "A2:D5");
    }

    #[test]
    fn test_rows_must_ascend() {
        let map = SheetStyleMap::default();
        let mut emitter = CellEmitter::new(StringSink::Inline, false);
        let mut w = xml::writer(Vec::new(), false);
        let rows = vec![RowData::from_values(3, [1.0]), RowData::from_values(3, [2.0])];
        let err = write_rows(&mut w, "S", rows.into_iter().map(Ok), &map, &mut emitter).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_empty_cells_do_not_widen_bounds() {
        let (_, bounds) = rows_xml(vec![RowData::new(
            0,
            vec![RowCell::new(0, 1.0), RowCell::new(5, CellValue::Empty)],
        )]);
        assert_eq!(bounds.unwrap().to_a1(), "A1");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.xlsx");
        let sheets = vec![
            StreamSheet::new("Data", Vec::new()),
            StreamSheet::new("data", Vec::new()),
        ];
        let err = write_stream_multi_sheet(&path, sheets, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(!path.exists());
    }
}
