//! Worksheet generation: fresh parts and splicing into an original part.

use super::shared_strings::{write_string_item, SharedStringTable, StringItem};
use super::styles::SheetStyleMap;
use crate::error::Result;
use crate::model::{CellRange, CellRef, CellValue, ColProps, Formula, FormulaKind, Sheet};
use crate::xml::{self, NS_MAIN, NS_REL};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

/// Where text cell values go.
pub(crate) enum StringSink<'a> {
    /// Interned into the shared string table (`t="s"`)
    Shared(&'a mut SharedStringTable),
    /// Written in the cell (`t="inlineStr"`)
    Inline,
}

/// Row attributes as written.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RowAttrs {
    pub height: Option<f64>,
    pub hidden: bool,
    pub xf: Option<u32>,
}

/// Serializes rows and cells.
pub(crate) struct CellEmitter<'a> {
    sink: StringSink<'a>,
    escape_formulas: bool,
}

fn needs_injection_escape(s: &str) -> bool {
    s.starts_with(['=', '+', '-', '@'])
}

fn text_elem<W: Write>(w: &mut quick_xml::Writer<W>, tag: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn number_text(n: f64) -> Option<String> {
    n.is_finite().then(|| n.to_string())
}

impl<'a> CellEmitter<'a> {
    pub fn new(sink: StringSink<'a>, escape_formulas: bool) -> Self {
        Self {
            sink,
            escape_formulas,
        }
    }

    fn guard_item(&self, item: StringItem) -> StringItem {
        if !self.escape_formulas {
            return item;
        }
        match item {
            StringItem::Plain(s) if needs_injection_escape(&s) => StringItem::Plain(format!("'{s}")),
            StringItem::Rich(mut rich) => {
                if let Some(first) = rich.runs.first_mut() {
                    if needs_injection_escape(&first.text) {
                        first.text.insert(0, '\'');
                    }
                }
                StringItem::Rich(rich)
            }
            other => other,
        }
    }

    /// Write one `<c>`. Empty unstyled cells are omitted.
    pub fn cell<W: Write>(
        &mut self,
        w: &mut quick_xml::Writer<W>,
        at: CellRef,
        value: &CellValue,
        xf: u32,
    ) -> Result<()> {
        let r = at.to_a1();
        let mut c = BytesStart::new("c");
        c.push_attribute(("r", r.as_str()));
        if xf != 0 {
            c.push_attribute(("s", xf.to_string().as_str()));
        }

        match value {
            CellValue::Empty => {
                if xf != 0 {
                    w.write_event(Event::Empty(c))?;
                }
            }
            CellValue::Text(_) | CellValue::RichText(_) => {
                let item = match StringItem::from_value(value) {
                    Some(item) => self.guard_item(item),
                    None => return Ok(()),
                };
                match &mut self.sink {
                    StringSink::Shared(sst) => {
                        let index = sst.intern_or_lookup(item);
                        c.push_attribute(("t", "s"));
                        w.write_event(Event::Start(c))?;
                        text_elem(w, "v", &index.to_string())?;
                    }
                    StringSink::Inline => {
                        c.push_attribute(("t", "inlineStr"));
                        w.write_event(Event::Start(c))?;
                        w.write_event(Event::Start(BytesStart::new("is")))?;
                        write_string_item(w, &item)?;
                        w.write_event(Event::End(BytesEnd::new("is")))?;
                    }
                }
                w.write_event(Event::End(BytesEnd::new("c")))?;
            }
            CellValue::Number(n) | CellValue::DateTime(n) => {
                match number_text(*n) {
                    Some(v) => {
                        w.write_event(Event::Start(c))?;
                        text_elem(w, "v", &v)?;
                    }
                    None => {
                        c.push_attribute(("t", "e"));
                        w.write_event(Event::Start(c))?;
                        text_elem(w, "v", "#NUM!")?;
                    }
                }
                w.write_event(Event::End(BytesEnd::new("c")))?;
            }
            CellValue::Bool(b) => {
                c.push_attribute(("t", "b"));
                w.write_event(Event::Start(c))?;
                text_elem(w, "v", if *b { "1" } else { "0" })?;
                w.write_event(Event::End(BytesEnd::new("c")))?;
            }
            CellValue::Error(e) => {
                c.push_attribute(("t", "e"));
                w.write_event(Event::Start(c))?;
                text_elem(w, "v", e)?;
                w.write_event(Event::End(BytesEnd::new("c")))?;
            }
            CellValue::Formula(f) => self.formula(w, c, f)?,
        }
        Ok(())
    }

    fn formula<W: Write>(
        &mut self,
        w: &mut quick_xml::Writer<W>,
        mut c: BytesStart<'_>,
        f: &Formula,
    ) -> Result<()> {
        let cached: Option<(Option<&str>, String)> = match f.cached.as_deref() {
            None | Some(CellValue::Empty) => None,
            Some(CellValue::Number(n)) | Some(CellValue::DateTime(n)) => match number_text(*n) {
                Some(v) => Some((None, v)),
                None => Some((Some("e"), "#NUM!".to_string())),
            },
            Some(CellValue::Text(s)) => Some((Some("str"), s.clone())),
            Some(CellValue::RichText(r)) => Some((Some("str"), r.plain_text())),
            Some(CellValue::Bool(b)) => Some((Some("b"), if *b { "1" } else { "0" }.to_string())),
            Some(CellValue::Error(e)) => Some((Some("e"), e.clone())),
            // Nested formulas carry no cached value of their own.
            Some(CellValue::Formula(_)) => None,
        };
        if let Some((Some(t), _)) = &cached {
            c.push_attribute(("t", *t));
        }
        w.write_event(Event::Start(c))?;

        let mut fe = BytesStart::new("f");
        match &f.kind {
            FormulaKind::Normal => {}
            FormulaKind::Shared { index, range } => {
                fe.push_attribute(("t", "shared"));
                if let Some(range) = range {
                    fe.push_attribute(("ref", range.as_str()));
                }
                fe.push_attribute(("si", index.to_string().as_str()));
            }
            FormulaKind::Array { range } => {
                fe.push_attribute(("t", "array"));
                fe.push_attribute(("ref", range.as_str()));
            }
        }
        if f.expr.is_empty() {
            w.write_event(Event::Empty(fe))?;
        } else {
            w.write_event(Event::Start(fe))?;
            w.write_event(Event::Text(BytesText::new(&xml::encode_escapes(&f.expr))))?;
            w.write_event(Event::End(BytesEnd::new("f")))?;
        }
        if let Some((_, v)) = cached {
            text_elem(w, "v", &xml::encode_escapes(&v))?;
        }
        w.write_event(Event::End(BytesEnd::new("c")))?;
        Ok(())
    }

    /// Write one `<row>` with its cells. Rows with neither cells nor attributes are omitted.
    pub fn row<'c, W: Write>(
        &mut self,
        w: &mut quick_xml::Writer<W>,
        index: u32,
        attrs: &RowAttrs,
        cells: impl IntoIterator<Item = (u32, &'c CellValue, u32)>,
    ) -> Result<()> {
        let mut cells = cells
            .into_iter()
            .filter(|(_, v, xf)| !v.is_empty() || *xf != 0)
            .peekable();
        if cells.peek().is_none() && *attrs == RowAttrs::default() {
            return Ok(());
        }

        let mut row = BytesStart::new("row");
        row.push_attribute(("r", (index + 1).to_string().as_str()));
        if let Some(xf) = attrs.xf {
            row.push_attribute(("s", xf.to_string().as_str()));
            row.push_attribute(("customFormat", "1"));
        }
        if let Some(ht) = attrs.height {
            row.push_attribute(("ht", ht.to_string().as_str()));
            row.push_attribute(("customHeight", "1"));
        }
        if attrs.hidden {
            row.push_attribute(("hidden", "1"));
        }

        if cells.peek().is_none() {
            w.write_event(Event::Empty(row))?;
            return Ok(());
        }
        w.write_event(Event::Start(row))?;
        for (col, value, xf) in cells {
            self.cell(w, CellRef::new(col, index), value, xf)?;
        }
        w.write_event(Event::End(BytesEnd::new("row")))?;
        Ok(())
    }
}

/// Write `<sheetData>` for a sheet, rows interleaved with row-only overrides.
pub(crate) fn write_sheet_data<W: Write>(
    w: &mut quick_xml::Writer<W>,
    sheet: &Sheet,
    styles: &SheetStyleMap,
    emitter: &mut CellEmitter<'_>,
) -> Result<()> {
    let mut row_indices: Vec<u32> = sheet.rows.keys().copied().collect();
    let mut last = None;
    for at in sheet.cells.keys() {
        if last != Some(at.row) {
            row_indices.push(at.row);
            last = Some(at.row);
        }
    }
    row_indices.sort_unstable();
    row_indices.dedup();

    if row_indices.is_empty() {
        w.write_event(Event::Empty(BytesStart::new("sheetData")))?;
        return Ok(());
    }

    w.write_event(Event::Start(BytesStart::new("sheetData")))?;
    for index in row_indices {
        let attrs = match sheet.rows.get(&index) {
            Some(props) => RowAttrs {
                height: props.height,
                hidden: props.hidden,
                xf: props.style.map(|id| styles.xf(Some(id))),
            },
            None => RowAttrs::default(),
        };
        let cells = sheet
            .cells
            .range(CellRef::new(0, index)..=CellRef::new(crate::model::MAX_COL, index))
            .map(|(at, cell)| (at.col, &cell.value, styles.cell_xf(cell)));
        emitter.row(w, index, &attrs, cells)?;
    }
    w.write_event(Event::End(BytesEnd::new("sheetData")))?;
    Ok(())
}

/// Write `<cols>`, coalescing runs of identical adjacent columns.
pub(crate) fn write_cols<W: Write>(
    w: &mut quick_xml::Writer<W>,
    cols: &std::collections::BTreeMap<u32, ColProps>,
    styles: &SheetStyleMap,
) -> Result<()> {
    if cols.is_empty() {
        return Ok(());
    }

    let mut spans: Vec<(u32, u32, &ColProps)> = Vec::new();
    for (col, props) in cols {
        match spans.last_mut() {
            Some((_, max, p)) if *max + 1 == *col && *p == props => *max = *col,
            _ => spans.push((*col, *col, props)),
        }
    }

    w.write_event(Event::Start(BytesStart::new("cols")))?;
    for (min, max, props) in spans {
        let mut e = BytesStart::new("col");
        e.push_attribute(("min", (min + 1).to_string().as_str()));
        e.push_attribute(("max", (max + 1).to_string().as_str()));
        if let Some(width) = props.width {
            e.push_attribute(("width", width.to_string().as_str()));
        }
        if let Some(style) = props.style {
            e.push_attribute(("style", styles.xf(Some(style)).to_string().as_str()));
        }
        if props.hidden {
            e.push_attribute(("hidden", "1"));
        }
        if props.width.is_some() {
            e.push_attribute(("customWidth", "1"));
        }
        w.write_event(Event::Empty(e))?;
    }
    w.write_event(Event::End(BytesEnd::new("cols")))?;
    Ok(())
}

fn write_merges<W: Write>(w: &mut quick_xml::Writer<W>, merged: &[CellRange]) -> Result<()> {
    if merged.is_empty() {
        return Ok(());
    }
    w.write_event(Event::Start(
        BytesStart::new("mergeCells")
            .with_attributes([("count", merged.len().to_string().as_str())]),
    ))?;
    for range in merged {
        w.write_event(Event::Empty(
            BytesStart::new("mergeCell").with_attributes([("ref", range.to_a1().as_str())]),
        ))?;
    }
    w.write_event(Event::End(BytesEnd::new("mergeCells")))?;
    Ok(())
}

pub(crate) fn dimension_ref(range: Option<CellRange>) -> String {
    range.map_or_else(|| "A1".to_string(), |r| r.to_a1())
}

fn write_dimension<W: Write>(w: &mut quick_xml::Writer<W>, sheet: &Sheet) -> Result<()> {
    let r = dimension_ref(sheet.used_range());
    w.write_event(Event::Empty(
        BytesStart::new("dimension").with_attributes([("ref", r.as_str())]),
    ))?;
    Ok(())
}

/// Opening tag of a generated worksheet.
pub(crate) fn worksheet_start() -> BytesStart<'static> {
    BytesStart::new("worksheet").with_attributes([("xmlns", NS_MAIN), ("xmlns:r", NS_REL)])
}

/// Generate a complete worksheet part.
pub(crate) fn write_worksheet(
    sheet: &Sheet,
    styles: &SheetStyleMap,
    emitter: &mut CellEmitter<'_>,
    selected: bool,
    pretty: bool,
) -> Result<Vec<u8>> {
    let mut w = xml::writer(Vec::new(), pretty);
    xml::write_decl(&mut w)?;
    w.write_event(Event::Start(worksheet_start()))?;
    write_dimension(&mut w, sheet)?;
    write_sheet_views(&mut w, selected)?;
    w.write_event(Event::Empty(
        BytesStart::new("sheetFormatPr").with_attributes([("defaultRowHeight", "15")]),
    ))?;
    write_cols(&mut w, &sheet.cols, styles)?;
    write_sheet_data(&mut w, sheet, styles, emitter)?;
    write_merges(&mut w, &sheet.merged)?;
    write_page_margins(&mut w)?;
    w.write_event(Event::End(BytesEnd::new("worksheet")))?;
    Ok(w.into_inner())
}

pub(crate) fn write_sheet_views<W: Write>(
    w: &mut quick_xml::Writer<W>,
    selected: bool,
) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("sheetViews")))?;
    let mut view = BytesStart::new("sheetView");
    if selected {
        view.push_attribute(("tabSelected", "1"));
    }
    view.push_attribute(("workbookViewId", "0"));
    w.write_event(Event::Empty(view))?;
    w.write_event(Event::End(BytesEnd::new("sheetViews")))?;
    Ok(())
}

pub(crate) fn write_page_margins<W: Write>(w: &mut quick_xml::Writer<W>) -> Result<()> {
    w.write_event(Event::Empty(BytesStart::new("pageMargins").with_attributes([
        ("left", "0.7"),
        ("right", "0.7"),
        ("top", "0.75"),
        ("bottom", "0.75"),
        ("header", "0.3"),
        ("footer", "0.3"),
    ])))?;
    Ok(())
}

/// Worksheet children that follow `mergeCells` in schema order.
const AFTER_MERGE_CELLS: &[&[u8]] = &[
    b"phoneticPr",
    b"conditionalFormatting",
    b"dataValidations",
    b"hyperlinks",
    b"printOptions",
    b"pageMargins",
    b"pageSetup",
    b"headerFooter",
    b"rowBreaks",
    b"colBreaks",
    b"customProperties",
    b"cellWatches",
    b"ignoredErrors",
    b"smartTags",
    b"drawing",
    b"legacyDrawing",
    b"legacyDrawingHF",
    b"drawingHF",
    b"picture",
    b"oleObjects",
    b"controls",
    b"webPublishItems",
    b"tableParts",
    b"extLst",
];

/// Rewrite an original worksheet part with the model's data.
///
/// Only `dimension`, `cols`, `sheetData` and `mergeCells` are regenerated. Every other
/// element, including `r:id` references to drawings and comments, passes through.
pub(crate) fn splice_worksheet(
    original: &str,
    part: &str,
    sheet: &Sheet,
    styles: &SheetStyleMap,
    emitter: &mut CellEmitter<'_>,
) -> Result<Vec<u8>> {
    let mut reader = xml::reader_from_str(original);
    let mut w = quick_xml::Writer::new(Vec::with_capacity(original.len()));
    let mut buf = Vec::new();
    let mut scratch = Vec::new();
    let mut depth = 0usize;
    let mut cols_done = false;
    let mut data_done = false;
    let mut merges_done = false;

    loop {
        buf.clear();
        let event = xml::read_event(&mut reader, &mut buf, part)?;
        let (start, empty) = match &event {
            Event::Start(e) => (Some(e.local_name().as_ref().to_vec()), false),
            Event::Empty(e) => (Some(e.local_name().as_ref().to_vec()), true),
            _ => (None, false),
        };

        if let (Some(local), 1) = (start.as_deref(), depth) {
            let full = match &event {
                Event::Start(e) | Event::Empty(e) => e.name().as_ref().to_vec(),
                _ => Vec::new(),
            };
            let mut replaced = true;
            match local {
                b"dimension" => write_dimension(&mut w, sheet)?,
                b"cols" => {
                    write_cols(&mut w, &sheet.cols, styles)?;
                    cols_done = true;
                }
                b"sheetData" => {
                    if !cols_done {
                        write_cols(&mut w, &sheet.cols, styles)?;
                        cols_done = true;
                    }
                    write_sheet_data(&mut w, sheet, styles, emitter)?;
                    data_done = true;
                }
                b"mergeCells" => {
                    write_merges(&mut w, &sheet.merged)?;
                    merges_done = true;
                }
                other => {
                    if data_done && !merges_done && AFTER_MERGE_CELLS.contains(&other) {
                        write_merges(&mut w, &sheet.merged)?;
                        merges_done = true;
                    }
                    replaced = false;
                }
            }
            if replaced {
                if !empty {
                    xml::skip_element(&mut reader, &full, &mut scratch, part)?;
                }
                continue;
            }
        }

        match event {
            Event::Start(e) => {
                depth += 1;
                w.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                if depth == 1 && data_done && !merges_done {
                    write_merges(&mut w, &sheet.merged)?;
                    merges_done = true;
                }
                depth = depth.saturating_sub(1);
                w.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => w.write_event(other)?,
        }
    }
    Ok(w.into_inner())
}
