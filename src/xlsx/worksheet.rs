//! Pull parser for worksheet parts.
//!
//! One [`WorksheetReader`] drives both the full read (every row into a [`Sheet`]) and
//! the streaming read (row by row, with bound pushdown and cooperative cancellation).

use super::date;
use super::shared_strings::{read_string_item, SharedStringTable, StringItem};
use crate::error::{Error, Result, Warning};
use crate::model::{
    Cell, CellRange, CellRef, CellStyle, CellValue, ColProps, Formula, FormulaKind, RowProps,
    Sheet, StyleId,
};
use crate::security::{CellBudget, SecurityLimits};
use crate::xml;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared lookups needed to decode cell values.
#[derive(Debug, Clone)]
pub(crate) struct CellDecoder {
    pub strings: Arc<SharedStringTable>,
    /// Per `cellXfs` index: whether the number format is a date format
    pub date_xfs: Arc<[bool]>,
}

/// One parsed `<c>`: column, decoded value and raw `cellXfs` index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedCell {
    pub col: u32,
    pub value: CellValue,
    pub xf: u32,
}

/// One parsed `<row>`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedRow {
    pub index: u32,
    pub height: Option<f64>,
    pub hidden: bool,
    pub xf: Option<u32>,
    pub cells: Vec<ParsedCell>,
}

/// One `<col>` span.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColSpan {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub hidden: bool,
    pub xf: Option<u32>,
}

/// Row and column windows applied while parsing. Both are 0-based and inclusive.
#[derive(Debug, Clone, Default)]
pub(crate) struct Window {
    pub rows: Option<RangeInclusive<u32>>,
    pub cols: Option<RangeInclusive<u32>>,
}

/// Owned attributes of a `<c>` start tag.
struct CellAttrs {
    at: Option<CellRef>,
    cell_type: Option<String>,
    xf: u32,
}

impl CellAttrs {
    fn from_start(e: &BytesStart) -> Result<Self> {
        let at = match xml::attr(e, b"r") {
            Some(r) => Some(CellRef::parse(&r)?),
            None => None,
        };
        Ok(Self {
            at,
            cell_type: xml::attr(e, b"t"),
            xf: xml::attr_u32(e, b"s").unwrap_or(0),
        })
    }
}

/// Raw children of a `<c>`.
#[derive(Default)]
struct CellBody {
    v: Option<String>,
    formula: Option<(String, FormulaKind)>,
    inline: Option<StringItem>,
}

pub(crate) struct WorksheetReader<R: BufRead> {
    reader: Reader<R>,
    sheet: String,
    part: String,
    buf: Vec<u8>,
    cell_buf: Vec<u8>,
    item_buf: Vec<u8>,
    scratch: Vec<u8>,
    decoder: CellDecoder,
    limits: SecurityLimits,
    budget: CellBudget,
    window: Window,
    cols: Vec<ColSpan>,
    merges: Vec<CellRange>,
    warnings: Vec<Warning>,
    next_row: u32,
    rows_scanned: u64,
    events: u64,
    cancel: Option<(Arc<AtomicBool>, u64)>,
    finished: bool,
    cancelled: bool,
}

impl<R: BufRead> WorksheetReader<R> {
    pub fn new(
        input: R,
        sheet: &str,
        part: &str,
        decoder: CellDecoder,
        limits: &SecurityLimits,
    ) -> Self {
        Self {
            reader: xml::reader_from_bufread(input),
            sheet: sheet.to_string(),
            part: part.to_string(),
            buf: Vec::with_capacity(1024),
            cell_buf: Vec::with_capacity(256),
            item_buf: Vec::new(),
            scratch: Vec::new(),
            decoder,
            limits: limits.clone(),
            budget: CellBudget::new(limits),
            window: Window::default(),
            cols: Vec::new(),
            merges: Vec::new(),
            warnings: Vec::new(),
            next_row: 0,
            rows_scanned: 0,
            events: 0,
            cancel: None,
            finished: false,
            cancelled: false,
        }
    }

    /// Count `used` cells from earlier sheets against the cell limit.
    pub fn with_cells_used(mut self, used: u64) -> Self {
        self.budget = self.budget.with_used(used);
        self
    }

    /// Restrict parsing to a window; rows past the window end the scan.
    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    /// Check `flag` every `interval` XML events and stop when it is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>, interval: u64) -> Self {
        self.cancel = Some((flag, interval.max(1)));
        self
    }

    /// `<row>` elements the parser has opened, including skipped ones.
    pub fn rows_scanned(&self) -> u64 {
        self.rows_scanned
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn tick(&mut self) -> bool {
        self.events += 1;
        if let Some((flag, interval)) = &self.cancel {
            if self.events % interval == 0 && flag.load(Ordering::Relaxed) {
                self.cancelled = true;
                self.finished = true;
                return false;
            }
        }
        true
    }

    /// Next row inside the window, or `None` at the end of data.
    pub fn next_row(&mut self) -> Result<Option<ParsedRow>> {
        while !self.finished {
            if !self.tick() {
                return Ok(None);
            }
            self.buf.clear();
            let (start, is_empty) = match xml::read_event(&mut self.reader, &mut self.buf, &self.part)? {
                Event::Start(e) => (e.into_owned(), false),
                Event::Empty(e) => (e.into_owned(), true),
                Event::Eof => {
                    self.finished = true;
                    return Ok(None);
                }
                _ => continue,
            };

            match start.local_name().as_ref() {
                b"row" => {
                    let index = match xml::attr_u32(&start, b"r") {
                        Some(r) if r > 0 => r - 1,
                        _ => self.next_row,
                    };
                    self.next_row = index + 1;
                    self.rows_scanned += 1;

                    if let Some(rows) = &self.window.rows {
                        if index > *rows.end() {
                            self.finished = true;
                            return Ok(None);
                        }
                        if index < *rows.start() {
                            if !is_empty {
                                let name = start.name().as_ref().to_vec();
                                xml::skip_element(&mut self.reader, &name, &mut self.scratch, &self.part)?;
                            }
                            continue;
                        }
                    }

                    let custom_format = xml::attr_bool(&start, b"customFormat", false);
                    let mut row = ParsedRow {
                        index,
                        height: xml::attr_f64(&start, b"ht")
                            .filter(|_| xml::attr_bool(&start, b"customHeight", true)),
                        hidden: xml::attr_bool(&start, b"hidden", false),
                        xf: xml::attr_u32(&start, b"s").filter(|_| custom_format),
                        cells: Vec::new(),
                    };
                    if !is_empty {
                        row.cells = self.read_cells(index)?;
                    }
                    return Ok(Some(row));
                }
                b"col" => self.cols.push(ColSpan {
                    min: xml::attr_u32(&start, b"min").unwrap_or(1).saturating_sub(1),
                    max: xml::attr_u32(&start, b"max").unwrap_or(1).saturating_sub(1),
                    width: xml::attr_f64(&start, b"width")
                        .filter(|_| xml::attr_bool(&start, b"customWidth", true)),
                    hidden: xml::attr_bool(&start, b"hidden", false),
                    xf: xml::attr_u32(&start, b"style"),
                }),
                b"mergeCell" => {
                    if let Some(r) = xml::attr(&start, b"ref") {
                        self.merges.push(CellRange::parse(&r)?);
                    }
                }
                b"extLst" | b"sheetViews" | b"conditionalFormatting" | b"dataValidations" => {
                    if !is_empty {
                        let name = start.name().as_ref().to_vec();
                        xml::skip_element(&mut self.reader, &name, &mut self.scratch, &self.part)?;
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn read_cells(&mut self, row: u32) -> Result<Vec<ParsedCell>> {
        let mut cells = Vec::new();
        let mut next_col = 0u32;

        loop {
            if !self.tick() {
                return Ok(cells);
            }
            self.cell_buf.clear();
            let (attrs, is_empty, name) =
                match xml::read_event(&mut self.reader, &mut self.cell_buf, &self.part)? {
                    Event::Start(e) if e.local_name().as_ref() == b"c" => {
                        (CellAttrs::from_start(&e)?, false, e.name().as_ref().to_vec())
                    }
                    Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                        (CellAttrs::from_start(&e)?, true, Vec::new())
                    }
                    Event::End(e) if e.local_name().as_ref() == b"row" => break,
                    Event::Eof => return Err(Error::xml(&self.part, "unexpected end of row")),
                    _ => continue,
                };

            let at = attrs.at.unwrap_or(CellRef::new(next_col, row));
            next_col = at.col + 1;

            if let Some(cols) = &self.window.cols {
                if !cols.contains(&at.col) {
                    if !is_empty {
                        xml::skip_element(&mut self.reader, &name, &mut self.scratch, &self.part)?;
                    }
                    continue;
                }
            }

            self.budget.charge()?;
            let body = if is_empty {
                CellBody::default()
            } else {
                self.read_cell_body()?
            };
            let value = self.decode(at, &attrs, body)?;
            cells.push(ParsedCell {
                col: at.col,
                value,
                xf: attrs.xf,
            });
        }
        Ok(cells)
    }

    fn read_cell_body(&mut self) -> Result<CellBody> {
        let mut body = CellBody::default();
        // Element whose text is being collected: v or f.
        let mut target: Option<u8> = None;
        let mut text = String::new();

        loop {
            self.cell_buf.clear();
            match xml::read_event(&mut self.reader, &mut self.cell_buf, &self.part)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"v" => {
                        target = Some(b'v');
                        text.clear();
                    }
                    b"f" => {
                        body.formula = Some((String::new(), formula_kind(&e)));
                        target = Some(b'f');
                        text.clear();
                    }
                    b"is" => {
                        body.inline = Some(read_string_item(
                            &mut self.reader,
                            &mut self.item_buf,
                            &mut self.scratch,
                            &self.part,
                            b"is",
                            &self.limits,
                        )?);
                    }
                    _ => {
                        let name = e.name().as_ref().to_vec();
                        xml::skip_element(&mut self.reader, &name, &mut self.scratch, &self.part)?;
                    }
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"f" => body.formula = Some((String::new(), formula_kind(&e))),
                    b"v" => body.v = Some(String::new()),
                    _ => {}
                },
                Event::Text(t) if target.is_some() => {
                    text.push_str(&t.unescape().map_err(|e| Error::xml(&self.part, e))?);
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" => {
                        body.v = Some(std::mem::take(&mut text));
                        target = None;
                    }
                    b"f" => {
                        if let Some((expr, _)) = body.formula.as_mut() {
                            *expr = xml::decode_escapes(&text).into_owned();
                        }
                        text.clear();
                        target = None;
                    }
                    b"c" => break,
                    _ => {}
                },
                Event::Eof => return Err(Error::xml(&self.part, "unexpected end of cell")),
                _ => {}
            }
        }
        Ok(body)
    }

    fn decode(&mut self, at: CellRef, attrs: &CellAttrs, body: CellBody) -> Result<CellValue> {
        let v = body.v;
        let value = match attrs.cell_type.as_deref() {
            Some("s") => match v.as_deref().map(str::trim) {
                Some(raw) => {
                    let index: usize = raw.parse().map_err(|_| {
                        Error::InvalidData(format!(
                            "{}!{}: bad shared string index {raw:?}",
                            self.sheet,
                            at.to_a1()
                        ))
                    })?;
                    match self.decoder.strings.resolve(index) {
                        Some(item) => item.to_value(),
                        None => {
                            self.warn(Warning::SharedStringOutOfRange {
                                sheet: self.sheet.clone(),
                                cell: at.to_a1(),
                                index,
                            });
                            CellValue::Empty
                        }
                    }
                }
                None => CellValue::Empty,
            },
            Some("inlineStr") => match body.inline {
                Some(item) => item.to_value(),
                None => CellValue::Text(String::new()),
            },
            Some("str") => {
                let raw = xml::normalize_newlines(v.as_deref().unwrap_or_default()).into_owned();
                let text = xml::decode_escapes(&raw).into_owned();
                crate::security::check_string(&self.part, &text, &self.limits)?;
                CellValue::Text(text)
            }
            Some("b") => CellValue::Bool(matches!(v.as_deref().map(str::trim), Some("1" | "true"))),
            Some("e") => CellValue::Error(v.unwrap_or_default()),
            Some("d") => match v.as_deref() {
                Some(raw) => CellValue::DateTime(date::iso_to_serial(raw).ok_or_else(|| {
                    Error::InvalidData(format!(
                        "{}!{}: bad date {raw:?}",
                        self.sheet,
                        at.to_a1()
                    ))
                })?),
                None => CellValue::Empty,
            },
            None | Some("n") => match v.as_deref().map(str::trim) {
                Some("") | None => CellValue::Empty,
                Some(raw) => {
                    let n: f64 = raw.parse().map_err(|_| {
                        Error::InvalidData(format!(
                            "{}!{}: bad number {raw:?}",
                            self.sheet,
                            at.to_a1()
                        ))
                    })?;
                    if self.is_date_xf(attrs.xf) {
                        CellValue::DateTime(n)
                    } else {
                        CellValue::Number(n)
                    }
                }
            },
            Some(other) => {
                self.warn(Warning::UnsupportedCellType {
                    sheet: self.sheet.clone(),
                    cell: at.to_a1(),
                    cell_type: other.to_string(),
                });
                v.map_or(CellValue::Empty, CellValue::Text)
            }
        };

        Ok(match body.formula {
            Some((expr, kind)) => CellValue::Formula(Formula {
                expr,
                cached: (!value.is_empty()).then(|| Box::new(value)),
                kind,
            }),
            None => value,
        })
    }

    fn is_date_xf(&self, xf: u32) -> bool {
        self.decoder
            .date_xfs
            .get(xf as usize)
            .copied()
            .unwrap_or(false)
    }

    fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Parse every row into `sheet`, mapping `cellXfs` indices through `palette`.
    pub fn read_into(mut self, sheet: &mut Sheet, palette: &[CellStyle]) -> Result<Vec<Warning>> {
        let mut mapper = StyleMapper::new(palette);
        while let Some(row) = self.next_row()? {
            let props = RowProps {
                height: row.height,
                hidden: row.hidden,
                style: row.xf.and_then(|xf| mapper.local(sheet, xf, None, &mut self.warnings)),
            };
            if !props.is_default() {
                sheet.rows.insert(row.index, props);
            }
            for cell in row.cells {
                let at = CellRef::new(cell.col, row.index);
                let style = mapper.local(sheet, cell.xf, Some(at), &mut self.warnings);
                sheet.cells.insert(at, Cell { value: cell.value, style });
            }
        }

        for span in std::mem::take(&mut self.cols) {
            let props = ColProps {
                width: span.width,
                hidden: span.hidden,
                style: span.xf.and_then(|xf| mapper.local(sheet, xf, None, &mut self.warnings)),
            };
            for col in span.min..=span.max.min(crate::model::MAX_COL) {
                sheet.cols.insert(col, props.clone());
            }
        }
        sheet.merged = std::mem::take(&mut self.merges);
        Ok(self.warnings)
    }
}

fn formula_kind(e: &BytesStart) -> FormulaKind {
    match xml::attr(e, b"t").as_deref() {
        Some("shared") => FormulaKind::Shared {
            index: xml::attr_u32(e, b"si").unwrap_or(0),
            range: xml::attr(e, b"ref"),
        },
        Some("array") => FormulaKind::Array {
            range: xml::attr(e, b"ref").unwrap_or_default(),
        },
        _ => FormulaKind::Normal,
    }
}

/// Maps global `cellXfs` indices to a sheet's local [`StyleId`]s.
struct StyleMapper<'a> {
    palette: &'a [CellStyle],
    cache: HashMap<u32, StyleId>,
}

impl<'a> StyleMapper<'a> {
    fn new(palette: &'a [CellStyle]) -> Self {
        Self {
            palette,
            cache: HashMap::new(),
        }
    }

    fn local(
        &mut self,
        sheet: &mut Sheet,
        xf: u32,
        at: Option<CellRef>,
        warnings: &mut Vec<Warning>,
    ) -> Option<StyleId> {
        if xf == 0 {
            return None;
        }
        if let Some(id) = self.cache.get(&xf) {
            return Some(*id);
        }
        match self.palette.get(xf as usize) {
            Some(style) => {
                let id = sheet.styles.intern(style.clone());
                self.cache.insert(xf, id);
                Some(id)
            }
            None => {
                let warning = Warning::StyleOutOfRange {
                    sheet: sheet.name.clone(),
                    cell: at.map(|a| a.to_a1()).unwrap_or_default(),
                    index: xf,
                };
                log::warn!("{warning}");
                warnings.push(warning);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NumFmt;
    use std::io::Cursor;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<dimension ref="A1:D4"/>
<sheetViews><sheetView workbookViewId="0"><selection activeCell="B2"/></sheetView></sheetViews>
<cols><col min="2" max="3" width="20" customWidth="1"/></cols>
<sheetData>
<row r="1" ht="30" customHeight="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>7</v></c><c r="C1" t="inlineStr"><is><t xml:space="preserve"> inline </t></is></c></row>
<row r="2"><c r="A2"><v>42.5</v></c><c r="B2" s="1"><v>45000</v></c><c r="C2" t="b"><v>1</v></c><c r="D2" t="e"><v>#DIV/0!</v></c></row>
<row r="3"><c r="A3"><f>SUM(A2:A2)</f><v>42.5</v></c><c r="B3" t="str"><f t="shared" ref="B3:B4" si="0">"x"&amp;A2</f><v>x42.5</v></c><c r="C3" t="d"><v>2023-03-15T12:00:00</v></c></row>
<row r="4" hidden="1"><c r="B4" t="str"><f t="shared" si="0"/><v>x</v></c><c r="D4" t="weird"><v>?</v></c></row>
</sheetData>
<mergeCells count="1"><mergeCell ref="A4:C4"/></mergeCells>
</worksheet>"#;

    fn decoder() -> CellDecoder {
        let strings =
            SharedStringTable::parse("<sst><si><t>Hello</t></si></sst>", &SecurityLimits::default())
                .unwrap();
        CellDecoder {
            strings: Arc::new(strings),
            date_xfs: Arc::from(vec![false, true]),
        }
    }

    fn palette() -> Vec<CellStyle> {
        vec![
            CellStyle::default(),
            CellStyle::with_num_fmt(NumFmt::Builtin(14)),
        ]
    }

    fn reader(xml: &str) -> WorksheetReader<Cursor<Vec<u8>>> {
        WorksheetReader::new(
            Cursor::new(xml.as_bytes().to_vec()),
            "Data",
            "xl/worksheets/sheet1.xml",
            decoder(),
            &SecurityLimits::default(),
        )
    }

    #[test]
    fn test_read_full_sheet() {
        let mut sheet = Sheet::new("Data");
        let warnings = reader(SHEET).read_into(&mut sheet, &palette()).unwrap();

        assert_eq!(sheet.value(CellRef::parse("A1").unwrap()), &CellValue::Text("Hello".into()));
        assert_eq!(sheet.value(CellRef::parse("B1").unwrap()), &CellValue::Empty);
        assert_eq!(
            sheet.value(CellRef::parse("C1").unwrap()),
            &CellValue::Text(" inline ".into())
        );
        assert_eq!(sheet.value(CellRef::parse("A2").unwrap()), &CellValue::Number(42.5));
        assert_eq!(sheet.value(CellRef::parse("B2").unwrap()), &CellValue::DateTime(45000.0));
        assert_eq!(sheet.value(CellRef::parse("C2").unwrap()), &CellValue::Bool(true));
        assert_eq!(
            sheet.value(CellRef::parse("D2").unwrap()),
            &CellValue::Error("#DIV/0!".into())
        );
        assert_eq!(
            sheet.value(CellRef::parse("C3").unwrap()),
            &CellValue::DateTime(45000.5)
        );

        match sheet.value(CellRef::parse("B3").unwrap()) {
            CellValue::Formula(f) => {
                assert_eq!(f.expr, "\"x\"&A2");
                assert_eq!(
                    f.kind,
                    FormulaKind::Shared {
                        index: 0,
                        range: Some("B3:B4".into())
                    }
                );
                assert_eq!(f.cached.as_deref(), Some(&CellValue::Text("x42.5".into())));
            }
            other => panic!("expected formula, got {other:?}"),
        }

        assert_eq!(sheet.style_of(CellRef::parse("B2").unwrap()), Some(&palette()[1]));
        assert_eq!(sheet.rows[&0].height, Some(30.0));
        assert!(sheet.rows[&3].hidden);
        assert_eq!(sheet.cols[&1].width, Some(20.0));
        assert_eq!(sheet.cols[&2].width, Some(20.0));
        assert_eq!(sheet.merged, vec![CellRange::parse("A4:C4").unwrap()]);

        assert_eq!(warnings.len(), 2);
        assert!(matches!(
            &warnings[0],
            Warning::SharedStringOutOfRange { index: 7, cell, .. } if cell == "B1"
        ));
        assert!(matches!(&warnings[1], Warning::UnsupportedCellType { .. }));
    }

    #[test]
    fn test_row_window_stops_early() {
        let mut xml = String::from("<worksheet><sheetData>");
        for r in 1..=1000 {
            xml.push_str(&format!(r#"<row r="{r}"><c r="A{r}"><v>{r}</v></c></row>"#));
        }
        xml.push_str("</sheetData></worksheet>");

        let mut reader = reader(&xml).with_window(Window {
            rows: Some(9..=19),
            cols: None,
        });
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().unwrap() {
            rows.push(row.index);
        }
        assert_eq!(rows, (9..=19).collect::<Vec<_>>());
        assert_eq!(reader.rows_scanned(), 21);
    }

    #[test]
    fn test_column_window_and_implicit_refs() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c><c><v>3</v></c></row><row><c r="C2"><v>4</v></c></row></sheetData></worksheet>"#;
        let mut reader = reader(xml).with_window(Window {
            rows: None,
            cols: Some(1..=2),
        });
        let first = reader.next_row().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(
            first.cells.iter().map(|c| c.col).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let second = reader.next_row().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.cells[0].value, CellValue::Number(4.0));
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_cancel_flag_stops_scan() {
        let mut xml = String::from("<worksheet><sheetData>");
        for r in 1..=100 {
            xml.push_str(&format!(r#"<row r="{r}"><c><v>{r}</v></c></row>"#));
        }
        xml.push_str("</sheetData></worksheet>");

        let flag = Arc::new(AtomicBool::new(true));
        let mut reader = reader(&xml).with_cancel(flag, 4);
        let mut count = 0;
        while reader.next_row().unwrap().is_some() {
            count += 1;
        }
        assert!(reader.cancelled());
        assert!(count < 5);
    }

    #[test]
    fn test_cell_budget() {
        let xml = r#"<worksheet><sheetData><row r="1"><c><v>1</v></c><c><v>2</v></c><c><v>3</v></c></row></sheetData></worksheet>"#;
        let mut reader = WorksheetReader::new(
            Cursor::new(xml.as_bytes().to_vec()),
            "s",
            "p",
            decoder(),
            &SecurityLimits::default().with_max_cell_count(2),
        );
        assert!(reader.next_row().unwrap_err().is_security());
    }
}
