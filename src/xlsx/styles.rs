//! `xl/styles.xml`: parsing, the global style index, and generation or patching.

use crate::error::Result;
use crate::model::{
    Alignment, Border, BorderSide, Cell, CanonicalKey, CellStyle, CellValue, Color, Fill, Font,
    NumFmt, Sheet, StyleId, StyleRegistry,
};
use crate::xml::{self, NS_MAIN};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufRead, Write};

pub(crate) const STYLES_PART: &str = "xl/styles.xml";

/// First id available for custom number formats.
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// Built-in formats used for unstyled date/time cells.
const DATE_NUM_FMT: u32 = 14;
const DATETIME_NUM_FMT: u32 = 22;

fn json_key<T: Serialize + std::fmt::Debug>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// One `<xf>` record of `cellXfs`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XfRecord {
    pub num_fmt_id: u32,
    pub font_id: u32,
    pub fill_id: u32,
    pub border_id: u32,
    pub alignment: Alignment,
}

/// Parsed content of `xl/styles.xml`.
#[derive(Debug, Clone, Default)]
pub(crate) struct StylesPart {
    /// Custom number formats: numFmtId -> formatCode
    pub num_fmts: Vec<(u32, String)>,
    pub fonts: Vec<Font>,
    pub fills: Vec<Fill>,
    pub borders: Vec<Border>,
    pub cell_xfs: Vec<XfRecord>,
}

pub(crate) fn read_color(e: &BytesStart) -> Option<Color> {
    if let Some(rgb) = xml::attr(e, b"rgb") {
        return Some(Color::Rgb(rgb));
    }
    if let Some(theme) = xml::attr_u32(e, b"theme") {
        return Some(Color::Theme {
            theme,
            tint: xml::attr_f64(e, b"tint"),
        });
    }
    if let Some(indexed) = xml::attr_u32(e, b"indexed") {
        return Some(Color::Indexed(indexed));
    }
    if xml::attr_bool(e, b"auto", false) {
        return Some(Color::Auto);
    }
    None
}

/// Read font properties until the end of `end` (`font` in styles, `rPr` in runs).
pub(crate) fn read_font<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    end: &[u8],
) -> Result<Font> {
    let mut font = Font::default();
    loop {
        buf.clear();
        match xml::read_event(reader, buf, part)? {
            Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                b"b" => font.bold = xml::attr_bool(&e, b"val", true),
                b"i" => font.italic = xml::attr_bool(&e, b"val", true),
                b"strike" => font.strike = xml::attr_bool(&e, b"val", true),
                b"u" => {
                    font.underline =
                        Some(xml::attr(&e, b"val").unwrap_or_else(|| "single".to_string()))
                }
                b"sz" => font.size = xml::attr_f64(&e, b"val"),
                b"color" => font.color = read_color(&e),
                b"name" | b"rFont" => font.name = xml::attr(&e, b"val"),
                b"family" => font.family = xml::attr_u32(&e, b"val"),
                b"scheme" => font.scheme = xml::attr(&e, b"val"),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == end => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(font)
}

fn read_fill<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Fill> {
    let mut fill = Fill::default();
    loop {
        buf.clear();
        match xml::read_event(reader, buf, STYLES_PART)? {
            Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                b"patternFill" => {
                    fill.pattern =
                        xml::attr(&e, b"patternType").unwrap_or_else(|| "none".to_string())
                }
                b"fgColor" => fill.fg = read_color(&e),
                b"bgColor" => fill.bg = read_color(&e),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"fill" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fill)
}

fn read_border<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Border> {
    let mut border = Border::default();
    // Edge whose <color> child is being read.
    let mut current: Option<Vec<u8>> = None;

    fn side<'a>(border: &'a mut Border, name: &[u8]) -> Option<&'a mut BorderSide> {
        match name {
            b"left" | b"start" => Some(&mut border.left),
            b"right" | b"end" => Some(&mut border.right),
            b"top" => Some(&mut border.top),
            b"bottom" => Some(&mut border.bottom),
            b"diagonal" => Some(&mut border.diagonal),
            _ => None,
        }
    }

    loop {
        buf.clear();
        match xml::read_event(reader, buf, STYLES_PART)? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                if let Some(s) = side(&mut border, &name) {
                    s.style = xml::attr(&e, b"style");
                    current = Some(name);
                }
            }
            Event::Empty(e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"color" {
                    if let Some(edge) = current.as_deref() {
                        if let Some(s) = side(&mut border, edge) {
                            s.color = read_color(&e);
                        }
                    }
                } else if let Some(s) = side(&mut border, &name) {
                    s.style = xml::attr(&e, b"style");
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"border" {
                    break;
                }
                if current.as_deref() == Some(e.local_name().as_ref()) {
                    current = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(border)
}

fn read_alignment(e: &BytesStart) -> Alignment {
    Alignment {
        horizontal: xml::attr(e, b"horizontal"),
        vertical: xml::attr(e, b"vertical"),
        wrap_text: xml::attr_bool(e, b"wrapText", false),
        indent: xml::attr_u32(e, b"indent").unwrap_or(0),
        text_rotation: xml::attr_u32(e, b"textRotation").unwrap_or(0),
        shrink_to_fit: xml::attr_bool(e, b"shrinkToFit", false),
    }
}

fn xf_attrs(e: &BytesStart) -> XfRecord {
    XfRecord {
        num_fmt_id: xml::attr_u32(e, b"numFmtId").unwrap_or(0),
        font_id: xml::attr_u32(e, b"fontId").unwrap_or(0),
        fill_id: xml::attr_u32(e, b"fillId").unwrap_or(0),
        border_id: xml::attr_u32(e, b"borderId").unwrap_or(0),
        alignment: Alignment::default(),
    }
}

impl StylesPart {
    /// Parse styles from `xl/styles.xml` content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut styles = Self::default();
        let mut reader = xml::reader_from_str(content);
        let mut buf = Vec::new();
        let mut inner = Vec::new();
        let mut section: Option<Vec<u8>> = None;

        loop {
            buf.clear();
            match xml::read_event(&mut reader, &mut buf, STYLES_PART)? {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    match (section.as_deref(), name.as_slice()) {
                        (None, b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs") => {
                            section = Some(name)
                        }
                        (None, b"styleSheet") => {}
                        (None, _) => {
                            let full = e.name().as_ref().to_vec();
                            xml::skip_element(&mut reader, &full, &mut inner, STYLES_PART)?;
                        }
                        (Some(b"fonts"), b"font") => {
                            styles
                                .fonts
                                .push(read_font(&mut reader, &mut inner, STYLES_PART, b"font")?);
                        }
                        (Some(b"fills"), b"fill") => {
                            styles.fills.push(read_fill(&mut reader, &mut inner)?)
                        }
                        (Some(b"borders"), b"border") => {
                            styles.borders.push(read_border(&mut reader, &mut inner)?)
                        }
                        (Some(b"cellXfs"), b"xf") => {
                            let mut xf = xf_attrs(&e);
                            loop {
                                inner.clear();
                                match xml::read_event(&mut reader, &mut inner, STYLES_PART)? {
                                    Event::Empty(c) | Event::Start(c)
                                        if c.local_name().as_ref() == b"alignment" =>
                                    {
                                        xf.alignment = read_alignment(&c)
                                    }
                                    Event::End(c) if c.local_name().as_ref() == b"xf" => break,
                                    Event::Eof => break,
                                    _ => {}
                                }
                            }
                            styles.cell_xfs.push(xf);
                        }
                        _ => {
                            let full = e.name().as_ref().to_vec();
                            xml::skip_element(&mut reader, &full, &mut inner, STYLES_PART)?;
                        }
                    }
                }
                Event::Empty(e) => match (section.as_deref(), e.local_name().as_ref()) {
                    (Some(b"numFmts"), b"numFmt") => {
                        if let Some(id) = xml::attr_u32(&e, b"numFmtId") {
                            let code = xml::attr(&e, b"formatCode").unwrap_or_default();
                            styles.num_fmts.push((id, code));
                        }
                    }
                    (Some(b"fonts"), b"font") => styles.fonts.push(Font::default()),
                    (Some(b"fills"), b"fill") => styles.fills.push(Fill::default()),
                    (Some(b"borders"), b"border") => styles.borders.push(Border::default()),
                    (Some(b"cellXfs"), b"xf") => styles.cell_xfs.push(xf_attrs(&e)),
                    _ => {}
                },
                Event::End(e) => {
                    if section.as_deref() == Some(e.local_name().as_ref()) {
                        section = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(styles)
    }

    fn num_fmt(&self, id: u32) -> NumFmt {
        match self.num_fmts.iter().find(|(i, _)| *i == id) {
            Some((_, code)) => NumFmt::Custom(code.clone()),
            None => NumFmt::Builtin(id),
        }
    }

    /// Resolve every `cellXfs` record into a [`CellStyle`].
    pub fn cell_styles(&self) -> Vec<CellStyle> {
        self.cell_xfs
            .iter()
            .map(|xf| CellStyle {
                font: self.fonts.get(xf.font_id as usize).cloned().unwrap_or_default(),
                fill: self.fills.get(xf.fill_id as usize).cloned().unwrap_or_default(),
                border: self
                    .borders
                    .get(xf.border_id as usize)
                    .cloned()
                    .unwrap_or_default(),
                num_fmt: self.num_fmt(xf.num_fmt_id),
                alignment: xf.alignment.clone(),
            })
            .collect()
    }
}

/// How one sheet's local [`StyleId`]s map onto global `cellXfs` indices.
#[derive(Debug, Clone, Default)]
pub(crate) struct SheetStyleMap {
    xf: Vec<u32>,
    date_xf: u32,
    datetime_xf: u32,
}

impl SheetStyleMap {
    /// Global index for a sheet-local style.
    pub fn xf(&self, id: Option<StyleId>) -> u32 {
        id.and_then(|id| self.xf.get(id.0 as usize).copied())
            .unwrap_or(0)
    }

    /// Global index for a cell; unstyled dates get a date format.
    pub fn cell_xf(&self, cell: &Cell) -> u32 {
        self.value_xf(cell.style, &cell.value)
    }

    /// Global index for a value with an optional sheet-local style.
    pub fn value_xf(&self, style: Option<StyleId>, value: &CellValue) -> u32 {
        match (style, value) {
            (Some(id), _) => self.xf(Some(id)),
            (None, CellValue::DateTime(serial)) if serial.fract() == 0.0 => self.date_xf,
            (None, CellValue::DateTime(_)) => self.datetime_xf,
            _ => 0,
        }
    }
}

/// Ordered, deduplicated global style table (`cellXfs`).
///
/// Equal canonical keys always map to the same index. When seeded from a source
/// workbook, every source index is kept and new styles are appended after them.
#[derive(Debug, Clone)]
pub(crate) struct StyleIndex {
    styles: Vec<CellStyle>,
    by_key: HashMap<CanonicalKey, u32>,
    preserved: usize,
}

impl StyleIndex {
    /// Fresh index with the default style at 0.
    pub fn new() -> Self {
        let mut index = Self {
            styles: Vec::new(),
            by_key: HashMap::new(),
            preserved: 0,
        };
        index.intern(&CellStyle::default());
        index
    }

    /// Index keeping all source styles at their original positions.
    pub fn seeded(source: &[CellStyle]) -> Self {
        if source.is_empty() {
            return Self::new();
        }
        let mut by_key = HashMap::with_capacity(source.len());
        for (i, style) in source.iter().enumerate() {
            by_key.entry(style.canonical_key()).or_insert(i as u32);
        }
        Self {
            styles: source.to_vec(),
            by_key,
            preserved: source.len(),
        }
    }

    /// Build the index for a workbook and remap the given sheets.
    ///
    /// With a `seed` (the source `cellXfs`) existing indices are preserved; without,
    /// indices are assigned in first-seen order.
    pub fn from_model(seed: Option<&[CellStyle]>, sheets: &[&Sheet]) -> (Self, Vec<SheetStyleMap>) {
        let mut index = match seed {
            Some(source) => Self::seeded(source),
            None => Self::new(),
        };
        let maps = sheets.iter().map(|s| index.map_sheet(s)).collect();
        (index, maps)
    }

    /// Return the index of an equal style, appending it if new.
    pub fn intern(&mut self, style: &CellStyle) -> u32 {
        let key = style.canonical_key();
        if let Some(i) = self.by_key.get(&key) {
            return *i;
        }
        let i = self.styles.len() as u32;
        self.styles.push(style.clone());
        self.by_key.insert(key, i);
        i
    }

    /// Map a sheet-local registry onto global indices.
    pub fn map_registry(&mut self, registry: &StyleRegistry) -> Vec<u32> {
        registry.iter().map(|(_, s)| self.intern(s)).collect()
    }

    fn map_sheet(&mut self, sheet: &Sheet) -> SheetStyleMap {
        let xf = self.map_registry(&sheet.styles);
        let needs_dates = sheet
            .cells
            .values()
            .any(|c| c.style.is_none() && matches!(c.value, CellValue::DateTime(_)));
        let (date_xf, datetime_xf) = if needs_dates {
            self.date_styles()
        } else {
            (0, 0)
        };
        SheetStyleMap {
            xf,
            date_xf,
            datetime_xf,
        }
    }

    /// Indices of the date and date-time styles used for unstyled date cells.
    pub fn date_styles(&mut self) -> (u32, u32) {
        (
            self.intern(&CellStyle::with_num_fmt(NumFmt::Builtin(DATE_NUM_FMT))),
            self.intern(&CellStyle::with_num_fmt(NumFmt::Builtin(DATETIME_NUM_FMT))),
        )
    }

    /// Style map for a stream-written sheet with a local palette.
    pub fn map_palette(&mut self, palette: &StyleRegistry) -> SheetStyleMap {
        let xf = self.map_registry(palette);
        let (date_xf, datetime_xf) = self.date_styles();
        SheetStyleMap {
            xf,
            date_xf,
            datetime_xf,
        }
    }

    /// All styles in index order.
    pub fn styles(&self) -> &[CellStyle] {
        &self.styles
    }

    /// Styles appended after the preserved source styles.
    pub fn new_styles(&self) -> &[CellStyle] {
        &self.styles[self.preserved..]
    }

    /// Whether styles beyond the source were added.
    pub fn has_new_styles(&self) -> bool {
        self.styles.len() > self.preserved
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }
}

/// Component tables built while emitting xf records.
#[derive(Default)]
struct Tables {
    fonts: Vec<Font>,
    font_keys: HashMap<String, u32>,
    fills: Vec<Fill>,
    fill_keys: HashMap<String, u32>,
    borders: Vec<Border>,
    border_keys: HashMap<String, u32>,
    num_fmts: Vec<(u32, String)>,
    next_num_fmt: u32,
}

impl Tables {
    fn fresh() -> Self {
        let mut t = Self {
            next_num_fmt: FIRST_CUSTOM_NUM_FMT,
            ..Self::default()
        };
        t.fill(&Fill::default());
        t.fill(&Fill {
            pattern: "gray125".to_string(),
            ..Fill::default()
        });
        t
    }

    fn from_source(source: &StylesPart) -> Self {
        let mut t = Self {
            num_fmts: source.num_fmts.clone(),
            next_num_fmt: source
                .num_fmts
                .iter()
                .map(|(id, _)| id + 1)
                .max()
                .unwrap_or(0)
                .max(FIRST_CUSTOM_NUM_FMT),
            ..Self::default()
        };
        for font in &source.fonts {
            t.fonts.push(font.clone());
            t.font_keys
                .entry(json_key(&font.canonical()))
                .or_insert(t.fonts.len() as u32 - 1);
        }
        for fill in &source.fills {
            t.fills.push(fill.clone());
            t.fill_keys
                .entry(json_key(&fill.canonical()))
                .or_insert(t.fills.len() as u32 - 1);
        }
        for border in &source.borders {
            t.borders.push(border.clone());
            t.border_keys
                .entry(json_key(&border.canonical()))
                .or_insert(t.borders.len() as u32 - 1);
        }
        t
    }

    fn font(&mut self, font: &Font) -> u32 {
        let key = json_key(&font.canonical());
        if let Some(i) = self.font_keys.get(&key) {
            return *i;
        }
        let i = self.fonts.len() as u32;
        self.fonts.push(font.clone());
        self.font_keys.insert(key, i);
        i
    }

    fn fill(&mut self, fill: &Fill) -> u32 {
        let key = json_key(&fill.canonical());
        if let Some(i) = self.fill_keys.get(&key) {
            return *i;
        }
        let i = self.fills.len() as u32;
        self.fills.push(fill.clone());
        self.fill_keys.insert(key, i);
        i
    }

    fn border(&mut self, border: &Border) -> u32 {
        let key = json_key(&border.canonical());
        if let Some(i) = self.border_keys.get(&key) {
            return *i;
        }
        let i = self.borders.len() as u32;
        self.borders.push(border.clone());
        self.border_keys.insert(key, i);
        i
    }

    fn num_fmt(&mut self, fmt: &NumFmt) -> u32 {
        match fmt.canonical() {
            NumFmt::Builtin(id) => id,
            NumFmt::Custom(code) => {
                if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| *c == code) {
                    return *id;
                }
                let id = self.next_num_fmt;
                self.next_num_fmt += 1;
                self.num_fmts.push((id, code));
                id
            }
        }
    }

    fn xf(&mut self, style: &CellStyle) -> XfRecord {
        XfRecord {
            num_fmt_id: self.num_fmt(&style.num_fmt),
            font_id: self.font(&style.font),
            fill_id: self.fill(&style.fill),
            border_id: self.border(&style.border),
            alignment: style.alignment.clone(),
        }
    }
}

fn color_start(tag: &str, color: &Color) -> BytesStart<'static> {
    let mut e = BytesStart::new(tag.to_string());
    match color {
        Color::Rgb(rgb) => e.push_attribute(("rgb", rgb.as_str())),
        Color::Theme { theme, tint } => {
            e.push_attribute(("theme", theme.to_string().as_str()));
            if let Some(t) = tint {
                e.push_attribute(("tint", t.to_string().as_str()));
            }
        }
        Color::Indexed(i) => e.push_attribute(("indexed", i.to_string().as_str())),
        Color::Auto => e.push_attribute(("auto", "1")),
    }
    e
}

fn val_elem<W: Write>(w: &mut quick_xml::Writer<W>, tag: &str, val: &str) -> Result<()> {
    w.write_event(Event::Empty(
        BytesStart::new(tag).with_attributes([("val", val)]),
    ))?;
    Ok(())
}

/// Write font properties. `run` selects `<rPr>`/`<rFont>` spelling for rich-text runs.
pub(crate) fn write_font<W: Write>(
    w: &mut quick_xml::Writer<W>,
    font: &Font,
    run: bool,
) -> Result<()> {
    let tag = if run { "rPr" } else { "font" };
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    if font.bold {
        w.write_event(Event::Empty(BytesStart::new("b")))?;
    }
    if font.italic {
        w.write_event(Event::Empty(BytesStart::new("i")))?;
    }
    if font.strike {
        w.write_event(Event::Empty(BytesStart::new("strike")))?;
    }
    if let Some(u) = &font.underline {
        if u == "single" {
            w.write_event(Event::Empty(BytesStart::new("u")))?;
        } else {
            val_elem(w, "u", u)?;
        }
    }

    // Styles-part fonts without face or size get the workbook defaults.
    let default_face = !run && font.name.is_none() && font.size.is_none();
    if let Some(sz) = font.size {
        val_elem(w, "sz", &sz.to_string())?;
    } else if default_face {
        val_elem(w, "sz", "11")?;
    }
    if let Some(color) = &font.color {
        w.write_event(Event::Empty(color_start("color", color)))?;
    }
    let name_tag = if run { "rFont" } else { "name" };
    if let Some(name) = &font.name {
        val_elem(w, name_tag, name)?;
    } else if default_face {
        val_elem(w, name_tag, "Calibri")?;
    }
    if let Some(family) = font.family {
        val_elem(w, "family", &family.to_string())?;
    } else if default_face {
        val_elem(w, "family", "2")?;
    }
    if let Some(scheme) = &font.scheme {
        val_elem(w, "scheme", scheme)?;
    } else if default_face {
        val_elem(w, "scheme", "minor")?;
    }
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_fill<W: Write>(w: &mut quick_xml::Writer<W>, fill: &Fill) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("fill")))?;
    let pattern = BytesStart::new("patternFill").with_attributes([("patternType", fill.pattern.as_str())]);
    if fill.fg.is_none() && fill.bg.is_none() {
        w.write_event(Event::Empty(pattern))?;
    } else {
        w.write_event(Event::Start(pattern))?;
        if let Some(fg) = &fill.fg {
            w.write_event(Event::Empty(color_start("fgColor", fg)))?;
        }
        if let Some(bg) = &fill.bg {
            w.write_event(Event::Empty(color_start("bgColor", bg)))?;
        }
        w.write_event(Event::End(BytesEnd::new("patternFill")))?;
    }
    w.write_event(Event::End(BytesEnd::new("fill")))?;
    Ok(())
}

fn write_border<W: Write>(w: &mut quick_xml::Writer<W>, border: &Border) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new("border")))?;
    for (tag, side) in [
        ("left", &border.left),
        ("right", &border.right),
        ("top", &border.top),
        ("bottom", &border.bottom),
        ("diagonal", &border.diagonal),
    ] {
        let mut e = BytesStart::new(tag);
        if let Some(style) = &side.style {
            e.push_attribute(("style", style.as_str()));
        }
        match &side.color {
            Some(color) => {
                w.write_event(Event::Start(e))?;
                w.write_event(Event::Empty(color_start("color", color)))?;
                w.write_event(Event::End(BytesEnd::new(tag)))?;
            }
            None => {
                w.write_event(Event::Empty(e))?;
            }
        }
    }
    w.write_event(Event::End(BytesEnd::new("border")))?;
    Ok(())
}

fn write_num_fmt<W: Write>(w: &mut quick_xml::Writer<W>, id: u32, code: &str) -> Result<()> {
    w.write_event(Event::Empty(BytesStart::new("numFmt").with_attributes([
        ("numFmtId", id.to_string().as_str()),
        ("formatCode", code),
    ])))?;
    Ok(())
}

fn write_xf<W: Write>(w: &mut quick_xml::Writer<W>, xf: &XfRecord) -> Result<()> {
    let mut e = BytesStart::new("xf");
    e.push_attribute(("numFmtId", xf.num_fmt_id.to_string().as_str()));
    e.push_attribute(("fontId", xf.font_id.to_string().as_str()));
    e.push_attribute(("fillId", xf.fill_id.to_string().as_str()));
    e.push_attribute(("borderId", xf.border_id.to_string().as_str()));
    e.push_attribute(("xfId", "0"));
    if xf.num_fmt_id != 0 {
        e.push_attribute(("applyNumberFormat", "1"));
    }
    if xf.font_id != 0 {
        e.push_attribute(("applyFont", "1"));
    }
    if xf.fill_id != 0 {
        e.push_attribute(("applyFill", "1"));
    }
    if xf.border_id != 0 {
        e.push_attribute(("applyBorder", "1"));
    }
    if xf.alignment.is_default() {
        w.write_event(Event::Empty(e))?;
        return Ok(());
    }

    e.push_attribute(("applyAlignment", "1"));
    w.write_event(Event::Start(e))?;
    let a = &xf.alignment;
    let mut ae = BytesStart::new("alignment");
    if let Some(h) = &a.horizontal {
        ae.push_attribute(("horizontal", h.as_str()));
    }
    if let Some(v) = &a.vertical {
        ae.push_attribute(("vertical", v.as_str()));
    }
    if a.text_rotation != 0 {
        ae.push_attribute(("textRotation", a.text_rotation.to_string().as_str()));
    }
    if a.wrap_text {
        ae.push_attribute(("wrapText", "1"));
    }
    if a.indent != 0 {
        ae.push_attribute(("indent", a.indent.to_string().as_str()));
    }
    if a.shrink_to_fit {
        ae.push_attribute(("shrinkToFit", "1"));
    }
    w.write_event(Event::Empty(ae))?;
    w.write_event(Event::End(BytesEnd::new("xf")))?;
    Ok(())
}

fn counted(tag: &str, count: usize) -> BytesStart<'static> {
    BytesStart::new(tag.to_string()).with_attributes([("count", count.to_string().as_str())])
}

/// Generate a complete `xl/styles.xml` for an index.
pub(crate) fn write_styles_part(index: &StyleIndex, pretty: bool) -> Result<Vec<u8>> {
    let mut tables = Tables::fresh();
    let xfs: Vec<XfRecord> = index.styles().iter().map(|s| tables.xf(s)).collect();

    let mut w = xml::writer(Vec::new(), pretty);
    xml::write_decl(&mut w)?;
    w.write_event(Event::Start(
        BytesStart::new("styleSheet").with_attributes([("xmlns", NS_MAIN)]),
    ))?;

    if !tables.num_fmts.is_empty() {
        w.write_event(Event::Start(counted("numFmts", tables.num_fmts.len())))?;
        for (id, code) in &tables.num_fmts {
            write_num_fmt(&mut w, *id, code)?;
        }
        w.write_event(Event::End(BytesEnd::new("numFmts")))?;
    }

    w.write_event(Event::Start(counted("fonts", tables.fonts.len())))?;
    for font in &tables.fonts {
        write_font(&mut w, font, false)?;
    }
    w.write_event(Event::End(BytesEnd::new("fonts")))?;

    w.write_event(Event::Start(counted("fills", tables.fills.len())))?;
    for fill in &tables.fills {
        write_fill(&mut w, fill)?;
    }
    w.write_event(Event::End(BytesEnd::new("fills")))?;

    w.write_event(Event::Start(counted("borders", tables.borders.len())))?;
    for border in &tables.borders {
        write_border(&mut w, border)?;
    }
    w.write_event(Event::End(BytesEnd::new("borders")))?;

    w.write_event(Event::Start(counted("cellStyleXfs", 1)))?;
    w.write_event(Event::Empty(BytesStart::new("xf").with_attributes([
        ("numFmtId", "0"),
        ("fontId", "0"),
        ("fillId", "0"),
        ("borderId", "0"),
    ])))?;
    w.write_event(Event::End(BytesEnd::new("cellStyleXfs")))?;

    w.write_event(Event::Start(counted("cellXfs", xfs.len())))?;
    for xf in &xfs {
        write_xf(&mut w, xf)?;
    }
    w.write_event(Event::End(BytesEnd::new("cellXfs")))?;

    w.write_event(Event::Start(counted("cellStyles", 1)))?;
    w.write_event(Event::Empty(BytesStart::new("cellStyle").with_attributes([
        ("name", "Normal"),
        ("xfId", "0"),
        ("builtinId", "0"),
    ])))?;
    w.write_event(Event::End(BytesEnd::new("cellStyles")))?;

    w.write_event(Event::End(BytesEnd::new("styleSheet")))?;
    Ok(w.into_inner())
}

/// Records to append to an existing styles part.
struct Additions {
    num_fmts: Vec<(u32, String)>,
    fonts: Vec<Font>,
    fills: Vec<Fill>,
    borders: Vec<Border>,
    xfs: Vec<XfRecord>,
    source_num_fmts: usize,
    source_fonts: usize,
    source_fills: usize,
    source_borders: usize,
    source_xfs: usize,
}

impl Additions {
    fn total(&self, section: &[u8]) -> usize {
        match section {
            b"numFmts" => self.source_num_fmts + self.num_fmts.len(),
            b"fonts" => self.source_fonts + self.fonts.len(),
            b"fills" => self.source_fills + self.fills.len(),
            b"borders" => self.source_borders + self.borders.len(),
            b"cellXfs" => self.source_xfs + self.xfs.len(),
            _ => 0,
        }
    }

    fn has(&self, section: &[u8]) -> bool {
        match section {
            b"numFmts" => !self.num_fmts.is_empty(),
            b"fonts" => !self.fonts.is_empty(),
            b"fills" => !self.fills.is_empty(),
            b"borders" => !self.borders.is_empty(),
            b"cellXfs" => !self.xfs.is_empty(),
            _ => false,
        }
    }

    fn write<W: Write>(&self, w: &mut quick_xml::Writer<W>, section: &[u8]) -> Result<()> {
        match section {
            b"numFmts" => {
                for (id, code) in &self.num_fmts {
                    write_num_fmt(w, *id, code)?;
                }
            }
            b"fonts" => {
                for font in &self.fonts {
                    write_font(w, font, false)?;
                }
            }
            b"fills" => {
                for fill in &self.fills {
                    write_fill(w, fill)?;
                }
            }
            b"borders" => {
                for border in &self.borders {
                    write_border(w, border)?;
                }
            }
            b"cellXfs" => {
                for xf in &self.xfs {
                    write_xf(w, xf)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

const PATCHED_SECTIONS: [&[u8]; 5] = [b"numFmts", b"fonts", b"fills", b"borders", b"cellXfs"];

/// Append the index's new styles to the original `xl/styles.xml`.
///
/// Existing records and every section the model does not cover (cell styles, dxfs,
/// table styles, colours) pass through untouched; only `count` attributes change.
pub(crate) fn patch_styles_part(
    original: &str,
    source: &StylesPart,
    index: &StyleIndex,
) -> Result<Vec<u8>> {
    if !index.has_new_styles() {
        return Ok(original.as_bytes().to_vec());
    }

    let mut tables = Tables::from_source(source);
    let xfs: Vec<XfRecord> = index.new_styles().iter().map(|s| tables.xf(s)).collect();
    let additions = Additions {
        num_fmts: tables.num_fmts[source.num_fmts.len()..].to_vec(),
        fonts: tables.fonts[source.fonts.len()..].to_vec(),
        fills: tables.fills[source.fills.len()..].to_vec(),
        borders: tables.borders[source.borders.len()..].to_vec(),
        xfs,
        source_num_fmts: source.num_fmts.len(),
        source_fonts: source.fonts.len(),
        source_fills: source.fills.len(),
        source_borders: source.borders.len(),
        source_xfs: source.cell_xfs.len(),
    };

    let mut reader = xml::reader_from_str(original);
    let mut w = quick_xml::Writer::new(Vec::with_capacity(original.len() + 1024));
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_num_fmts = false;

    loop {
        buf.clear();
        let event = xml::read_event(&mut reader, &mut buf, STYLES_PART)?;
        match event {
            Event::Start(e) => {
                depth += 1;
                let local = e.local_name().as_ref().to_vec();
                if depth == 2 && PATCHED_SECTIONS.contains(&local.as_slice()) {
                    if local == b"numFmts" {
                        seen_num_fmts = true;
                    } else if !seen_num_fmts && additions.has(b"numFmts") {
                        write_inserted_num_fmts(&mut w, &additions)?;
                        seen_num_fmts = true;
                    }
                    if additions.has(&local) {
                        let count = additions.total(&local).to_string();
                        w.write_event(Event::Start(xml::with_attr(&e, "count", Some(&count))))?;
                    } else {
                        w.write_event(Event::Start(e))?;
                    }
                } else {
                    w.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) => {
                let local = e.local_name().as_ref().to_vec();
                if depth == 1 && PATCHED_SECTIONS.contains(&local.as_slice()) {
                    if local != b"numFmts" && !seen_num_fmts && additions.has(b"numFmts") {
                        write_inserted_num_fmts(&mut w, &additions)?;
                    }
                    if local == b"numFmts" {
                        seen_num_fmts = true;
                    }
                    if additions.has(&local) {
                        let count = additions.total(&local).to_string();
                        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        w.write_event(Event::Start(xml::with_attr(&e, "count", Some(&count))))?;
                        additions.write(&mut w, &local)?;
                        w.write_event(Event::End(BytesEnd::new(name)))?;
                        continue;
                    }
                }
                w.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                if depth == 2 && PATCHED_SECTIONS.contains(&e.local_name().as_ref()) {
                    let local = e.local_name().as_ref().to_vec();
                    additions.write(&mut w, &local)?;
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

fn write_inserted_num_fmts<W: Write>(
    w: &mut quick_xml::Writer<W>,
    additions: &Additions,
) -> Result<()> {
    w.write_event(Event::Start(counted("numFmts", additions.num_fmts.len())))?;
    additions.write(w, b"numFmts")?;
    w.write_event(Event::End(BytesEnd::new("numFmts")))?;
    Ok(())
}

/// Whether a `cellXfs` index formats numbers as dates, per parsed styles.
pub(crate) fn date_flags(styles: &[CellStyle]) -> Vec<bool> {
    styles.iter().map(|s| s.num_fmt.is_date()).collect()
}
