//! Cell model structures.

use super::Font;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Zero-based cell coordinate.
///
/// Ordering is row-major so a `BTreeMap<CellRef, _>` iterates in worksheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based)
    pub col: u32,
}

impl PartialOrd for CellRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

/// Largest row index allowed by SpreadsheetML (0-based).
pub const MAX_ROW: u32 = 1_048_575;
/// Largest column index allowed by SpreadsheetML (0-based, `XFD`).
pub const MAX_COL: u32 = 16_383;

impl CellRef {
    /// Create a reference from zero-based column and row.
    pub fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    /// Parse an A1-style reference such as `B12` or `$B$12`.
    pub fn parse(a1: &str) -> Result<Self> {
        let bytes = a1.as_bytes();
        let mut i = 0;
        if bytes.first() == Some(&b'$') {
            i += 1;
        }
        let col_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let letters = &a1[col_start..i];
        if bytes.get(i) == Some(&b'$') {
            i += 1;
        }
        let digits = &a1[i..];
        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidReference(a1.to_string()));
        }
        let col = column_index(letters).ok_or_else(|| Error::InvalidReference(a1.to_string()))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidReference(a1.to_string()))?;
        if row == 0 || row - 1 > MAX_ROW || col > MAX_COL {
            return Err(Error::InvalidReference(a1.to_string()));
        }
        Ok(Self { row: row - 1, col })
    }

    /// Format as an A1-style reference.
    pub fn to_a1(&self) -> String {
        let mut out = column_name(self.col);
        out.push_str(&(self.row + 1).to_string());
        out
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Convert column letters (`A`, `AB`, ...) to a zero-based index.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (b.to_ascii_uppercase() - b'A' + 1) as u32;
    }
    Some(col - 1)
}

/// Convert a zero-based column index to letters.
pub fn column_name(mut col: u32) -> String {
    let mut buf = Vec::with_capacity(3);
    col += 1;
    while col > 0 {
        let rem = (col - 1) % 26;
        buf.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

/// An inclusive rectangular range of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRange {
    /// Top-left corner
    pub start: CellRef,
    /// Bottom-right corner
    pub end: CellRef,
}

impl CellRange {
    /// Create a range, normalising the corners.
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellRef::new(a.col.max(b.col), a.row.max(b.row)),
        }
    }

    /// Parse `A1:C3` or a single-cell `A1`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellRef::parse(a)?, CellRef::parse(b)?)),
            None => {
                let r = CellRef::parse(s)?;
                Ok(Self::new(r, r))
            }
        }
    }

    /// Whether the range covers a single cell.
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Whether the range contains a cell.
    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Grow the range to include a cell.
    pub fn extend(&mut self, cell: CellRef) {
        self.start.row = self.start.row.min(cell.row);
        self.start.col = self.start.col.min(cell.col);
        self.end.row = self.end.row.max(cell.row);
        self.end.col = self.end.col.max(cell.col);
    }

    /// Format as `A1:C3` (or `A1` for a single cell).
    pub fn to_a1(&self) -> String {
        if self.is_single() {
            self.start.to_a1()
        } else {
            format!("{}:{}", self.start.to_a1(), self.end.to_a1())
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// One formatted run of rich text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Run text
    pub text: String,
    /// Run font; `None` inherits the cell font
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
}

impl TextRun {
    /// Create an unformatted run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: None,
        }
    }
}

/// Text with per-run formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    /// Runs in order
    pub runs: Vec<TextRun>,
}

impl RichText {
    /// Concatenated text of all runs.
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// How a formula is stored in the worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormulaKind {
    /// Ordinary cell formula
    #[default]
    Normal,
    /// Member of a shared formula group; the master carries text and `range`
    Shared {
        /// Shared group index (`si`)
        index: u32,
        /// Range covered, present on the master cell only
        #[serde(skip_serializing_if = "Option::is_none")]
        range: Option<String>,
    },
    /// Array formula over a range
    Array {
        /// Range covered
        range: String,
    },
}

/// A formula with its cached result. Formula text is never evaluated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Formula text without the leading `=`
    pub expr: String,
    /// Last calculated value, if the file carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<Box<CellValue>>,
    /// Storage kind
    #[serde(default)]
    pub kind: FormulaKind,
}

impl Formula {
    /// Create a normal formula without a cached value.
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            cached: None,
            kind: FormulaKind::Normal,
        }
    }

    /// Attach a cached value.
    pub fn with_cached(mut self, value: CellValue) -> Self {
        self.cached = Some(Box::new(value));
        self
    }
}

/// The value held by a cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    /// No value
    #[default]
    Empty,
    /// Plain text
    Text(String),
    /// Number
    Number(f64),
    /// Boolean
    Bool(bool),
    /// Formula with optional cached result
    Formula(Formula),
    /// Error literal such as `#DIV/0!`
    Error(String),
    /// Date/time as a spreadsheet serial number (1900 date system)
    DateTime(f64),
    /// Formatted text
    RichText(RichText),
}

impl CellValue {
    /// Whether the value is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Text content if this is a text-like value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content; dates give their serial, formulas their cached number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) | CellValue::DateTime(n) => Some(*n),
            CellValue::Formula(f) => f.cached.as_deref().and_then(CellValue::as_number),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Sheet-local style handle. Index into the owning sheet's style registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StyleId(pub u32);

/// A cell: value plus optional sheet-local style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell value
    pub value: CellValue,
    /// Sheet-local style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleId>,
}

impl Cell {
    /// Create an unstyled cell.
    pub fn new(value: impl Into<CellValue>) -> Self {
        Self {
            value: value.into(),
            style: None,
        }
    }

    /// Create a styled cell.
    pub fn styled(value: impl Into<CellValue>, style: StyleId) -> Self {
        Self {
            value: value.into(),
            style: Some(style),
        }
    }
}
