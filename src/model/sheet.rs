//! Worksheet model.

use super::{Cell, CellRange, CellRef, CellStyle, CellValue, StyleId, StyleRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row-level overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowProps {
    /// Custom height in points
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Hidden row
    #[serde(default)]
    pub hidden: bool,
    /// Default style for the row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleId>,
}

impl RowProps {
    /// Whether any override is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Column-level overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColProps {
    /// Custom width in characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Hidden column
    #[serde(default)]
    pub hidden: bool,
    /// Default style for the column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleId>,
}

/// Where a sheet came from in the source container.
///
/// Sheets created in memory have no origin and are always generated from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetOrigin {
    /// Position of the sheet in the source workbook (0-based)
    pub index: usize,
    /// Worksheet part path, e.g. `xl/worksheets/sheet1.xml`
    pub part: String,
    /// Relationship id in `xl/_rels/workbook.xml.rels`
    pub rel_id: String,
    /// `sheetId` attribute in `xl/workbook.xml`
    pub sheet_id: u32,
}

/// Sheet visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetState {
    /// Visible
    #[default]
    Visible,
    /// Hidden, can be unhidden from the UI
    Hidden,
    /// Hidden, only unhidden programmatically
    VeryHidden,
}

impl SheetState {
    pub(crate) fn as_attr(&self) -> Option<&'static str> {
        match self {
            SheetState::Visible => None,
            SheetState::Hidden => Some("hidden"),
            SheetState::VeryHidden => Some("veryHidden"),
        }
    }

    pub(crate) fn from_attr(s: &str) -> Self {
        match s {
            "hidden" => SheetState::Hidden,
            "veryHidden" => SheetState::VeryHidden,
            _ => SheetState::Visible,
        }
    }
}

/// A worksheet: sparse cells plus row/column overrides and merged ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// Sheet name as shown on the tab
    pub name: String,
    /// Visibility
    #[serde(default)]
    pub state: SheetState,
    /// Cells keyed by coordinate, row-major
    #[serde(default)]
    pub cells: BTreeMap<CellRef, Cell>,
    /// Row overrides keyed by row index
    #[serde(default)]
    pub rows: BTreeMap<u32, RowProps>,
    /// Column overrides keyed by column index
    #[serde(default)]
    pub cols: BTreeMap<u32, ColProps>,
    /// Merged ranges
    #[serde(default)]
    pub merged: Vec<CellRange>,
    /// Formats referenced by this sheet's [`StyleId`]s
    #[serde(default)]
    pub styles: StyleRegistry,
    /// Source location, if read from a container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SheetOrigin>,
}

impl Sheet {
    /// Create an empty sheet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get a cell.
    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.cells.get(&at)
    }

    /// Get a cell by A1 reference.
    pub fn cell_a1(&self, a1: &str) -> Option<&Cell> {
        CellRef::parse(a1).ok().and_then(|r| self.cells.get(&r))
    }

    /// Value of a cell, `Empty` when absent.
    pub fn value(&self, at: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(&at).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    /// Set a cell value, keeping its style.
    pub fn set_value(&mut self, at: CellRef, value: impl Into<CellValue>) {
        self.cells.entry(at).or_default().value = value.into();
    }

    /// Set a cell value and format.
    pub fn set_styled(&mut self, at: CellRef, value: impl Into<CellValue>, style: CellStyle) {
        let id = self.styles.intern(style);
        self.cells.insert(at, Cell::styled(value, id));
    }

    /// Remove a cell.
    pub fn clear(&mut self, at: CellRef) -> Option<Cell> {
        self.cells.remove(&at)
    }

    /// Format of a cell, if styled.
    pub fn style_of(&self, at: CellRef) -> Option<&CellStyle> {
        self.cells
            .get(&at)
            .and_then(|c| c.style)
            .and_then(|id| self.styles.get(id))
    }

    /// Add a merged range.
    pub fn merge(&mut self, range: CellRange) {
        if !self.merged.contains(&range) {
            self.merged.push(range);
        }
    }

    /// Bounding range of all cells, `None` for an empty sheet.
    pub fn used_range(&self) -> Option<CellRange> {
        let mut iter = self.cells.keys();
        let first = *iter.next()?;
        let mut range = CellRange::new(first, first);
        for r in iter {
            range.extend(*r);
        }
        Some(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Font;

    #[test]
    fn test_set_and_read_cells() {
        let mut sheet = Sheet::new("Data");
        sheet.set_value(CellRef::new(1, 2), "hello");
        sheet.set_value(CellRef::new(0, 0), 1.5);
        assert_eq!(sheet.value(CellRef::new(1, 2)), &CellValue::Text("hello".into()));
        assert_eq!(sheet.cell_a1("A1").unwrap().value, CellValue::Number(1.5));
        assert_eq!(sheet.value(CellRef::new(9, 9)), &CellValue::Empty);
        assert_eq!(sheet.used_range().unwrap().to_a1(), "A1:B3");
    }

    #[test]
    fn test_styled_cells_share_ids() {
        let mut sheet = Sheet::new("S");
        let bold = CellStyle {
            font: Font {
                bold: true,
                ..Default::default()
            },
            ..Default::default()
        };
        sheet.set_styled(CellRef::new(0, 0), "a", bold.clone());
        sheet.set_styled(CellRef::new(1, 0), "b", bold.clone());
        assert_eq!(sheet.styles.len(), 1);
        assert_eq!(sheet.style_of(CellRef::new(1, 0)), Some(&bold));

        sheet.set_value(CellRef::new(1, 0), "c");
        assert_eq!(sheet.style_of(CellRef::new(1, 0)), Some(&bold));
    }

    #[test]
    fn test_empty_sheet_has_no_range() {
        assert!(Sheet::new("x").used_range().is_none());
    }
}
