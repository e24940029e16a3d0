//! Constant-memory row streaming in both directions.

mod reader;
mod writer;

pub use reader::{
    read_stream, read_stream_bytes, read_stream_with_options, RowStream, SheetSelector,
    StreamBounds, StreamStats,
};
pub use writer::{
    write_stream, write_stream_multi_sheet, write_stream_with_options, StreamSheet,
};

use crate::model::{CellValue, StyleId};

/// One cell of a streamed row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCell {
    /// Column index (0-based)
    pub col: u32,
    /// Decoded value
    pub value: CellValue,
    /// Format in the stream's [`StyleRegistry`](crate::StyleRegistry)
    pub style: Option<StyleId>,
}

impl RowCell {
    /// An unstyled cell.
    pub fn new(col: u32, value: impl Into<CellValue>) -> Self {
        Self {
            col,
            value: value.into(),
            style: None,
        }
    }

    /// A cell with a format.
    pub fn styled(col: u32, value: impl Into<CellValue>, style: StyleId) -> Self {
        Self {
            col,
            value: value.into(),
            style: Some(style),
        }
    }
}

/// One streamed row. Cells are in ascending column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowData {
    /// Row index (0-based)
    pub index: u32,
    /// Custom height in points
    pub height: Option<f64>,
    /// Hidden row
    pub hidden: bool,
    /// Non-empty cells
    pub cells: Vec<RowCell>,
}

impl RowData {
    /// A row with the given cells and default attributes.
    pub fn new(index: u32, cells: Vec<RowCell>) -> Self {
        Self {
            index,
            cells,
            ..Default::default()
        }
    }

    /// Build a row from values placed in consecutive columns starting at A.
    pub fn from_values<V: Into<CellValue>>(index: u32, values: impl IntoIterator<Item = V>) -> Self {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(col, v)| RowCell::new(col as u32, v))
            .filter(|c| !c.value.is_empty())
            .collect();
        Self::new(index, cells)
    }
}
