//! # xlpack
//!
//! Minimal-change read/modify/write engine for XLSX containers.
//!
//! A workbook read with [`read`] stays bound to the container it came from. When it is
//! written back, the writer picks the cheapest correct strategy:
//!
//! - nothing changed: the original bytes are copied verbatim;
//! - some sheets changed: only those worksheet parts (and the workbook metadata they
//!   affect) are regenerated, every other entry is copied raw without inflating it;
//! - no source, or the source file changed on disk: the package is generated from the
//!   model.
//!
//! Large sheets can be streamed in either direction in constant memory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use xlpack::CellRef;
//!
//! let mut book = xlpack::read("report.xlsx")?.workbook;
//! book.sheet_mut(0)?.set_value(CellRef::new(1, 0), "updated");
//! let outcome = xlpack::write(&book, "report.xlsx")?;
//! println!("written with {:?}", outcome.strategy);
//! # Ok::<(), xlpack::Error>(())
//! ```
//!
//! ## Streaming
//!
//! ```no_run
//! use xlpack::{StreamBounds, RowData};
//!
//! // Read only rows 1000..=1999 of the first sheet
//! let bounds = StreamBounds::new().with_rows(999..=1998);
//! let mut total = 0.0;
//! for row in xlpack::read_stream("big.xlsx", 0, bounds)? {
//!     for cell in row?.cells {
//!         total += cell.value.as_number().unwrap_or(0.0);
//!     }
//! }
//!
//! // Write a sheet without holding it in memory
//! let rows = (0..1_000_000u32).map(|i| RowData::from_values(i, [f64::from(i)]));
//! xlpack::write_stream("out.xlsx", "Data", rows, None)?;
//! # Ok::<(), xlpack::Error>(())
//! ```
//!
//! ## Features
//!
//! - `async`: [`read_async`] and [`write_async`] on the Tokio blocking pool

pub mod container;
pub mod content_types;
pub mod detect;
pub mod error;
pub mod manifest;
pub mod model;
pub mod options;
pub mod relationships;
pub mod security;
pub mod stream;
pub mod tracker;

mod fs;
mod package;
mod reader;
mod source;
mod writer;
mod xlsx;
mod xml;

#[cfg(feature = "async")]
mod async_io;

// Re-exports
pub use container::OoxmlContainer;
pub use detect::{detect_format_from_bytes, detect_format_from_path, FormatType};
pub use error::{Error, Result, SecurityViolation, Warning};
pub use manifest::{classify, DomainPart, PartKind, PartManifest};
pub use model::*;
pub use options::{Compression, ReadOptions, SharedStringsPolicy, WriteOptions};
pub use reader::{read, read_bytes, read_with_options, ReadOutcome};
pub use relationships::{Relationship, RelationshipGraph, Relationships};
pub use security::SecurityLimits;
pub use source::{Fingerprint, SourceContext};
pub use stream::{
    read_stream, read_stream_bytes, read_stream_with_options, write_stream,
    write_stream_multi_sheet, write_stream_with_options, RowCell, RowData, RowStream,
    SheetSelector, StreamBounds, StreamSheet, StreamStats,
};
pub use tracker::ModificationTracker;
pub use writer::{select_strategy, write, write_to_bytes, write_with_options, WriteOutcome, WriteStrategy};
pub use xlsx::{iso_to_serial, serial_to_iso};

#[cfg(feature = "async")]
pub use async_io::{read_async, write_async};
