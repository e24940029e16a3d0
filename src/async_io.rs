//! Async wrappers. Reading and writing are blocking ZIP and file work, so both run on
//! Tokio's blocking pool.

use crate::error::{Error, Result};
use crate::model::Workbook;
use crate::options::{ReadOptions, WriteOptions};
use crate::reader::{read_with_options, ReadOutcome};
use crate::writer::{write_with_options, WriteOutcome};
use std::path::PathBuf;
use tokio::task::{self, JoinError};

fn join_error(err: JoinError) -> Error {
    Error::InvalidData(format!("background task failed: {err}"))
}

/// Read a workbook without blocking the async runtime.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> xlpack::Result<()> {
/// let outcome = xlpack::read_async("book.xlsx", xlpack::ReadOptions::default()).await?;
/// println!("{} sheets", outcome.workbook.len());
/// # Ok(())
/// # }
/// ```
pub async fn read_async(path: impl Into<PathBuf>, options: ReadOptions) -> Result<ReadOutcome> {
    let path = path.into();
    task::spawn_blocking(move || read_with_options(&path, &options))
        .await
        .map_err(join_error)?
}

/// Write a workbook without blocking the async runtime.
///
/// The workbook is moved onto the blocking pool; clone it first to keep editing.
pub async fn write_async(
    workbook: Workbook,
    path: impl Into<PathBuf>,
    options: WriteOptions,
) -> Result<WriteOutcome> {
    let path = path.into();
    task::spawn_blocking(move || write_with_options(&workbook, &path, &options))
        .await
        .map_err(join_error)?
}
