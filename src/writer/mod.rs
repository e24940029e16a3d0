//! Container writer.
//!
//! A write picks one of three strategies from the workbook's source binding:
//!
//! | Source | Fresh | Tracker | Strategy |
//! |---|---|---|---|
//! | none | - | - | [`WriteStrategy::FullRegenerate`] |
//! | present | no | any | [`WriteStrategy::FullRegenerate`] plus [`Warning::SourceChanged`] |
//! | present | yes | empty | [`WriteStrategy::VerbatimCopy`] |
//! | present | yes | non-empty | [`WriteStrategy::Surgical`] |
//! | present | saved over by xlpack | any | [`WriteStrategy::Surgical`] |
//!
//! A file written over its own source stays usable as a source: parts are copied from
//! the archive opened at read time, which still holds the original bytes.

mod full;
mod surgical;

pub(crate) use full::{fresh_entries, fresh_sheet_part, write_skeleton};

use crate::error::{Result, Warning};
use crate::fs::atomic_write;
use crate::model::Workbook;
use crate::options::WriteOptions;
use crate::source::{Freshness, SourceContext};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use zip::ZipWriter;

/// How a workbook was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteStrategy {
    /// Every part generated from the model
    FullRegenerate,
    /// The source container copied byte for byte
    VerbatimCopy,
    /// Modified parts regenerated, everything else copied
    Surgical,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Strategy that was used
    pub strategy: WriteStrategy,
    /// Non-fatal problems
    pub warnings: Vec<Warning>,
}

/// Start a new entry and write `bytes` into it.
pub(crate) fn put_part<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: &WriteOptions,
) -> Result<()> {
    zip.start_file(name, options.file_options())?;
    zip.write_all(bytes)?;
    Ok(())
}

/// Whether the model's sheet list is exactly the source sheet list.
fn sheets_match_source(workbook: &Workbook, source: &SourceContext) -> bool {
    let entries = &source.data.workbook.sheets;
    workbook.len() == entries.len()
        && workbook
            .sheets()
            .iter()
            .zip(entries)
            .enumerate()
            .all(|(i, (sheet, entry))| {
                sheet.origin.as_ref().is_some_and(|o| o.index == i)
                    && sheet.name == entry.name
                    && sheet.state == entry.state
            })
}

/// Pick the strategy for a workbook.
pub fn select_strategy(workbook: &Workbook) -> Result<(WriteStrategy, Vec<Warning>)> {
    let Some(source) = workbook.source() else {
        log::debug!("no source context: full regeneration");
        return Ok((WriteStrategy::FullRegenerate, Vec::new()));
    };

    match source.freshness()? {
        Freshness::Original => {}
        Freshness::SavedOver => {
            log::debug!("source was saved over: surgical write from the open archive");
            return Ok((WriteStrategy::Surgical, Vec::new()));
        }
        Freshness::Changed => {
            let warning = Warning::SourceChanged {
                path: source.location_label(),
            };
            log::warn!("{warning}");
            return Ok((WriteStrategy::FullRegenerate, vec![warning]));
        }
    }

    if source.tracker().is_empty() && sheets_match_source(workbook, source) {
        log::debug!("source unchanged: verbatim copy");
        Ok((WriteStrategy::VerbatimCopy, Vec::new()))
    } else {
        log::debug!("source modified: surgical write ({:?})", source.tracker());
        Ok((WriteStrategy::Surgical, Vec::new()))
    }
}

fn write_into<W: Write + Seek>(
    workbook: &Workbook,
    strategy: WriteStrategy,
    out: &mut W,
    options: &WriteOptions,
) -> Result<()> {
    match (strategy, workbook.source()) {
        (WriteStrategy::VerbatimCopy, Some(source)) => {
            let bytes = source.copy_original(out)?;
            log::debug!("copied {bytes} bytes verbatim");
            Ok(())
        }
        (WriteStrategy::Surgical, Some(source)) => {
            let mut zip = ZipWriter::new(out);
            surgical::write_surgical(workbook, source, &mut zip, options)?;
            zip.finish()?;
            Ok(())
        }
        _ => {
            let mut zip = ZipWriter::new(out);
            full::write_full(workbook.sheets(), &mut zip, options)?;
            zip.finish()?;
            Ok(())
        }
    }
}

/// Write a workbook to a file with default options.
///
/// The file is replaced atomically; on failure the destination is left untouched.
///
/// # Example
///
/// ```no_run
/// let mut book = xlpack::read("book.xlsx")?.workbook;
/// book.rename_sheet(1, "Summary")?;
/// let outcome = xlpack::write(&book, "book.xlsx")?;
/// assert_eq!(outcome.strategy, xlpack::WriteStrategy::Surgical);
/// # Ok::<(), xlpack::Error>(())
/// ```
pub fn write(workbook: &Workbook, path: impl AsRef<Path>) -> Result<WriteOutcome> {
    write_with_options(workbook, path, &WriteOptions::default())
}

/// Write a workbook to a file.
pub fn write_with_options(
    workbook: &Workbook,
    path: impl AsRef<Path>,
    options: &WriteOptions,
) -> Result<WriteOutcome> {
    let path = path.as_ref();
    let (strategy, warnings) = select_strategy(workbook)?;
    atomic_write(path, |file| write_into(workbook, strategy, file, options))?;
    if let Some(source) = workbook.source() {
        source.record_save(path)?;
    }
    Ok(WriteOutcome { strategy, warnings })
}

/// Write a workbook into memory.
pub fn write_to_bytes(workbook: &Workbook, options: &WriteOptions) -> Result<(Vec<u8>, WriteOutcome)> {
    let (strategy, warnings) = select_strategy(workbook)?;
    let mut out = Cursor::new(Vec::new());
    write_into(workbook, strategy, &mut out, options)?;
    Ok((out.into_inner(), WriteOutcome { strategy, warnings }))
}
