//! Full read: materialize every sheet into the model.

use crate::container::{OoxmlContainer, SharedBytes};
use crate::error::{Result, Warning};
use crate::model::{Sheet, SheetOrigin, Workbook};
use crate::options::ReadOptions;
use crate::package::Package;
use crate::source::{Fingerprint, PreservedPartStore, SourceContext, SourceData, SourceLocation};
use crate::xlsx::worksheet::WorksheetReader;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A workbook plus the non-fatal problems found while reading it.
#[derive(Debug)]
pub struct ReadOutcome {
    /// The workbook, bound to its source container
    pub workbook: Workbook,
    /// Warnings in the order they were found
    pub warnings: Vec<Warning>,
}

/// Read a workbook from a file with default options.
///
/// # Example
///
/// ```no_run
/// let outcome = xlpack::read("book.xlsx")?;
/// for sheet in outcome.workbook.sheets() {
///     println!("{}: {} cells", sheet.name, sheet.cells.len());
/// }
/// # Ok::<(), xlpack::Error>(())
/// ```
pub fn read(path: impl AsRef<Path>) -> Result<ReadOutcome> {
    read_with_options(path, &ReadOptions::default())
}

/// Read a workbook from a file.
pub fn read_with_options(path: impl AsRef<Path>, options: &ReadOptions) -> Result<ReadOutcome> {
    let path = path.as_ref();
    let fingerprint = Fingerprint::of_file(path)?;
    let container = OoxmlContainer::open(path, &options.limits)?;
    materialize(
        container,
        SourceLocation::File(path.to_path_buf()),
        fingerprint,
        options,
    )
}

/// Read a workbook from in-memory bytes.
pub fn read_bytes(data: Vec<u8>, options: &ReadOptions) -> Result<ReadOutcome> {
    let fingerprint = Fingerprint::of_bytes(&data);
    let shared = SharedBytes(Arc::new(data));
    let container = OoxmlContainer::from_shared(shared.clone(), &options.limits)?;
    materialize(container, SourceLocation::Memory(shared), fingerprint, options)
}

fn materialize(
    container: OoxmlContainer,
    location: SourceLocation,
    fingerprint: Fingerprint,
    options: &ReadOptions,
) -> Result<ReadOutcome> {
    let mut package = Package::load(container)?;
    let decoder = package.decoder();
    let mut cells_used = 0u64;
    let mut warnings = Vec::new();
    let mut sheets = Vec::with_capacity(package.workbook.sheets.len());

    for (index, entry) in package.workbook.sheets.iter().enumerate() {
        let part = &package.sheet_parts[index];
        let mut sheet = Sheet::new(entry.name.clone());
        sheet.state = entry.state;
        sheet.origin = Some(SheetOrigin {
            index,
            part: part.clone(),
            rel_id: entry.rel_id.clone(),
            sheet_id: entry.sheet_id,
        });

        let limits = &options.limits;
        let palette = &package.palette;
        let sheet_warnings = package.container.with_part_reader(part, |input| {
            WorksheetReader::new(input, &entry.name, part, decoder.clone(), limits)
                .with_cells_used(cells_used)
                .read_into(&mut sheet, palette)
        })?;
        cells_used += sheet.cells.len() as u64;
        log::debug!(
            "read sheet {:?} from {part}: {} cells, {} warnings",
            sheet.name,
            sheet.cells.len(),
            sheet_warnings.len()
        );
        warnings.extend(sheet_warnings);
        sheets.push(sheet);
    }

    let Package {
        container,
        manifest,
        graph,
        content_types,
        workbook_path,
        workbook,
        sheet_parts,
        styles_path,
        styles,
        palette,
        shared_strings_path,
        shared_strings,
    } = package;
    let limits = container.limits().clone();
    let (archive, entries) = container.into_parts();

    let source = SourceContext::new(SourceData {
        location,
        fingerprint,
        saved_over: Mutex::new(None),
        manifest,
        graph,
        content_types,
        workbook_path,
        workbook,
        sheet_parts,
        styles_path,
        styles,
        palette,
        shared_strings_path,
        shared_strings,
        store: PreservedPartStore::new(archive, entries, limits),
    });

    Ok(ReadOutcome {
        workbook: Workbook::from_source(sheets, source),
        warnings,
    })
}
