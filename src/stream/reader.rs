//! Streaming read: one worksheet, row by row, in constant memory.
//!
//! The worksheet is parsed on a dedicated worker thread that owns the container and
//! hands rows over in fixed-size batches through a bounded channel. The worker blocks
//! when the channel is full, so parsing never runs more than `queue_capacity` batches
//! ahead of the consumer.

use super::{RowCell, RowData};
use crate::container::OoxmlContainer;
use crate::error::{Error, Result, Warning};
use crate::model::{StyleId, StyleRegistry};
use crate::options::ReadOptions;
use crate::package::Package;
use crate::xlsx::worksheet::{CellDecoder, ParsedRow, Window, WorksheetReader};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Which sheet to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// Position in tab order (0-based)
    Index(usize),
    /// Sheet name; exact match first, then case-insensitive
    Name(String),
}

impl From<usize> for SheetSelector {
    fn from(index: usize) -> Self {
        SheetSelector::Index(index)
    }
}

impl From<&str> for SheetSelector {
    fn from(name: &str) -> Self {
        SheetSelector::Name(name.to_string())
    }
}

impl From<String> for SheetSelector {
    fn from(name: String) -> Self {
        SheetSelector::Name(name)
    }
}

/// Row and column bounds pushed down into the parser. Indices are 0-based, inclusive.
///
/// Rows before the row bound are skipped without decoding; the first row past it ends
/// the scan. Cells outside the column bound are skipped without decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBounds {
    /// Rows to emit
    pub rows: Option<RangeInclusive<u32>>,
    /// Columns to keep in each row
    pub cols: Option<RangeInclusive<u32>>,
}

impl StreamBounds {
    /// No bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a row range.
    pub fn with_rows(mut self, rows: RangeInclusive<u32>) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Restrict to a column range.
    pub fn with_cols(mut self, cols: RangeInclusive<u32>) -> Self {
        self.cols = Some(cols);
        self
    }
}

/// Counters describing how much work a stream has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// `<row>` elements the parser opened, including rows skipped before the bound
    pub rows_scanned: u64,
    /// Rows handed to the consumer
    pub rows_emitted: u64,
    /// Batches received from the worker
    pub batches: u64,
}

enum Message {
    Batch(Vec<RowData>),
    Done(Vec<Warning>),
    Failed(Error),
}

/// Lazily parsed rows of one worksheet.
///
/// Dropping the stream stops the worker within `cancel_check_interval` XML events and
/// closes the container.
pub struct RowStream {
    sheet: String,
    styles: Arc<StyleRegistry>,
    receiver: Option<Receiver<Message>>,
    current: std::vec::IntoIter<RowData>,
    cancel: Arc<AtomicBool>,
    scanned: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
    warnings: Vec<Warning>,
    rows_emitted: u64,
    batches: u64,
    finished: bool,
}

/// Stream one worksheet of a file with default options.
///
/// # Example
///
/// ```no_run
/// use xlpack::{read_stream, StreamBounds};
///
/// let rows = read_stream("big.xlsx", 0, StreamBounds::new().with_rows(0..=99))?;
/// for row in rows {
///     let row = row?;
///     println!("row {} has {} cells", row.index + 1, row.cells.len());
/// }
/// # Ok::<(), xlpack::Error>(())
/// ```
pub fn read_stream(
    path: impl AsRef<Path>,
    sheet: impl Into<SheetSelector>,
    bounds: StreamBounds,
) -> Result<RowStream> {
    read_stream_with_options(path, sheet, bounds, &ReadOptions::default())
}

/// Stream one worksheet of a file.
pub fn read_stream_with_options(
    path: impl AsRef<Path>,
    sheet: impl Into<SheetSelector>,
    bounds: StreamBounds,
    options: &ReadOptions,
) -> Result<RowStream> {
    let container = OoxmlContainer::open(path, &options.limits)?;
    RowStream::start(container, sheet.into(), bounds, options)
}

/// Stream one worksheet of an in-memory container.
pub fn read_stream_bytes(
    data: Vec<u8>,
    sheet: impl Into<SheetSelector>,
    bounds: StreamBounds,
    options: &ReadOptions,
) -> Result<RowStream> {
    let container = OoxmlContainer::from_bytes(data, &options.limits)?;
    RowStream::start(container, sheet.into(), bounds, options)
}

/// Everything the worker needs, moved onto its thread.
struct Job {
    container: OoxmlContainer,
    sheet: String,
    part: String,
    decoder: CellDecoder,
    xf_map: Vec<Option<StyleId>>,
    window: Window,
    options: ReadOptions,
    cancel: Arc<AtomicBool>,
    scanned: Arc<AtomicU64>,
}

impl RowStream {
    fn start(
        container: OoxmlContainer,
        selector: SheetSelector,
        bounds: StreamBounds,
        options: &ReadOptions,
    ) -> Result<Self> {
        let package = Package::load(container)?;
        let index = match &selector {
            SheetSelector::Index(i) => package.find_sheet(Some(*i), None)?,
            SheetSelector::Name(name) => package.find_sheet(None, Some(name))?,
        };
        let sheet = package.workbook.sheets[index].name.clone();
        let part = package.sheet_parts[index].clone();
        let decoder = package.decoder();

        // xf 0 is the default format and maps to no style.
        let mut styles = StyleRegistry::new();
        let xf_map = package
            .palette
            .iter()
            .enumerate()
            .map(|(xf, style)| (xf > 0).then(|| styles.intern(style.clone())))
            .collect();

        let cancel = Arc::new(AtomicBool::new(false));
        let scanned = Arc::new(AtomicU64::new(0));
        let (sender, receiver) = mpsc::sync_channel(options.queue_capacity.max(1));
        let job = Job {
            container: package.container,
            sheet: sheet.clone(),
            part,
            decoder,
            xf_map,
            window: Window {
                rows: bounds.rows,
                cols: bounds.cols,
            },
            options: options.clone(),
            cancel: Arc::clone(&cancel),
            scanned: Arc::clone(&scanned),
        };
        log::debug!("streaming sheet {sheet:?} from {}", job.part);

        let worker = thread::Builder::new()
            .name("xlpack-stream".to_string())
            .spawn(move || job.run(sender))?;

        Ok(Self {
            sheet,
            styles: Arc::new(styles),
            receiver: Some(receiver),
            current: Vec::new().into_iter(),
            cancel,
            scanned,
            worker: Some(worker),
            warnings: Vec::new(),
            rows_emitted: 0,
            batches: 0,
            finished: false,
        })
    }

    /// Name of the streamed sheet.
    pub fn sheet_name(&self) -> &str {
        &self.sheet
    }

    /// Formats referenced by [`RowCell::style`].
    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// Work counters so far.
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            rows_scanned: self.scanned.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted,
            batches: self.batches,
        }
    }

    /// Warnings collected so far. Complete once the stream is exhausted.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Ask the worker to stop. Rows already queued are still delivered.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn join_worker(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::InvalidData(format!("stream worker for {:?} panicked", self.sheet))),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Option<Result<RowData>> {
        self.finished = true;
        self.receiver = None;
        self.join_worker().err().map(Err)
    }
}

impl Iterator for RowStream {
    type Item = Result<RowData>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.current.next() {
                self.rows_emitted += 1;
                return Some(Ok(row));
            }
            if self.finished {
                return None;
            }
            let message = self.receiver.as_ref()?.recv();
            match message {
                Ok(Message::Batch(batch)) => {
                    self.batches += 1;
                    log::trace!(
                        "sheet {:?}: batch {} with {} rows",
                        self.sheet,
                        self.batches,
                        batch.len()
                    );
                    self.current = batch.into_iter();
                }
                Ok(Message::Done(warnings)) => {
                    self.warnings.extend(warnings);
                    return self.finish();
                }
                Ok(Message::Failed(err)) => {
                    let _ = self.finish();
                    return Some(Err(err));
                }
                // Worker exited without a final message: cancelled or panicked.
                Err(_) => return self.finish(),
            }
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        // Unblocks a worker waiting on a full channel.
        self.receiver = None;
        let _ = self.join_worker();
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("sheet", &self.sheet)
            .field("stats", &self.stats())
            .field("finished", &self.finished)
            .finish()
    }
}

enum Flow {
    Done(Vec<Warning>),
    Stopped,
}

impl Job {
    fn run(self, sender: SyncSender<Message>) {
        let Job {
            mut container,
            sheet,
            part,
            decoder,
            xf_map,
            window,
            options,
            cancel,
            scanned,
        } = self;

        let result = container.with_part_reader(&part, |input| {
            let mut reader = WorksheetReader::new(input, &sheet, &part, decoder, &options.limits)
                .with_window(window)
                .with_cancel(Arc::clone(&cancel), options.cancel_check_interval);
            let batch_size = options.batch_size.max(1);
            let mut batch = Vec::with_capacity(batch_size);
            let mut warnings = Vec::new();

            while let Some(row) = reader.next_row()? {
                scanned.store(reader.rows_scanned(), Ordering::Relaxed);
                if reader.cancelled() {
                    break;
                }
                batch.push(convert_row(row, &sheet, &xf_map, &mut warnings));
                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    if sender.send(Message::Batch(full)).is_err() {
                        return Ok(Flow::Stopped);
                    }
                }
            }
            scanned.store(reader.rows_scanned(), Ordering::Relaxed);

            // An aborted scan discards rows it has not handed over.
            if reader.cancelled() {
                return Ok(Flow::Stopped);
            }
            if !batch.is_empty() && sender.send(Message::Batch(batch)).is_err() {
                return Ok(Flow::Stopped);
            }
            warnings.extend(reader.take_warnings());
            Ok(Flow::Done(warnings))
        });

        let message = match result {
            Ok(Flow::Done(warnings)) => Message::Done(warnings),
            Ok(Flow::Stopped) => return,
            Err(err) => Message::Failed(err),
        };
        // The consumer may already be gone.
        let _ = sender.send(message);
    }
}

fn convert_row(
    row: ParsedRow,
    sheet: &str,
    xf_map: &[Option<StyleId>],
    warnings: &mut Vec<Warning>,
) -> RowData {
    let cells = row
        .cells
        .into_iter()
        .map(|cell| {
            let style = match xf_map.get(cell.xf as usize) {
                Some(style) => *style,
                None if cell.xf == 0 => None,
                None => {
                    let warning = Warning::StyleOutOfRange {
                        sheet: sheet.to_string(),
                        cell: crate::model::CellRef::new(cell.col, row.index).to_a1(),
                        index: cell.xf,
                    };
                    log::warn!("{warning}");
                    warnings.push(warning);
                    None
                }
            };
            RowCell {
                col: cell.col,
                value: cell.value,
                style,
            }
        })
        .collect();
    RowData {
        index: row.index,
        height: row.height,
        hidden: row.hidden,
        cells,
    }
}
