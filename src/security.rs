//! Resource guards applied while reading a container.
//!
//! Every check here runs before the guarded data is allocated: archive metadata is
//! checked from the central directory, inflation is capped while streaming, and
//! string/cell counts are checked as they are decoded.

use crate::error::{Error, Result, SecurityViolation};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Seek};
use zip::ZipArchive;

/// Thresholds for the resource guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum uncompressed/compressed ratio for any entry
    pub max_compression_ratio: f64,
    /// Maximum total uncompressed bytes across the archive
    pub max_total_uncompressed: u64,
    /// Maximum number of archive entries
    pub max_entry_count: usize,
    /// Maximum number of cells in one read
    pub max_cell_count: u64,
    /// Maximum characters in a single string
    pub max_string_length: usize,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100.0,
            max_total_uncompressed: 4 * 1024 * 1024 * 1024,
            max_entry_count: 10_000,
            max_cell_count: 100_000_000,
            max_string_length: 32_767,
        }
    }
}

impl SecurityLimits {
    /// Create default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum compression ratio.
    pub fn with_max_compression_ratio(mut self, ratio: f64) -> Self {
        self.max_compression_ratio = ratio;
        self
    }

    /// Set the maximum total uncompressed size.
    pub fn with_max_total_uncompressed(mut self, bytes: u64) -> Self {
        self.max_total_uncompressed = bytes;
        self
    }

    /// Set the maximum entry count.
    pub fn with_max_entry_count(mut self, count: usize) -> Self {
        self.max_entry_count = count;
        self
    }

    /// Set the maximum cell count.
    pub fn with_max_cell_count(mut self, count: u64) -> Self {
        self.max_cell_count = count;
        self
    }

    /// Set the maximum string length.
    pub fn with_max_string_length(mut self, len: usize) -> Self {
        self.max_string_length = len;
        self
    }
}

/// Declared sizes of one archive entry, taken from the central directory.
#[derive(Debug, Clone)]
pub(crate) struct EntryInfo {
    /// Position in the archive
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
}

fn ratio_of(size: u64, compressed: u64) -> f64 {
    if size == 0 {
        0.0
    } else if compressed == 0 {
        f64::INFINITY
    } else {
        size as f64 / compressed as f64
    }
}

/// Check one entry's declared compression ratio.
pub(crate) fn check_entry(entry: &EntryInfo, limits: &SecurityLimits) -> Result<()> {
    let ratio = ratio_of(entry.size, entry.compressed_size);
    if ratio > limits.max_compression_ratio {
        return Err(SecurityViolation::CompressionRatio {
            part: entry.name.clone(),
            ratio,
            max: limits.max_compression_ratio,
        }
        .into());
    }
    Ok(())
}

/// Scan the central directory and reject the archive before any entry is inflated.
///
/// Returns the declared entries in archive order.
pub(crate) fn scan_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    limits: &SecurityLimits,
) -> Result<Vec<EntryInfo>> {
    if archive.len() > limits.max_entry_count {
        return Err(SecurityViolation::EntryCount {
            count: archive.len(),
            max: limits.max_entry_count,
        }
        .into());
    }

    let mut entries = Vec::with_capacity(archive.len());
    let mut total: u64 = 0;
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        if file.is_dir() {
            continue;
        }
        let entry = EntryInfo {
            index: i,
            name: file.name().to_string(),
            size: file.size(),
            compressed_size: file.compressed_size(),
        };
        drop(file);

        check_entry(&entry, limits)?;
        total = total.saturating_add(entry.size);
        if total > limits.max_total_uncompressed {
            return Err(SecurityViolation::UncompressedSize {
                total,
                max: limits.max_total_uncompressed,
            }
            .into());
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Shared budget of inflated bytes for one operation.
///
/// Declared sizes can be forged, so the budget is charged with bytes actually produced.
#[derive(Debug, Clone)]
pub(crate) struct InflateBudget {
    max_total: u64,
    used: u64,
}

impl InflateBudget {
    pub fn new(max_total: u64) -> Self {
        Self { max_total, used: 0 }
    }

    pub fn remaining(&self) -> u64 {
        self.max_total.saturating_sub(self.used)
    }

    pub fn consume(&mut self, bytes: u64) -> Result<()> {
        self.used = self.used.saturating_add(bytes);
        if self.used > self.max_total {
            return Err(SecurityViolation::UncompressedSize {
                total: self.used,
                max: self.max_total,
            }
            .into());
        }
        Ok(())
    }
}

/// A reader that refuses to inflate more than the entry declared.
///
/// Exceeding the cap yields an `InvalidData` I/O error whose inner error is the
/// [`SecurityViolation`]; [`violation_of`] recovers it.
pub(crate) struct GuardedRead<R> {
    inner: R,
    part: String,
    compressed_size: u64,
    cap: u64,
    max_ratio: f64,
    read: u64,
}

impl<R: Read> GuardedRead<R> {
    pub fn new(inner: R, entry: &EntryInfo, limits: &SecurityLimits) -> Self {
        Self {
            inner,
            part: entry.name.clone(),
            compressed_size: entry.compressed_size,
            cap: entry.size,
            max_ratio: limits.max_compression_ratio,
            read: 0,
        }
    }

    /// Bytes inflated so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }
}

impl<R: Read> Read for GuardedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read > self.cap {
            let ratio = ratio_of(self.read, self.compressed_size);
            let violation = if ratio > self.max_ratio {
                SecurityViolation::CompressionRatio {
                    part: self.part.clone(),
                    ratio,
                    max: self.max_ratio,
                }
            } else {
                SecurityViolation::UncompressedSize {
                    total: self.read,
                    max: self.cap,
                }
            };
            return Err(io::Error::new(io::ErrorKind::InvalidData, violation));
        }
        Ok(n)
    }
}

/// Recover a [`SecurityViolation`] carried inside an I/O error.
pub(crate) fn violation_of(err: &io::Error) -> Option<SecurityViolation> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<SecurityViolation>())
        .cloned()
}

/// Convert an I/O error, surfacing any guard violation it carries.
pub(crate) fn io_error(err: io::Error) -> Error {
    match violation_of(&err) {
        Some(v) => Error::Security(v),
        None => Error::Io(err),
    }
}

/// Read a whole entry into memory within the entry cap and the operation budget.
pub(crate) fn read_to_end_guarded<R: Read>(
    reader: R,
    entry: &EntryInfo,
    limits: &SecurityLimits,
    budget: &mut InflateBudget,
) -> Result<Vec<u8>> {
    if entry.size > budget.remaining() {
        budget.consume(entry.size)?;
    }
    let mut guarded = GuardedRead::new(reader, entry, limits);
    let mut out = Vec::with_capacity(entry.size.min(1 << 20) as usize);
    guarded.read_to_end(&mut out).map_err(io_error)?;
    budget.consume(guarded.bytes_read())?;
    Ok(out)
}

/// Counts decoded cells against [`SecurityLimits::max_cell_count`].
#[derive(Debug, Clone)]
pub(crate) struct CellBudget {
    max: u64,
    used: u64,
}

impl CellBudget {
    pub fn new(limits: &SecurityLimits) -> Self {
        Self {
            max: limits.max_cell_count,
            used: 0,
        }
    }

    /// Start from cells already decoded earlier in the same read.
    pub fn with_used(mut self, used: u64) -> Self {
        self.used = used;
        self
    }

    pub fn charge(&mut self) -> Result<()> {
        self.used += 1;
        if self.used > self.max {
            return Err(SecurityViolation::CellCount { max: self.max }.into());
        }
        Ok(())
    }
}

/// Reject strings over [`SecurityLimits::max_string_length`] characters.
pub(crate) fn check_string(part: &str, s: &str, limits: &SecurityLimits) -> Result<()> {
    // Byte length bounds the char count from above.
    if s.len() <= limits.max_string_length {
        return Ok(());
    }
    let len = s.chars().count();
    if len > limits.max_string_length {
        return Err(SecurityViolation::StringLength {
            part: part.to_string(),
            len,
            max: limits.max_string_length,
        }
        .into());
    }
    Ok(())
}

/// Reject DTDs that declare entities or reference external identifiers.
///
/// The XML reader never resolves external entities; this check makes the refusal
/// explicit for every part instead of failing later on an unknown entity.
pub(crate) fn check_doctype(part: &str, doctype: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(doctype);
    if text.contains("ENTITY") || text.contains("SYSTEM") || text.contains("PUBLIC") {
        return Err(SecurityViolation::ExternalEntity(part.to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_scan_rejects_high_ratio() {
        let bomb = vec![b'0'; 4 * 1024 * 1024];
        let bytes = build_zip(&[("a.xml", b"<a/>".to_vec()), ("bomb.xml", bomb)]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let err = scan_archive(&mut archive, &SecurityLimits::default()).unwrap_err();
        match err {
            Error::Security(SecurityViolation::CompressionRatio { part, ratio, .. }) => {
                assert_eq!(part, "bomb.xml");
                assert!(ratio > 100.0);
            }
            other => panic!("expected CompressionRatio, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_rejects_entry_count() {
        let entries: Vec<(String, Vec<u8>)> =
            (0..5).map(|i| (format!("p{i}.xml"), b"<a/>".to_vec())).collect();
        let refs: Vec<(&str, Vec<u8>)> =
            entries.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();
        let mut archive = ZipArchive::new(Cursor::new(build_zip(&refs))).unwrap();
        let limits = SecurityLimits::new().with_max_entry_count(4);
        let err = scan_archive(&mut archive, &limits).unwrap_err();
        assert!(matches!(
            err,
            Error::Security(SecurityViolation::EntryCount { count: 5, max: 4 })
        ));
    }

    #[test]
    fn test_scan_rejects_total_size() {
        let bytes = build_zip(&[("a.xml", vec![b'x'; 600]), ("b.xml", vec![b'y'; 600])]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let limits = SecurityLimits::new().with_max_total_uncompressed(1000);
        let err = scan_archive(&mut archive, &limits).unwrap_err();
        assert!(matches!(
            err,
            Error::Security(SecurityViolation::UncompressedSize { max: 1000, .. })
        ));
    }

    #[test]
    fn test_guarded_read_caps_forged_size() {
        let entry = EntryInfo {
            index: 0,
            name: "x.xml".into(),
            size: 4,
            compressed_size: 4,
        };
        let mut budget = InflateBudget::new(1 << 20);
        let err = read_to_end_guarded(
            Cursor::new(b"0123456789".to_vec()),
            &entry,
            &SecurityLimits::default(),
            &mut budget,
        )
        .unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_inflate_budget() {
        let mut budget = InflateBudget::new(10);
        budget.consume(6).unwrap();
        assert_eq!(budget.remaining(), 4);
        assert!(budget.consume(6).is_err());
    }

    #[test]
    fn test_string_and_cell_limits() {
        let limits = SecurityLimits::new()
            .with_max_string_length(3)
            .with_max_cell_count(2);
        assert!(check_string("p", "abc", &limits).is_ok());
        // Three chars, nine bytes.
        assert!(check_string("p", "ééé", &limits).is_ok());
        assert!(check_string("p", "abcd", &limits).is_err());

        let mut cells = CellBudget::new(&limits);
        cells.charge().unwrap();
        cells.charge().unwrap();
        assert!(cells.charge().is_err());

        let mut carried = CellBudget::new(&limits).with_used(2);
        match carried.charge() {
            Err(Error::Security(SecurityViolation::CellCount { max })) => assert_eq!(max, 2),
            other => panic!("expected cell count violation, got {other:?}"),
        }
    }

    #[test]
    fn test_doctype_check() {
        assert!(check_doctype("p", b"worksheet").is_ok());
        assert!(check_doctype("p", b"x [<!ENTITY e SYSTEM \"file:///etc/passwd\">]").is_err());
        assert!(check_doctype("p", b"html PUBLIC \"-//W3C//DTD\"").is_err());
    }
}
