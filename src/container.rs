//! ZIP container abstraction for spreadsheet packages.

use crate::error::{Error, Result};
use crate::security::{self, EntryInfo, GuardedRead, InflateBudget, SecurityLimits};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Immutable in-memory container bytes shared between readers.
#[derive(Debug, Clone)]
pub(crate) struct SharedBytes(pub Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Seekable input over a file or shared bytes.
#[derive(Debug)]
pub(crate) enum SourceReader {
    File(BufReader<File>),
    Memory(Cursor<SharedBytes>),
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceReader::File(r) => r.read(buf),
            SourceReader::Memory(r) => r.read(buf),
        }
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SourceReader::File(r) => r.seek(pos),
            SourceReader::Memory(r) => r.seek(pos),
        }
    }
}

/// Canonical form of a part name: no leading `/`, forward slashes only.
pub(crate) fn canonical_part_name(name: &str) -> String {
    name.trim_start_matches(['/', '\\']).replace('\\', "/")
}

/// Fix XML encoding declaration from UTF-16 to UTF-8.
///
/// After decoding UTF-16 into a Rust `String` the declaration still says UTF-16,
/// which would make the XML reader misinterpret the already-decoded text.
fn fix_xml_encoding_declaration(content: &str) -> String {
    if content.starts_with("<?xml") {
        if let Some(end_decl) = content.find("?>") {
            let decl = &content[..end_decl + 2];
            let rest = &content[end_decl + 2..];

            let fixed_decl = decl
                .replace("encoding=\"UTF-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='UTF-16'", "encoding='UTF-8'")
                .replace("encoding=\"utf-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='utf-16'", "encoding='UTF-8'");

            return format!("{}{}", fixed_decl, rest);
        }
    }
    content.to_string()
}

/// Decode XML bytes handling different encodings (UTF-8, UTF-16 LE/BE).
///
/// Spreadsheet parts are almost always UTF-8, but some producers emit UTF-16.
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String> {
    if bytes.len() >= 3 && bytes[0] == 0xEF && bytes[1] == 0xBB && bytes[2] == 0xBF {
        return String::from_utf8(bytes[3..].to_vec())
            .map_err(|e| Error::InvalidData(format!("invalid UTF-8: {e}")));
    }

    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xFE {
        let content = decode_utf16(&bytes[2..], u16::from_le_bytes)?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let content = decode_utf16(&bytes[2..], u16::from_be_bytes)?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    // No BOM: UTF-8 first, then guess UTF-16 from the zero bytes of ASCII markup.
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        Err(_) => {
            if bytes.len() >= 4 && bytes[1] == 0 && bytes[3] == 0 {
                decode_utf16(bytes, u16::from_le_bytes)
            } else if bytes.len() >= 4 && bytes[0] == 0 && bytes[2] == 0 {
                decode_utf16(bytes, u16::from_be_bytes)
            } else {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    let len = bytes.len() & !1;
    let units = (0..len).step_by(2).map(|i| unit([bytes[i], bytes[i + 1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::InvalidData(format!("invalid UTF-16: {e}")))
}

/// A spreadsheet package opened for reading.
///
/// The central directory is checked against [`SecurityLimits`] when the container is
/// opened; every later read is capped by the entry's declared size and charged to a
/// shared inflation budget.
pub struct OoxmlContainer {
    archive: zip::ZipArchive<SourceReader>,
    entries: Vec<EntryInfo>,
    by_name: HashMap<String, usize>,
    by_lower_name: HashMap<String, usize>,
    limits: SecurityLimits,
    budget: InflateBudget,
}

impl OoxmlContainer {
    /// Open a container from a file path.
    ///
    /// The file is read lazily; only the central directory is loaded up front.
    pub fn open(path: impl AsRef<Path>, limits: &SecurityLimits) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_source(SourceReader::File(BufReader::new(file)), limits)
    }

    /// Create a container from bytes.
    pub fn from_bytes(data: Vec<u8>, limits: &SecurityLimits) -> Result<Self> {
        Self::from_shared(SharedBytes(Arc::new(data)), limits)
    }

    pub(crate) fn from_shared(data: SharedBytes, limits: &SecurityLimits) -> Result<Self> {
        Self::from_source(SourceReader::Memory(Cursor::new(data)), limits)
    }

    pub(crate) fn from_source(source: SourceReader, limits: &SecurityLimits) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(source).map_err(|e| match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::UnsupportedFormat(format!("not a ZIP container: {other}")),
        })?;
        let entries = security::scan_archive(&mut archive, limits)?;

        let mut by_name = HashMap::with_capacity(entries.len());
        let mut by_lower_name = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            let canonical = canonical_part_name(&entry.name);
            by_lower_name.entry(canonical.to_lowercase()).or_insert(pos);
            by_name.entry(canonical).or_insert(pos);
        }

        Ok(Self {
            archive,
            entries,
            by_name,
            by_lower_name,
            limits: limits.clone(),
            budget: InflateBudget::new(limits.max_total_uncompressed),
        })
    }

    /// Limits this container was opened with.
    pub fn limits(&self) -> &SecurityLimits {
        &self.limits
    }

    /// Entries in archive order (directories excluded).
    pub(crate) fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    /// Look up an entry by part name.
    ///
    /// Matching tolerates a leading `/`, backslashes and, as a fallback, letter case.
    pub(crate) fn entry(&self, path: &str) -> Option<&EntryInfo> {
        let canonical = canonical_part_name(path);
        self.by_name
            .get(&canonical)
            .or_else(|| self.by_lower_name.get(&canonical.to_lowercase()))
            .map(|pos| &self.entries[*pos])
    }

    /// Check if a part exists.
    pub fn exists(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }

    /// List all part names.
    pub fn list_files(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// List part names matching a prefix.
    pub fn list_files_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| canonical_part_name(&e.name).starts_with(prefix))
            .map(|e| e.name.clone())
            .collect()
    }

    /// Read a part's bytes.
    pub fn read_binary(&mut self, path: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry(path)
            .cloned()
            .ok_or_else(|| Error::MissingPart(path.to_string()))?;
        let file = self.archive.by_index(entry.index)?;
        security::read_to_end_guarded(file, &entry, &self.limits, &mut self.budget)
    }

    /// Read an XML part as a string.
    ///
    /// Handles UTF-8 (with or without BOM) and UTF-16 LE/BE.
    pub fn read_xml(&mut self, path: &str) -> Result<String> {
        let bytes = self.read_binary(path)?;
        decode_xml_bytes(&bytes)
    }

    /// Read an XML part if it exists.
    pub fn read_optional_xml(&mut self, path: &str) -> Result<Option<String>> {
        if self.exists(path) {
            self.read_xml(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Run `f` over a buffered, guarded stream of a part without loading it whole.
    pub(crate) fn with_part_reader<T>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut dyn BufRead) -> Result<T>,
    ) -> Result<T> {
        let entry = self
            .entry(path)
            .cloned()
            .ok_or_else(|| Error::MissingPart(path.to_string()))?;
        if entry.size > self.budget.remaining() {
            self.budget.consume(entry.size)?;
        }
        let file = self.archive.by_index(entry.index)?;
        let mut reader = BufReader::new(GuardedRead::new(file, &entry, &self.limits));
        let out = f(&mut reader)?;
        self.budget.consume(reader.get_ref().bytes_read())?;
        Ok(out)
    }

    /// Give up the container, keeping the open archive handle.
    pub(crate) fn into_parts(self) -> (zip::ZipArchive<SourceReader>, Vec<EntryInfo>) {
        (self.archive, self.entries)
    }
}

impl std::fmt::Debug for OoxmlContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OoxmlContainer")
            .field("files", &self.entries.len())
            .finish()
    }
}
