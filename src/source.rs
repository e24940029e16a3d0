//! Source context: everything a writer needs to know about the container a workbook
//! was read from.

use crate::container::{canonical_part_name, decode_xml_bytes, SharedBytes, SourceReader};
use crate::content_types::ContentTypes;
use crate::error::{Error, Result};
use crate::manifest::PartManifest;
use crate::model::CellStyle;
use crate::relationships::RelationshipGraph;
use crate::security::{self, EntryInfo, GuardedRead, SecurityLimits};
use crate::tracker::ModificationTracker;
use crate::xlsx::shared_strings::SharedStringTable;
use crate::xlsx::styles::StylesPart;
use crate::xlsx::workbook_xml::WorkbookPart;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Where the source container lives.
#[derive(Debug, Clone)]
pub(crate) enum SourceLocation {
    File(PathBuf),
    Memory(SharedBytes),
}

/// SHA-256 of the original container bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash everything readable from `input`.
    pub(crate) fn of_reader(mut input: impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    pub(crate) fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub(crate) fn of_file(path: &Path) -> io::Result<Self> {
        Self::of_reader(File::open(path)?)
    }

    /// Raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex digest.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Lazy access to the parts of the source container.
///
/// Holds the archive handle opened at read time; bytes are only read when a part is
/// actually copied or re-parsed.
pub(crate) struct PreservedPartStore {
    archive: Mutex<zip::ZipArchive<SourceReader>>,
    entries: Vec<EntryInfo>,
    by_name: HashMap<String, usize>,
    limits: SecurityLimits,
}

impl PreservedPartStore {
    pub fn new(
        archive: zip::ZipArchive<SourceReader>,
        entries: Vec<EntryInfo>,
        limits: SecurityLimits,
    ) -> Self {
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (canonical_part_name(&e.name), pos))
            .collect();
        Self {
            archive: Mutex::new(archive),
            entries,
            by_name,
            limits,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, zip::ZipArchive<SourceReader>>> {
        self.archive
            .lock()
            .map_err(|_| Error::InvalidData("source archive lock poisoned".to_string()))
    }

    /// Entries in archive order.
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&EntryInfo> {
        self.by_name
            .get(&canonical_part_name(path))
            .map(|pos| &self.entries[*pos])
    }

    /// Run `f` over a guarded stream of a part.
    pub fn open_stream<T>(
        &self,
        path: &str,
        f: impl FnOnce(&mut dyn Read) -> Result<T>,
    ) -> Result<T> {
        let entry = self
            .entry(path)
            .cloned()
            .ok_or_else(|| Error::MissingPart(path.to_string()))?;
        let mut archive = self.lock()?;
        let file = archive.by_index(entry.index)?;
        let mut guarded = GuardedRead::new(file, &entry, &self.limits);
        f(&mut guarded)
    }

    /// Read a whole part.
    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.open_stream(path, |input| {
            let mut out = Vec::new();
            input.read_to_end(&mut out).map_err(security::io_error)?;
            Ok(out)
        })
    }

    /// Read a whole XML part as text.
    pub fn read_xml(&self, path: &str) -> Result<String> {
        decode_xml_bytes(&self.read_bytes(path)?)
    }

    /// Copy an entry's compressed bytes and header into `out` without inflating it.
    pub fn copy_raw<W: Write + Seek>(&self, index: usize, out: &mut zip::ZipWriter<W>) -> Result<()> {
        let mut archive = self.lock()?;
        let file = archive.by_index_raw(index)?;
        out.raw_copy_file(file)?;
        Ok(())
    }
}

impl std::fmt::Debug for PreservedPartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreservedPartStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// How the bytes at the source location relate to the bytes that were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    /// Still the bytes that were read
    Original,
    /// Replaced by a container saved from this source; the open archive still holds
    /// the bytes that were read
    SavedOver,
    /// Changed by someone else, or gone
    Changed,
}

/// Everything parsed from the source container, shared by clones of a workbook.
#[derive(Debug)]
pub(crate) struct SourceData {
    pub location: SourceLocation,
    pub fingerprint: Fingerprint,
    /// Fingerprint of the last container written over the source location
    pub saved_over: Mutex<Option<Fingerprint>>,
    pub manifest: PartManifest,
    pub graph: RelationshipGraph,
    pub content_types: ContentTypes,
    pub workbook_path: String,
    pub workbook: WorkbookPart,
    /// Worksheet part of each source sheet, by source position
    pub sheet_parts: Vec<String>,
    pub styles_path: String,
    pub styles: StylesPart,
    pub palette: Vec<CellStyle>,
    pub shared_strings_path: Option<String>,
    pub shared_strings: Arc<SharedStringTable>,
    pub store: PreservedPartStore,
}

/// Binds a workbook to the container it was read from.
///
/// Carries the source location and fingerprint, the part manifest, the relationship
/// graph, the lazy preserved-part store and the modification tracker. Cloning is cheap;
/// the parsed source data is shared.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub(crate) data: Arc<SourceData>,
    pub(crate) tracker: ModificationTracker,
}

impl SourceContext {
    pub(crate) fn new(data: SourceData) -> Self {
        Self {
            data: Arc::new(data),
            tracker: ModificationTracker::new(),
        }
    }

    /// Path of the source file, `None` for in-memory sources.
    pub fn path(&self) -> Option<&Path> {
        match &self.data.location {
            SourceLocation::File(p) => Some(p),
            SourceLocation::Memory(_) => None,
        }
    }

    /// Fingerprint captured at read time.
    pub fn fingerprint(&self) -> Fingerprint {
        self.data.fingerprint
    }

    /// Part manifest of the source container.
    pub fn manifest(&self) -> &PartManifest {
        &self.data.manifest
    }

    /// Relationship graph of the source container.
    pub fn relationships(&self) -> &RelationshipGraph {
        &self.data.graph
    }

    /// Accumulated modifications.
    pub fn tracker(&self) -> &ModificationTracker {
        &self.tracker
    }

    pub(crate) fn update_tracker(&mut self, f: impl FnOnce(&ModificationTracker) -> ModificationTracker) {
        self.tracker = f(&self.tracker);
    }

    /// Whether the source still holds the bytes that were read.
    ///
    /// In-memory sources cannot change; files are re-hashed.
    pub fn is_fresh(&self) -> Result<bool> {
        Ok(self.freshness()? == Freshness::Original)
    }

    fn saved_over(&self) -> Result<MutexGuard<'_, Option<Fingerprint>>> {
        self.data
            .saved_over
            .lock()
            .map_err(|_| Error::InvalidData("source save record poisoned".to_string()))
    }

    pub(crate) fn freshness(&self) -> Result<Freshness> {
        let SourceLocation::File(path) = &self.data.location else {
            return Ok(Freshness::Original);
        };
        let current = match Fingerprint::of_file(path) {
            Ok(current) => current,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Freshness::Changed),
            Err(e) => return Err(e.into()),
        };
        if current == self.data.fingerprint {
            Ok(Freshness::Original)
        } else if *self.saved_over()? == Some(current) {
            Ok(Freshness::SavedOver)
        } else {
            Ok(Freshness::Changed)
        }
    }

    /// Remember a container just written to `target` if it replaced the source file.
    ///
    /// The atomic rename leaves the archive opened at read time on the old bytes, so
    /// later surgical writes still copy preserved parts from what was read.
    pub(crate) fn record_save(&self, target: &Path) -> Result<()> {
        let SourceLocation::File(path) = &self.data.location else {
            return Ok(());
        };
        if !same_file(path, target) {
            return Ok(());
        }
        let written = Fingerprint::of_file(target)?;
        log::debug!("source {} saved over ({written:?})", path.display());
        *self.saved_over()? = Some(written);
        Ok(())
    }

    /// Copy the original container bytes unchanged into `out`.
    pub(crate) fn copy_original(&self, out: &mut impl Write) -> Result<u64> {
        match &self.data.location {
            SourceLocation::File(path) => {
                let mut file = File::open(path)?;
                Ok(io::copy(&mut file, out)?)
            }
            SourceLocation::Memory(bytes) => {
                out.write_all(bytes.as_ref())?;
                Ok(bytes.as_ref().len() as u64)
            }
        }
    }

    pub(crate) fn location_label(&self) -> String {
        match &self.data.location {
            SourceLocation::File(p) => p.display().to_string(),
            SourceLocation::Memory(_) => "<memory>".to_string(),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
