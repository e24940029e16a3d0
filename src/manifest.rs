//! Catalog of the parts in a source container.

use crate::container::canonical_part_name;
use crate::error::{Error, Result};
use crate::security::EntryInfo;
use std::collections::HashMap;

/// Whether the engine regenerates a part or only ever copies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    /// Parsed into the model and regenerated from it when changed
    DomainOwned(DomainPart),
    /// Copied byte-for-byte, never interpreted
    Opaque,
}

/// The domain-owned part families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainPart {
    /// `xl/workbook.xml`
    Workbook,
    /// `xl/styles.xml`
    Styles,
    /// `xl/sharedStrings.xml`
    SharedStrings,
    /// `xl/worksheets/*.xml`
    Worksheet,
}

/// Classify a part by its path.
///
/// Anything not recognised, including relationship parts and `[Content_Types].xml`,
/// is opaque.
pub fn classify(path: &str) -> PartKind {
    let path = canonical_part_name(path);
    let lower = path.to_ascii_lowercase();
    let domain = match lower.as_str() {
        "xl/workbook.xml" => Some(DomainPart::Workbook),
        "xl/styles.xml" => Some(DomainPart::Styles),
        "xl/sharedstrings.xml" => Some(DomainPart::SharedStrings),
        p if p.starts_with("xl/worksheets/")
            && p.ends_with(".xml")
            && !p["xl/worksheets/".len()..].contains('/') =>
        {
            Some(DomainPart::Worksheet)
        }
        _ => None,
    };
    domain.map_or(PartKind::Opaque, PartKind::DomainOwned)
}

/// One catalogued entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Canonical part name
    pub name: String,
    /// Classification
    pub kind: PartKind,
    /// Declared uncompressed size
    pub size: u64,
}

/// Immutable classification of every entry in a container, in archive order.
#[derive(Debug, Clone, Default)]
pub struct PartManifest {
    entries: Vec<ManifestEntry>,
    by_name: HashMap<String, usize>,
    by_lower_name: HashMap<String, usize>,
}

impl PartManifest {
    /// Build the manifest from the container's entry listing.
    ///
    /// Fails when `xl/workbook.xml` is absent; unknown extra parts are accepted.
    pub(crate) fn build(entries: &[EntryInfo]) -> Result<Self> {
        let mut manifest = Self::default();
        for entry in entries {
            let name = canonical_part_name(&entry.name);
            manifest.by_name.insert(name.clone(), manifest.entries.len());
            manifest
                .by_lower_name
                .entry(name.to_ascii_lowercase())
                .or_insert(manifest.entries.len());
            manifest.entries.push(ManifestEntry {
                kind: classify(&name),
                name,
                size: entry.size,
            });
        }
        if !manifest.contains("xl/workbook.xml") {
            return Err(Error::MissingPart("xl/workbook.xml".to_string()));
        }
        Ok(manifest)
    }

    /// Entries in archive order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Look up an entry; an exact match wins over a case-insensitive one.
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        let name = canonical_part_name(path);
        self.by_name
            .get(&name)
            .or_else(|| self.by_lower_name.get(&name.to_ascii_lowercase()))
            .map(|i| &self.entries[*i])
    }

    /// Whether a part exists.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Classification of a part, if present.
    pub fn kind(&self, path: &str) -> Option<PartKind> {
        self.get(path).map(|e| e.kind)
    }

    /// Opaque parts in archive order.
    pub fn opaque(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| e.kind == PartKind::Opaque)
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
