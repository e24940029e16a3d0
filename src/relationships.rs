//! Package relationships (`_rels/*.rels`) and the per-part relationship graph.

use crate::error::Result;
use crate::xml::{self, NS_PACKAGE_REL};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

pub(crate) const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

/// Whether a relationship type URI names `kind` (`worksheet`, `styles`, ...).
///
/// Matches transitional and strict namespaces alike.
pub(crate) fn is_type(rel_type: &str, kind: &str) -> bool {
    rel_type
        .rsplit('/')
        .next()
        .is_some_and(|last| last == kind)
}

/// A relationship entry from a .rels file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target path (relative or absolute)
    pub target: String,
    /// Whether the target is external
    pub external: bool,
}

/// Relationships of one owning part, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    items: Vec<Relationship>,
    by_id: HashMap<String, usize>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a relationships part.
    pub fn parse(content: &str, part: &str) -> Result<Self> {
        let mut rels = Relationships::new();
        if content.trim().is_empty() {
            return Ok(rels);
        }

        let mut reader = xml::reader_from_str(content);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match xml::read_event(&mut reader, &mut buf, part)? {
                Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                    let id = xml::attr(&e, b"Id").unwrap_or_default();
                    if id.is_empty() {
                        continue;
                    }
                    rels.add(Relationship {
                        id,
                        rel_type: xml::attr(&e, b"Type").unwrap_or_default(),
                        target: xml::attr(&e, b"Target").unwrap_or_default(),
                        external: xml::attr(&e, b"TargetMode")
                            .is_some_and(|m| m.eq_ignore_ascii_case("external")),
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(rels)
    }

    /// Serialize to a relationships part, keeping entry order.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut w = xml::writer(Vec::new(), false);
        xml::write_decl(&mut w)?;
        w.write_event(Event::Start(
            BytesStart::new("Relationships").with_attributes([("xmlns", NS_PACKAGE_REL)]),
        ))?;
        for rel in &self.items {
            let mut e = BytesStart::new("Relationship");
            e.push_attribute(("Id", rel.id.as_str()));
            e.push_attribute(("Type", rel.rel_type.as_str()));
            e.push_attribute(("Target", rel.target.as_str()));
            if rel.external {
                e.push_attribute(("TargetMode", "External"));
            }
            w.write_event(Event::Empty(e))?;
        }
        w.write_event(Event::End(BytesEnd::new("Relationships")))?;
        Ok(w.into_inner())
    }

    /// Get a relationship by ID.
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id).map(|i| &self.items[*i])
    }

    /// Relationships whose type ends in `kind`.
    pub fn get_by_type(&self, kind: &str) -> Vec<&Relationship> {
        self.items
            .iter()
            .filter(|r| is_type(&r.rel_type, kind))
            .collect()
    }

    /// First relationship whose type ends in `kind`.
    pub fn first_by_type(&self, kind: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| is_type(&r.rel_type, kind))
    }

    /// Add a relationship, replacing one with the same ID.
    pub fn add(&mut self, rel: Relationship) {
        match self.by_id.get(&rel.id) {
            Some(i) => self.items[*i] = rel,
            None => {
                self.by_id.insert(rel.id.clone(), self.items.len());
                self.items.push(rel);
            }
        }
    }

    /// Remove a relationship by ID.
    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        let pos = self.by_id.remove(id)?;
        let removed = self.items.remove(pos);
        for idx in self.by_id.values_mut() {
            if *idx > pos {
                *idx -= 1;
            }
        }
        Some(removed)
    }

    /// Smallest `rIdN` not yet in use.
    pub fn next_id(&self) -> String {
        let max = self
            .items
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Iterate in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter()
    }

    /// Number of relationships.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no relationships.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Path of the relationships part for `part` (`""` for the package).
pub fn rels_path_for(part: &str) -> String {
    if part.is_empty() || part == "/" {
        return "_rels/.rels".to_string();
    }
    let path = Path::new(part);
    let parent = path.parent().unwrap_or(Path::new(""));
    let filename = path.file_name().unwrap_or_default().to_string_lossy();
    if parent.as_os_str().is_empty() {
        format!("_rels/{}.rels", filename)
    } else {
        format!("{}/_rels/{}.rels", parent.display(), filename)
    }
}

/// Owning part of a relationships part, inverse of [`rels_path_for`].
pub fn owner_of_rels(rels_path: &str) -> Option<String> {
    let (dir, file) = rels_path.rsplit_once("_rels/")?;
    let name = file.strip_suffix(".rels")?;
    Some(format!("{}{}", dir, name))
}

/// Resolve a relative path from a base path.
pub fn resolve_path(base: &str, relative: &str) -> String {
    if let Some(stripped) = relative.strip_prefix('/') {
        return stripped.to_string();
    }

    let base_path = Path::new(base);
    let base_dir = base_path.parent().unwrap_or(Path::new(""));

    let mut result = base_dir.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(c) => {
                result.push(c);
            }
            _ => {}
        }
    }

    result.to_string_lossy().replace('\\', "/")
}

/// Express `target` relative to the directory of `owner`.
pub fn relative_target(owner: &str, target: &str) -> String {
    let mut owner_dir: Vec<&str> = owner.split('/').collect();
    owner_dir.pop();
    let target_parts: Vec<&str> = target.split('/').collect();

    let common = owner_dir
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut out: Vec<&str> = Vec::new();
    for _ in common..owner_dir.len() {
        out.push("..");
    }
    out.extend(&target_parts[common..]);
    out.join("/")
}

/// Relationship graph: owning part → its relationships.
///
/// IDs are kept exactly as read so regenerated owners keep pointing at preserved targets.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    by_owner: BTreeMap<String, Relationships>,
}

impl RelationshipGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the relationships of an owning part (`""` for the package).
    pub fn insert(&mut self, owner: impl Into<String>, rels: Relationships) {
        self.by_owner.insert(owner.into(), rels);
    }

    /// Relationships of an owning part.
    pub fn of(&self, owner: &str) -> Option<&Relationships> {
        self.by_owner.get(owner)
    }

    /// Resolve a relationship ID to a part path.
    pub fn target(&self, owner: &str, id: &str) -> Option<String> {
        let rel = self.by_owner.get(owner)?.get(id)?;
        if rel.external {
            return None;
        }
        Some(resolve_path(owner, &rel.target))
    }

    /// Owning parts in name order.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.by_owner.keys().map(String::as_str)
    }
}
