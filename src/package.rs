//! Workbook-level parts shared by the full and streaming readers.

use crate::container::{canonical_part_name, OoxmlContainer};
use crate::content_types::{ContentTypes, CONTENT_TYPES_PART};
use crate::detect;
use crate::error::{Error, Result};
use crate::manifest::PartManifest;
use crate::model::CellStyle;
use crate::relationships::{owner_of_rels, resolve_path, RelationshipGraph, Relationships};
use crate::xlsx::shared_strings::SharedStringTable;
use crate::xlsx::styles::{date_flags, StylesPart, STYLES_PART};
use crate::xlsx::workbook_xml::{WorkbookPart, WORKBOOK_PART};
use crate::xlsx::worksheet::CellDecoder;
use std::sync::Arc;

/// An opened container with its workbook, relationship, style and string parts parsed.
///
/// Worksheets are left untouched; callers stream them from `container`.
pub(crate) struct Package {
    pub container: OoxmlContainer,
    pub manifest: PartManifest,
    pub graph: RelationshipGraph,
    pub content_types: ContentTypes,
    pub workbook_path: String,
    pub workbook: WorkbookPart,
    pub sheet_parts: Vec<String>,
    pub styles_path: String,
    pub styles: StylesPart,
    pub palette: Vec<CellStyle>,
    pub shared_strings_path: Option<String>,
    pub shared_strings: Arc<SharedStringTable>,
}

impl Package {
    pub fn load(mut container: OoxmlContainer) -> Result<Self> {
        let format = detect::detect_format_from_container(&mut container)?;
        log::debug!("opened {format} container");

        let manifest = PartManifest::build(container.entries())?;
        let content_types = match container.read_optional_xml(CONTENT_TYPES_PART)? {
            Some(xml) => ContentTypes::parse(&xml)?,
            None => return Err(Error::MissingPart(CONTENT_TYPES_PART.to_string())),
        };
        let graph = read_relationships(&mut container)?;

        let workbook_path = graph
            .of("")
            .and_then(|rels| rels.first_by_type("officeDocument"))
            .filter(|r| !r.external)
            .map(|r| resolve_path("", &r.target))
            .filter(|p| container.exists(p))
            .unwrap_or_else(|| WORKBOOK_PART.to_string());
        let workbook = WorkbookPart::parse(&container.read_xml(&workbook_path)?)?;

        let mut sheet_parts = Vec::with_capacity(workbook.sheets.len());
        for sheet in &workbook.sheets {
            let part = graph.target(&workbook_path, &sheet.rel_id).ok_or_else(|| {
                Error::InvalidReference(format!(
                    "sheet {:?} refers to unknown relationship {}",
                    sheet.name, sheet.rel_id
                ))
            })?;
            if !container.exists(&part) {
                return Err(Error::MissingPart(part));
            }
            sheet_parts.push(canonical_part_name(&part));
        }

        let related = |kind: &str| -> Option<String> {
            let rel = graph.of(&workbook_path)?.first_by_type(kind)?;
            (!rel.external).then(|| resolve_path(&workbook_path, &rel.target))
        };

        let styles_path = related("styles")
            .filter(|p| container.exists(p))
            .ok_or_else(|| Error::MissingPart(STYLES_PART.to_string()))?;
        let styles = StylesPart::parse(&container.read_xml(&styles_path)?)?;
        let palette = styles.cell_styles();

        let shared_strings_path = related("sharedStrings").filter(|p| container.exists(p));
        let shared_strings = match &shared_strings_path {
            Some(path) => {
                let limits = container.limits().clone();
                container.with_part_reader(path, |input| SharedStringTable::parse_from(input, &limits))?
            }
            None => SharedStringTable::new(),
        };

        Ok(Self {
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
            shared_strings: Arc::new(shared_strings),
        })
    }

    /// Decoder for this package's worksheets.
    pub fn decoder(&self) -> CellDecoder {
        CellDecoder {
            strings: Arc::clone(&self.shared_strings),
            date_xfs: Arc::from(date_flags(&self.palette)),
        }
    }

    /// Resolve a sheet by position or name to its source position.
    pub fn find_sheet(&self, index: Option<usize>, name: Option<&str>) -> Result<usize> {
        let found = match (index, name) {
            (Some(i), _) => (i < self.workbook.sheets.len()).then_some(i),
            (None, Some(name)) => self
                .workbook
                .sheets
                .iter()
                .position(|s| s.name == name)
                .or_else(|| {
                    self.workbook
                        .sheets
                        .iter()
                        .position(|s| s.name.eq_ignore_ascii_case(name))
                }),
            (None, None) => None,
        };
        found.ok_or_else(|| {
            Error::SheetNotFound(match (index, name) {
                (Some(i), _) => format!("index {i}"),
                (None, Some(n)) => n.to_string(),
                (None, None) => String::new(),
            })
        })
    }
}

/// Parse every `.rels` part into the graph, keyed by owning part.
fn read_relationships(container: &mut OoxmlContainer) -> Result<RelationshipGraph> {
    let rels_parts: Vec<String> = container
        .list_files()
        .into_iter()
        .map(|name| canonical_part_name(&name))
        .filter(|name| name.ends_with(".rels"))
        .collect();

    let mut graph = RelationshipGraph::new();
    for part in rels_parts {
        let Some(owner) = owner_of_rels(&part) else {
            continue;
        };
        let rels = Relationships::parse(&container.read_xml(&part)?, &part)?;
        graph.insert(owner, rels);
    }
    Ok(graph)
}
