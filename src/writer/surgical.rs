//! Surgical write: regenerate what changed, copy everything else raw.

use super::{fresh_sheet_part, put_part};
use crate::container::canonical_part_name;
use crate::content_types::{CONTENT_TYPES_PART, CT_SHARED_STRINGS, CT_WORKSHEET};
use crate::error::{Error, Result};
use crate::model::{Sheet, Workbook};
use crate::options::{SharedStringsPolicy, WriteOptions};
use crate::relationships::{
    relative_target, rels_path_for, resolve_path, Relationship, REL_SHARED_STRINGS, REL_WORKSHEET,
};
use crate::source::{SourceContext, SourceData};
use crate::xlsx::shared_strings::SHARED_STRINGS_PART;
use crate::xlsx::styles::{patch_styles_part, StyleIndex};
use crate::xlsx::workbook_xml::{patch_workbook, SheetEntry};
use crate::xlsx::worksheet_writer::{splice_worksheet, write_worksheet, CellEmitter, StringSink};
use std::collections::{HashMap, HashSet};
use std::io::{Seek, Write};
use zip::ZipWriter;

/// What happens to one sheet of the model.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SheetPlan {
    /// Source sheet `i`, untouched: its part is copied
    Keep(usize),
    /// Source sheet `i`, modified: its part is spliced
    Splice(usize),
    /// Sheet without a usable origin: generated at a new part
    New(String),
}

fn part_key(name: &str) -> String {
    canonical_part_name(name).to_ascii_lowercase()
}

/// Parts to write instead of, or in addition to, the source entries.
#[derive(Default)]
struct Output {
    replaced: HashMap<String, Vec<u8>>,
    added: Vec<(String, Vec<u8>)>,
    dropped: HashSet<String>,
}

impl Output {
    /// Replace the part if the source has it, otherwise add it.
    fn put(&mut self, data: &SourceData, name: &str, bytes: Vec<u8>) {
        if data.store.entry(name).is_some() {
            self.replaced.insert(part_key(name), bytes);
        } else {
            self.added.push((canonical_part_name(name), bytes));
        }
    }

    fn drop_part(&mut self, name: &str) {
        self.dropped.insert(part_key(name));
    }
}

fn plan_sheets(workbook: &Workbook, data: &SourceData, source: &SourceContext) -> (Vec<SheetPlan>, Vec<bool>) {
    let tracker = source.tracker();
    let mut taken = vec![false; data.sheet_parts.len()];
    let mut used: HashSet<String> = data.store.entries().iter().map(|e| part_key(&e.name)).collect();
    let mut next_part = 0usize;

    let plans = workbook
        .sheets()
        .iter()
        .map(|sheet| match &sheet.origin {
            Some(o)
                if o.index < taken.len()
                    && !taken[o.index]
                    && part_key(&data.sheet_parts[o.index]) == part_key(&o.part) =>
            {
                taken[o.index] = true;
                if tracker.is_sheet_modified(o.index) {
                    SheetPlan::Splice(o.index)
                } else {
                    SheetPlan::Keep(o.index)
                }
            }
            _ => loop {
                let part = fresh_sheet_part(next_part);
                next_part += 1;
                if used.insert(part_key(&part)) {
                    break SheetPlan::New(part);
                }
            },
        })
        .collect();
    (plans, taken)
}

/// Write `workbook` against its source, regenerating only what changed.
pub(crate) fn write_surgical<W: Write + Seek>(
    workbook: &Workbook,
    source: &SourceContext,
    zip: &mut ZipWriter<W>,
    options: &WriteOptions,
) -> Result<()> {
    if workbook.is_empty() {
        return Err(Error::InvalidData(
            "a workbook needs at least one sheet".to_string(),
        ));
    }
    let data: &SourceData = &source.data;
    let pretty = options.pretty_print;
    let (plans, taken) = plan_sheets(workbook, data, source);
    let deleted: Vec<usize> = (0..taken.len()).filter(|i| !taken[*i]).collect();
    let spliced = plans.iter().any(|p| matches!(p, SheetPlan::Splice(_)));

    let mut out = Output::default();
    let mut content_types = data.content_types.clone();
    let mut content_types_changed = false;
    let mut workbook_rels = data.graph.of(&data.workbook_path).cloned().unwrap_or_default();
    let mut rels_changed = false;

    // Worksheets and the styles and strings they need.
    let regenerated: Vec<(&Sheet, &SheetPlan)> = workbook
        .sheets()
        .iter()
        .zip(&plans)
        .filter(|(_, plan)| !matches!(plan, SheetPlan::Keep(_)))
        .collect();
    let refs: Vec<&Sheet> = regenerated.iter().map(|(s, _)| *s).collect();
    let (styles, maps) = StyleIndex::from_model(Some(&data.palette), &refs);
    let mut sst = (*data.shared_strings).clone();

    for ((sheet, plan), map) in regenerated.iter().zip(&maps) {
        let sink = match options.shared_strings {
            SharedStringsPolicy::Never => StringSink::Inline,
            _ => StringSink::Shared(&mut sst),
        };
        let mut emitter = CellEmitter::new(sink, options.escape_formulas);
        match plan {
            SheetPlan::Splice(i) => {
                let part = &data.sheet_parts[*i];
                log::debug!("regenerating {part} for sheet {:?}", sheet.name);
                let original = data.store.read_xml(part)?;
                let bytes = splice_worksheet(&original, part, sheet, map, &mut emitter)?;
                out.put(data, part, bytes);
            }
            SheetPlan::New(part) => {
                log::debug!("generating {part} for new sheet {:?}", sheet.name);
                let bytes = write_worksheet(sheet, map, &mut emitter, false, pretty)?;
                out.put(data, part, bytes);
            }
            SheetPlan::Keep(_) => {}
        }
    }

    let write_strings = match options.shared_strings {
        SharedStringsPolicy::Never => false,
        SharedStringsPolicy::Auto => sst.has_new_strings(),
        SharedStringsPolicy::Always => true,
    };
    if write_strings {
        let bytes = sst.to_xml(pretty, false)?;
        match &data.shared_strings_path {
            Some(path) => out.put(data, path, bytes),
            None => {
                log::debug!("adding shared string table");
                out.put(data, SHARED_STRINGS_PART, bytes);
                let id = workbook_rels.next_id();
                workbook_rels.add(relationship(id, REL_SHARED_STRINGS, &relative_target(&data.workbook_path, SHARED_STRINGS_PART)));
                content_types.set_override(SHARED_STRINGS_PART, CT_SHARED_STRINGS);
                rels_changed = true;
                content_types_changed = true;
            }
        }
    }

    if styles.has_new_styles() {
        log::debug!("{} new styles", styles.new_styles().len());
        let original = data.store.read_xml(&data.styles_path)?;
        out.put(data, &data.styles_path, patch_styles_part(&original, &data.styles, &styles)?);
    }

    // A stale calculation chain makes Excel repair the file.
    if spliced || !deleted.is_empty() {
        if let Some(rel) = workbook_rels.first_by_type("calcChain").cloned() {
            let path = resolve_path(&data.workbook_path, &rel.target);
            log::debug!("dropping calculation chain {path}");
            workbook_rels.remove(&rel.id);
            content_types.remove_override(&path);
            out.drop_part(&path);
            rels_changed = true;
            content_types_changed = true;
        }
    }

    for &i in &deleted {
        let part = &data.sheet_parts[i];
        log::debug!("dropping {part} of deleted sheet {:?}", data.workbook.sheets[i].name);
        out.drop_part(part);
        out.drop_part(&rels_path_for(part));
        workbook_rels.remove(&data.workbook.sheets[i].rel_id);
        content_types.remove_override(part);
        rels_changed = true;
        content_types_changed = true;
    }

    // Sheet list.
    let mut next_sheet_id = data.workbook.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;
    let mut positions = vec![None; data.workbook.sheets.len()];
    let mut entries = Vec::with_capacity(plans.len());
    for (position, (sheet, plan)) in workbook.sheets().iter().zip(&plans).enumerate() {
        let entry = match plan {
            SheetPlan::Keep(i) | SheetPlan::Splice(i) => {
                positions[*i] = Some(position);
                let original = &data.workbook.sheets[*i];
                SheetEntry {
                    name: sheet.name.clone(),
                    sheet_id: original.sheet_id,
                    rel_id: original.rel_id.clone(),
                    state: sheet.state,
                }
            }
            SheetPlan::New(part) => {
                let rel_id = workbook_rels.next_id();
                workbook_rels.add(relationship(rel_id.clone(), REL_WORKSHEET, &relative_target(&data.workbook_path, part)));
                content_types.set_override(part, CT_WORKSHEET);
                rels_changed = true;
                content_types_changed = true;
                let sheet_id = next_sheet_id;
                next_sheet_id += 1;
                SheetEntry {
                    name: sheet.name.clone(),
                    sheet_id,
                    rel_id,
                    state: sheet.state,
                }
            }
        };
        entries.push(entry);
    }

    if entries != data.workbook.sheets {
        log::debug!("patching {}", data.workbook_path);
        let original = data.store.read_xml(&data.workbook_path)?;
        let bytes = patch_workbook(&original, &entries, &data.workbook.rel_prefix, &positions)?;
        out.put(data, &data.workbook_path, bytes);
    }
    if rels_changed {
        out.put(data, &rels_path_for(&data.workbook_path), workbook_rels.to_xml()?);
    }
    if content_types_changed {
        out.put(data, CONTENT_TYPES_PART, content_types.to_xml()?);
    }

    let mut copied = 0usize;
    for entry in data.store.entries() {
        let key = part_key(&entry.name);
        if out.dropped.contains(&key) {
            continue;
        }
        match out.replaced.remove(&key) {
            Some(bytes) => put_part(zip, &canonical_part_name(&entry.name), &bytes, options)?,
            None => {
                data.store.copy_raw(entry.index, zip)?;
                copied += 1;
            }
        }
    }
    for (name, bytes) in &out.added {
        put_part(zip, name, bytes, options)?;
    }
    log::debug!(
        "surgical write: {copied} parts copied, {} added, {} dropped",
        out.added.len(),
        out.dropped.len()
    );
    Ok(())
}

fn relationship(id: String, rel_type: &str, target: &str) -> Relationship {
    Relationship {
        id,
        rel_type: rel_type.to_string(),
        target: target.to_string(),
        external: false,
    }
}
