//! Workbook model: ordered sheets plus the optional source binding.

use super::{Sheet, SheetState};
use crate::error::{Error, Result};
use crate::source::SourceContext;
use crate::tracker::ModificationTracker;

/// Longest sheet name Excel accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Check a sheet name against the SpreadsheetML rules.
pub fn validate_sheet_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidData("sheet name is empty".to_string()));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(Error::InvalidData(format!(
            "sheet name {name:?} is longer than {MAX_SHEET_NAME_LEN} characters"
        )));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\')) {
        return Err(Error::InvalidData(format!(
            "sheet name {name:?} contains {c:?}"
        )));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(Error::InvalidData(format!(
            "sheet name {name:?} starts or ends with an apostrophe"
        )));
    }
    Ok(())
}

/// A workbook.
///
/// Sheets are edited through methods that record what changed, so a workbook read from
/// a container can be written back with only the modified parts regenerated.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    source: Option<SourceContext>,
}

impl Workbook {
    /// Create an empty workbook with no source.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_source(sheets: Vec<Sheet>, source: SourceContext) -> Self {
        Self {
            sheets,
            source: Some(source),
        }
    }

    /// Sheets in tab order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Number of sheets.
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    /// Whether the workbook has no sheets.
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Sheet at a position.
    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    /// Sheet by name (case-insensitive, as Excel compares names).
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheet_index(name).map(|i| &self.sheets[i])
    }

    /// Position of a sheet by name.
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name) || s.name == name)
    }

    /// Sheet names in tab order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Source binding, if read from a container.
    pub fn source(&self) -> Option<&SourceContext> {
        self.source.as_ref()
    }

    /// Modifications recorded since the workbook was read.
    pub fn tracker(&self) -> ModificationTracker {
        self.source
            .as_ref()
            .map(|s| s.tracker().clone())
            .unwrap_or_default()
    }

    /// Drop the source binding; the next write regenerates every part.
    pub fn detach_source(&mut self) -> Option<SourceContext> {
        self.source.take()
    }

    fn track(&mut self, f: impl FnOnce(&ModificationTracker) -> ModificationTracker) {
        if let Some(source) = self.source.as_mut() {
            source.update_tracker(f);
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.sheets.len() {
            Ok(())
        } else {
            Err(Error::SheetNotFound(format!("index {index}")))
        }
    }

    fn check_unique(&self, name: &str, except: Option<usize>) -> Result<()> {
        let clash = self
            .sheets
            .iter()
            .enumerate()
            .any(|(i, s)| Some(i) != except && s.name.eq_ignore_ascii_case(name));
        if clash {
            return Err(Error::InvalidData(format!("duplicate sheet name {name:?}")));
        }
        Ok(())
    }

    /// Edit a sheet in place and record the change.
    ///
    /// Renames or visibility changes made inside `f` are validated and recorded as
    /// workbook metadata changes.
    pub fn update_sheet<R>(&mut self, index: usize, f: impl FnOnce(&mut Sheet) -> R) -> Result<R> {
        self.check_index(index)?;
        let (old_name, old_state) = {
            let sheet = &self.sheets[index];
            (sheet.name.clone(), sheet.state)
        };
        let out = f(&mut self.sheets[index]);

        let sheet = &self.sheets[index];
        let renamed = sheet.name != old_name;
        let metadata = renamed || sheet.state != old_state;
        if renamed {
            let new_name = sheet.name.clone();
            if let Err(e) = validate_sheet_name(&new_name).and(self.check_unique(&new_name, Some(index))) {
                self.sheets[index].name = old_name;
                return Err(e);
            }
        }
        let origin = self.sheets[index].origin.as_ref().map(|o| o.index);
        self.track(|t| {
            let t = match origin {
                Some(i) => t.mark_sheet_modified(i),
                None => t.clone(),
            };
            if metadata {
                t.mark_metadata_modified()
            } else {
                t
            }
        });
        Ok(out)
    }

    /// Mutable access to a sheet, recorded as a modification of its content.
    pub fn sheet_mut(&mut self, index: usize) -> Result<&mut Sheet> {
        self.check_index(index)?;
        if let Some(i) = self.sheets[index].origin.as_ref().map(|o| o.index) {
            self.track(|t| t.mark_sheet_modified(i));
        }
        Ok(&mut self.sheets[index])
    }

    /// Replace the sheet with the same name, or append it when none exists.
    ///
    /// A replaced sheet keeps its position and its place in the source container.
    pub fn put_sheet(&mut self, mut sheet: Sheet) -> Result<usize> {
        match self.sheet_index(&sheet.name) {
            Some(index) => {
                let old = &self.sheets[index];
                sheet.origin = old.origin.clone();
                let metadata = old.state != sheet.state || old.name != sheet.name;
                self.sheets[index] = sheet;
                let origin = self.sheets[index].origin.as_ref().map(|o| o.index);
                self.track(|t| {
                    let t = match origin {
                        Some(i) => t.mark_sheet_modified(i),
                        None => t.clone(),
                    };
                    if metadata {
                        t.mark_metadata_modified()
                    } else {
                        t
                    }
                });
                Ok(index)
            }
            None => self.add_sheet(sheet),
        }
    }

    /// Append a new sheet. Returns its position.
    pub fn add_sheet(&mut self, mut sheet: Sheet) -> Result<usize> {
        validate_sheet_name(&sheet.name)?;
        self.check_unique(&sheet.name, None)?;
        sheet.origin = None;
        self.sheets.push(sheet);
        self.track(|t| t.mark_metadata_modified());
        Ok(self.sheets.len() - 1)
    }

    /// Remove a sheet.
    pub fn delete_sheet(&mut self, index: usize) -> Result<Sheet> {
        self.check_index(index)?;
        let sheet = self.sheets.remove(index);
        let origin = sheet.origin.as_ref().map(|o| o.index);
        self.track(|t| {
            let t = match origin {
                Some(i) => t.mark_sheet_deleted(i),
                None => t.clone(),
            };
            t.mark_metadata_modified()
        });
        Ok(sheet)
    }

    /// Rename a sheet. Only the workbook part changes; the worksheet stays untouched.
    pub fn rename_sheet(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.check_index(index)?;
        let name = name.into();
        if self.sheets[index].name == name {
            return Ok(());
        }
        validate_sheet_name(&name)?;
        self.check_unique(&name, Some(index))?;
        self.sheets[index].name = name;
        self.track(|t| t.mark_metadata_modified());
        Ok(())
    }

    /// Move a sheet to a new position.
    pub fn move_sheet(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let sheet = self.sheets.remove(from);
        self.sheets.insert(to, sheet);
        self.track(|t| t.mark_reordered());
        Ok(())
    }

    /// Change a sheet's visibility.
    pub fn set_sheet_state(&mut self, index: usize, state: SheetState) -> Result<()> {
        self.check_index(index)?;
        if self.sheets[index].state != state {
            self.sheets[index].state = state;
            self.track(|t| t.mark_metadata_modified());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellRef;

    fn book(names: &[&str]) -> Workbook {
        let mut wb = Workbook::new();
        for name in names {
            wb.add_sheet(Sheet::new(*name)).unwrap();
        }
        wb
    }

    #[test]
    fn test_validate_sheet_name() {
        assert!(validate_sheet_name("Data 2024").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name("'quoted'").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
    }

    #[test]
    fn test_sheet_list_edits() {
        let mut wb = book(&["One", "Two", "Three"]);
        assert!(wb.add_sheet(Sheet::new("two")).is_err());
        wb.rename_sheet(1, "Second").unwrap();
        wb.move_sheet(0, 2).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Second", "Three", "One"]);
        let removed = wb.delete_sheet(1).unwrap();
        assert_eq!(removed.name, "Three");
        assert_eq!(wb.sheet_index("one"), Some(1));
        assert!(matches!(wb.delete_sheet(5), Err(Error::SheetNotFound(_))));
    }

    #[test]
    fn test_update_sheet_rejects_bad_rename() {
        let mut wb = book(&["One", "Two"]);
        let err = wb.update_sheet(0, |s| s.name = "Two".into()).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert_eq!(wb.sheet(0).unwrap().name, "One");

        let n = wb
            .update_sheet(1, |s| {
                s.set_value(CellRef::new(0, 0), 5.0);
                s.cells.len()
            })
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_put_sheet_replaces_by_name() {
        let mut wb = book(&["One"]);
        let mut replacement = Sheet::new("One");
        replacement.set_value(CellRef::new(0, 0), "new");
        assert_eq!(wb.put_sheet(replacement).unwrap(), 0);
        assert_eq!(wb.len(), 1);
        assert_eq!(wb.put_sheet(Sheet::new("Two")).unwrap(), 1);
        assert!(wb.tracker().is_empty());
    }
}
