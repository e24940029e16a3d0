//! Modification tracking between read and write.
//!
//! A [`ModificationTracker`] is an immutable value: every `mark_*` call returns a new
//! tracker and [`ModificationTracker::merge`] combines independently produced trackers.
//! Sheet indices are positions in the *source* workbook, so they stay valid across
//! reorders and deletions of other sheets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Record of what changed since a workbook was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationTracker {
    modified_sheets: BTreeSet<usize>,
    deleted_sheets: BTreeSet<usize>,
    reordered: bool,
    modified_metadata: bool,
}

impl ModificationTracker {
    /// The empty tracker (nothing changed). Identity of [`merge`](Self::merge).
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a source sheet's cell content as modified.
    #[must_use]
    pub fn mark_sheet_modified(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.modified_sheets.insert(index);
        next
    }

    /// Mark a source sheet as deleted.
    #[must_use]
    pub fn mark_sheet_deleted(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.deleted_sheets.insert(index);
        next
    }

    /// Mark the sheet order as changed.
    ///
    /// Reordering only rewrites the workbook part; worksheet parts stay verbatim.
    #[must_use]
    pub fn mark_reordered(&self) -> Self {
        Self {
            reordered: true,
            ..self.clone()
        }
    }

    /// Mark workbook-level metadata (sheet names, visibility, sheet list) as changed.
    #[must_use]
    pub fn mark_metadata_modified(&self) -> Self {
        Self {
            modified_metadata: true,
            ..self.clone()
        }
    }

    /// Union of two trackers.
    ///
    /// Associative and commutative, with [`ModificationTracker::new`] as identity.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            modified_sheets: self
                .modified_sheets
                .union(&other.modified_sheets)
                .copied()
                .collect(),
            deleted_sheets: self
                .deleted_sheets
                .union(&other.deleted_sheets)
                .copied()
                .collect(),
            reordered: self.reordered || other.reordered,
            modified_metadata: self.modified_metadata || other.modified_metadata,
        }
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.modified_sheets.is_empty()
            && self.deleted_sheets.is_empty()
            && !self.reordered
            && !self.modified_metadata
    }

    /// Whether a source sheet's content changed.
    pub fn is_sheet_modified(&self, index: usize) -> bool {
        self.modified_sheets.contains(&index)
    }

    /// Whether a source sheet was deleted.
    pub fn is_sheet_deleted(&self, index: usize) -> bool {
        self.deleted_sheets.contains(&index)
    }

    /// Source indices of modified sheets.
    pub fn modified_sheets(&self) -> &BTreeSet<usize> {
        &self.modified_sheets
    }

    /// Source indices of deleted sheets.
    pub fn deleted_sheets(&self) -> &BTreeSet<usize> {
        &self.deleted_sheets
    }

    /// Whether sheets were reordered.
    pub fn reordered(&self) -> bool {
        self.reordered
    }

    /// Whether workbook metadata changed.
    pub fn metadata_modified(&self) -> bool {
        self.modified_metadata
    }

    /// Whether `xl/workbook.xml` must be rewritten.
    pub fn needs_workbook_part(&self) -> bool {
        self.reordered || self.modified_metadata || !self.deleted_sheets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_return_new_values() {
        let empty = ModificationTracker::new();
        let modified = empty.mark_sheet_modified(2);
        assert!(empty.is_empty());
        assert!(!modified.is_empty());
        assert!(modified.is_sheet_modified(2));
        assert!(!modified.is_sheet_modified(1));
    }

    #[test]
    fn test_reorder_does_not_touch_sheets() {
        let t = ModificationTracker::new().mark_reordered();
        assert!(t.reordered());
        assert!(t.modified_sheets().is_empty());
        assert!(t.needs_workbook_part());
    }

    #[test]
    fn test_merge_unions_independent_edits() {
        let a = ModificationTracker::new().mark_sheet_modified(0);
        let b = ModificationTracker::new()
            .mark_sheet_modified(3)
            .mark_sheet_deleted(1)
            .mark_metadata_modified();
        let m = a.merge(&b);
        assert!(m.is_sheet_modified(0));
        assert!(m.is_sheet_modified(3));
        assert!(m.is_sheet_deleted(1));
        assert!(m.metadata_modified());
        assert!(!m.reordered());
    }

    #[test]
    fn test_merge_identity() {
        let t = ModificationTracker::new().mark_sheet_deleted(4).mark_reordered();
        assert_eq!(t.merge(&ModificationTracker::new()), t);
        assert_eq!(ModificationTracker::new().merge(&t), t);
    }
}
