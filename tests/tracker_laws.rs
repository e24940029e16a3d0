//! Property tests: tracker merge laws and style deduplication.

use proptest::prelude::*;
use xlpack::{CellStyle, Color, Font, ModificationTracker, StyleRegistry};

#[derive(Debug, Clone)]
enum Mark {
    Modified(usize),
    Deleted(usize),
    Reordered,
    Metadata,
}

fn arb_mark() -> impl Strategy<Value = Mark> {
    prop_oneof![
        (0usize..8).prop_map(Mark::Modified),
        (0usize..8).prop_map(Mark::Deleted),
        Just(Mark::Reordered),
        Just(Mark::Metadata),
    ]
}

fn arb_tracker() -> impl Strategy<Value = ModificationTracker> {
    prop::collection::vec(arb_mark(), 0..6).prop_map(|marks| {
        marks.iter().fold(ModificationTracker::new(), |t, mark| match mark {
            Mark::Modified(i) => t.mark_sheet_modified(*i),
            Mark::Deleted(i) => t.mark_sheet_deleted(*i),
            Mark::Reordered => t.mark_reordered(),
            Mark::Metadata => t.mark_metadata_modified(),
        })
    })
}

fn arb_style() -> impl Strategy<Value = CellStyle> {
    (
        any::<bool>(),
        any::<bool>(),
        prop::option::of(prop::sample::select(vec!["ff0000ff", "FF00FF00", "ff112233"])),
        prop::option::of(prop::sample::select(vec![9.0, 11.0, 14.5])),
    )
        .prop_map(|(bold, italic, color, size)| CellStyle {
            font: Font {
                bold,
                italic,
                color: color.map(|c| Color::Rgb(c.to_string())),
                size,
                ..Default::default()
            },
            ..Default::default()
        })
}

proptest! {
    #[test]
    fn test_merge_is_commutative(a in arb_tracker(), b in arb_tracker()) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn test_merge_is_associative(a in arb_tracker(), b in arb_tracker(), c in arb_tracker()) {
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn test_empty_tracker_is_identity(a in arb_tracker()) {
        prop_assert_eq!(a.merge(&ModificationTracker::new()), a.clone());
        prop_assert_eq!(ModificationTracker::new().merge(&a), a);
    }

    #[test]
    fn test_merge_is_idempotent(a in arb_tracker()) {
        prop_assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn test_marking_leaves_original_untouched(a in arb_tracker(), i in 0usize..8) {
        let before = a.clone();
        let marked = a.mark_sheet_modified(i);
        prop_assert_eq!(&a, &before);
        prop_assert!(marked.is_sheet_modified(i));
        prop_assert!(!marked.is_empty());
    }

    #[test]
    fn test_equal_styles_share_an_id(styles in prop::collection::vec(arb_style(), 1..20)) {
        let mut registry = StyleRegistry::new();
        let ids: Vec<_> = styles.iter().map(|s| registry.intern(s.clone())).collect();
        for (i, a) in styles.iter().enumerate() {
            for (j, b) in styles.iter().enumerate() {
                let same = a.canonical_key() == b.canonical_key();
                prop_assert_eq!(ids[i] == ids[j], same);
            }
        }
        let distinct: std::collections::HashSet<_> = styles.iter().map(|s| s.canonical_key()).collect();
        prop_assert_eq!(registry.len(), distinct.len());
    }

    #[test]
    fn test_colour_case_does_not_split_styles(bold in any::<bool>()) {
        let style = |hex: &str| CellStyle {
            font: Font { bold, color: Some(Color::Rgb(hex.to_string())), ..Default::default() },
            ..Default::default()
        };
        let mut registry = StyleRegistry::new();
        let lower = registry.intern(style("ff0000ff"));
        let upper = registry.intern(style("FF0000FF"));
        prop_assert_eq!(lower, upper);
        prop_assert_eq!(registry.len(), 1);
    }
}
