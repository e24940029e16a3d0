//! Read/modify/write round trips against an in-memory three-sheet workbook.

mod common;

use common::*;
use xlpack::{
    read_bytes, write_to_bytes, CellRef, CellStyle, CellValue, Error, Font, ReadOptions, Sheet,
    SheetState, Warning, Workbook, WriteOptions, WriteStrategy,
};

fn load(bytes: Vec<u8>) -> Workbook {
    read_bytes(bytes, &ReadOptions::default()).unwrap().workbook
}

fn save(book: &Workbook) -> (Vec<u8>, WriteStrategy) {
    let (bytes, outcome) = write_to_bytes(book, &WriteOptions::default()).unwrap();
    (bytes, outcome.strategy)
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

#[test]
fn test_read_fixture() {
    let book = load(fixture());
    assert_eq!(book.sheet_names(), vec!["Alpha", "Beta", "Gamma"]);

    let alpha = book.sheet(0).unwrap();
    assert_eq!(alpha.value(CellRef::new(0, 0)), &text("Name"));
    assert_eq!(alpha.value(CellRef::new(1, 0)), &CellValue::Number(10.0));
    match alpha.value(CellRef::new(1, 1)) {
        CellValue::Formula(f) => {
            assert_eq!(f.expr, "SUM(B1:B1)");
            assert_eq!(f.cached.as_deref(), Some(&CellValue::Number(10.0)));
        }
        other => panic!("expected formula, got {other:?}"),
    }
    assert!(alpha.style_of(CellRef::new(0, 1)).unwrap().font.bold);

    let beta = book.sheet(1).unwrap();
    assert_eq!(beta.value(CellRef::new(1, 0)).as_number(), Some(45000.0));
    assert_eq!(book.sheet(2).unwrap().value(CellRef::new(1, 4)), &text("row 5"));
}

#[test]
fn test_unmodified_write_is_byte_identical() {
    let original = fixture();
    let book = load(original.clone());
    let (bytes, strategy) = save(&book);
    assert_eq!(strategy, WriteStrategy::VerbatimCopy);
    assert_eq!(bytes, original);
}

#[test]
fn test_unmodified_file_write_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = Fixture::default().write_to(dir.path(), "in.xlsx");
    let book = xlpack::read(&path).unwrap().workbook;

    let out = dir.path().join("out.xlsx");
    let outcome = xlpack::write(&book, &out).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::VerbatimCopy);
    assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&path).unwrap());
}

#[test]
fn test_surgical_write_isolates_modified_sheet() {
    let original = fixture();
    let mut book = load(original.clone());
    book.sheet_mut(1).unwrap().set_value(CellRef::new(2, 0), 7.0);

    let (bytes, strategy) = save(&book);
    assert_eq!(strategy, WriteStrategy::Surgical);

    for part in [SHEET1, SHEET3, SHARED_STRINGS, STYLES, THEME, "docProps/app.xml"] {
        assert_eq!(entry(&bytes, part), entry(&original, part), "{part} changed");
    }
    assert_ne!(entry(&bytes, SHEET2), entry(&original, SHEET2));
    assert!(entry(&bytes, CALC_CHAIN).is_none());
    assert!(!entry_text(&bytes, CONTENT_TYPES).contains("calcChain"));

    let reread = load(bytes);
    let beta = reread.sheet(1).unwrap();
    assert_eq!(beta.value(CellRef::new(0, 0)), &text("Beta"));
    assert_eq!(beta.value(CellRef::new(2, 0)), &CellValue::Number(7.0));
    assert_eq!(beta.value(CellRef::new(1, 0)).as_number(), Some(45000.0));
}

#[test]
fn test_rename_touches_only_workbook_part() {
    let original = fixture();
    let mut book = load(original.clone());
    book.rename_sheet(1, "Renamed").unwrap();

    let (bytes, strategy) = save(&book);
    assert_eq!(strategy, WriteStrategy::Surgical);
    for part in [SHEET1, SHEET2, SHEET3, SHARED_STRINGS, STYLES, CALC_CHAIN, CONTENT_TYPES] {
        assert_eq!(entry(&bytes, part), entry(&original, part), "{part} changed");
    }

    let workbook = entry_text(&bytes, WORKBOOK);
    assert!(workbook.contains(r#"name="Renamed""#));
    assert!(workbook.contains(r#"<calcPr calcId="191029"/>"#));
    assert_eq!(load(bytes).sheet_names(), vec!["Alpha", "Renamed", "Gamma"]);
}

#[test]
fn test_new_string_appends_to_table() {
    let mut book = load(fixture());
    book.sheet_mut(0).unwrap().set_value(CellRef::new(0, 2), "Fresh");

    let (bytes, _) = save(&book);
    let sst = entry_text(&bytes, SHARED_STRINGS);
    let name = sst.find("Name").unwrap();
    let beta = sst.find("Beta").unwrap();
    let fresh = sst.find("Fresh").unwrap();
    assert!(name < beta && beta < fresh);

    let reread = load(bytes);
    assert_eq!(reread.sheet(0).unwrap().value(CellRef::new(0, 2)), &text("Fresh"));
    assert_eq!(reread.sheet(1).unwrap().value(CellRef::new(0, 0)), &text("Beta"));
}

#[test]
fn test_new_style_is_appended() {
    let original = fixture();
    let mut book = load(original.clone());
    let italic = CellStyle {
        font: Font {
            italic: true,
            ..Default::default()
        },
        ..Default::default()
    };
    book.sheet_mut(0).unwrap().set_styled(CellRef::new(2, 0), 1.0, italic);

    let (bytes, _) = save(&book);
    assert_ne!(entry(&bytes, STYLES), entry(&original, STYLES));
    assert!(entry_text(&bytes, STYLES).contains(r#"<cellXfs count="4">"#));

    let reread = load(bytes);
    let alpha = reread.sheet(0).unwrap();
    assert!(alpha.style_of(CellRef::new(2, 0)).unwrap().font.italic);
    assert!(alpha.style_of(CellRef::new(0, 1)).unwrap().font.bold);
}

#[test]
fn test_delete_sheet_drops_part() {
    let mut book = load(fixture());
    book.delete_sheet(1).unwrap();

    let (bytes, strategy) = save(&book);
    assert_eq!(strategy, WriteStrategy::Surgical);
    assert!(entry(&bytes, SHEET2).is_none());
    assert!(!entry_text(&bytes, CONTENT_TYPES).contains("sheet2.xml"));
    assert!(!entry_text(&bytes, "xl/_rels/workbook.xml.rels").contains("sheet2.xml"));

    let reread = load(bytes);
    assert_eq!(reread.sheet_names(), vec!["Alpha", "Gamma"]);
    assert_eq!(reread.sheet(1).unwrap().value(CellRef::new(0, 0)), &CellValue::Number(1.0));
}

#[test]
fn test_add_sheet_gets_fresh_part() {
    let mut book = load(fixture());
    let mut delta = Sheet::new("Delta");
    delta.set_value(CellRef::new(0, 0), "new sheet");
    book.add_sheet(delta).unwrap();

    let (bytes, strategy) = save(&book);
    assert_eq!(strategy, WriteStrategy::Surgical);
    assert!(entry(&bytes, "xl/worksheets/sheet4.xml").is_some());
    assert!(entry_text(&bytes, CONTENT_TYPES).contains("/xl/worksheets/sheet4.xml"));
    assert_eq!(entry(&bytes, SHEET1), entry(&fixture(), SHEET1));

    let reread = load(bytes);
    assert_eq!(reread.sheet_names(), vec!["Alpha", "Beta", "Gamma", "Delta"]);
    assert_eq!(reread.sheet(3).unwrap().value(CellRef::new(0, 0)), &text("new sheet"));
}

#[test]
fn test_move_and_hide() {
    let mut book = load(fixture());
    book.move_sheet(2, 0).unwrap();
    book.set_sheet_state(1, SheetState::Hidden).unwrap();

    let (bytes, _) = save(&book);
    let reread = load(bytes);
    assert_eq!(reread.sheet_names(), vec!["Gamma", "Alpha", "Beta"]);
    assert_eq!(reread.sheet(1).unwrap().state, SheetState::Hidden);
    assert_eq!(reread.sheet(0).unwrap().value(CellRef::new(2, 0)), &CellValue::Number(2.0));
}

#[test]
fn test_workbook_without_source_is_generated() {
    let mut book = Workbook::new();
    let mut sheet = Sheet::new("Report");
    sheet.set_value(CellRef::new(0, 0), "label");
    sheet.set_value(CellRef::new(1, 0), 3.5);
    sheet.set_value(CellRef::new(2, 0), true);
    book.add_sheet(sheet).unwrap();

    let (bytes, strategy) = save(&book);
    assert_eq!(strategy, WriteStrategy::FullRegenerate);

    let reread = load(bytes);
    let report = reread.sheet(0).unwrap();
    assert_eq!(report.value(CellRef::new(0, 0)), &text("label"));
    assert_eq!(report.value(CellRef::new(1, 0)), &CellValue::Number(3.5));
    assert_eq!(report.value(CellRef::new(2, 0)), &CellValue::Bool(true));
}

#[test]
fn test_changed_source_falls_back_to_full_regeneration() {
    let dir = tempfile::tempdir().unwrap();
    let path = Fixture::default().write_to(dir.path(), "book.xlsx");
    let mut book = xlpack::read(&path).unwrap().workbook;
    book.sheet_mut(0).unwrap().set_value(CellRef::new(1, 0), 99.0);

    std::fs::write(&path, Fixture::default().with_gamma_rows(6).build()).unwrap();

    let out = dir.path().join("out.xlsx");
    let outcome = xlpack::write(&book, &out).unwrap();
    assert_eq!(outcome.strategy, WriteStrategy::FullRegenerate);
    assert!(matches!(outcome.warnings[..], [Warning::SourceChanged { .. }]));

    let reread = xlpack::read(&out).unwrap().workbook;
    assert_eq!(reread.sheet(0).unwrap().value(CellRef::new(1, 0)), &CellValue::Number(99.0));
    assert_eq!(reread.sheet(2).unwrap().cells.len(), 15);
}

#[test]
fn test_failed_write_leaves_destination_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.xlsx");
    std::fs::write(&out, b"previous").unwrap();

    let empty = Workbook::new();
    assert!(xlpack::write(&empty, &out).is_err());
    assert_eq!(std::fs::read(&out).unwrap(), b"previous");
}

#[test]
fn test_repeated_saves_in_place_keep_preserved_parts() {
    let dir = tempfile::tempdir().unwrap();
    let path = Fixture::default().write_to(dir.path(), "book.xlsx");
    let original = std::fs::read(&path).unwrap();
    let mut book = xlpack::read(&path).unwrap().workbook;

    book.sheet_mut(0).unwrap().set_value(CellRef::new(1, 0), 11.0);
    let first = xlpack::write(&book, &path).unwrap();
    assert_eq!(first.strategy, WriteStrategy::Surgical);
    assert!(first.warnings.is_empty());

    book.sheet_mut(1).unwrap().set_value(CellRef::new(2, 0), "second");
    let second = xlpack::write(&book, &path).unwrap();
    assert_eq!(second.strategy, WriteStrategy::Surgical);
    assert!(second.warnings.is_empty());

    let bytes = std::fs::read(&path).unwrap();
    for part in [THEME, "docProps/app.xml", SHEET3, STYLES] {
        assert_eq!(entry(&bytes, part), entry(&original, part), "{part} changed");
    }

    let reread = load(bytes);
    assert_eq!(reread.sheet(0).unwrap().value(CellRef::new(1, 0)), &CellValue::Number(11.0));
    assert_eq!(reread.sheet(1).unwrap().value(CellRef::new(2, 0)), &text("second"));
    assert_eq!(reread.sheet(1).unwrap().value(CellRef::new(0, 0)), &text("Beta"));
}

#[test]
fn test_missing_styles_part_is_fatal() {
    let bytes = Fixture::default().without(STYLES).build();
    match read_bytes(bytes, &ReadOptions::default()) {
        Err(Error::MissingPart(part)) => assert_eq!(part, STYLES),
        other => panic!("expected missing styles part, got {other:?}"),
    }
}

#[test]
fn test_missing_content_types_is_fatal() {
    let bytes = Fixture::default().without(CONTENT_TYPES).build();
    match read_bytes(bytes, &ReadOptions::default()) {
        Err(Error::MissingPart(part)) => assert_eq!(part, CONTENT_TYPES),
        other => panic!("expected missing content types, got {other:?}"),
    }
}

#[cfg(feature = "async")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_read_edit_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = Fixture::default().write_to(dir.path(), "async.xlsx");
    let original = std::fs::read(&path).unwrap();

    let outcome = xlpack::read_async(path.clone(), ReadOptions::default()).await.unwrap();
    assert!(outcome.warnings.is_empty());
    let mut book = outcome.workbook;
    book.rename_sheet(2, "Renamed").unwrap();

    let out = dir.path().join("async-out.xlsx");
    let written = xlpack::write_async(book, out.clone(), WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(written.strategy, WriteStrategy::Surgical);

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(entry(&bytes, SHEET3), entry(&original, SHEET3));
    let reread = xlpack::read_async(out, ReadOptions::default()).await.unwrap().workbook;
    assert_eq!(reread.sheet_names(), vec!["Alpha", "Beta", "Renamed"]);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_async_read_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = xlpack::read_async(dir.path().join("absent.xlsx"), ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
