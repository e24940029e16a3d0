//! Benchmarks for the write strategies and the streaming paths.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use xlpack::{
    read_bytes, read_stream_bytes, write_stream, write_to_bytes, CellRef, ReadOptions, RowData,
    Sheet, StreamBounds, Workbook, WriteOptions,
};

/// A three-sheet workbook; every sheet has `rows` rows of a label and two numbers.
fn create_workbook(rows: u32) -> Vec<u8> {
    let mut book = Workbook::new();
    for name in ["First", "Second", "Third"] {
        let mut sheet = Sheet::new(name);
        for r in 0..rows {
            sheet.set_value(CellRef::new(0, r), format!("item {}", r % 500));
            sheet.set_value(CellRef::new(1, r), f64::from(r));
            sheet.set_value(CellRef::new(2, r), f64::from(r) * 1.5);
        }
        book.add_sheet(sheet).unwrap();
    }
    write_to_bytes(&book, &WriteOptions::default()).unwrap().0
}

fn bench_write_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_strategies");

    for rows in [1_000u32, 10_000] {
        let bytes = create_workbook(rows);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        let book = read_bytes(bytes.clone(), &ReadOptions::default()).unwrap().workbook;
        group.bench_with_input(BenchmarkId::new("verbatim", rows), &book, |b, book| {
            b.iter(|| write_to_bytes(black_box(book), &WriteOptions::default()).unwrap())
        });

        let mut modified = book.clone();
        modified
            .sheet_mut(1)
            .unwrap()
            .set_value(CellRef::new(3, 0), "changed");
        group.bench_with_input(BenchmarkId::new("surgical", rows), &modified, |b, book| {
            b.iter(|| write_to_bytes(black_box(book), &WriteOptions::default()).unwrap())
        });

        let mut detached = book.clone();
        detached.detach_source();
        group.bench_with_input(BenchmarkId::new("full", rows), &detached, |b, book| {
            b.iter(|| write_to_bytes(black_box(book), &WriteOptions::default()).unwrap())
        });
    }

    group.finish();
}

fn bench_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming");
    let dir = tempfile::tempdir().unwrap();

    for rows in [10_000u32, 100_000] {
        group.throughput(Throughput::Elements(u64::from(rows)));

        group.bench_with_input(BenchmarkId::new("write_two_phase", rows), &rows, |b, &rows| {
            let path = dir.path().join("two_phase.xlsx");
            b.iter(|| {
                let data = (0..rows).map(|r| RowData::from_values(r, [f64::from(r), 2.0]));
                write_stream(&path, "Data", data, None).unwrap()
            })
        });

        let bytes = create_workbook(rows);
        group.bench_with_input(BenchmarkId::new("read_all_rows", rows), &bytes, |b, bytes| {
            b.iter(|| {
                let stream =
                    read_stream_bytes(bytes.clone(), 0, StreamBounds::new(), &ReadOptions::default())
                        .unwrap();
                black_box(stream.count())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_strategies, bench_streaming);
criterion_main!(benches);
