//! Benchmarks for cell update statement generation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tm1_cells::statements::{batch_statements, cell_update_statements, StatementOptions};
use tm1_core::{CellValue, ElementType, InsensitiveDict, InsensitiveTupleMap};

const N_CELLS: usize = 100_000;

fn sample_cells() -> (InsensitiveTupleMap<CellValue>, InsensitiveDict<ElementType>) {
    let cells = (0..N_CELLS)
        .map(|i| {
            let measure = if i % 10 == 0 { "Comment" } else { "Units" };
            (
                vec![
                    format!("Region {}", i % 97),
                    format!("Product {i}"),
                    measure.to_string(),
                ],
                if i % 10 == 0 {
                    CellValue::from(format!("note {i}"))
                } else {
                    CellValue::Number(i as f64 * 1.25)
                },
            )
        })
        .collect();
    let mut types = InsensitiveDict::new();
    types.insert("Units".to_string(), ElementType::Numeric);
    types.insert("Comment".to_string(), ElementType::String);
    (cells, types)
}

fn bench_statements(c: &mut Criterion) {
    let (cells, types) = sample_cells();
    c.bench_function("cell_update_statements_100k", |b| {
        b.iter(|| {
            let statements = cell_update_statements(
                "Sales",
                black_box(&cells),
                &types,
                StatementOptions::default(),
            );
            black_box(statements);
        })
    });
    let statements = cell_update_statements("Sales", &cells, &types, StatementOptions::default());
    c.bench_function("batch_statements_100k", |b| {
        b.iter(|| black_box(batch_statements(black_box(&statements), "")))
    });
}

criterion_group!(benches, bench_statements);
criterion_main!(benches);
