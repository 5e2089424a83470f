//! Benchmarks for unscaffold's local transforms and defense chain.
//!
//! Run with: cargo bench
//!
//! These benchmarks test local processing at various document sizes; no oracle calls
//! are made.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use unscaffold::defense::{resolve_boundary, OracleAnswer};
use unscaffold::transform::protect::{protect, ProtectKind};
use unscaffold::transform::{final_cleanup, normalize_characters, remove_page_numbers};
use unscaffold::{BoundaryCandidate, OfflineOracle, Pipeline, PipelineConfig, SectionType};

/// Creates a synthetic OCR'd book with the given number of pages.
fn create_test_book(pages: usize) -> String {
    let mut text = String::from("Copyright © 2001 Example Press\nISBN 978-0-00-000000-0\n\n");
    for page in 1..=pages {
        text.push_str(&format!("THE LATE REPUBLIC {}\n\n", page));
        for i in 0..30 {
            text.push_str(&format!(
                "Line {} on page {} tells how the senators argued about ﬁnance and land reform [{}].\n",
                i,
                page,
                i % 9 + 1
            ));
        }
        text.push_str(&format!("\n- {} -\n\n", page));
    }
    text.push_str("BIBLIOGRAPHY\n");
    for i in 0..(pages / 2).max(5) {
        text.push_str(&format!("Author {}, A History of Rome, 19{:02}.\n", i, i % 100));
    }
    text
}

fn bench_local_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_transforms");

    for pages in [10, 100, 500] {
        let text = create_test_book(pages);
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::new("normalize", pages), &text, |b, text| {
            b.iter(|| normalize_characters(black_box(text), true))
        });
        group.bench_with_input(BenchmarkId::new("page_numbers", pages), &text, |b, text| {
            b.iter(|| remove_page_numbers(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("final_cleanup", pages), &text, |b, text| {
            b.iter(|| final_cleanup(black_box(text)))
        });
    }

    group.finish();
}

fn bench_protect_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("protect_restore");
    let kinds = [ProtectKind::Table, ProtectKind::CodeBlock, ProtectKind::Citation];

    for pages in [10, 100] {
        let text = create_test_book(pages);
        group.bench_with_input(BenchmarkId::new("pages", pages), &text, |b, text| {
            b.iter(|| {
                let protected = protect(black_box(text), &kinds);
                protected.restore(protected.text())
            })
        });
    }

    group.finish();
}

fn bench_defense_chain(c: &mut Criterion) {
    let text = create_test_book(200);
    let total = text.lines().count();
    let start = text
        .lines()
        .position(|line| line == "BIBLIOGRAPHY")
        .unwrap_or(total - 1);

    c.bench_function("defense_chain_accept", |b| {
        b.iter(|| {
            let candidate = BoundaryCandidate::new(start, total, 0.9);
            resolve_boundary(
                black_box(&text),
                SectionType::BackMatter,
                OracleAnswer::Found(candidate),
            )
        })
    });

    c.bench_function("defense_chain_reject", |b| {
        b.iter(|| {
            let candidate = BoundaryCandidate::new(4, total, 0.95);
            resolve_boundary(
                black_box(&text),
                SectionType::BackMatter,
                OracleAnswer::Found(candidate),
            )
        })
    });
}

fn bench_offline_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("offline_pipeline");
    group.sample_size(20);
    let config = PipelineConfig::minimal();

    for pages in [10, 100] {
        let text = create_test_book(pages);
        group.bench_with_input(BenchmarkId::new("pages", pages), &text, |b, text| {
            let mut pipeline = Pipeline::new(OfflineOracle);
            b.iter(|| pipeline.run(black_box(text), &config))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_local_transforms,
    bench_protect_restore,
    bench_defense_chain,
    bench_offline_pipeline,
);
criterion_main!(benches);
