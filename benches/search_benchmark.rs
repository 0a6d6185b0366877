use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use std::sync::Arc;
use textdex::aggregate::SearchRequest;
use textdex::core::config::Config;
use textdex::core::spec::IndexSpec;
use textdex::core::types::Document;
use textdex::schema::Schema;

const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango",
];

fn build_index(num_docs: usize) -> Arc<IndexSpec> {
    let schema = Schema::new()
        .add_text_field("body", false)
        .add_numeric_field("price", true);
    let config = Config {
        concurrent_mode: false,
        ..Config::default()
    };
    let spec = IndexSpec::new("bench", schema, config);
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..num_docs {
        let body: Vec<&str> = (0..12)
            .map(|_| *WORDS.choose(&mut rng).unwrap())
            .collect();
        spec.add(
            Document::new(format!("doc{i}"))
                .text("body", body.join(" "))
                .numeric("price", rng.gen_range(0.0..100.0)),
        )
        .unwrap();
    }
    spec
}

fn bench_indexing(c: &mut Criterion) {
    c.bench_function("index_1000_docs", |b| {
        b.iter(|| black_box(build_index(1000)));
    });
}

fn bench_queries(c: &mut Criterion) {
    let spec = build_index(5000);

    c.bench_function("single_term", |b| {
        b.iter(|| {
            black_box(SearchRequest::search("alpha").execute(&spec).unwrap());
        });
    });

    c.bench_function("union_two_terms", |b| {
        b.iter(|| {
            black_box(SearchRequest::search("alpha bravo").execute(&spec).unwrap());
        });
    });

    c.bench_function("intersection_with_filter", |b| {
        b.iter(|| {
            black_box(
                SearchRequest::search("alpha")
                    .filter(textdex::index::numeric::NumericFilter::new(
                        "price", 25.0, 75.0,
                    ))
                    .execute(&spec)
                    .unwrap(),
            );
        });
    });

    c.bench_function("sort_by_price", |b| {
        b.iter(|| {
            black_box(
                SearchRequest::search("alpha")
                    .sort("price", true)
                    .limit(0, 10)
                    .execute(&spec)
                    .unwrap(),
            );
        });
    });
}

criterion_group!(benches, bench_indexing, bench_queries);
criterion_main!(benches);
