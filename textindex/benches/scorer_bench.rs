use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use textindex::scorer::score_term;
use textindex::Scores;

fn bench_score_term(c: &mut Criterion) {
    let doc_lengths: HashMap<u32, u32> = (0..10_000u32).map(|d| (d, 50 + d % 400)).collect();
    let postings: Vec<(u32, u32)> = (0..10_000u32).step_by(3).map(|d| (d, 1 + d % 7)).collect();
    c.bench_function("score_term_3k_postings", |b| {
        b.iter(|| {
            let mut results = Scores::with_capacity(postings.len());
            score_term(&mut results, postings.iter().copied(), &doc_lengths, 1.7, 250.0);
            results
        })
    });
}

criterion_group!(benches, bench_score_term);
criterion_main!(benches);
