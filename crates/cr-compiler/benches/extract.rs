//! Extractor and merger throughput on synthetic lists.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cr_compiler::merger::{merge_sources, MergePolicy};
use cr_compiler::parser::parse_filter_list;

/// Mixed Adblock/hosts/Clash list with `n` rule lines.
fn synthetic_list(n: usize) -> String {
    let mut text = String::from("[Adblock Plus 2.0]\n! Title: synthetic\n");
    for i in 0..n {
        match i % 6 {
            0 => text.push_str(&format!("||ads{i}.example.com^\n")),
            1 => text.push_str(&format!("0.0.0.0 tracker{i}.example.net\n")),
            2 => text.push_str(&format!("DOMAIN-SUFFIX,cdn{i}.example.org\n")),
            3 => text.push_str(&format!("example{i}.com##.banner\n")),
            4 => text.push_str(&format!("@@||safe{i}.example.com^\n")),
            _ => text.push_str(&format!("/banner/ads/{i}/*$image\n")),
        }
    }
    text
}

fn bench_parse_100k_lines(c: &mut Criterion) {
    let text = synthetic_list(100_000);

    c.bench_function("parse_100k_lines", |b| {
        b.iter(|| {
            let rules = parse_filter_list(black_box(&text));
            black_box(rules.len());
        });
    });
}

fn bench_priority_chain_merge(c: &mut Criterion) {
    let first = parse_filter_list(&synthetic_list(50_000));
    let second = parse_filter_list(&synthetic_list(60_000));

    c.bench_function("priority_chain_merge_2x50k", |b| {
        b.iter(|| {
            let outcome = merge_sources(
                MergePolicy::PriorityChain,
                vec![("first".to_string(), first.clone()), ("second".to_string(), second.clone())],
            );
            black_box(outcome.stats.after);
        });
    });
}

criterion_group!(benches, bench_parse_100k_lines, bench_priority_chain_merge);
criterion_main!(benches);
