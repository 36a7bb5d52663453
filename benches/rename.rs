use camino::Utf8PathBuf;
use criterion::{Criterion, criterion_group, criterion_main};
use docflow::models::{ReplacementRule, RuleSet};
use docflow::services::{InvoiceMatcher, plan_renames, target_name};
use std::hint::black_box;

fn rules() -> RuleSet {
    let mut rules = RuleSet::new();
    for (old, new) in [
        ("January", "February"),
        ("2024", "2025"),
        ("Draft ", ""),
        ("Acme Ltd", "Globex Corporation"),
        ("_v1", "_v2"),
    ] {
        rules
            .add(ReplacementRule::new(old, new).expect("valid rule"))
            .expect("unique rule");
    }
    rules
}

fn sources(count: usize) -> Vec<Utf8PathBuf> {
    (0..count)
        .map(|i| Utf8PathBuf::from(format!("in/Draft Acme Ltd Report {i:04} January 2024_v1.docx")))
        .collect()
}

fn bench_target_name(c: &mut Criterion) {
    let rules = rules();
    c.bench_function("target_name", |b| {
        b.iter(|| target_name(black_box("Draft Acme Ltd Report January 2024_v1.docx"), &rules))
    });
}

fn bench_plan_renames(c: &mut Criterion) {
    let rules = rules();
    let sources = sources(1_000);
    c.bench_function("plan_renames_1000", |b| {
        b.iter(|| plan_renames(black_box(&sources), &rules))
    });
}

fn bench_pairing(c: &mut Criterion) {
    let matcher = InvoiceMatcher::default();
    let generated: Vec<Utf8PathBuf> = (0..500)
        .map(|i| Utf8PathBuf::from(format!("gen/INV-{i:04} - Letter.docx")))
        .collect();
    let invoices: Vec<Utf8PathBuf> = (0..500)
        .map(|i| Utf8PathBuf::from(format!("inv/INV-{i:04}.pdf")))
        .collect();
    c.bench_function("pair_500", |b| {
        b.iter(|| matcher.pair(black_box(&generated), black_box(&invoices)))
    });
}

criterion_group!(benches, bench_target_name, bench_plan_renames, bench_pairing);
criterion_main!(benches);
