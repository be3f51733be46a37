//! 字段校验性能基准测试
//!
//! 覆盖规则链解析和同步规则链执行。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use field_validation::testing::ScriptedLookup;
use field_validation::{
    FieldContext, FieldState, FieldValidator, RemoteCheckManager, RuleChainParser, RuleRegistry,
    ValidateOptions, parse_chain,
};
use serde_json::{Value, json};
use std::hint::black_box;

const CHAINS: &[(&str, &str)] = &[
    ("single", "required"),
    ("text", "required|alpha_num|min:3|max:32"),
    ("email", "required|email|max:254"),
    ("membership", "required|in:red,green,blue,cyan,magenta,yellow"),
];

/// 规则链解析基准
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_chain");

    for (name, chain) in CHAINS {
        group.bench_with_input(BenchmarkId::new("uncached", name), chain, |b, chain| {
            b.iter(|| parse_chain(black_box(chain)))
        });
    }

    let parser = RuleChainParser::new();
    for (name, chain) in CHAINS {
        group.bench_with_input(BenchmarkId::new("cached", name), chain, |b, chain| {
            b.iter(|| parser.parse(black_box(chain)))
        });
    }

    group.finish();
}

/// 同步规则链执行基准（每次使用新的字段状态，绕过缓存）
fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_field");

    let validator = FieldValidator::new(RuleRegistry::with_builtins());
    let (mut remote, _receiver) = RemoteCheckManager::new(ScriptedLookup::new());
    let ctx = FieldContext::new("field", "field");
    let options = ValidateOptions::default();

    let cases: &[(&str, &str, Value)] = &[
        ("text_pass", "required|alpha_num|min:3|max:32", json!("alice2024")),
        ("text_short_circuit", "required|alpha_num|min:3|max:32", json!("a!")),
        ("email_pass", "required|email|max:254", json!("someone@example.com")),
        ("membership_pass", "required|in:red,green,blue,cyan,magenta,yellow", json!("cyan")),
    ];

    for (name, chain, value) in cases {
        let chain = parse_chain(chain).unwrap();
        group.bench_function(*name, |b| {
            b.iter(|| {
                let mut state = FieldState::new("field");
                validator.validate(
                    &mut state,
                    black_box(value.clone()),
                    &chain,
                    &ctx,
                    &options,
                    &mut remote,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_validate);
criterion_main!(benches);
