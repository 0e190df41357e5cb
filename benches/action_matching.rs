use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grantscan::{action_grants, statement_grants, PolicyDocument, TargetAction};
use serde_json::json;

/// Build a policy with `statements` statements of ten concrete actions each,
/// none of which grant `iam:PassRole`
fn create_wide_policy(statements: usize) -> PolicyDocument {
    let statement: Vec<serde_json::Value> = (0..statements)
        .map(|i| {
            let actions: Vec<String> = (0..10).map(|j| format!("svc{}:Action{}", i, j)).collect();
            json!({"Effect": "Allow", "Action": actions, "Resource": "*"})
        })
        .collect();

    PolicyDocument::from_value(json!({"Version": "2012-10-17", "Statement": statement}))
        .expect("valid policy")
}

/// Benchmark single action comparisons
fn bench_action_grants(c: &mut Criterion) {
    let target = TargetAction::parse("iam:PassRole").unwrap();
    let actions = ["*", "iam:PassRole", "iam:*", "s3:GetObject", "iam:Get*"];

    let mut group = c.benchmark_group("action_grants");

    for action in actions {
        group.bench_with_input(BenchmarkId::from_parameter(action), &action, |b, action| {
            b.iter(|| black_box(action_grants(black_box(action), &target).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark a full miss over documents of growing size (worst case)
fn bench_statement_grants_miss(c: &mut Criterion) {
    let target = TargetAction::parse("iam:PassRole").unwrap();

    let mut group = c.benchmark_group("statement_grants_miss");

    for statements in [1, 10, 100] {
        let policy = create_wide_policy(statements);
        group.throughput(Throughput::Elements((statements * 10) as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(statements),
            &policy,
            |b, policy| {
                b.iter(|| black_box(statement_grants(policy, &target).unwrap()));
            },
        );
    }

    group.finish();
}

/// Benchmark parsing of URL-encoded documents as returned by the IAM API
fn bench_parse_encoded(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_encoded");

    for statements in [1, 10, 100] {
        let json = create_wide_policy(statements).to_json().unwrap();
        let encoded = urlencoding::encode(&json).into_owned();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(statements),
            &encoded,
            |b, encoded| {
                b.iter(|| black_box(PolicyDocument::from_encoded(encoded).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_action_grants,
    bench_statement_grants_miss,
    bench_parse_encoded
);
criterion_main!(benches);
