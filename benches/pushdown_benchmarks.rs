// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for sqlpush rule conversion and SQL compilation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sqlpush_ast::{DatabaseProduct, Dialect};
use sqlpush_planner::{
    AggregateCall, Convention, DefaultCostModel, FieldCollation, JoinType, LogicalNode,
    LogicalRef, NullDirection, Operator, RemoteTable, Rex, RowType, RuleSet,
};

fn rule_set(product: DatabaseProduct) -> RuleSet {
    RuleSet::new(Convention::new("jdbc", Dialect::of(product)))
}

fn table(name: &str, width: usize, rows: f64) -> LogicalRef {
    let fields = RowType::new((0..width).map(|i| format!("c{i}")));
    LogicalNode::scan(
        RemoteTable::new([name], fields)
            .with_row_count(rows)
            .with_unique_key(vec![0])
            .hosted_by("jdbc")
            .into_ref(),
    )
}

/// Left-deep chain of `depth` equi-joins, filtered, aggregated and sorted.
fn reporting_query(depth: usize) -> LogicalRef {
    let mut plan = table("fact", 4, 1_000_000.0);
    for i in 0..depth {
        let width = plan.row_type().len();
        plan = LogicalNode::join(
            plan,
            table(&format!("dim{i}"), 3, 1_000.0),
            Rex::eq(Rex::input(1), Rex::input(width)),
            JoinType::Inner,
        );
    }
    let filtered = LogicalNode::filter(
        plan,
        Rex::and(vec![
            Rex::call(Operator::Gt, vec![Rex::input(2), Rex::int(100)]),
            Rex::call(Operator::IsNotNull, vec![Rex::input(3)]),
        ]),
    );
    let grouped = LogicalNode::aggregate(
        filtered,
        vec![1],
        vec![],
        vec![
            AggregateCall::new("sum", vec![2], "total"),
            AggregateCall::count_star("n"),
        ],
    );
    LogicalNode::sort(
        grouped,
        vec![FieldCollation::desc(1).with_nulls(NullDirection::Last)],
        None,
        None,
    )
}

// ============================================================================
// Rule Conversion Benchmarks
// ============================================================================

fn bench_convert(c: &mut Criterion) {
    let rules = rule_set(DatabaseProduct::Postgres);
    let mut group = c.benchmark_group("convert");

    for depth in [1, 4, 16] {
        let plan = reporting_query(depth);
        group.bench_with_input(BenchmarkId::new("join_chain", depth), &plan, |b, plan| {
            b.iter(|| black_box(rules.convert(plan).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// SQL Compilation Benchmarks
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for product in [DatabaseProduct::Postgres, DatabaseProduct::MySql] {
        let rules = rule_set(product);
        let physical = rules.convert(&reporting_query(4)).unwrap().unwrap();
        group.bench_with_input(
            BenchmarkId::new("reporting_query", format!("{product:?}")),
            &physical,
            |b, physical| b.iter(|| black_box(physical.compile_to_sql().unwrap())),
        );
    }

    let rules = rule_set(DatabaseProduct::Postgres);
    let physical = rules.convert(&reporting_query(4)).unwrap().unwrap();
    let statement = physical.compile_to_sql().unwrap();
    let dialect = Dialect::of(DatabaseProduct::Postgres);
    group.bench_function("render", |b| b.iter(|| black_box(statement.render(&dialect))));

    group.finish();
}

// ============================================================================
// Cost Estimation Benchmarks
// ============================================================================

fn bench_cost(c: &mut Criterion) {
    let rules = rule_set(DatabaseProduct::Ansi);
    let physical = rules.convert(&reporting_query(16)).unwrap().unwrap();
    let model = DefaultCostModel;

    let mut group = c.benchmark_group("cost");
    group.bench_function("row_count", |b| {
        b.iter(|| black_box(physical.estimated_row_count()))
    });
    group.bench_function("self_cost", |b| b.iter(|| black_box(physical.self_cost(&model))));
    group.finish();
}

criterion_group!(convert_benches, bench_convert);

criterion_group!(compile_benches, bench_compile);

criterion_group!(cost_benches, bench_cost);

criterion_main!(convert_benches, compile_benches, cost_benches);
