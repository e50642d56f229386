use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use trysql::{Dialect, Session, Value};

/// SELECT col0, col1, ... FROM t WHERE (col0 = #{col0} AND col1 = #{col1} ...)
fn build_select(session: &mut Session<'_, ()>, n: usize) {
    session.select((0..n).map(|i| format!("col{i}"))).from(["t"]);
    for i in 0..n {
        session.where_(&format!("col{i} = #{{col{i}}}"), (i as i64,));
    }
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("session/render");

    for dialect in [Dialect::MySql, Dialect::Postgres] {
        for n in [1, 10, 100] {
            let mut session = Session::new(&(), dialect);
            build_select(&mut session, n);
            group.bench_with_input(
                BenchmarkId::new(dialect.to_string(), n),
                &session,
                |b, session| b.iter(|| black_box(session.render())),
            );
        }
    }

    group.finish();
}

fn bench_build_and_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("session/build_and_render");

    for n in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut session = Session::new(&(), Dialect::Postgres);
                build_select(&mut session, n);
                black_box(session.render())
            });
        });
    }

    group.finish();
}

fn bench_where_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("session/where_in");

    for n in [5, 50, 500] {
        let values: Vec<Value> = (0..n).map(Value::from).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                let mut session = Session::new(&(), Dialect::MySql);
                session
                    .select(["*"])
                    .from(["t"])
                    .where_in("id", values.clone());
                black_box(session.render())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_render, bench_build_and_render, bench_where_in);
criterion_main!(benches);
