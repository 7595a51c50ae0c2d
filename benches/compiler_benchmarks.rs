//! End-to-end parse and compile benchmarks.
//!
//! ```bash
//! cargo bench
//! cargo bench parse
//! cargo bench compile
//! ```

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use eql_compiler::compiler::{CompileOptions, compile_to_ir};
use eql_compiler::parse;
use eql_compiler::schema::{PtrCardinality, QualName, Schema, SchemaBuilder};

fn bench_schema() -> Schema {
    let mut b = SchemaBuilder::with_std();
    let str_ty = b.get_type("std", "str");
    let int64 = b.get_type("std", "int64");
    let user = b.add_object_type(QualName::new("default", "User"), &[]);
    b.add_property(user, QualName::new("default", "name"), str_ty);
    b.add_property(user, QualName::new("default", "age"), int64);
    b.add_link(
        user,
        QualName::new("default", "friends"),
        user,
        PtrCardinality::ManyToMany,
    );
    b.build()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let queries = [
        ("constant", "SELECT 42"),
        ("arithmetic", "SELECT 1 + 2 * 3 - 4 / 5"),
        ("path", "SELECT User.friends.name"),
        (
            "shape",
            "SELECT User { name, age, friends: { name } FILTER .age > 20 LIMIT 10 }",
        ),
        (
            "full",
            "WITH U := User SELECT U { name } FILTER U.age > 30 ORDER BY U.name LIMIT 100",
        ),
    ];

    for (name, query) in queries {
        group.throughput(Throughput::Elements(1));
        group.bench_function(name, |b| {
            b.iter(|| {
                let result = parse(black_box(query));
                black_box(result.ast).is_some()
            })
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let schema = bench_schema();
    let options = CompileOptions::new();

    let queries = [
        ("constant_fold", "SELECT 40 + 2"),
        ("path_interning", "SELECT (User.name, User.name)"),
        ("shape", "SELECT User { name, friends: { name } }"),
        (
            "clauses",
            "SELECT User FILTER User.age > 30 ORDER BY User.name LIMIT 10",
        ),
    ];

    for (name, query) in queries {
        group.throughput(Throughput::Elements(1));
        group.bench_function(name, |b| {
            b.iter(|| {
                compile_to_ir(black_box(query), &schema, &options)
                    .expect("benchmark query compiles")
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile);
criterion_main!(benches);
