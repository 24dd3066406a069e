use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dirpp::context::VariableContext;
use dirpp::expr::{evaluate, ExpressionTree, Lookup};
use dirpp::{Config, MemoryFs, Preprocessor, Value};

const EXPRS: &[(&str, &str)] = &[
    ("arith", "1 + 2 * 3 - (4 / 2) % 3"),
    ("compare", "VERSION >= 3 && NAME == \"release\" || !DEBUG"),
    ("builtin", "strlen(str2json(NAME)) + abs(-7)"),
];

fn context() -> VariableContext {
    let mut ctx = VariableContext::new();
    ctx.set_global("VERSION", Value::Int(4)).unwrap();
    ctx.set_global("NAME", Value::Str("release".into())).unwrap();
    ctx.set_global("DEBUG", Value::Bool(false)).unwrap();
    ctx
}

fn bench_expr(c: &mut Criterion) {
    let mut g = c.benchmark_group("expr");
    for (name, src) in EXPRS {
        let ctx = context();
        g.bench_function(format!("parse_{name}"), |b| {
            b.iter(|| ExpressionTree::parse(black_box(src), &ctx))
        });

        let mut ctx = context();
        let tree = ExpressionTree::parse(src, &ctx).unwrap();
        g.bench_function(format!("eval_{name}"), |b| {
            b.iter(|| evaluate(black_box(&tree), &mut ctx, Lookup::Enforced))
        });
    }
    g.finish();
}

fn make_source(repeats: usize) -> String {
    let chunk = "\
//#define i 0
//#while i < 10
value /*$i * 2$*/ of /*$NAME$*/
//#define i i + 1
//#end
//#if i == 10
done
//#endif
";
    format!("//#define NAME \"bench\"\n{}", chunk.repeat(repeats))
}

fn bench_file(c: &mut Criterion) {
    let pp = Preprocessor::with_fs(Config::default(), Rc::new(MemoryFs::new()));
    let small = make_source(10);
    let large = make_source(200);

    let mut g = c.benchmark_group("process");
    g.bench_function("small", |b| b.iter(|| pp.process_str("bench.txt", black_box(&small))));
    g.bench_function("large", |b| b.iter(|| pp.process_str("bench.txt", black_box(&large))));
    g.finish();
}

criterion_group!(benches, bench_expr, bench_file);
criterion_main!(benches);
