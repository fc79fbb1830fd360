use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jpq::{compile, ResultOptions};
use serde_json::{json, Value};

fn bookstore() -> Value {
    json!({"store": {"book": [
        {"category": "reference", "author": "Nigel Rees", "title": "Sayings of the Century", "price": 8.95},
        {"category": "fiction", "author": "Evelyn Waugh", "title": "Sword of Honour", "price": 12.99},
        {"category": "fiction", "author": "Herman Melville", "title": "Moby Dick", "isbn": "0-553-21311-3", "price": 8.99},
        {"category": "fiction", "author": "J. R. R. Tolkien", "title": "The Lord of the Rings", "isbn": "0-395-19395-8", "price": 22.99}
    ], "bicycle": {"color": "red", "price": 19.95}}})
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_simple_path", |b| {
        b.iter(|| compile(black_box("$.store.book[*].author")).expect("compiles"))
    });
    c.bench_function("compile_filter_with_function", |b| {
        b.iter(|| {
            compile(black_box(
                "$..book[?(@.price == max($..book[*].price))].title",
            ))
            .expect("compiles")
        })
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let doc = bookstore();

    let simple = compile("$.store.book[*].author").expect("compiles");
    c.bench_function("evaluate_simple_path", |b| {
        b.iter(|| simple.evaluate(black_box(&doc), ResultOptions::VALUE))
    });

    let filter = compile("$.store.book[?(@.price < 10)].title").expect("compiles");
    c.bench_function("evaluate_filter", |b| {
        b.iter(|| filter.evaluate(black_box(&doc), ResultOptions::VALUE))
    });

    let recursive = compile("$..price").expect("compiles");
    c.bench_function("evaluate_recursive_sorted_paths", |b| {
        b.iter(|| {
            recursive.evaluate(
                black_box(&doc),
                ResultOptions::SORT | ResultOptions::NODUPS | ResultOptions::PATH,
            )
        })
    });
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);
