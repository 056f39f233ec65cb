use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hessian2::{decode, encode, List, Map, Timestamp, Value};

/// A document shaped like typical RPC traffic: a typed bean holding
/// scalars, a repeated class name, a list, and a shared submap.
fn representative_doc() -> Value {
    let shared = Map::new();
    shared.insert("host", "10.0.0.1");
    shared.insert("port", 20880i64);

    let items = List::new();
    for i in 0..64i64 {
        let item = Map::with_class("com.example.Item");
        item.insert("id", i);
        item.insert("score", i as f64 + 0.5);
        item.insert("name", format!("item-{}", i));
        item.insert("endpoint", shared.clone());
        items.push(item);
    }

    let doc = Map::with_class("com.example.Page");
    doc.insert("items", items);
    doc.insert("total", 64i64);
    doc.insert("generated", Timestamp::from_millis(1_612_351_353_000));
    doc.insert("payload", vec![0u8; 8 * 1024]);
    Value::Map(doc)
}

fn bench_encode(c: &mut Criterion) {
    let doc = representative_doc();
    c.bench_function("encode_page", |b| b.iter(|| encode(black_box(&doc))));
}

fn bench_decode(c: &mut Criterion) {
    let bytes = encode(&representative_doc());
    c.bench_function("decode_page", |b| {
        b.iter(|| decode(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
