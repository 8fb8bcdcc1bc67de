use criterion::{criterion_group, criterion_main, Criterion};
use wrpc_objectpool::ObjectPool;

fn fetch_and_give_back(c: &mut Criterion) {
    let pool: ObjectPool<Vec<u8>> = ObjectPool::new(256);
    c.bench_function("pool_fetch_give_back", |b| {
        b.iter(|| {
            let obj = pool.fetch(|v| v.clear());
            drop(obj);
        })
    });
}

fn fetch_fast_fail(c: &mut Criterion) {
    let pool: ObjectPool<Vec<u8>> = ObjectPool::new(256);
    c.bench_function("pool_fetch_fast_fail", |b| {
        b.iter(|| {
            let obj = pool.fetch_fast_fail(|v| v.clear());
            drop(obj);
        })
    });
}

criterion_group!(benches, fetch_and_give_back, fetch_fast_fail);
criterion_main!(benches);
