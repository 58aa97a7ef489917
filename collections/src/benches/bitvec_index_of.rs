use criterion::{criterion_group, Criterion};
use std::hint::black_box;
use tidepool_collections::BitVector;

fn bench_index_of(c: &mut Criterion) {
    for size in [1 << 10, 1 << 14, 1 << 18, 1 << 22] {
        // Worst case: the only set bit is the last one
        let mut bitvec = BitVector::zeroes(size).unwrap();
        bitvec.set(size - 1, true).unwrap();
        for value in [true, false] {
            let start = if value { 1 } else { size - 1 };
            c.bench_function(
                &format!("{}/size={size} value={value}", module_path!()),
                |b| {
                    b.iter(|| {
                        black_box(&bitvec)
                            .index_of(black_box(value), start, size - start)
                            .unwrap()
                    });
                },
            );
        }
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_index_of,
}
