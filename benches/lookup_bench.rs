use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hostmap::RangeTable;
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

/// Build a table of `rows` adjacent /24 ranges starting at 1.0.0.0
fn generate_table(rows: u32, bucket_size: usize) -> RangeTable {
    let mut tsv = String::new();
    for i in 0..rows {
        let base = (1u32 << 24) + (i << 8);
        let start = Ipv4Addr::from(base);
        let end = Ipv4Addr::from(base + 255);
        tsv.push_str(&format!("{start}\t{end}\t{}\tUS\tAS{i}-NET\n", 64512 + i % 1000));
    }
    RangeTable::from_reader(tsv.as_bytes(), bucket_size).unwrap()
}

fn benchmark_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_find");
    for rows in [10_000u32, 200_000] {
        let table = generate_table(rows, 1000);
        // Warm every bucket so the benchmark measures the search itself
        for i in (0..rows).step_by(1000) {
            let _ = table.find(IpAddr::V4(Ipv4Addr::from((1u32 << 24) + (i << 8) + 1)));
        }

        group.bench_with_input(BenchmarkId::from_parameter(rows), &table, |b, table| {
            let mut i = 0u32;
            b.iter(|| {
                i = (i + 7919) % rows;
                let ip = IpAddr::V4(Ipv4Addr::from((1u32 << 24) + (i << 8) + 10));
                black_box(table.find(black_box(ip)))
            })
        });
    }
    group.finish();
}

fn benchmark_cold_bucket(c: &mut Criterion) {
    c.bench_function("range_find_cold_bucket", |b| {
        b.iter_with_setup(
            || generate_table(5_000, 1000),
            |table| black_box(table.find(IpAddr::V4(Ipv4Addr::new(1, 0, 200, 10)))),
        )
    });
}

criterion_group!(benches, benchmark_find, benchmark_cold_bucket);
criterion_main!(benches);
