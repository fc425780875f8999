use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use telltale::model::{ModelType, SchemaBuilder};
use telltale::{ObservableList, create_observable, create_trackable};

struct BenchModel;

impl ModelType for BenchModel {
    const NAME: &'static str = "bench::Model";

    fn declare(schema: &mut SchemaBuilder) {
        schema.property("a").trackable().default_value(0i64);
        schema.property("b").trackable().default_value(0i64);
        schema.property("sum").depends_on(&["a", "b"]);
    }
}

fn bench_property_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_writes");

    group.bench_function("observable_set", |b| {
        let model = create_observable::<BenchModel>().expect("schema compiles");
        let mut value = 0i64;
        b.iter(|| {
            value += 1;
            model.set("a", black_box(value)).expect("write succeeds");
        });
    });

    group.bench_function("tracked_set", |b| {
        let model = create_trackable::<BenchModel>().expect("schema compiles");
        let mut value = 0i64;
        b.iter(|| {
            value += 1;
            model.set("a", black_box(value)).expect("write succeeds");
        });
    });

    for subscribers in [1usize, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("fanout", subscribers),
            &subscribers,
            |b, &subscribers| {
                let model = create_observable::<BenchModel>().expect("schema compiles");
                let subs: Vec<_> = (0..subscribers)
                    .map(|_| model.on_property_changed(|event| {
                        black_box(&event.property);
                    }))
                    .collect();
                let mut value = 0i64;
                b.iter(|| {
                    value += 1;
                    model.set("a", black_box(value)).expect("write succeeds");
                });
                drop(subs);
            },
        );
    }

    group.finish();
}

fn bench_list_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_mutations");

    for size in [100usize, 1000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("append", size), &size, |b, &size| {
            b.iter(|| {
                let list: ObservableList<i64> = ObservableList::new();
                for i in 0..size as i64 {
                    list.add(black_box(i));
                }
                black_box(list.len())
            });
        });

        group.bench_with_input(
            BenchmarkId::new("sorted_insert", size),
            &size,
            |b, &size| {
                b.iter(|| {
                    let list: ObservableList<i64> = ObservableList::new();
                    list.sort_by(|a, b| a.cmp(b), true);
                    for i in 0..size as i64 {
                        // Alternate ends to exercise the binary search.
                        let value = if i % 2 == 0 { i } else { -i };
                        list.add(black_box(value));
                    }
                    black_box(list.len())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_property_writes, bench_list_mutations);
criterion_main!(benches);
