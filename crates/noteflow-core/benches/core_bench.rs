use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use noteflow_core::event_bus::{EventBus, Listener, NoteCreated, WildcardListener};
use noteflow_core::EventBusConfig;

fn payload(i: usize) -> NoteCreated {
    NoteCreated {
        note_id: format!("n{}", i),
        folder_id: None,
        title: "Benchmark".to_string(),
        timestamp: 1000,
    }
}

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    for listeners in [0usize, 1, 10, 50] {
        let bus = EventBus::new();
        let handles: Vec<Listener<NoteCreated>> = (0..listeners)
            .map(|_| Listener::new(|e: &NoteCreated| {
                black_box(&e.note_id);
                Ok(())
            }))
            .collect();
        for listener in &handles {
            bus.on(listener);
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(listeners),
            &listeners,
            |b, _| {
                let mut i = 0;
                b.iter(|| {
                    i += 1;
                    bus.emit(payload(i));
                })
            },
        );
    }
    group.finish();
}

fn bench_emit_without_history(c: &mut Criterion) {
    let mut config = EventBusConfig::default();
    config.history.enabled = false;
    config.performance.track_emit_time = false;
    let bus = EventBus::with_config(config);
    bus.on_any(&WildcardListener::new(|name, _| {
        black_box(name);
        Ok(())
    }));

    c.bench_function("emit_wildcard_no_history", |b| {
        let mut i = 0;
        b.iter(|| {
            i += 1;
            bus.emit(payload(i));
        })
    });
}

fn bench_history_snapshot(c: &mut Criterion) {
    let bus = EventBus::new();
    for i in 0..bus.config().history.limit {
        bus.emit(payload(i));
    }
    c.bench_function("history_snapshot_full", |b| {
        b.iter(|| black_box(bus.history(None)))
    });
}

criterion_group!(
    benches,
    bench_emit,
    bench_emit_without_history,
    bench_history_snapshot
);
criterion_main!(benches);
