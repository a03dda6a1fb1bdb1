use criterion::{criterion_group, criterion_main, Criterion};
use lfs_gc::{GcConfig, Geometry, Volume};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A volume with many dirty segments of mixed utilization.
fn dirty_volume(total_segs: u32) -> Volume {
    let volume = Volume::create(
        Geometry::new(6, 0, total_segs),
        GcConfig::default().max_victim_search(4096),
    );

    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..(total_segs / 4) {
        let ino = volume.create_file(64, false).expect("volume is large enough");
        let punched = rng.gen_range(8..56u64);

        for bidx in 0..punched {
            volume
                .overwrite_block(ino, bidx)
                .expect("volume is large enough");
        }
    }

    volume
}

fn victim_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("victim selection");

    for segs in [256u32, 1024] {
        group.bench_function(format!("greedy scan, {segs} segments"), |b| {
            b.iter_batched(
                || dirty_volume(segs),
                |volume| {
                    // n_gc = 0 frees exactly one section: one full scan plus
                    // one evacuation
                    volume.garbage_collect(0).expect("volume is consistent");
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, victim_selection);
criterion_main!(benches);
