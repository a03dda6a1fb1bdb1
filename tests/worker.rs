mod common;

use common::punched_file;
use std::time::{Duration, Instant};
use test_log::test;

#[test]
fn worker_lifecycle_is_idempotent() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 32);

    volume.start_gc_thread()?;
    // second start is a no-op
    volume.start_gc_thread()?;

    volume.stop_gc_thread();
    // stopping twice is fine as well
    volume.stop_gc_thread();

    volume.close()
}

#[test]
fn worker_reclaims_in_the_background() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 64);

    punched_file(&volume, 16, 8)?;
    volume.create_file(16, false)?;

    // drain the write backlog so the device looks idle to the worker
    volume.write_checkpoint(false, false)?;

    volume.start_gc_thread()?;

    // 5 ms minimum sleep; give it a generous budget before asserting
    let deadline = Instant::now() + Duration::from_secs(5);
    while volume.report().bg_gc_runs == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    volume.stop_gc_thread();

    let report = volume.report();
    assert!(report.bg_gc_runs >= 1, "worker never ran");
    assert!(report.data_blocks >= 8, "survivors were not queued");

    volume.close()
}

#[test]
fn close_stops_a_running_worker() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 32);

    volume.start_gc_thread()?;
    // close stops the worker, then runs the final checkpoint
    volume.close()?;

    assert!(volume.checkpoint_count() >= 1);
    Ok(())
}
