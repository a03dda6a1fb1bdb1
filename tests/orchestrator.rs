mod common;

use common::{punched_file, segnos_in, victims_of};
use lfs_gc::{DirtyType, GcConfig, GcKind, GcStatus, Geometry, Volume};
use test_log::test;

#[test]
fn zero_target_still_makes_forward_progress() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 64);

    punched_file(&volume, 16, 8)?;
    volume.create_file(16, false)?;

    // n_gc = 0 either returns None immediately or frees one section and
    // returns; it never spins
    let status = volume.garbage_collect(0)?;
    assert_eq!(GcStatus::Done, status);

    volume.close()
}

#[test]
fn freed_sections_leave_the_dirty_map_after_the_drain() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 64);

    for _ in 0..3 {
        punched_file(&volume, 16, 8)?;
    }
    volume.create_file(16, false)?;

    let dirty_before = segnos_in(&volume, DirtyType::Dirty);
    assert_eq!(3, dirty_before.len());

    assert_eq!(GcStatus::Done, volume.garbage_collect(1)?);

    // the queued survivors relocate during the drain; the victims drop out
    // of the dirty union map entirely
    volume.write_checkpoint(false, false)?;

    let dirty_after = segnos_in(&volume, DirtyType::Dirty);
    assert!(dirty_after.len() < dirty_before.len());

    volume.close()
}

#[test]
fn blocked_evacuation_checkpoints_and_the_claim_survives() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 64);

    punched_file(&volume, 16, 8)?;
    volume.create_file(16, false)?;

    let checkpoints_before = volume.checkpoint_count();

    // checkpoint pressure flips true on the third per-block check
    volume.arm_checkpoint_trigger(3);

    let status = volume.garbage_collect(1)?;
    assert_eq!(GcStatus::Blocked, status);

    // the orchestrator escalated to a checkpoint...
    assert_eq!(checkpoints_before + 1, volume.checkpoint_count());

    // ...and the background claim on the victim section survived it
    assert!(!victims_of(&volume, GcKind::Background).is_empty());

    volume.close()
}

#[test]
fn foreground_gc_inherits_the_blocked_victim_and_drains_it() -> lfs_gc::Result<()> {
    let volume = Volume::create(
        Geometry::new(4, 0, 64),
        GcConfig::default().reserved_sections(8).sleep_times(5, 10, 30),
    );

    punched_file(&volume, 16, 8)?;
    volume.create_file(16, false)?;

    // a background pass gets interrupted mid-victim
    volume.arm_checkpoint_trigger(3);
    assert_eq!(GcStatus::Blocked, volume.garbage_collect(1)?);
    assert!(!victims_of(&volume, GcKind::Background).is_empty());

    // fill the volume until free space hits the reserve; drain the write
    // backlog so the retry is not re-blocked immediately
    while !volume.has_not_enough_free_secs() {
        volume.create_file(16, false)?;
    }
    volume.write_checkpoint(false, false)?;
    while !volume.has_not_enough_free_secs() {
        volume.create_file(16, false)?;
    }
    assert!(!victims_of(&volume, GcKind::Background).is_empty());

    let moved_before = volume.report().data_blocks;

    // the foreground pass pops the surviving background claim and copies
    // the survivors out synchronously
    let status = volume.garbage_collect(1)?;
    assert_ne!(GcStatus::Blocked, status);
    assert!(volume.report().data_blocks >= moved_before + 8);
    assert!(victims_of(&volume, GcKind::Background).is_empty());

    volume.close()
}

#[test]
fn checkpoint_returns_unfinished_foreground_claims() -> lfs_gc::Result<()> {
    // a reserve this large keeps the orchestrator in foreground mode
    let volume = Volume::create(
        Geometry::new(4, 0, 64),
        GcConfig::default().reserved_sections(60).sleep_times(5, 10, 30),
    );

    punched_file(&volume, 16, 8)?;

    // the foreground evacuation blocks on its very first per-block check;
    // the escalation checkpoint returns the claim to the pool
    volume.arm_checkpoint_trigger(1);
    assert_eq!(GcStatus::Blocked, volume.garbage_collect(1)?);
    assert!(victims_of(&volume, GcKind::Foreground).is_empty());

    // with the claim returned, the retry re-selects the section and
    // drains it
    let status = volume.garbage_collect(1)?;
    assert_ne!(GcStatus::Blocked, status);
    assert!(volume.report().data_blocks >= 8);

    volume.close()
}
