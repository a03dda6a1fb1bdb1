mod common;

use common::{punched_file, segnos_in, victims_of};
use lfs_gc::{DirtyType, GcKind, GcStatus};
use test_log::test;

#[test]
fn gc_on_a_clean_volume_finds_nothing() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 32);

    assert_eq!(GcStatus::None, volume.garbage_collect(1)?);
    assert_eq!(GcStatus::None, volume.garbage_collect(0)?);

    volume.close()
}

#[test]
fn background_claim_covers_the_whole_section() -> lfs_gc::Result<()> {
    // two segments per section
    let volume = common::small_volume(4, 1, 32);

    punched_file(&volume, 32, 4)?;
    // age the punched section against fresh writes
    volume.create_file(32, false)?;

    assert_eq!(GcStatus::Done, volume.garbage_collect(0)?);

    let victims = victims_of(&volume, GcKind::Background);
    assert!(!victims.is_empty());
    assert_eq!(0, victims.len() % 2, "claims must be whole sections");

    for pair in victims.chunks(2) {
        assert_eq!(pair[0] % 2, 0, "claims must be section-aligned");
        assert_eq!(pair[0] + 1, pair[1]);
    }

    volume.close()
}

#[test]
fn background_gc_leaves_young_sections_alone() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 32);

    // the only dirty segment is also the youngest thing on the volume, so
    // its cost-benefit age is zero and background GC refuses it
    punched_file(&volume, 16, 4)?;

    assert_eq!(GcStatus::None, volume.garbage_collect(1)?);
    assert_eq!(1, segnos_in(&volume, DirtyType::Dirty).len());

    volume.close()
}

#[test]
fn victim_claims_are_dropped_when_the_segment_is_freed() -> lfs_gc::Result<()> {
    let volume = common::small_volume(4, 0, 64);

    punched_file(&volume, 16, 8)?;
    volume.create_file(16, false)?;

    assert_eq!(GcStatus::Done, volume.garbage_collect(0)?);
    assert!(!victims_of(&volume, GcKind::Background).is_empty());

    // the drain relocates the queued survivors, the checkpoint frees the
    // victim and its claim with it
    volume.write_checkpoint(false, false)?;
    assert!(victims_of(&volume, GcKind::Background).is_empty());
    assert!(victims_of(&volume, GcKind::Foreground).is_empty());

    volume.close()
}
