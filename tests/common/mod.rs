use lfs_gc::{DirtyType, GcConfig, GcKind, Geometry, Ino, SegNo, Volume};

/// A small volume with fast worker sleeps for tests.
#[allow(unused)]
pub fn small_volume(log_blocks_per_seg: u32, log_segs_per_sec: u32, total_segs: u32) -> Volume {
    Volume::create(
        Geometry::new(log_blocks_per_seg, log_segs_per_sec, total_segs),
        GcConfig::default().sleep_times(5, 10, 30),
    )
}

/// Writes a file and invalidates `punched` of its blocks in place, leaving
/// one dirty data segment behind.
#[allow(unused)]
pub fn punched_file(volume: &Volume, blocks: u32, punched: u32) -> lfs_gc::Result<Ino> {
    let ino = volume.create_file(blocks, false)?;

    for bidx in 0..u64::from(punched) {
        volume.overwrite_block(ino, bidx)?;
    }
    Ok(ino)
}

/// Segments currently filed in the given dirty bucket.
#[allow(unused)]
pub fn segnos_in(volume: &Volume, t: DirtyType) -> Vec<SegNo> {
    (0..volume.report().total_segments)
        .filter(|&segno| volume.is_dirty(segno, t))
        .collect()
}

/// Segments claimed in the victim map of `kind`.
#[allow(unused)]
pub fn victims_of(volume: &Volume, kind: GcKind) -> Vec<SegNo> {
    (0..volume.report().total_segments)
        .filter(|&segno| volume.is_victim(segno, kind))
        .collect()
}
