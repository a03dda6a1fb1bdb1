// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    error::{Error, Result},
    geometry::{Geometry, SegNo},
    segment::SegType,
};
use bitvec::vec::BitVec;

/// Per-segment info: validity bitmap, valid counts and modification time.
#[derive(Clone, Debug)]
pub struct SegEntry {
    /// Temperature-and-kind class this segment was last opened as
    pub seg_type: SegType,

    /// One bit per block offset; set = the block holds live data
    pub cur_valid_map: BitVec,

    /// Number of set bits in `cur_valid_map`
    pub valid_blocks: u32,

    /// Valid-block count as of the last checkpoint; the slack-space-reuse
    /// cost function reads this, not the live count
    pub ckpt_valid_blocks: u32,

    /// Last-modification timestamp, user-clock-derived
    pub mtime: u64,
}

impl SegEntry {
    fn new(blocks_per_seg: usize) -> Self {
        Self {
            seg_type: SegType::WarmData,
            cur_valid_map: BitVec::repeat(false, blocks_per_seg),
            valid_blocks: 0,
            ckpt_valid_blocks: 0,
            mtime: 0,
        }
    }
}

/// Segment-info table.
///
/// Owned by the volume behind the sentry lock; also carries the global
/// mtime bounds and the selector's scan resume points, which share that
/// lock's protection.
pub struct SitInfo {
    entries: Vec<SegEntry>,

    /// Oldest mtime ever observed; widened, never reset
    pub min_mtime: u64,

    /// Youngest mtime ever observed
    pub max_mtime: u64,

    /// Scan resume point per GC mode (greedy, cost-benefit)
    pub last_victim: [SegNo; 2],
}

impl SitInfo {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        let blocks_per_seg = geometry.blocks_per_seg() as usize;

        Self {
            entries: (0..geometry.total_segs)
                .map(|_| SegEntry::new(blocks_per_seg))
                .collect(),
            min_mtime: u64::MAX,
            max_mtime: 0,
            last_victim: [0, 0],
        }
    }

    pub(crate) fn entry(&self, segno: SegNo) -> Result<&SegEntry> {
        self.entries
            .get(segno as usize)
            .ok_or(Error::SegmentOutOfRange(segno))
    }

    pub(crate) fn entry_mut(&mut self, segno: SegNo) -> Result<&mut SegEntry> {
        self.entries
            .get_mut(segno as usize)
            .ok_or(Error::SegmentOutOfRange(segno))
    }

    /// Valid-block count of a segment, or of its whole section when
    /// `log_ofs_unit` is the section shift.
    pub(crate) fn valid_blocks(&self, geometry: &Geometry, segno: SegNo, log_ofs_unit: u32) -> u32 {
        if log_ofs_unit > 0 {
            let start = geometry.sec_start_segno(segno);

            (start..start + geometry.segs_per_sec())
                .filter_map(|s| self.entries.get(s as usize))
                .map(|e| e.valid_blocks)
                .sum()
        } else {
            self.entries
                .get(segno as usize)
                .map_or(0, |e| e.valid_blocks)
        }
    }

    /// Widens the global mtime bounds to cover an observation.
    ///
    /// Tolerates wall-clock regressions: the bounds only ever grow apart.
    pub(crate) fn observe_mtime(&mut self, mtime: u64) {
        if mtime < self.min_mtime {
            self.min_mtime = mtime;
        }
        if mtime > self.max_mtime {
            self.max_mtime = mtime;
        }
    }

    /// Marks a block live and stamps the segment mtime.
    pub(crate) fn set_valid(&mut self, segno: SegNo, off: u32, mtime: u64) -> Result<()> {
        let entry = self.entry_mut(segno)?;

        if !entry.cur_valid_map.replace(off as usize, true) {
            entry.valid_blocks += 1;
        }
        entry.mtime = mtime;

        Ok(())
    }

    /// Marks a block dead and stamps the segment mtime.
    pub(crate) fn clear_valid(&mut self, segno: SegNo, off: u32, mtime: u64) -> Result<()> {
        let entry = self.entry_mut(segno)?;

        if entry.cur_valid_map.replace(off as usize, false) {
            entry.valid_blocks -= 1;
        }
        entry.mtime = mtime;

        Ok(())
    }

    /// Snapshots the live counts into the checkpoint counts.
    pub(crate) fn snapshot_checkpoint(&mut self) {
        for entry in &mut self.entries {
            entry.ckpt_valid_blocks = entry.valid_blocks;
        }
    }

    pub(crate) fn is_valid(&self, segno: SegNo, off: u32) -> Result<bool> {
        Ok(self
            .entry(segno)?
            .cur_valid_map
            .get(off as usize)
            .map_or(false, |bit| *bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sit() -> (Geometry, SitInfo) {
        let geo = Geometry::new(2, 1, 4);
        let sit = SitInfo::new(&geo);
        (geo, sit)
    }

    #[test]
    fn valid_map_tracks_counts() {
        let (_geo, mut sit) = sit();

        sit.set_valid(1, 0, 10).expect("in range");
        sit.set_valid(1, 3, 11).expect("in range");
        sit.set_valid(1, 3, 12).expect("in range");

        let entry = sit.entry(1).expect("in range");
        assert_eq!(2, entry.valid_blocks);
        assert_eq!(12, entry.mtime);

        sit.clear_valid(1, 0, 13).expect("in range");
        assert_eq!(1, sit.entry(1).expect("in range").valid_blocks);

        assert!(sit.is_valid(1, 3).expect("in range"));
        assert!(!sit.is_valid(1, 0).expect("in range"));
    }

    #[test]
    fn section_granular_valid_count() {
        let (geo, mut sit) = sit();

        // section 0 = segments {0, 1}
        sit.set_valid(0, 0, 1).expect("in range");
        sit.set_valid(0, 1, 1).expect("in range");
        sit.set_valid(1, 2, 1).expect("in range");

        assert_eq!(2, sit.valid_blocks(&geo, 0, 0));
        assert_eq!(3, sit.valid_blocks(&geo, 0, geo.log_segs_per_sec));
        assert_eq!(3, sit.valid_blocks(&geo, 1, geo.log_segs_per_sec));
    }

    #[test]
    fn mtime_bounds_only_widen() {
        let (_geo, mut sit) = sit();

        sit.observe_mtime(50);
        assert_eq!((50, 50), (sit.min_mtime, sit.max_mtime));

        sit.observe_mtime(80);
        sit.observe_mtime(20);
        assert_eq!((20, 80), (sit.min_mtime, sit.max_mtime));

        // regression inside the window changes nothing
        sit.observe_mtime(40);
        assert_eq!((20, 80), (sit.min_mtime, sit.max_mtime));
    }
}
