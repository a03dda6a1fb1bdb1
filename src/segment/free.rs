// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::geometry::{Geometry, SegNo};
use bitvec::vec::BitVec;

/// Free-segment bookkeeping.
///
/// A section counts as free only while every one of its segments is free;
/// the allocator hands out whole sections section-aligned.
pub struct FreeSegmapInfo {
    /// Set = segment is free
    free_segmap: BitVec,

    free_segments: u32,
}

impl FreeSegmapInfo {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        Self {
            free_segmap: BitVec::repeat(true, geometry.total_segs as usize),
            free_segments: geometry.total_segs,
        }
    }

    pub(crate) fn is_free(&self, segno: SegNo) -> bool {
        self.free_segmap
            .get(segno as usize)
            .map_or(false, |bit| *bit)
    }

    pub(crate) fn set_free(&mut self, segno: SegNo) {
        if !self.free_segmap.replace(segno as usize, true) {
            self.free_segments += 1;
        }
    }

    pub(crate) fn set_inuse(&mut self, segno: SegNo) {
        if self.free_segmap.replace(segno as usize, false) {
            self.free_segments -= 1;
        }
    }

    pub(crate) fn free_segments(&self) -> u32 {
        self.free_segments
    }

    /// Counts sections whose segments are all free.
    pub(crate) fn free_sections(&self, geometry: &Geometry) -> u32 {
        let segs_per_sec = geometry.segs_per_sec() as usize;

        self.free_segmap
            .chunks(segs_per_sec)
            .filter(|sec| sec.all())
            .count() as u32
    }

    /// Finds a free segment at the start of a fully free section.
    ///
    /// Scans from `hint` and wraps around once.
    pub(crate) fn find_free_section(&self, geometry: &Geometry, hint: SegNo) -> Option<SegNo> {
        let segs_per_sec = geometry.segs_per_sec();
        let total_secs = geometry.total_sections();
        let hint_sec = geometry.secno(hint) % total_secs;

        (0..total_secs)
            .map(|i| (hint_sec + i) % total_secs)
            .map(|secno| secno * segs_per_sec)
            .find(|&start| {
                (start..start + segs_per_sec).all(|segno| self.is_free(segno))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn section_free_counting() {
        let geo = Geometry::new(2, 1, 8);
        let mut free = FreeSegmapInfo::new(&geo);

        assert_eq!(8, free.free_segments());
        assert_eq!(4, free.free_sections(&geo));

        // one in-use segment poisons its whole section
        free.set_inuse(2);
        assert_eq!(7, free.free_segments());
        assert_eq!(3, free.free_sections(&geo));

        free.set_free(2);
        assert_eq!(4, free.free_sections(&geo));
    }

    #[test]
    fn find_wraps_and_skips_partial_sections() {
        let geo = Geometry::new(2, 1, 8);
        let mut free = FreeSegmapInfo::new(&geo);

        free.set_inuse(6);

        // hint inside the poisoned section wraps to the next free one
        assert_eq!(Some(0), free.find_free_section(&geo, 6));
        assert_eq!(Some(2), free.find_free_section(&geo, 2));

        for segno in 0..8 {
            free.set_inuse(segno);
        }
        assert_eq!(None, free.find_free_section(&geo, 0));
    }
}
