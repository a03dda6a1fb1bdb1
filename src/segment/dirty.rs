// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    gc::victim::{GcKind, VictimSelection},
    geometry::{Geometry, SegNo},
    segment::SegType,
};
use bitvec::vec::BitVec;

/// Number of dirty-segment buckets
pub const NR_DIRTY: usize = 8;

/// Bucket of the dirty-segment list a segment can sit in.
///
/// A segment lives in at most one of the six type buckets, mirrored into
/// the `Dirty` union map; fully obsolete segments move to `Prefree` until
/// the next checkpoint frees them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum DirtyType {
    /// Dirty segments assigned as hot data logs
    HotData = 0,

    /// Dirty segments assigned as warm data logs
    WarmData = 1,

    /// Dirty segments assigned as cold data logs
    ColdData = 2,

    /// Dirty segments assigned as hot node logs
    HotNode = 3,

    /// Dirty segments assigned as warm node logs
    WarmNode = 4,

    /// Dirty segments assigned as cold node logs
    ColdNode = 5,

    /// Union across the six type buckets
    Dirty = 6,

    /// Entirely obsolete segments, waiting for checkpoint to free them
    Prefree = 7,
}

impl From<SegType> for DirtyType {
    fn from(value: SegType) -> Self {
        match value {
            SegType::HotData => Self::HotData,
            SegType::WarmData => Self::WarmData,
            SegType::ColdData => Self::ColdData,
            SegType::HotNode => Self::HotNode,
            SegType::WarmNode => Self::WarmNode,
            SegType::ColdNode => Self::ColdNode,
        }
    }
}

/// Dirty-segment bookkeeping: the per-type bitmaps, the union map, the
/// prefree map and the victim claim maps.
///
/// Owned by the volume behind the segment-list lock. The installed
/// [`VictimSelection`] rides along so it can be swapped under the same lock.
pub struct DirtySeglistInfo {
    /// One bitmap per [`DirtyType`] bucket
    pub dirty_segmap: [BitVec; NR_DIRTY],

    /// Set-bit count per bucket
    pub nr_dirty: [usize; NR_DIRTY],

    /// Segments tentatively claimed by a pending GC, per [`GcKind`]
    pub victim_segmap: [BitVec; 2],

    /// Installed victim-selection strategy
    pub selection: VictimSelection,
}

impl DirtySeglistInfo {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        let len = geometry.total_segs as usize;

        Self {
            dirty_segmap: std::array::from_fn(|_| BitVec::repeat(false, len)),
            nr_dirty: [0; NR_DIRTY],
            victim_segmap: std::array::from_fn(|_| BitVec::repeat(false, len)),
            selection: VictimSelection::Default,
        }
    }

    fn set(&mut self, segno: SegNo, t: DirtyType) {
        if !self.dirty_segmap[t as usize].replace(segno as usize, true) {
            self.nr_dirty[t as usize] += 1;
        }
    }

    fn clear(&mut self, segno: SegNo, t: DirtyType) {
        if self.dirty_segmap[t as usize].replace(segno as usize, false) {
            self.nr_dirty[t as usize] -= 1;
        }
    }

    /// Removes a segment from every bucket (including prefree).
    pub(crate) fn remove(&mut self, segno: SegNo) {
        for idx in 0..NR_DIRTY {
            if self.dirty_segmap[idx].replace(segno as usize, false) {
                self.nr_dirty[idx] -= 1;
            }
        }
    }

    /// Files a segment under its type bucket and the union map.
    pub(crate) fn insert_dirty(&mut self, segno: SegNo, t: DirtyType) {
        debug_assert!(!matches!(t, DirtyType::Dirty | DirtyType::Prefree));
        self.set(segno, t);
        self.set(segno, DirtyType::Dirty);
    }

    /// Files a fully obsolete segment under prefree only.
    pub(crate) fn insert_prefree(&mut self, segno: SegNo) {
        self.set(segno, DirtyType::Prefree);
    }

    pub(crate) fn is_dirty(&self, segno: SegNo, t: DirtyType) -> bool {
        self.dirty_segmap[t as usize]
            .get(segno as usize)
            .map_or(false, |bit| *bit)
    }

    pub(crate) fn nr_dirty(&self, t: DirtyType) -> usize {
        self.nr_dirty[t as usize]
    }

    /// Drains the prefree bucket, returning the segments to free.
    pub(crate) fn take_prefree(&mut self) -> Vec<SegNo> {
        let prefree = self.dirty_segmap[DirtyType::Prefree as usize]
            .iter_ones()
            .map(|segno| segno as SegNo)
            .collect::<Vec<_>>();

        for &segno in &prefree {
            self.clear(segno, DirtyType::Prefree);
        }

        prefree
    }

    pub(crate) fn is_victim(&self, segno: SegNo, kind: GcKind) -> bool {
        self.victim_segmap[kind as usize]
            .get(segno as usize)
            .map_or(false, |bit| *bit)
    }

    pub(crate) fn set_victim(&mut self, segno: SegNo, kind: GcKind) {
        self.victim_segmap[kind as usize].set(segno as usize, true);
    }

    pub(crate) fn clear_victim(&mut self, segno: SegNo, kind: GcKind) {
        self.victim_segmap[kind as usize].set(segno as usize, false);
    }

    /// Drops every foreground claim.
    ///
    /// Run at checkpoint: a foreground evacuation that did not finish has
    /// to return its victim to the pool, while background claims persist
    /// for the foreground fast path to inherit.
    pub(crate) fn clear_fg_victims(&mut self) {
        self.victim_segmap[GcKind::Foreground as usize].fill(false);
    }
}
