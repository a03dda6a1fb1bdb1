// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Segment number inside the main area
pub type SegNo = u32;

/// Section number (a section is `2^log_segs_per_sec` contiguous segments)
pub type SecNo = u32;

/// Address of a block on the device
pub type BlockAddr = u32;

/// Node ID; the node page of an inode shares its number
pub type Nid = u32;

/// Inode number
pub type Ino = u32;

/// Main-area layout of the volume.
///
/// Everything is a power of two; arithmetic on segment, section and block
/// identities is shift-based throughout.
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    /// log2 of blocks per segment
    pub log_blocks_per_seg: u32,

    /// log2 of segments per section
    pub log_segs_per_sec: u32,

    /// Total segments in the main area
    pub total_segs: u32,
}

impl Geometry {
    /// Creates a new geometry.
    ///
    /// # Panics
    ///
    /// Panics if `total_segs` is zero or not a multiple of the section size.
    #[must_use]
    pub fn new(log_blocks_per_seg: u32, log_segs_per_sec: u32, total_segs: u32) -> Self {
        assert!(total_segs > 0, "empty main area");
        assert!(
            total_segs % (1 << log_segs_per_sec) == 0,
            "main area not section-aligned"
        );

        Self {
            log_blocks_per_seg,
            log_segs_per_sec,
            total_segs,
        }
    }

    #[must_use]
    pub(crate) fn blocks_per_seg(&self) -> u32 {
        1 << self.log_blocks_per_seg
    }

    #[must_use]
    pub(crate) fn segs_per_sec(&self) -> u32 {
        1 << self.log_segs_per_sec
    }

    #[must_use]
    pub(crate) fn blocks_per_sec(&self) -> u32 {
        1 << (self.log_blocks_per_seg + self.log_segs_per_sec)
    }

    #[must_use]
    pub(crate) fn total_sections(&self) -> u32 {
        self.total_segs >> self.log_segs_per_sec
    }

    #[must_use]
    pub(crate) fn total_blocks(&self) -> u64 {
        u64::from(self.total_segs) << self.log_blocks_per_seg
    }

    /// Section number of a segment
    #[must_use]
    pub(crate) fn secno(&self, segno: SegNo) -> SecNo {
        segno >> self.log_segs_per_sec
    }

    /// First segment of the section containing `segno`
    #[must_use]
    pub(crate) fn sec_start_segno(&self, segno: SegNo) -> SegNo {
        (segno >> self.log_segs_per_sec) << self.log_segs_per_sec
    }

    /// Address of the first block of a segment
    #[must_use]
    pub(crate) fn start_block(&self, segno: SegNo) -> BlockAddr {
        segno << self.log_blocks_per_seg
    }

    /// Splits a block address into segment number and offset-in-segment
    #[must_use]
    pub(crate) fn block_position(&self, addr: BlockAddr) -> (SegNo, u32) {
        (
            addr >> self.log_blocks_per_seg,
            addr & (self.blocks_per_seg() - 1),
        )
    }
}
