// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod curseg;
pub mod dirty;
pub mod free;
pub mod sit;

use crate::summary::SumType;

/// Number of open-for-append segments (one per hot/warm/cold × data/node)
pub const NR_CURSEG: usize = 6;

/// Temperature-and-kind class of a segment.
///
/// The discriminants index the curseg array.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum SegType {
    /// Directory data and other quickly-rewritten data
    HotData = 0,

    /// Ordinary file data
    WarmData = 1,

    /// Data relocated by GC or marked cold
    ColdData = 2,

    /// Direct dnodes of directories
    HotNode = 3,

    /// Direct dnodes of regular files
    WarmNode = 4,

    /// Indirect nodes and GC-relocated nodes
    ColdNode = 5,
}

impl SegType {
    pub(crate) const ALL: [Self; NR_CURSEG] = [
        Self::HotData,
        Self::WarmData,
        Self::ColdData,
        Self::HotNode,
        Self::WarmNode,
        Self::ColdNode,
    ];

    #[must_use]
    pub(crate) fn is_node(self) -> bool {
        matches!(self, Self::HotNode | Self::WarmNode | Self::ColdNode)
    }

    #[must_use]
    pub(crate) fn sum_type(self) -> SumType {
        if self.is_node() {
            SumType::Node
        } else {
            SumType::Data
        }
    }
}
