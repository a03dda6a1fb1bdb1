// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Point-in-time summary of a volume's reclamation state
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GcReport {
    /// Total segments in the main area
    pub total_segments: u32,

    /// Segments in the dirty union map
    pub dirty_segments: u32,

    /// Fully obsolete segments awaiting checkpoint
    pub prefree_segments: u32,

    /// Free segments
    pub free_segments: u32,

    /// Fully free sections
    pub free_sections: u32,

    /// Live user blocks
    pub valid_blocks: u64,

    /// Live blocks as percent of the main area
    pub utilization_pct: u8,

    /// Evacuations performed since mount
    pub gc_calls: u64,

    /// Background GC passes since mount
    pub bg_gc_runs: u64,

    /// Node segments evacuated
    pub node_segments: u64,

    /// Data segments evacuated
    pub data_segments: u64,

    /// Node blocks queued or written by evacuations
    pub node_blocks: u64,

    /// Data blocks queued or written by evacuations
    pub data_blocks: u64,
}

impl std::fmt::Display for GcReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Utilization: {}% ({} valid blocks)",
            self.utilization_pct, self.valid_blocks
        )?;
        writeln!(
            f,
            " - Dirty: {} Prefree: {} Free: {} ({})",
            self.dirty_segments, self.prefree_segments, self.free_segments, self.free_sections
        )?;
        writeln!(f, "GC calls: {} (BG: {})", self.gc_calls, self.bg_gc_runs)?;
        writeln!(
            f,
            " - data segments: {} node segments: {}",
            self.data_segments, self.node_segments
        )?;
        write!(
            f,
            "Try to move {} blocks (data: {}, node: {})",
            self.data_blocks + self.node_blocks,
            self.data_blocks,
            self.node_blocks
        )
    }
}
