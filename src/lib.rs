// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment garbage collection core for log-structured flash storage.
//!
//! > This crate is intended as a building block for log-structured
//! > filesystems and flash translation layers; it models the reclamation
//! > subsystem, not a full filesystem.
//!
//! A volume's main area is split into fixed-size segments, grouped into
//! sections and filled strictly by appending. Overwrites and deletes only
//! flip per-block validity bits, leaving dirty segments that mix live and
//! dead blocks:
//!
//! [v0][ - ][v2][v3][ - ][ - ][v6][ - ]
//!
//! The garbage collector turns such segments back into free space. A
//! background worker picks victims by cost-benefit (old, sparse sections
//! first) whenever the device is idle, and merely queues their survivors
//! for the async writer. Under space pressure, foreground GC switches to a
//! greedy policy, inherits the background worker's pre-vetted victims and
//! copies survivors out synchronously; when even that cannot keep up, it
//! escalates to a checkpoint, which drains the writer and hands fully
//! evacuated segments back to the allocator.
//!
//! Every candidate block is revalidated right before it is moved: the
//! per-segment summary names the owning node, and a block is only copied
//! when both its validity bit and the owning node's current address agree.
//! A stale summary (rewritten node, relocated block) just skips the block.
//!
//! # Example usage
//!
//! ```
//! use lfs_gc::{GcConfig, GcStatus, Geometry, Volume};
//!
//! # fn main() -> lfs_gc::Result<()> {
//! // 16-block segments, one segment per section, 64 segments
//! let volume = Volume::create(Geometry::new(4, 0, 64), GcConfig::default());
//!
//! // write a file, then punch holes into its segment
//! let ino = volume.create_file(16, false)?;
//! for bidx in 0..8 {
//!     volume.overwrite_block(ino, bidx)?;
//! }
//!
//! // more writes age the dirty segment relative to the rest
//! let _other = volume.create_file(16, false)?;
//!
//! // reclaim: the survivors are queued for relocation
//! let status = volume.garbage_collect(1)?;
//! assert_eq!(GcStatus::Done, status);
//!
//! // the writer drain at checkpoint empties the victim for good
//! volume.write_checkpoint(false, false)?;
//! volume.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod config;
mod error;
mod gc;
mod geometry;
mod inode;
mod node;
mod page;
mod segment;
mod stats;
mod summary;
mod volume;

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, xxhash_rust::xxh3::Xxh3Builder>;

pub use {
    config::GcConfig,
    error::{Error, Result},
    gc::report::GcReport,
    gc::victim::{GcKind, VictimSelection},
    gc::GcStatus,
    geometry::{BlockAddr, Geometry, Ino, Nid, SecNo, SegNo},
    segment::dirty::DirtyType,
    segment::SegType,
    stats::{SitMetrics, StatRegistry},
    volume::Volume,
};

#[doc(hidden)]
pub use {
    node::{start_bidx_of_node, ADDRS_PER_BLOCK, ADDRS_PER_INODE, NIDS_PER_BLOCK},
    summary::{SumType, Summary, SummaryBlock, SUMMARY_SIZE},
};
