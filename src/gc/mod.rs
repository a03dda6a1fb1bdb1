// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod pin;
pub mod report;
pub mod victim;
pub mod worker;

use crate::{
    geometry::{BlockAddr, SegNo},
    inode::{DataPage, Inode},
    node::{ofs_of_node, start_bidx_of_node, NodeInfo},
    summary::{SumType, Summary, SummaryBlock},
    volume::Volume,
};
use pin::InodePinSet;
use std::sync::Arc;
use victim::{GcKind, TargetType};

/// Outcome of a GC pass or a single segment evacuation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GcStatus {
    /// The selector returned no victim; nothing worth reclaiming
    None,

    /// Evacuation completed; blocks may have been queued or copied
    Done,

    /// Checkpoint pressure was detected mid-evacuation; the caller has to
    /// drive a checkpoint before retrying
    Blocked,
}

/// Per-block verdict during an evacuation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BlockCheck {
    /// Both the validity bit and (for data) the parent node agree
    Live,

    /// Invalid, rewritten or relocated; leave it for the next pass
    Skip,
}

impl Volume {
    /// Reads a block's validity bit under the sentry lock.
    pub(crate) fn check_valid_map(&self, segno: SegNo, off: u32) -> crate::Result<BlockCheck> {
        let sit = self.sit.lock().expect("lock is poisoned");

        if sit.is_valid(segno, off)? {
            Ok(BlockCheck::Live)
        } else {
            Ok(BlockCheck::Skip)
        }
    }

    /// Compares the node address in a summary with the NAT and the parent
    /// dnode slot.
    ///
    /// Both the version and the stored block address have to match;
    /// anything else means the block was rewritten behind the summary and
    /// must be skipped. On success the node info and the logical node
    /// offset come back so the caller can compute the file block index.
    fn check_dnode(&self, sum: &Summary, blkaddr: BlockAddr) -> Option<(NodeInfo, u32)> {
        let node_page = self.nodes.get_node_page(sum.nid)?;
        let dni = self.nodes.get_node_info(sum.nid)?;

        if sum.version != dni.version {
            return None;
        }

        let nofs = ofs_of_node(&node_page);
        let source_blkaddr = node_page.datablock_addr(u32::from(sum.ofs_in_node));

        if source_blkaddr != Some(blkaddr) {
            return None;
        }
        Some((dni, nofs))
    }

    /// Evacuates a node segment.
    ///
    /// Node pages carry their address through the NAT, so dirtying them is
    /// enough: the normal writer relocates them into a current segment and
    /// updates the NAT. Two passes — read-ahead first, then dirty.
    fn gc_node_segment(
        &self,
        sum: &SummaryBlock,
        segno: SegNo,
        gc_kind: GcKind,
    ) -> crate::Result<GcStatus> {
        let mut initial = true;

        loop {
            for (off, entry) in sum.entries.iter().enumerate() {
                // Free segments must be able to take all dirty node pages
                // before the next checkpoint.
                if self.should_do_checkpoint() {
                    self.freeze_operations();
                    return Ok(GcStatus::Blocked);
                }

                if self.check_valid_map(segno, off as u32)? == BlockCheck::Skip {
                    continue;
                }

                if initial {
                    self.nodes.ra_node_page(entry.nid);
                    continue;
                }

                let Some(node_page) = self.nodes.get_node_page(entry.nid) else {
                    continue;
                };

                if !node_page.flags.is_writeback() {
                    self.nodes.mark_dirty(&node_page);
                }
                self.stat.inc_node_blocks(1);
            }

            if initial {
                initial = false;
            } else {
                break;
            }
        }

        if gc_kind == GcKind::Foreground {
            self.sync_node_pages()?;
        }
        Ok(GcStatus::Done)
    }

    /// Relocates one data page.
    ///
    /// Background GC only dirties the page and flags it cold, leaving the
    /// move to the async writer; foreground GC writes it out on the spot
    /// under the data-write lock.
    fn move_data_page(&self, inode: &Inode, page: &Arc<DataPage>, gc_kind: GcKind) {
        if !page.is_mapped() || page.ino != inode.ino {
            return;
        }
        if page.flags.is_writeback() {
            return;
        }

        if gc_kind == GcKind::Background {
            self.inodes.mark_dirty(inode, page);
            page.set_cold(true);
        } else {
            let _write = self.data_write_lock.lock().expect("lock is poisoned");

            self.inodes.clear_dirty(inode, page);
            page.set_cold(true);

            if let Err(e) = self.do_write_data_page(inode, page) {
                log::warn!("failed to relocate data page {}:{}: {e}", page.ino, page.index);
            }
            page.set_cold(false);
        }
    }

    /// Evacuates a data segment.
    ///
    /// Four passes over the summary entries: parent-node read-ahead, then
    /// validation plus inode read-ahead, then inode pinning with a cache
    /// touch of the data page, and finally the actual moves. Each pass
    /// warms one more indirection level, and the pins taken in pass three
    /// keep the inodes alive for pass four.
    fn gc_data_segment(
        &self,
        sum: &SummaryBlock,
        pins: &mut InodePinSet,
        segno: SegNo,
        gc_kind: GcKind,
    ) -> crate::Result<GcStatus> {
        let start_addr = self.geometry.start_block(segno);
        let mut status = GcStatus::Done;

        'phases: for phase in 0..4u8 {
            for (off, entry) in sum.entries.iter().enumerate() {
                if self.should_do_checkpoint() {
                    self.freeze_operations();
                    status = GcStatus::Blocked;
                    break 'phases;
                }

                if self.check_valid_map(segno, off as u32)? == BlockCheck::Skip {
                    continue;
                }

                if phase == 0 {
                    self.nodes.ra_node_page(entry.nid);
                    continue;
                }

                let Some((dni, nofs)) = self.check_dnode(entry, start_addr + off as u32) else {
                    continue;
                };

                if phase == 1 {
                    self.nodes.ra_node_page(dni.ino);
                    continue;
                }

                let bidx = start_bidx_of_node(nofs) + u64::from(entry.ofs_in_node);

                if phase == 2 {
                    let Some(inode) = self.inodes.iget_nowait(dni.ino) else {
                        continue;
                    };

                    if inode.find_data_page(bidx).is_none() {
                        continue;
                    }
                    pins.add(inode);
                } else if let Some(inode) = pins.find(dni.ino) {
                    let Some(page) = inode.get_lock_data_page(bidx) else {
                        continue;
                    };

                    log::trace!("moving block {bidx} of inode {} (node {})", dni.ino, dni.nid);
                    self.move_data_page(&inode, &page, gc_kind);
                    self.stat.inc_data_blocks(1);
                }
            }
        }

        Ok(status)
    }

    /// Evacuates one segment, dispatching on its summary footer.
    fn do_garbage_collect(
        &self,
        segno: SegNo,
        pins: &mut InodePinSet,
        gc_kind: GcKind,
    ) -> crate::Result<GcStatus> {
        let sum = self.ssa.read_block(segno)?;

        log::trace!("evacuating segment {segno} ({:?}, {gc_kind:?})", sum.sum_type);

        let status = match sum.sum_type {
            SumType::Node => self.gc_node_segment(&sum, segno, gc_kind)?,
            SumType::Data => self.gc_data_segment(&sum, pins, segno, gc_kind)?,
        };

        self.stat.inc_segments(sum.sum_type);
        self.stat.inc_call_count();

        Ok(status)
    }

    /// Picks a victim under the sentry and segment-list locks.
    pub(crate) fn select_victim(&self, gc_kind: GcKind, target: TargetType) -> Option<SegNo> {
        let mut sit = self.sit.lock().expect("lock is poisoned");
        let mut dirty = self.dirty.lock().expect("lock is poisoned");

        victim::get_victim(
            &self.geometry,
            &self.config,
            &mut sit,
            &mut dirty,
            &self.curseg_segnos,
            gc_kind,
            target,
        )
    }

    /// One garbage-collection pass with the GC mutex held.
    ///
    /// Frees sections until the free count has grown by more than `n_gc`,
    /// escalating from background to foreground mode under space pressure
    /// and to a checkpoint when an evacuation reports `Blocked`.
    pub(crate) fn run_gc(&self, n_gc: u32) -> crate::Result<GcStatus> {
        let mut pins = InodePinSet::default();
        let mut gc_kind = GcKind::Background;

        let result = loop {
            let mut status = GcStatus::None;
            let mut nfree: u32 = 0;

            let old_free = if self.has_not_enough_free_secs() {
                self.reserved_sections()
            } else {
                self.free_sections()
            };

            'collect: while self.is_active() {
                if self.has_not_enough_free_secs() {
                    gc_kind = GcKind::Foreground;
                }

                let cur_free = self.free_sections() + nfree;

                // got free space
                if i64::from(cur_free) - i64::from(old_free) > i64::from(n_gc) {
                    break;
                }

                let Some(segno) = self.select_victim(gc_kind, TargetType::NoCheck) else {
                    break;
                };

                for i in 0..self.geometry.segs_per_sec() {
                    // an unclean evacuation leaves the victim on the dirty
                    // list; the checkpoint below returns the claim
                    status = self.do_garbage_collect(segno + i, &mut pins, gc_kind)?;

                    if status != GcStatus::Done {
                        break 'collect;
                    }
                    nfree += 1;
                }
            }

            if self.has_not_enough_free_secs() || status == GcStatus::Blocked {
                self.write_checkpoint(status == GcStatus::Blocked, false)?;

                if nfree > 0 {
                    continue;
                }
            }

            break status;
        };

        pins.release();
        debug_assert!(pins.is_empty());

        Ok(result)
    }

    /// Synchronous GC entry point.
    ///
    /// Blocks until the GC mutex is available, then tries to free more
    /// than `n_gc` sections.
    ///
    /// # Errors
    ///
    /// Will return `Err` on an unrecoverable summary or segment-table
    /// failure; the caller should treat it as "try again later".
    pub fn garbage_collect(&self, n_gc: u32) -> crate::Result<GcStatus> {
        let _gc = self.gc_mutex.lock().expect("lock is poisoned");
        self.run_gc(n_gc)
    }

    /// Non-blocking GC entry point used by the background worker.
    ///
    /// Returns `None` when a foreground pass already holds the GC mutex.
    pub fn try_garbage_collect(&self, n_gc: u32) -> Option<crate::Result<GcStatus>> {
        let _gc = self.gc_mutex.try_lock().ok()?;
        Some(self.run_gc(n_gc))
    }

    /// Evacuates a single segment right now, bypassing victim selection.
    ///
    /// On `Blocked`, operations are left frozen; the caller has to follow
    /// up with `write_checkpoint(true, ..)` just like the orchestrator.
    #[doc(hidden)]
    pub fn evacuate_segment(&self, segno: SegNo, gc_kind: GcKind) -> crate::Result<GcStatus> {
        let _gc = self.gc_mutex.lock().expect("lock is poisoned");

        let mut pins = InodePinSet::default();
        let status = self.do_garbage_collect(segno, &mut pins, gc_kind);

        pins.release();
        status
    }
}
