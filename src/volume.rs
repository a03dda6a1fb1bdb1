// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    config::GcConfig,
    error::{Error, Result},
    gc::{victim::VictimSelection, worker::WorkerHandle},
    geometry::{BlockAddr, Geometry, Ino, Nid, SegNo},
    inode::{DataPage, Inode, InodeStore},
    node::{NatEntry, NodeInfo, NodePage, NodeStore, ADDRS_PER_BLOCK, ADDRS_PER_INODE},
    segment::{
        curseg::CursegInfo,
        dirty::{DirtySeglistInfo, DirtyType},
        free::FreeSegmapInfo,
        sit::SitInfo,
        SegType, NR_CURSEG,
    },
    summary::{SsaStore, Summary},
    stats::StatInfo,
};
use std::sync::{
    atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering},
    Arc, Condvar, Mutex,
};

/// Invalid-block density (percent) above which the worker speeds up
const LIMIT_INVALID_BLOCK: u64 = 40;

/// Checkpoint coordination: the checkpoint mutex plus the operations
/// freeze the evacuators arm before reporting `Blocked`.
struct CpControl {
    cp_mutex: Mutex<()>,
    frozen: Mutex<bool>,
    thawed: Condvar,
    checkpoints: AtomicU64,

    /// Test hook: calls of `should_do_checkpoint` left before it fires
    /// once; negative = disarmed
    countdown: AtomicI64,
}

/// A mounted volume: the filesystem handle everything hangs off.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Volume(pub(crate) Arc<VolumeInner>);

impl std::ops::Deref for Volume {
    type Target = VolumeInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[allow(clippy::module_name_repetitions)]
pub struct VolumeInner {
    pub(crate) geometry: Geometry,
    pub(crate) config: GcConfig,

    active: AtomicBool,

    /// Logical user clock feeding segment mtimes
    clock: AtomicU64,

    next_id: AtomicU32,

    /// Serializes all GC; the worker try-locks, foreground callers block
    pub(crate) gc_mutex: Mutex<()>,

    cp: CpControl,

    /// Sentry lock: SIT entries, mtime bounds, scan resume points
    pub(crate) sit: Mutex<SitInfo>,

    /// Segment-list lock: dirty/victim bitmaps, installed selector
    pub(crate) dirty: Mutex<DirtySeglistInfo>,

    free: Mutex<FreeSegmapInfo>,

    cursegs: Mutex<[CursegInfo; NR_CURSEG]>,

    /// Lock-free mirror of the curseg segnos for the victim scan
    pub(crate) curseg_segnos: [AtomicU32; NR_CURSEG],

    pub(crate) ssa: SsaStore,
    pub(crate) nodes: NodeStore,
    pub(crate) inodes: InodeStore,

    /// Serializes foreground data relocation
    pub(crate) data_write_lock: Mutex<()>,

    pub(crate) stat: Arc<StatInfo>,

    pub(crate) worker: Mutex<Option<WorkerHandle>>,
}

impl Volume {
    /// Creates a fresh volume: every section free, the six logs opened on
    /// their own sections.
    ///
    /// # Panics
    ///
    /// Panics if the main area is too small to open the six logs.
    #[must_use]
    pub fn create(geometry: Geometry, config: GcConfig) -> Self {
        let mut sit = SitInfo::new(&geometry);
        let mut free = FreeSegmapInfo::new(&geometry);
        let ssa = SsaStore::new(&geometry);

        // seed the mtime window so it is well-formed before the first write
        sit.observe_mtime(0);

        let mut cursegs = [CursegInfo::new(0); NR_CURSEG];
        let curseg_segnos: [AtomicU32; NR_CURSEG] = std::array::from_fn(|_| AtomicU32::new(0));

        for (i, seg_type) in SegType::ALL.into_iter().enumerate() {
            let segno = free
                .find_free_section(&geometry, (i as u32) << geometry.log_segs_per_sec)
                .expect("main area too small for the six logs");

            free.set_inuse(segno);
            if let Ok(entry) = sit.entry_mut(segno) {
                entry.seg_type = seg_type;
            }
            let _ = ssa.set_type(segno, seg_type.sum_type());

            cursegs[i] = CursegInfo::new(segno);
            curseg_segnos[i].store(segno, Ordering::Release);
        }

        Self(Arc::new(VolumeInner {
            geometry,
            config,
            active: AtomicBool::new(true),
            clock: AtomicU64::new(0),
            next_id: AtomicU32::new(1),
            gc_mutex: Mutex::new(()),
            cp: CpControl {
                cp_mutex: Mutex::new(()),
                frozen: Mutex::new(false),
                thawed: Condvar::new(),
                checkpoints: AtomicU64::new(0),
                countdown: AtomicI64::new(-1),
            },
            sit: Mutex::new(sit),
            dirty: Mutex::new(DirtySeglistInfo::new(&geometry)),
            free: Mutex::new(free),
            cursegs: Mutex::new(cursegs),
            curseg_segnos,
            ssa,
            nodes: NodeStore::new(),
            inodes: InodeStore::new(),
            data_write_lock: Mutex::new(()),
            stat: Arc::new(StatInfo::new()),
            worker: Mutex::new(None),
        }))
    }

    /// Stops the worker, runs the final checkpoint and deactivates the
    /// volume.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the final checkpoint fails.
    pub fn close(&self) -> Result<()> {
        self.stop_gc_thread();
        self.active.store(false, Ordering::Release);
        self.write_checkpoint(false, true)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Swaps the installed victim-selection strategy.
    pub fn set_victim_selection(&self, selection: VictimSelection) {
        self.dirty.lock().expect("lock is poisoned").selection = selection;
    }

    fn now(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advances the logical clock, aging everything written so far.
    pub fn advance_clock(&self, ticks: u64) {
        self.clock.fetch_add(ticks, Ordering::SeqCst);
    }

    fn alloc_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // --- space accounting -------------------------------------------------

    /// Number of fully free sections.
    #[must_use]
    pub fn free_sections(&self) -> u32 {
        self.free
            .lock()
            .expect("lock is poisoned")
            .free_sections(&self.geometry)
    }

    /// Number of free segments.
    #[must_use]
    pub fn free_segments(&self) -> u32 {
        self.free.lock().expect("lock is poisoned").free_segments()
    }

    /// Sections kept in reserve for reclamation headroom.
    #[must_use]
    pub fn reserved_sections(&self) -> u32 {
        self.config.reserved_sections
    }

    /// Over-provisioned sections.
    #[must_use]
    pub fn overprovision_sections(&self) -> u32 {
        self.config.overprovision_sections
    }

    /// Whether free space has dropped to the reserve: foreground GC
    /// territory.
    #[must_use]
    pub fn has_not_enough_free_secs(&self) -> bool {
        self.free_sections() <= self.reserved_sections()
    }

    pub(crate) fn valid_user_blocks(&self) -> u64 {
        let sit = self.sit.lock().expect("lock is poisoned");

        (0..self.geometry.total_segs)
            .map(|segno| u64::from(sit.valid_blocks(&self.geometry, segno, 0)))
            .sum()
    }

    /// Whether enough invalid blocks have piled up to make GC worthwhile.
    pub(crate) fn has_enough_invalid_blocks(&self) -> bool {
        let total = self.geometry.total_blocks();
        let free_blocks =
            u64::from(self.free_segments()) << self.geometry.log_blocks_per_seg;
        let invalid = total - free_blocks - self.valid_user_blocks();

        invalid * 100 > total * LIMIT_INVALID_BLOCK
    }

    /// Whether the I/O side is quiet enough for background GC.
    pub(crate) fn is_idle(&self) -> bool {
        self.nodes.dirty_pages() == 0
            && self.inodes.dirty_data_pages() == 0
            && self.inodes.dirty_dents() == 0
    }

    pub(crate) fn is_curseg(&self, segno: SegNo) -> bool {
        self.curseg_segnos
            .iter()
            .any(|c| c.load(Ordering::Acquire) == segno)
    }

    // --- checkpoint machinery ---------------------------------------------

    /// Whether the dirty node/dentry backlog no longer fits into free
    /// space, so a checkpoint has to run before GC dirties more.
    pub(crate) fn should_do_checkpoint(&self) -> bool {
        let armed = self.cp.countdown.load(Ordering::Acquire);
        if armed > 0 {
            let prev = self.cp.countdown.fetch_sub(1, Ordering::AcqRel);
            if prev == 1 {
                return true;
            }
            if prev > 1 {
                return false;
            }
        }

        let blocks_per_sec = self.geometry.blocks_per_sec() as usize;
        let node_secs = self.nodes.dirty_pages().div_ceil(blocks_per_sec);
        let dent_secs = self.inodes.dirty_dents().div_ceil(blocks_per_sec);

        self.free_sections() <= (node_secs + 2 * dent_secs) as u32
    }

    /// Arms `should_do_checkpoint` to fire on its `n`-th call.
    #[doc(hidden)]
    pub fn arm_checkpoint_trigger(&self, n: i64) {
        self.cp.countdown.store(n, Ordering::Release);
    }

    /// Checkpoints performed so far.
    #[must_use]
    pub fn checkpoint_count(&self) -> u64 {
        self.cp.checkpoints.load(Ordering::Acquire)
    }

    /// Freezes user operations under the checkpoint lock.
    ///
    /// An evacuator calls this before reporting `Blocked`; the follow-up
    /// `write_checkpoint(true, ..)` skips the freeze and thaws at the end.
    pub(crate) fn freeze_operations(&self) {
        let _cp = self.cp.cp_mutex.lock().expect("lock is poisoned");
        self.block_operations();
    }

    fn block_operations(&self) {
        *self.cp.frozen.lock().expect("lock is poisoned") = true;
    }

    fn unblock_operations(&self) {
        *self.cp.frozen.lock().expect("lock is poisoned") = false;
        self.cp.thawed.notify_all();
    }

    /// Parks the caller while operations are frozen for a checkpoint.
    pub(crate) fn wait_writable(&self) {
        let mut frozen = self.cp.frozen.lock().expect("lock is poisoned");
        while *frozen {
            frozen = self.cp.thawed.wait(frozen).expect("lock is poisoned");
        }
    }

    /// Persists the volume state: drains the writer, snapshots per-segment
    /// checkpoint counts and frees prefree segments.
    ///
    /// `is_blocked` means an evacuator already froze operations on our
    /// behalf. Unfinished foreground victim claims are returned to the
    /// pool; background claims survive for the foreground fast path.
    ///
    /// # Errors
    ///
    /// Will return `Err` if draining the writer fails.
    pub fn write_checkpoint(&self, is_blocked: bool, umount: bool) -> Result<()> {
        let _cp = self.cp.cp_mutex.lock().expect("lock is poisoned");

        if !is_blocked {
            self.block_operations();
        }

        log::info!(
            "checkpoint #{} (blocked: {is_blocked}, umount: {umount})",
            self.checkpoint_count() + 1
        );

        let flush = self
            .flush_dirty_data_pages()
            .and_then(|()| self.sync_node_pages());

        if let Err(e) = flush {
            self.unblock_operations();
            return Err(e);
        }

        {
            let mut sit = self.sit.lock().expect("lock is poisoned");
            sit.snapshot_checkpoint();
        }

        {
            let mut dirty = self.dirty.lock().expect("lock is poisoned");
            let prefree = dirty.take_prefree();

            let mut free = self.free.lock().expect("lock is poisoned");
            for segno in prefree {
                dirty.clear_victim(segno, crate::gc::victim::GcKind::Background);
                dirty.clear_victim(segno, crate::gc::victim::GcKind::Foreground);
                free.set_free(segno);
                log::trace!("freed segment {segno}");
            }

            dirty.clear_fg_victims();
        }

        self.cp.checkpoints.fetch_add(1, Ordering::AcqRel);
        self.unblock_operations();

        Ok(())
    }

    // --- allocator --------------------------------------------------------

    /// Re-files a segment in the dirty lists according to its live count.
    fn locate_dirty_segment(&self, segno: SegNo) {
        if self.is_curseg(segno) {
            return;
        }

        let (valid, seg_type) = {
            let sit = self.sit.lock().expect("lock is poisoned");
            match sit.entry(segno) {
                Ok(entry) => (entry.valid_blocks, entry.seg_type),
                Err(_) => return,
            }
        };

        if self.free.lock().expect("lock is poisoned").is_free(segno) {
            return;
        }

        let mut dirty = self.dirty.lock().expect("lock is poisoned");
        dirty.remove(segno);

        if valid == 0 {
            dirty.insert_prefree(segno);
        } else if valid < self.geometry.blocks_per_seg() {
            dirty.insert_dirty(segno, DirtyType::from(seg_type));
        }
    }

    /// Opens a fresh segment for a log whose current one is exhausted.
    ///
    /// Prefers the next segment of the same section, then any free
    /// section; with no free segment left it falls back to slack-space
    /// reuse of the emptiest dirty segment of the same type.
    fn replace_curseg(
        &self,
        cursegs: &mut [CursegInfo; NR_CURSEG],
        seg_type: SegType,
    ) -> Result<()> {
        let idx = seg_type as usize;
        let old = cursegs[idx].segno;

        let picked = {
            let mut free = self.free.lock().expect("lock is poisoned");
            let next = old + 1;

            if next < self.geometry.total_segs
                && self.geometry.secno(next) == self.geometry.secno(old)
                && free.is_free(next)
            {
                free.set_inuse(next);
                Some((next, false))
            } else if let Some(segno) = free.find_free_section(
                &self.geometry,
                self.geometry.sec_start_segno(old) + self.geometry.segs_per_sec(),
            ) {
                free.set_inuse(segno);
                Some((segno, false))
            } else {
                None
            }
        };

        let (segno, ssr) = match picked {
            Some(pick) => pick,
            None => {
                let segno = self
                    .select_victim(
                        crate::gc::victim::GcKind::Background,
                        crate::gc::victim::TargetType::Ssr(seg_type),
                    )
                    .ok_or(Error::OutOfSpace)?;

                log::debug!("slack-space reuse of segment {segno} for {seg_type:?}");
                self.dirty.lock().expect("lock is poisoned").remove(segno);
                (segno, true)
            }
        };

        {
            let mut sit = self.sit.lock().expect("lock is poisoned");
            let entry = sit.entry_mut(segno)?;
            entry.seg_type = seg_type;

            cursegs[idx] = CursegInfo::new(segno);
            if ssr {
                cursegs[idx].rewind_for_ssr(entry, self.geometry.blocks_per_seg());
            }
        }

        self.ssa.set_type(segno, seg_type.sum_type())?;
        self.curseg_segnos[idx].store(segno, Ordering::Release);

        self.locate_dirty_segment(old);
        Ok(())
    }

    /// Appends one block to the log of `seg_type`, recording its summary.
    pub(crate) fn allocate_block(&self, seg_type: SegType, sum: &Summary) -> Result<BlockAddr> {
        let mut cursegs = self.cursegs.lock().expect("lock is poisoned");
        let idx = seg_type as usize;

        if !cursegs[idx].has_room(self.geometry.blocks_per_seg()) {
            self.replace_curseg(&mut cursegs, seg_type)?;
        }

        let segno = cursegs[idx].segno;
        let off = cursegs[idx].next_blkoff;
        let addr = self.geometry.start_block(segno) + off;

        self.ssa.write_entry(segno, off, sum)?;

        let mtime = self.now();
        {
            let mut sit = self.sit.lock().expect("lock is poisoned");
            sit.set_valid(segno, off, mtime)?;
            sit.observe_mtime(mtime);

            let entry = sit.entry(segno)?;
            cursegs[idx].advance(entry, self.geometry.blocks_per_seg());
        }

        Ok(addr)
    }

    /// Drops a block: clears its validity bit and re-files its segment.
    pub(crate) fn invalidate_block(&self, addr: BlockAddr) -> Result<()> {
        let (segno, off) = self.geometry.block_position(addr);
        let mtime = self.now();

        {
            let mut sit = self.sit.lock().expect("lock is poisoned");
            sit.clear_valid(segno, off, mtime)?;
            sit.observe_mtime(mtime);
        }

        self.locate_dirty_segment(segno);
        Ok(())
    }

    // --- writer -----------------------------------------------------------

    fn node_seg_type(&self, ino: Ino) -> SegType {
        match self.inodes.iget_nowait(ino) {
            Some(inode) if inode.is_dir => SegType::HotNode,
            _ => SegType::WarmNode,
        }
    }

    fn data_seg_type(&self, inode: &Inode, page: &DataPage) -> SegType {
        if page.is_cold() {
            SegType::ColdData
        } else if inode.is_dir {
            SegType::HotData
        } else {
            SegType::WarmData
        }
    }

    /// Writes out every dirty node page, relocating each through the
    /// append allocator and refreshing the NAT.
    pub(crate) fn sync_node_pages(&self) -> Result<()> {
        loop {
            let dirty = self.nodes.take_dirty();
            if dirty.is_empty() {
                return Ok(());
            }

            for nid in dirty {
                let Some(page) = self.nodes.get_node_page(nid) else {
                    continue;
                };
                if !page.flags.clear_dirty() {
                    continue;
                }
                let Some(info) = self.nodes.get_node_info(nid) else {
                    continue;
                };

                page.flags.set_writeback(true);
                let write = self.relocate_node_block(&page, &info);
                page.flags.set_writeback(false);
                write?;
            }
        }
    }

    fn relocate_node_block(&self, page: &NodePage, info: &NodeInfo) -> Result<()> {
        let sum = Summary {
            nid: page.nid,
            version: info.version,
            ofs_in_node: 0,
        };
        let new_addr = self.allocate_block(self.node_seg_type(page.ino), &sum)?;

        self.nodes.set_nat_block_addr(page.nid, Some(new_addr));
        if let Some(old) = info.block_addr {
            self.invalidate_block(old)?;
        }
        Ok(())
    }

    /// Relocates one data page through the append allocator, updating the
    /// parent dnode slot.
    ///
    /// The page is under writeback for the duration of the move, so a
    /// concurrent GC pass leaves it alone.
    pub(crate) fn do_write_data_page(&self, inode: &Inode, page: &DataPage) -> Result<()> {
        if !page.is_mapped() {
            return Ok(());
        }

        let (_, ofs_in_node) = inode.dnode_position(page.index);
        let Some(nid) = inode.nid_for(page.index) else {
            return Ok(());
        };
        let Some(dnode) = self.nodes.get_node_page(nid) else {
            return Ok(());
        };
        let Some(info) = self.nodes.get_node_info(nid) else {
            return Ok(());
        };

        page.flags.set_writeback(true);
        let write = self.relocate_data_block(inode, page, &dnode, &info, ofs_in_node);
        page.flags.set_writeback(false);
        write
    }

    fn relocate_data_block(
        &self,
        inode: &Inode,
        page: &DataPage,
        dnode: &NodePage,
        info: &NodeInfo,
        ofs_in_node: u32,
    ) -> Result<()> {
        let sum = Summary {
            nid: dnode.nid,
            version: info.version,
            ofs_in_node: ofs_in_node as u16,
        };
        let new_addr = self.allocate_block(self.data_seg_type(inode, page), &sum)?;

        let old = dnode.datablock_addr(ofs_in_node);
        dnode.set_datablock_addr(ofs_in_node, Some(new_addr));
        self.nodes.mark_dirty(dnode);

        if let Some(old) = old {
            self.invalidate_block(old)?;
        }
        Ok(())
    }

    /// Drains the dirty data pages queued by background GC or user writes.
    pub(crate) fn flush_dirty_data_pages(&self) -> Result<()> {
        for page in self.inodes.take_dirty() {
            let Some(inode) = self.inodes.iget_nowait(page.ino) else {
                continue;
            };
            if !self.inodes.clear_dirty(&inode, &page) {
                continue;
            }
            if !page.is_mapped() {
                continue;
            }

            self.do_write_data_page(&inode, &page)?;
            page.set_cold(false);
        }
        Ok(())
    }

    /// Triggers foreground GC when free space has run down to the reserve.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the GC pass fails.
    pub fn balance_fs(&self) -> Result<()> {
        if self.has_not_enough_free_secs() {
            self.garbage_collect(1)?;
        }
        Ok(())
    }

    // --- user-facing write paths ------------------------------------------

    /// Creates a file (or directory) spanning `blocks` data blocks.
    ///
    /// # Errors
    ///
    /// Will return `Err` when space runs out.
    ///
    /// # Panics
    ///
    /// Panics if `blocks` exceeds the two-direct-dnode layout this model
    /// materializes.
    pub fn create_file(&self, blocks: u32, is_dir: bool) -> Result<Ino> {
        assert!(
            u64::from(blocks) <= u64::from(ADDRS_PER_INODE) + 2 * u64::from(ADDRS_PER_BLOCK),
            "file too large for the materialized node layout"
        );

        self.wait_writable();

        let ino = self.alloc_id();
        let inode = Arc::new(Inode::new(ino, is_dir));

        self.new_node_page(&inode, ino, 0)?;

        let extra_dnodes = u64::from(blocks)
            .saturating_sub(u64::from(ADDRS_PER_INODE))
            .div_ceil(u64::from(ADDRS_PER_BLOCK));

        for nofs in 1..=extra_dnodes as u32 {
            let nid = self.alloc_id();
            inode.nids.lock().expect("lock is poisoned").push(nid);
            self.new_node_page(&inode, nid, nofs)?;
        }

        self.inodes.insert(inode.clone());

        for bidx in 0..u64::from(blocks) {
            self.write_file_block(&inode, bidx)?;
        }

        log::trace!("created inode {ino} ({blocks} blocks, dir: {is_dir})");
        Ok(ino)
    }

    fn new_node_page(&self, inode: &Inode, nid: Nid, nofs: u32) -> Result<()> {
        let slots = if nofs == 0 {
            ADDRS_PER_INODE
        } else {
            ADDRS_PER_BLOCK
        } as usize;

        self.nodes
            .insert_page(Arc::new(NodePage::new(nid, inode.ino, nofs, slots)));
        self.nodes.set_nat(
            nid,
            NatEntry {
                ino: inode.ino,
                block_addr: None,
                version: 0,
            },
        );

        let sum = Summary {
            nid,
            version: 0,
            ofs_in_node: 0,
        };
        let seg_type = if inode.is_dir {
            SegType::HotNode
        } else {
            SegType::WarmNode
        };
        let addr = self.allocate_block(seg_type, &sum)?;
        self.nodes.set_nat_block_addr(nid, Some(addr));

        Ok(())
    }

    fn write_file_block(&self, inode: &Inode, bidx: u64) -> Result<()> {
        if inode.find_data_page(bidx).is_none() {
            self.inodes.new_data_page(inode, bidx);
        }

        let Some(page) = inode.find_data_page(bidx) else {
            return Ok(());
        };
        self.do_write_data_page(inode, &page)
    }

    /// Overwrites one file block, invalidating its previous location.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the inode is gone or space runs out.
    pub fn overwrite_block(&self, ino: Ino, bidx: u64) -> Result<()> {
        self.wait_writable();

        let inode = self.inodes.iget_nowait(ino).ok_or(Error::NoSuchInode(ino))?;
        self.write_file_block(&inode, bidx)
    }

    /// Deletes a file, invalidating all of its blocks.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the inode is gone.
    pub fn remove_file(&self, ino: Ino) -> Result<()> {
        self.wait_writable();

        let inode = self.inodes.remove(ino).ok_or(Error::NoSuchInode(ino))?;

        for page in inode.take_pages() {
            self.inodes.clear_dirty(&inode, &page);
            page.unmap();
        }

        let nids = inode.nids.lock().expect("lock is poisoned").clone();
        for nid in nids {
            if let Some(dnode) = self.nodes.get_node_page(nid) {
                for ofs in 0..dnode.slots() as u32 {
                    if let Some(addr) = dnode.datablock_addr(ofs) {
                        self.invalidate_block(addr)?;
                        dnode.set_datablock_addr(ofs, None);
                    }
                }
            }

            if let Some(info) = self.nodes.get_node_info(nid) {
                if let Some(addr) = info.block_addr {
                    self.invalidate_block(addr)?;
                }
            }
            self.nodes.remove(nid);
        }

        log::trace!("removed inode {ino}");
        Ok(())
    }

    /// Bumps the node versions of a file, staling every summary written
    /// for its current blocks.
    #[doc(hidden)]
    pub fn bump_node_versions(&self, ino: Ino) -> Result<()> {
        let inode = self.inodes.iget_nowait(ino).ok_or(Error::NoSuchInode(ino))?;

        let nids = inode.nids.lock().expect("lock is poisoned").clone();
        for nid in nids {
            self.nodes.bump_nat_version(nid);
        }
        Ok(())
    }

    /// Whether a segment is claimed in the victim map of `kind`.
    #[doc(hidden)]
    #[must_use]
    pub fn is_victim(&self, segno: SegNo, kind: crate::gc::victim::GcKind) -> bool {
        self.dirty
            .lock()
            .expect("lock is poisoned")
            .is_victim(segno, kind)
    }

    /// Whether a segment sits in the given dirty bucket.
    #[doc(hidden)]
    #[must_use]
    pub fn is_dirty(&self, segno: SegNo, t: DirtyType) -> bool {
        self.dirty.lock().expect("lock is poisoned").is_dirty(segno, t)
    }
}
