// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    geometry::{Ino, Nid},
    node::{ADDRS_PER_BLOCK, ADDRS_PER_INODE},
    page::PageFlags,
    HashMap,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, RwLock,
};

/// A cached data page of a file.
#[derive(Debug)]
pub struct DataPage {
    pub ino: Ino,

    /// File block index
    pub index: u64,

    pub flags: PageFlags,

    /// Cold pages are steered into the cold-data log by the writer
    cold: AtomicBool,

    /// Cleared when the page is truncated away from its mapping
    mapped: AtomicBool,
}

impl DataPage {
    fn new(ino: Ino, index: u64) -> Self {
        Self {
            ino,
            index,
            flags: PageFlags::default(),
            cold: AtomicBool::new(false),
            mapped: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_cold(&self) -> bool {
        self.cold.load(Ordering::Acquire)
    }

    pub(crate) fn set_cold(&self, cold: bool) {
        self.cold.store(cold, Ordering::Release);
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    pub(crate) fn unmap(&self) {
        self.mapped.store(false, Ordering::Release);
    }
}

/// An in-memory inode.
///
/// `nids` lists the file's node pages in node-offset order: the inode page
/// first, then direct dnodes. That is all the layout this model ever
/// materializes; deeper indirection exists only in the block-index math.
pub struct Inode {
    pub ino: Ino,
    pub is_dir: bool,

    pub(crate) nids: Mutex<Vec<Nid>>,
    pages: RwLock<HashMap<u64, Arc<DataPage>>>,

    /// Dirty dentry pages of this directory
    dirty_dents: AtomicUsize,
}

impl Inode {
    pub(crate) fn new(ino: Ino, is_dir: bool) -> Self {
        Self {
            ino,
            is_dir,
            nids: Mutex::new(vec![ino]),
            pages: RwLock::new(HashMap::default()),
            dirty_dents: AtomicUsize::new(0),
        }
    }

    /// Maps a file block index onto the owning dnode and its slot.
    ///
    /// Returns the position in `nids` plus the offset-in-node.
    pub(crate) fn dnode_position(&self, bidx: u64) -> (usize, u32) {
        let addrs_per_inode = u64::from(ADDRS_PER_INODE);
        let addrs_per_block = u64::from(ADDRS_PER_BLOCK);

        if bidx < addrs_per_inode {
            (0, bidx as u32)
        } else {
            let rel = bidx - addrs_per_inode;
            (1 + (rel / addrs_per_block) as usize, (rel % addrs_per_block) as u32)
        }
    }

    pub(crate) fn nid_for(&self, bidx: u64) -> Option<Nid> {
        let (pos, _) = self.dnode_position(bidx);
        self.nids.lock().expect("lock is poisoned").get(pos).copied()
    }

    pub(crate) fn insert_page(&self, page: Arc<DataPage>) {
        self.pages
            .write()
            .expect("lock is poisoned")
            .insert(page.index, page);
    }

    /// Looks a data page up in the cache without locking it.
    pub(crate) fn find_data_page(&self, bidx: u64) -> Option<Arc<DataPage>> {
        self.pages
            .read()
            .expect("lock is poisoned")
            .get(&bidx)
            .cloned()
    }

    /// Fetches and "locks" a data page for relocation.
    ///
    /// The in-memory model has no real page lock; exclusivity during moves
    /// comes from the data-write lock of the volume.
    pub(crate) fn get_lock_data_page(&self, bidx: u64) -> Option<Arc<DataPage>> {
        self.find_data_page(bidx)
    }

    pub(crate) fn take_pages(&self) -> Vec<Arc<DataPage>> {
        self.pages
            .write()
            .expect("lock is poisoned")
            .drain()
            .map(|(_, page)| page)
            .collect()
    }

    pub(crate) fn inc_dirty_dents(&self) {
        self.dirty_dents.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_dirty_dents(&self) {
        self.dirty_dents.fetch_sub(1, Ordering::AcqRel);
    }

    #[cfg(test)]
    pub(crate) fn dirty_dents(&self) -> usize {
        self.dirty_dents.load(Ordering::Acquire)
    }
}

/// Inode working set plus the global dirty-page accounting the GC and the
/// checkpoint predicates read.
pub struct InodeStore {
    inodes: RwLock<HashMap<Ino, Arc<Inode>>>,

    /// Data pages waiting for writeback, GC-dirtied ones included
    dirty_pages: Mutex<Vec<Arc<DataPage>>>,

    n_dirty_data: AtomicUsize,
    n_dirty_dents: AtomicUsize,
}

impl InodeStore {
    pub(crate) fn new() -> Self {
        Self {
            inodes: RwLock::new(HashMap::default()),
            dirty_pages: Mutex::new(Vec::new()),
            n_dirty_data: AtomicUsize::new(0),
            n_dirty_dents: AtomicUsize::new(0),
        }
    }

    pub(crate) fn insert(&self, inode: Arc<Inode>) {
        self.inodes
            .write()
            .expect("lock is poisoned")
            .insert(inode.ino, inode);
    }

    /// Resolves an inode without blocking on I/O.
    ///
    /// Fails when the inode is gone (deleted or evicted).
    pub(crate) fn iget_nowait(&self, ino: Ino) -> Option<Arc<Inode>> {
        self.inodes
            .read()
            .expect("lock is poisoned")
            .get(&ino)
            .cloned()
    }

    pub(crate) fn remove(&self, ino: Ino) -> Option<Arc<Inode>> {
        self.inodes.write().expect("lock is poisoned").remove(&ino)
    }

    pub(crate) fn new_data_page(&self, inode: &Inode, bidx: u64) -> Arc<DataPage> {
        let page = Arc::new(DataPage::new(inode.ino, bidx));
        inode.insert_page(page.clone());
        page
    }

    /// Marks a data page dirty; returns `true` if it just became dirty.
    pub(crate) fn mark_dirty(&self, inode: &Inode, page: &Arc<DataPage>) -> bool {
        if !page.flags.set_dirty() {
            return false;
        }

        self.dirty_pages
            .lock()
            .expect("lock is poisoned")
            .push(page.clone());

        if inode.is_dir {
            self.n_dirty_dents.fetch_add(1, Ordering::AcqRel);
            inode.inc_dirty_dents();
        } else {
            self.n_dirty_data.fetch_add(1, Ordering::AcqRel);
        }

        true
    }

    /// Clears the dirty bit for writeback; returns `true` if it was set.
    pub(crate) fn clear_dirty(&self, inode: &Inode, page: &DataPage) -> bool {
        if !page.flags.clear_dirty() {
            return false;
        }

        if inode.is_dir {
            self.n_dirty_dents.fetch_sub(1, Ordering::AcqRel);
            inode.dec_dirty_dents();
        } else {
            self.n_dirty_data.fetch_sub(1, Ordering::AcqRel);
        }

        true
    }

    pub(crate) fn take_dirty(&self) -> Vec<Arc<DataPage>> {
        std::mem::take(&mut *self.dirty_pages.lock().expect("lock is poisoned"))
    }

    pub(crate) fn dirty_data_pages(&self) -> usize {
        self.n_dirty_data.load(Ordering::Acquire)
    }

    pub(crate) fn dirty_dents(&self) -> usize {
        self.n_dirty_dents.load(Ordering::Acquire)
    }
}
