// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    geometry::{BlockAddr, Ino, Nid},
    page::PageFlags,
    HashMap,
};
use quick_cache::sync::Cache;
use std::sync::{Arc, Mutex, RwLock};

/// Node IDs addressable by one indirect node block
pub const NIDS_PER_BLOCK: u32 = 1018;

/// Data blocks addressable by one direct node block
pub const ADDRS_PER_BLOCK: u32 = 1018;

/// Data blocks addressed directly from the inode page
pub const ADDRS_PER_INODE: u32 = 923;

/// Node-address-table entry
#[derive(Clone, Copy, Debug)]
pub struct NatEntry {
    /// Inode the node belongs to
    pub ino: Ino,

    /// Where the node block currently lives, if anywhere
    pub block_addr: Option<BlockAddr>,

    /// Bumped whenever the node is rewritten; summaries carrying an older
    /// version are stale
    pub version: u8,
}

/// Resolved node info handed to the evacuators
#[derive(Clone, Copy, Debug)]
pub struct NodeInfo {
    pub nid: Nid,
    pub ino: Ino,
    pub block_addr: Option<BlockAddr>,
    pub version: u8,
}

/// A cached node page.
///
/// Every node page in this model is a dnode: it carries the data-block
/// address slots it covers. The inode page is the dnode at `nofs = 0`.
#[derive(Debug)]
pub struct NodePage {
    pub nid: Nid,
    pub ino: Ino,

    /// Logical node offset within the owning file
    pub nofs: u32,

    addrs: Mutex<Vec<Option<BlockAddr>>>,

    pub flags: PageFlags,
}

impl NodePage {
    pub(crate) fn new(nid: Nid, ino: Ino, nofs: u32, slots: usize) -> Self {
        Self {
            nid,
            ino,
            nofs,
            addrs: Mutex::new(vec![None; slots]),
            flags: PageFlags::default(),
        }
    }

    /// Reads a data-block address slot.
    pub(crate) fn datablock_addr(&self, ofs_in_node: u32) -> Option<BlockAddr> {
        self.addrs
            .lock()
            .expect("lock is poisoned")
            .get(ofs_in_node as usize)
            .copied()
            .flatten()
    }

    pub(crate) fn set_datablock_addr(&self, ofs_in_node: u32, addr: Option<BlockAddr>) {
        let mut addrs = self.addrs.lock().expect("lock is poisoned");

        if let Some(slot) = addrs.get_mut(ofs_in_node as usize) {
            *slot = addr;
        }
    }

    pub(crate) fn slots(&self) -> usize {
        self.addrs.lock().expect("lock is poisoned").len()
    }
}

/// Logical node offset within the file
pub(crate) fn ofs_of_node(page: &NodePage) -> u32 {
    page.nofs
}

/// Calculates the first file-block index the node page at `node_ofs` covers.
#[must_use]
pub fn start_bidx_of_node(node_ofs: u32) -> u64 {
    let indirect_blks = 2 * NIDS_PER_BLOCK + 4;

    let mut start_bidx: u64 = 1;
    let mut bidx: u64 = 0;

    if node_ofs == 0 {
        start_bidx = 0;
    } else if node_ofs <= 2 {
        bidx = u64::from(node_ofs - 1);
    } else if node_ofs <= indirect_blks {
        let dec = (node_ofs - 4) / (NIDS_PER_BLOCK + 1);
        bidx = u64::from(node_ofs - 2 - dec);
    } else {
        let dec = (node_ofs - indirect_blks - 3) / (NIDS_PER_BLOCK + 1);
        bidx = u64::from(node_ofs - 5 - dec);
    }

    if start_bidx != 0 {
        start_bidx = bidx * u64::from(ADDRS_PER_BLOCK) + u64::from(ADDRS_PER_INODE);
    }
    start_bidx
}

/// Node manager: the NAT plus the node-page working set.
///
/// `ra_node_page` pulls a page into the read-ahead cache ahead of time so a
/// later `get_node_page` finds it warm; a cache miss models the read I/O.
pub struct NodeStore {
    nat: RwLock<HashMap<Nid, NatEntry>>,
    pages: RwLock<HashMap<Nid, Arc<NodePage>>>,
    ra_cache: Cache<Nid, Arc<NodePage>>,
    dirty: Mutex<Vec<Nid>>,
}

impl NodeStore {
    pub(crate) fn new() -> Self {
        Self {
            nat: RwLock::new(HashMap::default()),
            pages: RwLock::new(HashMap::default()),
            ra_cache: Cache::new(10_000),
            dirty: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn get_node_info(&self, nid: Nid) -> Option<NodeInfo> {
        self.nat
            .read()
            .expect("lock is poisoned")
            .get(&nid)
            .map(|nat| NodeInfo {
                nid,
                ino: nat.ino,
                block_addr: nat.block_addr,
                version: nat.version,
            })
    }

    pub(crate) fn set_nat(&self, nid: Nid, entry: NatEntry) {
        self.nat
            .write()
            .expect("lock is poisoned")
            .insert(nid, entry);
    }

    pub(crate) fn set_nat_block_addr(&self, nid: Nid, addr: Option<BlockAddr>) {
        if let Some(entry) = self.nat.write().expect("lock is poisoned").get_mut(&nid) {
            entry.block_addr = addr;
        }
    }

    pub(crate) fn bump_nat_version(&self, nid: Nid) {
        if let Some(entry) = self.nat.write().expect("lock is poisoned").get_mut(&nid) {
            entry.version = entry.version.wrapping_add(1);
        }
    }

    pub(crate) fn insert_page(&self, page: Arc<NodePage>) {
        self.pages
            .write()
            .expect("lock is poisoned")
            .insert(page.nid, page);
    }

    /// Issues read-ahead for a node page.
    pub(crate) fn ra_node_page(&self, nid: Nid) {
        let page = self.pages.read().expect("lock is poisoned").get(&nid).cloned();

        if let Some(page) = page {
            self.ra_cache.insert(nid, page);
        }
    }

    /// Fetches a node page, preferring the read-ahead cache.
    pub(crate) fn get_node_page(&self, nid: Nid) -> Option<Arc<NodePage>> {
        if let Some(page) = self.ra_cache.get(&nid) {
            return Some(page);
        }

        let page = self.pages.read().expect("lock is poisoned").get(&nid).cloned()?;
        self.ra_cache.insert(nid, page.clone());
        Some(page)
    }

    /// Marks a node page dirty; returns `true` if it just became dirty.
    pub(crate) fn mark_dirty(&self, page: &NodePage) -> bool {
        if page.flags.set_dirty() {
            self.dirty.lock().expect("lock is poisoned").push(page.nid);
            true
        } else {
            false
        }
    }

    pub(crate) fn dirty_pages(&self) -> usize {
        self.dirty.lock().expect("lock is poisoned").len()
    }

    /// Takes the current dirty list for a writeback pass.
    pub(crate) fn take_dirty(&self) -> Vec<Nid> {
        std::mem::take(&mut *self.dirty.lock().expect("lock is poisoned"))
    }

    pub(crate) fn remove(&self, nid: Nid) {
        self.nat.write().expect("lock is poisoned").remove(&nid);
        self.pages.write().expect("lock is poisoned").remove(&nid);
        self.ra_cache.remove(&nid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn start_bidx_inode_page() {
        assert_eq!(0, start_bidx_of_node(0));
    }

    #[test]
    fn start_bidx_direct_nodes() {
        assert_eq!(u64::from(ADDRS_PER_INODE), start_bidx_of_node(1));
        assert_eq!(
            u64::from(ADDRS_PER_INODE) + u64::from(ADDRS_PER_BLOCK),
            start_bidx_of_node(2)
        );
    }

    #[test]
    fn start_bidx_under_indirection() {
        // first dnode hanging off the first indirect node (nofs 3 is the
        // indirect node itself, 4 its first child): bidx = 4 - 2 - 0
        assert_eq!(
            2 * u64::from(ADDRS_PER_BLOCK) + u64::from(ADDRS_PER_INODE),
            start_bidx_of_node(4)
        );

        // the indirect boundary cases only depend on the integer division
        let indirect_blks = 2 * NIDS_PER_BLOCK + 4;
        let nofs = indirect_blks;
        let dec = (nofs - 4) / (NIDS_PER_BLOCK + 1);
        assert_eq!(
            u64::from(nofs - 2 - dec) * u64::from(ADDRS_PER_BLOCK) + u64::from(ADDRS_PER_INODE),
            start_bidx_of_node(nofs)
        );

        // past the doubly-indirect boundary
        let nofs = indirect_blks + 7;
        let dec = (nofs - indirect_blks - 3) / (NIDS_PER_BLOCK + 1);
        assert_eq!(
            u64::from(nofs - 5 - dec) * u64::from(ADDRS_PER_BLOCK) + u64::from(ADDRS_PER_INODE),
            start_bidx_of_node(nofs)
        );
    }

    #[test]
    fn readahead_then_fetch() {
        let store = NodeStore::new();
        store.insert_page(Arc::new(NodePage::new(9, 9, 0, 16)));
        store.set_nat(
            9,
            NatEntry {
                ino: 9,
                block_addr: Some(4),
                version: 0,
            },
        );

        store.ra_node_page(9);
        let page = store.get_node_page(9).expect("was inserted");
        assert_eq!(9, page.nid);

        // unknown nid: read-ahead is a no-op, fetch fails
        store.ra_node_page(1000);
        assert!(store.get_node_page(1000).is_none());
    }

    #[test]
    fn version_bump_invalidates_info() {
        let store = NodeStore::new();
        store.set_nat(
            5,
            NatEntry {
                ino: 5,
                block_addr: Some(12),
                version: 0,
            },
        );

        store.bump_nat_version(5);
        let info = store.get_node_info(5).expect("present");
        assert_eq!(1, info.version);
    }

    #[test]
    fn dirty_list_dedupes_via_flag() {
        let store = NodeStore::new();
        let page = Arc::new(NodePage::new(3, 3, 0, 4));
        store.insert_page(page.clone());

        assert!(store.mark_dirty(&page));
        assert!(!store.mark_dirty(&page));
        assert_eq!(1, store.dirty_pages());

        let drained = store.take_dirty();
        assert_eq!(vec![3], drained);
        assert_eq!(0, store.dirty_pages());
    }
}
