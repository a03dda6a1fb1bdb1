// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    gc::report::GcReport,
    summary::SumType,
    volume::{Volume, VolumeInner},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

/// Utilization polarization of the main area (stats only, not a GC input)
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SitMetrics {
    /// Bimodal distribution factor: mean squared distance of per-section
    /// valid counts from half-full, normalized
    pub bimodal: u64,

    /// Average valid blocks of dirty sections
    pub avg_vblocks: u64,
}

/// Per-volume GC counters.
///
/// Holds a weak back-reference to its volume which is cleared at teardown,
/// so registry readers observe a clean "gone" signal instead of touching a
/// dying filesystem.
pub struct StatInfo {
    call_count: AtomicU64,
    bg_gc: AtomicU64,
    node_segments: AtomicU64,
    data_segments: AtomicU64,
    node_blocks: AtomicU64,
    data_blocks: AtomicU64,

    volume: Mutex<Weak<VolumeInner>>,
}

impl StatInfo {
    pub(crate) fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            bg_gc: AtomicU64::new(0),
            node_segments: AtomicU64::new(0),
            data_segments: AtomicU64::new(0),
            node_blocks: AtomicU64::new(0),
            data_blocks: AtomicU64::new(0),
            volume: Mutex::new(Weak::new()),
        }
    }

    pub(crate) fn inc_call_count(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_bg_gc(&self) {
        self.bg_gc.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_segments(&self, sum_type: SumType) {
        match sum_type {
            SumType::Node => self.node_segments.fetch_add(1, Ordering::Relaxed),
            SumType::Data => self.data_segments.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn inc_node_blocks(&self, n: u64) {
        self.node_blocks.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn inc_data_blocks(&self, n: u64) {
        self.data_blocks.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub(crate) fn bg_gc(&self) -> u64 {
        self.bg_gc.load(Ordering::Relaxed)
    }

    pub(crate) fn segments(&self, sum_type: SumType) -> u64 {
        match sum_type {
            SumType::Node => self.node_segments.load(Ordering::Relaxed),
            SumType::Data => self.data_segments.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn node_blocks(&self) -> u64 {
        self.node_blocks.load(Ordering::Relaxed)
    }

    pub(crate) fn data_blocks(&self) -> u64 {
        self.data_blocks.load(Ordering::Relaxed)
    }

    pub(crate) fn attach(&self, volume: &Volume) {
        *self.volume.lock().expect("lock is poisoned") = Arc::downgrade(&volume.0);
    }

    pub(crate) fn detach(&self) {
        *self.volume.lock().expect("lock is poisoned") = Weak::new();
    }

    fn upgrade(&self) -> Option<Volume> {
        self.volume
            .lock()
            .expect("lock is poisoned")
            .upgrade()
            .map(Volume)
    }
}

/// Explicit collection of live volumes for statistics readers.
///
/// Volumes register at mount (`build_gc_manager`) and unregister at
/// unmount (`destroy_gc_manager`); a reader walking the registry never
/// observes a half-torn-down volume.
#[derive(Default)]
pub struct StatRegistry {
    list: Mutex<Vec<Arc<StatInfo>>>,
}

impl StatRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, stat: Arc<StatInfo>) {
        self.list.lock().expect("lock is poisoned").push(stat);
    }

    pub(crate) fn unregister(&self, stat: &Arc<StatInfo>) {
        self.list
            .lock()
            .expect("lock is poisoned")
            .retain(|s| !Arc::ptr_eq(s, stat));
    }

    /// Number of registered volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.lock().expect("lock is poisoned").len()
    }

    /// Returns `true` if no volume is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots every live registered volume.
    ///
    /// Volumes torn down since registration are silently skipped.
    #[must_use]
    pub fn reports(&self) -> Vec<GcReport> {
        let list = self.list.lock().expect("lock is poisoned");

        list.iter()
            .filter_map(|stat| stat.upgrade())
            .map(|volume| volume.report())
            .collect()
    }
}

impl Volume {
    /// Snapshots the volume's reclamation state and GC counters.
    #[must_use]
    pub fn report(&self) -> GcReport {
        let geometry = self.geometry;
        let valid_blocks = self.valid_user_blocks();
        let total_blocks = geometry.total_blocks();

        let (dirty_segments, prefree_segments) = {
            let dirty = self.dirty.lock().expect("lock is poisoned");
            (
                dirty.nr_dirty(crate::segment::dirty::DirtyType::Dirty) as u32,
                dirty.nr_dirty(crate::segment::dirty::DirtyType::Prefree) as u32,
            )
        };

        GcReport {
            total_segments: geometry.total_segs,
            dirty_segments,
            prefree_segments,
            free_segments: self.free_segments(),
            free_sections: self.free_sections(),
            valid_blocks,
            utilization_pct: (valid_blocks * 100 / total_blocks) as u8,
            gc_calls: self.stat.call_count(),
            bg_gc_runs: self.stat.bg_gc(),
            node_segments: self.stat.segments(SumType::Node),
            data_segments: self.stat.segments(SumType::Data),
            node_blocks: self.stat.node_blocks(),
            data_blocks: self.stat.data_blocks(),
        }
    }

    /// Computes the bimodal distribution factor over section granularity.
    ///
    /// Walks the whole segment table under the sentry lock; diagnostic
    /// only.
    #[must_use]
    pub fn sit_metrics(&self) -> SitMetrics {
        let geometry = self.geometry;
        let blks_per_sec = u64::from(geometry.blocks_per_sec());
        let hblks_per_sec = blks_per_sec / 2;

        let mut bimodal = 0u64;
        let mut total_vblocks = 0u64;
        let mut ndirty = 0u64;

        {
            let sit = self.sit.lock().expect("lock is poisoned");

            let mut segno = 0;
            while segno < geometry.total_segs {
                let vblocks =
                    u64::from(sit.valid_blocks(&geometry, segno, geometry.log_segs_per_sec));
                let dist = vblocks.abs_diff(hblks_per_sec);
                bimodal += dist * dist;

                if vblocks > 0 && vblocks < blks_per_sec {
                    total_vblocks += vblocks;
                    ndirty += 1;
                }
                segno += geometry.segs_per_sec();
            }
        }

        let dist = u64::from(geometry.total_sections()) * hblks_per_sec * hblks_per_sec / 100;

        SitMetrics {
            bimodal: if dist == 0 { 0 } else { bimodal / dist },
            avg_vblocks: if ndirty == 0 { 0 } else { total_vblocks / ndirty },
        }
    }

    /// Registers this volume with a statistics registry.
    pub fn build_gc_manager(&self, registry: &StatRegistry) {
        self.stat.attach(self);
        registry.register(self.stat.clone());
    }

    /// Unregisters this volume, clearing the back-reference first so
    /// concurrent readers observe it as gone.
    pub fn destroy_gc_manager(&self, registry: &StatRegistry) {
        self.stat.detach();
        registry.unregister(&self.stat);
    }
}
