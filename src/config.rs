// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Upper bound on segments inspected per victim selection
const DEFAULT_MAX_VICTIM_SEARCH: usize = 20;

/// Garbage collector configuration
#[derive(Clone, Debug)]
pub struct GcConfig {
    /// Whether the background GC worker may run at all
    pub(crate) bg_gc: bool,

    /// Bound on segments inspected per victim selection
    pub(crate) max_victim_search: usize,

    /// Lower bound of the worker's adaptive sleep, in milliseconds
    pub(crate) min_sleep_ms: u64,

    /// Upper bound of the worker's adaptive sleep, in milliseconds
    pub(crate) max_sleep_ms: u64,

    /// Sleep applied when a GC pass found nothing to reclaim
    pub(crate) nogc_sleep_ms: u64,

    /// Sections kept in reserve; foreground GC kicks in when the
    /// free-section count drops to this level
    pub(crate) reserved_sections: u32,

    /// Over-provisioned sections, never handed to user data
    pub(crate) overprovision_sections: u32,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            bg_gc: true,
            max_victim_search: DEFAULT_MAX_VICTIM_SEARCH,
            min_sleep_ms: 30_000,
            max_sleep_ms: 60_000,
            nogc_sleep_ms: 300_000,
            reserved_sections: 2,
            overprovision_sections: 1,
        }
    }
}

impl GcConfig {
    /// Enables or disables the background GC worker.
    ///
    /// Foreground GC under space pressure is unaffected.
    #[must_use]
    pub fn bg_gc(mut self, enabled: bool) -> Self {
        self.bg_gc = enabled;
        self
    }

    /// Sets the bound on segments inspected per victim selection.
    ///
    /// A larger bound finds cheaper victims at the price of longer scans
    /// under the segment-list lock.
    ///
    /// Default = 20
    #[must_use]
    pub fn max_victim_search(mut self, n: usize) -> Self {
        self.max_victim_search = n.max(1);
        self
    }

    /// Sets the worker's sleep bounds (min, max, no-gc), in milliseconds.
    ///
    /// # Panics
    ///
    /// Panics if `min` is zero or `max < min`.
    #[must_use]
    pub fn sleep_times(mut self, min: u64, max: u64, nogc: u64) -> Self {
        assert!(min > 0, "invalid sleep time");
        assert!(max >= min, "invalid sleep time");
        self.min_sleep_ms = min;
        self.max_sleep_ms = max;
        self.nogc_sleep_ms = nogc;
        self
    }

    /// Sets the reserved section count.
    ///
    /// Normally this is read from the checkpoint at mount time.
    #[must_use]
    pub fn reserved_sections(mut self, n: u32) -> Self {
        self.reserved_sections = n;
        self
    }

    /// Sets the over-provisioned section count.
    #[must_use]
    pub fn overprovision_sections(mut self, n: u32) -> Self {
        self.overprovision_sections = n;
        self
    }
}
