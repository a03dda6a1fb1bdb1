// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    config::GcConfig,
    geometry::{Geometry, SegNo},
    segment::{
        curseg::AllocMode,
        dirty::{DirtySeglistInfo, DirtyType},
        sit::SitInfo,
        SegType, NR_CURSEG,
    },
};
use std::sync::atomic::{AtomicU32, Ordering};

/// Who is asking for a victim.
///
/// The discriminants index the victim claim maps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum GcKind {
    /// Opportunistic GC from the worker thread
    Background = 0,

    /// Space-pressure GC on behalf of a blocked writer
    Foreground = 1,
}

/// Cost discipline of a scan.
///
/// The discriminants index the scan resume points in [`SitInfo`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub(crate) enum GcMode {
    /// Fewest live blocks wins
    Greedy = 0,

    /// Cost-benefit: balance copy cost against segment age
    CostBenefit = 1,
}

/// What the caller wants a victim for
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TargetType {
    /// Reclamation; scan the union dirty map at section granularity
    NoCheck,

    /// Slack-space reuse for the given log; scan that type bucket only
    Ssr(SegType),
}

/// Victim-selection strategy installed on the dirty-segment list.
///
/// A small closed set instead of open polymorphism; swap it with
/// [`crate::Volume::set_victim_selection`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VictimSelection {
    /// Policy table of the log: cost-benefit for background GC, greedy for
    /// foreground GC and slack-space reuse
    #[default]
    Default,

    /// Greedy for every caller; useful when mtime quality is poor
    AlwaysGreedy,

    /// First dirty segment wins, costs ignored; deterministic, for tests
    #[doc(hidden)]
    FirstFit,
}

struct VictimPolicy {
    alloc_mode: AllocMode,
    gc_mode: GcMode,
    dirty_type: DirtyType,
    log_ofs_unit: u32,
    offset: u32,
    min_cost: u32,
    min_segno: Option<SegNo>,
}

fn select_gc_mode(selection: VictimSelection, gc_kind: GcKind) -> GcMode {
    match selection {
        VictimSelection::Default => {
            if gc_kind == GcKind::Background {
                GcMode::CostBenefit
            } else {
                GcMode::Greedy
            }
        }
        VictimSelection::AlwaysGreedy | VictimSelection::FirstFit => GcMode::Greedy,
    }
}

fn select_policy(
    geometry: &Geometry,
    sit: &SitInfo,
    selection: VictimSelection,
    gc_kind: GcKind,
    target: TargetType,
) -> VictimPolicy {
    let mut p = match target {
        TargetType::Ssr(seg_type) => VictimPolicy {
            alloc_mode: AllocMode::Ssr,
            gc_mode: GcMode::Greedy,
            dirty_type: DirtyType::from(seg_type),
            log_ofs_unit: 0,
            offset: 0,
            min_cost: 0,
            min_segno: None,
        },
        TargetType::NoCheck => VictimPolicy {
            alloc_mode: AllocMode::Lfs,
            gc_mode: select_gc_mode(selection, gc_kind),
            dirty_type: DirtyType::Dirty,
            log_ofs_unit: geometry.log_segs_per_sec,
            offset: 0,
            min_cost: 0,
            min_segno: None,
        },
    };

    p.offset = sit.last_victim[p.gc_mode as usize];
    p
}

fn max_cost(geometry: &Geometry, p: &VictimPolicy) -> u32 {
    match p.gc_mode {
        GcMode::Greedy => 1 << (geometry.log_blocks_per_seg + p.log_ofs_unit),
        GcMode::CostBenefit => u32::MAX,
    }
}

/// Consumes a pending background claim, if any.
///
/// Foreground GC may reuse victim segments selected by background GC
/// before; those are guaranteed to have few valid blocks. Note that this
/// pops *a* claimed segment, not necessarily the cheapest one — amortized
/// reuse of prior work is the point.
fn check_bg_victims(dirty: &mut DirtySeglistInfo) -> Option<SegNo> {
    let segno = dirty.victim_segmap[GcKind::Background as usize].first_one()? as SegNo;
    dirty.clear_victim(segno, GcKind::Background);
    Some(segno)
}

/// Cost-benefit cost of the section containing `segno`.
///
/// Prefers old sections with few valid blocks: their survivors are cheap
/// to copy and unlikely to be invalidated soon. Encoded as `u32::MAX`
/// minus the benefit so one minimizing comparator serves both modes.
fn cb_cost(geometry: &Geometry, sit: &mut SitInfo, segno: SegNo) -> u32 {
    let start = geometry.sec_start_segno(segno);

    let mut mtime: u64 = 0;
    for s in start..start + geometry.segs_per_sec() {
        mtime += sit.entry(s).map_or(0, |e| e.mtime);
    }
    let mut vblocks = u64::from(sit.valid_blocks(geometry, segno, geometry.log_segs_per_sec));

    mtime >>= geometry.log_segs_per_sec;
    vblocks >>= geometry.log_segs_per_sec;

    let u = (vblocks * 100) >> geometry.log_blocks_per_seg;

    // the user may have changed the system time
    sit.observe_mtime(mtime);

    let age = if sit.max_mtime == sit.min_mtime {
        100
    } else {
        100 - (100 * (mtime - sit.min_mtime)) / (sit.max_mtime - sit.min_mtime)
    };

    u32::MAX - ((100 * (100 - u) * age) / (100 + u)) as u32
}

fn gc_cost(geometry: &Geometry, sit: &mut SitInfo, segno: SegNo, p: &VictimPolicy) -> u32 {
    if p.alloc_mode == AllocMode::Ssr {
        return sit.entry(segno).map_or(0, |e| e.ckpt_valid_blocks);
    }

    match p.gc_mode {
        GcMode::Greedy => sit.valid_blocks(geometry, segno, geometry.log_segs_per_sec),
        GcMode::CostBenefit => cb_cost(geometry, sit, segno),
    }
}

fn is_cur_sec(geometry: &Geometry, cursegs: &[AtomicU32; NR_CURSEG], secno: u32) -> bool {
    cursegs
        .iter()
        .any(|c| geometry.secno(c.load(Ordering::Acquire)) == secno)
}

/// Scans the dirty maps for the cheapest victim.
///
/// Called for garbage collection and for SSR segment selection alike; the
/// caller holds the sentry lock, and the segment-list state is borrowed
/// exclusively for the duration of the scan. On success with LFS
/// allocation, the whole section is claimed in the victim map of
/// `gc_kind` and the section-aligned segment number is returned.
pub(crate) fn get_victim(
    geometry: &Geometry,
    config: &GcConfig,
    sit: &mut SitInfo,
    dirty: &mut DirtySeglistInfo,
    cursegs: &[AtomicU32; NR_CURSEG],
    gc_kind: GcKind,
    target: TargetType,
) -> Option<SegNo> {
    let selection = dirty.selection;
    let mut p = select_policy(geometry, sit, selection, gc_kind, target);

    p.min_segno = None;
    p.min_cost = max_cost(geometry, &p);

    let mut nsearched = 0usize;

    'scan: {
        if p.alloc_mode == AllocMode::Lfs && gc_kind == GcKind::Foreground {
            p.min_segno = check_bg_victims(dirty);
            if p.min_segno.is_some() {
                log::trace!("inherited background victim {:?}", p.min_segno);
                break 'scan;
            }
        }

        loop {
            let map = &dirty.dirty_segmap[p.dirty_type as usize];
            let segno = match map
                .get(p.offset as usize..)
                .and_then(|rest| rest.first_one())
            {
                Some(rel) => p.offset + rel as u32,
                None => {
                    if sit.last_victim[p.gc_mode as usize] != 0 {
                        sit.last_victim[p.gc_mode as usize] = 0;
                        p.offset = 0;
                        continue;
                    }
                    break;
                }
            };

            p.offset = ((segno >> p.log_ofs_unit) << p.log_ofs_unit) + (1 << p.log_ofs_unit);

            if dirty.is_victim(segno, GcKind::Foreground) {
                continue;
            }
            if gc_kind == GcKind::Background && dirty.is_victim(segno, GcKind::Background) {
                continue;
            }
            if is_cur_sec(geometry, cursegs, geometry.secno(segno)) {
                continue;
            }

            let cost = if selection == VictimSelection::FirstFit {
                0
            } else {
                gc_cost(geometry, sit, segno, &p)
            };

            if p.min_cost > cost {
                p.min_segno = Some(segno);
                p.min_cost = cost;
            }

            if selection == VictimSelection::FirstFit {
                sit.last_victim[p.gc_mode as usize] = p.offset % geometry.total_segs;
                break;
            }

            if cost == max_cost(geometry, &p) {
                continue;
            }

            nsearched += 1;
            if nsearched >= config.max_victim_search {
                sit.last_victim[p.gc_mode as usize] = segno;
                break;
            }
        }
    }

    let min_segno = p.min_segno?;
    let result = (min_segno >> p.log_ofs_unit) << p.log_ofs_unit;

    if p.alloc_mode == AllocMode::Lfs {
        for i in 0..(1 << p.log_ofs_unit) {
            dirty.set_victim(result + i, gc_kind);
        }
    }

    log::debug!(
        "victim segment {result} ({gc_kind:?}, {:?}, cost {})",
        p.gc_mode,
        p.min_cost,
    );

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn setup(geo: &Geometry) -> (GcConfig, SitInfo, DirtySeglistInfo, [AtomicU32; NR_CURSEG]) {
        let config = GcConfig::default();
        let sit = SitInfo::new(geo);
        let dirty = DirtySeglistInfo::new(geo);
        // park the cursegs far away
        let cursegs = std::array::from_fn(|i| AtomicU32::new(geo.total_segs - 1 - i as u32));
        (config, sit, dirty, cursegs)
    }

    fn dirty_seg(sit: &mut SitInfo, dirty: &mut DirtySeglistInfo, segno: SegNo, valid: u32, mtime: u64) {
        for off in 0..valid {
            sit.set_valid(segno, off, mtime).expect("in range");
        }
        sit.entry_mut(segno).expect("in range").mtime = mtime;
        dirty.insert_dirty(segno, DirtyType::WarmData);
    }

    #[test]
    fn empty_dirty_map_yields_nothing() {
        let geo = Geometry::new(4, 0, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Background,
            TargetType::NoCheck,
        );
        assert_eq!(None, victim);
    }

    #[test]
    fn greedy_picks_fewest_valid_blocks() {
        let geo = Geometry::new(4, 0, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        dirty_seg(&mut sit, &mut dirty, 3, 12, 10);
        dirty_seg(&mut sit, &mut dirty, 7, 2, 10);
        dirty_seg(&mut sit, &mut dirty, 9, 8, 10);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Foreground,
            TargetType::NoCheck,
        );
        assert_eq!(Some(7), victim);
    }

    #[test]
    fn cb_prefers_old_sparse_sections() {
        let geo = Geometry::new(4, 0, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        // young and full vs old and sparse
        dirty_seg(&mut sit, &mut dirty, 2, 14, 1000);
        dirty_seg(&mut sit, &mut dirty, 5, 2, 10);
        sit.observe_mtime(10);
        sit.observe_mtime(1000);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Background,
            TargetType::NoCheck,
        );
        assert_eq!(Some(5), victim);
    }

    #[test]
    fn foreground_inherits_background_claim() {
        let geo = Geometry::new(4, 0, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        dirty_seg(&mut sit, &mut dirty, 4, 4, 10);
        dirty_seg(&mut sit, &mut dirty, 8, 1, 10);

        let bg = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Background,
            TargetType::NoCheck,
        )
        .expect("has dirty segments");
        assert!(dirty.is_victim(bg, GcKind::Background));

        // the foreground fast path pops the claim and re-tags it FG
        let fg = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Foreground,
            TargetType::NoCheck,
        );
        assert_eq!(Some(bg), fg);
        assert!(!dirty.is_victim(bg, GcKind::Background));
        assert!(dirty.is_victim(bg, GcKind::Foreground));
    }

    #[test]
    fn curseg_section_is_never_a_victim() {
        let geo = Geometry::new(4, 1, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        // segment 0 is dirty and minimal, but its section sibling is a curseg
        dirty_seg(&mut sit, &mut dirty, 0, 1, 10);
        cursegs[0].store(1, Ordering::Release);

        dirty_seg(&mut sit, &mut dirty, 4, 9, 10);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Foreground,
            TargetType::NoCheck,
        );
        assert_eq!(Some(4), victim);
    }

    #[test]
    fn lfs_claims_the_whole_section() {
        let geo = Geometry::new(4, 1, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        dirty_seg(&mut sit, &mut dirty, 7, 3, 10);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Background,
            TargetType::NoCheck,
        )
        .expect("has dirty segments");

        // section-aligned result, both segments claimed
        assert_eq!(6, victim);
        assert!(dirty.is_victim(6, GcKind::Background));
        assert!(dirty.is_victim(7, GcKind::Background));
    }

    #[test]
    fn ssr_uses_ckpt_valid_blocks_per_segment() {
        let geo = Geometry::new(4, 1, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        dirty_seg(&mut sit, &mut dirty, 2, 5, 10);
        dirty_seg(&mut sit, &mut dirty, 3, 5, 10);
        sit.entry_mut(2).expect("in range").ckpt_valid_blocks = 9;
        sit.entry_mut(3).expect("in range").ckpt_valid_blocks = 4;

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Background,
            TargetType::Ssr(SegType::WarmData),
        );

        // per-segment granularity: no section alignment, no victim claim
        assert_eq!(Some(3), victim);
        assert!(!dirty.is_victim(3, GcKind::Background));
    }

    #[test]
    fn bounded_search_saves_resume_point() {
        let geo = Geometry::new(4, 0, 64);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);
        let config = config.max_victim_search(4);

        for segno in 0..16 {
            dirty_seg(&mut sit, &mut dirty, segno, 8, 10);
        }
        // cheaper victim beyond the search bound stays undiscovered
        dirty_seg(&mut sit, &mut dirty, 40, 1, 10);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Foreground,
            TargetType::NoCheck,
        );
        assert_eq!(Some(0), victim);
        assert_eq!(3, sit.last_victim[GcMode::Greedy as usize]);
    }

    #[test]
    fn scan_rewinds_once_from_resume_point() {
        let geo = Geometry::new(4, 0, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);

        dirty_seg(&mut sit, &mut dirty, 2, 3, 10);
        sit.last_victim[GcMode::Greedy as usize] = 20;

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Foreground,
            TargetType::NoCheck,
        );
        assert_eq!(Some(2), victim);
    }

    #[test]
    fn first_fit_ignores_cost() {
        let geo = Geometry::new(4, 0, 32);
        let (config, mut sit, mut dirty, cursegs) = setup(&geo);
        dirty.selection = VictimSelection::FirstFit;

        dirty_seg(&mut sit, &mut dirty, 3, 15, 10);
        dirty_seg(&mut sit, &mut dirty, 9, 1, 10);

        let victim = get_victim(
            &geo,
            &config,
            &mut sit,
            &mut dirty,
            &cursegs,
            GcKind::Background,
            TargetType::NoCheck,
        );
        assert_eq!(Some(3), victim);
    }

    #[test]
    fn cb_cost_is_monotone() {
        let geo = Geometry::new(4, 0, 32);
        let (_config, mut sit, mut dirty, _cursegs) = setup(&geo);

        sit.observe_mtime(0);
        sit.observe_mtime(1000);

        // lower utilization must not cost more, age fixed
        dirty_seg(&mut sit, &mut dirty, 1, 12, 500);
        dirty_seg(&mut sit, &mut dirty, 2, 4, 500);
        let dense = cb_cost(&geo, &mut sit, 1);
        let sparse = cb_cost(&geo, &mut sit, 2);
        assert!(sparse <= dense);

        // higher age must not cost more, utilization fixed
        dirty_seg(&mut sit, &mut dirty, 3, 4, 900);
        let young = cb_cost(&geo, &mut sit, 3);
        let old = cb_cost(&geo, &mut sit, 2);
        assert!(old <= young);
    }
}
