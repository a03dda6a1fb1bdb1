// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{geometry::Ino, inode::Inode};
use std::sync::Arc;

/// Inodes held live across the phases of one data-segment evacuation.
///
/// Pinning between phase 2 and phase 3 keeps the inode from being evicted
/// while its pages wait to be moved. The set stays a handful of entries
/// per evacuation, so the duplicate check is a linear walk.
#[derive(Default)]
pub struct InodePinSet {
    entries: Vec<Arc<Inode>>,
}

impl InodePinSet {
    pub(crate) fn find(&self, ino: Ino) -> Option<Arc<Inode>> {
        self.entries.iter().find(|i| i.ino == ino).cloned()
    }

    /// Pins an inode. Adding an already-pinned inode drops the extra
    /// reference.
    pub(crate) fn add(&mut self, inode: Arc<Inode>) {
        if self.entries.iter().any(|i| i.ino == inode.ino) {
            return;
        }
        self.entries.push(inode);
    }

    /// Releases every pinned inode.
    pub(crate) fn release(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
