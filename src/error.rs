// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::geometry::{Ino, SegNo};

/// Represents errors that can occur in the garbage collector
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// A segment number outside the main area was referenced
    SegmentOutOfRange(SegNo),

    /// The referenced inode does not exist (any more)
    NoSuchInode(Ino),

    /// The summary block of a segment could not be decoded
    SummaryDecode(SegNo),

    /// No free segment was left for an append allocation, and no
    /// slack-space-reuse candidate could be found either
    OutOfSpace,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::SegmentOutOfRange(_)
            | Self::NoSuchInode(_)
            | Self::SummaryDecode(_)
            | Self::OutOfSpace => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Garbage collector result
pub type Result<T> = std::result::Result<T, Error>;
