// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    error::{Error, Result},
    geometry::{Geometry, Nid, SegNo},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::sync::Mutex;

/// On-disk size of one summary entry: nid (4) + version (1) + ofs_in_node (2)
pub const SUMMARY_SIZE: usize = 7;

/// Discriminates what a segment's summary block describes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SumType {
    /// The segment holds node blocks
    Node,

    /// The segment holds data blocks
    Data,
}

impl From<SumType> for u8 {
    fn from(value: SumType) -> Self {
        match value {
            SumType::Node => 1,
            SumType::Data => 2,
        }
    }
}

impl TryFrom<u8> for SumType {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Node),
            2 => Ok(Self::Data),
            _ => Err(()),
        }
    }
}

/// Back-pointer from a block to its owning node.
///
/// For a data block, `(nid, ofs_in_node)` names the dnode slot that points
/// at it, and `version` is the node version at write time. For a node block,
/// only `nid` is meaningful.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Owning node ID
    pub nid: Nid,

    /// Node version at the time the block was written
    pub version: u8,

    /// Slot inside the owning node
    pub ofs_in_node: u16,
}

impl Summary {
    pub(crate) fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.nid)?;
        writer.write_u8(self.version)?;
        writer.write_u16::<LittleEndian>(self.ofs_in_node)?;
        Ok(())
    }

    pub(crate) fn decode_from<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        let nid = reader.read_u32::<LittleEndian>()?;
        let version = reader.read_u8()?;
        let ofs_in_node = reader.read_u16::<LittleEndian>()?;

        Ok(Self {
            nid,
            version,
            ofs_in_node,
        })
    }
}

/// Decoded summary block of one segment: a footer type tag plus one entry
/// per block offset
#[derive(Clone, Debug)]
pub struct SummaryBlock {
    /// Whether this summarizes a node or a data segment
    pub sum_type: SumType,

    /// One entry per block offset in the segment
    pub entries: Vec<Summary>,
}

/// In-memory summary area (SSA).
///
/// Holds the raw little-endian summary block of every segment. Blocks are
/// written entry-wise by the allocator and decoded as a whole when a victim
/// is evacuated. A segment that was never opened for writes has no type tag
/// yet; reading it is the unrecoverable-summary error path.
pub struct SsaStore {
    blocks: Vec<Mutex<Box<[u8]>>>,
    blocks_per_seg: usize,
}

impl SsaStore {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        let blocks_per_seg = geometry.blocks_per_seg() as usize;
        let raw_len = 1 + blocks_per_seg * SUMMARY_SIZE;

        let blocks = (0..geometry.total_segs)
            .map(|_| Mutex::new(vec![0u8; raw_len].into_boxed_slice()))
            .collect();

        Self {
            blocks,
            blocks_per_seg,
        }
    }

    fn block(&self, segno: SegNo) -> Result<&Mutex<Box<[u8]>>> {
        self.blocks
            .get(segno as usize)
            .ok_or(Error::SegmentOutOfRange(segno))
    }

    /// Tags a segment's summary block when the segment is opened for appends.
    pub(crate) fn set_type(&self, segno: SegNo, sum_type: SumType) -> Result<()> {
        let mut raw = self.block(segno)?.lock().expect("lock is poisoned");

        if let Some(footer) = raw.first_mut() {
            *footer = u8::from(sum_type);
        }

        Ok(())
    }

    /// Records the summary of a freshly written block.
    pub(crate) fn write_entry(&self, segno: SegNo, off: u32, summary: &Summary) -> Result<()> {
        let mut raw = self.block(segno)?.lock().expect("lock is poisoned");

        let start = 1 + off as usize * SUMMARY_SIZE;
        let mut slot = raw
            .get_mut(start..start + SUMMARY_SIZE)
            .ok_or(Error::SegmentOutOfRange(segno))?;

        summary
            .encode_into(&mut slot)
            .map_err(|_| Error::SummaryDecode(segno))?;

        Ok(())
    }

    /// Reads and decodes the full summary block of a segment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the segment is out of range or its summary block
    /// carries no valid type tag.
    pub fn read_block(&self, segno: SegNo) -> Result<SummaryBlock> {
        let raw = self.block(segno)?.lock().expect("lock is poisoned");

        let sum_type = raw
            .first()
            .copied()
            .and_then(|footer| SumType::try_from(footer).ok())
            .ok_or(Error::SummaryDecode(segno))?;

        let mut cursor = raw.get(1..).unwrap_or_default();
        let mut entries = Vec::with_capacity(self.blocks_per_seg);

        for _ in 0..self.blocks_per_seg {
            let entry =
                Summary::decode_from(&mut cursor).map_err(|_| Error::SummaryDecode(segno))?;
            entries.push(entry);
        }

        Ok(SummaryBlock { sum_type, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn summary_codec_round_trip() {
        let summary = Summary {
            nid: 0xDEAD_0042,
            version: 7,
            ofs_in_node: 913,
        };

        let mut bytes = vec![];
        summary.encode_into(&mut bytes).expect("should encode");
        assert_eq!(SUMMARY_SIZE, bytes.len());

        // little-endian nid
        assert_eq!(&[0x42, 0x00, 0xAD, 0xDE], &bytes[0..4]);

        let decoded = Summary::decode_from(&mut &bytes[..]).expect("should decode");
        assert_eq!(summary, decoded);
    }

    #[test]
    fn untagged_segment_is_unreadable() {
        let geo = Geometry::new(2, 0, 4);
        let ssa = SsaStore::new(&geo);

        assert!(matches!(
            ssa.read_block(0),
            Err(Error::SummaryDecode(0))
        ));

        ssa.set_type(0, SumType::Data).expect("in range");
        let block = ssa.read_block(0).expect("tagged now");
        assert_eq!(SumType::Data, block.sum_type);
        assert_eq!(4, block.entries.len());
    }

    #[test]
    fn entries_land_at_their_offset() {
        let geo = Geometry::new(2, 0, 4);
        let ssa = SsaStore::new(&geo);
        ssa.set_type(2, SumType::Node).expect("in range");

        let summary = Summary {
            nid: 77,
            version: 1,
            ofs_in_node: 0,
        };
        ssa.write_entry(2, 3, &summary).expect("in range");

        let block = ssa.read_block(2).expect("tagged");
        assert_eq!(77, block.entries[3].nid);
        assert_eq!(0, block.entries[0].nid);
    }

    #[test]
    fn out_of_range_segment() {
        let geo = Geometry::new(2, 0, 4);
        let ssa = SsaStore::new(&geo);

        assert!(matches!(
            ssa.read_block(99),
            Err(Error::SegmentOutOfRange(99))
        ));
    }
}
