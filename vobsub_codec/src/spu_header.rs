//! `SP` blocks, the framing used by `*.sup` files ripped from DVDs.
//!
//! Each block is a 14-byte header followed by SPU data.  The last four
//! bytes of the header are the SPU's own size and control table words,
//! so the data after the header starts at SPU address 4.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;
use std::time::Duration;

use crate::errors::{require_len, IResultExt, Result};
use crate::mpeg2::clock::ticks_to_duration;
use crate::spu::SpuImage;

/// The size of an `SP` block header.
pub const SP_HEADER_LEN: usize = 14;

/// The identifier at the start of every block.
pub const SP_IDENTIFIER: [u8; 2] = *b"SP";

/// The header of an `SP` block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpuHeader {
    /// Should be `SP`.
    pub identifier: [u8; 2],
    /// When to show the subtitle.
    pub start_time: Duration,
    /// The number of SPU data bytes following this header.
    pub next_block_offset: i32,
    /// Offset of the first display control sequence, relative to the data
    /// following this header.
    pub control_table_offset: i32,
}

/// Raw header fields: identifier, PTS, unused, SPU size, control table.
fn header_fields(input: &[u8]) -> IResult<&[u8], (&[u8], u32, &[u8], u16, u16)> {
    tuple((take(2usize), le_u32, take(4usize), be_u16, be_u16))(input)
}

impl SpuHeader {
    /// Parse the first 14 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<SpuHeader> {
        require_len(buf, SP_HEADER_LEN)?;
        let (identifier, pts, _, size, control_table) =
            header_fields(&buf[..SP_HEADER_LEN]).to_vobsub_result()?;
        Ok(SpuHeader {
            identifier: [identifier[0], identifier[1]],
            start_time: ticks_to_duration(u64::from(pts)),
            next_block_offset: cast::i32(size) - 4,
            control_table_offset: cast::i32(control_table) - 4,
        })
    }

    /// Does this header carry the `SP` identifier?
    pub fn is_sp(&self) -> bool {
        self.identifier == SP_IDENTIFIER
    }

    /// Decode the SPU data which follows this header.
    pub fn image(&self, data: &[u8]) -> SpuImage {
        SpuImage::from_merged_pes(data, self.control_table_offset)
    }
}

/// An iterator over the blocks of an `SP` stream.
pub struct SpBlocks<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Iterator for SpBlocks<'a> {
    type Item = (SpuHeader, SpuImage);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.input.get(self.position..)?;
        if rest.is_empty() {
            return None;
        }
        let header = match SpuHeader::parse(rest) {
            Ok(header) => header,
            Err(err) => {
                debug!("trailing data at 0x{:x}: {}", self.position, err);
                self.position = self.input.len();
                return None;
            }
        };
        if !header.is_sp() {
            warn!("expected SP block at 0x{:x}, found {:?}", self.position, header.identifier);
            self.position = self.input.len();
            return None;
        }
        let len = usize::try_from(header.next_block_offset).unwrap_or(0);
        let data = match rest.get(SP_HEADER_LEN..SP_HEADER_LEN + len) {
            Some(data) => data,
            None => {
                warn!("SP block at 0x{:x} is truncated", self.position);
                self.position = self.input.len();
                return None;
            }
        };
        self.position += SP_HEADER_LEN + len;
        Some((header, header.image(data)))
    }
}

/// Iterate over the `SP` blocks in `input`, stopping at the first block
/// that is missing its identifier or is cut short.
pub fn sp_blocks(input: &[u8]) -> SpBlocks<'_> {
    SpBlocks { input, position: 0 }
}
