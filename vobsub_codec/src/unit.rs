//! Splitting a `*.sub` byte stream into individual packets.
//!
//! A "stream unit" is either an MPEG-2 pack header followed by a PES
//! packet (the normal `*.sub` layout), or a bare private-stream-1 PES
//! packet (raw elementary stream dumps).

use std::fmt;

use crate::errors::{Result, VobsubError};
use crate::idx::IndexEntry;
use crate::mpeg2::pes::{PesPacket, PRIVATE_STREAM_1, PRIVATE_STREAM_1_START_CODE};
use crate::mpeg2::ps::{PackHeader, PACK_START_CODE};
use crate::util::{be_u16_at, BytesFormatter};

/// What kind of packet a raw block starts with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnitKind {
    Pack,
    PrivateStream1,
}

fn unit_kind(raw: &[u8]) -> Option<UnitKind> {
    if raw.starts_with(&PACK_START_CODE) {
        Some(UnitKind::Pack)
    } else if raw.starts_with(&PRIVATE_STREAM_1_START_CODE) {
        Some(UnitKind::PrivateStream1)
    } else {
        None
    }
}

/// One packet from a `*.sub` stream.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamUnit {
    /// The raw bytes this unit was parsed from.
    pub raw: Vec<u8>,
    /// The pack header, present unless this is a bare PES packet.
    pub pack_header: Option<PackHeader>,
    /// The PES packet carrying the subtitle data.
    pub pes: Option<PesPacket>,
    /// The `*.idx` entry which covers this unit.
    pub index_entry: IndexEntry,
}

impl StreamUnit {
    /// Classify `raw` by its start code and parse it.
    ///
    /// `00 00 01 ba` selects a pack header followed by a PES packet, and
    /// `00 00 01 bd` a bare PES packet.  Anything else, or a buffer too
    /// short for the headers, is an error.
    pub fn parse(raw: &[u8], index_entry: IndexEntry) -> Result<StreamUnit> {
        let (pack_header, pes) = match unit_kind(raw) {
            Some(UnitKind::Pack) => {
                let pack_header = PackHeader::parse(raw)?;
                let pes_start = pack_header.size().min(raw.len());
                let pes = PesPacket::parse(&raw[pes_start..])?;
                (Some(pack_header), pes)
            }
            Some(UnitKind::PrivateStream1) => (None, PesPacket::parse(raw)?),
            None => {
                return Err(VobsubError::Parse(format!(
                    "no pack or PES start code in {:?}", BytesFormatter(raw))));
            }
        };
        Ok(StreamUnit {
            raw: raw.to_owned(),
            pack_header,
            pes: Some(pes),
            index_entry,
        })
    }

    /// The subtitle payload carried by this unit, if any.
    pub fn payload(&self) -> &[u8] {
        self.pes.as_ref().map(|pes| &pes.payload[..]).unwrap_or(&[])
    }

    /// The presentation timestamp of this unit, in 90kHz ticks.
    pub fn presentation_timestamp(&self) -> Option<u64> {
        self.pes.as_ref().and_then(|pes| pes.presentation_timestamp)
    }

    /// The sub-picture stream id of this unit.
    pub fn sub_picture_stream_id(&self) -> Option<u8> {
        self.pes.as_ref().and_then(|pes| pes.sub_picture_stream_id)
    }

    /// Is the PES packet a private-stream-1 packet?
    pub fn is_private_stream_1(&self) -> bool {
        self.pes.as_ref().map_or(false, |pes| pes.stream_id == PRIVATE_STREAM_1)
    }
}

impl fmt::Debug for StreamUnit {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("StreamUnit")
            .field("raw", &BytesFormatter(&self.raw))
            .field("pack_header", &self.pack_header)
            .field("pes", &self.pes)
            .field("index_entry", &self.index_entry)
            .finish()
    }
}

/// An iterator over all the stream units in a `*.sub` buffer.
///
/// Garbage between packets (sector padding, damaged bytes) is skipped by
/// searching for the next start code.  Packets which can't be parsed are
/// logged and skipped.
pub struct StreamUnits<'a> {
    /// The whole input.
    input: &'a [u8],
    /// Where to start searching for the next unit.
    position: usize,
    /// Timing entries from the `*.idx` file, sorted by file position.
    index: &'a [IndexEntry],
}

impl<'a> StreamUnits<'a> {
    /// The offset in the input where the next search will begin.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Find the `*.idx` entry covering `position`.
    fn index_entry_for(&self, position: usize) -> IndexEntry {
        let position = position as u64;
        self.index
            .iter()
            .take_while(|entry| entry.file_position <= position)
            .last()
            .cloned()
            .unwrap_or_else(|| IndexEntry::new(Default::default(), position))
    }

    /// Work out where the unit starting at `start` ends, trusting the
    /// length fields as far as the buffer allows.
    fn unit_end(&self, start: usize, kind: UnitKind) -> usize {
        let rest = &self.input[start..];
        let pes_start = match kind {
            UnitKind::Pack => match PackHeader::parse(rest) {
                Ok(header) => header.size(),
                Err(_) => return self.input.len(),
            },
            UnitKind::PrivateStream1 => 0,
        };
        let length = be_u16_at(rest, (pes_start + 4) as isize);
        match length {
            Some(length) => {
                let end = start + pes_start + 6 + usize::from(length);
                end.min(self.input.len())
            }
            None => self.input.len(),
        }
    }
}

impl<'a> Iterator for StreamUnits<'a> {
    type Item = StreamUnit;

    fn next(&mut self) -> Option<StreamUnit> {
        loop {
            let remaining = self.input.get(self.position..)?;
            let found = remaining
                .windows(4)
                .position(|window| unit_kind(window).is_some());
            let start = match found {
                Some(offset) => self.position + offset,
                None => {
                    trace!("reached end of data");
                    self.position = self.input.len();
                    return None;
                }
            };
            if start != self.position {
                debug!("skipped {} bytes of garbage at 0x{:x}",
                       start - self.position, self.position);
            }

            let kind = unit_kind(&self.input[start..]).unwrap_or(UnitKind::Pack);
            let end = self.unit_end(start, kind);
            match StreamUnit::parse(&self.input[start..end], self.index_entry_for(start)) {
                Ok(unit) => {
                    trace!("stream unit at 0x{:x}..0x{:x}", start, end);
                    self.position = end.max(start + 4);
                    return Some(unit);
                }
                Err(err) => {
                    debug!("skipping unparseable unit at 0x{:x}: {}", start, err);
                    self.position = start + 4;
                }
            }
        }
    }
}

/// Iterate over the stream units in `input`, attaching the matching entry
/// from `index` (which may be empty) to each one.
pub fn stream_units<'a>(input: &'a [u8], index: &'a [IndexEntry]) -> StreamUnits<'a> {
    StreamUnits {
        input,
        position: 0,
        index,
    }
}
