//! # MPEG-2 Packetized Elementary Streams (PES)
//!
//! These packets are nested inside the MPEG-2 Program Stream packets found
//! in a `*.sub` file, or appear on their own in raw "private stream 1"
//! dumps.
//!
//! The parser here is deliberately forgiving.  Truncated rips are common,
//! so a `packet_length` which points past the end of the buffer is clamped
//! instead of rejected.

use nom::bits::{bits, complete::take as take_bits};
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;
use std::fmt;

use super::clock::{decode_timestamp, BitInput};
use crate::errors::{require_len, Result, VobsubError};
use crate::util::BytesFormatter;

/// Start code of a "private stream 1" PES packet, which carries DVD
/// subtitles.
pub const PRIVATE_STREAM_1_START_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xbd];

/// The stream id of "private stream 1".
pub const PRIVATE_STREAM_1: u8 = 0xbd;

/// Bytes up to and including the `header_data_length` field.
pub const PES_FIXED_HEADER_LEN: usize = 9;

/// The range of sub-stream ids used for DVD subtitle tracks.
pub const SUB_PICTURE_STREAM_IDS: std::ops::RangeInclusive<u8> = 0x20..=0x40;

/// Possible combinations of PTS and DTS data which might appear inside a
/// PES header.
///
/// See the [PES header documentation][PES] for details.
///
/// [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PtsDtsFlags {
    /// No time stamps.
    #[default]
    None,
    /// The forbidden `01` value.  Treated like `None`.
    Forbidden,
    /// Presentation Time Stamp only.
    Pts,
    /// Presentation and Decode Time Stamps.
    PtsDts,
}

impl PtsDtsFlags {
    fn from_bits(bits: u8) -> PtsDtsFlags {
        match bits & 0b11 {
            0b10 => PtsDtsFlags::Pts,
            0b11 => PtsDtsFlags::PtsDts,
            0b01 => PtsDtsFlags::Forbidden,
            _ => PtsDtsFlags::None,
        }
    }
}

/// The fixed 9-byte part of a PES header.
#[derive(Debug)]
struct FixedHeader {
    start_code: u32,
    packet_length: u16,
    scrambling_control: u8,
    priority: bool,
    data_alignment_indicator: bool,
    copyright: bool,
    original: bool,
    pts_dts_flags: PtsDtsFlags,
    header_data_length: u8,
}

/// Deserialize a single Boolean flag bit.
fn bool_flag(input: BitInput<'_>) -> IResult<BitInput<'_>, bool> {
    let (input, bit): (_, u8) = take_bits(1usize)(input)?;
    Ok((input, bit == 1))
}

/// The two flag bytes after the packet length.  The `10` marker and the
/// six trailing optional-field flags are skipped; only PTS/DTS matter to
/// us.
#[allow(clippy::type_complexity)]
fn flag_bytes(input: BitInput<'_>)
              -> IResult<BitInput<'_>, (u8, bool, bool, bool, bool, PtsDtsFlags)> {
    let (input, _marker): (_, u8) = take_bits(2usize)(input)?;
    let (input, scrambling_control): (_, u8) = take_bits(2usize)(input)?;
    let (input, priority) = bool_flag(input)?;
    let (input, data_alignment_indicator) = bool_flag(input)?;
    let (input, copyright) = bool_flag(input)?;
    let (input, original) = bool_flag(input)?;
    let (input, pts_dts): (_, u8) = take_bits(2usize)(input)?;
    let (input, _other_flags): (_, u8) = take_bits(6usize)(input)?;
    Ok((input, (scrambling_control, priority, data_alignment_indicator,
                copyright, original, PtsDtsFlags::from_bits(pts_dts))))
}

fn fixed_header(input: &[u8]) -> IResult<&[u8], FixedHeader> {
    let (input, start_code) = be_u32(input)?;
    let (input, packet_length) = be_u16(input)?;
    let (input, (scrambling_control, priority, data_alignment_indicator,
                 copyright, original, pts_dts_flags)) = bits(flag_bytes)(input)?;
    let (input, header_data_length) = be_u8(input)?;
    Ok((input, FixedHeader {
        start_code,
        packet_length,
        scrambling_control,
        priority,
        data_alignment_indicator,
        copyright,
        original,
        pts_dts_flags,
        header_data_length,
    }))
}

/// A [Packetized Elementary Stream][pes] packet.
///
/// [pes]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
#[derive(Clone, PartialEq, Eq)]
pub struct PesPacket {
    /// The start code, including the stream id in the low byte.
    pub start_code: u32,
    /// The stream id (`0xbd` for private stream 1).
    pub stream_id: u8,
    /// Number of bytes following the length field, as declared.
    pub packet_length: u16,
    /// Two-bit scrambling control.
    pub scrambling_control: u8,
    /// PES priority flag.
    pub priority: bool,
    /// Data alignment indicator.
    pub data_alignment_indicator: bool,
    /// Copyright flag.
    pub copyright: bool,
    /// Original-or-copy flag.
    pub original: bool,
    /// Which timestamps are present.
    pub pts_dts_flags: PtsDtsFlags,
    /// Length of the optional header data.
    pub header_data_length: u8,
    /// Presentation Time Stamp, in 90kHz ticks.
    pub presentation_timestamp: Option<u64>,
    /// Decode Time Stamp, in 90kHz ticks.
    pub decode_timestamp: Option<u64>,
    /// Sub-picture stream id for private stream 1, if in `0x20..=0x40`.
    pub sub_picture_stream_id: Option<u8>,
    /// Payload bytes, clamped to what the buffer actually contained.
    pub payload: Vec<u8>,
}

impl PesPacket {
    /// Parse a PES packet starting at the beginning of `buf`.
    ///
    /// Only a buffer too short for the fixed 9-byte header is an error.
    /// Everything after that is best-effort.
    pub fn parse(buf: &[u8]) -> Result<PesPacket> {
        require_len(buf, PES_FIXED_HEADER_LEN)?;
        let header = match fixed_header(buf) {
            Ok((_, header)) => header,
            Err(err) => return Err(VobsubError::Parse(format!("{:?}", err))),
        };
        let stream_id = (header.start_code & 0xff) as u8;
        let hdl = usize::from(header.header_data_length);

        let (presentation_timestamp, decode_timestamp) = match header.pts_dts_flags {
            PtsDtsFlags::Pts => (timestamp_at(buf, PES_FIXED_HEADER_LEN), None),
            PtsDtsFlags::PtsDts => (
                timestamp_at(buf, PES_FIXED_HEADER_LEN),
                timestamp_at(buf, PES_FIXED_HEADER_LEN + 5),
            ),
            PtsDtsFlags::None | PtsDtsFlags::Forbidden => (None, None),
        };

        // Private stream 1 has a sub-stream id byte between the header
        // data and the payload.
        let id_offset = PES_FIXED_HEADER_LEN + hdl;
        let (sub_picture_stream_id, payload_start, overhead) = if stream_id == PRIVATE_STREAM_1 {
            let id = buf.get(id_offset)
                .copied()
                .filter(|id| SUB_PICTURE_STREAM_IDS.contains(id));
            (id, id_offset + 1, 4 + hdl)
        } else {
            (None, id_offset, 3 + hdl)
        };

        let declared = usize::from(header.packet_length).saturating_sub(overhead);
        let available = buf.len().saturating_sub(payload_start);
        if declared > available {
            debug!("PES packet declares {} payload bytes but only {} remain, clamping",
                   declared, available);
        }
        let payload_len = declared.min(available);
        let payload = if payload_len == 0 {
            vec![]
        } else {
            buf[payload_start..payload_start + payload_len].to_vec()
        };

        let packet = PesPacket {
            start_code: header.start_code,
            stream_id,
            packet_length: header.packet_length,
            scrambling_control: header.scrambling_control,
            priority: header.priority,
            data_alignment_indicator: header.data_alignment_indicator,
            copyright: header.copyright,
            original: header.original,
            pts_dts_flags: header.pts_dts_flags,
            header_data_length: header.header_data_length,
            presentation_timestamp,
            decode_timestamp,
            sub_picture_stream_id,
            payload,
        };
        trace!("parsed PES packet {:?}", &packet);
        Ok(packet)
    }

    /// The total number of bytes this packet occupies on disk, according
    /// to its own length field.
    pub fn total_len(&self) -> usize {
        6 + usize::from(self.packet_length)
    }
}

impl fmt::Debug for PesPacket {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PesPacket")
            .field("stream_id", &format_args!("0x{:02x}", self.stream_id))
            .field("packet_length", &self.packet_length)
            .field("pts_dts_flags", &self.pts_dts_flags)
            .field("presentation_timestamp", &self.presentation_timestamp)
            .field("decode_timestamp", &self.decode_timestamp)
            .field("sub_picture_stream_id", &self.sub_picture_stream_id)
            .field("payload", &BytesFormatter(&self.payload))
            .finish()
    }
}

/// Decode the 5-byte timestamp at `offset`, if the buffer is long enough.
fn timestamp_at(buf: &[u8], offset: usize) -> Option<u64> {
    let ts = buf.get(offset..offset + 5).and_then(decode_timestamp);
    if ts.is_none() {
        warn!("PES header announces a timestamp at {} but the buffer ends first", offset);
    }
    ts
}

#[cfg(test)]
const EXAMPLE_PACKET: &[u8] = &[
    0x00, 0x00, 0x01, 0xbd,
    0x00, 0x10,
    0x81,
    0x80, 0x05, 0x21, 0x00, 0xab, 0xe9, 0xc1,
    0x20,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff,
];

#[test]
fn parse_packet() {
    let packet = PesPacket::parse(EXAMPLE_PACKET).unwrap();
    assert_eq!(packet.stream_id, PRIVATE_STREAM_1);
    assert_eq!(packet.packet_length, 0x10);
    assert!(packet.original);
    assert!(!packet.copyright);
    assert_eq!(packet.pts_dts_flags, PtsDtsFlags::Pts);
    assert_eq!(packet.header_data_length, 5);
    assert_eq!(packet.presentation_timestamp, Some(2815200));
    assert_eq!(packet.decode_timestamp, None);
    assert_eq!(packet.sub_picture_stream_id, Some(0x20));
    // The trailing 0xff lies outside `packet_length`.
    assert_eq!(packet.payload, vec![0; 7]);
    assert_eq!(packet.total_len(), 22);
}

#[test]
fn parse_packet_with_pts_and_dts() {
    let input = [
        0x00, 0x00, 0x01, 0xbd,
        0x00, 0x10,
        0x81,
        0xc0, 0x0a,
        0x31, 0x00, 0xab, 0xe9, 0xc1,
        0x11, 0x00, 0x01, 0x00, 0x01,
        0x21,
        0xaa, 0xbb,
    ];
    let packet = PesPacket::parse(&input).unwrap();
    assert_eq!(packet.pts_dts_flags, PtsDtsFlags::PtsDts);
    assert_eq!(packet.presentation_timestamp, Some(2815200));
    assert_eq!(packet.decode_timestamp, Some(0));
    assert_eq!(packet.sub_picture_stream_id, Some(0x21));
    assert_eq!(packet.payload, vec![0xaa, 0xbb]);
}

#[test]
fn truncated_payload_is_clamped() {
    let packet = PesPacket::parse(&EXAMPLE_PACKET[..18]).unwrap();
    assert_eq!(packet.presentation_timestamp, Some(2815200));
    assert_eq!(packet.payload, vec![0; 3]);

    // Cut off in the middle of the PTS: no timestamp, no payload.
    let packet = PesPacket::parse(&EXAMPLE_PACKET[..11]).unwrap();
    assert_eq!(packet.presentation_timestamp, None);
    assert_eq!(packet.sub_picture_stream_id, None);
    assert!(packet.payload.is_empty());
}

#[test]
fn undersized_length_gives_empty_payload() {
    let mut input = EXAMPLE_PACKET.to_vec();
    input[5] = 0x02;
    let packet = PesPacket::parse(&input).unwrap();
    assert!(packet.payload.is_empty());
}

#[test]
fn out_of_range_sub_stream_id_is_ignored() {
    let mut input = EXAMPLE_PACKET.to_vec();
    input[14] = 0x80;
    let packet = PesPacket::parse(&input).unwrap();
    assert_eq!(packet.sub_picture_stream_id, None);
    assert_eq!(packet.payload.len(), 7);
}

#[test]
fn short_header_is_incomplete() {
    for len in 0..PES_FIXED_HEADER_LEN {
        assert!(PesPacket::parse(&EXAMPLE_PACKET[..len]).is_err());
    }
}
