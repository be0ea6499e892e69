//! # MPEG-2 Program Streams (PS)
//!
//! This is the container format used at the top-level of a `*.sub` file.
//! Every 2048-byte sector of a well-formed file starts with a 14-byte pack
//! header.

use nom::bits::{bits, complete::take as take_bits};
use nom::bytes::complete::take;
use nom::number::complete::be_u32;
use nom::IResult;
use std::fmt;

use super::clock::{clock_and_ext, BitInput, Clock};
use crate::errors::{require_len, Result};

/// Start code of an MPEG-2 pack header.
pub const PACK_START_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xba];

/// Size of a pack header without stuffing bytes.
pub const PACK_HEADER_LEN: usize = 14;

/// The pack header we write in front of every sector.  Players match on
/// these exact bytes, so we don't compute an SCR or mux rate.
pub const FIXED_PACK_HEADER: [u8; PACK_HEADER_LEN] = [
    0x00, 0x00, 0x01, 0xba, // start code
    0x44, 0x02, 0xc4, 0x82, 0x04, 0xa9, // SCR and SCR extension
    0x01, 0x89, 0xc3, // program mux rate
    0xf8, // reserved, stuffing length 0
];

/// A parsed [MPEG-2 Program Stream header][MPEG-PS] (MPEG-PS).
///
/// [MPEG-PS]: https://en.wikipedia.org/wiki/MPEG_program_stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackHeader {
    /// The first four bytes, normally `0x000001ba`.
    pub start_code: u32,
    /// The 2-bit version tag at the start of byte 4 (`0b01` for MPEG-2).
    pub pack_id: u8,
    /// The System Clock Reference (SCR) and SCR extension field.
    pub scr: Clock,
    /// The bit rate, in units of 50 bytes per second.
    pub program_mux_rate: u64,
    /// Number of stuffing bytes after the header.  Always `<= 7`.
    pub stuffing_length: u8,
}

impl PackHeader {
    /// Parse the 14-byte pack header at the start of `buf`.  Marker bits
    /// and the start code are not validated; use `StreamUnit` to decide
    /// whether a buffer holds a pack header at all.
    pub fn parse(buf: &[u8]) -> Result<PackHeader> {
        require_len(buf, PACK_HEADER_LEN)?;
        match pack_header(buf) {
            Ok((_, header)) => Ok(header),
            // We checked the length above, and every field is a plain bit
            // read, so this can't happen.
            Err(err) => Err(crate::VobsubError::Parse(format!("{:?}", err))),
        }
    }

    /// The number of bytes taken by the header plus its stuffing.
    pub fn size(&self) -> usize {
        PACK_HEADER_LEN + usize::from(self.stuffing_length)
    }
}

impl fmt::Display for PackHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[PS packet @ {}, {} kbps]",
               self.scr, (self.program_mux_rate * 50 * 8) / 1024)
    }
}

/// The bit-packed fields following the start code.
fn pack_fields(input: BitInput<'_>) -> IResult<BitInput<'_>, (u8, Clock, u64, u8)> {
    // MPEG-2 version tag.
    let (input, pack_id): (_, u8) = take_bits(2usize)(input)?;
    // System Clock Reference.
    let (input, scr) = clock_and_ext(input)?;
    let (input, program_mux_rate): (_, u64) = take_bits(22usize)(input)?;
    // Marker bits, then reserved.
    let (input, _markers): (_, u8) = take_bits(2usize)(input)?;
    let (input, _reserved): (_, u8) = take_bits(5usize)(input)?;
    let (input, stuffing_length): (_, u8) = take_bits(3usize)(input)?;
    Ok((input, (pack_id, scr, program_mux_rate, stuffing_length)))
}

/// Parse a Program Stream pack header, not including stuffing.
fn pack_header(input: &[u8]) -> IResult<&[u8], PackHeader> {
    let (input, start_code) = be_u32(input)?;
    let (input, fields) = take(10usize)(input)?;
    let (_, (pack_id, scr, program_mux_rate, stuffing_length)) =
        bits(pack_fields)(fields)?;
    Ok((input, PackHeader {
        start_code,
        pack_id,
        scr,
        program_mux_rate,
        stuffing_length,
    }))
}

#[test]
fn parse_fixed_pack_header() {
    let header = PackHeader::parse(&FIXED_PACK_HEADER).unwrap();
    assert_eq!(header.start_code, 0x0000_01ba);
    assert_eq!(header.pack_id, 0b01);
    assert_eq!(header.scr,
               Clock::base(0b_000_000000001011000_001000001000000)
                   .with_ext(0b001010100));
    assert_eq!(header.program_mux_rate, 0x01_89_c3 >> 2);
    assert_eq!(header.stuffing_length, 0);
    assert_eq!(header.size(), 14);
}

#[test]
fn parse_pack_header_with_stuffing() {
    let mut bytes = FIXED_PACK_HEADER;
    bytes[13] = 0xff;
    let header = PackHeader::parse(&bytes).unwrap();
    assert_eq!(header.stuffing_length, 7);
    assert_eq!(header.size(), 21);
}

#[test]
fn short_pack_header_is_incomplete() {
    assert!(PackHeader::parse(&FIXED_PACK_HEADER[..13]).is_err());
    assert!(PackHeader::parse(&[]).is_err());
}
