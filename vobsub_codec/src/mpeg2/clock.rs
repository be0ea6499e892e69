//! The 90kHz MPEG-2 system clock, and the bit-packed timestamps built on it.

use nom::bits::{bits, complete::take as take_bits};
use nom::IResult;
use std::fmt;
use std::time::Duration;

/// Input type for `nom` bit-level parsers: a byte slice plus a bit offset.
pub type BitInput<'a> = (&'a [u8], usize);

/// Ticks per second of the MPEG-2 system clock.
pub const CLOCK_HZ: u64 = 90_000;

/// Timestamps are 33 bits wide.
const CLOCK_MASK: u64 = (1 << 33) - 1;

/// This represents the 90kHz, 33-bit [System Time Clock][STC] (STC) and
/// the 9-bit STC extension value, which represents 1/300th of a tick.
///
/// [STC]: http://www.bretl.com/mpeghtml/STC.HTM
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Clock {
    base: u64,
    ext: u16,
}

impl Clock {
    /// Given a 33-bit System Time Clock value, construct a new `Clock`
    /// value.
    pub fn base(stc: u64) -> Clock {
        Clock {
            base: stc & CLOCK_MASK,
            ext: 0,
        }
    }

    /// Return a new `Clock` value, setting the 9-bit extension to the
    /// specified value.
    pub fn with_ext(&self, ext: u16) -> Clock {
        Clock {
            base: self.base,
            ext: ext & 0x1ff,
        }
    }

    /// The 33-bit tick count, without the extension.
    pub fn ticks(&self) -> u64 {
        self.base
    }

    /// Convert a `Clock` value to seconds.
    pub fn to_seconds(&self) -> f64 {
        (self.base as f64 + f64::from(self.ext) / 300.0) / CLOCK_HZ as f64
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = self.to_seconds();
        let h = (s / 3600.0).trunc();
        s %= 3600.0;
        let m = (s / 60.0).trunc();
        s %= 60.0;
        write!(f, "{}:{:02}:{:06.3}", h, m, s)
    }
}

/// Convert 90kHz ticks to a `Duration`, truncating to whole milliseconds.
pub fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_millis(ticks / 90)
}

/// Convert a `Duration` to 90kHz ticks, rounding to the nearest tick.
pub fn duration_to_ticks(duration: Duration) -> u64 {
    (duration.as_secs_f64() * CLOCK_HZ as f64).round() as u64
}

/// Parse a 33-bit `Clock` value with 3 marker bits, consuming 36 bits.
///
/// Marker bits are skipped rather than checked.  Real-world rips get them
/// wrong often enough that rejecting the packet would lose subtitles.
pub fn clock(input: BitInput<'_>) -> IResult<BitInput<'_>, Clock> {
    // Bits 32..30.
    let (input, hi): (_, u64) = take_bits(3usize)(input)?;
    let (input, _marker): (_, u8) = take_bits(1usize)(input)?;
    // Bits 29..15.
    let (input, mid): (_, u64) = take_bits(15usize)(input)?;
    let (input, _marker): (_, u8) = take_bits(1usize)(input)?;
    // Bits 14..0.
    let (input, lo): (_, u64) = take_bits(15usize)(input)?;
    let (input, _marker): (_, u8) = take_bits(1usize)(input)?;
    Ok((input, Clock::base(hi << 30 | mid << 15 | lo)))
}

/// Parse a 33-bit `Clock` value plus a 9-bit extension and 4 marker bits,
/// consuming 46 bits.
pub fn clock_and_ext(input: BitInput<'_>) -> IResult<BitInput<'_>, Clock> {
    let (input, clock) = clock(input)?;
    let (input, ext): (_, u16) = take_bits(9usize)(input)?;
    let (input, _marker): (_, u8) = take_bits(1usize)(input)?;
    Ok((input, clock.with_ext(ext)))
}

/// A 4-bit prefix followed by a `clock`, as found in PES headers.
fn timestamp_field(input: BitInput<'_>) -> IResult<BitInput<'_>, Clock> {
    let (input, _prefix): (_, u8) = take_bits(4usize)(input)?;
    clock(input)
}

/// Decode a 5-byte PES timestamp field into 90kHz ticks.  Returns `None`
/// if fewer than 5 bytes are available.
pub fn decode_timestamp(field: &[u8]) -> Option<u64> {
    let parsed: IResult<&[u8], Clock> = bits(timestamp_field)(field);
    parsed.ok().map(|(_, clock)| clock.ticks())
}

/// Pack a 33-bit timestamp into the 5-byte PES layout:
/// `pppp xxx1 xxxxxxxx xxxxxxx1 xxxxxxxx xxxxxxx1`, where `pppp` is the
/// 4-bit `prefix` (`0b0010` for a lone PTS).
pub fn encode_timestamp(prefix: u8, ticks: u64) -> [u8; 5] {
    let ticks = ticks & CLOCK_MASK;
    let hi = (ticks >> 30) as u8;
    let mid = ((ticks >> 15) & 0x7fff) as u16;
    let lo = (ticks & 0x7fff) as u16;
    [
        (prefix & 0x0f) << 4 | hi << 1 | 1,
        (mid >> 7) as u8,
        ((mid & 0x7f) as u8) << 1 | 1,
        (lo >> 7) as u8,
        ((lo & 0x7f) as u8) << 1 | 1,
    ]
}

#[test]
fn parse_clock() {
    assert_eq!(clock((&[0x44, 0x02, 0xc4, 0x82, 0x04][..], 2)),
               Ok(((&[0x04][..], 6),
                   Clock::base(0b_000_000000001011000_001000001000000))));
    assert_eq!(clock_and_ext((&[0x44, 0x02, 0xc4, 0x82, 0x04, 0xa9][..], 2)),
               Ok(((&[][..], 0),
                   Clock::base(0b_000_000000001011000_001000001000000)
                       .with_ext(0b001010100))));
}

#[test]
fn decode_known_pts() {
    assert_eq!(decode_timestamp(&[0x21, 0x00, 0xab, 0xe9, 0xc1]), Some(2815200));
    assert_eq!(decode_timestamp(&[0x21, 0x00, 0xab, 0xe9]), None);
}

#[test]
fn encode_known_pts() {
    assert_eq!(encode_timestamp(0b0010, 2815200), [0x21, 0x00, 0xab, 0xe9, 0xc1]);
    assert_eq!(encode_timestamp(0b0010, 0), [0x21, 0x00, 0x01, 0x00, 0x01]);
}

#[test]
fn corrupt_marker_bits_are_ignored() {
    // Same as `decode_known_pts`, but with every marker bit cleared.
    assert_eq!(decode_timestamp(&[0x20, 0x00, 0xaa, 0xe9, 0xc0]), Some(2815200));
}

#[test]
fn display_clock() {
    assert_eq!(Clock::base(90_000 * 3661 + 45_000).to_string(), "1:01:01.500");
}
