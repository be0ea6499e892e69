//! Run-length encoded image format for subtitles.
//!
//! Each pixel is a 2-bit index into the subtitle's four colors.  Codes are
//! built from 4-bit nibbles, and the number of leading zero bits selects
//! how wide a code is:
//!
//! | bits | layout               | run length |
//! |------|----------------------|------------|
//! | 4    | `nncc`               | 1-3        |
//! | 8    | `00nnnncc`           | 4-15       |
//! | 12   | `0000nnnnnncc`       | 16-63      |
//! | 16   | `000000nnnnnnnncc`   | 64-255, or 0 for "rest of line" |
//!
//! Every scan line starts on a byte boundary, so a line which ends on an
//! odd nibble is followed by a padding nibble.

use nom::branch::alt;
use nom::bits::complete::{tag, take};
use nom::combinator::value;
use nom::sequence::preceded;
use nom::IResult;
use safemem::write_bytes;

use crate::mpeg2::clock::BitInput;
use crate::util::BytesFormatter;

/// The dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    /// Width in pixels.
    pub w: usize,
    /// Height in pixels.
    pub h: usize,
}

/// A run-length encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Rle {
    /// The number of times to repeat this value.  A value of 0 indicates that
    /// we should fill to the end of the line.
    cnt: u16,
    /// The value to repeat.  This is 2 bits wide.
    val: u8,
}

/// Parse the count for a `Rle`.
fn count(input: BitInput<'_>) -> IResult<BitInput<'_>, u16> {
    alt((
        // Fill to end of line.
        value(0, tag(0u16, 14usize)),
        // Count for 4-nibble RLE.
        preceded(tag(0u8, 6usize), take(8usize)),
        // Count for 3-nibble RLE.
        preceded(tag(0u8, 4usize), take(6usize)),
        // Count for 2-nibble RLE.
        preceded(tag(0u8, 2usize), take(4usize)),
        // Count for 1-nibble RLE.
        take(2usize),
    ))(input)
}

/// Parse an `Rle`.
fn rle(input: BitInput<'_>) -> IResult<BitInput<'_>, Rle> {
    let (input, cnt) = count(input)?;
    let (input, val) = take(2usize)(input)?;
    Ok((input, Rle { cnt, val }))
}

#[test]
fn read_codes_of_each_width() {
    // 1 nibble: run 1, color 3.  2 nibbles: run 4, color 1.
    // 3 nibbles: run 16, color 2.  4 nibbles: run 64, color 0.
    let data = [0x71, 0x10, 0x42, 0x01, 0x00];
    let mut pos: BitInput<'_> = (&data[..], 0);
    for expected in [Rle { cnt: 1, val: 3 }, Rle { cnt: 4, val: 1 },
                     Rle { cnt: 16, val: 2 }, Rle { cnt: 64, val: 0 }] {
        let (rest, run) = rle(pos).unwrap();
        assert_eq!(run, expected);
        pos = rest;
    }
    assert!(pos.0.is_empty());
    assert!(rle(pos).is_err());
}

#[test]
fn read_rest_of_line_code() {
    let data = [0x00, 0x02];
    let (rest, run) = rle((&data[..], 0)).unwrap();
    assert_eq!(run, Rle { cnt: 0, val: 2 });
    assert!(rest.0.is_empty());
}

/// Decompress one interlaced field of scan lines, starting at `start` in
/// `data`, into every other line of `output` beginning with `first_line`.
///
/// Running out of data simply leaves the remaining lines untouched.
pub fn decompress_field(data: &[u8], start: usize, size: Size, first_line: usize,
                        output: &mut [u8]) {
    let input = data.get(start..).unwrap_or(&[]);
    trace!("field starting at 0x{:x}: {:?}", start, BytesFormatter(input));
    let mut pos: BitInput<'_> = (input, 0);
    let mut x = 0;
    let mut y = first_line;
    while y < size.h {
        let run = match rle(pos) {
            Ok((rest, run)) => {
                pos = rest;
                run
            }
            Err(_) => {
                debug!("RLE data ended at line {} of {}", y, size.h);
                return;
            }
        };
        let remaining = size.w - x;
        let count = if run.cnt == 0 {
            remaining
        } else {
            usize::from(run.cnt).min(remaining)
        };
        let offset = y * size.w + x;
        write_bytes(&mut output[offset..offset + count], run.val);
        x += count;
        if x >= size.w {
            x = 0;
            y += 2;
            // Round up to the next full byte.
            if pos.1 > 0 {
                pos = (&pos.0[1..], 0);
            }
        }
    }
}

/// Decompress a run-length encoded image, and return a vector in row-major
/// order, starting at the upper-left and scanning right and down, with one
/// byte for each 2-bit value.  `starts` gives the offsets of the top
/// (even) and bottom (odd) fields in `data`.
pub fn decompress(size: Size, data: &[u8], starts: [usize; 2]) -> Vec<u8> {
    trace!("decompressing image {:?}, fields at [0x{:x}, 0x{:x}]",
           &size, starts[0], starts[1]);
    let mut img = vec![0; size.w * size.h];
    for (field, &start) in starts.iter().enumerate() {
        decompress_field(data, start, size, field, &mut img);
    }
    img
}

/// Writes RLE codes one nibble at a time.
#[derive(Default)]
struct RleWriter {
    out: Vec<u8>,
    only_half: bool,
}

impl RleWriter {
    fn nibble(&mut self, nibble: u8) {
        if self.only_half {
            if let Some(last) = self.out.last_mut() {
                *last |= nibble & 0x0f;
            }
            self.only_half = false;
        } else {
            self.out.push(nibble << 4);
            self.only_half = true;
        }
    }

    /// Write a single code using the narrowest width that can hold it.
    /// `cnt` must be at most 255; 0 means "rest of line".
    fn write(&mut self, run: Rle) {
        let value = run.cnt << 2 | u16::from(run.val & 0b11);
        let nibbles = match run.cnt {
            1..=3 => 1,
            4..=15 => 2,
            16..=63 => 3,
            _ => 4,
        };
        for i in (0..nibbles).rev() {
            self.nibble(((value >> (4 * i)) & 0x0f) as u8);
        }
    }

    /// Pad to a byte boundary with a zero nibble.
    fn align(&mut self) {
        self.only_half = false;
    }
}

/// Run-length encode one scan line of 2-bit values.
fn compress_line(line: &[u8], writer: &mut RleWriter) {
    let mut x = 0;
    while x < line.len() {
        let val = line[x] & 0b11;
        let run = line[x..].iter().take_while(|&&px| px & 0b11 == val).count();
        if x + run == line.len() && run >= 64 {
            // Costs the same as an explicit 16-bit code, and has no upper
            // limit.
            writer.write(Rle { cnt: 0, val });
        } else {
            let mut left = run;
            while left > 0 {
                let chunk = left.min(255);
                writer.write(Rle { cnt: chunk as u16, val });
                left -= chunk;
            }
        }
        x += run;
    }
    writer.align();
}

/// Compress a row-major image of 2-bit values into two RLE fields: the
/// even scan lines and the odd scan lines.
pub fn compress(size: Size, img: &[u8]) -> [Vec<u8>; 2] {
    let mut fields = [RleWriter::default(), RleWriter::default()];
    for y in 0..size.h {
        let line = &img[y * size.w..(y + 1) * size.w];
        compress_line(line, &mut fields[y % 2]);
    }
    let [top, bottom] = fields;
    [top.out, bottom.out]
}

#[test]
fn compress_picks_narrowest_codes() {
    let mut writer = RleWriter::default();
    compress_line(&[3, 1, 1, 1, 1, 2], &mut writer);
    // run 1 color 3 = 0x7, run 4 color 1 = 0x11, run 1 color 2 = 0x6,
    // then a padding nibble.
    assert_eq!(writer.out, vec![0x71, 0x16]);
}

#[test]
fn compress_long_final_run_as_rest_of_line() {
    let line = vec![1; 300];
    let mut writer = RleWriter::default();
    compress_line(&line, &mut writer);
    assert_eq!(writer.out, vec![0x00, 0x01]);
}

#[test]
fn compress_long_inner_run_in_chunks() {
    let mut line = vec![2; 300];
    line.push(0);
    let mut writer = RleWriter::default();
    compress_line(&line, &mut writer);
    let mut out = vec![0; 301];
    let size = Size { w: 301, h: 1 };
    decompress_field(&writer.out, 0, size, 0, &mut out);
    assert_eq!(out, line);
}

#[test]
fn round_trip_small_image() {
    let size = Size { w: 7, h: 5 };
    let img: Vec<u8> = (0..size.w * size.h).map(|i| ((i * 7 / 3) % 4) as u8).collect();
    let [top, bottom] = compress(size, &img);
    let mut data = top.clone();
    data.extend_from_slice(&bottom);
    assert_eq!(decompress(size, &data, [0, top.len()]), img);
}

#[test]
fn decompress_truncated_field_leaves_background() {
    let size = Size { w: 4, h: 4 };
    // One line of color 1, then nothing.
    let data = [0x11];
    let img = decompress(size, &data, [0, 99]);
    assert_eq!(&img[0..4], &[1, 1, 1, 1]);
    assert!(img[4..].iter().all(|&px| px == 0));
}

#[test]
fn overlong_runs_are_clamped_to_the_line() {
    let size = Size { w: 3, h: 2 };
    // run 15 of color 3, on each field.
    let data = [0x3f, 0x3f];
    let img = decompress(size, &data, [0, 1]);
    assert_eq!(img, vec![3; 6]);
}
