//! Read and write files in `*.idx` format.

use image::Rgb;
use lazy_static::lazy_static;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, digit1, hex_digit1, space0};
use nom::combinator::map_res;
use nom::multi::separated_list1;
use nom::sequence::{delimited, tuple};
use nom::IResult;
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{IResultExt, Result, VobsubError};
use crate::spu::DecodeOptions;
use crate::sub::{subtitles, Subtitles};
use crate::util::idx_timestamp;

/// The first line of every `*.idx` file.
pub const IDX_MAGIC: &str = "# VobSub index file";

/// One `timestamp: ..., filepos: ...` line of an `*.idx` file.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    /// When the subtitle at `file_position` should start.
    pub start_time: Duration,
    /// Byte offset of the subtitle's first packet in the `*.sub` file.
    pub file_position: u64,
}

impl IndexEntry {
    /// Create a new index entry.
    pub fn new(start_time: Duration, file_position: u64) -> IndexEntry {
        IndexEntry {
            start_time,
            file_position,
        }
    }

    /// Format this entry the way it appears in an `*.idx` file, without a
    /// trailing newline.
    pub fn to_idx_line(&self) -> String {
        format!("timestamp: {}, filepos: {:09x}",
                idx_timestamp(self.start_time.as_millis() as u64),
                self.file_position)
    }
}

/// The 16-color pallette used by the subtitles.
pub type Palette = [Rgb<u8>; 16];

/// The palette most DVD authoring tools fall back on.
pub const DEFAULT_PALETTE: Palette = [
    Rgb([0x00, 0x00, 0x00]), Rgb([0xf0, 0xf0, 0xf0]),
    Rgb([0xcc, 0xcc, 0xcc]), Rgb([0x99, 0x99, 0x99]),
    Rgb([0x33, 0x33, 0xfa]), Rgb([0x11, 0x11, 0xbb]),
    Rgb([0xfa, 0x33, 0x33]), Rgb([0xbb, 0x11, 0x11]),
    Rgb([0x33, 0xfa, 0x33]), Rgb([0x11, 0xbb, 0x11]),
    Rgb([0xfa, 0xfa, 0x33]), Rgb([0xbb, 0xbb, 0x11]),
    Rgb([0xfa, 0x33, 0xfa]), Rgb([0xbb, 0x11, 0xbb]),
    Rgb([0x33, 0xfa, 0xfa]), Rgb([0x11, 0xbb, 0xbb]),
];

/// Parse a single byte hexadecimal byte.
fn hex_u8(input: &str) -> IResult<&str, u8> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
            |hex: &str| u8::from_str_radix(hex, 16))(input)
}

/// Parse a 3-byte hexadecimal RGB color.
fn rgb(input: &str) -> IResult<&str, Rgb<u8>> {
    let (input, (r, g, b)) = tuple((hex_u8, hex_u8, hex_u8))(input)?;
    Ok((input, Rgb([r, g, b])))
}

#[test]
fn parse_rgb() {
    assert_eq!(rgb("1234ab"), Ok(("", Rgb([0x12, 0x34, 0xab]))));
    assert!(rgb("12x4ab").is_err());
}

fn palette(input: &str) -> IResult<&str, Palette> {
    map_res(separated_list1(delimited(space0, char(','), space0), rgb),
            |vec: Vec<Rgb<u8>>| {
                if vec.len() != 16 {
                    return Err(format!("palettes must have 16 entries, found {}", vec.len()));
                }
                let mut result = DEFAULT_PALETTE;
                result.copy_from_slice(&vec);
                Ok(result)
            })(input)
}

#[test]
fn parse_palette() {
    let input = "\
000000, f0f0f0, cccccc, 999999, 3333fa, 1111bb, fa3333, bb1111, \
33fa33, 11bb11, fafa33, bbbb11, fa33fa, bb11bb, 33fafa, 11bbbb";
    assert_eq!(palette(input), Ok(("", DEFAULT_PALETTE)));
    assert!(palette("000000, f0f0f0").is_err());
}

/// Parse an unsigned decimal number.
fn decimal(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |digits: &str| digits.parse::<u64>())(input)
}

/// Parse the value of a `timestamp:` line, which looks like
/// `00:00:01:000, filepos: 000000000`.
fn timestamp_entry(input: &str) -> IResult<&str, IndexEntry> {
    let (input, (h, _, m, _, s, _, ms)) = tuple((
        decimal, char(':'), decimal, char(':'), decimal, char(':'), decimal,
    ))(input)?;
    let (input, _) = tuple((char(','), space0, tag("filepos:"), space0))(input)?;
    let (input, file_position) =
        map_res(hex_digit1, |hex: &str| u64::from_str_radix(hex, 16))(input)?;
    let millis = ((h * 60 + m) * 60 + s) * 1000 + ms;
    Ok((input, IndexEntry::new(Duration::from_millis(millis), file_position)))
}

#[test]
fn parse_timestamp_entry() {
    assert_eq!(timestamp_entry("00:00:49:400, filepos: 000000000"),
               Ok(("", IndexEntry::new(Duration::from_millis(49_400), 0))));
    assert_eq!(timestamp_entry("01:02:03:004, filepos: 00000a800"),
               Ok(("", IndexEntry::new(Duration::from_millis(3_723_004), 0xa800))));
}

/// Parse a `size:` value like `720x480`.
fn frame_size(input: &str) -> IResult<&str, (u32, u32)> {
    let (input, (w, _, h)) = tuple((decimal, char('x'), decimal))(input)?;
    Ok((input, (w as u32, h as u32)))
}

/// The parts of an `*.idx` file that we understand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexText {
    /// The original frame size, if specified.
    pub size: Option<(u32, u32)>,
    /// The DVD palette.
    pub palette: Palette,
    /// The language code from the `id:` line.
    pub language: Option<String>,
    /// One entry per subtitle, in file order.
    pub entries: Vec<IndexEntry>,
}

impl IndexText {
    /// Parse the textual contents of an `*.idx` file.
    pub fn parse(text: &str) -> Result<IndexText> {
        lazy_static! {
            static ref KEY_VALUE: Regex =
                Regex::new("^([A-Za-z/ ]+): (.*)").unwrap();
        }

        let mut size = None;
        let mut palette_val = None;
        let mut language = None;
        let mut entries = vec![];

        for line in text.lines() {
            let cap = match KEY_VALUE.captures(line) {
                Some(cap) => cap,
                None => continue,
            };
            let (key, val) = match (cap.get(1), cap.get(2)) {
                (Some(key), Some(val)) => (key.as_str(), val.as_str().trim()),
                _ => continue,
            };
            match key {
                "size" => size = Some(frame_size(val).to_vobsub_result()?),
                "palette" => palette_val = Some(palette(val).to_vobsub_result()?),
                "id" => {
                    let id = val.split(',').next().unwrap_or("").trim();
                    if !id.is_empty() {
                        language = Some(id.to_owned());
                    }
                }
                "timestamp" => match timestamp_entry(val).ignore_trailing_data() {
                    Ok((_, entry)) => entries.push(entry),
                    Err(err) => warn!("skipping bad idx timestamp {:?}: {:?}", val, err),
                },
                _ => trace!("Unimplemented idx key: {}", key),
            }
        }

        Ok(IndexText {
            size,
            palette: palette_val.ok_or(VobsubError::MissingKey("palette"))?,
            language,
            entries,
        })
    }
}

#[test]
fn parse_index_text() {
    let text = "\
# VobSub index file, v7 (do not modify this line!)
size: 720x480
palette: 000000, f0f0f0, cccccc, 999999, 3333fa, 1111bb, fa3333, bb1111, \
33fa33, 11bb11, fafa33, bbbb11, fa33fa, bb11bb, 33fafa, 11bbbb
# English
id: en, index: 0
timestamp: 00:00:01:000, filepos: 000000000
timestamp: 00:00:04:250, filepos: 000000800
";
    let idx = IndexText::parse(text).unwrap();
    assert_eq!(idx.size, Some((720, 480)));
    assert_eq!(idx.palette[15], Rgb([0x11, 0xbb, 0xbb]));
    assert_eq!(idx.language.as_deref(), Some("en"));
    assert_eq!(idx.entries, vec![
        IndexEntry::new(Duration::from_millis(1000), 0),
        IndexEntry::new(Duration::from_millis(4250), 0x800),
    ]);
}

#[test]
fn missing_palette_is_an_error() {
    match IndexText::parse("size: 720x480\n") {
        Err(VobsubError::MissingKey("palette")) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

/// A `*.idx` file describing the subtitles in a `*.sub` file.
#[derive(Debug)]
pub struct Index {
    /// Everything we parsed from the text file.
    text: IndexText,
    /// Our compressed subtitle data.
    sub_data: Vec<u8>,
}

impl Index {
    /// Open an `*.idx` file and the associated `*.sub` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Index> {
        let path = path.as_ref();
        let mut sub_path = path.to_owned();
        sub_path.set_extension("sub");

        let text = fs::read_to_string(path).map_err(VobsubError::io(path))?;
        let sub_data = fs::read(&sub_path).map_err(VobsubError::io(&sub_path))?;
        Index::from_parts(&text, sub_data)
    }

    /// Build an `Index` from `*.idx` text and `*.sub` bytes already in
    /// memory.
    pub fn from_parts(idx_text: &str, sub_data: Vec<u8>) -> Result<Index> {
        let text = IndexText::parse(idx_text)?;
        debug!("idx has {} timestamps, {} bytes of sub data",
               text.entries.len(), sub_data.len());
        Ok(Index { text, sub_data })
    }

    /// Get the palette associated with this `*.idx` file.
    pub fn palette(&self) -> &Palette {
        &self.text.palette
    }

    /// The original frame size, if the `*.idx` file specified one.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.text.size
    }

    /// The language code of the subtitle track.
    pub fn language(&self) -> Option<&str> {
        self.text.language.as_deref()
    }

    /// The `timestamp:` entries of the `*.idx` file.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.text.entries
    }

    /// The raw `*.sub` data.
    pub fn sub_data(&self) -> &[u8] {
        &self.sub_data
    }

    /// Decoding options which map subtitle colors through this file's
    /// palette.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::default().with_palette(self.text.palette)
    }

    /// Iterate over the subtitles associated with this `*.idx` file.
    pub fn subtitles(&self) -> Subtitles<'_> {
        subtitles(&self.sub_data, &self.text.entries)
    }
}

/// Render the fixed `*.idx` preamble, up to and including the `# Vob/Cell
/// ID` comment.  `timestamp:` lines go after this.
pub fn idx_preamble(size: (u32, u32), palette: &Palette,
                    language_id: &str, language_name: &str) -> String {
    let palette = palette
        .iter()
        .map(|Rgb([r, g, b])| format!("{:02x}{:02x}{:02x}", r, g, b))
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    let lines = [
        "# VobSub index file, v7 (do not modify this line!)",
        "#",
        "# To repair desyncronization, you can insert gaps this way:",
        "# (it usually happens after vob id changes)",
        "#",
        "#\t delay: [sign]hh:mm:ss:ms",
        "#",
        "# Where:",
        "#\t [sign]: +, - (optional)",
        "#\t hh: hours (0 <= hh)",
        "#\t mm/ss: minutes/seconds (0 <= mm/ss <= 59)",
        "#\t ms: milliseconds (0 <= ms <= 999)",
        "#",
        "#\t Note: You can't position a sub before the previous with a negative value.",
        "#",
        "# You can also modify timestamps or delete a few subs you don't like.",
        "# Just make sure they stay in increasing order.",
        "",
        "# Settings",
        "",
        "# Original frame size",
    ];
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    // `write!` to a `String` can't fail.
    let _ = write!(out, "\
size: {w}x{h}

# Origin, relative to the upper-left corner, can be overloaded by aligment
org: 0, 0

# Image scaling (hor,ver), origin is at the upper-left corner or at the alignment coord (x, y)
scale: 100%, 100%

# Alpha blending
alpha: 100%

# Smoothing for very blocky images (use OLD for no filtering)
smooth: OFF

# In millisecs
fadein/out: 50, 50

# Force subtitle placement relative to (org.x, org.y)
align: OFF at LEFT TOP

# For correcting non-progressive desync. (in millisecs or hh:mm:ss:ms)
# Note: Not effective in DirectVobSub, use \"delay: ... \" instead.
time offset: 0

# ON: displays only forced subtitles, OFF: shows everything
forced subs: OFF

# The original palette of the DVD
palette: {palette}

# Custom colors (transp idxs and the four colors)
custom colors: OFF, tridx: 0000, colors: 000000, 000000, 000000, 000000

# Language index in use
langidx: 0

# {name}
id: {id}, index: 0
# Decomment next line to activate alternative name in DirectVobSub / Windows Media Player 6.x
# alt: {name}
# Vob/Cell ID: 1, 1 (PTS: 0)
",
        w = size.0, h = size.1, palette = palette, name = language_name, id = language_id);
    out
}

#[test]
fn preamble_round_trips_through_parser() {
    let text = idx_preamble((720, 480), &DEFAULT_PALETTE, "en", "English");
    assert!(text.starts_with(IDX_MAGIC));
    assert!(text.contains("\nsize: 720x480\n"));
    assert!(text.ends_with("# Vob/Cell ID: 1, 1 (PTS: 0)\n"));
    let parsed = IndexText::parse(&text).unwrap();
    assert_eq!(parsed.size, Some((720, 480)));
    assert_eq!(parsed.palette, DEFAULT_PALETTE);
    assert_eq!(parsed.language.as_deref(), Some("en"));
    assert!(parsed.entries.is_empty());
}

#[test]
fn format_index_entry() {
    let entry = IndexEntry::new(Duration::from_millis(1000), 0);
    assert_eq!(entry.to_idx_line(), "timestamp: 00:00:01:000, filepos: 000000000");
    let entry = IndexEntry::new(Duration::from_millis(61_001), 0x1800);
    assert_eq!(entry.to_idx_line(), "timestamp: 00:01:01:001, filepos: 000001800");
}
