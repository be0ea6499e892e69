//! # Writing VobSub subtitles.
//!
//! Each caption is quantized to four colors, run-length encoded into an
//! SPU, and split into 2048-byte sectors laid out like a DVD's VOB files.
//! The `*.idx` text gets one `timestamp:` line per caption.

use byteorder::{BigEndian, WriteBytesExt};
use image::{Rgb, Rgba, RgbaImage};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::errors::{Result, VobsubError};
use crate::idx::{idx_preamble, IndexEntry, Palette, DEFAULT_PALETTE};
use crate::img::compress;
use crate::mpeg2::clock::{duration_to_ticks, encode_timestamp};
use crate::mpeg2::pes::PRIVATE_STREAM_1_START_CODE;
use crate::mpeg2::ps::{FIXED_PACK_HEADER, PACK_HEADER_LEN};
use crate::quantize::{ColorQuantizer, FourColorImage, NearestColorQuantizer};
use crate::spu::{millis_to_delay, Rect};

/// The size of a DVD sector.  Every packet we write fills one.
pub const SECTOR_SIZE: usize = 0x800;

/// PES extension: P-STD buffer flag plus reserved bits, then a 58 kB
/// P-STD buffer.
const PES_EXTENSION: [u8; 3] = [0x1e, 0x60, 0x3a];

/// Flags and header data for the first packet of an SPU: PTS, extension,
/// six bytes of stuffing.
const FIRST_PES_FLAGS: [u8; 3] = [0x81, 0x81, 0x0e];

/// Flags and header data for later packets: extension, five bytes of
/// stuffing.
const NEXT_PES_FLAGS: [u8; 3] = [0x81, 0x01, 0x08];

/// Start code, length, flags, header data and the stream id.
const FIRST_PES_HEADER_LEN: usize = 9 + 14 + 1;
const NEXT_PES_HEADER_LEN: usize = 9 + 8 + 1;

/// Length of the control sequence which shows the image.
const SHOW_SEQUENCE_LEN: usize = 24;

/// Where to put a subtitle on the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Alignment {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl Alignment {
    /// The top-left corner of a `width` x `height` bitmap.  The bottom
    /// margin is also used at the top of the screen.  Bitmaps larger than
    /// the screen get negative coordinates.
    pub fn origin(self, config: &WriterConfig, width: u32, height: u32) -> (i32, i32) {
        use self::Alignment::*;
        let (screen_w, screen_h) = (config.screen_size.0 as i32, config.screen_size.1 as i32);
        let (w, h) = (width as i32, height as i32);
        let side = config.left_right_margin as i32;
        let vertical = config.bottom_margin as i32;
        let x = match self {
            TopLeft | MiddleLeft | BottomLeft => side,
            TopCenter | MiddleCenter | BottomCenter => (screen_w - w) / 2,
            TopRight | MiddleRight | BottomRight => screen_w - w - side,
        };
        let y = match self {
            TopLeft | TopCenter | TopRight => vertical,
            MiddleLeft | MiddleCenter | MiddleRight => (screen_h - h) / 2,
            BottomLeft | BottomCenter | BottomRight => screen_h - h - vertical,
        };
        (x, y)
    }
}

/// When and how to show one subtitle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caption {
    pub start: Duration,
    pub duration: Duration,
    /// Show even when subtitles are turned off.
    pub forced: bool,
    pub alignment: Alignment,
}

/// Settings shared by every caption in a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    /// Width and height of the video.
    pub screen_size: (u32, u32),
    /// Distance from the bottom (or top) of the screen.
    pub bottom_margin: u32,
    /// Distance from the left or right of the screen.
    pub left_right_margin: u32,
    /// Two-letter language code, as in `id: en`.
    pub language_id: String,
    /// Human-readable language name.
    pub language_name: String,
    /// Sub-picture stream id, from `0x20` to `0x40`.
    pub stream_id: u8,
    pub background: Rgba<u8>,
    pub pattern: Rgba<u8>,
    pub emphasis1: Rgba<u8>,
    /// Passed through to the quantizer.
    pub use_custom_colors: bool,
}

impl Default for WriterConfig {
    fn default() -> WriterConfig {
        WriterConfig {
            screen_size: (720, 480),
            bottom_margin: 15,
            left_right_margin: 15,
            language_id: "en".to_owned(),
            language_name: "English".to_owned(),
            stream_id: 0x20,
            background: Rgba([0, 0, 0, 0]),
            pattern: Rgba([255, 255, 255, 255]),
            emphasis1: Rgba([0, 0, 0, 255]),
            use_custom_colors: false,
        }
    }
}

/// Build a complete SPU showing `image` in `area` for `duration`.
pub fn encode_spu(image: &FourColorImage, area: Rect, forced: bool,
                  duration: Duration) -> io::Result<Vec<u8>> {
    let [top, bottom] = compress(image.size, &image.indices);
    let control = 4 + top.len() + bottom.len();
    let total = control + SHOW_SEQUENCE_LEN + 6;
    if total > usize::from(u16::MAX) {
        warn!("SPU of {} bytes is too large, offsets will wrap", total);
    }
    let hide = (control + SHOW_SEQUENCE_LEN) as u16;

    let mut spu = Vec::with_capacity(total);
    spu.write_u16::<BigEndian>(total as u16)?;
    spu.write_u16::<BigEndian>(control as u16)?;
    spu.write_all(&top)?;
    spu.write_all(&bottom)?;

    // Show the image straight away.
    spu.write_u16::<BigEndian>(0)?;
    spu.write_u16::<BigEndian>(hide)?;
    spu.write_u8(if forced { 0x00 } else { 0x01 })?;
    spu.write_all(&[0x03, 0x32, 0x10])?;
    spu.write_all(&[0x04, 0xff, 0xf0])?;
    spu.write_u8(0x05)?;
    spu.write_all(&area.to_display_area())?;
    spu.write_u8(0x06)?;
    spu.write_u16::<BigEndian>(4)?;
    spu.write_u16::<BigEndian>((4 + top.len()) as u16)?;
    spu.write_u8(0xff)?;

    // Hide it after `duration`.  This sequence points at itself.
    spu.write_u16::<BigEndian>(millis_to_delay(duration.as_millis() as u64))?;
    spu.write_u16::<BigEndian>(hide)?;
    spu.write_u8(0x02)?;
    spu.write_u8(0xff)?;
    Ok(spu)
}

/// Split `spu` into sectors.  Only the first packet carries `pts`.
pub fn write_packets<W: Write>(out: &mut W, spu: &[u8], pts: u64, stream_id: u8) -> io::Result<()> {
    let mut rest = spu;
    let mut first = true;
    while first || !rest.is_empty() {
        let header_len = if first { FIRST_PES_HEADER_LEN } else { NEXT_PES_HEADER_LEN };
        let room = SECTOR_SIZE - PACK_HEADER_LEN - header_len;
        let (chunk, remaining) = rest.split_at(rest.len().min(room));

        out.write_all(&FIXED_PACK_HEADER)?;
        out.write_all(&PRIVATE_STREAM_1_START_CODE)?;
        out.write_u16::<BigEndian>((header_len - 6 + chunk.len()) as u16)?;
        let stuffing = if first {
            out.write_all(&FIRST_PES_FLAGS)?;
            out.write_all(&encode_timestamp(0b0010, pts))?;
            6
        } else {
            out.write_all(&NEXT_PES_FLAGS)?;
            5
        };
        out.write_all(&PES_EXTENSION)?;
        io::copy(&mut io::repeat(0xff).take(stuffing), out)?;
        out.write_u8(stream_id)?;
        out.write_all(chunk)?;

        let padding = SECTOR_SIZE - PACK_HEADER_LEN - header_len - chunk.len();
        io::copy(&mut io::repeat(0xff).take(padding as u64), out)?;

        rest = remaining;
        first = false;
    }
    Ok(())
}

/// Accumulates a `*.sub` stream and its `*.idx` entries.
pub struct VobSubWriter<Q = NearestColorQuantizer> {
    config: WriterConfig,
    quantizer: Q,
    sub_data: Vec<u8>,
    entries: Vec<IndexEntry>,
    /// The fourth color picked by the quantizer for the latest caption.
    emphasis2: Option<Rgba<u8>>,
}

impl VobSubWriter {
    /// Create a writer using `NearestColorQuantizer`.
    pub fn new(config: WriterConfig) -> VobSubWriter {
        VobSubWriter::with_quantizer(config, NearestColorQuantizer)
    }
}

impl<Q: ColorQuantizer> VobSubWriter<Q> {
    pub fn with_quantizer(config: WriterConfig, quantizer: Q) -> VobSubWriter<Q> {
        VobSubWriter {
            config,
            quantizer,
            sub_data: vec![],
            entries: vec![],
            emphasis2: None,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Encode `bitmap` and append it to the stream.  Returns the new
    /// `*.idx` entry.
    pub fn write_caption(&mut self, caption: &Caption, bitmap: &RgbaImage) -> Result<IndexEntry> {
        let config = &self.config;
        let four = self.quantizer.quantize(bitmap, config.background, config.pattern,
                                           config.emphasis1, config.use_custom_colors);
        let (x, y) = caption.alignment.origin(config, bitmap.width(), bitmap.height());
        let area = Rect::new(x, y, bitmap.width() as i32 - 1, bitmap.height() as i32 - 1);
        let spu = encode_spu(&four, area, caption.forced, caption.duration)?;

        let entry = IndexEntry::new(caption.start, self.sub_data.len() as u64);
        write_packets(&mut self.sub_data, &spu, duration_to_ticks(caption.start),
                      config.stream_id)?;
        debug!("wrote {}-byte SPU at {:?} as {}", spu.len(), area, entry.to_idx_line());

        self.emphasis2 = Some(four.emphasis2);
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// The `*.sub` data written so far.
    pub fn sub_data(&self) -> &[u8] {
        &self.sub_data
    }

    /// The `*.idx` entries written so far.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The palette for the `*.idx` file: our four colors, then the usual
    /// DVD defaults.
    pub fn palette(&self) -> Palette {
        let config = &self.config;
        let emphasis2 = self.emphasis2.unwrap_or(config.pattern);
        let mut palette = DEFAULT_PALETTE;
        let ours = [config.background, config.pattern, config.emphasis1, emphasis2];
        for (slot, color) in palette.iter_mut().zip(ours.iter()) {
            *slot = Rgb([color[0], color[1], color[2]]);
        }
        palette
    }

    /// The complete `*.idx` file.
    pub fn idx_text(&self) -> String {
        let config = &self.config;
        let mut text = idx_preamble(config.screen_size, &self.palette(),
                                    &config.language_id, &config.language_name);
        for entry in &self.entries {
            text.push_str(&entry.to_idx_line());
            text.push('\n');
        }
        text
    }

    /// Write the `*.idx` file to `idx_path` and the `*.sub` file next to
    /// it.
    pub fn save<P: AsRef<Path>>(&self, idx_path: P) -> Result<()> {
        let idx_path = idx_path.as_ref();
        let sub_path = idx_path.with_extension("sub");
        fs::write(idx_path, self.idx_text()).map_err(VobsubError::io(idx_path))?;
        fs::write(&sub_path, &self.sub_data).map_err(VobsubError::io(&sub_path))?;
        debug!("saved {} subtitles to {}", self.entries.len(), idx_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::Size;
    use crate::mpeg2::pes::PesPacket;

    fn white(size: Size) -> FourColorImage {
        FourColorImage {
            size,
            indices: vec![1; size.w * size.h],
            emphasis2: Rgba([128, 128, 128, 255]),
        }
    }

    #[test]
    fn alignment_origins() {
        let config = WriterConfig::default();
        assert_eq!(Alignment::BottomCenter.origin(&config, 100, 40), (310, 425));
        assert_eq!(Alignment::TopLeft.origin(&config, 100, 40), (15, 15));
        assert_eq!(Alignment::MiddleRight.origin(&config, 100, 40), (605, 220));
        assert_eq!(Alignment::default(), Alignment::BottomCenter);
    }

    #[test]
    fn spu_layout() {
        let area = Rect::new(359, 463, 1, 1);
        let spu = encode_spu(&white(Size { w: 2, h: 2 }), area, false,
                             Duration::from_secs(2)).unwrap();
        assert_eq!(spu.len(), 36);
        assert_eq!(&spu[0..6], &[0x00, 0x24, 0x00, 0x06, 0x90, 0x90]);
        assert_eq!(&spu[6..14], &[0x00, 0x00, 0x00, 0x1e, 0x01, 0x03, 0x32, 0x10]);
        assert_eq!(&spu[14..18], &[0x04, 0xff, 0xf0, 0x05]);
        assert_eq!(&spu[18..24], &area.to_display_area());
        assert_eq!(&spu[24..30], &[0x06, 0x00, 0x04, 0x00, 0x05, 0xff]);
        assert_eq!(&spu[30..], &[0x00, 0xae, 0x00, 0x1e, 0x02, 0xff]);
    }

    #[test]
    fn forced_spu_starts_with_forced_display() {
        let spu = encode_spu(&white(Size { w: 1, h: 1 }), Rect::new(0, 0, 0, 0), true,
                             Duration::from_secs(1)).unwrap();
        let control = usize::from(u16::from_be_bytes([spu[2], spu[3]]));
        assert_eq!(spu[control + 4], 0x00);
    }

    #[test]
    fn single_sector_packet() {
        let mut out = vec![];
        write_packets(&mut out, &[0xab; 10], 90_000, 0x21).unwrap();
        assert_eq!(out.len(), SECTOR_SIZE);
        assert_eq!(&out[..14], &FIXED_PACK_HEADER);
        assert_eq!(&out[14..23], &[0x00, 0x00, 0x01, 0xbd, 0x00, 0x1c, 0x81, 0x81, 0x0e]);
        assert_eq!(&out[23..28], &encode_timestamp(0b0010, 90_000));
        assert_eq!(&out[28..37], &[0x1e, 0x60, 0x3a, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(out[37], 0x21);
        assert_eq!(&out[38..48], &[0xab; 10]);
        assert!(out[48..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn written_headers_parse_back() {
        let spu: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();
        let mut out = vec![];
        write_packets(&mut out, &spu, 123_456, 0x22).unwrap();
        assert_eq!(out.len(), 2 * SECTOR_SIZE);

        let first = PesPacket::parse(&out[PACK_HEADER_LEN..SECTOR_SIZE]).unwrap();
        assert_eq!(first.header_data_length, 14);
        assert_eq!(first.presentation_timestamp, Some(123_456));
        assert_eq!(first.sub_picture_stream_id, Some(0x22));
        let first_chunk = SECTOR_SIZE - PACK_HEADER_LEN - FIRST_PES_HEADER_LEN;
        assert_eq!(first.payload, &spu[..first_chunk]);

        let next = PesPacket::parse(&out[SECTOR_SIZE + PACK_HEADER_LEN..]).unwrap();
        assert_eq!(next.header_data_length, 8);
        assert_eq!(next.presentation_timestamp, None);
        assert_eq!(next.sub_picture_stream_id, Some(0x22));
        assert_eq!(next.payload, &spu[first_chunk..]);
    }

    #[test]
    fn large_spu_spans_sectors() {
        let spu: Vec<u8> = (0..5000).map(|i| i as u8).collect();
        let mut out = vec![];
        write_packets(&mut out, &spu, 0, 0x20).unwrap();
        assert_eq!(out.len(), 3 * SECTOR_SIZE);
        let second = &out[SECTOR_SIZE..];
        assert_eq!(&second[14..32], &[0x00, 0x00, 0x01, 0xbd, 0x07, 0xec, 0x81, 0x01, 0x08,
                                      0x1e, 0x60, 0x3a, 0xff, 0xff, 0xff, 0xff, 0xff, 0x20]);
        let first_chunk = SECTOR_SIZE - 14 - 24;
        assert_eq!(second[32], spu[first_chunk]);
    }

    #[test]
    fn writer_accumulates_entries() {
        let mut writer = VobSubWriter::new(WriterConfig::default());
        let bitmap = RgbaImage::from_pixel(8, 4, Rgba([255, 255, 255, 255]));
        let caption = Caption {
            start: Duration::from_millis(1500),
            duration: Duration::from_secs(1),
            forced: false,
            alignment: Alignment::BottomCenter,
        };
        let first = writer.write_caption(&caption, &bitmap).unwrap();
        let second = writer.write_caption(
            &Caption { start: Duration::from_secs(4), ..caption }, &bitmap).unwrap();
        assert_eq!(first.file_position, 0);
        assert_eq!(second.file_position, SECTOR_SIZE as u64);
        assert_eq!(writer.sub_data().len(), 2 * SECTOR_SIZE);

        let text = writer.idx_text();
        assert!(text.ends_with("\
timestamp: 00:00:01:500, filepos: 000000000
timestamp: 00:00:04:000, filepos: 000000800
"));
        assert!(text.contains("palette: 000000, ffffff, 000000, 7f7f7f, 3333fa,"));
    }
}
