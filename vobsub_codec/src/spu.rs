//! # Sub-picture units.
//!
//! A sub-picture unit (SPU) holds one subtitle image.  It starts with two
//! 16-bit words (the total size and the address of the first display
//! control sequence), followed by the run-length encoded pixel data and a
//! chain of display control sequences (DCSQs).  Each DCSQ looks like:
//!
//! ```text
//! [delay: u16] [next DCSQ address: u16] [command]* [0xff]
//! ```
//!
//! The commands set the colors, contrast, display area and pixel data
//! addresses, and say when to start and stop displaying the image.
//!
//! For background, see [this documentation on the DVD subtitle format][subs].
//!
//! [subs]: http://sam.zoy.org/writings/dvd/subtitles/

use image::{Rgba, RgbaImage};
use std::fmt;
use std::time::Duration;

use crate::bitmap::{self, PixelBuffer};
use crate::errors::{require_len, Result};
use crate::idx::Palette;
use crate::img::{decompress, Size};
use crate::util::be_u16_at;

/// Guard against corrupt command streams with no `0xff` terminator.
const MAX_COMMANDS_PER_BLOCK: usize = 1000;

/// The four colors of a subtitle, in the order `[background, pattern,
/// emphasis1, emphasis2]`.  Pixel value `i` is drawn with color `i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FourColorPalette(pub [Rgba<u8>; 4]);

impl FourColorPalette {
    /// Color 0, treated as empty space when cropping.
    pub fn background(&self) -> Rgba<u8> {
        self.0[0]
    }

    /// Color 1, normally the text itself.
    pub fn pattern(&self) -> Rgba<u8> {
        self.0[1]
    }

    /// Color 2, normally the text outline.
    pub fn emphasis1(&self) -> Rgba<u8> {
        self.0[2]
    }

    /// Color 3, normally anti-aliasing.
    pub fn emphasis2(&self) -> Rgba<u8> {
        self.0[3]
    }
}

impl Default for FourColorPalette {
    fn default() -> FourColorPalette {
        FourColorPalette([
            Rgba([0, 0, 0, 0]),
            Rgba([255, 255, 255, 255]),
            Rgba([0, 0, 0, 255]),
            Rgba([128, 128, 128, 255]),
        ])
    }
}

/// How to turn sub-picture units into RGBA images.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Colors used when there is no color lookup table, or when
    /// `use_custom_colors` is set.  Contrast commands still apply.
    pub colors: FourColorPalette,
    /// The 16-color lookup table from the `*.idx` file.
    pub palette: Option<Palette>,
    /// Ignore `SetColor` commands and always draw with `colors`.
    pub use_custom_colors: bool,
    /// Trim background borders from decoded images.
    pub crop: bool,
}

impl Default for DecodeOptions {
    fn default() -> DecodeOptions {
        DecodeOptions {
            colors: FourColorPalette::default(),
            palette: None,
            use_custom_colors: false,
            crop: true,
        }
    }
}

impl DecodeOptions {
    /// Use `palette` to look up the colors chosen by `SetColor`.
    pub fn with_palette(mut self, palette: Palette) -> DecodeOptions {
        self.palette = Some(palette);
        self
    }
}

/// A rectangle in screen coordinates.  Display areas decoded from an SPU
/// store `end - start` as the width and height, so the image itself is one
/// pixel larger in each direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Rect {
        Rect { x, y, width, height }
    }

    /// The left edge.
    pub fn left(&self) -> i32 {
        self.x
    }

    /// The top edge.
    pub fn top(&self) -> i32 {
        self.y
    }

    /// The distance from the left edge to the right edge.  The image is
    /// one pixel wider than this.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// The distance from the top edge to the bottom edge.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Unpack the 6-byte parameter of a `SetDisplayArea` command, which
    /// holds four 12-bit values: start x, end x, start y, end y.
    pub fn from_display_area(bytes: &[u8]) -> Option<Rect> {
        if bytes.len() < 6 {
            return None;
        }
        let field = |i: usize| -> i32 {
            let (hi, lo) = (i32::from(bytes[i]), i32::from(bytes[i + 1]));
            if i % 3 == 0 {
                hi << 4 | lo >> 4
            } else {
                (hi & 0x0f) << 8 | lo
            }
        };
        let (start_x, end_x, start_y, end_y) = (field(0), field(1), field(3), field(4));
        Some(Rect::new(start_x, start_y, end_x - start_x, end_y - start_y))
    }

    /// Pack this rectangle as a `SetDisplayArea` parameter.  Coordinates
    /// are truncated to 12 bits.
    pub fn to_display_area(&self) -> [u8; 6] {
        let pack = |start: i32, end: i32| -> [u8; 3] {
            let (start, end) = (start & 0xfff, end & 0xfff);
            [(start >> 4) as u8, ((start & 0x0f) << 4 | end >> 8) as u8, (end & 0xff) as u8]
        };
        let [a, b, c] = pack(self.x, self.x + self.width);
        let [d, e, f] = pack(self.y, self.y + self.height);
        [a, b, c, d, e, f]
    }
}

/// The drawing state in effect when a subtitle is shown.  Colors are kept
/// as the raw 4-bit command values, so that they can be resolved against
/// any `DecodeOptions` later.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ControlState {
    forced: bool,
    /// Lookup table indices, in `FourColorPalette` order.
    color_indices: Option<[u8; 4]>,
    /// 4-bit alpha values, in `FourColorPalette` order.
    contrast: Option<[u8; 4]>,
    area: Option<Rect>,
    /// Buffer offsets of the top and bottom fields.
    pixel_addresses: Option<[isize; 2]>,
}

/// The result of replaying every display control sequence in an SPU.
#[derive(Debug, Default)]
struct Replay {
    state: ControlState,
    /// The state at the `StopDisplay` with the longest delay.
    shown: Option<ControlState>,
    delay_ms: Option<u64>,
}

/// Split the two parameter bytes of `SetColor` or `SetContrast` into
/// nibbles in `FourColorPalette` order.
fn nibbles(param: &[u8]) -> [u8; 4] {
    [param[1] & 0x0f, param[1] >> 4, param[0] & 0x0f, param[0] >> 4]
}

/// Convert a DCSQ delay field to milliseconds.
pub fn delay_to_millis(delay: u16) -> u64 {
    ((u64::from(delay) << 10) + 1023) / 90
}

/// Convert milliseconds to a DCSQ delay field, the inverse of
/// `delay_to_millis` give or take one field unit.
pub fn millis_to_delay(ms: u64) -> u16 {
    let ticks = (ms * 90).saturating_sub(1023) >> 10;
    ticks.min(u64::from(u16::MAX)) as u16
}

/// Run the commands of a single DCSQ starting at `start`.  Returns early on
/// `0xff`, on a command whose parameters run past the buffer, or after
/// `MAX_COMMANDS_PER_BLOCK` commands.
fn replay_commands(data: &[u8], start: usize, delay: u16, address_offset: isize,
                   replay: &mut Replay) {
    let state = &mut replay.state;
    let mut i = start;
    for _ in 0..MAX_COMMANDS_PER_BLOCK {
        let opcode = match data.get(i) {
            Some(&opcode) => opcode,
            None => return,
        };
        match opcode {
            0x00 => {
                state.forced = true;
                i += 1;
            }
            0x01 => i += 1,
            0x02 => {
                let delay_ms = delay_to_millis(delay);
                trace!("StopDisplay after {}ms", delay_ms);
                // Some discs store several variants of one subtitle, and
                // the one shown longest is the real one.
                if replay.delay_ms.map_or(true, |longest| delay_ms > longest) {
                    replay.delay_ms = Some(delay_ms);
                    replay.shown = Some(state.clone());
                }
                i += 1;
            }
            0x03 => {
                let param = match data.get(i + 1..i + 3) {
                    Some(param) => param,
                    None => return,
                };
                state.color_indices = Some(nibbles(param));
                i += 3;
            }
            0x04 => {
                let param = match data.get(i + 1..i + 3) {
                    Some(param) => param,
                    None => return,
                };
                if param != [0, 0] {
                    state.contrast = Some(nibbles(param));
                }
                i += 3;
            }
            0x05 => {
                let area = match data.get(i + 1..i + 7).and_then(Rect::from_display_area) {
                    Some(area) => area,
                    None => return,
                };
                if state.area.is_none() {
                    state.area = Some(area);
                }
                i += 7;
            }
            0x06 => {
                let offset = |at: usize| {
                    be_u16_at(data, at as isize).map(|addr| addr as isize + address_offset)
                };
                match (offset(i + 1), offset(i + 3)) {
                    (Some(top), Some(bottom)) => state.pixel_addresses = Some([top, bottom]),
                    _ => return,
                }
                i += 5;
            }
            0x07 => {
                // ChangeColorAndContrast: skipped, not applied.
                let len = match data.get(i + 1) {
                    Some(&len) => usize::from(len),
                    None => return,
                };
                debug!("skipping {} bytes of ChangeColorAndContrast", len);
                i += 2 + len;
            }
            0xff => return,
            other => {
                trace!("unknown control command 0x{:02x} at 0x{:x}", other, i);
                i += 1;
            }
        }
    }
    warn!("control sequence at 0x{:x} has no end marker", start);
}

/// Follow the DCSQ chain starting at buffer offset `first_block`.  Each
/// block's next pointer is an SPU address, converted to a buffer offset
/// with `address_offset`.
fn replay(data: &[u8], first_block: isize, address_offset: isize) -> Replay {
    let mut replay = Replay::default();
    let mut block = first_block;
    loop {
        let (delay, next) = match (be_u16_at(data, block), be_u16_at(data, block + 2)) {
            (Some(delay), Some(next)) => (delay, next),
            _ => {
                debug!("control sequence at {} is outside the {}-byte buffer",
                       block, data.len());
                break;
            }
        };
        trace!("control sequence at 0x{:x}: delay {}, next 0x{:x}", block, delay, next);
        replay_commands(data, block as usize + 4, delay, address_offset, &mut replay);

        let next_block = next as isize + address_offset;
        if next_block <= block {
            break;
        }
        block = next_block;
    }
    replay
}

/// A decoded RGBA subtitle image.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedImage {
    /// The image, cropped if requested.
    pub image: RgbaImage,
    /// The colors used to draw it.
    pub colors: FourColorPalette,
    /// Screen coordinates of the image's top-left corner.
    pub position: (i32, i32),
}

/// A single sub-picture unit, with its display control sequences already
/// interpreted.
#[derive(Clone, PartialEq)]
pub struct SpuImage {
    raw_data: Vec<u8>,
    sub_picture_size: u16,
    display_area: Rect,
    forced: bool,
    delay: Duration,
    /// What to draw.
    shown: ControlState,
}

impl SpuImage {
    fn new(raw_data: Vec<u8>, sub_picture_size: u16, first_block: isize,
           address_offset: isize) -> SpuImage {
        let replay = replay(&raw_data, first_block, address_offset);
        let state = replay.state;
        SpuImage {
            raw_data,
            sub_picture_size,
            display_area: state.area.unwrap_or_default(),
            forced: state.forced,
            delay: Duration::from_millis(replay.delay_ms.unwrap_or(0)),
            shown: replay.shown.unwrap_or(state),
        }
    }

    /// Parse a complete SPU, as reassembled from one or more PES packets.
    /// All addresses are offsets into `bytes`.
    pub fn from_sp_packet(bytes: &[u8]) -> Result<SpuImage> {
        require_len(bytes, 4)?;
        let sub_picture_size = u16::from_be_bytes([bytes[0], bytes[1]]);
        let control_table = u16::from_be_bytes([bytes[2], bytes[3]]);
        Ok(SpuImage::new(bytes.to_owned(), sub_picture_size, control_table as isize, 0))
    }

    /// Parse the SPU data following an `SP` block header.  The first four
    /// bytes of the SPU live in that header, so `bytes[0]` is SPU address 4
    /// and `control_table_offset` is already relative to `bytes`.
    pub fn from_merged_pes(bytes: &[u8], control_table_offset: i32) -> SpuImage {
        let sub_picture_size = (bytes.len() + 4).min(usize::from(u16::MAX)) as u16;
        SpuImage::new(bytes.to_owned(), sub_picture_size, control_table_offset as isize, -4)
    }

    /// The bytes this image was parsed from.
    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    /// The SPU's own idea of its size, in bytes.
    pub fn sub_picture_size(&self) -> u16 {
        self.sub_picture_size
    }

    /// Where to display the image.  Zero-sized if the SPU never said.
    pub fn display_area(&self) -> Rect {
        self.display_area
    }

    /// Should this subtitle be shown even when subtitles are turned off?
    pub fn forced(&self) -> bool {
        self.forced
    }

    /// How long to show the image, from the longest `StopDisplay` delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The four colors this image is drawn with under `options`.
    pub fn colors(&self, options: &DecodeOptions) -> FourColorPalette {
        let mut colors = options.colors;
        if let (Some(indices), Some(palette), false) =
            (self.shown.color_indices, options.palette.as_ref(), options.use_custom_colors)
        {
            for (color, &index) in colors.0.iter_mut().zip(indices.iter()) {
                let rgb = palette[usize::from(index)];
                *color = Rgba([rgb[0], rgb[1], rgb[2], color[3]]);
            }
        }
        if let Some(contrast) = self.shown.contrast {
            for (color, &alpha) in colors.0.iter_mut().zip(contrast.iter()) {
                color[3] = alpha * 17;
            }
        }
        colors
    }

    /// The decoded pixels as 2-bit color indices in row-major order, or
    /// `None` if the SPU has no usable display area or pixel data.
    ///
    /// A zero width or height counts as unusable.  The height is also
    /// limited to the lines the RLE data could hold, since each line of a
    /// field takes at least one byte.
    pub fn index_plane(&self) -> Option<(Size, Vec<u8>)> {
        let area = self.shown.area?;
        let [top, bottom] = self.shown.pixel_addresses?;
        if area.width() <= 0 || area.height() <= 0 {
            debug!("degenerate display area {:?}", area);
            return None;
        }
        let start = |addr: isize| usize::try_from(addr).unwrap_or(usize::MAX);
        let starts = [start(top), start(bottom)];

        let available = |start: usize| self.raw_data.len().saturating_sub(start);
        let max_height = (2 * available(starts[0])).min(2 * available(starts[1]) + 1);
        let height = area.height() as usize + 1;
        if height > max_height {
            warn!("display area {:?} needs {} lines but the pixel data holds at most {}",
                  area, height, max_height);
        }
        let size = Size {
            w: area.width() as usize + 1,
            h: height.min(max_height),
        };
        if size.h == 0 {
            return None;
        }
        Some((size, decompress(size, &self.raw_data, starts)))
    }

    /// Draw this subtitle.
    pub fn render(&self, options: &DecodeOptions) -> RenderedImage {
        let colors = self.colors(options);
        let area = self.shown.area.unwrap_or_default();
        let (size, plane) = match self.index_plane() {
            Some(plane) => plane,
            None => {
                return RenderedImage {
                    image: bitmap::placeholder(colors.background()),
                    colors,
                    position: (area.left(), area.top()),
                };
            }
        };

        let mut image = RgbaImage::from_pixel(size.w as u32, size.h as u32, colors.background());
        {
            let mut cursor = image.cursor(0, 0);
            for &px in &plane {
                cursor.set_next_pixel(colors.0[usize::from(px & 0b11)]);
            }
        }

        if options.crop {
            let (cropped, (dx, dy)) = bitmap::crop(&image, colors.background());
            RenderedImage {
                image: cropped,
                colors,
                position: (area.left() + dx as i32, area.top() + dy as i32),
            }
        } else {
            RenderedImage {
                image,
                colors,
                position: (area.left(), area.top()),
            }
        }
    }

    /// Draw this subtitle and return just the image.
    pub fn bitmap(&self, options: &DecodeOptions) -> RgbaImage {
        self.render(options).image
    }
}

impl fmt::Debug for SpuImage {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("SpuImage")
            .field("raw_data_len", &self.raw_data.len())
            .field("sub_picture_size", &self.sub_picture_size)
            .field("display_area", &self.display_area)
            .field("forced", &self.forced)
            .field("delay", &self.delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Pixel data for a 2x2 image: top line `[1, 2]`, bottom line `[3, 3]`.
    const PIXELS: [u8; 2] = [0x56, 0xb0];

    fn area_and_pixels() -> Vec<u8> {
        let mut cmds = vec![0x05];
        cmds.extend_from_slice(&Rect::new(100, 200, 1, 1).to_display_area());
        cmds.extend_from_slice(&[0x06, 0x00, 0x04, 0x00, 0x05]);
        cmds
    }

    /// Build an SPU from `PIXELS` and a list of `(delay, commands)` blocks.
    fn build_spu(blocks: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 0];
        out.extend_from_slice(&PIXELS);
        let first = out.len();
        let mut addr = first;
        for (i, (delay, cmds)) in blocks.iter().enumerate() {
            let next = if i + 1 == blocks.len() { addr } else { addr + 5 + cmds.len() };
            out.extend_from_slice(&delay.to_be_bytes());
            out.extend_from_slice(&(next as u16).to_be_bytes());
            out.extend_from_slice(cmds);
            out.push(0xff);
            addr = next;
        }
        let len = out.len() as u16;
        out[0..2].copy_from_slice(&len.to_be_bytes());
        out[2..4].copy_from_slice(&(first as u16).to_be_bytes());
        out
    }

    fn uncropped() -> DecodeOptions {
        DecodeOptions { crop: false, ..DecodeOptions::default() }
    }

    #[test]
    fn display_area_packing() {
        let rect = Rect::new(0x123, 0x456, 0x111, 0x222);
        let packed = rect.to_display_area();
        assert_eq!(packed, [0x12, 0x32, 0x34, 0x45, 0x66, 0x78]);
        assert_eq!(Rect::from_display_area(&packed), Some(rect));
        assert_eq!(Rect::from_display_area(&packed[..5]), None);
    }

    #[test]
    fn delay_conversion() {
        assert_eq!(delay_to_millis(0), 11);
        assert_eq!(millis_to_delay(2000), 174);
        assert_eq!(delay_to_millis(174), 1991);
        assert_eq!(millis_to_delay(0), 0);
    }

    #[test]
    fn decode_simple_spu() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut cmds = vec![0x00, 0x03, 0x32, 0x10, 0x04, 0xff, 0xf0];
        cmds.extend(area_and_pixels());
        cmds.push(0x02);
        let spu = SpuImage::from_sp_packet(&build_spu(&[(50, cmds)])).unwrap();
        assert!(spu.forced());
        assert_eq!(spu.display_area(), Rect::new(100, 200, 1, 1));
        assert_eq!(spu.delay(), Duration::from_millis(delay_to_millis(50)));

        let (size, plane) = spu.index_plane().unwrap();
        assert_eq!(size, Size { w: 2, h: 2 });
        assert_eq!(plane, vec![1, 2, 3, 3]);

        let rendered = spu.render(&uncropped());
        assert_eq!(rendered.position, (100, 200));
        assert_eq!(*rendered.image.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*rendered.image.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn set_color_uses_lookup_table() {
        let mut palette = [Rgb([0, 0, 0]); 16];
        for (i, color) in palette.iter_mut().enumerate() {
            *color = Rgb([i as u8 * 10, 0, 0]);
        }
        let mut cmds = vec![0x01, 0x03, 0x32, 0x10, 0x04, 0xff, 0xf0];
        cmds.extend(area_and_pixels());
        cmds.push(0x02);
        let spu = SpuImage::from_sp_packet(&build_spu(&[(0, cmds)])).unwrap();

        let options = uncropped().with_palette(palette);
        let colors = spu.colors(&options);
        assert_eq!(colors.background(), Rgba([0, 0, 0, 0]));
        assert_eq!(colors.pattern(), Rgba([10, 0, 0, 255]));
        assert_eq!(colors.emphasis1(), Rgba([20, 0, 0, 255]));
        assert_eq!(colors.emphasis2(), Rgba([30, 0, 0, 255]));

        let custom = DecodeOptions { use_custom_colors: true, ..options };
        assert_eq!(spu.colors(&custom).pattern(), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn zero_contrast_is_ignored() {
        let mut cmds = vec![0x04, 0x00, 0x00];
        cmds.extend(area_and_pixels());
        cmds.push(0x02);
        let spu = SpuImage::from_sp_packet(&build_spu(&[(0, cmds)])).unwrap();
        assert_eq!(spu.colors(&DecodeOptions::default()), FourColorPalette::default());
    }

    #[test]
    fn longest_delay_wins() {
        let mut first = vec![0x04, 0xff, 0xf0];
        first.extend(area_and_pixels());
        first.push(0x02);
        let second = vec![0x04, 0x88, 0x80, 0x02];

        for &(d1, d2, pattern_alpha) in &[(10, 100, 0x88), (100, 10, 0xff)] {
            let spu = SpuImage::from_sp_packet(
                &build_spu(&[(d1, first.clone()), (d2, second.clone())])).unwrap();
            assert_eq!(spu.delay(), Duration::from_millis(delay_to_millis(100)));
            let rendered = spu.render(&uncropped());
            assert_eq!(rendered.image.get_pixel(0, 0)[3], pattern_alpha);
        }
    }

    #[test]
    fn equal_delays_keep_first() {
        let mut first = vec![0x04, 0xff, 0xf0];
        first.extend(area_and_pixels());
        first.push(0x02);
        let second = vec![0x04, 0x88, 0x80, 0x02];
        let spu = SpuImage::from_sp_packet(&build_spu(&[(7, first), (7, second)])).unwrap();
        assert_eq!(spu.render(&uncropped()).image.get_pixel(0, 0)[3], 0xff);
    }

    #[test]
    fn change_color_and_contrast_is_skipped() {
        let mut cmds = vec![0x07, 0x03, 0x02, 0x02, 0x02];
        cmds.extend(area_and_pixels());
        cmds.push(0x02);
        let spu = SpuImage::from_sp_packet(&build_spu(&[(20, cmds)])).unwrap();
        assert_eq!(spu.display_area(), Rect::new(100, 200, 1, 1));
        assert_eq!(spu.delay(), Duration::from_millis(delay_to_millis(20)));
    }

    #[test]
    fn missing_stop_display_uses_final_state() {
        let spu = SpuImage::from_sp_packet(&build_spu(&[(0, area_and_pixels())])).unwrap();
        assert_eq!(spu.delay(), Duration::ZERO);
        assert_eq!(spu.index_plane().unwrap().1, vec![1, 2, 3, 3]);
    }

    #[test]
    fn merged_pes_matches_sp_packet() {
        let mut cmds = vec![0x01, 0x04, 0xff, 0xf0];
        cmds.extend(area_and_pixels());
        cmds.push(0x02);
        let spu = build_spu(&[(30, cmds.clone()), (60, vec![0x02])]);
        let standalone = SpuImage::from_sp_packet(&spu).unwrap();
        let control_table = i32::from(u16::from_be_bytes([spu[2], spu[3]])) - 4;
        let merged = SpuImage::from_merged_pes(&spu[4..], control_table);
        assert_eq!(merged.delay(), standalone.delay());
        assert_eq!(merged.display_area(), standalone.display_area());
        assert_eq!(merged.sub_picture_size(), standalone.sub_picture_size());
        assert_eq!(merged.bitmap(&DecodeOptions::default()),
                   standalone.bitmap(&DecodeOptions::default()));
    }

    #[test]
    fn corrupt_buffers_do_not_panic() {
        assert!(SpuImage::from_sp_packet(&[]).is_err());
        assert!(SpuImage::from_sp_packet(&[0]).is_err());
        assert!(SpuImage::from_sp_packet(&[0, 4, 0]).is_err());

        let options = DecodeOptions::default();
        for bytes in [
            &[0x00, 0x04, 0x00, 0x02][..],
            &[0x00, 0x04, 0xff, 0xff],
            &[0x00, 0x0a, 0x00, 0x04, 0x00, 0x00, 0x00, 0x04, 0x05, 0x01],
            &[0x00, 0x0a, 0x00, 0x04, 0x00, 0x00, 0x00, 0x04, 0x06, 0xff, 0xff, 0xff, 0xff],
        ] {
            let spu = SpuImage::from_sp_packet(bytes).unwrap();
            assert_eq!(spu.bitmap(&options).dimensions(), (1, 1));
        }

        let merged = SpuImage::from_merged_pes(&[], 0);
        assert_eq!(merged.bitmap(&options).dimensions(), (1, 1));
        let merged = SpuImage::from_merged_pes(&[1, 2, 3], -40);
        assert_eq!(merged.delay(), Duration::ZERO);
    }

    #[test]
    fn pixel_addresses_past_the_end_give_placeholder() {
        let mut cmds = vec![0x05];
        cmds.extend_from_slice(&Rect::new(0, 0, 3, 3).to_display_area());
        cmds.extend_from_slice(&[0x06, 0x7f, 0xff, 0x7f, 0xff, 0x02]);
        let spu = SpuImage::from_sp_packet(&build_spu(&[(0, cmds)])).unwrap();
        assert_eq!(spu.index_plane(), None);
        assert_eq!(spu.bitmap(&uncropped()).dimensions(), (1, 1));
    }

    #[test]
    fn zero_width_or_height_gives_placeholder() {
        for area in [Rect::new(100, 200, 0, 1), Rect::new(100, 200, 1, 0), Rect::new(5, 5, 0, 0)] {
            let mut cmds = vec![0x05];
            cmds.extend_from_slice(&area.to_display_area());
            cmds.extend_from_slice(&[0x06, 0x00, 0x04, 0x00, 0x05, 0x02]);
            let spu = SpuImage::from_sp_packet(&build_spu(&[(0, cmds)])).unwrap();
            assert_eq!(spu.display_area(), area);
            assert_eq!(spu.index_plane(), None);
            let rendered = spu.render(&uncropped());
            assert_eq!(rendered.image.dimensions(), (1, 1));
            assert_eq!(rendered.position, (area.left(), area.top()));
        }
    }

    #[test]
    fn huge_display_area_is_limited_by_pixel_data() {
        let mut cmds = vec![0x05];
        cmds.extend_from_slice(&Rect::new(0, 0, 4095, 4095).to_display_area());
        cmds.extend_from_slice(&[0x06, 0x00, 0x04, 0x00, 0x05, 0x02]);
        let spu = build_spu(&[(0, cmds)]);
        let image = SpuImage::from_sp_packet(&spu).unwrap();
        let (size, plane) = image.index_plane().unwrap();
        assert_eq!(size.w, 4096);
        assert!(size.h <= 2 * spu.len(), "kept {} lines", size.h);
        assert_eq!(plane.len(), size.w * size.h);
    }

    #[test]
    fn addresses_above_0x7fff_stay_positive() {
        // The control table sits past 0x8000, so its address and the
        // block's next pointer both have the high bit set.
        let mut spu = vec![0, 0, 0x80, 0x10];
        spu.extend_from_slice(&PIXELS);
        spu.resize(0x8010, 0);
        spu.extend_from_slice(&[0x00, 0x20, 0x80, 0x10]);
        spu.extend(area_and_pixels());
        spu.extend_from_slice(&[0x02, 0xff]);
        let len = spu.len() as u16;
        spu[0..2].copy_from_slice(&len.to_be_bytes());

        let image = SpuImage::from_sp_packet(&spu).unwrap();
        assert_eq!(image.display_area(), Rect::new(100, 200, 1, 1));
        assert_eq!(image.delay(), Duration::from_millis(delay_to_millis(0x20)));
        assert_eq!(image.index_plane().unwrap().1, vec![1, 2, 3, 3]);
    }

    #[test]
    fn endless_command_stream_terminates() {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x04];
        bytes.extend(vec![0x01; 5000]);
        let spu = SpuImage::from_sp_packet(&bytes).unwrap();
        assert!(!spu.forced());
    }
}
