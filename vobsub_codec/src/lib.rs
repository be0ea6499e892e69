//! This crate reads and writes DVD subtitles in VobSub format.  These are
//! typically stored as two files: an `*.idx` file summarizing the
//! subtitles, and an MPEG-2 Program Stream containing the actual subtitle
//! packets.
//!
//! ## Example code
//!
//! ```
//! use std::time::Duration;
//! use image::{Rgba, RgbaImage};
//! use vobsub_codec::{subtitles, Alignment, Caption, DecodeOptions, VobSubWriter, WriterConfig};
//!
//! // Encode a caption.
//! let mut writer = VobSubWriter::new(WriterConfig::default());
//! let bitmap = RgbaImage::from_pixel(200, 40, Rgba([255, 255, 255, 255]));
//! let caption = Caption {
//!     start: Duration::from_secs(1),
//!     duration: Duration::from_secs(2),
//!     forced: false,
//!     alignment: Alignment::BottomCenter,
//! };
//! writer.write_caption(&caption, &bitmap).unwrap();
//!
//! // Decode it again.
//! for sub in subtitles(writer.sub_data(), writer.entries()) {
//!     println!("Time: {:?}-{:?}", sub.start, sub.end);
//!     println!("Always show: {:?}", sub.forced());
//!     let area = sub.image.display_area();
//!     println!("At: {}, {}", area.left(), area.top());
//!     let img: RgbaImage = sub.render(&DecodeOptions::default()).image;
//!     println!("Size: {}x{}", img.width(), img.height());
//!
//!     // You can save or manipulate `img` using the APIs provided by the Rust
//!     // `image` crate.
//! }
//! ```
//!
//! To read an existing pair of files, use `Index::open("movie.idx")` and
//! iterate over `index.subtitles()`, decoding with `index.decode_options()`
//! so that colors come from the `*.idx` palette.
//!
//! ## Decoding corrupt data
//!
//! Ripped subtitles are frequently damaged, so the decoder never gives up
//! on a whole file because of one bad packet.  Truncated packets are
//! clamped, unparseable ones are skipped, and a subtitle whose image can't
//! be decoded turns into a 1x1 placeholder.  The only errors are for
//! buffers too short to hold a fixed-size header, `*.idx` syntax, and I/O.
//! Details of anything skipped are logged using the `log` crate.
//!
//! ## Performance
//!
//! Performance in debug mode is poor; compile with `--release` before
//! benchmarking.
//!
//! ## Background & References
//!
//! VobSub subtitles consist of a simple textual `*.idx` file, and a binary
//! `*.sub` file.  The binary `*.sub` file is essentially an MPEG-2 Program
//! Stream containing Packetized Elementary Stream data, but only for a
//! single subtitle track.
//!
//! Useful references include:
//!
//! - [Program Stream](https://en.wikipedia.org/wiki/MPEG_program_stream) (PS)
//! - [Packetized Elementary Stream][PES] (PES)
//! - [DVD subtitles](http://sam.zoy.org/writings/dvd/subtitles/)
//! - [System Time Clock](http://www.bretl.com/mpeghtml/STC.HTM)
//!
//! [PES]: http://dvd.sourceforge.net/dvdinfo/pes-hdr.html
//!
//! The same sub-picture units also appear in `*.sup` files made of `SP`
//! blocks, which `sp_blocks` can read.

#[macro_use]
extern crate log;

pub mod bitmap;
mod errors;
pub mod idx;
pub mod img;
pub mod mpeg2;
mod probe;
pub mod quantize;
pub mod spu;
pub mod spu_header;
pub mod sub;
pub mod unit;
mod util;
pub mod writer;

pub use self::errors::{Result, VobsubError};
pub use self::idx::{Index, IndexEntry, Palette};
pub use self::mpeg2::pes::PesPacket;
pub use self::mpeg2::ps::PackHeader;
pub use self::probe::{is_idx_file, is_sub_file};
pub use self::spu::{DecodeOptions, FourColorPalette, Rect, RenderedImage, SpuImage};
pub use self::spu_header::{sp_blocks, SpuHeader};
pub use self::sub::{assign_end_times, subtitles, Subtitles, TimedSubtitleUnit};
pub use self::unit::{stream_units, StreamUnit};
pub use self::writer::{Alignment, Caption, VobSubWriter, WriterConfig};
