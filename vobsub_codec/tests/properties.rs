//! Property-based tests for the codec's building blocks.

use image::{Rgba, RgbaImage};
use proptest::prelude::*;

use vobsub_codec::bitmap::crop;
use vobsub_codec::img::{compress, decompress, Size};
use vobsub_codec::mpeg2::clock::{decode_timestamp, encode_timestamp};
use vobsub_codec::spu::{delay_to_millis, millis_to_delay};
use vobsub_codec::{sp_blocks, subtitles, DecodeOptions, Rect};

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// A width, a height and that many 2-bit pixels.
fn index_image() -> impl Strategy<Value = (Size, Vec<u8>)> {
    (1usize..600, 1usize..12).prop_flat_map(|(w, h)| {
        // Long runs of one color exercise the wider RLE codes.
        let pixel = prop_oneof![3 => Just(0u8), 1 => 0u8..4];
        (Just(Size { w, h }), proptest::collection::vec(pixel, w * h))
    })
}

#[test]
fn rle_round_trip_full_frame() {
    let size = Size { w: 720, h: 480 };
    // A small LCG gives a repeatable mix of short and long runs.
    let mut state = 0x1234_5678u32;
    let mut pixels = Vec::with_capacity(size.w * size.h);
    while pixels.len() < size.w * size.h {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let run = 1 + (state >> 16) as usize % 300;
        let color = (state >> 8) as u8 & 0b11;
        pixels.extend(std::iter::repeat(color).take(run));
    }
    pixels.truncate(size.w * size.h);

    let [top, bottom] = compress(size, &pixels);
    let mut data = top.clone();
    data.extend_from_slice(&bottom);
    assert_eq!(decompress(size, &data, [0, top.len()]), pixels);
}

proptest! {
    #[test]
    fn pts_round_trip(ticks in 0u64..(1 << 33)) {
        let field = encode_timestamp(0b0010, ticks);
        prop_assert_eq!(field[0] >> 4, 0b0010);
        prop_assert_eq!(field[0] & 1, 1);
        prop_assert_eq!(decode_timestamp(&field), Some(ticks));
    }

    #[test]
    fn rle_round_trip((size, pixels) in index_image()) {
        let [top, bottom] = compress(size, &pixels);
        let mut data = top.clone();
        data.extend_from_slice(&bottom);
        let decoded = decompress(size, &data, [0, top.len()]);
        prop_assert_eq!(decoded, pixels);
    }

    #[test]
    fn display_area_round_trip(x in 0i32..4096, y in 0i32..4096,
                               w in 0i32..4096, h in 0i32..4096) {
        let rect = Rect::new(x, y, w.min(4095 - x), h.min(4095 - y));
        prop_assert_eq!(Rect::from_display_area(&rect.to_display_area()), Some(rect));
    }

    #[test]
    fn delay_conversion_is_close(ms in 12u64..700_000) {
        let back = delay_to_millis(millis_to_delay(ms));
        prop_assert!(back <= ms);
        prop_assert!(ms - back <= 12, "{}ms came back as {}ms", ms, back);
    }

    #[test]
    fn crop_keeps_every_visible_pixel(
        w in 1u32..40,
        h in 1u32..40,
        dots in proptest::collection::vec((0u32..40, 0u32..40), 0..6),
    ) {
        let mut image = RgbaImage::from_pixel(w, h, CLEAR);
        for &(x, y) in &dots {
            if x < w && y < h {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let (cropped, (dx, dy)) = crop(&image, CLEAR);
        let visible: Vec<_> = image
            .enumerate_pixels()
            .filter(|(_, _, px)| px[3] != 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        if visible.is_empty() {
            prop_assert_eq!(cropped.dimensions(), (1, 1));
        } else {
            prop_assert!(dx + cropped.width() <= w);
            prop_assert!(dy + cropped.height() <= h);
            for (x, y) in visible {
                prop_assert!(x >= dx && x < dx + cropped.width());
                prop_assert!(y >= dy && y < dy + cropped.height());
                prop_assert_eq!(cropped.get_pixel(x - dx, y - dy), image.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn arbitrary_bytes_do_not_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let options = DecodeOptions::default();
        for sub in subtitles(&data, &[]) {
            prop_assert!(sub.end >= sub.start);
            sub.render(&options);
        }
        for (_, image) in sp_blocks(&data) {
            image.render(&options);
        }
    }
}
