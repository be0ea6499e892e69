//! Reducing an RGBA bitmap to the four colors a subtitle can use.

use image::{Rgba, RgbaImage};
use std::collections::HashMap;

use crate::img::Size;

/// Pixels with less alpha than this are treated as background.
const OPAQUE_THRESHOLD: u8 = 0x80;

/// Colors closer than this (squared RGB distance) count as the same color
/// when looking for an anti-aliasing color.
const SAME_COLOR_DISTANCE: i32 = 48 * 48 * 3;

/// A bitmap reduced to four colors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FourColorImage {
    /// Dimensions of `indices`.
    pub size: Size,
    /// One color index (0 to 3) per pixel, in row-major order.
    pub indices: Vec<u8>,
    /// The color chosen for index 3.
    pub emphasis2: Rgba<u8>,
}

/// Maps arbitrary bitmaps onto `[background, pattern, emphasis1,
/// emphasis2]`, choosing `emphasis2` itself.
pub trait ColorQuantizer {
    /// Quantize `bitmap`.  When `use_custom_colors` is set, the three given
    /// colors are used as they are and `emphasis2` is derived from them.
    fn quantize(&self, bitmap: &RgbaImage, background: Rgba<u8>, pattern: Rgba<u8>,
                emphasis1: Rgba<u8>, use_custom_colors: bool) -> FourColorImage;
}

/// Picks the nearest of the four colors for every opaque pixel.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestColorQuantizer;

fn distance(a: Rgba<u8>, b: Rgba<u8>) -> i32 {
    (0..3)
        .map(|i| {
            let d = i32::from(a[i]) - i32::from(b[i]);
            d * d
        })
        .sum()
}

fn midpoint(a: Rgba<u8>, b: Rgba<u8>) -> Rgba<u8> {
    let mid = |i: usize| ((u16::from(a[i]) + u16::from(b[i])) / 2) as u8;
    Rgba([mid(0), mid(1), mid(2), a[3].max(b[3])])
}

impl NearestColorQuantizer {
    /// The most common opaque color which isn't close to `pattern` or
    /// `emphasis1`, if there is one.
    fn antialias_color(bitmap: &RgbaImage, pattern: Rgba<u8>,
                       emphasis1: Rgba<u8>) -> Option<Rgba<u8>> {
        let mut counts: HashMap<[u8; 4], usize> = HashMap::new();
        for px in bitmap.pixels() {
            if px[3] >= OPAQUE_THRESHOLD
                && distance(*px, pattern) > SAME_COLOR_DISTANCE
                && distance(*px, emphasis1) > SAME_COLOR_DISTANCE
            {
                *counts.entry(px.0).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .max_by_key(|&(color, count)| (count, color))
            .map(|(color, _)| Rgba(color))
    }
}

impl ColorQuantizer for NearestColorQuantizer {
    fn quantize(&self, bitmap: &RgbaImage, background: Rgba<u8>, pattern: Rgba<u8>,
                emphasis1: Rgba<u8>, use_custom_colors: bool) -> FourColorImage {
        let emphasis2 = if use_custom_colors {
            midpoint(pattern, emphasis1)
        } else {
            Self::antialias_color(bitmap, pattern, emphasis1)
                .unwrap_or_else(|| midpoint(pattern, emphasis1))
        };
        trace!("quantizing {}x{} bitmap, emphasis2 {:?}",
               bitmap.width(), bitmap.height(), emphasis2);

        // Background only competes for opaque pixels if it is opaque itself.
        let mut candidates = vec![(1, pattern), (2, emphasis1), (3, emphasis2)];
        if background[3] >= OPAQUE_THRESHOLD {
            candidates.insert(0, (0, background));
        }
        let indices = bitmap
            .pixels()
            .map(|&px| {
                if px[3] < OPAQUE_THRESHOLD {
                    return 0;
                }
                candidates
                    .iter()
                    .min_by_key(|&&(index, color)| (distance(px, color), index))
                    .map_or(0, |&(index, _)| index)
            })
            .collect();

        FourColorImage {
            size: Size {
                w: bitmap.width() as usize,
                h: bitmap.height() as usize,
            },
            indices,
            emphasis2,
        }
    }
}
