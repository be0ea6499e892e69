//! RGBA pixel buffers for decoded subtitles, and trimming them down to
//! their visible content.

use image::{imageops, Rgba, RgbaImage};

/// Padding kept above and to the left of the visible content.
pub const CROP_PADDING_TOP_LEFT: u32 = 3;
/// Padding kept below and to the right of the visible content.
pub const CROP_PADDING_BOTTOM_RIGHT: u32 = 7;

/// A mutable two-dimensional grid of RGBA pixels.
pub trait PixelBuffer {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// The color at `(x, y)`.
    fn color_at(&self, x: u32, y: u32) -> Rgba<u8>;
    /// Set the color at `(x, y)`.
    fn set_color(&mut self, x: u32, y: u32, color: Rgba<u8>);

    /// A cursor which writes pixels in row-major order, starting at
    /// `(x, y)`.
    fn cursor(&mut self, x: u32, y: u32) -> PixelCursor<'_, Self>
    where
        Self: Sized,
    {
        PixelCursor { buffer: self, x, y }
    }
}

impl PixelBuffer for RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn color_at(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.get_pixel(x, y)
    }

    fn set_color(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        self.put_pixel(x, y, color)
    }
}

/// Sequential writer over a `PixelBuffer`.  Writes past the last row are
/// dropped.
pub struct PixelCursor<'a, B: PixelBuffer> {
    buffer: &'a mut B,
    x: u32,
    y: u32,
}

impl<'a, B: PixelBuffer> PixelCursor<'a, B> {
    /// Write `color` at the current position and advance, wrapping to the
    /// start of the next row.
    pub fn set_next_pixel(&mut self, color: Rgba<u8>) {
        if self.y >= self.buffer.height() || self.buffer.width() == 0 {
            return;
        }
        self.buffer.set_color(self.x, self.y, color);
        self.x += 1;
        if self.x >= self.buffer.width() {
            self.x = 0;
            self.y += 1;
        }
    }

    /// The position the next pixel will be written to.
    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }
}

/// A 1x1 image filled with `background`, used when there is nothing to
/// show.
pub fn placeholder(background: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(1, 1, background)
}

fn is_background(color: Rgba<u8>, background: Rgba<u8>) -> bool {
    color == background || color.0[3] == 0
}

/// Find the smallest rectangle holding every visible pixel, grown by the
/// crop padding and clamped to the image.  Returns `(x, y, width, height)`,
/// or `None` if every pixel is background.
pub fn content_bounds<B: PixelBuffer>(buffer: &B, background: Rgba<u8>) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = (buffer.width(), buffer.height());
    let visible = |x: u32, y: u32| !is_background(buffer.color_at(x, y), background);
    let row_visible = |y: u32| (0..w).any(|x| visible(x, y));
    let col_visible = |x: u32| (0..h).any(|y| visible(x, y));

    let top = (0..h).find(|&y| row_visible(y))?;
    let bottom = (0..h).rev().find(|&y| row_visible(y))?;
    let left = (0..w).find(|&x| col_visible(x))?;
    let right = (0..w).rev().find(|&x| col_visible(x))?;

    let x0 = left.saturating_sub(CROP_PADDING_TOP_LEFT);
    let y0 = top.saturating_sub(CROP_PADDING_TOP_LEFT);
    let x1 = (right + CROP_PADDING_BOTTOM_RIGHT).min(w - 1);
    let y1 = (bottom + CROP_PADDING_BOTTOM_RIGHT).min(h - 1);
    Some((x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Trim fully transparent or background-colored borders from `image`.  If
/// nothing visible remains, return a 1x1 placeholder.  The second value is
/// the offset of the result within `image`.
pub fn crop(image: &RgbaImage, background: Rgba<u8>) -> (RgbaImage, (u32, u32)) {
    match content_bounds(image, background) {
        Some((x, y, w, h)) => {
            trace!("cropping {}x{} to {}x{}+{}+{}",
                   image.width(), image.height(), w, h, x, y);
            (imageops::crop_imm(image, x, y, w, h).to_image(), (x, y))
        }
        None => (placeholder(background), (0, 0)),
    }
}
