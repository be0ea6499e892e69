//! Miscellaneous utilities.

use std::fmt;

/// Wrapper to force a `&[u8]` to display as nicely-formatted hexadecimal
/// bytes with only the the first line or so of bytes shown.
pub struct BytesFormatter<'a>(pub &'a [u8]);

impl<'a> fmt::Debug for BytesFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let BytesFormatter(bytes) = *self;
        for byte in bytes.iter().take(16) {
            write!(f, "{:02x} ", byte)?;
        }
        write!(f, "({} bytes)", bytes.len())?;
        Ok(())
    }
}

/// Read a big-endian `u16` at `offset`, or `None` if it would run past the
/// end of `buf`.  Negative offsets show up when the `-4` address
/// convention meets a corrupt pointer, so we accept `isize`.
pub fn be_u16_at(buf: &[u8], offset: isize) -> Option<u16> {
    let offset = usize::try_from(offset).ok()?;
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from(bytes[0]) << 8 | u16::from(bytes[1]))
}

/// Format a duration as `HH:MM:SS:mmm`, the timestamp syntax of `*.idx`
/// files.
pub fn idx_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    format!("{:02}:{:02}:{:02}:{:03}", hours, minutes, seconds, ms % 1000)
}

#[test]
fn format_bytes() {
    let formatted = format!("{:?}", BytesFormatter(&[0x00, 0x01, 0xba]));
    assert_eq!(formatted, "00 01 ba (3 bytes)");
}

#[test]
fn read_be_u16_with_bounds() {
    let buf = [0x12, 0x34, 0x56];
    assert_eq!(be_u16_at(&buf, 0), Some(0x1234));
    assert_eq!(be_u16_at(&buf, 1), Some(0x3456));
    assert_eq!(be_u16_at(&buf, 2), None);
    assert_eq!(be_u16_at(&buf, -1), None);
}

#[test]
fn format_idx_timestamp() {
    assert_eq!(idx_timestamp(1000), "00:00:01:000");
    assert_eq!(idx_timestamp(3_723_456), "01:02:03:456");
}
