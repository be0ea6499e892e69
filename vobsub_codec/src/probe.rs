//! Try to guess the types of files on disk.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::errors::{Result, VobsubError};
use crate::idx::IDX_MAGIC;
use crate::mpeg2::ps::PACK_START_CODE;

/// Internal helper function which looks for "magic" bytes at the start of
/// a file.  Files shorter than `magic` simply don't match.
fn has_magic(path: &Path, magic: &[u8]) -> Result<bool> {
    let mut f = fs::File::open(path).map_err(VobsubError::io(path))?;
    let mut bytes = vec![0; magic.len()];
    match f.read_exact(&mut bytes) {
        Ok(()) => Ok(magic == &bytes[..]),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(VobsubError::io(path)(err)),
    }
}

/// Does the specified path appear to point to an `*.idx` file?
pub fn is_idx_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), IDX_MAGIC.as_bytes())
}

/// Does the specified path appear to point to a `*.sub` file?
///
/// Note that this may (or may not) return false positives for certain
/// MPEG-2 related formats.
pub fn is_sub_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    has_magic(path.as_ref(), &PACK_START_CODE)
}
