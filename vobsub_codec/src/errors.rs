//! Custom `Error` and `Result` types, declared using `thiserror`.

use nom::IResult;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::result;
use thiserror::Error;

/// Our standard result type.
pub type Result<T, E = VobsubError> = result::Result<T, E>;

/// Errors which can be returned by this crate.
///
/// Corrupt subtitle data is normally handled by clamping or skipping, so
/// most of these come from the `*.idx` parser or from file I/O.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VobsubError {
    /// The buffer was shorter than the fixed-size header we were asked to
    /// parse.
    #[error("input ended unexpectedly: needed {needed} bytes, found {available}")]
    IncompleteInput {
        /// How many bytes the header requires.
        needed: usize,
        /// How many bytes were actually available.
        available: usize,
    },

    /// We were unable to find a required key in an `*.idx` file.
    #[error("could not find required key '{0}'")]
    MissingKey(&'static str),

    /// We could not parse a value.
    #[error("could not parse: {0}")]
    Parse(String),

    /// We have leftover input that we didn't expect.
    #[error("unexpected extra input")]
    UnexpectedInput,

    /// Writing encoded subtitle data failed.
    #[error("could not write subtitle data")]
    Write(#[from] io::Error),

    /// We could not read or write a file.
    #[error("could not access {}", path.display())]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
        /// The file we were working on.
        path: PathBuf,
    },
}

impl VobsubError {
    /// Build an `Io` error that remembers which file we were touching.
    pub(crate) fn io<P: Into<PathBuf>>(path: P) -> impl FnOnce(io::Error) -> VobsubError {
        let path = path.into();
        move |source| VobsubError::Io { source, path }
    }
}

/// Convenience conversions from `nom` results into our own types.
pub trait IResultExt<I, O, E> {
    /// Discard any unparsed input instead of treating it as an error.
    fn ignore_trailing_data(self) -> IResult<I, O, E>;
    /// Convert to a `Result`, insisting that all input was consumed.
    fn to_vobsub_result(self) -> Result<O>;
}

impl<I: Default + Eq, O, E: fmt::Debug> IResultExt<I, O, E> for IResult<I, O, E> {
    fn ignore_trailing_data(self) -> IResult<I, O, E> {
        match self {
            Ok((_, val)) => Ok((I::default(), val)),
            other => other,
        }
    }

    fn to_vobsub_result(self) -> Result<O> {
        match self {
            Ok((rest, val)) => {
                if rest == I::default() {
                    Ok(val)
                } else {
                    Err(VobsubError::UnexpectedInput)
                }
            }
            Err(nom::Err::Incomplete(needed)) => {
                Err(VobsubError::Parse(format!("incomplete input: {:?}", needed)))
            }
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
                Err(VobsubError::Parse(format!("{:?}", err)))
            }
        }
    }
}

/// Return an `IncompleteInput` error unless `buf` holds at least `needed`
/// bytes.
pub(crate) fn require_len(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        Err(VobsubError::IncompleteInput {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

#[test]
fn incomplete_input_reports_sizes() {
    let err = require_len(&[0, 1], 14).unwrap_err();
    assert_eq!(
        err.to_string(),
        "input ended unexpectedly: needed 14 bytes, found 2"
    );
    assert!(require_len(&[0; 14], 14).is_ok());
}
