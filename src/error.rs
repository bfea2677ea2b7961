use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GifError {
    #[error("signature is invalid, not a GIF stream")]
    InvalidFormat,

    #[error("version {0} in the header is unsupported")]
    UnsupportedVersion(String),

    #[error("reached the end of the stream without a trailer block")]
    TruncatedStream,

    #[error("decoding was cancelled")]
    Cancelled,

    #[error("failed to read GIF stream")]
    Io(#[source] io::Error),
}

impl From<io::Error> for GifError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => GifError::TruncatedStream,
            _ => GifError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, GifError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a loop count, expected \"infinite\" or a number of iterations")]
pub struct ParseLoopCountError(pub(crate) String);

/// Failure while decompressing a single frame. Never escapes the compositor.
#[derive(Error, Debug)]
pub(crate) enum LzwError {
    #[error("LZW stream is corrupt: {0}")]
    StreamCorrupt(&'static str),

    #[error("failed to read LZW sub-blocks")]
    Io(#[from] io::Error),

    #[error("LZW decoding was cancelled")]
    Cancelled,
}
