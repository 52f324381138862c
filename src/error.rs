use nom::error::{ErrorKind, ParseError};
use std::fmt;

/// Error type returned by the slice-level block parsers
#[derive(Debug, PartialEq)]
pub enum PcapError {
    /// The byte-order magic of a section header matched neither byte order
    HeaderNotRecognized,

    /// A structural check inside a block parser failed
    NomError(ErrorKind),
}

impl<I> ParseError<I> for PcapError {
    fn from_error_kind(_input: I, kind: ErrorKind) -> Self {
        PcapError::NomError(kind)
    }
    fn append(_input: I, kind: ErrorKind, _other: Self) -> Self {
        PcapError::NomError(kind)
    }
}

impl fmt::Display for PcapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcapError::HeaderNotRecognized => write!(f, "Header not recognized as PCAPNG"),
            PcapError::NomError(e) => write!(f, "block structure check failed ({:?})", e),
        }
    }
}

impl std::error::Error for PcapError {}

/// Error type reported by the file-handle engine ([`PcapNGReader`] and
/// [`PcapNGWriter`]).
///
/// Messages name the violated invariant, and carry the block type and byte
/// offset when those are known.
///
/// [`PcapNGReader`]: crate::PcapNGReader
/// [`PcapNGWriter`]: crate::PcapNGWriter
#[derive(Debug, thiserror::Error)]
pub enum PcapNGError {
    /// The underlying input ended inside a block
    #[error("file ends inside a block: {0}")]
    ShortRead(String),
    /// A length field or a cross-field invariant failed validation
    #[error("bad capture file: {0}")]
    BadFile(String),
    /// The format was recognized but a declared variant is not handled
    #[error("unsupported capture file: {0}")]
    UnsupportedFormat(String),
    /// The record's encapsulation cannot be represented in the output
    #[error("unwritable encapsulation: {0}")]
    UnwritableEncap(String),
    /// The record exceeds the encapsulation's maximum captured size
    #[error("packet too large: {0}")]
    PacketTooLarge(String),
    /// An allocation bound would be exceeded
    #[error("allocation limit exceeded: {0}")]
    OutOfMemory(String),
    /// An internal invariant was violated
    #[error("internal error: {0}")]
    Internal(String),
    /// Probe-only: the input is not a pcapng capture
    #[error("not a pcapng capture")]
    NotOurFormat,
    /// I/O failure not attributable to the capture content
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl PcapNGError {
    /// True if the error indicates a validation failure of the file content
    /// (as opposed to an I/O or caller error).
    pub fn is_bad_file(&self) -> bool {
        matches!(self, PcapNGError::BadFile(_))
    }
}
