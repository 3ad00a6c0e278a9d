use thiserror::Error;

/// Error returned by every fallible codec operation.
///
/// The concrete failure is carried by [`ErrorKind`]; callers that need to
/// branch on it use [`Error::kind`].
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// The specific failure.
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Consume the error, returning the specific failure.
    #[inline]
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        ErrorKind::ArchiveCorrupt {
            offset,
            reason: reason.into(),
        }
        .into()
    }
}

/// The kinds of failure a container can produce.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A header, signature or declared size does not fit the buffer.
    #[error("archive corrupt at offset {offset}: {reason}")]
    ArchiveCorrupt { offset: usize, reason: String },

    /// No local entries were found. Callers decide whether this is fatal.
    #[error("archive contains no entries")]
    ArchiveEmpty,

    /// Inflating an entry failed or did not yield the declared length.
    #[error("failed to decompress '{name}': {reason}")]
    DecompressionFailed { name: String, reason: String },

    /// The CRC-32 of the decompressed bytes does not match the header.
    #[error("checksum mismatch for '{name}': header {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("unsupported compression method: {0}")]
    UnsupportedCompressionMethod(u16),

    #[error("entry '{0}' is encrypted")]
    EncryptedEntry(String),

    #[error("duplicate entry name: {0}")]
    DuplicateEntry(String),

    /// The entry or archive needs ZIP64 structures, which are not produced or read.
    #[error("too large for a 32-bit container: {0}")]
    TooLarge(String),

    #[error("file not found in archive: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        ErrorKind::Io(err).into()
    }
}

/// Result alias used throughout the codec.
pub type Result<T> = std::result::Result<T, Error>;
