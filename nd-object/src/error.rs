use std::error::Error;
use std::fmt;

/// The taxonomy of binary-loading failures (`spec.md` §7).
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageErrorKind {
    /// The buffer is smaller than a minimal header.
    TooSmall,
    /// The magic number doesn't match any supported format.
    InvalidMagic,
    /// A compressed section's header is malformed.
    InvalidCompressedSection,
    /// Decompressing a section's data failed.
    DecompressFailed,
    /// The container's load commands / section headers are malformed.
    Format,
}

impl fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall => write!(f, "buffer too small for a file header"),
            Self::InvalidMagic => write!(f, "unrecognized magic number"),
            Self::InvalidCompressedSection => write!(f, "invalid compressed section header"),
            Self::DecompressFailed => write!(f, "failed to decompress section data"),
            Self::Format => write!(f, "malformed binary container"),
        }
    }
}

/// An error loading or reading sections from a Mach-O or ELF binary.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ImageError {
    kind: ImageErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ImageError {
    /// Creates an error carrying just a kind, with no underlying cause.
    pub fn from_kind(kind: ImageErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Creates an error wrapping an arbitrary underlying cause.
    pub fn new<E>(kind: ImageErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> ImageErrorKind {
        self.kind
    }
}

impl From<goblin::error::Error> for ImageError {
    fn from(e: goblin::error::Error) -> Self {
        Self::new(ImageErrorKind::Format, e)
    }
}

impl From<scroll::Error> for ImageError {
    fn from(e: scroll::Error) -> Self {
        Self::new(ImageErrorKind::Format, e)
    }
}
