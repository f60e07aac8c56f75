use std::error::Error;
use std::fmt;

/// The taxonomy of engine-driver failures (`spec.md` §7).
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// File not found, or an incomplete read of a target binary.
    Io,
    /// Invalid magic, truncated header, unknown form, or an arithmetic
    /// overflow while parsing a static table.
    Format,
    /// A compressed section failed to decompress.
    Decompress,
    /// Spawn failed, there is no live process, or the host's Process
    /// Control backend does not implement a required syscall.
    Process,
    /// Reverse execution, a data breakpoint off ARM64, or any mutation
    /// through a read-only (core-dump) backend.
    NotSupported,
    /// A named function, variable, or symbol could not be resolved.
    NotFound,
    /// A LEB128 overflow or an out-of-bounds section read while decoding
    /// debug info at stop time (as opposed to permissive table-building,
    /// which swallows these rather than propagating them).
    Parse,
    /// A variable is optimized out, or is register-resident and cannot be
    /// written.
    Policy,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "i/o error"),
            Self::Format => write!(f, "malformed binary or debug info"),
            Self::Decompress => write!(f, "failed to decompress a section"),
            Self::Process => write!(f, "process control failure"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::NotFound => write!(f, "not found"),
            Self::Parse => write!(f, "parse error"),
            Self::Policy => write!(f, "policy violation"),
        }
    }
}

/// An error from the engine driver, the breakpoint manager, or the
/// variable inspector.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct EngineError {
    kind: EngineErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl EngineError {
    /// Creates an error carrying just a kind, with no underlying cause.
    pub fn from_kind(kind: EngineErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Creates an error wrapping an arbitrary underlying cause.
    pub fn new<E>(kind: EngineErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }
}

impl From<nd_object::ImageError> for EngineError {
    fn from(e: nd_object::ImageError) -> Self {
        use nd_object::ImageErrorKind::*;
        let kind = match e.kind() {
            TooSmall | InvalidMagic | Format => EngineErrorKind::Format,
            InvalidCompressedSection | DecompressFailed => EngineErrorKind::Decompress,
        };
        Self::new(kind, e)
    }
}

impl From<nd_dwarf::DwarfError> for EngineError {
    fn from(e: nd_dwarf::DwarfError) -> Self {
        Self::new(EngineErrorKind::Parse, e)
    }
}

impl From<nd_cfi::CfiError> for EngineError {
    fn from(e: nd_cfi::CfiError) -> Self {
        Self::new(EngineErrorKind::Parse, e)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::new(EngineErrorKind::Io, e)
    }
}

/// Convenience alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
