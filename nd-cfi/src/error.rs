use std::fmt;

/// The taxonomy of CFI parsing and evaluation failures (`spec.md` §7).
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CfiErrorKind {
    /// A read would go past the end of `.eh_frame`/`.debug_frame`.
    UnexpectedEof,
    /// A CIE/FDE header or the CFA table machine saw something inconsistent
    /// (bad version, length, or `DW_CFA_restore_state` with an empty stack).
    MalformedHeader,
    /// An augmentation string names a letter this unwinder does not parse
    /// (anything past `z`/`L`/`P`/`R`/`S` is skipped, not rejected, but a
    /// non-`z`-prefixed augmentation with unknown letters can't be skipped
    /// safely).
    UnsupportedAugmentation,
    /// A `DW_CFA_*` opcode this unwinder does not implement.
    UnsupportedOperation(u8),
    /// No FDE covers the requested program counter.
    NoFdeForAddress,
    /// The frame walk exceeded its depth limit without reaching a root
    /// frame (`spec.md` §4.9: 50 frames).
    TooManyFrames,
}

impl fmt::Display for CfiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of CFI section"),
            Self::MalformedHeader => write!(f, "malformed CIE/FDE header or CFA program"),
            Self::UnsupportedAugmentation => write!(f, "unsupported CIE augmentation string"),
            Self::UnsupportedOperation(op) => write!(f, "unsupported DW_CFA opcode 0x{op:x}"),
            Self::NoFdeForAddress => write!(f, "no FDE covers this address"),
            Self::TooManyFrames => write!(f, "unwind exceeded the maximum frame depth"),
        }
    }
}

/// An error unwinding a stack frame via call frame information.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{0}")]
pub struct CfiError(pub CfiErrorKind);

impl CfiError {
    /// The classification of this error.
    pub fn kind(&self) -> CfiErrorKind {
        self.0
    }
}

impl From<CfiErrorKind> for CfiError {
    fn from(kind: CfiErrorKind) -> Self {
        CfiError(kind)
    }
}

impl From<nd_dwarf::DwarfError> for CfiError {
    fn from(_: nd_dwarf::DwarfError) -> Self {
        CfiError(CfiErrorKind::UnexpectedEof)
    }
}

/// Convenience alias for fallible CFI operations.
pub type Result<T> = std::result::Result<T, CfiError>;
