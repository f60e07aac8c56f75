use std::fmt;

/// The taxonomy of DWARF parsing failures (`spec.md` §7 `Parse`/`Format`).
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DwarfErrorKind {
    /// A LEB128 value ran off the end of the buffer without a terminating
    /// byte.
    LebOverflow,
    /// A read would go past the end of the section.
    UnexpectedEof,
    /// `skipForm`/attribute decoding encountered a form it does not know.
    UnknownForm(u64),
    /// A reference (abbrev code, DIE offset, file index, CU offset, ...)
    /// points outside of any known table.
    InvalidReference,
    /// The section's header fields are inconsistent (bad version, bad
    /// length, bad opcode_base, ...).
    MalformedHeader,
}

impl fmt::Display for DwarfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LebOverflow => write!(f, "LEB128 value missing its terminating byte"),
            Self::UnexpectedEof => write!(f, "unexpected end of section"),
            Self::UnknownForm(form) => write!(f, "unknown DWARF form 0x{form:x}"),
            Self::InvalidReference => write!(f, "reference into an unknown table"),
            Self::MalformedHeader => write!(f, "malformed section header"),
        }
    }
}

/// An error parsing a DWARF section.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{0}")]
pub struct DwarfError(pub DwarfErrorKind);

impl DwarfError {
    /// The classification of this error.
    pub fn kind(&self) -> DwarfErrorKind {
        self.0
    }
}

impl From<DwarfErrorKind> for DwarfError {
    fn from(kind: DwarfErrorKind) -> Self {
        DwarfError(kind)
    }
}

/// Convenience alias for fallible DWARF reads.
pub type Result<T> = std::result::Result<T, DwarfError>;
