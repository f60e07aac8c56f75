//! Binary loading: the C1 component of the native debug engine.
//!
//! Maps or reads a Mach-O or ELF64 file, validates its header, and exposes a
//! name-indexed map of DWARF sections with decompression for the GNU
//! `zdebug` framing and ELF `SHF_COMPRESSED` sections (`spec.md` §3, §4.1).

#![warn(missing_docs)]

mod compression;
mod elf;
mod error;
mod image;
mod macho;

pub use crate::compression::CompressionKind;
pub use crate::elf::ElfImage;
pub use crate::error::{ImageError, ImageErrorKind};
pub use crate::image::{dsym_path_for, BinaryImage, Section, SectionData, KNOWN_SECTIONS};
pub use crate::macho::MachOImage;
