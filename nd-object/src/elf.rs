//! ELF64 section discovery (`spec.md` §4.1).

use goblin::elf::{self, Elf};

use crate::compression::{decompress, CompressionKind};
use crate::error::{ImageError, ImageErrorKind};
use crate::{Section, SectionData};
use nd_common::Arch;

const SHF_COMPRESSED: u64 = elf::section_header::SHF_COMPRESSED as u64;

/// A parsed ELF64 binary, exposing DWARF section lookup.
pub struct ElfImage<'d> {
    elf: Elf<'d>,
    data: &'d [u8],
}

impl<'d> ElfImage<'d> {
    /// Returns `true` if `data` begins with the ELF magic number.
    pub fn test(data: &[u8]) -> bool {
        data.get(0..elf::header::SELFMAG)
            .map_or(false, |magic| magic == elf::header::ELFMAG)
    }

    /// Parses an ELF64 binary from `data`.
    pub fn parse(data: &'d [u8]) -> Result<Self, ImageError> {
        if data.len() < elf::header::SIZEOF_EHDR {
            return Err(ImageError::from_kind(ImageErrorKind::TooSmall));
        }
        if !Self::test(data) {
            return Err(ImageError::from_kind(ImageErrorKind::InvalidMagic));
        }
        let elf = Elf::parse(data)?;
        Ok(ElfImage { elf, data })
    }

    /// The `__TEXT`-equivalent load bias: the virtual address of the first
    /// `PT_LOAD` segment, used to compute the ASLR slide (`spec.md` §3).
    pub fn text_base(&self) -> u64 {
        self.elf
            .program_headers
            .iter()
            .find(|ph| ph.p_type == elf::program_header::PT_LOAD)
            .map(|ph| ph.p_vaddr)
            .unwrap_or(0)
    }

    /// Whether the target is 64-bit (always true; this loader only accepts
    /// ELF64 per `spec.md` §6).
    pub fn is_64(&self) -> bool {
        self.elf.is_64
    }

    /// The target architecture, as recorded in `e_machine`.
    pub fn arch(&self) -> Option<Arch> {
        match self.elf.header.e_machine {
            elf::header::EM_X86_64 => Some(Arch::Amd64),
            elf::header::EM_AARCH64 => Some(Arch::Arm64),
            _ => None,
        }
    }

    /// Locates a DWARF section by its *generic* name (e.g. `"info"` for
    /// `.debug_info`), honoring the `.zdebug_*` prefix and `SHF_COMPRESSED`
    /// compression conventions of `spec.md` §3/§4.1. The unwinder's
    /// `.eh_frame` (`"eh_frame"`) is looked up by exact name instead, since
    /// it carries neither the `.debug_`/`.zdebug_` prefix nor compression.
    /// A trailing `.dwo` (DWARF5 §7.3.2's Split-DWARF object naming, e.g.
    /// `.debug_info.dwo`) is stripped before prefix matching, so the same
    /// lookup also serves `.dwo` companion objects (`spec.md` §4.8).
    pub fn section(&self, generic_name: &str) -> Option<Section> {
        for header in &self.elf.section_headers {
            if header.sh_type == elf::section_header::SHT_NOBITS {
                continue;
            }
            let Some(raw_name) = self.elf.shdr_strtab.get_at(header.sh_name) else {
                continue;
            };
            if raw_name.is_empty() || header.sh_offset == 0 {
                continue;
            }
            let name = raw_name.strip_suffix(".dwo").unwrap_or(raw_name);

            let (compression, bare_name) = if name == ".eh_frame" {
                (CompressionKind::None, "eh_frame")
            } else if let Some(rest) = name.strip_prefix(".zdebug_") {
                (CompressionKind::Zdebug, rest)
            } else if let Some(rest) = name.strip_prefix(".debug_") {
                if header.sh_flags & SHF_COMPRESSED != 0 {
                    let kind = if self.elf.is_64 {
                        CompressionKind::Elf64
                    } else {
                        CompressionKind::Elf32
                    };
                    (kind, rest)
                } else {
                    (CompressionKind::None, rest)
                }
            } else {
                continue;
            };

            if bare_name != generic_name {
                continue;
            }

            return Some(Section {
                file_offset: header.sh_offset,
                size: header.sh_size,
                address: header.sh_addr,
                compression,
            });
        }
        None
    }

    /// Returns the (decompressed, if needed) bytes of a DWARF section.
    pub fn data(&self, section: &Section) -> Result<SectionData<'d>, ImageError> {
        let start = section.file_offset as usize;
        let end = start
            .checked_add(section.size as usize)
            .ok_or_else(|| ImageError::from_kind(ImageErrorKind::Format))?;
        let raw = self
            .data
            .get(start..end)
            .ok_or_else(|| ImageError::from_kind(ImageErrorKind::Format))?;
        decompress(raw, section.compression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_small_buffer() {
        let err = ElfImage::parse(&[0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ImageErrorKind::TooSmall);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'Z']);
        let err = ElfImage::parse(&buf).unwrap_err();
        assert_eq!(err.kind(), ImageErrorKind::InvalidMagic);
    }
}
