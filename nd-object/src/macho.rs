//! Mach-O 64-bit section discovery (`spec.md` §4.1).

use goblin::mach::constants::cputype;
use goblin::mach::MachO;

use crate::compression::{decompress, CompressionKind};
use crate::error::{ImageError, ImageErrorKind};
use crate::{Section, SectionData};
use nd_common::Arch;

/// Little-endian 64-bit Mach-O magic, the only variant `spec.md` §4.1 asks
/// us to recognize.
const MH_MAGIC_64: u32 = 0xFEED_FACF;

/// A parsed 64-bit Mach-O binary, exposing DWARF section lookup.
pub struct MachOImage<'d> {
    macho: MachO<'d>,
    data: &'d [u8],
}

impl<'d> MachOImage<'d> {
    /// Returns `true` if `data` begins with the 64-bit Mach-O magic number.
    pub fn test(data: &[u8]) -> bool {
        data.get(0..4).map_or(false, |magic| {
            u32::from_le_bytes([magic[0], magic[1], magic[2], magic[3]]) == MH_MAGIC_64
        })
    }

    /// Parses a 64-bit Mach-O binary from `data`.
    pub fn parse(data: &'d [u8]) -> Result<Self, ImageError> {
        if data.len() < 32 {
            return Err(ImageError::from_kind(ImageErrorKind::TooSmall));
        }
        if !Self::test(data) {
            return Err(ImageError::from_kind(ImageErrorKind::InvalidMagic));
        }
        let macho = MachO::parse(data, 0)?;
        Ok(MachOImage { macho, data })
    }

    /// The `vmaddr` of the `__TEXT` segment, used to compute the ASLR slide.
    pub fn text_base(&self) -> u64 {
        for segment in &self.macho.segments {
            if segment.name().map(|name| name == "__TEXT").unwrap_or(false) {
                return segment.vmaddr;
            }
        }
        0
    }

    /// The target architecture, as recorded in the Mach header's `cputype`.
    pub fn arch(&self) -> Option<Arch> {
        match self.macho.header.cputype() {
            cputype::CPU_TYPE_X86_64 => Some(Arch::Amd64),
            cputype::CPU_TYPE_ARM64 => Some(Arch::Arm64),
            _ => None,
        }
    }

    /// Locates a DWARF section by its *generic* name (e.g. `"info"` for
    /// `__debug_info`), matching `__debug_*`/`__zdebug_*` prefixes and the
    /// 16-byte truncated-name aliases described in `spec.md` §4.1. The
    /// unwinder's `.eh_frame` (`"eh_frame"`) lives in `__TEXT,__eh_frame`
    /// instead, with neither prefix nor compression.
    pub fn section(&self, generic_name: &str) -> Option<Section> {
        for segment in &self.macho.segments {
            let in_text = segment.name().map(|name| name == "__TEXT").unwrap_or(false);
            for result in segment.into_iter() {
                let Ok((header, _)) = result else {
                    continue;
                };
                let Ok(raw_name) = header.name() else {
                    continue;
                };

                let (compression, suffix) = if in_text && raw_name == "__eh_frame" {
                    (CompressionKind::None, "eh_frame")
                } else if let Some(rest) = raw_name.strip_prefix("__debug_") {
                    (CompressionKind::None, rest)
                } else if let Some(rest) = raw_name.strip_prefix("__zdebug_") {
                    (CompressionKind::Zdebug, rest)
                } else {
                    continue;
                };

                // Mach-O section names are fixed 16-byte fields; a name that
                // would not fit is silently truncated by the producer. Treat
                // a 16-byte raw name as a truncated prefix match, and any
                // shorter name as exact.
                let matches = if raw_name.len() == 16 {
                    generic_name.starts_with(suffix)
                } else {
                    suffix == generic_name
                };
                if !matches {
                    continue;
                }

                // dsymutil sometimes leaves a section header with its data
                // stripped (offset == 0 despite a nonzero size).
                if header.offset == 0 {
                    return None;
                }

                return Some(Section {
                    file_offset: u64::from(header.offset),
                    size: header.size,
                    address: header.addr,
                    compression,
                });
            }
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
        let err = MachOImage::parse(&[0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), ImageErrorKind::TooSmall);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 64];
        let err = MachOImage::parse(&buf).unwrap_err();
        assert_eq!(err.kind(), ImageErrorKind::InvalidMagic);
    }

    #[test]
    fn test_detects_magic() {
        let mut buf = vec![0u8; 32];
        buf[0..4].copy_from_slice(&MH_MAGIC_64.to_le_bytes());
        assert!(MachOImage::test(&buf));
    }
}
