//! Unified Mach-O/ELF binary image (`spec.md` §3 "Binary image", §4.1).

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nd_common::{Arch, ByteView};

use crate::compression::{decompress, CompressionKind};
use crate::elf::ElfImage;
use crate::error::{ImageError, ImageErrorKind};
use crate::macho::MachOImage;

/// Generic names of every DWARF section `spec.md` §6 lists as an input
/// format this engine understands. Used to build the section map once at
/// load time rather than re-parsing headers on every lookup.
pub const KNOWN_SECTIONS: &[&str] = &[
    "info",
    "abbrev",
    "line",
    "line_str",
    "str",
    "str_offsets",
    "addr",
    "ranges",
    "rnglists",
    "loc",
    "loclists",
    "aranges",
    "frame",
    "names",
    "macro",
    "eh_frame",
];

/// A located section: its file range, mapped address, and compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    /// Offset of the (still-compressed, if applicable) bytes in the file.
    pub file_offset: u64,
    /// Size of the (still-compressed, if applicable) bytes in the file.
    pub size: u64,
    /// Address the section is mapped at (link-time, before ASLR slide).
    pub address: u64,
    /// How the on-disk bytes need to be transformed to get section contents.
    pub compression: CompressionKind,
}

/// Borrowed-or-owned section bytes, as returned by [`BinaryImage::data`].
pub type SectionData<'d> = Cow<'d, [u8]>;

enum Container<'d> {
    Elf(ElfImage<'d>),
    MachO(MachOImage<'d>),
}

/// A loaded Mach-O or ELF64 binary.
///
/// Owns its backing [`ByteView`] and a name-indexed map of every DWARF
/// section found at load time (`spec.md` §3: "A borrowed byte range plus a
/// mapping *section name → (file offset, size, compression kind)*").
/// Decompressed section buffers are memoized and released when the image is
/// dropped.
pub struct BinaryImage<'d> {
    bytes: ByteView<'d>,
    arch: Arch,
    text_base: u64,
    sections: HashMap<String, Section>,
    cache: RefCell<HashMap<String, Arc<[u8]>>>,
}

impl<'d> BinaryImage<'d> {
    /// Parses `bytes` as either a Mach-O or ELF64 binary, auto-detecting the
    /// format from the magic number.
    pub fn parse(bytes: ByteView<'d>) -> Result<Self, ImageError> {
        let data = bytes.as_slice();
        if data.len() < 4 {
            return Err(ImageError::from_kind(ImageErrorKind::TooSmall));
        }

        if MachOImage::test(data) {
            let macho = MachOImage::parse(data)?;
            let text_base = macho.text_base();
            let arch = macho.arch().unwrap_or(Arch::Arm64);
            let sections = Self::collect_sections(|name| macho.section(name));
            return Ok(BinaryImage {
                bytes,
                arch,
                text_base,
                sections,
                cache: RefCell::new(HashMap::new()),
            });
        }

        if ElfImage::test(data) {
            let elf = ElfImage::parse(data)?;
            let text_base = elf.text_base();
            let arch = elf.arch().unwrap_or(Arch::Amd64);
            let sections = Self::collect_sections(|name| elf.section(name));
            return Ok(BinaryImage {
                bytes,
                arch,
                text_base,
                sections,
                cache: RefCell::new(HashMap::new()),
            });
        }

        Err(ImageError::from_kind(ImageErrorKind::InvalidMagic))
    }

    fn collect_sections(lookup: impl Fn(&str) -> Option<Section>) -> HashMap<String, Section> {
        let mut map = HashMap::new();
        for name in KNOWN_SECTIONS {
            if let Some(section) = lookup(name) {
                map.insert((*name).to_string(), section);
            }
        }
        map
    }

    /// Overrides the detected architecture. Useful for dSYM/.dwo companion
    /// images and fat/thin Mach-O slices where the architecture is better
    /// known from the main image than re-derived from the header.
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    /// The architecture this image was built for.
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// The link-time base address of the text segment, used to compute the
    /// ASLR slide (`spec.md` §3).
    pub fn text_base(&self) -> u64 {
        self.text_base
    }

    /// Looks up a DWARF section by its generic name (e.g. `"info"` for
    /// `.debug_info`/`__debug_info`).
    pub fn section(&self, generic_name: &str) -> Option<Section> {
        self.sections.get(generic_name).copied()
    }

    /// Returns the decompressed bytes of a named section, or `None` if the
    /// section is absent. Decompressed buffers are memoized for the
    /// lifetime of the image.
    pub fn data(&self, generic_name: &str) -> Result<Option<Arc<[u8]>>, ImageError> {
        let Some(section) = self.section(generic_name) else {
            return Ok(None);
        };

        if let Some(cached) = self.cache.borrow().get(generic_name) {
            return Ok(Some(cached.clone()));
        }

        let start = section.file_offset as usize;
        let end = start
            .checked_add(section.size as usize)
            .ok_or_else(|| ImageError::from_kind(ImageErrorKind::Format))?;
        let raw = self
            .bytes
            .as_slice()
            .get(start..end)
            .ok_or_else(|| ImageError::from_kind(ImageErrorKind::Format))?;
        let decompressed: Arc<[u8]> = decompress(raw, section.compression)?.into_owned().into();

        self.cache
            .borrow_mut()
            .insert(generic_name.to_string(), decompressed.clone());
        Ok(Some(decompressed))
    }
}

/// Probes for an Apple dSYM bundle next to `executable_path`, following the
/// conventional layout `<path>.dSYM/Contents/Resources/DWARF/<basename>`
/// (`SPEC_FULL.md` §14).
pub fn dsym_path_for(executable_path: &Path) -> Option<PathBuf> {
    let file_name = executable_path.file_name()?;
    let mut dsym_dir = executable_path.as_os_str().to_owned();
    dsym_dir.push(".dSYM");

    let mut candidate = PathBuf::from(dsym_dir);
    candidate.push("Contents/Resources/DWARF");
    candidate.push(file_name);
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsym_path_follows_apple_convention() {
        let path = Path::new("/tmp/build/myapp");
        let dsym = dsym_path_for(path).unwrap();
        assert_eq!(
            dsym,
            Path::new("/tmp/build/myapp.dSYM/Contents/Resources/DWARF/myapp")
        );
    }

    #[test]
    fn too_small_buffer_is_rejected() {
        let view = ByteView::from_slice(&[0u8; 2]);
        let err = BinaryImage::parse(view).unwrap_err();
        assert_eq!(err.kind(), ImageErrorKind::TooSmall);
    }
}
