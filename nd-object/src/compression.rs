//! Section compression handling (`spec.md` §3, §4.1).

use std::borrow::Cow;

use flate2::{Decompress, FlushDecompress};
use goblin::container::{Container, Ctx, Endian};
use goblin::elf::compression_header::{CompressionHeader, ELFCOMPRESS_ZLIB};

use crate::error::{ImageError, ImageErrorKind};

/// How a section's on-disk bytes relate to its decoded contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionKind {
    /// The section holds raw, uncompressed data.
    None,
    /// GNU `zdebug`-style framing: 4-byte `"ZLIB"` magic, 8-byte big-endian
    /// uncompressed size, then a zlib stream.
    Zdebug,
    /// ELF `SHF_COMPRESSED`, 32-bit `Chdr`.
    Elf32,
    /// ELF `SHF_COMPRESSED`, 64-bit `Chdr`.
    Elf64,
}

/// Decompresses `section_data` according to `kind`.
///
/// Returns the data unchanged (as a borrow) when `kind` is
/// [`CompressionKind::None`], and an owned, decompressed buffer otherwise.
pub fn decompress<'d>(
    section_data: &'d [u8],
    kind: CompressionKind,
) -> Result<Cow<'d, [u8]>, ImageError> {
    let (size_hint, compressed) = match kind {
        CompressionKind::None => return Ok(Cow::Borrowed(section_data)),
        CompressionKind::Zdebug => {
            if section_data.len() < 12 || &section_data[0..4] != b"ZLIB" {
                return Err(ImageError::from_kind(ImageErrorKind::InvalidCompressedSection));
            }
            let mut size_bytes = [0u8; 8];
            size_bytes.copy_from_slice(&section_data[4..12]);
            (u64::from_be_bytes(size_bytes), &section_data[12..])
        }
        CompressionKind::Elf32 | CompressionKind::Elf64 => {
            let container = if kind == CompressionKind::Elf64 {
                Container::Big
            } else {
                Container::Little
            };
            // `Container` here only distinguishes Chdr32 vs Chdr64 layout.
            // Byte order is little-endian since both architectures this
            // engine supports (x86-64, AArch64) are little-endian only.
            let ctx = Ctx::new(container, Endian::Little);
            let header = CompressionHeader::parse(section_data, 0, ctx)
                .map_err(|e| ImageError::new(ImageErrorKind::InvalidCompressedSection, e))?;
            if header.ch_type != ELFCOMPRESS_ZLIB {
                return Err(ImageError::from_kind(ImageErrorKind::InvalidCompressedSection));
            }
            let header_size = CompressionHeader::size(ctx);
            if section_data.len() < header_size {
                return Err(ImageError::from_kind(ImageErrorKind::InvalidCompressedSection));
            }
            (header.ch_size, &section_data[header_size..])
        }
    };

    let mut decompressed = Vec::with_capacity(size_hint as usize);
    Decompress::new(true)
        .decompress_vec(compressed, &mut decompressed, FlushDecompress::Finish)
        .map_err(|e| ImageError::new(ImageErrorKind::DecompressFailed, e))?;

    Ok(Cow::Owned(decompressed))
}
