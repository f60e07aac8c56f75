//! Cursor over a DWARF section: LEB128/fixed-width reads and `skipForm`
//! (`spec.md` §4.2, component C2).
//!
//! Grounded on `zanesterling-mecha-dwarf/src/leb.rs` for the LEB128 decode
//! loops, generalized into a cursor so the rest of this crate can share one
//! read primitive instead of threading `(buf, offset)` pairs by hand.

use crate::error::{DwarfError, DwarfErrorKind, Result};
use crate::constants::*;

/// DWARF32 vs DWARF64, i.e. whether section-relative offsets are 4 or 8
/// bytes wide. Selected per compilation unit by its initial length field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// 4-byte offsets (the overwhelming majority of binaries in practice).
    Dwarf32,
    /// 8-byte offsets, signaled by the `0xffffffff` escape value.
    Dwarf64,
}

impl Format {
    /// Width in bytes of a section offset in this format.
    pub fn offset_size(self) -> u8 {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 8,
        }
    }
}

/// A forward-only cursor over a byte slice, tracking its own position.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Starts a cursor at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    /// Current byte offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Seeks to an absolute offset from the start of the original slice.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(DwarfErrorKind::UnexpectedEof.into());
        }
        self.pos = offset;
        Ok(())
    }

    /// Advances past `n` bytes without interpreting them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(DwarfErrorKind::UnexpectedEof.into());
        }
        self.pos += n;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DwarfErrorKind::UnexpectedEof.into());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a single signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads an address-sized (4 or 8 byte) little-endian value.
    pub fn read_address(&mut self, address_size: u8) -> Result<u64> {
        match address_size {
            4 => Ok(self.read_u32()? as u64),
            8 => self.read_u64(),
            _ => Err(DwarfErrorKind::MalformedHeader.into()),
        }
    }

    /// Reads a 4- or 8-byte section offset per `format`.
    pub fn read_offset(&mut self, format: Format) -> Result<u64> {
        match format {
            Format::Dwarf32 => Ok(self.read_u32()? as u64),
            Format::Dwarf64 => self.read_u64(),
        }
    }

    /// Reads an exact byte run.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a NUL-terminated byte string, returning it without the
    /// terminator and advancing past it.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(&self.data[start..self.pos - 1]);
            }
        }
    }

    /// Reads the DWARF "initial length" field: a `u32`, or the DWARF64
    /// escape `0xffffffff` followed by a `u64`. Returns the detected format
    /// alongside the length.
    pub fn read_initial_length(&mut self) -> Result<(Format, u64)> {
        let first = self.read_u32()?;
        if first == 0xffff_ffff {
            Ok((Format::Dwarf64, self.read_u64()?))
        } else if first >= 0xffff_fff0 {
            Err(DwarfErrorKind::MalformedHeader.into())
        } else {
            Ok((Format::Dwarf32, first as u64))
        }
    }

    /// Reads an unsigned LEB128 value.
    ///
    /// Mirrors `zanesterling-mecha-dwarf`'s `uleb128_decode`, generalized to
    /// read directly from the cursor and to report `LebOverflow` rather than
    /// panicking when a value does not fit in 64 bits.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as u64) << shift;
            } else if byte & 0x7f != 0 {
                return Err(DwarfErrorKind::LebOverflow.into());
            }
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            if shift > 70 {
                return Err(DwarfErrorKind::LebOverflow.into());
            }
        }
    }

    /// Reads a signed LEB128 value.
    pub fn read_sleb128(&mut self) -> Result<i64> {
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        let mut byte;
        loop {
            byte = self.read_u8()?;
            if shift < 64 {
                result |= ((byte & 0x7f) as i64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
            if shift > 70 {
                return Err(DwarfErrorKind::LebOverflow.into());
            }
        }
        if shift < 64 && (byte & 0x40) != 0 {
            result |= -1i64 << shift;
        }
        Ok(result)
    }

    /// Consumes the bytes of one value in `form` without interpreting them,
    /// following `DW_FORM_indirect` to the form it names.
    ///
    /// `spec.md` §4.2: "must not advance beyond the buffer end and must
    /// report `UnknownForm` rather than guessing."
    pub fn skip_form(&mut self, form: u64, address_size: u8, format: Format) -> Result<()> {
        match form {
            DW_FORM_addr => self.skip(address_size as usize),
            DW_FORM_block2 => {
                let len = self.read_u16()? as usize;
                self.skip(len)
            }
            DW_FORM_block4 => {
                let len = self.read_u32()? as usize;
                self.skip(len)
            }
            DW_FORM_data2 | DW_FORM_ref2 => self.skip(2),
            DW_FORM_data4 | DW_FORM_ref4 | DW_FORM_ref_sup4 => self.skip(4),
            DW_FORM_data8 | DW_FORM_ref8 | DW_FORM_ref_sig8 | DW_FORM_ref_sup8 => self.skip(8),
            DW_FORM_data16 => self.skip(16),
            DW_FORM_string => {
                self.read_cstr()?;
                Ok(())
            }
            DW_FORM_block | DW_FORM_exprloc => {
                let len = self.read_uleb128()? as usize;
                self.skip(len)
            }
            DW_FORM_block1 => {
                let len = self.read_u8()? as usize;
                self.skip(len)
            }
            DW_FORM_data1 | DW_FORM_ref1 | DW_FORM_flag | DW_FORM_strx1 | DW_FORM_addrx1 => {
                self.skip(1)
            }
            DW_FORM_strx2 | DW_FORM_addrx2 => self.skip(2),
            DW_FORM_strx3 | DW_FORM_addrx3 => self.skip(3),
            DW_FORM_strx4 | DW_FORM_addrx4 => self.skip(4),
            DW_FORM_sdata => {
                self.read_sleb128()?;
                Ok(())
            }
            DW_FORM_udata
            | DW_FORM_ref_udata
            | DW_FORM_strx
            | DW_FORM_addrx
            | DW_FORM_loclistx
            | DW_FORM_rnglistx => {
                self.read_uleb128()?;
                Ok(())
            }
            DW_FORM_strp
            | DW_FORM_line_strp
            | DW_FORM_sec_offset
            | DW_FORM_ref_addr
            | DW_FORM_strp_sup => self.skip(format.offset_size() as usize),
            DW_FORM_flag_present | DW_FORM_implicit_const => Ok(()),
            DW_FORM_indirect => {
                let inner = self.read_uleb128()?;
                self.skip_form(inner, address_size, format)
            }
            other => Err(DwarfErrorKind::UnknownForm(other).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb128_decodes_multibyte() {
        // 624485 -> 0xE5 0x8E 0x26 (DWARF spec example).
        let mut r = Reader::new(&[0xE5, 0x8E, 0x26]);
        assert_eq!(r.read_uleb128().unwrap(), 624485);
        assert!(r.is_empty());
    }

    #[test]
    fn uleb128_decodes_single_byte() {
        let mut r = Reader::new(&[0x02]);
        assert_eq!(r.read_uleb128().unwrap(), 2);
    }

    #[test]
    fn sleb128_decodes_negative() {
        // -2 -> 0x7e (DWARF spec example).
        let mut r = Reader::new(&[0x7e]);
        assert_eq!(r.read_sleb128().unwrap(), -2);
    }

    #[test]
    fn sleb128_decodes_positive_requiring_sign_clear() {
        // 63 -> 0x3f (top bit of final group is 0, no sign extension needed).
        let mut r = Reader::new(&[0x3f]);
        assert_eq!(r.read_sleb128().unwrap(), 63);
    }

    #[test]
    fn sleb128_decodes_multibyte_negative() {
        // -129 -> 0xFF 0x7E
        let mut r = Reader::new(&[0xff, 0x7e]);
        assert_eq!(r.read_sleb128().unwrap(), -129);
    }

    #[test]
    fn uleb128_missing_terminator_is_overflow_free_error() {
        let mut r = Reader::new(&[0x80, 0x80, 0x80]);
        let err = r.read_uleb128().unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::UnexpectedEof);
    }

    #[test]
    fn initial_length_detects_dwarf64_escape() {
        let mut bytes = vec![0xff, 0xff, 0xff, 0xff];
        bytes.extend_from_slice(&42u64.to_le_bytes());
        let mut r = Reader::new(&bytes);
        let (format, len) = r.read_initial_length().unwrap();
        assert_eq!(format, Format::Dwarf64);
        assert_eq!(len, 42);
    }

    #[test]
    fn initial_length_plain_u32_is_dwarf32() {
        let mut r = Reader::new(&100u32.to_le_bytes());
        let (format, len) = r.read_initial_length().unwrap();
        assert_eq!(format, Format::Dwarf32);
        assert_eq!(len, 100);
    }

    #[test]
    fn skip_form_block1_consumes_length_prefixed_bytes() {
        let mut r = Reader::new(&[0x03, 0xaa, 0xbb, 0xcc, 0xff]);
        r.skip_form(DW_FORM_block1, 8, Format::Dwarf32).unwrap();
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn skip_form_unknown_form_is_reported_not_guessed() {
        let mut r = Reader::new(&[0x00, 0x00]);
        let err = r.skip_form(0x9999, 8, Format::Dwarf32).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::UnknownForm(0x9999));
    }

    #[test]
    fn skip_form_indirect_follows_named_form() {
        // DW_FORM_indirect names DW_FORM_data2 (2), then 2 bytes of payload.
        let mut r = Reader::new(&[0x05, 0xaa, 0xbb]);
        r.skip_form(DW_FORM_indirect, 8, Format::Dwarf32).unwrap();
        assert_eq!(r.position(), 3);
    }

    #[test]
    fn read_cstr_stops_before_nul_and_advances_past_it() {
        let mut r = Reader::new(b"abc\0def");
        assert_eq!(r.read_cstr().unwrap(), b"abc");
        assert_eq!(r.read_bytes(3).unwrap(), b"def");
    }
}
