//! Frame Description Entry parsing and a binary-search index over every FDE
//! in a section (`spec.md` §4.9).

use std::collections::HashMap;

use nd_dwarf::Reader;

use crate::cie::{self, Cie};
use crate::error::{CfiErrorKind, Result};
use crate::pointer::{self, PointerBases};

/// A parsed Frame Description Entry.
#[derive(Clone, Debug)]
pub struct Fde {
    /// Offset of this FDE within its section.
    pub offset: u64,
    /// Offset of the CIE this FDE's rules extend.
    pub cie_offset: u64,
    /// The first address this FDE's program counter range covers.
    pub initial_location: u64,
    /// Number of bytes the covered range spans, starting at
    /// `initial_location`.
    pub address_range: u64,
    /// The program that builds on the CIE's initial rules for this specific
    /// range of code.
    pub instructions: Vec<u8>,
}

impl Fde {
    /// Whether `pc` falls within this FDE's covered range.
    pub fn covers(&self, pc: u64) -> bool {
        pc >= self.initial_location && pc < self.initial_location + self.address_range
    }
}

/// Parses one FDE at `offset`, given the CIE it references.
///
/// `section_runtime_addr` is the runtime (post-slide) address of the start
/// of this section, needed to resolve `DW_EH_PE_pcrel`-encoded
/// `initial_location`/`address_range` fields.
pub fn parse(
    data: &[u8],
    offset: usize,
    cie: &Cie,
    is_eh_frame: bool,
    section_runtime_addr: u64,
) -> Result<Fde> {
    let mut r = Reader::new(data);
    r.seek(offset)?;

    let length = r.read_u32()?;
    let (is64, length) = if length == 0xffff_ffff {
        (true, r.read_u64()?)
    } else {
        (false, length as u64)
    };
    let body_end = r.position() + length as usize;

    let _cie_pointer = if is64 { r.read_u64()? } else { r.read_u32()? as u64 };

    let encoding = if is_eh_frame { cie.fde_pointer_encoding } else { 0x00 };
    let bases = PointerBases::default();

    let here = section_runtime_addr + r.position() as u64;
    let initial_location = pointer::read_encoded_pointer(&mut r, encoding, here, bases)?
        .ok_or(CfiErrorKind::MalformedHeader)?;

    // The range length always uses the same format as initial_location but
    // is never itself relative (DWARF's "Linux Standard Base" eh_frame
    // convention): read the absolute-value variant of the same format.
    let length_encoding = encoding & 0x0f;
    let here = section_runtime_addr + r.position() as u64;
    let address_range = pointer::read_encoded_pointer(&mut r, length_encoding, here, bases)?
        .ok_or(CfiErrorKind::MalformedHeader)?;

    if is_eh_frame && !cie_has_no_augmentation_data(cie) {
        let augmentation_data_len = r.read_uleb128()?;
        r.skip(augmentation_data_len as usize)?;
    }

    let instructions = r.rest()[..body_end.saturating_sub(r.position())].to_vec();

    Ok(Fde {
        offset: offset as u64,
        cie_offset: cie.offset,
        initial_location,
        address_range,
        instructions,
    })
}

fn cie_has_no_augmentation_data(cie: &Cie) -> bool {
    cie.fde_pointer_encoding == 0x00 && cie.lsda_encoding.is_none()
}

/// Reads just enough of the FDE header at `offset` to resolve which CIE it
/// references, without needing that CIE's pointer encoding first (unlike
/// [`parse`], which needs the CIE to decode the rest of the header).
pub fn peek_cie_offset(data: &[u8], offset: usize, is_eh_frame: bool) -> Result<u64> {
    let mut r = Reader::new(data);
    r.seek(offset)?;

    let length = r.read_u32()?;
    let is64 = length == 0xffff_ffff;
    if is64 {
        let _ = r.read_u64()?;
    }

    let id_field_pos = r.position();
    let id = if is64 { r.read_u64()? } else { r.read_u32()? as u64 };

    if is_eh_frame {
        (id_field_pos as u64).checked_sub(id).ok_or_else(|| CfiErrorKind::MalformedHeader.into())
    } else {
        Ok(id)
    }
}

/// One `(initial_location, fde_offset)` pair, sorted so the index can
/// binary-search by PC.
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    start: u64,
    length: u64,
    fde_offset: u64,
}

/// A binary-search index over every FDE in a `.eh_frame`/`.debug_frame`
/// section, built by a single linear scan (neither section carries a
/// dedicated lookup table the way `.debug_aranges` does for `.debug_info`).
#[derive(Clone, Debug, Default)]
pub struct FdeIndex {
    entries: Vec<IndexEntry>,
    cies: HashMap<u64, Cie>,
}

impl FdeIndex {
    /// Scans the whole section once, caching every CIE encountered and
    /// indexing every FDE's covered range.
    pub fn build(data: &[u8], is_eh_frame: bool, section_runtime_addr: u64) -> Result<Self> {
        let mut cies = HashMap::new();
        let mut entries = Vec::new();
        let mut r = Reader::new(data);

        while !r.is_empty() {
            let record_offset = r.position();
            let length = r.read_u32()?;
            let (is64, length) = if length == 0xffff_ffff {
                (true, r.read_u64()?)
            } else {
                (false, length as u64)
            };
            if length == 0 {
                break;
            }
            let record_end = r.position() + length as usize;

            let id_field_pos = r.position();
            let id = if is64 { r.read_u64()? } else { r.read_u32()? as u64 };
            let is_cie = if is_eh_frame { id == 0 } else { id == u64::MAX || id == u32::MAX as u64 };

            if is_cie {
                let cie = cie::parse(data, record_offset, is_eh_frame)?;
                cies.insert(record_offset as u64, cie);
            } else {
                let cie_offset = if is_eh_frame {
                    // eh_frame's CIE pointer is the *distance back* from the
                    // field itself to the CIE's start.
                    (id_field_pos as u64)
                        .checked_sub(id)
                        .ok_or(CfiErrorKind::MalformedHeader)?
                } else {
                    id
                };
                let cie = cies.get(&cie_offset).ok_or(CfiErrorKind::MalformedHeader)?;
                let fde = parse(data, record_offset, cie, is_eh_frame, section_runtime_addr)?;
                entries.push(IndexEntry {
                    start: fde.initial_location,
                    length: fde.address_range,
                    fde_offset: fde.offset,
                });
            }

            r.seek(record_end)?;
        }

        entries.sort_by_key(|e| e.start);
        Ok(FdeIndex { entries, cies })
    }

    /// Finds the FDE covering `pc`, re-parsing it from the cached section
    /// bytes (FDEs aren't cached themselves since each is only used once
    /// per stop, unlike their CIEs which every FDE in a unit shares).
    pub fn find_fde_offset(&self, pc: u64) -> Option<u64> {
        let idx = self.entries.partition_point(|e| e.start <= pc);
        self.entries[..idx]
            .iter()
            .rev()
            .find(|e| pc < e.start + e.length)
            .map(|e| e.fde_offset)
    }

    /// Looks up a CIE by its section offset.
    pub fn cie(&self, offset: u64) -> Option<&Cie> {
        self.cies.get(&offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_uleb(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    fn build_section() -> Vec<u8> {
        let mut cie_body = Vec::new();
        cie_body.extend_from_slice(&0u32.to_le_bytes()); // cie id
        cie_body.push(1); // version
        cie_body.push(0); // empty augmentation string
        encode_uleb(1, &mut cie_body); // code_alignment_factor
        cie_body.push(0x78); // data_alignment_factor = -8 (sleb128)
        cie_body.push(16); // return_address_register
        cie_body.extend_from_slice(&[0x0c, 0x07, 0x08]);

        let mut cie_record = Vec::new();
        cie_record.extend_from_slice(&(cie_body.len() as u32).to_le_bytes());
        cie_record.extend_from_slice(&cie_body);

        let cie_offset = 0u32;
        let mut fde_body = Vec::new();
        let cie_pointer_field_offset = cie_record.len() as u32 + 4;
        fde_body.extend_from_slice(&(cie_pointer_field_offset - cie_offset).to_le_bytes());
        fde_body.extend_from_slice(&0x1000u64.to_le_bytes()); // initial_location (absptr)
        fde_body.extend_from_slice(&0x100u64.to_le_bytes()); // address_range
        fde_body.extend_from_slice(&[0x40, 0x0e, 0x10]); // advance_loc(0) + def_cfa_offset(16)

        let mut fde_record = Vec::new();
        fde_record.extend_from_slice(&(fde_body.len() as u32).to_le_bytes());
        fde_record.extend_from_slice(&fde_body);

        let mut data = cie_record;
        data.extend_from_slice(&fde_record);
        data
    }

    #[test]
    fn index_finds_fde_for_covered_pc() {
        let data = build_section();
        let index = FdeIndex::build(&data, true, 0).unwrap();
        let fde_offset = index.find_fde_offset(0x1050).unwrap();
        let cie = index.cie(0).unwrap();
        let fde = parse(&data, fde_offset as usize, cie, true, 0).unwrap();
        assert_eq!(fde.initial_location, 0x1000);
        assert_eq!(fde.address_range, 0x100);
        assert!(fde.covers(0x1050));
        assert!(!fde.covers(0x2000));
        assert!(index.find_fde_offset(0x2000).is_none());
    }
}
