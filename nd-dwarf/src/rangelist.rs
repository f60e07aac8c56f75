//! `.debug_ranges` (DWARF ≤4) and `.debug_rnglists` (DWARF5) evaluators
//! (`spec.md` §4.6, component C6).
//!
//! The DWARF4 base-address-selection/terminator shape and the DWARF5
//! `DW_RLE_*` opcode dispatch both follow the offset/base-address idiom
//! `symbolic-debuginfo`'s range handling uses (itself driven by `gimli`'s
//! `RangeLists`), reimplemented here as a direct byte-level evaluator.

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::Reader;

/// One `[start, end)` program-counter range, already relocated to absolute
/// addresses (before ASLR slide; the caller applies the slide).
pub type Range = (u64, u64);

fn no_base_marker(address_size: u8) -> u64 {
    if address_size == 4 {
        u32::MAX as u64
    } else {
        u64::MAX
    }
}

/// Evaluates a DWARF ≤4 `.debug_ranges` list starting at `offset`, relative
/// to `cu_low_pc` (the compilation unit's `DW_AT_low_pc`, used as the
/// initial base address per DWARF4 §2.17.3).
pub fn evaluate_dwarf4(
    data: &[u8],
    offset: usize,
    address_size: u8,
    cu_low_pc: u64,
) -> Result<Vec<Range>> {
    let mut r = Reader::new(data);
    r.seek(offset)?;
    let mut base = cu_low_pc;
    let mut ranges = Vec::new();

    loop {
        let start = r.read_address(address_size)?;
        let end = r.read_address(address_size)?;

        if start == 0 && end == 0 {
            break;
        }
        if start == no_base_marker(address_size) {
            base = end;
            continue;
        }
        ranges.push((base + start, base + end));
    }

    Ok(ranges)
}

/// Evaluates a DWARF5 `.debug_rnglists` list starting at `offset`.
///
/// `resolve_addrx` resolves an index into `.debug_addr` (via the unit's
/// `addr_base`) to an absolute address, for the indexed entry kinds.
pub fn evaluate_dwarf5(
    data: &[u8],
    offset: usize,
    address_size: u8,
    mut resolve_addrx: impl FnMut(u64) -> Result<u64>,
) -> Result<Vec<Range>> {
    let mut r = Reader::new(data);
    r.seek(offset)?;
    let mut base: u64 = 0;
    let mut ranges = Vec::new();

    loop {
        let kind = r.read_u8()?;
        match kind {
            DW_RLE_end_of_list => break,
            DW_RLE_base_addressx => {
                let index = r.read_uleb128()?;
                base = resolve_addrx(index)?;
            }
            DW_RLE_startx_endx => {
                let start_idx = r.read_uleb128()?;
                let end_idx = r.read_uleb128()?;
                ranges.push((resolve_addrx(start_idx)?, resolve_addrx(end_idx)?));
            }
            DW_RLE_startx_length => {
                let start_idx = r.read_uleb128()?;
                let len = r.read_uleb128()?;
                let start = resolve_addrx(start_idx)?;
                ranges.push((start, start + len));
            }
            DW_RLE_offset_pair => {
                let start = r.read_uleb128()?;
                let end = r.read_uleb128()?;
                ranges.push((base + start, base + end));
            }
            DW_RLE_base_address => {
                base = r.read_address(address_size)?;
            }
            DW_RLE_start_end => {
                let start = r.read_address(address_size)?;
                let end = r.read_address(address_size)?;
                ranges.push((start, end));
            }
            DW_RLE_start_length => {
                let start = r.read_address(address_size)?;
                let len = r.read_uleb128()?;
                ranges.push((start, start + len));
            }
            _ => return Err(DwarfErrorKind::MalformedHeader.into()),
        }
    }

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dwarf4_list_applies_base_selection_and_stops_at_terminator() {
        let mut data = Vec::new();
        // base selection: all-1s start, new base 0x2000
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        data.extend_from_slice(&0x2000u64.to_le_bytes());
        // range 0x10..0x20 relative to base
        data.extend_from_slice(&0x10u64.to_le_bytes());
        data.extend_from_slice(&0x20u64.to_le_bytes());
        // terminator
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());

        let ranges = evaluate_dwarf4(&data, 0, 8, 0x1000).unwrap();
        assert_eq!(ranges, vec![(0x2010, 0x2020)]);
    }

    #[test]
    fn dwarf4_list_without_base_selection_uses_cu_low_pc() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x10u64.to_le_bytes());
        data.extend_from_slice(&0x20u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());

        let ranges = evaluate_dwarf4(&data, 0, 8, 0x1000).unwrap();
        assert_eq!(ranges, vec![(0x1010, 0x1020)]);
    }

    #[test]
    fn dwarf5_start_length_entry() {
        let mut data = Vec::new();
        data.push(DW_RLE_start_length);
        data.extend_from_slice(&0x3000u64.to_le_bytes());
        data.push(0x10); // uleb length
        data.push(DW_RLE_end_of_list);

        let ranges = evaluate_dwarf5(&data, 0, 8, |_| Ok(0)).unwrap();
        assert_eq!(ranges, vec![(0x3000, 0x3010)]);
    }

    #[test]
    fn dwarf5_offset_pair_uses_base_address() {
        let mut data = Vec::new();
        data.push(DW_RLE_base_address);
        data.extend_from_slice(&0x5000u64.to_le_bytes());
        data.push(DW_RLE_offset_pair);
        data.push(0x04);
        data.push(0x08);
        data.push(DW_RLE_end_of_list);

        let ranges = evaluate_dwarf5(&data, 0, 8, |_| Ok(0)).unwrap();
        assert_eq!(ranges, vec![(0x5004, 0x5008)]);
    }

    #[test]
    fn dwarf5_unknown_opcode_is_malformed() {
        let data = vec![0xEE];
        let err = evaluate_dwarf5(&data, 0, 8, |_| Ok(0)).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::MalformedHeader);
    }
}
