//! `.debug_loc` (DWARF ≤4) and `.debug_loclists` (DWARF5) evaluators
//! (`spec.md` §4.6, component C6).
//!
//! Structured the same way as `nd_dwarf::rangelist`: each entry covers a PC
//! range and carries a location expression for that range, evaluated lazily
//! against the live program counter rather than pre-expanded, since the
//! current PC is only known once a frame stops.

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::Reader;

/// One PC range paired with the location expression valid for it.
#[derive(Clone, Debug, PartialEq)]
pub struct LocEntry {
    pub range: (u64, u64),
    pub expr: Vec<u8>,
}

fn no_base_marker(address_size: u8) -> u64 {
    if address_size == 4 {
        u32::MAX as u64
    } else {
        u64::MAX
    }
}

/// Evaluates a DWARF ≤4 `.debug_loc` list starting at `offset`.
pub fn evaluate_dwarf4(
    data: &[u8],
    offset: usize,
    address_size: u8,
    cu_low_pc: u64,
) -> Result<Vec<LocEntry>> {
    let mut r = Reader::new(data);
    r.seek(offset)?;
    let mut base = cu_low_pc;
    let mut entries = Vec::new();

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

        let len = r.read_u16()? as usize;
        let expr = r.read_bytes(len)?.to_vec();
        entries.push(LocEntry {
            range: (base + start, base + end),
            expr,
        });
    }

    Ok(entries)
}

/// Evaluates a DWARF5 `.debug_loclists` list starting at `offset`.
pub fn evaluate_dwarf5(
    data: &[u8],
    offset: usize,
    address_size: u8,
    mut resolve_addrx: impl FnMut(u64) -> Result<u64>,
) -> Result<Vec<LocEntry>> {
    let mut r = Reader::new(data);
    r.seek(offset)?;
    let mut base: u64 = 0;
    let mut entries = Vec::new();

    let mut read_expr = |r: &mut Reader<'_>| -> Result<Vec<u8>> {
        let len = r.read_uleb128()? as usize;
        Ok(r.read_bytes(len)?.to_vec())
    };

    loop {
        let kind = r.read_u8()?;
        match kind {
            DW_LLE_end_of_list => break,
            DW_LLE_base_addressx => {
                let index = r.read_uleb128()?;
                base = resolve_addrx(index)?;
            }
            DW_LLE_startx_endx => {
                let start_idx = r.read_uleb128()?;
                let end_idx = r.read_uleb128()?;
                let expr = read_expr(&mut r)?;
                entries.push(LocEntry {
                    range: (resolve_addrx(start_idx)?, resolve_addrx(end_idx)?),
                    expr,
                });
            }
            DW_LLE_startx_length => {
                let start_idx = r.read_uleb128()?;
                let len = r.read_uleb128()?;
                let expr = read_expr(&mut r)?;
                let start = resolve_addrx(start_idx)?;
                entries.push(LocEntry {
                    range: (start, start + len),
                    expr,
                });
            }
            DW_LLE_offset_pair => {
                let start = r.read_uleb128()?;
                let end = r.read_uleb128()?;
                let expr = read_expr(&mut r)?;
                entries.push(LocEntry {
                    range: (base + start, base + end),
                    expr,
                });
            }
            DW_LLE_default_location => {
                let expr = read_expr(&mut r)?;
                entries.push(LocEntry {
                    range: (0, u64::MAX),
                    expr,
                });
            }
            DW_LLE_base_address => {
                base = r.read_address(address_size)?;
            }
            DW_LLE_start_end => {
                let start = r.read_address(address_size)?;
                let end = r.read_address(address_size)?;
                let expr = read_expr(&mut r)?;
                entries.push(LocEntry { range: (start, end), expr });
            }
            DW_LLE_start_length => {
                let start = r.read_address(address_size)?;
                let len = r.read_uleb128()?;
                let expr = read_expr(&mut r)?;
                entries.push(LocEntry {
                    range: (start, start + len),
                    expr,
                });
            }
            _ => return Err(DwarfErrorKind::MalformedHeader.into()),
        }
    }

    Ok(entries)
}

/// Picks the expression, if any, whose range covers `pc` (`spec.md` §4.6:
/// re-evaluated against the live program counter each time a frame stops).
pub fn select_for_pc(entries: &[LocEntry], pc: u64) -> Option<&[u8]> {
    entries
        .iter()
        .find(|e| pc >= e.range.0 && pc < e.range.1)
        .map(|e| e.expr.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dwarf4_entry_carries_expr_for_its_range() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x10u64.to_le_bytes());
        data.extend_from_slice(&0x20u64.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&[DW_OP_reg0, 0]);
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());

        let entries = evaluate_dwarf4(&data, 0, 8, 0x1000).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].range, (0x1010, 0x1020));
        assert_eq!(entries[0].expr, vec![DW_OP_reg0, 0]);
    }

    #[test]
    fn select_for_pc_finds_covering_range() {
        let entries = vec![
            LocEntry { range: (0x10, 0x20), expr: vec![1] },
            LocEntry { range: (0x20, 0x30), expr: vec![2] },
        ];
        assert_eq!(select_for_pc(&entries, 0x25), Some(&[2][..]));
        assert_eq!(select_for_pc(&entries, 0x40), None);
    }

    #[test]
    fn dwarf5_startx_length_reads_trailing_expr() {
        let mut data = Vec::new();
        data.push(DW_LLE_startx_length);
        data.push(0x00); // index 0
        data.push(0x08); // length
        data.push(0x01); // expr len
        data.push(DW_OP_nop);
        data.push(DW_LLE_end_of_list);

        let entries = evaluate_dwarf5(&data, 0, 8, |_| Ok(0x9000)).unwrap();
        assert_eq!(entries[0].range, (0x9000, 0x9008));
        assert_eq!(entries[0].expr, vec![DW_OP_nop]);
    }
}
