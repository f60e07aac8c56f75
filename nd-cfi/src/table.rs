//! The CFA (Canonical Frame Address) table machine: evaluates a CIE's
//! initial program followed by an FDE's own program to produce the row of
//! register-recovery rules covering a given PC (`spec.md` §4.9).
//!
//! Grounded on `other_examples/*framehop*dwarf.rs`'s `eval_cfa_rule`/
//! `eval_register_rule` dispatch (the teacher's `symbolic-cfi` leaves this
//! entirely to `gimli::UnwindTable`, so there is no teacher opcode loop to
//! imitate directly; the opcode vocabulary itself comes from the DWARF CFI
//! standard both crates implement against).

use std::collections::HashMap;

use nd_dwarf::Reader;

use crate::cie::Cie;
use crate::error::{CfiErrorKind, Result};
use crate::fde::Fde;

/// How to recover the Canonical Frame Address at a given row.
#[derive(Clone, Debug, PartialEq)]
pub enum CfaRule {
    /// CFA = value of `register` plus `offset`.
    RegisterOffset(u16, i64),
    /// CFA = the value a `DW_OP_*` expression program computes.
    Expression(Vec<u8>),
}

impl Default for CfaRule {
    fn default() -> Self {
        CfaRule::RegisterOffset(0, 0)
    }
}

/// How to recover one callee-saved register's value in the caller's frame.
#[derive(Clone, Debug, PartialEq)]
pub enum RegisterRule {
    /// This register was not saved; its caller-frame value is unknown.
    Undefined,
    /// This register keeps the same value it had in the callee (common for
    /// the stack pointer, whose "saved" value is just the CFA itself for
    /// most ABIs).
    SameValue,
    /// Saved at `CFA + offset`, the usual callee-saved-register case.
    Offset(i64),
    /// The caller-frame value is `CFA + offset` itself, not a dereference.
    ValOffset(i64),
    /// The caller-frame value lives in a different register, unchanged.
    Register(u16),
    /// The address to dereference is what a `DW_OP_*` expression computes.
    Expression(Vec<u8>),
    /// The caller-frame value itself is what a `DW_OP_*` expression computes.
    ValExpression(Vec<u8>),
    /// Defined by the producer in a way specific to this architecture; this
    /// unwinder has no tables for any such rule and treats it as undefined.
    Architectural,
}

/// One row of the CFA table, covering `[start_address, end_address)`.
#[derive(Clone, Debug, Default)]
pub struct Row {
    /// Address this row starts applying at.
    pub start_address: u64,
    /// How to compute the CFA at this row.
    pub cfa: CfaRule,
    /// Per-DWARF-register-number recovery rules. A register absent here is
    /// [`RegisterRule::Undefined`].
    pub registers: HashMap<u16, RegisterRule>,
}

impl Row {
    fn new(start_address: u64) -> Self {
        Row { start_address, cfa: CfaRule::default(), registers: HashMap::new() }
    }
}

/// Runs a CIE's initial program followed by an FDE's own program, returning
/// the row covering `pc`. `pc` must fall within `fde`'s range (checked by
/// the caller via [`Fde::covers`]).
pub fn row_for_pc(cie: &Cie, fde: &Fde, pc: u64) -> Result<Row> {
    let mut machine = Machine::new(cie, fde.initial_location);

    machine.run(&cie.initial_instructions)?;
    // The CIE program establishes the common initial row; snapshot it so
    // `DW_CFA_restore` in the FDE program can recover it per-register.
    machine.initial_row = machine.row.clone();

    machine.run(&fde.instructions)?;

    if machine.row.start_address <= pc {
        Ok(machine.row)
    } else {
        // The FDE program advanced past pc without ever producing a row
        // that starts at or before it; fall back to the last row that did.
        machine
            .history
            .into_iter()
            .rev()
            .find(|row| row.start_address <= pc)
            .ok_or_else(|| CfiErrorKind::MalformedHeader.into())
    }
}

struct Machine {
    row: Row,
    initial_row: Row,
    history: Vec<Row>,
    stack: Vec<Row>,
    code_alignment_factor: u64,
    data_alignment_factor: i64,
}

impl Machine {
    fn new(cie: &Cie, start_address: u64) -> Self {
        Machine {
            row: Row::new(start_address),
            initial_row: Row::new(start_address),
            history: Vec::new(),
            stack: Vec::new(),
            code_alignment_factor: cie.code_alignment_factor.max(1),
            data_alignment_factor: cie.data_alignment_factor,
        }
    }

    fn advance_to(&mut self, new_address: u64) {
        if new_address != self.row.start_address {
            let finished = std::mem::replace(&mut self.row, Row::new(new_address));
            self.history.push(finished);
        }
    }

    fn run(&mut self, program: &[u8]) -> Result<()> {
        let mut r = Reader::new(program);
        while !r.is_empty() {
            let opcode = r.read_u8()?;
            let high_bits = opcode & 0xc0;
            let low_bits = opcode & 0x3f;

            if high_bits == DW_CFA_ADVANCE_LOC {
                let new_address = self.row.start_address + low_bits as u64 * self.code_alignment_factor;
                self.advance_to(new_address);
                continue;
            }
            if high_bits == DW_CFA_OFFSET {
                let offset = r.read_uleb128()? as i64 * self.data_alignment_factor;
                self.row.registers.insert(low_bits as u16, RegisterRule::Offset(offset));
                continue;
            }
            if high_bits == DW_CFA_RESTORE {
                let rule = self
                    .initial_row
                    .registers
                    .get(&(low_bits as u16))
                    .cloned()
                    .unwrap_or(RegisterRule::Undefined);
                self.row.registers.insert(low_bits as u16, rule);
                continue;
            }

            match opcode {
                DW_CFA_NOP => {}
                DW_CFA_SET_LOC => {
                    let new_address = r.read_u64()?;
                    self.advance_to(new_address);
                }
                DW_CFA_ADVANCE_LOC1 => {
                    let delta = r.read_u8()? as u64 * self.code_alignment_factor;
                    self.advance_to(self.row.start_address + delta);
                }
                DW_CFA_ADVANCE_LOC2 => {
                    let delta = r.read_u16()? as u64 * self.code_alignment_factor;
                    self.advance_to(self.row.start_address + delta);
                }
                DW_CFA_ADVANCE_LOC4 => {
                    let delta = r.read_u32()? as u64 * self.code_alignment_factor;
                    self.advance_to(self.row.start_address + delta);
                }
                DW_CFA_DEF_CFA => {
                    let register = r.read_uleb128()? as u16;
                    let offset = r.read_uleb128()? as i64;
                    self.row.cfa = CfaRule::RegisterOffset(register, offset);
                }
                DW_CFA_DEF_CFA_SF => {
                    let register = r.read_uleb128()? as u16;
                    let offset = r.read_sleb128()? * self.data_alignment_factor;
                    self.row.cfa = CfaRule::RegisterOffset(register, offset);
                }
                DW_CFA_DEF_CFA_REGISTER => {
                    let register = r.read_uleb128()? as u16;
                    self.row.cfa = match self.row.cfa {
                        CfaRule::RegisterOffset(_, offset) => CfaRule::RegisterOffset(register, offset),
                        CfaRule::Expression(_) => CfaRule::RegisterOffset(register, 0),
                    };
                }
                DW_CFA_DEF_CFA_OFFSET => {
                    let offset = r.read_uleb128()? as i64;
                    self.row.cfa = match self.row.cfa {
                        CfaRule::RegisterOffset(register, _) => CfaRule::RegisterOffset(register, offset),
                        CfaRule::Expression(_) => CfaRule::RegisterOffset(0, offset),
                    };
                }
                DW_CFA_DEF_CFA_OFFSET_SF => {
                    let offset = r.read_sleb128()? * self.data_alignment_factor;
                    self.row.cfa = match self.row.cfa {
                        CfaRule::RegisterOffset(register, _) => CfaRule::RegisterOffset(register, offset),
                        CfaRule::Expression(_) => CfaRule::RegisterOffset(0, offset),
                    };
                }
                DW_CFA_DEF_CFA_EXPRESSION => {
                    let len = r.read_uleb128()? as usize;
                    let expr = r.read_bytes(len)?.to_vec();
                    self.row.cfa = CfaRule::Expression(expr);
                }
                DW_CFA_UNDEFINED => {
                    let register = r.read_uleb128()? as u16;
                    self.row.registers.insert(register, RegisterRule::Undefined);
                }
                DW_CFA_SAME_VALUE => {
                    let register = r.read_uleb128()? as u16;
                    self.row.registers.insert(register, RegisterRule::SameValue);
                }
                DW_CFA_OFFSET_EXTENDED => {
                    let register = r.read_uleb128()? as u16;
                    let offset = r.read_uleb128()? as i64 * self.data_alignment_factor;
                    self.row.registers.insert(register, RegisterRule::Offset(offset));
                }
                DW_CFA_OFFSET_EXTENDED_SF => {
                    let register = r.read_uleb128()? as u16;
                    let offset = r.read_sleb128()? * self.data_alignment_factor;
                    self.row.registers.insert(register, RegisterRule::Offset(offset));
                }
                DW_CFA_VAL_OFFSET => {
                    let register = r.read_uleb128()? as u16;
                    let offset = r.read_uleb128()? as i64 * self.data_alignment_factor;
                    self.row.registers.insert(register, RegisterRule::ValOffset(offset));
                }
                DW_CFA_VAL_OFFSET_SF => {
                    let register = r.read_uleb128()? as u16;
                    let offset = r.read_sleb128()? * self.data_alignment_factor;
                    self.row.registers.insert(register, RegisterRule::ValOffset(offset));
                }
                DW_CFA_REGISTER => {
                    let register = r.read_uleb128()? as u16;
                    let other = r.read_uleb128()? as u16;
                    self.row.registers.insert(register, RegisterRule::Register(other));
                }
                DW_CFA_EXPRESSION => {
                    let register = r.read_uleb128()? as u16;
                    let len = r.read_uleb128()? as usize;
                    let expr = r.read_bytes(len)?.to_vec();
                    self.row.registers.insert(register, RegisterRule::Expression(expr));
                }
                DW_CFA_VAL_EXPRESSION => {
                    let register = r.read_uleb128()? as u16;
                    let len = r.read_uleb128()? as usize;
                    let expr = r.read_bytes(len)?.to_vec();
                    self.row.registers.insert(register, RegisterRule::ValExpression(expr));
                }
                DW_CFA_REMEMBER_STATE => {
                    self.stack.push(self.row.clone());
                }
                DW_CFA_RESTORE_STATE => {
                    let start_address = self.row.start_address;
                    let mut restored = self.stack.pop().ok_or(CfiErrorKind::MalformedHeader)?;
                    restored.start_address = start_address;
                    self.row = restored;
                }
                DW_CFA_RESTORE_EXTENDED => {
                    let register = r.read_uleb128()? as u16;
                    let rule = self
                        .initial_row
                        .registers
                        .get(&register)
                        .cloned()
                        .unwrap_or(RegisterRule::Undefined);
                    self.row.registers.insert(register, rule);
                }
                DW_CFA_GNU_ARGS_SIZE => {
                    let _ = r.read_uleb128()?;
                }
                DW_CFA_GNU_NEGATIVE_OFFSET_EXTENDED => {
                    let register = r.read_uleb128()? as u16;
                    let offset = -(r.read_uleb128()? as i64) * self.data_alignment_factor;
                    self.row.registers.insert(register, RegisterRule::Offset(offset));
                }
                _ => return Err(CfiErrorKind::UnsupportedOperation(opcode).into()),
            }
        }
        Ok(())
    }
}

const DW_CFA_ADVANCE_LOC: u8 = 0x40;
const DW_CFA_OFFSET: u8 = 0x80;
const DW_CFA_RESTORE: u8 = 0xc0;

const DW_CFA_NOP: u8 = 0x00;
const DW_CFA_SET_LOC: u8 = 0x01;
const DW_CFA_ADVANCE_LOC1: u8 = 0x02;
const DW_CFA_ADVANCE_LOC2: u8 = 0x03;
const DW_CFA_ADVANCE_LOC4: u8 = 0x04;
const DW_CFA_OFFSET_EXTENDED: u8 = 0x05;
const DW_CFA_RESTORE_EXTENDED: u8 = 0x06;
const DW_CFA_UNDEFINED: u8 = 0x07;
const DW_CFA_SAME_VALUE: u8 = 0x08;
const DW_CFA_REGISTER: u8 = 0x09;
const DW_CFA_REMEMBER_STATE: u8 = 0x0a;
const DW_CFA_RESTORE_STATE: u8 = 0x0b;
const DW_CFA_DEF_CFA: u8 = 0x0c;
const DW_CFA_DEF_CFA_REGISTER: u8 = 0x0d;
const DW_CFA_DEF_CFA_OFFSET: u8 = 0x0e;
const DW_CFA_DEF_CFA_EXPRESSION: u8 = 0x0f;
const DW_CFA_EXPRESSION: u8 = 0x10;
const DW_CFA_OFFSET_EXTENDED_SF: u8 = 0x11;
const DW_CFA_DEF_CFA_SF: u8 = 0x12;
const DW_CFA_DEF_CFA_OFFSET_SF: u8 = 0x13;
const DW_CFA_VAL_OFFSET: u8 = 0x14;
const DW_CFA_VAL_OFFSET_SF: u8 = 0x15;
const DW_CFA_VAL_EXPRESSION: u8 = 0x16;
const DW_CFA_GNU_ARGS_SIZE: u8 = 0x2e;
const DW_CFA_GNU_NEGATIVE_OFFSET_EXTENDED: u8 = 0x2f;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cie::Cie;
    use crate::fde::Fde;

    fn test_cie() -> Cie {
        Cie {
            offset: 0,
            version: 1,
            code_alignment_factor: 1,
            data_alignment_factor: -8,
            return_address_register: 16,
            initial_instructions: vec![0x0c, 0x07, 0x08], // def_cfa(rsp=7, 8)
            fde_pointer_encoding: 0x00,
            lsda_encoding: None,
            is_signal_frame: false,
        }
    }

    fn test_fde(instructions: Vec<u8>) -> Fde {
        Fde {
            offset: 0,
            cie_offset: 0,
            initial_location: 0x1000,
            address_range: 0x100,
            instructions,
        }
    }

    #[test]
    fn initial_row_comes_from_cie_program() {
        let cie = test_cie();
        let fde = test_fde(vec![]);
        let row = row_for_pc(&cie, &fde, 0x1000).unwrap();
        assert_eq!(row.cfa, CfaRule::RegisterOffset(7, 8));
    }

    #[test]
    fn prologue_sequence_tracks_rbp_frame() {
        let cie = test_cie();
        // push rbp; def_cfa_offset(16); offset(rbp=6, 2); def_cfa_register(rbp=6)
        let instructions = vec![
            0x0e, 16, // DW_CFA_def_cfa_offset 16
            0x86, 2, // DW_CFA_offset r6, 2 -> rbp saved at CFA-16
            0x0d, 6, // DW_CFA_def_cfa_register r6
        ];
        let fde = test_fde(instructions);
        let row = row_for_pc(&cie, &fde, 0x1000).unwrap();
        assert_eq!(row.cfa, CfaRule::RegisterOffset(6, 16));
        assert_eq!(row.registers.get(&6), Some(&RegisterRule::Offset(-16)));
    }

    #[test]
    fn advance_loc_selects_row_by_pc() {
        let cie = test_cie();
        let instructions = vec![
            0x0e, 16, // def_cfa_offset 16 at 0x1000
            0x41, // advance_loc(1) -> 0x1001
            0x0e, 24, // def_cfa_offset 24 at 0x1001
        ];
        let fde = test_fde(instructions);
        let before = row_for_pc(&cie, &fde, 0x1000).unwrap();
        assert_eq!(before.cfa, CfaRule::RegisterOffset(7, 16));
        let after = row_for_pc(&cie, &fde, 0x1001).unwrap();
        assert_eq!(after.cfa, CfaRule::RegisterOffset(7, 24));
    }

    #[test]
    fn remember_and_restore_state_round_trip() {
        let cie = test_cie();
        let instructions = vec![
            0x0e, 16, // def_cfa_offset 16
            0x0a, // remember_state
            0x41, // advance_loc(1)
            0x0e, 32, // def_cfa_offset 32
            0x41, // advance_loc(1)
            0x0b, // restore_state
        ];
        let fde = test_fde(instructions);
        let row = row_for_pc(&cie, &fde, 0x1002).unwrap();
        assert_eq!(row.cfa, CfaRule::RegisterOffset(7, 16));
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let cie = test_cie();
        let fde = test_fde(vec![0x3f]); // unassigned extended opcode
        let err = row_for_pc(&cie, &fde, 0x1000).unwrap_err();
        assert!(matches!(err.kind(), CfiErrorKind::UnsupportedOperation(0x3f)));
    }
}
