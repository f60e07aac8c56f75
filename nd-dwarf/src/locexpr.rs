//! DWARF location expression VM (`spec.md` §4.7, component C7).
//!
//! The `EvalContext` trait abstracting register/memory/CFA access away from
//! the opcode loop follows the strategy-object shape of the teacher's
//! `symbolic-unwind/src/evaluator.rs` and `evaluator/strategies.rs`
//! (`CfiEvaluator`'s rule-driven register resolution), generalized here to
//! cover the superset of `DW_OP_*` codes a variable location expression can
//! use rather than only the CFI subset those files evaluate.

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::{Format, Reader};

/// Host services a location expression needs to read live process state.
/// `nd-engine` implements this over its `ProcessControl`/register-frame
/// types; tests implement it over a plain lookup table.
pub trait EvalContext {
    /// Value currently held in DWARF register number `reg`.
    fn register(&self, reg: u16) -> Option<u64>;
    /// Reads `buf.len()` bytes of target memory at `addr`.
    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<()>;
    /// The enclosing function's `DW_AT_frame_base`, pre-evaluated.
    fn frame_base(&self) -> Option<u64>;
    /// The current frame's canonical frame address (`nd-cfi`'s unwind
    /// result), for `DW_OP_call_frame_cfa`.
    fn call_frame_cfa(&self) -> Option<u64>;
    /// Resolves a `.debug_addr` index (via the unit's `addr_base`) to an
    /// absolute, already-relocated address.
    fn resolve_addrx(&self, index: u64) -> Option<u64>;
    /// Pointer size in bytes for this expression's architecture (4 or 8),
    /// used by `DW_OP_deref` and `DW_OP_addr`.
    fn address_size(&self) -> u8;
}

/// One contiguous piece of a (possibly composite) variable location.
#[derive(Clone, Debug, PartialEq)]
pub enum PieceLocation {
    /// The piece lives at a memory address.
    Address(u64),
    /// The piece lives in a register, whole.
    Register(u16),
    /// The piece's value is these literal bytes (`DW_OP_implicit_value`,
    /// or the final stack value after `DW_OP_stack_value`).
    Literal(Vec<u8>),
    /// The compiler recorded no location at all for this piece.
    OptimizedOut,
}

/// One piece of a location, optionally sized (size is absent for a
/// single-piece, whole-value expression with no `DW_OP_piece`).
#[derive(Clone, Debug, PartialEq)]
pub struct Piece {
    pub location: PieceLocation,
    pub bit_size: Option<u64>,
}

struct Vm<'a, C: EvalContext> {
    stack: Vec<u64>,
    pieces: Vec<Piece>,
    ctx: &'a C,
    /// Set once an expression ends (or a `DW_OP_piece` fires) to mark the
    /// top of stack as a value rather than an address.
    stack_value: bool,
}

fn read_offset_addr(r: &mut Reader<'_>, format: Format) -> Result<u64> {
    r.read_offset(format)
}

/// Evaluates a location expression to its (possibly composite) pieces.
///
/// `format` is needed only for `DW_OP_implicit_pointer`'s reference operand;
/// ordinary variable/parameter expressions never use it.
pub fn evaluate<C: EvalContext>(expr: &[u8], ctx: &C, format: Format) -> Result<Vec<Piece>> {
    let mut vm = Vm {
        stack: Vec::new(),
        pieces: Vec::new(),
        ctx,
        stack_value: false,
    };
    let mut r = Reader::new(expr);

    while !r.is_empty() {
        let op = r.read_u8()?;
        match op {
            DW_OP_addr => {
                let addr = r.read_address(ctx.address_size())?;
                vm.stack.push(addr);
            }
            DW_OP_addrx => {
                let index = r.read_uleb128()?;
                let addr = ctx.resolve_addrx(index).ok_or(DwarfErrorKind::InvalidReference)?;
                vm.stack.push(addr);
            }
            DW_OP_constx => {
                let index = r.read_uleb128()?;
                let value = ctx.resolve_addrx(index).ok_or(DwarfErrorKind::InvalidReference)?;
                vm.stack.push(value);
            }
            DW_OP_deref => {
                let addr = pop(&mut vm.stack)?;
                let mut buf = vec![0u8; ctx.address_size() as usize];
                ctx.read_memory(addr, &mut buf)?;
                vm.stack.push(read_le(&buf));
            }
            DW_OP_deref_size => {
                let size = r.read_u8()? as usize;
                let addr = pop(&mut vm.stack)?;
                let mut buf = vec![0u8; size];
                ctx.read_memory(addr, &mut buf)?;
                vm.stack.push(read_le(&buf));
            }
            DW_OP_const1u => vm.stack.push(r.read_u8()? as u64),
            DW_OP_const1s => vm.stack.push(r.read_i8()? as i64 as u64),
            DW_OP_const2u => vm.stack.push(r.read_u16()? as u64),
            DW_OP_const2s => vm.stack.push(r.read_u16()? as i16 as i64 as u64),
            DW_OP_const4u => vm.stack.push(r.read_u32()? as u64),
            DW_OP_const4s => vm.stack.push(r.read_u32()? as i32 as i64 as u64),
            DW_OP_const8u => vm.stack.push(r.read_u64()?),
            DW_OP_const8s => vm.stack.push(r.read_u64()? as i64 as u64),
            DW_OP_constu => vm.stack.push(r.read_uleb128()?),
            DW_OP_consts => vm.stack.push(r.read_sleb128()? as u64),
            DW_OP_dup => {
                let top = *vm.stack.last().ok_or(DwarfErrorKind::UnexpectedEof)?;
                vm.stack.push(top);
            }
            DW_OP_drop => {
                pop(&mut vm.stack)?;
            }
            DW_OP_over => {
                let v = *vm
                    .stack
                    .get(vm.stack.len().checked_sub(2).ok_or(DwarfErrorKind::UnexpectedEof)?)
                    .ok_or(DwarfErrorKind::UnexpectedEof)?;
                vm.stack.push(v);
            }
            DW_OP_pick => {
                let idx = r.read_u8()? as usize;
                let pos = vm
                    .stack
                    .len()
                    .checked_sub(1 + idx)
                    .ok_or(DwarfErrorKind::UnexpectedEof)?;
                let v = *vm.stack.get(pos).ok_or(DwarfErrorKind::UnexpectedEof)?;
                vm.stack.push(v);
            }
            DW_OP_swap => {
                let len = vm.stack.len();
                if len < 2 {
                    return Err(DwarfErrorKind::UnexpectedEof.into());
                }
                vm.stack.swap(len - 1, len - 2);
            }
            DW_OP_rot => {
                let len = vm.stack.len();
                if len < 3 {
                    return Err(DwarfErrorKind::UnexpectedEof.into());
                }
                vm.stack.swap(len - 1, len - 3);
                vm.stack.swap(len - 1, len - 2);
            }
            DW_OP_abs => {
                let v = pop(&mut vm.stack)? as i64;
                vm.stack.push(v.unsigned_abs());
            }
            DW_OP_and => binop(&mut vm.stack, |a, b| a & b)?,
            DW_OP_or => binop(&mut vm.stack, |a, b| a | b)?,
            DW_OP_xor => binop(&mut vm.stack, |a, b| a ^ b)?,
            DW_OP_plus => binop(&mut vm.stack, u64::wrapping_add)?,
            DW_OP_minus => binop(&mut vm.stack, u64::wrapping_sub)?,
            DW_OP_mul => binop(&mut vm.stack, u64::wrapping_mul)?,
            DW_OP_div => binop_signed_arith(&mut vm.stack, |a, b| if b == 0 { 0 } else { a.wrapping_div(b) })?,
            DW_OP_mod => binop(&mut vm.stack, |a, b| if b == 0 { 0 } else { a % b })?,
            DW_OP_shl => binop(&mut vm.stack, |a, b| a.wrapping_shl(b as u32))?,
            DW_OP_shr => binop(&mut vm.stack, |a, b| a.wrapping_shr(b as u32))?,
            DW_OP_shra => binop_signed_arith(&mut vm.stack, |a, b| a.wrapping_shr(b as u32))?,
            DW_OP_neg => {
                let v = pop(&mut vm.stack)? as i64;
                vm.stack.push((-v) as u64);
            }
            DW_OP_not => {
                let v = pop(&mut vm.stack)?;
                vm.stack.push(!v);
            }
            DW_OP_plus_uconst => {
                let addend = r.read_uleb128()?;
                let v = pop(&mut vm.stack)?;
                vm.stack.push(v.wrapping_add(addend));
            }
            DW_OP_eq => binop(&mut vm.stack, |a, b| (a == b) as u64)?,
            DW_OP_ne => binop(&mut vm.stack, |a, b| (a != b) as u64)?,
            DW_OP_ge => binop_signed_cmp(&mut vm.stack, |a, b| a >= b)?,
            DW_OP_gt => binop_signed_cmp(&mut vm.stack, |a, b| a > b)?,
            DW_OP_le => binop_signed_cmp(&mut vm.stack, |a, b| a <= b)?,
            DW_OP_lt => binop_signed_cmp(&mut vm.stack, |a, b| a < b)?,
            DW_OP_skip => {
                let delta = r.read_u16()? as i16;
                seek_relative(&mut r, delta)?;
            }
            DW_OP_bra => {
                let delta = r.read_u16()? as i16;
                let cond = pop(&mut vm.stack)?;
                if cond != 0 {
                    seek_relative(&mut r, delta)?;
                }
            }
            DW_OP_nop => {}
            DW_OP_regx => {
                let reg = r.read_uleb128()? as u16;
                return Ok(vec![Piece {
                    location: PieceLocation::Register(reg),
                    bit_size: None,
                }]);
            }
            DW_OP_fbreg => {
                let offset = r.read_sleb128()?;
                let base = ctx.frame_base().ok_or(DwarfErrorKind::InvalidReference)?;
                vm.stack.push((base as i64).wrapping_add(offset) as u64);
            }
            DW_OP_bregx => {
                let reg = r.read_uleb128()? as u16;
                let offset = r.read_sleb128()?;
                let base = ctx.register(reg).ok_or(DwarfErrorKind::InvalidReference)?;
                vm.stack.push((base as i64).wrapping_add(offset) as u64);
            }
            DW_OP_call_frame_cfa => {
                let cfa = ctx.call_frame_cfa().ok_or(DwarfErrorKind::InvalidReference)?;
                vm.stack.push(cfa);
            }
            DW_OP_stack_value => {
                vm.stack_value = true;
            }
            DW_OP_implicit_value => {
                let len = r.read_uleb128()? as usize;
                let bytes = r.read_bytes(len)?.to_vec();
                return Ok(vec![Piece {
                    location: PieceLocation::Literal(bytes),
                    bit_size: None,
                }]);
            }
            DW_OP_implicit_pointer => {
                let _die_ref = read_offset_addr(&mut r, format)?;
                let _byte_offset = r.read_sleb128()?;
                return Ok(vec![Piece {
                    location: PieceLocation::OptimizedOut,
                    bit_size: None,
                }]);
            }
            DW_OP_piece => {
                let size_bytes = r.read_uleb128()?;
                let location = piece_location(&mut vm)?;
                vm.pieces.push(Piece {
                    location,
                    bit_size: Some(size_bytes * 8),
                });
                vm.stack_value = false;
            }
            DW_OP_bit_piece => {
                let size_bits = r.read_uleb128()?;
                let _offset_bits = r.read_uleb128()?;
                let location = piece_location(&mut vm)?;
                vm.pieces.push(Piece {
                    location,
                    bit_size: Some(size_bits),
                });
                vm.stack_value = false;
            }
            lit if (DW_OP_lit0..=DW_OP_lit0 + 31).contains(&lit) => {
                vm.stack.push((lit - DW_OP_lit0) as u64);
            }
            reg if (DW_OP_reg0..=DW_OP_reg0 + 31).contains(&reg) => {
                return Ok(vec![Piece {
                    location: PieceLocation::Register((reg - DW_OP_reg0) as u16),
                    bit_size: None,
                }]);
            }
            breg if (DW_OP_breg0..=DW_OP_breg0 + 31).contains(&breg) => {
                let reg = (breg - DW_OP_breg0) as u16;
                let offset = r.read_sleb128()?;
                let base = ctx.register(reg).ok_or(DwarfErrorKind::InvalidReference)?;
                vm.stack.push((base as i64).wrapping_add(offset) as u64);
            }
            other => return Err(DwarfErrorKind::UnknownForm(other as u64).into()),
        }
    }

    if !vm.pieces.is_empty() {
        return Ok(vm.pieces);
    }

    let location = piece_location(&mut vm)?;
    Ok(vec![Piece {
        location,
        bit_size: None,
    }])
}

fn piece_location<C: EvalContext>(vm: &mut Vm<'_, C>) -> Result<PieceLocation> {
    if vm.stack.is_empty() {
        return Ok(PieceLocation::OptimizedOut);
    }
    let top = pop(&mut vm.stack)?;
    if vm.stack_value {
        Ok(PieceLocation::Literal(top.to_le_bytes().to_vec()))
    } else {
        Ok(PieceLocation::Address(top))
    }
}

fn pop(stack: &mut Vec<u64>) -> Result<u64> {
    stack.pop().ok_or_else(|| DwarfErrorKind::UnexpectedEof.into())
}

fn binop(stack: &mut Vec<u64>, f: impl Fn(u64, u64) -> u64) -> Result<()> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    stack.push(f(a, b));
    Ok(())
}

fn binop_signed_arith(stack: &mut Vec<u64>, f: impl Fn(i64, i64) -> i64) -> Result<()> {
    let b = pop(stack)? as i64;
    let a = pop(stack)? as i64;
    stack.push(f(a, b) as u64);
    Ok(())
}

fn binop_signed_cmp(stack: &mut Vec<u64>, f: impl Fn(i64, i64) -> bool) -> Result<()> {
    let b = pop(stack)? as i64;
    let a = pop(stack)? as i64;
    stack.push(f(a, b) as u64);
    Ok(())
}

fn read_le(buf: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..buf.len().min(8)].copy_from_slice(&buf[..buf.len().min(8)]);
    u64::from_le_bytes(bytes)
}

fn seek_relative(r: &mut Reader<'_>, delta: i16) -> Result<()> {
    let new_pos = r.position() as i64 + delta as i64;
    if new_pos < 0 {
        return Err(DwarfErrorKind::UnexpectedEof.into());
    }
    r.seek(new_pos as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestCtx {
        registers: HashMap<u16, u64>,
        memory: HashMap<u64, u8>,
        frame_base: Option<u64>,
        cfa: Option<u64>,
    }

    impl EvalContext for TestCtx {
        fn register(&self, reg: u16) -> Option<u64> {
            self.registers.get(&reg).copied()
        }
        fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = *self.memory.get(&(addr + i as u64)).unwrap_or(&0);
            }
            Ok(())
        }
        fn frame_base(&self) -> Option<u64> {
            self.frame_base
        }
        fn call_frame_cfa(&self) -> Option<u64> {
            self.cfa
        }
        fn resolve_addrx(&self, _index: u64) -> Option<u64> {
            None
        }
        fn address_size(&self) -> u8 {
            8
        }
    }

    fn ctx() -> TestCtx {
        TestCtx {
            registers: HashMap::new(),
            memory: HashMap::new(),
            frame_base: Some(0x7000),
            cfa: Some(0x8000),
        }
    }

    #[test]
    fn fbreg_adds_signed_offset_to_frame_base() {
        // DW_OP_fbreg -16
        let expr = [DW_OP_fbreg, 0x70]; // sleb128(-16) = 0x70
        let pieces = evaluate(&expr, &ctx(), Format::Dwarf32).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].location, PieceLocation::Address(0x7000 - 16));
    }

    #[test]
    fn reg_opcode_produces_register_location() {
        let expr = [DW_OP_reg0 + 3];
        let pieces = evaluate(&expr, &ctx(), Format::Dwarf32).unwrap();
        assert_eq!(pieces[0].location, PieceLocation::Register(3));
    }

    #[test]
    fn stack_value_marks_literal_result() {
        let expr = [DW_OP_lit0 + 7, DW_OP_stack_value];
        let pieces = evaluate(&expr, &ctx(), Format::Dwarf32).unwrap();
        assert_eq!(pieces[0].location, PieceLocation::Literal(7u64.to_le_bytes().to_vec()));
    }

    #[test]
    fn call_frame_cfa_pushes_cfa() {
        let expr = [DW_OP_call_frame_cfa];
        let pieces = evaluate(&expr, &ctx(), Format::Dwarf32).unwrap();
        assert_eq!(pieces[0].location, PieceLocation::Address(0x8000));
    }

    #[test]
    fn plus_uconst_adds_to_top_of_stack() {
        let expr = [DW_OP_lit0 + 4, DW_OP_plus_uconst, 0x10];
        let pieces = evaluate(&expr, &ctx(), Format::Dwarf32).unwrap();
        assert_eq!(pieces[0].location, PieceLocation::Address(0x14));
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let expr = [0xFFu8];
        let err = evaluate(&expr, &ctx(), Format::Dwarf32).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::UnknownForm(0xFF));
    }
}
