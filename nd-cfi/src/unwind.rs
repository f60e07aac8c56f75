//! Frame-by-frame stack walking: CFI-driven unwinding with a frame-pointer
//! fallback, and the heuristic that picks between two candidate traces
//! (`spec.md` §4.9).
//!
//! Grounded on `other_examples/*framehop*unwinder.rs`'s `Unwinder` trait and
//! frame-walk loop shape; the teacher's `symbolic-cfi` never walks a live
//! stack at all (it only rewrites CFI into a cache file for Breakpad's own
//! external walker to consume), so this module has no teacher-side sibling.

use std::collections::HashMap;

use crate::error::{CfiErrorKind, Result};
use crate::fde::{self, FdeIndex};
use crate::table::{self, CfaRule, RegisterRule};

/// The architectures this unwinder knows a frame-pointer-walk fallback and a
/// "stack pointer" / "frame pointer" / "return address" register mapping
/// for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Arm64,
}

impl Arch {
    fn frame_pointer_register(self) -> u16 {
        match self {
            Arch::X86_64 => 6,  // rbp
            Arch::Arm64 => 29,  // x29 / fp
        }
    }

    fn stack_pointer_register(self) -> u16 {
        match self {
            Arch::X86_64 => 7,  // rsp
            Arch::Arm64 => 31,  // sp
        }
    }

    fn return_address_register(self) -> u16 {
        match self {
            Arch::X86_64 => 16, // return address is read off the stack, not a register
            Arch::Arm64 => 30,  // x30 / lr
        }
    }
}

/// Access to the registers of the frame currently being unwound, and a way
/// to read memory at an address (needed to dereference the CFA and to walk
/// frame-pointer chains). Implementations live in whatever process-control
/// layer has a live inferior or a core dump to read from; this crate is
/// agnostic to where the bytes come from.
pub trait UnwindContext {
    /// Reads a DWARF register number's current value, if known.
    fn register(&self, dwarf_reg: u16) -> Option<u64>;
    /// Reads `len` bytes of memory at `address`, or `None` if unmapped.
    fn read_memory(&self, address: u64, len: usize) -> Option<Vec<u8>>;

    fn read_u64(&self, address: u64) -> Option<u64> {
        let bytes = self.read_memory(address, 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }
}

/// The outcome of unwinding one frame: the caller's recovered registers.
#[derive(Clone, Debug, Default)]
pub struct UnwoundFrame {
    /// Registers recovered for the caller's frame, keyed by DWARF number.
    pub registers: HashMap<u16, u64>,
    /// The Canonical Frame Address computed for the callee's frame (the
    /// frame base many DWARF expressions are relative to).
    pub cfa: u64,
}

/// Unwinds exactly one frame using CFI: locates the FDE covering `pc`,
/// evaluates its CFA table row, and applies every register rule it names.
///
/// `section_data`/`is_eh_frame`/`section_runtime_addr` describe the section
/// `index` was built from; the FDE itself is re-parsed from those bytes
/// since [`FdeIndex`] only retains byte ranges for its PC lookup, not the
/// parsed FDEs (cheap enough to redo once per stop).
pub fn unwind_one_frame(
    index: &FdeIndex,
    section_data: &[u8],
    is_eh_frame: bool,
    section_runtime_addr: u64,
    pc: u64,
    ctx: &dyn UnwindContext,
) -> Result<UnwoundFrame> {
    let fde_offset = index.find_fde_offset(pc).ok_or(CfiErrorKind::NoFdeForAddress)?;

    // The FDE's cie_offset isn't known until it's parsed, but parsing needs
    // the CIE up front to resolve its pointer encoding; re-derive it from
    // the raw cie_pointer field the same way FdeIndex::build does.
    let cie_offset = fde::peek_cie_offset(section_data, fde_offset as usize, is_eh_frame)?;
    let cie = index.cie(cie_offset).ok_or(CfiErrorKind::MalformedHeader)?;
    let fde = fde::parse(section_data, fde_offset as usize, cie, is_eh_frame, section_runtime_addr)?;

    let row = table::row_for_pc(cie, &fde, pc)?;
    let cfa = compute_cfa(&row.cfa, ctx).ok_or(CfiErrorKind::MalformedHeader)?;

    let mut registers = HashMap::new();
    for (&dwarf_reg, rule) in &row.registers {
        if let Some(value) = apply_register_rule(rule, cfa, |r| ctx.register(r), ctx) {
            registers.insert(dwarf_reg, value);
        }
    }

    Ok(UnwoundFrame { registers, cfa })
}

/// Evaluates a [`CfaRule`] against the current frame's registers.
fn compute_cfa(rule: &CfaRule, ctx: &dyn UnwindContext) -> Option<u64> {
    match rule {
        CfaRule::RegisterOffset(register, offset) => {
            let base = ctx.register(*register)?;
            Some((base as i64 + offset) as u64)
        }
        // A full DW_OP_* evaluator lives in nd-dwarf's location-expression
        // module; CFA expressions are rare enough in practice (only seen
        // in hand-written assembly CFI) that this unwinder reports them as
        // unsupported rather than duplicating that evaluator here.
        CfaRule::Expression(_) => None,
    }
}

/// Evaluates a [`RegisterRule`] against the current frame's CFA and
/// registers, returning the caller's value for that register.
fn apply_register_rule(
    rule: &RegisterRule,
    cfa: u64,
    callee_register: impl Fn(u16) -> Option<u64>,
    ctx: &dyn UnwindContext,
) -> Option<u64> {
    match rule {
        RegisterRule::Undefined | RegisterRule::Architectural => None,
        RegisterRule::SameValue => None,
        RegisterRule::Offset(offset) => ctx.read_u64((cfa as i64 + offset) as u64),
        RegisterRule::ValOffset(offset) => Some((cfa as i64 + offset) as u64),
        RegisterRule::Register(other) => callee_register(*other),
        RegisterRule::Expression(_) | RegisterRule::ValExpression(_) => None,
    }
}

/// A full stack trace: return addresses from innermost (crash/stop site)
/// to outermost frame.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    pub pcs: Vec<u64>,
}

impl Trace {
    /// Whether this trace reaches a conventional root frame (`main`,
    /// `_start`, or a thread-entry trampoline) rather than stopping because
    /// the walk ran out of recoverable frames.
    pub fn reaches_root(&self, is_root_symbol: impl Fn(u64) -> bool) -> bool {
        self.pcs.last().is_some_and(|&pc| is_root_symbol(pc))
    }
}

/// Picks between two candidate traces for the same stop (typically one
/// produced by CFI, one by a frame-pointer walk): the longer trace wins;
/// ties go to whichever reaches a root frame, since a CFI gap can silently
/// truncate a trace that frame-pointer-walking continues past.
pub fn pick_better_trace(cfi: &Trace, frame_pointer: &Trace, is_root_symbol: impl Fn(u64) -> bool) -> Trace {
    let cfi_reaches_root = cfi.reaches_root(&is_root_symbol) && cfi.pcs.len() >= 2;
    let fp_reaches_root = frame_pointer.reaches_root(&is_root_symbol) && frame_pointer.pcs.len() >= 2;

    match (cfi_reaches_root, fp_reaches_root) {
        (true, false) => cfi.clone(),
        (false, true) => frame_pointer.clone(),
        _ => {
            if frame_pointer.pcs.len() > cfi.pcs.len() {
                frame_pointer.clone()
            } else {
                cfi.clone()
            }
        }
    }
}

/// The maximum number of frames a single walk will produce before giving
/// up, guarding against a corrupt frame-pointer chain or CFI cycle.
pub const MAX_FRAME_DEPTH: usize = 50;

/// Walks a stack using only the frame-pointer chain: `[fp]` is the saved
/// caller fp, `[fp+8]` is the return address (x86_64 System V), or
/// `[fp+8]`/`[fp]` respectively on arm64's AAPCS64 frame record layout.
pub fn walk_frame_pointers(arch: Arch, initial_fp: u64, initial_pc: u64, ctx: &dyn UnwindContext) -> Trace {
    let mut pcs = vec![initial_pc];
    let mut fp = initial_fp;

    while fp != 0 && pcs.len() < MAX_FRAME_DEPTH {
        let (saved_fp_offset, return_address_offset) = match arch {
            Arch::X86_64 => (0u64, 8u64),
            Arch::Arm64 => (0u64, 8u64),
        };

        let return_address = match ctx.read_u64(fp + return_address_offset) {
            Some(ra) if ra != 0 => ra,
            _ => break,
        };
        let next_fp = match ctx.read_u64(fp + saved_fp_offset) {
            Some(next) => next,
            None => break,
        };

        pcs.push(return_address);
        if next_fp <= fp {
            // Frame pointers must strictly increase going up the stack;
            // anything else means the chain is corrupt or we've looped.
            break;
        }
        fp = next_fp;
    }

    Trace { pcs }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMemory {
        cells: HashMap<u64, u64>,
    }

    impl UnwindContext for FakeMemory {
        fn register(&self, _dwarf_reg: u16) -> Option<u64> {
            None
        }

        fn read_memory(&self, address: u64, len: usize) -> Option<Vec<u8>> {
            if len != 8 {
                return None;
            }
            self.cells.get(&address).map(|v| v.to_le_bytes().to_vec())
        }
    }

    #[test]
    fn frame_pointer_walk_follows_chain_until_zero() {
        // Frame layout: fp -> [saved_fp][return_addr]
        let mut cells = HashMap::new();
        cells.insert(0x2000, 0u64); // frame at 0x2000: saved_fp = 0 (root)
        cells.insert(0x2008, 0xdead0003u64); // return address for frame at 0x2000
        cells.insert(0x1000, 0x2000u64); // frame at 0x1000: saved_fp = 0x2000
        cells.insert(0x1008, 0xdead0002u64); // return address for frame at 0x1000

        let ctx = FakeMemory { cells };
        let trace = walk_frame_pointers(Arch::X86_64, 0x1000, 0xdead0001, &ctx);

        assert_eq!(trace.pcs, vec![0xdead0001, 0xdead0002, 0xdead0003]);
    }

    #[test]
    fn frame_pointer_walk_stops_on_non_increasing_fp() {
        let mut cells = HashMap::new();
        cells.insert(0x1000, 0x1000u64); // saved_fp points at itself: a cycle
        cells.insert(0x1008, 0xdead0002u64);

        let ctx = FakeMemory { cells };
        let trace = walk_frame_pointers(Arch::X86_64, 0x1000, 0xdead0001, &ctx);

        assert_eq!(trace.pcs, vec![0xdead0001, 0xdead0002]);
    }

    #[test]
    fn longer_trace_wins_when_neither_reaches_root() {
        let short = Trace { pcs: vec![1, 2] };
        let long = Trace { pcs: vec![1, 2, 3, 4] };
        let picked = pick_better_trace(&short, &long, |_| false);
        assert_eq!(picked.pcs, long.pcs);
    }

    #[test]
    fn root_reaching_trace_wins_even_if_shorter() {
        let reaches_root = Trace { pcs: vec![1, 2, 100] };
        let longer_but_wrong = Trace { pcs: vec![1, 2, 3, 4, 5] };
        let picked = pick_better_trace(&reaches_root, &longer_but_wrong, |pc| pc == 100);
        assert_eq!(picked.pcs, reaches_root.pcs);
    }

    #[test]
    fn register_rule_offset_dereferences_cfa_relative_address() {
        let mut cells = HashMap::new();
        cells.insert(0x1ff8, 0x4242u64);
        let ctx = FakeMemory { cells };
        let value = apply_register_rule(&RegisterRule::Offset(-8), 0x2000, |_| None, &ctx);
        assert_eq!(value, Some(0x4242));
    }

    #[test]
    fn cfa_register_offset_rule_adds_to_base_register() {
        let rule = CfaRule::RegisterOffset(7, 16);
        struct Regs;
        impl UnwindContext for Regs {
            fn register(&self, dwarf_reg: u16) -> Option<u64> {
                if dwarf_reg == 7 {
                    Some(0x7ff0)
                } else {
                    None
                }
            }
            fn read_memory(&self, _address: u64, _len: usize) -> Option<Vec<u8>> {
                None
            }
        }
        let cfa = compute_cfa(&rule, &Regs);
        assert_eq!(cfa, Some(0x7ff0 + 16));
    }

    #[test]
    fn arch_register_numbers_match_dwarf_conventions() {
        assert_eq!(Arch::X86_64.frame_pointer_register(), 6);
        assert_eq!(Arch::X86_64.stack_pointer_register(), 7);
        assert_eq!(Arch::Arm64.return_address_register(), 30);
        let _ = table::CfaRule::default();
    }
}
