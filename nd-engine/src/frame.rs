//! Stack-trace construction: joins nd-cfi's unwinder with live or
//! unwound register state and nd-dwarf's function/line tables to produce
//! the frame records `spec.md` §6's `stackTrace` operation returns.
//!
//! Grounded on `symbolic-unwind`'s register-adapter idiom (bridging an
//! arbitrary register source into a trait the unwinder consumes) and
//! `nd-cfi::unwind`'s own [`nd_cfi::UnwindContext`] contract.

use std::collections::HashMap;

use nd_cfi::{pick_better_trace, unwind_one_frame, walk_frame_pointers, Arch as CfiArch, FdeIndex, Trace, UnwindContext};
use nd_common::Arch;
use nd_dwarf::FunctionInfo;

use crate::error::Result;
use crate::process::ProcessControl;

/// One entry in a stack trace (`spec.md` §6 `stackTrace`). Inlined
/// subroutines are spliced in as extra frames ahead of the physical frame
/// whose PC falls inside their range, sharing its `fp`/`sp` since they
/// didn't push their own stack.
#[derive(Clone, Debug)]
pub struct StackFrame {
    pub id: u32,
    pub name: Option<String>,
    pub source: Option<String>,
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub address: u64,
    pub fp: u64,
    pub sp: u64,
    pub is_inlined: bool,
}

/// Adapts a live, currently-stopped process's registers to
/// [`UnwindContext`] and [`nd_dwarf::EvalContext`].
pub struct LiveContext<'a> {
    pub process: &'a dyn ProcessControl,
    pub arch: Arch,
    pub frame_base: Option<u64>,
    pub cfa: Option<u64>,
}

impl UnwindContext for LiveContext<'_> {
    fn register(&self, dwarf_reg: u16) -> Option<u64> {
        self.process.read_registers().ok()?.get(self.arch, dwarf_reg)
    }

    fn read_memory(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        self.process.read_memory(address, len).ok()
    }
}

impl nd_dwarf::EvalContext for LiveContext<'_> {
    fn register(&self, reg: u16) -> Option<u64> {
        UnwindContext::register(self, reg)
    }

    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> nd_dwarf::Result<()> {
        let bytes = self
            .process
            .read_memory(addr, buf.len())
            .map_err(|_| nd_dwarf::DwarfError::from(nd_dwarf::DwarfErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(&bytes);
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

/// Adapts a synthetic register set recovered by the unwinder (for any
/// frame above the innermost one) plus the same process's memory, since
/// CFI expressions can still dereference the inferior's stack/heap.
pub struct UnwoundContext<'a> {
    pub process: &'a dyn ProcessControl,
    pub registers: &'a HashMap<u16, u64>,
    pub frame_base: Option<u64>,
    pub cfa: Option<u64>,
}

impl UnwindContext for UnwoundContext<'_> {
    fn register(&self, dwarf_reg: u16) -> Option<u64> {
        self.registers.get(&dwarf_reg).copied()
    }

    fn read_memory(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        self.process.read_memory(address, len).ok()
    }
}

impl nd_dwarf::EvalContext for UnwoundContext<'_> {
    fn register(&self, reg: u16) -> Option<u64> {
        self.registers.get(&reg).copied()
    }

    fn read_memory(&self, addr: u64, buf: &mut [u8]) -> nd_dwarf::Result<()> {
        let bytes = self
            .process
            .read_memory(addr, buf.len())
            .map_err(|_| nd_dwarf::DwarfError::from(nd_dwarf::DwarfErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(&bytes);
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

fn cfi_arch(arch: Arch) -> CfiArch {
    match arch {
        Arch::Amd64 => CfiArch::X86_64,
        Arch::Arm64 => CfiArch::Arm64,
    }
}

/// Finds the innermost function (by `low_pc`/`high_pc` or `ranges`)
/// containing `pc`, a linear scan acceptable at the scale a single
/// stack-trace request touches (`spec.md` does not call for an interval
/// tree here).
pub fn function_containing<'f>(functions: &'f [FunctionInfo], pc: u64) -> Option<&'f FunctionInfo> {
    functions.iter().find(|f| match (f.low_pc, f.high_pc) {
        (Some(low), Some(high)) => pc >= low && pc < high,
        _ => false,
    })
}

/// Splices virtual frames for every inlined call whose range contains
/// `static_pc`, innermost first, ahead of the physical frame (`spec.md` §3
/// "Inlined subroutine"). `runtime_pc` (the same address before un-sliding)
/// is what's recorded on the frame, matching the physical frame's
/// `address` convention.
fn inlined_frames_at(
    function: &FunctionInfo,
    static_pc: u64,
    runtime_pc: u64,
    fp: u64,
    sp: u64,
    next_id: &mut u32,
) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    collect_inlined(&function.inlined_calls, static_pc, runtime_pc, fp, sp, next_id, &mut frames);
    frames
}

fn collect_inlined(
    calls: &[FunctionInfo],
    static_pc: u64,
    runtime_pc: u64,
    fp: u64,
    sp: u64,
    next_id: &mut u32,
    out: &mut Vec<StackFrame>,
) {
    for call in calls {
        let in_range = match (call.low_pc, call.high_pc) {
            (Some(low), Some(high)) => static_pc >= low && static_pc < high,
            _ => false,
        };
        if !in_range {
            continue;
        }
        // Innermost inlining first: recurse before pushing this level so
        // deeper calls land earlier in the returned vector.
        collect_inlined(&call.inlined_calls, static_pc, runtime_pc, fp, sp, next_id, out);
        let id = *next_id;
        *next_id += 1;
        out.push(StackFrame {
            id,
            name: call.name.clone(),
            source: call.call_file.map(|f| f.to_string()),
            line: call.call_line,
            column: call.call_column,
            address: runtime_pc,
            fp,
            sp,
            is_inlined: true,
        });
    }
}

/// Builds a full stack trace starting from the currently-stopped thread,
/// preferring CFI-driven unwinding and falling back to a frame-pointer
/// walk when no FDE covers a PC (`spec.md` §4.4 "trace-picking
/// heuristic", §4.9).
pub fn build_stack_trace(
    process: &dyn ProcessControl,
    arch: Arch,
    fde_index: Option<&FdeIndex>,
    cfi_section: Option<(&[u8], bool, u64)>,
    functions: &[FunctionInfo],
    aslr_slide: u64,
) -> Result<Vec<StackFrame>> {
    let registers = process.read_registers()?;
    let mut next_id = 0u32;
    let mut frames = Vec::new();

    let cfi_trace = fde_index.and_then(|idx| {
        let (data, is_eh_frame, runtime_addr) = cfi_section?;
        let mut pcs = vec![registers.pc];
        let mut cur_pc = registers.pc;
        let mut synthetic: HashMap<u16, u64> = registers.gprs.clone();
        synthetic.insert(arch.sp_register(), registers.sp);
        synthetic.insert(arch.fp_register(), registers.fp);
        for _ in 0..nd_cfi::MAX_FRAME_DEPTH {
            let ctx = UnwoundContext {
                process,
                registers: &synthetic,
                frame_base: None,
                cfa: None,
            };
            let unwound = unwind_one_frame(idx, data, is_eh_frame, runtime_addr, cur_pc, &ctx).ok()?;
            let ra = unwound.registers.get(&arch.return_address_register()).copied()?;
            if ra == 0 {
                break;
            }
            pcs.push(ra);
            synthetic = unwound.registers;
            cur_pc = ra;
        }
        Some(Trace { pcs })
    });

    let fp_trace = walk_frame_pointers(cfi_arch(arch), registers.fp, registers.pc, &LiveContext {
        process,
        arch,
        frame_base: None,
        cfa: None,
    });

    let is_root = |_pc: u64| false;
    let chosen = match cfi_trace {
        Some(cfi) => pick_better_trace(&cfi, &fp_trace, is_root),
        None => fp_trace,
    };

    for &pc in &chosen.pcs {
        let (fp, sp) = (registers.fp, registers.sp);
        // `pc` is a live/CFI-recovered runtime address; DWARF's function
        // table is keyed by static, link-time addresses (`spec.md` §3), so
        // every lookup against `functions` has to un-slide first.
        let static_pc = pc.wrapping_sub(aslr_slide);
        if let Some(function) = function_containing(functions, static_pc) {
            frames.extend(inlined_frames_at(function, static_pc, pc, fp, sp, &mut next_id));
            let id = next_id;
            next_id += 1;
            frames.push(StackFrame {
                id,
                name: function.name.clone(),
                source: function.decl_file.map(|f| f.to_string()),
                line: function.decl_line,
                column: None,
                address: pc,
                fp,
                sp,
                is_inlined: false,
            });
        } else {
            let id = next_id;
            next_id += 1;
            frames.push(StackFrame {
                id,
                name: None,
                source: None,
                line: None,
                column: None,
                address: pc,
                fp,
                sp,
                is_inlined: false,
            });
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcess;

    fn function_at(low_pc: u64, high_pc: u64) -> FunctionInfo {
        FunctionInfo {
            offset: 0,
            name: Some("main".to_string()),
            low_pc: Some(low_pc),
            high_pc: Some(high_pc),
            ranges: None,
            frame_base: None,
            decl_file: None,
            decl_line: Some(10),
            abstract_origin: None,
            call_file: None,
            call_line: None,
            call_column: None,
            is_inlined: false,
            parameters: Vec::new(),
            variables: Vec::new(),
            inlined_calls: Vec::new(),
        }
    }

    /// `functions` is keyed by static DWARF addresses; a stopped process
    /// with a nonzero ASLR slide reports runtime addresses in its
    /// registers. `build_stack_trace` must un-slide before consulting
    /// `functions`, while still recording the runtime address on the frame.
    #[test]
    fn build_stack_trace_unslides_before_resolving_function() {
        let mut process = FakeProcess::new();
        let slide = 0x5000;
        process.registers.pc = 0x1050 + slide;
        process.registers.fp = 0; // stop the frame-pointer walk after one frame

        let functions = vec![function_at(0x1000, 0x1100)];
        let frames = build_stack_trace(&process, Arch::Amd64, None, None, &functions, slide).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name.as_deref(), Some("main"));
        assert_eq!(frames[0].line, Some(10));
        assert_eq!(frames[0].address, 0x1050 + slide, "address stays in runtime space");
    }

    #[test]
    fn build_stack_trace_leaves_function_unresolved_without_slide_correction() {
        let mut process = FakeProcess::new();
        process.registers.pc = 0x1050 + 0x5000;
        process.registers.fp = 0;

        let functions = vec![function_at(0x1000, 0x1100)];
        let frames = build_stack_trace(&process, Arch::Amd64, None, None, &functions, 0).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, None, "static lookup misses without the real slide");
    }

    #[test]
    fn function_containing_matches_low_high_range() {
        let functions = vec![FunctionInfo {
            offset: 0,
            name: Some("main".to_string()),
            low_pc: Some(0x1000),
            high_pc: Some(0x1100),
            ranges: None,
            frame_base: None,
            decl_file: None,
            decl_line: Some(10),
            abstract_origin: None,
            call_file: None,
            call_line: None,
            call_column: None,
            is_inlined: false,
            parameters: Vec::new(),
            variables: Vec::new(),
            inlined_calls: Vec::new(),
        }];
        assert_eq!(function_containing(&functions, 0x1050).unwrap().name.as_deref(), Some("main"));
        assert!(function_containing(&functions, 0x2000).is_none());
    }
}
