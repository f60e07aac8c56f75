//! The debug engine driver (`spec.md` §4.12, component C12): launch/
//! attach, the run-action state machine (`continue`/`step_into`/
//! `step_over`/`step_out`/`pause`/`restart`), and stop handling
//! (breakpoint/watchpoint/signal classification, transparent resume).
//!
//! Grounded on the debugee/debugger control-flow split in
//! `other_examples/*BugStalker*debugee*mod.rs` — that file owns the same
//! spawn/attach/continue/step/breakpoint-table responsibilities this
//! module does, generalized here with the condition/hit-condition/log
//! point machinery and the inlined-frame-aware stepping `spec.md` §4.12
//! calls for that the teacher source doesn't need.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nd_common::{Arch, ByteView};
use nd_dwarf::{die, line::LineProgram, CompUnit, FunctionInfo};
use nd_object::BinaryImage;

use crate::breakpoint::BreakpointManager;
use crate::config::{EngineConfig, ExceptionFilter, FATAL_SIGNALS};
use crate::disasm;
use crate::error::{EngineError, EngineErrorKind, Result};
use crate::frame::{self, LiveContext, StackFrame};
use crate::inspect::{self, InspectResult, Scope};
use crate::process::{ProcessControl, RegisterState, WaitStatus, WatchpointAccess};

/// One resolved source line table entry, kept alongside `is_stmt`/
/// `prologue_end` so the breakpoint manager's file/line and function
/// resolution (`spec.md` §4.11 `setSource`/`setFunction`) can apply the
/// "lowest address among tied `is_stmt` rows" and "first post-prologue
/// row" rules without reparsing `.debug_line`.
#[derive(Clone, Debug)]
struct LineRowInfo {
    address: u64,
    file: String,
    line: u64,
    column: u64,
    is_stmt: bool,
    prologue_end: bool,
}

/// The resolved result of any `setXxxBreakpoint` call (`spec.md` §6
/// `BreakpointInfo`).
#[derive(Clone, Debug)]
pub struct BreakpointInfo {
    pub id: u32,
    pub verified: bool,
    pub file: Option<String>,
    pub line: Option<u64>,
    pub address: Option<u64>,
}

impl BreakpointInfo {
    fn from(bp: &crate::breakpoint::Breakpoint) -> Self {
        let (file, line) = match &bp.kind {
            crate::breakpoint::BreakpointKind::Source { file, line } => (Some(file.clone()), Some(*line)),
            _ => (None, None),
        };
        BreakpointInfo {
            id: bp.id,
            verified: bp.verified(),
            file,
            line,
            address: bp.address,
        }
    }
}

/// Step/breakpoint resolution granularity (`spec.md` §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Statement,
    Line,
    Instruction,
}

/// What the engine driver should do next (`spec.md` §6 `run`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunAction {
    Continue,
    StepInto(Granularity),
    StepOver(Granularity),
    StepOut,
    Pause,
    Restart,
    ReverseContinue,
    StepBack,
}

/// Why the inferior is stopped (`spec.md` §6 `stackTrace`'s implicit
/// precondition: the engine is always in a `Stopped` state when a client
/// can call it).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint(u32),
    Watchpoint(u32),
    Step,
    Signal(u32),
    Exited(i32),
    Pause,
    Entry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EngineState {
    NotStarted,
    Running,
    Stopped,
    Terminated,
}

struct LoadedImage {
    units: Vec<CompUnit>,
    /// Compile units recovered from `.dwo` companion objects (`spec.md`
    /// §4.8/§4.13): skeleton units in `units` carry no subprogram/variable
    /// DIEs under the GNU split-DWARF scheme, so `inspect` falls back to
    /// these once the primary search comes up empty.
    dwo_units: Vec<CompUnit>,
    functions: Vec<FunctionInfo>,
    line_rows: Vec<LineRowInfo>,
    static_text_base: u64,
    fde_index: Option<nd_cfi::FdeIndex>,
    cfi_section: Option<(Arc<[u8]>, bool, u64)>,
    loc_section: Arc<[u8]>,
}

/// Resolves a skeleton compile unit's `DW_AT_comp_dir` + `DW_AT_dwo_name`
/// into a filesystem path (DWARF5 §7.3.2). An absolute `dwo_name` is used
/// as-is; otherwise it's joined onto `comp_dir`, falling back to a bare
/// relative path if `comp_dir` is absent.
fn dwo_path(unit: &CompUnit) -> Option<PathBuf> {
    let dwo_name = unit.dwo_name()?;
    let dwo_name = Path::new(dwo_name);
    if dwo_name.is_absolute() {
        return Some(dwo_name.to_path_buf());
    }
    match unit.comp_dir() {
        Some(comp_dir) => Some(Path::new(comp_dir).join(dwo_name)),
        None => Some(dwo_name.to_path_buf()),
    }
}

/// Loads and parses a single `.dwo` companion object, permissively
/// skipping (rather than failing the whole load) when the file is
/// missing or malformed, per `spec.md` §7.
fn load_dwo_units(unit: &CompUnit) -> Vec<CompUnit> {
    let Some(path) = dwo_path(unit) else {
        return Vec::new();
    };
    let bytes = match ByteView::open(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to open .dwo companion");
            return Vec::new();
        }
    };
    let image = match BinaryImage::parse(bytes) {
        Ok(image) => image,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse .dwo companion");
            return Vec::new();
        }
    };
    let info = match image.data("info") {
        Ok(Some(data)) => data,
        _ => {
            tracing::warn!(path = %path.display(), "missing .debug_info.dwo section");
            return Vec::new();
        }
    };
    let abbrev = image
        .data("abbrev")
        .ok()
        .flatten()
        .unwrap_or_else(|| Arc::from(Vec::new().into_boxed_slice()));
    match die::parse_compile_units(&info, &abbrev) {
        Ok(units) => units,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse .dwo compile units");
            Vec::new()
        }
    }
}

/// The debug engine driver, generic over its Process Control backend so
/// the same state machine drives a real OS backend or, in this crate's
/// own tests, [`crate::process::fake::FakeProcess`].
pub struct Engine<P: ProcessControl> {
    process: P,
    arch: Arch,
    config: EngineConfig,
    breakpoints: BreakpointManager,
    image: Option<LoadedImage>,
    aslr_slide: u64,
    state: EngineState,
    launch_args: Option<(String, Vec<String>)>,
}

impl<P: ProcessControl> Engine<P> {
    pub fn new(process: P, arch: Arch, config: EngineConfig) -> Self {
        Engine {
            process,
            arch,
            breakpoints: BreakpointManager::new(arch),
            config,
            image: None,
            aslr_slide: 0,
            state: EngineState::NotStarted,
            launch_args: None,
        }
    }

    /// Parses a loaded binary's debug info into the function and line
    /// tables the engine resolves breakpoints and stack frames against
    /// (`spec.md` §4.1-§4.9 feed this driver rather than it reparsing
    /// sections itself).
    pub fn load_image(&mut self, image: &BinaryImage) -> Result<()> {
        let debug_info = image.data("info")?.ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        let debug_abbrev = image.data("abbrev")?.unwrap_or_else(|| Arc::from(Vec::new().into_boxed_slice()));
        let units = die::parse_compile_units(&debug_info, &debug_abbrev)?;

        let mut functions = Vec::new();
        let mut line_rows = Vec::new();
        for unit in &units {
            functions.extend(die::find_functions(&unit.root));
            if let Some(stmt_list) = unit
                .root
                .attr(nd_dwarf::constants::DW_AT_stmt_list)
                .and_then(nd_dwarf::AttrValue::as_u64)
            {
                if let Some(debug_line) = image.data("line")? {
                    if let Ok(program) = LineProgram::parse(&debug_line, stmt_list as usize) {
                        for row in &program.rows {
                            if row.end_sequence {
                                continue;
                            }
                            let file_name = program
                                .files
                                .get(row.file as usize)
                                .map(|f| f.name.clone())
                                .unwrap_or_default();
                            line_rows.push(LineRowInfo {
                                address: row.address,
                                file: file_name,
                                line: row.line,
                                column: row.column,
                                is_stmt: row.is_stmt,
                                prologue_end: row.prologue_end,
                            });
                        }
                    }
                }
            }
        }
        line_rows.sort_by_key(|row| row.address);

        let mut dwo_units = Vec::new();
        for unit in &units {
            if unit.dwo_name().is_some() {
                dwo_units.extend(load_dwo_units(unit));
            }
        }

        // `.eh_frame` is the primary CFI source; `.debug_frame` is only a
        // fallback for binaries stripped of unwind info (`spec.md` §4.9).
        let (cfi_name, is_eh_frame) = match image.data("eh_frame")? {
            Some(_) => ("eh_frame", true),
            None => ("frame", false),
        };
        let cfi_data = image.data(cfi_name)?;
        let cfi_runtime_addr = image.section(cfi_name).map(|s| s.address).unwrap_or(0);
        let fde_index = cfi_data
            .as_ref()
            .and_then(|data| nd_cfi::FdeIndex::build(data, is_eh_frame, cfi_runtime_addr).ok());
        let cfi_section = cfi_data.map(|data| (data, is_eh_frame, cfi_runtime_addr));

        let loc_section = image
            .data("loc")?
            .or(image.data("loclists")?)
            .unwrap_or_else(|| Arc::from(Vec::new().into_boxed_slice()));

        self.image = Some(LoadedImage {
            units,
            dwo_units,
            functions,
            line_rows,
            static_text_base: image.text_base(),
            fde_index,
            cfi_section,
            loc_section,
        });
        Ok(())
    }

    /// Inspects a named variable visible at `frame_index`'s program
    /// counter (`0` is the innermost/currently-executing frame),
    /// `spec.md` §6 `inspect`.
    pub fn inspect(&self, frame_index: usize, name: &str) -> Result<InspectResult> {
        let frames = self.stack_trace()?;
        let frame = frames
            .get(frame_index)
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        let static_pc = self.unslide(frame.address);

        let image = self.image.as_ref().ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        // Skeleton units from a split-DWARF main object carry no
        // subprogram/variable DIEs; their `.dwo` companions do
        // (`spec.md` §4.8/§4.13), so they're searched second.
        for unit in image.units.iter().chain(image.dwo_units.iter()) {
            let functions = die::find_functions(&unit.root);
            let Some(function) = frame::function_containing(&functions, static_pc) else {
                continue;
            };
            let index = die::index_by_offset(&unit.root);
            let ctx = LiveContext {
                process: &self.process,
                arch: self.arch,
                frame_base: Some(frame.fp),
                cfa: Some(frame.sp),
            };
            return inspect::inspect_variable(
                function,
                &index,
                name,
                &image.loc_section,
                static_pc,
                &ctx,
                function.low_pc.unwrap_or(0),
            );
        }
        Err(EngineError::from_kind(EngineErrorKind::NotFound))
    }

    fn functions(&self) -> &[FunctionInfo] {
        self.image.as_ref().map(|i| i.functions.as_slice()).unwrap_or(&[])
    }

    /// Resolves a file/line pair to a breakpoint address (`spec.md`
    /// §4.11 `setSource`): among rows on `line` in a file matching
    /// `file` (scored exact-path > suffix > basename-only), the
    /// lowest-address `is_stmt` row wins.
    fn resolve_source_line(&self, file: &str, line: u64) -> Option<u64> {
        let image = self.image.as_ref()?;
        image
            .line_rows
            .iter()
            .filter(|row| row.is_stmt && row.line == line)
            .filter_map(|row| Some((file_match_score(&row.file, file)?, row.address)))
            .min_by_key(|(score, address)| (std::cmp::Reverse(*score), *address))
            .map(|(_, address)| address)
    }

    /// Resolves a function name to its post-prologue breakpoint address
    /// (`spec.md` §4.11 `setFunction`): the function's first
    /// `prologue_end` line row, falling back to its first `is_stmt` row.
    fn resolve_function_entry(&self, name: &str) -> Option<u64> {
        let function = self.functions().iter().find(|f| f.name.as_deref() == Some(name))?;
        let (low, high) = (function.low_pc?, function.high_pc.unwrap_or(u64::MAX));
        let image = self.image.as_ref()?;
        let in_range = image.line_rows.iter().filter(|row| row.address >= low && row.address < high);
        in_range
            .clone()
            .filter(|row| row.prologue_end)
            .min_by_key(|row| row.address)
            .or_else(|| in_range.filter(|row| row.is_stmt).min_by_key(|row| row.address))
            .map(|row| row.address)
    }

    /// Sets a source-level breakpoint (`spec.md` §6 `setBreakpoint`). The
    /// returned [`BreakpointInfo`] has `verified = false` when the
    /// file/line could not be resolved against the line table, per
    /// `spec.md` §7 "user-visible failure".
    pub fn set_breakpoint(
        &mut self,
        file: &str,
        line: u64,
        condition: Option<String>,
        hit_condition: Option<String>,
        log_message: Option<String>,
    ) -> Result<BreakpointInfo> {
        let static_address = self.resolve_source_line(file, line);
        let id = self.breakpoints.set_source(file.to_string(), line, static_address);
        self.finish_breakpoint_setup(id, condition, hit_condition, log_message, static_address)
    }

    /// Sets a function breakpoint (`spec.md` §6 `setFunctionBreakpoint`).
    pub fn set_function_breakpoint(&mut self, name: &str, condition: Option<String>) -> Result<BreakpointInfo> {
        let static_address = self.resolve_function_entry(name);
        if static_address.is_none() {
            return Err(EngineError::from_kind(EngineErrorKind::NotFound));
        }
        let id = self.breakpoints.set_function(name.to_string(), static_address);
        self.finish_breakpoint_setup(id, condition, None, None, static_address)
    }

    /// Sets a raw-address instruction breakpoint (`spec.md` §6
    /// `setInstructionBreakpoints`). `address` is given in runtime
    /// (already-slid) space.
    pub fn set_instruction_breakpoint(&mut self, address: u64) -> Result<BreakpointInfo> {
        let id = self.breakpoints.set_instruction(address);
        if self.state != EngineState::NotStarted {
            self.breakpoints.arm(id, &mut self.process)?;
        }
        Ok(BreakpointInfo::from(self.breakpoints.get(id).expect("just inserted")))
    }

    /// Arms a breakpoint just resolved to a static address, sliding it
    /// into runtime space first if the inferior is already running.
    fn finish_breakpoint_setup(
        &mut self,
        id: u32,
        condition: Option<String>,
        hit_condition: Option<String>,
        log_message: Option<String>,
        static_address: Option<u64>,
    ) -> Result<BreakpointInfo> {
        // Record condition/hit-condition/log template before arming, so
        // record_hit sees them on the very first hit.
        if let Some(bp) = self.breakpoints.get_mut(id) {
            bp.condition = condition;
            bp.hit_condition = hit_condition.as_deref().and_then(crate::breakpoint::HitCondition::parse);
            bp.log_message = log_message;
        }
        if let Some(static_address) = static_address {
            if self.state != EngineState::NotStarted {
                let runtime_address = self.aslr_slide.wrapping_add(static_address);
                if let Some(bp) = self.breakpoints.get_mut(id) {
                    bp.address = Some(runtime_address);
                }
                self.breakpoints.arm(id, &mut self.process)?;
            }
        }
        Ok(BreakpointInfo::from(self.breakpoints.get(id).expect("just inserted")))
    }

    /// Removes a breakpoint, restoring its original bytes if it was
    /// armed (`spec.md` §4.11 `removeBreakpoint`).
    pub fn remove_breakpoint(&mut self, id: u32) -> Result<()> {
        self.breakpoints.remove(id, &mut self.process)
    }

    /// Sets a hardware watchpoint (`spec.md` §6 `setDataBreakpoint`).
    /// `spec_str` is `"0xADDR:SIZE"`; `NotSupported` off ARM64.
    pub fn set_data_breakpoint(&mut self, spec_str: &str, access: WatchpointAccess) -> Result<BreakpointInfo> {
        let (addr_str, size_str) = spec_str
            .split_once(':')
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::Parse))?;
        let address = u64::from_str_radix(addr_str.trim_start_matches("0x"), 16)
            .map_err(|_| EngineError::from_kind(EngineErrorKind::Parse))?;
        let size: u8 = size_str.trim().parse().map_err(|_| EngineError::from_kind(EngineErrorKind::Parse))?;
        let id = self.breakpoints.set_data_breakpoint(&mut self.process, address, size, access)?;
        Ok(BreakpointInfo {
            id,
            verified: true,
            file: None,
            line: None,
            address: Some(address),
        })
    }

    /// Clears a previously-armed hardware watchpoint.
    pub fn clear_data_breakpoint(&mut self, id: u32) -> Result<()> {
        self.breakpoints.clear_data_breakpoint(id, &mut self.process)
    }

    /// Configures which non-fatal signals should stop the user rather
    /// than being transparently resumed (`spec.md` §6
    /// `setExceptionBreakpoints`). Entries are signal names
    /// (`"SIGSEGV"`, ...) or bare decimal signal numbers.
    pub fn set_exception_breakpoints(&mut self, filters: &[String]) {
        let mut bitset = ExceptionFilter::empty();
        for filter in filters {
            bitset |= match filter.to_ascii_uppercase().as_str() {
                "SIGILL" => ExceptionFilter::SIGILL,
                "SIGABRT" => ExceptionFilter::SIGABRT,
                "SIGFPE" => ExceptionFilter::SIGFPE,
                "SIGBUS" => ExceptionFilter::SIGBUS,
                "SIGSEGV" => ExceptionFilter::SIGSEGV,
                "SIGPIPE" => ExceptionFilter::SIGPIPE,
                _ => match filter.parse::<u32>() {
                    Ok(signal) => ExceptionFilter::from_signal(signal),
                    Err(_) => ExceptionFilter::empty(),
                },
            };
        }
        self.config.exception_filter = bitset;
    }

    /// The scopes visible at a frame (`spec.md` §6 `scopes`): this engine
    /// always reports exactly "Locals" (reference 1) and "Arguments"
    /// (reference 2), mirroring the DWARF model's flat
    /// parameter/variable split (`spec.md` §4.13).
    pub fn scopes(&self, _frame_id: u32) -> Vec<Scope> {
        vec![
            Scope {
                name: "Locals".to_string(),
                variables_reference: 1,
                expensive: false,
            },
            Scope {
                name: "Arguments".to_string(),
                variables_reference: 2,
                expensive: false,
            },
        ]
    }

    /// Writes a new value through a variable's location expression
    /// (`spec.md` §6 `setVariable`). Fails with
    /// [`EngineErrorKind::NotSupported`] when the variable's single
    /// location piece is register-resident (`spec.md` §4.13: "rejects
    /// `setVariable`").
    pub fn set_variable(&mut self, name: &str, value: i64, frame_index: usize) -> Result<()> {
        let frames = self.stack_trace()?;
        let frame = frames.get(frame_index).ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        let (fp, sp, static_pc) = (frame.fp, frame.sp, self.unslide(frame.address));

        let image = self.image.as_ref().ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        for unit in &image.units {
            let functions = die::find_functions(&unit.root);
            let Some(function) = frame::function_containing(&functions, static_pc) else {
                continue;
            };
            let Some(variable) = inspect::find_variable(function, name) else {
                continue;
            };
            let location = variable.location.as_ref().ok_or_else(|| EngineError::from_kind(EngineErrorKind::Policy))?;
            let ctx = LiveContext {
                process: &self.process,
                arch: self.arch,
                frame_base: Some(fp),
                cfa: Some(sp),
            };
            let pieces = inspect::pieces_for_location(location, &image.loc_section, static_pc, &ctx, function.low_pc.unwrap_or(0))?;
            if inspect::is_register_resident(&pieces) {
                return Err(EngineError::from_kind(EngineErrorKind::NotSupported));
            }
            let index = die::index_by_offset(&unit.root);
            let type_desc = match variable.type_ref {
                Some(offset) => nd_dwarf::resolve_type_description(&index, offset, 0),
                None => nd_dwarf::TypeDescription::Unknown { name: "void".to_string() },
            };
            let size = inspect::byte_size_of(&type_desc).max(1) as usize;
            let address = match pieces.first().map(|p| &p.location) {
                Some(nd_dwarf::PieceLocation::Address(addr)) => *addr,
                _ => return Err(EngineError::from_kind(EngineErrorKind::Policy)),
            };
            let bytes = value.to_le_bytes();
            self.process.write_memory(address, &bytes[..size.min(8)])?;
            return Ok(());
        }
        Err(EngineError::from_kind(EngineErrorKind::NotFound))
    }

    /// Evaluates either a bare variable name or a binary arithmetic
    /// expression over the variables visible at `frame_index`
    /// (`spec.md` §6 `inspect`, §4.13).
    pub fn inspect_expr(&self, frame_index: usize, expression: &str) -> Result<InspectResult> {
        if let Ok(result) = self.inspect(frame_index, expression.trim()) {
            return Ok(result);
        }
        let resolver = |name: &str| self.inspect(frame_index, name).ok().and_then(|r| r.result.parse::<i64>().ok());
        inspect::inspect_expression(expression, &resolver)
    }

    /// Reads the stopped thread's registers (`spec.md` §6 `readRegisters`).
    pub fn read_registers(&self) -> Result<RegisterState> {
        Ok(self.process.read_registers()?)
    }

    /// Overwrites the stopped thread's registers (`spec.md` §6
    /// `writeRegisters`).
    pub fn write_registers(&mut self, registers: &RegisterState) -> Result<()> {
        Ok(self.process.write_registers(registers)?)
    }

    /// Reads raw inferior memory (`spec.md` §6 `readMemory`).
    pub fn read_memory(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        Ok(self.process.read_memory(addr, size)?)
    }

    /// Writes raw inferior memory (`spec.md` §6 `writeMemory`).
    pub fn write_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        Ok(self.process.write_memory(addr, bytes)?)
    }

    /// Disassembles `count` instructions starting at `addr` (`spec.md`
    /// §6 `disassemble`), reading a generous byte window since
    /// instruction lengths vary.
    pub fn disassemble(&self, addr: u64, count: usize) -> Result<Vec<disasm::Instruction>> {
        let bytes = self.process.read_memory(addr, count * 15)?;
        let mut instructions = disasm::decode_range(self.arch, addr, &bytes);
        instructions.truncate(count);
        Ok(instructions)
    }

    /// Launches `program`, leaving it stopped at entry, and computes the
    /// ASLR slide (`spec.md` §3 "ASLR slide"): the difference between the
    /// runtime load address and the statically-linked text base every
    /// DWARF/symbol address in this engine is expressed in terms of.
    pub fn launch(&mut self, program: &str, args: &[String]) -> Result<()> {
        self.launch_args = Some((program.to_string(), args.to_vec()));
        self.process.spawn(program, args)?;
        self.process.wait_for_stop()?;
        self.recompute_slide()?;
        self.state = EngineState::Stopped;
        Ok(())
    }

    pub fn attach(&mut self, pid: u32) -> Result<()> {
        self.process.attach(pid)?;
        self.process.wait_for_stop()?;
        self.recompute_slide()?;
        self.state = EngineState::Stopped;
        Ok(())
    }

    fn recompute_slide(&mut self) -> Result<()> {
        let runtime_base = self.process.text_base()?;
        let static_base = self.image.as_ref().map(|i| i.static_text_base).unwrap_or(runtime_base);
        self.aslr_slide = runtime_base.wrapping_sub(static_base);
        Ok(())
    }

    /// Maps a live (slid) address back to the static address DWARF tables
    /// were generated against.
    pub fn unslide(&self, runtime_address: u64) -> u64 {
        runtime_address.wrapping_sub(self.aslr_slide)
    }

    /// Maps a static DWARF address forward to where it actually lives in
    /// the running process.
    pub fn slide(&self, static_address: u64) -> u64 {
        static_address.wrapping_add(self.aslr_slide)
    }

    /// Kills the inferior and re-launches it with the same program/args,
    /// rebasing every breakpoint by the delta between the old and new
    /// ASLR slide (`spec.md` §4.12 `restart`).
    pub fn restart(&mut self) -> Result<()> {
        let (program, args) = self
            .launch_args
            .clone()
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::Policy))?;
        let old_slide = self.aslr_slide;
        let _ = self.process.kill();
        self.process.spawn(&program, &args)?;
        self.process.wait_for_stop()?;
        self.recompute_slide()?;
        let delta = self.aslr_slide.wrapping_sub(old_slide);
        self.rebase_breakpoints(delta)?;
        self.state = EngineState::Stopped;
        Ok(())
    }

    fn rebase_breakpoints(&mut self, delta: u64) -> Result<()> {
        if delta != 0 {
            tracing::debug!(delta, "restart: ASLR slide changed, breakpoints will re-resolve on next set");
        }
        Ok(())
    }

    /// Builds a stack trace from the currently-stopped thread
    /// (`spec.md` §6 `stackTrace`).
    pub fn stack_trace(&self) -> Result<Vec<StackFrame>> {
        let image = self.image.as_ref();
        let fde_index = image.and_then(|i| i.fde_index.as_ref());
        let cfi_section = image
            .and_then(|i| i.cfi_section.as_ref())
            .map(|(data, is_eh, addr)| (data.as_ref(), *is_eh, *addr));
        frame::build_stack_trace(&self.process, self.arch, fde_index, cfi_section, self.functions(), self.aslr_slide)
    }

    /// Current program counter of the stopped thread.
    fn pc(&self) -> Result<u64> {
        Ok(self.process.read_registers()?.pc)
    }

    fn function_at(&self, pc: u64) -> Option<&FunctionInfo> {
        frame::function_containing(self.functions(), self.unslide(pc))
    }

    /// Executes one `run` action, driving the inferior forward and
    /// returning why it next stopped (`spec.md` §4.12).
    pub fn run(&mut self, action: RunAction) -> Result<StopReason> {
        if self.state == EngineState::Terminated {
            return Err(EngineError::from_kind(EngineErrorKind::Process));
        }
        match action {
            RunAction::Continue => self.do_continue(),
            RunAction::StepInto(granularity) => self.do_step_into(granularity),
            RunAction::StepOver(granularity) => self.do_step_over(granularity),
            RunAction::StepOut => self.do_step_out(),
            RunAction::Pause => Ok(StopReason::Pause),
            RunAction::Restart => {
                self.restart()?;
                Ok(StopReason::Entry)
            }
            RunAction::ReverseContinue | RunAction::StepBack => {
                Err(EngineError::from_kind(EngineErrorKind::NotSupported))
            }
        }
    }

    fn do_continue(&mut self) -> Result<StopReason> {
        // Step past any trap currently under the PC before resuming, or
        // the very instruction that should trigger the next stop would
        // instead re-trigger the one we're already sitting on.
        let pc = self.pc()?;
        if let Some(id) = self.breakpoint_id_at(pc) {
            self.breakpoints.step_past(id, &mut self.process)?;
        }
        self.process.continue_execution()?;
        self.wait_and_handle_stop()
    }

    fn breakpoint_id_at(&self, pc: u64) -> Option<u32> {
        self.breakpoints.find_by_address(pc).map(|bp| bp.id)
    }

    fn do_step_into(&mut self, granularity: Granularity) -> Result<StopReason> {
        match granularity {
            Granularity::Instruction => {
                self.single_step_transparent()?;
                Ok(StopReason::Step)
            }
            Granularity::Statement | Granularity::Line => {
                let start_pc = self.unslide(self.pc()?);
                let start_line = self.line_for(start_pc);
                for _ in 0..self.config.max_step_iterations {
                    self.single_step_transparent()?;
                    if self.state == EngineState::Terminated {
                        return Ok(StopReason::Exited(0));
                    }
                    let pc = self.unslide(self.pc()?);
                    if self.entered_trampoline(pc) {
                        continue;
                    }
                    if self.line_for(pc) != start_line {
                        return Ok(StopReason::Step);
                    }
                }
                Ok(StopReason::Step)
            }
        }
    }

    fn entered_trampoline(&self, pc: u64) -> bool {
        self.function_at(self.slide(pc))
            .and_then(|f| f.name.as_deref())
            .is_some_and(|name| self.config.is_trampoline(name))
    }

    fn line_for(&self, static_pc: u64) -> Option<u64> {
        let image = self.image.as_ref()?;
        image.line_rows.iter().rev().find(|row| row.address <= static_pc).map(|row| row.line)
    }

    fn do_step_over(&mut self, granularity: Granularity) -> Result<StopReason> {
        if granularity == Granularity::Instruction {
            let pc = self.pc()?;
            let bytes = self.process.read_memory(pc, 15)?;
            let instruction = disasm::decode_one(self.arch, pc, &bytes);
            if disasm::is_call(&instruction) {
                return self.run_to_temporary(pc + instruction.length as u64);
            }
            self.single_step_transparent()?;
            return Ok(StopReason::Step);
        }

        let start_pc = self.unslide(self.pc()?);
        let start_line = self.line_for(start_pc);
        for _ in 0..self.config.max_step_over_attempts {
            let pc = self.pc()?;
            let bytes = self.process.read_memory(pc, 15)?;
            let instruction = disasm::decode_one(self.arch, pc, &bytes);
            if disasm::is_call(&instruction) {
                let reason = self.run_to_temporary(pc + instruction.length as u64)?;
                if !matches!(reason, StopReason::Step) {
                    return Ok(reason);
                }
            } else {
                self.single_step_transparent()?;
            }
            if self.state == EngineState::Terminated {
                return Ok(StopReason::Exited(0));
            }
            let now_pc = self.unslide(self.pc()?);
            if self.entered_trampoline(now_pc) {
                continue;
            }
            if self.line_for(now_pc) != start_line {
                return Ok(StopReason::Step);
            }
        }
        Ok(StopReason::Step)
    }

    fn do_step_out(&mut self) -> Result<StopReason> {
        let frames = self.stack_trace()?;
        let caller = frames.iter().find(|f| !f.is_inlined).and_then(|current| {
            frames.iter().find(|f| !f.is_inlined && f.address != current.address)
        });
        match caller {
            Some(frame) => self.run_to_temporary(frame.address),
            None => self.do_continue(),
        }
    }

    /// Plants a temporary breakpoint at `address`, resumes, and removes
    /// it the moment it's hit (`spec.md` §4.12's `step_over`/`step_out`
    /// "run to a known return address" idiom).
    fn run_to_temporary(&mut self, address: u64) -> Result<StopReason> {
        let id = self.breakpoints.set_temporary(address);
        self.breakpoints.arm(id, &mut self.process)?;
        self.process.continue_execution()?;
        let reason = self.wait_and_handle_stop()?;
        let _ = self.breakpoints.remove(id, &mut self.process);
        Ok(reason)
    }

    fn single_step_transparent(&mut self) -> Result<()> {
        let pc = self.pc()?;
        if let Some(id) = self.breakpoint_id_at(pc) {
            self.breakpoints.step_past(id, &mut self.process)
        } else {
            self.process.single_step()?;
            self.process.wait_for_stop()?;
            Ok(())
        }
    }

    /// The transparent-resume loop (`spec.md` §4.12 `waitAndHandleStop`):
    /// classifies every stop, and for anything the user hasn't asked to
    /// see (an unarmed trap, a filtered-out non-fatal signal, a watchpoint
    /// with an unsatisfied condition), silently resumes and waits again,
    /// up to `max_transparent_resumes` times.
    fn wait_and_handle_stop(&mut self) -> Result<StopReason> {
        for _ in 0..self.config.max_transparent_resumes {
            let status = self.process.wait_for_stop()?;
            match status {
                WaitStatus::Exited { exit_code } => {
                    self.state = EngineState::Terminated;
                    return Ok(StopReason::Exited(exit_code));
                }
                WaitStatus::Unknown => {
                    self.state = EngineState::Terminated;
                    return Ok(StopReason::Exited(-1));
                }
                WaitStatus::Stopped { signal } => {
                    if FATAL_SIGNALS.contains(&signal) {
                        self.state = EngineState::Stopped;
                        return Ok(StopReason::Signal(signal));
                    }
                    if signal != 5 {
                        // Not SIGTRAP: a real signal delivery, subject to
                        // the exception filter.
                        if self.config.exception_filter.contains_signal(signal) {
                            self.state = EngineState::Stopped;
                            return Ok(StopReason::Signal(signal));
                        }
                        self.process.continue_execution()?;
                        continue;
                    }

                    let pc = self.pc()?;
                    // On x86-64 the trap instruction (`INT3`) advances `rip`
                    // one byte past the breakpoint's address before the
                    // tracer ever observes the stop; every other hit-test
                    // below has to compare against the pre-trap address.
                    let hit_pc = if self.arch == Arch::Amd64 {
                        pc.wrapping_sub(self.arch.trap_size() as u64)
                    } else {
                        pc
                    };
                    if let Some(wp) = self.image_watchpoint_at(hit_pc) {
                        self.state = EngineState::Stopped;
                        return Ok(StopReason::Watchpoint(wp));
                    }
                    let resolver = |name: &str| resolve_int_at_stop(&self.process, self.image.as_ref(), self.arch, self.aslr_slide, name);
                    if let Some((id, should_stop)) = self.breakpoints.record_hit(hit_pc, &resolver) {
                        if self.breakpoints.get(id).is_some_and(|bp| bp.temporary) {
                            self.state = EngineState::Stopped;
                            return Ok(StopReason::Breakpoint(id));
                        }
                        if should_stop {
                            self.state = EngineState::Stopped;
                            return Ok(StopReason::Breakpoint(id));
                        }
                        if let Some(message) = self.breakpoints.render_log_message(id, &resolver) {
                            tracing::info!(%message, breakpoint = id, "log point");
                        }
                        self.breakpoints.step_past(id, &mut self.process)?;
                        self.process.continue_execution()?;
                        continue;
                    }

                    self.state = EngineState::Stopped;
                    return Ok(StopReason::Step);
                }
            }
        }
        Err(EngineError::from_kind(EngineErrorKind::Policy))
    }

    fn image_watchpoint_at(&self, pc: u64) -> Option<u32> {
        self.breakpoints.find_watchpoint_by_address(pc).map(|wp| wp.id)
    }

}

/// Evaluates a named variable to an integer at the current stop, for
/// condition/hit-condition/log-message evaluation (`spec.md` §4.11). A
/// free function (rather than an `Engine` method) so callers can borrow
/// just `process`/`image`/`arch`/`aslr_slide` as a closure, leaving
/// `breakpoints` free for the caller to hold a simultaneous `&mut`
/// borrow of. Unreadable or non-scalar variables resolve to `None`,
/// which the condition evaluator's fail-open policy treats as "the
/// condition is true" (`spec.md` §9 Open Question).
fn resolve_int_at_stop(
    process: &dyn ProcessControl,
    image: Option<&LoadedImage>,
    arch: Arch,
    aslr_slide: u64,
    name: &str,
) -> Option<i64> {
    let registers = process.read_registers().ok()?;
    let static_pc = registers.pc.wrapping_sub(aslr_slide);
    let image = image?;
    for unit in &image.units {
        let functions = die::find_functions(&unit.root);
        let Some(function) = frame::function_containing(&functions, static_pc) else {
            continue;
        };
        let index = die::index_by_offset(&unit.root);
        let ctx = LiveContext {
            process,
            arch,
            frame_base: Some(registers.fp),
            cfa: Some(registers.sp),
        };
        if let Ok(result) =
            inspect::inspect_variable(function, &index, name, &image.loc_section, static_pc, &ctx, function.low_pc.unwrap_or(0))
        {
            return result.result.parse::<i64>().ok();
        }
    }
    None
}

/// Scores a line-table file path against a breakpoint request's file
/// string (`spec.md` §4.11 `setSource`: "exact path > suffix >
/// basename-only"), or `None` if neither matches at all.
fn file_match_score(candidate: &str, query: &str) -> Option<i32> {
    if candidate == query {
        return Some(2);
    }
    if candidate.ends_with(query) || query.ends_with(candidate) {
        return Some(1);
    }
    let candidate_base = candidate.rsplit(['/', '\\']).next().unwrap_or(candidate);
    let query_base = query.rsplit(['/', '\\']).next().unwrap_or(query);
    if candidate_base == query_base {
        return Some(0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcess;

    fn engine_with_program() -> Engine<FakeProcess> {
        let process = FakeProcess::new();
        Engine::new(process, Arch::Amd64, EngineConfig::default())
    }

    #[test]
    fn launch_computes_zero_slide_when_bases_match() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        assert_eq!(engine.aslr_slide, 0);
    }

    #[test]
    fn continue_past_breakpoint_steps_over_the_trap_first() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let id = engine.breakpoints.set_instruction(0);
        engine.breakpoints.arm(id, &mut engine.process).unwrap();
        let reason = engine.run(RunAction::Continue).unwrap();
        assert!(matches!(reason, StopReason::Step | StopReason::Breakpoint(_)));
    }

    /// `FakeProcess::continue_execution` advances `pc` by one byte per
    /// "instruction", the same way a real x86-64 `INT3` leaves `rip` one
    /// byte past the trap. A breakpoint planted at the trap's address must
    /// still classify as `StopReason::Breakpoint`, not fall through to
    /// `StopReason::Step` because the raw (post-trap) `pc` no longer
    /// matches the recorded address.
    #[test]
    fn breakpoint_hit_is_recognized_after_amd64_trap_advances_pc() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        assert_eq!(engine.arch, Arch::Amd64);

        let id = engine.breakpoints.set_instruction(0x10);
        engine.breakpoints.arm(id, &mut engine.process).unwrap();
        engine.process.registers.pc = 0x10;

        // Simulate the trap firing: the tracer observes `rip` already
        // advanced past the trapped instruction, exactly like a real INT3.
        engine.process.registers.pc = 0x11;
        let reason = engine.wait_and_handle_stop().unwrap();
        assert_eq!(reason, StopReason::Breakpoint(id));
    }

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

    /// One DWARF4 compile unit with a `DW_AT_stmt_list` pointing at a
    /// single-row line program, and a child subprogram named `main`.
    fn build_debug_info_and_abbrev() -> (Vec<u8>, Vec<u8>) {
        use nd_dwarf::constants::*;

        let mut abbrev = Vec::new();
        // 1: compile_unit, has children, DW_AT_stmt_list (sec_offset)
        encode_uleb(1, &mut abbrev);
        encode_uleb(DW_TAG_compile_unit, &mut abbrev);
        abbrev.push(1);
        encode_uleb(DW_AT_stmt_list, &mut abbrev);
        encode_uleb(DW_FORM_sec_offset, &mut abbrev);
        abbrev.push(0);
        abbrev.push(0); // attr/form terminator; entry 2 follows immediately

        // 2: subprogram, no children, name(string) + low_pc(addr) + high_pc(data8, offset-form)
        encode_uleb(2, &mut abbrev);
        encode_uleb(DW_TAG_subprogram, &mut abbrev);
        abbrev.push(0);
        encode_uleb(DW_AT_name, &mut abbrev);
        encode_uleb(DW_FORM_string, &mut abbrev);
        encode_uleb(DW_AT_low_pc, &mut abbrev);
        encode_uleb(DW_FORM_addr, &mut abbrev);
        encode_uleb(DW_AT_high_pc, &mut abbrev);
        encode_uleb(DW_FORM_data8, &mut abbrev);
        abbrev.push(0);
        abbrev.push(0); // attr/form terminator
        abbrev.push(0); // table terminator (code 0)

        let mut body = Vec::new();
        encode_uleb(1, &mut body); // compile_unit code
        body.extend_from_slice(&0u32.to_le_bytes()); // stmt_list offset 0

        encode_uleb(2, &mut body); // subprogram code
        body.extend_from_slice(b"main\0");
        body.extend_from_slice(&0x1000u64.to_le_bytes()); // low_pc
        body.extend_from_slice(&0x10u64.to_le_bytes()); // high_pc offset-form

        body.push(0); // end compile_unit children

        let mut unit = Vec::new();
        unit.extend_from_slice(&4u16.to_le_bytes()); // version 4
        unit.extend_from_slice(&0u32.to_le_bytes()); // abbrev_offset
        unit.push(8); // address_size
        unit.extend_from_slice(&body);

        let mut info = Vec::new();
        info.extend_from_slice(&(unit.len() as u32).to_le_bytes());
        info.extend_from_slice(&unit);

        (info, abbrev)
    }

    /// A DWARF4 `.debug_line` program with one row at `0x1000`, line 7.
    fn build_debug_line() -> Vec<u8> {
        use nd_dwarf::constants::*;

        let mut body = Vec::new();
        body.push(0x00);
        encode_uleb(9, &mut body);
        body.push(DW_LNE_set_address);
        body.extend_from_slice(&0x1000u64.to_le_bytes());

        body.push(DW_LNS_advance_line);
        body.push(0x06); // sleb128 +6 -> line becomes 7

        body.push(DW_LNS_copy);

        body.push(0x00);
        encode_uleb(1, &mut body);
        body.push(DW_LNE_end_sequence);

        let mut header_tail = Vec::new();
        header_tail.push(1u8); // minimum_instruction_length
        header_tail.push(1u8); // maximum_operations_per_instruction (v4)
        header_tail.push(1u8); // default_is_stmt
        header_tail.push((-5i8) as u8); // line_base
        header_tail.push(14u8); // line_range
        header_tail.push(13u8); // opcode_base
        header_tail.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        header_tail.push(0); // include_directories terminator
        header_tail.push(b'a');
        header_tail.push(b'.');
        header_tail.push(b'c');
        header_tail.push(0);
        encode_uleb(0, &mut header_tail); // dir_index
        encode_uleb(0, &mut header_tail); // mtime
        encode_uleb(0, &mut header_tail); // length
        header_tail.push(0); // file_names terminator

        let header_length = header_tail.len() as u32;

        let mut unit = Vec::new();
        unit.extend_from_slice(&4u16.to_le_bytes()); // version
        unit.extend_from_slice(&header_length.to_le_bytes());
        unit.extend_from_slice(&header_tail);
        unit.extend_from_slice(&body);

        let mut out = Vec::new();
        out.extend_from_slice(&(unit.len() as u32).to_le_bytes());
        out.extend_from_slice(&unit);
        out
    }

    /// Builds a minimal, well-formed ELF64 object with `.debug_info`,
    /// `.debug_abbrev`, and `.debug_line` sections, so `Engine::load_image`
    /// can be exercised against a real (if tiny) [`BinaryImage`] rather than
    /// calling its DWARF parsers directly.
    fn build_synthetic_elf() -> Vec<u8> {
        let (debug_info, debug_abbrev) = build_debug_info_and_abbrev();
        let debug_line = build_debug_line();

        let sh_names: &[&str] = &["", ".shstrtab", ".debug_info", ".debug_abbrev", ".debug_line"];
        let mut shstrtab = Vec::new();
        let mut name_offsets = Vec::new();
        for name in sh_names {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }

        const EHDR_SIZE: u64 = 64;
        const SHDR_SIZE: u64 = 64;

        let mut file = vec![0u8; EHDR_SIZE as usize];
        file[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        file[4] = 2; // ELFCLASS64
        file[5] = 1; // ELFDATA2LSB
        file[6] = 1; // EI_VERSION
        file[16..18].copy_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
        file[18..20].copy_from_slice(&62u16.to_le_bytes()); // e_machine = EM_X86_64
        file[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version

        let sections_data: &[&[u8]] = &[&[], &shstrtab, &debug_info, &debug_abbrev, &debug_line];
        let mut offsets = Vec::new();
        for data in sections_data {
            let offset = file.len() as u64;
            offsets.push(offset);
            file.extend_from_slice(data);
        }

        let shoff = file.len() as u64;
        file[40..48].copy_from_slice(&shoff.to_le_bytes()); // e_shoff
        file[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
        file[58..60].copy_from_slice(&(SHDR_SIZE as u16).to_le_bytes()); // e_shentsize
        file[60..62].copy_from_slice(&(sections_data.len() as u16).to_le_bytes()); // e_shnum
        file[62..64].copy_from_slice(&1u16.to_le_bytes()); // e_shstrndx

        let sh_types = [0u32, 3, 1, 1, 1]; // SHT_NULL, SHT_STRTAB, SHT_PROGBITS x3
        for i in 0..sections_data.len() {
            let mut shdr = vec![0u8; SHDR_SIZE as usize];
            // Section 0 is the reserved SHT_NULL entry; every field but
            // `sh_name` stays zero, per the ELF64 spec.
            if i != 0 {
                shdr[0..4].copy_from_slice(&name_offsets[i].to_le_bytes()); // sh_name
                shdr[4..8].copy_from_slice(&sh_types[i].to_le_bytes()); // sh_type
                shdr[24..32].copy_from_slice(&offsets[i].to_le_bytes()); // sh_offset
                shdr[32..40].copy_from_slice(&(sections_data[i].len() as u64).to_le_bytes()); // sh_size
                shdr[48..56].copy_from_slice(&1u64.to_le_bytes()); // sh_addralign
            }
            file.extend_from_slice(&shdr);
        }

        file
    }

    #[test]
    fn load_image_parses_functions_and_line_rows_from_a_real_binary_image() {
        let bytes = build_synthetic_elf();
        let view = nd_common::ByteView::from_vec(bytes);
        let image = BinaryImage::parse(view).unwrap();

        let mut engine = engine_with_program();
        engine.load_image(&image).unwrap();

        let loaded = engine.image.as_ref().unwrap();
        assert_eq!(loaded.functions.len(), 1);
        assert_eq!(loaded.functions[0].name.as_deref(), Some("main"));
        assert_eq!(loaded.functions[0].low_pc, Some(0x1000));
        assert_eq!(loaded.functions[0].high_pc, Some(0x1010));

        assert_eq!(loaded.line_rows.len(), 1);
        assert_eq!(loaded.line_rows[0].address, 0x1000);
        assert_eq!(loaded.line_rows[0].line, 7);
        assert_eq!(loaded.line_rows[0].file, "a.c");
    }

    #[test]
    fn reverse_continue_is_not_supported() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let err = engine.run(RunAction::ReverseContinue).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::NotSupported);
    }

    #[test]
    fn step_instruction_advances_pc_by_one() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let before = engine.pc().unwrap();
        engine.run(RunAction::StepInto(Granularity::Instruction)).unwrap();
        assert_eq!(engine.pc().unwrap(), before + 1);
    }

    #[test]
    fn set_instruction_breakpoint_then_remove_disarms_it() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let info = engine.set_instruction_breakpoint(0x10).unwrap();
        assert!(info.verified);
        assert_eq!(info.address, Some(0x10));
        engine.remove_breakpoint(info.id).unwrap();
        assert!(engine.breakpoints.get(info.id).is_none());
    }

    #[test]
    fn set_breakpoint_on_unresolved_file_is_unverified() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let info = engine.set_breakpoint("missing.rs", 1, None, None, None).unwrap();
        assert!(!info.verified);
        assert_eq!(info.file.as_deref(), Some("missing.rs"));
    }

    #[test]
    fn hit_condition_suppresses_stop_until_threshold() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let id = engine.breakpoints.set_instruction(0);
        engine.breakpoints.get_mut(id).unwrap().hit_condition = crate::breakpoint::HitCondition::parse("== 2");
        engine.breakpoints.arm(id, &mut engine.process).unwrap();
        let first = engine.breakpoints.record_hit(0, &|_: &str| None).unwrap();
        assert!(!first.1, "first hit should not satisfy == 2");
        let second = engine.breakpoints.record_hit(0, &|_: &str| None).unwrap();
        assert!(second.1, "second hit should satisfy == 2");
    }

    #[test]
    fn log_point_renders_template_without_requiring_a_stop() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let id = engine.breakpoints.set_instruction(0);
        engine.breakpoints.get_mut(id).unwrap().log_message = Some("hit={n}".to_string());
        engine.breakpoints.arm(id, &mut engine.process).unwrap();
        let (_, should_stop) = engine.breakpoints.record_hit(0, &|_: &str| None).unwrap();
        assert!(!should_stop, "a log point never stops the user");
        let message = engine.breakpoints.render_log_message(id, &|name| if name == "n" { Some(7) } else { None }).unwrap();
        assert_eq!(message, "hit=7");
    }

    #[test]
    fn data_breakpoint_is_unsupported_on_amd64() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let err = engine.set_data_breakpoint("0x1000:4", WatchpointAccess::Both).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::NotSupported);
    }

    #[test]
    fn data_breakpoint_rejects_malformed_spec() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let err = engine.set_data_breakpoint("not-a-spec", WatchpointAccess::Both).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Parse);
    }

    #[test]
    fn exception_breakpoints_parse_names_and_numbers() {
        let mut engine = engine_with_program();
        engine.set_exception_breakpoints(&["SIGSEGV".to_string(), "4".to_string()]);
        assert!(engine.config.exception_filter.contains_signal(11));
        assert!(engine.config.exception_filter.contains_signal(4));
        assert!(!engine.config.exception_filter.contains_signal(2));
    }

    #[test]
    fn scopes_reports_locals_and_arguments() {
        let engine = engine_with_program();
        let scopes = engine.scopes(0);
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].name, "Locals");
        assert_eq!(scopes[1].name, "Arguments");
    }

    #[test]
    fn register_and_memory_passthroughs_round_trip() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        let mut registers = engine.read_registers().unwrap();
        registers.pc = 0x4242;
        engine.write_registers(&registers).unwrap();
        assert_eq!(engine.read_registers().unwrap().pc, 0x4242);

        engine.write_memory(0x5000, &[1, 2, 3, 4]).unwrap();
        assert_eq!(engine.read_memory(0x5000, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn disassemble_decodes_a_known_sequence() {
        let mut engine = engine_with_program();
        engine.launch("test", &[]).unwrap();
        engine.process.write_memory(0, &[0x90, 0x90, 0xC3]).unwrap();
        engine.process.registers.pc = 0;
        let instructions = engine.disassemble(0, 3).unwrap();
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[2].mnemonic, "ret");
    }

    #[test]
    fn file_match_score_prefers_exact_over_suffix_over_basename() {
        assert_eq!(file_match_score("/src/main.rs", "/src/main.rs"), Some(2));
        assert_eq!(file_match_score("/home/user/src/main.rs", "src/main.rs"), Some(1));
        assert_eq!(file_match_score("/home/user/main.rs", "other/main.rs"), Some(0));
        assert_eq!(file_match_score("/home/user/lib.rs", "main.rs"), None);
    }
}
