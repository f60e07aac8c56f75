//! The breakpoint manager (`spec.md` §4.11, component C11).
//!
//! Owns every breakpoint and hardware watchpoint the user has set, the
//! software-trap bytes patched into the inferior's text, and the
//! step-past-breakpoint protocol the engine driver (`crate::engine`) uses
//! to resume execution at a location currently occupied by a trap.
//! Grounded on the debugee breakpoint table in
//! `other_examples/*BugStalker*debugee*mod.rs`, generalized here with
//! condition/hit-condition/log-point evaluation the teacher source didn't
//! need.

use std::collections::HashMap;

use nd_common::Arch;

use crate::error::{EngineError, EngineErrorKind, Result};
use crate::expr;
use crate::process::ProcessControl;

/// What a breakpoint is anchored to (`spec.md` §3 "Breakpoint").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakpointKind {
    /// A source file and 1-based line number, resolved against the line
    /// table to a concrete address.
    Source { file: String, line: u64 },
    /// A function's entry address, resolved past its prologue.
    Function { name: String },
    /// A raw instruction address, given directly by the user.
    Instruction { address: u64 },
}

/// The parsed form of a `hitCondition` string (`spec.md` §4.11): `"> N"`,
/// `"== N"`, `"% N"`, or a bare `"N"` (equivalent to `"== N"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitCondition {
    GreaterThan(u32),
    Equals(u32),
    Modulo(u32),
}

impl HitCondition {
    /// Parses a hit-condition string, or `None` if it doesn't match the
    /// grammar this spec supports.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('>') {
            return rest.trim().parse().ok().map(HitCondition::GreaterThan);
        }
        if let Some(rest) = s.strip_prefix("==") {
            return rest.trim().parse().ok().map(HitCondition::Equals);
        }
        if let Some(rest) = s.strip_prefix('%') {
            return rest.trim().parse().ok().map(HitCondition::Modulo);
        }
        s.parse().ok().map(HitCondition::Equals)
    }

    /// Whether `hit_count` (the 1-based count of times the breakpoint's
    /// location has been reached) satisfies this condition.
    pub fn check(self, hit_count: u32) -> bool {
        match self {
            HitCondition::GreaterThan(n) => hit_count > n,
            HitCondition::Equals(n) => hit_count == n,
            HitCondition::Modulo(n) => n != 0 && hit_count % n == 0,
        }
    }
}

/// A user-visible or engine-internal (temporary) breakpoint.
#[derive(Clone, Debug)]
pub struct Breakpoint {
    pub id: u32,
    pub kind: BreakpointKind,
    /// The resolved address, once the engine has matched `kind` against
    /// the line table or function index. `None` until then, or if
    /// resolution failed (an unverified breakpoint).
    pub address: Option<u64>,
    pub condition: Option<String>,
    pub hit_condition: Option<HitCondition>,
    /// A template such as `"x = {x}"`; when present the breakpoint is a
    /// log point and never actually stops the inferior.
    pub log_message: Option<String>,
    /// Number of times this location has been reached, irrespective of
    /// whether the condition/hit-condition suppressed the stop.
    pub hit_count: u32,
    pub enabled: bool,
    /// Set for breakpoints the engine plants for its own bookkeeping
    /// (the instruction just past a `step_over`/`step_out` call site)
    /// rather than ones the user asked for; removed once hit.
    pub temporary: bool,
    /// The bytes the trap instruction overwrote at `address`, saved so
    /// they can be restored for step-past or breakpoint removal.
    pub original_bytes: Option<Vec<u8>>,
    /// Whether the trap is currently patched into the inferior's memory.
    pub armed: bool,
}

impl Breakpoint {
    fn new(id: u32, kind: BreakpointKind, address: Option<u64>) -> Self {
        Breakpoint {
            id,
            kind,
            address,
            condition: None,
            hit_condition: None,
            log_message: None,
            hit_count: 0,
            enabled: true,
            temporary: false,
            original_bytes: None,
            armed: false,
        }
    }

    /// Whether the engine managed to resolve this breakpoint to a
    /// concrete address (the `verified` flag DAP-style clients expect).
    pub fn verified(&self) -> bool {
        self.address.is_some()
    }
}

/// One armed hardware watchpoint (`spec.md` §3 "Hardware watchpoint
/// slot"). ARM64 exposes 4 slots; x86-64 backends report
/// [`EngineErrorKind::NotSupported`] instead of ever constructing one.
#[derive(Clone, Copy, Debug)]
pub struct Watchpoint {
    /// Visible id, offset by 1000 from the hardware slot so it never
    /// collides with a software breakpoint id (`spec.md` §3).
    pub id: u32,
    pub address: u64,
    pub size: u8,
    pub access: crate::process::WatchpointAccess,
    pub slot: u32,
}

const WATCHPOINT_ID_BASE: u32 = 1000;
const MAX_HARDWARE_WATCHPOINTS_ARM64: usize = 4;

/// Owns every breakpoint and watchpoint and mediates all reads/writes of
/// trap bytes against a [`ProcessControl`] backend.
pub struct BreakpointManager {
    breakpoints: HashMap<u32, Breakpoint>,
    watchpoints: HashMap<u32, Watchpoint>,
    next_id: u32,
    arch: Arch,
}

impl BreakpointManager {
    pub fn new(arch: Arch) -> Self {
        BreakpointManager {
            breakpoints: HashMap::new(),
            watchpoints: HashMap::new(),
            next_id: 1,
            arch,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn set_source(&mut self, file: String, line: u64, address: Option<u64>) -> u32 {
        let id = self.allocate_id();
        self.breakpoints
            .insert(id, Breakpoint::new(id, BreakpointKind::Source { file, line }, address));
        id
    }

    pub fn set_function(&mut self, name: String, address: Option<u64>) -> u32 {
        let id = self.allocate_id();
        self.breakpoints
            .insert(id, Breakpoint::new(id, BreakpointKind::Function { name }, address));
        id
    }

    pub fn set_instruction(&mut self, address: u64) -> u32 {
        let id = self.allocate_id();
        self.breakpoints.insert(
            id,
            Breakpoint::new(id, BreakpointKind::Instruction { address }, Some(address)),
        );
        id
    }

    /// Plants an engine-internal breakpoint used to land `step_over` or
    /// `step_out` at a known address, marked [`Breakpoint::temporary`] so
    /// the engine driver removes it the moment it's hit.
    pub fn set_temporary(&mut self, address: u64) -> u32 {
        let id = self.allocate_id();
        let mut bp = Breakpoint::new(id, BreakpointKind::Instruction { address }, Some(address));
        bp.temporary = true;
        self.breakpoints.insert(id, bp);
        id
    }

    pub fn remove(&mut self, id: u32, process: &mut dyn ProcessControl) -> Result<()> {
        if let Some(bp) = self.breakpoints.get(&id) {
            if bp.armed {
                self.disarm(id, process)?;
            }
        }
        self.breakpoints.remove(&id);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn find_by_address(&self, address: u64) -> Option<&Breakpoint> {
        self.breakpoints.values().find(|bp| bp.enabled && bp.address == Some(address))
    }

    fn find_by_address_mut(&mut self, address: u64) -> Option<&mut Breakpoint> {
        self.breakpoints.values_mut().find(|bp| bp.enabled && bp.address == Some(address))
    }

    /// Patches the trap instruction into the inferior at `id`'s resolved
    /// address, saving the bytes it overwrote.
    pub fn arm(&mut self, id: u32, process: &mut dyn ProcessControl) -> Result<()> {
        let trap = self.arch.trap_instruction().to_vec();
        let bp = self
            .breakpoints
            .get_mut(&id)
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        let address = bp
            .address
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        if bp.armed {
            return Ok(());
        }
        let original = process.read_memory(address, trap.len())?;
        process.write_memory(address, &trap)?;
        bp.original_bytes = Some(original);
        bp.armed = true;
        Ok(())
    }

    fn disarm(&mut self, id: u32, process: &mut dyn ProcessControl) -> Result<()> {
        let bp = self
            .breakpoints
            .get_mut(&id)
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
        if let (Some(address), Some(original)) = (bp.address, bp.original_bytes.take()) {
            process.write_memory(address, &original)?;
        }
        bp.armed = false;
        Ok(())
    }

    /// The step-past-breakpoint protocol (`spec.md` §4.11): rewind the
    /// program counter if the trap already advanced it (x86-64's `int3`
    /// leaves `pc` one byte past the trap; AArch64's `brk` does not move
    /// it at all), restore the original bytes, single-step across the
    /// real instruction, then re-arm the trap.
    pub fn step_past(&mut self, id: u32, process: &mut dyn ProcessControl) -> Result<()> {
        let trap_size = self.arch.trap_size() as u64;
        let address = self
            .breakpoints
            .get(&id)
            .and_then(|bp| bp.address)
            .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;

        let mut registers = process.read_registers()?;
        if registers.pc == address + trap_size {
            registers.pc = address;
            process.write_registers(&registers)?;
        }

        self.disarm(id, process)?;
        process.single_step()?;
        process.wait_for_stop()?;
        self.arm(id, process)?;
        Ok(())
    }

    /// Arms a hardware watchpoint slot (`spec.md` §4.11): unsupported on
    /// x86-64 backends, bounded to 4 concurrent slots on ARM64.
    pub fn set_data_breakpoint(
        &mut self,
        process: &mut dyn ProcessControl,
        address: u64,
        size: u8,
        access: crate::process::WatchpointAccess,
    ) -> Result<u32> {
        if self.arch == Arch::Amd64 {
            return Err(EngineError::from_kind(EngineErrorKind::NotSupported));
        }
        if self.watchpoints.len() >= MAX_HARDWARE_WATCHPOINTS_ARM64 {
            return Err(EngineError::from_kind(EngineErrorKind::Policy));
        }
        let slot = process.set_hardware_watchpoint(address, size, access)?;
        let id = WATCHPOINT_ID_BASE + slot;
        self.watchpoints.insert(
            id,
            Watchpoint {
                id,
                address,
                size,
                access,
                slot,
            },
        );
        Ok(id)
    }

    pub fn clear_data_breakpoint(&mut self, id: u32, process: &mut dyn ProcessControl) -> Result<()> {
        if let Some(wp) = self.watchpoints.remove(&id) {
            process.clear_hardware_watchpoint(wp.slot)?;
        }
        Ok(())
    }

    pub fn find_watchpoint_by_address(&self, address: u64) -> Option<&Watchpoint> {
        self.watchpoints.values().find(|wp| wp.address == address)
    }

    /// Evaluates whether the breakpoint at `address` should actually stop
    /// the user, folding in its condition and hit-condition and bumping
    /// its hit count. Returns `None` if there is no enabled breakpoint at
    /// that address at all (a trap hit the engine didn't plant).
    pub fn record_hit(&mut self, address: u64, resolve: &dyn Fn(&str) -> Option<i64>) -> Option<(u32, bool)> {
        let bp = self.find_by_address_mut(address)?;
        bp.hit_count += 1;

        let condition_ok = match &bp.condition {
            Some(expr) => expr::evaluate_condition(expr, resolve).unwrap_or(true),
            None => true,
        };
        let hit_condition_ok = match bp.hit_condition {
            Some(hc) => hc.check(bp.hit_count),
            None => true,
        };
        let should_stop = condition_ok && hit_condition_ok && bp.log_message.is_none();
        Some((bp.id, should_stop))
    }

    /// Renders a log point's message template, substituting each
    /// `{expr}` placeholder with the evaluated expression's value
    /// (`spec.md` §4.11).
    pub fn render_log_message(&self, id: u32, resolve: &dyn Fn(&str) -> Option<i64>) -> Option<String> {
        let bp = self.breakpoints.get(&id)?;
        let template = bp.log_message.as_ref()?;
        let mut out = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                let mut inner = String::new();
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        break;
                    }
                    inner.push(c2);
                }
                match expr::evaluate_expression(&inner, resolve) {
                    Ok(v) => out.push_str(&v.to_string()),
                    Err(_) => out.push_str(&format!("<error: {inner}>")),
                }
            } else {
                out.push(c);
            }
        }
        Some(out)
    }
}
