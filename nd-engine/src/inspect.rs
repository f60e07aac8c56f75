//! The variable inspector (`spec.md` §4.13, component C13): joins a
//! function's scoped DWARF variables, their location expressions, and
//! live (or unwound) register/memory state into typed, formatted values.
//!
//! Grounded on `symbolic-debuginfo/src/function_builder.rs`'s function/
//! variable join and `symbolic-unwind`'s register-adapter idiom, already
//! generalized once in [`crate::frame`]; this module is the second
//! consumer of that same adapter.

use nd_dwarf::{
    die::find_functions, evaluate_location, loclist, Die, EvalContext, FunctionInfo, Location, Piece, PieceLocation,
    TypeDescription, TypeField, VariableInfo,
};

use crate::error::{EngineError, EngineErrorKind, Result};
use crate::expr;

/// A DAP-style named scope (`spec.md` §6 `scopes`): this engine exposes
/// exactly one per frame (there is no nested-block scoping in the DWARF
/// model `nd-dwarf::die` builds), named "Locals".
#[derive(Clone, Debug)]
pub struct Scope {
    pub name: String,
    pub variables_reference: u32,
    pub expensive: bool,
}

/// The rendered result of inspecting one variable or expression
/// (`spec.md` §6 `inspect`).
#[derive(Clone, Debug)]
pub struct InspectResult {
    pub result: String,
    pub type_name: String,
    pub children: Option<Vec<(String, InspectResult)>>,
}

/// Finds the function whose `[low_pc, high_pc)` (or first matching
/// range) contains `pc`, the scope the inspector reads variables from.
pub fn enclosing_function<'f>(functions: &'f [FunctionInfo], pc: u64) -> Option<&'f FunctionInfo> {
    crate::frame::function_containing(functions, pc)
}

/// All locals and parameters visible at `pc`, parameters first to match
/// how most debuggers order a "Locals" scope.
pub fn visible_variables<'f>(function: &'f FunctionInfo) -> Vec<&'f VariableInfo> {
    function.parameters.iter().chain(function.variables.iter()).collect()
}

/// Resolves a variable's `Location` to its evaluated pieces. `loc_section`
/// is the raw `.debug_loc`/`.debug_loclists` bytes for `Location`
/// variants that index into one instead of carrying the expression
/// inline; `pc` selects the active range when several overlap.
pub(crate) fn pieces_for_location(
    location: &Location,
    loc_section: &[u8],
    pc: u64,
    ctx: &dyn EvalContext,
    cu_low_pc: u64,
) -> Result<Vec<Piece>> {
    match location {
        Location::Expression(bytes) => {
            Ok(evaluate_location(bytes, ctx, nd_dwarf::Format::Dwarf32).map_err(EngineError::from)?)
        }
        Location::ListOffset(offset) => {
            let entries = loclist::evaluate_dwarf4(loc_section, *offset as usize, ctx.address_size(), cu_low_pc)
                .map_err(EngineError::from)?;
            let expr = loclist::select_for_pc(&entries, pc)
                .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
            Ok(evaluate_location(expr, ctx, nd_dwarf::Format::Dwarf32).map_err(EngineError::from)?)
        }
        Location::ListIndex(index) => {
            let entries = loclist::evaluate_dwarf5(loc_section, *index as usize, ctx.address_size(), |i| {
                ctx.resolve_addrx(i).ok_or(nd_dwarf::DwarfError::from(nd_dwarf::DwarfErrorKind::InvalidReference))
            })
            .map_err(EngineError::from)?;
            let expr = loclist::select_for_pc(&entries, pc)
                .ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;
            Ok(evaluate_location(expr, ctx, nd_dwarf::Format::Dwarf32).map_err(EngineError::from)?)
        }
    }
}

/// Reads the raw bytes a (possibly register-resident) variable location
/// refers to, the size of the type it holds.
/// Finds a variable by name among a function's parameters/locals, the
/// lookup `inspect_variable` and `crate::engine::Engine::set_variable`
/// both need before they diverge into read/write.
pub(crate) fn find_variable<'f>(function: &'f FunctionInfo, name: &str) -> Option<&'f VariableInfo> {
    visible_variables(function).into_iter().find(|v| v.name.as_deref() == Some(name))
}

pub(crate) fn read_bytes(pieces: &[Piece], size: u64, ctx: &dyn EvalContext) -> Result<Vec<u8>> {
    let piece = pieces
        .first()
        .ok_or_else(|| EngineError::from_kind(EngineErrorKind::Policy))?;
    match &piece.location {
        PieceLocation::Address(addr) => {
            let mut buf = vec![0u8; size as usize];
            ctx.read_memory(*addr, &mut buf).map_err(EngineError::from)?;
            Ok(buf)
        }
        PieceLocation::Register(reg) => {
            let value = ctx
                .register(*reg)
                .ok_or_else(|| EngineError::from_kind(EngineErrorKind::Policy))?;
            Ok(value.to_le_bytes()[..(size as usize).min(8)].to_vec())
        }
        PieceLocation::Literal(bytes) => Ok(bytes.clone()),
        PieceLocation::OptimizedOut => Err(EngineError::from_kind(EngineErrorKind::Policy)),
    }
}

/// Whether this variable's single location piece is register-resident
/// (such variables reject `setVariable`, per `spec.md` §4.13).
pub fn is_register_resident(pieces: &[Piece]) -> bool {
    matches!(pieces.first().map(|p| &p.location), Some(PieceLocation::Register(_)))
}

pub(crate) fn byte_size_of(type_desc: &TypeDescription) -> u64 {
    match type_desc {
        TypeDescription::Base { byte_size, .. } => *byte_size,
        TypeDescription::Pointer { .. } => 8,
        TypeDescription::Structure { fields } => fields.iter().filter_map(|f| f.offset).max().unwrap_or(0) + 8,
        TypeDescription::Array { element_type, count } => byte_size_of(element_type) * count.unwrap_or(1),
        TypeDescription::Enumeration { .. } => 4,
        TypeDescription::Typedef { inner, .. } => byte_size_of(inner),
        TypeDescription::ConstQualified { inner } => byte_size_of(inner),
        TypeDescription::TaggedUnion { variants, .. } => variants
            .iter()
            .flat_map(|v| v.fields.iter())
            .filter_map(|f| f.offset)
            .max()
            .unwrap_or(0)
            + 8,
        TypeDescription::Unknown { .. } => 0,
    }
}

/// Renders raw bytes as a human-readable value according to the type
/// description's DWARF-encoding rules (`spec.md` §4.13):
///
/// - `Base` with `DW_ATE_signed`/`signed_char` prints a signed decimal;
///   `unsigned`/`unsigned_char`/`boolean`/`address` prints unsigned;
///   `float` prints as `f32`/`f64` by byte size.
/// - `Pointer` prints the raw address in hex, annotated with the
///   pointee's type name.
/// - `Enumeration` maps the raw discriminant back to its symbolic name,
///   falling back to the bare integer when no match exists.
/// - `Structure`/`TaggedUnion` print a `{ field: value, ... }` summary of
///   their immediate fields; nested aggregates are not recursively
///   expanded in the summary string (clients expand them via `children`).
pub fn format_value(type_desc: &TypeDescription, bytes: &[u8]) -> String {
    match type_desc {
        TypeDescription::Base { encoding, byte_size } => format_base(*encoding, *byte_size, bytes),
        TypeDescription::Pointer { pointee_name } => {
            let addr = le_u64(bytes);
            format!("0x{addr:x} ({pointee_name})")
        }
        TypeDescription::Structure { fields } => format_aggregate(fields, bytes),
        TypeDescription::Array { element_type, count } => {
            let elem_size = byte_size_of(element_type).max(1);
            let n = count.unwrap_or(bytes.len() as u64 / elem_size);
            let items: Vec<String> = (0..n)
                .map(|i| {
                    let start = (i * elem_size) as usize;
                    let end = (start + elem_size as usize).min(bytes.len());
                    format_value(element_type, bytes.get(start..end).unwrap_or(&[]))
                })
                .collect();
            format!("[{}]", items.join(", "))
        }
        TypeDescription::Enumeration { values } => {
            let raw = le_i64(bytes);
            match values.iter().find(|(v, _)| *v == raw) {
                Some((_, name)) => name.clone(),
                None => raw.to_string(),
            }
        }
        TypeDescription::Typedef { inner, .. } => format_value(inner, bytes),
        TypeDescription::ConstQualified { inner } => format_value(inner, bytes),
        TypeDescription::TaggedUnion { variants, .. } => {
            let discr = le_i64(bytes);
            match variants.iter().find(|v| v.discr_value == Some(discr)) {
                Some(variant) => format_aggregate(&variant.fields, bytes),
                None => format!("<unknown variant {discr}>"),
            }
        }
        TypeDescription::Unknown { name } => format!("<{name}>"),
    }
}

fn format_aggregate(fields: &[TypeField], bytes: &[u8]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|field| {
            let offset = field.offset.unwrap_or(0) as usize;
            let size = byte_size_of(&field.type_desc).max(1) as usize;
            let slice = bytes.get(offset..offset + size).unwrap_or(&[]);
            let value = format_value(&field.type_desc, slice);
            match &field.name {
                Some(name) => format!("{name}: {value}"),
                None => value,
            }
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

fn format_base(encoding: u8, byte_size: u64, bytes: &[u8]) -> String {
    use nd_dwarf::constants::*;
    match encoding {
        DW_ATE_float => match byte_size {
            4 => f32::from_le_bytes(bytes.get(..4).unwrap_or(&[0; 4]).try_into().unwrap()).to_string(),
            _ => f64::from_le_bytes(bytes.get(..8).unwrap_or(&[0; 8]).try_into().unwrap()).to_string(),
        },
        DW_ATE_boolean => (bytes.first().copied().unwrap_or(0) != 0).to_string(),
        DW_ATE_signed | DW_ATE_signed_char => le_i64(bytes).to_string(),
        DW_ATE_unsigned | DW_ATE_unsigned_char | DW_ATE_address => le_u64(bytes).to_string(),
        _ => le_u64(bytes).to_string(),
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

fn le_i64(bytes: &[u8]) -> i64 {
    let n = bytes.len().min(8);
    let mut buf = if bytes.last().is_some_and(|b| b & 0x80 != 0) { [0xFFu8; 8] } else { [0u8; 8] };
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

/// Looks up a variable by name among a function's parameters/locals,
/// reads its bytes through the location-expression VM, and renders it —
/// the core of `spec.md` §6 `inspect` when given a bare identifier.
pub fn inspect_variable(
    function: &FunctionInfo,
    index: &std::collections::HashMap<u64, &Die>,
    name: &str,
    loc_section: &[u8],
    pc: u64,
    ctx: &dyn EvalContext,
    cu_low_pc: u64,
) -> Result<InspectResult> {
    let variable = find_variable(function, name).ok_or_else(|| EngineError::from_kind(EngineErrorKind::NotFound))?;

    let location = variable
        .location
        .as_ref()
        .ok_or_else(|| EngineError::from_kind(EngineErrorKind::Policy))?;
    let pieces = pieces_for_location(location, loc_section, pc, ctx, cu_low_pc)?;

    let type_desc = match variable.type_ref {
        Some(offset) => nd_dwarf::resolve_type_description(index, offset, 0),
        None => TypeDescription::Unknown { name: "void".to_string() },
    };
    let size = byte_size_of(&type_desc).max(1);
    let bytes = read_bytes(&pieces, size, ctx)?;

    Ok(InspectResult {
        result: format_value(&type_desc, &bytes),
        type_name: nd_dwarf::resolve_type_name(index, variable.type_ref.unwrap_or(0)),
        children: None,
    })
}

/// Evaluates a plain arithmetic expression over the variables visible at
/// a frame, rather than looking up a single named variable
/// (`spec.md` §4.13's "binary expression" case for `inspect`).
pub fn inspect_expression(expression: &str, resolve_int: &dyn Fn(&str) -> Option<i64>) -> Result<InspectResult> {
    let value = expr::evaluate_expression(expression, resolve_int)
        .map_err(|_| EngineError::from_kind(EngineErrorKind::Parse))?;
    Ok(InspectResult {
        result: value.to_string(),
        type_name: "int".to_string(),
        children: None,
    })
}

/// Collects every top-level function in a compilation unit's DIE tree,
/// the table the engine builds once per loaded image and reuses across
/// every `stackTrace`/`inspect` request.
pub fn functions_in_unit(root: &Die) -> Vec<FunctionInfo> {
    find_functions(root)
}
