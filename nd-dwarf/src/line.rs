//! `.debug_line` line number program interpreter (`spec.md` §4.4,
//! component C4).
//!
//! The header parsing follows the teacher's `symbolic-debuginfo/src/dwarf.rs`
//! version-dispatch between the DWARF ≤4 and DWARF5 directory/file table
//! shapes; the opcode state machine follows `zanesterling-mecha-dwarf`'s
//! `dwarf.rs` register-machine loop generalized to cover the DWARF5 `DW_LNCT_*`
//! entry formats the from-scratch parser didn't need.

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::{Format, Reader};

/// One source file named by a line program, resolved to a directory index
/// into [`LineProgram::directories`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// The file's name as recorded (no directory prefix).
    pub name: String,
    /// Index into `directories`. DWARF ≤4 numbers files from 1 with
    /// directory 0 meaning "the compilation directory"; DWARF5 numbers from
    /// 0 and the directory table's entry 0 is the compilation directory
    /// (`SPEC_FULL.md` §10 "file-index 0-based normalization").
    pub dir_index: u64,
}

/// One decoded row of the line number matrix: an address and the source
/// position the line program asserts for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineRow {
    /// Program-counter address (link-time, before ASLR slide).
    pub address: u64,
    /// Index into [`LineProgram::files`], already normalized to be 0-based
    /// regardless of source DWARF version.
    pub file: u64,
    /// 1-based source line, or 0 if the compiler did not attribute one.
    pub line: u64,
    /// 1-based source column, or 0 if unknown.
    pub column: u64,
    /// Whether this address is a recommended breakpoint location.
    pub is_stmt: bool,
    /// Whether this row's address is the first instruction after a
    /// function's register-save/stack-alloc prologue (`spec.md` §4.4
    /// "Preserve `prologue_end`"), used by the stepper and the breakpoint
    /// manager's function-breakpoint resolution to land past argument
    /// setup rather than on the opening brace.
    pub prologue_end: bool,
    /// Whether this row's address is immediately after the last instruction
    /// of a sequence (not itself a valid PC).
    pub end_sequence: bool,
}

/// A fully decoded `.debug_line` program: its directory/file tables and the
/// line number matrix produced by running its opcodes.
#[derive(Clone, Debug)]
pub struct LineProgram {
    /// Source directories, normalized 0-based (entry 0 is comp_dir).
    pub directories: Vec<String>,
    /// Source files, normalized 0-based.
    pub files: Vec<FileEntry>,
    /// The decoded matrix, in program order (including `end_sequence` rows).
    pub rows: Vec<LineRow>,
}

struct Header {
    format: Format,
    version: u16,
    address_size: u8,
    minimum_instruction_length: u8,
    maximum_operations_per_instruction: u8,
    default_is_stmt: bool,
    line_base: i8,
    line_range: u8,
    opcode_base: u8,
    standard_opcode_lengths: Vec<u8>,
    directories: Vec<String>,
    files: Vec<FileEntry>,
    program_start: usize,
    unit_end: usize,
}

fn read_dwarf5_entries(
    r: &mut Reader<'_>,
    format: Format,
    address_size: u8,
    want_dir_index: bool,
) -> Result<Vec<(String, u64)>> {
    let format_count = r.read_u8()?;
    let mut entry_formats = Vec::with_capacity(format_count as usize);
    for _ in 0..format_count {
        let content_type = r.read_uleb128()?;
        let form = r.read_uleb128()?;
        entry_formats.push((content_type, form));
    }

    let count = r.read_uleb128()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut name = String::new();
        let mut dir_index = 0u64;
        for &(content_type, form) in &entry_formats {
            match content_type {
                DW_LNCT_path => {
                    name = read_form_string(r, form, format)?;
                }
                DW_LNCT_directory_index if want_dir_index => {
                    dir_index = read_form_udata(r, form)?;
                }
                _ => r.skip_form(form, address_size, format)?,
            }
        }
        out.push((name, dir_index));
    }
    Ok(out)
}

fn read_form_string(r: &mut Reader<'_>, form: u64, format: Format) -> Result<String> {
    let bytes: Vec<u8> = match form {
        DW_FORM_string => r.read_cstr()?.to_vec(),
        DW_FORM_strp | DW_FORM_line_strp => {
            // The resolved string lives in `.debug_str`/`.debug_line_str`,
            // which the caller does not hand us here; record the offset as
            // a placeholder name and let `accel`/`die` re-resolve through
            // the shared string-table reader when they need the text.
            let offset = r.read_offset(format)?;
            return Ok(format!("@str+0x{offset:x}"));
        }
        DW_FORM_strx | DW_FORM_strx1 | DW_FORM_strx2 | DW_FORM_strx3 | DW_FORM_strx4 => {
            let index = read_form_udata(r, form)?;
            return Ok(format!("@strx+{index}"));
        }
        _ => {
            r.skip_form(form, 8, format)?;
            Vec::new()
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_form_udata(r: &mut Reader<'_>, form: u64) -> Result<u64> {
    match form {
        DW_FORM_udata => r.read_uleb128(),
        DW_FORM_data1 | DW_FORM_strx1 | DW_FORM_addrx1 => Ok(r.read_u8()? as u64),
        DW_FORM_data2 | DW_FORM_strx2 | DW_FORM_addrx2 => Ok(r.read_u16()? as u64),
        DW_FORM_data4 | DW_FORM_strx4 | DW_FORM_addrx4 => Ok(r.read_u32()? as u64),
        DW_FORM_data8 => r.read_u64(),
        other => Err(DwarfErrorKind::UnknownForm(other).into()),
    }
}

impl Header {
    fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let mut r = Reader::new(data);
        r.seek(offset)?;

        let (format, unit_length) = r.read_initial_length()?;
        let unit_end = r.position() + unit_length as usize;
        let version = r.read_u16()?;

        let address_size = if version >= 5 {
            let addr = r.read_u8()?;
            let _segment_selector_size = r.read_u8()?;
            addr
        } else {
            8
        };

        let header_length = r.read_offset(format)?;
        let program_start = r.position() + header_length as usize;

        let minimum_instruction_length = r.read_u8()?;
        let maximum_operations_per_instruction = if version >= 4 { r.read_u8()? } else { 1 };
        let default_is_stmt = r.read_u8()? != 0;
        let line_base = r.read_i8()?;
        let line_range = r.read_u8()?;
        let opcode_base = r.read_u8()?;
        let mut standard_opcode_lengths = Vec::with_capacity(opcode_base.saturating_sub(1) as usize);
        for _ in 0..opcode_base.saturating_sub(1) {
            standard_opcode_lengths.push(r.read_u8()?);
        }

        let (directories, files) = if version >= 5 {
            let dirs = read_dwarf5_entries(&mut r, format, address_size, false)?
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>();
            let files = read_dwarf5_entries(&mut r, format, address_size, true)?
                .into_iter()
                .map(|(name, dir_index)| FileEntry { name, dir_index })
                .collect();
            (dirs, files)
        } else {
            let mut dirs = vec![String::new()]; // index 0: comp_dir, filled by caller
            loop {
                let entry = r.read_cstr()?;
                if entry.is_empty() {
                    break;
                }
                dirs.push(String::from_utf8_lossy(entry).into_owned());
            }

            let mut files = vec![FileEntry {
                name: String::new(),
                dir_index: 0,
            }]; // index 0 unused pre-v5; kept so indices stay 1-based on read
            loop {
                let name = r.read_cstr()?;
                if name.is_empty() {
                    break;
                }
                let dir_index = r.read_uleb128()?;
                let _mtime = r.read_uleb128()?;
                let _length = r.read_uleb128()?;
                files.push(FileEntry {
                    name: String::from_utf8_lossy(name).into_owned(),
                    dir_index,
                });
            }
            (dirs, files)
        };

        Ok(Header {
            format,
            version,
            address_size,
            minimum_instruction_length,
            maximum_operations_per_instruction: maximum_operations_per_instruction.max(1),
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            standard_opcode_lengths,
            directories,
            files,
            program_start,
            unit_end,
        })
    }

    /// Normalizes a raw on-disk file register to a 0-based index into
    /// `self.files`, per `SPEC_FULL.md` §10.
    fn normalize_file(&self, raw: u64) -> u64 {
        if self.version >= 5 {
            raw
        } else {
            raw.saturating_sub(1)
        }
    }
}

struct Registers {
    address: u64,
    op_index: u64,
    file: u64,
    line: u64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_sequence: bool,
    prologue_end: bool,
    epilogue_begin: bool,
}

impl Registers {
    fn initial(header: &Header) -> Self {
        Registers {
            address: 0,
            op_index: 0,
            file: if header.version >= 5 { 0 } else { 1 },
            line: 1,
            column: 0,
            is_stmt: header.default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prologue_end: false,
            epilogue_begin: false,
        }
    }

    fn row(&self, header: &Header) -> LineRow {
        LineRow {
            address: self.address,
            file: header.normalize_file(self.file),
            line: self.line,
            column: self.column,
            is_stmt: self.is_stmt,
            prologue_end: self.prologue_end,
            end_sequence: self.end_sequence,
        }
    }

    fn advance(&mut self, header: &Header, operation_advance: u64) {
        let max_ops = header.maximum_operations_per_instruction as u64;
        if max_ops <= 1 {
            self.address = self
                .address
                .wrapping_add(operation_advance * header.minimum_instruction_length as u64);
        } else {
            let new_op_index = self.op_index + operation_advance;
            self.address = self.address.wrapping_add(
                header.minimum_instruction_length as u64 * (new_op_index / max_ops),
            );
            self.op_index = new_op_index % max_ops;
        }
    }
}

impl LineProgram {
    /// Parses and runs the line number program whose header starts at
    /// `offset` within `.debug_line`'s bytes, returning its full matrix.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let header = Header::parse(data, offset)?;
        let mut r = Reader::new(data);
        r.seek(header.program_start)?;
        let mut regs = Registers::initial(&header);
        let mut rows = Vec::new();

        while r.position() < header.unit_end {
            let opcode = r.read_u8()?;
            if opcode == 0 {
                // Extended opcode.
                let len = r.read_uleb128()? as usize;
                let end = r.position() + len;
                let sub = r.read_u8()?;
                match sub {
                    DW_LNE_end_sequence => {
                        regs.end_sequence = true;
                        rows.push(regs.row(&header));
                        regs = Registers::initial(&header);
                    }
                    DW_LNE_set_address => {
                        regs.address = r.read_address(header.address_size)?;
                        regs.op_index = 0;
                    }
                    DW_LNE_set_discriminator => {
                        r.read_uleb128()?;
                    }
                    _ => {
                        // DW_LNE_define_file or a vendor extension; skip to
                        // the declared length rather than guessing its shape.
                        r.seek(end)?;
                    }
                }
                r.seek(end)?;
            } else if opcode < header.opcode_base {
                match opcode {
                    DW_LNS_copy => {
                        rows.push(regs.row(&header));
                        regs.basic_block = false;
                        regs.prologue_end = false;
                        regs.epilogue_begin = false;
                    }
                    DW_LNS_advance_pc => {
                        let advance = r.read_uleb128()?;
                        regs.advance(&header, advance);
                    }
                    DW_LNS_advance_line => {
                        let delta = r.read_sleb128()?;
                        regs.line = (regs.line as i64 + delta).max(0) as u64;
                    }
                    DW_LNS_set_file => {
                        regs.file = r.read_uleb128()?;
                    }
                    DW_LNS_set_column => {
                        regs.column = r.read_uleb128()?;
                    }
                    DW_LNS_negate_stmt => {
                        regs.is_stmt = !regs.is_stmt;
                    }
                    DW_LNS_set_basic_block => {
                        regs.basic_block = true;
                    }
                    DW_LNS_const_add_pc => {
                        let adjusted = 255 - header.opcode_base;
                        let operation_advance = adjusted / header.line_range;
                        regs.advance(&header, operation_advance as u64);
                    }
                    DW_LNS_fixed_advance_pc => {
                        let advance = r.read_u16()? as u64;
                        regs.address = regs.address.wrapping_add(advance);
                        regs.op_index = 0;
                    }
                    DW_LNS_set_prologue_end => {
                        regs.prologue_end = true;
                    }
                    DW_LNS_set_epilogue_begin => {
                        regs.epilogue_begin = true;
                    }
                    DW_LNS_set_isa => {
                        r.read_uleb128()?;
                    }
                    _ => {
                        // A standard opcode above the ones this reader knows
                        // by name; skip its declared operand count.
                        let n = header.standard_opcode_lengths[(opcode - 1) as usize];
                        for _ in 0..n {
                            r.read_uleb128()?;
                        }
                    }
                }
            } else {
                // Special opcode.
                let adjusted = (opcode - header.opcode_base) as i32;
                let operation_advance = adjusted / header.line_range as i32;
                let line_delta = header.line_base as i32 + (adjusted % header.line_range as i32);
                regs.advance(&header, operation_advance as u64);
                regs.line = (regs.line as i64 + line_delta as i64).max(0) as u64;
                rows.push(regs.row(&header));
                regs.basic_block = false;
                regs.prologue_end = false;
                regs.epilogue_begin = false;
            }
        }

        Ok(LineProgram {
            directories: header.directories,
            files: header.files,
            rows,
        })
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

    fn build_v4_program() -> Vec<u8> {
        // Program body: DW_LNE_set_address(0x1000), one DW_LNS_copy row,
        // DW_LNS_advance_line(+4), DW_LNS_advance_pc(4), copy, end_sequence.
        let mut body = Vec::new();
        body.push(0x00);
        encode_uleb(9, &mut body); // len of extended op: 1 (sub-opcode) + 8 (addr)
        body.push(DW_LNE_set_address);
        body.extend_from_slice(&0x1000u64.to_le_bytes());

        body.push(DW_LNS_copy);

        body.push(DW_LNS_advance_line);
        body.push(0x08); // sleb +4 -> encode as 0x08 (4 << 1, no sign bit)

        body.push(DW_LNS_advance_pc);
        encode_uleb(4, &mut body);

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
        header_tail.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]); // 12 standard lengths
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
        unit.extend_from_slice(&2u16.to_le_bytes()); // version
        unit.extend_from_slice(&header_length.to_le_bytes());
        unit.extend_from_slice(&header_tail);
        unit.extend_from_slice(&body);

        let mut out = Vec::new();
        out.extend_from_slice(&(unit.len() as u32).to_le_bytes());
        out.extend_from_slice(&unit);
        out
    }

    #[test]
    fn runs_v4_program_and_produces_expected_rows() {
        let data = build_v4_program();
        let program = LineProgram::parse(&data, 0).unwrap();
        assert_eq!(program.rows.len(), 3);
        assert_eq!(program.rows[0].address, 0x1000);
        assert_eq!(program.rows[0].line, 1);
        assert_eq!(program.rows[1].address, 0x1004);
        assert_eq!(program.rows[1].line, 5);
        assert!(program.rows[2].end_sequence);
        assert_eq!(program.files.len(), 2); // index 0 placeholder + "a.c"
        assert_eq!(program.files[1].name, "a.c");
    }
}
