//! Raw DWARF constant values (tags, attributes, forms, opcodes).
//!
//! These are plain integers rather than the newtype-wrapped constants
//! `gimli::constants` exposes, since this crate implements its own decoder
//! rather than building on `gimli` (see `DESIGN.md`).
#![allow(missing_docs, non_upper_case_globals)]

// --- Tags (DW_TAG_*) ---
pub const DW_TAG_array_type: u64 = 0x01;
pub const DW_TAG_class_type: u64 = 0x02;
pub const DW_TAG_enumeration_type: u64 = 0x04;
pub const DW_TAG_formal_parameter: u64 = 0x05;
pub const DW_TAG_lexical_block: u64 = 0x0b;
pub const DW_TAG_member: u64 = 0x0d;
pub const DW_TAG_pointer_type: u64 = 0x0f;
pub const DW_TAG_reference_type: u64 = 0x10;
pub const DW_TAG_compile_unit: u64 = 0x11;
pub const DW_TAG_structure_type: u64 = 0x13;
pub const DW_TAG_subroutine_type: u64 = 0x15;
pub const DW_TAG_typedef: u64 = 0x16;
pub const DW_TAG_union_type: u64 = 0x17;
pub const DW_TAG_inheritance: u64 = 0x1c;
pub const DW_TAG_inlined_subroutine: u64 = 0x1d;
pub const DW_TAG_ptr_to_member_type: u64 = 0x1f;
pub const DW_TAG_subrange_type: u64 = 0x21;
pub const DW_TAG_base_type: u64 = 0x24;
pub const DW_TAG_const_type: u64 = 0x26;
pub const DW_TAG_enumerator: u64 = 0x28;
pub const DW_TAG_subprogram: u64 = 0x2e;
pub const DW_TAG_variant: u64 = 0x19;
pub const DW_TAG_variable: u64 = 0x34;
pub const DW_TAG_volatile_type: u64 = 0x35;
pub const DW_TAG_restrict_type: u64 = 0x37;
pub const DW_TAG_interface_type: u64 = 0x38;
pub const DW_TAG_unspecified_type: u64 = 0x3b;
pub const DW_TAG_variant_part: u64 = 0x33;
pub const DW_TAG_rvalue_reference_type: u64 = 0x42;
pub const DW_TAG_atomic_type: u64 = 0x47;
pub const DW_TAG_skeleton_unit: u64 = 0x4a;

// --- Attributes (DW_AT_*) ---
pub const DW_AT_sibling: u64 = 0x01;
pub const DW_AT_location: u64 = 0x02;
pub const DW_AT_name: u64 = 0x03;
pub const DW_AT_byte_size: u64 = 0x0b;
pub const DW_AT_stmt_list: u64 = 0x10;
pub const DW_AT_low_pc: u64 = 0x11;
pub const DW_AT_high_pc: u64 = 0x12;
pub const DW_AT_language: u64 = 0x13;
pub const DW_AT_discr: u64 = 0x15;
pub const DW_AT_discr_value: u64 = 0x16;
pub const DW_AT_comp_dir: u64 = 0x1b;
pub const DW_AT_const_value: u64 = 0x1c;
pub const DW_AT_lower_bound: u64 = 0x22;
pub const DW_AT_producer: u64 = 0x25;
pub const DW_AT_upper_bound: u64 = 0x2f;
pub const DW_AT_abstract_origin: u64 = 0x31;
pub const DW_AT_count: u64 = 0x37;
pub const DW_AT_data_member_location: u64 = 0x38;
pub const DW_AT_decl_file: u64 = 0x3a;
pub const DW_AT_decl_line: u64 = 0x3b;
pub const DW_AT_declaration: u64 = 0x3c;
pub const DW_AT_encoding: u64 = 0x3e;
pub const DW_AT_external: u64 = 0x3f;
pub const DW_AT_frame_base: u64 = 0x40;
pub const DW_AT_specification: u64 = 0x47;
pub const DW_AT_type: u64 = 0x49;
pub const DW_AT_ranges: u64 = 0x55;
pub const DW_AT_call_column: u64 = 0x57;
pub const DW_AT_call_file: u64 = 0x58;
pub const DW_AT_call_line: u64 = 0x59;
pub const DW_AT_linkage_name: u64 = 0x6e;
pub const DW_AT_str_offsets_base: u64 = 0x72;
pub const DW_AT_addr_base: u64 = 0x73;
pub const DW_AT_rnglists_base: u64 = 0x74;
pub const DW_AT_dwo_name: u64 = 0x76;
pub const DW_AT_loclists_base: u64 = 0x8c;
/// GNU split-dwarf extension, used by DWARF4 producers ahead of the
/// DWARF5 standard skeleton-unit header field.
pub const DW_AT_GNU_dwo_name: u64 = 0x2130;
pub const DW_AT_GNU_dwo_id: u64 = 0x2131;
pub const DW_AT_GNU_ranges_base: u64 = 0x2132;
pub const DW_AT_GNU_addr_base: u64 = 0x2133;

// --- Forms (DW_FORM_*) ---
pub const DW_FORM_addr: u64 = 0x01;
pub const DW_FORM_block2: u64 = 0x03;
pub const DW_FORM_block4: u64 = 0x04;
pub const DW_FORM_data2: u64 = 0x05;
pub const DW_FORM_data4: u64 = 0x06;
pub const DW_FORM_data8: u64 = 0x07;
pub const DW_FORM_string: u64 = 0x08;
pub const DW_FORM_block: u64 = 0x09;
pub const DW_FORM_block1: u64 = 0x0a;
pub const DW_FORM_data1: u64 = 0x0b;
pub const DW_FORM_flag: u64 = 0x0c;
pub const DW_FORM_sdata: u64 = 0x0d;
pub const DW_FORM_strp: u64 = 0x0e;
pub const DW_FORM_udata: u64 = 0x0f;
pub const DW_FORM_ref_addr: u64 = 0x10;
pub const DW_FORM_ref1: u64 = 0x11;
pub const DW_FORM_ref2: u64 = 0x12;
pub const DW_FORM_ref4: u64 = 0x13;
pub const DW_FORM_ref8: u64 = 0x14;
pub const DW_FORM_ref_udata: u64 = 0x15;
pub const DW_FORM_indirect: u64 = 0x16;
pub const DW_FORM_sec_offset: u64 = 0x17;
pub const DW_FORM_exprloc: u64 = 0x18;
pub const DW_FORM_flag_present: u64 = 0x19;
pub const DW_FORM_strx: u64 = 0x1a;
pub const DW_FORM_addrx: u64 = 0x1b;
pub const DW_FORM_ref_sup4: u64 = 0x1c;
pub const DW_FORM_strp_sup: u64 = 0x1d;
pub const DW_FORM_data16: u64 = 0x1e;
pub const DW_FORM_line_strp: u64 = 0x1f;
pub const DW_FORM_ref_sig8: u64 = 0x20;
pub const DW_FORM_implicit_const: u64 = 0x21;
pub const DW_FORM_loclistx: u64 = 0x22;
pub const DW_FORM_rnglistx: u64 = 0x23;
pub const DW_FORM_ref_sup8: u64 = 0x24;
pub const DW_FORM_strx1: u64 = 0x25;
pub const DW_FORM_strx2: u64 = 0x26;
pub const DW_FORM_strx3: u64 = 0x27;
pub const DW_FORM_strx4: u64 = 0x28;
pub const DW_FORM_addrx1: u64 = 0x29;
pub const DW_FORM_addrx2: u64 = 0x2a;
pub const DW_FORM_addrx3: u64 = 0x2b;
pub const DW_FORM_addrx4: u64 = 0x2c;

// --- Base type encodings (DW_ATE_*) ---
pub const DW_ATE_address: u8 = 0x01;
pub const DW_ATE_boolean: u8 = 0x02;
pub const DW_ATE_float: u8 = 0x04;
pub const DW_ATE_signed: u8 = 0x05;
pub const DW_ATE_signed_char: u8 = 0x06;
pub const DW_ATE_unsigned: u8 = 0x07;
pub const DW_ATE_unsigned_char: u8 = 0x08;

// --- Unit header types (DW_UT_*, DWARF5) ---
pub const DW_UT_compile: u8 = 0x01;
pub const DW_UT_type: u8 = 0x02;
pub const DW_UT_partial: u8 = 0x03;
pub const DW_UT_skeleton: u8 = 0x04;
pub const DW_UT_split_compile: u8 = 0x05;
pub const DW_UT_split_type: u8 = 0x06;

// --- Line number program opcodes ---
pub const DW_LNS_copy: u8 = 0x01;
pub const DW_LNS_advance_pc: u8 = 0x02;
pub const DW_LNS_advance_line: u8 = 0x03;
pub const DW_LNS_set_file: u8 = 0x04;
pub const DW_LNS_set_column: u8 = 0x05;
pub const DW_LNS_negate_stmt: u8 = 0x06;
pub const DW_LNS_set_basic_block: u8 = 0x07;
pub const DW_LNS_const_add_pc: u8 = 0x08;
pub const DW_LNS_fixed_advance_pc: u8 = 0x09;
pub const DW_LNS_set_prologue_end: u8 = 0x0a;
pub const DW_LNS_set_epilogue_begin: u8 = 0x0b;
pub const DW_LNS_set_isa: u8 = 0x0c;

pub const DW_LNE_end_sequence: u8 = 0x01;
pub const DW_LNE_set_address: u8 = 0x02;
pub const DW_LNE_define_file: u8 = 0x03;
pub const DW_LNE_set_discriminator: u8 = 0x04;

/// DWARF5 directory/file entry format content type codes.
pub const DW_LNCT_path: u64 = 0x1;
pub const DW_LNCT_directory_index: u64 = 0x2;
pub const DW_LNCT_timestamp: u64 = 0x3;
pub const DW_LNCT_size: u64 = 0x4;
pub const DW_LNCT_md5: u64 = 0x5;

// --- Range list entry encodings (DW_RLE_*, DWARF5 .debug_rnglists) ---
pub const DW_RLE_end_of_list: u8 = 0x00;
pub const DW_RLE_base_addressx: u8 = 0x01;
pub const DW_RLE_startx_endx: u8 = 0x02;
pub const DW_RLE_startx_length: u8 = 0x03;
pub const DW_RLE_offset_pair: u8 = 0x04;
pub const DW_RLE_base_address: u8 = 0x05;
pub const DW_RLE_start_end: u8 = 0x06;
pub const DW_RLE_start_length: u8 = 0x07;

// --- Location list entry encodings (DW_LLE_*, DWARF5 .debug_loclists) ---
pub const DW_LLE_end_of_list: u8 = 0x00;
pub const DW_LLE_base_addressx: u8 = 0x01;
pub const DW_LLE_startx_endx: u8 = 0x02;
pub const DW_LLE_startx_length: u8 = 0x03;
pub const DW_LLE_offset_pair: u8 = 0x04;
pub const DW_LLE_default_location: u8 = 0x05;
pub const DW_LLE_base_address: u8 = 0x06;
pub const DW_LLE_start_end: u8 = 0x07;
pub const DW_LLE_start_length: u8 = 0x08;

// --- `.debug_names` entry attributes (DW_IDX_*) ---
pub const DW_IDX_compile_unit: u8 = 0x01;
pub const DW_IDX_type_unit: u8 = 0x02;
pub const DW_IDX_die_offset: u8 = 0x03;
pub const DW_IDX_parent: u8 = 0x04;
pub const DW_IDX_type_hash: u8 = 0x05;

// --- Location expression opcodes (DW_OP_*) ---
pub const DW_OP_addr: u8 = 0x03;
pub const DW_OP_deref: u8 = 0x06;
pub const DW_OP_const1u: u8 = 0x08;
pub const DW_OP_const1s: u8 = 0x09;
pub const DW_OP_const2u: u8 = 0x0a;
pub const DW_OP_const2s: u8 = 0x0b;
pub const DW_OP_const4u: u8 = 0x0c;
pub const DW_OP_const4s: u8 = 0x0d;
pub const DW_OP_const8u: u8 = 0x0e;
pub const DW_OP_const8s: u8 = 0x0f;
pub const DW_OP_constu: u8 = 0x10;
pub const DW_OP_consts: u8 = 0x11;
pub const DW_OP_dup: u8 = 0x12;
pub const DW_OP_drop: u8 = 0x13;
pub const DW_OP_over: u8 = 0x14;
pub const DW_OP_pick: u8 = 0x15;
pub const DW_OP_swap: u8 = 0x16;
pub const DW_OP_rot: u8 = 0x17;
pub const DW_OP_abs: u8 = 0x19;
pub const DW_OP_and: u8 = 0x1a;
pub const DW_OP_div: u8 = 0x1b;
pub const DW_OP_minus: u8 = 0x1c;
pub const DW_OP_mod: u8 = 0x1d;
pub const DW_OP_mul: u8 = 0x1e;
pub const DW_OP_neg: u8 = 0x1f;
pub const DW_OP_not: u8 = 0x20;
pub const DW_OP_or: u8 = 0x21;
pub const DW_OP_plus: u8 = 0x22;
pub const DW_OP_plus_uconst: u8 = 0x23;
pub const DW_OP_shl: u8 = 0x24;
pub const DW_OP_shr: u8 = 0x25;
pub const DW_OP_shra: u8 = 0x26;
pub const DW_OP_xor: u8 = 0x27;
pub const DW_OP_skip: u8 = 0x2f;
pub const DW_OP_bra: u8 = 0x28;
pub const DW_OP_eq: u8 = 0x29;
pub const DW_OP_ge: u8 = 0x2a;
pub const DW_OP_gt: u8 = 0x2b;
pub const DW_OP_le: u8 = 0x2c;
pub const DW_OP_lt: u8 = 0x2d;
pub const DW_OP_ne: u8 = 0x2e;
pub const DW_OP_lit0: u8 = 0x30;
// DW_OP_lit0..=DW_OP_lit31 -> 0x30..=0x4f
pub const DW_OP_reg0: u8 = 0x50;
// DW_OP_reg0..=DW_OP_reg31 -> 0x50..=0x6f
pub const DW_OP_breg0: u8 = 0x70;
// DW_OP_breg0..=DW_OP_breg31 -> 0x70..=0x8f
pub const DW_OP_regx: u8 = 0x90;
pub const DW_OP_fbreg: u8 = 0x91;
pub const DW_OP_bregx: u8 = 0x92;
pub const DW_OP_piece: u8 = 0x93;
pub const DW_OP_deref_size: u8 = 0x94;
pub const DW_OP_nop: u8 = 0x96;
pub const DW_OP_call_frame_cfa: u8 = 0x9c;
pub const DW_OP_bit_piece: u8 = 0x9d;
pub const DW_OP_implicit_value: u8 = 0x9e;
pub const DW_OP_stack_value: u8 = 0x9f;
pub const DW_OP_implicit_pointer: u8 = 0xa0;
pub const DW_OP_addrx: u8 = 0xa1;
pub const DW_OP_constx: u8 = 0xa2;
