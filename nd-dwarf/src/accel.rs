//! Acceleration indices: `.debug_aranges`, a CU-offset index built by
//! walking `.debug_info` headers, the DWARF5 `.debug_names` lookup table,
//! and the type-unit signature map `DW_FORM_ref_sig8` and Split-DWARF both
//! need (`spec.md` §4.8, component C8).
//!
//! None of these are required to read a single DIE; they exist purely to
//! avoid a linear scan of `.debug_info` on every breakpoint/lookup, which is
//! why each one degrades to "index empty, fall back to the linear scan"
//! rather than failing the whole unit the way `nd-dwarf::die` does.

use std::collections::HashMap;

use crate::constants::*;
use crate::die::{AttrValue, CompUnit};
use crate::error::{DwarfErrorKind, Result};
use crate::reader::{Format, Reader};

/// The DJB hash `.debug_names` buckets names by (DWARF5 §6.1.1.4.3): `h =
/// 5381; h = h * 33 + c` for each byte of the (non-NUL-terminated) name.
pub fn debug_names_hash(name: &str) -> u32 {
    let mut h: u32 = 5381;
    for &b in name.as_bytes() {
        h = h.wrapping_mul(33).wrapping_add(b as u32);
    }
    h
}

fn root_low_high(root: &crate::die::Die) -> Option<(u64, u64)> {
    let low = root.attr(DW_AT_low_pc).and_then(AttrValue::as_u64)?;
    let high = match root.attr(DW_AT_high_pc)? {
        AttrValue::Address(abs) => *abs,
        other => low + other.as_u64()?,
    };
    Some((low, high))
}

/// One `(start, length, cu_offset)` tuple from a `.debug_aranges` set,
/// sorted by `start` so lookups can binary-search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Arange {
    start: u64,
    length: u64,
    cu_offset: u64,
}

/// A sorted index over every `.debug_aranges` tuple in a binary, letting a
/// PC be mapped to its owning compilation unit without scanning
/// `.debug_info`.
#[derive(Clone, Debug, Default)]
pub struct ArangesIndex {
    ranges: Vec<Arange>,
}

impl ArangesIndex {
    /// Parses every set in `.debug_aranges`.
    ///
    /// Each set's tuples start at an offset that is a multiple of the tuple
    /// size (`2 * address_size`), measured from the start of that set's
    /// header (DWARF5 §6.1.2) -- not from the start of the section -- so
    /// the padding is recomputed per set rather than assumed global.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let mut ranges = Vec::new();

        while !r.is_empty() {
            let set_start = r.position();
            let (format, unit_length) = r.read_initial_length()?;
            let set_end = r.position() + unit_length as usize;
            let _version = r.read_u16()?;
            let cu_offset = r.read_offset(format)?;
            let address_size = r.read_u8()?;
            let _segment_selector_size = r.read_u8()?;

            let tuple_size = 2 * address_size as usize;
            let header_len = r.position() - set_start;
            let padding = (tuple_size - header_len % tuple_size) % tuple_size;
            r.skip(padding)?;

            loop {
                let start = r.read_address(address_size)?;
                let length = r.read_address(address_size)?;
                if start == 0 && length == 0 {
                    break;
                }
                ranges.push(Arange { start, length, cu_offset });
            }

            r.seek(set_end)?;
        }

        ranges.sort_by_key(|a| a.start);
        Ok(ArangesIndex { ranges })
    }

    /// Finds the compile unit (its `.debug_info` offset) covering `pc`, if
    /// any set in this index names one.
    pub fn find_cu_for_pc(&self, pc: u64) -> Option<u64> {
        let idx = self.ranges.partition_point(|a| a.start <= pc);
        self.ranges[..idx]
            .iter()
            .rev()
            .find(|a| pc < a.start + a.length)
            .map(|a| a.cu_offset)
    }
}

/// A CU-offset index built directly from each unit's root DIE, used when a
/// binary carries no `.debug_aranges` (common with `lld`/`dsymutil` output).
#[derive(Clone, Debug, Default)]
pub struct CuIndex {
    ranges: Vec<(u64, u64, u64)>,
}

impl CuIndex {
    /// Builds the index by reading `DW_AT_low_pc`/`DW_AT_high_pc` off each
    /// unit's root DIE. Units whose code is split across non-contiguous
    /// ranges (`DW_AT_ranges`) are not covered here; the caller falls back
    /// to a linear scan for those, since resolving `DW_AT_ranges` needs the
    /// `.debug_rnglists`/`.debug_ranges` bytes this index doesn't have.
    pub fn build(units: &[CompUnit]) -> Self {
        let mut ranges: Vec<(u64, u64, u64)> = units
            .iter()
            .filter_map(|cu| root_low_high(&cu.root).map(|(low, high)| (low, high, cu.offset)))
            .collect();
        ranges.sort_by_key(|&(low, _, _)| low);
        CuIndex { ranges }
    }

    /// Finds the compile unit (its `.debug_info` offset) covering `pc`.
    pub fn find_cu_for_pc(&self, pc: u64) -> Option<u64> {
        let idx = self.ranges.partition_point(|&(low, _, _)| low <= pc);
        self.ranges[..idx]
            .iter()
            .rev()
            .find(|&&(low, high, _)| pc >= low && pc < high)
            .map(|&(_, _, cu_offset)| cu_offset)
    }
}

/// One signature's resolved location: the type unit's own offset in
/// `.debug_info`/`.debug_types`, and the offset of the defining DIE itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeSignatureEntry {
    /// The type unit's header offset.
    pub cu_offset: u64,
    /// The defining DIE's offset, relative to `cu_offset`.
    pub type_offset: u64,
}

/// Maps a type unit's 8-byte signature (`DW_FORM_ref_sig8`) to where its
/// defining DIE lives, so a reference from one unit into another's type
/// unit can be resolved without re-scanning every type unit in the binary.
#[derive(Clone, Debug, Default)]
pub struct TypeSignatureMap {
    signatures: HashMap<u64, TypeSignatureEntry>,
}

impl TypeSignatureMap {
    /// Builds the map from every unit that carries a signature: DWARF5
    /// `DW_UT_type`/`DW_UT_split_type` units and legacy `.debug_types` units
    /// alike (`nd_dwarf::die::parse_type_units_legacy` tags both the same
    /// way, with `type_signature`/`type_offset` set).
    pub fn build(units: &[CompUnit]) -> Self {
        let mut signatures = HashMap::new();
        for cu in units {
            if let (Some(sig), Some(type_offset)) = (cu.type_signature, cu.type_offset) {
                signatures.insert(
                    sig,
                    TypeSignatureEntry {
                        cu_offset: cu.offset,
                        type_offset,
                    },
                );
            }
        }
        TypeSignatureMap { signatures }
    }

    /// Looks up a type unit by its 8-byte signature.
    pub fn get(&self, signature: u64) -> Option<TypeSignatureEntry> {
        self.signatures.get(&signature).copied()
    }
}

/// The Split-DWARF companion a skeleton compile unit names, resolved from
/// either the DWARF5 standard attributes or the pre-standard GNU extension
/// ones (`spec.md` §4.1/§4.8, `SPEC_FULL.md` §14).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkeletonUnit {
    /// The skeleton unit's own offset in `.debug_info`.
    pub cu_offset: u64,
    /// The `.dwo` file's name, as written by the compiler (relative to
    /// `comp_dir` unless absolute).
    pub dwo_name: Option<String>,
    /// The compilation directory the `.dwo` name is relative to.
    pub comp_dir: Option<String>,
    /// The identity hash that must match between the skeleton and its
    /// `.dwo` companion before the companion is trusted.
    pub dwo_id: Option<u64>,
}

impl SkeletonUnit {
    /// Collects every skeleton/split-compile unit in `units`.
    pub fn collect(units: &[CompUnit]) -> Vec<SkeletonUnit> {
        units
            .iter()
            .filter(|cu| cu.unit_type == DW_UT_skeleton || cu.unit_type == DW_UT_split_compile)
            .map(|cu| SkeletonUnit {
                cu_offset: cu.offset,
                dwo_name: cu.dwo_name().map(str::to_owned),
                comp_dir: cu.comp_dir().map(str::to_owned),
                dwo_id: cu.dwo_id.or_else(|| cu.gnu_dwo_id()),
            })
            .collect()
    }
}

/// One name's resolved entry in a `.debug_names` index: which DIE it names,
/// in which unit, and the DIE's tag (so a caller can filter by kind without
/// re-reading the DIE itself first).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebugNamesEntry {
    /// Offset of the named DIE, relative to its compile/type unit.
    pub die_offset: u64,
    /// Index into the unit's CU array (`DW_IDX_compile_unit`), if the entry
    /// carried one.
    pub cu_index: Option<u64>,
    /// Index into the unit's local type-unit array (`DW_IDX_type_unit`), if
    /// the entry carried one instead of a CU index.
    pub type_unit_index: Option<u64>,
    /// The named DIE's `DW_TAG_*`, taken from the entry's abbreviation.
    pub tag: u64,
}

#[derive(Clone, Debug)]
struct NameAbbrev {
    tag: u64,
    attrs: Vec<(u8, u64)>,
}

/// A parsed `.debug_names` accelerated lookup table (DWARF5 §6.1.1).
///
/// Holds an owned copy of the section's bytes -- consistent with the rest
/// of this crate's ownership model (`DESIGN.md`'s "owned strings over
/// self-referential arenas" decision) -- rather than borrowing, since the
/// bucket/hash/offset tables and the entry pool all need to be walked
/// together at lookup time.
#[derive(Clone, Debug)]
pub struct DebugNamesIndex {
    data: Vec<u8>,
    format: Format,
    bucket_count: u32,
    name_count: u32,
    buckets: Vec<u32>,
    hashes: Vec<u32>,
    string_offsets: Vec<u64>,
    entry_offsets: Vec<u64>,
    entry_pool_start: usize,
    abbrevs: HashMap<u64, NameAbbrev>,
    cu_offsets: Vec<u64>,
}

impl DebugNamesIndex {
    /// Parses the table at the start of `data` (one `.debug_names` section
    /// holds exactly one table, unlike `.debug_abbrev`/`.debug_info`).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let (format, unit_length) = r.read_initial_length()?;
        let unit_end = r.position() + unit_length as usize;
        let _version = r.read_u16()?;
        let _padding = r.read_u16()?;

        let comp_unit_count = r.read_u32()?;
        let local_type_unit_count = r.read_u32()?;
        let foreign_type_unit_count = r.read_u32()?;
        let bucket_count = r.read_u32()?;
        let name_count = r.read_u32()?;
        let abbrev_table_size = r.read_u32()?;
        let augmentation_string_size = r.read_u32()?;
        r.skip(augmentation_string_size as usize)?;

        let mut cu_offsets = Vec::with_capacity(comp_unit_count as usize);
        for _ in 0..comp_unit_count {
            cu_offsets.push(r.read_offset(format)?);
        }
        for _ in 0..local_type_unit_count {
            r.read_offset(format)?;
        }
        for _ in 0..foreign_type_unit_count {
            r.read_u64()?;
        }

        let mut buckets = Vec::with_capacity(bucket_count as usize);
        for _ in 0..bucket_count {
            buckets.push(r.read_u32()?);
        }

        let mut hashes = Vec::with_capacity(name_count as usize);
        for _ in 0..name_count {
            hashes.push(r.read_u32()?);
        }

        let mut string_offsets = Vec::with_capacity(name_count as usize);
        for _ in 0..name_count {
            string_offsets.push(r.read_offset(format)?);
        }

        let mut entry_offsets = Vec::with_capacity(name_count as usize);
        for _ in 0..name_count {
            entry_offsets.push(r.read_offset(format)?);
        }

        let abbrev_table_start = r.position();
        let abbrevs = parse_name_abbrevs(data, abbrev_table_start)?;
        let entry_pool_start = abbrev_table_start + abbrev_table_size as usize;
        if entry_pool_start > unit_end {
            return Err(DwarfErrorKind::MalformedHeader.into());
        }

        Ok(DebugNamesIndex {
            data: data[..unit_end].to_vec(),
            format,
            bucket_count,
            name_count,
            buckets,
            hashes,
            string_offsets,
            entry_offsets,
            entry_pool_start,
            abbrevs,
            cu_offsets,
        })
    }

    /// The CU array, indexed by `DW_IDX_compile_unit`/`DebugNamesEntry::cu_index`.
    pub fn cu_offsets(&self) -> &[u64] {
        &self.cu_offsets
    }

    /// Looks up every entry for `name`, comparing against the literal bytes
    /// at each candidate's `.debug_str` offset (`debug_str` is the raw
    /// section, not yet split into strings, matching how `nd-dwarf` reads
    /// every other string table).
    pub fn lookup(&self, name: &str, debug_str: &[u8]) -> Result<Vec<DebugNamesEntry>> {
        if self.bucket_count == 0 {
            return Ok(Vec::new());
        }

        let hash = debug_names_hash(name);
        let bucket = hash % self.bucket_count;
        let mut index = match self.buckets[bucket as usize] {
            0 => return Ok(Vec::new()),
            n => n as usize - 1,
        };

        let mut out = Vec::new();
        while index < self.name_count as usize {
            if self.hashes[index] % self.bucket_count != bucket {
                break;
            }
            if self.hashes[index] == hash {
                let candidate = read_cstr_at(debug_str, self.string_offsets[index] as usize)?;
                if candidate == name.as_bytes() {
                    self.decode_entries(self.entry_offsets[index] as usize, &mut out)?;
                }
            }
            index += 1;
        }

        Ok(out)
    }

    fn decode_entries(&self, offset: usize, out: &mut Vec<DebugNamesEntry>) -> Result<()> {
        let mut r = Reader::new(&self.data);
        r.seek(self.entry_pool_start + offset)?;

        loop {
            let code = r.read_uleb128()?;
            if code == 0 {
                break;
            }
            let abbrev = self
                .abbrevs
                .get(&code)
                .ok_or(DwarfErrorKind::InvalidReference)?;

            let mut die_offset = None;
            let mut cu_index = None;
            let mut type_unit_index = None;
            for &(idx_attr, form) in &abbrev.attrs {
                let value = read_idx_value(&mut r, form, self.format)?;
                match idx_attr {
                    DW_IDX_die_offset => die_offset = Some(value),
                    DW_IDX_compile_unit => cu_index = Some(value),
                    DW_IDX_type_unit => type_unit_index = Some(value),
                    // DW_IDX_parent and DW_IDX_type_hash are read (to keep
                    // the cursor in sync) but not retained: parent-chain
                    // navigation and GUID-hash lookups aren't needed by
                    // anything `nd-engine` does with this index today.
                    _ => {}
                }
            }

            out.push(DebugNamesEntry {
                die_offset: die_offset.ok_or(DwarfErrorKind::MalformedHeader)?,
                cu_index,
                type_unit_index,
                tag: abbrev.tag,
            });
        }

        Ok(())
    }
}

fn read_cstr_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    let mut r = Reader::new(data);
    r.seek(offset)?;
    r.read_cstr()
}

fn read_idx_value(r: &mut Reader<'_>, form: u64, format: Format) -> Result<u64> {
    Ok(match form {
        DW_FORM_data1 | DW_FORM_ref1 | DW_FORM_strx1 => r.read_u8()? as u64,
        DW_FORM_data2 | DW_FORM_ref2 | DW_FORM_strx2 => r.read_u16()? as u64,
        DW_FORM_data4 | DW_FORM_ref4 => r.read_u32()? as u64,
        DW_FORM_data8 | DW_FORM_ref8 => r.read_u64()?,
        DW_FORM_udata | DW_FORM_ref_udata => r.read_uleb128()?,
        DW_FORM_ref_addr | DW_FORM_sec_offset => r.read_offset(format)?,
        DW_FORM_flag_present => 1,
        other => return Err(DwarfErrorKind::UnknownForm(other).into()),
    })
}

fn parse_name_abbrevs(data: &[u8], offset: usize) -> Result<HashMap<u64, NameAbbrev>> {
    let mut r = Reader::new(data);
    r.seek(offset)?;
    let mut abbrevs = HashMap::new();

    loop {
        let code = r.read_uleb128()?;
        if code == 0 {
            break;
        }
        let tag = r.read_uleb128()?;
        let mut attrs = Vec::new();
        loop {
            let idx_attr = r.read_uleb128()?;
            let form = r.read_uleb128()?;
            if idx_attr == 0 && form == 0 {
                break;
            }
            attrs.push((idx_attr as u8, form));
        }
        abbrevs.insert(code, NameAbbrev { tag, attrs });
    }

    Ok(abbrevs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::die::Die;

    #[test]
    fn debug_names_hash_matches_dwarf5_example() {
        // DWARF5 §6.1.1.4.3 worked example: hash("int") == 0x00b888030.
        assert_eq!(debug_names_hash("int"), 0x00b8_8030);
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

    #[test]
    fn aranges_index_finds_containing_cu() {
        let mut data = Vec::new();
        // one set: unit_length placeholder patched below
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes()); // version
        body.extend_from_slice(&0x40u32.to_le_bytes()); // debug_info_offset
        body.push(8); // address_size
        body.push(0); // segment_selector_size
        // header_len (incl. 4-byte initial length) = 4+2+4+1+1 = 12,
        // tuple_size = 16, padding = 4
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&0x1000u64.to_le_bytes());
        body.extend_from_slice(&0x100u64.to_le_bytes());
        body.extend_from_slice(&0u64.to_le_bytes());
        body.extend_from_slice(&0u64.to_le_bytes());

        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);

        let index = ArangesIndex::parse(&data).unwrap();
        assert_eq!(index.find_cu_for_pc(0x1050), Some(0x40));
        assert_eq!(index.find_cu_for_pc(0x2000), None);
    }

    #[test]
    fn cu_index_builds_from_root_die_low_high_pc() {
        let cu = CompUnit {
            offset: 0,
            version: 4,
            address_size: 8,
            format: Format::Dwarf32,
            abbrev_offset: 0,
            unit_type: DW_UT_compile,
            type_signature: None,
            type_offset: None,
            dwo_id: None,
            root: Die {
                offset: 0,
                tag: DW_TAG_compile_unit,
                attrs: vec![
                    (DW_AT_low_pc, AttrValue::Address(0x4000)),
                    (DW_AT_high_pc, AttrValue::Udata(0x100)),
                ],
                children: vec![],
            },
        };
        let index = CuIndex::build(&[cu]);
        assert_eq!(index.find_cu_for_pc(0x4050), Some(0));
        assert_eq!(index.find_cu_for_pc(0x5000), None);
    }

    #[test]
    fn type_signature_map_resolves_ref_sig8() {
        let cu = CompUnit {
            offset: 0x200,
            version: 5,
            address_size: 8,
            format: Format::Dwarf32,
            abbrev_offset: 0,
            unit_type: DW_UT_type,
            type_signature: Some(0xdead_beef),
            type_offset: Some(0x20),
            dwo_id: None,
            root: Die { offset: 0x220, tag: DW_TAG_structure_type, attrs: vec![], children: vec![] },
        };
        let map = TypeSignatureMap::build(&[cu]);
        let entry = map.get(0xdead_beef).unwrap();
        assert_eq!(entry.cu_offset, 0x200);
        assert_eq!(entry.type_offset, 0x20);
        assert!(map.get(0x1234).is_none());
    }

    #[test]
    fn skeleton_unit_collect_prefers_standard_dwo_id_over_gnu() {
        let cu = CompUnit {
            offset: 0,
            version: 5,
            address_size: 8,
            format: Format::Dwarf32,
            abbrev_offset: 0,
            unit_type: DW_UT_skeleton,
            type_signature: None,
            type_offset: None,
            dwo_id: Some(0x1),
            root: Die {
                offset: 0,
                tag: DW_TAG_compile_unit,
                attrs: vec![
                    (DW_AT_dwo_name, AttrValue::InlineString("a.dwo".into())),
                    (DW_AT_comp_dir, AttrValue::InlineString("/build".into())),
                    (DW_AT_GNU_dwo_id, AttrValue::Udata(0x2)),
                ],
                children: vec![],
            },
        };
        let units = SkeletonUnit::collect(&[cu]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].dwo_name.as_deref(), Some("a.dwo"));
        assert_eq!(units[0].comp_dir.as_deref(), Some("/build"));
        assert_eq!(units[0].dwo_id, Some(0x1));
    }

    fn build_debug_names() -> (Vec<u8>, Vec<u8>) {
        let mut debug_str = Vec::new();
        debug_str.push(0); // offset 0 unused
        let name_offset = debug_str.len() as u64;
        debug_str.extend_from_slice(b"main\0");

        let hash = debug_names_hash("main");
        let bucket_count = 1u32;
        let name_count = 1u32;

        let mut abbrev_table = Vec::new();
        encode_uleb(1, &mut abbrev_table); // abbrev code
        encode_uleb(DW_TAG_subprogram, &mut abbrev_table);
        encode_uleb(DW_IDX_compile_unit as u64, &mut abbrev_table);
        encode_uleb(DW_FORM_data1, &mut abbrev_table);
        encode_uleb(DW_IDX_die_offset as u64, &mut abbrev_table);
        encode_uleb(DW_FORM_data4, &mut abbrev_table);
        abbrev_table.push(0);
        abbrev_table.push(0);
        abbrev_table.push(0); // abbrev table terminator

        let mut entry_pool = Vec::new();
        encode_uleb(1, &mut entry_pool); // abbrev code
        entry_pool.push(0); // DW_IDX_compile_unit = 0
        entry_pool.extend_from_slice(&0x99u32.to_le_bytes()); // DW_IDX_die_offset
        entry_pool.push(0); // terminate name's entry chain

        let mut body = Vec::new();
        body.extend_from_slice(&5u16.to_le_bytes()); // version
        body.extend_from_slice(&0u16.to_le_bytes()); // padding
        body.extend_from_slice(&1u32.to_le_bytes()); // comp_unit_count
        body.extend_from_slice(&0u32.to_le_bytes()); // local_type_unit_count
        body.extend_from_slice(&0u32.to_le_bytes()); // foreign_type_unit_count
        body.extend_from_slice(&bucket_count.to_le_bytes());
        body.extend_from_slice(&name_count.to_le_bytes());
        body.extend_from_slice(&(abbrev_table.len() as u32).to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // augmentation_string_size
        body.extend_from_slice(&0u32.to_le_bytes()); // cu_offsets[0]
        body.extend_from_slice(&1u32.to_le_bytes()); // buckets[0] = 1 (1-based)
        body.extend_from_slice(&hash.to_le_bytes()); // hashes[0]
        body.extend_from_slice(&(name_offset as u32).to_le_bytes()); // string_offsets[0]
        body.extend_from_slice(&0u32.to_le_bytes()); // entry_offsets[0] (offset into entry pool)
        body.extend_from_slice(&abbrev_table);
        body.extend_from_slice(&entry_pool);

        let mut data = Vec::new();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);
        (data, debug_str)
    }

    #[test]
    fn debug_names_lookup_finds_matching_entry() {
        let (data, debug_str) = build_debug_names();
        let index = DebugNamesIndex::parse(&data).unwrap();
        let entries = index.lookup("main", &debug_str).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].die_offset, 0x99);
        assert_eq!(entries[0].cu_index, Some(0));
        assert_eq!(entries[0].tag, DW_TAG_subprogram);
        assert_eq!(index.cu_offsets(), &[0]);
    }

    #[test]
    fn debug_names_lookup_misses_are_empty() {
        let (data, debug_str) = build_debug_names();
        let index = DebugNamesIndex::parse(&data).unwrap();
        assert!(index.lookup("nonexistent", &debug_str).unwrap().is_empty());
    }
}
