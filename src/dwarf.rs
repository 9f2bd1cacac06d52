// Copyright (c) 2026 addr2field Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read-only view of the DWARF entry tree.
//!
//! The resolver never holds gimli types directly. It talks to a [`DebugInfoSource`] through
//! [`DieRef`] handles (unit index + unit-relative offset), which keeps the type walker
//! independent of how the entries are stored and lets tests build small trees by hand.

use std::borrow::Cow;
use std::rc::Rc;

use gimli::{AttributeValue, Encoding, Operation, Reader, RunTimeEndian, UnitOffset};
use log::{debug, warn};
use object::{BinaryFormat, Object, ObjectSection};

use crate::errors::Result;
use crate::expr::{decode, EvalError, Op};

pub type DwarfReader = gimli::EndianRcSlice<RunTimeEndian>;

pub fn endian_of(obj_file: &object::File) -> RunTimeEndian {
    if obj_file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    }
}

/// Map an ELF-style debug section name to the object format's spelling.
pub fn section_name(format: BinaryFormat, name: &str) -> String {
    match (format, name.strip_prefix('.')) {
        (BinaryFormat::MachO, Some(rest)) => format!("__{}", rest),
        _ => name.to_string(),
    }
}

/// Value-like handle to one debugging information entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DieRef {
    pub unit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Variable,
    Member,
    BaseType,
    PointerType,
    ArrayType,
    SubrangeType,
    StructureType,
    ClassType,
    UnionType,
    EnumerationType,
    Typedef,
    /// const / volatile / restrict / atomic wrappers.
    Qualifier,
    Other,
}

impl Tag {
    pub fn from_dw(tag: gimli::DwTag) -> Self {
        match tag {
            gimli::DW_TAG_variable => Tag::Variable,
            gimli::DW_TAG_member => Tag::Member,
            gimli::DW_TAG_base_type => Tag::BaseType,
            gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type => Tag::PointerType,
            gimli::DW_TAG_array_type => Tag::ArrayType,
            gimli::DW_TAG_subrange_type => Tag::SubrangeType,
            gimli::DW_TAG_structure_type => Tag::StructureType,
            gimli::DW_TAG_class_type => Tag::ClassType,
            gimli::DW_TAG_union_type => Tag::UnionType,
            gimli::DW_TAG_enumeration_type => Tag::EnumerationType,
            gimli::DW_TAG_typedef => Tag::Typedef,
            gimli::DW_TAG_const_type
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_restrict_type
            | gimli::DW_TAG_atomic_type => Tag::Qualifier,
            _ => Tag::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Type,
    ByteSize,
    DataMemberLocation,
    Count,
    UpperBound,
    Location,
}

impl AttrKind {
    fn dw_at(self) -> gimli::DwAt {
        match self {
            AttrKind::Type => gimli::DW_AT_type,
            AttrKind::ByteSize => gimli::DW_AT_byte_size,
            AttrKind::DataMemberLocation => gimli::DW_AT_data_member_location,
            AttrKind::Count => gimli::DW_AT_count,
            AttrKind::UpperBound => gimli::DW_AT_upper_bound,
            AttrKind::Location => gimli::DW_AT_location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSpec {
    Address(u64),
    Expression(Vec<Op>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Unit-relative offset of the referenced entry.
    Reference(usize),
    Constant(u64),
    Location(LocationSpec),
}

impl AttrValue {
    pub fn as_reference(&self) -> Option<usize> {
        match self {
            AttrValue::Reference(offset) => Some(*offset),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<u64> {
        match self {
            AttrValue::Constant(value) => Some(*value),
            _ => None,
        }
    }

    pub fn into_location(self) -> Option<LocationSpec> {
        match self {
            AttrValue::Location(location) => Some(location),
            _ => None,
        }
    }
}

pub trait DebugInfoSource {
    fn unit_count(&self) -> usize;

    fn unit_name(&self, _unit: usize) -> Option<String> {
        None
    }

    /// Every entry of `unit` in depth-first order.
    fn entries(&self, unit: usize) -> Result<Vec<DieRef>>;

    fn entry_at(&self, unit: usize, offset: usize) -> Option<DieRef>;

    fn tag(&self, die: DieRef) -> Tag;

    fn name(&self, die: DieRef) -> Option<String>;

    fn find_attribute(&self, die: DieRef, kind: AttrKind) -> Option<AttrValue>;

    fn children(&self, die: DieRef) -> Vec<DieRef>;
}

/// Classify a location expression. A lone `DW_OP_addr` is a direct address; anything else is
/// kept as bytecode for the evaluator.
pub fn decode_location<R: Reader>(
    bytecode: R,
    encoding: Encoding,
) -> std::result::Result<LocationSpec, EvalError> {
    let mut probe = bytecode.clone();
    if let Ok(Operation::Address { address }) = Operation::parse(&mut probe, encoding) {
        if probe.is_empty() {
            return Ok(LocationSpec::Address(address));
        }
    }
    decode(bytecode, encoding).map(LocationSpec::Expression)
}

fn member_offset<R: Reader>(attr: &gimli::Attribute<R>, encoding: Encoding) -> Option<u64> {
    if let Some(offset) = attr.udata_value() {
        return Some(offset);
    }
    // DWARF 2 producers encode the offset as DW_OP_plus_uconst <n>.
    if let AttributeValue::Exprloc(expr) = attr.value() {
        let mut bytes = expr.0;
        if let Ok(Operation::PlusConstant { value }) = Operation::parse(&mut bytes, encoding) {
            if bytes.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

pub struct DwarfInfo {
    dwarf: gimli::Dwarf<DwarfReader>,
    units: Vec<gimli::Unit<DwarfReader>>,
}

impl DwarfInfo {
    pub fn load(obj_file: &object::File) -> Result<Self> {
        let endian = endian_of(obj_file);
        let format = obj_file.format();

        let load_section = |id: gimli::SectionId| -> std::result::Result<DwarfReader, gimli::Error> {
            let data = match obj_file.section_by_name(&section_name(format, id.name())) {
                Some(section) => section.uncompressed_data().unwrap_or_else(|e| {
                    warn!("Failed to read section {}: {}", id.name(), e);
                    Cow::Borrowed(&[][..])
                }),
                None => Cow::Borrowed(&[][..]),
            };

            let data_rc: Rc<[u8]> = match data {
                Cow::Borrowed(b) => Rc::from(b),
                Cow::Owned(o) => Rc::from(o),
            };
            Ok(gimli::EndianRcSlice::new(data_rc, endian))
        };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        Self::from_dwarf(dwarf)
    }

    pub fn from_dwarf(dwarf: gimli::Dwarf<DwarfReader>) -> Result<Self> {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers.next()? {
            match dwarf.unit(header) {
                Ok(unit) => units.push(unit),
                Err(e) => warn!("Skipping unreadable compilation unit: {}", e),
            }
        }
        debug!("Parsed {} compilation units", units.len());
        Ok(Self { dwarf, units })
    }

    fn with_entry<T>(
        &self,
        die: DieRef,
        f: impl FnOnce(
            &gimli::Unit<DwarfReader>,
            &gimli::DebuggingInformationEntry<'_, '_, DwarfReader>,
        ) -> Option<T>,
    ) -> Option<T> {
        let unit = self.units.get(die.unit)?;
        let entry = unit.entry(UnitOffset(die.offset)).ok()?;
        f(unit, &entry)
    }

    fn location(
        &self,
        attr: &gimli::Attribute<DwarfReader>,
        encoding: Encoding,
    ) -> Option<LocationSpec> {
        match attr.raw_value() {
            AttributeValue::Data4(address) => return Some(LocationSpec::Address(address.into())),
            AttributeValue::Data8(address) | AttributeValue::Udata(address) => {
                return Some(LocationSpec::Address(address))
            }
            _ => {}
        }
        match attr.value() {
            AttributeValue::Exprloc(expr) => match decode_location(expr.0, encoding) {
                Ok(location) => Some(location),
                Err(e) => {
                    warn!("Undecodable location expression: {}", e);
                    None
                }
            },
            other => {
                debug!("Unsupported location form: {:?}", other);
                None
            }
        }
    }
}

impl DebugInfoSource for DwarfInfo {
    fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn unit_name(&self, unit: usize) -> Option<String> {
        let name = self.units.get(unit)?.name.as_ref()?;
        name.to_string_lossy().ok().map(|s| s.into_owned())
    }

    fn entries(&self, unit: usize) -> Result<Vec<DieRef>> {
        let Some(dwarf_unit) = self.units.get(unit) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut cursor = dwarf_unit.entries();
        while let Some((_, entry)) = cursor.next_dfs()? {
            out.push(DieRef {
                unit,
                offset: entry.offset().0,
            });
        }
        Ok(out)
    }

    fn entry_at(&self, unit: usize, offset: usize) -> Option<DieRef> {
        let die = DieRef { unit, offset };
        self.with_entry(die, |_, _| Some(die))
    }

    fn tag(&self, die: DieRef) -> Tag {
        self.with_entry(die, |_, entry| Some(Tag::from_dw(entry.tag())))
            .unwrap_or(Tag::Other)
    }

    fn name(&self, die: DieRef) -> Option<String> {
        self.with_entry(die, |unit, entry| {
            let value = entry.attr_value(gimli::DW_AT_name).ok()??;
            let name = self.dwarf.attr_string(unit, value).ok()?;
            name.to_string_lossy().ok().map(|s| s.into_owned())
        })
    }

    fn find_attribute(&self, die: DieRef, kind: AttrKind) -> Option<AttrValue> {
        self.with_entry(die, |unit, entry| {
            let attr = entry.attr(kind.dw_at()).ok()??;
            match kind {
                AttrKind::Type => match attr.value() {
                    AttributeValue::UnitRef(offset) => Some(AttrValue::Reference(offset.0)),
                    AttributeValue::DebugInfoRef(offset) => offset
                        .to_unit_offset(&unit.header)
                        .map(|offset| AttrValue::Reference(offset.0)),
                    other => {
                        debug!("Unsupported type reference: {:?}", other);
                        None
                    }
                },
                AttrKind::ByteSize | AttrKind::Count | AttrKind::UpperBound => {
                    attr.udata_value().map(AttrValue::Constant)
                }
                AttrKind::DataMemberLocation => {
                    member_offset(&attr, unit.encoding()).map(AttrValue::Constant)
                }
                AttrKind::Location => self
                    .location(&attr, unit.encoding())
                    .map(AttrValue::Location),
            }
        })
    }

    fn children(&self, die: DieRef) -> Vec<DieRef> {
        let mut out = Vec::new();
        let Some(unit) = self.units.get(die.unit) else {
            return out;
        };
        let mut tree = match unit.entries_tree(Some(UnitOffset(die.offset))) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Cannot walk children of entry 0x{:x}: {}", die.offset, e);
                return out;
            }
        };
        let Ok(root) = tree.root() else {
            return out;
        };
        let mut children = root.children();
        loop {
            match children.next() {
                Ok(Some(child)) => out.push(DieRef {
                    unit: die.unit,
                    offset: child.entry().offset().0,
                }),
                Ok(None) => break,
                Err(e) => {
                    warn!("Truncated children list at entry 0x{:x}: {}", die.offset, e);
                    break;
                }
            }
        }
        out
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use gimli::{EndianSlice, Format, LittleEndian};

    fn encoding() -> Encoding {
        Encoding {
            format: Format::Dwarf32,
            version: 5,
            address_size: 8,
        }
    }

    #[test]
    fn lone_addr_is_direct_location() {
        let mut bytes = vec![0x03]; // DW_OP_addr
        bytes.extend_from_slice(&0x4010u64.to_le_bytes());
        let loc = decode_location(EndianSlice::new(&bytes, LittleEndian), encoding()).unwrap();
        assert_eq!(loc, LocationSpec::Address(0x4010));
    }

    #[test]
    fn addr_followed_by_more_ops_stays_expression() {
        let mut bytes = vec![0x03];
        bytes.extend_from_slice(&0x4010u64.to_le_bytes());
        bytes.extend_from_slice(&[0x11, 0x04, 0x22]);
        let loc = decode_location(EndianSlice::new(&bytes, LittleEndian), encoding()).unwrap();
        assert_eq!(
            loc,
            LocationSpec::Expression(vec![
                Op::Unsupported(gimli::DW_OP_addr),
                Op::PushConstant(4),
                Op::Add
            ])
        );
    }

    #[test]
    fn addrx_location_is_expression() {
        let bytes = [0xa1, 0x00];
        let loc = decode_location(EndianSlice::new(&bytes, LittleEndian), encoding()).unwrap();
        assert_eq!(loc, LocationSpec::Expression(vec![Op::IndirectAddress(0)]));
    }

    #[test]
    fn tag_mapping() {
        assert_eq!(Tag::from_dw(gimli::DW_TAG_class_type), Tag::ClassType);
        assert_eq!(Tag::from_dw(gimli::DW_TAG_volatile_type), Tag::Qualifier);
        assert_eq!(Tag::from_dw(gimli::DW_TAG_subprogram), Tag::Other);
    }

    #[test]
    fn macho_section_names() {
        assert_eq!(section_name(BinaryFormat::MachO, ".debug_addr"), "__debug_addr");
        assert_eq!(section_name(BinaryFormat::Elf, ".debug_addr"), ".debug_addr");
    }

    #[test]
    fn fixture_walks_children_in_order() {
        let mut info = fixture::FixtureInfo::new();
        let unit = info.add_unit();
        let int = info.base_type(unit, "int", 4);
        let s = info.struct_type(unit, "pair", 8);
        let a = info.member(s, "a", 0, int);
        let b = info.member(s, "b", 4, int);

        assert_eq!(info.children(s), vec![a, b]);
        assert_eq!(info.tag(a), Tag::Member);
        assert_eq!(info.name(b).as_deref(), Some("b"));
        assert_eq!(
            info.find_attribute(b, AttrKind::DataMemberLocation),
            Some(AttrValue::Constant(4))
        );
        assert_eq!(info.entry_at(unit, 99), None);
    }
}
