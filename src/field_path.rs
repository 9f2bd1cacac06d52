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

//! Type sizes and offset -> member path resolution.
//!
//! Offsets are always relative to the aggregate currently being looked at. Following a
//! pointer does not change the offset: the walk simply continues in the pointee type, which
//! is how a field reached through `outer.ptr->inner` gets named.

use std::fmt;

use log::{debug, warn};
use serde::{Serialize, Serializer};

use crate::dwarf::{AttrKind, DebugInfoSource, DieRef, Tag};

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const UNKNOWN_PRIMITIVE: &str = "[unk primitive]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Deref,
}

/// `config.settings.limit(int)`, `ctx.dev->regs.status(uint32_t)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedPath {
    pub segments: Vec<PathSegment>,
    pub leaf: String,
}

impl fmt::Display for QualifiedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut after_field = false;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    if after_field {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                    after_field = true;
                }
                PathSegment::Deref => {
                    f.write_str("->")?;
                    after_field = false;
                }
            }
        }
        write!(f, "({})", self.leaf)
    }
}

impl Serialize for QualifiedPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub offset: u64,
    /// 0 when the member's size could not be determined; such a member matches nothing.
    pub size: u64,
    pub ty: Option<DieRef>,
}

impl Member {
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset - self.offset < self.size
    }
}

pub struct FieldResolver<'a, D: DebugInfoSource> {
    info: &'a D,
    max_depth: usize,
}

impl<'a, D: DebugInfoSource> FieldResolver<'a, D> {
    pub fn new(info: &'a D) -> Self {
        Self {
            info,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Follow `DW_AT_type` within the entry's own unit.
    pub fn type_of(&self, die: DieRef) -> Option<DieRef> {
        let offset = self
            .info
            .find_attribute(die, AttrKind::Type)?
            .as_reference()?;
        self.info.entry_at(die.unit, offset)
    }

    fn constant(&self, die: DieRef, kind: AttrKind) -> Option<u64> {
        self.info.find_attribute(die, kind)?.as_constant()
    }

    /// Footprint of `ty` as the field walk sees it. Pointers, typedefs and qualifiers are
    /// looked through; arrays report their element count rather than their byte size.
    pub fn size_of(&self, ty: DieRef) -> Option<u64> {
        let mut current = ty;
        for _ in 0..self.max_depth {
            match self.info.tag(current) {
                Tag::PointerType | Tag::Typedef | Tag::Qualifier | Tag::Variable | Tag::Member => {
                    match self.type_of(current) {
                        Some(next) => current = next,
                        None => {
                            warn!("Entry 0x{:x} has no type information.", current.offset);
                            return None;
                        }
                    }
                }
                Tag::ArrayType => return self.element_count(current),
                Tag::BaseType
                | Tag::StructureType
                | Tag::ClassType
                | Tag::UnionType
                | Tag::EnumerationType
                | Tag::SubrangeType
                | Tag::Other => {
                    let size = self.constant(current, AttrKind::ByteSize);
                    if size.is_none() {
                        warn!("Failed to get size of type at 0x{:x}.", current.offset);
                    }
                    return size;
                }
            }
        }
        warn!("Type chain starting at 0x{:x} is too deep", ty.offset);
        None
    }

    fn element_count(&self, array: DieRef) -> Option<u64> {
        if let Some(count) = self.constant(array, AttrKind::Count) {
            return Some(count);
        }

        let mut total: Option<u64> = None;
        for dim in self.info.children(array) {
            if self.info.tag(dim) != Tag::SubrangeType {
                continue;
            }
            let count = self.constant(dim, AttrKind::Count).or_else(|| {
                self.constant(dim, AttrKind::UpperBound)
                    .and_then(|upper| upper.checked_add(1))
            });
            match count {
                Some(count) => total = Some(total.unwrap_or(1).saturating_mul(count)),
                None => {
                    warn!("Array at 0x{:x} has an unbounded dimension.", array.offset);
                    return None;
                }
            }
        }
        if total.is_none() {
            warn!("Failed to get count of array at 0x{:x}.", array.offset);
        }
        total
    }

    /// Named data members of a struct/class in declaration order. Members without a name or
    /// an offset are left out.
    pub fn members(&self, aggregate: DieRef) -> Vec<Member> {
        self.info
            .children(aggregate)
            .into_iter()
            .filter(|&child| self.info.tag(child) == Tag::Member)
            .filter_map(|child| {
                let Some(name) = self.info.name(child) else {
                    debug!("Skipping unnamed member at 0x{:x}", child.offset);
                    return None;
                };
                let Some(offset) = self.constant(child, AttrKind::DataMemberLocation) else {
                    debug!("Skipping member {} without data member location", name);
                    return None;
                };
                Some(Member {
                    size: self.size_of(child).unwrap_or(0),
                    ty: self.type_of(child),
                    name,
                    offset,
                })
            })
            .collect()
    }

    /// Name the member of `ty` that contains `offset`, appending to `path`.
    pub fn resolve_field(
        &self,
        offset: u64,
        ty: DieRef,
        path: Vec<PathSegment>,
    ) -> Option<QualifiedPath> {
        let mut visited = Vec::new();
        self.resolve_inner(offset, ty, path, &mut visited)
    }

    fn resolve_inner(
        &self,
        offset: u64,
        ty: DieRef,
        mut path: Vec<PathSegment>,
        visited: &mut Vec<(DieRef, u64)>,
    ) -> Option<QualifiedPath> {
        if visited.len() >= self.max_depth {
            warn!("Field path exceeds {} levels, giving up", self.max_depth);
            return None;
        }
        if visited.contains(&(ty, offset)) {
            warn!(
                "Type at 0x{:x} refers back to itself at offset {}",
                ty.offset, offset
            );
            return None;
        }
        visited.push((ty, offset));

        match self.info.tag(ty) {
            Tag::PointerType => {
                path.push(PathSegment::Deref);
                let pointee = self.type_of(ty)?;
                self.resolve_inner(offset, pointee, path, visited)
            }
            Tag::Typedef | Tag::Qualifier => {
                let target = self.type_of(ty)?;
                self.resolve_inner(offset, target, path, visited)
            }
            Tag::BaseType | Tag::EnumerationType | Tag::UnionType | Tag::ArrayType => {
                let leaf = self
                    .info
                    .name(ty)
                    .unwrap_or_else(|| UNKNOWN_PRIMITIVE.to_string());
                Some(QualifiedPath {
                    segments: path,
                    leaf,
                })
            }
            Tag::StructureType | Tag::ClassType => {
                let Some(member) = self.members(ty).into_iter().find(|m| m.contains(offset))
                else {
                    debug!("No member of type 0x{:x} contains offset {}", ty.offset, offset);
                    return None;
                };
                debug!(
                    " ---> Member: {}, Offset: 0x{:08x}, Size: {} bytes",
                    member.name, member.offset, member.size
                );
                let member_ty = member.ty?;
                path.push(PathSegment::Field(member.name));
                self.resolve_inner(offset - member.offset, member_ty, path, visited)
            }
            Tag::Variable | Tag::Member | Tag::SubrangeType | Tag::Other => None,
        }
    }
}
