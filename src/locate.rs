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

/// Scan every global variable for the one whose storage contains the target address.
use log::{debug, info, trace, warn};
use serde::{Serialize, Serializer};

use crate::addr_table::{AddressTable, DEFAULT_HEADER_SIZE};
use crate::dwarf::{AttrKind, DebugInfoSource, DieRef, LocationSpec, Tag};
use crate::expr::evaluate;
use crate::field_path::{FieldResolver, PathSegment, QualifiedPath, DEFAULT_MAX_DEPTH};
use crate::memory::SectionCatalog;

pub const ANONYMOUS: &str = "<anonymous>";

/// How the target address relates to variable addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    /// The target is a virtual address, comparable with DWARF locations.
    #[default]
    Absolute,
    /// The target is an offset into whichever data section holds the variable.
    SectionRelative,
}

#[derive(Debug, Clone)]
pub struct LocateOptions {
    pub mode: TargetMode,
    pub max_depth: usize,
    pub addr_header_size: usize,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            mode: TargetMode::Absolute,
            max_depth: DEFAULT_MAX_DEPTH,
            addr_header_size: DEFAULT_HEADER_SIZE,
        }
    }
}

fn hex<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("0x{:x}", value))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMatch {
    pub variable: String,
    pub path: QualifiedPath,
    #[serde(serialize_with = "hex")]
    pub variable_address: u64,
    pub variable_size: u64,
    pub section: String,
    pub unit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Found(FieldMatch),
    /// Every unit and entry was scanned without a match.
    Exhausted,
}

pub struct Locator<'a, D: DebugInfoSource> {
    sections: &'a SectionCatalog,
    table: &'a AddressTable,
    info: &'a D,
    resolver: FieldResolver<'a, D>,
    mode: TargetMode,
}

impl<'a, D: DebugInfoSource> Locator<'a, D> {
    pub fn new(
        sections: &'a SectionCatalog,
        table: &'a AddressTable,
        info: &'a D,
        options: &LocateOptions,
    ) -> Self {
        Self {
            sections,
            table,
            info,
            resolver: FieldResolver::new(info).with_max_depth(options.max_depth),
            mode: options.mode,
        }
    }

    /// First variable (in unit, then entry order) whose field path resolves wins.
    pub fn locate(&self, target: u64) -> Outcome {
        for unit in 0..self.info.unit_count() {
            let entries = match self.info.entries(unit) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping compilation unit {}: {}", unit, e);
                    continue;
                }
            };
            trace!(
                "Scanning unit {} ({}), {} entries",
                unit,
                self.info.unit_name(unit).unwrap_or_default(),
                entries.len()
            );

            for die in entries {
                if self.info.tag(die) != Tag::Variable {
                    continue;
                }
                if let Some(found) = self.try_variable(die, target) {
                    return Outcome::Found(found);
                }
            }
        }
        Outcome::Exhausted
    }

    /// Address and display name of a variable, or `None` when it has no usable location.
    fn candidate(&self, die: DieRef) -> Option<(u64, String)> {
        let location = self
            .info
            .find_attribute(die, AttrKind::Location)?
            .into_location()?;
        let name = self.info.name(die);

        match location {
            LocationSpec::Address(address) => {
                debug!("Location (address): 0x{:x}", address);
                Some((address, name.unwrap_or_else(|| ANONYMOUS.to_string())))
            }
            LocationSpec::Expression(ops) => {
                let address = match evaluate(&ops, self.table) {
                    Ok(address) => address,
                    Err(e) if e.is_unsupported() => {
                        debug!("Skipping variable at 0x{:x}: {}", die.offset, e);
                        return None;
                    }
                    Err(e) => {
                        warn!(
                            "Cannot evaluate location of {}: {}",
                            name.as_deref().unwrap_or(ANONYMOUS),
                            e
                        );
                        return None;
                    }
                };
                // Unnamed globals are compiler generated.
                let Some(name) = name else {
                    debug!("Skipping global anonymous variable at 0x{:x}", die.offset);
                    return None;
                };
                debug!("Global Variable: {}, Evaluated Address: 0x{:x}", name, address);
                Some((address, name))
            }
        }
    }

    fn try_variable(&self, die: DieRef, target: u64) -> Option<FieldMatch> {
        let (address, name) = self.candidate(die)?;

        let Some(section) = self.sections.find_section(address) else {
            debug!("Address 0x{:x} of {} not found in known sections.", address, name);
            return None;
        };
        let base = match self.mode {
            TargetMode::Absolute => address,
            TargetMode::SectionRelative => address - section.start,
        };

        let Some(ty) = self.resolver.type_of(die) else {
            warn!("Variable {} has no type information.", name);
            return None;
        };
        let size = self.resolver.size_of(ty)?;
        if target < base || target - base >= size {
            return None;
        }

        info!(
            "Section: {}, Offset: 0x{:016x}, Size: {}",
            section.name,
            address - section.start,
            size
        );

        let path = vec![PathSegment::Field(name.clone())];
        match self.resolver.resolve_field(target - base, ty, path) {
            Some(path) => Some(FieldMatch {
                variable: name,
                path,
                variable_address: address,
                variable_size: size,
                section: section.name.clone(),
                unit: die.unit,
            }),
            None => {
                info!("Could not determine the fully qualified field name for {}.", name);
                None
            }
        }
    }
}
