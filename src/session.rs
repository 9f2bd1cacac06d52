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

//! One resolution run over a binary on disk.
//!
//! The file is mapped, parsed and indexed once; every structure built from it is borrowed by
//! the [`Locator`] and dropped together with the mapping when [`run`] returns.

use std::fmt;
use std::fs::File;
use std::path::Path;

use log::{debug, trace, warn};
use memmap2::Mmap;
use serde_json::{json, Value};

use crate::addr_table::{AddrTableHeader, AddressTable};
use crate::dwarf::DwarfInfo;
use crate::errors::{ResolveError, Result};
use crate::locate::{LocateOptions, Locator, Outcome, TargetMode};
use crate::memory::{SectionCatalog, SectionRange};
use crate::symbols::SymbolTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    SectionsLoaded,
    TableLoaded,
    ScanningUnits,
    Found,
    Exhausted,
}

fn enter(phase: Phase) {
    trace!("Phase: {:?}", phase);
}

/// ELF data symbol containing an address the debug info could not explain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolHint {
    pub name: String,
    pub offset: u64,
}

impl fmt::Display for SymbolHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nearest ELF symbol: {}+0x{:x}", self.name, self.offset)
    }
}

#[derive(Debug)]
pub struct Report {
    pub target: u64,
    pub sections: Vec<SectionRange>,
    pub address_table_header: AddrTableHeader,
    pub address_table_entries: usize,
    pub outcome: Outcome,
    pub symbol_hint: Option<SymbolHint>,
}

impl Report {
    pub fn to_json(&self) -> Value {
        let sections: Vec<Value> = self.sections.iter().map(SectionRange::to_json).collect();
        let mut report = json!({
            "target": format!("0x{:x}", self.target),
            "sections": sections,
            "address_table": {
                "version": self.address_table_header.version,
                "address_size": self.address_table_header.address_size,
                "entries": self.address_table_entries,
            },
        });
        match &self.outcome {
            Outcome::Found(found) => {
                report["found"] = json!(true);
                report["match"] = json!(found);
            }
            Outcome::Exhausted => {
                report["found"] = json!(false);
            }
        }
        if let Some(hint) = &self.symbol_hint {
            report["symbol_hint"] = json!({
                "name": hint.name,
                "offset": format!("0x{:x}", hint.offset),
            });
        }
        report
    }
}

/// Resolve `target` against the binary at `path`.
pub fn run(path: &Path, target: u64, options: &LocateOptions) -> Result<Report> {
    enter(Phase::Init);
    let io_err = |source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    // SAFETY: the mapping is read-only and lives only for this call; the binary is not
    // expected to be modified while it is being analyzed.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
    let obj_file = object::File::parse(&*mmap)?;

    let sections = SectionCatalog::from_object(&obj_file)?;
    enter(Phase::SectionsLoaded);

    let table = AddressTable::load(&obj_file, options.addr_header_size)?;
    if table.is_empty() {
        warn!("Address table has no entries; indexed locations cannot be evaluated");
    }
    enter(Phase::TableLoaded);

    let info = DwarfInfo::load(&obj_file)?;
    enter(Phase::ScanningUnits);

    let outcome = Locator::new(&sections, &table, &info, options).locate(target);
    let symbol_hint = match &outcome {
        Outcome::Found(_) => {
            enter(Phase::Found);
            None
        }
        Outcome::Exhausted => {
            enter(Phase::Exhausted);
            symbol_hint(&obj_file, &sections, target, options.mode)
        }
    };

    Ok(Report {
        target,
        sections: sections.iter().cloned().collect(),
        address_table_header: *table.header(),
        address_table_entries: table.len(),
        outcome,
        symbol_hint,
    })
}

fn symbol_hint(
    obj_file: &object::File,
    sections: &SectionCatalog,
    target: u64,
    mode: TargetMode,
) -> Option<SymbolHint> {
    // Symbol addresses are absolute; a section-relative target can't be placed.
    if mode != TargetMode::Absolute {
        return None;
    }
    let symbols = SymbolTable::from_object(obj_file, sections);
    if symbols.is_empty() {
        debug!("No sized data symbols to fall back on");
        return None;
    }
    symbols.lookup(target).map(|sym| SymbolHint {
        name: sym.name.clone(),
        offset: target - sym.address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_path::{PathSegment, QualifiedPath};
    use crate::locate::FieldMatch;

    fn report(outcome: Outcome, symbol_hint: Option<SymbolHint>) -> Report {
        Report {
            target: 0x100a,
            sections: vec![SectionRange::new(".data", 0x1000, 0x1100)],
            address_table_header: AddrTableHeader {
                unit_length: 20,
                version: 5,
                address_size: 8,
                segment_selector_size: 0,
            },
            address_table_entries: 2,
            outcome,
            symbol_hint,
        }
    }

    #[test]
    fn found_report_json_carries_path() {
        let found = FieldMatch {
            variable: "g".into(),
            path: QualifiedPath {
                segments: vec![
                    PathSegment::Field("g".into()),
                    PathSegment::Field("b".into()),
                    PathSegment::Field("y".into()),
                ],
                leaf: "int32".into(),
            },
            variable_address: 0x1000,
            variable_size: 12,
            section: ".data".into(),
            unit: 0,
        };
        let v = report(Outcome::Found(found), None).to_json();
        assert_eq!(v["target"], "0x100a");
        assert_eq!(v["found"], true);
        assert_eq!(v["match"]["path"], "g.b.y(int32)");
        assert_eq!(v["match"]["variable_size"], 12);
        assert_eq!(v["match"]["variable_address"], "0x1000");
        assert_eq!(v["sections"][0]["name"], ".data");
        assert!(v.get("symbol_hint").is_none());
    }

    #[test]
    fn exhausted_report_json_with_hint() {
        let hint = SymbolHint {
            name: "buffer".into(),
            offset: 6,
        };
        assert_eq!(hint.to_string(), "nearest ELF symbol: buffer+0x6");
        let v = report(Outcome::Exhausted, Some(hint)).to_json();
        assert_eq!(v["found"], false);
        assert_eq!(v["symbol_hint"]["name"], "buffer");
        assert_eq!(v["symbol_hint"]["offset"], "0x6");
        assert_eq!(v["address_table"]["entries"], 2);
        assert_eq!(v["address_table"]["version"], 5);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = run(
            Path::new("/nonexistent/addr2field/firmware.elf"),
            0,
            &LocateOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Io { .. }));
    }
}
