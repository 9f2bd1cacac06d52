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

/// Data-section address ranges of the binary (.data / .bss or their Mach-O equivalents).
use log::{info, warn};
use object::{BinaryFormat, Object, ObjectSection};
use serde_json::{json, Value};

use crate::errors::{ResolveError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRange {
    pub name: String,
    pub start: u64,
    pub end: u64, // exclusive
}

impl SectionRange {
    pub fn new(name: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "start": format!("0x{:x}", self.start),
            "end": format!("0x{:x}", self.end),
            "size": self.size(),
        })
    }
}

/// Names of the initialized and zero-initialized data sections for an object format.
pub fn data_section_names(format: BinaryFormat) -> [&'static str; 2] {
    match format {
        BinaryFormat::MachO => ["__data", "__bss"],
        _ => [".data", ".bss"],
    }
}

#[derive(Debug, Clone)]
pub struct SectionCatalog {
    ranges: Vec<SectionRange>,
}

impl SectionCatalog {
    pub fn from_ranges(ranges: Vec<SectionRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(ResolveError::NoDataSections);
        }
        Ok(Self { ranges })
    }

    pub fn from_object(obj_file: &object::File) -> Result<Self> {
        let wanted = data_section_names(obj_file.format());
        let mut ranges = Vec::new();

        for section in obj_file.sections() {
            let name = match section.name() {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping section #{}: unreadable name ({})", section.index().0, e);
                    continue;
                }
            };
            if !wanted.contains(&name) {
                continue;
            }

            let start = section.address();
            match start.checked_add(section.size()) {
                Some(end) => {
                    info!(
                        "Loaded section {} with start address: 0x{:016x} and end address: 0x{:016x}",
                        name, start, end
                    );
                    ranges.push(SectionRange::new(name, start, end));
                }
                None => {
                    warn!("Failed to get address or size for section: {}", name);
                }
            }
        }

        Self::from_ranges(ranges)
    }

    /// First range (in catalog order) containing `addr`. Overlapping ranges are legal; the
    /// earlier one wins.
    pub fn find_section(&self, addr: u64) -> Option<&SectionRange> {
        self.ranges.iter().find(|r| r.contains(addr))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionRange> {
        self.ranges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SectionCatalog {
        SectionCatalog::from_ranges(vec![
            SectionRange::new(".data", 0x1000, 0x1100),
            SectionRange::new(".bss", 0x2000, 0x2400),
        ])
        .unwrap()
    }

    #[test]
    fn find_section_half_open() {
        let cat = catalog();
        assert_eq!(cat.find_section(0x1000).unwrap().name, ".data");
        assert_eq!(cat.find_section(0x10ff).unwrap().name, ".data");
        assert!(cat.find_section(0x1100).is_none());
        assert_eq!(cat.find_section(0x23ff).unwrap().name, ".bss");
        assert!(cat.find_section(0xfff).is_none());
    }

    #[test]
    fn every_address_in_range_maps_back() {
        let cat = catalog();
        for range in cat.iter() {
            for addr in (range.start..range.end).step_by(0x11) {
                assert_eq!(cat.find_section(addr), Some(range));
            }
        }
    }

    #[test]
    fn overlapping_ranges_first_wins() {
        let cat = SectionCatalog::from_ranges(vec![
            SectionRange::new(".data", 0x0, 0x40),
            SectionRange::new(".bss", 0x0, 0x100),
        ])
        .unwrap();
        assert_eq!(cat.find_section(0x10).unwrap().name, ".data");
        assert_eq!(cat.find_section(0x80).unwrap().name, ".bss");
    }

    #[test]
    fn empty_catalog_is_fatal() {
        assert!(matches!(
            SectionCatalog::from_ranges(Vec::new()),
            Err(ResolveError::NoDataSections)
        ));
    }

    #[test]
    fn section_names_follow_format() {
        assert_eq!(data_section_names(BinaryFormat::Elf), [".data", ".bss"]);
        assert_eq!(data_section_names(BinaryFormat::MachO), ["__data", "__bss"]);
    }

    #[test]
    fn range_json_uses_hex() {
        let v = SectionRange::new(".data", 0x1000, 0x1100).to_json();
        assert_eq!(v["start"], "0x1000");
        assert_eq!(v["end"], "0x1100");
        assert_eq!(v["size"], 0x100);
    }
}
