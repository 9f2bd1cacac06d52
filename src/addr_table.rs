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

//! Manual decoder for the indirect address table (`.debug_addr`).
//!
//! The table is read as one flat array: a short header followed by fixed-width addresses up
//! to the end of the section. There is no entry count on the wire; it falls out of the
//! section size. `DW_OP_addrx` operands index straight into [`AddressTable::entries`].

use gimli::{EndianSlice, Reader, RunTimeEndian};
use log::{info, warn};
use object::{Object, ObjectSection};

use crate::dwarf::{endian_of, section_name};
use crate::errors::{ResolveError, Result};

pub const DEBUG_ADDR: &str = ".debug_addr";

/// Bytes of header actually carrying fields: length(4) + version(2) + addr size(1) + seg size(1).
pub const HEADER_FIELDS_LEN: usize = 8;
/// Header length including padding; entries start right after it.
pub const DEFAULT_HEADER_SIZE: usize = 12;
pub const DEFAULT_ADDRESS_SIZE: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrTableHeader {
    pub unit_length: u32,
    pub version: u16,
    pub address_size: u8,
    pub segment_selector_size: u8,
}

#[derive(Debug, Clone)]
pub struct AddressTable {
    header: AddrTableHeader,
    entries: Vec<u64>,
}

impl AddressTable {
    /// Decode a raw `.debug_addr` section. `header_size` is clamped to at least the 8 bytes of
    /// header fields.
    pub fn decode(data: &[u8], endian: RunTimeEndian, header_size: usize) -> Result<Self> {
        let header_size = header_size.max(HEADER_FIELDS_LEN);
        if data.len() < header_size {
            return Err(ResolveError::AddrTableTruncated {
                name: DEBUG_ADDR.to_string(),
                size: data.len(),
                header_size,
            });
        }

        let mut reader = EndianSlice::new(data, endian);
        let header = AddrTableHeader {
            unit_length: reader.read_u32()?,
            version: reader.read_u16()?,
            address_size: reader.read_u8()?,
            segment_selector_size: reader.read_u8()?,
        };
        info!(
            "Loaded .debug_addr header: Length=0x{:08x}, Version=0x{:04x}, Addr Size={}, Seg Size={}",
            header.unit_length, header.version, header.address_size, header.segment_selector_size
        );

        let width = match header.address_size {
            1 | 2 | 4 | 8 => header.address_size,
            other => {
                warn!(
                    "Unusable address size {} in .debug_addr header, assuming {}",
                    other, DEFAULT_ADDRESS_SIZE
                );
                DEFAULT_ADDRESS_SIZE
            }
        };

        let body = &data[header_size..];
        let count = body.len() / width as usize;
        let trailing = body.len() % width as usize;
        if trailing != 0 {
            warn!(
                "Ignoring {} trailing bytes at the end of .debug_addr",
                trailing
            );
        }

        let mut reader = EndianSlice::new(body, endian);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(reader.read_address(width)?);
        }

        info!("Loaded .debug_addr with {} entries.", entries.len());
        Ok(Self { header, entries })
    }

    pub fn load(obj_file: &object::File, header_size: usize) -> Result<Self> {
        let name = section_name(obj_file.format(), DEBUG_ADDR);
        let section = obj_file
            .section_by_name(&name)
            .ok_or_else(|| ResolveError::AddrTableMissing(name.clone()))?;
        let data = section.uncompressed_data()?;
        Self::decode(&data, endian_of(obj_file), header_size)
    }

    pub fn header(&self) -> &AddrTableHeader {
        &self.header
    }

    pub fn get(&self, index: u64) -> Option<u64> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .copied()
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn table_bytes(header_size: usize, address_size: u8, addrs: &[u64]) -> Vec<u8> {
    let body_len = addrs.len() * address_size as usize;
    let mut out = Vec::with_capacity(header_size + body_len);
    out.extend_from_slice(&((header_size - 4 + body_len) as u32).to_le_bytes());
    out.extend_from_slice(&5u16.to_le_bytes());
    out.push(address_size);
    out.push(0);
    out.resize(header_size, 0);
    for addr in addrs {
        out.extend_from_slice(&addr.to_le_bytes()[..address_size as usize]);
    }
    out
}
