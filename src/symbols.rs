use std::collections::BTreeMap;

use object::{Object, ObjectSymbol, SymbolKind};

use crate::memory::SectionCatalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSymbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub scope: SymbolScope,
}

/// Data objects from the ELF symbol table, keyed by start address.
///
/// Only consulted when the DWARF scan comes up empty, to point at the object that owns an
/// address even if its debug info was stripped or unevaluable.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols_by_addr: BTreeMap<u64, DataSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect sized data symbols that land inside one of the catalog's sections.
    pub fn from_object(obj_file: &object::File, sections: &SectionCatalog) -> Self {
        let mut table = Self::new();
        for sym in obj_file.symbols() {
            if sym.kind() != SymbolKind::Data || sym.size() == 0 {
                continue;
            }
            let Ok(name) = sym.name() else {
                continue;
            };
            if name.is_empty() || sections.find_section(sym.address()).is_none() {
                continue;
            }
            table.insert(DataSymbol {
                name: name.to_string(),
                address: sym.address(),
                size: sym.size(),
                scope: if sym.is_global() {
                    SymbolScope::Global
                } else {
                    SymbolScope::Static
                },
            });
        }
        log::debug!("Collected {} data symbols", table.len());
        table
    }

    pub fn insert(&mut self, symbol: DataSymbol) {
        // Aliases at one address: keep the global name.
        match self.symbols_by_addr.get(&symbol.address) {
            Some(existing)
                if existing.scope == SymbolScope::Global && symbol.scope != SymbolScope::Global => {}
            _ => {
                self.symbols_by_addr.insert(symbol.address, symbol);
            }
        }
    }

    /// Find the symbol that contains the given address
    pub fn lookup(&self, address: u64) -> Option<&DataSymbol> {
        // Largest start address <= address.
        let (&start, symbol) = self.symbols_by_addr.range(..=address).next_back()?;
        (address - start < symbol.size).then_some(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols_by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols_by_addr.is_empty()
    }
}
