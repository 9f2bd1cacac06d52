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

//! Errors that abort a resolution run.
//!
//! Anything that only affects a single variable (an unsupported location expression, a type
//! missing its byte size, ...) is not an error here: it is logged and the scan moves on.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a recognized object file: {0}")]
    Object(#[from] object::Error),
    #[error("DWARF parsing error: {0}")]
    Gimli(#[from] gimli::Error),
    #[error("no .data or .bss sections found")]
    NoDataSections,
    #[error("{0} section not found")]
    AddrTableMissing(String),
    #[error("{name} section too small: {size} bytes, header needs {header_size}")]
    AddrTableTruncated {
        name: String,
        size: usize,
        header_size: usize,
    },
}

pub type Result<T> = std::result::Result<T, ResolveError>;
