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

//! Location expression evaluator.
//!
//! Only the slice of DWARF expressions that static data locations use in split/indexed
//! DWARF 5 output is understood: constants, `DW_OP_plus` and `DW_OP_addrx`. Everything else
//! decodes to [`Op::Unsupported`] so the caller can tell "can't evaluate this variable" apart
//! from a broken expression.

use gimli::{DwOp, Encoding, Operation, Reader, ReaderOffset};

use crate::addr_table::AddressTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    PushConstant(i64),
    Add,
    /// Index into the `.debug_addr` table.
    IndirectAddress(u64),
    Unsupported(DwOp),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("insufficient operands: need {needed}, stack has {found}")]
    StackUnderflow { needed: usize, found: usize },
    #[error("address index {index} out of bounds ({len} entries)")]
    IndexOutOfBounds { index: u64, len: usize },
    #[error("unsupported operation {0}")]
    Unsupported(DwOp),
    #[error("operand stack is empty after evaluation")]
    EmptyStack,
    #[error("expression left {0} values on the stack")]
    Ambiguous(usize),
    #[error("malformed expression: {0}")]
    Malformed(String),
}

impl EvalError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, EvalError::Unsupported(_))
    }
}

/// Decode raw expression bytecode into [`Op`]s.
pub fn decode<R: Reader>(mut bytecode: R, encoding: Encoding) -> Result<Vec<Op>, EvalError> {
    let mut ops = Vec::new();
    while !bytecode.is_empty() {
        let opcode = DwOp(
            bytecode
                .clone()
                .read_u8()
                .map_err(|e| EvalError::Malformed(e.to_string()))?,
        );
        let operation = match Operation::parse(&mut bytecode, encoding) {
            Ok(operation) => operation,
            // Opcodes gimli doesn't know have no known operand length; stop here.
            Err(_) if opcode.static_string().is_none() => {
                ops.push(Op::Unsupported(opcode));
                break;
            }
            Err(e) => return Err(EvalError::Malformed(format!("{}: {}", opcode, e))),
        };

        ops.push(match operation {
            Operation::SignedConstant { value } => Op::PushConstant(value),
            Operation::UnsignedConstant { value } => Op::PushConstant(value as i64),
            Operation::Plus => Op::Add,
            Operation::AddressIndex { index } => Op::IndirectAddress(index.0.into_u64()),
            _ => Op::Unsupported(opcode),
        });
    }
    Ok(ops)
}

/// Run `ops` against a single operand stack. Exactly one value must remain at the end.
pub fn evaluate(ops: &[Op], table: &AddressTable) -> Result<u64, EvalError> {
    let mut stack: Vec<i64> = Vec::with_capacity(ops.len());

    for op in ops {
        match *op {
            Op::PushConstant(value) => stack.push(value),
            Op::Add => {
                let found = stack.len();
                match (stack.pop(), stack.pop()) {
                    (Some(a), Some(b)) => stack.push(a.wrapping_add(b)),
                    _ => return Err(EvalError::StackUnderflow { needed: 2, found }),
                }
            }
            Op::IndirectAddress(index) => {
                let address = table.get(index).ok_or(EvalError::IndexOutOfBounds {
                    index,
                    len: table.len(),
                })?;
                stack.push(address as i64);
            }
            Op::Unsupported(opcode) => return Err(EvalError::Unsupported(opcode)),
        }
    }

    match stack.as_slice() {
        [] => Err(EvalError::EmptyStack),
        [value] => Ok(*value as u64),
        values => Err(EvalError::Ambiguous(values.len())),
    }
}
