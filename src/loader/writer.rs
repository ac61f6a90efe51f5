//! Program assembly helpers
//!
//! [`ProgramBuilder`] produces buffers in the format [`load`](super::load)
//! accepts and [`CodeBuilder`] emits instructions with forward and backward
//! jump labels. Both are used by the test suites and by embedders that
//! generate bytecode directly.

use super::layout::{function_row, service_info};
use crate::interpreter::constants::STRING_LENGTH_SIZE;
use crate::interpreter::opcodes::{ControlOp, Immediate, Opcode, TypedOp};
use crate::memory::PrimitiveType;
use rustc_hash::FxHashMap;
use std::fmt;

/// A function table row before encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub address: i32,
    /// Argument types in declaration order
    pub arg_types: Vec<PrimitiveType>,
}

impl FunctionDef {
    pub fn new(address: usize, arg_types: &[PrimitiveType]) -> Self {
        FunctionDef {
            address: address as i32,
            arg_types: arg_types.to_vec(),
        }
    }

    /// Pack the argument types, last declared argument in the lowest bits
    pub fn type_bits(&self) -> u64 {
        self.arg_types
            .iter()
            .fold(0u64, |acc, kind| (acc << function_row::BITS_PER_ARG) | kind.bits())
    }
}

/// Assembles a complete program buffer
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    main_index: i32,
    globals_count: i32,
    functions: Vec<FunctionDef>,
    constant_pool: Vec<u8>,
    code: Vec<u8>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn main(&mut self, index: usize) -> &mut Self {
        self.main_index = index as i32;
        self
    }

    pub fn globals(&mut self, count: usize) -> &mut Self {
        self.globals_count = count as i32;
        self
    }

    /// Append a function and return its index
    pub fn function(&mut self, def: FunctionDef) -> usize {
        self.functions.push(def);
        self.functions.len() - 1
    }

    /// Append raw bytes to the constant pool and return their offset
    pub fn constant(&mut self, bytes: &[u8]) -> i32 {
        let offset = self.constant_pool.len() as i32;
        self.constant_pool.extend_from_slice(bytes);
        offset
    }

    /// Append a length-prefixed string as read by `outs`
    pub fn string_constant(&mut self, text: &str) -> i32 {
        let mut prefix = [0u8; STRING_LENGTH_SIZE];
        prefix.copy_from_slice(&(text.len() as i32).to_be_bytes());
        let offset = self.constant(&prefix);
        self.constant_pool.extend_from_slice(text.as_bytes());
        offset
    }

    pub fn code(&mut self, code: Vec<u8>) -> &mut Self {
        self.code = code;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let table_size = self.functions.len() * function_row::SIZE;
        let mut bytes = vec![0u8; service_info::SIZE + table_size];

        service_info::MAIN_INDEX.write_i32(&mut bytes, 0, self.main_index);
        service_info::FUNCTIONS_COUNT.write_i32(&mut bytes, 0, self.functions.len() as i32);
        service_info::GLOBALS_COUNT.write_i32(&mut bytes, 0, self.globals_count);
        service_info::CONSTANT_POOL_SIZE.write_i32(&mut bytes, 0, self.constant_pool.len() as i32);

        for (index, def) in self.functions.iter().enumerate() {
            let row = service_info::SIZE + index * function_row::SIZE;
            function_row::ADDRESS.write_i32(&mut bytes, row, def.address);
            function_row::ARGS_COUNT.write_i32(&mut bytes, row, def.arg_types.len() as i32);
            function_row::ARG_TYPE_BITS.write_u64(&mut bytes, row, def.type_bits());
        }

        bytes.extend_from_slice(&self.constant_pool);
        bytes.extend_from_slice(&self.code);
        bytes
    }
}

/// Label resolution failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    UndefinedLabel(String),
    DuplicateLabel(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UndefinedLabel(name) => write!(f, "Undefined label '{}'", name),
            BuildError::DuplicateLabel(name) => write!(f, "Label '{}' defined twice", name),
        }
    }
}

impl std::error::Error for BuildError {}

/// Emits a code segment
#[derive(Debug, Clone, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    labels: FxHashMap<String, usize>,
    /// Immediate positions waiting for a label address
    fixups: Vec<(usize, String)>,
    duplicate: Option<String>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction is emitted at
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Emit an opcode without an immediate
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        debug_assert_eq!(opcode.immediate(), Immediate::None, "{} takes an immediate", opcode);
        self.code.push(opcode.to_byte());
        self
    }

    pub fn control(&mut self, op: ControlOp) -> &mut Self {
        self.op(Opcode::Control(op))
    }

    pub fn int(&mut self, op: TypedOp) -> &mut Self {
        self.op(Opcode::int(op))
    }

    pub fn byte(&mut self, op: TypedOp) -> &mut Self {
        self.op(Opcode::byte(op))
    }

    /// Emit an opcode followed by a 4-byte immediate
    pub fn op_i32(&mut self, opcode: Opcode, value: i32) -> &mut Self {
        debug_assert_eq!(opcode.immediate(), Immediate::Int32, "{} takes no Int immediate", opcode);
        self.code.push(opcode.to_byte());
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn push_int(&mut self, value: i32) -> &mut Self {
        self.op_i32(Opcode::int(TypedOp::Push), value)
    }

    pub fn push_byte(&mut self, value: i8) -> &mut Self {
        self.code.push(Opcode::byte(TypedOp::Push).to_byte());
        self.code.push(value as u8);
        self
    }

    pub fn call(&mut self, function: usize) -> &mut Self {
        self.op_i32(Opcode::Control(ControlOp::Call), function as i32)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.control(ControlOp::Ret)
    }

    /// Bind `name` to the current position
    pub fn label(&mut self, name: &str) -> &mut Self {
        let position = self.position();
        if self.labels.insert(name.to_string(), position).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name.to_string());
        }
        self
    }

    /// Emit `jmp`, `jz` or `jnz` to a label resolved in [`finish`](Self::finish)
    pub fn jump(&mut self, op: ControlOp, label: &str) -> &mut Self {
        self.code.push(op as u8);
        self.fixups.push((self.code.len(), label.to_string()));
        self.code.extend_from_slice(&0i32.to_be_bytes());
        self
    }

    /// Append raw bytes, e.g. to produce deliberately malformed code
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn finish(mut self) -> Result<Vec<u8>, BuildError> {
        if let Some(name) = self.duplicate {
            return Err(BuildError::DuplicateLabel(name));
        }
        for (at, name) in &self.fixups {
            let target = self
                .labels
                .get(name)
                .ok_or_else(|| BuildError::UndefinedLabel(name.clone()))?;
            self.code[*at..*at + 4].copy_from_slice(&(*target as i32).to_be_bytes());
        }
        Ok(self.code)
    }
}
