//! Loaded program representation

use crate::memory::PrimitiveType;

/// A function table entry resolved for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFunction {
    /// Offset of the first instruction in the code segment
    pub address: usize,
    /// Argument types in pop order (last declared argument first)
    pub arg_types: Vec<PrimitiveType>,
}

impl RuntimeFunction {
    /// Bytes of frame storage taken by the arguments
    pub fn args_size(&self) -> usize {
        self.arg_types.iter().map(|t| t.size()).sum()
    }

    /// Argument types in declaration order
    pub fn declared_arg_types(&self) -> impl Iterator<Item = PrimitiveType> + '_ {
        self.arg_types.iter().rev().copied()
    }
}

/// A validated program, independent of the buffer it was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgram {
    pub main_index: usize,
    pub globals_count: usize,
    pub functions: Vec<RuntimeFunction>,
    pub constant_pool: Vec<u8>,
    pub code: Vec<u8>,
}

impl LoadedProgram {
    /// The entry point function
    pub fn main(&self) -> Option<&RuntimeFunction> {
        self.functions.get(self.main_index)
    }

    pub fn function(&self, index: usize) -> Option<&RuntimeFunction> {
        self.functions.get(index)
    }
}
