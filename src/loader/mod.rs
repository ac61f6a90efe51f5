//! Binary program loader
//!
//! [`load`] turns a raw byte buffer into a [`LoadedProgram`] or a [`LoadError`]
//! describing the first violated rule. Validation runs in a fixed order and
//! stops at the first failure; nothing partially decoded is ever returned.
//!
//! - [`layout`]: named `(offset, width)` fields of the format
//! - [`program`]: the loaded, owned representation
//! - [`writer`]: the inverse direction, assembling functions and code into bytes

pub mod layout;
pub mod program;
pub mod writer;

pub use program::{LoadedProgram, RuntimeFunction};
pub use writer::{BuildError, CodeBuilder, FunctionDef, ProgramBuilder};

use crate::memory::PrimitiveType;
use layout::{function_row, service_info};
use std::fmt;
use tracing::debug;

/// Reasons a buffer is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The buffer ends before a required section
    Truncated {
        section: &'static str,
        needed: usize,
        actual: usize,
    },

    /// The function table is empty or has a negative length
    NoFunctions { count: i32 },

    /// `main_index` does not name a function
    MainIndexOutOfRange { main_index: i32, count: usize },

    /// A count or size field in the header is negative
    NegativeField { field: &'static str, value: i32 },

    /// A function starts outside the code segment
    FunctionAddressOutOfRange {
        function: usize,
        address: i32,
        code_size: usize,
    },

    /// A function's argument description is malformed
    BadArgumentTypes { function: usize, message: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Truncated {
                section,
                needed,
                actual,
            } => {
                write!(
                    f,
                    "Truncated program: {} needs {} bytes, buffer has {}",
                    section, needed, actual
                )
            }
            LoadError::NoFunctions { count } => {
                write!(f, "Program must declare at least one function, got {}", count)
            }
            LoadError::MainIndexOutOfRange { main_index, count } => {
                write!(
                    f,
                    "Main index {} is out of range for {} function{}",
                    main_index,
                    count,
                    if *count == 1 { "" } else { "s" }
                )
            }
            LoadError::NegativeField { field, value } => {
                write!(f, "Field '{}' must not be negative, got {}", field, value)
            }
            LoadError::FunctionAddressOutOfRange {
                function,
                address,
                code_size,
            } => {
                write!(
                    f,
                    "Function {} starts at {}, outside code segment of {} bytes",
                    function, address, code_size
                )
            }
            LoadError::BadArgumentTypes { function, message } => {
                write!(f, "Function {} has invalid arguments: {}", function, message)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Validate and decode a program buffer
pub fn load(bytes: &[u8]) -> Result<LoadedProgram, LoadError> {
    if bytes.len() < service_info::SIZE {
        return Err(LoadError::Truncated {
            section: "service info",
            needed: service_info::SIZE,
            actual: bytes.len(),
        });
    }

    let main_index = service_info::MAIN_INDEX.read_i32(bytes, 0);
    let functions_count = service_info::FUNCTIONS_COUNT.read_i32(bytes, 0);
    let globals_count = service_info::GLOBALS_COUNT.read_i32(bytes, 0);
    let constant_pool_size = service_info::CONSTANT_POOL_SIZE.read_i32(bytes, 0);

    if functions_count <= 0 {
        return Err(LoadError::NoFunctions {
            count: functions_count,
        });
    }
    let functions_count = functions_count as usize;

    if main_index < 0 || main_index as usize >= functions_count {
        return Err(LoadError::MainIndexOutOfRange {
            main_index,
            count: functions_count,
        });
    }

    if globals_count < 0 {
        return Err(LoadError::NegativeField {
            field: "globals_count",
            value: globals_count,
        });
    }
    if constant_pool_size < 0 {
        return Err(LoadError::NegativeField {
            field: "constant_pool_size",
            value: constant_pool_size,
        });
    }

    let table_start = service_info::SIZE;
    let pool_start = functions_count
        .saturating_mul(function_row::SIZE)
        .saturating_add(table_start);
    let code_start = pool_start.saturating_add(constant_pool_size as usize);
    if bytes.len() < code_start {
        return Err(LoadError::Truncated {
            section: "function table and constant pool",
            needed: code_start,
            actual: bytes.len(),
        });
    }
    let code_size = bytes.len() - code_start;

    let functions = (0..functions_count)
        .map(|index| {
            let row = table_start + index * function_row::SIZE;
            decode_function(bytes, row, index, code_size)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let program = LoadedProgram {
        main_index: main_index as usize,
        globals_count: globals_count as usize,
        functions,
        constant_pool: bytes[pool_start..code_start].to_vec(),
        code: bytes[code_start..].to_vec(),
    };

    debug!(
        functions = program.functions.len(),
        globals = program.globals_count,
        pool_bytes = program.constant_pool.len(),
        code_bytes = program.code.len(),
        "loaded program"
    );

    Ok(program)
}

fn decode_function(
    bytes: &[u8],
    row: usize,
    index: usize,
    code_size: usize,
) -> Result<RuntimeFunction, LoadError> {
    let address = function_row::ADDRESS.read_i32(bytes, row);
    if address < 0 || address as usize >= code_size {
        return Err(LoadError::FunctionAddressOutOfRange {
            function: index,
            address,
            code_size,
        });
    }

    let args_count = function_row::ARGS_COUNT.read_i32(bytes, row);
    if args_count < 0 || args_count as usize > function_row::MAX_ARGS {
        return Err(LoadError::BadArgumentTypes {
            function: index,
            message: format!(
                "argument count {} is outside 0..={}",
                args_count,
                function_row::MAX_ARGS
            ),
        });
    }
    let args_count = args_count as usize;

    let bits = function_row::ARG_TYPE_BITS.read_u64(bytes, row);
    let used_bits = args_count * function_row::BITS_PER_ARG;
    if used_bits < 64 && bits >> used_bits != 0 {
        return Err(LoadError::BadArgumentTypes {
            function: index,
            message: format!(
                "type bits 0x{:x} describe more than {} argument(s)",
                bits, args_count
            ),
        });
    }

    // Pairs read upwards from the least significant bit are already in pop order
    let arg_types = (0..args_count)
        .map(|slot| {
            let code = (bits >> (slot * function_row::BITS_PER_ARG)) & 0b11;
            PrimitiveType::from_bits(code).ok_or_else(|| LoadError::BadArgumentTypes {
                function: index,
                message: format!("argument slot {} has type code {:02b}", slot, code),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RuntimeFunction {
        address: address as usize,
        arg_types,
    })
}
