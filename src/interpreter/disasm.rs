//! Linear disassembly of a code section
//!
//! Used by the inspector's program pane. Decoding never fails: unknown bytes
//! become single-byte `.byte` entries and a truncated immediate is shown as
//! such, mirroring the faults the VM would raise at those offsets.

use super::opcodes::{Immediate, Opcode};
use std::fmt;

/// Operand decoded from the bytes following an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Int8(i8),
    Int32(i32),
    /// Fewer bytes remained than the opcode needs
    Truncated,
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub raw: u8,
    /// `None` for bytes outside the opcode table
    pub opcode: Option<Opcode>,
    pub operand: Operand,
}

impl Instruction {
    /// Encoded length in bytes
    pub fn size(&self) -> usize {
        match (self.opcode, self.operand) {
            (Some(opcode), Operand::Int8(_) | Operand::Int32(_)) => 1 + opcode.immediate().width(),
            _ => 1,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}  ", self.offset)?;
        let Some(opcode) = self.opcode else {
            return write!(f, ".byte {:#04x}", self.raw);
        };
        match self.operand {
            Operand::None => write!(f, "{}", opcode)?,
            Operand::Int8(value) => write!(f, "{} {}", opcode, value)?,
            Operand::Int32(value) => write!(f, "{} {}", opcode, value)?,
            Operand::Truncated => write!(f, "{} <truncated>", opcode)?,
        }
        if let Opcode::Control(op) = opcode {
            if op.is_host_bridge() {
                write!(f, "  ; unsupported")?;
            }
        }
        Ok(())
    }
}

/// Decode `code` from offset 0 to the end
pub fn disassemble(code: &[u8]) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut offset = 0;

    while offset < code.len() {
        let raw = code[offset];
        let opcode = Opcode::decode(raw);
        let rest = &code[offset + 1..];

        let operand = match opcode.map(Opcode::immediate) {
            None | Some(Immediate::None) => Operand::None,
            Some(Immediate::Int8) => match rest.first() {
                Some(&byte) => Operand::Int8(byte as i8),
                None => Operand::Truncated,
            },
            Some(Immediate::Int32) => match rest.get(..4) {
                Some(bytes) => {
                    let mut word = [0u8; 4];
                    word.copy_from_slice(bytes);
                    Operand::Int32(i32::from_be_bytes(word))
                }
                None => Operand::Truncated,
            },
        };

        let instruction = Instruction {
            offset,
            raw,
            opcode,
            operand,
        };
        offset += match operand {
            Operand::Truncated => code.len() - offset,
            _ => instruction.size(),
        };
        instructions.push(instruction);
    }

    instructions
}
