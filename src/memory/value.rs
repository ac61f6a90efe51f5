//! Runtime value representation
//!
//! This module defines [`StackEntry`], the unit of data on the VM operand stack
//! and the VM's only externally visible result type, and [`PrimitiveType`], the
//! tag used by function signatures in the program format.
//!
//! # Value Types
//!
//! - [`StackEntry::Int`]: 32-bit signed integer, 4 bytes in memory
//! - [`StackEntry::Byte`]: 8-bit signed integer, 1 byte in memory
//!
//! There is no implicit coercion between the two: typed opcodes pop entries
//! with an exact tag and fault on anything else.

use std::fmt;
use std::str::FromStr;

/// Memory address type (byte offset into the heap buffer)
pub type Address = usize;

/// Primitive types understood by the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Int,
    Byte,
}

impl PrimitiveType {
    /// Size of a value of this type in memory, in bytes
    pub const fn size(self) -> usize {
        match self {
            PrimitiveType::Int => 4,
            PrimitiveType::Byte => 1,
        }
    }

    /// Decode a 2-bit argument type code (`01` = Byte, `10` = Int)
    pub fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0b01 => Some(PrimitiveType::Byte),
            0b10 => Some(PrimitiveType::Int),
            _ => None,
        }
    }

    /// Encode as a 2-bit argument type code
    pub const fn bits(self) -> u64 {
        match self {
            PrimitiveType::Byte => 0b01,
            PrimitiveType::Int => 0b10,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Int => write!(f, "Int"),
            PrimitiveType::Byte => write!(f, "Byte"),
        }
    }
}

/// A typed value on the operand stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackEntry {
    Int(i32),
    Byte(i8),
}

impl StackEntry {
    /// The primitive type tag of this entry
    pub fn kind(&self) -> PrimitiveType {
        match self {
            StackEntry::Int(_) => PrimitiveType::Int,
            StackEntry::Byte(_) => PrimitiveType::Byte,
        }
    }

    /// Get the integer value, returns None if not an Int
    pub fn as_int(&self) -> Option<i32> {
        match self {
            StackEntry::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the byte value, returns None if not a Byte
    pub fn as_byte(&self) -> Option<i8> {
        match self {
            StackEntry::Byte(b) => Some(*b),
            _ => None,
        }
    }

    /// Big-endian memory representation (4 bytes for Int, 1 for Byte)
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            StackEntry::Int(n) => n.to_be_bytes().to_vec(),
            StackEntry::Byte(b) => vec![*b as u8],
        }
    }
}

impl fmt::Display for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackEntry::Int(n) => write!(f, "Int({})", n),
            StackEntry::Byte(b) => write!(f, "Byte({})", b),
        }
    }
}

/// Parses `5`, `int:5` or `byte:5`
impl FromStr for StackEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, digits) = match s.split_once(':') {
            Some((kind, digits)) => (kind.trim().to_ascii_lowercase(), digits.trim()),
            None => ("int".to_string(), s.trim()),
        };

        match kind.as_str() {
            "int" | "i" => digits
                .parse::<i32>()
                .map(StackEntry::Int)
                .map_err(|e| format!("Invalid Int argument '{}': {}", s, e)),
            "byte" | "b" => digits
                .parse::<i8>()
                .map(StackEntry::Byte)
                .map_err(|e| format!("Invalid Byte argument '{}': {}", s, e)),
            other => Err(format!(
                "Unknown argument type '{}' (expected int or byte)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entries() {
        assert_eq!("42".parse::<StackEntry>(), Ok(StackEntry::Int(42)));
        assert_eq!("int:-7".parse::<StackEntry>(), Ok(StackEntry::Int(-7)));
        assert_eq!("byte:12".parse::<StackEntry>(), Ok(StackEntry::Byte(12)));
        assert!("byte:300".parse::<StackEntry>().is_err());
        assert!("float:1".parse::<StackEntry>().is_err());
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(StackEntry::Int(9).as_int(), Some(9));
        assert_eq!(StackEntry::Int(9).as_byte(), None);
        assert_eq!(StackEntry::Byte(-2).as_byte(), Some(-2));
        assert_eq!(StackEntry::Byte(-2).as_int(), None);
    }

    #[test]
    fn test_type_bits() {
        for t in [PrimitiveType::Int, PrimitiveType::Byte] {
            assert_eq!(PrimitiveType::from_bits(t.bits()), Some(t));
        }
        assert_eq!(PrimitiveType::from_bits(0b00), None);
        assert_eq!(PrimitiveType::from_bits(0b11), None);
    }
}
