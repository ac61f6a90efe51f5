//! Opcode byte assignments
//!
//! The byte values are a fixed contract with every bytecode producer. Control
//! flow and untyped operations share the non-negative region `0..=23`. Typed
//! operations come in mirrored families: the Int variant of an operation uses
//! a positive byte in `32..=59` and the Byte variant uses its negation.
//!
//! Decoding goes through a 256-entry table built at compile time and indexed
//! by the raw opcode byte.

use crate::memory::PrimitiveType;
use std::fmt;

/// Operations that do not belong to a typed family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlOp {
    Nop = 0,
    Jmp = 1,
    Jz = 2,
    Jnz = 3,
    Call = 4,
    Invoke = 5,
    Ret = 6,
    Crash = 7,
    PushFp = 8,
    AdjustSp = 9,
    Alloc = 10,
    Free = 11,
    MemCopy = 12,
    PushConst = 13,
    OutStr = 14,
    Rndi = 15,
    ByteToInt = 16,
    IntToByte = 17,
    // Host object bridging, not supported by this VM
    HostCall = 18,
    HostNew = 19,
    HostDelete = 20,
    StrToHost = 21,
    ByteToHost = 22,
    IntToHost = 23,
}

impl ControlOp {
    pub const ALL: [ControlOp; 24] = [
        ControlOp::Nop,
        ControlOp::Jmp,
        ControlOp::Jz,
        ControlOp::Jnz,
        ControlOp::Call,
        ControlOp::Invoke,
        ControlOp::Ret,
        ControlOp::Crash,
        ControlOp::PushFp,
        ControlOp::AdjustSp,
        ControlOp::Alloc,
        ControlOp::Free,
        ControlOp::MemCopy,
        ControlOp::PushConst,
        ControlOp::OutStr,
        ControlOp::Rndi,
        ControlOp::ByteToInt,
        ControlOp::IntToByte,
        ControlOp::HostCall,
        ControlOp::HostNew,
        ControlOp::HostDelete,
        ControlOp::StrToHost,
        ControlOp::ByteToHost,
        ControlOp::IntToHost,
    ];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            ControlOp::Nop => "nop",
            ControlOp::Jmp => "jmp",
            ControlOp::Jz => "jz",
            ControlOp::Jnz => "jnz",
            ControlOp::Call => "call",
            ControlOp::Invoke => "invoke",
            ControlOp::Ret => "ret",
            ControlOp::Crash => "crash",
            ControlOp::PushFp => "pushfp",
            ControlOp::AdjustSp => "sp",
            ControlOp::Alloc => "alloc",
            ControlOp::Free => "free",
            ControlOp::MemCopy => "memcpy",
            ControlOp::PushConst => "ldc",
            ControlOp::OutStr => "outs",
            ControlOp::Rndi => "rndi",
            ControlOp::ByteToInt => "b2i",
            ControlOp::IntToByte => "i2b",
            ControlOp::HostCall => "jcall",
            ControlOp::HostNew => "jnew",
            ControlOp::HostDelete => "jdel",
            ControlOp::StrToHost => "stoj",
            ControlOp::ByteToHost => "btoj",
            ControlOp::IntToHost => "itoj",
        }
    }

    /// Whether this is one of the host interop opcodes
    pub const fn is_host_bridge(self) -> bool {
        matches!(
            self,
            ControlOp::HostCall
                | ControlOp::HostNew
                | ControlOp::HostDelete
                | ControlOp::StrToHost
                | ControlOp::ByteToHost
                | ControlOp::IntToHost
        )
    }
}

/// Operations with an Int and a Byte variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypedOp {
    Push = 32,
    Pop = 33,
    Dup = 34,
    Add = 35,
    Sub = 36,
    Mul = 37,
    Div = 38,
    Mod = 39,
    Xor = 40,
    And = 41,
    Or = 42,
    Not = 43,
    Shl = 44,
    Shr = 45,
    Cmp = 46,
    Less = 47,
    LessEq = 48,
    Greater = 49,
    GreaterEq = 50,
    Eq = 51,
    NotEq = 52,
    LoadLocal = 53,
    StoreLocal = 54,
    LoadGlobal = 55,
    StoreGlobal = 56,
    Load = 57,
    Store = 58,
    Out = 59,
}

impl TypedOp {
    pub const ALL: [TypedOp; 28] = [
        TypedOp::Push,
        TypedOp::Pop,
        TypedOp::Dup,
        TypedOp::Add,
        TypedOp::Sub,
        TypedOp::Mul,
        TypedOp::Div,
        TypedOp::Mod,
        TypedOp::Xor,
        TypedOp::And,
        TypedOp::Or,
        TypedOp::Not,
        TypedOp::Shl,
        TypedOp::Shr,
        TypedOp::Cmp,
        TypedOp::Less,
        TypedOp::LessEq,
        TypedOp::Greater,
        TypedOp::GreaterEq,
        TypedOp::Eq,
        TypedOp::NotEq,
        TypedOp::LoadLocal,
        TypedOp::StoreLocal,
        TypedOp::LoadGlobal,
        TypedOp::StoreGlobal,
        TypedOp::Load,
        TypedOp::Store,
        TypedOp::Out,
    ];

    /// Family name without the type suffix
    pub const fn name(self) -> &'static str {
        match self {
            TypedOp::Push => "push",
            TypedOp::Pop => "pop",
            TypedOp::Dup => "dup",
            TypedOp::Add => "add",
            TypedOp::Sub => "sub",
            TypedOp::Mul => "mul",
            TypedOp::Div => "div",
            TypedOp::Mod => "mod",
            TypedOp::Xor => "xor",
            TypedOp::And => "and",
            TypedOp::Or => "or",
            TypedOp::Not => "not",
            TypedOp::Shl => "shl",
            TypedOp::Shr => "shr",
            TypedOp::Cmp => "cmp",
            TypedOp::Less => "less",
            TypedOp::LessEq => "lesseq",
            TypedOp::Greater => "greater",
            TypedOp::GreaterEq => "greatereq",
            TypedOp::Eq => "eq",
            TypedOp::NotEq => "noteq",
            TypedOp::LoadLocal => "loadl",
            TypedOp::StoreLocal => "storel",
            TypedOp::LoadGlobal => "loadg",
            TypedOp::StoreGlobal => "storeg",
            TypedOp::Load => "load",
            TypedOp::Store => "store",
            TypedOp::Out => "out",
        }
    }
}

/// Width of the immediate operand following an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    None,
    Int8,
    Int32,
}

impl Immediate {
    pub const fn width(self) -> usize {
        match self {
            Immediate::None => 0,
            Immediate::Int8 => 1,
            Immediate::Int32 => 4,
        }
    }
}

/// A decoded opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Control(ControlOp),
    Typed(PrimitiveType, TypedOp),
}

static DECODE_TABLE: [Option<Opcode>; 256] = build_decode_table();

const fn build_decode_table() -> [Option<Opcode>; 256] {
    let mut table = [None; 256];

    let mut i = 0;
    while i < ControlOp::ALL.len() {
        let op = ControlOp::ALL[i];
        table[op as u8 as usize] = Some(Opcode::Control(op));
        i += 1;
    }

    let mut i = 0;
    while i < TypedOp::ALL.len() {
        let op = TypedOp::ALL[i];
        table[op as u8 as usize] = Some(Opcode::Typed(PrimitiveType::Int, op));
        table[(-(op as i8)) as u8 as usize] = Some(Opcode::Typed(PrimitiveType::Byte, op));
        i += 1;
    }

    table
}

impl Opcode {
    pub const fn int(op: TypedOp) -> Self {
        Opcode::Typed(PrimitiveType::Int, op)
    }

    pub const fn byte(op: TypedOp) -> Self {
        Opcode::Typed(PrimitiveType::Byte, op)
    }

    /// Decode a raw opcode byte
    pub fn decode(byte: u8) -> Option<Opcode> {
        DECODE_TABLE[byte as usize]
    }

    /// The raw byte this opcode is encoded as
    pub const fn to_byte(self) -> u8 {
        match self {
            Opcode::Control(op) => op as u8,
            Opcode::Typed(PrimitiveType::Int, op) => op as u8,
            Opcode::Typed(PrimitiveType::Byte, op) => (-(op as i8)) as u8,
        }
    }

    pub const fn immediate(self) -> Immediate {
        match self {
            Opcode::Control(
                ControlOp::Jmp
                | ControlOp::Jz
                | ControlOp::Jnz
                | ControlOp::Call
                | ControlOp::Crash
                | ControlOp::AdjustSp
                | ControlOp::PushConst
                | ControlOp::HostCall
                | ControlOp::HostNew,
            ) => Immediate::Int32,
            Opcode::Control(_) => Immediate::None,
            Opcode::Typed(PrimitiveType::Byte, TypedOp::Push) => Immediate::Int8,
            Opcode::Typed(
                _,
                TypedOp::Push
                | TypedOp::LoadLocal
                | TypedOp::StoreLocal
                | TypedOp::LoadGlobal
                | TypedOp::StoreGlobal,
            ) => Immediate::Int32,
            Opcode::Typed(_, _) => Immediate::None,
        }
    }

    /// Every opcode in the table, control region first
    pub fn all() -> impl Iterator<Item = Opcode> {
        ControlOp::ALL
            .into_iter()
            .map(Opcode::Control)
            .chain(TypedOp::ALL.into_iter().map(Opcode::int))
            .chain(TypedOp::ALL.into_iter().map(Opcode::byte))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Control(op) => write!(f, "{}", op.mnemonic()),
            Opcode::Typed(PrimitiveType::Int, op) => write!(f, "{}i", op.name()),
            Opcode::Typed(PrimitiveType::Byte, op) => write!(f, "{}b", op.name()),
        }
    }
}
