//! Byte layout of the binary program format
//!
//! ```text
//! [0)  main_index          : i32
//! [4)  functions_count     : i32
//! [8)  globals_count       : i32
//! [12) constant_pool_size  : i32
//! [16) function table      : functions_count rows of 16 bytes
//!      [0)  address        : i32
//!      [4)  args_count     : i32
//!      [8)  arg_type_bits  : u64, 2 bits per argument, last argument lowest
//! [..) constant pool       : constant_pool_size bytes
//! [..) bytecode            : remaining bytes
//! ```
//!
//! All integers are big-endian.

/// A fixed-width field at a fixed offset within a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(offset: usize, width: usize) -> Self {
        Field { offset, width }
    }

    fn slice<'a>(&self, bytes: &'a [u8], base: usize) -> &'a [u8] {
        let start = base + self.offset;
        &bytes[start..start + self.width]
    }

    /// Read this 4-byte field from the record starting at `base`.
    ///
    /// The caller has already checked that the record lies within `bytes`.
    pub fn read_i32(&self, bytes: &[u8], base: usize) -> i32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.slice(bytes, base));
        i32::from_be_bytes(buf)
    }

    /// Read this 8-byte field from the record starting at `base`
    pub fn read_u64(&self, bytes: &[u8], base: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.slice(bytes, base));
        u64::from_be_bytes(buf)
    }

    /// Write a 4-byte value into the record starting at `base`
    pub fn write_i32(&self, bytes: &mut [u8], base: usize, value: i32) {
        let start = base + self.offset;
        bytes[start..start + self.width].copy_from_slice(&value.to_be_bytes());
    }

    /// Write an 8-byte value into the record starting at `base`
    pub fn write_u64(&self, bytes: &mut [u8], base: usize, value: u64) {
        let start = base + self.offset;
        bytes[start..start + self.width].copy_from_slice(&value.to_be_bytes());
    }
}

/// Fixed-size header at the start of every program
pub mod service_info {
    use super::Field;

    pub const MAIN_INDEX: Field = Field::new(0, 4);
    pub const FUNCTIONS_COUNT: Field = Field::new(4, 4);
    pub const GLOBALS_COUNT: Field = Field::new(8, 4);
    pub const CONSTANT_POOL_SIZE: Field = Field::new(12, 4);

    pub const SIZE: usize = 16;
}

/// One row of the function table
pub mod function_row {
    use super::Field;

    pub const ADDRESS: Field = Field::new(0, 4);
    pub const ARGS_COUNT: Field = Field::new(4, 4);
    pub const ARG_TYPE_BITS: Field = Field::new(8, 8);

    pub const SIZE: usize = 16;

    /// Bits used to encode one argument type
    pub const BITS_PER_ARG: usize = 2;

    /// Most arguments a row can describe
    pub const MAX_ARGS: usize = 64 / BITS_PER_ARG;
}
