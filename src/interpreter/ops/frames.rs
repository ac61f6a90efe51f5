use crate::interpreter::constants::GLOBAL_SLOT_SIZE;
use crate::interpreter::engine::VirtualMachine;
use crate::interpreter::errors::Fault;
use crate::memory::{Address, StackEntry};

impl VirtualMachine<'_> {
    /// Frame pointer of the innermost call
    pub(crate) fn frame_pointer(&self) -> Result<Address, Fault> {
        self.calls
            .current_frame()
            .map(|frame| frame.frame_pointer)
            .ok_or(Fault::NotRunning)
    }

    /// Address of a `width`-byte local at `offset` from the frame pointer
    pub(crate) fn local_address(&self, offset: i32, width: usize) -> Result<Address, Fault> {
        let regions = self.regions()?;
        let frame_pointer = self.frame_pointer()?;
        let address = frame_pointer as i64 + offset as i64;

        if address < regions.frame_base as i64 || address as usize + width > regions.frame_end {
            return Err(Fault::FrameOverflow {
                requested: offset as i64,
                available: regions.frame_end - frame_pointer,
            });
        }
        Ok(address as usize)
    }

    /// Address of global slot `index`
    pub(crate) fn global_address(&self, index: i32) -> Result<Address, Fault> {
        let regions = self.regions()?;
        let count = self.program.globals_count;
        match usize::try_from(index) {
            Ok(slot) if slot < count => Ok(regions.globals_base + slot * GLOBAL_SLOT_SIZE),
            _ => Err(Fault::GlobalIndexOutOfRange { index, count }),
        }
    }

    /// Move the stack pointer by `delta` bytes, staying inside the current frame
    pub(crate) fn adjust_stack_pointer(&mut self, delta: i32) -> Result<(), Fault> {
        let regions = self.regions()?;
        let floor = self.frame_pointer()?;
        let target = self.sp as i64 + delta as i64;

        if target < floor as i64 || target > regions.frame_end as i64 {
            return Err(Fault::FrameOverflow {
                requested: delta as i64,
                available: regions.frame_end - self.sp,
            });
        }
        self.sp = target as usize;
        Ok(())
    }

    /// Pop an Int and interpret it as a heap address or size
    pub(crate) fn pop_address(&mut self) -> Result<Address, Fault> {
        let value = self.operands.pop_int()?;
        usize::try_from(value).map_err(|_| Fault::InvalidAddress { value })
    }

    /// Push a heap address as an Int
    pub(crate) fn push_address(&mut self, address: Address) -> Result<(), Fault> {
        self.operands.push(StackEntry::Int(address_to_int(address)?))
    }
}

fn address_to_int(address: Address) -> Result<i32, Fault> {
    i32::try_from(address).map_err(|_| Fault::AddressOutOfRange { address })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_to_int_reports_address() {
        assert_eq!(address_to_int(4096), Ok(4096));

        let address = i32::MAX as usize + 1;
        assert_eq!(address_to_int(address), Err(Fault::AddressOutOfRange { address }));
    }
}
