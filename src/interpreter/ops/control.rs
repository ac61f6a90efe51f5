use crate::interpreter::constants::STRING_LENGTH_SIZE;
use crate::interpreter::engine::{Trap, VirtualMachine, VmStatus};
use crate::interpreter::errors::Fault;
use crate::interpreter::opcodes::ControlOp;
use crate::memory::StackEntry;
use tracing::debug;

impl VirtualMachine<'_> {
    pub(crate) fn execute_control(&mut self, op: ControlOp) -> Result<VmStatus, Trap> {
        match op {
            ControlOp::Nop => {}

            ControlOp::Jmp => {
                let target = self.fetch_i32()?;
                self.jump(target)?;
            }
            ControlOp::Jz | ControlOp::Jnz => {
                let target = self.fetch_i32()?;
                let condition = self.operands.pop_int()?;
                if (condition == 0) == (op == ControlOp::Jz) {
                    self.jump(target)?;
                }
            }

            ControlOp::Call => {
                let index = self.fetch_i32()?;
                self.call_function(index)?;
            }
            ControlOp::Invoke => {
                let index = self.operands.pop_int()?;
                self.call_function(index)?;
            }
            ControlOp::Ret => return self.return_from_function(),
            ControlOp::Crash => {
                let code = self.fetch_i32()?;
                self.crash_handler.handle_crash(code);
                return Err(Trap::Crash(code));
            }

            ControlOp::PushFp => {
                let frame_pointer = self.frame_pointer()?;
                self.push_address(frame_pointer)?;
            }
            ControlOp::AdjustSp => {
                let delta = self.fetch_i32()?;
                self.adjust_stack_pointer(delta)?;
            }

            ControlOp::Alloc => {
                let size = self.pop_address()?;
                let address = self.heap.allocate(size)?;
                debug!(size, address, "alloc");
                self.push_address(address)?;
            }
            ControlOp::Free => {
                let address = self.pop_address()?;
                self.heap.free(address)?;
                debug!(address, "free");
            }
            ControlOp::MemCopy => {
                let count = self.pop_address()?;
                let destination = self.pop_address()?;
                let source = self.pop_address()?;
                self.heap.copy_memory(source, destination, count)?;
            }

            ControlOp::PushConst => {
                let offset = self.fetch_i32()?;
                let size = self.program.constant_pool.len();
                let regions = self.regions()?;
                match usize::try_from(offset) {
                    Ok(off) if off < size => self.push_address(regions.pool_base + off)?,
                    _ => return Err(Fault::ConstantOutOfRange { offset, size }.into()),
                }
            }
            ControlOp::OutStr => {
                let address = self.pop_address()?;
                let length = self.heap.read_int(address)?;
                let length =
                    usize::try_from(length).map_err(|_| Fault::InvalidAddress { value: length })?;
                let mut bytes = vec![0u8; length];
                self.heap.copy_out(address + STRING_LENGTH_SIZE, &mut bytes)?;
                self.io.print(&String::from_utf8_lossy(&bytes));
            }
            ControlOp::Rndi => {
                let value = self.rng.next_u32() as i32;
                self.operands.push(StackEntry::Int(value))?;
            }

            ControlOp::ByteToInt => {
                let value = self.operands.pop_byte()?;
                self.operands.push(StackEntry::Int(value as i32))?;
            }
            ControlOp::IntToByte => {
                let value = self.operands.pop_int()?;
                self.operands.push(StackEntry::Byte(value as i8))?;
            }

            ControlOp::HostCall
            | ControlOp::HostNew
            | ControlOp::HostDelete
            | ControlOp::StrToHost
            | ControlOp::ByteToHost
            | ControlOp::IntToHost => {
                return Err(Fault::Unsupported {
                    mnemonic: op.mnemonic(),
                }
                .into());
            }
        }

        Ok(VmStatus::Running)
    }

    /// Out-of-range targets fault on the next fetch
    fn jump(&mut self, target: i32) -> Result<(), Fault> {
        self.ip = usize::try_from(target).map_err(|_| Fault::InstructionPointerOutOfRange {
            ip: self.current_ip,
            code_size: self.program.code.len(),
        })?;
        Ok(())
    }
}
