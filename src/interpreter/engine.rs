// Execution engine for the virtual machine

use super::config::VmConfig;
use super::constants::GLOBAL_SLOT_SIZE;
use super::errors::{Fault, VmError};
use super::host::{CrashHandler, IoSink};
use super::opcodes::Opcode;
use crate::loader::LoadedProgram;
use crate::memory::stack::{CallStack, OperandStack, StackFrame};
use crate::memory::{Address, Heap, HeapError, PrimitiveType, StackEntry};
use rand_core::{OsRng, RngCore};
use tracing::{debug, info, instrument, trace, warn};

/// Lifecycle of a VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmState {
    /// Nothing has run yet
    Ready,
    /// A run is in progress; `step` executes the next instruction
    Running,
    /// `main` returned this value
    Completed(StackEntry),
    /// The program executed `crash <code>`
    Crashed(i32),
    /// The run stopped on a fault or heap failure
    Faulted(VmError),
}

/// Result of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    Running,
    Completed(StackEntry),
}

/// Internal failure signal; converted to [`VmError`] with the faulting `ip`
#[derive(Debug)]
pub(crate) enum Trap {
    Fault(Fault),
    Heap(HeapError),
    Crash(i32),
}

impl From<Fault> for Trap {
    fn from(fault: Fault) -> Self {
        Trap::Fault(fault)
    }
}

impl From<HeapError> for Trap {
    fn from(error: HeapError) -> Self {
        Trap::Heap(error)
    }
}

/// Heap regions reserved for the duration of a run
#[derive(Debug, Clone, Copy)]
pub(crate) struct Regions {
    pub frame_base: Address,
    pub frame_end: Address,
    pub globals_base: Address,
    pub pool_base: Address,
}

/// The stack-machine interpreter
///
/// Borrows the heap and both host collaborators; the program is owned for the
/// VM's lifetime and may be run any number of times.
pub struct VirtualMachine<'a> {
    pub(super) program: LoadedProgram,
    pub(super) heap: &'a mut Heap,
    pub(super) io: &'a mut dyn IoSink,
    pub(super) crash_handler: &'a mut dyn CrashHandler,
    pub(super) rng: Box<dyn RngCore + 'a>,
    pub(super) config: VmConfig,

    pub(super) operands: OperandStack,
    pub(super) calls: CallStack,

    /// Offset of the next byte to fetch
    pub(super) ip: usize,
    /// Offset of the instruction being executed
    pub(super) current_ip: usize,
    /// First free byte of the frame region
    pub(super) sp: Address,

    pub(super) regions: Option<Regions>,
    reserved: Vec<Address>,
    state: VmState,
}

impl<'a> VirtualMachine<'a> {
    pub fn new(
        program: LoadedProgram,
        heap: &'a mut Heap,
        io: &'a mut dyn IoSink,
        crash_handler: &'a mut dyn CrashHandler,
    ) -> Self {
        let config = VmConfig::default();
        VirtualMachine {
            program,
            heap,
            io,
            crash_handler,
            rng: Box::new(OsRng),
            config,
            operands: OperandStack::new(config.max_operand_depth),
            calls: CallStack::new(config.max_call_depth),
            ip: 0,
            current_ip: 0,
            sp: 0,
            regions: None,
            reserved: Vec::new(),
            state: VmState::Ready,
        }
    }

    /// Replace the execution limits
    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self.operands = OperandStack::new(config.max_operand_depth);
        self.calls = CallStack::new(config.max_call_depth);
        self
    }

    /// Replace the random source used by `rndi`
    pub fn with_rng(mut self, rng: Box<dyn RngCore + 'a>) -> Self {
        self.rng = rng;
        self
    }

    pub fn program(&self) -> &LoadedProgram {
        &self.program
    }

    pub fn heap(&self) -> &Heap {
        &*self.heap
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn stack_pointer(&self) -> Address {
        self.sp
    }

    pub fn operand_stack(&self) -> &OperandStack {
        &self.operands
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.calls
    }

    /// Run `main` with `args` to completion
    #[instrument(skip_all, fields(args = args.len()))]
    pub fn run(&mut self, args: &[StackEntry]) -> Result<StackEntry, VmError> {
        self.start(args)?;
        loop {
            if let VmStatus::Completed(result) = self.step()? {
                return Ok(result);
            }
        }
    }

    /// Reserve runtime memory, push `args` and call `main`.
    ///
    /// Afterwards the VM is [`VmState::Running`] and [`step`](Self::step)
    /// executes the program one instruction at a time.
    pub fn start(&mut self, args: &[StackEntry]) -> Result<(), VmError> {
        self.release();
        self.operands.clear();
        self.calls.clear();
        self.ip = 0;
        self.current_ip = 0;
        self.state = VmState::Running;

        let outcome = self.prepare(args).map(|_| VmStatus::Running);
        self.conclude(outcome).map(|_| ())
    }

    fn prepare(&mut self, args: &[StackEntry]) -> Result<(), Trap> {
        let frame_size = self.config.frame_stack_size;
        let globals_size = self.program.globals_count.saturating_mul(GLOBAL_SLOT_SIZE);
        let pool_size = self.program.constant_pool.len();

        let frame_base = self.reserve(frame_size)?;
        let globals_base = self.reserve(globals_size)?;
        let pool_base = self.reserve(pool_size)?;
        self.heap.copy_in(pool_base, &self.program.constant_pool)?;

        self.regions = Some(Regions {
            frame_base,
            frame_end: frame_base + frame_size,
            globals_base,
            pool_base,
        });
        self.sp = frame_base;

        for arg in args {
            self.operands.push(*arg)?;
        }

        self.ip = self.program.code.len();
        self.call_function(self.program.main_index as i32)
    }

    /// Allocate a zeroed region that is released when the run ends
    fn reserve(&mut self, size: usize) -> Result<Address, Trap> {
        let address = self.heap.allocate(size)?;
        self.reserved.push(address);
        self.heap.copy_in(address, &vec![0; size])?;
        Ok(address)
    }

    fn release(&mut self) {
        for address in self.reserved.drain(..) {
            if let Err(error) = self.heap.free(address) {
                warn!(%error, "failed to release runtime region");
            }
        }
        self.regions = None;
    }

    /// Execute a single instruction
    pub fn step(&mut self) -> Result<VmStatus, VmError> {
        if self.state != VmState::Running {
            return Err(VmError::Fault {
                fault: Fault::NotRunning,
                ip: self.ip,
            });
        }

        self.current_ip = self.ip;
        let outcome = self.dispatch();
        self.conclude(outcome)
    }

    /// Record terminal states and release runtime memory when a run ends
    fn conclude(&mut self, outcome: Result<VmStatus, Trap>) -> Result<VmStatus, VmError> {
        let result = match outcome {
            Ok(VmStatus::Running) => return Ok(VmStatus::Running),
            Ok(VmStatus::Completed(result)) => {
                info!(%result, "program completed");
                self.state = VmState::Completed(result);
                Ok(VmStatus::Completed(result))
            }
            Err(Trap::Crash(code)) => {
                self.state = VmState::Crashed(code);
                Err(VmError::Crashed { code })
            }
            Err(Trap::Fault(fault)) => {
                let error = VmError::Fault {
                    fault,
                    ip: self.current_ip,
                };
                warn!(%error, "program faulted");
                self.state = VmState::Faulted(error.clone());
                Err(error)
            }
            Err(Trap::Heap(source)) => {
                let error = VmError::Heap {
                    source,
                    ip: self.current_ip,
                };
                warn!(%error, "heap operation failed");
                self.state = VmState::Faulted(error.clone());
                Err(error)
            }
        };

        self.release();
        result
    }

    fn dispatch(&mut self) -> Result<VmStatus, Trap> {
        let byte = self.fetch_u8()?;
        let opcode = Opcode::decode(byte).ok_or(Fault::UnknownOpcode { opcode: byte })?;
        trace!(ip = self.current_ip, %opcode, depth = self.operands.depth(), "dispatch");

        match opcode {
            Opcode::Control(op) => self.execute_control(op),
            Opcode::Typed(PrimitiveType::Int, op) => {
                self.execute_typed::<i32>(op)?;
                Ok(VmStatus::Running)
            }
            Opcode::Typed(PrimitiveType::Byte, op) => {
                self.execute_typed::<i8>(op)?;
                Ok(VmStatus::Running)
            }
        }
    }

    fn fetch<const N: usize>(&mut self) -> Result<[u8; N], Fault> {
        let code_size = self.program.code.len();
        if self.ip >= code_size {
            return Err(Fault::InstructionPointerOutOfRange {
                ip: self.ip,
                code_size,
            });
        }
        let available = code_size - self.ip;
        if available < N {
            return Err(Fault::TruncatedOperand {
                needed: N,
                available,
            });
        }

        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.program.code[self.ip..self.ip + N]);
        self.ip += N;
        Ok(bytes)
    }

    pub(crate) fn fetch_u8(&mut self) -> Result<u8, Fault> {
        Ok(self.fetch::<1>()?[0])
    }

    pub(crate) fn fetch_i8(&mut self) -> Result<i8, Fault> {
        Ok(i8::from_be_bytes(self.fetch::<1>()?))
    }

    pub(crate) fn fetch_i32(&mut self) -> Result<i32, Fault> {
        Ok(i32::from_be_bytes(self.fetch::<4>()?))
    }

    pub(crate) fn regions(&self) -> Result<Regions, Fault> {
        self.regions.ok_or(Fault::NotRunning)
    }

    /// Pop arguments into a new frame and jump to function `index`
    pub(crate) fn call_function(&mut self, index: i32) -> Result<(), Trap> {
        let regions = self.regions()?;
        let count = self.program.functions.len();
        let function = usize::try_from(index)
            .ok()
            .and_then(|i| self.program.functions.get(i))
            .ok_or(Fault::FunctionIndexOutOfRange { index, count })?;

        let frame_pointer = self.sp;
        let args_size = function.args_size();
        if frame_pointer + args_size > regions.frame_end {
            return Err(Fault::FrameOverflow {
                requested: args_size as i64,
                available: regions.frame_end - frame_pointer,
            }
            .into());
        }

        // Types are in pop order, so fill the argument area from its end
        let mut offset = args_size;
        for &kind in &function.arg_types {
            let entry = self.operands.pop_typed(kind)?;
            offset -= kind.size();
            self.heap.copy_in(frame_pointer + offset, &entry.to_bytes())?;
        }

        let address = function.address;
        self.calls.push_frame(StackFrame {
            frame_pointer,
            previous_stack_pointer: self.sp,
            return_address: self.ip,
        })?;
        self.sp = frame_pointer + args_size;
        self.ip = address;

        debug!(function = index, frame_pointer, depth = self.calls.depth(), "call");
        Ok(())
    }

    /// Pop the current frame; returns the result when `main` returns
    pub(crate) fn return_from_function(&mut self) -> Result<VmStatus, Trap> {
        let frame = self.calls.pop_frame().ok_or(Fault::NotRunning)?;
        self.sp = frame.previous_stack_pointer;

        if self.calls.is_empty() {
            let result = self.operands.pop()?;
            return Ok(VmStatus::Completed(result));
        }

        self.ip = frame.return_address;
        debug!(return_address = self.ip, depth = self.calls.depth(), "ret");
        Ok(VmStatus::Running)
    }
}

impl Drop for VirtualMachine<'_> {
    fn drop(&mut self) {
        // A run abandoned between steps still holds its regions
        self.release();
    }
}
