use rand_core::RngCore;
use zvm::interpreter::opcodes::{ControlOp, Opcode, TypedOp};
use zvm::interpreter::{
    Fault, MockTerminal, RecordingCrashHandler, VirtualMachine, VmConfig, VmState, VmStatus,
    VmError,
};
use zvm::loader::{load, CodeBuilder, FunctionDef, ProgramBuilder};
use zvm::memory::PrimitiveType::{Byte, Int};
use zvm::memory::{Heap, HeapError, StackEntry};

struct Run {
    result: Result<StackEntry, VmError>,
    output: String,
    crashes: Vec<i32>,
    heap: Heap,
}

fn config() -> VmConfig {
    VmConfig {
        frame_stack_size: 1024,
        ..VmConfig::default()
    }
}

fn execute(bytes: &[u8], args: &[StackEntry]) -> Run {
    let program = load(bytes).unwrap();
    let mut heap = Heap::new(8 * 1024, 16);
    let mut output = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();

    let result = VirtualMachine::new(program, &mut heap, &mut output, &mut crashes)
        .with_config(config())
        .run(args);

    Run {
        result,
        output: output.text().to_string(),
        crashes: crashes.codes,
        heap,
    }
}

/// A program whose only function is an argument-less `main` at offset 0
fn main_only(code: CodeBuilder) -> Vec<u8> {
    let mut program = ProgramBuilder::new();
    program.function(FunctionDef::new(0, &[]));
    program.globals(2);
    program.code(code.finish().unwrap());
    program.build()
}

fn result_of(code: CodeBuilder) -> StackEntry {
    execute(&main_only(code), &[]).result.unwrap()
}

fn fault_of(code: CodeBuilder) -> (Fault, usize) {
    match execute(&main_only(code), &[]).result {
        Err(VmError::Fault { fault, ip }) => (fault, ip),
        other => panic!("expected a fault, got {:?}", other),
    }
}

fn local(op: TypedOp) -> Opcode {
    Opcode::int(op)
}

#[test]
fn test_int_arithmetic_wraps() {
    let mut code = CodeBuilder::new();
    code.push_int(7).push_int(3).int(TypedOp::Sub).ret();
    assert_eq!(result_of(code), StackEntry::Int(4));

    let mut code = CodeBuilder::new();
    code.push_int(i32::MAX).push_int(1).int(TypedOp::Add).ret();
    assert_eq!(result_of(code), StackEntry::Int(i32::MIN));

    let mut code = CodeBuilder::new();
    code.push_int(-7).push_int(2).int(TypedOp::Div).ret();
    assert_eq!(result_of(code), StackEntry::Int(-3));

    let mut code = CodeBuilder::new();
    code.push_int(-7).push_int(2).int(TypedOp::Mod).ret();
    assert_eq!(result_of(code), StackEntry::Int(-1));
}

#[test]
fn test_bitwise_and_shifts() {
    let mut code = CodeBuilder::new();
    code.push_int(-16).push_int(2).int(TypedOp::Shr).ret();
    assert_eq!(result_of(code), StackEntry::Int(-4));

    // Shift amounts are masked to the operand width
    let mut code = CodeBuilder::new();
    code.push_int(1).push_int(33).int(TypedOp::Shl).ret();
    assert_eq!(result_of(code), StackEntry::Int(2));

    let mut code = CodeBuilder::new();
    code.push_int(0b1100)
        .push_int(0b1010)
        .int(TypedOp::Xor)
        .int(TypedOp::Not)
        .ret();
    assert_eq!(result_of(code), StackEntry::Int(!0b0110));
}

#[test]
fn test_byte_family() {
    let mut code = CodeBuilder::new();
    code.push_byte(100).push_byte(100).byte(TypedOp::Add).ret();
    assert_eq!(result_of(code), StackEntry::Byte(-56));

    let mut code = CodeBuilder::new();
    code.push_byte(-56).control(ControlOp::ByteToInt).ret();
    assert_eq!(result_of(code), StackEntry::Int(-56));

    let mut code = CodeBuilder::new();
    code.push_int(300).control(ControlOp::IntToByte).ret();
    assert_eq!(result_of(code), StackEntry::Byte(44));
}

#[test]
fn test_comparisons_push_int() {
    let mut code = CodeBuilder::new();
    code.push_byte(3).push_byte(5).byte(TypedOp::Less).ret();
    assert_eq!(result_of(code), StackEntry::Int(1));

    let mut code = CodeBuilder::new();
    code.push_int(5).push_int(3).int(TypedOp::Cmp).ret();
    assert_eq!(result_of(code), StackEntry::Int(1));

    let mut code = CodeBuilder::new();
    code.push_int(3).push_int(5).int(TypedOp::Cmp).ret();
    assert_eq!(result_of(code), StackEntry::Int(-1));

    let mut code = CodeBuilder::new();
    code.push_int(4).push_int(4).int(TypedOp::GreaterEq).ret();
    assert_eq!(result_of(code), StackEntry::Int(1));

    let mut code = CodeBuilder::new();
    code.push_byte(4).push_byte(4).byte(TypedOp::NotEq).ret();
    assert_eq!(result_of(code), StackEntry::Int(0));
}

#[test]
fn test_conditional_jumps() {
    let mut code = CodeBuilder::new();
    code.push_int(0)
        .jump(ControlOp::Jnz, "wrong")
        .push_int(0)
        .jump(ControlOp::Jz, "right")
        .label("wrong")
        .push_int(-1)
        .ret()
        .label("right")
        .push_int(1)
        .ret();
    assert_eq!(result_of(code), StackEntry::Int(1));
}

#[test]
fn test_division_by_zero_faults_at_instruction() {
    let mut code = CodeBuilder::new();
    code.push_int(1).push_int(0).int(TypedOp::Div).ret();
    assert_eq!(fault_of(code), (Fault::DivisionByZero, 10));

    let mut code = CodeBuilder::new();
    code.push_byte(1).push_byte(0).byte(TypedOp::Mod).ret();
    assert_eq!(fault_of(code), (Fault::DivisionByZero, 4));
}

#[test]
fn test_type_mismatch_is_fault_not_crash() {
    let mut code = CodeBuilder::new();
    code.push_int(1).push_byte(2).int(TypedOp::Add).ret();

    let run = execute(&main_only(code), &[]);
    assert_eq!(
        run.result,
        Err(VmError::Fault {
            fault: Fault::TypeMismatch {
                expected: Int,
                got: Byte
            },
            ip: 7
        })
    );
    assert!(run.crashes.is_empty());
}

#[test]
fn test_decoding_faults() {
    let mut code = CodeBuilder::new();
    code.raw(&[100]);
    assert_eq!(fault_of(code), (Fault::UnknownOpcode { opcode: 100 }, 0));

    let mut code = CodeBuilder::new();
    code.control(ControlOp::Nop)
        .raw(&[Opcode::int(TypedOp::Push).to_byte(), 0, 0]);
    assert_eq!(
        fault_of(code),
        (
            Fault::TruncatedOperand {
                needed: 4,
                available: 2
            },
            1
        )
    );

    // Running off the end of the code segment
    let mut code = CodeBuilder::new();
    code.control(ControlOp::Nop);
    assert_eq!(
        fault_of(code),
        (
            Fault::InstructionPointerOutOfRange { ip: 1, code_size: 1 },
            1
        )
    );
}

#[test]
fn test_stack_faults() {
    let mut code = CodeBuilder::new();
    code.int(TypedOp::Add);
    assert_eq!(fault_of(code), (Fault::StackUnderflow, 0));

    let mut code = CodeBuilder::new();
    code.label("top").push_int(1).jump(ControlOp::Jmp, "top");
    let (fault, _) = fault_of(code);
    assert_eq!(
        fault,
        Fault::StackOverflow {
            limit: config().max_operand_depth
        }
    );

    let mut code = CodeBuilder::new();
    code.call(0);
    let (fault, _) = fault_of(code);
    assert_eq!(
        fault,
        Fault::CallDepthExceeded {
            limit: config().max_call_depth
        }
    );
}

#[test]
fn test_invoke() {
    let mut program = ProgramBuilder::new();
    let mut code = CodeBuilder::new();
    code.push_int(20).push_int(1).control(ControlOp::Invoke).ret();
    let double = code.position();
    code.op_i32(local(TypedOp::LoadLocal), 0)
        .push_int(2)
        .int(TypedOp::Mul)
        .ret();
    program.function(FunctionDef::new(0, &[]));
    program.function(FunctionDef::new(double, &[Int]));
    program.code(code.finish().unwrap());
    assert_eq!(execute(&program.build(), &[]).result, Ok(StackEntry::Int(40)));

    let mut code = CodeBuilder::new();
    code.push_int(5).control(ControlOp::Invoke).ret();
    assert_eq!(
        fault_of(code),
        (Fault::FunctionIndexOutOfRange { index: 5, count: 1 }, 5)
    );
}

#[test]
fn test_host_bridge_is_unsupported() {
    let mut code = CodeBuilder::new();
    code.control(ControlOp::HostDelete);
    assert_eq!(fault_of(code), (Fault::Unsupported { mnemonic: "jdel" }, 0));
}

#[test]
fn test_out_writes_to_sink() {
    let mut code = CodeBuilder::new();
    code.push_int(-42)
        .int(TypedOp::Out)
        .push_byte(b'A' as i8)
        .byte(TypedOp::Out)
        .push_byte(b'\n' as i8)
        .byte(TypedOp::Out)
        .push_int(0)
        .ret();

    let run = execute(&main_only(code), &[]);
    assert_eq!(run.output, "-42A\n");
}

#[test]
fn test_globals() {
    let mut code = CodeBuilder::new();
    code.push_int(7)
        .op_i32(Opcode::int(TypedOp::StoreGlobal), 1)
        .push_byte(-3)
        .op_i32(Opcode::byte(TypedOp::StoreGlobal), 0)
        .op_i32(Opcode::int(TypedOp::LoadGlobal), 1)
        .op_i32(Opcode::byte(TypedOp::LoadGlobal), 0)
        .control(ControlOp::ByteToInt)
        .int(TypedOp::Add)
        .ret();
    assert_eq!(result_of(code), StackEntry::Int(4));

    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::int(TypedOp::LoadGlobal), 2).ret();
    assert_eq!(
        fault_of(code),
        (Fault::GlobalIndexOutOfRange { index: 2, count: 2 }, 0)
    );
}

#[test]
fn test_locals_and_stack_pointer() {
    let mut program = ProgramBuilder::new();
    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::Control(ControlOp::AdjustSp), 4)
        .push_int(9)
        .op_i32(local(TypedOp::StoreLocal), 4)
        .op_i32(local(TypedOp::LoadLocal), 4)
        .op_i32(local(TypedOp::LoadLocal), 0)
        .int(TypedOp::Add)
        .ret();
    program.function(FunctionDef::new(0, &[Int]));
    program.code(code.finish().unwrap());

    let run = execute(&program.build(), &[StackEntry::Int(33)]);
    assert_eq!(run.result, Ok(StackEntry::Int(42)));

    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::Control(ControlOp::AdjustSp), -4).ret();
    assert!(matches!(fault_of(code).0, Fault::FrameOverflow { .. }));
}

#[test]
fn test_argument_type_is_checked_on_call() {
    let mut program = ProgramBuilder::new();
    let mut code = CodeBuilder::new();
    code.op_i32(local(TypedOp::LoadLocal), 0).ret();
    program.function(FunctionDef::new(0, &[Int]));
    program.code(code.finish().unwrap());

    let run = execute(&program.build(), &[StackEntry::Byte(1)]);
    assert!(matches!(
        run.result,
        Err(VmError::Fault {
            fault: Fault::TypeMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_constant_pool_strings() {
    let mut program = ProgramBuilder::new();
    let hello = program.string_constant("hello, ");
    let world = program.string_constant("world");
    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::Control(ControlOp::PushConst), hello)
        .control(ControlOp::OutStr)
        .op_i32(Opcode::Control(ControlOp::PushConst), world)
        .control(ControlOp::OutStr)
        .push_int(0)
        .ret();
    program.function(FunctionDef::new(0, &[]));
    program.code(code.finish().unwrap());

    let run = execute(&program.build(), &[]);
    assert_eq!(run.output, "hello, world");

    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::Control(ControlOp::PushConst), 0).ret();
    assert_eq!(
        fault_of(code),
        (Fault::ConstantOutOfRange { offset: 0, size: 0 }, 0)
    );
}

#[test]
fn test_alloc_store_load_free() {
    let mut code = CodeBuilder::new();
    code.push_int(8)
        .control(ControlOp::Alloc)
        .int(TypedOp::Dup)
        .int(TypedOp::Dup)
        .push_int(1234)
        .int(TypedOp::Store)
        .int(TypedOp::Load)
        .op_i32(Opcode::int(TypedOp::StoreGlobal), 0)
        .control(ControlOp::Free)
        .op_i32(Opcode::int(TypedOp::LoadGlobal), 0)
        .ret();

    let run = execute(&main_only(code), &[]);
    assert_eq!(run.result, Ok(StackEntry::Int(1234)));
    assert_eq!(run.heap.used_blocks(), 0);
}

#[test]
fn test_leaked_allocation_survives_run() {
    let mut code = CodeBuilder::new();
    code.push_int(8)
        .control(ControlOp::Alloc)
        .int(TypedOp::Pop)
        .push_int(0)
        .ret();

    let run = execute(&main_only(code), &[]);
    assert!(run.result.is_ok());
    assert_eq!(run.heap.used_blocks(), 1);
    assert_eq!(run.heap.live_allocations().len(), 1);
}

#[test]
fn test_heap_errors_surface_with_ip() {
    let mut code = CodeBuilder::new();
    code.push_int(8)
        .control(ControlOp::Alloc)
        .int(TypedOp::Dup)
        .control(ControlOp::Free)
        .control(ControlOp::Free)
        .push_int(0)
        .ret();

    match execute(&main_only(code), &[]).result {
        Err(VmError::Heap {
            source: HeapError::CorruptedHeap { .. },
            ip,
        }) => assert_eq!(ip, 8),
        other => panic!("expected a heap error, got {:?}", other),
    }

    let mut code = CodeBuilder::new();
    code.push_int(1 << 20).control(ControlOp::Alloc).ret();
    assert!(matches!(
        execute(&main_only(code), &[]).result,
        Err(VmError::Heap {
            source: HeapError::OutOfMemory { .. },
            ..
        })
    ));

    let mut code = CodeBuilder::new();
    code.push_int(-1).control(ControlOp::Alloc).ret();
    assert_eq!(fault_of(code), (Fault::InvalidAddress { value: -1 }, 5));
}

#[test]
fn test_memcpy_into_allocation() {
    let mut program = ProgramBuilder::new();
    let text = program.string_constant("hey");
    program.globals(1);
    let mut code = CodeBuilder::new();
    code.push_int(16)
        .control(ControlOp::Alloc)
        .op_i32(Opcode::int(TypedOp::StoreGlobal), 0)
        .op_i32(Opcode::Control(ControlOp::PushConst), text)
        .op_i32(Opcode::int(TypedOp::LoadGlobal), 0)
        .push_int(7)
        .control(ControlOp::MemCopy)
        .op_i32(Opcode::int(TypedOp::LoadGlobal), 0)
        .control(ControlOp::OutStr)
        .op_i32(Opcode::int(TypedOp::LoadGlobal), 0)
        .control(ControlOp::Free)
        .push_int(0)
        .ret();
    program.function(FunctionDef::new(0, &[]));
    program.code(code.finish().unwrap());

    let run = execute(&program.build(), &[]);
    assert_eq!(run.result, Ok(StackEntry::Int(0)));
    assert_eq!(run.output, "hey");
    assert_eq!(run.heap.used_blocks(), 0);
}

struct FixedRng(u32);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        self.0 as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[test]
fn test_rndi_uses_injected_rng() {
    let mut code = CodeBuilder::new();
    code.control(ControlOp::Rndi).ret();
    let program = load(&main_only(code)).unwrap();

    let mut heap = Heap::new(8 * 1024, 16);
    let mut output = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();
    let result = VirtualMachine::new(program, &mut heap, &mut output, &mut crashes)
        .with_config(config())
        .with_rng(Box::new(FixedRng(0xFFFF_FFFF)))
        .run(&[]);

    assert_eq!(result, Ok(StackEntry::Int(-1)));
}

#[test]
fn test_call_ret_stack_discipline() {
    let mut program = ProgramBuilder::new();
    let mut code = CodeBuilder::new();
    code.push_int(10).push_int(3).call(1);
    let after_call = code.position();
    code.ret();
    let sub = code.position();
    code.op_i32(local(TypedOp::LoadLocal), 0)
        .op_i32(local(TypedOp::LoadLocal), 4)
        .int(TypedOp::Sub)
        .ret();
    program.function(FunctionDef::new(0, &[]));
    program.function(FunctionDef::new(sub, &[Int, Int]));
    program.code(code.finish().unwrap());
    let program = load(&program.build()).unwrap();

    let mut heap = Heap::new(8 * 1024, 16);
    let mut output = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();
    let mut vm = VirtualMachine::new(program, &mut heap, &mut output, &mut crashes)
        .with_config(config());

    vm.start(&[]).unwrap();
    assert_eq!(vm.state(), &VmState::Running);
    let base_sp = vm.stack_pointer();

    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(vm.operand_stack().depth(), 2);

    // call: both arguments move into the new frame
    vm.step().unwrap();
    assert_eq!(vm.call_stack().depth(), 2);
    assert_eq!(vm.operand_stack().depth(), 0);
    assert_eq!(vm.stack_pointer(), base_sp + 8);
    assert_eq!(vm.ip(), sub);
    assert_eq!(vm.program().function(1).map(|f| f.args_size()), Some(8));
    let frames = vm.call_stack().frames();
    assert_eq!(frames[1].frame_pointer, base_sp);
    assert_eq!(frames[1].return_address, after_call);

    for _ in 0..3 {
        vm.step().unwrap();
    }
    assert_eq!(vm.step().unwrap(), VmStatus::Running);
    assert_eq!(vm.call_stack().depth(), 1);
    assert_eq!(vm.operand_stack().entries(), &[StackEntry::Int(7)]);
    assert_eq!(vm.stack_pointer(), base_sp);
    assert_eq!(vm.ip(), after_call);

    assert_eq!(vm.step().unwrap(), VmStatus::Completed(StackEntry::Int(7)));
    assert_eq!(vm.state(), &VmState::Completed(StackEntry::Int(7)));
    assert!(matches!(
        vm.step(),
        Err(VmError::Fault {
            fault: Fault::NotRunning,
            ..
        })
    ));
}

#[test]
fn test_runtime_regions_released_on_every_exit() {
    let mut heap = Heap::new(8 * 1024, 16);
    let mut output = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();

    let mut code = CodeBuilder::new();
    code.push_int(1).push_int(0).int(TypedOp::Div).ret();
    let faulting = load(&main_only(code)).unwrap();

    let result = VirtualMachine::new(faulting, &mut heap, &mut output, &mut crashes)
        .with_config(config())
        .run(&[]);
    assert!(result.is_err());
    assert_eq!(heap.used_blocks(), 0);

    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::Control(ControlOp::Crash), 3);
    let crashing = load(&main_only(code)).unwrap();

    let result = VirtualMachine::new(crashing, &mut heap, &mut output, &mut crashes)
        .with_config(config())
        .run(&[]);
    assert_eq!(result, Err(VmError::Crashed { code: 3 }));
    assert_eq!(heap.used_blocks(), 0);
}

#[test]
fn test_dropping_running_vm_releases_regions() {
    let mut code = CodeBuilder::new();
    code.label("top").jump(ControlOp::Jmp, "top");
    let program = load(&main_only(code)).unwrap();

    let mut heap = Heap::new(8 * 1024, 16);
    let mut output = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();
    {
        let mut vm = VirtualMachine::new(program, &mut heap, &mut output, &mut crashes)
            .with_config(config());
        vm.start(&[]).unwrap();
        for _ in 0..10 {
            assert_eq!(vm.step(), Ok(VmStatus::Running));
        }
        assert!(vm.heap().used_blocks() > 0);
    }

    assert_eq!(heap.used_blocks(), 0);
}

#[test]
fn test_runtime_regions_exhausting_heap() {
    let mut code = CodeBuilder::new();
    code.push_int(0).ret();
    let program = load(&main_only(code)).unwrap();

    let mut heap = Heap::new(512, 16);
    let mut output = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();
    let result = VirtualMachine::new(program, &mut heap, &mut output, &mut crashes)
        .with_config(config())
        .run(&[]);

    assert!(matches!(
        result,
        Err(VmError::Heap {
            source: HeapError::OutOfMemory { .. },
            ..
        })
    ));
    assert_eq!(heap.used_blocks(), 0);
}

#[test]
fn test_runs_are_deterministic() {
    let mut code = CodeBuilder::new();
    code.push_int(40)
        .control(ControlOp::Alloc)
        .int(TypedOp::Pop)
        .push_int(10)
        .control(ControlOp::Alloc)
        .int(TypedOp::Dup)
        .push_int(77)
        .int(TypedOp::Store)
        .int(TypedOp::Load)
        .ret();
    let bytes = main_only(code);

    let first = execute(&bytes, &[]);
    let second = execute(&bytes, &[]);

    assert_eq!(first.result, Ok(StackEntry::Int(77)));
    assert_eq!(first.result, second.result);
    assert_eq!(first.heap.live_allocations(), second.heap.live_allocations());
    assert_eq!(first.heap.free_memory_size(), second.heap.free_memory_size());
}
