use zvm::interpreter::opcodes::{ControlOp, Opcode, TypedOp};
use zvm::interpreter::{
    MockTerminal, RecordingCrashHandler, VirtualMachine, VmConfig, VmError, VmState,
};
use zvm::loader::{load, CodeBuilder, FunctionDef, ProgramBuilder};
use zvm::memory::PrimitiveType::Int;
use zvm::memory::{Heap, StackEntry};

fn loadl(code: &mut CodeBuilder, offset: i32) -> &mut CodeBuilder {
    code.op_i32(Opcode::int(TypedOp::LoadLocal), offset)
}

fn storel(code: &mut CodeBuilder, offset: i32) -> &mut CodeBuilder {
    code.op_i32(Opcode::int(TypedOp::StoreLocal), offset)
}

/// main(n) calls fact(n), which recurses until n <= 1
fn factorial_program() -> Vec<u8> {
    let mut code = CodeBuilder::new();

    // main(n)
    loadl(&mut code, 0).call(1).ret();

    // fact(n)
    let fact = code.position();
    loadl(&mut code, 0)
        .push_int(1)
        .int(TypedOp::LessEq)
        .jump(ControlOp::Jz, "recurse")
        .push_int(1)
        .ret()
        .label("recurse");
    loadl(&mut code, 0);
    loadl(&mut code, 0)
        .push_int(1)
        .int(TypedOp::Sub)
        .call(1)
        .int(TypedOp::Mul)
        .ret();

    let mut program = ProgramBuilder::new();
    program.function(FunctionDef::new(0, &[Int]));
    program.function(FunctionDef::new(fact, &[Int]));
    program.code(code.finish().unwrap());
    program.build()
}

/// fib(n) with locals a, b and i reserved on the frame
fn fibonacci_program() -> Vec<u8> {
    let mut code = CodeBuilder::new();

    code.op_i32(Opcode::Control(ControlOp::AdjustSp), 12);
    code.push_int(0);
    storel(&mut code, 4).push_int(1);
    storel(&mut code, 8).push_int(0);
    storel(&mut code, 12).label("loop");

    loadl(&mut code, 12);
    loadl(&mut code, 0)
        .int(TypedOp::Less)
        .jump(ControlOp::Jz, "done");

    // t = a + b; a = b; b = t
    loadl(&mut code, 4);
    loadl(&mut code, 8).int(TypedOp::Add);
    loadl(&mut code, 8);
    storel(&mut code, 4);
    storel(&mut code, 8);

    loadl(&mut code, 12).push_int(1).int(TypedOp::Add);
    storel(&mut code, 12).jump(ControlOp::Jmp, "loop");

    code.label("done");
    loadl(&mut code, 4).ret();

    let mut program = ProgramBuilder::new();
    program.function(FunctionDef::new(0, &[Int]));
    program.code(code.finish().unwrap());
    program.build()
}

struct Run {
    result: Result<StackEntry, VmError>,
    crashes: Vec<i32>,
    output: Vec<String>,
    heap_used: usize,
}

fn run(bytes: &[u8], args: &[StackEntry]) -> Run {
    let program = load(bytes).unwrap();
    let mut heap = Heap::new(32 * 1024, 16);
    let mut terminal = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();

    let config = VmConfig {
        frame_stack_size: 4096,
        ..VmConfig::default()
    };
    let result = VirtualMachine::new(program, &mut heap, &mut terminal, &mut crashes)
        .with_config(config)
        .run(args);

    Run {
        result,
        crashes: crashes.codes,
        output: terminal.get_output(),
        heap_used: heap.used_blocks(),
    }
}

#[test]
fn test_factorial() {
    let program = factorial_program();

    assert_eq!(run(&program, &[StackEntry::Int(5)]).result, Ok(StackEntry::Int(120)));
    assert_eq!(run(&program, &[StackEntry::Int(1)]).result, Ok(StackEntry::Int(1)));
    assert_eq!(run(&program, &[StackEntry::Int(10)]).result, Ok(StackEntry::Int(3_628_800)));
}

#[test]
fn test_fibonacci() {
    let program = fibonacci_program();

    assert_eq!(run(&program, &[StackEntry::Int(9)]).result, Ok(StackEntry::Int(34)));
    assert_eq!(run(&program, &[StackEntry::Int(41)]).result, Ok(StackEntry::Int(165_580_141)));
    assert_eq!(run(&program, &[StackEntry::Int(0)]).result, Ok(StackEntry::Int(0)));
}

#[test]
fn test_scenarios_leave_heap_clean() {
    assert_eq!(run(&factorial_program(), &[StackEntry::Int(6)]).heap_used, 0);
    assert_eq!(run(&fibonacci_program(), &[StackEntry::Int(20)]).heap_used, 0);
}

#[test]
fn test_crash_reaches_handler_once() {
    let mut code = CodeBuilder::new();
    code.push_int(1)
        .jump(ControlOp::Jnz, "fail")
        .push_int(0)
        .ret()
        .label("fail")
        .op_i32(Opcode::Control(ControlOp::Crash), 42)
        .push_int(0)
        .ret();

    let mut program = ProgramBuilder::new();
    program.function(FunctionDef::new(0, &[]));
    program.code(code.finish().unwrap());

    let run = run(&program.build(), &[]);
    assert_eq!(run.crashes, vec![42]);
    assert_eq!(run.result, Err(VmError::Crashed { code: 42 }));
    assert_eq!(run.heap_used, 0);
}

#[test]
fn test_crash_state_is_distinct_from_fault() {
    let mut code = CodeBuilder::new();
    code.op_i32(Opcode::Control(ControlOp::Crash), 7);
    let mut program = ProgramBuilder::new();
    program.function(FunctionDef::new(0, &[]));
    program.code(code.finish().unwrap());
    let program = load(&program.build()).unwrap();

    let mut heap = Heap::new(32 * 1024, 16);
    let mut terminal = MockTerminal::new();
    let mut crashes = RecordingCrashHandler::new();
    let config = VmConfig {
        frame_stack_size: 4096,
        ..VmConfig::default()
    };
    let mut vm = VirtualMachine::new(program, &mut heap, &mut terminal, &mut crashes)
        .with_config(config);

    let error = vm.run(&[]).unwrap_err();
    assert_eq!(error.crash_code(), Some(7));
    assert_eq!(error.fault(), None);
    assert_eq!(vm.state(), &VmState::Crashed(7));
}

#[test]
fn test_countdown_output() {
    let mut code = CodeBuilder::new();
    code.label("loop");
    loadl(&mut code, 0).int(TypedOp::Out).push_byte(b'\n' as i8).byte(TypedOp::Out);
    loadl(&mut code, 0).push_int(1).int(TypedOp::Sub).int(TypedOp::Dup);
    storel(&mut code, 0).jump(ControlOp::Jnz, "loop").push_int(0).ret();

    let mut program = ProgramBuilder::new();
    program.function(FunctionDef::new(0, &[Int]));
    program.code(code.finish().unwrap());

    let run = run(&program.build(), &[StackEntry::Int(3)]);
    assert_eq!(run.result, Ok(StackEntry::Int(0)));
    assert_eq!(run.output, vec!["3", "2", "1"]);
}
