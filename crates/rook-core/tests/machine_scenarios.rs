//! End-to-end machine scenarios
//!
//! Programs are hand-assembled with `ImageBuilder` and driven through the
//! public embedding API.

use rook_bytecode::{ImageBuilder, ProgramImage, ENTRY_FUNCTION};
use rook_core::{Machine, Object};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

fn machine_for(image: ProgramImage) -> Machine {
    let mut machine = Machine::new();
    machine.load_image(image);
    machine
}

fn run(image: ProgramImage) -> (i64, Machine) {
    let mut machine = machine_for(image);
    let code = machine.run().expect("machine runs");
    (code, machine)
}

fn entry_register(machine: &Machine, register: usize) -> Object {
    machine
        .frame_register(0, register)
        .expect("register occupied")
}

/// Shared buffer capturing `print`/`echo` output
#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_arithmetic() {
    // istore 1, 6; istore 2, 7; imul 1, 2, 3; end
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 6);
    b.code().emit_istore(2, 7);
    b.code().emit_imul(1, 2, 3);
    b.code().emit_end();

    let (code, _) = run(b.finish());
    assert_eq!(code, 0);
}

#[test]
fn test_arithmetic_result_register() {
    // Same as above, halting instead of returning so the entry frame stays
    // inspectable.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 6);
    b.code().emit_istore(2, 7);
    b.code().emit_imul(1, 2, 3);
    b.code().emit_halt();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 0);
    assert_eq!(entry_register(&machine, 3).as_integer().unwrap(), 42);
    // Register 0 untouched: exit code defaults to 0.
    assert!(machine.frame_register(0, 0).is_none());
}

#[test]
fn test_exit_via_register_zero() {
    // istore 0, 5; end
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(0, 5);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 5);
    assert_eq!(machine.exit_condition().code, 5);
    assert_eq!(machine.exit_condition().exception_type, None);
}

#[test]
fn test_conditional_branch() {
    // istore 1, 3; istore 2, 4; ilt 1, 2, 3; branch 3, L1, L2;
    // L1: istore 0, 1; end; L2: istore 0, 0; end
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 3);
    b.code().emit_istore(2, 4);
    b.code().emit_ilt(1, 2, 3);
    // branch is 1 + 5 + 4 + 4 = 14 bytes; istore is 14, end is 1
    let l1 = b.offset() + 14;
    let l2 = l1 + 15;
    b.code().emit_branch(3, l1 as u32, l2 as u32);
    b.code().emit_istore(0, 1);
    b.code().emit_end();
    b.code().emit_istore(0, 0);
    b.code().emit_end();

    let (code, _) = run(b.finish());
    assert_eq!(code, 1);
}

#[test]
fn test_function_call_by_value() {
    // double(x): arg 0, 1; iadd 1, 1, 0; end
    // entry: frame 1, 0; istore 1, 21; param 0, 1; call double, 2; halt
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_frame(1, 0);
    b.code().emit_istore(1, 21);
    b.code().emit_param(0, 1);
    b.code().emit_call("double", 2);
    b.code().emit_halt();
    b.begin_function("double");
    b.code().emit_arg(0, 1);
    b.code().emit_iadd(1, 1, 0);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 0);
    assert_eq!(entry_register(&machine, 2).as_integer().unwrap(), 42);
    // The callee's by-value argument never touched the caller's register.
    assert_eq!(entry_register(&machine, 1).as_integer().unwrap(), 21);
}

#[test]
fn test_by_reference_argument_mutates_caller() {
    // increment(x&): arg 0, 1; iinc 1; end
    // entry: istore 1, 10; frame 1, -1; paref 0, 1; call increment, -1; halt
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 10);
    b.code().emit_frame(1, -1);
    b.code().emit_paref(0, 1);
    b.code().emit_call("increment", -1);
    b.code().emit_halt();
    b.begin_function("increment");
    b.code().emit_arg(0, 1);
    b.code().emit_iinc(1);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 0);
    assert_eq!(entry_register(&machine, 1).as_integer().unwrap(), 11);
}

#[test]
fn test_exception_caught() {
    // entry: tryframe; catch "Integer" "h"; try "g"; end
    // g: istore 1, 7; throw 1
    // h: pull 1; move 1, 0; leave
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_tryframe();
    b.code().emit_catch("Integer", "h");
    b.code().emit_try("g");
    b.code().emit_end();
    b.begin_block("g");
    b.code().emit_istore(1, 7);
    b.code().emit_throw(1);
    b.begin_block("h");
    b.code().emit_pull(1);
    b.code().emit_move(1, 0);
    b.code().emit_leave();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 7);
    assert_eq!(machine.exit_condition().exception_type, None);
}

#[test]
fn test_exception_uncaught() {
    // Same shape with no catch registered.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_tryframe();
    b.code().emit_try("g");
    b.code().emit_end();
    b.begin_block("g");
    b.code().emit_istore(1, 7);
    b.code().emit_throw(1);

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    let exit = machine.exit_condition();
    assert_eq!(exit.exception_type.as_deref(), Some("Integer"));
    assert_eq!(exit.message.as_deref(), Some("7"));

    // The frame stack survives for trace extraction.
    let trace = machine.trace();
    assert!(!trace.is_empty());
    assert_eq!(trace[0].function_name, ENTRY_FUNCTION);
}

#[test]
fn test_non_progress_detection() {
    // A jump to its own offset must terminate within one tick of the jump.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_nop();
    let target = b.offset();
    b.code().emit_jump(target as u32);

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert_eq!(
        machine.exit_condition().exception_type.as_deref(),
        Some("InstructionUnchangedError")
    );
    let message = machine.exit_condition().message.unwrap();
    assert!(message.contains("jump"), "diagnostic names the opcode: {message}");
    // nop + the stuck jump
    assert_eq!(machine.counter(), 2);
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mut machine = Machine::new();
    machine.load(vec![0xEE]).eoffset(0);
    machine.iframe().unwrap();
    machine.begin();
    assert_eq!(machine.tick(), None);
    let exit = machine.exit_condition();
    assert_eq!(exit.code, 1);
    assert_eq!(exit.exception_type.as_deref(), Some("UnknownOpcode"));
}

#[test]
fn test_jump_outside_image_is_fatal() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_jump(10_000);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert_eq!(
        machine.exit_condition().exception_type.as_deref(),
        Some("InvalidBytecodeAddress")
    );
}

#[test]
fn test_counter_strictly_increases() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    for _ in 0..5 {
        b.code().emit_nop();
    }
    b.code().emit_halt();

    let mut machine = machine_for(b.finish());
    machine.iframe().unwrap();
    machine.begin();
    let mut previous = machine.counter();
    while machine.tick().is_some() {
        assert!(machine.counter() > previous);
        previous = machine.counter();
    }
    assert_eq!(machine.counter(), 6);
}

#[test]
fn test_print_and_echo() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_strstore(1, "Hello");
    b.code().emit_echo(1);
    b.code().emit_strstore(2, " World");
    b.code().emit_print(2);
    b.code().emit_istore(3, 42);
    b.code().emit_print(3);
    b.code().emit_halt();

    let capture = Capture::default();
    let mut machine = machine_for(b.finish());
    machine.set_output(Box::new(capture.clone()));
    machine.run().unwrap();
    assert_eq!(capture.text(), "Hello World\n42\n");
}

#[test]
fn test_iframe_wires_argument_vector() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_vlen(1, 2);
    b.code().emit_halt();

    let mut machine = machine_for(b.finish());
    machine.set_arguments(vec!["prog".into(), "alpha".into(), "beta".into()]);
    machine.run().unwrap();
    assert_eq!(entry_register(&machine, 2).as_integer().unwrap(), 3);
    let argv = entry_register(&machine, 1);
    let items = argv.as_vector().unwrap();
    assert_eq!(items[1].to_string(), "alpha");
}

#[test]
fn test_pass_and_nop_observable_in_counter_only() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_pass();
    b.code().emit_nop();
    b.code().emit_istore(0, 2);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 2);
    assert_eq!(machine.counter(), 4);
}
