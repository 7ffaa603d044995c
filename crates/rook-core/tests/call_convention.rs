//! Calling convention: pending frames, argument passing, return values,
//! foreign functions and linked modules

use rook_bytecode::{ImageBuilder, ProgramImage, ENTRY_FUNCTION};
use rook_core::{ForeignCall, Machine, Object, VmResult};

fn run(image: ProgramImage) -> (i64, Machine) {
    let mut machine = Machine::new();
    machine.load_image(image);
    let code = machine.run().expect("machine runs");
    (code, machine)
}

fn entry_register(machine: &Machine, register: usize) -> Object {
    machine
        .frame_register(0, register)
        .expect("register occupied")
}

#[test]
fn test_call_return_symmetry() {
    // The callee's register 0 at `end` is exactly what lands in the
    // caller's designated register.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_frame(0, -1);
    b.code().emit_call("answer", 4);
    b.code().emit_halt();
    b.begin_function("answer");
    b.code().emit_istore(0, 42);
    b.code().emit_end();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 4).as_integer().unwrap(), 42);
}

#[test]
fn test_discarded_return_value() {
    // Return target -1: the callee's register 0 is dropped, not delivered.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_frame(0, -1);
    b.code().emit_call("answer", -1);
    b.code().emit_halt();
    b.begin_function("answer");
    b.code().emit_istore(0, 42);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 0);
    assert!(machine.frame_register(0, 4).is_none());
    // Nothing leaked: only the entry frame's argv vector stays live.
    assert_eq!(machine.arena().live(), 1);
}

#[test]
fn test_nested_calls() {
    // add3(x) = add2(x) + 1, add2(x) = x + 2
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 10);
    b.code().emit_frame(1, -1);
    b.code().emit_param(0, 1);
    b.code().emit_call("add3", 2);
    b.code().emit_halt();
    b.begin_function("add3");
    b.code().emit_arg(0, 1);
    b.code().emit_frame(1, -1);
    b.code().emit_param(0, 1);
    b.code().emit_call("add2", 2);
    b.code().emit_istore(3, 1);
    b.code().emit_iadd(2, 3, 0);
    b.code().emit_end();
    b.begin_function("add2");
    b.code().emit_arg(0, 1);
    b.code().emit_istore(2, 2);
    b.code().emit_iadd(1, 2, 0);
    b.code().emit_end();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 2).as_integer().unwrap(), 13);
}

#[test]
fn test_call_to_undefined_function() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_frame(0, -1);
    b.code().emit_call("ghost", -1);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert!(machine
        .exit_condition()
        .message
        .unwrap()
        .contains("ghost"));
}

#[test]
fn test_second_pending_frame_is_an_error() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_frame(0, -1);
    b.code().emit_frame(0, -1);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert_eq!(
        machine.exit_condition().message.as_deref(),
        Some("new frame requested while last one is unused")
    );
}

#[test]
fn test_param_without_pending_frame() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 1);
    b.code().emit_param(0, 1);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert_eq!(
        machine.exit_condition().message.as_deref(),
        Some("no pending frame")
    );
}

#[test]
fn test_argument_slot_out_of_bounds() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 1);
    b.code().emit_frame(1, -1);
    b.code().emit_param(3, 1);
    b.code().emit_end();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert!(machine
        .exit_condition()
        .message
        .unwrap()
        .contains("argument slot 3"));
}

fn foreign_double(call: &mut ForeignCall<'_>) -> VmResult<Option<Object>> {
    let value = call.argument(0)?.as_integer()?;
    Ok(Some(Object::Integer(value * 2)))
}

fn foreign_answer_via_register(call: &mut ForeignCall<'_>) -> VmResult<Option<Object>> {
    // The original convention: write the result into the frame's
    // register 0 and return nothing.
    let arena = &mut *call.arena;
    call.frame.registers.set(arena, 0, Object::Integer(42))?;
    Ok(None)
}

fn foreign_bump(call: &mut ForeignCall<'_>) -> VmResult<Option<Object>> {
    let value = call.argument(0)?.as_integer()?;
    call.set_argument(0, Object::Integer(value + 1))?;
    Ok(None)
}

#[test]
fn test_foreign_function_returning_object() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 21);
    b.code().emit_frame(1, -1);
    b.code().emit_param(0, 1);
    b.code().emit_call("math::double", 2);
    b.code().emit_halt();

    let mut machine = Machine::new();
    machine.load_image(b.finish());
    machine.register_foreign("math::double", foreign_double);
    machine.run().unwrap();
    assert_eq!(entry_register(&machine, 2).as_integer().unwrap(), 42);
}

#[test]
fn test_foreign_function_returning_through_register_zero() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_frame(0, -1);
    b.code().emit_call("misc::answer", 3);
    b.code().emit_halt();

    let mut machine = Machine::new();
    machine.load_image(b.finish());
    machine.register_foreign("misc::answer", foreign_answer_via_register);
    machine.run().unwrap();
    assert_eq!(entry_register(&machine, 3).as_integer().unwrap(), 42);
}

#[test]
fn test_foreign_function_mutates_by_reference_argument() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 7);
    b.code().emit_frame(1, -1);
    b.code().emit_paref(0, 1);
    b.code().emit_call("misc::bump", -1);
    b.code().emit_halt();

    let mut machine = Machine::new();
    machine.load_image(b.finish());
    machine.register_foreign("misc::bump", foreign_bump);
    machine.run().unwrap();
    assert_eq!(entry_register(&machine, 1).as_integer().unwrap(), 8);
}

#[test]
fn test_linked_module_function() {
    let mut module = ImageBuilder::new();
    module.begin_function("ext::twice");
    module.code().emit_arg(0, 1);
    module.code().emit_iadd(1, 1, 0);
    module.code().emit_end();

    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(1, 4);
    b.code().emit_frame(1, -1);
    b.code().emit_param(0, 1);
    b.code().emit_call("ext::twice", 2);
    b.code().emit_halt();

    let mut machine = Machine::new();
    machine.load_image(b.finish());
    machine.link_module("extmod", module.finish());
    machine.run().unwrap();
    assert_eq!(entry_register(&machine, 2).as_integer().unwrap(), 8);
}

#[test]
fn test_linked_module_blocks() {
    // The guarded block and its handler both live in a linked module; the
    // jump base follows them there and comes back at `leave`.
    let mut module = ImageBuilder::new();
    module.begin_block("ext::g");
    module.code().emit_istore(1, 5);
    module.code().emit_throw(1);
    module.begin_block("ext::h");
    module.code().emit_pull(1);
    module.code().emit_move(1, 0);
    module.code().emit_leave();

    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_tryframe();
    b.code().emit_catch("Integer", "ext::h");
    b.code().emit_try("ext::g");
    b.code().emit_end();

    let mut machine = Machine::new();
    machine.load_image(b.finish());
    machine.link_module("extmod", module.finish());
    let code = machine.run().unwrap();
    assert_eq!(code, 5);
}
