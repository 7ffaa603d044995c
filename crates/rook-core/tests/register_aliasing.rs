//! Reference slots, register-set switching and the temporary slot,
//! exercised through complete programs

use rook_bytecode::{ImageBuilder, ProgramImage, ENTRY_FUNCTION};
use rook_core::{Machine, Object};

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
fn test_write_through_reference() {
    // After `ref 3, 4`, writing register 4 mutates register 3's object.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_ref(3, 4);
    b.code().emit_istore(4, 9);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 3).as_integer().unwrap(), 9);
    assert_eq!(entry_register(&machine, 4).as_integer().unwrap(), 9);
}

#[test]
fn test_reference_observes_owner_overwrite() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_ref(3, 4);
    b.code().emit_strstore(3, "fresh");
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 4).type_name(), "String");
}

#[test]
fn test_free_through_reference_is_an_error() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_ref(3, 4);
    b.code().emit_free(4);
    b.code().emit_halt();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert!(machine
        .exit_condition()
        .message
        .unwrap()
        .contains("reference"));
}

#[test]
fn test_free_of_aliased_owner_is_an_error() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_ref(3, 4);
    b.code().emit_free(3);
    b.code().emit_halt();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert!(machine
        .exit_condition()
        .message
        .unwrap()
        .contains("references to it still exist"));
}

#[test]
fn test_detach_alias_then_free() {
    // Overwriting the alias slot with its own object detaches it; the
    // owner becomes freeable.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_ref(3, 4);
    b.code().emit_empty(4);
    b.code().emit_free(3);
    b.code().emit_istore(0, 2);
    b.code().emit_halt();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 2);
    assert!(machine.frame_register(0, 3).is_none());
    assert!(machine.frame_register(0, 4).is_none());
}

#[test]
fn test_move_keeps_aliases_valid() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 5);
    b.code().emit_ref(3, 4);
    b.code().emit_move(3, 6);
    b.code().emit_iinc(6);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert!(machine.frame_register(0, 3).is_none());
    // The alias follows the object to its new slot.
    assert_eq!(entry_register(&machine, 4).as_integer().unwrap(), 6);
    assert_eq!(entry_register(&machine, 6).as_integer().unwrap(), 6);
}

#[test]
fn test_swap_exchanges_slots() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_strstore(4, "x");
    b.code().emit_swap(3, 4);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 3).type_name(), "String");
    assert_eq!(entry_register(&machine, 4).type_name(), "Integer");
}

#[test]
fn test_copy_is_deep() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_vec(3);
    b.code().emit_istore(4, 1);
    b.code().emit_vpush(3, 4);
    b.code().emit_copy(3, 5);
    b.code().emit_istore(4, 2);
    b.code().emit_vpush(5, 4);
    b.code().emit_vlen(3, 6);
    b.code().emit_vlen(5, 7);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 6).as_integer().unwrap(), 1);
    assert_eq!(entry_register(&machine, 7).as_integer().unwrap(), 2);
}

#[test]
fn test_isnull() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_isnull(5, 3);
    b.code().emit_istore(6, 1);
    b.code().emit_isnull(6, 4);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert!(entry_register(&machine, 3).to_bool());
    assert!(!entry_register(&machine, 4).to_bool());
}

#[test]
fn test_tmp_slot_round_trip() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 9);
    b.code().emit_tmpri(3);
    b.code().emit_tmpro(5);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert!(machine.frame_register(0, 3).is_none());
    assert_eq!(entry_register(&machine, 5).as_integer().unwrap(), 9);
}

#[test]
fn test_tmpro_with_empty_tmp() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_tmpro(5);
    b.code().emit_halt();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert_eq!(
        machine.exit_condition().message.as_deref(),
        Some("temporary register is empty")
    );
}

#[test]
fn test_global_registers_cross_frames() {
    // The entry function stores into the global set; a callee reads it
    // back through the tmp-slot bridge.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_ress("global");
    b.code().emit_istore(1, 5);
    b.code().emit_ress("local");
    b.code().emit_frame(0, -1);
    b.code().emit_call("reader", 3);
    b.code().emit_halt();
    b.begin_function("reader");
    b.code().emit_ress("global");
    b.code().emit_copy(1, 2);
    b.code().emit_tmpri(2);
    b.code().emit_ress("local");
    b.code().emit_tmpro(0);
    b.code().emit_end();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 3).as_integer().unwrap(), 5);
}

#[test]
fn test_static_registers_persist_across_calls() {
    // counter() bumps its static register 1 on every call and returns it.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    for target in [5, 6, 7] {
        b.code().emit_frame(0, -1);
        b.code().emit_call("counter", target);
    }
    b.code().emit_halt();
    b.begin_function("counter");
    b.code().emit_ress("static");
    b.code().emit_isnull(1, 2);
    // branch is 14 bytes, izero is 6
    let init = b.offset() + 14;
    let skip = init + 6;
    b.code().emit_branch(2, init as u32, skip as u32);
    b.code().emit_izero(1);
    b.code().emit_iinc(1);
    b.code().emit_copy(1, 2);
    b.code().emit_tmpri(2);
    b.code().emit_ress("local");
    b.code().emit_tmpro(0);
    b.code().emit_end();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 5).as_integer().unwrap(), 1);
    assert_eq!(entry_register(&machine, 6).as_integer().unwrap(), 2);
    assert_eq!(entry_register(&machine, 7).as_integer().unwrap(), 3);
}

#[test]
fn test_vector_operations() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_vec(3);
    b.code().emit_istore(4, 10);
    b.code().emit_vpush(3, 4);
    b.code().emit_istore(4, 30);
    b.code().emit_vpush(3, 4);
    b.code().emit_istore(4, 20);
    b.code().emit_vinsert(3, 4, 1);
    // vector is now [10, 20, 30]
    b.code().emit_vat(3, 5, 1);
    b.code().emit_vpop(3, 6, -1);
    b.code().emit_vlen(3, 7);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 5).as_integer().unwrap(), 20);
    assert_eq!(entry_register(&machine, 6).as_integer().unwrap(), 30);
    assert_eq!(entry_register(&machine, 7).as_integer().unwrap(), 2);
}

#[test]
fn test_vector_bounds_error() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_vec(3);
    b.code().emit_vat(3, 5, 0);
    b.code().emit_halt();

    let (code, machine) = run(b.finish());
    assert_eq!(code, 1);
    assert_eq!(
        machine.exit_condition().exception_type.as_deref(),
        Some("VectorBoundsError")
    );
}

#[test]
fn test_conversions() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 7);
    b.code().emit_itof(3, 4);
    b.code().emit_fstore(5, 2.75);
    b.code().emit_ftoi(5, 6);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 4).as_float().unwrap(), 7.0);
    assert_eq!(entry_register(&machine, 6).as_integer().unwrap(), 2);
}

#[test]
fn test_boolean_logic() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(3, 1);
    b.code().emit_izero(4);
    b.code().emit_and(3, 4, 5);
    b.code().emit_or(3, 4, 6);
    b.code().emit_not(4);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert!(!entry_register(&machine, 5).to_bool());
    assert!(entry_register(&machine, 6).to_bool());
    assert!(entry_register(&machine, 4).to_bool());
    assert_eq!(entry_register(&machine, 4).type_name(), "Boolean");
}

#[test]
fn test_byte_store() {
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_bstore(3, 0x41);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 3).as_byte().unwrap(), 0x41);
    assert_eq!(entry_register(&machine, 3).type_name(), "Byte");
}

#[test]
fn test_indirect_operand_resolution() {
    // print through an index held in a register: istore 2, 5; istore 5, 99;
    // iinc with an indirect operand naming register 2 increments register 5.
    let mut b = ImageBuilder::new();
    b.begin_function(ENTRY_FUNCTION);
    b.code().emit_istore(2, 5);
    b.code().emit_istore(5, 99);
    b.code().emit_opcode(rook_bytecode::Opcode::Iinc);
    b.code().operand_indirect(2);
    b.code().emit_halt();

    let (_, machine) = run(b.finish());
    assert_eq!(entry_register(&machine, 5).as_integer().unwrap(), 100);
}
