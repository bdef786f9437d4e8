use super::*;
use crate::cpu::Reg8;
use crate::machine::MachineConfig;
use crate::memory::Memory;

fn machine() -> Machine {
    Machine::load_program(MachineConfig::default(), &[0xF4], "C:\\T.COM", &[]).unwrap()
}

#[test]
fn install_vectors_points_every_vector_at_its_own_stub() {
    let mut mem = Memory::new();
    install_vectors(&mut mem);
    for vector in [0x00u16, 0x08, 0x21, 0xFF] {
        let off = mem.read_u16(0, vector * 4);
        let seg = mem.read_u16(0, vector * 4 + 2);
        assert_eq!(seg, STUB_SEG);
        assert_eq!(mem.read_u8(seg, off), crate::cpu::SENTINEL_OPCODE);
        assert_eq!(mem.read_u8(seg, off + 1), vector as u8);
    }
}

#[test]
fn hardware_vectors_get_a_plain_iret_stub() {
    let mut mem = Memory::new();
    install_vectors(&mut mem);
    let off = mem.read_u16(0, 0x08 * 4);
    let seg = mem.read_u16(0, 0x08 * 4 + 2);
    assert_eq!(mem.read_u8(seg, off + 2), IRET_OPCODE);
}

#[test]
fn software_vectors_get_a_retf_2_stub() {
    let mut mem = Memory::new();
    install_vectors(&mut mem);
    let off = mem.read_u16(0, 0x21 * 4);
    let seg = mem.read_u16(0, 0x21 * 4 + 2);
    assert_eq!(mem.read_u8(seg, off + 2), RETF_OPCODE);
    assert_eq!(mem.read_u16(seg, off + 3), 2);
}

#[test]
fn timer_interrupt_advances_bios_ticks_and_chains_to_int_1ch() {
    let mut m = machine();
    let before = crate::bios::daily_timer_ticks(&m.memory);
    assert_eq!(dispatch(0x08, &mut m), ServiceOutcome::Complete);
    assert!(crate::bios::daily_timer_ticks(&m.memory) > before);
    // chaining left CS:IP pointed at INT 1Ch's own stub
    let off = m.memory.read_u16(0, 0x1C * 4);
    let seg = m.memory.read_u16(0, 0x1C * 4 + 2);
    assert_eq!((m.cpu.regs.cs, m.cpu.regs.ip), (seg, off));
}

#[test]
fn int_20h_terminates_the_root_process_and_halts_the_machine() {
    let mut m = machine();
    assert_eq!(dispatch(0x20, &mut m), ServiceOutcome::Complete);
    assert!(m.cpu.halted);
}

#[test]
fn an_unhandled_vector_sets_carry_and_reports_failure_in_ax() {
    let mut m = machine();
    assert_eq!(dispatch(0x99, &mut m), ServiceOutcome::Complete);
    assert!(m.cpu.flags.carry);
    assert_eq!(m.cpu.regs.ax, 1);
}

#[test]
fn int_00h_unhooked_divide_by_zero_terminates_the_process() {
    let mut m = machine();
    assert_eq!(dispatch(0x00, &mut m), ServiceOutcome::Complete);
    assert!(m.cpu.halted);
}

#[test]
fn int_01h_and_int_03h_traps_are_unhooked_no_ops() {
    let mut m = machine();
    assert_eq!(dispatch(0x01, &mut m), ServiceOutcome::Complete);
    assert!(!m.cpu.halted);
    assert_eq!(dispatch(0x03, &mut m), ServiceOutcome::Complete);
    assert!(!m.cpu.halted);
}

#[test]
fn int_04h_overflow_trap_is_an_unhooked_no_op() {
    let mut m = machine();
    assert_eq!(dispatch(0x04, &mut m), ServiceOutcome::Complete);
    assert!(!m.cpu.halted);
}

#[test]
fn int_11h_reports_the_bda_equipment_word() {
    let mut m = machine();
    assert_eq!(dispatch(0x11, &mut m), ServiceOutcome::Complete);
    assert_eq!(m.cpu.regs.ax, crate::bios::equipment_word(&m.memory));
}

#[test]
fn int_12h_reports_the_bda_memory_size_in_kb() {
    let mut m = machine();
    assert_eq!(dispatch(0x12, &mut m), ServiceOutcome::Complete);
    assert_eq!(m.cpu.regs.ax, 640);
}

#[test]
fn int_22h_terminate_address_terminates_like_int_20h() {
    let mut m = machine();
    assert_eq!(dispatch(0x22, &mut m), ServiceOutcome::Complete);
    assert!(m.cpu.halted);
}

#[test]
fn int_24h_critical_error_default_response_is_fail() {
    let mut m = machine();
    assert_eq!(dispatch(0x24, &mut m), ServiceOutcome::Complete);
    assert_eq!(m.cpu.regs.get8(Reg8::AL), 3);
}

#[test]
fn int_28h_2ah_2fh_are_unhooked_no_ops() {
    let mut m = machine();
    for vector in [0x28u8, 0x2A, 0x2F] {
        assert_eq!(dispatch(vector, &mut m), ServiceOutcome::Complete);
        assert!(!m.cpu.halted);
    }
}

#[test]
fn int_33h_reports_no_mouse_driver_present() {
    let mut m = machine();
    m.cpu.regs.ax = 0x0001;
    assert_eq!(dispatch(0x33, &mut m), ServiceOutcome::Complete);
    assert_eq!(m.cpu.regs.ax, 0);
}
