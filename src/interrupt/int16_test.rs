use super::*;
use crate::cpu::Reg8;
use crate::keyboard::KeyEvent;
use crate::machine::MachineConfig;

fn machine() -> Machine {
    Machine::load_program(MachineConfig::default(), &[0xF4], "C:\\T.COM", &[]).unwrap()
}

#[test]
fn blocking_read_yields_on_an_empty_buffer() {
    let mut m = machine();
    m.cpu.regs.set8(Reg8::AH, 0x00);
    assert_eq!(dispatch(&mut m), ServiceOutcome::Yield);
}

#[test]
fn blocking_read_completes_once_a_key_is_available() {
    let mut m = machine();
    m.keyboard.inject(&mut m.memory, KeyEvent { scancode: 0x1E, ascii: b'a' });
    m.cpu.regs.set8(Reg8::AH, 0x00);
    assert_eq!(dispatch(&mut m), ServiceOutcome::Complete);
    assert_eq!(m.cpu.regs.ax, (0x1E << 8) | u16::from(b'a'));
}

#[test]
fn peek_reports_zf_set_on_an_empty_buffer_without_consuming() {
    let mut m = machine();
    m.cpu.regs.set8(Reg8::AH, 0x01);
    assert_eq!(dispatch(&mut m), ServiceOutcome::Complete);
    assert!(m.cpu.flags.zero);
}

#[test]
fn peek_reports_zf_clear_and_leaves_the_key_queued() {
    let mut m = machine();
    m.keyboard.inject(&mut m.memory, KeyEvent { scancode: 0x1E, ascii: b'a' });
    m.cpu.regs.set8(Reg8::AH, 0x01);
    dispatch(&mut m);
    assert!(!m.cpu.flags.zero);
    m.cpu.regs.set8(Reg8::AH, 0x00);
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.get8(Reg8::AL), b'a');
}

#[test]
fn inject_keystroke_places_it_on_the_ring() {
    let mut m = machine();
    m.cpu.regs.set8(Reg8::AH, 0x05);
    m.cpu.regs.set8(Reg8::CH, 0x1E);
    m.cpu.regs.set8(Reg8::CL, b'z');
    dispatch(&mut m);
    m.cpu.regs.set8(Reg8::AH, 0x00);
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.get8(Reg8::AL), b'z');
}
