use super::*;
use crate::cpu::Reg8;
use crate::machine::MachineConfig;

fn machine() -> Machine {
    Machine::load_program(MachineConfig::default(), &[0xF4], "C:\\T.COM", &[]).unwrap()
}

#[test]
fn read_tick_count_reports_what_set_tick_count_wrote() {
    let mut m = machine();
    m.cpu.regs.set8(Reg8::AH, 0x01);
    m.cpu.regs.cx = 0x0001;
    m.cpu.regs.dx = 0x2345;
    dispatch(&mut m);

    m.cpu.regs.set8(Reg8::AH, 0x00);
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.cx, 0x0001);
    assert_eq!(m.cpu.regs.dx, 0x2345);
    assert_eq!(m.cpu.regs.get8(Reg8::AL), 0);
}

#[test]
fn read_real_time_clock_returns_plausible_bcd_fields() {
    let mut m = machine();
    m.cpu.regs.set8(Reg8::AH, 0x02);
    dispatch(&mut m);
    // BCD digits only: each nibble is 0-9
    let ch = m.cpu.regs.get8(Reg8::CH);
    assert!((ch & 0x0F) <= 9 && (ch >> 4) <= 9);
    assert!(!m.cpu.flags.carry);
}

#[test]
fn read_date_returns_a_plausible_bcd_month_and_day() {
    let mut m = machine();
    m.cpu.regs.set8(Reg8::AH, 0x04);
    dispatch(&mut m);
    let dh = m.cpu.regs.get8(Reg8::DH); // month
    assert!((dh & 0x0F) <= 9 && (dh >> 4) <= 9);
    assert!(!m.cpu.flags.carry);
}
