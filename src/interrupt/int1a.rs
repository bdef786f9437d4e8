//! `INT 1Ah` timer/real-time-clock services (spec.md §4.8).
//!
//! `AH=00/01` read and write the BIOS data area's tick counter that
//! [`crate::bios::tick`] advances once per `INT 08h`. `AH=02/04` report the
//! host's wall-clock time/date in the BCD form real RTC hardware returns;
//! unlike the tick counter these have no guest-visible state to round-trip
//! through, so they're read straight off the host clock.

use chrono::{Datelike, Local, Timelike};

use crate::machine::Machine;

fn to_bcd(v: u32) -> u8 {
    (((v / 10) % 10) * 16 + (v % 10)) as u8
}

pub fn dispatch(m: &mut Machine) {
    let ah = m.cpu.regs.get8(crate::cpu::Reg8::AH);
    match ah {
        0x00 => {
            let ticks = crate::bios::daily_timer_ticks(&m.memory);
            m.cpu.regs.cx = (ticks >> 16) as u16;
            m.cpu.regs.dx = (ticks & 0xFFFF) as u16;
            m.cpu.regs.set8(crate::cpu::Reg8::AL, 0);
        }
        0x01 => {
            let ticks = (u32::from(m.cpu.regs.cx) << 16) | u32::from(m.cpu.regs.dx);
            crate::bios::set_daily_timer_ticks(&mut m.memory, ticks);
        }
        0x02 => {
            let now = Local::now();
            m.cpu.regs.set8(crate::cpu::Reg8::CH, to_bcd(now.hour()));
            m.cpu.regs.set8(crate::cpu::Reg8::CL, to_bcd(now.minute()));
            m.cpu.regs.set8(crate::cpu::Reg8::DH, to_bcd(now.second()));
            m.cpu.regs.set8(crate::cpu::Reg8::DL, 0);
            crate::interrupt::set_carry(m, false);
        }
        0x04 => {
            let now = Local::now();
            let year = now.year() as u32;
            m.cpu.regs.set8(crate::cpu::Reg8::CH, to_bcd(year / 100));
            m.cpu.regs.set8(crate::cpu::Reg8::CL, to_bcd(year % 100));
            m.cpu.regs.set8(crate::cpu::Reg8::DH, to_bcd(now.month()));
            m.cpu.regs.set8(crate::cpu::Reg8::DL, to_bcd(now.day()));
            crate::interrupt::set_carry(m, false);
        }
        _ => {
            eprintln!("dosvm: unhandled INT 1Ah/AH={:02X}", ah);
        }
    }
}

#[cfg(test)]
#[path = "./int1a_test.rs"]
mod int1a_test;
