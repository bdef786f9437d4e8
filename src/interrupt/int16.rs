//! `INT 16h` keyboard services (spec.md §4.7, §4.8).
//!
//! The blocking reads (`AH=00,10`) are the cooperative-scheduler boundary
//! spec.md §5/§9 describes: with an empty ring, the handler does nothing
//! and reports [`ServiceOutcome::Yield`], which `Machine::run` turns into
//! "retry this same `INT 16h` next step" by rewinding `IP` back over the
//! sentinel bytes, exactly as DOS's own keyboard-read loop spins on an
//! empty buffer.

use crate::interrupt::{set_zero, ServiceOutcome};
use crate::machine::Machine;

pub fn dispatch(m: &mut Machine) -> ServiceOutcome {
    let ah = m.cpu.regs.get8(crate::cpu::Reg8::AH);
    match ah {
        0x00 | 0x10 => match m.keyboard.consume(&mut m.memory) {
            Some(ev) => {
                m.cpu.regs.ax = u16::from(ev.scancode) << 8 | u16::from(ev.ascii);
                ServiceOutcome::Complete
            }
            None => ServiceOutcome::Yield,
        },
        0x01 | 0x11 => match m.keyboard.peek(&m.memory) {
            Some(ev) => {
                m.cpu.regs.ax = u16::from(ev.scancode) << 8 | u16::from(ev.ascii);
                set_zero(m, false);
                ServiceOutcome::Complete
            }
            None => {
                set_zero(m, true);
                ServiceOutcome::Complete
            }
        },
        0x02 | 0x12 => {
            let shift = crate::bios::shift_state(&m.memory);
            m.cpu.regs.set8(crate::cpu::Reg8::AL, shift);
            ServiceOutcome::Complete
        }
        0x05 => {
            let ev = crate::keyboard::KeyEvent {
                scancode: m.cpu.regs.get8(crate::cpu::Reg8::CH),
                ascii: m.cpu.regs.get8(crate::cpu::Reg8::CL),
            };
            m.keyboard.inject(&mut m.memory, ev);
            m.cpu.regs.set8(crate::cpu::Reg8::AL, 0);
            ServiceOutcome::Complete
        }
        _ => {
            eprintln!("dosvm: unhandled INT 16h/AH={:02X}", ah);
            ServiceOutcome::Complete
        }
    }
}

#[cfg(test)]
#[path = "./int16_test.rs"]
mod int16_test;
