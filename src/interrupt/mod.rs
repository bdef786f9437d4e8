//! Interrupt vector table + service dispatch (spec.md §4.2, §4.8, §9).
//!
//! The CPU never services an interrupt itself beyond the guest's own `INT
//! imm8` (push/clear-IF/jump). Every vector table entry this module installs
//! points at a 5-byte stub living at [`STUB_SEG`]:
//!
//! ```text
//! [SENTINEL_OPCODE, vector, return-bytes...]
//! ```
//!
//! `Cpu::step` decodes the sentinel and hands control back to `Machine` as
//! `StepResult::Interrupt(vector)` without touching the return bytes; once
//! [`dispatch`] (or the blocking-retry path below) is done, stepping resumes
//! and naturally executes them. Hardware vectors (08h/09h) get a plain
//! `IRET`, which restores `FLAGS` wholesale from the stack exactly like real
//! hardware. Every other vector gets `RETF 2` instead: it pops `IP`/`CS` and
//! discards the stale pushed `FLAGS` word, so whatever `CF`/`ZF` a DOS/BIOS
//! handler set directly on `cpu.flags` is what the guest sees on return.
//! Because that skips restoring `IF`/`TF`, `dispatch` restores them itself,
//! from the original pushed `FLAGS` word, before running the handler.

pub mod int10;
pub mod int16;
pub mod int1a;
pub mod int21;

use crate::cpu::SENTINEL_OPCODE;
use crate::machine::Machine;
use crate::memory::Memory;

/// segment the interrupt stubs live in: authentic ROM-BIOS territory, past
/// the MCB allocator's range and below video memory, so it can never
/// collide with guest-allocated memory.
pub const STUB_SEG: u16 = 0xF000;
const STUB_STRIDE: u16 = 5;

const RETF_OPCODE: u8 = 0xCA; // RETF imm16
const IRET_OPCODE: u8 = 0xCF;
const NOP_OPCODE: u8 = 0x90;

/// vectors serviced as asynchronous hardware interrupts: full `IRET`, no
/// `CF`/`ZF` return-code contract.
fn is_hardware_vector(vector: u8) -> bool {
    vector == 0x08 || vector == 0x09
}

/// Writes the vector table (segment 0, 256 * 4 bytes) and the stub bytes
/// each entry points at. Call once, before the guest starts running.
pub fn install_vectors(mem: &mut Memory) {
    for vector in 0u16..256 {
        let off = vector * STUB_STRIDE;
        mem.write_u8(STUB_SEG, off, SENTINEL_OPCODE);
        mem.write_u8(STUB_SEG, off + 1, vector as u8);
        if is_hardware_vector(vector as u8) {
            mem.write_u8(STUB_SEG, off + 2, IRET_OPCODE);
            mem.write_u8(STUB_SEG, off + 3, NOP_OPCODE);
            mem.write_u8(STUB_SEG, off + 4, NOP_OPCODE);
        } else {
            mem.write_u8(STUB_SEG, off + 2, RETF_OPCODE);
            mem.write_u16(STUB_SEG, off + 3, 2);
        }
        mem.write_u16(0, vector * 4, off);
        mem.write_u16(0, vector * 4 + 2, STUB_SEG);
    }
}

/// What a service call did. `Yield` tells `Machine::run` to rewind `IP`
/// back over the sentinel+vector bytes so the same `INT` is retried next
/// step — the cooperative-scheduler equivalent of DOS busy-waiting on an
/// empty keyboard buffer (spec.md §5, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceOutcome {
    Complete,
    Yield,
}

pub fn set_carry(m: &mut Machine, carry: bool) {
    m.cpu.flags.carry = carry;
}

pub fn set_zero(m: &mut Machine, zero: bool) {
    m.cpu.flags.zero = zero;
}

/// Reads the `FLAGS` word the guest's `INT` instruction pushed, still
/// sitting at `SS:[SP+4]` (`IP` at `+0`, `CS` at `+2`) since the sentinel
/// stub consumes no stack.
fn pushed_flags(m: &Machine) -> u16 {
    m.memory.read_u16(m.cpu.regs.ss, m.cpu.regs.sp.wrapping_add(4))
}

/// Reads the guest's true return address (`CS:IP` immediately after the
/// `INT` instruction), for callers that need to resume somewhere other
/// than straight back through the stub (e.g. `EXEC`'s parent-resume path).
pub(crate) fn pushed_return(m: &Machine) -> (u16, u16) {
    let ip = m.memory.read_u16(m.cpu.regs.ss, m.cpu.regs.sp);
    let cs = m.memory.read_u16(m.cpu.regs.ss, m.cpu.regs.sp.wrapping_add(2));
    (cs, ip)
}

pub fn dispatch(vector: u8, m: &mut Machine) -> ServiceOutcome {
    if !is_hardware_vector(vector) {
        let flags = crate::cpu::Flags::from_word(pushed_flags(m));
        m.cpu.flags.interrupt = flags.interrupt;
        m.cpu.flags.trap = flags.trap;
    }
    match vector {
        0x00 => {
            // unhooked divide-by-zero: real DOS's default handler prints a
            // diagnostic and aborts the program (spec.md §4.8, §7).
            eprintln!("dosvm: divide by zero");
            int21::terminate_process(m, 0, None);
            ServiceOutcome::Complete
        }
        0x01 | 0x03 => ServiceOutcome::Complete, // single-step/breakpoint traps: no debugger attached
        0x04 => ServiceOutcome::Complete, // INTO overflow trap, unhooked: no-op
        0x08 => {
            crate::bios::tick(&mut m.memory);
            // real ROM-BIOS chains the hardware timer tick to INT 1Ch so
            // resident programs get a periodic hook (spec.md §8 scenario 6).
            m.cpu.software_interrupt(&mut m.memory, 0x1C);
            ServiceOutcome::Complete
        }
        0x09 => ServiceOutcome::Complete,
        0x10 => {
            int10::dispatch(m);
            ServiceOutcome::Complete
        }
        0x11 => {
            m.cpu.regs.ax = crate::bios::equipment_word(&m.memory);
            ServiceOutcome::Complete
        }
        0x12 => {
            m.cpu.regs.ax = crate::bios::memory_size_kb(&m.memory);
            ServiceOutcome::Complete
        }
        0x16 => int16::dispatch(m),
        0x1A => {
            int1a::dispatch(m);
            ServiceOutcome::Complete
        }
        0x1C => ServiceOutcome::Complete, // unhooked default: no-op
        0x20 => {
            int21::terminate_process(m, 0, None);
            ServiceOutcome::Complete
        }
        0x21 => int21::dispatch(m),
        0x22 => {
            // the program-terminate address; a guest firing it directly
            // behaves exactly like INT 20h (spec.md §4.5 "Exit paths").
            int21::terminate_process(m, 0, None);
            ServiceOutcome::Complete
        }
        0x23 => {
            // Ctrl-Break handler default action: terminate like INT 20h.
            int21::terminate_process(m, 0, None);
            ServiceOutcome::Complete
        }
        0x24 => {
            // critical-error handler default response: Fail (AL=3), the
            // same choice DOS's own default handler returns when no TSR
            // has taken over the vector.
            m.cpu.regs.set8(crate::cpu::Reg8::AL, 3);
            ServiceOutcome::Complete
        }
        0x27 => {
            let paragraphs = m.cpu.regs.dx;
            int21::terminate_process(m, 0, Some(paragraphs));
            ServiceOutcome::Complete
        }
        0x28 => ServiceOutcome::Complete, // DOS idle; no TSR hooked
        0x2A => ServiceOutcome::Complete, // DOS critical-section/network hook; unhooked no-op
        0x2F => ServiceOutcome::Complete, // DOS multiplex; AL unchanged means "not installed"
        0x33 => {
            // mouse driver query: AX=0 means "no mouse driver present"
            // regardless of the requested function (mouse support is out
            // of scope, spec.md Non-goals).
            m.cpu.regs.ax = 0;
            ServiceOutcome::Complete
        }
        _ => {
            eprintln!("dosvm: unhandled INT {:02X}h (AX={:04X})", vector, m.cpu.regs.ax);
            set_carry(m, true);
            m.cpu.regs.ax = 1;
            ServiceOutcome::Complete
        }
    }
}

#[cfg(test)]
#[path = "./mod_test.rs"]
mod mod_test;
