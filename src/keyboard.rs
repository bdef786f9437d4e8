//! Keyboard ring buffer (spec.md §3, §4.7).
//!
//! A 16-entry ring at the BIOS-documented offsets (`bios::kbd_buf_geometry`).
//! The host-terminal driver that polls real keystrokes is out of scope
//! (spec.md §1); this module is only the producer/consumer contract it
//! talks to: `inject` is what a host input driver (or a test) calls with an
//! already-translated `(ascii, scancode)` pair, and `INT 16h`/`INT 21h` read
//! through `consume`/`peek`.

use crate::bios;
use crate::memory::Memory;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub scancode: u8,
    pub ascii: u8,
}

#[derive(Clone, Default)]
pub struct Keyboard {
    /// request to deliver Ctrl-C (`INT 23h`) at the next instruction boundary
    pub ctrl_break_pending: bool,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    /// Producer side: the host input driver calls this with a translated
    /// keystroke. A full ring drops the keystroke (spec.md §4.7: "the ring
    /// does not overwrite").
    pub fn inject(&self, mem: &mut Memory, ev: KeyEvent) {
        let (head_off, tail_off, start, end) = bios::kbd_buf_geometry();
        let head = mem.read_u16(bios::SEGMENT, head_off);
        let tail = mem.read_u16(bios::SEGMENT, tail_off);
        let next_tail = if tail + 2 >= end { start } else { tail + 2 };
        if next_tail == head {
            return; // buffer full, drop
        }
        mem.write_u8(bios::SEGMENT, tail, ev.ascii);
        mem.write_u8(bios::SEGMENT, tail + 1, ev.scancode);
        mem.write_u16(bios::SEGMENT, tail_off, next_tail);
    }

    /// `Ctrl-C` both injects ascii 0x03 into the ring and separately
    /// requests `INT 23h` at the next instruction boundary (spec.md §5).
    pub fn inject_ctrl_break(&mut self, mem: &mut Memory) {
        self.inject(mem, KeyEvent { scancode: 0x2E, ascii: 0x03 });
        self.ctrl_break_pending = true;
    }

    pub fn is_empty(&self, mem: &Memory) -> bool {
        let (head_off, tail_off, _, _) = bios::kbd_buf_geometry();
        mem.read_u16(bios::SEGMENT, head_off) == mem.read_u16(bios::SEGMENT, tail_off)
    }

    /// `INT 16h/01`: look at the next keystroke without removing it
    pub fn peek(&self, mem: &Memory) -> Option<KeyEvent> {
        if self.is_empty(mem) {
            return None;
        }
        let (head_off, _, _, _) = bios::kbd_buf_geometry();
        let head = mem.read_u16(bios::SEGMENT, head_off);
        Some(KeyEvent {
            ascii: mem.read_u8(bios::SEGMENT, head),
            scancode: mem.read_u8(bios::SEGMENT, head + 1),
        })
    }

    /// `INT 16h/00`: remove and return the next keystroke
    pub fn consume(&self, mem: &mut Memory) -> Option<KeyEvent> {
        let ev = self.peek(mem)?;
        let (head_off, _, start, end) = bios::kbd_buf_geometry();
        let head = mem.read_u16(bios::SEGMENT, head_off);
        let next_head = if head + 2 >= end { start } else { head + 2 };
        mem.write_u16(bios::SEGMENT, head_off, next_head);
        Some(ev)
    }
}

#[cfg(test)]
#[path = "./keyboard_test.rs"]
mod keyboard_test;
