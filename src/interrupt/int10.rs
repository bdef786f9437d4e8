//! `INT 10h` video services (spec.md §4.6, §4.8), dispatched on `AH`.
//!
//! Thin routing over [`crate::video::Video`]/[`crate::bios`]; the cell
//! storage, cursor math, and scroll/teletype semantics all live there. This
//! module's only job is pulling guest registers apart and putting results
//! back.

use crate::machine::Machine;

pub fn dispatch(m: &mut Machine) {
    let ah = m.cpu.regs.get8(crate::cpu::Reg8::AH);
    match ah {
        0x00 => {
            let al = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            m.video.set_mode(&mut m.memory, al);
        }
        0x01 => {
            // set cursor shape (CH=start line, CL=end line): no on-screen
            // cursor rendering lives in this core, so there's nothing to
            // store; accepted and ignored like a headless BIOS would do.
        }
        0x02 => {
            let page = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let row = m.cpu.regs.get8(crate::cpu::Reg8::DH);
            let col = m.cpu.regs.get8(crate::cpu::Reg8::DL);
            m.video.set_cursor_pos(&mut m.memory, row, col, page);
        }
        0x03 => {
            let page = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let (col, row) = m.video.cursor_pos(&m.memory, page);
            m.cpu.regs.set8(crate::cpu::Reg8::DH, row);
            m.cpu.regs.set8(crate::cpu::Reg8::DL, col);
            m.cpu.regs.cx = 0x0607; // plausible underline-block cursor shape
        }
        0x05 => {
            let page = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            m.video.set_active_page(&mut m.memory, page);
        }
        0x06 => {
            let al = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            let attr = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let (x1, y1, x2, y2) = window(m);
            let page = m.video.active_page(&m.memory);
            m.video.scroll_up(&mut m.memory, page, al, attr, x1, y1, x2, y2);
        }
        0x07 => {
            let al = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            let attr = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let (x1, y1, x2, y2) = window(m);
            let page = m.video.active_page(&m.memory);
            m.video.scroll_down(&mut m.memory, page, al, attr, x1, y1, x2, y2);
        }
        0x08 => {
            let page = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let cell = m.video.read_char_attr_at_cursor(&m.memory, page);
            m.cpu.regs.set8(crate::cpu::Reg8::AL, cell.ch);
            m.cpu.regs.set8(crate::cpu::Reg8::AH, cell.attr);
        }
        0x09 => {
            let page = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let ch = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            let attr = m.cpu.regs.get8(crate::cpu::Reg8::BL);
            let count = m.cpu.regs.cx;
            m.video.write_char_attr(&mut m.memory, page, ch, attr, count);
        }
        0x0A => {
            let page = m.cpu.regs.get8(crate::cpu::Reg8::BH);
            let ch = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            let count = m.cpu.regs.cx;
            m.video.write_char_only(&mut m.memory, page, ch, count);
        }
        0x0E => {
            let ch = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            let attr = m.cpu.regs.get8(crate::cpu::Reg8::BL);
            let page = m.video.active_page(&m.memory);
            m.video.teletype_write(&mut m.memory, page, ch, attr);
        }
        0x0F => {
            let mode = crate::bios::video_mode(&m.memory);
            let cols = crate::bios::screen_columns(&m.memory);
            let page = m.video.active_page(&m.memory);
            m.cpu.regs.set8(crate::cpu::Reg8::AL, mode);
            m.cpu.regs.set8(crate::cpu::Reg8::AH, cols);
            m.cpu.regs.set8(crate::cpu::Reg8::BH, page);
        }
        0x10 => {
            // set palette/EGA register: no palette storage in text mode,
            // accept and ignore.
        }
        0x12 => {
            // alternate select, AL=0x10: get EGA info; report "no EGA" so
            // callers fall back to CGA/MDA-only behavior.
            let al = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            if al == 0x10 {
                m.cpu.regs.set8(crate::cpu::Reg8::BH, 0); // color mode
                m.cpu.regs.set8(crate::cpu::Reg8::BL, 0); // 64K onboard
                m.cpu.regs.cx = 0;
            }
        }
        0x1A => {
            // get/set display combination: report VGA with color monitor.
            let al = m.cpu.regs.get8(crate::cpu::Reg8::AL);
            if al == 0x00 {
                m.cpu.regs.set8(crate::cpu::Reg8::AL, 0x1A);
                m.cpu.regs.set8(crate::cpu::Reg8::BL, 0x08);
                m.cpu.regs.set8(crate::cpu::Reg8::BH, 0x00);
            }
        }
        _ => {
            eprintln!("dosvm: unhandled INT 10h/AH={:02X}", ah);
        }
    }
}

/// `INT 10h/06,07` take the scroll window as upper-left `CH,CL` (row,col)
/// and lower-right `DH,DL`; returns `(x1, y1, x2, y2)`.
fn window(m: &Machine) -> (u8, u8, u8, u8) {
    let cx = m.cpu.regs.cx;
    let dx = m.cpu.regs.dx;
    ((cx & 0xFF) as u8, (cx >> 8) as u8, (dx & 0xFF) as u8, (dx >> 8) as u8)
}

#[cfg(test)]
#[path = "./int10_test.rs"]
mod int10_test;
