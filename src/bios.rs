//! BIOS data area (segment `0x0040`), spec.md §3 / §6.
//!
//! These are fixed offsets inside `Memory` that both the emulator and the
//! guest read and write directly — the guest is free to poke them, and the
//! core is required to honor whatever it finds there "the next time it
//! consults the field" (spec.md §6). So this module is a set of named
//! accessors over `Memory`, not a struct that owns separate state.

use crate::memory::Memory;

pub const SEGMENT: u16 = 0x0040;

const KBD_BUF_HEAD: u16 = 0x1A;
const KBD_BUF_TAIL: u16 = 0x1C;
const KBD_BUF_START: u16 = 0x1E;
const KBD_BUF_END: u16 = 0x3E; // one past the last valid ring byte
const SHIFT_STATE: u16 = 0x17;
const VIDEO_MODE: u16 = 0x49;
const SCREEN_COLUMNS: u16 = 0x4A;
const CURSOR_POS: u16 = 0x50; // 8 pages x 2 bytes (col, row)
const ACTIVE_PAGE: u16 = 0x62;
const ROWS_MINUS_ONE: u16 = 0x84;
const DAILY_TIMER_TICKS: u16 = 0x6C;
/// BDA `0040:0010`, the word `INT 11h` returns verbatim in `AX`.
const EQUIPMENT_WORD: u16 = 0x10;
/// BDA `0040:0013`, the word (in KB) `INT 12h` returns verbatim in `AX`.
const MEMORY_SIZE_KB: u16 = 0x13;

/// plausible equipment word: 1 floppy, 80x25 color (CGA/EGA) video, no
/// math coprocessor, no game port (spec.md §4.8 "INT 11h").
const DEFAULT_EQUIPMENT_WORD: u16 = 0b0000_0000_0010_0001;
/// conventional memory below the 640K boundary (spec.md §4.8 "INT 12h").
const DEFAULT_MEMORY_SIZE_KB: u16 = 640;

pub fn init(mem: &mut Memory) {
    mem.write_u8(SEGMENT, VIDEO_MODE, 0x03); // 80x25 color text
    mem.write_u8(SEGMENT, SCREEN_COLUMNS, 80);
    mem.write_u8(SEGMENT, ACTIVE_PAGE, 0);
    mem.write_u8(SEGMENT, ROWS_MINUS_ONE, 24);
    mem.write_u16(SEGMENT, KBD_BUF_HEAD, KBD_BUF_START);
    mem.write_u16(SEGMENT, KBD_BUF_TAIL, KBD_BUF_START);
    mem.write_u8(SEGMENT, SHIFT_STATE, 0);
    mem.write_u32(SEGMENT, DAILY_TIMER_TICKS, 0);
    mem.write_u16(SEGMENT, EQUIPMENT_WORD, DEFAULT_EQUIPMENT_WORD);
    mem.write_u16(SEGMENT, MEMORY_SIZE_KB, DEFAULT_MEMORY_SIZE_KB);
    for page in 0..8u16 {
        mem.write_u16(SEGMENT, CURSOR_POS + page * 2, 0);
    }
}

/// `INT 11h`: equipment list, returned verbatim in `AX`.
pub fn equipment_word(mem: &Memory) -> u16 {
    mem.read_u16(SEGMENT, EQUIPMENT_WORD)
}

/// `INT 12h`: conventional memory size in KB, returned verbatim in `AX`.
pub fn memory_size_kb(mem: &Memory) -> u16 {
    mem.read_u16(SEGMENT, MEMORY_SIZE_KB)
}

pub fn video_mode(mem: &Memory) -> u8 {
    mem.read_u8(SEGMENT, VIDEO_MODE)
}

pub fn set_video_mode(mem: &mut Memory, mode: u8) {
    mem.write_u8(SEGMENT, VIDEO_MODE, mode);
}

pub fn screen_columns(mem: &Memory) -> u8 {
    mem.read_u8(SEGMENT, SCREEN_COLUMNS)
}

pub fn set_screen_columns(mem: &mut Memory, cols: u8) {
    mem.write_u8(SEGMENT, SCREEN_COLUMNS, cols);
}

pub fn rows(mem: &Memory) -> u8 {
    mem.read_u8(SEGMENT, ROWS_MINUS_ONE) + 1
}

pub fn set_rows(mem: &mut Memory, rows: u8) {
    mem.write_u8(SEGMENT, ROWS_MINUS_ONE, rows.saturating_sub(1));
}

pub fn active_page(mem: &Memory) -> u8 {
    mem.read_u8(SEGMENT, ACTIVE_PAGE)
}

pub fn set_active_page(mem: &mut Memory, page: u8) {
    mem.write_u8(SEGMENT, ACTIVE_PAGE, page);
}

/// cursor position as (column, row) for the given display page (0-7)
pub fn cursor_pos(mem: &Memory, page: u8) -> (u8, u8) {
    let word = mem.read_u16(SEGMENT, CURSOR_POS + u16::from(page & 7) * 2);
    ((word & 0xFF) as u8, (word >> 8) as u8)
}

pub fn set_cursor_pos(mem: &mut Memory, page: u8, col: u8, row: u8) {
    let word = u16::from(col) | (u16::from(row) << 8);
    mem.write_u16(SEGMENT, CURSOR_POS + u16::from(page & 7) * 2, word);
}

pub fn shift_state(mem: &Memory) -> u8 {
    mem.read_u8(SEGMENT, SHIFT_STATE)
}

pub fn set_shift_state(mem: &mut Memory, val: u8) {
    mem.write_u8(SEGMENT, SHIFT_STATE, val);
}

pub fn daily_timer_ticks(mem: &Memory) -> u32 {
    mem.read_u32(SEGMENT, DAILY_TIMER_TICKS)
}

pub fn set_daily_timer_ticks(mem: &mut Memory, ticks: u32) {
    mem.write_u32(SEGMENT, DAILY_TIMER_TICKS, ticks);
}

pub fn tick(mem: &mut Memory) {
    let ticks = daily_timer_ticks(mem).wrapping_add(1);
    set_daily_timer_ticks(mem, ticks);
}

/// keyboard ring buffer head/tail offsets, exposed to `keyboard::Keyboard`
pub fn kbd_buf_geometry() -> (u16, u16, u16, u16) {
    (KBD_BUF_HEAD, KBD_BUF_TAIL, KBD_BUF_START, KBD_BUF_END)
}

#[cfg(test)]
#[path = "./bios_test.rs"]
mod bios_test;
