//! Video mirror: CGA-style text-mode buffer at segment `0xB800` (spec.md §3,
//! §4.6, §6).
//!
//! The core never writes to a host terminal; it only writes cells into this
//! mirror inside `Memory`. A redraw policy belongs to the (out-of-scope)
//! host-terminal driver — what this module owns is the mirror itself plus
//! the shadow-buffer diff that tells that driver which rows actually
//! changed (spec.md §4.6: "diffs mirror vs shadow and rewrites only changed
//! rows, then copies mirror -> shadow").

use crate::bios;
use crate::memory::Memory;

pub const SEGMENT: u16 = 0xB800;
pub const COLUMNS: usize = 80;
const PAGE_STRIDE_25: usize = 0x1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: u8,
    pub attr: u8,
}

#[derive(Clone)]
pub struct Video {
    shadow: Vec<u8>,
}

impl Default for Video {
    fn default() -> Self {
        Video::new()
    }
}

impl Video {
    pub fn new() -> Self {
        Video { shadow: vec![0u8; 0x4000] }
    }

    fn rows(mem: &Memory) -> usize {
        bios::rows(mem) as usize
    }

    /// byte distance between consecutive display pages; standard CGA 25-line
    /// mode packs four pages into 4 KiB each, 43/50-line modes only have
    /// room for the one page they're showing.
    fn page_stride(mem: &Memory) -> usize {
        let rows = Self::rows(mem);
        if rows <= 25 {
            PAGE_STRIDE_25
        } else {
            rows * COLUMNS * 2
        }
    }

    fn cell_offset(mem: &Memory, page: u8, row: usize, col: usize) -> u16 {
        (u16::from(page) * Self::page_stride(mem) as u16) + (row as u16 * COLUMNS as u16 * 2) + (col as u16 * 2)
    }

    pub fn read_cell(&self, mem: &Memory, page: u8, row: usize, col: usize) -> Cell {
        let off = Self::cell_offset(mem, page, row, col);
        Cell { ch: mem.read_u8(SEGMENT, off), attr: mem.read_u8(SEGMENT, off + 1) }
    }

    pub fn write_cell(&self, mem: &mut Memory, page: u8, row: usize, col: usize, cell: Cell) {
        let off = Self::cell_offset(mem, page, row, col);
        mem.write_u8(SEGMENT, off, cell.ch);
        mem.write_u8(SEGMENT, off + 1, cell.attr);
    }

    /// `INT 10h/00`: set video mode. Clears the display unless AL bit 7 is
    /// set (spec.md §4.6).
    pub fn set_mode(&self, mem: &mut Memory, al: u8) {
        bios::set_video_mode(mem, al & 0x7F);
        if al & 0x80 == 0 {
            self.clear_page(mem, bios::active_page(mem));
        }
    }

    fn clear_page(&self, mem: &mut Memory, page: u8) {
        let rows = Self::rows(mem);
        for row in 0..rows {
            for col in 0..COLUMNS {
                self.write_cell(mem, page, row, col, Cell { ch: b' ', attr: 0x07 });
            }
        }
    }

    pub fn cursor_pos(&self, mem: &Memory, page: u8) -> (u8, u8) {
        bios::cursor_pos(mem, page)
    }

    pub fn set_cursor_pos(&self, mem: &mut Memory, row: u8, col: u8, page: u8) {
        bios::set_cursor_pos(mem, page, col, row);
    }

    pub fn active_page(&self, mem: &Memory) -> u8 {
        bios::active_page(mem)
    }

    pub fn set_active_page(&self, mem: &mut Memory, page: u8) {
        bios::set_active_page(mem, page);
    }

    /// `INT 10h/06`: scroll the window up by `lines` rows (0 = clear the
    /// whole window), filling the exposed rows with `attr`-tagged spaces.
    pub fn scroll_up(&self, mem: &mut Memory, page: u8, lines: u8, attr: u8, x1: u8, y1: u8, x2: u8, y2: u8) {
        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let lines = lines as usize;
        if lines == 0 {
            for row in y1..=y2 {
                for col in x1..=x2 {
                    self.write_cell(mem, page, row, col, Cell { ch: b' ', attr });
                }
            }
            return;
        }
        for row in y1..=y2 {
            for col in x1..=x2 {
                let cell = if row + lines <= y2 {
                    self.read_cell(mem, page, row + lines, col)
                } else {
                    Cell { ch: b' ', attr }
                };
                self.write_cell(mem, page, row, col, cell);
            }
        }
    }

    /// `INT 10h/07`: scroll the window down by `lines` rows
    pub fn scroll_down(&self, mem: &mut Memory, page: u8, lines: u8, attr: u8, x1: u8, y1: u8, x2: u8, y2: u8) {
        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let lines = lines as usize;
        if lines == 0 {
            for row in y1..=y2 {
                for col in x1..=x2 {
                    self.write_cell(mem, page, row, col, Cell { ch: b' ', attr });
                }
            }
            return;
        }
        for row in (y1..=y2).rev() {
            for col in x1..=x2 {
                let cell = if row >= y1 + lines {
                    self.read_cell(mem, page, row - lines, col)
                } else {
                    Cell { ch: b' ', attr }
                };
                self.write_cell(mem, page, row, col, cell);
            }
        }
    }

    /// `INT 10h/09`: write char+attribute `count` times at the cursor,
    /// without moving the cursor.
    pub fn write_char_attr(&self, mem: &mut Memory, page: u8, ch: u8, attr: u8, count: u16) {
        let (col, row) = self.cursor_pos(mem, page);
        let (mut col, row) = (col as usize, row as usize);
        for _ in 0..count {
            if col >= COLUMNS {
                break;
            }
            self.write_cell(mem, page, row, col, Cell { ch, attr });
            col += 1;
        }
    }

    /// `INT 10h/0A`: write char `count` times, preserving each cell's
    /// existing attribute.
    pub fn write_char_only(&self, mem: &mut Memory, page: u8, ch: u8, count: u16) {
        let (col, row) = self.cursor_pos(mem, page);
        let (mut col, row) = (col as usize, row as usize);
        for _ in 0..count {
            if col >= COLUMNS {
                break;
            }
            let attr = self.read_cell(mem, page, row, col).attr;
            self.write_cell(mem, page, row, col, Cell { ch, attr });
            col += 1;
        }
    }

    pub fn read_char_attr_at_cursor(&self, mem: &Memory, page: u8) -> Cell {
        let (col, row) = self.cursor_pos(mem, page);
        self.read_cell(mem, page, row as usize, col as usize)
    }

    /// `INT 10h/0E` / `INT 21h/02,06,09`: teletype write. Advances the
    /// cursor, interprets BS/LF/CR, and scrolls the page up one line when
    /// writing past the last row (spec.md §4.6).
    pub fn teletype_write(&self, mem: &mut Memory, page: u8, ch: u8, attr: u8) {
        let rows = Self::rows(mem);
        let (col, row) = self.cursor_pos(mem, page);
        let (mut col, mut row) = (col as usize, row as usize);
        match ch {
            0x08 => {
                col = col.saturating_sub(1);
            }
            0x0A => {
                row += 1;
            }
            0x0D => {
                col = 0;
            }
            0x07 => {}
            _ => {
                self.write_cell(mem, page, row, col, Cell { ch, attr });
                col += 1;
                if col >= COLUMNS {
                    col = 0;
                    row += 1;
                }
            }
        }
        if row >= rows {
            self.scroll_up(mem, page, 1, 0x07, 0, 0, (COLUMNS - 1) as u8, (rows - 1) as u8);
            row = rows - 1;
        }
        self.set_cursor_pos(mem, row as u8, col as u8, page);
    }

    /// Diffs the mirror against the shadow buffer and returns the rows (as
    /// `(page, row)`) that changed since the last flush, then copies the
    /// mirror into the shadow. The out-of-scope host-terminal driver is
    /// expected to call this on a timer / at suspension points and redraw
    /// only the rows it gets back (spec.md §4.6).
    pub fn diff_and_flush(&mut self, mem: &Memory) -> Vec<(u8, usize)> {
        let stride = Self::page_stride(mem);
        let rows = Self::rows(mem);
        let mut changed = Vec::new();
        let pages = if stride == PAGE_STRIDE_25 { 4 } else { 1 };
        for page in 0..pages {
            for row in 0..rows {
                let row_off = page * stride + row * COLUMNS * 2;
                let row_bytes = mem.read(SEGMENT, row_off as u16, COLUMNS * 2);
                let shadow_slice = &mut self.shadow[row_off..row_off + COLUMNS * 2];
                if shadow_slice != row_bytes.as_slice() {
                    changed.push((page as u8, row));
                    shadow_slice.copy_from_slice(&row_bytes);
                }
            }
        }
        changed
    }
}

#[cfg(test)]
#[path = "./video_test.rs"]
mod video_test;
