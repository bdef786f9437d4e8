//! PSP (Program Segment Prefix) layout, the process table, and the COM/EXE/
//! overlay loaders (spec.md §3, §4.5).
//!
//! Field accessors follow `bios`'s shape: free functions over `Memory`
//! parameterized by the PSP's own segment, since (unlike the BIOS data
//! area) there is one PSP per live process, not a single fixed one.

use std::collections::HashMap;

use serde_derive::Deserialize;

use crate::error::{DosError, DosResult};
use crate::mcb::Allocator;
use crate::memory::Memory;

const INT20_OPCODE: u16 = 0x20CD; // `CD 20`, little-endian as a word
const TOP_OF_MEMORY: u16 = 0x02;
const TERMINATE_CS: u16 = 0x0C;
const TERMINATE_IP: u16 = 0x0A;
const PARENT_PSP: u16 = 0x16;
const HANDLE_MAP: u16 = 0x18;
const HANDLE_MAP_LEN: u16 = 20;
const ENV_SEGMENT: u16 = 0x2C;
const SAVED_SP: u16 = 0x2E;
const SAVED_SS: u16 = 0x30;
const FCB1: u16 = 0x5C;
const FCB2: u16 = 0x6C;
const CMD_TAIL_LEN: u16 = 0x80;
const CMD_TAIL: u16 = 0x81;
const CMD_TAIL_MAX: usize = 127;

pub const PSP_SIZE: u16 = 0x100;
/// default DTA: the command-tail area doubles as the DTA until the guest
/// calls `INT 21h/1Ah` (spec.md §3).
pub const DEFAULT_DTA_OFFSET: u16 = CMD_TAIL_LEN;

pub fn init(mem: &mut Memory, psp_seg: u16, top_of_memory: u16, parent_psp: u16, env_seg: u16, cmd_tail: &[u8]) {
    mem.write_u16(psp_seg, 0x00, INT20_OPCODE);
    mem.write_u16(psp_seg, TOP_OF_MEMORY, top_of_memory);
    mem.write_u16(psp_seg, PARENT_PSP, parent_psp);
    mem.write_u16(psp_seg, ENV_SEGMENT, env_seg);
    for i in 0..HANDLE_MAP_LEN {
        let val = if i < 5 { i as u8 } else { 0xFF };
        mem.write_u8(psp_seg, HANDLE_MAP + i, val);
    }
    set_command_tail(mem, psp_seg, cmd_tail);
    let (fcb1, fcb2) = parse_fcbs_from_tail(cmd_tail);
    mem.write(psp_seg, FCB1, &fcb1);
    mem.write(psp_seg, FCB2, &fcb2);
}

pub fn set_terminate_address(mem: &mut Memory, psp_seg: u16, cs: u16, ip: u16) {
    mem.write_u16(psp_seg, TERMINATE_CS, cs);
    mem.write_u16(psp_seg, TERMINATE_IP, ip);
}

pub fn terminate_address(mem: &Memory, psp_seg: u16) -> (u16, u16) {
    (mem.read_u16(psp_seg, TERMINATE_CS), mem.read_u16(psp_seg, TERMINATE_IP))
}

pub fn set_saved_stack(mem: &mut Memory, psp_seg: u16, ss: u16, sp: u16) {
    mem.write_u16(psp_seg, SAVED_SS, ss);
    mem.write_u16(psp_seg, SAVED_SP, sp);
}

pub fn saved_stack(mem: &Memory, psp_seg: u16) -> (u16, u16) {
    (mem.read_u16(psp_seg, SAVED_SS), mem.read_u16(psp_seg, SAVED_SP))
}

pub fn parent(mem: &Memory, psp_seg: u16) -> u16 {
    mem.read_u16(psp_seg, PARENT_PSP)
}

pub fn env_segment(mem: &Memory, psp_seg: u16) -> u16 {
    mem.read_u16(psp_seg, ENV_SEGMENT)
}

pub fn set_command_tail(mem: &mut Memory, psp_seg: u16, tail: &[u8]) {
    let tail = &tail[..tail.len().min(CMD_TAIL_MAX)];
    mem.write_u8(psp_seg, CMD_TAIL_LEN, tail.len() as u8);
    mem.write(psp_seg, CMD_TAIL, tail);
    mem.write_u8(psp_seg, CMD_TAIL + tail.len() as u16, 0x0D); // CR-terminated, not NUL
}

pub fn command_tail(mem: &Memory, psp_seg: u16) -> Vec<u8> {
    let len = mem.read_u8(psp_seg, CMD_TAIL_LEN) as u16;
    mem.read(psp_seg, CMD_TAIL, len as usize)
}

fn parse_one_fcb(token: &str) -> [u8; 16] {
    let mut fcb = [0u8; 16];
    let token = token.to_uppercase();
    let (rest, drive) = if token.len() >= 2 && token.as_bytes()[1] == b':' {
        (&token[2..], (token.as_bytes()[0] - b'A' + 1))
    } else {
        (token.as_str(), 0u8)
    };
    let (name, ext) = rest.split_once('.').unwrap_or((rest, ""));
    fcb[0] = drive;
    for (i, b) in name.bytes().take(8).enumerate() {
        fcb[1 + i] = b;
    }
    for i in name.len()..8 {
        fcb[1 + i] = b' ';
    }
    for (i, b) in ext.bytes().take(3).enumerate() {
        fcb[9 + i] = b;
    }
    for i in ext.len()..3 {
        fcb[9 + i] = b' ';
    }
    fcb
}

/// Parses the first two whitespace-separated arguments of the command tail
/// into unopened FCBs (spec.md §4.5).
fn parse_fcbs_from_tail(tail: &[u8]) -> ([u8; 16], [u8; 16]) {
    let text = String::from_utf8_lossy(tail);
    let mut tokens = text.split_whitespace();
    let fcb1 = tokens.next().map(parse_one_fcb).unwrap_or_default();
    let fcb2 = tokens.next().map(parse_one_fcb).unwrap_or_default();
    (fcb1, fcb2)
}

/// Builds the environment block: `KEY=VALUE\0` pairs, a double-NUL
/// terminator, a word count (always 1), then the host-style absolute path
/// of the executable (spec.md §4.5, §6).
pub fn build_environment(mem: &mut Memory, env_seg: u16, vars: &[(String, String)], exe_path: &str) {
    let mut off = 0u16;
    for (k, v) in vars {
        let entry = format!("{}={}", k, v);
        mem.write(env_seg, off, entry.as_bytes());
        mem.write_u8(env_seg, off + entry.len() as u16, 0);
        off += entry.len() as u16 + 1;
    }
    mem.write_u8(env_seg, off, 0);
    off += 1;
    mem.write_u16(env_seg, off, 1);
    off += 2;
    mem.write(env_seg, off, exe_path.as_bytes());
    mem.write_u8(env_seg, off + exe_path.len() as u16, 0);
}

/// Registers, CPU-side, ready for the child to run (spec.md §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryState {
    pub cs: u16,
    pub ip: u16,
    pub ss: u16,
    pub sp: u16,
    pub ds: u16,
    pub es: u16,
}

/// `INT 21h/4Bh` AL=00/01 (load, optionally run) and AL=03 (overlay) share
/// this distinction (spec.md §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    LoadAndRun,
    LoadSuspended,
    LoadOverlay { segment: u16, reloc_factor: u16 },
}

fn is_exe(image: &[u8]) -> bool {
    image.len() >= 2 && &image[0..2] == b"MZ"
}

fn paragraphs_for(byte_len: usize) -> u16 {
    ((byte_len + 15) / 16) as u16
}

/// Loads a raw COM image (spec.md §4.5, §6): a single 64 KiB block, image
/// at `+0x100`, a zero return word atop the stack for the CP/M-style exit.
pub fn load_com(mem: &mut Memory, alloc: &mut Allocator, image: &[u8], owner_parent: u16) -> DosResult<(u16, EntryState)> {
    if image.len() > 0xFF00 {
        return Err(DosError::InsufficientMemory);
    }
    let (seg, _) = alloc.allocate(mem, 0x1000, owner_parent);
    if seg == 0 {
        return Err(DosError::InsufficientMemory);
    }
    alloc.set_owner(mem, seg, seg);
    mem.write(seg, 0x100, image);
    mem.write_u16(seg, 0xFFFE, 0x0000);
    Ok((
        seg,
        EntryState { cs: seg, ip: 0x100, ss: seg, sp: 0xFFFE, ds: seg, es: seg },
    ))
}

#[derive(Debug, Deserialize)]
struct ExeHeader {
    signature: u16,
    last_block_bytes: u16,
    blocks: u16,
    relocs: u16,
    header_paragraphs: u16,
    min_extra: u16,
    max_extra: u16,
    init_ss: u16,
    init_sp: u16,
    checksum: u16,
    init_ip: u16,
    init_cs: u16,
    reloc_table_off: u16,
    overlay_number: u16,
}

const EXE_HEADER_LEN: usize = 28;
const EXE_SIGNATURE: u16 = 0x5A4D;

fn parse_exe_header(image: &[u8]) -> DosResult<ExeHeader> {
    if image.len() < EXE_HEADER_LEN {
        return Err(DosError::InvalidFunction);
    }
    let header: ExeHeader = bincode::deserialize(&image[..EXE_HEADER_LEN]).map_err(|_| DosError::InvalidFunction)?;
    if header.signature != EXE_SIGNATURE {
        return Err(DosError::InvalidFunction);
    }
    Ok(header)
}

fn exe_image_len(header: &ExeHeader) -> usize {
    if header.blocks == 0 {
        0
    } else {
        let full_blocks = usize::from(header.blocks - 1) * 512;
        let last = if header.last_block_bytes == 0 { 512 } else { usize::from(header.last_block_bytes) };
        full_blocks + last
    }
}

fn apply_relocations(mem: &mut Memory, image: &[u8], header: &ExeHeader, load_seg: u16) {
    let reloc_start = header.reloc_table_off as usize;
    for i in 0..header.relocs as usize {
        let entry_off = reloc_start + i * 4;
        if entry_off + 4 > image.len() {
            break;
        }
        let off = u16::from_le_bytes([image[entry_off], image[entry_off + 1]]);
        let seg = u16::from_le_bytes([image[entry_off + 2], image[entry_off + 3]]);
        let patch_seg = load_seg.wrapping_add(seg);
        let old = mem.read_u16(patch_seg, off);
        mem.write_u16(patch_seg, off, old.wrapping_add(load_seg));
    }
}

/// Loads an MZ-format EXE (spec.md §4.5, §6): parses the 28-byte header,
/// allocates `image_paragraphs + extra`, loads the image past the header at
/// `psp_seg + 0x10`, applies relocations, and returns the entry registers.
pub fn load_exe(mem: &mut Memory, alloc: &mut Allocator, image: &[u8], owner_parent: u16) -> DosResult<(u16, EntryState)> {
    let header = parse_exe_header(image)?;
    let image_len = exe_image_len(&header);
    let header_len = header.header_paragraphs as usize * 16;
    if header_len > image_len {
        return Err(DosError::InvalidFunction);
    }
    let program = &image[header_len..image_len.min(image.len())];
    let image_paragraphs = paragraphs_for(program.len());

    let desired = image_paragraphs as u32 + header.max_extra as u32 + 1; // +1 for the PSP paragraph
    let minimum = image_paragraphs as u32 + header.min_extra as u32 + 1;
    let (mut seg, largest_free) = alloc.allocate(mem, desired.min(0xFFFF) as u16, owner_parent);
    if seg == 0 {
        if u32::from(largest_free) >= minimum {
            let (s, _) = alloc.allocate(mem, largest_free, owner_parent);
            seg = s;
        }
    }
    if seg == 0 {
        return Err(DosError::InsufficientMemory);
    }
    alloc.set_owner(mem, seg, seg);

    let load_seg = seg.wrapping_add(0x10); // PSP is 256 bytes = 0x10 paragraphs
    mem.write(load_seg, 0, program);
    apply_relocations(mem, image, &header, load_seg);

    Ok((
        seg,
        EntryState {
            cs: load_seg.wrapping_add(header.init_cs),
            ip: header.init_ip,
            ss: load_seg.wrapping_add(header.init_ss),
            sp: header.init_sp,
            ds: seg,
            es: seg,
        },
    ))
}

/// `INT 21h/4Bh` AL=03: load an overlay at a caller-supplied segment with a
/// caller-supplied relocation factor. No allocation, no PSP, no transfer of
/// control (spec.md §4.5).
pub fn load_overlay(mem: &mut Memory, image: &[u8], load_seg: u16, reloc_factor: u16) -> DosResult<()> {
    if is_exe(image) {
        let header = parse_exe_header(image)?;
        let image_len = exe_image_len(&header);
        let header_len = header.header_paragraphs as usize * 16;
        let program = &image[header_len..image_len.min(image.len())];
        mem.write(load_seg, 0, program);
        apply_relocations(mem, image, &header, reloc_factor);
    } else {
        mem.write(load_seg, 0, image);
    }
    Ok(())
}

pub fn load_any(mem: &mut Memory, alloc: &mut Allocator, image: &[u8], owner_parent: u16) -> DosResult<(u16, EntryState)> {
    if is_exe(image) {
        load_exe(mem, alloc, image, owner_parent)
    } else {
        load_com(mem, alloc, image, owner_parent)
    }
}

/// Mutable per-process state that isn't part of the guest-visible PSP bytes
/// (spec.md §4.5 plus SPEC_FULL.md §11's DTA tracking).
#[derive(Clone, Copy, Debug)]
pub struct ProcessInfo {
    pub env_seg: u16,
    pub dta_seg: u16,
    pub dta_off: u16,
    pub exit_code: u8,
}

#[derive(Default)]
pub struct ProcessTable {
    pub current: u16,
    processes: HashMap<u16, ProcessInfo>,
    /// the most recently terminated process's exit code; real DOS only
    /// ever remembers one (`INT 21h/4Dh` is global, not keyed by child),
    /// so this survives the child's own `forget`.
    last_exit_code: u8,
}

impl ProcessTable {
    pub fn new() -> Self {
        ProcessTable::default()
    }

    pub fn register(&mut self, psp_seg: u16, env_seg: u16) {
        self.processes.insert(psp_seg, ProcessInfo { env_seg, dta_seg: psp_seg, dta_off: DEFAULT_DTA_OFFSET, exit_code: 0 });
        self.current = psp_seg;
    }

    pub fn info(&self, psp_seg: u16) -> Option<&ProcessInfo> {
        self.processes.get(&psp_seg)
    }

    /// `INT 21h/1Ah`: set the current process's DTA (SPEC_FULL.md §11: this
    /// must be mutable, not the PSP's built-in default).
    pub fn set_dta(&mut self, psp_seg: u16, seg: u16, off: u16) {
        if let Some(info) = self.processes.get_mut(&psp_seg) {
            info.dta_seg = seg;
            info.dta_off = off;
        }
    }

    /// `INT 21h/2Fh`: get the current process's DTA.
    pub fn dta(&self, psp_seg: u16) -> (u16, u16) {
        self.processes.get(&psp_seg).map(|i| (i.dta_seg, i.dta_off)).unwrap_or((psp_seg, DEFAULT_DTA_OFFSET))
    }

    pub fn set_exit_code(&mut self, psp_seg: u16, code: u8) {
        if let Some(info) = self.processes.get_mut(&psp_seg) {
            info.exit_code = code;
        }
        self.last_exit_code = code;
    }

    pub fn exit_code(&self, psp_seg: u16) -> u8 {
        self.processes.get(&psp_seg).map(|i| i.exit_code).unwrap_or(0)
    }

    /// `INT 21h/4Dh`: the exit code of the last child to terminate.
    pub fn last_exit_code(&self) -> u8 {
        self.last_exit_code
    }

    /// Drops all bookkeeping for a terminated process. Memory/file cleanup
    /// happens in the allocator/file-table themselves, keyed by owner PSP;
    /// this just forgets the process-table entry.
    pub fn forget(&mut self, psp_seg: u16) {
        self.processes.remove(&psp_seg);
    }
}

#[cfg(test)]
#[path = "./psp_test.rs"]
mod psp_test;
