//! File tables: the handle-based API and the older FCB-based API that sits
//! on top of it (spec.md §4.4).
//!
//! Handles 0-4 are pre-bound to stdin/stdout/stderr/stdaux/stdprn; this
//! module only tracks their existence (so close/dup stay well-defined) —
//! the actual stdin/keyboard and stdout/video routing spec.md §4.4 describes
//! is a `Machine`-level decision (it needs the keyboard ring and the video
//! mirror) and happens in `interrupt::int21` before it ever reaches here.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::error::{DosError, DosResult};
use crate::memory::Memory;
use crate::path::{dos_to_host, CaseFold};

pub const STDIN: u16 = 0;
pub const STDOUT: u16 = 1;
pub const STDERR: u16 = 2;
pub const STDAUX: u16 = 3;
pub const STDPRN: u16 = 4;
const FIRST_USER_HANDLE: u16 = 5;

pub const fn is_std(handle: u16) -> bool {
    handle < FIRST_USER_HANDLE
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

enum Stream {
    Std,
    Host { file: File, path: PathBuf },
}

struct OpenStream {
    stream: Stream,
    refcount: u32,
}

/// Converts a host modification time into DOS `(date, time)` words
/// (spec.md §6: `time = hours<<11 | minutes<<5 | seconds/2`,
/// `date = (year-1980)<<9 | month<<5 | day`).
pub fn to_dos_datetime(t: SystemTime) -> (u16, u16) {
    let dt: DateTime<Local> = t.into();
    let date = (((dt.year() - 1980).max(0) as u16) << 9) | ((dt.month() as u16) << 5) | (dt.day() as u16);
    let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | ((dt.second() as u16) / 2);
    (date, time)
}

/// Inverse of [`to_dos_datetime`].
pub fn from_dos_datetime(date: u16, time: u16) -> SystemTime {
    let year = 1980 + (date >> 9) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = (time >> 11) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = (time & 0x1F) as u32 * 2;
    Local
        .with_ymd_and_hms(year, month.max(1), day.max(1), hour, minute, second)
        .single()
        .map(SystemTime::from)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn dos_mode_to_open_options(mode: OpenMode) -> OpenOptions {
    let mut opts = OpenOptions::new();
    match mode {
        OpenMode::ReadOnly => {
            opts.read(true);
        }
        OpenMode::WriteOnly => {
            opts.write(true);
        }
        OpenMode::ReadWrite => {
            opts.read(true).write(true);
        }
    }
    opts
}

fn io_to_dos(err: std::io::Error) -> DosError {
    DosError::from(err)
}

pub struct FileTable {
    root: PathBuf,
    fold: CaseFold,
    streams: Vec<Option<OpenStream>>,
    handles: BTreeMap<u16, usize>,
    /// owning PSP of each user handle, for process-exit cleanup (spec.md
    /// §4.5); the pre-bound stdio handles are never entered here, so they
    /// survive every process's exit.
    owners: BTreeMap<u16, u16>,
    searches: BTreeMap<u16, SearchState>,
    next_search_id: u16,
}

struct SearchState {
    host_dir: PathBuf,
    pattern: String,
    attr_mask: u8,
    remaining: Vec<fs::DirEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FindResult {
    pub attr: u8,
    pub date: u16,
    pub time: u16,
    pub size: u32,
    /// 8.3 name, space-padded to 8+3 with no dot (spec.md §6 "13 bytes,
    /// NUL-padded" is the on-disk layout; we keep the parsed parts here and
    /// let the caller lay them out however it writes the DTA).
    pub name_8_3: String,
}

const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_HIDDEN: u8 = 0x02;
const ATTR_VOLUME: u8 = 0x08;

impl FindResult {
    /// Writes the fixed-offset portion of the 43-byte find-result record
    /// (spec.md §6) into the DTA at `seg:off`; the 21+1+8 leading
    /// undocumented/search-attribute bytes are left to the caller (this
    /// module's own search-id bookkeeping lives in the first two of them,
    /// see [`FileTable::find_first`]).
    pub fn write_to(&self, mem: &mut Memory, seg: u16, off: u16) {
        mem.write_u8(seg, off + 0x15, self.attr);
        mem.write_u16(seg, off + 0x16, self.time);
        mem.write_u16(seg, off + 0x18, self.date);
        mem.write_u32(seg, off + 0x1A, self.size);
        let mut name_bytes = [0u8; 13];
        for (i, b) in self.name_8_3.bytes().take(13).enumerate() {
            name_bytes[i] = b;
        }
        mem.write(seg, off + 0x1E, &name_bytes);
    }
}

impl FileTable {
    pub fn new(root: PathBuf, fold: CaseFold) -> Self {
        let mut t = FileTable {
            root,
            fold,
            streams: Vec::new(),
            handles: BTreeMap::new(),
            owners: BTreeMap::new(),
            searches: BTreeMap::new(),
            next_search_id: 1,
        };
        for h in STDIN..=STDPRN {
            let idx = t.streams.len();
            t.streams.push(Some(OpenStream { stream: Stream::Std, refcount: 1 }));
            t.handles.insert(h, idx);
        }
        t
    }

    fn host_path(&self, dos_path: &str) -> PathBuf {
        dos_to_host(dos_path, &self.root, self.fold)
    }

    fn lowest_free_handle(&self) -> u16 {
        let mut h = FIRST_USER_HANDLE;
        while self.handles.contains_key(&h) {
            h += 1;
        }
        h
    }

    fn find_open_by_path(&self, path: &Path) -> Option<usize> {
        self.streams.iter().position(|s| match s {
            Some(OpenStream { stream: Stream::Host { path: p, .. }, .. }) => p == path,
            _ => false,
        })
    }

    fn bind_new_handle(&mut self, idx: usize) -> u16 {
        let handle = self.lowest_free_handle();
        self.handles.insert(handle, idx);
        handle
    }

    /// `INT 21h/3Dh`: open an existing file. Reopening an already-open path
    /// returns the existing handle with its refcount bumped and the stream
    /// rewound, rather than opening a second host file (spec.md §4.4).
    /// `psp` is the owning process, recorded so its exit can reclaim the
    /// handle (spec.md §4.5).
    pub fn open(&mut self, dos_path: &str, mode: OpenMode, psp: u16) -> DosResult<u16> {
        let host_path = self.host_path(dos_path);
        if let Some(idx) = self.find_open_by_path(&host_path) {
            if let Some(OpenStream { stream: Stream::Host { file, .. }, refcount }) = &mut self.streams[idx] {
                file.seek(SeekFrom::Start(0)).map_err(io_to_dos)?;
                *refcount += 1;
            }
            let handle = self.bind_new_handle(idx);
            self.owners.insert(handle, psp);
            return Ok(handle);
        }
        let file = dos_mode_to_open_options(mode)
            .open(&host_path)
            .map_err(|e| if e.kind() == std::io::ErrorKind::NotFound { DosError::FileNotFound } else { io_to_dos(e) })?;
        let idx = self.streams.len();
        self.streams.push(Some(OpenStream { stream: Stream::Host { file, path: host_path }, refcount: 1 }));
        let handle = self.bind_new_handle(idx);
        self.owners.insert(handle, psp);
        Ok(handle)
    }

    /// `INT 21h/3Ch`: create (truncate-or-new) and open for read/write.
    pub fn create(&mut self, dos_path: &str, psp: u16) -> DosResult<u16> {
        let host_path = self.host_path(dos_path);
        if let Some(parent) = host_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(DosError::PathNotFound);
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&host_path)
            .map_err(io_to_dos)?;
        let idx = self.streams.len();
        self.streams.push(Some(OpenStream { stream: Stream::Host { file, path: host_path }, refcount: 1 }));
        let handle = self.bind_new_handle(idx);
        self.owners.insert(handle, psp);
        Ok(handle)
    }

    fn stream_idx(&self, handle: u16) -> DosResult<usize> {
        self.handles.get(&handle).copied().ok_or(DosError::InvalidHandle)
    }

    /// `INT 21h/3Eh`: close a handle. Decrements the underlying stream's
    /// refcount; the host file is only actually closed when it reaches zero.
    pub fn close(&mut self, handle: u16) -> DosResult<()> {
        let idx = self.stream_idx(handle)?;
        self.handles.remove(&handle);
        self.owners.remove(&handle);
        let drop_it = match &mut self.streams[idx] {
            Some(s) => {
                s.refcount -= 1;
                s.refcount == 0
            }
            None => false,
        };
        if drop_it {
            self.streams[idx] = None;
        }
        Ok(())
    }

    /// `INT 21h/3Fh`. Returns an error on the pre-bound stdio handles: their
    /// routing belongs to the interrupt layer (spec.md §4.4), not here.
    pub fn read(&mut self, handle: u16, n: usize) -> DosResult<Vec<u8>> {
        let idx = self.stream_idx(handle)?;
        match &mut self.streams[idx] {
            Some(OpenStream { stream: Stream::Host { file, .. }, .. }) => {
                let mut buf = vec![0u8; n];
                let got = file.read(&mut buf).map_err(io_to_dos)?;
                buf.truncate(got);
                Ok(buf)
            }
            _ => Err(DosError::InvalidFunction),
        }
    }

    /// `INT 21h/40h`.
    pub fn write(&mut self, handle: u16, data: &[u8]) -> DosResult<u16> {
        let idx = self.stream_idx(handle)?;
        match &mut self.streams[idx] {
            Some(OpenStream { stream: Stream::Host { file, .. }, .. }) => {
                file.write_all(data).map_err(io_to_dos)?;
                Ok(data.len() as u16)
            }
            _ => Err(DosError::InvalidFunction),
        }
    }

    /// `INT 21h/42h`.
    pub fn seek(&mut self, handle: u16, offset: i64, whence: Whence) -> DosResult<u32> {
        let idx = self.stream_idx(handle)?;
        match &mut self.streams[idx] {
            Some(OpenStream { stream: Stream::Host { file, .. }, .. }) => {
                let pos = match whence {
                    Whence::Start => SeekFrom::Start(offset.max(0) as u64),
                    Whence::Current => SeekFrom::Current(offset),
                    Whence::End => SeekFrom::End(offset),
                };
                let new_pos = file.seek(pos).map_err(io_to_dos)?;
                Ok(new_pos as u32)
            }
            _ => Err(DosError::InvalidFunction),
        }
    }

    /// `INT 21h/45h`: duplicate a handle onto the lowest free integer,
    /// sharing the same underlying stream (and so the same file position).
    pub fn dup(&mut self, handle: u16, psp: u16) -> DosResult<u16> {
        let idx = self.stream_idx(handle)?;
        if let Some(s) = &mut self.streams[idx] {
            s.refcount += 1;
        }
        let new_handle = self.bind_new_handle(idx);
        self.owners.insert(new_handle, psp);
        Ok(new_handle)
    }

    /// Closes every handle owned by `psp`, std handles excepted (spec.md
    /// §4.5, §8: process exit reclaims everything it opened and left open).
    pub fn close_owned_by(&mut self, psp: u16) {
        let handles: Vec<u16> = self.owners.iter().filter(|(_, &owner)| owner == psp).map(|(&h, _)| h).collect();
        for h in handles {
            let _ = self.close(h);
        }
    }

    /// `INT 21h/41h`.
    pub fn delete(&mut self, dos_path: &str) -> DosResult<()> {
        let host_path = self.host_path(dos_path);
        fs::remove_file(&host_path)
            .map_err(|e| if e.kind() == std::io::ErrorKind::NotFound { DosError::FileNotFound } else { io_to_dos(e) })
    }

    /// `INT 21h/56h`.
    pub fn rename(&mut self, old: &str, new: &str) -> DosResult<()> {
        let old_host = self.host_path(old);
        let new_host = self.host_path(new);
        fs::rename(&old_host, &new_host)
            .map_err(|e| if e.kind() == std::io::ErrorKind::NotFound { DosError::FileNotFound } else { io_to_dos(e) })
    }

    /// `INT 21h/57h`, subfunction 00 (get).
    pub fn get_file_time(&self, handle: u16) -> DosResult<(u16, u16)> {
        let idx = self.stream_idx(handle)?;
        match &self.streams[idx] {
            Some(OpenStream { stream: Stream::Host { file, .. }, .. }) => {
                let meta = file.metadata().map_err(io_to_dos)?;
                let modified = meta.modified().map_err(io_to_dos)?;
                Ok(to_dos_datetime(modified))
            }
            _ => Err(DosError::InvalidFunction),
        }
    }

    /// `INT 21h/57h`, subfunction 01 (set). Best-effort: only succeeds if
    /// the host filesystem supports setting mtimes on an open handle.
    pub fn set_file_time(&self, handle: u16, date: u16, time: u16) -> DosResult<()> {
        let idx = self.stream_idx(handle)?;
        match &self.streams[idx] {
            Some(OpenStream { stream: Stream::Host { file, .. }, .. }) => {
                file.set_modified(from_dos_datetime(date, time)).map_err(io_to_dos)
            }
            _ => Err(DosError::InvalidFunction),
        }
    }

    fn scan_dir(host_dir: &Path, pattern: &str, attr_mask: u8) -> Vec<fs::DirEntry> {
        let mut out = Vec::new();
        if let Ok(rd) = fs::read_dir(host_dir) {
            for entry in rd.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !dos_name_matches(pattern, &name) {
                    continue;
                }
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir && attr_mask & ATTR_DIRECTORY == 0 {
                    continue;
                }
                out.push(entry);
            }
        }
        // stable, deterministic ordering independent of host directory iteration order
        out.sort_by_key(|e| e.file_name());
        out
    }

    fn entry_to_find_result(entry: &fs::DirEntry) -> FindResult {
        let meta = entry.metadata().ok();
        let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        let size = meta.as_ref().map(|m| m.len() as u32).unwrap_or(0);
        let modified = meta.and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH);
        let (date, time) = to_dos_datetime(modified);
        let name = entry.file_name().to_string_lossy().to_uppercase();
        let hidden = name.starts_with('.');
        let mut attr = 0u8;
        if is_dir {
            attr |= ATTR_DIRECTORY;
        }
        if hidden {
            attr |= ATTR_HIDDEN;
        }
        FindResult { attr, date, time, size, name_8_3: to_8_3(&name) }
    }

    /// `INT 21h/4Eh`. Writes the search id into the DTA's first word (our
    /// own bookkeeping, inside the spec's "undocumented bytes") so a later
    /// `find_next` knows which scan to resume.
    pub fn find_first(&mut self, mem: &mut Memory, dta_seg: u16, dta_off: u16, dos_dir: &str, pattern: &str, attr: u8) -> DosResult<()> {
        let host_dir = self.host_path(dos_dir);
        let mut remaining = Self::scan_dir(&host_dir, pattern, attr);
        if remaining.is_empty() {
            return Err(DosError::NoMoreFiles);
        }
        let first = remaining.remove(0);
        let result = Self::entry_to_find_result(&first);
        let id = self.next_search_id;
        self.next_search_id = self.next_search_id.wrapping_add(1).max(1);
        self.searches.insert(id, SearchState { host_dir, pattern: pattern.to_string(), attr_mask: attr, remaining });
        mem.write_u16(dta_seg, dta_off, id);
        mem.write_u8(dta_seg, dta_off + 0x0C, attr);
        result.write_to(mem, dta_seg, dta_off);
        Ok(())
    }

    /// `INT 21h/4Fh`.
    pub fn find_next(&mut self, mem: &mut Memory, dta_seg: u16, dta_off: u16) -> DosResult<()> {
        let id = mem.read_u16(dta_seg, dta_off);
        let state = self.searches.get_mut(&id).ok_or(DosError::NoMoreFiles)?;
        if state.remaining.is_empty() {
            self.searches.remove(&id);
            return Err(DosError::NoMoreFiles);
        }
        let entry = state.remaining.remove(0);
        let result = Self::entry_to_find_result(&entry);
        result.write_to(mem, dta_seg, dta_off);
        Ok(())
    }
}

/// Matches a host filename against a DOS 8.3 wildcard pattern (`*`, `?`),
/// case-insensitively.
fn dos_name_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*.*" || pattern == "*" {
        return true;
    }
    let pattern = pattern.to_uppercase();
    let name = name.to_uppercase();
    glob_match(pattern.as_bytes(), name.as_bytes())
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

fn to_8_3(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((base, ext)) => format!("{:.8}.{:.3}", base, ext),
        None => format!("{:.8}", name),
    }
}

// --- FCB API (spec.md §4.4) ------------------------------------------------

/// Offsets within the 37-byte FCB (spec.md §6). The reserved area stores a
/// handle into this process's `FileTable` once the FCB has been opened —
/// real DOS keeps similar bookkeeping in the same bytes.
mod fcb_off {
    pub const DRIVE: u16 = 0x00;
    pub const NAME: u16 = 0x01; // 8 bytes, space-padded
    pub const EXT: u16 = 0x09; // 3 bytes, space-padded
    pub const CUR_BLOCK: u16 = 0x0C;
    pub const REC_SIZE: u16 = 0x0E;
    pub const FILE_SIZE: u16 = 0x10;
    pub const DATE: u16 = 0x14;
    pub const TIME: u16 = 0x16;
    pub const HANDLE: u16 = 0x18; // reserved area, repurposed
    pub const CUR_RECORD: u16 = 0x20;
    pub const REC_NUMBER: u16 = 0x21;
}

pub const FCB_LEN: u16 = 37;
pub const EXT_FCB_PREFIX_LEN: u16 = 7;
const EXT_FCB_SIGNATURE: u8 = 0xFF;
const EXT_FCB_ATTR_OFF: u16 = 0x06;

/// Resolves the base offset of the standard 37-byte FCB, accounting for the
/// optional 7-byte extended-FCB prefix (spec.md §4.4).
pub fn fcb_base(mem: &Memory, seg: u16, off: u16) -> u16 {
    if mem.read_u8(seg, off) == EXT_FCB_SIGNATURE {
        off + EXT_FCB_PREFIX_LEN
    } else {
        off
    }
}

pub fn fcb_ext_attr(mem: &Memory, seg: u16, off: u16) -> Option<u8> {
    if mem.read_u8(seg, off) == EXT_FCB_SIGNATURE {
        Some(mem.read_u8(seg, off + EXT_FCB_ATTR_OFF))
    } else {
        None
    }
}

fn fcb_name_pattern(mem: &Memory, seg: u16, base: u16) -> String {
    let name = mem.read(seg, base + fcb_off::NAME, 8);
    let ext = mem.read(seg, base + fcb_off::EXT, 3);
    let name = String::from_utf8_lossy(&name).trim_end().replace(' ', "?");
    let ext = String::from_utf8_lossy(&ext).trim_end().replace(' ', "?");
    let name = if name.is_empty() { "????????".to_string() } else { name };
    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

fn fcb_path(mem: &Memory, seg: u16, base: u16) -> String {
    let name = mem.read(seg, base + fcb_off::NAME, 8);
    let ext = mem.read(seg, base + fcb_off::EXT, 3);
    let name = String::from_utf8_lossy(&name).trim_end().to_string();
    let ext = String::from_utf8_lossy(&ext).trim_end().to_string();
    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

impl FileTable {
    fn fcb_rec_size(mem: &Memory, seg: u16, base: u16) -> u32 {
        let sz = mem.read_u16(seg, base + fcb_off::REC_SIZE);
        if sz == 0 {
            128
        } else {
            u32::from(sz)
        }
    }

    /// `INT 21h/0Fh`: open by FCB.
    pub fn fcb_open(&mut self, mem: &mut Memory, seg: u16, off: u16, psp: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let path = fcb_path(mem, seg, base);
        let handle = self.open(&path, OpenMode::ReadWrite, psp).or_else(|_| self.open(&path, OpenMode::ReadOnly, psp))?;
        let size = self.file_size(handle)?;
        mem.write_u16(seg, base + fcb_off::HANDLE, handle);
        mem.write_u32(seg, base + fcb_off::FILE_SIZE, size);
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, 0);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, 0);
        mem.write_u32(seg, base + fcb_off::REC_NUMBER, 0);
        if mem.read_u16(seg, base + fcb_off::REC_SIZE) == 0 {
            mem.write_u16(seg, base + fcb_off::REC_SIZE, 128);
        }
        Ok(())
    }

    /// `INT 21h/16h`: create by FCB.
    pub fn fcb_create(&mut self, mem: &mut Memory, seg: u16, off: u16, psp: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let path = fcb_path(mem, seg, base);
        let handle = self.create(&path, psp)?;
        mem.write_u16(seg, base + fcb_off::HANDLE, handle);
        mem.write_u32(seg, base + fcb_off::FILE_SIZE, 0);
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, 0);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, 0);
        mem.write_u32(seg, base + fcb_off::REC_NUMBER, 0);
        if mem.read_u16(seg, base + fcb_off::REC_SIZE) == 0 {
            mem.write_u16(seg, base + fcb_off::REC_SIZE, 128);
        }
        Ok(())
    }

    fn file_size(&self, handle: u16) -> DosResult<u32> {
        let idx = self.stream_idx(handle)?;
        match &self.streams[idx] {
            Some(OpenStream { stream: Stream::Host { file, .. }, .. }) => {
                Ok(file.metadata().map_err(io_to_dos)?.len() as u32)
            }
            _ => Err(DosError::InvalidFunction),
        }
    }

    /// `INT 21h/10h`: close by FCB.
    pub fn fcb_close(&mut self, mem: &Memory, seg: u16, off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        self.close(handle)
    }

    fn fcb_seq_offset(mem: &Memory, seg: u16, base: u16) -> u64 {
        let cur_block = u64::from(mem.read_u16(seg, base + fcb_off::CUR_BLOCK));
        let cur_record = u64::from(mem.read_u8(seg, base + fcb_off::CUR_RECORD));
        let rec_size = u64::from(Self::fcb_rec_size(mem, seg, base));
        cur_block * 128 * rec_size + cur_record * rec_size
    }

    fn fcb_set_positions_from_offset(mem: &mut Memory, seg: u16, base: u16, offset: u64) {
        let rec_size = u64::from(Self::fcb_rec_size(mem, seg, base));
        let rec_number = offset / rec_size;
        mem.write_u32(seg, base + fcb_off::REC_NUMBER, rec_number as u32);
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, (rec_number / 128) as u16);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, (rec_number % 128) as u8);
    }

    /// `INT 21h/14h`: sequential read, one record of `recSize` bytes.
    /// Advances `curRecord`/`curBlock` and keeps the random position in
    /// sync (spec.md §4.4 invariant).
    pub fn fcb_read_sequential(&mut self, mem: &mut Memory, seg: u16, off: u16, buf_seg: u16, buf_off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        let rec_size = Self::fcb_rec_size(mem, seg, base);
        let pos = Self::fcb_seq_offset(mem, seg, base);
        self.seek(handle, pos as i64, Whence::Start)?;
        let data = self.read(handle, rec_size as usize)?;
        if data.is_empty() {
            return Err(DosError::InvalidFunction); // no more data in file
        }
        mem.write(buf_seg, buf_off, &data);
        Self::fcb_set_positions_from_offset(mem, seg, base, pos + rec_size);
        Ok(())
    }

    /// `INT 21h/15h`: sequential write.
    pub fn fcb_write_sequential(&mut self, mem: &mut Memory, seg: u16, off: u16, buf_seg: u16, buf_off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        let rec_size = Self::fcb_rec_size(mem, seg, base);
        let pos = Self::fcb_seq_offset(mem, seg, base);
        self.seek(handle, pos as i64, Whence::Start)?;
        let data = mem.read(buf_seg, buf_off, rec_size as usize);
        self.write(handle, &data)?;
        let new_pos = pos + rec_size;
        Self::fcb_set_positions_from_offset(mem, seg, base, new_pos);
        let size = mem.read_u32(seg, base + fcb_off::FILE_SIZE);
        if new_pos as u32 > size {
            mem.write_u32(seg, base + fcb_off::FILE_SIZE, new_pos as u32);
        }
        Ok(())
    }

    /// `INT 21h/21h`: random read using `recNumber`; also updates the
    /// sequential position to match (spec.md §4.4).
    pub fn fcb_read_random(&mut self, mem: &mut Memory, seg: u16, off: u16, buf_seg: u16, buf_off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        let rec_size = Self::fcb_rec_size(mem, seg, base);
        let rec_number = u64::from(mem.read_u32(seg, base + fcb_off::REC_NUMBER));
        let pos = rec_number * rec_size;
        self.seek(handle, pos as i64, Whence::Start)?;
        let data = self.read(handle, rec_size as usize)?;
        if data.is_empty() {
            return Err(DosError::InvalidFunction);
        }
        mem.write(buf_seg, buf_off, &data);
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, (rec_number / 128) as u16);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, (rec_number % 128) as u8);
        Ok(())
    }

    /// `INT 21h/22h`: random write using `recNumber`.
    pub fn fcb_write_random(&mut self, mem: &mut Memory, seg: u16, off: u16, buf_seg: u16, buf_off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        let rec_size = Self::fcb_rec_size(mem, seg, base);
        let rec_number = u64::from(mem.read_u32(seg, base + fcb_off::REC_NUMBER));
        let pos = rec_number * rec_size;
        self.seek(handle, pos as i64, Whence::Start)?;
        let data = mem.read(buf_seg, buf_off, rec_size as usize);
        self.write(handle, &data)?;
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, (rec_number / 128) as u16);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, (rec_number % 128) as u8);
        let size = mem.read_u32(seg, base + fcb_off::FILE_SIZE);
        if (pos + rec_size) as u32 > size {
            mem.write_u32(seg, base + fcb_off::FILE_SIZE, (pos + rec_size) as u32);
        }
        Ok(())
    }

    /// `INT 21h/27h`: random-block read, `CX` records at a time. Returns
    /// the number of records actually read; updates both positions on
    /// completion (spec.md §4.4).
    pub fn fcb_read_random_block(&mut self, mem: &mut Memory, seg: u16, off: u16, buf_seg: u16, buf_off: u16, count: u16) -> DosResult<u16> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        let rec_size = Self::fcb_rec_size(mem, seg, base);
        let rec_number = u64::from(mem.read_u32(seg, base + fcb_off::REC_NUMBER));
        let pos = rec_number * rec_size;
        self.seek(handle, pos as i64, Whence::Start)?;
        let data = self.read(handle, rec_size as usize * count as usize)?;
        mem.write(buf_seg, buf_off, &data);
        let records_read = (data.len() as u64 / rec_size) as u16;
        let new_rec_number = rec_number + u64::from(records_read);
        mem.write_u32(seg, base + fcb_off::REC_NUMBER, new_rec_number as u32);
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, (new_rec_number / 128) as u16);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, (new_rec_number % 128) as u8);
        Ok(records_read)
    }

    /// `INT 21h/28h`: random-block write, `CX` records at a time.
    pub fn fcb_write_random_block(&mut self, mem: &mut Memory, seg: u16, off: u16, buf_seg: u16, buf_off: u16, count: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let handle = mem.read_u16(seg, base + fcb_off::HANDLE);
        let rec_size = Self::fcb_rec_size(mem, seg, base);
        let rec_number = u64::from(mem.read_u32(seg, base + fcb_off::REC_NUMBER));
        let pos = rec_number * rec_size;
        self.seek(handle, pos as i64, Whence::Start)?;
        let data = mem.read(buf_seg, buf_off, rec_size as usize * count as usize);
        self.write(handle, &data)?;
        let new_rec_number = rec_number + u64::from(count);
        mem.write_u32(seg, base + fcb_off::REC_NUMBER, new_rec_number as u32);
        mem.write_u16(seg, base + fcb_off::CUR_BLOCK, (new_rec_number / 128) as u16);
        mem.write_u8(seg, base + fcb_off::CUR_RECORD, (new_rec_number % 128) as u8);
        let size = mem.read_u32(seg, base + fcb_off::FILE_SIZE);
        let end = (pos + data.len() as u64) as u32;
        if end > size {
            mem.write_u32(seg, base + fcb_off::FILE_SIZE, end);
        }
        Ok(())
    }

    /// `INT 21h/13h`: delete by FCB.
    pub fn fcb_delete(&mut self, mem: &Memory, seg: u16, off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let path = fcb_path(mem, seg, base);
        self.delete(&path)
    }

    /// `INT 21h/17h`: rename by FCB (the new name occupies the same FCB's
    /// bytes 0x11-0x19 in real DOS; callers pass both paths already parsed).
    pub fn fcb_rename(&mut self, old: &str, new: &str) -> DosResult<()> {
        self.rename(old, new)
    }

    /// `INT 21h/11h`/`12h`: search-first/next by FCB, honoring only the
    /// directory/hidden/system/volume bits of an extended FCB (spec.md
    /// §4.4).
    pub fn fcb_search_first(&mut self, mem: &mut Memory, seg: u16, off: u16, dta_seg: u16, dta_off: u16) -> DosResult<()> {
        let base = fcb_base(mem, seg, off);
        let pattern = fcb_name_pattern(mem, seg, base);
        let attr = fcb_ext_attr(mem, seg, off).unwrap_or(0);
        self.find_first(mem, dta_seg, dta_off, "", &pattern, attr)
    }

    pub fn fcb_search_next(&mut self, mem: &mut Memory, dta_seg: u16, dta_off: u16) -> DosResult<()> {
        self.find_next(mem, dta_seg, dta_off)
    }
}

#[cfg(test)]
#[path = "./files_test.rs"]
mod files_test;
