//! Paragraph-granularity memory allocator with an in-RAM Memory Control
//! Block chain (spec.md §3, §4.3).
//!
//! Keeps a sorted external list of live allocations as the source of truth
//! and re-derives the in-memory MCB chain from it after every mutation,
//! rather than trying to keep both views incrementally consistent — that
//! keeps the "totally ordered, contiguous" invariant (spec.md §3) trivial
//! to maintain at the cost of an O(n) walk per allocate/free/resize, which
//! is fine at DOS-era allocation counts.

use crate::memory::Memory;

/// first segment handed to an application; below this is the interrupt
/// vector table, BIOS data area, and DOS itself.
const APP_BASE: u16 = 0x0800;
/// one past the last paragraph DOS will hand out; above this is reserved
/// for video memory / ROM BIOS.
const HARDWARE_RESERVED: u32 = 0x9FFF;

const MCB_MAGIC_MORE: u8 = b'M';
const MCB_MAGIC_LAST: u8 = b'Z';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// segment of the usable block (one paragraph past its MCB)
    pub segment: u16,
    pub paragraphs: u16,
    pub owner_psp: u16,
}

#[derive(Clone, Default)]
pub struct Allocator {
    entries: Vec<Allocation>,
    /// inserts 0x40-0x60 slack paragraphs between new blocks; off by
    /// default, see spec.md §9 Open Question ("LINK.EXE"/"DEBUG.COM").
    pub cushion_enabled: bool,
}

impl Allocator {
    pub fn new() -> Self {
        Allocator { entries: Vec::new(), cushion_enabled: false }
    }

    fn first_fit(&self, paragraphs: u32, cushion: u32) -> Option<u16> {
        let mut cursor = u32::from(APP_BASE);
        for entry in &self.entries {
            let gap = u32::from(entry.segment) - cursor - 1;
            // the gap must hold both the candidate's own MCB paragraph and
            // its requested paragraphs without touching `entry`'s MCB
            if gap >= paragraphs + cushion + 1 {
                return Some((cursor + 1) as u16);
            }
            cursor = u32::from(entry.segment) + u32::from(entry.paragraphs);
        }
        let avail = HARDWARE_RESERVED.saturating_sub(cursor + 1);
        if avail >= paragraphs + cushion {
            Some((cursor + 1) as u16)
        } else {
            None
        }
    }

    /// largest contiguous free run available, in paragraphs, excluding the
    /// one paragraph any new allocation would need for its own MCB
    fn largest_free(&self) -> u16 {
        let mut cursor = u32::from(APP_BASE);
        let mut best = 0u32;
        for entry in &self.entries {
            let gap = u32::from(entry.segment).saturating_sub(cursor + 1);
            best = best.max(gap);
            cursor = u32::from(entry.segment) + u32::from(entry.paragraphs);
        }
        best = best.max(HARDWARE_RESERVED.saturating_sub(cursor + 1));
        best.min(u32::from(u16::MAX)) as u16
    }

    /// Returns `(segment, largest_free)`. `segment == 0` means failure; in
    /// that case `largest_free` is the figure DOS reports in `BX`
    /// (spec.md §4.3).
    pub fn allocate(&mut self, mem: &mut Memory, paragraphs: u16, owner_psp: u16) -> (u16, u16) {
        let cushion = if self.cushion_enabled { 0x50 } else { 0 };
        let segment = match self.first_fit(u32::from(paragraphs), cushion) {
            Some(s) => s,
            None => match self.first_fit(u32::from(paragraphs), 0) {
                Some(s) => s,
                None => return (0, self.largest_free()),
            },
        };
        let idx = self.entries.iter().position(|e| e.segment > segment).unwrap_or(self.entries.len());
        self.entries.insert(idx, Allocation { segment, paragraphs, owner_psp });
        self.sync_mcb_chain(mem);
        (segment, self.largest_free())
    }

    /// Frees an allocation. Unknown segments are tolerated (spec.md §4.3 /
    /// §7: some real-world programs free addresses they never owned).
    pub fn free(&mut self, mem: &mut Memory, segment: u16) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.segment != segment);
        let freed = self.entries.len() != before;
        if freed {
            self.sync_mcb_chain(mem);
        }
        freed
    }

    /// Reassigns an existing block's owner, e.g. once a freshly allocated
    /// block's segment becomes known as the PSP it hosts (spec.md §4.5).
    pub fn set_owner(&mut self, mem: &mut Memory, segment: u16, owner_psp: u16) -> bool {
        match self.entries.iter_mut().find(|e| e.segment == segment) {
            Some(e) => {
                e.owner_psp = owner_psp;
                self.sync_mcb_chain(mem);
                true
            }
            None => false,
        }
    }

    /// Frees every block owned by `psp` (spec.md §4.5, process exit).
    pub fn free_owned_by(&mut self, mem: &mut Memory, psp: u16) {
        let before = self.entries.len();
        self.entries.retain(|e| e.owner_psp != psp);
        if self.entries.len() != before {
            self.sync_mcb_chain(mem);
        }
    }

    /// Grows or shrinks the block at `segment` into the gap immediately
    /// following it. Returns `(ok, max_achievable_paragraphs)`.
    pub fn resize(&mut self, mem: &mut Memory, segment: u16, new_paragraphs: u16) -> (bool, u16) {
        let idx = match self.entries.iter().position(|e| e.segment == segment) {
            Some(i) => i,
            None => return (false, 0),
        };
        let next_seg = self.entries.get(idx + 1).map(|e| u32::from(e.segment)).unwrap_or(HARDWARE_RESERVED + 1);
        let max_paragraphs = next_seg - u32::from(segment);
        if u32::from(new_paragraphs) > max_paragraphs {
            return (false, max_paragraphs.min(u32::from(u16::MAX)) as u16);
        }
        self.entries[idx].paragraphs = new_paragraphs;
        self.sync_mcb_chain(mem);
        (true, new_paragraphs)
    }

    pub fn owner_of(&self, segment: u16) -> Option<u16> {
        self.entries.iter().find(|e| e.segment == segment).map(|e| e.owner_psp)
    }

    /// current size of a live allocation, e.g. to recompute a PSP's
    /// top-of-memory field after load (spec.md §4.5).
    pub fn paragraphs_of(&self, segment: u16) -> Option<u16> {
        self.entries.iter().find(|e| e.segment == segment).map(|e| e.paragraphs)
    }

    /// the segment of the first MCB in the chain, for `INT 21h/52h`
    /// ("list of lists")
    pub fn first_mcb_segment(&self) -> u16 {
        self.entries.first().map(|e| e.segment - 1).unwrap_or(0)
    }

    fn sync_mcb_chain(&self, mem: &mut Memory) {
        for (i, entry) in self.entries.iter().enumerate() {
            let mcb_seg = entry.segment - 1;
            let is_last = i + 1 == self.entries.len();
            let (magic, paras) = if is_last {
                (MCB_MAGIC_LAST, entry.paragraphs - 1)
            } else {
                let next = self.entries[i + 1].segment;
                (MCB_MAGIC_MORE, next - entry.segment - 1)
            };
            mem.write_u8(mcb_seg, 0x00, magic);
            mem.write_u16(mcb_seg, 0x01, entry.owner_psp);
            mem.write_u16(mcb_seg, 0x03, paras);
            for i in 0..11u16 {
                mem.write_u8(mcb_seg, 0x05 + i, 0);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[path = "./mcb_test.rs"]
mod mcb_test;
