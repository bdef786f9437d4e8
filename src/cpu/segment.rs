//! Segment-override tracking (spec.md §4.2): a one-shot prefix (`26/2E/
//! 36/3E`) that replaces the default segment for the *next* instruction
//! only, cleared after dispatch unless that instruction is itself another
//! prefix.

use crate::cpu::register::{Registers, SReg};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentOverride {
    None,
    Es,
    Cs,
    Ss,
    Ds,
}

impl SegmentOverride {
    pub fn from_prefix_byte(byte: u8) -> Option<SegmentOverride> {
        match byte {
            0x26 => Some(SegmentOverride::Es),
            0x2E => Some(SegmentOverride::Cs),
            0x36 => Some(SegmentOverride::Ss),
            0x3E => Some(SegmentOverride::Ds),
            _ => None,
        }
    }

    pub fn resolve(self, regs: &Registers, default: SReg) -> u16 {
        match self {
            SegmentOverride::None => regs.get_sreg(default),
            SegmentOverride::Es => regs.es,
            SegmentOverride::Cs => regs.cs,
            SegmentOverride::Ss => regs.ss,
            SegmentOverride::Ds => regs.ds,
        }
    }
}

#[cfg(test)]
#[path = "./segment_test.rs"]
mod segment_test;
