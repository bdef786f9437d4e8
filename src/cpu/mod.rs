//! 8086 instruction decode + execute (spec.md §4.2).
//!
//! The CPU only ever touches `&mut Memory`; it never sees the rest of the
//! machine. When it decodes the sentinel opcode (spec.md §9, `0x69`) that
//! marks an emulator-owned interrupt stub, `step` returns
//! [`StepResult::Interrupt`] instead of servicing the call itself — the
//! caller (`Machine`) runs the DOS/BIOS service and then resumes stepping,
//! landing on the `IRET`/`RETF 2` byte the stub already contains.

pub mod flags;
pub mod register;
pub mod segment;

mod exec;

pub use flags::Flags;
pub use register::{Reg16, Reg8, Registers, SReg};
pub use segment::SegmentOverride;

/// the reserved 80186 `IMUL r, r/m, imm8` byte; no 8086-targeted program
/// emits it, so it's safe to repurpose as the "invoke host" marker
/// (spec.md §9).
pub const SENTINEL_OPCODE: u8 = 0x69;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepPrefix {
    /// `F3`: `REP` for `MOVS`/`STOS`/`LODS`, `REPZ` for `CMPS`/`SCAS`.
    Repz,
    /// `F2`: `REPNZ`, only meaningful for `CMPS`/`SCAS`.
    Repnz,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepResult {
    /// one instruction completed normally.
    Continue,
    /// the sentinel opcode was decoded; the service layer must handle
    /// vector `_0`, then resumption naturally hits the stub's `IRET`.
    Interrupt(u8),
    /// `HLT` executed; the outer loop should stop scheduling this CPU.
    Halt,
    /// an opcode with no implemented (or architecturally valid) decoding
    /// was fetched. The one fatal path (spec.md §7).
    Fault(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cpu {
    pub regs: Registers,
    pub flags: Flags,
    pub halted: bool,
    /// set when `TF` was live at the end of the *previous* instruction;
    /// implements the one-instruction delay on the trap interrupt
    /// (spec.md §4.2 "Trap flag").
    pub trap_armed: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu::default()
    }

    /// `IF = 1` and no prefix byte of the *current* instruction is still
    /// pending is the condition spec.md §5 requires before an external
    /// interrupt may be considered; since `step` always runs a whole
    /// instruction (prefixes included) to completion, this reduces to just
    /// checking `IF` between calls to `step`.
    pub fn interrupts_enabled(&self) -> bool {
        self.flags.interrupt
    }
}

#[cfg(test)]
#[path = "./cpu_test.rs"]
mod cpu_test;
