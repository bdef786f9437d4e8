//! The top-level "machine" value spec.md §9 calls for: one owner of
//! `memory`, `cpu`, `alloc`, `files`, `processes`, `video`, `keyboard`, with
//! every DOS/BIOS service taking `&mut Machine`. No singletons.
//!
//! [`Machine::run`] is the cooperative scheduler spec.md §5 describes: a
//! bounded batch of `cpu.step`, external-interrupt injection at the batch
//! boundary, and a single `ServiceOutcome::Yield` rewind path for blocking
//! reads.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::bios;
use crate::cpu::{Cpu, StepResult};
use crate::error::DosResult;
use crate::files;
use crate::interrupt;
use crate::keyboard;
use crate::mcb;
use crate::memory::Memory;
use crate::path::CaseFold;
use crate::psp;
use crate::video;

/// one CPU batch between scheduler checks (spec.md §5: "≈1000").
const BATCH_SIZE: usize = 1000;
/// 18.206 Hz, the documented BIOS daily-timer rate (spec.md §3).
const TIMER_INTERVAL: Duration = Duration::from_nanos(54_925_000);

/// `Psp::terminate_address` value the root process is seeded with; seeing it
/// in [`crate::interrupt::int21::terminate_process`] means "the whole run
/// ends here" rather than "resume a parent" (spec.md §3 "a sentinel that
/// ends emulation").
pub const ROOT_SENTINEL_CS: u16 = 0xFFFF;
pub const ROOT_SENTINEL_IP: u16 = 0xFFFF;

/// segment a boot-sector image is loaded at (spec.md §6), standard IBM PC
/// convention.
const BOOT_SECTOR_SEGMENT: u16 = 0x07C0;
const BOOT_SECTOR_LEN: usize = 512;

/// Knobs spec.md §10.3/§6 assigns to the (out-of-scope) front end that the
/// core itself must honor.
#[derive(Clone, Debug)]
pub struct MachineConfig {
    /// host directory the virtual `C:\` maps onto.
    pub dos_root: PathBuf,
    pub case_fold: CaseFold,
    /// 25, 43, or 50 (spec.md §6 "force/unforce the 80xN screen mode").
    pub rows: u8,
    /// when set, timer ticks advance once per instruction batch instead of
    /// by wall-clock time, and `INT 1Ah/2Ch` read back whatever the guest
    /// itself last wrote rather than the host clock — the "AI and timer
    /// determinism" escape hatch spec.md §6 reserves for tests.
    pub deterministic: bool,
    /// spec.md §9 Open Question: off by default: some tools (`LINK.EXE`,
    /// `DEBUG.COM`) relied on slack paragraphs between allocations that no
    /// other tested program needs.
    pub cushion_enabled: bool,
    /// initial environment `KEY=VALUE` pairs (spec.md §6 "`KEY=VALUE,...`").
    pub environment: Vec<(String, String)>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            dos_root: PathBuf::from("."),
            case_fold: CaseFold::None,
            rows: 25,
            deterministic: false,
            cushion_enabled: false,
            environment: Vec::new(),
        }
    }
}

/// How [`Machine::run`] ended.
#[derive(Debug)]
pub enum RunResult {
    /// the root process terminated; carries its `INT 21h/4Ch` exit code.
    Exited(u8),
    /// a truly unhandled opcode was fetched (spec.md §7, the one fatal
    /// path). The embedding caller is expected to turn this into a non-zero
    /// host exit code; the core never calls `std::process::exit` itself.
    Fault(String),
}

pub struct Machine {
    pub memory: Memory,
    pub cpu: Cpu,
    pub alloc: mcb::Allocator,
    pub files: files::FileTable,
    pub processes: psp::ProcessTable,
    pub video: video::Video,
    pub keyboard: keyboard::Keyboard,
    pub config: MachineConfig,
    /// `INT 21h/47h,3Bh` current directory, guest-relative (no drive letter,
    /// no leading separator).
    pub current_dir: String,
    /// last error recorded by a failing call, surfaced by `INT 21h/59h`.
    pub last_error: u16,
    /// in-flight byte count for a console read (`INT 21h/0Ah,3Fh`) spanning
    /// one or more `ServiceOutcome::Yield`s; see `interrupt::int21`.
    pub(crate) console_io_progress: Option<usize>,
    /// spec.md §5 "a `end_emulation` flag drains the current instruction and
    /// returns from the batch"; set by an embedder wanting to stop a run in
    /// progress (e.g. a host-terminal close).
    pub end_emulation: bool,
    next_tick: Instant,
}

impl Machine {
    fn blank(config: MachineConfig) -> Machine {
        let mut memory = Memory::new();
        bios::init(&mut memory);
        bios::set_rows(&mut memory, config.rows);
        interrupt::install_vectors(&mut memory);
        let mut alloc = mcb::Allocator::new();
        alloc.cushion_enabled = config.cushion_enabled;
        Machine {
            memory,
            cpu: Cpu::new(),
            alloc,
            files: files::FileTable::new(config.dos_root.clone(), config.case_fold),
            processes: psp::ProcessTable::new(),
            video: video::Video::new(),
            keyboard: keyboard::Keyboard::new(),
            config,
            current_dir: String::new(),
            last_error: 0,
            console_io_progress: None,
            end_emulation: false,
            next_tick: Instant::now() + TIMER_INTERVAL,
        }
    }

    /// Loads `image` (COM or EXE, auto-detected) as the root process and
    /// wires the DOS loader plumbing a real `COMMAND.COM` would: PSP,
    /// environment block, command tail, and a terminate address that halts
    /// the whole run instead of resuming a parent (spec.md §4.5, §6).
    pub fn load_program(config: MachineConfig, image: &[u8], program_path: &str, args: &[String]) -> DosResult<Machine> {
        let mut m = Machine::blank(config);

        let cmd_tail = if args.is_empty() { Vec::new() } else { format!(" {}", args.join(" ")).into_bytes() };

        let (seg, entry) = psp::load_any(&mut m.memory, &mut m.alloc, image, 0)?;
        m.alloc.set_owner(&mut m.memory, seg, seg);
        let top = m.alloc.paragraphs_of(seg).unwrap_or(0) + seg;

        let env_seg_paragraphs = 8; // 128 bytes, enough for a handful of vars + the exe path
        let (env_seg, _) = m.alloc.allocate(&mut m.memory, env_seg_paragraphs, seg);
        psp::build_environment(&mut m.memory, env_seg, &m.config.environment, program_path);

        psp::init(&mut m.memory, seg, top, seg, env_seg, &cmd_tail);
        psp::set_terminate_address(&mut m.memory, seg, ROOT_SENTINEL_CS, ROOT_SENTINEL_IP);
        psp::set_saved_stack(&mut m.memory, seg, 0, 0);

        m.processes.register(seg, env_seg);

        m.cpu.regs.cs = entry.cs;
        m.cpu.regs.ip = entry.ip;
        m.cpu.regs.ss = entry.ss;
        m.cpu.regs.sp = entry.sp;
        m.cpu.regs.ds = entry.ds;
        m.cpu.regs.es = entry.es;

        Ok(m)
    }

    /// `INT 19h`-style bootstrap (spec.md §6 "a boot-sector flag that loads
    /// a 512-byte image at `07C0:0000` instead of running the DOS loader").
    /// No PSP, no DOS services expected; only the CPU/BIOS/video plumbing.
    pub fn load_boot_sector(config: MachineConfig, image: &[u8]) -> Machine {
        let mut m = Machine::blank(config);
        let mut sector = [0u8; BOOT_SECTOR_LEN];
        let n = image.len().min(BOOT_SECTOR_LEN);
        sector[..n].copy_from_slice(&image[..n]);
        m.memory.write(BOOT_SECTOR_SEGMENT, 0, &sector);
        m.cpu.regs.cs = BOOT_SECTOR_SEGMENT;
        m.cpu.regs.ip = 0;
        m.cpu.regs.ss = BOOT_SECTOR_SEGMENT;
        m.cpu.regs.sp = 0xFFFE;
        m.cpu.regs.ds = BOOT_SECTOR_SEGMENT;
        m.cpu.regs.es = BOOT_SECTOR_SEGMENT;
        m
    }

    /// Fires the timer/keyboard/Ctrl-Break interrupts a real PIC would have
    /// delivered by now (spec.md §5 "timer has priority over keyboard when
    /// both are pending"), gated on `IF` exactly like hardware.
    fn deliver_pending_interrupts(&mut self) {
        if !self.cpu.interrupts_enabled() {
            return;
        }
        if self.keyboard.ctrl_break_pending {
            self.keyboard.ctrl_break_pending = false;
            self.cpu.software_interrupt(&mut self.memory, 0x23);
            return;
        }
        let timer_due = if self.config.deterministic {
            true
        } else if Instant::now() >= self.next_tick {
            self.next_tick += TIMER_INTERVAL;
            true
        } else {
            false
        };
        if timer_due {
            self.cpu.software_interrupt(&mut self.memory, 0x08);
        }
    }

    /// Runs until the root process exits, a fatal fault is raised, or
    /// [`Machine::end_emulation`] is set by an embedder.
    pub fn run(&mut self) -> RunResult {
        loop {
            for _ in 0..BATCH_SIZE {
                if self.cpu.halted || self.end_emulation {
                    break;
                }
                match self.cpu.step(&mut self.memory) {
                    StepResult::Continue => {}
                    StepResult::Halt => {
                        self.cpu.halted = true;
                    }
                    StepResult::Interrupt(vector) => {
                        if interrupt::dispatch(vector, self) == interrupt::ServiceOutcome::Yield {
                            // rewind over the sentinel+vector bytes so the
                            // same `INT` is retried next step (spec.md §9
                            // "coroutine-like blocking"); also the
                            // "exit-early" request spec.md §5 describes for
                            // a blocking service, since it ends this batch.
                            self.cpu.regs.ip = self.cpu.regs.ip.wrapping_sub(2);
                            break;
                        }
                    }
                    StepResult::Fault(msg) => return RunResult::Fault(msg),
                }
            }
            self.video.diff_and_flush(&self.memory);
            if self.cpu.halted {
                return RunResult::Exited(self.processes.last_exit_code());
            }
            if self.end_emulation {
                return RunResult::Exited(self.processes.last_exit_code());
            }
            self.deliver_pending_interrupts();
        }
    }
}

#[cfg(test)]
#[path = "./machine_test.rs"]
mod machine_test;
