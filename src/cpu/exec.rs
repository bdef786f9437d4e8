//! Instruction decode + execute (spec.md §4.2). One call to [`Cpu::step`]
//! consumes every prefix byte plus the opcode they modify, matching the
//! 8086's own notion of "one instruction".

use super::{Cpu, RepPrefix, SegmentOverride, StepResult, SENTINEL_OPCODE};
use crate::cpu::register::{Reg16, Reg8, SReg};
use crate::memory::Memory;

/// a decoded ModR/M byte: either a register slot or a resolved
/// segment:offset, so callers don't have to re-derive the effective
/// address for every read/write (spec.md §4.2 effective-address table).
struct Modrm {
    reg: u8,
    is_reg: bool,
    rm_reg: u8,
    seg: u16,
    off: u16,
}

impl Cpu {
    pub fn step(&mut self, mem: &mut Memory) -> StepResult {
        let mut seg_override = SegmentOverride::None;
        let mut rep: Option<RepPrefix> = None;
        loop {
            let byte = self.fetch_u8(mem);
            if let Some(ov) = SegmentOverride::from_prefix_byte(byte) {
                seg_override = ov;
                continue;
            }
            match byte {
                0xF2 => {
                    rep = Some(RepPrefix::Repnz);
                    continue;
                }
                0xF3 => {
                    rep = Some(RepPrefix::Repz);
                    continue;
                }
                _ => return self.execute(mem, byte, seg_override, rep),
            }
        }
    }

    fn fetch_u8(&mut self, mem: &Memory) -> u8 {
        let b = mem.read_u8(self.regs.cs, self.regs.ip);
        self.regs.ip = self.regs.ip.wrapping_add(1);
        b
    }

    fn fetch_u16(&mut self, mem: &Memory) -> u16 {
        let w = mem.read_u16(self.regs.cs, self.regs.ip);
        self.regs.ip = self.regs.ip.wrapping_add(2);
        w
    }

    fn fetch_i8(&mut self, mem: &Memory) -> i8 {
        self.fetch_u8(mem) as i8
    }

    fn push16(&mut self, mem: &mut Memory, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        mem.write_u16(self.regs.ss, self.regs.sp, val);
    }

    fn pop16(&mut self, mem: &Memory) -> u16 {
        let val = mem.read_u16(self.regs.ss, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        val
    }

    fn decode_modrm(&mut self, mem: &Memory, seg_override: SegmentOverride) -> Modrm {
        let byte = self.fetch_u8(mem);
        let md = byte >> 6;
        let reg = (byte >> 3) & 7;
        let rm = byte & 7;
        if md == 3 {
            return Modrm { reg, is_reg: true, rm_reg: rm, seg: 0, off: 0 };
        }

        let uses_bp = matches!((md, rm), (_, 2) | (_, 3) | (1, 6) | (2, 6));
        let default_seg = if uses_bp { SReg::SS } else { SReg::DS };
        let seg = seg_override.resolve(&self.regs, default_seg);

        let mut off: u16 = match rm {
            0 => self.regs.bx.wrapping_add(self.regs.si),
            1 => self.regs.bx.wrapping_add(self.regs.di),
            2 => self.regs.bp.wrapping_add(self.regs.si),
            3 => self.regs.bp.wrapping_add(self.regs.di),
            4 => self.regs.si,
            5 => self.regs.di,
            6 => {
                if md == 0 {
                    0
                } else {
                    self.regs.bp
                }
            }
            _ => self.regs.bx,
        };
        if md == 0 && rm == 6 {
            off = self.fetch_u16(mem);
        } else if md == 1 {
            let disp = self.fetch_i8(mem);
            off = off.wrapping_add(disp as u16);
        } else if md == 2 {
            let disp = self.fetch_u16(mem);
            off = off.wrapping_add(disp);
        }
        Modrm { reg, is_reg: false, rm_reg: rm, seg, off }
    }

    fn read_rm8(&self, mem: &Memory, m: &Modrm) -> u8 {
        if m.is_reg {
            self.regs.get8(Reg8::from_bits(m.rm_reg))
        } else {
            mem.read_u8(m.seg, m.off)
        }
    }

    fn write_rm8(&mut self, mem: &mut Memory, m: &Modrm, val: u8) {
        if m.is_reg {
            self.regs.set8(Reg8::from_bits(m.rm_reg), val);
        } else {
            mem.write_u8(m.seg, m.off, val);
        }
    }

    fn read_rm16(&self, mem: &Memory, m: &Modrm) -> u16 {
        if m.is_reg {
            self.regs.get16(Reg16::from_bits(m.rm_reg))
        } else {
            mem.read_u16(m.seg, m.off)
        }
    }

    fn write_rm16(&mut self, mem: &mut Memory, m: &Modrm, val: u16) {
        if m.is_reg {
            self.regs.set16(Reg16::from_bits(m.rm_reg), val);
        } else {
            mem.write_u16(m.seg, m.off, val);
        }
    }

    fn jump_if(&mut self, taken: bool, rel: i8) {
        if taken {
            self.regs.ip = self.regs.ip.wrapping_add(rel as i16 as u16);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        mem: &mut Memory,
        opcode: u8,
        seg_override: SegmentOverride,
        rep: Option<RepPrefix>,
    ) -> StepResult {
        if opcode == SENTINEL_OPCODE {
            let vector = self.fetch_u8(mem);
            return StepResult::Interrupt(vector);
        }

        // 00-3D: the eight ALU groups (ADD/OR/ADC/SBB/AND/SUB/XOR/CMP),
        // each with the same five encodings.
        if opcode < 0x40 && (opcode & 0x07) < 6 {
            let op = (opcode >> 3) & 7;
            let form = opcode & 0x07;
            return self.exec_alu_group(mem, op, form, seg_override);
        }

        match opcode {
            // INC/DEC reg16 (40-4F)
            0x40..=0x47 => {
                let r = Reg16::from_bits(opcode - 0x40);
                let v = self.regs.get16(r);
                let result = self.inc16(v);
                self.regs.set16(r, result);
                StepResult::Continue
            }
            0x48..=0x4F => {
                let r = Reg16::from_bits(opcode - 0x48);
                let v = self.regs.get16(r);
                let result = self.dec16(v);
                self.regs.set16(r, result);
                StepResult::Continue
            }
            // PUSH/POP reg16 (50-5F)
            0x50..=0x57 => {
                let v = self.regs.get16(Reg16::from_bits(opcode - 0x50));
                self.push16(mem, v);
                StepResult::Continue
            }
            0x58..=0x5F => {
                let v = self.pop16(mem);
                self.regs.set16(Reg16::from_bits(opcode - 0x58), v);
                StepResult::Continue
            }
            // Jcc rel8 (70-7F)
            0x70..=0x7F => {
                let rel = self.fetch_i8(mem);
                let taken = self.condition(opcode & 0x0F);
                self.jump_if(taken, rel);
                StepResult::Continue
            }
            // 80/81/82/83: ALU group with immediate, reg field selects op
            0x80 | 0x82 => self.exec_alu_imm8(mem, seg_override, false),
            0x81 => self.exec_alu_imm16(mem, seg_override, false),
            0x83 => self.exec_alu_imm16(mem, seg_override, true),
            // TEST rm,reg
            0x84 => {
                let m = self.decode_modrm(mem, seg_override);
                let a = self.read_rm8(mem, &m);
                let b = self.regs.get8(Reg8::from_bits(m.reg));
                self.flags_logic8(a & b);
                StepResult::Continue
            }
            0x85 => {
                let m = self.decode_modrm(mem, seg_override);
                let a = self.read_rm16(mem, &m);
                let b = self.regs.get16(Reg16::from_bits(m.reg));
                self.flags_logic16(a & b);
                StepResult::Continue
            }
            // XCHG rm,reg
            0x86 => {
                let m = self.decode_modrm(mem, seg_override);
                let a = self.read_rm8(mem, &m);
                let b = self.regs.get8(Reg8::from_bits(m.reg));
                self.write_rm8(mem, &m, b);
                self.regs.set8(Reg8::from_bits(m.reg), a);
                StepResult::Continue
            }
            0x87 => {
                let m = self.decode_modrm(mem, seg_override);
                let a = self.read_rm16(mem, &m);
                let b = self.regs.get16(Reg16::from_bits(m.reg));
                self.write_rm16(mem, &m, b);
                self.regs.set16(Reg16::from_bits(m.reg), a);
                StepResult::Continue
            }
            // MOV rm,reg / reg,rm (88-8B)
            0x88 => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.regs.get8(Reg8::from_bits(m.reg));
                self.write_rm8(mem, &m, v);
                StepResult::Continue
            }
            0x89 => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.regs.get16(Reg16::from_bits(m.reg));
                self.write_rm16(mem, &m, v);
                StepResult::Continue
            }
            0x8A => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.read_rm8(mem, &m);
                self.regs.set8(Reg8::from_bits(m.reg), v);
                StepResult::Continue
            }
            0x8B => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.read_rm16(mem, &m);
                self.regs.set16(Reg16::from_bits(m.reg), v);
                StepResult::Continue
            }
            // MOV rm16,sreg
            0x8C => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.regs.get_sreg(SReg::from_bits(m.reg));
                self.write_rm16(mem, &m, v);
                StepResult::Continue
            }
            // LEA reg,m
            0x8D => {
                let m = self.decode_modrm(mem, seg_override);
                self.regs.set16(Reg16::from_bits(m.reg), m.off);
                StepResult::Continue
            }
            // MOV sreg,rm16
            0x8E => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.read_rm16(mem, &m);
                self.regs.set_sreg(SReg::from_bits(m.reg), v);
                StepResult::Continue
            }
            // POP rm16
            0x8F => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.pop16(mem);
                self.write_rm16(mem, &m, v);
                StepResult::Continue
            }
            0x90 => StepResult::Continue, // NOP
            // XCHG AX,reg16
            0x91..=0x97 => {
                let r = Reg16::from_bits(opcode - 0x90);
                let a = self.regs.ax;
                let b = self.regs.get16(r);
                self.regs.ax = b;
                self.regs.set16(r, a);
                StepResult::Continue
            }
            0x98 => {
                // CBW
                self.regs.ax = (self.regs.get8(Reg8::AL) as i8) as i16 as u16;
                StepResult::Continue
            }
            0x99 => {
                // CWD
                self.regs.dx = if self.regs.ax & 0x8000 != 0 { 0xFFFF } else { 0 };
                StepResult::Continue
            }
            // CALL far direct
            0x9A => {
                let ip = self.fetch_u16(mem);
                let cs = self.fetch_u16(mem);
                self.push16(mem, self.regs.cs);
                self.push16(mem, self.regs.ip);
                self.regs.cs = cs;
                self.regs.ip = ip;
                StepResult::Continue
            }
            0x9C => {
                let w = self.flags.to_word();
                self.push16(mem, w);
                StepResult::Continue
            }
            0x9D => {
                let w = self.pop16(mem);
                self.flags = super::Flags::from_word(w);
                StepResult::Continue
            }
            // MOV AL/AX,moffs and reverse (A0-A3)
            0xA0 => {
                let off = self.fetch_u16(mem);
                let seg = seg_override.resolve(&self.regs, SReg::DS);
                self.regs.set8(Reg8::AL, mem.read_u8(seg, off));
                StepResult::Continue
            }
            0xA1 => {
                let off = self.fetch_u16(mem);
                let seg = seg_override.resolve(&self.regs, SReg::DS);
                self.regs.ax = mem.read_u16(seg, off);
                StepResult::Continue
            }
            0xA2 => {
                let off = self.fetch_u16(mem);
                let seg = seg_override.resolve(&self.regs, SReg::DS);
                mem.write_u8(seg, off, self.regs.get8(Reg8::AL));
                StepResult::Continue
            }
            0xA3 => {
                let off = self.fetch_u16(mem);
                let seg = seg_override.resolve(&self.regs, SReg::DS);
                mem.write_u16(seg, off, self.regs.ax);
                StepResult::Continue
            }
            // string ops (A4-AF), with REP handling
            0xA4 => self.rep_string(mem, rep, seg_override, false, Self::movsb),
            0xA5 => self.rep_string(mem, rep, seg_override, false, Self::movsw),
            0xA6 => self.rep_string(mem, rep, seg_override, true, Self::cmpsb),
            0xA7 => self.rep_string(mem, rep, seg_override, true, Self::cmpsw),
            0xAA => self.rep_string(mem, rep, seg_override, false, Self::stosb),
            0xAB => self.rep_string(mem, rep, seg_override, false, Self::stosw),
            0xAC => self.rep_string(mem, rep, seg_override, false, Self::lodsb),
            0xAD => self.rep_string(mem, rep, seg_override, false, Self::lodsw),
            0xAE => self.rep_string(mem, rep, seg_override, true, Self::scasb),
            0xAF => self.rep_string(mem, rep, seg_override, true, Self::scasw),
            // MOV reg8,imm8 (B0-B7)
            0xB0..=0xB7 => {
                let v = self.fetch_u8(mem);
                self.regs.set8(Reg8::from_bits(opcode - 0xB0), v);
                StepResult::Continue
            }
            // MOV reg16,imm16 (B8-BF)
            0xB8..=0xBF => {
                let v = self.fetch_u16(mem);
                self.regs.set16(Reg16::from_bits(opcode - 0xB8), v);
                StepResult::Continue
            }
            // RET near, with/without imm16 pop
            0xC2 => {
                let n = self.fetch_u16(mem);
                self.regs.ip = self.pop16(mem);
                self.regs.sp = self.regs.sp.wrapping_add(n);
                StepResult::Continue
            }
            0xC3 => {
                self.regs.ip = self.pop16(mem);
                StepResult::Continue
            }
            // MOV rm8/rm16,imm
            0xC6 => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.fetch_u8(mem);
                self.write_rm8(mem, &m, v);
                StepResult::Continue
            }
            0xC7 => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.fetch_u16(mem);
                self.write_rm16(mem, &m, v);
                StepResult::Continue
            }
            // RET far, with/without imm16 pop
            0xCA => {
                let n = self.fetch_u16(mem);
                self.regs.ip = self.pop16(mem);
                self.regs.cs = self.pop16(mem);
                self.regs.sp = self.regs.sp.wrapping_add(n);
                StepResult::Continue
            }
            0xCB => {
                self.regs.ip = self.pop16(mem);
                self.regs.cs = self.pop16(mem);
                StepResult::Continue
            }
            0xCC => self.software_interrupt(mem, 3),
            0xCD => {
                let vector = self.fetch_u8(mem);
                self.software_interrupt(mem, vector)
            }
            0xCE => {
                if self.flags.overflow {
                    self.software_interrupt(mem, 4)
                } else {
                    StepResult::Continue
                }
            }
            0xCF => {
                self.regs.ip = self.pop16(mem);
                self.regs.cs = self.pop16(mem);
                let w = self.pop16(mem);
                self.flags = super::Flags::from_word(w);
                StepResult::Continue
            }
            // shift/rotate groups
            0xD0 => self.exec_shift_group(mem, seg_override, 1, false),
            0xD1 => self.exec_shift_group(mem, seg_override, 1, true),
            0xD2 => {
                let count = self.regs.get8(Reg8::CL);
                self.exec_shift_group(mem, seg_override, count, false)
            }
            0xD3 => {
                let count = self.regs.get8(Reg8::CL);
                self.exec_shift_group(mem, seg_override, count, true)
            }
            0xD4 => {
                let base = self.fetch_u8(mem); // always 0x0A
                self.aam(base)
            }
            0xD5 => {
                let base = self.fetch_u8(mem);
                self.aad(base)
            }
            // LOOP family
            0xE0 => {
                let rel = self.fetch_i8(mem);
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                self.jump_if(self.regs.cx != 0 && !self.flags.zero, rel);
                StepResult::Continue
            }
            0xE1 => {
                let rel = self.fetch_i8(mem);
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                self.jump_if(self.regs.cx != 0 && self.flags.zero, rel);
                StepResult::Continue
            }
            0xE2 => {
                let rel = self.fetch_i8(mem);
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                self.jump_if(self.regs.cx != 0, rel);
                StepResult::Continue
            }
            0xE3 => {
                let rel = self.fetch_i8(mem);
                self.jump_if(self.regs.cx == 0, rel);
                StepResult::Continue
            }
            // CALL/JMP near/short
            0xE8 => {
                let rel = self.fetch_u16(mem);
                self.push16(mem, self.regs.ip);
                self.regs.ip = self.regs.ip.wrapping_add(rel);
                StepResult::Continue
            }
            0xE9 => {
                let rel = self.fetch_u16(mem);
                self.regs.ip = self.regs.ip.wrapping_add(rel);
                StepResult::Continue
            }
            0xEA => {
                let ip = self.fetch_u16(mem);
                let cs = self.fetch_u16(mem);
                self.regs.ip = ip;
                self.regs.cs = cs;
                StepResult::Continue
            }
            0xEB => {
                let rel = self.fetch_i8(mem);
                self.regs.ip = self.regs.ip.wrapping_add(rel as i16 as u16);
                StepResult::Continue
            }
            0xF4 => StepResult::Halt,
            0xF5 => {
                self.flags.carry = !self.flags.carry;
                StepResult::Continue
            }
            0xF6 => self.exec_unary_group8(mem, seg_override),
            0xF7 => self.exec_unary_group16(mem, seg_override),
            0xF8 => {
                self.flags.carry = false;
                StepResult::Continue
            }
            0xF9 => {
                self.flags.carry = true;
                StepResult::Continue
            }
            0xFA => {
                self.flags.interrupt = false;
                StepResult::Continue
            }
            0xFB => {
                self.flags.interrupt = true;
                StepResult::Continue
            }
            0xFC => {
                self.flags.direction = false;
                StepResult::Continue
            }
            0xFD => {
                self.flags.direction = true;
                StepResult::Continue
            }
            0xFE => {
                let m = self.decode_modrm(mem, seg_override);
                let v = self.read_rm8(mem, &m);
                let result = if m.reg == 0 { self.inc8(v) } else { self.dec8(v) };
                self.write_rm8(mem, &m, result);
                StepResult::Continue
            }
            0xFF => self.exec_group_ff(mem, seg_override),
            0x27 => {
                self.daa();
                StepResult::Continue
            }
            0x2F => {
                self.das();
                StepResult::Continue
            }
            0x37 => {
                self.aaa();
                StepResult::Continue
            }
            0x3F => {
                self.aas();
                StepResult::Continue
            }
            // PUSH/POP segment registers
            0x06 => {
                self.push16(mem, self.regs.es);
                StepResult::Continue
            }
            0x07 => {
                self.regs.es = self.pop16(mem);
                StepResult::Continue
            }
            0x0E => {
                self.push16(mem, self.regs.cs);
                StepResult::Continue
            }
            0x16 => {
                self.push16(mem, self.regs.ss);
                StepResult::Continue
            }
            0x17 => {
                self.regs.ss = self.pop16(mem);
                StepResult::Continue
            }
            0x1E => {
                self.push16(mem, self.regs.ds);
                StepResult::Continue
            }
            0x1F => {
                self.regs.ds = self.pop16(mem);
                StepResult::Continue
            }
            other => StepResult::Fault(format!("unimplemented opcode {:#04x}", other)),
        }
    }

    fn condition(&self, cc: u8) -> bool {
        let f = &self.flags;
        match cc {
            0x0 => f.overflow,                                   // JO
            0x1 => !f.overflow,                                   // JNO
            0x2 => f.carry,                                       // JB/JC
            0x3 => !f.carry,                                      // JNB/JNC
            0x4 => f.zero,                                        // JE/JZ
            0x5 => !f.zero,                                       // JNE/JNZ
            0x6 => f.carry || f.zero,                             // JBE
            0x7 => !f.carry && !f.zero,                           // JA
            0x8 => f.sign,                                        // JS
            0x9 => !f.sign,                                       // JNS
            0xA => f.parity_even,                                 // JP/JPE
            0xB => !f.parity_even,                                // JNP/JPO
            0xC => f.sign != f.overflow,                          // JL
            0xD => f.sign == f.overflow,                          // JGE
            0xE => f.zero || (f.sign != f.overflow),              // JLE
            _ => !f.zero && (f.sign == f.overflow),               // JG
        }
    }

    /// Pushes `FLAGS`/`CS`/`IP`, clears `IF`/`TF`, and jumps through the
    /// vector table. Used both for the guest's own `INT imm8` and by
    /// `Machine` to raise hardware interrupts (timer, keyboard) exactly as
    /// real hardware would (spec.md §4.2, §5).
    pub(crate) fn software_interrupt(&mut self, mem: &mut Memory, vector: u8) -> StepResult {
        let flags_word = self.flags.to_word();
        self.push16(mem, flags_word);
        self.push16(mem, self.regs.cs);
        self.push16(mem, self.regs.ip);
        self.flags.interrupt = false;
        self.flags.trap = false;
        let off = u16::from(vector) * 4;
        self.regs.ip = mem.read_u16(0, off);
        self.regs.cs = mem.read_u16(0, off + 2);
        StepResult::Continue
    }

    fn exec_alu_group(&mut self, mem: &mut Memory, op: u8, form: u8, ov: SegmentOverride) -> StepResult {
        match form {
            0x00 => {
                let m = self.decode_modrm(mem, ov);
                let a = self.read_rm8(mem, &m);
                let b = self.regs.get8(Reg8::from_bits(m.reg));
                let r = self.alu8(op, a, b);
                if op != 7 {
                    self.write_rm8(mem, &m, r);
                }
            }
            0x01 => {
                let m = self.decode_modrm(mem, ov);
                let a = self.read_rm16(mem, &m);
                let b = self.regs.get16(Reg16::from_bits(m.reg));
                let r = self.alu16(op, a, b);
                if op != 7 {
                    self.write_rm16(mem, &m, r);
                }
            }
            0x02 => {
                let m = self.decode_modrm(mem, ov);
                let a = self.regs.get8(Reg8::from_bits(m.reg));
                let b = self.read_rm8(mem, &m);
                let r = self.alu8(op, a, b);
                if op != 7 {
                    self.regs.set8(Reg8::from_bits(m.reg), r);
                }
            }
            0x03 => {
                let m = self.decode_modrm(mem, ov);
                let a = self.regs.get16(Reg16::from_bits(m.reg));
                let b = self.read_rm16(mem, &m);
                let r = self.alu16(op, a, b);
                if op != 7 {
                    self.regs.set16(Reg16::from_bits(m.reg), r);
                }
            }
            0x04 => {
                let a = self.regs.get8(Reg8::AL);
                let b = self.fetch_u8(mem);
                let r = self.alu8(op, a, b);
                if op != 7 {
                    self.regs.set8(Reg8::AL, r);
                }
            }
            _ => {
                let a = self.regs.ax;
                let b = self.fetch_u16(mem);
                let r = self.alu16(op, a, b);
                if op != 7 {
                    self.regs.ax = r;
                }
            }
        }
        StepResult::Continue
    }

    fn exec_alu_imm8(&mut self, mem: &mut Memory, ov: SegmentOverride, _sign_ext: bool) -> StepResult {
        let m = self.decode_modrm(mem, ov);
        let imm = self.fetch_u8(mem);
        let a = self.read_rm8(mem, &m);
        let r = self.alu8(m.reg, a, imm);
        if m.reg != 7 {
            self.write_rm8(mem, &m, r);
        }
        StepResult::Continue
    }

    fn exec_alu_imm16(&mut self, mem: &mut Memory, ov: SegmentOverride, sign_ext: bool) -> StepResult {
        let m = self.decode_modrm(mem, ov);
        let imm = if sign_ext {
            self.fetch_i8(mem) as i16 as u16
        } else {
            self.fetch_u16(mem)
        };
        let a = self.read_rm16(mem, &m);
        let r = self.alu16(m.reg, a, imm);
        if m.reg != 7 {
            self.write_rm16(mem, &m, r);
        }
        StepResult::Continue
    }

    /// op: 0=ADD 1=OR 2=ADC 3=SBB 4=AND 5=SUB 6=XOR 7=CMP
    fn alu8(&mut self, op: u8, a: u8, b: u8) -> u8 {
        match op {
            0 => self.add8(a, b, false),
            1 => {
                let r = a | b;
                self.flags_logic8(r);
                r
            }
            2 => self.add8(a, b, true),
            3 => self.sub8(a, b, true),
            4 => {
                let r = a & b;
                self.flags_logic8(r);
                r
            }
            5 | 7 => self.sub8(a, b, false),
            _ => {
                let r = a ^ b;
                self.flags_logic8(r);
                r
            }
        }
    }

    fn alu16(&mut self, op: u8, a: u16, b: u16) -> u16 {
        match op {
            0 => self.add16(a, b, false),
            1 => {
                let r = a | b;
                self.flags_logic16(r);
                r
            }
            2 => self.add16(a, b, true),
            3 => self.sub16(a, b, true),
            4 => {
                let r = a & b;
                self.flags_logic16(r);
                r
            }
            5 | 7 => self.sub16(a, b, false),
            _ => {
                let r = a ^ b;
                self.flags_logic16(r);
                r
            }
        }
    }

    fn add8(&mut self, a: u8, b: u8, carry_in: bool) -> u8 {
        let c = if carry_in && self.flags.carry { 1u16 } else { 0 };
        let sum = u16::from(a) + u16::from(b) + c;
        let r = sum as u8;
        self.flags.carry = sum > 0xFF;
        self.flags.aux_carry = (a & 0x0F) + (b & 0x0F) + (c as u8) > 0x0F;
        self.flags.overflow = (a ^ b ^ 0x80) & (a ^ r) & 0x80 != 0;
        self.flags.set_szp8(r);
        r
    }

    fn add16(&mut self, a: u16, b: u16, carry_in: bool) -> u16 {
        let c = if carry_in && self.flags.carry { 1u32 } else { 0 };
        let sum = u32::from(a) + u32::from(b) + c;
        let r = sum as u16;
        self.flags.carry = sum > 0xFFFF;
        self.flags.aux_carry = (a & 0x0F) + (b & 0x0F) + (c as u16) > 0x0F;
        self.flags.overflow = (a ^ b ^ 0x8000) & (a ^ r) & 0x8000 != 0;
        self.flags.set_szp16(r);
        r
    }

    fn sub8(&mut self, a: u8, b: u8, borrow_in: bool) -> u8 {
        let bor = if borrow_in && self.flags.carry { 1u16 } else { 0 };
        let diff = i16::from(a) - i16::from(b) - bor as i16;
        let r = diff as u8;
        self.flags.carry = diff < 0;
        self.flags.aux_carry = (i16::from(a & 0x0F) - i16::from(b & 0x0F) - bor as i16) < 0;
        self.flags.overflow = (a ^ b) & (a ^ r) & 0x80 != 0;
        self.flags.set_szp8(r);
        r
    }

    fn sub16(&mut self, a: u16, b: u16, borrow_in: bool) -> u16 {
        let bor = if borrow_in && self.flags.carry { 1i32 } else { 0 };
        let diff = i32::from(a) - i32::from(b) - bor;
        let r = diff as u16;
        self.flags.carry = diff < 0;
        self.flags.aux_carry = (i32::from(a & 0x0F) - i32::from(b & 0x0F) - bor) < 0;
        self.flags.overflow = (a ^ b) & (a ^ r) & 0x8000 != 0;
        self.flags.set_szp16(r);
        r
    }

    fn flags_logic8(&mut self, r: u8) {
        self.flags.carry = false;
        self.flags.overflow = false;
        self.flags.set_szp8(r);
    }

    fn flags_logic16(&mut self, r: u16) {
        self.flags.carry = false;
        self.flags.overflow = false;
        self.flags.set_szp16(r);
    }

    fn inc8(&mut self, a: u8) -> u8 {
        let saved_cf = self.flags.carry;
        let r = self.add8(a, 1, false);
        self.flags.carry = saved_cf; // INC/DEC never touch CF
        r
    }

    fn dec8(&mut self, a: u8) -> u8 {
        let saved_cf = self.flags.carry;
        let r = self.sub8(a, 1, false);
        self.flags.carry = saved_cf;
        r
    }

    fn inc16(&mut self, a: u16) -> u16 {
        let saved_cf = self.flags.carry;
        let r = self.add16(a, 1, false);
        self.flags.carry = saved_cf;
        r
    }

    fn dec16(&mut self, a: u16) -> u16 {
        let saved_cf = self.flags.carry;
        let r = self.sub16(a, 1, false);
        self.flags.carry = saved_cf;
        r
    }

    fn exec_shift_group(&mut self, mem: &mut Memory, ov: SegmentOverride, count: u8, wide: bool) -> StepResult {
        let m = self.decode_modrm(mem, ov);
        let count = count & 0x1F; // 8086 doesn't mask, real silicon effectively ignores bits above 5 for our purposes
        if wide {
            let v = self.read_rm16(mem, &m);
            let r = self.shift16(m.reg, v, count);
            self.write_rm16(mem, &m, r);
        } else {
            let v = self.read_rm8(mem, &m);
            let r = self.shift8(m.reg, v, count);
            self.write_rm8(mem, &m, r);
        }
        StepResult::Continue
    }

    fn shift8(&mut self, kind: u8, mut v: u8, count: u8) -> u8 {
        if count == 0 {
            return v;
        }
        for i in 0..count {
            let last = i == count - 1;
            match kind {
                0 => {
                    let cf = v & 0x80 != 0;
                    v = v.rotate_left(1);
                    if last {
                        self.flags.carry = cf;
                        self.flags.overflow = cf != (v & 0x80 != 0);
                    }
                }
                1 => {
                    let cf = v & 0x01 != 0;
                    v = v.rotate_right(1);
                    if last {
                        self.flags.carry = cf;
                        self.flags.overflow = (v & 0x80 != 0) != (v & 0x40 != 0);
                    }
                }
                2 => {
                    let cf_in = self.flags.carry;
                    let cf_out = v & 0x80 != 0;
                    v = (v << 1) | (cf_in as u8);
                    self.flags.carry = cf_out;
                    if last {
                        self.flags.overflow = cf_out != (v & 0x80 != 0);
                    }
                }
                3 => {
                    let cf_in = self.flags.carry;
                    let cf_out = v & 0x01 != 0;
                    v = (v >> 1) | ((cf_in as u8) << 7);
                    self.flags.carry = cf_out;
                    if last {
                        self.flags.overflow = (v & 0x80 != 0) != ((v << 1) & 0x80 != 0);
                    }
                }
                4 | 6 => {
                    let cf = v & 0x80 != 0;
                    let prev = v;
                    v <<= 1;
                    self.flags.carry = cf;
                    if last {
                        self.flags.overflow = (prev & 0x80 != 0) != (v & 0x80 != 0);
                        self.flags.set_szp8(v);
                    }
                }
                5 => {
                    let cf = v & 0x01 != 0;
                    let msb = v & 0x80;
                    v >>= 1;
                    self.flags.carry = cf;
                    if last {
                        self.flags.overflow = msb != 0;
                        self.flags.set_szp8(v);
                    }
                }
                _ => {
                    let cf = v & 0x01 != 0;
                    v = ((v as i8) >> 1) as u8;
                    self.flags.carry = cf;
                    if last {
                        self.flags.overflow = false;
                        self.flags.set_szp8(v);
                    }
                }
            }
        }
        v
    }

    fn shift16(&mut self, kind: u8, mut v: u16, count: u8) -> u16 {
        if count == 0 {
            return v;
        }
        for i in 0..count {
            let last = i == count - 1;
            match kind {
                0 => {
                    let cf = v & 0x8000 != 0;
                    v = v.rotate_left(1);
                    if last {
                        self.flags.carry = cf;
                        self.flags.overflow = cf != (v & 0x8000 != 0);
                    }
                }
                1 => {
                    let cf = v & 0x0001 != 0;
                    v = v.rotate_right(1);
                    if last {
                        self.flags.carry = cf;
                        self.flags.overflow = (v & 0x8000 != 0) != (v & 0x4000 != 0);
                    }
                }
                2 => {
                    let cf_in = self.flags.carry;
                    let cf_out = v & 0x8000 != 0;
                    v = (v << 1) | (cf_in as u16);
                    self.flags.carry = cf_out;
                    if last {
                        self.flags.overflow = cf_out != (v & 0x8000 != 0);
                    }
                }
                3 => {
                    let cf_in = self.flags.carry;
                    let cf_out = v & 0x0001 != 0;
                    v = (v >> 1) | ((cf_in as u16) << 15);
                    self.flags.carry = cf_out;
                    if last {
                        self.flags.overflow = (v & 0x8000 != 0) != ((v << 1) & 0x8000 != 0);
                    }
                }
                4 | 6 => {
                    let cf = v & 0x8000 != 0;
                    let prev = v;
                    v <<= 1;
                    self.flags.carry = cf;
                    if last {
                        self.flags.overflow = (prev & 0x8000 != 0) != (v & 0x8000 != 0);
                        self.flags.set_szp16(v);
                    }
                }
                5 => {
                    let cf = v & 0x0001 != 0;
                    let msb = v & 0x8000;
                    v >>= 1;
                    self.flags.carry = cf;
                    if last {
                        self.flags.overflow = msb != 0;
                        self.flags.set_szp16(v);
                    }
                }
                _ => {
                    let cf = v & 0x0001 != 0;
                    v = ((v as i16) >> 1) as u16;
                    self.flags.carry = cf;
                    if last {
                        self.flags.overflow = false;
                        self.flags.set_szp16(v);
                    }
                }
            }
        }
        v
    }

    fn exec_unary_group8(&mut self, mem: &mut Memory, ov: SegmentOverride) -> StepResult {
        let m = self.decode_modrm(mem, ov);
        match m.reg {
            0 | 1 => {
                let imm = self.fetch_u8(mem);
                let a = self.read_rm8(mem, &m);
                self.flags_logic8(a & imm);
            }
            2 => {
                let a = self.read_rm8(mem, &m);
                self.write_rm8(mem, &m, !a);
            }
            3 => {
                let a = self.read_rm8(mem, &m);
                let r = self.sub8(0, a, false);
                self.flags.carry = a != 0;
                self.write_rm8(mem, &m, r);
            }
            4 => {
                let a = self.regs.get8(Reg8::AL);
                let b = self.read_rm8(mem, &m);
                let r = u16::from(a) * u16::from(b);
                self.regs.ax = r;
                self.flags.carry = r > 0xFF;
                self.flags.overflow = self.flags.carry;
                self.flags.set_szp8(r as u8);
            }
            5 => {
                let a = self.regs.get8(Reg8::AL) as i8;
                let b = self.read_rm8(mem, &m) as i8;
                let r = i16::from(a) * i16::from(b);
                self.regs.ax = r as u16;
                let fits = r >= -128 && r <= 127;
                self.flags.carry = !fits;
                self.flags.overflow = !fits;
                self.flags.set_szp8(r as u8);
            }
            6 => {
                let divisor = self.read_rm8(mem, &m);
                if divisor == 0 {
                    return self.software_interrupt(mem, 0);
                }
                let dividend = self.regs.ax;
                self.regs.set8(Reg8::AL, (dividend / u16::from(divisor)) as u8);
                self.regs.set8(Reg8::AH, (dividend % u16::from(divisor)) as u8);
            }
            _ => {
                let divisor = self.read_rm8(mem, &m) as i8;
                if divisor == 0 {
                    return self.software_interrupt(mem, 0);
                }
                let dividend = self.regs.ax as i16;
                self.regs.set8(Reg8::AL, (dividend / i16::from(divisor)) as u8);
                self.regs.set8(Reg8::AH, (dividend % i16::from(divisor)) as u8);
            }
        }
        StepResult::Continue
    }

    fn exec_unary_group16(&mut self, mem: &mut Memory, ov: SegmentOverride) -> StepResult {
        let m = self.decode_modrm(mem, ov);
        match m.reg {
            0 | 1 => {
                let imm = self.fetch_u16(mem);
                let a = self.read_rm16(mem, &m);
                self.flags_logic16(a & imm);
            }
            2 => {
                let a = self.read_rm16(mem, &m);
                self.write_rm16(mem, &m, !a);
            }
            3 => {
                let a = self.read_rm16(mem, &m);
                let r = self.sub16(0, a, false);
                self.flags.carry = a != 0;
                self.write_rm16(mem, &m, r);
            }
            4 => {
                let a = self.regs.ax;
                let b = self.read_rm16(mem, &m);
                let r = u32::from(a) * u32::from(b);
                self.regs.ax = r as u16;
                self.regs.dx = (r >> 16) as u16;
                self.flags.carry = r > 0xFFFF;
                self.flags.overflow = self.flags.carry;
                self.flags.set_szp16(self.regs.ax);
            }
            5 => {
                let a = self.regs.ax as i16;
                let b = self.read_rm16(mem, &m) as i16;
                let r = i32::from(a) * i32::from(b);
                self.regs.ax = r as u16;
                self.regs.dx = (r >> 16) as u16;
                let fits = r >= -32768 && r <= 32767;
                self.flags.carry = !fits;
                self.flags.overflow = !fits;
                self.flags.set_szp16(self.regs.ax);
            }
            6 => {
                let divisor = self.read_rm16(mem, &m);
                if divisor == 0 {
                    return self.software_interrupt(mem, 0);
                }
                let dividend = u32::from(self.regs.dx) << 16 | u32::from(self.regs.ax);
                self.regs.ax = (dividend / u32::from(divisor)) as u16;
                self.regs.dx = (dividend % u32::from(divisor)) as u16;
            }
            _ => {
                let divisor = self.read_rm16(mem, &m) as i16;
                if divisor == 0 {
                    return self.software_interrupt(mem, 0);
                }
                let dividend = (i32::from(self.regs.dx) << 16) | i32::from(self.regs.ax);
                self.regs.ax = (dividend / i32::from(divisor)) as u16;
                self.regs.dx = (dividend % i32::from(divisor)) as u16;
            }
        }
        StepResult::Continue
    }

    fn exec_group_ff(&mut self, mem: &mut Memory, ov: SegmentOverride) -> StepResult {
        let m = self.decode_modrm(mem, ov);
        match m.reg {
            0 => {
                let v = self.read_rm16(mem, &m);
                let r = self.inc16(v);
                self.write_rm16(mem, &m, r);
            }
            1 => {
                let v = self.read_rm16(mem, &m);
                let r = self.dec16(v);
                self.write_rm16(mem, &m, r);
            }
            2 => {
                let target = self.read_rm16(mem, &m);
                self.push16(mem, self.regs.ip);
                self.regs.ip = target;
            }
            3 => {
                let ip = mem.read_u16(m.seg, m.off);
                let cs = mem.read_u16(m.seg, m.off.wrapping_add(2));
                self.push16(mem, self.regs.cs);
                self.push16(mem, self.regs.ip);
                self.regs.ip = ip;
                self.regs.cs = cs;
            }
            4 => {
                self.regs.ip = self.read_rm16(mem, &m);
            }
            5 => {
                self.regs.ip = mem.read_u16(m.seg, m.off);
                self.regs.cs = mem.read_u16(m.seg, m.off.wrapping_add(2));
            }
            _ => {
                let v = self.read_rm16(mem, &m);
                self.push16(mem, v);
            }
        }
        StepResult::Continue
    }

    fn daa(&mut self) {
        let al = self.regs.get8(Reg8::AL);
        let mut new_al = al;
        let old_cf = self.flags.carry;
        self.flags.carry = false;
        if (al & 0x0F) > 9 || self.flags.aux_carry {
            new_al = new_al.wrapping_add(6);
            self.flags.aux_carry = true;
            self.flags.carry = old_cf || al > 0xF9;
        }
        if al > 0x99 || old_cf {
            new_al = new_al.wrapping_add(0x60);
            self.flags.carry = true;
        }
        self.regs.set8(Reg8::AL, new_al);
        self.flags.set_szp8(new_al);
    }

    fn das(&mut self) {
        let al = self.regs.get8(Reg8::AL);
        let mut new_al = al;
        let old_cf = self.flags.carry;
        self.flags.carry = false;
        if (al & 0x0F) > 9 || self.flags.aux_carry {
            new_al = new_al.wrapping_sub(6);
            self.flags.aux_carry = true;
            self.flags.carry = old_cf || al < 6;
        }
        if al > 0x99 || old_cf {
            new_al = new_al.wrapping_sub(0x60);
            self.flags.carry = true;
        }
        self.regs.set8(Reg8::AL, new_al);
        self.flags.set_szp8(new_al);
    }

    fn aaa(&mut self) {
        let al = self.regs.get8(Reg8::AL);
        if (al & 0x0F) > 9 || self.flags.aux_carry {
            let new_al = al.wrapping_add(6);
            self.regs.set8(Reg8::AL, new_al & 0x0F);
            self.regs.set8(Reg8::AH, self.regs.get8(Reg8::AH).wrapping_add(1));
            self.flags.aux_carry = true;
            self.flags.carry = true;
        } else {
            self.regs.set8(Reg8::AL, al & 0x0F);
            self.flags.aux_carry = false;
            self.flags.carry = false;
        }
    }

    fn aas(&mut self) {
        let al = self.regs.get8(Reg8::AL);
        if (al & 0x0F) > 9 || self.flags.aux_carry {
            let new_al = al.wrapping_sub(6);
            self.regs.set8(Reg8::AL, new_al & 0x0F);
            self.regs.set8(Reg8::AH, self.regs.get8(Reg8::AH).wrapping_sub(1));
            self.flags.aux_carry = true;
            self.flags.carry = true;
        } else {
            self.regs.set8(Reg8::AL, al & 0x0F);
            self.flags.aux_carry = false;
            self.flags.carry = false;
        }
    }

    fn aam(&mut self, base: u8) -> StepResult {
        let al = self.regs.get8(Reg8::AL);
        if base == 0 {
            return StepResult::Fault("AAM with zero base".into());
        }
        self.regs.set8(Reg8::AH, al / base);
        self.regs.set8(Reg8::AL, al % base);
        let r = self.regs.get8(Reg8::AL);
        self.flags.set_szp8(r);
        StepResult::Continue
    }

    fn aad(&mut self, base: u8) -> StepResult {
        let al = self.regs.get8(Reg8::AL);
        let ah = self.regs.get8(Reg8::AH);
        let r = al.wrapping_add(ah.wrapping_mul(base));
        self.regs.set8(Reg8::AL, r);
        self.regs.set8(Reg8::AH, 0);
        self.flags.set_szp8(r);
        StepResult::Continue
    }

    // string primitives: each advances SI/DI by +1/-1 per DF and returns
    // whether CMPS/SCAS should keep repeating under REPZ/REPNZ.
    fn movsb(&mut self, mem: &mut Memory, ov: SegmentOverride) -> bool {
        let src_seg = ov.resolve(&self.regs, SReg::DS);
        let b = mem.read_u8(src_seg, self.regs.si);
        mem.write_u8(self.regs.es, self.regs.di, b);
        self.step_index(1);
        true
    }

    fn movsw(&mut self, mem: &mut Memory, ov: SegmentOverride) -> bool {
        let src_seg = ov.resolve(&self.regs, SReg::DS);
        let w = mem.read_u16(src_seg, self.regs.si);
        mem.write_u16(self.regs.es, self.regs.di, w);
        self.step_index(2);
        true
    }

    fn stosb(&mut self, mem: &mut Memory, _ov: SegmentOverride) -> bool {
        let v = self.regs.get8(Reg8::AL);
        mem.write_u8(self.regs.es, self.regs.di, v);
        self.regs.di = self.step_one(self.regs.di, 1);
        true
    }

    fn stosw(&mut self, mem: &mut Memory, _ov: SegmentOverride) -> bool {
        let v = self.regs.ax;
        mem.write_u16(self.regs.es, self.regs.di, v);
        self.regs.di = self.step_one(self.regs.di, 2);
        true
    }

    fn lodsb(&mut self, mem: &mut Memory, ov: SegmentOverride) -> bool {
        let seg = ov.resolve(&self.regs, SReg::DS);
        let v = mem.read_u8(seg, self.regs.si);
        self.regs.set8(Reg8::AL, v);
        self.regs.si = self.step_one(self.regs.si, 1);
        true
    }

    fn lodsw(&mut self, mem: &mut Memory, ov: SegmentOverride) -> bool {
        let seg = ov.resolve(&self.regs, SReg::DS);
        let v = mem.read_u16(seg, self.regs.si);
        self.regs.ax = v;
        self.regs.si = self.step_one(self.regs.si, 2);
        true
    }

    fn cmpsb(&mut self, mem: &mut Memory, ov: SegmentOverride) -> bool {
        let src_seg = ov.resolve(&self.regs, SReg::DS);
        let a = mem.read_u8(src_seg, self.regs.si);
        let b = mem.read_u8(self.regs.es, self.regs.di);
        self.sub8(a, b, false);
        self.step_index(1);
        self.flags.zero
    }

    fn cmpsw(&mut self, mem: &mut Memory, ov: SegmentOverride) -> bool {
        let src_seg = ov.resolve(&self.regs, SReg::DS);
        let a = mem.read_u16(src_seg, self.regs.si);
        let b = mem.read_u16(self.regs.es, self.regs.di);
        self.sub16(a, b, false);
        self.step_index(2);
        self.flags.zero
    }

    fn scasb(&mut self, mem: &mut Memory, _ov: SegmentOverride) -> bool {
        let a = self.regs.get8(Reg8::AL);
        let b = mem.read_u8(self.regs.es, self.regs.di);
        self.sub8(a, b, false);
        self.regs.di = self.step_one(self.regs.di, 1);
        self.flags.zero
    }

    fn scasw(&mut self, mem: &mut Memory, _ov: SegmentOverride) -> bool {
        let a = self.regs.ax;
        let b = mem.read_u16(self.regs.es, self.regs.di);
        self.sub16(a, b, false);
        self.regs.di = self.step_one(self.regs.di, 2);
        self.flags.zero
    }

    fn step_one(&self, index: u16, n: u16) -> u16 {
        if self.flags.direction {
            index.wrapping_sub(n)
        } else {
            index.wrapping_add(n)
        }
    }

    /// MOVS/CMPS advance both SI and DI together.
    fn step_index(&mut self, n: u16) {
        self.regs.si = self.step_one(self.regs.si, n);
        self.regs.di = self.step_one(self.regs.di, n);
    }

    fn rep_string(
        &mut self,
        mem: &mut Memory,
        rep: Option<RepPrefix>,
        ov: SegmentOverride,
        zero_sensitive: bool,
        op: fn(&mut Cpu, &mut Memory, SegmentOverride) -> bool,
    ) -> StepResult {
        match rep {
            None => {
                op(self, mem, ov);
            }
            Some(kind) => {
                while self.regs.cx != 0 {
                    self.regs.cx = self.regs.cx.wrapping_sub(1);
                    let zero = op(self, mem, ov);
                    if zero_sensitive {
                        let stop = match kind {
                            RepPrefix::Repz => !zero,
                            RepPrefix::Repnz => zero,
                        };
                        if stop {
                            break;
                        }
                    }
                }
            }
        }
        StepResult::Continue
    }
}
