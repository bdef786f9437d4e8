use super::*;

#[test]
fn high_low_byte_views_overlap_the_word() {
    let mut regs = Registers::default();
    regs.set16(Reg16::AX, 0x1234);
    assert_eq!(regs.get8(Reg8::AL), 0x34);
    assert_eq!(regs.get8(Reg8::AH), 0x12);
    regs.set8(Reg8::AL, 0xFF);
    assert_eq!(regs.get16(Reg16::AX), 0x12FF);
    regs.set8(Reg8::AH, 0x00);
    assert_eq!(regs.get16(Reg16::AX), 0x00FF);
}

#[test]
fn from_bits_decodes_all_eight_slots() {
    for bits in 0..8u8 {
        let r = Reg16::from_bits(bits);
        assert_eq!(Reg16::from_bits(bits | 0x08), r); // only low 3 bits matter
    }
    assert_eq!(Reg8::from_bits(0), Reg8::AL);
    assert_eq!(Reg8::from_bits(4), Reg8::AH);
    assert_eq!(SReg::from_bits(0), SReg::ES);
    assert_eq!(SReg::from_bits(3), SReg::DS);
}

#[test]
fn segment_registers_round_trip() {
    let mut regs = Registers::default();
    regs.set_sreg(SReg::DS, 0x2000);
    assert_eq!(regs.get_sreg(SReg::DS), 0x2000);
}
