use super::*;

#[test]
fn recognizes_all_four_override_prefixes() {
    assert_eq!(SegmentOverride::from_prefix_byte(0x26), Some(SegmentOverride::Es));
    assert_eq!(SegmentOverride::from_prefix_byte(0x2E), Some(SegmentOverride::Cs));
    assert_eq!(SegmentOverride::from_prefix_byte(0x36), Some(SegmentOverride::Ss));
    assert_eq!(SegmentOverride::from_prefix_byte(0x3E), Some(SegmentOverride::Ds));
    assert_eq!(SegmentOverride::from_prefix_byte(0x90), None);
}

#[test]
fn none_resolves_to_the_supplied_default() {
    let regs = Registers { ds: 0x1234, ..Registers::default() };
    assert_eq!(SegmentOverride::None.resolve(&regs, SReg::DS), 0x1234);
}

#[test]
fn override_replaces_the_default() {
    let regs = Registers { ds: 0x1234, es: 0x5678, ..Registers::default() };
    assert_eq!(SegmentOverride::Es.resolve(&regs, SReg::DS), 0x5678);
}
