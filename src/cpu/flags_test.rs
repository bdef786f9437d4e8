use super::*;

#[test]
fn to_word_and_from_word_round_trip() {
    let mut f = Flags::default();
    f.carry = true;
    f.zero = true;
    f.sign = true;
    f.overflow = true;
    let w = f.to_word();
    assert_eq!(Flags::from_word(w), f);
}

#[test]
fn always_one_bits_are_set_on_packing() {
    let f = Flags::default();
    assert_eq!(f.to_word() & 0xF002, 0xF002);
}

#[test]
fn set_szp8_reflects_zero_sign_and_parity() {
    let mut f = Flags::default();
    f.set_szp8(0x00);
    assert!(f.zero);
    assert!(!f.sign);
    assert!(f.parity_even);

    f.set_szp8(0x81); // 1000_0001: two set bits -> even parity, sign set
    assert!(!f.zero);
    assert!(f.sign);
    assert!(f.parity_even);

    f.set_szp8(0x03); // two bits set
    assert!(f.parity_even);
    f.set_szp8(0x07); // three bits set
    assert!(!f.parity_even);
}

#[test]
fn set_szp16_parity_uses_only_the_low_byte() {
    let mut f = Flags::default();
    f.set_szp16(0x0100); // low byte 0x00 -> even parity, but value nonzero
    assert!(!f.zero);
    assert!(f.parity_even);
}
