use super::*;

#[test]
fn read_write_u8() {
    let mut m = Memory::new();
    m.write_u8(0x1000, 0x0010, 0xAB);
    assert_eq!(m.read_u8(0x1000, 0x0010), 0xAB);
}

#[test]
fn read_write_u16() {
    let mut m = Memory::new();
    m.write_u16(0x1000, 0x0010, 0x1234);
    assert_eq!(m.read_u16(0x1000, 0x0010), 0x1234);
    assert_eq!(m.read_u8(0x1000, 0x0010), 0x34);
    assert_eq!(m.read_u8(0x1000, 0x0011), 0x12);
}

#[test]
fn word_access_spills_past_segment_at_offset_ffff() {
    // spec.md §4.1: a 16-bit access at offset 0xFFFF reads/writes the byte
    // at 0xFFFF and the byte at linear+1 of the same segment, not offset 0.
    let mut m = Memory::new();
    m.write_u16(0x1000, 0xFFFF, 0xBEEF);
    let base = Memory::linear(0x1000, 0xFFFF);
    assert_eq!(m.raw()[base], 0xEF);
    assert_eq!(m.raw()[(base + 1) & (0x10_0000 - 1)], 0xBE);
}

#[test]
fn linear_address_is_seg_shl_4_plus_off() {
    assert_eq!(Memory::linear(0x1234, 0x0010), 0x12350);
}

#[test]
fn read_asciiz_stops_at_nul() {
    let mut m = Memory::new();
    m.write(0x2000, 0x0000, b"HELLO\0WORLD");
    assert_eq!(m.read_asciiz(0x2000, 0x0000), b"HELLO");
}

#[test]
fn read_dollar_terminated_stops_at_dollar() {
    let mut m = Memory::new();
    m.write(0x2000, 0x0000, b"hi there$garbage");
    assert_eq!(m.read_dollar_terminated(0x2000, 0x0000), b"hi there");
}

#[test]
fn block_copy_round_trips() {
    let mut m = Memory::new();
    m.write(0x2000, 0x0000, b"HELLO\0");
    let data = m.read(0x2000, 0x0000, 6);
    m.write(0x2000, 0x0010, &data);
    assert_eq!(m.read(0x2000, 0x0010, 6), b"HELLO\0");
}
