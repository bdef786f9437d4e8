use super::*;

#[test]
fn allocate_returns_segment_past_app_base() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (seg, _) = alloc.allocate(&mut mem, 0x10, 1);
    assert!(seg > APP_BASE);
    assert_eq!(mem.read_u8(seg - 1, 0x00), MCB_MAGIC_LAST);
    assert_eq!(mem.read_u16(seg - 1, 0x01), 1);
    assert_eq!(mem.read_u16(seg - 1, 0x03), 0x0F);
}

#[test]
fn mcb_chain_marks_all_but_last_as_more() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (seg1, _) = alloc.allocate(&mut mem, 0x10, 1);
    let (seg2, _) = alloc.allocate(&mut mem, 0x10, 2);
    assert_eq!(mem.read_u8(seg1 - 1, 0x00), MCB_MAGIC_MORE);
    assert_eq!(mem.read_u8(seg2 - 1, 0x00), MCB_MAGIC_LAST);
    // "more" entries carry a paragraph count equal to the distance to the
    // next MCB minus one (spec.md §3)
    assert_eq!(mem.read_u16(seg1 - 1, 0x03), u16::from(seg2 - seg1 - 1));
}

#[test]
fn free_unknown_segment_is_tolerated() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    assert!(!alloc.free(&mut mem, 0x1234));
}

#[test]
fn free_every_allocation_empties_the_list() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (s1, _) = alloc.allocate(&mut mem, 4, 1);
    let (s2, _) = alloc.allocate(&mut mem, 4, 1);
    let (s3, _) = alloc.allocate(&mut mem, 4, 1);
    assert!(alloc.free(&mut mem, s2));
    assert!(alloc.free(&mut mem, s1));
    assert!(alloc.free(&mut mem, s3));
    assert_eq!(alloc.entry_count(), 0);
}

#[test]
fn allocate_failure_reports_largest_free_block() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (seg, free_before) = alloc.allocate(&mut mem, 4, 1);
    assert_eq!(seg, APP_BASE + 1);
    let (fail_seg, reported_free) = alloc.allocate(&mut mem, 0xFFFF, 1);
    assert_eq!(fail_seg, 0);
    assert!(reported_free > 0);
    assert!(reported_free <= free_before || free_before == 0);
}

#[test]
fn resize_grows_into_following_gap() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (seg, _) = alloc.allocate(&mut mem, 4, 1);
    let (ok, max) = alloc.resize(&mut mem, seg, 8);
    assert!(ok);
    assert!(max >= 8);
    assert_eq!(mem.read_u16(seg - 1, 0x03), 7); // last entry: paras == alloc size - 1
}

#[test]
fn resize_beyond_gap_fails_and_reports_max() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (seg1, _) = alloc.allocate(&mut mem, 4, 1);
    let (_seg2, _) = alloc.allocate(&mut mem, 4, 1);
    let (ok, max) = alloc.resize(&mut mem, seg1, 0x7FFF);
    assert!(!ok);
    assert_eq!(max, 4); // no room to grow, seg2 sits directly after
}

#[test]
fn paragraphs_of_reports_the_live_allocation_size() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    let (seg, _) = alloc.allocate(&mut mem, 0x20, 1);
    assert_eq!(alloc.paragraphs_of(seg), Some(0x20));
    alloc.resize(&mut mem, seg, 0x10);
    assert_eq!(alloc.paragraphs_of(seg), Some(0x10));
    assert_eq!(alloc.paragraphs_of(0x9999), None);
}

#[test]
fn free_owned_by_reclaims_all_of_a_psps_blocks() {
    let mut mem = Memory::new();
    let mut alloc = Allocator::new();
    alloc.allocate(&mut mem, 4, 7);
    alloc.allocate(&mut mem, 4, 9);
    alloc.allocate(&mut mem, 4, 7);
    alloc.free_owned_by(&mut mem, 7);
    assert_eq!(alloc.entry_count(), 1);
    assert_eq!(alloc.owner_of(alloc.first_mcb_segment() + 1), Some(9));
}
