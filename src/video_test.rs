use super::*;

fn setup() -> (Memory, Video) {
    let mut mem = Memory::new();
    bios::init(&mut mem);
    (mem, Video::new())
}

#[test]
fn set_mode_clears_screen_unless_bit7_set() {
    let (mut mem, video) = setup();
    video.write_cell(&mut mem, 0, 0, 0, Cell { ch: b'X', attr: 0x07 });
    video.set_mode(&mut mem, 0x03);
    assert_eq!(video.read_cell(&mem, 0, 0, 0), Cell { ch: b' ', attr: 0x07 });

    video.write_cell(&mut mem, 0, 0, 0, Cell { ch: b'X', attr: 0x07 });
    video.set_mode(&mut mem, 0x83);
    assert_eq!(video.read_cell(&mem, 0, 0, 0), Cell { ch: b'X', attr: 0x07 });
}

#[test]
fn teletype_write_advances_cursor_and_wraps() {
    let (mut mem, video) = setup();
    video.teletype_write(&mut mem, 0, b'A', 0x07);
    assert_eq!(video.cursor_pos(&mem, 0), (1, 0));
    assert_eq!(video.read_cell(&mem, 0, 0, 0), Cell { ch: b'A', attr: 0x07 });
}

#[test]
fn teletype_write_cr_returns_to_column_zero() {
    let (mut mem, video) = setup();
    video.teletype_write(&mut mem, 0, b'A', 0x07);
    video.teletype_write(&mut mem, 0, 0x0D, 0x07);
    assert_eq!(video.cursor_pos(&mem, 0), (0, 0));
}

#[test]
fn teletype_write_scrolls_on_last_row_overflow() {
    let (mut mem, video) = setup();
    video.set_cursor_pos(&mut mem, 24, 0, 0);
    video.write_cell(&mut mem, 0, 23, 0, Cell { ch: b'Z', attr: 0x07 });
    video.teletype_write(&mut mem, 0, 0x0A, 0x07); // LF -> row 25, scrolls
    assert_eq!(video.cursor_pos(&mem, 0).1, 24);
    assert_eq!(video.read_cell(&mem, 0, 22, 0), Cell { ch: b'Z', attr: 0x07 });
}

#[test]
fn write_char_attr_does_not_move_cursor() {
    let (mut mem, video) = setup();
    video.set_cursor_pos(&mut mem, 0, 0, 0);
    video.write_char_attr(&mut mem, 0, b'X', 0x0F, 3);
    assert_eq!(video.cursor_pos(&mem, 0), (0, 0));
    for col in 0..3 {
        assert_eq!(video.read_cell(&mem, 0, 0, col), Cell { ch: b'X', attr: 0x0F });
    }
}

#[test]
fn scroll_up_zero_lines_clears_region() {
    let (mut mem, video) = setup();
    video.write_cell(&mut mem, 0, 0, 0, Cell { ch: b'X', attr: 0x07 });
    video.scroll_up(&mut mem, 0, 0, 0x07, 0, 0, 79, 24);
    assert_eq!(video.read_cell(&mem, 0, 0, 0), Cell { ch: b' ', attr: 0x07 });
}

#[test]
fn diff_and_flush_reports_only_changed_rows() {
    let (mut mem, mut video) = setup();
    assert_eq!(video.diff_and_flush(&mem).len(), 0);
    video.write_cell(&mut mem, 0, 5, 0, Cell { ch: b'X', attr: 0x07 });
    let changed = video.diff_and_flush(&mem);
    assert_eq!(changed, vec![(0, 5)]);
    assert_eq!(video.diff_and_flush(&mem).len(), 0);
}
