use super::*;

#[test]
fn init_sets_documented_defaults() {
    let mut mem = Memory::new();
    init(&mut mem);
    assert_eq!(video_mode(&mem), 0x03);
    assert_eq!(screen_columns(&mem), 80);
    assert_eq!(rows(&mem), 25);
    assert_eq!(active_page(&mem), 0);
}

#[test]
fn cursor_pos_round_trips_per_page() {
    let mut mem = Memory::new();
    init(&mut mem);
    set_cursor_pos(&mut mem, 0, 10, 5);
    set_cursor_pos(&mut mem, 1, 20, 15);
    assert_eq!(cursor_pos(&mem, 0), (10, 5));
    assert_eq!(cursor_pos(&mem, 1), (20, 15));
}

#[test]
fn daily_timer_tick_increments() {
    let mut mem = Memory::new();
    init(&mut mem);
    for _ in 0..5 {
        tick(&mut mem);
    }
    assert_eq!(daily_timer_ticks(&mem), 5);
}

#[test]
fn equipment_word_and_memory_size_match_their_documented_defaults() {
    let mut mem = Memory::new();
    init(&mut mem);
    assert_eq!(equipment_word(&mem), 0b0000_0000_0010_0001);
    assert_eq!(memory_size_kb(&mem), 640);
}
