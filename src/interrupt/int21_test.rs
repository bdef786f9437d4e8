use super::*;
use crate::machine::MachineConfig;
use tempfile::tempdir;

fn machine() -> (tempfile::TempDir, Machine) {
    let dir = tempdir().unwrap();
    let config = MachineConfig { dos_root: dir.path().to_path_buf(), ..MachineConfig::default() };
    let m = Machine::load_program(config, &[0xF4], "C:\\T.COM", &[]).unwrap();
    (dir, m)
}

#[test]
fn int_20h_style_terminate_halts_the_root_process() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0x00);
    assert_eq!(dispatch(&mut m), ServiceOutcome::Complete);
    assert!(m.cpu.halted);
}

#[test]
fn int_21h_4ch_carries_its_exit_code_into_the_process_table() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0x4C);
    m.cpu.regs.set8(Reg8::AL, 7);
    dispatch(&mut m);
    assert!(m.cpu.halted);
    assert_eq!(m.processes.last_exit_code(), 7);
}

#[test]
fn write_handle_to_stdout_advances_the_video_cursor() {
    let (_dir, mut m) = machine();
    m.memory.write(m.cpu.regs.ds, 0x200, b"HI");
    m.cpu.regs.set8(Reg8::AH, 0x40);
    m.cpu.regs.bx = files::STDOUT;
    m.cpu.regs.cx = 2;
    m.cpu.regs.dx = 0x200;
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.ax, 2);
    assert_eq!(m.video.cursor_pos(&m.memory, 0), (2, 0));
}

#[test]
fn create_write_close_open_read_round_trips_through_a_host_file() {
    let (dir, mut m) = machine();
    let name_seg = m.cpu.regs.ds;
    m.memory.write(name_seg, 0x300, b"OUT.TXT\0");

    m.cpu.regs.set8(Reg8::AH, 0x3C);
    m.cpu.regs.dx = 0x300;
    dispatch(&mut m);
    assert!(!m.cpu.flags.carry);
    let handle = m.cpu.regs.ax;

    m.memory.write(name_seg, 0x400, b"hello");
    m.cpu.regs.set8(Reg8::AH, 0x40);
    m.cpu.regs.bx = handle;
    m.cpu.regs.cx = 5;
    m.cpu.regs.dx = 0x400;
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.ax, 5);

    m.cpu.regs.set8(Reg8::AH, 0x3E);
    m.cpu.regs.bx = handle;
    dispatch(&mut m);
    assert!(!m.cpu.flags.carry);

    assert_eq!(std::fs::read(dir.path().join("OUT.TXT")).unwrap(), b"hello");

    m.cpu.regs.set8(Reg8::AH, 0x3D);
    m.cpu.regs.set8(Reg8::AL, 0); // read-only
    m.cpu.regs.dx = 0x300;
    dispatch(&mut m);
    let handle = m.cpu.regs.ax;

    m.cpu.regs.set8(Reg8::AH, 0x3F);
    m.cpu.regs.bx = handle;
    m.cpu.regs.cx = 5;
    m.cpu.regs.dx = 0x500;
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.ax, 5);
    assert_eq!(m.memory.read(name_seg, 0x500, 5), b"hello");
}

#[test]
fn opening_a_missing_file_reports_file_not_found() {
    let (_dir, mut m) = machine();
    m.memory.write(m.cpu.regs.ds, 0x300, b"NOPE.TXT\0");
    m.cpu.regs.set8(Reg8::AH, 0x3D);
    m.cpu.regs.set8(Reg8::AL, 0);
    m.cpu.regs.dx = 0x300;
    dispatch(&mut m);
    assert!(m.cpu.flags.carry);
    assert_eq!(m.cpu.regs.ax, 2);
}

#[test]
fn seek_from_start_reports_the_new_position_in_dx_ax() {
    let (dir, mut m) = machine();
    std::fs::write(dir.path().join("A.TXT"), b"0123456789").unwrap();
    m.memory.write(m.cpu.regs.ds, 0x300, b"A.TXT\0");
    m.cpu.regs.set8(Reg8::AH, 0x3D);
    m.cpu.regs.set8(Reg8::AL, 0);
    m.cpu.regs.dx = 0x300;
    dispatch(&mut m);
    let handle = m.cpu.regs.ax;

    m.cpu.regs.set8(Reg8::AH, 0x42);
    m.cpu.regs.set8(Reg8::AL, 0); // SEEK_SET
    m.cpu.regs.bx = handle;
    m.cpu.regs.cx = 0;
    m.cpu.regs.dx = 4;
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.ax, 4);
    assert_eq!(m.cpu.regs.dx, 0);
}

#[test]
fn allocate_then_free_memory_round_trips() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0x48);
    m.cpu.regs.bx = 4;
    dispatch(&mut m);
    assert!(!m.cpu.flags.carry);
    let seg = m.cpu.regs.ax;
    assert_ne!(seg, 0);

    m.cpu.regs.set8(Reg8::AH, 0x49);
    m.cpu.regs.es = seg;
    dispatch(&mut m);
    assert!(!m.cpu.flags.carry);
}

#[test]
fn allocate_more_than_available_fails_and_reports_the_largest_free_block() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0x48);
    m.cpu.regs.bx = 0xFFFF;
    dispatch(&mut m);
    assert!(m.cpu.flags.carry);
    assert_eq!(m.cpu.regs.ax, 8); // DosError::InsufficientMemory
}

#[test]
fn set_dta_then_get_dta_round_trips() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0x1A);
    m.cpu.regs.ds = 0x3000;
    m.cpu.regs.dx = 0x0080;
    dispatch(&mut m);

    m.cpu.regs.set8(Reg8::AH, 0x2F);
    dispatch(&mut m);
    assert_eq!(m.cpu.regs.es, 0x3000);
    assert_eq!(m.cpu.regs.bx, 0x0080);
}

#[test]
fn get_date_reports_a_plausible_weekday_and_year() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0x2A);
    dispatch(&mut m);
    assert!(m.cpu.regs.cx >= 2026);
    assert!(m.cpu.regs.get8(Reg8::AL) <= 6);
}

#[test]
fn unhandled_function_reports_invalid_function() {
    let (_dir, mut m) = machine();
    m.cpu.regs.set8(Reg8::AH, 0xEE);
    dispatch(&mut m);
    assert!(m.cpu.flags.carry);
    assert_eq!(m.cpu.regs.ax, 1);
}

#[test]
fn get_set_current_directory_round_trips() {
    let (_dir, mut m) = machine();
    m.memory.write(m.cpu.regs.ds, 0x300, b"SUBDIR\0");
    m.cpu.regs.set8(Reg8::AH, 0x3B);
    m.cpu.regs.dx = 0x300;
    dispatch(&mut m);
    assert!(!m.cpu.flags.carry);

    m.cpu.regs.set8(Reg8::AH, 0x47);
    m.cpu.regs.ds = 0x4000;
    m.cpu.regs.si = 0;
    dispatch(&mut m);
    let got = m.memory.read_asciiz(0x4000, 0);
    assert_eq!(String::from_utf8_lossy(&got), "SUBDIR");
}
