//! End-to-end scenarios run through the public `Machine` API: load a real
//! DOS-style image, run it to completion, and check the result the way an
//! embedder would (exit code, host file contents, video mirror, registers).

use dosvm::cpu::{Cpu, Reg8, StepResult};
use dosvm::machine::{Machine, MachineConfig, RunResult};
use dosvm::memory::Memory;

fn run_com(image: &[u8]) -> Machine {
    let mut m = Machine::load_program(MachineConfig::default(), image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Exited(_) => m,
        other => panic!("expected the program to exit cleanly, got {:?}", other),
    }
}

#[test]
fn arithmetic_scenario_matches_spec() {
    // MOV AX,0x1234 ; ADD AX,1 ; HLT
    let m = run_com(&[0xB8, 0x34, 0x12, 0x05, 0x01, 0x00, 0xF4]);
    assert_eq!(m.cpu.regs.ax, 0x1235);
    assert!(!m.cpu.flags.carry);
    assert!(!m.cpu.flags.zero);
}

#[test]
fn string_copy_scenario_matches_spec() {
    // this one is framed at the raw CPU level in the spec itself (explicit
    // absolute segment 2000:xxxx rather than a DOS-loaded program).
    let mut mem = Memory::new();
    mem.write(0x2000, 0, b"HELLO\0");
    mem.write(0x1000, 0, &[0xF3, 0xA4, 0xF4]); // REP MOVSB ; HLT
    let mut cpu = Cpu::new();
    cpu.regs.cs = 0x1000;
    cpu.regs.ds = 0x2000;
    cpu.regs.es = 0x2000;
    cpu.regs.si = 0;
    cpu.regs.di = 0x10;
    cpu.regs.cx = 6;
    loop {
        match cpu.step(&mut mem) {
            StepResult::Continue => {}
            StepResult::Halt => break,
            other => panic!("unexpected step result {:?}", other),
        }
    }
    assert_eq!(mem.read(0x2000, 0x10, 6), b"HELLO\0");
    assert_eq!(cpu.regs.cx, 0);
}

#[test]
fn file_io_scenario_matches_spec() {
    let dir = tempfile::tempdir().unwrap();
    let config = MachineConfig { dos_root: dir.path().to_path_buf(), ..MachineConfig::default() };
    // INT 21h/3Ch create "TEST.TXT" ; write "hello" ; close ; exit 0
    let mut image = vec![
        0xBA, 0x20, 0x01, // MOV DX,0x0120       ; path offset
        0xB8, 0x00, 0x3C, // MOV AX,0x3C00       ; AH=3C AL=00 (no attrs)
        0xCD, 0x21, // INT 21h
        0x8B, 0xD8, // MOV BX,AX           ; handle
        0xBA, 0x30, 0x01, // MOV DX,0x0130       ; data offset
        0xB9, 0x05, 0x00, // MOV CX,5
        0xB4, 0x40, // MOV AH,0x40
        0xCD, 0x21, // INT 21h
        0xB4, 0x3E, // MOV AH,0x3E
        0xCD, 0x21, // INT 21h
        0xB8, 0x00, 0x4C, // MOV AX,0x4C00
        0xCD, 0x21, // INT 21h
    ];
    image.resize(0x120 - 0x100, 0);
    image.extend_from_slice(b"TEST.TXT\0");
    image.resize(0x130 - 0x100, 0);
    image.extend_from_slice(b"hello");

    let mut m = Machine::load_program(config, &image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Exited(code) => assert_eq!(code, 0),
        other => panic!("expected exit 0, got {:?}", other),
    }
    assert_eq!(std::fs::read(dir.path().join("TEST.TXT")).unwrap(), b"hello");
}

#[test]
fn child_process_scenario_matches_spec() {
    let dir = tempfile::tempdir().unwrap();
    let config = MachineConfig { dos_root: dir.path().to_path_buf(), ..MachineConfig::default() };

    // child: INT 21h/02 DL='X' ; exit code 7
    let child = vec![
        0xB2, b'X', // MOV DL,'X'
        0xB4, 0x02, // MOV AH,2
        0xCD, 0x21, // INT 21h
        0xB0, 0x07, // MOV AL,7
        0xB4, 0x4C, // MOV AH,0x4C
        0xCD, 0x21, // INT 21h
    ];
    std::fs::write(dir.path().join("CHILD.COM"), &child).unwrap();

    // parent: EXEC mode 0 on CHILD.COM, then read its exit code via AH=4Dh
    let parent = vec![
        0xBA, 0x00, 0x03, // MOV DX,0x0300       ; child path
        0xBB, 0x10, 0x02, // MOV BX,0x0210       ; param block
        0xB8, 0x00, 0x4B, // MOV AX,0x4B00       ; AH=4B AL=00
        0xCD, 0x21, // INT 21h
        0xB4, 0x4D, // MOV AH,0x4D
        0xCD, 0x21, // INT 21h
        0xF4, // HLT
    ];
    let mut m = Machine::load_program(config, &parent, "C:\\PARENT.COM", &[]).unwrap();

    let seg = m.cpu.regs.cs;
    m.memory.write(seg, 0x300, b"CHILD.COM\0");
    m.memory.write_u8(seg, 0x200, 0); // empty command tail
    m.memory.write_u16(seg, 0x210, 0); // env_seg: inherit
    m.memory.write_u16(seg, 0x212, 0x200); // tail_off
    m.memory.write_u16(seg, 0x214, seg); // tail_seg

    match m.run() {
        RunResult::Exited(_) => {}
        other => panic!("expected the parent to exit cleanly, got {:?}", other),
    }
    assert_eq!(m.cpu.regs.get8(Reg8::AL), 7);
    assert_eq!(m.cpu.regs.get8(Reg8::AH), 0);
    let cell = m.video.read_cell(&m.memory, 0, 0, 0);
    assert_eq!(cell.ch, b'X');
}

#[test]
fn keyboard_scenario_matches_spec() {
    use dosvm::keyboard::KeyEvent;
    // INT 16h/00 ; INT 20h
    let mut m = Machine::load_program(MachineConfig::default(), &[0xB4, 0x00, 0xCD, 0x16, 0xCD, 0x20], "C:\\T.COM", &[]).unwrap();
    m.keyboard.inject(&mut m.memory, KeyEvent { scancode: 0x1E, ascii: b'a' });
    match m.run() {
        RunResult::Exited(_) => {}
        other => panic!("expected a clean exit, got {:?}", other),
    }
    assert_eq!(m.cpu.regs.get8(Reg8::AL), b'a');
    assert_eq!(m.cpu.regs.get8(Reg8::AH), 0x1E);
}

#[test]
fn timer_hook_scenario_matches_spec() {
    // hooks INT 1Ch to increment a memory word, busy-waits until it sees 40,
    // then exits; deterministic mode fires the timer once per batch so this
    // terminates in a bounded number of batches rather than real wall time.
    let mut image = vec![
        0xBA, 0x80, 0x01, // MOV DX,0x0180       ; handler offset
        0xB8, 0x1C, 0x25, // MOV AX,0x251C       ; AH=25 AL=1Ch
        0xCD, 0x21, // INT 21h
        // L1:
        0x81, 0x3E, 0x00, 0x03, 0x28, 0x00, // CMP word[0x300],0x28
        0x7D, 0x02, // JGE +2 (done)
        0xEB, 0xF6, // JMP L1
        // done:
        0xB8, 0x00, 0x4C, // MOV AX,0x4C00
        0xCD, 0x21, // INT 21h
    ];
    image.resize(0x180 - 0x100, 0);
    image.extend_from_slice(&[0xFF, 0x06, 0x00, 0x03, 0xCF]); // INC word[0x300] ; IRET

    let mut config = MachineConfig::default();
    config.deterministic = true;
    let mut m = Machine::load_program(config, &image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Exited(code) => assert_eq!(code, 0),
        other => panic!("expected the busy-wait to finish and exit cleanly, got {:?}", other),
    }
    let seg = m.cpu.regs.cs;
    assert!(m.memory.read_u16(seg, 0x300) >= 40);
}
