use super::*;
use crate::keyboard::KeyEvent;

fn com_image(code: &[u8]) -> Vec<u8> {
    code.to_vec()
}

#[test]
fn load_program_wires_up_a_com_image_ready_to_run() {
    // MOV AX,0x1234 ; INT 20h
    let image = com_image(&[0xB8, 0x34, 0x12, 0xCD, 0x20]);
    let m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    assert_eq!(m.cpu.regs.cs, m.cpu.regs.ds);
    assert_eq!(m.cpu.regs.ip, 0x100);
    assert_eq!(m.cpu.regs.sp, 0xFFFE);
    // the PSP's own terminate address is the sentinel: this is the root process
    let (cs, ip) = psp::terminate_address(&m.memory, m.cpu.regs.cs);
    assert_eq!((cs, ip), (ROOT_SENTINEL_CS, ROOT_SENTINEL_IP));
}

#[test]
fn load_program_joins_args_into_a_leading_space_command_tail() {
    let image = com_image(&[0xF4]); // HLT
    let args = vec!["A".to_string(), "B".to_string()];
    let m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &args).unwrap();
    let tail = psp::command_tail(&m.memory, m.cpu.regs.cs);
    assert_eq!(tail, b" A B");
}

#[test]
fn load_boot_sector_places_the_image_at_07c0_0000_with_real_mode_entry_state() {
    let mut image = vec![0u8; 512];
    image[0] = 0xF4; // HLT
    image[510] = 0x55;
    image[511] = 0xAA;
    let m = Machine::load_boot_sector(MachineConfig::default(), &image);
    assert_eq!(m.cpu.regs.cs, 0x07C0);
    assert_eq!(m.cpu.regs.ip, 0);
    assert_eq!(m.cpu.regs.sp, 0xFFFE);
    assert_eq!(m.memory.read_u8(0x07C0, 0), 0xF4);
    assert_eq!(m.memory.read_u8(0x07C0, 511), 0xAA);
}

#[test]
fn load_boot_sector_zero_pads_a_short_image() {
    let m = Machine::load_boot_sector(MachineConfig::default(), &[0x90]);
    assert_eq!(m.memory.read_u8(0x07C0, 0), 0x90);
    assert_eq!(m.memory.read_u8(0x07C0, 1), 0);
    assert_eq!(m.memory.read_u8(0x07C0, 511), 0);
}

#[test]
fn run_executes_arithmetic_and_halts_on_int_20h() {
    // MOV AX,0x1234 ; ADD AX,1 ; INT 20h
    let image = com_image(&[0xB8, 0x34, 0x12, 0x05, 0x01, 0x00, 0xCD, 0x20]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Exited(code) => assert_eq!(code, 0),
        other => panic!("expected a clean exit, got {:?}", other),
    }
    assert_eq!(m.cpu.regs.ax, 0x1235);
}

#[test]
fn run_reports_the_root_processs_int_21h_4ch_exit_code() {
    // MOV AX,0x4C07 ; INT 21h
    let image = com_image(&[0xB8, 0x07, 0x4C, 0xCD, 0x21]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Exited(code) => assert_eq!(code, 7),
        other => panic!("expected exit code 7, got {:?}", other),
    }
}

#[test]
fn run_halts_directly_on_an_hlt_instruction() {
    let image = com_image(&[0xF4]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Exited(_) => {}
        other => panic!("expected HLT to end the run, got {:?}", other),
    }
}

#[test]
fn run_faults_on_a_truly_unknown_opcode() {
    // 0x0F alone isn't decoded by this CPU core
    let image = com_image(&[0x0F, 0xFF, 0xFF]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    match m.run() {
        RunResult::Fault(_) => {}
        other => panic!("expected a fault, got {:?}", other),
    }
}

#[test]
fn run_yields_on_a_blocking_keyboard_read_and_resumes_once_a_key_arrives() {
    // MOV AH,0 ; INT 16h ; INT 20h
    let image = com_image(&[0xB4, 0x00, 0xCD, 0x16, 0xCD, 0x20]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    m.config.deterministic = true;
    m.keyboard.inject(&mut m.memory, KeyEvent { scancode: 0x1E, ascii: b'a' });
    match m.run() {
        RunResult::Exited(_) => {}
        other => panic!("expected a clean exit after the keypress, got {:?}", other),
    }
    assert_eq!(m.cpu.regs.get8(crate::cpu::Reg8::AL), b'a');
}

#[test]
fn deterministic_mode_fires_the_timer_every_batch_and_advances_bios_ticks() {
    // tight loop: JMP $-2, so the batch always exhausts on the same instruction
    let image = com_image(&[0xEB, 0xFE]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    m.config.deterministic = true;
    m.cpu.flags.interrupt = true;
    let before = crate::bios::daily_timer_ticks(&m.memory);
    // run a handful of batches worth of steps manually, since `run` only
    // returns on exit/fault and this program never exits
    for _ in 0..3 {
        for _ in 0..BATCH_SIZE {
            if m.cpu.halted {
                break;
            }
            m.cpu.step(&mut m.memory);
        }
        m.deliver_pending_interrupts();
    }
    let after = crate::bios::daily_timer_ticks(&m.memory);
    assert!(after > before, "deterministic mode should advance the BIOS tick counter every batch");
}

#[test]
fn ctrl_break_takes_priority_over_a_pending_timer_tick() {
    let image = com_image(&[0xEB, 0xFE]);
    let mut m = Machine::load_program(MachineConfig::default(), &image, "C:\\T.COM", &[]).unwrap();
    m.config.deterministic = true;
    m.cpu.flags.interrupt = true;
    m.keyboard.ctrl_break_pending = true;
    // install a handler for INT 23h that just halts, so we can observe it ran
    crate::interrupt::install_vectors(&mut m.memory);
    m.memory.write_u16(0, 0x23 * 4, 0x0000);
    m.memory.write_u16(0, 0x23 * 4 + 2, 0x9000);
    m.memory.write_u8(0x9000, 0, 0xF4); // HLT
    m.cpu.step(&mut m.memory); // run the jmp once so flags/IP are in a known state
    m.deliver_pending_interrupts();
    assert!(!m.keyboard.ctrl_break_pending);
    assert_eq!(m.cpu.regs.cs, 0x9000);
}
