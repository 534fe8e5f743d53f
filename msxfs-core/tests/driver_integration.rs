//! Integration tests driving the hooks with real Z80 code against a
//! temporary host directory.

use std::fs;
use std::path::Path;

use msxfs_core::driver::{attr, DRIVER_SIGNATURE, FIB_SIZE};
use msxfs_core::guest::Reg16;
use msxfs_core::machine::{addr, GuestProgram, DEFAULT_SEGMENTS};
use msxfs_core::{
    DriverCalls, DriverIdentity, EntryPoint, Fib, GuestStatus, HookDispatcher, HookOutcome,
    IntegrationConfig, MsxMachine, NativeHostFs, StopReason,
};
use tempfile::TempDir;

const DRIVER_SEGMENT: u8 = 2;
const FIB_ADDR: u16 = 0xC000;
const PATH_ADDR: u16 = 0xC100;
const BUF_ADDR: u16 = 0xC200;

fn host_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("game.rom"), vec![0u8; 100]).unwrap();
    fs::write(dir.path().join("README.TXT"), b"hello").unwrap();
    fs::write(dir.path().join("much-too-long-name.text"), b"x").unwrap();
    fs::create_dir(dir.path().join("saves")).unwrap();
    fs::write(dir.path().join("saves").join("SLOT1.SAV"), vec![0u8; 2048]).unwrap();
    dir
}

fn machine_for(base: &Path, label: &str) -> MsxMachine<NativeHostFs> {
    let calls = DriverCalls::new(NativeHostFs::new(), base, label);
    let mut machine = MsxMachine::with_hooks(DEFAULT_SEGMENTS, HookDispatcher::new(calls));
    machine.install_driver(DRIVER_SEGMENT).unwrap();
    machine
}

fn read_fib(machine: &MsxMachine<NativeHostFs>) -> (String, u32, u8) {
    let mut raw = [0u8; FIB_SIZE];
    machine.read_block(FIB_ADDR, &mut raw);
    let fib = Fib::new(&mut raw);
    (fib.name(), fib.size(), fib.attributes())
}

/// Run a find-first/find-next loop and collect the entries.
fn list(machine: &mut MsxMachine<NativeHostFs>, pattern: &str) -> (Vec<(String, u32, u8)>, u8) {
    machine.load_at(FIB_ADDR, &[0; FIB_SIZE]);
    machine.write_string(PATH_ADDR, pattern);
    machine.call_entry(
        EntryPoint::FindFirst,
        &[(Reg16::IX, FIB_ADDR), (Reg16::IY, PATH_ADDR)],
    );

    let mut entries = Vec::new();
    while machine.a() == 0 {
        entries.push(read_fib(machine));
        machine.call_entry(EntryPoint::FindNext, &[(Reg16::IX, FIB_ADDR)]);
    }
    (entries, machine.a())
}

#[test]
fn test_directory_listing() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");

    let (entries, last) = list(&mut machine, "*.*");
    let names: Vec<_> = entries.iter().map(|e| e.0.as_str()).collect();
    assert_eq!(names, vec!["GAME.ROM", "README.TXT", "SAVES"]);
    assert_eq!(last, GuestStatus::NoFile as u8);
    assert!(machine.carry());

    assert_eq!(entries[0].1, 100);
    assert_ne!(entries[0].2 & attr::ARCHIVE, 0);
    assert_eq!(entries[2].1, 0);
    assert_ne!(entries[2].2 & attr::DIRECTORY, 0);
}

#[test]
fn test_listing_with_pattern_and_subdirectory() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");

    let (entries, _) = list(&mut machine, "*.ROM");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "GAME.ROM");

    let (entries, _) = list(&mut machine, "SAVES\\*.SAV");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "SLOT1.SAV");
    assert_eq!(entries[0].1, 2048);
}

#[test]
fn test_listing_missing_directory() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");

    let (entries, last) = list(&mut machine, "NOWHERE\\*.*");
    assert!(entries.is_empty());
    assert_eq!(last, GuestStatus::NoDirectory as u8);
    assert!(machine.carry());
}

#[test]
fn test_change_and_get_directory() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");

    machine.write_string(PATH_ADDR, "SAVES");
    machine.call_entry(EntryPoint::ChangeDir, &[(Reg16::HL, PATH_ADDR)]);
    assert_eq!(machine.a(), 0);
    assert!(!machine.carry());

    machine.call_entry(EntryPoint::GetCurrentDir, &[(Reg16::DE, BUF_ADDR)]);
    assert_eq!(machine.read_string(BUF_ADDR, 64), "SAVES");

    let hooks = machine.hooks().unwrap();
    assert_eq!(hooks.calls().current_host_dir(), dir.path().join("saves"));

    machine.write_string(PATH_ADDR, "SAVES\\MISSING");
    machine.call_entry(EntryPoint::ChangeDir, &[(Reg16::HL, PATH_ADDR)]);
    assert_eq!(machine.a(), GuestStatus::NoDirectory as u8);
    assert!(machine.carry());

    machine.call_entry(EntryPoint::GetCurrentDir, &[(Reg16::DE, BUF_ADDR)]);
    assert_eq!(machine.read_string(BUF_ADDR, 64), "SAVES");
}

#[test]
fn test_volume_label_from_config() {
    let dir = host_tree();
    let config = IntegrationConfig {
        integrated_directory: dir.path().to_string_lossy().into_owned(),
        volume_label: "MYDISK".to_string(),
    };
    let calls = DriverCalls::from_config(NativeHostFs::new(), &config).unwrap();
    let mut machine = MsxMachine::with_hooks(DEFAULT_SEGMENTS, HookDispatcher::new(calls));
    machine.install_driver(DRIVER_SEGMENT).unwrap();

    let exit = machine.call_entry(EntryPoint::GetVolume, &[(Reg16::DE, BUF_ADDR)]);
    assert_eq!(exit.reason, StopReason::Halt);
    assert_eq!(
        exit.serviced,
        vec![HookOutcome::Serviced(EntryPoint::GetVolume, GuestStatus::Ok)]
    );
    assert_eq!(machine.read_string(BUF_ADDR, 64), "MYDISK");
}

#[test]
fn test_alloc_registers() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");
    machine.call_entry(
        EntryPoint::Alloc,
        &[(Reg16::HL, 0x1234), (Reg16::DE, 0x5678)],
    );
    assert_eq!(machine.a(), 0);
    assert_eq!(machine.reg16(Reg16::HL), 0);
    assert_eq!(machine.reg16(Reg16::DE), 0);
}

#[test]
fn test_other_segment_runs_native_code() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");

    // Identify the driver in its own segment first
    machine.call_entry(EntryPoint::GetVolume, &[(Reg16::DE, BUF_ADDR)]);
    assert!(matches!(
        machine.hooks().unwrap().identity(),
        DriverIdentity::Identified(_)
    ));

    // A copy of the module in segment 4, with its own GETVOL: LD A,55h ; RET
    machine.install_driver(4).unwrap();
    machine
        .load_segment(4, (EntryPoint::GetVolume.address() - 0x4000) as usize, &[0x3E, 0x55, 0xC9])
        .unwrap();
    machine.load_at(BUF_ADDR, &[0; 16]);

    // OUT (0FDh),4 selects segment 4 in page 1
    let program = GuestProgram::new()
        .out(addr::PORT_MAPPER + 1, 4)
        .load(Reg16::DE, BUF_ADDR)
        .call(EntryPoint::GetVolume.address())
        .halt();
    machine.load_at(addr::PROGRAM, program.bytes());
    let exit = machine.run_from(addr::PROGRAM);

    assert_eq!(exit.reason, StopReason::Halt);
    assert!(exit.serviced.is_empty());
    assert_eq!(machine.a(), 0x55);
    assert_eq!(machine.peek(BUF_ADDR), 0);
}

#[test]
fn test_rom_slot_runs_native_code() {
    let dir = host_tree();
    let mut machine = machine_for(dir.path(), "HOSTDISK");

    // A ROM carrying the same signature is never trusted
    let mut rom = vec![0xC9u8; 0x40];
    rom[..DRIVER_SIGNATURE.len()].copy_from_slice(DRIVER_SIGNATURE.as_bytes());
    rom[DRIVER_SIGNATURE.len()] = 0;
    rom[0x2F..0x32].copy_from_slice(&[0x3E, 0x66, 0xC9]);
    machine.insert_rom(1, &rom).unwrap();
    machine.select_page1_slot(1);

    let exit = machine.call_entry(EntryPoint::GetVolume, &[(Reg16::DE, BUF_ADDR)]);
    assert!(exit.serviced.is_empty());
    assert_eq!(machine.a(), 0x66);
    assert_eq!(machine.peek(BUF_ADDR), 0);
    assert_eq!(
        machine.hooks().unwrap().identity(),
        DriverIdentity::Unidentified
    );

    // Back to the mapper: the driver is found and serviced
    machine.select_page1_slot(3);
    let exit = machine.call_entry(EntryPoint::GetVolume, &[(Reg16::DE, BUF_ADDR)]);
    assert_eq!(exit.serviced.len(), 1);
    assert_eq!(machine.read_string(BUF_ADDR, 64), "HOSTDISK");
}
