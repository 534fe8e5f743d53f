//! MSX machine - integrates the Z80 CPU with slots, the memory mapper,
//! and the driver hooks.
//!
//! The memory map is the subset the driver needs:
//! - Pages 0, 2 and 3 always show mapper RAM.
//! - Page 1 shows the slot selected by bits 2-3 of port 0xA8. Slot 3 is
//!   the mapper; slots 0-2 can hold 16K ROM images.
//! - Ports 0xFC-0xFF select the mapper segment of pages 0-3.

use std::num::NonZeroU16;
use std::sync::atomic::{AtomicU32, Ordering};

use z80emu::host::TsCounter;
use z80emu::{Clock, Cpu, CpuFlags, Io, Memory, Prefix, Reg8, StkReg16, Z80NMOS};

use crate::driver::{addr as driver_addr, EntryPoint, HookDispatcher, HookOutcome, DRIVER_SIGNATURE};
use crate::error::{FsIntError, FsIntResult};
use crate::guest::{self, GuestCpu, GuestMemory, ModuleId, SlotSystem};
use crate::host::HostFs;

/// Type alias for the clock.
type TsClock = TsCounter<i32>;

/// Size of a page and of a mapper segment.
pub const PAGE_SIZE: usize = 0x4000;

/// Slot holding the memory mapper.
pub const MAPPER_SLOT: u8 = 3;

/// Default mapper size in segments (128K).
pub const DEFAULT_SEGMENTS: usize = 8;

/// Machine addresses and ports.
pub mod addr {
    /// Where `call_entry` assembles its stub
    pub const PROGRAM: u16 = 0x8000;
    /// Initial stack pointer
    pub const STACK_TOP: u16 = 0xF000;
    /// Primary slot select register
    pub const PORT_SLOT_SELECT: u8 = 0xA8;
    /// Mapper segment register for page 0 (pages 1-3 follow)
    pub const PORT_MAPPER: u8 = 0xFC;
}

static NEXT_MODULE_ID: AtomicU32 = AtomicU32::new(1);

fn next_module_id() -> ModuleId {
    ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Why `run_from` returned.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// CPU halted
    Halt,
    /// Instruction budget used up
    InstructionLimit,
}

/// Information about a finished run.
#[derive(Debug, Clone)]
pub struct MachineExit {
    pub reason: StopReason,
    pub t_states: u64,
    pub pc: u16,
    /// Driver calls serviced on the host during the run.
    pub serviced: Vec<HookOutcome>,
}

/// A 16K ROM plugged into a page 1 slot.
struct RomSlot {
    id: ModuleId,
    image: Vec<u8>,
}

/// Slots, mapper RAM and their selection registers.
struct MemoryMap {
    mapper_id: ModuleId,
    segments: Vec<u8>,
    segment_count: usize,
    mapper_regs: [u8; 4],
    slot_select: u8,
    roms: [Option<RomSlot>; 3],
}

impl MemoryMap {
    fn new(segment_count: usize) -> Self {
        let segment_count = segment_count.clamp(4, 256);
        Self {
            mapper_id: next_module_id(),
            segments: vec![0; segment_count * PAGE_SIZE],
            segment_count,
            // BIOS layout: page 0 = segment 3, ..., page 3 = segment 0
            mapper_regs: [3, 2, 1, 0],
            slot_select: 0xFF,
            roms: [None, None, None],
        }
    }

    fn page1_slot(&self) -> u8 {
        (self.slot_select >> 2) & 0x03
    }

    fn segment_of(&self, page: usize) -> usize {
        self.mapper_regs[page] as usize % self.segment_count
    }

    fn rom_in_page1(&self) -> Option<&RomSlot> {
        match self.page1_slot() {
            MAPPER_SLOT => None,
            slot => self.roms[slot as usize].as_ref(),
        }
    }

    fn mapper_in_page(&self, page: usize) -> bool {
        page != 1 || self.page1_slot() == MAPPER_SLOT
    }

    fn read(&self, address: u16) -> u8 {
        let page = (address >> 14) as usize;
        let offset = address as usize & (PAGE_SIZE - 1);
        if self.mapper_in_page(page) {
            self.segments[self.segment_of(page) * PAGE_SIZE + offset]
        } else {
            self.rom_in_page1()
                .and_then(|rom| rom.image.get(offset).copied())
                .unwrap_or(0xFF)
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        let page = (address >> 14) as usize;
        let offset = address as usize & (PAGE_SIZE - 1);
        // ROM and empty slots ignore writes
        if self.mapper_in_page(page) {
            let segment = self.segment_of(page);
            self.segments[segment * PAGE_SIZE + offset] = value;
        }
    }

    fn segment_mut(&mut self, segment: u8) -> FsIntResult<&mut [u8]> {
        let index = segment as usize;
        if index >= self.segment_count {
            return Err(FsIntError::InvalidSegment(segment));
        }
        Ok(&mut self.segments[index * PAGE_SIZE..(index + 1) * PAGE_SIZE])
    }
}

impl SlotSystem for MemoryMap {
    fn module_in_page(&self, page: u8) -> Option<ModuleId> {
        if self.mapper_in_page(page as usize & 0x03) {
            Some(self.mapper_id)
        } else {
            self.rom_in_page1().map(|rom| rom.id)
        }
    }

    fn mapper_block(&self, module: ModuleId, page: u8) -> Option<u8> {
        (module == self.mapper_id).then(|| self.segment_of(page as usize & 0x03) as u8)
    }
}

/// Machine bus - memory + I/O.
struct Bus<'a> {
    memory: &'a mut MemoryMap,
}

impl Memory for Bus<'_> {
    type Timestamp = i32;

    fn read_debug(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn read_mem(&self, addr: u16, _ts: Self::Timestamp) -> u8 {
        self.memory.read(addr)
    }

    fn write_mem(&mut self, addr: u16, value: u8, _ts: Self::Timestamp) {
        self.memory.write(addr, value);
    }
}

impl Io for Bus<'_> {
    type Timestamp = i32;
    type WrIoBreak = ();
    type RetiBreak = ();

    fn read_io(&mut self, port: u16, _ts: Self::Timestamp) -> (u8, Option<NonZeroU16>) {
        let value = match port as u8 {
            addr::PORT_SLOT_SELECT => self.memory.slot_select,
            p @ addr::PORT_MAPPER..=0xFF => {
                // Unused high bits read back as ones
                let segment = self.memory.segment_of((p - addr::PORT_MAPPER) as usize) as u8;
                segment | !((self.memory.segment_count - 1) as u8)
            }
            _ => 0xFF,
        };
        (value, None)
    }

    fn write_io(
        &mut self,
        port: u16,
        value: u8,
        _ts: Self::Timestamp,
    ) -> (Option<Self::WrIoBreak>, Option<NonZeroU16>) {
        match port as u8 {
            addr::PORT_SLOT_SELECT => self.memory.slot_select = value,
            p @ addr::PORT_MAPPER..=0xFF => {
                self.memory.mapper_regs[(p - addr::PORT_MAPPER) as usize] = value;
            }
            _ => {}
        }
        (None, None)
    }
}

/// CPU plus memory map, as handed to the hook dispatcher.
struct GuestView<'a> {
    cpu: &'a mut Z80NMOS,
    memory: &'a mut MemoryMap,
}

impl GuestMemory for GuestView<'_> {
    fn peek(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn poke(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }
}

impl GuestCpu for GuestView<'_> {
    fn pc(&self) -> u16 {
        self.cpu.get_pc()
    }

    fn reg8(&self, reg: guest::Reg8) -> u8 {
        match reg {
            guest::Reg8::A => self.cpu.get_reg(Reg8::A, None),
            guest::Reg8::C => self.cpu.get_reg(Reg8::C, None),
        }
    }

    fn set_reg8(&mut self, reg: guest::Reg8, value: u8) {
        match reg {
            guest::Reg8::A => self.cpu.set_reg(Reg8::A, None, value),
            guest::Reg8::C => self.cpu.set_reg(Reg8::C, None, value),
        }
    }

    fn reg16(&self, reg: guest::Reg16) -> u16 {
        match reg {
            guest::Reg16::DE => self.cpu.get_reg16(StkReg16::DE),
            guest::Reg16::HL => self.cpu.get_reg16(StkReg16::HL),
            guest::Reg16::IX => self.cpu.get_index16(Prefix::Xdd),
            guest::Reg16::IY => self.cpu.get_index16(Prefix::Yfd),
        }
    }

    fn set_reg16(&mut self, reg: guest::Reg16, value: u16) {
        match reg {
            guest::Reg16::DE => self.cpu.set_reg16(StkReg16::DE, value),
            guest::Reg16::HL => self.cpu.set_reg16(StkReg16::HL, value),
            guest::Reg16::IX => self.cpu.set_index16(Prefix::Xdd, value),
            guest::Reg16::IY => self.cpu.set_index16(Prefix::Yfd, value),
        }
    }

    fn set_carry(&mut self, carry: bool) {
        let mut flags = self.cpu.get_flags();
        flags.set(CpuFlags::C, carry);
        self.cpu.set_flags(flags);
    }

    /// Pop the return address and jump to it, like RET.
    fn force_return(&mut self) {
        let sp = self.cpu.get_sp();
        let ret = guest::read_word(self, sp);
        self.cpu.set_sp(sp.wrapping_add(2));
        self.cpu.set_pc(ret);
    }
}

impl SlotSystem for GuestView<'_> {
    fn module_in_page(&self, page: u8) -> Option<ModuleId> {
        self.memory.module_in_page(page)
    }

    fn mapper_block(&self, module: ModuleId, page: u8) -> Option<u8> {
        self.memory.mapper_block(module, page)
    }
}

/// Minimal Z80 code assembler for driver call stubs.
#[derive(Debug, Default, Clone)]
pub struct GuestProgram {
    code: Vec<u8>,
}

impl GuestProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// LD rr,nn for one of the protocol registers.
    pub fn load(mut self, reg: guest::Reg16, value: u16) -> Self {
        let prefix: &[u8] = match reg {
            guest::Reg16::DE => &[0x11],
            guest::Reg16::HL => &[0x21],
            guest::Reg16::IX => &[0xDD, 0x21],
            guest::Reg16::IY => &[0xFD, 0x21],
        };
        self.code.extend_from_slice(prefix);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// LD A,n ; OUT (port),A
    pub fn out(mut self, port: u8, value: u8) -> Self {
        self.code.extend_from_slice(&[0x3E, value, 0xD3, port]);
        self
    }

    /// CALL nn
    pub fn call(mut self, address: u16) -> Self {
        self.code.push(0xCD);
        self.code.extend_from_slice(&address.to_le_bytes());
        self
    }

    /// HALT
    pub fn halt(mut self) -> Self {
        self.code.push(0x76);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.code
    }
}

/// MSX machine state.
pub struct MsxMachine<F: HostFs> {
    /// Z80 CPU.
    cpu: Z80NMOS,
    /// Clock/T-state counter.
    clock: TsClock,
    /// Slots and mapper RAM.
    memory: MemoryMap,
    /// Driver hooks, consulted before every instruction fetch.
    hooks: Option<HookDispatcher<F>>,
    /// Instructions executed per run before giving up.
    pub max_instructions: u64,
}

impl<F: HostFs> MsxMachine<F> {
    /// Create a machine with a mapper of `segments` 16K segments.
    pub fn new(segments: usize) -> Self {
        Self {
            cpu: Z80NMOS::default(),
            clock: TsClock::default(),
            memory: MemoryMap::new(segments),
            hooks: None,
            max_instructions: 10_000_000,
        }
    }

    /// Create a machine with the driver hooks attached.
    pub fn with_hooks(segments: usize, hooks: HookDispatcher<F>) -> Self {
        let mut machine = Self::new(segments);
        machine.attach_hooks(hooks);
        machine
    }

    pub fn attach_hooks(&mut self, hooks: HookDispatcher<F>) {
        self.hooks = Some(hooks);
    }

    pub fn hooks(&self) -> Option<&HookDispatcher<F>> {
        self.hooks.as_ref()
    }

    /// Identity of the memory mapper.
    pub fn mapper_id(&self) -> ModuleId {
        self.memory.mapper_id
    }

    pub fn segment_count(&self) -> usize {
        self.memory.segment_count
    }

    /// Write the driver module into a mapper segment: signature at 0x4000
    /// and a RET at each entry point.
    pub fn install_driver(&mut self, segment: u8) -> FsIntResult<()> {
        let seg = self.memory.segment_mut(segment)?;
        let sig_start = driver_addr::SIGNATURE as usize - PAGE_SIZE;
        let sig = DRIVER_SIGNATURE.as_bytes();
        seg[sig_start..sig_start + sig.len()].copy_from_slice(sig);
        seg[sig_start + sig.len()] = 0;
        for entry in EntryPoint::ALL {
            seg[entry.address() as usize - PAGE_SIZE] = 0xC9; // RET
        }
        Ok(())
    }

    /// Copy data into a mapper segment at `offset`.
    pub fn load_segment(&mut self, segment: u8, offset: usize, data: &[u8]) -> FsIntResult<()> {
        if offset + data.len() > PAGE_SIZE {
            return Err(FsIntError::ImageTooLarge(offset + data.len()));
        }
        let seg = self.memory.segment_mut(segment)?;
        seg[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Plug a 16K ROM into page 1 of slot 0-2. Returns its identity.
    pub fn insert_rom(&mut self, slot: u8, image: &[u8]) -> FsIntResult<ModuleId> {
        if slot >= MAPPER_SLOT {
            return Err(FsIntError::Config(format!("slot {} cannot hold a ROM", slot)));
        }
        if image.len() > PAGE_SIZE {
            return Err(FsIntError::ImageTooLarge(image.len()));
        }
        let id = next_module_id();
        self.memory.roms[slot as usize] = Some(RomSlot {
            id,
            image: image.to_vec(),
        });
        Ok(id)
    }

    /// Select the slot shown in page 1.
    pub fn select_page1_slot(&mut self, slot: u8) {
        let select = self.memory.slot_select & !0x0C;
        self.memory.slot_select = select | ((slot & 0x03) << 2);
    }

    /// Select the mapper segment shown in `page`.
    pub fn select_segment(&mut self, page: u8, segment: u8) {
        self.memory.mapper_regs[page as usize & 0x03] = segment;
    }

    /// Read memory as the CPU currently sees it.
    pub fn peek(&self, address: u16) -> u8 {
        self.memory.read(address)
    }

    /// Write memory as the CPU currently sees it.
    pub fn poke(&mut self, address: u16, value: u8) {
        self.memory.write(address, value);
    }

    /// Load binary data into visible memory at a specific address.
    pub fn load_at(&mut self, address: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.memory.write(address.wrapping_add(i as u16), byte);
        }
    }

    /// Read a NUL-terminated string from visible memory.
    pub fn read_string(&self, address: u16, max_len: usize) -> String {
        guest::read_string(&MemoryReader(&self.memory), address, max_len)
    }

    /// Copy visible memory starting at `address` into `buf`.
    pub fn read_block(&self, address: u16, buf: &mut [u8]) {
        guest::read_block(&MemoryReader(&self.memory), address, buf);
    }

    /// Write a NUL-terminated string into visible memory.
    pub fn write_string(&mut self, address: u16, s: &str) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.load_at(address, &bytes);
    }

    pub fn pc(&self) -> u16 {
        self.cpu.get_pc()
    }

    /// Register A.
    pub fn a(&self) -> u8 {
        self.cpu.get_reg(Reg8::A, None)
    }

    pub fn carry(&self) -> bool {
        self.cpu.get_flags().contains(CpuFlags::C)
    }

    pub fn reg16(&self, reg: guest::Reg16) -> u16 {
        match reg {
            guest::Reg16::DE => self.cpu.get_reg16(StkReg16::DE),
            guest::Reg16::HL => self.cpu.get_reg16(StkReg16::HL),
            guest::Reg16::IX => self.cpu.get_index16(Prefix::Xdd),
            guest::Reg16::IY => self.cpu.get_index16(Prefix::Yfd),
        }
    }

    /// Run until the CPU halts, starting at `start_address`.
    pub fn run_from(&mut self, start_address: u16) -> MachineExit {
        self.cpu.reset();
        self.cpu.set_pc(start_address);
        self.cpu.set_sp(addr::STACK_TOP);

        let mut serviced = Vec::new();
        let mut executed = 0u64;

        loop {
            if executed >= self.max_instructions {
                tracing::warn!("Instruction limit reached at {:#06X}", self.cpu.get_pc());
                return self.exit(StopReason::InstructionLimit, serviced);
            }

            // Check for driver intercept BEFORE executing
            if let Some(hooks) = self.hooks.as_mut() {
                let mut view = GuestView {
                    cpu: &mut self.cpu,
                    memory: &mut self.memory,
                };
                let outcome = hooks.before_fetch(&mut view);
                if let HookOutcome::Serviced(..) = outcome {
                    serviced.push(outcome);
                    // PC now points at the caller; it may be hooked too
                    continue;
                }
            }

            // Execute instruction
            let mut bus = Bus {
                memory: &mut self.memory,
            };
            let _result =
                self.cpu
                    .execute_next(&mut bus, &mut self.clock, None::<fn(z80emu::CpuDebug)>);
            executed += 1;

            // Check for HALT instruction
            if self.cpu.is_halt() {
                return self.exit(StopReason::Halt, serviced);
            }
        }
    }

    fn exit(&self, reason: StopReason, serviced: Vec<HookOutcome>) -> MachineExit {
        MachineExit {
            reason,
            t_states: self.clock.as_timestamp() as u64,
            pc: self.cpu.get_pc(),
            serviced,
        }
    }

    /// Assemble `LD rr,nn` for each register, `CALL entry`, `HALT` at
    /// [`addr::PROGRAM`] and run it.
    pub fn call_entry(&mut self, entry: EntryPoint, setup: &[(guest::Reg16, u16)]) -> MachineExit {
        let program = setup
            .iter()
            .fold(GuestProgram::new(), |p, &(reg, value)| p.load(reg, value))
            .call(entry.address())
            .halt();
        self.load_at(addr::PROGRAM, program.bytes());
        self.run_from(addr::PROGRAM)
    }
}

/// Read-only `GuestMemory` over the memory map.
struct MemoryReader<'a>(&'a MemoryMap);

impl GuestMemory for MemoryReader<'_> {
    fn peek(&self, addr: u16) -> u8 {
        self.0.read(addr)
    }

    fn poke(&mut self, _addr: u16, _value: u8) {}
}
