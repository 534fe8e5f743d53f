//! Guest-side collaborators and the guest memory accessor.
//!
//! The hooks never own the CPU or the memory map. They see them through
//! three small traits:
//! - `GuestMemory`: byte access to the currently visible 64K
//! - `GuestCpu`: program counter, the registers the driver protocol uses,
//!   and a way to abort the current call
//! - `SlotSystem`: which device is mapped in a page and which mapper
//!   segment it has selected

/// 8-bit registers used by the driver protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    C,
}

/// 16-bit registers used by the driver protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    DE,
    HL,
    IX,
    IY,
}

/// Byte access to guest memory as the CPU currently sees it.
pub trait GuestMemory {
    fn peek(&self, addr: u16) -> u8;
    fn poke(&mut self, addr: u16, value: u8);
}

/// The CPU as seen from a hook.
pub trait GuestCpu: GuestMemory {
    /// Address of the instruction about to be fetched.
    fn pc(&self) -> u16;

    fn reg8(&self, reg: Reg8) -> u8;
    fn set_reg8(&mut self, reg: Reg8, value: u8);
    fn reg16(&self, reg: Reg16) -> u16;
    fn set_reg16(&mut self, reg: Reg16, value: u16);

    /// Set or clear the carry flag.
    fn set_carry(&mut self, carry: bool);

    /// Abandon the routine being entered and resume at its caller.
    fn force_return(&mut self);
}

/// Opaque identity of a device plugged into a slot.
///
/// Two different device instances never share an id, even when they are
/// plugged into the same slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// Slot/paging view needed by the hook guard.
pub trait SlotSystem {
    /// Device currently visible in `page` (0-3).
    fn module_in_page(&self, page: u8) -> Option<ModuleId>;

    /// Mapper segment `module` has selected for `page`.
    /// `None` when the device is not mapped RAM.
    fn mapper_block(&self, module: ModuleId, page: u8) -> Option<u8>;
}

/// Read a NUL-terminated ASCII string, stopping after `max_len` bytes.
///
/// Bytes above 0x7F become `?`.
pub fn read_string<M: GuestMemory + ?Sized>(mem: &M, addr: u16, max_len: usize) -> String {
    let mut bytes = Vec::new();
    let mut addr = addr;
    while bytes.len() < max_len {
        let byte = mem.peek(addr);
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        addr = addr.wrapping_add(1);
    }
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Write an ASCII string followed by a NUL terminator.
pub fn write_string<M: GuestMemory + ?Sized>(mem: &mut M, addr: u16, s: &str) {
    let mut addr = addr;
    for byte in s.bytes() {
        mem.poke(addr, if byte.is_ascii() { byte } else { b'?' });
        addr = addr.wrapping_add(1);
    }
    mem.poke(addr, 0);
}

/// Read a little-endian word.
pub fn read_word<M: GuestMemory + ?Sized>(mem: &M, addr: u16) -> u16 {
    u16::from_le_bytes([mem.peek(addr), mem.peek(addr.wrapping_add(1))])
}

/// Copy `buf.len()` bytes out of guest memory.
pub fn read_block<M: GuestMemory + ?Sized>(mem: &M, addr: u16, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = mem.peek(addr.wrapping_add(i as u16));
    }
}

/// Copy `data` into guest memory.
pub fn write_block<M: GuestMemory + ?Sized>(mem: &mut M, addr: u16, data: &[u8]) {
    for (i, &byte) in data.iter().enumerate() {
        mem.poke(addr.wrapping_add(i as u16), byte);
    }
}
