//! Fake guest used by the unit tests.

use std::collections::HashMap;

use crate::guest::{GuestCpu, GuestMemory, ModuleId, Reg16, Reg8, SlotSystem};

/// Flat 64K guest with the registers the driver uses and a scriptable
/// slot layout.
pub(crate) struct FakeCpu {
    pub mem: Box<[u8; 65536]>,
    pub pc: u16,
    pub a: u8,
    pub c: u8,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub carry: bool,
    /// Number of forced returns.
    pub returns: usize,
    pub pages: [Option<ModuleId>; 4],
    pub blocks: HashMap<(ModuleId, u8), u8>,
}

impl FakeCpu {
    pub fn new() -> Self {
        Self {
            mem: Box::new([0; 65536]),
            pc: 0,
            a: 0,
            c: 0,
            de: 0,
            hl: 0,
            ix: 0,
            iy: 0,
            carry: false,
            returns: 0,
            pages: [None; 4],
            blocks: HashMap::new(),
        }
    }

    pub fn put_str(&mut self, addr: u16, s: &str) {
        let start = addr as usize;
        self.mem[start..start + s.len()].copy_from_slice(s.as_bytes());
        self.mem[start + s.len()] = 0;
    }

    pub fn get_str(&self, addr: u16) -> String {
        self.mem[addr as usize..]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }

    pub fn put_word(&mut self, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.mem[addr as usize] = lo;
        self.mem[addr as usize + 1] = hi;
    }
}

impl GuestMemory for FakeCpu {
    fn peek(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    fn poke(&mut self, addr: u16, value: u8) {
        self.mem[addr as usize] = value;
    }
}

impl GuestCpu for FakeCpu {
    fn pc(&self) -> u16 {
        self.pc
    }

    fn reg8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::C => self.c,
        }
    }

    fn set_reg8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.a = value,
            Reg8::C => self.c = value,
        }
    }

    fn reg16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::DE => self.de,
            Reg16::HL => self.hl,
            Reg16::IX => self.ix,
            Reg16::IY => self.iy,
        }
    }

    fn set_reg16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::DE => self.de = value,
            Reg16::HL => self.hl = value,
            Reg16::IX => self.ix = value,
            Reg16::IY => self.iy = value,
        }
    }

    fn set_carry(&mut self, carry: bool) {
        self.carry = carry;
    }

    fn force_return(&mut self) {
        self.returns += 1;
    }
}

impl SlotSystem for FakeCpu {
    fn module_in_page(&self, page: u8) -> Option<ModuleId> {
        self.pages.get(page as usize).copied().flatten()
    }

    fn mapper_block(&self, module: ModuleId, page: u8) -> Option<u8> {
        self.blocks.get(&(module, page)).copied()
    }
}
