//! File system driver hooks.
//!
//! The guest loads a tiny driver module into a mapper segment on page 1.
//! Its jump table is never executed: the dispatcher catches the CPU at
//! each entry point, services the call on the host, and returns.

pub mod cache;
pub mod fib;
pub mod handlers;
pub mod hook;

pub use cache::{DirSnapshot, SearchCache, SEARCH_CACHE_SIZE};
pub use fib::{attr, is_valid_msx_filename, DirEntryRecord, DosDateTime, Fib, FIB_SIZE};
pub use handlers::DriverCalls;
pub use hook::{DriverIdentity, HookDispatcher, HookOutcome, IdentityToken};

/// Status codes returned to the guest in A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuestStatus {
    /// 0x00: Success
    Ok = 0x00,
    /// 0xD6: .NODIR, directory not found
    NoDirectory = 0xD6,
    /// 0xD7: .NOFIL, file not found
    NoFile = 0xD7,
}

impl TryFrom<u8> for GuestStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Ok),
            0xD6 => Ok(Self::NoDirectory),
            0xD7 => Ok(Self::NoFile),
            _ => Err(value),
        }
    }
}

/// Driver entry points, one per hooked routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EntryPoint {
    /// Allocation check
    Alloc = 0x4020,
    /// Find first entry
    FindFirst = 0x4023,
    /// Find next entry
    FindNext = 0x4026,
    /// Change current directory
    ChangeDir = 0x4029,
    /// Get current directory
    GetCurrentDir = 0x402C,
    /// Get volume label
    GetVolume = 0x402F,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 6] = [
        Self::Alloc,
        Self::FindFirst,
        Self::FindNext,
        Self::ChangeDir,
        Self::GetCurrentDir,
        Self::GetVolume,
    ];

    pub fn address(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for EntryPoint {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x4020 => Ok(Self::Alloc),
            0x4023 => Ok(Self::FindFirst),
            0x4026 => Ok(Self::FindNext),
            0x4029 => Ok(Self::ChangeDir),
            0x402C => Ok(Self::GetCurrentDir),
            0x402F => Ok(Self::GetVolume),
            _ => Err(value),
        }
    }
}

/// Fixed locations of the driver module.
pub mod addr {
    /// Identifying string of the driver module
    pub const SIGNATURE: u16 = 0x4000;
    /// First entry point of the jump table
    pub const JUMP_TABLE: u16 = 0x4020;
    /// Page holding the driver module
    pub const DRIVER_PAGE: u8 = 1;
}

/// String the driver module exposes at [`addr::SIGNATURE`].
pub const DRIVER_SIGNATURE: &str = "FileSysDriver";

/// Bytes read when looking for the signature.
pub const SIGNATURE_SCAN_LEN: usize = 14;

/// Longest guest path accepted by find-first and change-directory.
pub const MAX_GUEST_PATH: usize = 63;
