//! MSX host filesystem integration core
//!
//! This crate lets software running on an emulated MSX browse a host
//! directory through a small driver module:
//! - Driver entry points (find first/next, change/get directory, volume)
//!   serviced on the host instead of in Z80 code
//! - Driver identity tracking, so the hooks only fire while the driver's
//!   own mapper segment is visible in page 1
//! - Host filesystem abstraction with native and in-memory backends
//!
//! # Architecture
//!
//! The integration uses a layered design:
//! - `GuestCpu` / `SlotSystem` traits: what the hooks need from a machine
//! - `HostFs` trait: directory listing on the host side
//! - `DriverCalls`: the six driver operations and the search cache
//! - `HookDispatcher`: identity check + dispatch before each fetch
//! - `MsxMachine`: a Z80 with slots and a memory mapper to run it all

pub mod config;
pub mod driver;
pub mod error;
pub mod guest;
pub mod host;
pub mod machine;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::IntegrationConfig;
pub use driver::{
    is_valid_msx_filename, DosDateTime, DriverCalls, DriverIdentity, EntryPoint, Fib,
    GuestStatus, HookDispatcher, HookOutcome, IdentityToken,
};
pub use error::{FsIntError, FsIntResult};
pub use guest::{GuestCpu, GuestMemory, ModuleId, SlotSystem};
pub use host::{HostEntry, HostFs, MemoryHostFs, NativeHostFs};
pub use machine::{GuestProgram, MachineExit, MsxMachine, StopReason};
