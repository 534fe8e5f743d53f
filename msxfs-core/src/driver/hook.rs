//! Hook dispatcher: decides, before every instruction fetch, whether the
//! CPU is entering one of the driver routines.
//!
//! Matching the program counter is not enough. Page 1 is shared by every
//! ROM and mapper segment in the machine, so the dispatcher also checks
//! that the driver module is the one currently visible:
//!
//! 1. The first time a hooked address is reached, the device in page 1 is
//!    inspected. If it is mapped RAM showing `FileSysDriver` at 0x4000,
//!    its identity and selected segment become the token.
//! 2. On every hooked address, the token must still match: the same device
//!    in page 1, with the same segment selected.
//!
//! When either check fails the guest's own routine runs untouched.

use super::handlers::DriverCalls;
use super::{addr, EntryPoint, GuestStatus, DRIVER_SIGNATURE, SIGNATURE_SCAN_LEN};
use crate::guest::{read_block, GuestCpu, ModuleId, SlotSystem};
use crate::host::HostFs;

/// Which device and segment hold the driver module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityToken {
    pub module: ModuleId,
    pub block: u8,
}

impl IdentityToken {
    /// Whether the driver module is the one mapped in right now.
    pub fn is_active<S: SlotSystem + ?Sized>(&self, slots: &S) -> bool {
        slots.module_in_page(addr::DRIVER_PAGE) == Some(self.module)
            && slots.mapper_block(self.module, addr::DRIVER_PAGE) == Some(self.block)
    }
}

/// Identity state: unknown until the driver signature is seen once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverIdentity {
    #[default]
    Unidentified,
    Identified(IdentityToken),
}

impl DriverIdentity {
    /// Look for the driver signature in the current page 1 mapping.
    pub fn capture<G: GuestCpu + SlotSystem + ?Sized>(guest: &G) -> Option<IdentityToken> {
        let module = guest.module_in_page(addr::DRIVER_PAGE)?;
        let block = guest.mapper_block(module, addr::DRIVER_PAGE)?;
        let mut scan = [0u8; SIGNATURE_SCAN_LEN];
        read_block(guest, addr::SIGNATURE, &mut scan);
        let len = scan.iter().position(|&b| b == 0).unwrap_or(scan.len());
        if &scan[..len] != DRIVER_SIGNATURE.as_bytes() {
            return None;
        }
        Some(IdentityToken { module, block })
    }

    pub fn token(&self) -> Option<IdentityToken> {
        match self {
            Self::Unidentified => None,
            Self::Identified(token) => Some(*token),
        }
    }
}

/// What the dispatcher did for one instruction fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// PC is not a driver entry point.
    NotHooked,
    /// PC is an entry point but the driver module is not mapped in.
    Passthrough,
    /// The call was handled on the host and the routine skipped.
    Serviced(EntryPoint, GuestStatus),
}

/// Owns the driver state and intercepts calls into it.
pub struct HookDispatcher<F: HostFs> {
    calls: DriverCalls<F>,
    identity: DriverIdentity,
}

impl<F: HostFs> HookDispatcher<F> {
    pub fn new(calls: DriverCalls<F>) -> Self {
        Self {
            calls,
            identity: DriverIdentity::Unidentified,
        }
    }

    pub fn identity(&self) -> DriverIdentity {
        self.identity
    }

    pub fn calls(&self) -> &DriverCalls<F> {
        &self.calls
    }

    /// Run before the CPU fetches the instruction at its PC.
    pub fn before_fetch<G: GuestCpu + SlotSystem + ?Sized>(&mut self, guest: &mut G) -> HookOutcome {
        let pc = guest.pc();
        let Ok(entry) = EntryPoint::try_from(pc) else {
            return HookOutcome::NotHooked;
        };

        if self.identity == DriverIdentity::Unidentified {
            if let Some(token) = DriverIdentity::capture(guest) {
                tracing::debug!(module = token.module.0, block = token.block, "driver identified");
                self.identity = DriverIdentity::Identified(token);
            }
        }

        let active = self
            .identity
            .token()
            .is_some_and(|token| token.is_active(guest));
        if !active {
            tracing::trace!("driver not mapped at {:#06X}, passing through", pc);
            return HookOutcome::Passthrough;
        }

        let status = self.calls.call(entry, guest);
        guest.force_return();
        HookOutcome::Serviced(entry, status)
    }
}
