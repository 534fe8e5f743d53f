//! Host implementations of the driver routines.
//!
//! Register conventions:
//! - ALLOC: no input; returns HL=0, DE=0, C=1
//! - FFIRST: IY = search path (ASCIIZ), IX = FIB
//! - FNEXT: IX = FIB of a search started by FFIRST
//! - CHDIR: HL = new directory (ASCIIZ)
//! - GETCD: DE = 64-byte buffer for the current directory
//! - GETVOL: DE = buffer for the volume label
//!
//! Every routine returns its status in A and clears carry on success or
//! sets it on error. Output buffers are only written on success.

use std::path::{Path, PathBuf};

use super::cache::{DirSnapshot, SearchCache};
use super::fib::{is_valid_msx_filename, Fib, FIB_SIZE};
use super::{EntryPoint, GuestStatus, MAX_GUEST_PATH};
use crate::config::IntegrationConfig;
use crate::error::{FsIntError, FsIntResult};
use crate::guest::{read_block, read_string, write_block, write_string, GuestCpu, Reg16, Reg8};
use crate::host::{guest_components, resolve_dir, wildcard_match, HostFs};

/// Pattern used when a search names no file.
const MATCH_ALL: &str = "*.*";

/// Host side of the driver: current directory, open searches, and the
/// host filesystem they run against.
pub struct DriverCalls<F: HostFs> {
    fs: F,
    base_path: PathBuf,
    volume_label: String,
    /// Current directory as the guest spells it.
    current_relative: String,
    /// Current directory on the host.
    current_full: PathBuf,
    searches: SearchCache,
}

impl<F: HostFs> DriverCalls<F> {
    /// Serve `base_path` to the guest under `volume_label`.
    pub fn new(fs: F, base_path: impl Into<PathBuf>, volume_label: impl Into<String>) -> Self {
        let base_path = base_path.into();
        Self {
            fs,
            current_full: base_path.clone(),
            base_path,
            volume_label: volume_label.into(),
            current_relative: String::new(),
            searches: SearchCache::new(),
        }
    }

    /// Build from loader configuration. The integrated directory must exist.
    pub fn from_config(fs: F, config: &IntegrationConfig) -> FsIntResult<Self> {
        config.validate()?;
        let base_path = config.base_path()?;
        if !fs.is_dir(&base_path) {
            return Err(FsIntError::BaseDirNotFound(
                base_path.display().to_string(),
            ));
        }
        Ok(Self::new(fs, base_path, config.volume_label.clone()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn volume_label(&self) -> &str {
        &self.volume_label
    }

    /// Current directory relative to the integrated directory.
    pub fn current_dir(&self) -> &str {
        &self.current_relative
    }

    /// Current directory on the host.
    pub fn current_host_dir(&self) -> &Path {
        &self.current_full
    }

    pub fn searches(&self) -> &SearchCache {
        &self.searches
    }

    /// Service one driver call and report its status to the guest.
    pub fn call<C: GuestCpu + ?Sized>(&mut self, entry: EntryPoint, cpu: &mut C) -> GuestStatus {
        let status = match entry {
            EntryPoint::Alloc => self.alloc(cpu),
            EntryPoint::FindFirst => self.find_first(cpu),
            EntryPoint::FindNext => self.find_next(cpu),
            EntryPoint::ChangeDir => self.change_dir(cpu),
            EntryPoint::GetCurrentDir => self.get_current_dir(cpu),
            EntryPoint::GetVolume => self.get_volume(cpu),
        };

        tracing::debug!(?entry, ?status, "driver call");
        cpu.set_reg8(Reg8::A, status as u8);
        cpu.set_carry(status != GuestStatus::Ok);
        status
    }

    /// ALLOC: nothing to allocate on the host.
    fn alloc<C: GuestCpu + ?Sized>(&mut self, cpu: &mut C) -> GuestStatus {
        cpu.set_reg16(Reg16::HL, 0);
        cpu.set_reg16(Reg16::DE, 0);
        cpu.set_reg8(Reg8::C, 1);
        GuestStatus::Ok
    }

    /// FFIRST: take a snapshot of the matching entries and return the first.
    fn find_first<C: GuestCpu + ?Sized>(&mut self, cpu: &mut C) -> GuestStatus {
        let search_addr = cpu.reg16(Reg16::IY);
        let search = read_string(cpu, search_addr, MAX_GUEST_PATH);
        let fib_addr = cpu.reg16(Reg16::IX);
        let serial = load_fib(cpu, fib_addr).search_serial();

        let (dir_part, name_part) = split_search_path(&search);
        let Some(directory) = resolve_dir(&self.fs, &self.base_path, &guest_components(dir_part))
        else {
            tracing::debug!(%search, "search directory not found");
            return GuestStatus::NoDirectory;
        };

        let listing = match self.fs.read_dir(&directory) {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("Failed to list {}: {}", directory.display(), e);
                return GuestStatus::NoDirectory;
            }
        };

        let mut entries: Vec<_> = listing
            .into_iter()
            .filter(|e| is_valid_msx_filename(&e.name) && wildcard_match(name_part, &e.name))
            .collect();
        entries.sort_by_key(|e| e.name.to_ascii_uppercase());

        tracing::debug!(
            %search,
            serial,
            matches = entries.len(),
            "search snapshot taken"
        );
        self.searches.insert(serial, DirSnapshot::new(entries));
        self.fill_fib(cpu, fib_addr, serial, 0)
    }

    /// FNEXT: return the entry after the one the FIB currently holds.
    fn find_next<C: GuestCpu + ?Sized>(&mut self, cpu: &mut C) -> GuestStatus {
        let fib_addr = cpu.reg16(Reg16::IX);
        let fib = load_fib(cpu, fib_addr);
        let serial = fib.search_serial();
        match fib.entry_index().checked_add(1) {
            Some(next) => self.fill_fib(cpu, fib_addr, serial, next),
            None => GuestStatus::NoFile,
        }
    }

    /// Write entry `index` of search `serial` into the FIB at `fib_addr`.
    fn fill_fib<C: GuestCpu + ?Sized>(
        &self,
        cpu: &mut C,
        fib_addr: u16,
        serial: u16,
        index: u16,
    ) -> GuestStatus {
        let Some(entry) = self.searches.entry(serial, index as usize) else {
            return GuestStatus::NoFile;
        };

        let mut buf = load_fib(cpu, fib_addr).0;
        let mut fib = Fib::new(&mut buf);
        fib.fill(&entry.to_record());
        fib.set_entry_index(index);
        write_block(cpu, fib_addr, &buf);
        GuestStatus::Ok
    }

    /// CHDIR: move to another directory below the integrated directory.
    fn change_dir<C: GuestCpu + ?Sized>(&mut self, cpu: &mut C) -> GuestStatus {
        let target_addr = cpu.reg16(Reg16::HL);
        let target = read_string(cpu, target_addr, MAX_GUEST_PATH);
        let components = guest_components(&target);
        let Some(full) = resolve_dir(&self.fs, &self.base_path, &components) else {
            tracing::debug!(%target, "directory not found");
            return GuestStatus::NoDirectory;
        };

        self.current_relative = components.join("\\");
        self.current_full = full;
        GuestStatus::Ok
    }

    /// GETCD: copy the current directory to DE.
    fn get_current_dir<C: GuestCpu + ?Sized>(&mut self, cpu: &mut C) -> GuestStatus {
        let buffer = cpu.reg16(Reg16::DE);
        write_string(cpu, buffer, &self.current_relative);
        GuestStatus::Ok
    }

    /// GETVOL: copy the volume label to DE.
    fn get_volume<C: GuestCpu + ?Sized>(&mut self, cpu: &mut C) -> GuestStatus {
        let buffer = cpu.reg16(Reg16::DE);
        write_string(cpu, buffer, &self.volume_label);
        GuestStatus::Ok
    }
}

/// Owned copy of a guest FIB.
struct FibCopy([u8; FIB_SIZE]);

impl FibCopy {
    fn search_serial(&self) -> u16 {
        let mut buf = self.0;
        Fib::new(&mut buf).search_serial()
    }

    fn entry_index(&self) -> u16 {
        let mut buf = self.0;
        Fib::new(&mut buf).entry_index()
    }
}

fn load_fib<C: GuestCpu + ?Sized>(cpu: &C, addr: u16) -> FibCopy {
    let mut buf = [0u8; FIB_SIZE];
    read_block(cpu, addr, &mut buf);
    FibCopy(buf)
}

/// Split a search path into its directory and file pattern.
///
/// An empty file pattern, or one naming `.` or `..`, lists the whole
/// directory.
fn split_search_path(search: &str) -> (&str, &str) {
    let (dir, name) = match search.rfind(['\\', '/']) {
        Some(pos) => (&search[..pos + 1], &search[pos + 1..]),
        None => match search.as_bytes() {
            [drive, b':', ..] if drive.is_ascii_alphabetic() => (&search[..2], &search[2..]),
            _ => ("", search),
        },
    };
    match name {
        "" => (dir, MATCH_ALL),
        "." | ".." => (search, MATCH_ALL),
        _ => (dir, name),
    }
}
