//! `std::fs` backed host filesystem.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};

use super::{HostEntry, HostFs};
use crate::driver::fib::{attr, DosDateTime};

/// The real host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHostFs;

impl NativeHostFs {
    pub fn new() -> Self {
        Self
    }
}

/// Convert a host timestamp to local wall-clock time.
pub fn local_dos_time(time: SystemTime) -> DosDateTime {
    let local: DateTime<Local> = time.into();
    DosDateTime {
        year: u16::try_from(local.year()).unwrap_or(0),
        month: local.month() as u8,
        day: local.day() as u8,
        hour: local.hour() as u8,
        minute: local.minute() as u8,
        second: local.second() as u8,
    }
}

fn entry_from_metadata(name: &str, meta: &Metadata) -> HostEntry {
    let modified = meta
        .modified()
        .map(local_dos_time)
        .unwrap_or_default();

    let mut entry = if meta.is_dir() {
        HostEntry::dir(name, modified)
    } else {
        HostEntry::file(name, meta.len(), modified)
    };
    if meta.permissions().readonly() {
        entry.attributes |= attr::READ_ONLY;
    }
    entry
}

impl HostFs for NativeHostFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<HostEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(path)? {
            let dirent = dirent?;
            // Names the guest cannot spell are skipped later anyway.
            let Some(name) = dirent.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Follow symlinks so linked directories behave like directories.
            let meta = match fs::metadata(dirent.path()) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", dirent.path().display(), e);
                    continue;
                }
            };
            entries.push(entry_from_metadata(&name, &meta));
        }
        Ok(entries)
    }
}
