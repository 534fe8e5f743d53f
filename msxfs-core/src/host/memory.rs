//! In-memory host filesystem.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use super::{HostEntry, HostFs};
use crate::driver::fib::DosDateTime;

/// Directory tree held in memory, rooted at a fixed path.
#[derive(Debug, Clone, Default)]
pub struct MemoryHostFs {
    root: PathBuf,
    nodes: BTreeMap<PathBuf, HostEntry>,
}

impl MemoryHostFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            nodes: BTreeMap::new(),
        }
    }

    fn insert(&mut self, path: &Path, make: impl FnOnce(&str) -> HostEntry) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if parent != self.root && parent.starts_with(&self.root) && !self.is_dir(parent) {
                self.add_dir(parent);
            }
        }
        self.nodes.insert(path.to_path_buf(), make(name));
    }

    /// Add a directory (and any missing parents).
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), |name| HostEntry::dir(name, DosDateTime::default()));
    }

    /// Add a file (and any missing parent directories).
    pub fn add_file(&mut self, path: impl AsRef<Path>, size: u64, modified: DosDateTime) {
        self.insert(path.as_ref(), |name| HostEntry::file(name, size, modified));
    }

    /// Overwrite the attribute byte of an existing node.
    pub fn set_attributes(&mut self, path: impl AsRef<Path>, attributes: u8) {
        if let Some(entry) = self.nodes.get_mut(path.as_ref()) {
            entry.attributes = attributes;
        }
    }

    /// Remove a node and everything below it.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.nodes.retain(|p, _| !p.starts_with(path));
    }
}

impl HostFs for MemoryHostFs {
    fn is_dir(&self, path: &Path) -> bool {
        path == self.root || self.nodes.get(path).is_some_and(|e| e.is_dir())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<HostEntry>> {
        if !self.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", path.display()),
            ));
        }
        Ok(self
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(_, e)| e.clone())
            .collect())
    }
}
