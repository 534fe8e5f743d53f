//! Host filesystem access for the driver hooks.
//!
//! - `HostFs`: the read-only view of the host the handlers need
//! - `NativeHostFs`: backed by `std::fs`
//! - `MemoryHostFs`: in-memory tree for tests
//!
//! Guest paths use `\` separators and 8.3 names in upper case; the helpers
//! here turn them into host paths.

mod memory;
mod native;

use std::io;
use std::path::{Path, PathBuf};

pub use memory::MemoryHostFs;
pub use native::NativeHostFs;

use crate::driver::fib::{attr, DirEntryRecord, DosDateTime};

/// Metadata for one host directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub name: String,
    /// Length in bytes, saturated to what the guest can store.
    pub size: u32,
    pub attributes: u8,
    pub modified: DosDateTime,
}

impl HostEntry {
    /// A regular file (archive bit set).
    pub fn file(name: &str, size: u64, modified: DosDateTime) -> Self {
        Self {
            name: name.to_string(),
            size: u32::try_from(size).unwrap_or(u32::MAX),
            attributes: attr::ARCHIVE,
            modified,
        }
    }

    /// A subdirectory.
    pub fn dir(name: &str, modified: DosDateTime) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            attributes: attr::DIRECTORY,
            modified,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attributes & attr::DIRECTORY != 0
    }

    /// Guest-visible record for this entry.
    pub fn to_record(&self) -> DirEntryRecord {
        DirEntryRecord {
            name: self.name.clone(),
            size: if self.is_dir() { 0 } else { self.size },
            attributes: self.attributes & attr::MASK,
            modified: self.modified,
        }
    }
}

/// Read-only host filesystem interface used by the handlers.
pub trait HostFs: Send {
    /// Whether `path` exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// List the entries of a directory (without `.` and `..`).
    fn read_dir(&self, path: &Path) -> io::Result<Vec<HostEntry>>;
}

/// Split a guest path into normalized components.
///
/// A drive prefix and leading separators are dropped, `.` is skipped and
/// `..` never climbs above the root.
///
/// # Examples
/// ```
/// use msxfs_core::host::guest_components;
/// assert_eq!(guest_components("A:\\GAMES\\..\\UTILS"), vec!["UTILS"]);
/// assert_eq!(guest_components("..\\..\\X"), vec!["X"]);
/// ```
pub fn guest_components(guest: &str) -> Vec<String> {
    let path = match guest.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => &guest[2..],
        _ => guest,
    };

    let mut components: Vec<String> = Vec::new();
    for part in path.split(['\\', '/']) {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            name => components.push(name.to_string()),
        }
    }
    components
}

/// Walk `components` down from `base`, returning the host directory.
///
/// Each component is tried verbatim first, then case-insensitively.
/// Components containing `:` never resolve; a drive designator is only
/// valid as the path prefix.
pub fn resolve_dir<F: HostFs + ?Sized>(
    fs: &F,
    base: &Path,
    components: &[String],
) -> Option<PathBuf> {
    if !fs.is_dir(base) {
        return None;
    }

    let mut current = base.to_path_buf();
    for component in components {
        if component.contains(':') {
            return None;
        }
        let exact = current.join(component);
        if fs.is_dir(&exact) {
            current = exact;
            continue;
        }

        let found = fs
            .read_dir(&current)
            .ok()?
            .into_iter()
            .find(|e| e.is_dir() && e.name.eq_ignore_ascii_case(component))?;
        current = current.join(found.name);
    }
    Some(current)
}

/// Match a name against an 8.3 wildcard pattern, ignoring case.
///
/// Both sides are split at their last dot and the halves are matched
/// separately; `*` matches any run and `?` exactly one character.
///
/// # Examples
/// ```
/// use msxfs_core::host::wildcard_match;
/// assert!(wildcard_match("*.*", "README"));
/// assert!(wildcard_match("*.COM", "hello.com"));
/// assert!(wildcard_match("GAME?.ROM", "GAME1.ROM"));
/// assert!(!wildcard_match("*", "HELLO.COM"));
/// ```
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let (pat_base, pat_ext) = split_ext(pattern);
    let (name_base, name_ext) = split_ext(name);
    glob_part(pat_base.as_bytes(), name_base.as_bytes())
        && glob_part(pat_ext.as_bytes(), name_ext.as_bytes())
}

fn split_ext(s: &str) -> (&str, &str) {
    match s.rfind('.') {
        Some(pos) => (&s[..pos], &s[pos + 1..]),
        None => (s, ""),
    }
}

/// Iterative matcher: on a mismatch, retry from the most recent `*` with
/// one more input byte consumed. Linear in pattern times input length.
fn glob_part(pattern: &[u8], input: &[u8]) -> bool {
    let (mut p, mut i) = (0, 0);
    let mut last_star: Option<(usize, usize)> = None;

    while i < input.len() {
        match pattern.get(p) {
            Some(b'*') => {
                last_star = Some((p, i));
                p += 1;
            }
            Some(b'?') => {
                p += 1;
                i += 1;
            }
            Some(c) if c.eq_ignore_ascii_case(&input[i]) => {
                p += 1;
                i += 1;
            }
            _ => match last_star {
                Some((star_p, star_i)) => {
                    p = star_p + 1;
                    i = star_i + 1;
                    last_star = Some((star_p, i));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_star_dot_star_matches_everything() {
        for name in ["A", "GAME.ROM", "x.y", "NOEXT"] {
            assert!(wildcard_match("*.*", name));
        }
    }

    #[test]
    fn test_wildcard_extension() {
        assert!(wildcard_match("*.ROM", "game.rom"));
        assert!(!wildcard_match("*.ROM", "game.bin"));
        assert!(!wildcard_match("*.ROM", "ROM"));
    }

    #[test]
    fn test_wildcard_question_mark() {
        assert!(wildcard_match("A?C", "ABC"));
        assert!(!wildcard_match("A?C", "AC"));
        assert!(wildcard_match("???.*", "ABC.TXT"));
    }

    #[test]
    fn test_wildcard_without_dot_requires_no_extension() {
        assert!(wildcard_match("*", "GAMES"));
        assert!(!wildcard_match("*", "GAMES.TXT"));
        assert!(wildcard_match("GAMES", "games"));
    }

    #[test]
    fn test_wildcard_middle_star() {
        assert!(wildcard_match("G*S.*", "GAMES.DAT"));
        assert!(!wildcard_match("G*S.*", "GAMER.DAT"));
    }

    #[test]
    fn test_wildcard_many_stars_finishes() {
        let pattern = format!("{}X", "*".repeat(60));
        assert!(!wildcard_match(&pattern, "ABCDEFGH"));
        assert!(wildcard_match(&pattern, "ABCDEFGX"));
        assert!(wildcard_match(&"*".repeat(62), "ABCDEFGH"));

        let scattered = format!("{}.*", "*A".repeat(30));
        assert!(!wildcard_match(&scattered, "AAAAAAAB.TXT"));
    }

    #[test]
    fn test_guest_components() {
        assert!(guest_components("").is_empty());
        assert!(guest_components("\\").is_empty());
        assert_eq!(guest_components("GAMES\\MSX2"), vec!["GAMES", "MSX2"]);
        assert_eq!(guest_components("B:/a/./b/"), vec!["a", "b"]);
        assert_eq!(guest_components("A\\..\\..\\B"), vec!["B"]);
    }

    #[test]
    fn test_resolve_dir_case_insensitive() {
        let mut fs = MemoryHostFs::new("/base");
        fs.add_dir("/base/Games");
        fs.add_dir("/base/Games/msx2");

        let path = resolve_dir(&fs, Path::new("/base"), &guest_components("GAMES\\MSX2"));
        assert_eq!(path, Some(PathBuf::from("/base/Games/msx2")));
    }

    #[test]
    fn test_resolve_dir_missing() {
        let mut fs = MemoryHostFs::new("/base");
        fs.add_dir("/base/Games");
        fs.add_file("/base/FILE.TXT", 3, DosDateTime::default());

        assert!(resolve_dir(&fs, Path::new("/base"), &guest_components("NOPE")).is_none());
        assert!(resolve_dir(&fs, Path::new("/base"), &guest_components("FILE.TXT")).is_none());
        assert!(resolve_dir(&fs, Path::new("/missing"), &[]).is_none());
    }

    #[test]
    fn test_resolve_dir_rejects_drive_component() {
        let mut fs = MemoryHostFs::new("/base");
        fs.add_dir("/base/Games/C:");

        let components = guest_components("GAMES\\C:");
        assert_eq!(components, vec!["GAMES", "C:"]);
        assert!(resolve_dir(&fs, Path::new("/base"), &components).is_none());
    }

    #[test]
    fn test_entry_record_masks_attributes() {
        let mut entry = HostEntry::file("A.TXT", u64::MAX, DosDateTime::default());
        entry.attributes |= 0x40;
        let record = entry.to_record();
        assert_eq!(record.size, u32::MAX);
        assert_eq!(record.attributes, attr::ARCHIVE);
    }
}
