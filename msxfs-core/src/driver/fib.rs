//! File Info Block (FIB) codec.
//!
//! The FIB is MSX-DOS 2's directory-search structure. The guest allocates
//! it, passes its address in IX, and the driver fills it in with the
//! entry found.
//!
//! Layout (64 bytes):
//! - Byte 0: Always 0xFF
//! - Bytes 1-13: Filename as an ASCIIZ string
//! - Byte 14: Attributes
//! - Bytes 15-16: Time of last modification
//! - Bytes 17-18: Date of last modification
//! - Bytes 19-20: Start cluster
//! - Bytes 21-24: File size (little-endian)
//! - Byte 25: Logical drive
//! - Bytes 26-63: Internal driver data (26-27 entry index, 28-29 search serial)

use std::sync::OnceLock;

use regex::Regex;

/// Size of a FIB in bytes.
pub const FIB_SIZE: usize = 64;

/// Length of the filename field, terminator included.
pub const NAME_FIELD_LEN: usize = 13;

mod offset {
    pub const NAME: usize = 1;
    pub const ATTRIBUTES: usize = 14;
    pub const TIME: usize = 15;
    pub const SIZE: usize = 21;
    pub const ENTRY_INDEX: usize = 26;
    pub const SEARCH_SERIAL: usize = 28;
}

/// Attribute bits exposed to the guest.
pub mod attr {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    /// Bits the guest is allowed to see.
    pub const MASK: u8 = READ_ONLY | HIDDEN | SYSTEM | DIRECTORY | ARCHIVE;
}

/// First year representable in a packed date.
pub const EPOCH_YEAR: u16 = 1980;
/// Last year representable in a packed date (7-bit offset).
pub const LAST_YEAR: u16 = EPOCH_YEAR + 127;

/// Wall-clock timestamp in packed-date resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DosDateTime {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Pack into the four FIB bytes 15-18: time low, time high, date low, date high.
    ///
    /// Time is `hhhhhmmm mmmsssss` (seconds halved), date is
    /// `yyyyyyym mmmddddd` with the year relative to 1980. Years outside
    /// 1980-2107 are clamped; odd seconds round down.
    pub fn pack(&self) -> [u8; 4] {
        let year = self.year.clamp(EPOCH_YEAR, LAST_YEAR) - EPOCH_YEAR;
        let month = self.month & 0x0F;
        let day = self.day & 0x1F;
        let hour = self.hour & 0x1F;
        let minute = self.minute & 0x3F;
        let seconds = (self.second / 2) & 0x1F;

        [
            ((minute & 0x07) << 5) | seconds,
            (hour << 3) | (minute >> 3),
            ((month & 0x07) << 5) | day,
            ((year as u8) << 1) | (month >> 3),
        ]
    }

    /// Inverse of [`pack`](Self::pack).
    pub fn unpack(bytes: [u8; 4]) -> Self {
        let time = u16::from_le_bytes([bytes[0], bytes[1]]);
        let date = u16::from_le_bytes([bytes[2], bytes[3]]);
        Self {
            year: EPOCH_YEAR + (date >> 9),
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8,
        }
    }
}

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[-$&#%()@^{}'`!A-Za-z0-9]{1,8}(\.[-$&#%()@^{}'`!A-Za-z0-9]{1,3})?$")
            .expect("filename pattern is valid")
    })
}

/// Check a host name against the 8.3 filename grammar.
///
/// Names that fail are hidden from the guest rather than shortened.
///
/// # Examples
/// ```
/// use msxfs_core::is_valid_msx_filename;
/// assert!(is_valid_msx_filename("GAME.ROM"));
/// assert!(is_valid_msx_filename("readme"));
/// assert!(!is_valid_msx_filename("VeryLongName.txt"));
/// assert!(!is_valid_msx_filename("a.b.c"));
/// ```
pub fn is_valid_msx_filename(name: &str) -> bool {
    filename_regex().is_match(name)
}

/// One directory entry as the guest sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryRecord {
    pub name: String,
    pub size: u32,
    pub attributes: u8,
    pub modified: DosDateTime,
}

/// File Info Block - view into guest memory for directory searches.
pub struct Fib<'a> {
    mem: &'a mut [u8],
}

impl<'a> Fib<'a> {
    /// Create FIB from memory slice (must be at least 64 bytes).
    pub fn new(memory: &'a mut [u8]) -> Self {
        debug_assert!(memory.len() >= FIB_SIZE);
        Self { mem: memory }
    }

    fn word(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.mem[at], self.mem[at + 1]])
    }

    fn set_word(&mut self, at: usize, value: u16) {
        self.mem[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Search serial the guest assigned to this search.
    pub fn search_serial(&self) -> u16 {
        self.word(offset::SEARCH_SERIAL)
    }

    pub fn set_search_serial(&mut self, serial: u16) {
        self.set_word(offset::SEARCH_SERIAL, serial);
    }

    /// Position of the entry currently described by the FIB.
    pub fn entry_index(&self) -> u16 {
        self.word(offset::ENTRY_INDEX)
    }

    pub fn set_entry_index(&mut self, index: u16) {
        self.set_word(offset::ENTRY_INDEX, index);
    }

    /// Filename (up to the terminator).
    pub fn name(&self) -> String {
        self.mem[offset::NAME..offset::NAME + NAME_FIELD_LEN]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }

    /// Set filename; the rest of the field is zero-filled.
    pub fn set_name(&mut self, name: &str) {
        let field = &mut self.mem[offset::NAME..offset::NAME + NAME_FIELD_LEN];
        let upper = name.to_ascii_uppercase();
        for (i, byte) in field.iter_mut().enumerate() {
            *byte = if i < NAME_FIELD_LEN - 1 {
                upper.as_bytes().get(i).copied().unwrap_or(0)
            } else {
                0
            };
        }
    }

    pub fn attributes(&self) -> u8 {
        self.mem[offset::ATTRIBUTES]
    }

    pub fn set_attributes(&mut self, attributes: u8) {
        self.mem[offset::ATTRIBUTES] = attributes & attr::MASK;
    }

    pub fn modified(&self) -> DosDateTime {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.mem[offset::TIME..offset::TIME + 4]);
        DosDateTime::unpack(bytes)
    }

    pub fn set_modified(&mut self, when: &DosDateTime) {
        self.mem[offset::TIME..offset::TIME + 4].copy_from_slice(&when.pack());
    }

    pub fn size(&self) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.mem[offset::SIZE..offset::SIZE + 4]);
        u32::from_le_bytes(bytes)
    }

    pub fn set_size(&mut self, size: u32) {
        self.mem[offset::SIZE..offset::SIZE + 4].copy_from_slice(&size.to_le_bytes());
    }

    /// Fill every entry field from `record`. Directories report size 0.
    pub fn fill(&mut self, record: &DirEntryRecord) {
        self.set_name(&record.name);
        self.set_attributes(record.attributes);
        self.set_modified(&record.modified);
        if record.attributes & attr::DIRECTORY != 0 {
            self.set_size(0);
        } else {
            self.set_size(record.size);
        }
    }

    /// Decode the entry fields.
    pub fn record(&self) -> DirEntryRecord {
        DirEntryRecord {
            name: self.name(),
            size: self.size(),
            attributes: self.attributes(),
            modified: self.modified(),
        }
    }
}
