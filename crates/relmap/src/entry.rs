/// Permission bits of a mapping, as far as address resolution needs them.
///
/// The write and shared/private bits of the mapping source are not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perms {
    pub(crate) read: bool,
    pub(crate) exec: bool,
}

impl Perms {
    /// Returns true if the mapping is readable.
    pub const fn readable(self) -> bool {
        self.read
    }

    /// Returns true if the mapping is executable.
    pub const fn executable(self) -> bool {
        self.exec
    }

    /// The read-only half of a split executable mapping: readable, without
    /// the exec bit.
    pub(crate) const fn is_read_only(self) -> bool {
        self.read && !self.exec
    }
}

/// ELF state of a mapping, transitioned out of [`Pending`](Self::Pending)
/// at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElfState {
    /// Header inspection has not run yet.
    Pending,

    /// Finalized: the mapping does not start with a usable ELF image.
    NotElf,

    /// Finalized: the mapping starts with a valid ELF image.
    Image {
        /// `p_vaddr` of the `PT_LOAD` segment backing the mapping, or zero
        /// when the program headers yielded no match.
        load_bias: usize,
    },
}

/// One contiguous mapping of the process's address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    /// First address covered by the mapping.
    start: usize,

    /// One past the last address covered by the mapping.
    end: usize,

    /// File offset backing `start`.
    offset: usize,

    /// Backing file path; empty for anonymous mappings.
    name: String,

    /// Permission bits from the mapping source.
    perms: Perms,

    /// ELF validity and load bias, computed on first lookup.
    pub(crate) elf: ElfState,

    /// File offset of the read-only companion mapping, when this entry is
    /// the read-exec half of a split executable mapping.
    pub(crate) elf_start_offset: Option<usize>,
}

impl MapEntry {
    pub(crate) fn new(start: usize, end: usize, offset: usize, name: String, perms: Perms) -> Self {
        // Introspection must never dereference unreadable memory, so an
        // unreadable mapping is finalized on the spot with a zero bias.
        let elf = if perms.read {
            ElfState::Pending
        } else {
            ElfState::NotElf
        };

        Self {
            start,
            end,
            offset,
            name,
            perms,
            elf,
            elf_start_offset: None,
        }
    }

    /// First address covered by the mapping.
    pub const fn start(&self) -> usize {
        self.start
    }

    /// One past the last address covered by the mapping.
    pub const fn end(&self) -> usize {
        self.end
    }

    /// File offset the mapping starts at.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Backing file path, or the empty string for anonymous mappings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permission bits of the mapping.
    pub const fn perms(&self) -> Perms {
        self.perms
    }

    /// Returns true if `pc` falls within the mapping's half-open
    /// `[start, end)` range.
    pub const fn contains(&self, pc: usize) -> bool {
        pc >= self.start && pc < self.end
    }

    /// Returns true if the mapping was confirmed to start with a valid ELF
    /// header.
    pub const fn is_elf(&self) -> bool {
        matches!(self.elf, ElfState::Image { .. })
    }

    /// Load bias of the mapping's ELF image.
    ///
    /// Zero when the mapping is not a valid ELF start, or when its program
    /// headers contain no `PT_LOAD` segment matching the mapping's file
    /// offset.
    pub const fn load_bias(&self) -> usize {
        match self.elf {
            ElfState::Image { load_bias } => load_bias,
            ElfState::Pending | ElfState::NotElf => 0,
        }
    }

    /// File offset of the read-only companion mapping, when the ELF header
    /// for this mapping lives in a preceding mapping of the same file.
    pub const fn elf_start_offset(&self) -> Option<usize> {
        self.elf_start_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let entry = MapEntry::new(
            0x1000,
            0x2000,
            0,
            String::new(),
            Perms {
                read: true,
                exec: false,
            },
        );

        assert!(entry.contains(0x1000));
        assert!(entry.contains(0x1fff));
        assert!(!entry.contains(0xfff));
        assert!(!entry.contains(0x2000));
    }

    #[test]
    fn unreadable_entry_is_born_finalized() {
        let entry = MapEntry::new(
            0x1000,
            0x2000,
            0,
            String::new(),
            Perms {
                read: false,
                exec: true,
            },
        );

        assert_eq!(entry.elf, ElfState::NotElf);
        assert_eq!(entry.load_bias(), 0);
        assert!(!entry.is_elf());
    }
}
