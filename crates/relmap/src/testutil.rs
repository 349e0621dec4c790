//! In-process fake ELF images and mapping lines for tests.
//!
//! The introspector reads mapped memory of the running process, so the
//! fixtures here back synthetic mapping entries with real heap allocations,
//! aligned for native-width ELF header reads.

use std::mem::offset_of;

use goblin::elf::header::ELFMAG;
use goblin::elf::program_header::PT_LOAD;

use crate::elf::raw;

/// Heap buffer aligned for native ELF header reads, addressable as real
/// process memory.
pub(crate) struct FakeImage {
    words: Vec<u64>,
}

impl FakeImage {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(8)],
        }
    }

    /// Address of the first byte of the image.
    pub(crate) fn addr(&self) -> usize {
        self.words.as_ptr() as usize
    }

    pub(crate) fn len(&self) -> usize {
        self.words.len() * 8
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len());

        let base = self.words.as_mut_ptr().cast::<u8>();
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), base.add(offset), bytes.len());
        }
    }

    pub(crate) fn write_magic(&mut self) {
        self.write(0, ELFMAG);
    }

    /// Writes the ELF magic plus the `e_phoff`/`e_phnum` fields the
    /// introspector reads.
    pub(crate) fn write_elf_header(&mut self, e_phoff: raw::Off, e_phnum: u16) {
        self.write_magic();
        self.write(offset_of!(raw::Ehdr, e_phoff), &e_phoff.to_ne_bytes());
        self.write(offset_of!(raw::Ehdr, e_phnum), &e_phnum.to_ne_bytes());
    }

    /// Writes a `PT_LOAD` program header at image offset `at`.
    pub(crate) fn write_load_phdr(&mut self, at: usize, p_offset: raw::Off, p_vaddr: raw::Addr) {
        self.write(at + offset_of!(raw::Phdr, p_type), &PT_LOAD.to_ne_bytes());
        self.write(at + offset_of!(raw::Phdr, p_offset), &p_offset.to_ne_bytes());
        self.write(at + offset_of!(raw::Phdr, p_vaddr), &p_vaddr.to_ne_bytes());
    }
}

/// Formats one line of a synthetic mapping source.
pub(crate) fn maps_line(start: usize, end: usize, perms: &str, offset: usize, name: &str) -> String {
    format!("{start:x}-{end:x} {perms} {offset:08x} 08:01 12345      {name}")
}
