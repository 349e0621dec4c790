use std::mem::offset_of;

use goblin::elf::header::{ELFMAG, SELFMAG};
use goblin::elf::program_header::PT_LOAD;
use scroll::Pread;
use scroll::ctx::TryFromCtx;

use crate::entry::{ElfState, MapEntry};

/// ELF types of the running process's own pointer width, the counterpart of
/// `ElfW(..)` from `link.h`.
#[cfg(target_pointer_width = "64")]
pub(crate) mod raw {
    pub use goblin::elf64::header::Header as Ehdr;
    pub use goblin::elf64::program_header::{ProgramHeader as Phdr, SIZEOF_PHDR};

    pub type Off = u64;
    pub type Addr = u64;
}

/// ELF types of the running process's own pointer width, the counterpart of
/// `ElfW(..)` from `link.h`.
#[cfg(target_pointer_width = "32")]
pub(crate) mod raw {
    pub use goblin::elf32::header::Header as Ehdr;
    pub use goblin::elf32::program_header::{ProgramHeader as Phdr, SIZEOF_PHDR};

    pub type Off = u32;
    pub type Addr = u32;
}

/// Byte view over a readable mapping's memory, restricted to
/// `[start, end)`.
struct MapView<'a> {
    start: usize,
    bytes: &'a [u8],
}

impl MapView<'_> {
    /// Returns a view of the entry's memory, or `None` for a non-readable
    /// mapping.
    fn of(entry: &MapEntry) -> Option<MapView<'_>> {
        if !entry.perms().readable() {
            return None;
        }

        let len = entry.end().checked_sub(entry.start())?;

        // The mapping source reported this range as mapped and readable in
        // our own address space; every read below stays within it.
        let bytes = unsafe { std::slice::from_raw_parts(entry.start() as *const u8, len) };

        Some(MapView {
            start: entry.start(),
            bytes,
        })
    }

    /// Bounds- and alignment-checked read of a native-endian value at an
    /// absolute address.
    fn read<'a, T>(&'a self, addr: usize) -> Option<T>
    where
        T: TryFromCtx<'a, scroll::Endian, Error = scroll::Error>,
    {
        if addr % size_of::<T>() != 0 {
            return None;
        }

        let offset = addr.checked_sub(self.start)?;

        self.bytes.pread_with(offset, scroll::NATIVE).ok()
    }
}

/// Returns true if the mapping starts with the ELF magic.
///
/// The magic must fit strictly inside the mapping (the overflow-safe bounds
/// check is carried by the slice length).
fn is_valid_elf(view: &MapView<'_>) -> bool {
    view.bytes.len() > SELFMAG && view.bytes[..SELFMAG] == *ELFMAG
}

/// Walks the program headers of the image mapped at `entry` and returns the
/// `p_vaddr` of the first `PT_LOAD` segment whose file offset matches the
/// entry's, reading every field directly from mapped memory.
///
/// `None` on any out-of-range, misaligned or overflowing read; the caller
/// degrades that to a zero bias.
fn read_load_bias(entry: &MapEntry, view: &MapView<'_>) -> Option<usize> {
    let ehdr = entry.start();

    let e_phnum: u16 = view.read(ehdr.checked_add(offset_of!(raw::Ehdr, e_phnum))?)?;
    let e_phoff: raw::Off = view.read(ehdr.checked_add(offset_of!(raw::Ehdr, e_phoff))?)?;

    let mut phdr = ehdr.checked_add(usize::try_from(e_phoff).ok()?)?;

    for _ in 0..e_phnum {
        let p_type: u32 = view.read(phdr.checked_add(offset_of!(raw::Phdr, p_type))?)?;
        let p_offset: raw::Off = view.read(phdr.checked_add(offset_of!(raw::Phdr, p_offset))?)?;

        if p_type == PT_LOAD && p_offset as usize == entry.offset() {
            let p_vaddr: raw::Addr = view.read(phdr.checked_add(offset_of!(raw::Phdr, p_vaddr))?)?;
            return Some(p_vaddr as usize);
        }

        phdr = phdr.checked_add(raw::SIZEOF_PHDR)?;
    }

    None
}

/// Finalizes an entry's ELF state, at most once.
///
/// An unreadable or non-ELF mapping finalizes to [`ElfState::NotElf`]; a
/// valid ELF start finalizes to [`ElfState::Image`], with a zero load bias
/// when the program headers are truncated, misaligned, or contain no
/// matching `PT_LOAD` segment.
pub(crate) fn finalize(entry: &mut MapEntry) {
    if entry.elf != ElfState::Pending {
        return;
    }

    entry.elf = match MapView::of(entry) {
        Some(view) if is_valid_elf(&view) => {
            let load_bias = read_load_bias(entry, &view).unwrap_or(0);

            tracing::debug!(
                name = entry.name(),
                load_bias = format_args!("{load_bias:#x}"),
                "validated elf mapping"
            );

            ElfState::Image { load_bias }
        }
        _ => ElfState::NotElf,
    };
}
