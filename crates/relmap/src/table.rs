use std::collections::{BTreeMap, btree_map};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::elf;
use crate::entry::{ElfState, MapEntry};
use crate::error::{Error, Result};
use crate::parse::parse_line;

const DEFAULT_SOURCE: &str = "/proc/self/maps";

/// Cache key: a mapping's half-open address range.
type RangeKey = (usize, usize);

/// Cache of the process's memory mappings, ordered and deduplicated by
/// address range.
///
/// Construction performs no I/O; the first [`find`](Self::find) triggers the
/// first read of the mapping source, and a lookup miss triggers exactly one
/// re-read before giving up. A single lock guards cache membership and the
/// lazy per-entry ELF state for the whole duration of a lookup, so a table
/// can be shared between threads taking their own backtraces.
pub struct MapTable {
    source: PathBuf,
    entries: Mutex<BTreeMap<RangeKey, MapEntry>>,
}

impl MapTable {
    /// Creates a table reading from `/proc/self/maps`.
    pub fn new() -> Self {
        Self::from_source(DEFAULT_SOURCE)
    }

    /// Creates a table reading mappings from the given file instead of
    /// `/proc/self/maps` (e.g. a saved snapshot, or a test fixture).
    pub fn from_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Re-reads the mapping source, inserting entries the cache does not
    /// hold yet.
    ///
    /// An entry whose address range is already cached with the same name and
    /// file offset is discarded, preserving the cached entry's computed ELF
    /// state; if name or offset differ, the range was reused since the last
    /// read and the cached entry is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the source cannot be opened or read, and
    /// [`Error::MalformedLine`] on the first line that does not match the
    /// mapping grammar. Entries inserted before a failure are kept.
    pub fn reload(&self) -> Result<()> {
        let mut entries = self.lock();

        self.load(&mut entries)
    }

    /// Resolves `pc` to its containing mapping and the matching
    /// file-relative address.
    ///
    /// A cache miss is treated as possibly-stale state: the mapping source
    /// is re-read once before the lookup fails. When the containing mapping
    /// is the read-exec half of a split executable mapping, the load bias of
    /// the preceding read-only mapping of the same file is used, so the
    /// returned address is an offset into that file's read-only view.
    ///
    /// Returns an owned snapshot of the entry together with the relative
    /// address.
    ///
    /// # Errors
    ///
    /// Propagates reload errors (see [`reload`](Self::reload)), and returns
    /// [`Error::NoContainingMapping`] if no mapping covers `pc` even after
    /// the refresh.
    pub fn find(&self, pc: usize) -> Result<(MapEntry, usize)> {
        let mut entries = self.lock();

        if containing(&entries, pc).is_none() {
            tracing::debug!(
                pc = format_args!("{pc:#x}"),
                "cache miss, reloading mappings"
            );
            self.load(&mut entries)?;
        }

        let Some(key) = containing(&entries, pc) else {
            return Err(Error::NoContainingMapping(pc));
        };

        if let Some(entry) = entries.get_mut(&key) {
            elf::finalize(entry);
        }

        // A read-exec mapping whose ELF header lives in the preceding
        // read-only mapping of the same file borrows that mapping's bias,
        // re-expressing the pc relative to the read-only view of the file.
        if let Some(prev_key) = bias_donor(&entries, key) {
            if let Some(prev) = entries.get_mut(&prev_key) {
                elf::finalize(prev);
            }

            let donated = entries.get(&prev_key).and_then(|prev| match prev.elf {
                ElfState::Image { load_bias } => Some((prev.offset(), load_bias)),
                ElfState::Pending | ElfState::NotElf => None,
            });

            if let (Some((prev_offset, load_bias)), Some(entry)) =
                (donated, entries.get_mut(&key))
            {
                entry.elf_start_offset = Some(prev_offset);
                let rel_pc = pc - entry.start() + entry.offset() + load_bias;

                return Ok((entry.clone(), rel_pc));
            }
        }

        let Some(entry) = entries.get(&key) else {
            return Err(Error::NoContainingMapping(pc));
        };
        let rel_pc = pc - entry.start() + entry.offset() + entry.load_bias();

        Ok((entry.clone(), rel_pc))
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RangeKey, MapEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, entries: &mut BTreeMap<RangeKey, MapEntry>) -> Result<()> {
        let file = File::open(&self.source).map_err(|e| Error::Source(self.source.clone(), e))?;

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::Source(self.source.clone(), e))?;
            let entry = parse_line(&line).ok_or_else(|| Error::MalformedLine(line.clone()))?;

            match entries.entry((entry.start(), entry.end())) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                btree_map::Entry::Occupied(mut slot) => {
                    // Same range, different backing: the address space was
                    // reused and the cached ELF state is stale.
                    let cached = slot.get();
                    if cached.name() != entry.name() || cached.offset() != entry.offset() {
                        slot.insert(entry);
                    }
                }
            }
        }

        tracing::debug!(
            count = entries.len(),
            source = %self.source.display(),
            "mappings loaded"
        );

        Ok(())
    }
}

impl Default for MapTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the key of the cached entry whose range covers `pc`.
fn containing(entries: &BTreeMap<RangeKey, MapEntry>, pc: usize) -> Option<RangeKey> {
    entries
        .range(..=(pc, usize::MAX))
        .next_back()
        .map(|(key, _)| *key)
        .filter(|&(_, end)| pc < end)
}

/// Finds the read-only predecessor eligible to donate its load bias to the
/// (non-ELF) entry at `key`: immediately preceding in address order, without
/// the exec bit, with a numerically smaller file offset, and backed by the
/// same file.
fn bias_donor(entries: &BTreeMap<RangeKey, MapEntry>, key: RangeKey) -> Option<RangeKey> {
    let entry = entries.get(&key)?;

    if entry.is_elf() {
        return None;
    }

    entries
        .range(..key)
        .next_back()
        .filter(|(_, prev)| {
            prev.perms().is_read_only()
                && prev.offset() < entry.offset()
                && prev.name() == entry.name()
        })
        .map(|(key, _)| *key)
}
