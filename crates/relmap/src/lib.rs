//! This crate provides a process-local cache of the calling process's memory
//! mappings, and a lookup that resolves a raw instruction address to its
//! containing mapping plus the matching offset into the backing file.
//!
//! It is a building block for stack unwinding and symbolication: once a PC
//! value is re-expressed as "offset N inside file F", symbol and debug-line
//! information can be looked up for it.
//!
//! The cache is filled lazily from `/proc/self/maps` and refreshed once per
//! lookup miss, since mappings change over time (e.g. `dlopen`). For each
//! mapping, ELF validity and load bias are computed at most once, by walking
//! the program headers directly in mapped memory with bounds- and
//! alignment-checked reads. The common split of an executable into a
//! read-only and a read-exec mapping of the same file is handled by borrowing
//! the load bias from the read-only companion.
//!
//! # Example
//!
//! ```no_run
//! use relmap::MapTable;
//!
//! fn whereami() {}
//!
//! let table = MapTable::new();
//!
//! let (entry, rel_pc) = table.find(whereami as usize).unwrap();
//! assert!(entry.perms().executable());
//! // `rel_pc` is an offset into `entry.name()`, usable for symbol lookup
//! ```

mod elf;
mod entry;
mod error;
mod parse;
mod table;
#[cfg(test)]
mod testutil;

pub use self::entry::{MapEntry, Perms};
pub use self::error::{Error, Result};
pub use self::table::MapTable;
