// Once clippy takes `clippy.toml` into account (for `tests` targets),
// we can remove these.
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]
#![cfg(target_os = "linux")]

use relmap::{Error, MapTable};
use test_log::test;

fn anchor() {}

#[test]
fn resolves_an_address_inside_our_own_executable_mapping() {
    let table = MapTable::new();
    let pc = anchor as usize;

    let (entry, rel_pc) = table.find(pc).expect("own code address must resolve");

    assert!(entry.contains(pc));
    assert!(entry.perms().readable());
    assert!(entry.perms().executable());
    assert!(!entry.name().is_empty());
    // a file-relative offset never exceeds the runtime address here
    assert!(rel_pc <= pc);
}

#[test]
fn lookup_is_stable_across_calls() {
    let table = MapTable::new();
    let pc = anchor as usize;

    let first = table.find(pc).expect("own code address must resolve");
    let second = table.find(pc).expect("own code address must resolve");

    assert_eq!(first, second);
}

#[test]
fn unmapped_address_is_reported() {
    let table = MapTable::new();

    // the very top of the address space is never mapped for user code
    assert!(matches!(
        table.find(usize::MAX),
        Err(Error::NoContainingMapping(_))
    ));
}
