mod common;

use common::RubyHeap;
use pretty_assertions::assert_eq;
use rbscope_core::config::RuntimeProfile;
use rbscope_core::error::RbscopeError;
use rbscope_core::lineno::{resolve_line, InstructionSequenceBody, PositionEntry};
use rbscope_core::runtime::{BodyLayout, LineEntryLayout};
use rbscope_core::types::Address;
use rstest::rstest;

fn table(entries: &[(u64, u32)]) -> Vec<PositionEntry>
{
    entries.iter().copied().map(PositionEntry::from).collect()
}

#[rstest]
#[case(0, 1)]
#[case(1, 1)]
#[case(3, 1)]
#[case(6, 2)]
#[case(7, 2)]
#[case(13, 3)]
#[case(20, 3)]
fn test_resolve_line_three_entries(#[case] raw: u64, #[case] expected: u32)
{
    let table = table(&[(0, 1), (5, 2), (12, 3)]);
    assert_eq!(resolve_line(&table, raw), expected);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(500)]
fn test_single_entry_always_wins(#[case] raw: u64)
{
    assert_eq!(resolve_line(&table(&[(0, 42)]), raw), 42);
}

#[test]
fn test_empty_table_is_line_zero()
{
    assert_eq!(resolve_line(&[], 0), 0);
    assert_eq!(resolve_line(&[], 99), 0);
}

#[test]
fn test_target_below_first_entry_uses_first_line()
{
    let table = table(&[(4, 7), (9, 8)]);
    assert_eq!(resolve_line(&table, 2), 7);
}

#[test]
fn test_between_entries_uses_preceding_line()
{
    let table = table(&[(0, 1), (10, 5), (20, 9)]);
    assert_eq!(resolve_line(&table, 15), 5);
    assert_eq!(resolve_line(&table, 21), 9);
}

struct Layouts
{
    body: BodyLayout,
    entry: LineEntryLayout,
}

fn layouts(heap: &RubyHeap) -> Layouts
{
    let profile = RuntimeProfile::default();
    Layouts {
        body: BodyLayout::resolve(&heap.mem, &profile).unwrap(),
        entry: LineEntryLayout::resolve(&heap.mem, &profile).unwrap(),
    }
}

#[test]
fn test_read_body_from_memory()
{
    let mut heap = RubyHeap::new();
    let iseq = heap.iseq("app.rb", "<main>", &[(0, 1), (5, 2), (12, 3)]);
    let layouts = layouts(&heap);

    let body = InstructionSequenceBody::read(&heap.mem, &layouts.body, &layouts.entry, iseq.body, 1024).unwrap();

    assert_eq!(body.encoded, iseq.encoded);
    assert_eq!(body.table, table(&[(0, 1), (5, 2), (12, 3)]));
    assert_eq!(body.line_for_pc(iseq.pc(6), 8), 2);
    assert_eq!(body.line_for_pc(iseq.pc(13), 8), 3);
}

#[test]
fn test_read_empty_table_skips_table_pointer()
{
    let mut heap = RubyHeap::new();
    let iseq = heap.iseq("app.rb", "<main>", &[]);
    let layouts = layouts(&heap);

    let body = InstructionSequenceBody::read(&heap.mem, &layouts.body, &layouts.entry, iseq.body, 1024).unwrap();

    assert!(body.table.is_empty());
    assert_eq!(body.line_for_pc(iseq.pc(3), 8), 0);
}

#[test]
fn test_oversized_table_is_memory_error()
{
    let mut heap = RubyHeap::new();
    let iseq = heap.iseq("app.rb", "<main>", &[(0, 1), (5, 2), (12, 3)]);
    let layouts = layouts(&heap);

    let err = InstructionSequenceBody::read(&heap.mem, &layouts.body, &layouts.entry, iseq.body, 2).unwrap_err();
    assert!(matches!(err, RbscopeError::MemoryAccess { .. }));
}

#[test]
fn test_unreadable_table_is_memory_error()
{
    let mut heap = RubyHeap::new();
    let iseq = heap.iseq("app.rb", "<main>", &[(0, 1)]);
    heap.write_u64(iseq.body + 64, 0x7f00_0000_0000);
    let layouts = layouts(&heap);

    let err = InstructionSequenceBody::read(&heap.mem, &layouts.body, &layouts.entry, iseq.body, 1024).unwrap_err();
    assert!(
        matches!(err, RbscopeError::MemoryAccess { address, .. } if address == Address::from(0x7f00_0000_0000))
    );
}

#[test]
fn test_raw_position_scales_by_pointer_width()
{
    let body = InstructionSequenceBody {
        encoded: Address::from(0x1000),
        table: Vec::new(),
    };
    assert_eq!(body.raw_position(Address::from(0x1030), 8), 6);
    assert_eq!(body.raw_position(Address::from(0x1030), 4), 12);
    assert_eq!(body.raw_position(Address::from(0x1000), 8), 0);
}
