mod common;

use common::{RubyHeap, NOEMBED};
use pretty_assertions::assert_eq;
use rbscope_core::config::RuntimeProfile;
use rbscope_core::error::RbscopeError;
use rbscope_core::rstring::{decode, read_tagged, TaggedString};
use rbscope_core::runtime::RStringLayout;
use rbscope_core::types::Address;

fn layout(heap: &RubyHeap) -> RStringLayout
{
    RStringLayout::resolve(&heap.mem, &RuntimeProfile::default()).unwrap()
}

#[test]
fn test_embedded_string()
{
    let mut heap = RubyHeap::new();
    let object = heap.embedded_string("<main>");
    let layout = layout(&heap);

    let tagged = read_tagged(&heap.mem, &layout, object, 4096).unwrap();
    assert!(tagged.is_embedded());
    assert_eq!(tagged.to_string_lossy(), "<main>");
}

#[test]
fn test_heap_string()
{
    let mut heap = RubyHeap::new();
    let text = "/usr/lib/ruby/2.4.0/rubygems/core_ext/kernel_require.rb";
    let object = heap.heap_string(text);
    let layout = layout(&heap);

    let tagged = read_tagged(&heap.mem, &layout, object, 4096).unwrap();
    assert!(matches!(tagged, TaggedString::Heap { .. }));
    assert_eq!(tagged.to_string_lossy(), text);
}

#[test]
fn test_heap_string_truncated_at_limit()
{
    let mut heap = RubyHeap::new();
    let object = heap.heap_string("abcdefghijklmnopqrstuvwxyz0123456789");
    let layout = layout(&heap);

    assert_eq!(decode(&heap.mem, &layout, object, 10).unwrap(), "abcdefghij");
}

#[test]
fn test_selector_bit_chooses_storage()
{
    let mut heap = RubyHeap::new();
    let object = heap.heap_string("stored on the heap, far away");
    let layout = layout(&heap);
    assert_eq!(decode(&heap.mem, &layout, object, 4096).unwrap(), "stored on the heap, far away");

    // With NOEMBED clear the length word is read as inline bytes.
    heap.mem.write_bytes(object + 16, b"inline\0").unwrap();
    heap.write_u64(object, 0x05);
    assert_eq!(decode(&heap.mem, &layout, object, 4096).unwrap(), "inline");

    // Setting it again follows the untouched pointer word.
    heap.write_u64(object, 0x05 | NOEMBED);
    assert_eq!(decode(&heap.mem, &layout, object, 4096).unwrap(), "stored on the heap, far away");
}

#[test]
fn test_embedded_ignores_heap_pointer_contents()
{
    let mut heap = RubyHeap::new();
    let object = heap.embedded_string("label");
    let layout = layout(&heap);

    // Bytes past the terminator are never interpreted as a pointer.
    heap.mem.write_bytes(object + 24, &[0xff; 16]).unwrap();
    assert_eq!(decode(&heap.mem, &layout, object, 4096).unwrap(), "label");
}

#[test]
fn test_unmapped_object_is_memory_error()
{
    let heap = RubyHeap::new();
    let layout = layout(&heap);

    let err = decode(&heap.mem, &layout, Address::from(0x10), 4096).unwrap_err();
    assert!(matches!(err, RbscopeError::MemoryAccess { .. }));
}

#[test]
fn test_heap_string_through_borrowed_accessor()
{
    let mut heap = RubyHeap::new();
    let object = heap.heap_string("placeholder");
    // Buffer sits alone in a segment smaller than the read limit.
    let buffer = Address::from(0x2000);
    heap.mem.map_bytes(buffer, b"app.rb\0".to_vec());
    heap.write_u64(object + 16, 6);
    heap.write_u64(object + 24, buffer.value());
    let layout = layout(&heap);

    let direct = decode(&heap.mem, &layout, object, 4096).unwrap();
    let borrowed = &heap.mem;
    let through_ref = decode(&borrowed, &layout, object, 4096).unwrap();

    assert_eq!(direct, "app.rb");
    assert_eq!(through_ref, direct);
}
