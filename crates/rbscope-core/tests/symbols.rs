//! Symbol and DWARF layout lookups against this test binary.

#![cfg(target_os = "linux")]

use std::mem::{offset_of, size_of};

use pretty_assertions::assert_eq;
use rbscope_core::platform::linux::maps;
use rbscope_core::symbols::BinaryImage;
use rbscope_core::types::{Address, FieldLayout, ProcessId};

#[repr(C)]
struct ScopeFixtureLocation
{
    path: u64,
    label: u32,
}

#[repr(C)]
struct ScopeFixtureBody
{
    flags: u32,
    location: ScopeFixtureLocation,
    slots: [u16; 6],
    tail: u8,
}

#[no_mangle]
static SCOPE_FIXTURE_BODY: ScopeFixtureBody = ScopeFixtureBody {
    flags: 0x2000,
    location: ScopeFixtureLocation {
        path: 0x1000,
        label: 7,
    },
    slots: [1, 2, 3, 4, 5, 6],
    tail: 0xff,
};

fn own_image() -> BinaryImage
{
    let exe = std::env::current_exe().unwrap();
    let regions = maps::read_maps(ProcessId::from(std::process::id())).unwrap();
    let descriptor = maps::interpreter_images(&regions, Some(&exe))
        .into_iter()
        .find(|image| image.path == exe)
        .expect("test executable is mapped at file offset 0");
    BinaryImage::parse(descriptor).unwrap()
}

fn field_at(offset: usize, size: usize) -> FieldLayout
{
    FieldLayout::new(offset as u64, size as u64)
}

#[test]
fn test_no_mangle_static_resolves_to_runtime_address()
{
    let image = own_image();
    let expected = Address::from(std::ptr::addr_of!(SCOPE_FIXTURE_BODY) as u64);

    assert_eq!(image.symbol_address("SCOPE_FIXTURE_BODY"), Some(expected));
    assert_eq!(image.pointer_width(), size_of::<usize>() as u64);
    assert_eq!(std::hint::black_box(&SCOPE_FIXTURE_BODY).tail, 0xff);
}

#[test]
fn test_struct_layout_matches_compiler()
{
    let image = own_image();
    if !image.has_debug_info() {
        eprintln!("skipping: test binary built without debug info");
        return;
    }

    let layout = image.lookup_type("ScopeFixtureBody").unwrap().expect("fixture struct in DWARF");
    let location = offset_of!(ScopeFixtureBody, location);

    assert_eq!(layout.size(), size_of::<ScopeFixtureBody>() as u64);
    assert_eq!(layout.field("flags").unwrap(), field_at(offset_of!(ScopeFixtureBody, flags), 4));
    assert_eq!(
        layout.field("location").unwrap(),
        field_at(location, size_of::<ScopeFixtureLocation>())
    );
    assert_eq!(
        layout.field("location.path").unwrap(),
        field_at(location + offset_of!(ScopeFixtureLocation, path), 8)
    );
    assert_eq!(
        layout.field("location.label").unwrap(),
        field_at(location + offset_of!(ScopeFixtureLocation, label), 4)
    );
    assert_eq!(
        layout.field("slots").unwrap(),
        field_at(offset_of!(ScopeFixtureBody, slots), size_of::<[u16; 6]>())
    );
    assert_eq!(layout.field("tail").unwrap(), field_at(offset_of!(ScopeFixtureBody, tail), 1));
    assert_eq!(std::hint::black_box(&SCOPE_FIXTURE_BODY).location.label, 7);
}

#[test]
fn test_unknown_type_and_symbol_are_misses()
{
    let image = own_image();

    assert!(image.symbol_address("SCOPE_FIXTURE_ABSENT").is_none());
    assert!(image.lookup_type("ScopeFixtureAbsent").unwrap().is_none());
    // Misses are cached and answer the same way twice.
    assert!(image.lookup_type("ScopeFixtureAbsent").unwrap().is_none());
}
