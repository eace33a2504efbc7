//! # Symbols
//!
//! ELF images mapped into the target, their global symbols, and struct
//! layouts taken from their DWARF.
//!
//! An interpreter build with debug information describes `rb_thread_t`,
//! `rb_control_frame_t`, `RString` and friends in `.debug_info`. The
//! [`extractor`] turns one of those descriptions into a flat
//! [`TypeLayout`](crate::types::TypeLayout), and [`image::BinaryImage`] caches
//! the result per type name.

pub mod extractor;
pub mod image;

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian};

pub use image::{BinaryImage, ImageDescriptor};

use crate::error::RbscopeError;

pub(crate) type OwnedReader = EndianArcSlice<RunTimeEndian>;
pub(crate) type OwnedDwarf = Dwarf<OwnedReader>;

pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> RbscopeError
{
    RbscopeError::InvalidArgument(format!("{context}: {err}"))
}
