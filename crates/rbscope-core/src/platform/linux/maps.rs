//! `/proc/<pid>/maps` parsing and image discovery.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{RbscopeError, Result};
use crate::symbols::ImageDescriptor;
use crate::types::{MemoryRegion, ProcessId};

/// Parse the text of a maps file.
pub fn parse_maps(content: &str) -> Result<Vec<MemoryRegion>>
{
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Read and parse `/proc/<pid>/maps`.
pub fn read_maps(pid: ProcessId) -> Result<Vec<MemoryRegion>>
{
    let path = format!("/proc/{pid}/maps");
    let content = fs::read_to_string(&path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => RbscopeError::ProcessNotFound(pid.0),
        ErrorKind::PermissionDenied => RbscopeError::PermissionDenied(format!("cannot read {path}")),
        _ => RbscopeError::Io(err),
    })?;
    parse_maps(&content)
}

/// Images worth loading symbols from: the executable plus every mapped file
/// whose name mentions `ruby` (a shared `libruby`).
///
/// Each image's load address is the start of its mapping at file offset 0.
pub fn interpreter_images(regions: &[MemoryRegion], exe: Option<&Path>) -> Vec<ImageDescriptor>
{
    let mut bases: BTreeMap<PathBuf, u64> = BTreeMap::new();
    for region in regions {
        let Some(path) = region.path.as_ref().filter(|_| region.is_file_backed()) else {
            continue;
        };
        let is_exe = exe.is_some_and(|exe| exe == path);
        let mentions_ruby = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains("ruby"));
        if !(is_exe || mentions_ruby) || region.file_offset != 0 {
            continue;
        }
        let start = region.start.value();
        bases
            .entry(path.clone())
            .and_modify(|base| *base = (*base).min(start))
            .or_insert(start);
    }

    let mut images: Vec<_> = bases
        .into_iter()
        .map(|(path, load_address)| ImageDescriptor { path, load_address })
        .collect();
    // Executable first so its symbols win.
    images.sort_by_key(|image| exe != Some(image.path.as_path()));
    images
}
