//! ELF image parsing, symbol tables and DWARF section loading.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use super::extractor::TypeExtractor;
use super::{OwnedDwarf, OwnedReader};
use crate::error::{RbscopeError, Result};
use crate::types::{Address, TypeLayout};

/// Root of the distribution's separate debug-info tree.
const DEBUG_ROOT: &str = "/usr/lib/debug";

/// An ELF file mapped into the target.
#[derive(Debug, Clone)]
pub struct ImageDescriptor
{
    pub path: PathBuf,
    /// Runtime address of the lowest mapping of the file (file offset 0).
    pub load_address: u64,
}

const DWARF_SECTIONS: &[(SectionId, &str)] = &[
    (SectionId::DebugAbbrev, ".debug_abbrev"),
    (SectionId::DebugAddr, ".debug_addr"),
    (SectionId::DebugInfo, ".debug_info"),
    // Unit parsing reads each unit's line program header.
    (SectionId::DebugLine, ".debug_line"),
    (SectionId::DebugLineStr, ".debug_line_str"),
    (SectionId::DebugStr, ".debug_str"),
    (SectionId::DebugStrOffsets, ".debug_str_offsets"),
    (SectionId::DebugTypes, ".debug_types"),
];

fn load_section_bytes(file: &object::File<'_>, name: &str) -> Result<Option<Arc<[u8]>>>
{
    let Some(section) = file.section_by_name(name) else {
        return Ok(None);
    };
    let data = section
        .uncompressed_data()
        .map_err(|err| RbscopeError::InvalidArgument(format!("failed to read {name}: {err}")))?;
    Ok(Some(match data {
        Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
        Cow::Owned(vec) => vec.into(),
    }))
}

fn load_debug_sections(file: &object::File<'_>) -> Result<HashMap<SectionId, Arc<[u8]>>>
{
    let mut sections = HashMap::new();
    for (id, name) in DWARF_SECTIONS {
        if let Some(data) = load_section_bytes(file, name)? {
            sections.insert(*id, data);
        }
    }
    Ok(sections)
}

fn parse_object<'data>(path: &Path, data: &'data [u8]) -> Result<object::File<'data>>
{
    object::File::parse(data)
        .map_err(|err| RbscopeError::InvalidArgument(format!("failed to parse {}: {err}", path.display())))
}

/// Candidate separate debug files for an image, most specific first.
pub(crate) fn debug_file_candidates(path: &Path, build_id: Option<&[u8]>) -> Vec<PathBuf>
{
    let root = Path::new(DEBUG_ROOT);
    let mut candidates = Vec::new();
    if let Some((first, rest)) = build_id.and_then(|id| id.split_first()) {
        let mut name = String::with_capacity(rest.len() * 2 + 6);
        for byte in rest {
            let _ = write!(name, "{byte:02x}");
        }
        name.push_str(".debug");
        candidates.push(root.join(".build-id").join(format!("{first:02x}")).join(name));
    }
    if let Ok(relative) = path.strip_prefix("/") {
        let mut with_suffix = root.join(relative).into_os_string();
        with_suffix.push(".debug");
        candidates.push(PathBuf::from(with_suffix));
        candidates.push(root.join(relative));
    }
    candidates
}

/// Parsed image with symbols and lazily loaded DWARF.
pub struct BinaryImage
{
    path: PathBuf,
    endian: RunTimeEndian,
    pointer_width: u64,
    bias: u64,
    symbols: HashMap<String, u64>,
    debug_sections: HashMap<SectionId, Arc<[u8]>>,
    debug_path: Option<PathBuf>,
    dwarf_cache: OnceCell<OwnedDwarf>,
    type_cache: RwLock<HashMap<String, Option<Arc<TypeLayout>>>>,
}

impl BinaryImage
{
    pub fn parse(desc: ImageDescriptor) -> Result<Self>
    {
        let bytes = fs::read(&desc.path)?;
        let file = parse_object(&desc.path, &bytes)?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let pointer_width = if file.is_64() { 8 } else { 4 };

        let lowest_vaddr = file
            .segments()
            .map(|segment| segment.address())
            .min()
            .unwrap_or(0)
            & !0xfff;
        let bias = desc.load_address.wrapping_sub(lowest_vaddr);

        let mut symbols = HashMap::new();
        for symbol in file.symbols().chain(file.dynamic_symbols()) {
            if symbol.is_undefined() || !matches!(symbol.kind(), SymbolKind::Data | SymbolKind::Text | SymbolKind::Tls) {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            // Versioned dynamic names look like `malloc@@GLIBC_2.2.5`.
            let name = name.split('@').next().unwrap_or(name);
            symbols.entry(name.to_string()).or_insert(symbol.address());
        }

        let mut debug_sections = load_debug_sections(&file)?;
        let mut debug_path = None;
        if !debug_sections.contains_key(&SectionId::DebugInfo) {
            let build_id = file.build_id().ok().flatten();
            for candidate in debug_file_candidates(&desc.path, build_id) {
                let Ok(debug_bytes) = fs::read(&candidate) else {
                    continue;
                };
                let debug_file = parse_object(&candidate, &debug_bytes)?;
                let sections = load_debug_sections(&debug_file)?;
                if sections.contains_key(&SectionId::DebugInfo) {
                    debug!(image = %desc.path.display(), debug = %candidate.display(), "using separate debug file");
                    debug_sections = sections;
                    debug_path = Some(candidate);
                    break;
                }
            }
        }

        debug!(
            image = %desc.path.display(),
            bias = format_args!("{bias:#x}"),
            symbols = symbols.len(),
            has_dwarf = debug_sections.contains_key(&SectionId::DebugInfo),
            "image loaded"
        );

        Ok(Self {
            path: desc.path,
            endian,
            pointer_width,
            bias,
            symbols,
            debug_sections,
            debug_path,
            dwarf_cache: OnceCell::new(),
            type_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Separate debug file the DWARF came from, if not the image itself.
    pub fn debug_path(&self) -> Option<&Path>
    {
        self.debug_path.as_deref()
    }

    pub fn pointer_width(&self) -> u64
    {
        self.pointer_width
    }

    pub fn has_debug_info(&self) -> bool
    {
        self.debug_sections.contains_key(&SectionId::DebugInfo)
    }

    /// Runtime address of a defined symbol.
    pub fn symbol_address(&self, name: &str) -> Option<Address>
    {
        self.symbols
            .get(name)
            .map(|vaddr| Address::from(vaddr.wrapping_add(self.bias)))
    }

    fn dwarf(&self) -> Result<&OwnedDwarf>
    {
        self.dwarf_cache.get_or_try_init(|| {
            Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
                .map_err(|err| RbscopeError::InvalidArgument(format!("failed to load DWARF: {err}")))
        })
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .debug_sections
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }

    /// Layout of `name` from this image's DWARF, cached per name (misses too).
    pub fn lookup_type(&self, name: &str) -> Result<Option<Arc<TypeLayout>>>
    {
        if let Some(cached) = self
            .type_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(cached.clone());
        }
        if !self.has_debug_info() {
            return Ok(None);
        }

        let dwarf = self.dwarf()?;
        let extractor = TypeExtractor::new(dwarf)?;
        let layout = extractor.describe(name)?.map(Arc::new);
        trace!(image = %self.path.display(), name, found = layout.is_some(), "type lookup");

        self.type_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), layout.clone());
        Ok(layout)
    }
}
