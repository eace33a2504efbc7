//! DWARF struct layout extraction.
//!
//! Finds the definition of a named struct (or a typedef of one) and flattens
//! it into dotted field paths. Nested structs and unions contribute their own
//! members under the parent member's name; anonymous members contribute
//! theirs directly, the way C lets you name them.

use gimli::{constants, AttributeValue, DebuggingInformationEntry, DwTag, Reader, Unit, UnitOffset, UnitSectionOffset};
use tracing::trace;

use super::{map_dwarf_error, OwnedDwarf, OwnedReader};
use crate::error::Result;
use crate::types::{FieldLayout, TypeLayout};

const MAX_TYPE_REF_DEPTH: usize = 32;

type Entry<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, OwnedReader>;

/// A DIE addressed by its unit and its offset within that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DieRef
{
    unit: usize,
    offset: UnitOffset<usize>,
}

/// What a member's type chain bottoms out at.
#[derive(Debug, Clone, Copy)]
struct ResolvedType
{
    die: DieRef,
    tag: DwTag,
    size: Option<u64>,
}

pub(crate) struct TypeExtractor<'a>
{
    dwarf: &'a OwnedDwarf,
    units: Vec<Unit<OwnedReader>>,
}

impl<'a> TypeExtractor<'a>
{
    pub(crate) fn new(dwarf: &'a OwnedDwarf) -> Result<Self>
    {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            units.push(
                dwarf
                    .unit(header)
                    .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
            );
        }

        Ok(Self { dwarf, units })
    }

    /// Layout of the struct or union called `target`, if any unit defines it.
    ///
    /// Declarations without a body are skipped; a typedef named `target` is
    /// followed to the aggregate it names.
    pub(crate) fn describe(&self, target: &str) -> Result<Option<TypeLayout>>
    {
        for unit_index in 0..self.units.len() {
            if let Some(layout) = self.describe_in_unit(unit_index, target)? {
                return Ok(Some(layout));
            }
        }
        Ok(None)
    }

    fn describe_in_unit(&self, unit_index: usize, target: &str) -> Result<Option<TypeLayout>>
    {
        let unit = &self.units[unit_index];
        let mut cursor = unit.entries();
        while let Some((_delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
            if !matches!(
                entry.tag(),
                constants::DW_TAG_structure_type | constants::DW_TAG_union_type | constants::DW_TAG_typedef
            ) {
                continue;
            }
            if self.is_declaration(entry)? {
                continue;
            }
            if self.entry_name(unit, entry)?.as_deref() != Some(target) {
                continue;
            }

            let die = DieRef {
                unit: unit_index,
                offset: entry.offset(),
            };
            let Some(resolved) = self.resolve_die(die, 0)? else {
                continue;
            };
            if !is_aggregate(resolved.tag) {
                continue;
            }
            let Some(size) = resolved.size else {
                continue;
            };

            let mut layout = TypeLayout::new(target, size);
            self.flatten_members(resolved.die, "", 0, &mut layout, 0)?;
            trace!(name = target, size, fields = layout.field_count(), "type layout extracted");
            return Ok(Some(layout));
        }
        Ok(None)
    }

    /// Add every member of the aggregate at `die` to `layout`, prefixed by
    /// `prefix` and shifted by `base`.
    fn flatten_members(&self, die: DieRef, prefix: &str, base: u64, layout: &mut TypeLayout, depth: usize) -> Result<()>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Ok(());
        }

        let unit = &self.units[die.unit];
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building struct tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating struct root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating struct children", err))?
        {
            let member = child.entry();
            if member.tag() != constants::DW_TAG_member {
                continue;
            }
            // Bitfields have no byte-addressable storage of their own.
            if member
                .attr(constants::DW_AT_bit_size)
                .map_err(|err| map_dwarf_error("reading DW_AT_bit_size", err))?
                .is_some()
            {
                continue;
            }

            let offset = base + self.member_offset(member)?;
            let name = self.entry_name(unit, member)?;
            let resolved = match member
                .attr(constants::DW_AT_type)
                .map_err(|err| map_dwarf_error("reading member type", err))?
            {
                Some(attr) => match self.reference(die.unit, attr.value()) {
                    Some(target) => self.resolve_die(target, depth + 1)?,
                    None => None,
                },
                None => None,
            };

            let path = match &name {
                Some(name) if prefix.is_empty() => name.clone(),
                Some(name) => format!("{prefix}.{name}"),
                None => prefix.to_string(),
            };

            if let Some(resolved) = resolved {
                if name.is_some() {
                    let size = resolved.size.unwrap_or(0);
                    layout.insert_field(path.clone(), FieldLayout::new(offset, size));
                }
                if is_aggregate(resolved.tag) {
                    self.flatten_members(resolved.die, &path, offset, layout, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Follow typedef / const / volatile links to the type that has storage.
    fn resolve_die(&self, mut die: DieRef, mut depth: usize) -> Result<Option<ResolvedType>>
    {
        loop {
            if depth >= MAX_TYPE_REF_DEPTH {
                return Ok(None);
            }
            let unit = &self.units[die.unit];
            let entry = unit
                .entry(die.offset)
                .map_err(|err| map_dwarf_error("resolving type reference", err))?;

            match entry.tag() {
                constants::DW_TAG_typedef
                | constants::DW_TAG_const_type
                | constants::DW_TAG_volatile_type
                | constants::DW_TAG_restrict_type
                | constants::DW_TAG_atomic_type => {
                    let Some(attr) = entry
                        .attr(constants::DW_AT_type)
                        .map_err(|err| map_dwarf_error("reading aliased type", err))?
                    else {
                        return Ok(None);
                    };
                    let Some(next) = self.reference(die.unit, attr.value()) else {
                        return Ok(None);
                    };
                    die = next;
                    depth += 1;
                }
                constants::DW_TAG_pointer_type => {
                    let size = self
                        .byte_size(&entry)?
                        .unwrap_or_else(|| u64::from(unit.header.address_size()));
                    return Ok(Some(ResolvedType {
                        die,
                        tag: entry.tag(),
                        size: Some(size),
                    }));
                }
                constants::DW_TAG_array_type => {
                    let size = self.array_size(die, &entry, depth)?;
                    return Ok(Some(ResolvedType {
                        die,
                        tag: entry.tag(),
                        size,
                    }));
                }
                tag => {
                    return Ok(Some(ResolvedType {
                        die,
                        tag,
                        size: self.byte_size(&entry)?,
                    }));
                }
            }
        }
    }

    /// Element size times the product of every dimension's length.
    fn array_size(&self, die: DieRef, entry: &Entry<'_, '_>, depth: usize) -> Result<Option<u64>>
    {
        if let Some(size) = self.byte_size(entry)? {
            return Ok(Some(size));
        }

        let element = match entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading array element type", err))?
        {
            Some(attr) => match self.reference(die.unit, attr.value()) {
                Some(target) => self.resolve_die(target, depth + 1)?,
                None => None,
            },
            None => None,
        };
        let Some(element_size) = element.and_then(|element| element.size) else {
            return Ok(None);
        };

        let unit = &self.units[die.unit];
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building array tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating array root", err))?;
        let mut children = root.children();
        let mut total = element_size;
        while let Some(child) = children.next().map_err(|err| map_dwarf_error("iterating subranges", err))? {
            let subrange = child.entry();
            if subrange.tag() != constants::DW_TAG_subrange_type {
                continue;
            }
            let count = if let Some(attr) = subrange
                .attr(constants::DW_AT_count)
                .map_err(|err| map_dwarf_error("reading DW_AT_count", err))?
            {
                attr.udata_value()
            } else if let Some(attr) = subrange
                .attr(constants::DW_AT_upper_bound)
                .map_err(|err| map_dwarf_error("reading DW_AT_upper_bound", err))?
            {
                attr.udata_value().map(|upper| upper + 1)
            } else {
                None
            };
            // Flexible array members occupy no storage.
            total = total.saturating_mul(count.unwrap_or(0));
        }
        Ok(Some(total))
    }

    fn member_offset(&self, entry: &Entry<'_, '_>) -> Result<u64>
    {
        Ok(entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
            .and_then(|attr| attr.udata_value())
            .unwrap_or(0))
    }

    fn byte_size(&self, entry: &Entry<'_, '_>) -> Result<Option<u64>>
    {
        Ok(entry
            .attr(constants::DW_AT_byte_size)
            .map_err(|err| map_dwarf_error("reading DW_AT_byte_size", err))?
            .and_then(|attr| attr.udata_value()))
    }

    fn is_declaration(&self, entry: &Entry<'_, '_>) -> Result<bool>
    {
        Ok(matches!(
            entry
                .attr_value(constants::DW_AT_declaration)
                .map_err(|err| map_dwarf_error("reading DW_AT_declaration", err))?,
            Some(AttributeValue::Flag(true))
        ))
    }

    fn entry_name(&self, unit: &Unit<OwnedReader>, entry: &Entry<'_, '_>) -> Result<Option<String>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        else {
            return Ok(None);
        };
        let reader = self
            .dwarf
            .attr_string(unit, attr.value())
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let name = reader
            .to_string_lossy()
            .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
            .into_owned();
        Ok(Some(name))
    }

    fn reference(&self, unit: usize, value: AttributeValue<OwnedReader>) -> Option<DieRef>
    {
        match value {
            AttributeValue::UnitRef(offset) => Some(DieRef { unit, offset }),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                self.units.iter().enumerate().find_map(|(index, unit)| {
                    target
                        .to_unit_offset(unit)
                        .map(|offset| DieRef { unit: index, offset })
                })
            }
            _ => None,
        }
    }
}

fn is_aggregate(tag: DwTag) -> bool
{
    matches!(tag, constants::DW_TAG_structure_type | constants::DW_TAG_union_type)
}
