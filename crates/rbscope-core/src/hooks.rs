//! Allocation hook bookkeeping.
//!
//! Tracks which allocator entry points currently have a hook installed so a
//! host (a debugger, a tracer) can toggle them as a group and turn each hit
//! into a report. Placing the actual trap is the host's job and sits behind
//! [`HookInstaller`]; this module only keeps one optional handle per kind.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::config::RuntimeProfile;
use crate::error::Result;
use crate::memory::MemoryAccessor;
use crate::runtime::RubyLayouts;
use crate::types::Trace;
use crate::walker;

/// Allocator entry points that can be hooked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind
{
    Malloc,
    Calloc,
    Realloc,
    Free,
}

impl HookKind
{
    /// All kinds, in toggle order.
    pub const ALL: [HookKind; 4] = [HookKind::Malloc, HookKind::Calloc, HookKind::Realloc, HookKind::Free];

    /// libc symbol the hook is placed on.
    pub const fn symbol(self) -> &'static str
    {
        match self {
            HookKind::Malloc => "__libc_malloc",
            HookKind::Calloc => "__libc_calloc",
            HookKind::Realloc => "__libc_realloc",
            HookKind::Free => "__libc_free",
        }
    }

    pub const fn label(self) -> &'static str
    {
        match self {
            HookKind::Malloc => "malloc",
            HookKind::Calloc => "calloc",
            HookKind::Realloc => "realloc",
            HookKind::Free => "free",
        }
    }

    /// Whether a hit of this kind also captures the Ruby stack.
    pub const fn captures_stack(self) -> bool
    {
        matches!(self, HookKind::Malloc)
    }
}

impl fmt::Display for HookKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.label())
    }
}

/// Places and removes hooks in the target.
pub trait HookInstaller
{
    /// Opaque handle identifying one installed hook.
    type Handle;

    fn install(&mut self, kind: HookKind) -> Result<Self::Handle>;

    /// Remove the hook behind `handle`. On error the hook is assumed to still
    /// be in place.
    fn uninstall(&mut self, kind: HookKind, handle: &Self::Handle) -> Result<()>;
}

/// One optional active handle per [`HookKind`].
#[derive(Debug)]
pub struct HookRegistry<H>
{
    active: BTreeMap<HookKind, H>,
}

impl<H> Default for HookRegistry<H>
{
    fn default() -> Self
    {
        Self {
            active: BTreeMap::new(),
        }
    }
}

impl<H> HookRegistry<H>
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Record `handle` as the active hook for `kind`, returning the handle it
    /// replaced.
    pub fn insert(&mut self, kind: HookKind, handle: H) -> Option<H>
    {
        self.active.insert(kind, handle)
    }

    /// Forget the active hook for `kind`, returning its handle.
    pub fn remove(&mut self, kind: HookKind) -> Option<H>
    {
        self.active.remove(&kind)
    }

    pub fn is_active(&self, kind: HookKind) -> bool
    {
        self.active.contains_key(&kind)
    }

    pub fn get(&self, kind: HookKind) -> Option<&H>
    {
        self.active.get(&kind)
    }

    /// Kinds with an active hook, in toggle order.
    pub fn active_kinds(&self) -> Vec<HookKind>
    {
        self.active.keys().copied().collect()
    }

    /// Flip every kind: active hooks are uninstalled, inactive ones installed.
    ///
    /// Stops at the first installer error; kinds handled before it keep their
    /// new state. A kind whose uninstall fails stays active with its handle.
    pub fn toggle_all<I>(&mut self, installer: &mut I) -> Result<()>
    where
        I: HookInstaller<Handle = H>,
    {
        for kind in HookKind::ALL {
            match self.active.get(&kind) {
                Some(handle) => {
                    installer.uninstall(kind, handle)?;
                    self.active.remove(&kind);
                    info!(%kind, symbol = kind.symbol(), "hook removed");
                }
                None => {
                    let handle = installer.install(kind)?;
                    self.active.insert(kind, handle);
                    info!(%kind, symbol = kind.symbol(), "hook installed");
                }
            }
        }
        Ok(())
    }
}

/// What one hook hit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookReport
{
    pub kind: HookKind,
    /// Ruby stack at the hit, for kinds that capture one.
    pub trace: Option<Trace>,
}

impl fmt::Display for HookReport
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "type : {}", self.kind)?;
        if let Some(trace) = &self.trace {
            writeln!(f, "ruby callstack:")?;
            for entry in trace {
                writeln!(f, "{entry}")?;
            }
        }
        Ok(())
    }
}

/// Build the report for a hit of `kind` on the current thread.
///
/// The host resumes the target afterwards; hits never keep it stopped.
pub fn on_hook_hit<M>(mem: &M, kind: HookKind, layouts: &RubyLayouts, profile: &RuntimeProfile) -> Result<HookReport>
where
    M: MemoryAccessor + ?Sized,
{
    let trace = if kind.captures_stack() {
        Some(walker::capture_with_layouts(mem, layouts, None, profile)?)
    } else {
        None
    };
    debug!(%kind, frames = trace.as_ref().map_or(0, Trace::len), "hook hit");
    Ok(HookReport { kind, trace })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::error::RbscopeError;

    #[derive(Default)]
    struct RecordingInstaller
    {
        next: u32,
        log: Vec<String>,
        fail_on: Option<HookKind>,
    }

    impl HookInstaller for RecordingInstaller
    {
        type Handle = u32;

        fn install(&mut self, kind: HookKind) -> Result<u32>
        {
            if self.fail_on == Some(kind) {
                return Err(RbscopeError::SymbolNotFound(kind.symbol().into()));
            }
            self.next += 1;
            self.log.push(format!("+{kind}"));
            Ok(self.next)
        }

        fn uninstall(&mut self, kind: HookKind, handle: &u32) -> Result<()>
        {
            self.log.push(format!("-{kind}#{handle}"));
            Ok(())
        }
    }

    #[test]
    fn test_toggle_installs_then_removes()
    {
        let mut registry = HookRegistry::new();
        let mut installer = RecordingInstaller::default();

        registry.toggle_all(&mut installer).unwrap();
        assert_eq!(registry.active_kinds(), HookKind::ALL.to_vec());

        registry.toggle_all(&mut installer).unwrap();
        assert!(registry.active_kinds().is_empty());
        assert_eq!(
            installer.log,
            ["+malloc", "+calloc", "+realloc", "+free", "-malloc#1", "-calloc#2", "-realloc#3", "-free#4"]
        );
    }

    #[test]
    fn test_toggle_flips_each_kind_independently()
    {
        let mut registry = HookRegistry::new();
        registry.insert(HookKind::Free, 99);
        let mut installer = RecordingInstaller::default();

        registry.toggle_all(&mut installer).unwrap();
        assert!(!registry.is_active(HookKind::Free));
        assert!(registry.is_active(HookKind::Malloc));
    }

    #[test]
    fn test_toggle_stops_at_first_error()
    {
        let mut registry = HookRegistry::new();
        let mut installer = RecordingInstaller {
            fail_on: Some(HookKind::Realloc),
            ..RecordingInstaller::default()
        };

        assert!(registry.toggle_all(&mut installer).is_err());
        assert_eq!(registry.active_kinds(), vec![HookKind::Malloc, HookKind::Calloc]);
    }

    #[test]
    fn test_only_malloc_captures_stack()
    {
        let capturing: Vec<_> = HookKind::ALL.into_iter().filter(|kind| kind.captures_stack()).collect();
        assert_eq!(capturing, vec![HookKind::Malloc]);
        assert_eq!(HookKind::Free.symbol(), "__libc_free");
    }
}
