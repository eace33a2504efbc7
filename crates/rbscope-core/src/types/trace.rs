//! Ruby-level stack trace types.

use std::fmt;

/// One rendered frame of a Ruby stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackTraceEntry
{
    path: String,
    line: u32,
    label: String,
}

impl StackTraceEntry
{
    pub fn new(path: impl Into<String>, line: u32, label: impl Into<String>) -> Self
    {
        Self {
            path: path.into(),
            line,
            label: label.into(),
        }
    }

    /// Source file of the instruction sequence.
    pub fn path(&self) -> &str
    {
        &self.path
    }

    /// Line number, `0` when the sequence carries no line information.
    pub fn line(&self) -> u32
    {
        self.line
    }

    /// Method or block label (`"block in foo"`, `"<main>"`, ...).
    pub fn label(&self) -> &str
    {
        &self.label
    }
}

/// Renders as `path:line:in 'label'`.
impl fmt::Display for StackTraceEntry
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}:{}:in '{}'", self.path, self.line, self.label)
    }
}

/// Ordered Ruby stack, innermost (currently executing) frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace
{
    entries: Vec<StackTraceEntry>,
}

impl Trace
{
    /// Build a trace from entries collected in walk order (outermost first).
    ///
    /// The walk visits the base of the stack first, so the order is reversed
    /// here to put the most recent frame on top.
    pub fn from_walk_order(mut entries: Vec<StackTraceEntry>) -> Self
    {
        entries.reverse();
        Self { entries }
    }

    pub fn entries(&self) -> &[StackTraceEntry]
    {
        &self.entries
    }

    /// The currently executing frame, if any.
    pub fn innermost(&self) -> Option<&StackTraceEntry>
    {
        self.entries.first()
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StackTraceEntry>
    {
        self.entries.iter()
    }
}

impl IntoIterator for Trace
{
    type Item = StackTraceEntry;
    type IntoIter = std::vec::IntoIter<StackTraceEntry>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Trace
{
    type Item = &'a StackTraceEntry;
    type IntoIter = std::slice::Iter<'a, StackTraceEntry>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.entries.iter()
    }
}
