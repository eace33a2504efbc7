//! Plain-text rendering of captured traces.

use std::io::{self, Write};

use crate::types::Trace;

/// One `path:line:in 'label'` line per entry, innermost first.
///
/// ```rust
/// use rbscope_core::format::format;
/// use rbscope_core::types::{StackTraceEntry, Trace};
///
/// let trace = Trace::from_walk_order(vec![
///     StackTraceEntry::new("app.rb", 3, "<main>"),
///     StackTraceEntry::new("lib/user.rb", 12, "save"),
/// ]);
/// assert_eq!(format(&trace), vec!["lib/user.rb:12:in 'save'", "app.rb:3:in '<main>'"]);
/// ```
pub fn format(trace: &Trace) -> Vec<String>
{
    trace.iter().map(ToString::to_string).collect()
}

/// Write the formatted trace to `out`, one entry per line.
pub fn write_trace<W: Write>(out: &mut W, trace: &Trace) -> io::Result<()>
{
    for line in format(trace) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
