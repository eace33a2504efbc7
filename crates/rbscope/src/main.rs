use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use rbscope_core::config::RuntimeProfile;
use rbscope_core::lineno::InstructionSequenceBody;
use rbscope_core::runtime::{BodyLayout, LineEntryLayout, RStringLayout};
use rbscope_core::types::{Address, ProcessId};
use rbscope_core::{format, rstring, walker, MemoryAccessor, Result as RbscopeResult};
use rbscope_utils::{debug, init_logging_with, LogFormat, LogLevel, LoggingConfig};

/// Print the Ruby-level stack of a halted Ruby process from its raw memory.
#[derive(Parser, Debug)]
#[command(name = "rbscope")]
#[command(version)]
#[command(about = "Print the Ruby-level stack of a Ruby process from its raw memory", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format: pretty or json (overrides RBSCOPE_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Runtime profile describing the interpreter's layout (overrides RBSCOPE_PROFILE)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Print the Ruby backtrace of a thread, innermost frame first
    Stacktrace
    {
        /// Process ID (PID) of the Ruby process
        #[arg(long)]
        pid: u32,
        /// Address of an rb_thread_t (default: the current thread)
        #[arg(long)]
        thread: Option<String>,
        /// Stop the process with SIGSTOP while reading
        #[arg(long, default_value_t = false)]
        stop: bool,
        /// Refuse frame regions larger than this
        #[arg(long)]
        max_frames: Option<usize>,
    },
    /// Decode the Ruby string object at an address
    Rstring
    {
        #[arg(long)]
        pid: u32,
        /// Address of the RString (hex format: 0x1000 or decimal)
        address: String,
    },
    /// Resolve an instruction position to a line in an iseq body
    Lineno
    {
        #[arg(long)]
        pid: u32,
        /// Address of the rb_iseq_constant_body
        body: String,
        /// Position in VALUE slots from the first encoded instruction
        position: u64,
    },
    /// Show the field layout the target's debug info gives a type
    Layout
    {
        #[arg(long)]
        pid: u32,
        /// Type name, e.g. rb_control_frame_t
        type_name: String,
    },
    /// Print the effective runtime profile as TOML
    Profile,
}

fn main()
{
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    logging.level = cli.log_level;
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    let _guard = match init_logging_with(logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> RbscopeResult<()>
{
    let mut profile = RuntimeProfile::resolve(cli.profile.as_deref())?;

    match cli.command {
        Commands::Stacktrace {
            pid,
            thread,
            stop,
            max_frames,
        } => {
            if let Some(max_frames) = max_frames {
                profile.walk.max_frames = max_frames;
            }
            let thread = thread.as_deref().map(Address::parse).transpose()?;
            let pid = ProcessId::from(pid);

            let _stopped = if stop { Some(live::stop(pid)?) } else { None };
            let target = live::attach(pid)?;
            let trace = walker::capture_stack(&target, thread, &profile)?;
            debug!(%pid, frames = trace.len(), "capture complete");

            format::write_trace(&mut io::stdout().lock(), &trace)?;
            Ok(())
        }
        Commands::Rstring { pid, address } => {
            let address = Address::parse(&address)?;
            let target = live::attach(ProcessId::from(pid))?;
            let layout = RStringLayout::resolve(&target, &profile)?;
            println!("{}", rstring::decode(&target, &layout, address, profile.walk.max_string_len)?);
            Ok(())
        }
        Commands::Lineno { pid, body, position } => {
            let body_addr = Address::parse(&body)?;
            let target = live::attach(ProcessId::from(pid))?;
            let body = BodyLayout::resolve(&target, &profile)?;
            let entry = LineEntryLayout::resolve(&target, &profile)?;
            let sequence =
                InstructionSequenceBody::read(&target, &body, &entry, body_addr, profile.walk.max_position_entries)?;
            println!("{}", sequence.resolve_line(position));
            Ok(())
        }
        Commands::Layout { pid, type_name } => {
            let target = live::attach(ProcessId::from(pid))?;
            print!("{}", target.lookup_type(&type_name)?);
            Ok(())
        }
        Commands::Profile => {
            print!("{}", profile.to_toml_string()?);
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
mod live
{
    use rbscope_core::platform::linux::guard::StopGuard;
    use rbscope_core::platform::linux::LinuxTarget;
    use rbscope_core::types::ProcessId;
    use rbscope_core::Result;

    pub fn attach(pid: ProcessId) -> Result<LinuxTarget>
    {
        LinuxTarget::attach(pid)
    }

    pub fn stop(pid: ProcessId) -> Result<StopGuard>
    {
        StopGuard::stop(pid)
    }
}

#[cfg(not(target_os = "linux"))]
mod live
{
    use rbscope_core::memory::snapshot::MemorySnapshot;
    use rbscope_core::types::ProcessId;
    use rbscope_core::{RbscopeError, Result};

    fn unsupported() -> RbscopeError
    {
        RbscopeError::InvalidArgument("live process inspection is only supported on Linux".into())
    }

    pub fn attach(_pid: ProcessId) -> Result<MemorySnapshot>
    {
        Err(unsupported())
    }

    pub fn stop(_pid: ProcessId) -> Result<()>
    {
        Err(unsupported())
    }
}
