//! msxfs - exercise the MSX filesystem integration from the command line.
//!
//! Usage:
//!   msxfs [--config FILE] [--dir PATH] [--label NAME] <command>
//!
//! Examples:
//!   msxfs --dir ./disk dir            # List the integrated directory
//!   msxfs --dir ./disk dir 'GAMES\*.ROM'
//!   msxfs vol                         # Show the volume label
//!   msxfs --dir ./disk cd GAMES       # Change directory, print it back
//!
//! Every command runs a tiny Z80 program that calls the driver entry
//! points, so the same hooks a real guest hits are exercised.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use msxfs_core::driver::{attr, FIB_SIZE, MAX_GUEST_PATH};
use msxfs_core::guest::Reg16;
use msxfs_core::machine::DEFAULT_SEGMENTS;
use msxfs_core::{
    DriverCalls, EntryPoint, Fib, GuestStatus, HookDispatcher, IntegrationConfig, MsxMachine,
    NativeHostFs, StopReason,
};

/// Segment the driver module is installed in (page 1 at reset).
const DRIVER_SEGMENT: u8 = 2;

/// Guest buffers, all in page 3.
const FIB_ADDR: u16 = 0xC000;
const PATH_ADDR: u16 = 0xC100;
const OUT_ADDR: u16 = 0xC200;

/// MSX filesystem integration probe
#[derive(Parser, Debug)]
#[command(name = "msxfs")]
#[command(about = "Drive the MSX-DOS filesystem integration hooks")]
struct Args {
    /// JSON config with integratedDirectory and volumeLabel
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host directory to expose (overrides the config)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Volume label (overrides the config)
    #[arg(short, long)]
    label: Option<String>,

    /// Log every driver call
    #[arg(short, long)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// List entries matching a pattern (default: all)
    Dir { pattern: Option<String> },
    /// Show the volume label
    Vol,
    /// Change the current directory and print it
    Cd { path: String },
}

/// One decoded directory entry.
struct Listing {
    name: String,
    size: u32,
    attributes: u8,
    date: String,
    time: String,
}

/// What a command printed, or the guest error it hit.
enum Report {
    Entries(Vec<Listing>),
    Text(String),
    GuestError(GuestStatus),
}

fn load_config(args: &Args) -> Result<IntegrationConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => IntegrationConfig::load_from(path)?,
        None => IntegrationConfig::default(),
    };
    if let Some(dir) = &args.dir {
        config.integrated_directory = dir.to_string_lossy().into_owned();
    }
    if let Some(label) = &args.label {
        config.volume_label = label.clone();
    }
    config.validate()?;
    Ok(config)
}

fn attr_string(attributes: u8) -> String {
    [
        (attr::DIRECTORY, 'd'),
        (attr::READ_ONLY, 'r'),
        (attr::HIDDEN, 'h'),
        (attr::SYSTEM, 's'),
        (attr::ARCHIVE, 'a'),
    ]
    .iter()
    .map(|&(bit, ch)| if attributes & bit != 0 { ch } else { '-' })
    .collect()
}

/// Status the driver left in A, treating unknown codes as "no file".
fn guest_status(machine: &MsxMachine<NativeHostFs>) -> GuestStatus {
    GuestStatus::try_from(machine.a()).unwrap_or(GuestStatus::NoFile)
}

fn read_listing(machine: &MsxMachine<NativeHostFs>) -> Listing {
    let mut raw = [0u8; FIB_SIZE];
    machine.read_block(FIB_ADDR, &mut raw);
    let fib = Fib::new(&mut raw);
    let when = fib.modified();
    Listing {
        name: fib.name(),
        size: fib.size(),
        attributes: fib.attributes(),
        date: format!("{:04}-{:02}-{:02}", when.year, when.month, when.day),
        time: format!("{:02}:{:02}:{:02}", when.hour, when.minute, when.second),
    }
}

/// Call one driver entry point, warning when the stub did not halt.
fn call(machine: &mut MsxMachine<NativeHostFs>, entry: EntryPoint, setup: &[(Reg16, u16)]) {
    let exit = machine.call_entry(entry, setup);
    if exit.reason != StopReason::Halt {
        tracing::warn!("{:?} did not return (stopped at {:#06X})", entry, exit.pc);
    }
    tracing::debug!("{:?}: A={:#04X}, {} T-states", entry, machine.a(), exit.t_states);
}

fn run_command(machine: &mut MsxMachine<NativeHostFs>, command: &Command) -> Report {
    match command {
        Command::Dir { pattern } => {
            let pattern = pattern.as_deref().unwrap_or("*.*");
            machine.load_at(FIB_ADDR, &[0; FIB_SIZE]);
            machine.write_string(PATH_ADDR, truncate_path(pattern));

            call(
                machine,
                EntryPoint::FindFirst,
                &[(Reg16::IX, FIB_ADDR), (Reg16::IY, PATH_ADDR)],
            );
            let mut entries = Vec::new();
            let mut status = guest_status(machine);
            while status == GuestStatus::Ok {
                entries.push(read_listing(machine));
                call(machine, EntryPoint::FindNext, &[(Reg16::IX, FIB_ADDR)]);
                status = guest_status(machine);
            }
            if entries.is_empty() {
                Report::GuestError(status)
            } else {
                Report::Entries(entries)
            }
        }
        Command::Vol => {
            call(machine, EntryPoint::GetVolume, &[(Reg16::DE, OUT_ADDR)]);
            Report::Text(machine.read_string(OUT_ADDR, MAX_GUEST_PATH + 1))
        }
        Command::Cd { path } => {
            machine.write_string(PATH_ADDR, truncate_path(path));
            call(machine, EntryPoint::ChangeDir, &[(Reg16::HL, PATH_ADDR)]);
            let status = guest_status(machine);
            if status != GuestStatus::Ok {
                return Report::GuestError(status);
            }
            call(machine, EntryPoint::GetCurrentDir, &[(Reg16::DE, OUT_ADDR)]);
            Report::Text(format!("\\{}", machine.read_string(OUT_ADDR, MAX_GUEST_PATH + 1)))
        }
    }
}

fn truncate_path(path: &str) -> &str {
    match path.char_indices().nth(MAX_GUEST_PATH) {
        Some((end, _)) => &path[..end],
        None => path,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.trace { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("msxfs={}", level).parse()?)
                .add_directive(format!("msxfs_core={}", level).parse()?),
        )
        .init();

    let config = load_config(&args)?;
    let calls = DriverCalls::from_config(NativeHostFs::new(), &config)?;
    tracing::info!(
        "Integrated directory: {} (volume {})",
        calls.base_path().display(),
        calls.volume_label()
    );

    let command = args.command.clone();

    // Run the machine in a blocking task
    let report = tokio::task::spawn_blocking(move || {
        let mut machine = MsxMachine::with_hooks(DEFAULT_SEGMENTS, HookDispatcher::new(calls));
        machine.install_driver(DRIVER_SEGMENT)?;
        Ok::<_, msxfs_core::FsIntError>(run_command(&mut machine, &command))
    })
    .await??;

    match report {
        Report::Entries(entries) => {
            for entry in &entries {
                let size = if entry.attributes & attr::DIRECTORY != 0 {
                    "<DIR>".to_string()
                } else {
                    entry.size.to_string()
                };
                println!(
                    "{:<12} {:>10}  {}  {} {}",
                    entry.name,
                    size,
                    attr_string(entry.attributes),
                    entry.date,
                    entry.time
                );
            }
            println!("{} entries", entries.len());
        }
        Report::Text(text) => println!("{}", text),
        Report::GuestError(status) => {
            let message = match status {
                GuestStatus::NoDirectory => "Directory not found",
                GuestStatus::NoFile => "File not found",
                GuestStatus::Ok => "No entries",
            };
            eprintln!("{} ({:#04X})", message, status as u8);
            std::process::exit(1);
        }
    }

    Ok(())
}
