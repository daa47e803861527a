use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{trace, warn};
use miette::{bail, IntoDiagnostic, Result};

use lc3vm::output::{trace_line, MsgColor, Output};
use lc3vm::term::TermConsole;
use lc3vm::{HookAction, Machine, Policy, Step, VmConfig};

/// lc3vm runs binary LC3 program images in the terminal.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.obj` image to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a big-endian `.obj` image and connect it to the terminal
    Run {
        /// `.obj` or `.lc3` image to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Stop on reserved opcodes and unbound trap vectors instead of skipping them
        #[arg(short, long)]
        strict: bool,
        /// Log every instruction before it executes (`trace` level)
        #[arg(short, long)]
        trace: bool,
        /// Dump registers to stderr once the program stops
        #[arg(short, long)]
        registers: bool,
        /// Stop after this many instructions
        #[arg(short, long)]
        limit: Option<u64>,
    },
}

struct RunOptions {
    minimal: bool,
    policy: Policy,
    trace: bool,
    registers: bool,
    limit: Option<u64>,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    let env_status = lc3vm::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(miette::MietteHandlerOpts::new().build())
    }))?;

    let opts = match args.command {
        Some(Command::Run {
            name,
            minimal,
            strict,
            trace,
            registers,
            limit,
        }) => {
            let policy = if strict {
                Policy::Strict
            } else {
                lc3vm::env::policy()
            };
            let opts = RunOptions {
                minimal,
                policy,
                trace: trace || lc3vm::env::is_trace_enabled(),
                registers,
                limit,
            };
            Some((name, opts))
        }
        None => args.path.map(|path| {
            let opts = RunOptions {
                minimal: false,
                policy: lc3vm::env::policy(),
                trace: lc3vm::env::is_trace_enabled(),
                registers: false,
                limit: None,
            };
            (path, opts)
        }),
    };

    let Some((name, opts)) = opts else {
        println!("\n~ lc3vm v{VERSION} ~");
        println!("{}", "LC3 virtual machine".cyan().bold());
        println!("{SHORT_INFO}");
        return Ok(());
    };

    init_logger(opts.trace);
    if let Err(err) = env_status {
        warn!("Ignoring LC3_POLICY: {err}");
    }
    run(&name, opts)
}

fn init_logger(trace: bool) {
    let level = if trace { "lc3vm=trace" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    let out = Output::new(opts.minimal);

    match name.extension().and_then(|ext| ext.to_str()) {
        Some("obj" | "lc3") => {}
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    }

    out.file_message(MsgColor::Green, "Loading", name);
    let image = fs::read(name).into_diagnostic()?;

    let console = TermConsole::new()?;
    let mut machine = Machine::with_config(console, VmConfig::new().policy(opts.policy));
    let loaded = machine.load_image(&image)?;
    out.message(
        MsgColor::Green,
        "Loaded",
        &format!("{} words at 0x{:04x}", loaded.words, loaded.origin),
    );

    if opts.trace {
        machine.set_hook(|state, instr| {
            trace!("{}", trace_line(state, instr));
            HookAction::Continue
        });
    }

    out.message(MsgColor::Green, "Running", &format!("{} policy", opts.policy));
    let result = match opts.limit {
        Some(limit) => machine.run_with_limit(limit),
        None => machine.run(),
    };
    let executed = machine.executed();
    let interactive = machine.console().is_interactive();
    let registers = out.format_registers(machine.state());
    // Hand the terminal back before printing anything else
    drop(machine);

    if opts.registers {
        eprint!("{registers}");
    }

    match result? {
        Step::Halted => {
            // Raw mode leaves the cursor wherever the program stopped writing
            if interactive && !out.is_minimal() {
                println!();
            }
            out.message(
                MsgColor::Cyan,
                "Halted",
                &format!("after {executed} instructions"),
            );
        }
        Step::Continued => out.message(
            MsgColor::Red,
            "Stopped",
            &format!("instruction limit of {executed} reached"),
        ),
        Step::Cancelled => out.message(MsgColor::Red, "Cancelled", "by trace hook"),
    }

    out.file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

const SHORT_INFO: &str = r"
Welcome to lc3vm, a virtual machine for binary LC3 program images.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
