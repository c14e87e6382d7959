//! Conform CLI
//!
//! Command-line interface for differential compiler testing

mod commands;
mod report;
mod suite;

use clap::{Parser, Subcommand, ValueEnum};
use conform_core::{init_tracing, ReleaseTier};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "conform")]
#[command(about = "Conform: differential testing of a compiler against reference toolchains")]
#[command(version = conform_core::VERSION)]
#[command(
    long_about = "Conform compiles test sources with a compiler under test and with one or more\n\
reference installations, then compares diagnostics and program output.\n\
\n\
Examples:\n  \
conform probe --root /opt/jdk-17      # Show what an installation reports\n  \
conform waivers                       # List registered excuses\n  \
conform run suite.toml --compiler 'ecj -d {output} {files}' --compare"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Harness configuration file (TOML), applied over CONFORM_* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve reference installations and print their versions
    Probe {
        /// Installation roots (default: configured roots)
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,

        #[arg(short, long, default_value = "human")]
        format: OutputFormat,
    },

    /// List registered excuses
    Waivers {
        /// Extra waiver file (TOML)
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Run a test suite against a command-driven compiler
    Run {
        /// Suite file (TOML)
        suite: PathBuf,

        /// Compiler command template with a {files} placeholder
        #[arg(long, env = "CONFORM_COMPILER")]
        compiler: String,

        /// Compare with reference installations
        #[arg(long)]
        compare: bool,

        /// Installation roots (default: configured roots)
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,

        /// Output directory (default: configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Runtime used to execute compiled programs (default: the first
        /// reference installation's runtime)
        #[arg(long)]
        runtime: Option<PathBuf>,

        /// Compliance tier of the suite, such as 1.8 or 17
        #[arg(long)]
        compliance: Option<ReleaseTier>,

        /// Write JSON and markdown reports into this directory
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "conform=warn",
        1 => "conform=info",
        2 => "conform=debug",
        _ => "conform=trace",
    };
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", log_level);
        }
    }
    init_tracing();

    match run_command(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("conform failed: {:#}", e);
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config;
    match cli.command {
        Commands::Probe { roots, format } => {
            commands::probe::probe_command(config_path.as_deref(), roots, format).await
        }
        Commands::Waivers { file, format } => {
            commands::waivers::waivers_command(config_path.as_deref(), file, format)
        }
        Commands::Run {
            suite,
            compiler,
            compare,
            roots,
            output,
            runtime,
            compliance,
            report,
        } => {
            commands::run::run_command(commands::run::RunArgs {
                config_path,
                suite,
                compiler,
                compare,
                roots,
                output,
                runtime,
                compliance,
                report,
            })
            .await
        }
    }
}
