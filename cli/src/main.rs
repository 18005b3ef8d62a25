mod bootkey;
mod dump;
mod export;
mod hive;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bootkey::bootkey;
use dump::dump;
use output::Format;

/// Dumps the password hashes of an offline Active Directory database.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Increases the verbosity of the logs (-v, -vv, -vvv).
    /// The RUST_LOG environment variable takes precedence.
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Dump(Dump),
    Bootkey(Bootkey),
}

/// Decrypt the LM and NT hashes of the accounts of the directory.
#[derive(Args)]
pub struct Dump {
    /// The SYSTEM hive of the domain controller.
    #[clap(short, long, value_parser)]
    system: PathBuf,

    /// The rows of the ntds.dit datatable, exported as JSON lines.
    #[clap(short, long, value_parser)]
    records: PathBuf,

    /// Also write the hashes to this file.
    #[clap(short, long, value_parser)]
    out: Option<PathBuf>,

    /// The output format.
    #[clap(short, long, value_enum, default_value_t = Format::Secretsdump)]
    format: Format,

    /// Include the password history of the accounts.
    #[clap(long, value_parser)]
    history: bool,

    /// Include the status (enabled or disabled) of the accounts.
    #[clap(long, value_parser)]
    status: bool,

    /// Only dump the enabled accounts.
    #[clap(long, value_parser)]
    enabled_only: bool,

    /// Don't print the hashes to the console. Probably use this with --out.
    #[clap(long, value_parser)]
    no_print: bool,
}

/// Print the boot key found in a SYSTEM hive.
#[derive(Args)]
pub struct Bootkey {
    /// The SYSTEM hive.
    #[clap(short, long, value_parser)]
    system: PathBuf,
}

/// Installs the log subscriber, writing to stderr so that the hashes can be piped.
fn init_logs(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logs(cli.verbose);

    match cli.commands {
        Commands::Dump(args) => dump(args)?,
        Commands::Bootkey(args) => bootkey(args)?,
    }

    Ok(())
}
