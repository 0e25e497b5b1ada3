//! serve - turn any shell command into a network service.

mod addr;
mod cli;
mod command;
mod error;
mod fdutil;
mod listener;
mod logging;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use cli::Cli;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level, cli.log_format);

    if let Err(e) = run(&cli) {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Build the listener and the supervisor, then run until interrupted.
fn run(cli: &Cli) -> Result<()> {
    if cli.protocol.is_some() {
        eprintln!("Protocol specification unimplemented; using stream");
    }

    let command = command::CommandLine::new(&cli.command)?;
    let listener = listener::Listener::bind(&cli.address, cli.socket_type.into(), cli.backlog)
        .with_context(|| format!("could not listen on '{}'", cli.address))?;
    let supervisor = supervisor::Supervisor::new(listener, command, cli.max_workers);
    tracing::debug!(
        address = %cli.address,
        max_workers = supervisor.max_workers(),
        "listening"
    );

    supervisor::driver::run(supervisor)?;
    Ok(())
}
