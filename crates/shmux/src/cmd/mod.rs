use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod demo;
pub mod info;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a self-contained loopback demo of the multiplexer.
    Demo(DemoArgs),
    /// Show protocol constants and the channel table.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Data channel to exercise (0-7).
    #[arg(long, short = 'c', default_value = "0")]
    pub channel: u8,
    /// Number of payloads to send (each is echoed back).
    #[arg(long, default_value = "3")]
    pub count: usize,
    /// Payload text; a sequence number is appended to each send.
    #[arg(long, default_value = "ping")]
    pub payload: String,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
