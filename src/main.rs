use anyhow::Result;
use clap::Parser;

mod clamp;
mod cli;
mod config;
mod crc;
mod frame;
mod link;
mod pid;
mod port;
mod ports;
mod rx;
mod send;
mod stats;
mod track;
mod tracker;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    match args.cmd {
        cli::Cmd::Send(opts) => send::run(opts),
        cli::Cmd::Frame(opts) => send::print(opts),
        cli::Cmd::Track(opts) => track::run(opts),
        cli::Cmd::Rx(opts) => rx::run(opts),
        cli::Cmd::Ports => ports::run(),
    }
}
