#![forbid(unsafe_code)]

//! clb: Column Buffer operator CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("clb: {e}");
        std::process::exit(e.exit_code());
    }
}
