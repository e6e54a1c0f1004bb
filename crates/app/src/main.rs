mod cli;
mod server;
mod viewer;

use clap::Parser;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let cli = cli::Cli::parse();
    cli::handle_command(cli.command)
}
