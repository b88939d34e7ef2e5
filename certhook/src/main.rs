mod challenge;
mod cli;
mod deploy;
mod exec;
mod output;
mod request;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Hook output is captured by the ACME client's log, so everything goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cli.verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        }))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run() {
        crate::output::error_stderr(&e.to_string());
        std::process::exit(1);
    }
}
