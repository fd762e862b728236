use clap::Parser;
use demreg_cli::{run, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG overrides the verbosity flag
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    demreg_metrics::describe_metrics();

    if let Err(err) = run(cli) {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
