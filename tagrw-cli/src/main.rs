use clap::Parser;
use tagrw::tracing_support::{init_subscriber, TracingConfig};
use tagrw::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let tracing = TracingConfig::from_verbosity(cli.verbose, cli.log_format);
    if let Err(e) = init_subscriber(&tracing) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = tagrw::run(cli).await {
        tracing::error!(exit_code = e.exit_code(), "Command failed");
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
