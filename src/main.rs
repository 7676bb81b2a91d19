use clap::Parser;
use tracing::{error, info};
use trellis::cli::Cli;
use trellis::observability::{init_tracing, LogFormat};
use trellis::{APP_NAME, VERSION};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Text };
    if let Err(e) = init_tracing(&cli.log_level, format) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(app_name = APP_NAME, version = VERSION, "starting Trellis control plane");

    if let Err(e) = trellis::startup::run(cli).await {
        error!(error = %e, "control plane failed");
        std::process::exit(1);
    }

    info!("control plane shutdown completed");
}
