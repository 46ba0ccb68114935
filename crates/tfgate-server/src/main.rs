use std::path::PathBuf;

use clap::Parser;

use tfgate_core::config::TfgateConfig;

#[derive(Parser)]
#[command(
    name = "tfgate",
    about = "HTTP gateway for terraform configuration operations and state discovery",
    version
)]
struct Cli {
    /// Path to the YAML config file (defaults apply when absent)
    #[arg(long, env = "TFGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let mut config = TfgateConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    tfgate_server::serve(config).await
}
