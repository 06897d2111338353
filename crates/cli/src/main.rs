use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "brug")]
#[command(about = "Brug: bridges WhatsApp and Slack", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bridge: connect both networks and relay until Ctrl+C.
    Run {
        /// Config file path (default: BRUG_CONFIG_PATH or ./config.yaml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("brug {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_bridge(config).await {
                log::error!("bridge failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_bridge(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let config = lib::config::load_config(&path)?;
    log::info!("starting bridge with config from {}", path.display());
    lib::bridge::run_bridge(config, path).await
}
