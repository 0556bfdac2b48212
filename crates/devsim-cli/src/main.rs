use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use devsim_config::{DevsimConfig, SpeedMultiplier};
use devsim_core::DeviceStatus;
use devsim_remote::HttpApi;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "devsim", version, about = "Replay and monitor simulated device telemetry")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulator API base URL (overrides the configuration)
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices with their status
    Devices,
    /// Replay a device's recorded telemetry
    Replay {
        /// Device id
        id: String,
        /// Range start (RFC 3339); defaults to the configured window before --to
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Range end (RFC 3339); defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Playback speed: 1, 2, 5, 10, or 50
        #[arg(short, long)]
        speed: Option<SpeedMultiplier>,
        /// Maximum samples to load
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Poll the latest sample of every running device
    Monitor {
        /// Stop after this many polling periods
        #[arg(short, long)]
        ticks: Option<u64>,
    },
    /// Start a device
    Start {
        /// Device id
        id: String,
    },
    /// Stop a device
    Stop {
        /// Device id
        id: String,
    },
    /// Start a stopped device or stop a running one
    Toggle {
        /// Device id
        id: String,
    },
    /// Set the status of several devices at once
    BatchStatus {
        /// Target status (running or stopped)
        status: DeviceStatus,
        /// Device ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete devices
    Rm {
        /// Device ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Create devices from a JSON file (one device or an array)
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Show effective configuration
    Config,
}

fn find_config() -> Option<PathBuf> {
    // 1. DEVSIM_CONFIG environment variable
    if let Ok(path) = std::env::var("DEVSIM_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. devsim.yaml in current directory
    let cwd_config = PathBuf::from("devsim.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. ~/.config/devsim/config.yaml
    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/devsim/config.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.or_else(find_config) {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            DevsimConfig::from_file(&path)?
        }
        None => DevsimConfig::default(),
    };
    if let Some(url) = cli.url {
        config.api.base_url = url;
    }
    let config = config.effective();
    config.validate_or_err()?;

    let api = || HttpApi::new(&config.api).map(Arc::new);

    match cli.command {
        Commands::Devices => {
            commands::devices::run(api()?.as_ref()).await?;
        }
        Commands::Replay {
            id,
            from,
            to,
            speed,
            limit,
        } => {
            let args = commands::replay::ReplayArgs {
                id,
                from,
                to,
                speed,
                limit,
            };
            commands::replay::run(api()?, &config, args).await?;
        }
        Commands::Monitor { ticks } => {
            commands::monitor::run(api()?, &config, ticks).await?;
        }
        Commands::Start { id } => {
            commands::status::set(api()?, &id, DeviceStatus::Running).await?;
        }
        Commands::Stop { id } => {
            commands::status::set(api()?, &id, DeviceStatus::Stopped).await?;
        }
        Commands::Toggle { id } => {
            commands::status::toggle(api()?, &id).await?;
        }
        Commands::BatchStatus { status, ids } => {
            commands::batch::status(api()?, status, ids).await?;
        }
        Commands::Rm { ids } => {
            commands::rm::run(api()?, ids).await?;
        }
        Commands::Import { file } => {
            commands::import::run(api()?, &file).await?;
        }
        Commands::Config => {
            commands::config::run(&config)?;
        }
    }

    Ok(())
}
