use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facefind_api::MatchClient;
use facefind_core::{match_store, Route};
use facefind_hw::Camera;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod gallery;
mod landing;
mod login;
mod session;

use config::Config;
use login::LoginFlow;
use session::Session;

#[derive(Parser)]
#[command(name = "facefind", about = "Find yourself in the event photos with one selfie")]
struct Cli {
    /// Face-matching endpoint (overrides FACEFIND_MATCH_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// V4L2 camera device (overrides FACEFIND_CAMERA_DEVICE)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Directory containing the face detector model (overrides FACEFIND_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open on the landing page (default)
    Start,
    /// Go straight to selfie capture
    Login,
    /// Match a photo from disk instead of the camera
    Match {
        /// Path to the selfie
        #[arg(long)]
        image: PathBuf,
    },
    /// List V4L2 capture devices
    Devices,
    /// Check that the camera and face detector work
    Check {
        /// Seconds to wait for a single face
        #[arg(long, default_value_t = 5)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(endpoint) = cli.endpoint {
        config.match_endpoint = endpoint;
    }
    if let Some(device) = cli.device {
        config.camera_device = device;
    }
    if let Some(model_dir) = cli.model_dir {
        config.model_dir = model_dir;
    }
    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => interactive(config, Route::Landing).await?,
        Commands::Login => interactive(config, Route::Login).await?,
        Commands::Match { image } => {
            let api = client(&config)?;
            let outcome = session::match_still(&config, api, &image).await?;
            if outcome.next_route() != Route::Gallery {
                std::process::exit(1);
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Check { wait } => {
            if !session::check(&config, Duration::from_secs(wait)).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn client(config: &Config) -> Result<MatchClient> {
    MatchClient::new(&config.match_endpoint, config.request_timeout)
        .with_context(|| format!("invalid match endpoint {}", config.match_endpoint))
}

async fn interactive(config: Config, start: Route) -> Result<()> {
    let api = client(&config)?;
    let (writer, reader) = match_store();
    let login = LoginFlow::new(api, writer, config.jpeg_quality);
    let input = tokio::io::BufReader::new(tokio::io::stdin());

    tracing::info!(endpoint = %config.match_endpoint, "facefind starting");
    Session::new(config, login, reader, input).run(start).await
}
