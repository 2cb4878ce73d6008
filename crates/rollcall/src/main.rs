use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::AttendanceBoard;
use rollcall_hw::{Camera, V4lOpener};
use tracing_subscriber::EnvFilter;

mod backend;
mod capture;
mod config;
mod session;
mod terminal;

use backend::{AttendanceBackend, HttpBackend};
use config::Settings;
use session::Client;

#[derive(Parser)]
#[command(name = "rollcall", about = "Camera attendance client")]
struct Cli {
    /// Settings file (default: ~/.config/rollcall/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream frames to the backend until Ctrl-C, then list absentees
    Run {
        /// V4L2 device path (e.g., /dev/video0)
        #[arg(short, long)]
        device: Option<String>,
        /// Milliseconds between captures
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop automatically after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// List capture devices
    Devices,
    /// Print today's absentees
    Absent,
    /// Log in as an admin and print the access token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "ROLLCALL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Enroll a person from the backend's camera
    Enroll {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Grab one frame and save it as JPEG
    Snapshot {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Commands::Run {
            device,
            interval_ms,
            duration_secs,
        } => {
            if device.is_some() {
                settings.camera_device = device;
            }
            if let Some(ms) = interval_ms {
                settings.capture_interval_ms = ms;
            }
            run(&settings, duration_secs.map(Duration::from_secs)).await?;
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Absent => {
            let backend = http_backend(&settings).await?;
            let records = backend
                .absentees()
                .await
                .context("failed to fetch absentees")?;
            let board = AttendanceBoard::new();
            board.extend(records);
            print!("{}", board.snapshot().render_table());
        }
        Commands::Login { username, password } => {
            let client = backend::build_client(settings.request_timeout())
                .context("failed to build HTTP client")?;
            let backend_url = config::resolve_backend_url(&settings, &client)
                .await
                .context("failed to resolve backend URL")?;
            let resp = backend::login(&client, &backend_url, &username, &password)
                .await
                .context("login failed")?;
            let Some(token) = resp.access_token else {
                bail!("login succeeded but no access token was returned");
            };
            tracing::info!(admin = %resp.admin, "logged in");
            println!("{token}");
        }
        Commands::Enroll {
            first_name,
            last_name,
        } => {
            let backend = http_backend(&settings).await?;
            let resp = backend
                .enroll(&first_name, &last_name)
                .await
                .context("enrollment failed")?;
            println!("{}", resp.message);
        }
        Commands::Snapshot { output, device } => {
            let opener = V4lOpener::new(device.or(settings.camera_device.clone()));
            let quality = settings.session_options().jpeg_quality;
            let handle = capture::spawn_capture(Arc::new(opener), quality)
                .await
                .context("failed to open camera")?;
            let jpeg = handle.grab_jpeg().await;
            handle.release().await;
            let jpeg = jpeg.context("failed to capture frame")?;
            std::fs::write(&output, &jpeg)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {} bytes to {}", jpeg.len(), output.display());
        }
    }

    Ok(())
}

async fn http_backend(settings: &Settings) -> Result<HttpBackend> {
    let client =
        backend::build_client(settings.request_timeout()).context("failed to build HTTP client")?;
    let endpoint = config::resolve_endpoint(settings, &client)
        .await
        .context("failed to resolve backend endpoint")?;
    tracing::info!(backend = %endpoint.backend_url, "endpoint resolved");
    Ok(HttpBackend::new(client, endpoint))
}

async fn run(settings: &Settings, duration: Option<Duration>) -> Result<()> {
    let backend = http_backend(settings).await?;
    tracing::debug!(backend = %backend.endpoint().backend_url, "starting session");

    let board = Arc::new(AttendanceBoard::new());
    let view = terminal::spawn_view(&board);
    let mut session = Client::new(
        V4lOpener::new(settings.camera_device.clone()),
        backend,
        board.clone(),
        settings.session_options(),
    );

    session.start().await.context("failed to start session")?;

    match duration {
        Some(limit) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res.context("failed to listen for Ctrl-C")?,
                _ = tokio::time::sleep(limit) => tracing::info!("session duration elapsed"),
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?,
    }

    session.stop().await;
    tracing::debug!(phase = ?session.phase(), records = session.board().len(), "session ended");

    // Dropping the last board handle lets the view render its final state and exit.
    drop(session);
    drop(board);
    view.await.context("terminal view panicked")?;
    Ok(())
}
