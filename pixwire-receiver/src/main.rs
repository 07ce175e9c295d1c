//! pixwire receiver entry point.
//!
//! ```text
//! pixwire-receiver                        Listen with defaults
//! pixwire-receiver --config <path>        Load a custom config TOML
//! pixwire-receiver --port 7000            Override the listen port
//! pixwire-receiver --mode lz4             Override the initial decode mode
//! pixwire-receiver --gen-config           Write default config to stdout
//! pixwire-receiver send <files>... --kind jpeg --to host:6556 --fps 30
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pixwire_core::{FrameKind, Pipeline};
use pixwire_receiver::config::{LoggingConfig, ReceiverConfig};
use pixwire_receiver::render::RenderLoop;
use pixwire_receiver::sender;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pixwire-receiver", about = "Streamed image receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pixwire-receiver.toml")]
    config: PathBuf,

    /// Listen port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Initial decode mode: jpeg, lz4 or raw (overrides config).
    #[arg(short, long)]
    mode: Option<FrameKind>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream image files to a receiver.
    Send {
        /// Files or directories to send, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Payload kind: jpeg, lz4 (raw RGB565 files, compressed here) or raw.
        #[arg(short, long, default_value = "jpeg")]
        kind: FrameKind,

        /// Receiver address.
        #[arg(short, long, default_value = "127.0.0.1:6556")]
        to: String,

        /// Frames per second.
        #[arg(short, long, default_value_t = 30)]
        fps: u32,

        /// Passes over the file list (0 = until Ctrl-C).
        #[arg(short, long, default_value_t = 1)]
        loops: u32,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, source) = ReceiverConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.listen_port = port;
    }
    if let Some(mode) = cli.mode {
        config.mode.initial = mode;
    }

    init_tracing(&config.logging)?;
    info!("pixwire-receiver v{}", env!("CARGO_PKG_VERSION"));
    source.report(&cli.config);

    match cli.command {
        Some(Command::Send {
            files,
            kind,
            to,
            fps,
            loops,
        }) => {
            let frames = sender::load_frames(&files, kind)?;
            let running = Arc::new(AtomicBool::new(true));
            spawn_ctrl_c(Arc::clone(&running));
            sender::stream_frames(&to, &frames, fps, loops, running).await?;
        }
        None => receive(config).await?,
    }

    Ok(())
}

async fn receive(config: ReceiverConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("listen address: {}", config.listen_addr());
    info!("initial mode: {}", config.mode.initial);
    info!(
        "debounce: {} frames, queue: {} frames",
        config.pipeline.mode_switch_debounce, config.pipeline.queue_capacity
    );

    let mut pipeline = Pipeline::new(config.pipeline.clone(), &config).await?;
    pipeline.start_listener(&config.listen_addr()).await?;

    let mut render = RenderLoop::new(pipeline.display_queue(), config.render.clone());
    spawn_ctrl_c(render.stop_handle());

    let render_task = tokio::spawn(async move { render.run().await });
    if let Err(e) = render_task.await {
        error!("render loop failed: {e}");
    }

    let stats = pipeline.stats();
    pipeline.shutdown().await;
    info!(
        "final: {} parsed, {} decoded, {} decode errors, {} resyncs ({} bytes discarded), {} input drops, {} mode switches",
        stats.frames_parsed,
        stats.frames_decoded,
        stats.decode_errors,
        stats.resync_events,
        stats.bytes_discarded,
        stats.input_drops,
        stats.mode_switches,
    );
    Ok(())
}

/// Clear `running` on Ctrl-C.
fn spawn_ctrl_c(running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        running.store(false, Ordering::SeqCst);
    });
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .init();
    }
    Ok(())
}
