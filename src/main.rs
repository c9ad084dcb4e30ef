//! carla-kitti: record stereo RGB and disparity episodes from a driving
//! simulator.
//!
//! Connects to the simulator bridge (or an in-process mock with `--mock`),
//! records every planned episode, and reconnects from scratch whenever the
//! connection drops. Ctrl-C ends the run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use carla_kitti::config::{RecorderConfig, StartPoints};
use carla_kitti::recorder::{run_with_reconnect, RunDriver};
use carla_kitti::sim::bridge::BridgeClient;
use carla_kitti::sim::mock::MockSimulator;
use carla_kitti::sim::types::QualityLevel;
use carla_kitti::sim::AnyClient;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Record stereo RGB and depth episodes into a KITTI-like layout.
///
/// Flags override values from `--config`; anything left unset keeps its
/// default.
#[derive(Parser)]
#[command(name = "carla-kitti", version, about)]
struct Cli {
    /// IP of the host server [default: localhost].
    #[arg(long)]
    host: Option<String>,

    /// TCP port to listen to [default: 2000].
    #[arg(short, long)]
    port: Option<u16>,

    /// Graphics quality level [default: epic].
    #[arg(short, long, value_enum)]
    quality_level: Option<Quality>,

    /// Dataset root directory [default: carla_kitti].
    #[arg(short, long = "output-folder")]
    output_folder: Option<PathBuf>,

    /// Scale factor for the camera resolution and focal length [default: 1.0].
    #[arg(long)]
    image_scale: Option<f32>,

    /// Frames to persist per episode [default: 100].
    #[arg(long)]
    frames: Option<usize>,

    /// Persist every Nth eligible tick [default: 1].
    #[arg(long)]
    save_every: Option<usize>,

    /// Ticks to skip after each episode start [default: 30].
    #[arg(long)]
    warmup_frames: Option<u64>,

    /// Only persist ticks faster than this, in km/h. Requires --stall-timeout.
    #[arg(long)]
    min_speed: Option<f32>,

    /// Restart an episode after this many seconds without a persisted frame.
    #[arg(long)]
    stall_timeout: Option<f64>,

    /// Record start spots FROM..TO (end exclusive), in order.
    #[arg(long, value_name = "FROM..TO", value_parser = parse_range, conflicts_with = "episodes")]
    start_range: Option<(usize, usize)>,

    /// Record this many randomly chosen start spots [default: 40].
    #[arg(long)]
    episodes: Option<usize>,

    /// Seed for weather, start spots and steering noise.
    #[arg(long)]
    seed: Option<u64>,

    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record from an in-process mock simulator instead of the bridge.
    #[arg(long)]
    mock: bool,

    /// Print debug information, including every tick's measurements.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Quality {
    Low,
    Epic,
}

impl From<Quality> for QualityLevel {
    fn from(q: Quality) -> Self {
        match q {
            Quality::Low => QualityLevel::Low,
            Quality::Epic => QualityLevel::Epic,
        }
    }
}

fn parse_range(s: &str) -> Result<(usize, usize), String> {
    let (from, to) = s
        .split_once("..")
        .ok_or_else(|| format!("expected FROM..TO, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid bound {v:?}: {e}"))
    };
    Ok((parse(from)?, parse(to)?))
}

impl Cli {
    fn apply(&self, config: &mut RecorderConfig) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(q) = self.quality_level {
            config.session.quality_level = q.into();
        }
        if let Some(root) = &self.output_folder {
            config.output.root = root.clone();
        }
        if let Some(scale) = self.image_scale {
            config.rig.image_scale = scale;
        }

        let rec = &mut config.recording;
        if let Some(frames) = self.frames {
            rec.frames_per_episode = frames;
        }
        if let Some(n) = self.save_every {
            rec.save_every = n;
        }
        if let Some(n) = self.warmup_frames {
            rec.warmup_frames = n;
        }
        if self.min_speed.is_some() {
            rec.min_forward_speed_kmh = self.min_speed;
        }
        if self.stall_timeout.is_some() {
            rec.stall_timeout_secs = self.stall_timeout;
        }
        if let Some((from, to)) = self.start_range {
            rec.start_points = StartPoints::Range { from, to };
        }
        if let Some(count) = self.episodes {
            rec.start_points = StartPoints::Sample { count };
        }

        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => RecorderConfig::from_file(path)?,
        None => RecorderConfig::default(),
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    tracing::info!(
        host = %config.connection.host,
        port = config.connection.port,
        mock = cli.mock,
        "Recording to {}",
        config.output.root.display()
    );

    let connection = config.connection.clone();
    let backoff = connection.reconnect_backoff();
    let mock = cli.mock;
    let driver = RunDriver::new(config);

    let connect = || {
        let connection = connection.clone();
        async move {
            if mock {
                Ok(AnyClient::Mock(MockSimulator::new()))
            } else {
                BridgeClient::connect(&connection.host, connection.port, connection.request_timeout())
                    .await
                    .map(AnyClient::Bridge)
            }
        }
    };

    tokio::select! {
        result = run_with_reconnect(&driver, connect, backoff) => {
            let summary = result?;
            tracing::info!(
                episodes = summary.episodes,
                frames = summary.frames,
                stall_retries = summary.stall_retries,
                "Recording finished"
            );
            println!("Done.");
        }
        signal = tokio::signal::ctrl_c() => {
            on_interrupt(signal)?;
            println!("\nCancelled by user. Bye!");
        }
    }

    Ok(())
}

/// A failure to install the Ctrl-C handler is an error, not a cancellation.
fn on_interrupt(signal: std::io::Result<()>) -> Result<()> {
    signal.context("failed to listen for Ctrl-C")
}
