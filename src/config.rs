use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::recorder::RecordingPolicy;
use crate::rig::StereoRig;
use crate::sim::types::QualityLevel;

/// Complete configuration for a recording run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub connection: ConnectionConfig,
    pub session: SessionSettings,
    pub rig: StereoRig,
    pub recording: RecordingConfig,
    pub output: OutputConfig,
    /// Seed for weather, actor seeds, start-point sampling and steering
    /// noise. `None` draws from entropy.
    pub seed: Option<u64>,
}

/// Where the simulator bridge lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on any single request (default: 30).
    pub request_timeout_secs: u64,
    /// Delay before reconnecting after a lost connection (default: 1000).
    pub reconnect_backoff_ms: u64,
}

/// Per-episode simulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub quality_level: QualityLevel,
    pub number_of_vehicles: u32,
    pub number_of_pedestrians: u32,
    /// Weather ids; one is drawn at random for every episode.
    pub weathers: Vec<u32>,
    pub synchronous_mode: bool,
    pub send_non_player_agents_info: bool,
    /// Draw fresh actor seeds for every episode.
    pub randomize_seeds: bool,
}

/// Which player start spots to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPoints {
    /// Every spot in `[from, to)`, in order.
    Range { from: usize, to: usize },
    /// `count` distinct spots drawn at random from the map.
    Sample { count: usize },
}

/// How episode directories are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeNaming {
    /// Position in the start-point plan: 0, 1, 2, ...
    Ordinal,
    /// The start spot index itself.
    StartPoint,
}

/// Episode loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub start_points: StartPoints,
    /// Frames persisted per episode (default: 100).
    pub frames_per_episode: usize,
    /// Persist every Nth eligible tick (default: 1).
    pub save_every: usize,
    /// Ticks ignored after every episode start (default: 30).
    pub warmup_frames: u64,
    /// Only ticks faster than this are persisted. Requires `stall_timeout_secs`.
    pub min_forward_speed_kmh: Option<f32>,
    /// Restart the episode when nothing was persisted for this long.
    pub stall_timeout_secs: Option<f64>,
    /// Half-width of the uniform steering noise (default: 0.1).
    pub steer_noise: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: PathBuf,
    pub naming: EpisodeNaming,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 2000,
            request_timeout_secs: 30,
            reconnect_backoff_ms: 1000,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            quality_level: QualityLevel::Epic,
            number_of_vehicles: 20,
            number_of_pedestrians: 40,
            weathers: vec![1, 3, 7, 8, 14],
            synchronous_mode: true,
            send_non_player_agents_info: true,
            randomize_seeds: true,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            start_points: StartPoints::Sample { count: 40 },
            frames_per_episode: 100,
            save_every: 1,
            warmup_frames: 30,
            min_forward_speed_kmh: None,
            stall_timeout_secs: None,
            steer_noise: 0.1,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("carla_kitti"),
            naming: EpisodeNaming::Ordinal,
        }
    }
}

impl ConnectionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl RecordingConfig {
    pub fn policy(&self) -> RecordingPolicy {
        RecordingPolicy {
            frame_budget: self.frames_per_episode,
            save_every: self.save_every,
            warmup_frames: self.warmup_frames,
            min_forward_speed: self.min_forward_speed_kmh.map(|kmh| kmh / 3.6),
            stall_timeout: self.stall_timeout_secs.map(Duration::from_secs_f64),
        }
    }
}

impl RecorderConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Reject settings the recorder cannot honour.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.connection.host.is_empty(), "host is empty");
        ensure!(
            !self.session.weathers.is_empty(),
            "at least one weather id is required"
        );

        let rec = &self.recording;
        ensure!(rec.save_every > 0, "save_every must be at least 1");
        ensure!(
            (0.0..=1.0).contains(&rec.steer_noise),
            "steer_noise must lie in [0, 1], got {}",
            rec.steer_noise
        );
        if let Some(kmh) = rec.min_forward_speed_kmh {
            ensure!(kmh.is_finite() && kmh >= 0.0, "minimum speed must be non-negative");
            ensure!(
                rec.stall_timeout_secs.is_some(),
                "a minimum speed needs a stall timeout, or a stuck vehicle records forever"
            );
        }
        if let Some(secs) = rec.stall_timeout_secs {
            ensure!(secs.is_finite() && secs > 0.0, "stall timeout must be positive");
        }
        match rec.start_points {
            StartPoints::Range { from, to } => {
                ensure!(from < to, "start range {from}..{to} is empty")
            }
            StartPoints::Sample { count } => ensure!(count > 0, "episode count must be positive"),
        }

        self.rig.validate()
    }
}
