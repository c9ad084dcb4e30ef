//! Per-episode metadata stored as `episode.json`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rig::Calibration;
use crate::sim::types::QualityLevel;

/// What was recorded in one episode directory, and under which conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeManifest {
    /// Identifies the recorder run that produced the episode.
    pub run_id: Uuid,
    pub episode_id: usize,
    pub start_point: usize,
    pub map_name: String,
    pub weather_id: u32,
    pub quality_level: QualityLevel,
    /// Number of persisted frames per sensor.
    pub frames: usize,
    /// Sensor directories present in the episode.
    pub sensors: Vec<String>,
    /// How often the episode stalled and was restarted.
    pub stall_retries: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub calibration: Calibration,
}

impl EpisodeManifest {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write manifest to {}", path.display()))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse manifest from {}", path.display()))
    }
}
