//! On-disk layout of the recorded dataset.
//!
//! ```text
//! <root>/episode_0003/Camera2RGB/000017.pfm
//! <root>/episode_0003/Camera2Depth/000017.pfm
//! <root>/episode_0003/episode.json
//! ```
//!
//! Paths are a pure function of (episode id, sensor name, frame index).
//! Sensors get their own directory, so two sensors in one episode never
//! collide.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};

pub const FRAME_EXTENSION: &str = "pfm";
pub const MANIFEST_FILE: &str = "episode.json";

pub fn episode_dir(root: &Path, episode_id: usize) -> PathBuf {
    root.join(format!("episode_{episode_id:04}"))
}

pub fn sensor_dir(root: &Path, episode_id: usize, sensor: &str) -> PathBuf {
    episode_dir(root, episode_id).join(sensor)
}

/// `<root>/episode_<04d>/<sensor>/<06d>`, without extension.
pub fn frame_stem(root: &Path, episode_id: usize, sensor: &str, frame_index: usize) -> PathBuf {
    sensor_dir(root, episode_id, sensor).join(format!("{frame_index:06}"))
}

/// Full path of a persisted frame.
pub fn frame_path(root: &Path, episode_id: usize, sensor: &str, frame_index: usize) -> PathBuf {
    frame_stem(root, episode_id, sensor, frame_index).with_extension(FRAME_EXTENSION)
}

pub fn manifest_path(root: &Path, episode_id: usize) -> PathBuf {
    episode_dir(root, episode_id).join(MANIFEST_FILE)
}

/// Sensor names become directory names: one non-empty path component.
pub fn validate_sensor_name(name: &str) -> Result<()> {
    ensure!(!name.is_empty(), "sensor name is empty");
    ensure!(
        name != "." && name != ".." && !name.contains(['/', '\\']),
        "sensor name {name:?} is not a single path component"
    );
    ensure!(
        name != MANIFEST_FILE,
        "sensor name {name:?} clashes with the episode manifest"
    );
    Ok(())
}
