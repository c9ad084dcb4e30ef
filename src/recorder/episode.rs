//! The episode recording loop.
//!
//! [`EpisodeRecorder::run_episode`] drives one episode by repeatedly:
//!   1. reading the next tick from the simulator (blocks in lock-step),
//!   2. deriving a perturbed control from the autopilot suggestion,
//!   3. sending that control back,
//!   4. persisting the tick's images when it is due.
//!
//! It stops after `frame_budget` persisted frames or, when a stall timeout is
//! set, once that much wall-clock time passes without persisting anything.
//! [`EpisodeRecorder::record_until_complete`] restarts stalled episodes from
//! the same start point until one completes.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::control::AutopilotNoise;
use crate::dataset::FrameWriter;
use crate::sim::{Scene, SessionConfig, SimulatorClient};

// ---------------------------------------------------------------------------
// Policy and outcomes
// ---------------------------------------------------------------------------

/// When ticks get persisted and when an episode gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingPolicy {
    /// Frames to persist before the episode counts as complete.
    pub frame_budget: usize,
    /// Persist every Nth eligible tick. Must be at least 1.
    pub save_every: usize,
    /// Ticks after the episode start that are never persisted.
    pub warmup_frames: u64,
    /// Only ticks faster than this (m/s) are eligible.
    pub min_forward_speed: Option<f32>,
    /// Give up when nothing was persisted for this long.
    pub stall_timeout: Option<Duration>,
}

impl RecordingPolicy {
    /// Whether tick `tick` (0-based since episode start) at `forward_speed`
    /// counts towards the save period.
    pub fn is_eligible(&self, tick: u64, forward_speed: f32) -> bool {
        tick >= self.warmup_frames
            && self
                .min_forward_speed
                .map_or(true, |min| forward_speed > min)
    }
}

/// Which episode to record and where its frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeTarget {
    /// Names the output directory.
    pub episode_id: usize,
    pub start_point: usize,
}

/// How a single attempt at an episode ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    Completed { frames: usize, ticks: u64 },
    TimedOut { frames: usize, ticks: u64, idle: Duration },
}

/// Result of recording an episode to completion, across stall retries.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    pub target: EpisodeTarget,
    pub frames: usize,
    /// Ticks read in the successful attempt.
    pub ticks: u64,
    pub stall_retries: usize,
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Owns the simulator connection for the lifetime of a run.
#[derive(Debug)]
pub struct EpisodeRecorder<C> {
    client: C,
    writer: FrameWriter,
    noise: AutopilotNoise,
}

impl<C: SimulatorClient> EpisodeRecorder<C> {
    pub fn new(client: C, writer: FrameWriter, noise: AutopilotNoise) -> Self {
        Self {
            client,
            writer,
            noise,
        }
    }

    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    /// Give the connection back, e.g. to inspect a mock after a run.
    pub fn into_client(self) -> C {
        self.client
    }

    /// Send the session settings for the next episode.
    pub async fn configure(&mut self, settings: &SessionConfig) -> Result<Scene> {
        let scene = self
            .client
            .configure(settings)
            .await
            .context("failed to load session settings")?;
        debug!(
            map = %scene.map_name,
            weather = settings.weather_id,
            start_spots = scene.player_start_spots.len(),
            "session configured"
        );
        Ok(scene)
    }

    /// Run one attempt at an episode.
    pub async fn run_episode<R: Rng>(
        &mut self,
        target: EpisodeTarget,
        policy: &RecordingPolicy,
        rng: &mut R,
    ) -> Result<EpisodeOutcome> {
        let save_every = policy.save_every.max(1);

        self.client
            .start_episode(target.start_point)
            .await
            .with_context(|| format!("failed to start episode at spot {}", target.start_point))?;

        let mut last_progress = Instant::now();
        let mut ticks: u64 = 0;
        let mut eligible: usize = 0;
        let mut persisted: usize = 0;

        while persisted < policy.frame_budget {
            if let Some(timeout) = policy.stall_timeout {
                let idle = last_progress.elapsed();
                if idle >= timeout {
                    return Ok(EpisodeOutcome::TimedOut {
                        frames: persisted,
                        ticks,
                        idle,
                    });
                }
            }

            let frame = self
                .client
                .read_frame()
                .await
                .context("failed to read frame")?;
            debug!(tick = ticks, "{}", frame.measurements);

            let control = self
                .noise
                .perturb(&frame.measurements.player.autopilot_control, rng);
            self.client
                .send_control(&control)
                .await
                .context("failed to send control")?;

            let tick = ticks;
            ticks += 1;

            if !policy.is_eligible(tick, frame.measurements.player.forward_speed) {
                continue;
            }
            let sample = eligible;
            eligible += 1;
            if sample % save_every != 0 {
                continue;
            }

            self.writer
                .write_frame(target.episode_id, persisted, &frame)
                .with_context(|| {
                    format!(
                        "failed to persist frame {persisted} of episode {}",
                        target.episode_id
                    )
                })?;
            persisted += 1;
            last_progress = Instant::now();
        }

        Ok(EpisodeOutcome::Completed {
            frames: persisted,
            ticks,
        })
    }

    /// Run the episode, restarting it from the same start point after every
    /// stall, until it completes.
    pub async fn record_until_complete<R: Rng>(
        &mut self,
        target: EpisodeTarget,
        policy: &RecordingPolicy,
        rng: &mut R,
    ) -> Result<EpisodeReport> {
        let mut stall_retries = 0;
        loop {
            match self.run_episode(target, policy, rng).await? {
                EpisodeOutcome::Completed { frames, ticks } => {
                    info!(
                        episode = target.episode_id,
                        start_point = target.start_point,
                        frames,
                        ticks,
                        stall_retries,
                        "episode complete"
                    );
                    return Ok(EpisodeReport {
                        target,
                        frames,
                        ticks,
                        stall_retries,
                    });
                }
                EpisodeOutcome::TimedOut { frames, ticks, idle } => {
                    stall_retries += 1;
                    warn!(
                        episode = target.episode_id,
                        start_point = target.start_point,
                        frames,
                        ticks,
                        idle_secs = idle.as_secs_f64(),
                        attempt = stall_retries,
                        "episode stalled, restarting from the same start point"
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
