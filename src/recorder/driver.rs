//! One pass over the start-point plan.
//!
//! A [`RunDriver`] owns the run configuration and turns it into episodes:
//! it resolves which start spots to record once the first scene is known,
//! draws a fresh weather (and actor seeds) before every episode, records
//! each episode to completion and leaves an `episode.json` next to its
//! frames. All randomness for one attempt comes from a single generator
//! seeded from the configuration, so a fixed seed reproduces the run.
//!
//! The plan is resolved on the first attempt and kept, so a run restarted
//! after a lost connection replays the same start spots, seeded or not.

use std::sync::OnceLock;

use anyhow::{bail, ensure, Context, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;
use uuid::Uuid;

use super::control::AutopilotNoise;
use super::episode::{EpisodeRecorder, EpisodeTarget};
use crate::config::{EpisodeNaming, RecorderConfig, StartPoints};
use crate::dataset::{EpisodeManifest, FrameWriter};
use crate::sim::{SessionConfig, SimulatorClient};

impl StartPoints {
    /// Turn the plan into concrete spot indices for a map with `available`
    /// start spots.
    ///
    /// Ranges must fit the map. Samples are drawn without replacement and
    /// clamped to the number of spots.
    pub fn resolve<R: Rng>(&self, available: usize, rng: &mut R) -> Result<Vec<usize>> {
        if available == 0 {
            bail!("the map reports no player start spots");
        }
        match *self {
            StartPoints::Range { from, to } => {
                ensure!(
                    to <= available,
                    "start range {from}..{to} exceeds the {available} spots of this map"
                );
                Ok((from..to).collect())
            }
            StartPoints::Sample { count } => {
                let count = count.min(available);
                Ok(rand::seq::index::sample(rng, available, count).into_vec())
            }
        }
    }
}

impl EpisodeNaming {
    pub fn episode_id(&self, ordinal: usize, start_point: usize) -> usize {
        match self {
            EpisodeNaming::Ordinal => ordinal,
            EpisodeNaming::StartPoint => start_point,
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub episodes: usize,
    pub frames: usize,
    pub stall_retries: usize,
}

#[derive(Debug)]
pub struct RunDriver {
    config: RecorderConfig,
    plan: OnceLock<Vec<usize>>,
}

impl RunDriver {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            plan: OnceLock::new(),
        }
    }

    /// The start-point plan, resolved on first use.
    fn plan<R: Rng>(&self, available: usize, rng: &mut R) -> Result<Vec<usize>> {
        if let Some(plan) = self.plan.get() {
            if let Some(&spot) = plan.iter().find(|&&spot| spot >= available) {
                bail!("planned start spot {spot} is missing from a map with {available} spots");
            }
            return Ok(plan.clone());
        }
        let plan = self.config.recording.start_points.resolve(available, rng)?;
        Ok(self.plan.get_or_init(|| plan).clone())
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Session settings for the next episode, with a freshly drawn weather.
    pub fn session<R: Rng>(&self, rng: &mut R) -> Result<SessionConfig> {
        let s = &self.config.session;
        let weather_id = *s
            .weathers
            .choose(rng)
            .context("no weather ids configured")?;

        let mut session = SessionConfig {
            synchronous_mode: s.synchronous_mode,
            send_non_player_agents_info: s.send_non_player_agents_info,
            number_of_vehicles: s.number_of_vehicles,
            number_of_pedestrians: s.number_of_pedestrians,
            weather_id,
            quality_level: s.quality_level,
            seed_vehicles: None,
            seed_pedestrians: None,
            cameras: self.config.rig.cameras(),
        };
        if s.randomize_seeds {
            session.randomize_seeds(rng);
        }
        Ok(session)
    }

    /// Record every episode of the plan over `client`, from the first start
    /// point. Consumes the connection.
    pub async fn run<C: SimulatorClient>(&self, client: C) -> Result<RunSummary> {
        let mut rng = self.rng();
        let run_id = Uuid::new_v4();
        let policy = self.config.recording.policy();
        let calibration = self.config.rig.calibration();

        let writer = FrameWriter::new(&self.config.output.root, self.config.rig.depth_transforms());
        let noise = AutopilotNoise::new(self.config.recording.steer_noise);
        let mut recorder = EpisodeRecorder::new(client, writer, noise);

        let mut session = self.session(&mut rng)?;
        let scene = recorder.configure(&session).await?;
        let plan = self.plan(scene.player_start_spots.len(), &mut rng)?;
        info!(
            %run_id,
            map = %scene.map_name,
            episodes = plan.len(),
            output = %self.config.output.root.display(),
            "recording plan ready"
        );

        let mut first_scene = Some(scene);
        let mut summary = RunSummary {
            run_id,
            episodes: 0,
            frames: 0,
            stall_retries: 0,
        };

        for (ordinal, &start_point) in plan.iter().enumerate() {
            let scene = match first_scene.take() {
                Some(scene) => scene,
                None => {
                    session = self.session(&mut rng)?;
                    recorder.configure(&session).await?
                }
            };

            let target = EpisodeTarget {
                episode_id: self.config.output.naming.episode_id(ordinal, start_point),
                start_point,
            };
            info!(
                episode = target.episode_id,
                start_point,
                weather = session.weather_id,
                of = plan.len(),
                "starting episode"
            );

            let started_at = Utc::now();
            let report = recorder
                .record_until_complete(target, &policy, &mut rng)
                .await
                .with_context(|| format!("episode {} failed", target.episode_id))?;

            let manifest = EpisodeManifest {
                run_id,
                episode_id: target.episode_id,
                start_point,
                map_name: scene.map_name,
                weather_id: session.weather_id,
                quality_level: session.quality_level,
                frames: report.frames,
                sensors: session.cameras.iter().map(|c| c.name.clone()).collect(),
                stall_retries: report.stall_retries,
                started_at,
                finished_at: Utc::now(),
                calibration: calibration.clone(),
            };
            recorder.writer().write_manifest(&manifest)?;

            summary.episodes += 1;
            summary.frames += report.frames;
            summary.stall_retries += report.stall_retries;
        }

        info!(
            %run_id,
            episodes = summary.episodes,
            frames = summary.frames,
            stall_retries = summary.stall_retries,
            "run complete"
        );
        Ok(summary)
    }
}
