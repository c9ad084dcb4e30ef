//! A scripted in-process simulator.
//!
//! [`MockSimulator`] follows the same lock-step contract as the real
//! simulator: every [`read_frame`](SimulatorClient::read_frame) advances one
//! tick and must be answered by a
//! [`send_control`](SimulatorClient::send_control) before the next read. The
//! vehicle stands still for a configurable number of ticks, then cruises at a
//! fixed speed. Camera images are synthesised at the resolution requested in
//! the session configuration, with depth images carrying a known depth
//! ramp.
//!
//! Everything the recorder sends is appended to a shared [`MockLog`], which
//! outlives individual connections so tests can inspect a whole run
//! including reconnects.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use super::error::SimulatorError;
use super::traits::SimulatorClient;
use super::types::{
    Control, Frame, Location, Measurements, PlayerMeasurements, PostProcessing, Rotation, Scene,
    SensorFrame, SessionConfig, Transform,
};
use crate::dataset::depth::encode_depth;

/// Simulated time per tick, in milliseconds.
const TICK_MILLIS: u64 = 100;

/// Depth of the leftmost image column, metres. Each column one metre further.
pub const MOCK_NEAR_DEPTH: f32 = 5.0;

// ---------------------------------------------------------------------------
// Shared log
// ---------------------------------------------------------------------------

/// Requests observed by one or more [`MockSimulator`] connections.
#[derive(Debug, Clone, Default)]
pub struct MockEvents {
    pub sessions: Vec<SessionConfig>,
    pub episodes_started: Vec<usize>,
    pub controls: Vec<Control>,
    pub frames_read: usize,
}

/// Cloneable handle to [`MockEvents`].
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<MockEvents>>);

impl MockLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockEvents> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> MockEvents {
        self.lock().clone()
    }

    pub fn episodes_started(&self) -> Vec<usize> {
        self.lock().episodes_started.clone()
    }

    pub fn weathers(&self) -> Vec<u32> {
        self.lock().sessions.iter().map(|s| s.weather_id).collect()
    }

    pub fn steers(&self) -> Vec<f32> {
        self.lock().controls.iter().map(|c| c.steer).collect()
    }
}

// ---------------------------------------------------------------------------
// Mock simulator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MockSimulator {
    map_name: String,
    start_spots: usize,
    /// Ticks the vehicle stands still after an episode starts.
    standing_ticks: u64,
    /// Speed after the standing start, m/s.
    cruise_speed: f32,
    /// Wall-clock time each read blocks for.
    tick_interval: Duration,
    /// The first `stalled_starts` episodes never move.
    stalled_starts: usize,
    /// Fail with a connection error once this many frames were read on this
    /// connection.
    fail_after_reads: Option<usize>,
    log: MockLog,

    settings: Option<SessionConfig>,
    player_start: Option<usize>,
    episodes_started: usize,
    stalled: bool,
    tick: u64,
    reads: usize,
    awaiting_control: bool,
    location: Location,
}

impl MockSimulator {
    pub fn new() -> Self {
        Self {
            map_name: "Town01".into(),
            start_spots: 152,
            standing_ticks: 0,
            cruise_speed: 8.0,
            tick_interval: Duration::ZERO,
            stalled_starts: 0,
            fail_after_reads: None,
            log: MockLog::new(),
            settings: None,
            player_start: None,
            episodes_started: 0,
            stalled: false,
            tick: 0,
            reads: 0,
            awaiting_control: false,
            location: Location::default(),
        }
    }

    pub fn with_start_spots(mut self, spots: usize) -> Self {
        self.start_spots = spots;
        self
    }

    pub fn with_speed_profile(mut self, standing_ticks: u64, cruise_speed: f32) -> Self {
        self.standing_ticks = standing_ticks;
        self.cruise_speed = cruise_speed;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_stalled_starts(mut self, count: usize) -> Self {
        self.stalled_starts = count;
        self
    }

    pub fn failing_after_reads(mut self, reads: usize) -> Self {
        self.fail_after_reads = Some(reads);
        self
    }

    pub fn with_log(mut self, log: MockLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    fn speed_at(&self, tick: u64) -> f32 {
        if self.stalled || tick < self.standing_ticks {
            0.0
        } else {
            self.cruise_speed
        }
    }

    fn autopilot_at(&self, tick: u64) -> Control {
        Control {
            steer: 0.2 * (tick as f32 * 0.05).sin(),
            throttle: if self.stalled { 0.0 } else { 0.5 },
            brake: 0.0,
            hand_brake: false,
            reverse: false,
        }
    }

    fn render(&self, settings: &SessionConfig) -> BTreeMap<String, SensorFrame> {
        settings
            .cameras
            .iter()
            .map(|cam| {
                let (w, h) = (cam.width, cam.height);
                let mut data = Vec::with_capacity(w as usize * h as usize * 4);
                for y in 0..h {
                    for x in 0..w {
                        let px = match cam.post_processing {
                            PostProcessing::Depth => encode_depth(MOCK_NEAR_DEPTH + x as f32),
                            PostProcessing::SemanticSegmentation => [0, 0, (y % 13) as u8, 255],
                            PostProcessing::SceneFinal => {
                                let shade = (self.tick as u32).wrapping_add(x + y) as u8;
                                [shade, shade.wrapping_mul(3), shade.wrapping_mul(7), 255]
                            }
                        };
                        data.extend_from_slice(&px);
                    }
                }
                let frame = SensorFrame {
                    width: w,
                    height: h,
                    post_processing: cam.post_processing,
                    data,
                };
                (cam.name.clone(), frame)
            })
            .collect()
    }
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorClient for MockSimulator {
    async fn configure(&mut self, settings: &SessionConfig) -> Result<Scene, SimulatorError> {
        self.log.lock().sessions.push(settings.clone());
        self.settings = Some(settings.clone());
        self.player_start = None;
        self.awaiting_control = false;

        let player_start_spots = (0..self.start_spots)
            .map(|i| Transform {
                location: Location {
                    x: 10.0 * i as f32,
                    y: 0.0,
                    z: 0.0,
                },
                rotation: Rotation::default(),
            })
            .collect();

        Ok(Scene {
            map_name: self.map_name.clone(),
            player_start_spots,
        })
    }

    async fn start_episode(&mut self, player_start: usize) -> Result<(), SimulatorError> {
        if self.settings.is_none() {
            return Err(SimulatorError::Protocol(
                "episode started before the session was configured".into(),
            ));
        }
        if player_start >= self.start_spots {
            return Err(SimulatorError::Protocol(format!(
                "start spot {player_start} out of range (map has {})",
                self.start_spots
            )));
        }

        self.log.lock().episodes_started.push(player_start);
        self.stalled = self.episodes_started < self.stalled_starts;
        self.episodes_started += 1;
        self.player_start = Some(player_start);
        self.tick = 0;
        self.awaiting_control = false;
        self.location = Location {
            x: 10.0 * player_start as f32,
            y: 0.0,
            z: 0.0,
        };
        debug!(player_start, stalled = self.stalled, "mock episode started");
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, SimulatorError> {
        if self.fail_after_reads.is_some_and(|limit| self.reads >= limit) {
            return Err(SimulatorError::Connection("connection reset by peer".into()));
        }
        let Some(settings) = self.settings.clone() else {
            return Err(SimulatorError::Protocol("session not configured".into()));
        };
        if self.player_start.is_none() {
            return Err(SimulatorError::Protocol("no episode running".into()));
        }
        if settings.synchronous_mode && self.awaiting_control {
            return Err(SimulatorError::Protocol(
                "frame requested before the previous control was sent".into(),
            ));
        }

        if !self.tick_interval.is_zero() {
            tokio::time::sleep(self.tick_interval).await;
        }

        let tick = self.tick;
        let speed = self.speed_at(tick);
        self.location.y += speed * TICK_MILLIS as f32 / 1000.0;

        let measurements = Measurements {
            frame_number: tick,
            game_timestamp: tick * TICK_MILLIS,
            player: PlayerMeasurements {
                transform: Transform {
                    location: self.location,
                    rotation: Rotation::default(),
                },
                forward_speed: speed,
                autopilot_control: self.autopilot_at(tick),
                ..PlayerMeasurements::default()
            },
            non_player_agents: if settings.send_non_player_agents_info {
                (settings.number_of_vehicles + settings.number_of_pedestrians) as usize
            } else {
                0
            },
        };
        let sensors = self.render(&settings);

        self.tick += 1;
        self.reads += 1;
        self.awaiting_control = true;
        self.log.lock().frames_read += 1;

        Ok(Frame {
            measurements,
            sensors,
        })
    }

    async fn send_control(&mut self, control: &Control) -> Result<(), SimulatorError> {
        if !self.awaiting_control {
            return Err(SimulatorError::Protocol(
                "control sent without a pending frame".into(),
            ));
        }
        self.awaiting_control = false;
        self.log.lock().controls.push(*control);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::StereoRig;
    use crate::sim::types::QualityLevel;

    fn session() -> SessionConfig {
        let rig = StereoRig {
            width: 4,
            height: 2,
            ..StereoRig::default()
        };
        SessionConfig {
            synchronous_mode: true,
            send_non_player_agents_info: true,
            number_of_vehicles: 2,
            number_of_pedestrians: 3,
            weather_id: 1,
            quality_level: QualityLevel::Low,
            seed_vehicles: None,
            seed_pedestrians: None,
            cameras: rig.cameras(),
        }
    }

    #[tokio::test]
    async fn renders_every_configured_camera() {
        let mut sim = MockSimulator::new().with_start_spots(3);
        let scene = sim.configure(&session()).await.unwrap();
        assert_eq!(scene.player_start_spots.len(), 3);

        sim.start_episode(2).await.unwrap();
        let frame = sim.read_frame().await.unwrap();
        assert_eq!(frame.sensors.len(), 4);
        assert!(frame.sensors.values().all(|s| s.is_well_formed()));
        assert_eq!(frame.measurements.non_player_agents, 5);

        let depth = &frame.sensors["Camera2Depth"];
        let first = depth.pixels().next().unwrap();
        let metres = crate::dataset::depth::decode_depth(first);
        assert!((metres - MOCK_NEAR_DEPTH).abs() < 1e-3);
    }

    #[tokio::test]
    async fn enforces_lock_step() {
        let mut sim = MockSimulator::new();
        sim.configure(&session()).await.unwrap();
        sim.start_episode(0).await.unwrap();

        sim.read_frame().await.unwrap();
        let err = sim.read_frame().await.unwrap_err();
        assert!(matches!(err, SimulatorError::Protocol(_)));

        sim.send_control(&Control::default()).await.unwrap();
        sim.read_frame().await.unwrap();
        assert_eq!(sim.log().snapshot().controls.len(), 1);
    }

    #[tokio::test]
    async fn rejects_out_of_order_requests() {
        let mut sim = MockSimulator::new().with_start_spots(2);
        assert!(sim.start_episode(0).await.is_err());
        sim.configure(&session()).await.unwrap();
        assert!(sim.start_episode(2).await.is_err());
        assert!(sim.read_frame().await.is_err());
        assert!(sim.send_control(&Control::default()).await.is_err());
    }

    #[tokio::test]
    async fn standing_start_then_cruise() {
        let mut sim = MockSimulator::new().with_speed_profile(2, 5.0);
        sim.configure(&session()).await.unwrap();
        sim.start_episode(0).await.unwrap();

        let mut speeds = Vec::new();
        for _ in 0..4 {
            let frame = sim.read_frame().await.unwrap();
            speeds.push(frame.measurements.player.forward_speed);
            sim.send_control(&Control::default()).await.unwrap();
        }
        assert_eq!(speeds, vec![0.0, 0.0, 5.0, 5.0]);
    }

    #[tokio::test]
    async fn stalled_starts_never_move() {
        let mut sim = MockSimulator::new().with_stalled_starts(1);
        sim.configure(&session()).await.unwrap();

        sim.start_episode(0).await.unwrap();
        let frame = sim.read_frame().await.unwrap();
        assert_eq!(frame.measurements.player.forward_speed, 0.0);
        sim.send_control(&Control::default()).await.unwrap();

        sim.start_episode(0).await.unwrap();
        let frame = sim.read_frame().await.unwrap();
        assert!(frame.measurements.player.forward_speed > 0.0);
    }

    #[tokio::test]
    async fn injected_disconnect_is_a_connection_error() {
        let mut sim = MockSimulator::new().failing_after_reads(1);
        sim.configure(&session()).await.unwrap();
        sim.start_episode(0).await.unwrap();
        sim.read_frame().await.unwrap();
        sim.send_control(&Control::default()).await.unwrap();

        let err = sim.read_frame().await.unwrap_err();
        assert!(err.is_connection());
    }
}
