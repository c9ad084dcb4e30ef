//! Messages exchanged with the simulator.
//!
//! These are plain data: the session configuration sent before an episode,
//! the scene description that comes back, the per-tick measurements and
//! sensor images, and the control command returned every tick.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

/// Rendering quality requested from the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityLevel {
    Low,
    Epic,
}

/// What a camera renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostProcessing {
    /// The final rendered RGB image.
    SceneFinal,
    /// Ground-truth depth, packed into the B, G and R bytes of each pixel.
    Depth,
    /// Ground-truth class tags in the R byte.
    SemanticSegmentation,
}

/// A position in metres, simulator frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// An orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

/// A camera attached to the player vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    /// Unique sensor name; also the directory frames are written under.
    pub name: String,
    pub post_processing: PostProcessing,
    /// Horizontal field of view in degrees.
    pub fov: f32,
    pub width: u32,
    pub height: u32,
    /// Offset from the vehicle origin in metres.
    pub position: Location,
}

/// Everything the simulator needs to set up an episode.
///
/// Sent once per episode and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub synchronous_mode: bool,
    pub send_non_player_agents_info: bool,
    pub number_of_vehicles: u32,
    pub number_of_pedestrians: u32,
    pub weather_id: u32,
    pub quality_level: QualityLevel,
    /// Seeds for the non-player actors; `None` lets the simulator choose.
    pub seed_vehicles: Option<u32>,
    pub seed_pedestrians: Option<u32>,
    pub cameras: Vec<CameraSpec>,
}

impl SessionConfig {
    /// Draw fresh vehicle and pedestrian seeds.
    pub fn randomize_seeds<R: Rng>(&mut self, rng: &mut R) {
        self.seed_vehicles = Some(rng.gen());
        self.seed_pedestrians = Some(rng.gen());
    }
}

/// What the simulator reports after accepting a [`SessionConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub map_name: String,
    pub player_start_spots: Vec<Transform>,
}

// ---------------------------------------------------------------------------
// Per-tick data
// ---------------------------------------------------------------------------

/// Vehicle control command. Also how the autopilot expresses its suggestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Steering in `[-1, 1]`.
    pub steer: f32,
    pub throttle: f32,
    pub brake: f32,
    #[serde(default)]
    pub hand_brake: bool,
    #[serde(default)]
    pub reverse: bool,
}

/// Measurements of the player vehicle for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMeasurements {
    pub transform: Transform,
    /// Forward speed in m/s.
    pub forward_speed: f32,
    pub collision_vehicles: f32,
    pub collision_pedestrians: f32,
    pub collision_other: f32,
    /// Fraction of the vehicle footprint in the opposite lane, `[0, 1]`.
    pub intersection_otherlane: f32,
    /// Fraction of the vehicle footprint off the road, `[0, 1]`.
    pub intersection_offroad: f32,
    pub autopilot_control: Control,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub frame_number: u64,
    /// Simulation time in milliseconds.
    pub game_timestamp: u64,
    pub player: PlayerMeasurements,
    /// Number of non-player agents reported this tick.
    #[serde(default)]
    pub non_player_agents: usize,
}

impl Measurements {
    pub fn forward_speed_kmh(&self) -> f32 {
        self.player.forward_speed * 3.6
    }
}

impl fmt::Display for Measurements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.player;
        write!(
            f,
            "Vehicle at ({:.1}, {:.1}), {:.0} km/h, \
             Collision: {{vehicles={:.0}, pedestrians={:.0}, other={:.0}}}, \
             {:.0}% other lane, {:.0}% off-road, \
             ({} non-player agents in the scene)",
            p.transform.location.x,
            p.transform.location.y,
            self.forward_speed_kmh(),
            p.collision_vehicles,
            p.collision_pedestrians,
            p.collision_other,
            100.0 * p.intersection_otherlane,
            100.0 * p.intersection_offroad,
            self.non_player_agents,
        )
    }
}

/// One raw camera image, 32-bit BGRA, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    pub width: u32,
    pub height: u32,
    pub post_processing: PostProcessing,
    pub data: Vec<u8>,
}

impl SensorFrame {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether `data` holds exactly `width * height` BGRA pixels.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.pixel_count() * Self::BYTES_PER_PIXEL
    }

    /// Iterate pixels as `[b, g, r, a]`.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data
            .chunks_exact(Self::BYTES_PER_PIXEL)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }
}

/// Everything the simulator produced for one synchronous tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub measurements: Measurements,
    /// Sensor name -> image, in name order.
    pub sensors: BTreeMap<String, SensorFrame>,
}
