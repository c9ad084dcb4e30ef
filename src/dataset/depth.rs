//! Depth decoding and the depth/disparity transform.
//!
//! Depth cameras pack a normalized depth in `[0, 1]` into the three colour
//! bytes of each BGRA pixel as a 24-bit fixed-point value:
//!
//! ```text
//! normalized = (R + G * 256 + B * 256 * 256) / (256^3 - 1)
//! metres     = normalized * FAR_PLANE_METRES
//! ```
//!
//! Stereo datasets want disparity rather than depth. For a rectified pair
//! with focal length `f` (pixels) and baseline `B` (metres) the two are
//! related by `disparity = f * B / depth`, which is its own inverse.

use serde::{Deserialize, Serialize};

/// Distance encoded by a normalized depth of 1.0.
pub const FAR_PLANE_METRES: f32 = 1000.0;

const MAX_24BIT: f64 = 16_777_215.0;

/// Decode a BGRA depth pixel to a normalized depth in `[0, 1]`.
pub fn decode_normalized(bgra: [u8; 4]) -> f32 {
    let [b, g, r, _] = bgra;
    let packed = r as u32 + (g as u32) * 256 + (b as u32) * 65_536;
    (packed as f64 / MAX_24BIT) as f32
}

/// Decode a BGRA depth pixel to metres.
pub fn decode_depth(bgra: [u8; 4]) -> f32 {
    (decode_normalized(bgra) as f64 * FAR_PLANE_METRES as f64) as f32
}

/// Encode a depth in metres as a BGRA pixel. Values are clamped to
/// `[0, FAR_PLANE_METRES]`.
pub fn encode_depth(metres: f32) -> [u8; 4] {
    let normalized = (metres as f64 / FAR_PLANE_METRES as f64).clamp(0.0, 1.0);
    let packed = (normalized * MAX_24BIT).round() as u32;
    let r = (packed & 0xff) as u8;
    let g = ((packed >> 8) & 0xff) as u8;
    let b = ((packed >> 16) & 0xff) as u8;
    [b, g, r, 255]
}

/// `f * B / value`. Maps depth to disparity and disparity back to depth.
///
/// Non-positive inputs map to `0.0` (no valid correspondence).
pub fn depth_to_disparity(value: f32, focal_length: f32, baseline: f32) -> f32 {
    if value <= 0.0 {
        return 0.0;
    }
    focal_length * baseline / value
}

/// How a depth sensor's metres are turned into stored values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum DepthTransform {
    /// Store depth in metres unchanged.
    #[default]
    Metres,
    /// Store stereo disparity in pixels.
    Disparity { focal_length: f32, baseline: f32 },
}

impl DepthTransform {
    pub fn apply(&self, metres: f32) -> f32 {
        match *self {
            Self::Metres => metres,
            Self::Disparity {
                focal_length,
                baseline,
            } => depth_to_disparity(metres, focal_length, baseline),
        }
    }
}
