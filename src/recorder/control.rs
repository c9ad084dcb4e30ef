//! Control commands derived from the simulator's autopilot.

use rand::Rng;

use crate::sim::types::Control;

/// Replays the autopilot's suggestion with uniform steering noise, so the
/// recorded drives do not all follow the lane centre exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutopilotNoise {
    /// Noise is drawn from `[-steer_noise, steer_noise)`.
    pub steer_noise: f32,
}

impl AutopilotNoise {
    pub fn new(steer_noise: f32) -> Self {
        Self { steer_noise }
    }

    pub fn perturb<R: Rng>(&self, autopilot: &Control, rng: &mut R) -> Control {
        let noise = if self.steer_noise > 0.0 {
            rng.gen_range(-self.steer_noise..self.steer_noise)
        } else {
            0.0
        };
        Control {
            steer: (autopilot.steer + noise).clamp(-1.0, 1.0),
            ..*autopilot
        }
    }
}
