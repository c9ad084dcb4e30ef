//! Driving the simulator and recording episodes.
//!
//! - [`episode::EpisodeRecorder`] -- the per-tick read/control/persist loop
//!   for one episode, with stall detection and retry.
//! - [`control::AutopilotNoise`] -- perturbed controls from the autopilot.
//! - [`driver::RunDriver`] -- one pass over the start-point plan.
//! - [`supervisor::run_with_reconnect`] -- restarts the run when the
//!   connection drops.

pub mod control;
pub mod driver;
pub mod episode;
pub mod supervisor;

pub use control::AutopilotNoise;
pub use driver::{RunDriver, RunSummary};
pub use episode::{EpisodeOutcome, EpisodeRecorder, EpisodeReport, EpisodeTarget, RecordingPolicy};
pub use supervisor::run_with_reconnect;
