//! The client interface to the external simulator.
//!
//! The recorder only ever speaks to the simulator through
//! [`SimulatorClient`], so the live bridge client and the scripted mock are
//! interchangeable.

use super::error::SimulatorError;
use super::types::{Control, Frame, Scene, SessionConfig};

/// Request/response pairs offered by a simulator connection.
///
/// In synchronous mode the simulator advances exactly one tick per
/// [`read_frame`](SimulatorClient::read_frame) and then waits for the
/// matching [`send_control`](SimulatorClient::send_control).
#[allow(async_fn_in_trait)]
pub trait SimulatorClient: Send {
    /// Send the session configuration and return the scene it produced.
    async fn configure(&mut self, settings: &SessionConfig) -> Result<Scene, SimulatorError>;

    /// Begin a new episode with the player at the given start spot.
    async fn start_episode(&mut self, player_start: usize) -> Result<(), SimulatorError>;

    /// Block until the next tick and return its measurements and images.
    async fn read_frame(&mut self) -> Result<Frame, SimulatorError>;

    /// Send the control command for the tick just read.
    async fn send_control(&mut self, control: &Control) -> Result<(), SimulatorError>;
}
