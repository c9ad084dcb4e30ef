//! Simulator client abstractions and concrete implementations.
//!
//! The recorder drives the simulator exclusively through the
//! [`SimulatorClient`] trait.
//!
//! Included clients:
//! - **Bridge** ([`bridge`]) -- a live simulator reached through an HTTP
//!   bridge process.
//! - **Mock** ([`mock`]) -- a scripted in-process simulator, for tests and
//!   dry runs without a simulator.

pub mod bridge;
pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{is_connection_error, SimulatorError};
pub use traits::SimulatorClient;
pub use types::{Control, Frame, Measurements, Scene, SensorFrame, SessionConfig};

// ---------------------------------------------------------------------------
// AnyClient: enum dispatch wrapper for runtime client selection
// ---------------------------------------------------------------------------

/// An enum wrapper around all concrete clients, enabling runtime selection
/// without `dyn` (which is incompatible with async trait methods).
#[derive(Debug)]
pub enum AnyClient {
    Bridge(bridge::BridgeClient),
    Mock(mock::MockSimulator),
}

impl SimulatorClient for AnyClient {
    async fn configure(&mut self, settings: &SessionConfig) -> Result<Scene, SimulatorError> {
        match self {
            Self::Bridge(c) => c.configure(settings).await,
            Self::Mock(c) => c.configure(settings).await,
        }
    }

    async fn start_episode(&mut self, player_start: usize) -> Result<(), SimulatorError> {
        match self {
            Self::Bridge(c) => c.start_episode(player_start).await,
            Self::Mock(c) => c.start_episode(player_start).await,
        }
    }

    async fn read_frame(&mut self) -> Result<Frame, SimulatorError> {
        match self {
            Self::Bridge(c) => c.read_frame().await,
            Self::Mock(c) => c.read_frame().await,
        }
    }

    async fn send_control(&mut self, control: &Control) -> Result<(), SimulatorError> {
        match self {
            Self::Bridge(c) => c.send_control(control).await,
            Self::Mock(c) => c.send_control(control).await,
        }
    }
}
