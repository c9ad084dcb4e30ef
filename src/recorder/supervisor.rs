//! Restarting a run after the simulator connection drops.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use super::driver::{RunDriver, RunSummary};
use crate::sim::{is_connection_error, SimulatorClient, SimulatorError};

/// Run `driver` to completion over connections produced by `connect`.
///
/// A lost or refused connection is logged, followed by a `backoff` pause,
/// after which a new connection is opened and the run starts over from the
/// first start point. Any other error is returned as is.
pub async fn run_with_reconnect<C, F, Fut>(
    driver: &RunDriver,
    mut connect: F,
    backoff: Duration,
) -> Result<RunSummary>
where
    C: SimulatorClient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<C, SimulatorError>>,
{
    let mut attempt: usize = 0;
    loop {
        attempt += 1;
        let result = match connect().await {
            Ok(client) => {
                info!(attempt, "connected to simulator");
                driver.run(client).await
            }
            Err(err) => Err(anyhow::Error::new(err).context("failed to connect to simulator")),
        };

        match result {
            Ok(summary) => return Ok(summary),
            Err(err) if is_connection_error(&err) => {
                error!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "{err:#}"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecorderConfig, StartPoints};
    use crate::sim::mock::{MockLog, MockSimulator};
    use std::path::Path;

    fn small_config(root: &Path) -> RecorderConfig {
        let mut config = RecorderConfig::default();
        config.rig.width = 4;
        config.rig.height = 2;
        config.recording.frames_per_episode = 3;
        config.recording.warmup_frames = 0;
        config.recording.start_points = StartPoints::Range { from: 0, to: 3 };
        config.output.root = root.to_path_buf();
        config.seed = Some(1);
        config
    }

    /// Hands out the queued connection attempts in order.
    fn queue(
        mut attempts: Vec<Result<MockSimulator, SimulatorError>>,
    ) -> impl FnMut() -> std::future::Ready<Result<MockSimulator, SimulatorError>> {
        attempts.reverse();
        move || {
            let next = attempts
                .pop()
                .unwrap_or_else(|| Err(SimulatorError::Connection("no more simulators".into())));
            std::future::ready(next)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_restarts_from_the_first_start_point() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RunDriver::new(small_config(dir.path()));
        let log = MockLog::new();
        let flaky = MockSimulator::new()
            .with_log(log.clone())
            .failing_after_reads(5);
        let healthy = MockSimulator::new().with_log(log.clone());

        let started = tokio::time::Instant::now();
        let summary = run_with_reconnect(
            &driver,
            queue(vec![Ok(flaky), Ok(healthy)]),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(summary.episodes, 3);
        assert_eq!(summary.frames, 9);
        // Episode 1 died after two reads; the second connection starts over.
        assert_eq!(log.episodes_started(), vec![0, 1, 0, 1, 2]);
        assert_eq!(log.snapshot().frames_read, 5 + 9);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unseeded_sample_is_replayed_after_a_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.recording.start_points = StartPoints::Sample { count: 3 };
        config.seed = None;
        let driver = RunDriver::new(config);
        let log = MockLog::new();
        let flaky = MockSimulator::new()
            .with_start_spots(50)
            .with_log(log.clone())
            .failing_after_reads(5);
        let healthy = MockSimulator::new()
            .with_start_spots(50)
            .with_log(log.clone());

        run_with_reconnect(
            &driver,
            queue(vec![Ok(flaky), Ok(healthy)]),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let started = log.episodes_started();
        assert_eq!(started.len(), 5);
        assert_eq!(started[..2], started[2..4]);
        assert_ne!(started[2], started[4]);
        assert_ne!(started[3], started[4]);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connection_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let driver = RunDriver::new(small_config(dir.path()));

        let summary = run_with_reconnect(
            &driver,
            queue(vec![
                Err(SimulatorError::Connection("connection refused".into())),
                Err(SimulatorError::Connection("connection refused".into())),
                Ok(MockSimulator::new()),
            ]),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(summary.episodes, 3);
    }

    #[tokio::test]
    async fn other_errors_end_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.recording.start_points = StartPoints::Range { from: 0, to: 500 };
        let driver = RunDriver::new(config);

        let mut connects = 0;
        let err = run_with_reconnect(
            &driver,
            || {
                connects += 1;
                std::future::ready(Ok::<_, SimulatorError>(MockSimulator::new()))
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(!is_connection_error(&err));
        assert!(format!("{err:#}").contains("0..500"));
        assert_eq!(connects, 1);
    }
}
