//! Live simulator client speaking to a simulator bridge over HTTP.
//!
//! The bridge is a small sidecar process that holds the simulator's native
//! client connection and re-exposes it as JSON endpoints:
//!
//! - `GET  {base}/ping`                              -- liveness probe
//! - `POST {base}/settings`  body: [`SessionConfig`] -- returns [`Scene`]
//! - `POST {base}/episode`   body: `{"player_start": n}`
//! - `GET  {base}/frame`                             -- blocks until the next tick,
//!   returns measurements plus sensor descriptors
//! - `GET  {base}/frame/{frame_number}/sensor/{name}` -- raw BGRA bytes
//! - `POST {base}/control`   body: [`Control`]
//!
//! Refused, reset, or timed-out requests surface as
//! [`SimulatorError::Connection`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::SimulatorError;
use super::traits::SimulatorClient;
use super::types::{Control, Frame, Measurements, PostProcessing, Scene, SensorFrame, SessionConfig};

/// Sensor entry of the `/frame` response.
#[derive(Debug, Deserialize)]
struct SensorDescriptor {
    name: String,
    width: u32,
    height: u32,
    post_processing: PostProcessing,
}

/// The JSON shape returned by `GET /frame`.
#[derive(Debug, Deserialize)]
struct FrameHeader {
    measurements: Measurements,
    #[serde(default)]
    sensors: Vec<SensorDescriptor>,
}

#[derive(Debug, Serialize)]
struct StartEpisode {
    player_start: usize,
}

/// A [`SimulatorClient`] backed by the HTTP bridge.
#[derive(Debug)]
pub struct BridgeClient {
    /// Base URL of the bridge (e.g. `http://localhost:2000`).
    base_url: String,
    http: reqwest::Client,
}

impl BridgeClient {
    /// Build a client for `host:port` and check the bridge is reachable.
    ///
    /// `timeout` bounds every request, including the blocking frame read,
    /// so it must exceed the simulator's worst tick time.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, SimulatorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SimulatorError::Protocol(format!("failed to build HTTP client: {e}")))?;

        let client = Self {
            base_url: format!("http://{host}:{port}"),
            http,
        };

        let resp = client.http.get(client.url("ping")).send().await?;
        Self::check_status(resp).await?;
        info!(url = %client.base_url, "connected to simulator bridge");
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SimulatorError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SimulatorError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response, SimulatorError> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::check_status(resp).await
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, SimulatorError> {
        let resp = self.http.get(self.url(path)).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn fetch_sensor(
        &self,
        frame_number: u64,
        desc: SensorDescriptor,
    ) -> Result<(String, SensorFrame), SimulatorError> {
        let path = format!("frame/{frame_number}/sensor/{}", desc.name);
        let resp = self.http.get(self.url(&path)).send().await?;
        let data = Self::check_status(resp).await?.bytes().await?.to_vec();

        let frame = SensorFrame {
            width: desc.width,
            height: desc.height,
            post_processing: desc.post_processing,
            data,
        };
        if !frame.is_well_formed() {
            return Err(SimulatorError::Decode(format!(
                "sensor {} sent {} bytes for a {}x{} image",
                desc.name,
                frame.data.len(),
                desc.width,
                desc.height
            )));
        }
        Ok((desc.name, frame))
    }
}

impl SimulatorClient for BridgeClient {
    async fn configure(&mut self, settings: &SessionConfig) -> Result<Scene, SimulatorError> {
        let resp = self.post("settings", settings).await?;
        let scene: Scene = resp.json().await?;
        debug!(
            map = %scene.map_name,
            start_spots = scene.player_start_spots.len(),
            "bridge accepted session settings"
        );
        Ok(scene)
    }

    async fn start_episode(&mut self, player_start: usize) -> Result<(), SimulatorError> {
        self.post("episode", &StartEpisode { player_start }).await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, SimulatorError> {
        let header: FrameHeader = self.get_json("frame").await?;
        let frame_number = header.measurements.frame_number;

        let mut sensors = BTreeMap::new();
        for desc in header.sensors {
            let (name, frame) = self.fetch_sensor(frame_number, desc).await?;
            sensors.insert(name, frame);
        }

        Ok(Frame {
            measurements: header.measurements,
            sensors,
        })
    }

    async fn send_control(&mut self, control: &Control) -> Result<(), SimulatorError> {
        self.post("control", control).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::depth::{decode_depth, encode_depth};
    use crate::sim::types::QualityLevel;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Weather id the test bridge refuses with 503.
    const BUSY_WEATHER: u32 = 99;

    type RequestLog = Arc<Mutex<Vec<String>>>;

    /// Answer one request the way a bridge with a single 2x1 depth camera
    /// would.
    fn route(method: &str, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        match (method, path) {
            ("GET", "/ping") => (200, b"pong".to_vec()),
            ("POST", "/settings") => match serde_json::from_slice::<SessionConfig>(body) {
                Ok(s) if s.weather_id == BUSY_WEATHER => (503, b"simulator busy".to_vec()),
                Ok(_) => {
                    let spots = vec![crate::sim::types::Transform::default(); 3];
                    let scene = Scene {
                        map_name: "Town01".into(),
                        player_start_spots: spots,
                    };
                    (200, serde_json::to_vec(&scene).unwrap())
                }
                Err(_) => (400, b"bad settings".to_vec()),
            },
            ("POST", "/episode") => {
                let ok = serde_json::from_slice::<serde_json::Value>(body)
                    .is_ok_and(|v| v["player_start"] == 1);
                if ok {
                    (200, b"{}".to_vec())
                } else {
                    (400, b"bad start".to_vec())
                }
            }
            ("GET", "/frame") => {
                let measurements = Measurements {
                    frame_number: 7,
                    ..Measurements::default()
                };
                let header = serde_json::json!({
                    "measurements": measurements,
                    "sensors": [
                        {"name": "Camera2Depth", "width": 2, "height": 1, "post_processing": "Depth"}
                    ]
                });
                (200, serde_json::to_vec(&header).unwrap())
            }
            ("GET", "/frame/7/sensor/Camera2Depth") => {
                (200, [encode_depth(10.0), encode_depth(20.0)].concat())
            }
            ("POST", "/control") => match serde_json::from_slice::<Control>(body) {
                Ok(_) => (200, b"{}".to_vec()),
                Err(_) => (400, b"bad control".to_vec()),
            },
            _ => (404, b"not found".to_vec()),
        }
    }

    async fn handle(mut stream: TcpStream, log: RequestLog) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map_or(0, |(_, value)| value.trim().parse::<usize>().unwrap());
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = &buf[header_end..header_end + content_length];

        let mut request_line = head.split_whitespace();
        let method = request_line.next().unwrap_or_default();
        let path = request_line.next().unwrap_or_default();
        log.lock().unwrap().push(format!("{method} {path}"));

        let (status, payload) = route(method, path, body);
        let reply = format!(
            "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        );
        stream.write_all(reply.as_bytes()).await.unwrap();
        stream.write_all(&payload).await.unwrap();
        stream.shutdown().await.ok();
    }

    /// Start a bridge on an ephemeral port; returns the port and its request log.
    async fn spawn_bridge() -> (u16, RequestLog) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let log = RequestLog::default();
        let server_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle(stream, server_log.clone()));
            }
        });
        (port, log)
    }

    fn session(weather_id: u32) -> SessionConfig {
        SessionConfig {
            synchronous_mode: true,
            send_non_player_agents_info: false,
            number_of_vehicles: 0,
            number_of_pedestrians: 0,
            weather_id,
            quality_level: QualityLevel::Low,
            seed_vehicles: Some(1),
            seed_pedestrians: Some(2),
            cameras: Vec::new(),
        }
    }

    #[tokio::test]
    async fn one_tick_round_trip_through_the_bridge() {
        let (port, log) = spawn_bridge().await;
        let mut client = BridgeClient::connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();

        let scene = client.configure(&session(1)).await.unwrap();
        assert_eq!(scene.map_name, "Town01");
        assert_eq!(scene.player_start_spots.len(), 3);

        client.start_episode(1).await.unwrap();
        let frame = client.read_frame().await.unwrap();
        assert_eq!(frame.measurements.frame_number, 7);
        let depth = &frame.sensors["Camera2Depth"];
        assert!(depth.is_well_formed());
        let metres: Vec<f32> = depth.pixels().map(decode_depth).collect();
        assert!((metres[0] - 10.0).abs() < 1e-3);
        assert!((metres[1] - 20.0).abs() < 1e-3);

        let control = Control {
            steer: 0.1,
            throttle: 0.5,
            ..Control::default()
        };
        client.send_control(&control).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "GET /ping",
                "POST /settings",
                "POST /episode",
                "GET /frame",
                "GET /frame/7/sensor/Camera2Depth",
                "POST /control",
            ]
        );
    }

    #[tokio::test]
    async fn error_status_keeps_code_and_body() {
        let (port, _log) = spawn_bridge().await;
        let mut client = BridgeClient::connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();

        let err = client.configure(&session(BUSY_WEATHER)).await.unwrap_err();
        match err {
            SimulatorError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "simulator busy");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
        assert!(!SimulatorError::Status {
            status: 503,
            body: String::new()
        }
        .is_connection());
    }

    #[tokio::test]
    async fn unreachable_bridge_is_a_connection_error() {
        // Grab a free port, then close it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = BridgeClient::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err}");
    }

    #[test]
    fn frame_header_parses_with_defaults() {
        let json = serde_json::json!({
            "measurements": {
                "frame_number": 42,
                "game_timestamp": 4200,
                "player": {
                    "transform": {
                        "location": {"x": 1.0, "y": 2.0, "z": 0.0},
                        "rotation": {"pitch": 0.0, "yaw": 90.0, "roll": 0.0}
                    },
                    "forward_speed": 7.5,
                    "collision_vehicles": 0.0,
                    "collision_pedestrians": 0.0,
                    "collision_other": 0.0,
                    "intersection_otherlane": 0.0,
                    "intersection_offroad": 0.1,
                    "autopilot_control": {"steer": 0.1, "throttle": 0.6, "brake": 0.0}
                }
            },
            "sensors": [
                {"name": "Camera2Depth", "width": 4, "height": 2, "post_processing": "Depth"}
            ]
        });

        let header: FrameHeader = serde_json::from_value(json).unwrap();
        assert_eq!(header.measurements.frame_number, 42);
        assert_eq!(header.measurements.non_player_agents, 0);
        assert!(!header.measurements.player.autopilot_control.hand_brake);
        assert_eq!(header.sensors.len(), 1);
        assert_eq!(header.sensors[0].post_processing, PostProcessing::Depth);
    }
}
