//! Persisting sensor frames and episode manifests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use super::depth::DepthTransform;
use super::image::to_float_image;
use super::layout;
use super::manifest::EpisodeManifest;
use crate::sim::types::Frame;

/// Writes frames under a dataset root using [`layout`].
#[derive(Debug, Clone)]
pub struct FrameWriter {
    root: PathBuf,
    /// Per-sensor depth handling; depth sensors not listed store metres.
    transforms: BTreeMap<String, DepthTransform>,
}

impl FrameWriter {
    pub fn new(root: impl Into<PathBuf>, transforms: BTreeMap<String, DepthTransform>) -> Self {
        Self {
            root: root.into(),
            transforms,
        }
    }

    fn transform_for(&self, sensor: &str) -> DepthTransform {
        self.transforms.get(sensor).copied().unwrap_or_default()
    }

    /// Write every sensor image of `frame` as frame `frame_index` of the
    /// episode. Returns the number of files written.
    pub fn write_frame(&self, episode_id: usize, frame_index: usize, frame: &Frame) -> Result<usize> {
        for (name, sensor) in &frame.sensors {
            layout::validate_sensor_name(name)?;

            let dir = layout::sensor_dir(&self.root, episode_id, name);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;

            let image = to_float_image(sensor, self.transform_for(name))
                .with_context(|| format!("failed to convert sensor {name}"))?;
            let path = layout::frame_path(&self.root, episode_id, name, frame_index);
            image.write_to(&path)?;
        }

        debug!(
            episode = episode_id,
            frame = frame_index,
            sensors = frame.sensors.len(),
            "persisted frame"
        );
        Ok(frame.sensors.len())
    }

    pub fn write_manifest(&self, manifest: &EpisodeManifest) -> Result<PathBuf> {
        let dir = layout::episode_dir(&self.root, manifest.episode_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = layout::manifest_path(&self.root, manifest.episode_id);
        manifest.save_to_file(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::depth::encode_depth;
    use crate::dataset::pfm::{PfmChannels, PfmImage};
    use crate::rig::StereoRig;
    use crate::sim::types::{Measurements, PostProcessing, QualityLevel, SensorFrame};

    fn frame_with(sensors: Vec<(&str, SensorFrame)>) -> Frame {
        Frame {
            measurements: Measurements::default(),
            sensors: sensors
                .into_iter()
                .map(|(n, s)| (n.to_string(), s))
                .collect(),
        }
    }

    fn depth_frame(metres: f32) -> SensorFrame {
        SensorFrame {
            width: 2,
            height: 1,
            post_processing: PostProcessing::Depth,
            data: [encode_depth(metres), encode_depth(metres)].concat(),
        }
    }

    #[test]
    fn writes_one_file_per_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let rig = StereoRig::default();
        let writer = FrameWriter::new(dir.path(), rig.depth_transforms());

        let frame = frame_with(vec![
            ("Camera2Depth", depth_frame(10.0)),
            ("Camera5Depth", depth_frame(10.0)),
            (
                "Camera2RGB",
                SensorFrame {
                    width: 2,
                    height: 1,
                    post_processing: PostProcessing::SceneFinal,
                    data: vec![0, 0, 255, 255, 255, 0, 0, 255],
                },
            ),
        ]);

        let written = writer.write_frame(4, 9, &frame).unwrap();
        assert_eq!(written, 3);

        // Rig depth sensors store disparity.
        let path = layout::frame_path(dir.path(), 4, "Camera2Depth", 9);
        let img = PfmImage::read_from(&path).unwrap();
        assert_eq!(img.channels, PfmChannels::Gray);
        let expected = 718.856 * 0.54 / 10.0;
        assert!(img.data.iter().all(|v| (v - expected).abs() < 1e-2));

        // Depth sensors the rig doesn't know about store metres.
        let path = layout::frame_path(dir.path(), 4, "Camera5Depth", 9);
        let img = PfmImage::read_from(&path).unwrap();
        assert!(img.data.iter().all(|v| (v - 10.0).abs() < 1e-3));

        let path = layout::frame_path(dir.path(), 4, "Camera2RGB", 9);
        let img = PfmImage::read_from(&path).unwrap();
        assert_eq!(img.data, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn rejects_path_like_sensor_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FrameWriter::new(dir.path(), BTreeMap::new());
        let frame = frame_with(vec![("../escape", depth_frame(1.0))]);
        assert!(writer.write_frame(0, 0, &frame).is_err());
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FrameWriter::new(dir.path(), BTreeMap::new());
        let now = chrono::Utc::now();
        let manifest = EpisodeManifest {
            run_id: uuid::Uuid::new_v4(),
            episode_id: 2,
            start_point: 17,
            map_name: "Town01".into(),
            weather_id: 8,
            quality_level: QualityLevel::Low,
            frames: 100,
            sensors: vec!["Camera2RGB".into()],
            stall_retries: 1,
            started_at: now,
            finished_at: now,
            calibration: StereoRig::default().calibration(),
        };

        let path = writer.write_manifest(&manifest).unwrap();
        assert_eq!(path, dir.path().join("episode_0002/episode.json"));
        assert_eq!(EpisodeManifest::load_from_file(&path).unwrap(), manifest);
    }
}
