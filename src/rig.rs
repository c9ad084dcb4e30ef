//! The stereo camera rig mounted on the player vehicle.
//!
//! Two camera positions, `Camera2` (left) and `Camera3` (right), are
//! separated along the vehicle's y axis by the stereo baseline. Each position
//! carries an RGB camera and a ground-truth depth camera with identical
//! intrinsics, so the depth image lines up pixel-for-pixel with the RGB one.

use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::depth::DepthTransform;
use crate::sim::types::{CameraSpec, Location, PostProcessing};

/// Geometry and intrinsics of the stereo rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoRig {
    /// Camera ids; one id per stereo position, left to right.
    pub camera_ids: Vec<u32>,
    /// Mount point of the leftmost camera, metres from the vehicle origin.
    pub origin: Location,
    /// Distance between neighbouring cameras in metres.
    pub baseline: f32,
    /// Focal length in pixels at `image_scale = 1.0`.
    pub focal_length: f32,
    /// Horizontal field of view in degrees.
    pub fov: f32,
    pub width: u32,
    pub height: u32,
    /// Multiplies resolution and focal length.
    pub image_scale: f32,
    /// Also mount a semantic segmentation camera at every position.
    pub segmentation: bool,
}

impl Default for StereoRig {
    fn default() -> Self {
        Self {
            camera_ids: vec![2, 3],
            origin: Location {
                x: 0.27,
                y: -0.06,
                z: 1.65,
            },
            baseline: 0.54,
            focal_length: 718.856,
            fov: 80.373_247,
            width: 2480,
            height: 752,
            image_scale: 1.0,
            segmentation: false,
        }
    }
}

/// Per-camera entry of [`Calibration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub name: String,
    pub position: Location,
}

/// Intrinsics and extrinsics stored next to every recorded episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub focal_length: f32,
    pub baseline: f32,
    pub fov: f32,
    pub width: u32,
    pub height: u32,
    pub cameras: Vec<CameraCalibration>,
}

impl StereoRig {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.camera_ids.is_empty(), "rig needs at least one camera id");
        ensure!(
            self.image_scale.is_finite() && self.image_scale > 0.0,
            "image scale must be a positive number, got {}",
            self.image_scale
        );
        ensure!(
            self.focal_length > 0.0 && self.baseline > 0.0,
            "focal length and baseline must be positive"
        );
        ensure!(
            self.fov > 0.0 && self.fov < 180.0,
            "field of view must lie in (0, 180) degrees, got {}",
            self.fov
        );
        let (w, h) = self.resolution();
        ensure!(w > 0 && h > 0, "scaled resolution {w}x{h} is empty");
        Ok(())
    }

    /// Image size after scaling.
    pub fn resolution(&self) -> (u32, u32) {
        let scale = |v: u32| (v as f32 * self.image_scale).round() as u32;
        (scale(self.width), scale(self.height))
    }

    /// Focal length in pixels after scaling.
    pub fn scaled_focal_length(&self) -> f32 {
        self.focal_length * self.image_scale
    }

    fn position(&self, slot: usize) -> Location {
        Location {
            y: self.origin.y + self.baseline * slot as f32,
            ..self.origin
        }
    }

    /// Camera specs for every position, in mount order.
    pub fn cameras(&self) -> Vec<CameraSpec> {
        let (width, height) = self.resolution();
        let mut kinds = vec![
            ("RGB", PostProcessing::SceneFinal),
            ("Depth", PostProcessing::Depth),
        ];
        if self.segmentation {
            kinds.push(("Semantic", PostProcessing::SemanticSegmentation));
        }

        self.camera_ids
            .iter()
            .enumerate()
            .flat_map(|(slot, id)| {
                let position = self.position(slot);
                kinds.iter().map(move |(suffix, post_processing)| CameraSpec {
                    name: format!("Camera{id}{suffix}"),
                    post_processing: *post_processing,
                    fov: self.fov,
                    width,
                    height,
                    position,
                })
            })
            .collect()
    }

    /// Depth cameras store disparity for this rig's focal length and baseline.
    pub fn depth_transforms(&self) -> BTreeMap<String, DepthTransform> {
        let transform = DepthTransform::Disparity {
            focal_length: self.scaled_focal_length(),
            baseline: self.baseline,
        };
        self.cameras()
            .into_iter()
            .filter(|c| c.post_processing == PostProcessing::Depth)
            .map(|c| (c.name, transform))
            .collect()
    }

    pub fn calibration(&self) -> Calibration {
        let (width, height) = self.resolution();
        Calibration {
            focal_length: self.scaled_focal_length(),
            baseline: self.baseline,
            fov: self.fov,
            width,
            height,
            cameras: self
                .cameras()
                .into_iter()
                .map(|c| CameraCalibration {
                    name: c.name,
                    position: c.position,
                })
                .collect(),
        }
    }
}
