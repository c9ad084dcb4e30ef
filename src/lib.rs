//! carla-kitti: record stereo driving episodes from a simulator into a
//! KITTI-like dataset.
//!
//! A stereo rig of RGB and ground-truth depth cameras is mounted on an
//! autopilot-driven vehicle. Every episode starts from a chosen player start
//! spot under a random weather, and the recorder persists the camera images
//! of each eligible tick, depth converted to disparity, as PFM files.

pub mod config;
pub mod dataset;
pub mod recorder;
pub mod rig;
pub mod sim;
