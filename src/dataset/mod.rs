//! The recorded dataset: path scheme, depth handling, file formats.
//!
//! - [`layout`] -- where every frame and manifest lands on disk.
//! - [`depth`] -- 24-bit depth decoding and the depth/disparity transform.
//! - [`image`] -- BGRA sensor images to float images.
//! - [`pfm`] -- Portable Float Map encoding.
//! - [`writer::FrameWriter`] -- persists frames and manifests.

pub mod depth;
pub mod image;
pub mod layout;
pub mod manifest;
pub mod pfm;
pub mod writer;

pub use depth::DepthTransform;
pub use manifest::EpisodeManifest;
pub use writer::FrameWriter;
