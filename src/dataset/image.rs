//! Conversion of raw BGRA sensor images into float images.

use anyhow::{ensure, Result};

use super::depth::{decode_depth, DepthTransform};
use super::pfm::{PfmChannels, PfmImage};
use crate::sim::types::{PostProcessing, SensorFrame};

/// Convert one sensor frame to a float image.
///
/// - `SceneFinal`: RGB, each channel scaled to `[0, 1]`.
/// - `Depth`: one channel, decoded to metres and passed through `transform`.
/// - `SemanticSegmentation`: one channel holding the class tag.
pub fn to_float_image(frame: &SensorFrame, transform: DepthTransform) -> Result<PfmImage> {
    ensure!(
        frame.is_well_formed(),
        "{}x{} sensor image carries {} bytes, expected {}",
        frame.width,
        frame.height,
        frame.data.len(),
        frame.pixel_count() * SensorFrame::BYTES_PER_PIXEL
    );

    let (channels, data) = match frame.post_processing {
        PostProcessing::SceneFinal => {
            let data = frame
                .pixels()
                .flat_map(|[b, g, r, _]| [r, g, b].map(|v| v as f32 / 255.0))
                .collect();
            (PfmChannels::Rgb, data)
        }
        PostProcessing::Depth => {
            let data = frame
                .pixels()
                .map(|px| transform.apply(decode_depth(px)))
                .collect();
            (PfmChannels::Gray, data)
        }
        PostProcessing::SemanticSegmentation => {
            let data = frame.pixels().map(|[_, _, r, _]| r as f32).collect();
            (PfmChannels::Gray, data)
        }
    };

    PfmImage::new(frame.width, frame.height, channels, data)
}
