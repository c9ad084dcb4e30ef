//! Portable Float Map encoding.
//!
//! A PFM file is a three-line ASCII header followed by raw `f32` samples:
//!
//! ```text
//! Pf            (PF for three channels)
//! <width> <height>
//! -1.0          (negative scale = little-endian samples)
//! ```
//!
//! Rows are stored bottom-to-top. [`PfmImage`] keeps its samples top row
//! first and flips on encode/decode.

use std::path::Path;

use anyhow::{bail, ensure, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfmChannels {
    Gray,
    Rgb,
}

impl PfmChannels {
    pub fn count(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }

    fn magic(&self) -> &'static str {
        match self {
            Self::Gray => "Pf",
            Self::Rgb => "PF",
        }
    }
}

/// A float image, row-major, top row first, channels interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct PfmImage {
    pub width: u32,
    pub height: u32,
    pub channels: PfmChannels,
    pub data: Vec<f32>,
}

impl PfmImage {
    pub fn new(width: u32, height: u32, channels: PfmChannels, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize * channels.count();
        ensure!(
            data.len() == expected,
            "PFM image {width}x{height} with {} channel(s) needs {expected} samples, got {}",
            channels.count(),
            data.len()
        );
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    fn row_len(&self) -> usize {
        self.width as usize * self.channels.count()
    }

    /// Serialize to little-endian PFM bytes.
    pub fn encode(&self) -> Vec<u8> {
        let header = format!(
            "{}\n{} {}\n-1.0\n",
            self.channels.magic(),
            self.width,
            self.height
        );
        let mut out = Vec::with_capacity(header.len() + self.data.len() * 4);
        out.extend_from_slice(header.as_bytes());

        let row_len = self.row_len();
        if row_len > 0 {
            for row in self.data.chunks_exact(row_len).rev() {
                for sample in row {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
        out
    }

    /// Parse PFM bytes of either endianness.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut fields = Vec::with_capacity(4);
        let mut pos = 0;
        // magic, width, height, scale; each ends at a single whitespace byte.
        while fields.len() < 4 {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let start = pos;
            while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if start == pos {
                bail!("truncated PFM header");
            }
            fields.push(std::str::from_utf8(&bytes[start..pos]).context("non-ASCII PFM header")?);
            pos += 1;
        }

        let channels = match fields[0] {
            "Pf" => PfmChannels::Gray,
            "PF" => PfmChannels::Rgb,
            other => bail!("unknown PFM magic {other:?}"),
        };
        let width: u32 = fields[1].parse().context("bad PFM width")?;
        let height: u32 = fields[2].parse().context("bad PFM height")?;
        let scale: f32 = fields[3].parse().context("bad PFM scale")?;
        let little_endian = scale < 0.0;

        let body = bytes.get(pos..).unwrap_or_default();
        let expected = width as usize * height as usize * channels.count();
        ensure!(
            body.len() == expected * 4,
            "PFM body holds {} bytes, expected {}",
            body.len(),
            expected * 4
        );

        let samples: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| {
                let raw = [b[0], b[1], b[2], b[3]];
                if little_endian {
                    f32::from_le_bytes(raw)
                } else {
                    f32::from_be_bytes(raw)
                }
            })
            .collect();

        let row_len = width as usize * channels.count();
        let data = if row_len == 0 {
            samples
        } else {
            samples
                .chunks_exact(row_len)
                .rev()
                .flat_map(|row| row.iter().copied())
                .collect()
        };

        Self::new(width, height, channels, data)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::decode(&bytes).with_context(|| format!("failed to parse {}", path.display()))
    }
}
