use image::{Rgba, RgbaImage};
use std::sync::Arc;

/// Bytes per pixel for RGBA raster data
pub const RASTER_BPP: u32 = 4;

/// A single decoded frame's pixel data at one resolution.
///
/// The buffer is an immutable snapshot behind an `Arc`; cloning a raster is
/// cheap and never aliases mutable state.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Raw RGBA data (shared ownership for efficiency)
    data: Arc<Vec<u8>>,
}

impl Raster {
    /// Create a new raster from raw RGBA bytes
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::new(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Validate the buffer length against the declared dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == (self.width * self.height * RASTER_BPP) as usize
    }

    /// Check that two rasters are comparable pixel-for-pixel
    pub fn dimensions_match(&self, other: &Raster) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Scalar luminance of one pixel on a 0-255 scale.
    ///
    /// The caller must keep `x`/`y` inside the raster bounds.
    #[inline]
    pub fn luminance(&self, x: u32, y: u32) -> f64 {
        let index = ((y * self.width + x) * RASTER_BPP) as usize;
        0.299 * self.data[index] as f64
            + 0.587 * self.data[index + 1] as f64
            + 0.114 * self.data[index + 2] as f64
    }
}

/// Supplies raw frames to the detection loop on demand.
///
/// The engine never pulls frames faster than its own tick-rate limit.
pub trait FrameSource {
    /// Whether a decoded frame is currently available
    fn is_ready(&self) -> bool;

    /// The current raw frame, at arbitrary resolution
    fn current_frame(&mut self) -> Option<Raster>;
}

/// Downscales source frames to the working resolution used for comparison.
pub struct FrameSampler {
    downscale: u32,
}

impl FrameSampler {
    /// Create a sampler with the given integer downscale factor (minimum 1)
    pub fn new(downscale: u32) -> Self {
        Self {
            downscale: downscale.max(1),
        }
    }

    /// Produce the working raster for one source frame.
    ///
    /// Each output pixel is the box average of the corresponding
    /// `downscale`x`downscale` source block, so identical input always yields
    /// identical output. A factor of 1 is an identity copy.
    pub fn sample(&self, source: &Raster) -> Raster {
        debug_assert!(source.validate_size());

        if self.downscale == 1 {
            return source.clone();
        }

        let out_width = (source.width / self.downscale).max(1);
        let out_height = (source.height / self.downscale).max(1);
        let mut output = RgbaImage::new(out_width, out_height);
        let data = source.data();
        let block = self.downscale;
        let samples = block * block;

        for y in 0..out_height {
            for x in 0..out_width {
                let mut sum = [0u32; 4];
                for by in 0..block {
                    for bx in 0..block {
                        let sx = (x * block + bx).min(source.width - 1);
                        let sy = (y * block + by).min(source.height - 1);
                        let index = ((sy * source.width + sx) * RASTER_BPP) as usize;
                        sum[0] += data[index] as u32;
                        sum[1] += data[index + 1] as u32;
                        sum[2] += data[index + 2] as u32;
                        sum[3] += data[index + 3] as u32;
                    }
                }
                output.put_pixel(
                    x,
                    y,
                    Rgba([
                        (sum[0] / samples) as u8,
                        (sum[1] / samples) as u8,
                        (sum[2] / samples) as u8,
                        (sum[3] / samples) as u8,
                    ]),
                );
            }
        }

        Raster::new(out_width, out_height, output.into_raw())
    }
}
