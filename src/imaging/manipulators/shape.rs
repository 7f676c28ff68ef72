use crate::error::Result;
use crate::imaging::mask::Shape;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::DynamicImage;
use tracing::debug;

/// Cut the raster to a shape by multiplying alpha with its mask.
/// `strim` then drops the fully transparent margin.
pub struct ShapeMask;

impl Manipulator for ShapeMask {
    fn name(&self) -> &'static str {
        "shape"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("shape")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let Some(shape) = params.get("shape").and_then(Shape::parse) else {
            debug!(shape = ?params.get("shape"), "Ignoring unknown shape");
            return Ok(());
        };

        let (width, height) = raster.dimensions();
        let mask = shape.mask(width, height);
        let mut rgba = raster.image().to_rgba8();
        for (pixel, coverage) in rgba.pixels_mut().zip(mask.pixels()) {
            pixel[3] = ((pixel[3] as u16 * coverage[0] as u16 + 127) / 255) as u8;
        }

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        if params.has("strim") {
            for (x, y, pixel) in rgba.enumerate_pixels() {
                if pixel[3] == 0 {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        let masked = DynamicImage::ImageRgba8(rgba);
        let masked = match bounds {
            Some((x0, y0, x1, y1)) => masked.crop_imm(x0, y0, x1 - x0 + 1, y1 - y0 + 1),
            None => masked,
        };
        raster.replace(masked);
        Ok(())
    }
}
