use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::DynamicImage;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Greyscale,
    Sepia,
    Negate,
}

impl Effect {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "greyscale" => Some(Self::Greyscale),
            "sepia" => Some(Self::Sepia),
            "negate" => Some(Self::Negate),
            _ => None,
        }
    }
}

/// Colour effect selected by `filt`.
pub struct Filter;

impl Manipulator for Filter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("filt")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let Some(effect) = params.get("filt").and_then(Effect::parse) else {
            debug!(filt = ?params.get("filt"), "Ignoring unknown filter");
            return Ok(());
        };

        match effect {
            Effect::Greyscale => {
                let grey = raster.image().grayscale();
                raster.replace(grey);
            }
            Effect::Sepia => sepia(raster),
            Effect::Negate => raster.map_color_samples(|sample| 255 - sample),
        }
        Ok(())
    }
}

fn sepia(raster: &mut RasterBuffer) {
    raster.normalize_rgb8();
    let tone = |r: f32, g: f32, b: f32| {
        [
            (0.393 * r + 0.769 * g + 0.189 * b).min(255.0) as u8,
            (0.349 * r + 0.686 * g + 0.168 * b).min(255.0) as u8,
            (0.272 * r + 0.534 * g + 0.131 * b).min(255.0) as u8,
        ]
    };
    match raster.image_mut() {
        DynamicImage::ImageRgb8(rgb) => {
            for pixel in rgb.pixels_mut() {
                let [r, g, b] = pixel.0.map(f32::from);
                pixel.0 = tone(r, g, b);
            }
        }
        DynamicImage::ImageRgba8(rgba) => {
            for pixel in rgba.pixels_mut() {
                let [r, g, b, a] = pixel.0;
                let [r, g, b] = tone(r as f32, g as f32, b as f32);
                pixel.0 = [r, g, b, a];
            }
        }
        _ => {}
    }
}
