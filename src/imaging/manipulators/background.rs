use crate::error::Result;
use crate::imaging::color::Color;
use crate::imaging::encode::OutputFormat;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::{DynamicImage, Rgba, RgbaImage};

/// Composite a transparent raster over a solid colour. Always runs for an
/// opaque output format (white unless `bg` says otherwise); for formats that
/// keep alpha only when `bg` is given.
pub struct Background;

fn over(pixel: &Rgba<u8>, color: Color) -> Rgba<u8> {
    let alpha = pixel[3] as f32 / 255.0;
    let backdrop_alpha = color.a as f32 / 255.0;
    let out_alpha = alpha + backdrop_alpha * (1.0 - alpha);
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let blend = |front: u8, back: u8| {
        let value = (front as f32 * alpha + back as f32 * backdrop_alpha * (1.0 - alpha)) / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        blend(pixel[0], color.r),
        blend(pixel[1], color.g),
        blend(pixel[2], color.b),
        (out_alpha * 255.0).round() as u8,
    ])
}

fn composite(raster: &RasterBuffer, color: Color) -> RgbaImage {
    let mut rgba = raster.image().to_rgba8();
    for pixel in rgba.pixels_mut() {
        *pixel = over(pixel, color);
    }
    rgba
}

impl Manipulator for Background {
    fn name(&self) -> &'static str {
        "background"
    }

    fn applies(&self, _params: &Params) -> bool {
        true
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        if !raster.has_alpha() {
            return Ok(());
        }
        let requested = params.get("bg").and_then(Color::parse);
        let output = OutputFormat::resolve(params, raster);

        let flattened = if !output.supports_alpha() {
            let color = requested.map(Color::opaque).unwrap_or(Color::WHITE);
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(composite(raster, color)).to_rgb8())
        } else if let Some(color) = requested {
            let rgba = composite(raster, color);
            if color.is_opaque() {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
            } else {
                DynamicImage::ImageRgba8(rgba)
            }
        } else {
            return Ok(());
        };
        raster.replace(flattened);
        Ok(())
    }
}
