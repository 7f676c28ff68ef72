use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::{imageops, DynamicImage, ImageBuffer, Pixel};
use tracing::debug;

const DEFAULT_FLAT: f32 = 1.0;
const DEFAULT_JAGGED: f32 = 2.0;
const DEFAULT_RADIUS: f32 = 1.0;
/// Differences below this count as flat area.
const FLAT_THRESHOLD: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Amounts {
    flat: f32,
    jagged: f32,
    radius: f32,
}

/// Unsharp mask with separate gains for flat and jagged areas (`sharp=f,j,r`).
pub struct Sharpen;

impl Sharpen {
    fn amounts(params: &Params) -> Option<Amounts> {
        let raw = params.get("sharp")?;
        let mut values = [DEFAULT_FLAT, DEFAULT_JAGGED, DEFAULT_RADIUS];
        for (slot, part) in values.iter_mut().zip(raw.split(',')) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            *slot = part.parse::<f32>().ok().filter(|v| v.is_finite())?;
        }
        if values.iter().any(|v| *v < 0.0) || values[2] == 0.0 {
            debug!(sharp = raw, "Rejecting sharpen parameters");
            return None;
        }
        Some(Amounts {
            flat: values[0],
            jagged: values[1],
            radius: values[2],
        })
    }
}

fn unsharp<P>(source: &ImageBuffer<P, Vec<u8>>, amounts: Amounts) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let blurred = imageops::blur(source, amounts.radius);
    let color_channels = if P::HAS_ALPHA {
        P::CHANNEL_COUNT as usize - 1
    } else {
        P::CHANNEL_COUNT as usize
    };

    let mut output = source.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let soft = blurred.get_pixel(x, y).channels();
        for (channel, sample) in pixel.channels_mut()[..color_channels].iter_mut().enumerate() {
            let diff = *sample as f32 - soft[channel] as f32;
            let gain = if diff.abs() < FLAT_THRESHOLD {
                amounts.flat
            } else {
                amounts.jagged
            };
            *sample = (*sample as f32 + gain * diff).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

impl Manipulator for Sharpen {
    fn name(&self) -> &'static str {
        "sharpen"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("sharp")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let Some(amounts) = Self::amounts(params) else {
            return Ok(());
        };

        raster.normalize_rgb8();
        let sharpened = match raster.image() {
            DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(unsharp(rgb, amounts)),
            DynamicImage::ImageRgba8(rgba) => DynamicImage::ImageRgba8(unsharp(rgba, amounts)),
            _ => return Ok(()),
        };
        raster.replace(sharpened);
        Ok(())
    }
}
