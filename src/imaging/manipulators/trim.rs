use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::Rgba;

const DEFAULT_TOLERANCE: u8 = 10;

/// Remove borders that match the top-left pixel within a tolerance.
pub struct Trim;

impl Trim {
    fn tolerance(params: &Params) -> u8 {
        params
            .get_i64("trim")
            .filter(|t| (1..=254).contains(t))
            .map(|t| t as u8)
            .unwrap_or(DEFAULT_TOLERANCE)
    }
}

fn differs(a: &Rgba<u8>, b: &Rgba<u8>, tolerance: u8) -> bool {
    a.0.iter()
        .zip(b.0.iter())
        .any(|(x, y)| x.abs_diff(*y) > tolerance)
}

impl Manipulator for Trim {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("trim")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let tolerance = Self::tolerance(params);
        let rgba = raster.image().to_rgba8();
        let reference = *rgba.get_pixel(0, 0);

        let (width, height) = rgba.dimensions();
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in rgba.enumerate_pixels() {
            if !differs(pixel, &reference, tolerance) {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }

        // A uniform image has nothing left to keep
        let Some((x0, y0, x1, y1)) = bounds else {
            return Ok(());
        };
        let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);
        if (w, h) != (width, height) {
            let trimmed = raster.image().crop_imm(x0, y0, w, h);
            raster.replace(trimmed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn framed(border: [u8; 3]) -> RasterBuffer {
        let image = RgbImage::from_fn(20, 10, |x, y| {
            if (5..15).contains(&x) && (2..8).contains(&y) {
                Rgb([0, 0, 0])
            } else {
                Rgb(border)
            }
        });
        RasterBuffer::new(DynamicImage::ImageRgb8(image))
    }

    #[test]
    fn test_trims_uniform_border() {
        let mut raster = framed([255, 255, 255]);
        Trim.apply(&mut raster, &Params::from([("trim", "")])).unwrap();
        assert_eq!(raster.dimensions(), (10, 6));
    }

    #[test]
    fn test_tolerance_range() {
        assert_eq!(Trim::tolerance(&Params::from([("trim", "")])), 10);
        assert_eq!(Trim::tolerance(&Params::from([("trim", "50")])), 50);
        assert_eq!(Trim::tolerance(&Params::from([("trim", "255")])), 10);
        assert_eq!(Trim::tolerance(&Params::from([("trim", "0")])), 10);
    }

    #[test]
    fn test_high_tolerance_treats_near_colors_as_border() {
        // Content differs from the border by 40 per channel
        let image = RgbImage::from_fn(10, 10, |x, _| if x < 5 { Rgb([100, 100, 100]) } else { Rgb([140, 140, 140]) });
        let mut raster = RasterBuffer::new(DynamicImage::ImageRgb8(image));
        Trim.apply(&mut raster, &Params::from([("trim", "50")])).unwrap();
        assert_eq!(raster.dimensions(), (10, 10));

        Trim.apply(&mut raster, &Params::from([("trim", "30")])).unwrap();
        assert_eq!(raster.dimensions(), (5, 10));
    }

    #[test]
    fn test_uniform_image_untouched() {
        let mut raster = RasterBuffer::new(DynamicImage::ImageRgb8(RgbImage::new(8, 8)));
        Trim.apply(&mut raster, &Params::from([("trim", "")])).unwrap();
        assert_eq!(raster.dimensions(), (8, 8));
    }
}
