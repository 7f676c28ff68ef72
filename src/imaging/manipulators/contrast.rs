use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use tracing::debug;

pub struct Contrast;

impl Contrast {
    fn amount(params: &Params) -> Option<f32> {
        let value = params.get_i64("con")?;
        if !(-100..=100).contains(&value) {
            debug!(con = value, "Contrast out of range");
            return None;
        }
        (value != 0).then_some(value as f32)
    }
}

impl Manipulator for Contrast {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("con")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        if let Some(amount) = Self::amount(params) {
            let adjusted = raster.image().adjust_contrast(amount);
            raster.replace(adjusted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn two_tone() -> RasterBuffer {
        RasterBuffer::new(DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([80, 80, 80])
            } else {
                Rgb([180, 180, 180])
            }
        })))
    }

    fn spread(raster: &RasterBuffer) -> i32 {
        let rgb = raster.image().to_rgb8();
        rgb.get_pixel(1, 0)[0] as i32 - rgb.get_pixel(0, 0)[0] as i32
    }

    #[test]
    fn test_positive_contrast_widens_spread() {
        let mut raster = two_tone();
        Contrast.apply(&mut raster, &Params::from([("con", "50")])).unwrap();
        assert!(spread(&raster) > 100);
    }

    #[test]
    fn test_negative_contrast_narrows_spread() {
        let mut raster = two_tone();
        Contrast.apply(&mut raster, &Params::from([("con", "-50")])).unwrap();
        assert!(spread(&raster) < 100);
    }

    #[test]
    fn test_out_of_range_ignored() {
        assert_eq!(Contrast::amount(&Params::from([("con", "-101")])), None);
        assert_eq!(Contrast::amount(&Params::from([("con", "0")])), None);
    }
}
