use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use tracing::debug;

pub struct Brightness;

impl Brightness {
    /// -100..=100 mapped onto a sample offset of -255..=255.
    fn offset(params: &Params) -> Option<i32> {
        let value = params.get_i64("bri")?;
        if !(-100..=100).contains(&value) {
            debug!(bri = value, "Brightness out of range");
            return None;
        }
        Some((value as f32 * 2.55).round() as i32).filter(|offset| *offset != 0)
    }
}

impl Manipulator for Brightness {
    fn name(&self) -> &'static str {
        "brightness"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("bri")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        if let Some(offset) = Self::offset(params) {
            let brightened = raster.image().brighten(offset);
            raster.replace(brightened);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::raster::tests::solid_rgb;

    #[test]
    fn test_brighten_and_darken() {
        let mut raster = RasterBuffer::new(solid_rgb(4, 4, [100, 100, 100]));
        Brightness.apply(&mut raster, &Params::from([("bri", "20")])).unwrap();
        assert_eq!(raster.image().to_rgb8().get_pixel(0, 0).0, [151, 151, 151]);

        Brightness.apply(&mut raster, &Params::from([("bri", "-100")])).unwrap();
        assert_eq!(raster.image().to_rgb8().get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_out_of_range_ignored() {
        assert_eq!(Brightness::offset(&Params::from([("bri", "101")])), None);
        assert_eq!(Brightness::offset(&Params::from([("bri", "0")])), None);
        assert_eq!(Brightness::offset(&Params::from([("bri", "bright")])), None);
    }
}
