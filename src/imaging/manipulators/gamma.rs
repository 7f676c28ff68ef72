use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use tracing::debug;

/// Gamma correction; `gam` in 1.0..=3.0 brightens midtones.
pub struct Gamma;

impl Gamma {
    fn value(params: &Params) -> Option<f32> {
        let gamma = params.get_f32("gam")?;
        if !(1.0..=3.0).contains(&gamma) {
            debug!(gam = gamma, "Gamma out of range");
            return None;
        }
        Some(gamma)
    }
}

impl Manipulator for Gamma {
    fn name(&self) -> &'static str {
        "gamma"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("gam")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let Some(gamma) = Self::value(params) else {
            return Ok(());
        };
        // 1.0 is the identity curve
        if gamma == 1.0 {
            return Ok(());
        }
        let exponent = 1.0 / gamma;
        raster.map_color_samples(|sample| {
            (255.0 * (sample as f32 / 255.0).powf(exponent)).round() as u8
        });
        Ok(())
    }
}
