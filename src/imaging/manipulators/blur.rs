use crate::error::Result;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use tracing::debug;

/// Gaussian blur, `blur` is the sigma in (0, 100].
pub struct Blur;

impl Blur {
    fn sigma(params: &Params) -> Option<f32> {
        let sigma = params.get_f32("blur")?;
        if sigma <= 0.0 || sigma > 100.0 {
            debug!(blur = sigma, "Blur out of range");
            return None;
        }
        Some(sigma)
    }
}

impl Manipulator for Blur {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("blur")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        if let Some(sigma) = Self::sigma(params) {
            let blurred = raster.image().blur(sigma);
            raster.replace(blurred);
        }
        Ok(())
    }
}
