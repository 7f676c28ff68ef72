use crate::error::Result;
use crate::imaging::geometry::clamp_rect;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;

/// Explicit `crop=w,h,x,y` after resizing; clamped to the image.
pub struct Crop;

impl Crop {
    fn rect(params: &Params) -> Option<(u32, u32, u32, u32)> {
        let parts: Vec<u32> = params
            .get("crop")?
            .split(',')
            .map(|part| part.trim().parse().ok())
            .collect::<Option<_>>()?;
        match parts[..] {
            [w, h, x, y] if w > 0 && h > 0 => Some((w, h, x, y)),
            _ => None,
        }
    }
}

impl Manipulator for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn applies(&self, params: &Params) -> bool {
        Self::rect(params).is_some()
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let Some(rect) = Self::rect(params) else {
            return Ok(());
        };
        let Some((w, h, x, y)) = clamp_rect(raster.dimensions(), rect) else {
            return Ok(());
        };
        if (w, h) != raster.dimensions() {
            let cropped = raster.image().crop_imm(x, y, w, h);
            raster.replace(cropped);
        }
        Ok(())
    }
}
