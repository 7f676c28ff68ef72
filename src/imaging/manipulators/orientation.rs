use crate::error::Result;
use crate::imaging::geometry::normalize_angle;
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;

/// `or=auto` (default) honours the embedded tag; an explicit angle is
/// snapped to a quarter turn and applied clockwise on the upright image.
pub struct Orientation;

impl Manipulator for Orientation {
    fn name(&self) -> &'static str {
        "orientation"
    }

    fn applies(&self, _params: &Params) -> bool {
        true
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        raster.apply_embedded_orientation();

        let angle = match params.get("or") {
            None | Some("auto") => return Ok(()),
            Some(_) => match params.get_i64("or") {
                Some(angle) => normalize_angle(angle),
                None => return Ok(()),
            },
        };

        let rotated = match angle {
            90 => raster.image().rotate90(),
            180 => raster.image().rotate180(),
            270 => raster.image().rotate270(),
            _ => return Ok(()),
        };
        raster.replace(rotated);
        Ok(())
    }
}
