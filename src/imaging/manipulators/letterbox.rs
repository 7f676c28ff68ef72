use crate::error::Result;
use crate::imaging::color::Color;
use crate::imaging::geometry::{requested_box, FitMode};
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::{imageops, DynamicImage, RgbaImage};

/// Pad a `t=letterbox` result to the exact requested box with `bg`.
pub struct Letterbox;

impl Manipulator for Letterbox {
    fn name(&self) -> &'static str {
        "letterbox"
    }

    fn applies(&self, params: &Params) -> bool {
        FitMode::from_params(params) == FitMode::Letterbox
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        let Some((width, height)) = requested_box(params, FitMode::Letterbox) else {
            return Ok(());
        };
        let (current_w, current_h) = raster.dimensions();
        // Each axis pads on its own; an axis already past the box is kept
        let target = (
            width.unwrap_or(current_w).max(current_w),
            height.unwrap_or(current_h).max(current_h),
        );
        if target == (current_w, current_h) {
            return Ok(());
        }

        let color = params
            .get("bg")
            .and_then(Color::parse)
            .unwrap_or(Color::TRANSPARENT);

        let mut canvas = RgbaImage::from_pixel(target.0, target.1, color.to_rgba());
        let x = (target.0 - current_w) / 2;
        let y = (target.1 - current_h) / 2;
        imageops::overlay(&mut canvas, &raster.image().to_rgba8(), x as i64, y as i64);

        let padded = if color.is_opaque() && !raster.has_alpha() {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
        } else {
            DynamicImage::ImageRgba8(canvas)
        };
        raster.replace(padded);
        Ok(())
    }
}
