use crate::error::{Error, Result};
use crate::imaging::geometry::{
    focal_offset, gravity_offset, plan_resize, requested_box, Alignment, FitMode,
};
use crate::imaging::smartcrop::{self, Strategy};
use crate::imaging::{Manipulator, RasterBuffer};
use crate::params::Params;
use image::imageops::FilterType;

/// Resize to the requested box according to the fit mode.
pub struct Thumbnail {
    max_pixels: u64,
}

impl Thumbnail {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Manipulator for Thumbnail {
    fn name(&self) -> &'static str {
        "thumbnail"
    }

    fn applies(&self, params: &Params) -> bool {
        params.has("w") || params.has("h")
    }

    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        // Geometry is computed on the upright image
        raster.apply_embedded_orientation();

        let fit = FitMode::from_params(params);
        let Some(target) = requested_box(params, fit) else {
            return Ok(());
        };

        let plan = plan_resize(raster.dimensions(), target, fit);
        let (width, height) = plan.resize;
        if width as u64 * height as u64 > self.max_pixels {
            return Err(Error::ImageTooLarge {
                width,
                height,
                max_pixels: self.max_pixels,
            });
        }

        if plan.resize != raster.dimensions() {
            let resized = raster
                .image()
                .resize_exact(width, height, FilterType::Lanczos3);
            raster.replace(resized);
        }

        if let Some(window) = plan.crop {
            let image = raster.image();
            let extent = (image.width(), image.height());
            let (x, y) = match Alignment::from_params(params) {
                Alignment::Gravity(gravity) => gravity_offset(extent, window, gravity),
                Alignment::Focal { x, y } => focal_offset(extent, window, x, y),
                Alignment::Entropy => smartcrop::find_crop(image, window, Strategy::Entropy),
                Alignment::Attention => smartcrop::find_crop(image, window, Strategy::Attention),
            };
            let cropped = image.crop_imm(x, y, window.0, window.1);
            raster.replace(cropped);
        }

        Ok(())
    }
}
