use super::manipulators::{
    Background, Blur, Brightness, Contrast, Crop, Filter, Gamma, Letterbox, Orientation, ShapeMask,
    Sharpen, Thumbnail, Trim,
};
use super::RasterBuffer;
use crate::config::ImageConfig;
use crate::error::Result;
use crate::params::Params;
use std::sync::Arc;
use tracing::debug;

/// One pipeline stage. Stages hold configuration only, never request state,
/// so a single instance serves every request concurrently.
pub trait Manipulator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the request asks for this stage at all.
    fn applies(&self, params: &Params) -> bool;

    /// Mutate the raster in place. Parameters the stage cannot use are
    /// ignored rather than reported.
    fn apply(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()>;
}

/// Fixed ordered list of stages, built once at start-up.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Box<dyn Manipulator>]>,
}

impl Pipeline {
    /// The canonical stage order. Orientation is normalised before any crop
    /// geometry, and resizing happens before the shape mask is cut.
    pub fn standard(config: &ImageConfig) -> Self {
        let stages: Vec<Box<dyn Manipulator>> = vec![
            Box::new(Trim),
            Box::new(Thumbnail::new(config.max_pixels)),
            Box::new(Orientation),
            Box::new(Crop),
            Box::new(Letterbox),
            Box::new(ShapeMask),
            Box::new(Brightness),
            Box::new(Contrast),
            Box::new(Gamma),
            Box::new(Sharpen),
            Box::new(Filter),
            Box::new(Blur),
            Box::new(Background),
        ];
        Self {
            stages: stages.into(),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&self, raster: &mut RasterBuffer, params: &Params) -> Result<()> {
        for stage in self.stages.iter() {
            if !stage.applies(params) {
                continue;
            }
            stage.apply(raster, params)?;
            debug!(
                stage = stage.name(),
                width = raster.width(),
                height = raster.height(),
                "Applied manipulator"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_stage_order() {
        let pipeline = Pipeline::standard(&ImageConfig::default());
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "trim",
                "thumbnail",
                "orientation",
                "crop",
                "letterbox",
                "shape",
                "brightness",
                "contrast",
                "gamma",
                "sharpen",
                "filter",
                "blur",
                "background",
            ]
        );
    }

    #[test]
    fn test_no_op_params_keep_pixels() {
        let pipeline = Pipeline::standard(&ImageConfig::default());
        let source = gradient(40, 30);
        let mut raster = RasterBuffer::new(source.clone());

        pipeline
            .run(&mut raster, &Params::from([("url", "example.com/a.jpg")]))
            .unwrap();
        assert_eq!(raster.image(), &source);
    }

    #[test]
    fn test_out_of_range_values_are_no_ops() {
        let pipeline = Pipeline::standard(&ImageConfig::default());
        let source = gradient(20, 20);
        let mut raster = RasterBuffer::new(source.clone());

        let params = Params::from([
            ("bri", "500"),
            ("con", "-101"),
            ("gam", "0.5"),
            ("blur", "0"),
            ("sharp", "-1,2"),
            ("filt", "vintage"),
            ("crop", "10,10"),
            ("shape", "octagon"),
            ("or", "sideways"),
        ]);
        pipeline.run(&mut raster, &params).unwrap();
        assert_eq!(raster.image(), &source);
    }

    #[test]
    fn test_square_resize_then_shape() {
        let pipeline = Pipeline::standard(&ImageConfig::default());
        let mut raster = RasterBuffer::new(gradient(1000, 600));
        let params = Params::from([("w", "300"), ("h", "300"), ("t", "square"), ("shape", "circle")]);

        pipeline.run(&mut raster, &params).unwrap();
        assert_eq!(raster.dimensions(), (300, 300));
        assert!(raster.has_alpha());
        assert_eq!(raster.image().to_rgba8().get_pixel(0, 0)[3], 0);
    }
}
