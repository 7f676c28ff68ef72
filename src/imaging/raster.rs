//! Decoded image plus the metadata the pipeline and encoder need.

use crate::config::ImageConfig;
use crate::error::{Error, Result};
use image::codecs::gif::GifDecoder;
use image::metadata::Orientation;
use image::{
    AnimationDecoder, ColorType, DynamicImage, ImageDecoder, ImageError, ImageFormat, ImageReader,
    Limits,
};
use std::io::Cursor;

/// Bytes per pixel allowed for decode allocations (16-bit RGBA).
const MAX_BYTES_PER_PIXEL: u64 = 8;

/// One request's raster. Owned exclusively by the request that decoded it.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    image: DynamicImage,
    source_format: Option<ImageFormat>,
    orientation: Orientation,
    icc_profile: Option<Vec<u8>>,
    page: u32,
}

impl RasterBuffer {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            source_format: None,
            orientation: Orientation::NoTransforms,
            icc_profile: None,
            page: 0,
        }
    }

    pub fn with_source_format(mut self, format: ImageFormat) -> Self {
        self.source_format = Some(format);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Decode `bytes`, enforcing the configured pixel ceilings before any
    /// pixel data is allocated.
    pub fn decode(bytes: &[u8], page: u32, config: &ImageConfig) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| Error::InvalidImage(e.to_string()))?;

        let format = reader
            .format()
            .ok_or_else(|| Error::InvalidImage("unrecognised image format".to_string()))?;

        if format == ImageFormat::Gif && page > 0 {
            return Self::decode_gif_frame(bytes, page, config);
        }

        let mut reader = reader;
        reader.limits(decode_limits(config));

        let mut decoder = reader.into_decoder().map_err(classify_header_error)?;
        let (width, height) = decoder.dimensions();
        check_dimensions(width, height, config)?;

        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let icc_profile = decoder.icc_profile().ok().flatten();

        let image = DynamicImage::from_decoder(decoder)
            .map_err(|e| Error::ImageNotReadable(e.to_string()))?;

        Ok(Self {
            image,
            source_format: Some(format),
            orientation,
            icc_profile,
            page: 0,
        })
    }

    fn decode_gif_frame(bytes: &[u8], page: u32, config: &ImageConfig) -> Result<Self> {
        let mut decoder = GifDecoder::new(Cursor::new(bytes)).map_err(classify_header_error)?;
        decoder
            .set_limits(decode_limits(config))
            .map_err(classify_header_error)?;
        let (width, height) = decoder.dimensions();
        check_dimensions(width, height, config)?;

        let frame = decoder
            .into_frames()
            .nth(page as usize)
            .ok_or_else(|| Error::ImageNotReadable(format!("page {} does not exist", page)))?
            .map_err(|e| Error::ImageNotReadable(e.to_string()))?;

        Ok(Self {
            image: DynamicImage::ImageRgba8(frame.into_buffer()),
            source_format: Some(ImageFormat::Gif),
            orientation: Orientation::NoTransforms,
            icc_profile: None,
            page,
        })
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut DynamicImage {
        &mut self.image
    }

    pub fn replace(&mut self, image: DynamicImage) {
        self.image = image;
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    pub fn channel_count(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Bake the embedded orientation into the pixels. Runs at most once:
    /// the tag is reset afterwards.
    pub fn apply_embedded_orientation(&mut self) {
        let orientation = std::mem::replace(&mut self.orientation, Orientation::NoTransforms);
        if orientation != Orientation::NoTransforms {
            self.image.apply_orientation(orientation);
        }
    }

    /// Narrow the raster to 8 bits per channel, keeping alpha if present.
    pub fn normalize_8bit(&mut self) {
        let narrowed = match self.image.color() {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => return,
            ColorType::L16 => DynamicImage::ImageLuma8(self.image.to_luma8()),
            ColorType::La16 => DynamicImage::ImageLumaA8(self.image.to_luma_alpha8()),
            _ if self.has_alpha() => DynamicImage::ImageRgba8(self.image.to_rgba8()),
            _ => DynamicImage::ImageRgb8(self.image.to_rgb8()),
        };
        self.image = narrowed;
    }

    /// Narrow to 8-bit RGB(A), expanding greyscale.
    pub fn normalize_rgb8(&mut self) {
        let converted = match self.image.color() {
            ColorType::Rgb8 | ColorType::Rgba8 => return,
            _ if self.has_alpha() => DynamicImage::ImageRgba8(self.image.to_rgba8()),
            _ => DynamicImage::ImageRgb8(self.image.to_rgb8()),
        };
        self.image = converted;
    }

    /// Apply `f` to every colour sample of an 8-bit raster; alpha is left alone.
    pub fn map_color_samples(&mut self, f: impl Fn(u8) -> u8) {
        let mut lut = [0u8; 256];
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = f(i as u8);
        }

        self.normalize_8bit();
        let has_alpha = self.has_alpha();
        let channels = self.channel_count() as usize;
        let samples: &mut [u8] = match &mut self.image {
            DynamicImage::ImageLuma8(img) => &mut **img,
            DynamicImage::ImageLumaA8(img) => &mut **img,
            DynamicImage::ImageRgb8(img) => &mut **img,
            DynamicImage::ImageRgba8(img) => &mut **img,
            _ => return,
        };

        for pixel in samples.chunks_exact_mut(channels) {
            let color_channels = if has_alpha { channels - 1 } else { channels };
            for sample in &mut pixel[..color_channels] {
                *sample = lut[*sample as usize];
            }
        }
    }
}

fn decode_limits(config: &ImageConfig) -> Limits {
    let mut limits = Limits::default();
    limits.max_alloc = Some(config.max_pixels.saturating_mul(MAX_BYTES_PER_PIXEL));
    limits
}

fn check_dimensions(width: u32, height: u32, config: &ImageConfig) -> Result<()> {
    let pixels = width as u64 * height as u64;
    if width > config.max_dimension || height > config.max_dimension || pixels > config.max_pixels {
        return Err(Error::ImageTooLarge {
            width,
            height,
            max_pixels: config.max_pixels,
        });
    }
    if width == 0 || height == 0 {
        return Err(Error::ImageNotReadable("image has no pixels".to_string()));
    }
    Ok(())
}

fn classify_header_error(error: ImageError) -> Error {
    match error {
        ImageError::Limits(e) => Error::ImageNotReadable(e.to_string()),
        ImageError::IoError(e) => Error::ImageNotReadable(e.to_string()),
        other => Error::InvalidImage(other.to_string()),
    }
}
