//! Output format resolution and encoding.

use super::RasterBuffer;
use crate::error::{Error, Result};
use crate::params::Params;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat, RgbaImage};
use std::borrow::Cow;
use std::io::Cursor;

/// Row passes of an interlaced GIF: (first row, step).
const GIF_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    Tiff,
    WebP,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "tiff" | "tif" => Some(Self::Tiff),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    /// Explicit `output`, then the origin format, then png/jpg by alpha.
    pub fn resolve(params: &Params, raster: &RasterBuffer) -> Self {
        params
            .get("output")
            .and_then(Self::parse)
            .or_else(|| raster.source_format().and_then(Self::from_image_format))
            .unwrap_or(if raster.has_alpha() { Self::Png } else { Self::Jpeg })
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Tiff => "image/tiff",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
        }
    }

    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Tiff => ImageFormat::Tiff,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub format: OutputFormat,
    /// 0..=100, used by JPEG only. WebP output is always lossless.
    pub quality: u8,
    /// `il`: progressive JPEG or interlaced GIF. PNG is always written
    /// non-interlaced.
    pub interlace: bool,
    pub base64: bool,
}

impl EncodeOptions {
    pub fn from_params(params: &Params, raster: &RasterBuffer, default_quality: u8) -> Self {
        Self {
            format: OutputFormat::resolve(params, raster),
            quality: params
                .get_i64("q")
                .filter(|q| (0..=100).contains(q))
                .map(|q| q as u8)
                .unwrap_or(default_quality),
            interlace: params.has("il"),
            base64: params.get("encoding") == Some("base64"),
        }
    }
}

pub fn encode(raster: &RasterBuffer, options: &EncodeOptions) -> Result<Vec<u8>> {
    let image = raster.image();
    let mut buffer = Vec::new();

    match options.format {
        OutputFormat::Jpeg if options.interlace => {
            encode_progressive_jpeg(image, options.quality, &mut buffer)?;
        }
        OutputFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let (width, height) = rgb.dimensions();
            let mut encoder =
                JpegEncoder::new_with_quality(Cursor::new(&mut buffer), options.quality.max(1));
            encoder
                .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| Error::Transform(format!("jpeg encode failed: {}", e)))?;
        }
        OutputFormat::Gif if options.interlace => {
            encode_interlaced_gif(image.to_rgba8(), &mut buffer)?;
        }
        format => {
            let prepared = prepare_for(format, image);
            prepared
                .write_to(&mut Cursor::new(&mut buffer), format.image_format())
                .map_err(|e| {
                    Error::Transform(format!("{} encode failed: {}", format.extension(), e))
                })?;
        }
    }

    Ok(buffer)
}

fn u16_dimension(value: u32, format: &str) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| Error::Transform(format!("{} cannot hold a dimension of {}", format, value)))
}

fn encode_progressive_jpeg(image: &DynamicImage, quality: u8, buffer: &mut Vec<u8>) -> Result<()> {
    let rgb = image.to_rgb8();
    let width = u16_dimension(rgb.width(), "jpeg")?;
    let height = u16_dimension(rgb.height(), "jpeg")?;

    let mut encoder = jpeg_encoder::Encoder::new(buffer, quality.max(1));
    encoder.set_progressive(true);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| Error::Transform(format!("progressive jpeg encode failed: {}", e)))
}

fn encode_interlaced_gif(rgba: RgbaImage, buffer: &mut Vec<u8>) -> Result<()> {
    let width = u16_dimension(rgba.width(), "gif")?;
    let height = u16_dimension(rgba.height(), "gif")?;
    let mut pixels = rgba.into_raw();

    let mut frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, 10);
    frame.interlaced = true;
    frame.buffer = Cow::Owned(interlace_rows(&frame.buffer, usize::from(width), usize::from(height)));

    let mut encoder = gif::Encoder::new(buffer, width, height, &[])
        .map_err(|e| Error::Transform(format!("gif encode failed: {}", e)))?;
    encoder
        .write_frame(&frame)
        .map_err(|e| Error::Transform(format!("gif encode failed: {}", e)))?;
    encoder
        .into_inner()
        .map_err(|e| Error::Transform(format!("gif trailer write failed: {}", e)))?;
    Ok(())
}

/// Reorder indexed rows into GIF interlace pass order.
fn interlace_rows(indices: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len());
    for (start, step) in GIF_PASSES {
        for row in (start..height).step_by(step) {
            out.extend_from_slice(&indices[row * width..(row + 1) * width]);
        }
    }
    out
}

/// Convert to a colour type the target encoder accepts.
fn prepare_for(format: OutputFormat, image: &DynamicImage) -> DynamicImage {
    let has_alpha = image.color().has_alpha();
    match format {
        OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
        OutputFormat::Png | OutputFormat::Tiff => match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_) => image.clone(),
            _ if has_alpha => DynamicImage::ImageRgba8(image.to_rgba8()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        },
        _ if has_alpha => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// `data:` URL for inline embedding.
pub fn to_data_url(bytes: &[u8], format: OutputFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn opaque() -> RasterBuffer {
        RasterBuffer::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10]))))
    }

    fn translucent() -> RasterBuffer {
        RasterBuffer::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            8,
            Rgba([200, 10, 10, 100]),
        )))
    }

    #[test]
    fn test_resolution_order() {
        let raster = opaque().with_source_format(ImageFormat::Gif);
        assert_eq!(
            OutputFormat::resolve(&Params::from([("output", "webp")]), &raster),
            OutputFormat::WebP
        );
        assert_eq!(OutputFormat::resolve(&Params::default(), &raster), OutputFormat::Gif);

        let bmp = opaque().with_source_format(ImageFormat::Bmp);
        assert_eq!(OutputFormat::resolve(&Params::default(), &bmp), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::resolve(&Params::default(), &translucent()), OutputFormat::Png);
    }

    #[test]
    fn test_quality_defaults() {
        let raster = opaque();
        assert_eq!(EncodeOptions::from_params(&Params::default(), &raster, 85).quality, 85);
        assert_eq!(
            EncodeOptions::from_params(&Params::from([("q", "20")]), &raster, 85).quality,
            20
        );
        assert_eq!(
            EncodeOptions::from_params(&Params::from([("q", "101")]), &raster, 85).quality,
            85
        );
    }

    #[test]
    fn test_every_format_round_trips_dimensions() {
        for format in [
            OutputFormat::Jpeg,
            OutputFormat::Png,
            OutputFormat::Gif,
            OutputFormat::Tiff,
            OutputFormat::WebP,
        ] {
            let options = EncodeOptions {
                format,
                quality: 85,
                interlace: false,
                base64: false,
            };
            let bytes = encode(&translucent(), &options).unwrap();
            let decoded = image::load_from_memory_with_format(&bytes, format.image_format()).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (8, 8), "{:?}", format);
        }
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let noisy = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]));
        let raster = RasterBuffer::new(DynamicImage::ImageRgb8(noisy));
        let encode_at = |quality| {
            encode(
                &raster,
                &EncodeOptions {
                    format: OutputFormat::Jpeg,
                    quality,
                    interlace: false,
                    base64: false,
                },
            )
            .unwrap()
            .len()
        };
        assert!(encode_at(10) < encode_at(95));
    }

    fn options(format: OutputFormat, quality: u8, interlace: bool) -> EncodeOptions {
        EncodeOptions {
            format,
            quality,
            interlace,
            base64: false,
        }
    }

    fn has_marker(bytes: &[u8], marker: u8) -> bool {
        bytes.windows(2).any(|pair| pair == [0xFF, marker])
    }

    fn four_bands() -> RgbaImage {
        RgbaImage::from_fn(16, 21, |_, y| match y % 4 {
            0 => Rgba([255, 0, 0, 255]),
            1 => Rgba([0, 255, 0, 255]),
            2 => Rgba([0, 0, 255, 255]),
            _ => Rgba([255, 255, 255, 255]),
        })
    }

    #[test]
    fn test_interlace_writes_progressive_jpeg() {
        let baseline = encode(&opaque(), &options(OutputFormat::Jpeg, 80, false)).unwrap();
        let progressive = encode(&opaque(), &options(OutputFormat::Jpeg, 80, true)).unwrap();

        assert!(has_marker(&baseline, 0xC0));
        assert!(!has_marker(&baseline, 0xC2));
        assert!(has_marker(&progressive, 0xC2));

        let decoded = image::load_from_memory_with_format(&progressive, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_interlaced_gif_keeps_pixels() {
        let raster = RasterBuffer::new(DynamicImage::ImageRgba8(four_bands()));
        let bytes = encode(&raster, &options(OutputFormat::Gif, 85, true)).unwrap();

        let mut decode = gif::DecodeOptions::new();
        decode.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = decode.read_info(Cursor::new(&bytes)).unwrap();
        assert!(decoder.read_next_frame().unwrap().unwrap().interlaced);

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Gif).unwrap();
        assert_eq!(decoded.to_rgba8(), four_bands());
    }

    #[test]
    fn test_interlace_row_order() {
        let rows: Vec<u8> = (0..10).collect();
        assert_eq!(interlace_rows(&rows, 1, 10), vec![0, 8, 4, 2, 6, 1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_png_ignores_interlace() {
        let bytes = encode(&opaque(), &options(OutputFormat::Png, 85, true)).unwrap();
        // IHDR interlace method byte
        assert_eq!(bytes[28], 0);
    }

    #[test]
    fn test_webp_is_lossless_at_any_quality() {
        let raster = RasterBuffer::new(DynamicImage::ImageRgba8(four_bands()));
        let low = encode(&raster, &options(OutputFormat::WebP, 10, false)).unwrap();
        let high = encode(&raster, &options(OutputFormat::WebP, 95, false)).unwrap();
        assert_eq!(low, high);

        let decoded = image::load_from_memory_with_format(&low, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.to_rgba8(), four_bands());
    }

    #[test]
    fn test_data_url() {
        assert_eq!(to_data_url(b"abc", OutputFormat::Png), "data:image/png;base64,YWJj");
    }
}
