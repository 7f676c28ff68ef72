//! Content-aware crop window selection.
//!
//! The window is found by repeatedly shaving a strip off whichever opposing
//! edge carries less information, until the window has the target size.
//! Scoring runs on a copy no larger than [`ANALYSIS_EDGE`] on its long side.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use std::borrow::Cow;

pub const ANALYSIS_EDGE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Shannon entropy of the luminance histogram.
    Entropy,
    /// Edge strength, saturation and skin tone.
    Attention,
}

/// Top-left corner of the most interesting `window` inside `image`.
pub fn find_crop(image: &DynamicImage, window: (u32, u32), strategy: Strategy) -> (u32, u32) {
    let (width, height) = (image.width(), image.height());
    let window = (window.0.min(width), window.1.min(height));
    if window == (width, height) {
        return (0, 0);
    }

    let scale = (ANALYSIS_EDGE as f64 / width.max(height) as f64).min(1.0);
    let scaled = |v: u32, limit: u32| ((v as f64 * scale).round() as u32).clamp(1, limit);
    let sample = if scale < 1.0 {
        let size = (scaled(width, u32::MAX), scaled(height, u32::MAX));
        Cow::Owned(image.resize_exact(size.0, size.1, FilterType::Triangle))
    } else {
        Cow::Borrowed(image)
    };
    let sample_window = (
        scaled(window.0, sample.width()),
        scaled(window.1, sample.height()),
    );

    let (x, y) = search(&sample, sample_window, strategy);
    let unscale = |v: u32, limit: u32| ((v as f64 / scale).round() as u32).min(limit);
    (unscale(x, width - window.0), unscale(y, height - window.1))
}

fn search(image: &DynamicImage, window: (u32, u32), strategy: Strategy) -> (u32, u32) {
    let (width, height) = (image.width(), image.height());
    let scorer: Box<dyn Fn(Rect) -> f64> = match strategy {
        Strategy::Entropy => {
            let luma = image.to_luma8();
            Box::new(move |rect| entropy(&luma, rect))
        }
        Strategy::Attention => {
            let table = SummedArea::new(&attention_map(&image.to_rgb8()), width as usize);
            Box::new(move |rect| table.sum(rect))
        }
    };

    let mut rect = Rect {
        x: 0,
        y: 0,
        w: width,
        h: height,
    };

    while rect.w > window.0 {
        let slice = strip(rect.w, window.0);
        let left = Rect { w: slice, ..rect };
        let right = Rect {
            x: rect.x + rect.w - slice,
            w: slice,
            ..rect
        };
        if scorer(left) < scorer(right) {
            rect.x += slice;
        }
        rect.w -= slice;
    }

    while rect.h > window.1 {
        let slice = strip(rect.h, window.1);
        let top = Rect { h: slice, ..rect };
        let bottom = Rect {
            y: rect.y + rect.h - slice,
            h: slice,
            ..rect
        };
        if scorer(top) < scorer(bottom) {
            rect.y += slice;
        }
        rect.h -= slice;
    }

    (rect.x, rect.y)
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

fn strip(current: u32, target: u32) -> u32 {
    let excess = current - target;
    excess.min((current / 10).max(1))
}

fn entropy(luma: &GrayImage, rect: Rect) -> f64 {
    let mut histogram = [0u32; 256];
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            histogram[luma.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let total = (rect.w * rect.h) as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Row-major interest score per pixel.
fn attention_map(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = rgb.dimensions();
    let luma = |x: u32, y: u32| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
    };

    let mut map = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            let center = luma(x, y);
            let neighbours = [
                luma(x.saturating_sub(1), y),
                luma((x + 1).min(width - 1), y),
                luma(x, y.saturating_sub(1)),
                luma(x, (y + 1).min(height - 1)),
            ];
            let edge = (4.0 * center - neighbours.iter().sum::<f32>()).abs();

            let max = r.max(g).max(b) as f32;
            let min = r.min(g).min(b) as f32;
            let saturation = max - min;

            map.push(edge + saturation * 0.5 + if is_skin(r, g, b) { 128.0 } else { 0.0 });
        }
    }
    map
}

fn is_skin(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    r > 95 && g > 40 && b > 20 && r > g && r > b && (r - g).abs() > 15 && r.max(g).max(b) - r.min(g).min(b) > 15
}

/// Summed-area table for O(1) rectangle sums.
struct SummedArea {
    width: usize,
    sums: Vec<f64>,
}

impl SummedArea {
    fn new(values: &[f32], width: usize) -> Self {
        let height = if width == 0 { 0 } else { values.len() / width };
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];

        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += f64::from(values[y * width + x]);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }

        Self { width, sums }
    }

    fn sum(&self, rect: Rect) -> f64 {
        let stride = self.width + 1;
        let (x0, y0) = (rect.x as usize, rect.y as usize);
        let (x1, y1) = (x0 + rect.w as usize, y0 + rect.h as usize);
        self.sums[y1 * stride + x1] - self.sums[y0 * stride + x1] - self.sums[y1 * stride + x0]
            + self.sums[y0 * stride + x0]
    }
}
