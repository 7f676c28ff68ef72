//! Shape masks for the `shape=` stage.
//!
//! Every shape is described as a closed outline in a unit box and rasterised
//! with 4x4 supersampling, so mask edges are anti-aliased.

use image::{GrayImage, Luma};
use std::f64::consts::PI;

const SUPERSAMPLE: u32 = 4;
const HEART_SEGMENTS: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Circle,
    Ellipse,
    Triangle,
    Triangle180,
    Pentagon,
    Pentagon180,
    Hexagon,
    /// Square tilted 45 degrees.
    Square,
    Star,
    Heart,
}

impl Shape {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "circle" => Some(Self::Circle),
            "ellipse" => Some(Self::Ellipse),
            "triangle" => Some(Self::Triangle),
            "triangle-180" => Some(Self::Triangle180),
            "pentagon" => Some(Self::Pentagon),
            "pentagon-180" => Some(Self::Pentagon180),
            "hexagon" => Some(Self::Hexagon),
            "square" => Some(Self::Square),
            "star" => Some(Self::Star),
            "heart" => Some(Self::Heart),
            _ => None,
        }
    }

    /// Coverage mask of the shape fitted into `width` x `height`.
    pub fn mask(self, width: u32, height: u32) -> GrayImage {
        let outline = self.outline(width as f64, height as f64);
        let samples = (SUPERSAMPLE * SUPERSAMPLE) as f64;

        GrayImage::from_fn(width, height, |x, y| {
            let mut hits = 0u32;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let px = x as f64 + (sx as f64 + 0.5) / SUPERSAMPLE as f64;
                    let py = y as f64 + (sy as f64 + 0.5) / SUPERSAMPLE as f64;
                    if outline.contains(px, py) {
                        hits += 1;
                    }
                }
            }
            Luma([((hits as f64 / samples) * 255.0).round() as u8])
        })
    }

    fn outline(self, width: f64, height: f64) -> Outline {
        let (cx, cy) = (width / 2.0, height / 2.0);
        let radius = width.min(height) / 2.0;

        match self {
            Self::Circle => Outline::Ellipse {
                cx,
                cy,
                rx: radius,
                ry: radius,
            },
            Self::Ellipse => Outline::Ellipse {
                cx,
                cy,
                rx: cx,
                ry: cy,
            },
            Self::Triangle => Outline::Polygon(regular(3, cx, cy, radius, -PI / 2.0)),
            Self::Triangle180 => Outline::Polygon(regular(3, cx, cy, radius, PI / 2.0)),
            Self::Pentagon => Outline::Polygon(regular(5, cx, cy, radius, -PI / 2.0)),
            Self::Pentagon180 => Outline::Polygon(regular(5, cx, cy, radius, PI / 2.0)),
            Self::Hexagon => Outline::Polygon(regular(6, cx, cy, radius, 0.0)),
            Self::Square => Outline::Polygon(regular(4, cx, cy, radius, -PI / 2.0)),
            Self::Star => Outline::Polygon(star(cx, cy, radius, radius * 0.382)),
            Self::Heart => Outline::Polygon(heart(cx, cy, radius)),
        }
    }
}

enum Outline {
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
    Polygon(Vec<(f64, f64)>),
}

impl Outline {
    fn contains(&self, x: f64, y: f64) -> bool {
        match self {
            Outline::Ellipse { cx, cy, rx, ry } => {
                let dx = (x - cx) / rx;
                let dy = (y - cy) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Outline::Polygon(points) => point_in_polygon(points, x, y),
        }
    }
}

fn regular(sides: usize, cx: f64, cy: f64, radius: f64, start: f64) -> Vec<(f64, f64)> {
    (0..sides)
        .map(|i| {
            let angle = start + 2.0 * PI * i as f64 / sides as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

fn star(cx: f64, cy: f64, outer: f64, inner: f64) -> Vec<(f64, f64)> {
    (0..10)
        .map(|i| {
            let angle = -PI / 2.0 + PI * i as f64 / 5.0;
            let r = if i % 2 == 0 { outer } else { inner };
            (cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect()
}

/// Classic parametric heart, scaled into the inscribed square.
fn heart(cx: f64, cy: f64, radius: f64) -> Vec<(f64, f64)> {
    // The curve spans x in [-16, 16] and y in [-17, 12]
    let scale = radius / 16.5;
    (0..HEART_SEGMENTS)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / HEART_SEGMENTS as f64;
            let x = 16.0 * t.sin().powi(3);
            let y = 13.0 * t.cos() - 5.0 * (2.0 * t).cos() - 2.0 * (3.0 * t).cos() - (4.0 * t).cos();
            (cx + x * scale, cy - (y + 2.5) * scale)
        })
        .collect()
}

fn point_in_polygon(points: &[(f64, f64)], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = points[i];
        let (xj, yj) = points[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
