//! Pure dimension math for resizing and alignment.
//!
//! Nothing here touches pixels, so every rule is unit testable.

use crate::params::Params;

/// How source aspect ratio maps to the requested box (`t=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    #[default]
    Fit,
    FitUp,
    Square,
    SquareDown,
    Absolute,
    Letterbox,
}

impl FitMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fit" => Some(Self::Fit),
            "fitup" => Some(Self::FitUp),
            "square" => Some(Self::Square),
            "squaredown" => Some(Self::SquareDown),
            "absolute" => Some(Self::Absolute),
            "letterbox" => Some(Self::Letterbox),
            _ => None,
        }
    }

    pub fn from_params(params: &Params) -> Self {
        params.get("t").and_then(Self::parse).unwrap_or_default()
    }

    pub fn is_square(self) -> bool {
        matches!(self, Self::Square | Self::SquareDown)
    }

    fn allows_upscale(self) -> bool {
        matches!(self, Self::FitUp | Self::Square | Self::Absolute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Where a fill crop is taken from (`a=`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    Gravity(Gravity),
    /// Focal point in percent of the resized image.
    Focal { x: f32, y: f32 },
    Entropy,
    Attention,
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::Gravity(Gravity::Center)
    }
}

impl Alignment {
    pub fn parse(value: &str) -> Option<Self> {
        let gravity = match value {
            "center" | "centre" => Gravity::Center,
            "top" | "t" => Gravity::Top,
            "bottom" | "b" => Gravity::Bottom,
            "left" | "l" => Gravity::Left,
            "right" | "r" => Gravity::Right,
            "top-left" | "tl" => Gravity::TopLeft,
            "top-right" | "tr" => Gravity::TopRight,
            "bottom-left" | "bl" => Gravity::BottomLeft,
            "bottom-right" | "br" => Gravity::BottomRight,
            "entropy" => return Some(Self::Entropy),
            "attention" => return Some(Self::Attention),
            other => return Self::parse_focal(other),
        };
        Some(Self::Gravity(gravity))
    }

    /// `crop-X-Y`, both offsets percentages in 0..=100.
    fn parse_focal(value: &str) -> Option<Self> {
        let rest = value.strip_prefix("crop-")?;
        let (x, y) = rest.split_once('-')?;
        let x: f32 = x.trim_end_matches('%').parse().ok()?;
        let y: f32 = y.trim_end_matches('%').parse().ok()?;
        let in_range = |v: f32| (0.0..=100.0).contains(&v);
        (in_range(x) && in_range(y)).then_some(Self::Focal { x, y })
    }

    pub fn from_params(params: &Params) -> Self {
        params.get("a").and_then(Self::parse).unwrap_or_default()
    }
}

/// Requested box after applying the device pixel ratio. Either side may be
/// absent; square modes borrow the missing side from the given one.
pub fn requested_box(params: &Params, fit: FitMode) -> Option<(Option<u32>, Option<u32>)> {
    let dpr = params.dpr();
    let scale = |v: u32| ((v as f32 * dpr).round() as u32).max(1);

    let mut width = params.dimension("w").map(scale);
    let mut height = params.dimension("h").map(scale);

    if width.is_none() && height.is_none() {
        return None;
    }

    if fit.is_square() {
        width = width.or(height);
        height = height.or(width);
    }

    Some((width, height))
}

/// Resize target plus the crop window taken from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub resize: (u32, u32),
    pub crop: Option<(u32, u32)>,
    /// Aspect ratio is not preserved.
    pub exact: bool,
}

pub fn plan_resize(source: (u32, u32), target: (Option<u32>, Option<u32>), fit: FitMode) -> ResizePlan {
    let (src_w, src_h) = source;
    let sw = src_w as f64;
    let sh = src_h as f64;

    match fit {
        FitMode::Absolute => {
            let (w, h) = match target {
                (Some(w), Some(h)) => (w, h),
                (Some(w), None) => (w, scale_side(sh, w as f64 / sw)),
                (None, Some(h)) => (scale_side(sw, h as f64 / sh), h),
                (None, None) => source,
            };
            ResizePlan {
                resize: (w, h),
                crop: None,
                exact: true,
            }
        }
        FitMode::Square | FitMode::SquareDown => {
            let (tw, th) = match target {
                (Some(w), Some(h)) => (w, h),
                (Some(side), None) | (None, Some(side)) => (side, side),
                (None, None) => source,
            };
            let mut factor = (tw as f64 / sw).max(th as f64 / sh);
            if factor > 1.0 && !fit.allows_upscale() {
                factor = 1.0;
            }
            let resize = (
                scale_side(sw, factor).max(tw.min(src_w).max(1)),
                scale_side(sh, factor).max(th.min(src_h).max(1)),
            );
            let crop = (tw.min(resize.0), th.min(resize.1));
            ResizePlan {
                resize,
                crop: (crop != resize).then_some(crop),
                exact: false,
            }
        }
        FitMode::Fit | FitMode::FitUp | FitMode::Letterbox => {
            let factor = match target {
                (Some(w), Some(h)) => (w as f64 / sw).min(h as f64 / sh),
                (Some(w), None) => w as f64 / sw,
                (None, Some(h)) => h as f64 / sh,
                (None, None) => 1.0,
            };
            let factor = if factor > 1.0 && !fit.allows_upscale() {
                1.0
            } else {
                factor
            };
            ResizePlan {
                resize: (scale_side(sw, factor), scale_side(sh, factor)),
                crop: None,
                exact: false,
            }
        }
    }
}

fn scale_side(side: f64, factor: f64) -> u32 {
    ((side * factor).round() as u32).max(1)
}

/// Top-left corner of a `window` placed inside `image` by gravity.
pub fn gravity_offset(image: (u32, u32), window: (u32, u32), gravity: Gravity) -> (u32, u32) {
    let spare_x = image.0.saturating_sub(window.0);
    let spare_y = image.1.saturating_sub(window.1);
    let (cx, cy) = (spare_x / 2, spare_y / 2);

    match gravity {
        Gravity::Center => (cx, cy),
        Gravity::Top => (cx, 0),
        Gravity::Bottom => (cx, spare_y),
        Gravity::Left => (0, cy),
        Gravity::Right => (spare_x, cy),
        Gravity::TopLeft => (0, 0),
        Gravity::TopRight => (spare_x, 0),
        Gravity::BottomLeft => (0, spare_y),
        Gravity::BottomRight => (spare_x, spare_y),
    }
}

/// Top-left corner of a `window` centred on a focal point, clamped to the image.
pub fn focal_offset(image: (u32, u32), window: (u32, u32), x_pct: f32, y_pct: f32) -> (u32, u32) {
    let place = |extent: u32, size: u32, pct: f32| -> u32 {
        let spare = extent.saturating_sub(size);
        let centre = extent as f64 * pct as f64 / 100.0;
        let start = (centre - size as f64 / 2.0).round();
        start.clamp(0.0, spare as f64) as u32
    };
    (
        place(image.0, window.0, x_pct),
        place(image.1, window.1, y_pct),
    )
}

/// Clamp an explicit `w,h,x,y` rectangle to the image. `None` when nothing
/// of it lies inside.
pub fn clamp_rect(image: (u32, u32), rect: (u32, u32, u32, u32)) -> Option<(u32, u32, u32, u32)> {
    let (w, h, x, y) = rect;
    if x >= image.0 || y >= image.1 || w == 0 || h == 0 {
        return None;
    }
    Some((w.min(image.0 - x), h.min(image.1 - y), x, y))
}

/// Normalise an angle in degrees to the nearest of 0/90/180/270.
pub fn normalize_angle(angle: i64) -> u32 {
    let wrapped = angle.rem_euclid(360) as f64;
    ((wrapped / 90.0).round() as u32 * 90) % 360
}
