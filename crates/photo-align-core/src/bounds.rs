use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in reference pixel coordinates.
///
/// `x_max`/`y_max` are exclusive, so a `w × h` image is `(0, 0, w, h)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BoundingRect {
    pub fn new(x_min: i64, y_min: i64, x_max: i64, y_max: i64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Full extent of a `width × height` image.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width as i64, height as i64)
    }

    /// Largest integer rectangle inside the axis-aligned box around `pts`.
    ///
    /// Minimums round up and maximums round down, so the rectangle never
    /// includes a partially covered pixel. Returns `None` for an empty slice
    /// or non-finite points.
    pub fn circumscribing(pts: &[Point2<f64>]) -> Option<Self> {
        if pts.is_empty() || pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return None;
        }
        let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
        let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in pts {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        // Absorb float noise from the projection before rounding inward.
        const SNAP: f64 = 1e-6;
        Some(Self::new(
            (x0 - SNAP).ceil() as i64,
            (y0 - SNAP).ceil() as i64,
            (x1 + SNAP).floor() as i64,
            (y1 + SNAP).floor() as i64,
        ))
    }

    /// Component-wise intersection. Never larger than either input.
    pub fn intersect(&self, other: &BoundingRect) -> BoundingRect {
        BoundingRect::new(
            self.x_min.max(other.x_min),
            self.y_min.max(other.y_min),
            self.x_max.min(other.x_max),
            self.y_max.min(other.y_max),
        )
    }

    /// Width, zero when the rectangle is empty.
    #[inline]
    pub fn width(&self) -> usize {
        (self.x_max - self.x_min).max(0) as usize
    }

    /// Height, zero when the rectangle is empty.
    #[inline]
    pub fn height(&self) -> usize {
        (self.y_max - self.y_min).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, other: &BoundingRect) -> bool {
        other.x_min >= self.x_min
            && other.y_min >= self.y_min
            && other.x_max <= self.x_max
            && other.y_max <= self.y_max
    }
}
