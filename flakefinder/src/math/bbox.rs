//! Axis-aligned bounding boxes for pixel regions.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in tile pixel coordinates.
///
/// Uses inclusive bounds: a pixel at (x, y) is inside if
/// `x_min <= x <= x_max` and `y_min <= y <= y_max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aabb {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl Aabb {
    #[inline]
    pub const fn new(x_min: usize, x_max: usize, y_min: usize, y_max: usize) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Empty box with inverted bounds, ready for [`Aabb::include`].
    #[inline]
    pub const fn empty() -> Self {
        Self {
            x_min: usize::MAX,
            x_max: 0,
            y_min: usize::MAX,
            y_max: 0,
        }
    }

    #[inline]
    pub fn include(&mut self, x: usize, y: usize) {
        self.x_min = self.x_min.min(x);
        self.x_max = self.x_max.max(x);
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
    }

    #[inline]
    pub const fn width(&self) -> usize {
        self.x_max.saturating_sub(self.x_min) + 1
    }

    #[inline]
    pub const fn height(&self) -> usize {
        self.y_max.saturating_sub(self.y_min) + 1
    }

    #[inline]
    pub const fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// True when the box comes closer than `margin` pixels to any image edge.
    ///
    /// With `margin == 1` a box touching the outermost pixel row or column is
    /// near the border. Detection configs reject `margin == 0`.
    #[inline]
    pub fn near_border(&self, width: usize, height: usize, margin: usize) -> bool {
        self.x_min < margin
            || self.y_min < margin
            || self.x_max + margin >= width
            || self.y_max + margin >= height
    }

    /// Shifts the box into the global frame.
    #[inline]
    pub fn translate(&self, dx: i64, dy: i64) -> GlobalBox {
        GlobalBox {
            x_min: self.x_min as i64 + dx,
            x_max: self.x_max as i64 + dx,
            y_min: self.y_min as i64 + dy,
            y_max: self.y_max as i64 + dy,
        }
    }
}

/// Inclusive bounding box in the global (stitched) pixel frame. Coordinates
/// may be negative when a tile is placed left of or above the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalBox {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl GlobalBox {
    #[inline]
    pub const fn width(&self) -> i64 {
        self.x_max - self.x_min + 1
    }

    #[inline]
    pub const fn height(&self) -> i64 {
        self.y_max - self.y_min + 1
    }

    #[inline]
    pub const fn area(&self) -> i64 {
        self.width() * self.height()
    }

    pub fn intersection(&self, other: &GlobalBox) -> Option<GlobalBox> {
        let b = GlobalBox {
            x_min: self.x_min.max(other.x_min),
            x_max: self.x_max.min(other.x_max),
            y_min: self.y_min.max(other.y_min),
            y_max: self.y_max.min(other.y_max),
        };
        (b.x_min <= b.x_max && b.y_min <= b.y_max).then_some(b)
    }

    pub fn union(&self, other: &GlobalBox) -> GlobalBox {
        GlobalBox {
            x_min: self.x_min.min(other.x_min),
            x_max: self.x_max.max(other.x_max),
            y_min: self.y_min.min(other.y_min),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Intersection over union of the two boxes' pixel areas.
    pub fn iou(&self, other: &GlobalBox) -> f64 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter = inter.area() as f64;
        let union = (self.area() + other.area()) as f64 - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}
