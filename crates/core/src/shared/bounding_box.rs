/// Axis-aligned face box in input-image pixel coordinates.
///
/// Coordinates are not integer-aligned. `x1 <= x2` and `y1 <= y2` hold for
/// every box the cascade produces; a violation indicates a bug upstream
/// (see [`BoundingBox::is_well_formed`]).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x1 + 0.5 * self.width(),
            self.y1 + 0.5 * self.height(),
        )
    }

    /// Area under the pixel-inclusive convention: `(x2-x1+1)*(y2-y1+1)`.
    pub fn pixel_area(&self) -> f32 {
        (self.width() + 1.0) * (self.height() + 1.0)
    }

    pub fn is_well_formed(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }

    /// Intersection-over-union using the pixel-inclusive area convention.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1 + 1.0).max(0.0) * (iy2 - iy1 + 1.0).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.pixel_area() + other.pixel_area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Grow the box by `margin` pixels on every side.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            x1: self.x1 - margin,
            y1: self.y1 - margin,
            x2: self.x2 + margin,
            y2: self.y2 + margin,
        }
    }

    /// Clip the box to `[0, width] x [0, height]`.
    pub fn clamped(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }

    /// Relative crop coordinates in `(y1/h, x1/w, y2/h, x2/w)` order.
    pub fn to_normalized(&self, image_width: f32, image_height: f32) -> [f32; 4] {
        [
            self.y1 / image_height,
            self.x1 / image_width,
            self.y2 / image_height,
            self.x2 / image_width,
        ]
    }
}

/// Per-coordinate offsets relative to the box's own width/height.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RegressionDelta {
    pub dx1: f32,
    pub dy1: f32,
    pub dx2: f32,
    pub dy2: f32,
}

impl RegressionDelta {
    pub const ZERO: RegressionDelta = RegressionDelta {
        dx1: 0.0,
        dy1: 0.0,
        dx2: 0.0,
        dy2: 0.0,
    };

    pub fn new(dx1: f32, dy1: f32, dx2: f32, dy2: f32) -> Self {
        Self { dx1, dy1, dx2, dy2 }
    }
}
