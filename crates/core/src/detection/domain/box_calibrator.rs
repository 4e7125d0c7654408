use crate::shared::bounding_box::{BoundingBox, RegressionDelta};

/// Shift each edge by its delta times the box's pixel-inclusive size.
pub fn adjust(bbox: &BoundingBox, delta: &RegressionDelta) -> BoundingBox {
    let w = bbox.width() + 1.0;
    let h = bbox.height() + 1.0;
    BoundingBox {
        x1: bbox.x1 + delta.dx1 * w,
        y1: bbox.y1 + delta.dy1 * h,
        x2: bbox.x2 + delta.dx2 * w,
        y2: bbox.y2 + delta.dy2 * h,
    }
}

/// Grow the shorter side so the box becomes square around the same center.
pub fn square(bbox: &BoundingBox) -> BoundingBox {
    let w = bbox.width();
    let h = bbox.height();
    let l = w.max(h);

    let x1 = bbox.x1 + 0.5 * w - 0.5 * l;
    let y1 = bbox.y1 + 0.5 * h - 0.5 * l;
    BoundingBox {
        x1,
        y1,
        x2: x1 + l,
        y2: y1 + l,
    }
}

/// [`adjust`], then [`square`] when the next stage needs a square crop.
pub fn calibrate(bbox: &BoundingBox, delta: &RegressionDelta, squared: bool) -> BoundingBox {
    let adjusted = adjust(bbox, delta);
    if squared {
        square(&adjusted)
    } else {
        adjusted
    }
}
