// THEORY:
// Integer pixel geometry shared by the detector and the tracker. Rectangles are
// stored the way contour bounding boxes come out of the detector: top-left
// corner plus width and height, all in whole pixels. Centroids are truncated to
// integers so that every consumer (illumination lookup, distance, bearing)
// agrees on the same pixel.

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance, kept integral to avoid rounding at thresholds.
    pub fn distance_squared(&self, other: &Point) -> i64 {
        let dx = (other.x - self.x) as i64;
        let dy = (other.y - self.y) as i64;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }
}

/// An axis-aligned rectangle in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// The centroid, truncated towards the top-left pixel.
    pub fn center(&self) -> Point {
        Point::new(
            (self.x as f64 + self.width as f64 / 2.0) as i32,
            (self.y as f64 + self.height as f64 / 2.0) as i32,
        )
    }

    /// True when the two rectangles share at least one pixel. Touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.x >= other.right()
            || other.x >= self.right()
            || self.y >= other.bottom()
            || other.y >= self.bottom())
    }

    /// Strict interior test: a point on the border is outside.
    pub fn contains_strictly(&self, point: &Point) -> bool {
        point.x > self.x && point.x < self.right() && point.y > self.y && point.y < self.bottom()
    }

    /// True when this rectangle lies completely within `width` x `height` image bounds.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && self.right() as i64 <= width as i64
            && self.bottom() as i64 <= height as i64
    }

    /// Pads the rectangle by half its size on every side and clamps the result to
    /// the image. The left edge rounds outwards, the top edge inwards.
    pub fn expanded_crop(&self, image_width: u32, image_height: u32) -> Rect {
        let mut x = self.x - (self.width + 1) / 2;
        let mut y = self.y - self.height / 2;
        let mut width = self.width * 2;
        let mut height = self.height * 2;

        if x < 0 {
            x = 0;
        }
        if x + width > image_width as i32 {
            width = image_width as i32 - x;
        }
        if y < 0 {
            y = 0;
        }
        if y + height > image_height as i32 {
            height = image_height as i32 - y;
        }
        Rect::new(x, y, width, height)
    }
}

/// Bearing in degrees from `from` to `to`, measured with `atan2(dy, dx)`.
/// Movements shorter than 10 pixels have no meaningful heading and yield `None`.
pub fn bearing(from: &Point, to: &Point) -> Option<f64> {
    if from.distance_squared(to) < 100 {
        return None;
    }
    let dx = (to.x - from.x) as f64;
    let dy = (to.y - from.y) as f64;
    Some(dy.atan2(dx).to_degrees())
}

/// Wraps an angular difference into `[-180, 180]`.
pub fn normalize_angle(mut degrees: f64) -> f64 {
    if degrees < -180.0 {
        degrees += 360.0;
    } else if degrees > 180.0 {
        degrees -= 360.0;
    }
    degrees
}
