use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect<T> {
    pub x: T,
    pub y: T,
    pub width: T,
    pub height: T,
}

impl<T> Rect<T> {
    pub const fn new(x: T, y: T, width: T, height: T) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

impl Rect<f32> {
    pub const ZERO: Rect<f32> = Rect::new(0.0, 0.0, 0.0, 0.0);

    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Rect::new(origin.x, origin.y, size.x, size.y)
    }

    /// Smallest rectangle containing both corners.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Rect::from_origin_size(min, max - min)
    }

    /// Axis-aligned bounding box of a point set. Empty input yields [`Rect::ZERO`].
    pub fn bounding(points: &[Vec2]) -> Self {
        let Some(first) = points.first() else {
            return Rect::ZERO;
        };
        let (min, max) = points
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Rect::from_corners(min, max)
    }

    pub fn origin(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn min(&self) -> Vec2 {
        self.origin()
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Vec2 {
        self.origin() + self.size() * 0.5
    }

    /// The four corners in counter-clockwise order starting at the origin.
    pub fn corners(&self) -> [Vec2; 4] {
        let min = self.min();
        let max = self.max();
        [
            min,
            Vec2::new(max.x, min.y),
            max,
            Vec2::new(min.x, max.y),
        ]
    }

    pub fn contains(&self, point: Vec2) -> bool {
        let min = self.min();
        let max = self.max();
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }

    /// Overlap of the two rectangles.
    ///
    /// Disjoint rectangles produce a zero-area rectangle rather than one with
    /// a negative width or height.
    pub fn intersect(&self, other: &Rect<f32>) -> Rect<f32> {
        let min = self.min().max(other.min());
        let max = self.max().min(other.max());
        let size = (max - min).max(Vec2::ZERO);
        Rect::from_origin_size(min, size)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}
