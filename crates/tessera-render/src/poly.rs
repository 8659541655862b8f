//! Pre-tessellated polygon input.

use tessera_core::geometry::Rect;
use tessera_core::math::Vec2;

/// Vertex positions plus an index list.
///
/// The batch does not tessellate. Filled draws read the indices as
/// triangles and outlines read them as line segments, so a shape meant for
/// both carries two `Poly2`s (see [`Poly2::from_rect`] and
/// [`Poly2::rect_outline`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poly2 {
    vertices: Vec<Vec2>,
    indices: Vec<u32>,
}

impl Poly2 {
    pub fn new(vertices: Vec<Vec2>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Two triangles covering `rect`.
    pub fn from_rect(rect: Rect<f32>) -> Self {
        Self {
            vertices: rect.corners().to_vec(),
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// The four edges of `rect` as line segments.
    pub fn rect_outline(rect: Rect<f32>) -> Self {
        Self {
            vertices: rect.corners().to_vec(),
            indices: vec![0, 1, 1, 2, 2, 3, 3, 0],
        }
    }

    /// Triangle fan over a convex outline.
    pub fn convex_fan(points: &[Vec2]) -> Self {
        let count = points.len() as u32;
        let indices = (1..count.saturating_sub(1))
            .flat_map(|i| [0, i, i + 1])
            .collect();
        Self {
            vertices: points.to_vec(),
            indices,
        }
    }

    /// Line segments along `points`, optionally closing the loop.
    pub fn path(points: &[Vec2], closed: bool) -> Self {
        let count = points.len() as u32;
        let mut indices: Vec<u32> = (1..count).flat_map(|i| [i - 1, i]).collect();
        if closed && count > 2 {
            indices.extend([count - 1, 0]);
        }
        Self {
            vertices: points.to_vec(),
            indices,
        }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Axis-aligned bounds of the vertices.
    pub fn bounds(&self) -> Rect<f32> {
        Rect::bounding(&self.vertices)
    }
}
