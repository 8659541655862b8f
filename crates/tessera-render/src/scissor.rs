//! Feathered, transformable scissor masks.

use tessera_core::geometry::Rect;
use tessera_core::math::{Affine2, Vec2, affine2_to_padded_mat3, inverse_or_zero};

/// Number of floats in [`Scissor::data`].
pub const SCISSOR_FLOATS: usize = 16;

/// A rectangle in its own local space, placed by `transform`, outside of
/// which fragments fade out over `fringe` units.
///
/// The mask keeps two derived matrices in sync with `transform` and
/// `bounds`: the primary transform (transform with the origin moved to the
/// center of `bounds`) and its inverse, which is what the shader uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scissor {
    transform: Affine2,
    bounds: Rect<f32>,
    fringe: f32,
    primary: Affine2,
    inverse: Affine2,
}

impl Scissor {
    pub fn new(bounds: Rect<f32>, fringe: f32) -> Self {
        Self::with_transform(bounds, Affine2::IDENTITY, fringe)
    }

    pub fn with_transform(bounds: Rect<f32>, transform: Affine2, fringe: f32) -> Self {
        let mut scissor = Self {
            transform,
            bounds,
            fringe,
            primary: Affine2::IDENTITY,
            inverse: Affine2::IDENTITY,
        };
        scissor.recompute();
        scissor
    }

    pub fn set(&mut self, bounds: Rect<f32>, fringe: f32) {
        self.set_transformed(bounds, Affine2::IDENTITY, fringe);
    }

    pub fn set_transformed(&mut self, bounds: Rect<f32>, transform: Affine2, fringe: f32) {
        self.bounds = bounds;
        self.transform = transform;
        self.fringe = fringe;
        self.recompute();
    }

    pub fn bounds(&self) -> Rect<f32> {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Rect<f32>) {
        self.bounds = bounds;
        self.recompute();
    }

    pub fn transform(&self) -> Affine2 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Affine2) {
        self.transform = transform;
        self.recompute();
    }

    pub fn fringe(&self) -> f32 {
        self.fringe
    }

    pub fn set_fringe(&mut self, fringe: f32) {
        self.fringe = fringe;
    }

    /// The transform with its origin at the center of the bounds.
    pub fn primary_transform(&self) -> Affine2 {
        self.primary
    }

    pub fn inverse_transform(&self) -> Affine2 {
        self.inverse
    }

    pub fn translate(&mut self, offset: Vec2) -> &mut Self {
        self.apply(Affine2::from_translation(offset))
    }

    pub fn rotate(&mut self, angle: f32) -> &mut Self {
        self.apply(Affine2::from_angle(angle))
    }

    pub fn scale(&mut self, scale: Vec2) -> &mut Self {
        self.apply(Affine2::from_scale(scale))
    }

    pub fn multiply(&mut self, transform: &Affine2) -> &mut Self {
        self.apply(*transform)
    }

    /// Shrink this mask to its overlap with `other`.
    ///
    /// The bounds of `other` are carried into this mask's frame and replaced
    /// by their axis-aligned bounding box before intersecting, so the result
    /// is exact only when both masks share the same rotation. Disjoint masks
    /// leave a zero-area mask.
    pub fn intersect(&mut self, other: &Scissor) -> &mut Self {
        let relative = inverse_or_zero(&self.transform) * other.transform;
        let corners = other
            .bounds
            .corners()
            .map(|corner| relative.transform_point2(corner));
        let other_bounds = Rect::bounding(&corners);

        self.bounds = self.bounds.intersect(&other_bounds);
        self.recompute();
        self
    }

    /// Whether `point` lies inside the hard edge of the mask.
    pub fn contains(&self, point: Vec2) -> bool {
        let local = self.inverse.transform_point2(point).abs();
        let half = self.bounds.size() * 0.5;
        local.x <= half.x && local.y <= half.y
    }

    /// Uniform block layout: padded 3x3 inverse (12), half extent (2),
    /// fringe scale (2).
    ///
    /// The fringe scale is the length of each column of the primary transform
    /// divided by the fringe, so a scaled mask also scales its feather. A
    /// fringe of zero gives a hard edge.
    pub fn data(&self) -> [f32; SCISSOR_FLOATS] {
        let mut out = [0.0; SCISSOR_FLOATS];
        out[0..12].copy_from_slice(&affine2_to_padded_mat3(&self.inverse));

        let half = self.bounds.size() * 0.5;
        out[12] = half.x;
        out[13] = half.y;

        let m = self.primary.matrix2;
        let fringe = self.fringe.max(f32::EPSILON);
        out[14] = m.x_axis.length() / fringe;
        out[15] = m.y_axis.length() / fringe;
        out
    }

    fn apply(&mut self, op: Affine2) -> &mut Self {
        self.transform = op * self.transform;
        self.recompute();
        self
    }

    fn recompute(&mut self) {
        self.primary = self.transform * Affine2::from_translation(self.bounds.center());
        self.inverse = inverse_or_zero(&self.primary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_intersection_keeps_bounds() {
        let bounds = Rect::new(10.0, 20.0, 100.0, 50.0);
        let mut scissor =
            Scissor::with_transform(bounds, Affine2::from_translation(Vec2::new(5.0, 5.0)), 1.0);
        let other = scissor;
        scissor.intersect(&other);
        assert_eq!(scissor.bounds(), bounds);
    }

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let mut a = Scissor::new(Rect::new(0.0, 0.0, 10.0, 10.0), 1.0);
        let b = Scissor::new(Rect::new(20.0, 20.0, 10.0, 10.0), 1.0);
        a.intersect(&b);
        assert!(a.bounds().is_empty());
        assert!(a.bounds().width >= 0.0 && a.bounds().height >= 0.0);
    }

    #[test]
    fn test_intersection_in_local_frame() {
        let mut a = Scissor::with_transform(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Affine2::from_translation(Vec2::new(100.0, 0.0)),
            1.0,
        );
        let b = Scissor::new(Rect::new(105.0, 0.0, 10.0, 10.0), 1.0);
        a.intersect(&b);
        assert_eq!(a.bounds(), Rect::new(5.0, 0.0, 5.0, 10.0));
    }

    #[test]
    fn test_caches_follow_setters() {
        let mut scissor = Scissor::new(Rect::new(0.0, 0.0, 4.0, 2.0), 1.0);
        assert_eq!(scissor.primary_transform().translation, Vec2::new(2.0, 1.0));

        scissor.translate(Vec2::new(1.0, 1.0));
        assert_eq!(scissor.primary_transform().translation, Vec2::new(3.0, 2.0));
        assert!(scissor.contains(Vec2::new(1.5, 1.5)));
        assert!(!scissor.contains(Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn test_data_layout() {
        let data = Scissor::new(Rect::new(0.0, 0.0, 4.0, 2.0), 2.0).data();
        assert_eq!(&data[12..14], &[2.0, 1.0]);
        assert_eq!(&data[14..16], &[0.5, 0.5]);
        assert_eq!(&data[8..10], &[-2.0, -1.0]);
    }

    #[test]
    fn test_fringe_scale_follows_columns() {
        let transform = Affine2::from_angle(std::f32::consts::FRAC_PI_2)
            * Affine2::from_scale(Vec2::new(2.0, 1.0));
        let data = Scissor::with_transform(Rect::new(0.0, 0.0, 4.0, 2.0), transform, 1.0).data();
        assert!((data[14] - 2.0).abs() < 1e-5, "{:?}", &data[14..16]);
        assert!((data[15] - 1.0).abs() < 1e-5, "{:?}", &data[14..16]);
    }
}
