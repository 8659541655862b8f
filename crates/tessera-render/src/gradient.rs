//! Paint gradients evaluated in the sprite fragment shader.
//!
//! A gradient is a feathered rounded box in its own local space. The shader
//! maps each fragment's gradient coordinate through [`Gradient::inverse`],
//! measures the signed distance to the box, and mixes between the inner and
//! outer color across `feather` units. Linear and radial gradients are both
//! expressed as boxes: a linear gradient is a huge box whose edge crosses the
//! start-end line, a radial gradient is a box rounded into a circle.
//!
//! Shapes receive gradient coordinates normalised to their local bounds, so
//! gradient geometry is given in the unit square with `(0, 0)` at the
//! bottom-left of the shape.

use tessera_core::geometry::Rect;
use tessera_core::math::{Affine2, Vec2, affine2_to_mat3, affine2_to_padded_mat3, inverse_or_zero};

use crate::Color;

/// Half-size of the box used to emulate an unbounded linear gradient.
const LINEAR_EXTENT: f32 = 1e5;

/// Number of floats in [`Gradient::data`].
pub const GRADIENT_FLOATS: usize = 24;

/// Number of floats in [`Gradient::compact_data`].
pub const GRADIENT_COMPACT_FLOATS: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gradient {
    inverse: Affine2,
    inner: Color,
    outer: Color,
    extent: Vec2,
    radius: f32,
    feather: f32,
}

impl Gradient {
    /// A degenerate gradient that paints a single color.
    pub fn solid(color: Color) -> Self {
        Self {
            inverse: Affine2::IDENTITY,
            inner: color,
            outer: color,
            extent: Vec2::ZERO,
            radius: 0.0,
            feather: 0.0,
        }
    }

    /// Linear gradient from `inner` at `start` to `outer` at `end`.
    pub fn linear(start: Vec2, end: Vec2, inner: Color, outer: Color) -> Self {
        let mut gradient = Self::solid(inner);
        gradient.set_linear(start, end, inner, outer);
        gradient
    }

    /// Radial gradient that is `inner` inside `inner_radius` and `outer`
    /// beyond `outer_radius`.
    pub fn radial(
        center: Vec2,
        inner_radius: f32,
        outer_radius: f32,
        inner: Color,
        outer: Color,
    ) -> Self {
        let mut gradient = Self::solid(inner);
        gradient.set_radial(center, inner_radius, outer_radius, inner, outer);
        gradient
    }

    /// Radial gradient fading from the center out to `radius`.
    pub fn radial_simple(center: Vec2, radius: f32, inner: Color, outer: Color) -> Self {
        Self::radial(center, 0.0, radius, inner, outer)
    }

    /// Rounded-rectangle gradient: `inner` inside `rect`, fading to `outer`
    /// over `feather` units across the (rounded) border.
    pub fn box_gradient(rect: Rect<f32>, radius: f32, feather: f32, inner: Color, outer: Color) -> Self {
        let mut gradient = Self::solid(inner);
        gradient.set_box(rect, radius, feather, inner, outer);
        gradient
    }

    pub fn set_solid(&mut self, color: Color) {
        *self = Self::solid(color);
    }

    pub fn set_linear(&mut self, start: Vec2, end: Vec2, inner: Color, outer: Color) {
        let delta = end - start;
        let length = delta.length();
        let dir = if length > 1e-4 { delta / length } else { Vec2::Y };

        let forward = Affine2::from_cols(
            Vec2::new(dir.y, -dir.x),
            Vec2::new(dir.x, dir.y),
            start - dir * LINEAR_EXTENT,
        );

        self.inverse = inverse_or_zero(&forward);
        self.inner = inner;
        self.outer = outer;
        self.extent = Vec2::new(LINEAR_EXTENT, LINEAR_EXTENT + length * 0.5);
        self.radius = 0.0;
        self.feather = length;
    }

    pub fn set_radial(
        &mut self,
        center: Vec2,
        inner_radius: f32,
        outer_radius: f32,
        inner: Color,
        outer: Color,
    ) {
        let r = (inner_radius + outer_radius) * 0.5;

        self.inverse = Affine2::from_translation(-center);
        self.inner = inner;
        self.outer = outer;
        self.extent = Vec2::splat(r);
        self.radius = r;
        self.feather = outer_radius - inner_radius;
    }

    pub fn set_box(&mut self, rect: Rect<f32>, radius: f32, feather: f32, inner: Color, outer: Color) {
        self.inverse = Affine2::from_translation(-rect.center());
        self.inner = inner;
        self.outer = outer;
        self.extent = rect.size() * 0.5;
        self.radius = radius;
        self.feather = feather;
    }

    pub fn inner_color(&self) -> Color {
        self.inner
    }

    pub fn set_inner_color(&mut self, color: Color) {
        self.inner = color;
    }

    pub fn outer_color(&self) -> Color {
        self.outer
    }

    pub fn set_outer_color(&mut self, color: Color) {
        self.outer = color;
    }

    /// Half-width and half-height of the gradient box.
    pub fn extent(&self) -> Vec2 {
        self.extent
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn feather(&self) -> f32 {
        self.feather
    }

    /// Map from shape gradient coordinates into gradient space.
    pub fn inverse(&self) -> Affine2 {
        self.inverse
    }

    /// Map from gradient space into shape gradient coordinates.
    pub fn transform(&self) -> Affine2 {
        inverse_or_zero(&self.inverse)
    }

    pub fn set_transform(&mut self, transform: &Affine2) {
        self.inverse = inverse_or_zero(transform);
    }

    /// Rotate the gradient by `angle` radians in its own frame.
    pub fn rotate(&mut self, angle: f32) -> &mut Self {
        self.inverse = Affine2::from_angle(-angle) * self.inverse;
        self
    }

    /// Scale the gradient in its own frame.
    ///
    /// A zero factor collapses the gradient to its boundary color.
    pub fn scale(&mut self, scale: Vec2) -> &mut Self {
        let recip = |s: f32| if s == 0.0 { 0.0 } else { 1.0 / s };
        let inverse_scale = Vec2::new(recip(scale.x), recip(scale.y));
        self.inverse = Affine2::from_scale(inverse_scale) * self.inverse;
        self
    }

    pub fn translate(&mut self, offset: Vec2) -> &mut Self {
        self.inverse = Affine2::from_translation(-offset) * self.inverse;
        self
    }

    /// Compose `transform` into the gradient's frame.
    pub fn multiply(&mut self, transform: &Affine2) -> &mut Self {
        self.inverse = inverse_or_zero(transform) * self.inverse;
        self
    }

    /// Uniform block layout: padded 3x3 inverse (12), inner color (4),
    /// outer color (4), extent (2), radius, feather.
    pub fn data(&self) -> [f32; GRADIENT_FLOATS] {
        let mut out = [0.0; GRADIENT_FLOATS];
        out[0..12].copy_from_slice(&affine2_to_padded_mat3(&self.inverse));
        self.write_paint(&mut out[12..]);
        out
    }

    /// As [`data`](Self::data) with an unpadded 3x3 inverse.
    pub fn compact_data(&self) -> [f32; GRADIENT_COMPACT_FLOATS] {
        let mut out = [0.0; GRADIENT_COMPACT_FLOATS];
        out[0..9].copy_from_slice(&affine2_to_mat3(&self.inverse));
        self.write_paint(&mut out[9..]);
        out
    }

    fn write_paint(&self, out: &mut [f32]) {
        out[0..4].copy_from_slice(&self.inner.to_array());
        out[4..8].copy_from_slice(&self.outer.to_array());
        out[8] = self.extent.x;
        out[9] = self.extent.y;
        out[10] = self.radius;
        out[11] = self.feather;
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::solid(Color::WHITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-3
    }

    #[test]
    fn test_solid_data() {
        let data = Gradient::solid(Color::RED).data();
        assert_eq!(&data[12..16], &Color::RED.to_array());
        assert_eq!(&data[16..20], &Color::RED.to_array());
        assert_eq!(data[23], 0.0);
        assert_eq!(&data[0..12], &affine2_to_padded_mat3(&Affine2::IDENTITY));
    }

    #[test]
    fn test_compact_matches_full() {
        let g = Gradient::radial(Vec2::new(0.5, 0.5), 0.1, 0.4, Color::RED, Color::BLUE);
        let full = g.data();
        let compact = g.compact_data();
        assert_eq!(&compact[9..], &full[12..]);
        assert_eq!(compact[6], full[8]);
        assert_eq!(compact[7], full[9]);
    }

    #[test]
    fn test_scale_zero_is_zero_matrix() {
        let mut g = Gradient::linear(Vec2::ZERO, Vec2::X, Color::WHITE, Color::BLACK);
        g.scale(Vec2::ZERO);
        assert_eq!(g.inverse(), Affine2::ZERO);
        assert!(g.data()[0..12].iter().enumerate().all(|(i, v)| i == 10 || *v == 0.0));
    }

    #[test]
    fn test_linear_axis() {
        let g = Gradient::linear(Vec2::ZERO, Vec2::new(0.0, 1.0), Color::WHITE, Color::BLACK);
        // The start point sits half a feather inside the box edge.
        let local = g.inverse().transform_point2(Vec2::ZERO);
        assert!((local.y - g.extent().y + g.feather() * 0.5).abs() < 0.05);
        assert_eq!(g.feather(), 1.0);
    }

    #[test]
    fn test_radial_params() {
        let g = Gradient::radial(Vec2::new(2.0, 3.0), 1.0, 3.0, Color::WHITE, Color::BLACK);
        assert_eq!(g.radius(), 2.0);
        assert_eq!(g.extent(), Vec2::splat(2.0));
        assert_eq!(g.feather(), 2.0);
        assert!(approx(g.inverse().transform_point2(Vec2::new(2.0, 3.0)), Vec2::ZERO));
    }

    #[test]
    fn test_translate_then_transform() {
        let mut g = Gradient::solid(Color::WHITE);
        g.translate(Vec2::new(3.0, 4.0));
        assert!(approx(g.transform().translation, Vec2::new(3.0, 4.0)));

        g.set_transform(&Affine2::from_scale(Vec2::splat(2.0)));
        assert!(approx(g.inverse().transform_point2(Vec2::splat(2.0)), Vec2::ONE));
    }

    #[test]
    fn test_box_gradient() {
        let g = Gradient::box_gradient(Rect::new(0.0, 0.0, 1.0, 0.5), 0.1, 0.05, Color::WHITE, Color::BLACK);
        assert_eq!(g.extent(), Vec2::new(0.5, 0.25));
        assert!(approx(g.inverse().transform_point2(Vec2::new(0.5, 0.25)), Vec2::ZERO));
    }
}
