/// Fast mathematical operations using SIMD-accelerated `glam` types.
///
/// This module re-exports all types and functions from the [`glam`] crate.
/// The renderer works almost exclusively with [`Vec2`], [`Affine2`] and
/// [`Mat4`].
///
/// # Examples
///
/// ```
/// use tessera_core::math::{Affine2, Vec2};
///
/// let xform = Affine2::from_translation(Vec2::new(10.0, 20.0));
/// assert_eq!(xform.transform_point2(Vec2::ZERO), Vec2::new(10.0, 20.0));
/// ```
///
/// [`glam`]: https://docs.rs/glam
pub mod fast {
    pub use glam::*;
}

/// Packed vector types for GPU buffer uploads.
///
/// These are `#[repr(C)]` and [`Pod`](bytemuck::Pod) so vertex structs built
/// from them can be cast straight to byte slices.
pub mod packed {
    use bytemuck::{Pod, Zeroable};

    /// A 2D vector with guaranteed `#[repr(C)]` layout for GPU uploads.
    ///
    /// ```text
    /// Offset | Field | Size
    /// -------|-------|------
    /// 0      | x     | 4 bytes (f32)
    /// 4      | y     | 4 bytes (f32)
    /// Total: 8 bytes
    /// ```
    #[repr(C)]
    #[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
    pub struct Vec2 {
        pub x: f32,
        pub y: f32,
    }

    impl From<glam::Vec2> for Vec2 {
        fn from(v: glam::Vec2) -> Self {
            Vec2 { x: v.x, y: v.y }
        }
    }

    impl From<Vec2> for glam::Vec2 {
        fn from(v: Vec2) -> Self {
            glam::Vec2::new(v.x, v.y)
        }
    }

    static_assertions::assert_eq_size!(Vec2, [f32; 2]);
}

pub use fast::*;
pub use packed::Vec2 as PackedVec2;

/// Lift a 2D affine transform into a 4x4 matrix acting on the XY plane.
pub fn affine2_to_mat4(affine: &Affine2) -> Mat4 {
    let m = affine.matrix2;
    let t = affine.translation;
    Mat4::from_cols(
        Vec4::new(m.x_axis.x, m.x_axis.y, 0.0, 0.0),
        Vec4::new(m.y_axis.x, m.y_axis.y, 0.0, 0.0),
        Vec4::Z,
        Vec4::new(t.x, t.y, 0.0, 1.0),
    )
}

/// Column-major 3x3 homogeneous matrix with every column padded to four
/// floats (std140 `mat3` layout).
#[rustfmt::skip]
pub fn affine2_to_padded_mat3(affine: &Affine2) -> [f32; 12] {
    let m = affine.matrix2;
    let t = affine.translation;
    [
        m.x_axis.x, m.x_axis.y, 0.0, 0.0,
        m.y_axis.x, m.y_axis.y, 0.0, 0.0,
        t.x, t.y, 1.0, 0.0,
    ]
}

/// Column-major 3x3 homogeneous matrix without padding.
#[rustfmt::skip]
pub fn affine2_to_mat3(affine: &Affine2) -> [f32; 9] {
    let m = affine.matrix2;
    let t = affine.translation;
    [
        m.x_axis.x, m.x_axis.y, 0.0,
        m.y_axis.x, m.y_axis.y, 0.0,
        t.x, t.y, 1.0,
    ]
}

/// Inverse of `affine`, or the zero transform when it is singular.
pub fn inverse_or_zero(affine: &Affine2) -> Affine2 {
    if affine.matrix2.determinant().abs() <= f32::EPSILON * f32::EPSILON {
        Affine2::ZERO
    } else {
        affine.inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_mat3_layout() {
        let xform = Affine2::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let data = affine2_to_padded_mat3(&xform);
        assert_eq!(data, [1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0, 5.0, 6.0, 1.0, 0.0]);
    }

    #[test]
    fn test_affine_to_mat4_matches_point_transform() {
        let xform = Affine2::from_scale_angle_translation(
            Vec2::new(2.0, 3.0),
            0.5,
            Vec2::new(-4.0, 7.0),
        );
        let p = Vec2::new(1.5, -2.0);
        let expected = xform.transform_point2(p);
        let actual = affine2_to_mat4(&xform).transform_point3(p.extend(0.0));
        assert!((actual.truncate() - expected).length() < 1e-5);
    }

    #[test]
    fn test_inverse_or_zero_singular() {
        let singular = Affine2::from_scale(Vec2::ZERO);
        assert_eq!(inverse_or_zero(&singular), Affine2::ZERO);
    }
}
