//! The drawing context: GPU state for a contiguous run of indices.

use std::rc::Rc;

use bitflags::bitflags;
use tessera_core::math::{Affine2, Mat4};
use tessera_test_utils::DrawMode;

use super::types::DrawType;
use crate::blend::BlendState;
use crate::stencil::{StencilEffect, StencilRegion};
use crate::texture::Texture;

bitflags! {
    /// Context fields changed since the previously recorded context.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        /// Blend enable and equation.
        const BLEND_EQUATION = 1 << 0;
        const BLEND_FUNCTION = 1 << 1;
        const DRAW_TYPE = 1 << 2;
        /// Projection or model transform.
        const PERSPECTIVE = 1 << 3;
        const TEXTURE = 1 << 4;
        const UNIFORM_BLOCK = 1 << 5;
        const BLUR_STEP = 1 << 6;
        const STENCIL_EFFECT = 1 << 7;
        const STENCIL_CLEAR = 1 << 8;
    }
}

/// State for the indices `[first, last)`.
///
/// The batch owns one live context that accumulates changes. Recording it
/// freezes a copy into the history and starts a new live context with the
/// same state, an empty dirty set and an empty range.
#[derive(Debug, Clone)]
pub(crate) struct DrawingContext {
    pub first: usize,
    pub last: usize,
    pub draw_type: DrawType,
    pub command: DrawMode,
    pub blend_enabled: bool,
    pub blend: BlendState,
    pub stencil_effect: StencilEffect,
    /// Stencil halves to clear before drawing this range.
    pub stencil_clear: Option<StencilRegion>,
    pub perspective: Mat4,
    pub transform: Affine2,
    pub texture: Option<Rc<Texture>>,
    /// Uniform block selected for this range.
    pub block: Option<usize>,
    pub blur: u32,
    pub dirty: DirtyFlags,
}

impl DrawingContext {
    pub fn new() -> Self {
        Self {
            first: 0,
            last: 0,
            draw_type: DrawType::empty(),
            command: DrawMode::Triangles,
            blend_enabled: true,
            blend: BlendState::ALPHA_BLENDING,
            stencil_effect: StencilEffect::Native,
            stencil_clear: None,
            perspective: Mat4::IDENTITY,
            transform: Affine2::IDENTITY,
            texture: None,
            block: None,
            blur: 0,
            dirty: DirtyFlags::all(),
        }
    }

    /// The context that follows this one, starting at index `start`.
    pub fn successor(&self, start: usize) -> Self {
        Self {
            first: start,
            last: start,
            stencil_clear: None,
            dirty: DirtyFlags::empty(),
            ..self.clone()
        }
    }

    pub fn index_count(&self) -> usize {
        self.last - self.first
    }

    /// Combined projection and model matrix for the `uPerspective` uniform.
    pub fn view_matrix(&self) -> Mat4 {
        self.perspective * tessera_core::math::affine2_to_mat4(&self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_keeps_state() {
        let mut context = DrawingContext::new();
        context.first = 3;
        context.last = 9;
        context.blur = 4;
        context.stencil_clear = Some(StencilRegion::Lower);

        let next = context.successor(9);
        assert_eq!((next.first, next.last), (9, 9));
        assert_eq!(next.blur, 4);
        assert!(next.dirty.is_empty());
        assert!(next.stencil_clear.is_none());
        assert_eq!(context.index_count(), 6);
    }
}
