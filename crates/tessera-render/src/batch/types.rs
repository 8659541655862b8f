//! Vertex format, descriptor and statistics for the sprite batch.

use std::rc::Rc;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use tessera_core::math::PackedVec2;
use tessera_test_utils::{AttributeLayout, AttributeType};

use crate::shader::{Shader, names};

/// One sprite vertex: 7 packed 32-bit words.
///
/// ```text
/// Offset | Field     | Size
/// -------|-----------|------------------------------
/// 0      | position  | 8 bytes (2 x f32)
/// 8      | color     | 4 bytes (RGBA8, normalized)
/// 12     | texcoord  | 8 bytes (2 x f32)
/// 20     | gradcoord | 8 bytes (2 x f32)
/// Total: 28 bytes
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: PackedVec2,
    /// See [`Color::to_packed`](crate::Color::to_packed).
    pub color: u32,
    pub texcoord: PackedVec2,
    /// Position within the shape's bounds, normalised to the unit square.
    pub gradcoord: PackedVec2,
}

static_assertions::assert_eq_size!(SpriteVertex, [f32; 7]);

impl SpriteVertex {
    pub const STRIDE: usize = size_of::<SpriteVertex>();

    /// Shader attribute names and their layout inside the vertex.
    pub const ATTRIBUTES: [(&'static str, AttributeLayout); 4] = [
        (
            names::POSITION,
            AttributeLayout {
                components: 2,
                ty: AttributeType::Float,
                normalized: false,
                offset: 0,
            },
        ),
        (
            names::COLOR,
            AttributeLayout {
                components: 4,
                ty: AttributeType::UnsignedByte,
                normalized: true,
                offset: 8,
            },
        ),
        (
            names::TEXCOORD,
            AttributeLayout {
                components: 2,
                ty: AttributeType::Float,
                normalized: false,
                offset: 12,
            },
        ),
        (
            names::GRADCOORD,
            AttributeLayout {
                components: 2,
                ty: AttributeType::Float,
                normalized: false,
                offset: 20,
            },
        ),
    ];
}

bitflags! {
    /// Shader paths enabled for a draw (the `uType` uniform).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawType: u32 {
        const TEXTURE = 1 << 0;
        const GRADIENT = 1 << 1;
        const SCISSOR = 1 << 2;
        const BLUR = 1 << 3;
    }
}

/// Floats per uniform block: scissor (16) then gradient (24).
pub const CONTEXT_BLOCK_FLOATS: usize = 40;

/// Byte offset of the scissor inside a uniform block.
pub const SCISSOR_OFFSET: usize = 0;

/// Byte offset of the gradient inside a uniform block.
pub const GRADIENT_OFFSET: usize = 16 * size_of::<f32>();

/// Configuration for [`SpriteBatch`](super::SpriteBatch).
#[derive(Debug, Clone)]
pub struct SpriteBatchDescriptor {
    /// Vertices held before an implicit flush.
    pub vertex_capacity: usize,
    /// Indices held before an implicit flush.
    pub index_capacity: usize,
    /// Gradient/scissor blocks per flush.
    pub block_count: usize,
    /// Uniform buffer bind point of the context block.
    pub uniform_bind_point: u32,
    /// Shader to draw with; the bundled sprite shader when `None`.
    pub shader: Option<Rc<Shader>>,
}

impl Default for SpriteBatchDescriptor {
    fn default() -> Self {
        Self {
            vertex_capacity: 8192,
            index_capacity: 3 * 8192,
            block_count: 64,
            uniform_bind_point: 0,
            shader: None,
        }
    }
}

/// Counters for the current frame, reset by `begin()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteBatchStats {
    /// Indexed draw calls issued.
    pub draw_calls: usize,
    /// Recorded contexts replayed, including ones with no geometry.
    pub segments: usize,
    /// Flushes that reached the GPU.
    pub flushes: usize,
    pub vertices: usize,
    /// Triangles, lines or points submitted.
    pub primitives: usize,
}
