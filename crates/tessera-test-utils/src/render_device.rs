//! Trait abstracting the GPU command surface.
//!
//! `RenderDevice` mirrors the immediate-mode OpenGL state machine the sprite
//! batch is written against: bind points, vertex attribute locations,
//! fixed-function blend and stencil state, and indexed draws. Real
//! implementations forward to the driver; the mock records every call.

use crate::gpu_types::*;

/// Trait abstracting GPU resource creation and state changes.
///
/// # Ownership
///
/// Methods take `&self` and return plain handles. Whoever creates a handle
/// is responsible for deleting it; the resource types in `tessera-render`
/// do so on drop.
///
/// # Threading
///
/// The trait is deliberately not `Send + Sync`. A device is driven from the
/// single thread that owns the graphics context, and resources share it
/// through `Rc<dyn RenderDevice>`.
///
/// # Example
///
/// ```rust,no_run
/// use tessera_test_utils::{BufferTarget, BufferUsage, RenderDevice};
///
/// fn upload(device: &dyn RenderDevice, bytes: &[u8]) {
///     let buffer = device.create_buffer().expect("buffer");
///     device.bind_buffer(BufferTarget::Vertex, Some(buffer));
///     device.upload_buffer(BufferTarget::Vertex, bytes, BufferUsage::Stream);
///     device.bind_buffer(BufferTarget::Vertex, None);
///     device.delete_buffer(buffer);
/// }
/// ```
pub trait RenderDevice {
    /// Implementation limits of the device.
    fn limits(&self) -> DeviceLimits;

    // Buffer operations

    fn create_buffer(&self) -> Result<BufferId, DeviceError>;

    fn delete_buffer(&self, buffer: BufferId);

    /// Bind `buffer` to `target`, or unbind the target with `None`.
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>);

    /// Reserve `size` bytes of storage for the buffer bound to `target`.
    fn allocate_buffer(
        &self,
        target: BufferTarget,
        size: usize,
        usage: BufferUsage,
    ) -> Result<(), DeviceError>;

    /// Replace the storage of the buffer bound to `target` with `data`.
    fn upload_buffer(&self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    /// Overwrite part of the buffer bound to `target`.
    fn write_buffer(&self, target: BufferTarget, offset: usize, data: &[u8]);

    /// Attach a whole uniform buffer to a numbered bind point.
    fn bind_buffer_base(&self, bind_point: u32, buffer: Option<BufferId>);

    /// Attach a range of a uniform buffer to a numbered bind point.
    fn bind_buffer_range(&self, bind_point: u32, buffer: BufferId, offset: usize, size: usize);

    // Vertex arrays

    fn create_vertex_array(&self) -> Result<VertexArrayId, DeviceError>;

    fn delete_vertex_array(&self, vertex_array: VertexArrayId);

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>);

    /// Enable `location` and point it at the currently bound vertex buffer.
    fn vertex_attribute(&self, location: u32, layout: &AttributeLayout, stride: usize);

    // Textures

    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<TextureId, DeviceError>;

    fn delete_texture(&self, texture: TextureId);

    /// Bind `texture` to texture unit `unit`.
    fn bind_texture(&self, unit: u32, texture: Option<TextureId>);

    // Programs

    fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramId, DeviceError>;

    fn delete_program(&self, program: ProgramId);

    fn use_program(&self, program: Option<ProgramId>);

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn uniform_block_index(&self, program: ProgramId, name: &str) -> Option<u32>;

    fn uniform_block_binding(&self, program: ProgramId, block_index: u32, bind_point: u32);

    /// Set a uniform of the program currently in use.
    fn set_uniform(&self, location: UniformLocation, value: &UniformValue);

    // Fixed-function state

    fn set_capability(&self, capability: Capability, enabled: bool);

    fn blend_equation(&self, equation: BlendEquation);

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );

    fn depth_mask(&self, enabled: bool);

    fn color_mask(&self, mask: [bool; 4]);

    fn stencil_mask(&self, mask: u32);

    fn stencil_func(&self, func: CompareFunction, reference: i32, mask: u32);

    fn stencil_op(&self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp);

    fn clear_stencil(&self, value: i32);

    fn clear(&self, flags: ClearFlags);

    // Drawing

    /// Draw `count` 32-bit indices starting `byte_offset` bytes into the
    /// bound index buffer.
    fn draw_elements(&self, mode: DrawMode, count: usize, byte_offset: usize);
}
