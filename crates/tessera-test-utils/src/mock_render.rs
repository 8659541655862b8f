//! Mock implementation of RenderDevice for testing.
//!
//! This module provides a mock device that records operations without
//! touching a GPU, so call ordering and state deltas can be asserted on.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::{gpu_types::*, render_device::RenderDevice};

/// Records a device call for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    CreateBuffer {
        buffer: BufferId,
    },
    DeleteBuffer {
        buffer: BufferId,
    },
    BindBuffer {
        target: BufferTarget,
        buffer: Option<BufferId>,
    },
    AllocateBuffer {
        target: BufferTarget,
        size: usize,
        usage: BufferUsage,
    },
    UploadBuffer {
        target: BufferTarget,
        data: Vec<u8>,
        usage: BufferUsage,
    },
    WriteBuffer {
        target: BufferTarget,
        offset: usize,
        data: Vec<u8>,
    },
    BindBufferBase {
        bind_point: u32,
        buffer: Option<BufferId>,
    },
    BindBufferRange {
        bind_point: u32,
        buffer: BufferId,
        offset: usize,
        size: usize,
    },
    CreateVertexArray {
        vertex_array: VertexArrayId,
    },
    DeleteVertexArray {
        vertex_array: VertexArrayId,
    },
    BindVertexArray {
        vertex_array: Option<VertexArrayId>,
    },
    VertexAttribute {
        location: u32,
        layout: AttributeLayout,
        stride: usize,
    },
    CreateTexture {
        texture: TextureId,
        desc: TextureDescriptor,
    },
    DeleteTexture {
        texture: TextureId,
    },
    BindTexture {
        unit: u32,
        texture: Option<TextureId>,
    },
    CreateProgram {
        program: ProgramId,
    },
    DeleteProgram {
        program: ProgramId,
    },
    UseProgram {
        program: Option<ProgramId>,
    },
    UniformBlockBinding {
        program: ProgramId,
        block_index: u32,
        bind_point: u32,
    },
    SetUniform {
        name: String,
        value: UniformValue,
    },
    SetCapability {
        capability: Capability,
        enabled: bool,
    },
    BlendEquation {
        equation: BlendEquation,
    },
    BlendFunc {
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
    DepthMask {
        enabled: bool,
    },
    ColorMask {
        mask: [bool; 4],
    },
    StencilMask {
        mask: u32,
    },
    StencilFunc {
        func: CompareFunction,
        reference: i32,
        mask: u32,
    },
    StencilOp {
        fail: StencilOp,
        depth_fail: StencilOp,
        pass: StencilOp,
    },
    ClearStencil {
        value: i32,
    },
    Clear {
        flags: ClearFlags,
    },
    DrawElements {
        mode: DrawMode,
        count: usize,
        byte_offset: usize,
    },
}

/// Names a mock program exposes.
///
/// When a device has no interface configured, every attribute, uniform and
/// uniform block name resolves.
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
    pub blocks: Vec<String>,
}

impl ProgramInterface {
    pub fn new(attributes: &[&str], uniforms: &[&str], blocks: &[&str]) -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            attributes: owned(attributes),
            uniforms: owned(uniforms),
            blocks: owned(blocks),
        }
    }
}

#[derive(Clone, Copy)]
enum NameKind {
    Attribute,
    Uniform,
    Block,
}

#[derive(Default)]
struct MockState {
    next_id: u32,
    /// Remaining successful allocations before allocation starts failing.
    allocations_left: Option<usize>,
    interface: Option<ProgramInterface>,
    buffers: HashSet<BufferId>,
    vertex_arrays: HashSet<VertexArrayId>,
    textures: HashSet<TextureId>,
    programs: HashSet<ProgramId>,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, UniformLocation>,
    uniform_names: HashMap<UniformLocation, String>,
    blocks: HashMap<String, u32>,
}

impl MockState {
    fn allocate(&mut self, operation: &'static str) -> Result<u32, DeviceError> {
        if let Some(left) = self.allocations_left.as_mut() {
            if *left == 0 {
                return Err(DeviceError::Driver {
                    code: 0x0505,
                    operation,
                });
            }
            *left -= 1;
        }
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn exposes(&self, kind: NameKind, name: &str) -> bool {
        let Some(interface) = &self.interface else {
            return true;
        };
        let names = match kind {
            NameKind::Attribute => &interface.attributes,
            NameKind::Uniform => &interface.uniforms,
            NameKind::Block => &interface.blocks,
        };
        names.iter().any(|n| n == name)
    }
}

/// Mock implementation of RenderDevice for testing.
///
/// # Interior Mutability
///
/// Methods take `&self` but need to record calls, so state lives behind
/// `parking_lot::Mutex`.
///
/// # Example
///
/// ```rust
/// use tessera_test_utils::{BufferTarget, MockRenderDevice, RenderDevice};
///
/// let mock = MockRenderDevice::new();
/// let buffer = mock.create_buffer().unwrap();
/// mock.bind_buffer(BufferTarget::Vertex, Some(buffer));
///
/// assert_eq!(mock.count_buffer_creates(), 1);
/// assert_eq!(mock.live_buffers(), 1);
/// ```
pub struct MockRenderDevice {
    /// Recorded calls for verification
    calls: Mutex<Vec<RenderCall>>,
    state: Mutex<MockState>,
    limits: DeviceLimits,
}

impl MockRenderDevice {
    /// Create a mock with [`DeviceLimits::default`] that resolves every name.
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(MockState::default()),
            limits,
        }
    }

    /// Restrict the names every program on this device exposes.
    pub fn set_program_interface(&self, interface: ProgramInterface) {
        self.state.lock().interface = Some(interface);
    }

    /// Let the next `count` allocations succeed, then fail every later one
    /// with `GL_OUT_OF_MEMORY`.
    pub fn fail_allocations_after(&self, count: usize) {
        self.state.lock().allocations_left = Some(count);
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Count recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RenderCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(*call)).count()
    }

    pub fn count_buffer_creates(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::CreateBuffer { .. }))
    }

    /// Count partial buffer writes on `target`.
    pub fn count_buffer_writes(&self, target: BufferTarget) -> usize {
        self.count(|call| matches!(call, RenderCall::WriteBuffer { target: t, .. } if *t == target))
    }

    pub fn count_draw_calls(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::DrawElements { .. }))
    }

    /// Recorded draws as `(mode, count, byte_offset)`.
    pub fn draw_calls(&self) -> Vec<(DrawMode, usize, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::DrawElements {
                    mode,
                    count,
                    byte_offset,
                } => Some((*mode, *count, *byte_offset)),
                _ => None,
            })
            .collect()
    }

    /// Every value written to the uniform called `name`, in order.
    pub fn uniform_values(&self, name: &str) -> Vec<UniformValue> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::SetUniform { name: n, value } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Textures bound to any unit, `None` entries being unbinds.
    pub fn texture_binds(&self) -> Vec<Option<TextureId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::BindTexture { texture, .. } => Some(*texture),
                _ => None,
            })
            .collect()
    }

    /// Index of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&RenderCall) -> bool) -> Option<usize> {
        self.calls.lock().iter().position(predicate)
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.lock().vertex_arrays.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.lock().programs.len()
    }

    /// Total number of handles created and not yet deleted.
    pub fn live_resources(&self) -> usize {
        let state = self.state.lock();
        state.buffers.len() + state.vertex_arrays.len() + state.textures.len() + state.programs.len()
    }

    fn record(&self, call: RenderCall) {
        self.calls.lock().push(call);
    }
}

impl Default for MockRenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for MockRenderDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self) -> Result<BufferId, DeviceError> {
        let buffer = {
            let mut state = self.state.lock();
            let buffer = BufferId(state.allocate("create_buffer")?);
            state.buffers.insert(buffer);
            buffer
        };
        self.record(RenderCall::CreateBuffer { buffer });
        Ok(buffer)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.state.lock().buffers.remove(&buffer);
        self.record(RenderCall::DeleteBuffer { buffer });
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        self.record(RenderCall::BindBuffer { target, buffer });
    }

    fn allocate_buffer(
        &self,
        target: BufferTarget,
        size: usize,
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        self.state.lock().allocate("allocate_buffer")?;
        self.record(RenderCall::AllocateBuffer {
            target,
            size,
            usage,
        });
        Ok(())
    }

    fn upload_buffer(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.record(RenderCall::UploadBuffer {
            target,
            data: data.to_vec(),
            usage,
        });
    }

    fn write_buffer(&self, target: BufferTarget, offset: usize, data: &[u8]) {
        self.record(RenderCall::WriteBuffer {
            target,
            offset,
            data: data.to_vec(),
        });
    }

    fn bind_buffer_base(&self, bind_point: u32, buffer: Option<BufferId>) {
        self.record(RenderCall::BindBufferBase { bind_point, buffer });
    }

    fn bind_buffer_range(&self, bind_point: u32, buffer: BufferId, offset: usize, size: usize) {
        self.record(RenderCall::BindBufferRange {
            bind_point,
            buffer,
            offset,
            size,
        });
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, DeviceError> {
        let vertex_array = {
            let mut state = self.state.lock();
            let vertex_array = VertexArrayId(state.allocate("create_vertex_array")?);
            state.vertex_arrays.insert(vertex_array);
            vertex_array
        };
        self.record(RenderCall::CreateVertexArray { vertex_array });
        Ok(vertex_array)
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayId) {
        self.state.lock().vertex_arrays.remove(&vertex_array);
        self.record(RenderCall::DeleteVertexArray { vertex_array });
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        self.record(RenderCall::BindVertexArray { vertex_array });
    }

    fn vertex_attribute(&self, location: u32, layout: &AttributeLayout, stride: usize) {
        self.record(RenderCall::VertexAttribute {
            location,
            layout: *layout,
            stride,
        });
    }

    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        _data: Option<&[u8]>,
    ) -> Result<TextureId, DeviceError> {
        let texture = {
            let mut state = self.state.lock();
            let texture = TextureId(state.allocate("create_texture")?);
            state.textures.insert(texture);
            texture
        };
        self.record(RenderCall::CreateTexture {
            texture,
            desc: *desc,
        });
        Ok(texture)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.state.lock().textures.remove(&texture);
        self.record(RenderCall::DeleteTexture { texture });
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        self.record(RenderCall::BindTexture { unit, texture });
    }

    fn create_program(&self, _vertex: &str, _fragment: &str) -> Result<ProgramId, DeviceError> {
        let program = {
            let mut state = self.state.lock();
            let program = ProgramId(state.allocate("create_program")?);
            state.programs.insert(program);
            program
        };
        self.record(RenderCall::CreateProgram { program });
        Ok(program)
    }

    fn delete_program(&self, program: ProgramId) {
        self.state.lock().programs.remove(&program);
        self.record(RenderCall::DeleteProgram { program });
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.record(RenderCall::UseProgram { program });
    }

    fn attribute_location(&self, _program: ProgramId, name: &str) -> Option<u32> {
        let mut state = self.state.lock();
        if !state.exposes(NameKind::Attribute, name) {
            return None;
        }
        let next = state.attributes.len() as u32;
        Some(*state.attributes.entry(name.to_string()).or_insert(next))
    }

    fn uniform_location(&self, _program: ProgramId, name: &str) -> Option<UniformLocation> {
        let mut state = self.state.lock();
        if !state.exposes(NameKind::Uniform, name) {
            return None;
        }
        if let Some(location) = state.uniforms.get(name) {
            return Some(*location);
        }
        let location = UniformLocation(state.uniforms.len() as u32);
        state.uniforms.insert(name.to_string(), location);
        state.uniform_names.insert(location, name.to_string());
        Some(location)
    }

    fn uniform_block_index(&self, _program: ProgramId, name: &str) -> Option<u32> {
        let mut state = self.state.lock();
        if !state.exposes(NameKind::Block, name) {
            return None;
        }
        let next = state.blocks.len() as u32;
        Some(*state.blocks.entry(name.to_string()).or_insert(next))
    }

    fn uniform_block_binding(&self, program: ProgramId, block_index: u32, bind_point: u32) {
        self.record(RenderCall::UniformBlockBinding {
            program,
            block_index,
            bind_point,
        });
    }

    fn set_uniform(&self, location: UniformLocation, value: &UniformValue) {
        let name = self
            .state
            .lock()
            .uniform_names
            .get(&location)
            .cloned()
            .unwrap_or_default();
        self.record(RenderCall::SetUniform {
            name,
            value: *value,
        });
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        self.record(RenderCall::SetCapability {
            capability,
            enabled,
        });
    }

    fn blend_equation(&self, equation: BlendEquation) {
        self.record(RenderCall::BlendEquation { equation });
    }

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.record(RenderCall::BlendFunc {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        });
    }

    fn depth_mask(&self, enabled: bool) {
        self.record(RenderCall::DepthMask { enabled });
    }

    fn color_mask(&self, mask: [bool; 4]) {
        self.record(RenderCall::ColorMask { mask });
    }

    fn stencil_mask(&self, mask: u32) {
        self.record(RenderCall::StencilMask { mask });
    }

    fn stencil_func(&self, func: CompareFunction, reference: i32, mask: u32) {
        self.record(RenderCall::StencilFunc {
            func,
            reference,
            mask,
        });
    }

    fn stencil_op(&self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.record(RenderCall::StencilOp {
            fail,
            depth_fail,
            pass,
        });
    }

    fn clear_stencil(&self, value: i32) {
        self.record(RenderCall::ClearStencil { value });
    }

    fn clear(&self, flags: ClearFlags) {
        self.record(RenderCall::Clear { flags });
    }

    fn draw_elements(&self, mode: DrawMode, count: usize, byte_offset: usize) {
        self.record(RenderCall::DrawElements {
            mode,
            count,
            byte_offset,
        });
    }
}
