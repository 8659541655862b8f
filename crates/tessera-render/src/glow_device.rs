//! OpenGL 3.3 backend for [`RenderDevice`] built on [`glow`].

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use glow::{HasContext, PixelUnpackData};
use tessera_core::alloc::HashMap;
use tessera_test_utils::{
    AttributeLayout, AttributeType, BlendEquation, BlendFactor, BufferId, BufferTarget,
    BufferUsage, Capability, ClearFlags, CompareFunction, DeviceError, DeviceLimits, DrawMode,
    PixelFormat, ProgramId, RenderDevice, ShaderStage, StencilOp, TextureDescriptor, TextureId,
    UniformLocation, UniformValue, VertexArrayId,
};

/// Clamp a size or offset to the `i32` range GL entry points take.
fn gl_int(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Integer ids handed out to callers, mapped to native GL handles.
struct Slots<T> {
    next: Cell<u32>,
    map: RefCell<HashMap<u32, T>>,
}

impl<T: Copy> Slots<T> {
    fn new() -> Self {
        Self {
            next: Cell::new(1),
            map: RefCell::new(HashMap::default()),
        }
    }

    fn insert(&self, handle: T) -> u32 {
        let id = self.next.get();
        self.next.set(id + 1);
        self.map.borrow_mut().insert(id, handle);
        id
    }

    fn get(&self, id: u32) -> Option<T> {
        self.map.borrow().get(&id).copied()
    }

    fn remove(&self, id: u32) -> Option<T> {
        self.map.borrow_mut().remove(&id)
    }
}

/// A [`RenderDevice`] that forwards every call to an OpenGL context.
///
/// # Example
///
/// ```no_run
/// # use std::rc::Rc;
/// # use std::sync::Arc;
/// # use tessera_render::{GlowDevice, SpriteBatch, SpriteBatchDescriptor};
/// # fn example(gl: Arc<glow::Context>) {
/// // With the context current on this thread:
/// let device = Rc::new(unsafe { GlowDevice::new(gl) });
/// let batch = SpriteBatch::new(device, SpriteBatchDescriptor::default()).unwrap();
/// # }
/// ```
pub struct GlowDevice {
    gl: Arc<glow::Context>,
    limits: DeviceLimits,
    buffers: Slots<glow::Buffer>,
    vertex_arrays: Slots<glow::VertexArray>,
    textures: Slots<glow::Texture>,
    programs: Slots<glow::Program>,
    /// Resolved locations, indexed by `UniformLocation`.
    uniforms: RefCell<Vec<glow::UniformLocation>>,
    uniform_cache: RefCell<HashMap<(ProgramId, String), Option<UniformLocation>>>,
}

impl GlowDevice {
    /// Wrap `gl` and query its limits.
    ///
    /// # Safety
    ///
    /// `gl` must be current on the calling thread for as long as the device
    /// or any resource created through it is alive.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Self {
        let limits = unsafe {
            let defaults = DeviceLimits::default();
            let query = |parameter: u32, fallback: usize| {
                usize::try_from(gl.get_parameter_i32(parameter))
                    .ok()
                    .filter(|&value| value > 0)
                    .unwrap_or(fallback)
            };
            DeviceLimits {
                uniform_buffer_offset_alignment: query(
                    glow::UNIFORM_BUFFER_OFFSET_ALIGNMENT,
                    defaults.uniform_buffer_offset_alignment,
                ),
                max_uniform_block_size: query(
                    glow::MAX_UNIFORM_BLOCK_SIZE,
                    defaults.max_uniform_block_size,
                ),
                max_texture_size: query(
                    glow::MAX_TEXTURE_SIZE,
                    defaults.max_texture_size as usize,
                ) as u32,
            }
        };
        tracing::info!(?limits, "Created OpenGL render device");

        Self {
            gl,
            limits,
            buffers: Slots::new(),
            vertex_arrays: Slots::new(),
            textures: Slots::new(),
            programs: Slots::new(),
            uniforms: RefCell::new(Vec::new()),
            uniform_cache: RefCell::new(HashMap::default()),
        }
    }

    pub fn gl(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    fn check_error(&self, operation: &'static str) -> Result<(), DeviceError> {
        // SAFETY: the context is current per `GlowDevice::new`.
        let code = unsafe { self.gl.get_error() };
        if code == glow::NO_ERROR {
            Ok(())
        } else {
            tracing::error!(code, operation, "OpenGL error");
            Err(DeviceError::Driver { code, operation })
        }
    }

    unsafe fn compile(&self, stage: ShaderStage, source: &str) -> Result<glow::Shader, DeviceError> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self
                .gl
                .create_shader(kind)
                .map_err(|reason| DeviceError::Allocation {
                    resource: "shader",
                    reason,
                })?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(DeviceError::ShaderCompile { stage, log });
            }
            Ok(shader)
        }
    }
}

const fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Vertex => glow::ARRAY_BUFFER,
        BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
        BufferTarget::Uniform => glow::UNIFORM_BUFFER,
    }
}

const fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

const fn attribute_type(ty: AttributeType) -> u32 {
    match ty {
        AttributeType::Byte => glow::BYTE,
        AttributeType::UnsignedByte => glow::UNSIGNED_BYTE,
        AttributeType::Short => glow::SHORT,
        AttributeType::UnsignedShort => glow::UNSIGNED_SHORT,
        AttributeType::Int => glow::INT,
        AttributeType::UnsignedInt => glow::UNSIGNED_INT,
        AttributeType::Float => glow::FLOAT,
    }
}

const fn draw_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Points => glow::POINTS,
        DrawMode::Lines => glow::LINES,
        DrawMode::Triangles => glow::TRIANGLES,
    }
}

const fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => glow::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => glow::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => glow::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => glow::ONE_MINUS_CONSTANT_ALPHA,
        BlendFactor::SrcAlphaSaturate => glow::SRC_ALPHA_SATURATE,
    }
}

const fn blend_equation(equation: BlendEquation) -> u32 {
    match equation {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendEquation::Min => glow::MIN,
        BlendEquation::Max => glow::MAX,
    }
}

const fn compare_function(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::Never => glow::NEVER,
        CompareFunction::Less => glow::LESS,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Greater => glow::GREATER,
        CompareFunction::NotEqual => glow::NOTEQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Always => glow::ALWAYS,
    }
}

const fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => glow::KEEP,
        StencilOp::Zero => glow::ZERO,
        StencilOp::Replace => glow::REPLACE,
        StencilOp::Increment => glow::INCR,
        StencilOp::IncrementWrap => glow::INCR_WRAP,
        StencilOp::Decrement => glow::DECR,
        StencilOp::DecrementWrap => glow::DECR_WRAP,
        StencilOp::Invert => glow::INVERT,
    }
}

const fn gl_capability(capability: Capability) -> u32 {
    match capability {
        Capability::Blend => glow::BLEND,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::StencilTest => glow::STENCIL_TEST,
        Capability::ScissorTest => glow::SCISSOR_TEST,
    }
}

/// Internal format, pixel format and component type.
const fn pixel_format(format: PixelFormat) -> (u32, u32, u32) {
    match format {
        PixelFormat::Rgba => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        PixelFormat::Rgb => (glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
        PixelFormat::Red => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        PixelFormat::RedGreen => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
        PixelFormat::Depth => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        PixelFormat::DepthStencil => (
            glow::DEPTH24_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::UNSIGNED_INT_24_8,
        ),
    }
}

// SAFETY (all `unsafe` blocks below): the context is current on this thread
// per the contract of `GlowDevice::new`, and every native handle comes from
// a slot map populated by this device.
impl RenderDevice for GlowDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self) -> Result<BufferId, DeviceError> {
        let buffer = unsafe { self.gl.create_buffer() }.map_err(|reason| {
            DeviceError::Allocation {
                resource: "buffer",
                reason,
            }
        })?;
        Ok(BufferId(self.buffers.insert(buffer)))
    }

    fn delete_buffer(&self, buffer: BufferId) {
        if let Some(native) = self.buffers.remove(buffer.0) {
            unsafe { self.gl.delete_buffer(native) };
        }
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        let native = buffer.and_then(|id| self.buffers.get(id.0));
        unsafe { self.gl.bind_buffer(buffer_target(target), native) };
    }

    fn allocate_buffer(
        &self,
        target: BufferTarget,
        size: usize,
        usage: BufferUsage,
    ) -> Result<(), DeviceError> {
        unsafe {
            self.gl
                .buffer_data_size(buffer_target(target), gl_int(size), buffer_usage(usage));
        }
        self.check_error("buffer allocation")
    }

    fn upload_buffer(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, buffer_usage(usage));
        }
    }

    fn write_buffer(&self, target: BufferTarget, offset: usize, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_sub_data_u8_slice(buffer_target(target), gl_int(offset), data);
        }
    }

    fn bind_buffer_base(&self, bind_point: u32, buffer: Option<BufferId>) {
        let native = buffer.and_then(|id| self.buffers.get(id.0));
        unsafe {
            self.gl
                .bind_buffer_base(glow::UNIFORM_BUFFER, bind_point, native);
        }
    }

    fn bind_buffer_range(&self, bind_point: u32, buffer: BufferId, offset: usize, size: usize) {
        let native = self.buffers.get(buffer.0);
        unsafe {
            self.gl.bind_buffer_range(
                glow::UNIFORM_BUFFER,
                bind_point,
                native,
                gl_int(offset),
                gl_int(size),
            );
        }
    }

    fn create_vertex_array(&self) -> Result<VertexArrayId, DeviceError> {
        let vertex_array = unsafe { self.gl.create_vertex_array() }.map_err(|reason| {
            DeviceError::Allocation {
                resource: "vertex array",
                reason,
            }
        })?;
        Ok(VertexArrayId(self.vertex_arrays.insert(vertex_array)))
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayId) {
        if let Some(native) = self.vertex_arrays.remove(vertex_array.0) {
            unsafe { self.gl.delete_vertex_array(native) };
        }
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayId>) {
        let native = vertex_array.and_then(|id| self.vertex_arrays.get(id.0));
        unsafe { self.gl.bind_vertex_array(native) };
    }

    fn vertex_attribute(&self, location: u32, layout: &AttributeLayout, stride: usize) {
        unsafe {
            self.gl.enable_vertex_attrib_array(location);
            self.gl.vertex_attrib_pointer_f32(
                location,
                layout.components as i32,
                attribute_type(layout.ty),
                layout.normalized,
                gl_int(stride),
                gl_int(layout.offset),
            );
        }
    }

    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<TextureId, DeviceError> {
        let (internal, format, ty) = pixel_format(desc.format);
        let texture = unsafe {
            let texture = self.gl.create_texture().map_err(|reason| {
                DeviceError::Allocation {
                    resource: "texture",
                    reason,
                }
            })?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal as i32,
                gl_int(desc.width as usize),
                gl_int(desc.height as usize),
                0,
                format,
                ty,
                PixelUnpackData::Slice(data),
            );
            for (parameter, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, parameter, value as i32);
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            texture
        };

        if let Err(err) = self.check_error("texture upload") {
            unsafe { self.gl.delete_texture(texture) };
            return Err(err);
        }
        Ok(TextureId(self.textures.insert(texture)))
    }

    fn delete_texture(&self, texture: TextureId) {
        if let Some(native) = self.textures.remove(texture.0) {
            unsafe { self.gl.delete_texture(native) };
        }
    }

    fn bind_texture(&self, unit: u32, texture: Option<TextureId>) {
        let native = texture.and_then(|id| self.textures.get(id.0));
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, native);
        }
    }

    fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramId, DeviceError> {
        unsafe {
            let vertex = self.compile(ShaderStage::Vertex, vertex)?;
            let fragment = match self.compile(ShaderStage::Fragment, fragment) {
                Ok(shader) => shader,
                Err(err) => {
                    self.gl.delete_shader(vertex);
                    return Err(err);
                }
            };

            let program = match self.gl.create_program() {
                Ok(program) => program,
                Err(reason) => {
                    self.gl.delete_shader(vertex);
                    self.gl.delete_shader(fragment);
                    return Err(DeviceError::Allocation {
                        resource: "program",
                        reason,
                    });
                }
            };
            self.gl.attach_shader(program, vertex);
            self.gl.attach_shader(program, fragment);
            self.gl.link_program(program);
            let linked = self.gl.get_program_link_status(program);

            self.gl.detach_shader(program, vertex);
            self.gl.detach_shader(program, fragment);
            self.gl.delete_shader(vertex);
            self.gl.delete_shader(fragment);

            if !linked {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(DeviceError::ProgramLink { log });
            }
            Ok(ProgramId(self.programs.insert(program)))
        }
    }

    fn delete_program(&self, program: ProgramId) {
        if let Some(native) = self.programs.remove(program.0) {
            self.uniform_cache
                .borrow_mut()
                .retain(|(owner, _), _| *owner != program);
            unsafe { self.gl.delete_program(native) };
        }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        let native = program.and_then(|id| self.programs.get(id.0));
        unsafe { self.gl.use_program(native) };
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let native = self.programs.get(program.0)?;
        unsafe { self.gl.get_attrib_location(native, name) }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let key = (program, name.to_string());
        if let Some(cached) = self.uniform_cache.borrow().get(&key) {
            return *cached;
        }

        let native = self.programs.get(program.0)?;
        let location = unsafe { self.gl.get_uniform_location(native, name) }.map(|location| {
            let mut uniforms = self.uniforms.borrow_mut();
            uniforms.push(location);
            UniformLocation((uniforms.len() - 1) as u32)
        });
        self.uniform_cache.borrow_mut().insert(key, location);
        location
    }

    fn uniform_block_index(&self, program: ProgramId, name: &str) -> Option<u32> {
        let native = self.programs.get(program.0)?;
        unsafe { self.gl.get_uniform_block_index(native, name) }
    }

    fn uniform_block_binding(&self, program: ProgramId, block_index: u32, bind_point: u32) {
        if let Some(native) = self.programs.get(program.0) {
            unsafe {
                self.gl
                    .uniform_block_binding(native, block_index, bind_point);
            }
        }
    }

    fn set_uniform(&self, location: UniformLocation, value: &UniformValue) {
        let uniforms = self.uniforms.borrow();
        let Some(native) = uniforms.get(location.0 as usize) else {
            return;
        };
        let native = Some(native);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(native, *v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(native, *v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32_slice(native, v),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32_slice(native, v),
                UniformValue::Mat4(v) => self.gl.uniform_matrix_4_f32_slice(native, false, v),
            }
        }
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        let capability = gl_capability(capability);
        unsafe {
            if enabled {
                self.gl.enable(capability);
            } else {
                self.gl.disable(capability);
            }
        }
    }

    fn blend_equation(&self, equation: BlendEquation) {
        unsafe { self.gl.blend_equation(blend_equation(equation)) };
    }

    fn blend_func_separate(
        &self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        unsafe {
            self.gl.blend_func_separate(
                blend_factor(src_rgb),
                blend_factor(dst_rgb),
                blend_factor(src_alpha),
                blend_factor(dst_alpha),
            );
        }
    }

    fn depth_mask(&self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) };
    }

    fn color_mask(&self, mask: [bool; 4]) {
        let [r, g, b, a] = mask;
        unsafe { self.gl.color_mask(r, g, b, a) };
    }

    fn stencil_mask(&self, mask: u32) {
        unsafe { self.gl.stencil_mask(mask) };
    }

    fn stencil_func(&self, func: CompareFunction, reference: i32, mask: u32) {
        unsafe {
            self.gl
                .stencil_func(compare_function(func), reference, mask);
        }
    }

    fn stencil_op(&self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        unsafe {
            self.gl
                .stencil_op(stencil_op(fail), stencil_op(depth_fail), stencil_op(pass));
        }
    }

    fn clear_stencil(&self, value: i32) {
        unsafe { self.gl.clear_stencil(value) };
    }

    fn clear(&self, flags: ClearFlags) {
        let mut mask = 0;
        if flags.contains(ClearFlags::COLOR) {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::DEPTH) {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::STENCIL) {
            mask |= glow::STENCIL_BUFFER_BIT;
        }
        unsafe { self.gl.clear(mask) };
    }

    fn draw_elements(&self, mode: DrawMode, count: usize, byte_offset: usize) {
        unsafe {
            self.gl.draw_elements(
                draw_mode(mode),
                gl_int(count),
                glow::UNSIGNED_INT,
                gl_int(byte_offset),
            );
        }
    }
}

impl std::fmt::Debug for GlowDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlowDevice")
            .field("limits", &self.limits)
            .field("buffers", &self.buffers.map.borrow().len())
            .field("textures", &self.textures.map.borrow().len())
            .field("programs", &self.programs.map.borrow().len())
            .finish()
    }
}
