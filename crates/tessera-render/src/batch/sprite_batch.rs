use std::rc::Rc;

use tessera_core::alloc::HashMap;
use tessera_core::geometry::Rect;
use tessera_core::math::{Affine2, Mat4, Vec2};
use tessera_core::profiling::{profile_function, profile_scope};
use tessera_test_utils::{
    BlendEquation, BlendFactor, BufferUsage, Capability, DrawMode, RenderDevice, UniformValue,
};

use super::context::{DirtyFlags, DrawingContext};
use super::types::{
    CONTEXT_BLOCK_FLOATS, DrawType, GRADIENT_OFFSET, SCISSOR_OFFSET, SpriteBatchDescriptor,
    SpriteBatchStats, SpriteVertex,
};
use crate::Color;
use crate::blend::{BlendMode, BlendState};
use crate::error::{RenderError, RenderResult};
use crate::gradient::Gradient;
use crate::poly::Poly2;
use crate::scissor::Scissor;
use crate::shader::{Shader, names};
use crate::stencil::{self, StencilEffect, StencilRegion};
use crate::stream_buffer::StreamBuffer;
use crate::texture::Texture;
use crate::uniform_buffer::{Block, Field, UniformBuffer};

const RECT_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];
const RECT_OUTLINE_INDICES: [u32; 8] = [0, 1, 1, 2, 2, 3, 3, 0];

/// Batched 2D renderer for solid, textured, gradient and scissored shapes.
///
/// Shapes are written into a CPU vertex stream as they are submitted. State
/// changes made while geometry is pending record the current context, so a
/// flush replays one context per distinct state and issues one draw call for
/// each.
///
/// # Example
///
/// ```ignore
/// let mut batch = SpriteBatch::new(device.clone(), SpriteBatchDescriptor::default())?;
/// batch.set_viewport(800.0, 600.0);
///
/// batch.begin()?;
/// batch.set_color(Color::RED);
/// batch.fill_rect(Rect::new(10.0, 10.0, 50.0, 50.0))?;
/// batch.draw(&texture, Rect::new(100.0, 10.0, 64.0, 64.0))?;
/// batch.end()?;
/// ```
pub struct SpriteBatch {
    device: Rc<dyn RenderDevice>,
    shader: Rc<Shader>,
    stream: StreamBuffer,
    uniforms: UniformBuffer,
    blank: Rc<Texture>,

    vertices: Vec<SpriteVertex>,
    indices: Vec<u32>,
    vertex_capacity: usize,
    index_capacity: usize,

    context: DrawingContext,
    history: Vec<DrawingContext>,

    color: Color,
    gradient: Option<Gradient>,
    scissor: Option<Scissor>,
    /// The next shape needs a fresh uniform block.
    pending_block: bool,
    /// Source index to stream index for the polygon being chunked.
    chunk_map: HashMap<u32, u32>,

    /// Geometry has been written for the live context.
    inflight: bool,
    drawing: bool,
    stats: SpriteBatchStats,
}

/// Computes vertex attributes for one submission.
struct VertexBuilder {
    transform: Affine2,
    color: u32,
    tex_origin: Vec2,
    tex_scale: Vec2,
    grad_origin: Vec2,
    grad_scale: Vec2,
}

impl VertexBuilder {
    fn new(transform: Affine2, color: Color, tex_frame: Rect<f32>, grad_frame: Rect<f32>) -> Self {
        Self {
            transform,
            color: color.to_packed(),
            tex_origin: tex_frame.origin(),
            tex_scale: reciprocal(tex_frame.size()),
            grad_origin: grad_frame.origin(),
            grad_scale: reciprocal(grad_frame.size()),
        }
    }

    fn build(&self, point: Vec2) -> SpriteVertex {
        let tex = (point - self.tex_origin) * self.tex_scale;
        let grad = (point - self.grad_origin) * self.grad_scale;
        SpriteVertex {
            position: self.transform.transform_point2(point).into(),
            color: self.color,
            texcoord: Vec2::new(tex.x, 1.0 - tex.y).into(),
            gradcoord: grad.into(),
        }
    }
}

/// Component-wise `1 / v`, mapping zero-sized axes to zero.
fn reciprocal(v: Vec2) -> Vec2 {
    let r = |x: f32| if x == 0.0 { 0.0 } else { 1.0 / x };
    Vec2::new(r(v.x), r(v.y))
}

/// Offset, rotation and scale about `origin`.
fn local_transform(origin: Vec2, scale: Vec2, angle: f32, offset: Vec2) -> Affine2 {
    Affine2::from_scale_angle_translation(scale, angle, offset) * Affine2::from_translation(-origin)
}

impl SpriteBatch {
    /// Create a batch and every GPU resource it draws with.
    ///
    /// Anything already allocated is released if a later allocation fails.
    pub fn new(device: Rc<dyn RenderDevice>, desc: SpriteBatchDescriptor) -> RenderResult<Self> {
        profile_function!();

        // Oversized shapes are split per primitive, so one triangle must fit.
        for (what, capacity) in [
            ("vertex", desc.vertex_capacity),
            ("index", desc.index_capacity),
        ] {
            if capacity < 3 {
                return Err(RenderError::CapacityExceeded {
                    what,
                    requested: 3,
                    capacity,
                });
            }
        }

        let shader = match desc.shader {
            Some(shader) => shader,
            None => Rc::new(Shader::sprite(device.clone())?),
        };

        let mut stream = StreamBuffer::new(
            device.clone(),
            SpriteVertex::STRIDE,
            desc.vertex_capacity,
            desc.index_capacity,
        )?;
        for (name, layout) in SpriteVertex::ATTRIBUTES {
            stream.setup_attribute(
                name,
                layout.components,
                layout.ty,
                layout.normalized,
                layout.offset,
            );
        }
        stream.attach(&shader);

        let mut uniforms = UniformBuffer::new(
            device.clone(),
            CONTEXT_BLOCK_FLOATS * size_of::<f32>(),
            desc.block_count,
        )?;
        uniforms.set_bind_point(desc.uniform_bind_point);
        uniforms.set_offset("scissor", SCISSOR_OFFSET);
        uniforms.set_offset("gradient", GRADIENT_OFFSET);

        let blank = Rc::new(Texture::blank(device.clone())?);

        tracing::debug!(
            vertex_capacity = desc.vertex_capacity,
            index_capacity = desc.index_capacity,
            block_count = desc.block_count,
            "Created sprite batch"
        );

        Ok(Self {
            device,
            shader,
            stream,
            uniforms,
            blank,
            vertices: Vec::with_capacity(desc.vertex_capacity),
            indices: Vec::with_capacity(desc.index_capacity),
            vertex_capacity: desc.vertex_capacity,
            index_capacity: desc.index_capacity,
            context: DrawingContext::new(),
            history: Vec::new(),
            color: Color::WHITE,
            gradient: None,
            scissor: None,
            pending_block: false,
            chunk_map: HashMap::default(),
            inflight: false,
            drawing: false,
            stats: SpriteBatchStats::default(),
        })
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn stats(&self) -> SpriteBatchStats {
        self.stats
    }

    /// The 2x2 white texture created with the batch.
    pub fn blank_texture(&self) -> &Rc<Texture> {
        &self.blank
    }

    pub fn shader(&self) -> &Rc<Shader> {
        &self.shader
    }

    /// Replace the shader. Not allowed between `begin()` and `end()`.
    pub fn set_shader(&mut self, shader: Rc<Shader>) -> RenderResult<()> {
        if self.drawing {
            return Err(RenderError::ShaderLocked);
        }
        self.shader = shader;
        self.stream.attach(&self.shader);
        Ok(())
    }

    // ---- State ----------------------------------------------------------

    pub fn color(&self) -> Color {
        self.color
    }

    /// Color of subsequent shapes. Stored per vertex, so it never splits a
    /// draw call.
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.context.texture.as_ref()
    }

    pub fn set_texture(&mut self, texture: Option<Rc<Texture>>) {
        let same = match (&self.context.texture, &texture) {
            (Some(current), Some(new)) => Rc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }

        self.prepare_change();
        let textured = texture.is_some();
        if self.context.draw_type.contains(DrawType::TEXTURE) != textured {
            self.context.draw_type.set(DrawType::TEXTURE, textured);
            self.context.dirty |= DirtyFlags::DRAW_TYPE;
        }
        self.context.texture = texture;
        self.context.dirty |= DirtyFlags::TEXTURE;
        if self.context.blur > 0 {
            // The blur step is relative to the texture size.
            self.context.dirty |= DirtyFlags::BLUR_STEP;
        }
    }

    pub fn gradient(&self) -> Option<&Gradient> {
        self.gradient.as_ref()
    }

    /// Paint subsequent shapes with a copy of `gradient`.
    pub fn set_gradient(&mut self, gradient: Option<&Gradient>) {
        if self.gradient.as_ref() == gradient {
            return;
        }
        self.prepare_change();
        self.gradient = gradient.copied();
        self.set_draw_type(DrawType::GRADIENT, gradient.is_some());
        self.pending_block = true;
    }

    pub fn scissor(&self) -> Option<&Scissor> {
        self.scissor.as_ref()
    }

    /// Clip subsequent shapes to a copy of `scissor`.
    pub fn set_scissor(&mut self, scissor: Option<&Scissor>) {
        if self.scissor.as_ref() == scissor {
            return;
        }
        self.prepare_change();
        self.scissor = scissor.copied();
        self.set_draw_type(DrawType::SCISSOR, scissor.is_some());
        self.pending_block = true;
    }

    pub fn blur(&self) -> u32 {
        self.context.blur
    }

    /// Blur textures over `step` texels; zero disables blurring.
    pub fn set_blur(&mut self, step: u32) {
        if self.context.blur == step {
            return;
        }
        self.prepare_change();
        self.set_draw_type(DrawType::BLUR, step > 0);
        self.context.blur = step;
        self.context.dirty |= DirtyFlags::BLUR_STEP;
    }

    pub fn is_blending(&self) -> bool {
        self.context.blend_enabled
    }

    pub fn set_blending(&mut self, enabled: bool) {
        if self.context.blend_enabled == enabled {
            return;
        }
        self.prepare_change();
        self.context.blend_enabled = enabled;
        self.context.dirty |= DirtyFlags::BLEND_EQUATION;
    }

    pub fn blend_state(&self) -> BlendState {
        self.context.blend
    }

    pub fn set_blend_equation(&mut self, equation: BlendEquation) {
        if self.context.blend.equation == equation {
            return;
        }
        self.prepare_change();
        self.context.blend.equation = equation;
        self.context.dirty |= DirtyFlags::BLEND_EQUATION;
    }

    pub fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.set_blend_func_separate(src, dst, src, dst);
    }

    pub fn set_blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        let blend = &self.context.blend;
        if (blend.src_rgb, blend.dst_rgb, blend.src_alpha, blend.dst_alpha)
            == (src_rgb, dst_rgb, src_alpha, dst_alpha)
        {
            return;
        }
        self.prepare_change();
        self.context.blend = BlendState {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
            ..self.context.blend
        };
        self.context.dirty |= DirtyFlags::BLEND_FUNCTION;
    }

    /// Apply a blend preset. [`BlendMode::Replace`] disables blending.
    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        match mode.to_blend_state() {
            None => self.set_blending(false),
            Some(state) => {
                self.set_blending(true);
                self.set_blend_equation(state.equation);
                self.set_blend_func_separate(
                    state.src_rgb,
                    state.dst_rgb,
                    state.src_alpha,
                    state.dst_alpha,
                );
            }
        }
    }

    pub fn perspective(&self) -> Mat4 {
        self.context.perspective
    }

    pub fn set_perspective(&mut self, perspective: Mat4) {
        if self.context.perspective == perspective {
            return;
        }
        self.prepare_change();
        self.context.perspective = perspective;
        self.context.dirty |= DirtyFlags::PERSPECTIVE;
    }

    /// Orthographic projection with the origin at the bottom-left and one
    /// unit per pixel.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.set_perspective(Mat4::orthographic_rh_gl(0.0, width, 0.0, height, -1.0, 1.0));
    }

    pub fn transform(&self) -> Affine2 {
        self.context.transform
    }

    /// Model transform applied on the GPU after each shape's own transform.
    pub fn set_transform(&mut self, transform: Affine2) {
        if self.context.transform == transform {
            return;
        }
        self.prepare_change();
        self.context.transform = transform;
        self.context.dirty |= DirtyFlags::PERSPECTIVE;
    }

    pub fn stencil_effect(&self) -> StencilEffect {
        self.context.stencil_effect
    }

    pub fn set_stencil_effect(&mut self, effect: StencilEffect) {
        if self.context.stencil_effect == effect {
            return;
        }
        self.prepare_change();
        self.context.stencil_effect = effect;
        self.context.dirty |= DirtyFlags::STENCIL_EFFECT;
    }

    /// Clear the whole stencil buffer before the next shapes are drawn.
    pub fn clear_stencil(&mut self) {
        self.request_stencil_clear(StencilRegion::Both);
    }

    /// Clear the lower (`true`) or upper half of the stencil buffer before
    /// the next shapes are drawn.
    pub fn clear_half_stencil(&mut self, lower: bool) {
        let region = if lower {
            StencilRegion::Lower
        } else {
            StencilRegion::Upper
        };
        self.request_stencil_clear(region);
    }

    fn request_stencil_clear(&mut self, region: StencilRegion) {
        self.prepare_change();
        let region = match self.context.stencil_clear {
            Some(existing) => existing.union(region),
            None => region,
        };
        self.context.stencil_clear = Some(region);
        self.context.dirty |= DirtyFlags::STENCIL_CLEAR;
    }

    fn set_draw_type(&mut self, flag: DrawType, enabled: bool) {
        if self.context.draw_type.contains(flag) != enabled {
            self.context.draw_type.set(flag, enabled);
            self.context.dirty |= DirtyFlags::DRAW_TYPE;
        }
    }

    fn set_command(&mut self, command: DrawMode) {
        if self.context.command != command {
            self.prepare_change();
            self.context.command = command;
        }
    }

    /// Freeze the live context first if geometry is queued under it.
    fn prepare_change(&mut self) {
        if self.inflight {
            self.record();
        }
    }

    fn record(&mut self) {
        let end = self.indices.len();
        self.context.last = end;
        let next = self.context.successor(end);
        let done = std::mem::replace(&mut self.context, next);
        tracing::trace!(
            first = done.first,
            last = done.last,
            dirty = ?done.dirty,
            "Recorded drawing context"
        );
        self.history.push(done);
        self.inflight = false;
    }

    // ---- Frame ----------------------------------------------------------

    /// Start a frame: bind every resource and mark all state for upload.
    pub fn begin(&mut self) -> RenderResult<()> {
        if self.drawing {
            return Err(RenderError::AlreadyDrawing);
        }
        profile_function!();

        self.stats = SpriteBatchStats::default();
        self.vertices.clear();
        self.indices.clear();
        self.history.clear();
        self.chunk_map.clear();
        self.context.first = 0;
        self.context.last = 0;
        self.context.block = None;

        self.shader.bind();
        self.shader.set_uniform_i32(names::TEXTURE, 0);
        self.shader
            .set_uniform_block(names::CONTEXT_BLOCK, self.uniforms.bind_point());
        self.stream.attach(&self.shader);
        self.stream.bind();
        self.uniforms.bind(false);
        self.device.depth_mask(false);

        self.context.dirty = DirtyFlags::all();
        self.pending_block = self.gradient.is_some() || self.scissor.is_some();
        self.inflight = false;
        self.drawing = true;
        Ok(())
    }

    /// Draw everything queued so far.
    pub fn flush(&mut self) -> RenderResult<()> {
        self.require_drawing()?;
        profile_function!();

        let clear_pending = self.context.stencil_clear.is_some();
        if self.indices.is_empty() && self.history.is_empty() && !clear_pending {
            return Ok(());
        }
        if self.context.first != self.indices.len() || clear_pending {
            self.record();
        }

        {
            profile_scope!("upload");
            self.stream.load_vertex_data(
                bytemuck::cast_slice(&self.vertices),
                self.vertices.len(),
                BufferUsage::Stream,
            )?;
            self.stream
                .load_index_data(&self.indices, self.indices.len(), BufferUsage::Stream)?;

            self.uniforms.activate();
            let flushed = self.uniforms.flush();
            self.uniforms.deactivate();
            flushed?;
        }

        let mut history = std::mem::take(&mut self.history);
        let replayed = {
            profile_scope!("replay");
            history.iter().try_for_each(|context| self.replay(context))
        };
        self.stats.segments += history.len();
        self.stats.flushes += 1;
        tracing::debug!(
            segments = history.len(),
            vertices = self.vertices.len(),
            indices = self.indices.len(),
            "Flushed sprite batch"
        );
        history.clear();
        self.history = history;

        self.vertices.clear();
        self.indices.clear();
        self.chunk_map.clear();
        self.context.first = 0;
        self.context.last = 0;
        self.context.block = None;
        self.pending_block = self.gradient.is_some() || self.scissor.is_some();
        self.inflight = false;
        replayed
    }

    /// Apply the state changes of `context`, then draw its range.
    fn replay(&mut self, context: &DrawingContext) -> RenderResult<()> {
        let dirty = context.dirty;
        let device = &*self.device;

        if dirty.contains(DirtyFlags::BLEND_EQUATION) {
            device.set_capability(Capability::Blend, context.blend_enabled);
            if context.blend_enabled {
                device.blend_equation(context.blend.equation);
            }
        }
        if dirty.contains(DirtyFlags::BLEND_FUNCTION) {
            let blend = &context.blend;
            device.blend_func_separate(
                blend.src_rgb,
                blend.dst_rgb,
                blend.src_alpha,
                blend.dst_alpha,
            );
        }
        if dirty.contains(DirtyFlags::DRAW_TYPE) {
            self.shader
                .set_uniform(names::TYPE, UniformValue::Int(context.draw_type.bits() as i32));
        }
        if dirty.contains(DirtyFlags::PERSPECTIVE) {
            self.shader
                .set_uniform_mat4(names::PERSPECTIVE, &context.view_matrix());
        }
        if dirty.contains(DirtyFlags::TEXTURE)
            && let Some(texture) = &context.texture
        {
            texture.bind(0);
        }
        if dirty.contains(DirtyFlags::UNIFORM_BLOCK)
            && let Some(block) = context.block
        {
            self.uniforms.select_block(block)?;
        }
        if dirty.contains(DirtyFlags::BLUR_STEP) {
            let step = match &context.texture {
                Some(texture) => Vec2::new(
                    context.blur as f32 / texture.width().max(1) as f32,
                    context.blur as f32 / texture.height().max(1) as f32,
                ),
                None => Vec2::ZERO,
            };
            self.shader.set_uniform_vec2(names::BLUR, step);
        }

        let cleared = match context.stencil_clear {
            Some(region) if dirty.contains(DirtyFlags::STENCIL_CLEAR) => {
                stencil::clear_buffer(device, region);
                true
            }
            _ => false,
        };
        // A clear leaves the stencil write mask changed, so the effect is
        // re-applied after it.
        if cleared || dirty.contains(DirtyFlags::STENCIL_EFFECT) {
            context.stencil_effect.apply(device);
        }

        let count = context.index_count();
        if count > 0 {
            self.stream.draw(context.command, count, context.first)?;
            self.stats.draw_calls += 1;
        }
        Ok(())
    }

    /// Finish the frame: flush and restore the GL state `begin()` changed.
    pub fn end(&mut self) -> RenderResult<()> {
        self.require_drawing()?;
        profile_function!();

        self.flush()?;

        // The live context may disagree with the last replayed segment, so
        // blending is always switched off here.
        self.device.set_capability(Capability::Blend, false);
        self.device.depth_mask(true);
        StencilEffect::None.apply(&*self.device);

        self.uniforms.unbind();
        self.stream.unbind();
        self.shader.unbind();
        self.drawing = false;
        Ok(())
    }

    fn require_drawing(&self) -> RenderResult<()> {
        if self.drawing {
            Ok(())
        } else {
            Err(RenderError::NotDrawing)
        }
    }

    // ---- Shapes ---------------------------------------------------------

    pub fn fill_rect(&mut self, rect: Rect<f32>) -> RenderResult<()> {
        self.fill_rect_affine(rect, Vec2::ZERO, &Affine2::IDENTITY)
    }

    /// Fill `rect` scaled and rotated about `origin`, then moved by `offset`.
    pub fn fill_rect_transformed(
        &mut self,
        rect: Rect<f32>,
        origin: Vec2,
        scale: Vec2,
        angle: f32,
        offset: Vec2,
    ) -> RenderResult<()> {
        let transform = local_transform(origin, scale, angle, offset);
        self.fill_rect_affine(rect, Vec2::ZERO, &transform)
    }

    /// Fill `rect` with `origin` moved to zero, then placed by `transform`.
    pub fn fill_rect_affine(
        &mut self,
        rect: Rect<f32>,
        origin: Vec2,
        transform: &Affine2,
    ) -> RenderResult<()> {
        let transform = *transform * Affine2::from_translation(-origin);
        self.submit(DrawMode::Triangles, &rect.corners(), &RECT_INDICES, &transform, rect)
    }

    pub fn outline_rect(&mut self, rect: Rect<f32>) -> RenderResult<()> {
        self.outline_rect_affine(rect, Vec2::ZERO, &Affine2::IDENTITY)
    }

    pub fn outline_rect_transformed(
        &mut self,
        rect: Rect<f32>,
        origin: Vec2,
        scale: Vec2,
        angle: f32,
        offset: Vec2,
    ) -> RenderResult<()> {
        let transform = local_transform(origin, scale, angle, offset);
        self.outline_rect_affine(rect, Vec2::ZERO, &transform)
    }

    pub fn outline_rect_affine(
        &mut self,
        rect: Rect<f32>,
        origin: Vec2,
        transform: &Affine2,
    ) -> RenderResult<()> {
        let transform = *transform * Affine2::from_translation(-origin);
        self.submit(DrawMode::Lines, &rect.corners(), &RECT_OUTLINE_INDICES, &transform, rect)
    }

    /// Fill a triangulated polygon moved by `offset`.
    pub fn fill_poly(&mut self, poly: &Poly2, offset: Vec2) -> RenderResult<()> {
        self.fill_poly_affine(poly, Vec2::ZERO, &Affine2::from_translation(offset))
    }

    pub fn fill_poly_transformed(
        &mut self,
        poly: &Poly2,
        origin: Vec2,
        scale: Vec2,
        angle: f32,
        offset: Vec2,
    ) -> RenderResult<()> {
        let transform = local_transform(origin, scale, angle, offset);
        self.fill_poly_affine(poly, Vec2::ZERO, &transform)
    }

    pub fn fill_poly_affine(
        &mut self,
        poly: &Poly2,
        origin: Vec2,
        transform: &Affine2,
    ) -> RenderResult<()> {
        let transform = *transform * Affine2::from_translation(-origin);
        self.submit(DrawMode::Triangles, poly.vertices(), poly.indices(), &transform, poly.bounds())
    }

    /// Draw the segments of a line-indexed polygon moved by `offset`.
    pub fn outline_poly(&mut self, poly: &Poly2, offset: Vec2) -> RenderResult<()> {
        self.outline_poly_affine(poly, Vec2::ZERO, &Affine2::from_translation(offset))
    }

    pub fn outline_poly_transformed(
        &mut self,
        poly: &Poly2,
        origin: Vec2,
        scale: Vec2,
        angle: f32,
        offset: Vec2,
    ) -> RenderResult<()> {
        let transform = local_transform(origin, scale, angle, offset);
        self.outline_poly_affine(poly, Vec2::ZERO, &transform)
    }

    pub fn outline_poly_affine(
        &mut self,
        poly: &Poly2,
        origin: Vec2,
        transform: &Affine2,
    ) -> RenderResult<()> {
        let transform = *transform * Affine2::from_translation(-origin);
        self.submit(DrawMode::Lines, poly.vertices(), poly.indices(), &transform, poly.bounds())
    }

    /// Stretch `texture` over `rect`.
    ///
    /// The texture stays active for later shapes until changed.
    pub fn draw(&mut self, texture: &Rc<Texture>, rect: Rect<f32>) -> RenderResult<()> {
        self.require_drawing()?;
        self.set_texture(Some(texture.clone()));
        self.fill_rect(rect)
    }

    pub fn draw_transformed(
        &mut self,
        texture: &Rc<Texture>,
        rect: Rect<f32>,
        origin: Vec2,
        scale: Vec2,
        angle: f32,
        offset: Vec2,
    ) -> RenderResult<()> {
        self.require_drawing()?;
        self.set_texture(Some(texture.clone()));
        self.fill_rect_transformed(rect, origin, scale, angle, offset)
    }

    /// Fill `poly` with `texture` at its natural size, the texture's
    /// bottom-left corner at the polygon's local origin.
    pub fn draw_poly(&mut self, texture: &Rc<Texture>, poly: &Poly2, offset: Vec2) -> RenderResult<()> {
        self.require_drawing()?;
        self.set_texture(Some(texture.clone()));
        let frame = Rect::new(0.0, 0.0, texture.width() as f32, texture.height() as f32);
        let transform = Affine2::from_translation(offset);
        self.prepare(DrawMode::Triangles, poly.vertices(), poly.indices(), &transform, frame)
    }

    // ---- Submission -----------------------------------------------------

    fn submit(
        &mut self,
        mode: DrawMode,
        vertices: &[Vec2],
        indices: &[u32],
        transform: &Affine2,
        tex_frame: Rect<f32>,
    ) -> RenderResult<()> {
        self.require_drawing()?;
        self.prepare(mode, vertices, indices, transform, tex_frame)
    }

    /// Queue `indices` over `vertices`, flushing or chunking as needed.
    fn prepare(
        &mut self,
        mode: DrawMode,
        vertices: &[Vec2],
        indices: &[u32],
        transform: &Affine2,
        tex_frame: Rect<f32>,
    ) -> RenderResult<()> {
        self.require_drawing()?;
        let primitive = mode.primitive_size();
        if indices.len() % primitive != 0
            || indices.iter().any(|&i| i as usize >= vertices.len())
        {
            return Err(RenderError::MalformedIndices {
                mode,
                count: indices.len(),
            });
        }
        if indices.is_empty() {
            return Ok(());
        }

        let builder =
            VertexBuilder::new(*transform, self.color, tex_frame, Rect::bounding(vertices));
        self.set_command(mode);
        self.stats.primitives += indices.len() / primitive;

        if vertices.len() > self.vertex_capacity || indices.len() > self.index_capacity {
            return self.chunkify(&builder, primitive, vertices, indices);
        }

        if self.vertices.len() + vertices.len() > self.vertex_capacity
            || self.indices.len() + indices.len() > self.index_capacity
        {
            self.flush()?;
        }
        if self.pending_block {
            self.set_uniform_block()?;
        }

        let base = self.vertices.len() as u32;
        self.vertices
            .extend(vertices.iter().map(|&p| builder.build(p)));
        self.indices.extend(indices.iter().map(|&i| base + i));
        self.stats.vertices += vertices.len();
        self.inflight = true;
        Ok(())
    }

    /// Queue a polygon too large for the stream one primitive at a time,
    /// sharing vertices within each flush.
    fn chunkify(
        &mut self,
        builder: &VertexBuilder,
        primitive: usize,
        vertices: &[Vec2],
        indices: &[u32],
    ) -> RenderResult<()> {
        profile_function!();
        tracing::debug!(
            vertices = vertices.len(),
            indices = indices.len(),
            "Chunking oversized polygon"
        );

        self.chunk_map.clear();
        for shape in indices.chunks_exact(primitive) {
            if self.vertices.len() + primitive > self.vertex_capacity
                || self.indices.len() + primitive > self.index_capacity
            {
                self.flush()?;
            }
            if self.pending_block {
                self.set_uniform_block()?;
            }

            for &source in shape {
                let index = match self.chunk_map.get(&source) {
                    Some(&index) => index,
                    None => {
                        let index = self.vertices.len() as u32;
                        self.vertices.push(builder.build(vertices[source as usize]));
                        self.chunk_map.insert(source, index);
                        self.stats.vertices += 1;
                        index
                    }
                };
                self.indices.push(index);
            }
            self.inflight = true;
        }
        Ok(())
    }

    /// Write the current scissor and gradient into the next uniform block.
    fn set_uniform_block(&mut self) -> RenderResult<()> {
        self.pending_block = false;
        if self.gradient.is_none() && self.scissor.is_none() {
            return Ok(());
        }

        let mut next = self.context.block.map_or(0, |block| block + 1);
        if next >= self.uniforms.block_count() {
            self.flush()?;
            self.pending_block = false;
            next = 0;
        }

        let mut data = [0.0f32; CONTEXT_BLOCK_FLOATS];
        if let Some(scissor) = &self.scissor {
            data[..16].copy_from_slice(&scissor.data());
        }
        if let Some(gradient) = &self.gradient {
            data[16..].copy_from_slice(&gradient.data());
        }

        self.prepare_change();
        self.uniforms
            .set_uniformfv(Block::Index(next), Field::Offset(0), &data)?;
        self.context.block = Some(next);
        self.context.dirty |= DirtyFlags::UNIFORM_BLOCK;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_test_utils::MockRenderDevice;

    fn batch(vertex_capacity: usize) -> (Rc<MockRenderDevice>, SpriteBatch) {
        let mock = Rc::new(MockRenderDevice::new());
        let desc = SpriteBatchDescriptor {
            vertex_capacity,
            index_capacity: vertex_capacity * 3,
            ..Default::default()
        };
        let batch = SpriteBatch::new(mock.clone(), desc).unwrap();
        (mock, batch)
    }

    #[test]
    fn test_vertex_builder_coordinates() {
        let frame = Rect::new(10.0, 10.0, 20.0, 40.0);
        let builder = VertexBuilder::new(
            Affine2::from_translation(Vec2::new(1.0, 2.0)),
            Color::WHITE,
            frame,
            frame,
        );

        let v = builder.build(Vec2::new(20.0, 20.0));
        assert_eq!(v.position, Vec2::new(21.0, 22.0).into());
        assert_eq!(v.texcoord, Vec2::new(0.5, 0.75).into());
        assert_eq!(v.gradcoord, Vec2::new(0.5, 0.25).into());
        assert_eq!(v.color, u32::MAX);
    }

    #[test]
    fn test_zero_size_frame() {
        let builder = VertexBuilder::new(Affine2::IDENTITY, Color::WHITE, Rect::ZERO, Rect::ZERO);
        let v = builder.build(Vec2::new(3.0, 3.0));
        assert_eq!(v.gradcoord, Vec2::ZERO.into());
    }

    #[test]
    fn test_local_transform_order() {
        let transform = local_transform(
            Vec2::new(1.0, 1.0),
            Vec2::splat(2.0),
            std::f32::consts::FRAC_PI_2,
            Vec2::new(10.0, 0.0),
        );
        // (2, 1) -> origin shift (1, 0) -> scale (2, 0) -> rotate (0, 2) -> offset.
        let p = transform.transform_point2(Vec2::new(2.0, 1.0));
        assert!((p - Vec2::new(10.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_setters_outside_draw_do_not_record() {
        let (_mock, mut batch) = batch(64);
        batch.set_blend_mode(BlendMode::Additive);
        batch.set_stencil_effect(StencilEffect::Clip);
        batch.set_blur(2);
        assert!(batch.history.is_empty());
        assert_eq!(batch.stencil_effect(), StencilEffect::Clip);
    }

    #[test]
    fn test_draw_before_begin() {
        let (_mock, mut batch) = batch(64);
        assert_eq!(
            batch.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0)),
            Err(RenderError::NotDrawing)
        );
        assert_eq!(batch.end(), Err(RenderError::NotDrawing));
        batch.begin().unwrap();
        assert_eq!(batch.begin(), Err(RenderError::AlreadyDrawing));
    }

    #[test]
    fn test_malformed_indices() {
        let (_mock, mut batch) = batch(64);
        batch.begin().unwrap();
        let poly = Poly2::new(vec![Vec2::ZERO, Vec2::X, Vec2::Y], vec![0, 1, 3]);
        assert!(matches!(
            batch.fill_poly(&poly, Vec2::ZERO),
            Err(RenderError::MalformedIndices { .. })
        ));
        let poly = Poly2::new(vec![Vec2::ZERO, Vec2::X, Vec2::Y], vec![0, 1]);
        assert!(matches!(
            batch.fill_poly(&poly, Vec2::ZERO),
            Err(RenderError::MalformedIndices { .. })
        ));
    }

    #[test]
    fn test_set_uniform_block_advances() {
        let (_mock, mut batch) = batch(64);
        batch.begin().unwrap();
        batch.set_gradient(Some(&Gradient::solid(Color::RED)));
        batch.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert_eq!(batch.context.block, Some(0));

        batch.set_gradient(Some(&Gradient::solid(Color::BLUE)));
        batch.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert_eq!(batch.context.block, Some(1));
        assert_eq!(batch.history.len(), 1);

        let mut out = [0.0; 4];
        batch
            .uniforms
            .get_uniformfv(1, Field::Offset(GRADIENT_OFFSET + 48), &mut out)
            .unwrap();
        assert_eq!(out, Color::BLUE.to_array());
    }
}
