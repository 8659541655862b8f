//! Interleaved vertex stream with a CPU mirror.

use std::fmt;
use std::rc::Rc;

use tessera_test_utils::{
    AttributeLayout, AttributeType, BufferId, BufferTarget, BufferUsage, DrawMode, RenderDevice,
    VertexArrayId,
};

use crate::error::{RenderError, RenderResult};
use crate::shader::Shader;

#[derive(Debug, Clone)]
struct AttributeBinding {
    name: String,
    layout: AttributeLayout,
}

/// A vertex array with one vertex buffer and one `u32` index buffer.
///
/// Attribute descriptions are registered by name and resolved against the
/// attached shader. They are re-resolved every time a shader is attached,
/// since locations differ between programs.
pub struct StreamBuffer {
    device: Rc<dyn RenderDevice>,
    vertex_array: VertexArrayId,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    stride: usize,
    vertex_capacity: usize,
    index_capacity: usize,
    vertex_data: Vec<u8>,
    index_data: Vec<u32>,
    attributes: Vec<AttributeBinding>,
    shader: Option<Rc<Shader>>,
    bound: bool,
}

impl StreamBuffer {
    /// Allocate room for `vertex_capacity` vertices of `stride` bytes and
    /// `index_capacity` indices.
    pub fn new(
        device: Rc<dyn RenderDevice>,
        stride: usize,
        vertex_capacity: usize,
        index_capacity: usize,
    ) -> RenderResult<Self> {
        if stride == 0 {
            return Err(RenderError::InvalidStride);
        }

        let vertex_array = device.create_vertex_array()?;
        let vertex_buffer = match device.create_buffer() {
            Ok(buffer) => buffer,
            Err(err) => {
                device.delete_vertex_array(vertex_array);
                return Err(err.into());
            }
        };
        let index_buffer = match device.create_buffer() {
            Ok(buffer) => buffer,
            Err(err) => {
                device.delete_buffer(vertex_buffer);
                device.delete_vertex_array(vertex_array);
                return Err(err.into());
            }
        };

        // Every handle is owned from here on; dropping `stream` releases them.
        let stream = Self {
            device,
            vertex_array,
            vertex_buffer,
            index_buffer,
            stride,
            vertex_capacity,
            index_capacity,
            vertex_data: vec![0; stride * vertex_capacity],
            index_data: vec![0; index_capacity],
            attributes: Vec::new(),
            shader: None,
            bound: false,
        };
        stream.allocate()?;

        tracing::debug!(
            ?vertex_array,
            stride,
            vertex_capacity,
            index_capacity,
            "Created stream buffer"
        );
        Ok(stream)
    }

    fn allocate(&self) -> RenderResult<()> {
        self.device.bind_vertex_array(Some(self.vertex_array));
        self.device
            .bind_buffer(BufferTarget::Vertex, Some(self.vertex_buffer));
        self.device
            .bind_buffer(BufferTarget::Index, Some(self.index_buffer));

        let result = self
            .device
            .allocate_buffer(
                BufferTarget::Vertex,
                self.stride * self.vertex_capacity,
                BufferUsage::Stream,
            )
            .and_then(|()| {
                self.device.allocate_buffer(
                    BufferTarget::Index,
                    self.index_capacity * size_of::<u32>(),
                    BufferUsage::Stream,
                )
            });

        self.device.bind_vertex_array(None);
        self.device.bind_buffer(BufferTarget::Vertex, None);
        self.device.bind_buffer(BufferTarget::Index, None);
        result.map_err(|err| {
            tracing::error!("Failed to allocate stream buffer: {}", err);
            err.into()
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn index_capacity(&self) -> usize {
        self.index_capacity
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn shader(&self) -> Option<&Rc<Shader>> {
        self.shader.as_ref()
    }

    /// CPU copy of the vertex data last loaded.
    pub fn vertex_data(&self) -> &[u8] {
        &self.vertex_data
    }

    /// CPU copy of the index data last loaded.
    pub fn index_data(&self) -> &[u32] {
        &self.index_data
    }

    /// Describe the attribute `name` inside each vertex.
    ///
    /// If a shader is attached the attribute is resolved immediately; a
    /// shader without that attribute only logs a warning.
    pub fn setup_attribute(
        &mut self,
        name: &str,
        components: u32,
        ty: AttributeType,
        normalized: bool,
        offset: usize,
    ) {
        let binding = AttributeBinding {
            name: name.to_string(),
            layout: AttributeLayout {
                components,
                ty,
                normalized,
                offset,
            },
        };

        if let Some(shader) = self.shader.clone() {
            self.with_bound(|stream| stream.bind_attribute(&shader, &binding));
        }

        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => *existing = binding,
            None => self.attributes.push(binding),
        }
    }

    /// Resolve every registered attribute against `shader`.
    pub fn attach(&mut self, shader: &Rc<Shader>) {
        let same = self
            .shader
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, shader));
        if !same {
            self.shader = Some(shader.clone());
        }

        self.with_bound(|stream| {
            for binding in &stream.attributes {
                stream.bind_attribute(shader, binding);
            }
        });
    }

    pub fn bind(&mut self) {
        self.device.bind_vertex_array(Some(self.vertex_array));
        self.device
            .bind_buffer(BufferTarget::Vertex, Some(self.vertex_buffer));
        self.device
            .bind_buffer(BufferTarget::Index, Some(self.index_buffer));
        self.bound = true;
    }

    pub fn unbind(&mut self) {
        self.device.bind_vertex_array(None);
        self.device.bind_buffer(BufferTarget::Vertex, None);
        self.device.bind_buffer(BufferTarget::Index, None);
        self.bound = false;
    }

    /// Copy `count` vertices from `data` and upload them. Must be bound.
    pub fn load_vertex_data(
        &mut self,
        data: &[u8],
        count: usize,
        usage: BufferUsage,
    ) -> RenderResult<()> {
        if !self.bound {
            return Err(RenderError::NotBound {
                operation: "load_vertex_data",
            });
        }
        if count > self.vertex_capacity {
            return Err(RenderError::CapacityExceeded {
                what: "vertex",
                requested: count,
                capacity: self.vertex_capacity,
            });
        }
        let len = count * self.stride;
        if data.len() < len {
            return Err(RenderError::CapacityExceeded {
                what: "vertex source",
                requested: len,
                capacity: data.len(),
            });
        }

        self.vertex_data[..len].copy_from_slice(&data[..len]);
        self.device
            .upload_buffer(BufferTarget::Vertex, &self.vertex_data[..len], usage);
        Ok(())
    }

    /// Copy `count` indices from `data` and upload them. Must be bound.
    pub fn load_index_data(
        &mut self,
        data: &[u32],
        count: usize,
        usage: BufferUsage,
    ) -> RenderResult<()> {
        if !self.bound {
            return Err(RenderError::NotBound {
                operation: "load_index_data",
            });
        }
        if count > self.index_capacity || count > data.len() {
            return Err(RenderError::CapacityExceeded {
                what: "index",
                requested: count,
                capacity: self.index_capacity.min(data.len()),
            });
        }

        self.index_data[..count].copy_from_slice(&data[..count]);
        self.device.upload_buffer(
            BufferTarget::Index,
            bytemuck::cast_slice(&self.index_data[..count]),
            usage,
        );
        Ok(())
    }

    /// Draw `count` indices starting at index `offset`. Must be bound.
    pub fn draw(&self, mode: DrawMode, count: usize, offset: usize) -> RenderResult<()> {
        if !self.bound {
            return Err(RenderError::NotBound { operation: "draw" });
        }
        if offset + count > self.index_capacity {
            return Err(RenderError::CapacityExceeded {
                what: "index",
                requested: offset + count,
                capacity: self.index_capacity,
            });
        }
        self.device
            .draw_elements(mode, count, offset * size_of::<u32>());
        Ok(())
    }

    fn bind_attribute(&self, shader: &Shader, binding: &AttributeBinding) {
        match shader.attribute_location(&binding.name) {
            Some(location) => {
                self.device
                    .vertex_attribute(location, &binding.layout, self.stride);
            }
            None => {
                tracing::warn!(
                    program = ?shader.program(),
                    "Shader has no attribute named '{}'",
                    binding.name
                );
            }
        }
    }

    /// Run `f` with the vertex array bound, restoring the previous binding.
    fn with_bound(&mut self, f: impl FnOnce(&Self)) {
        let was_bound = self.bound;
        if !was_bound {
            self.bind();
        }
        f(self);
        if !was_bound {
            self.unbind();
        }
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("vertex_array", &self.vertex_array)
            .field("stride", &self.stride)
            .field("vertex_capacity", &self.vertex_capacity)
            .field("index_capacity", &self.index_capacity)
            .field("bound", &self.bound)
            .finish()
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        self.device.delete_buffer(self.index_buffer);
        self.device.delete_buffer(self.vertex_buffer);
        self.device.delete_vertex_array(self.vertex_array);
    }
}
