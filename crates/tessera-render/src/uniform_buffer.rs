//! Uniform buffer split into independently selectable blocks.
//!
//! The buffer holds `block_count` copies of one uniform block, each padded
//! to the device's uniform offset alignment so any single block can be bound
//! with `bind_buffer_range`. Writes land in a CPU mirror first and reach the
//! GPU on [`UniformBuffer::flush`], or immediately when auto-flush is on and
//! the buffer is the active write target.
//!
//! Two kinds of binding are tracked separately:
//!
//! * **bound**: the buffer is attached to its uniform bind point, so shaders
//!   can read from it.
//! * **active**: the buffer is bound to the uniform buffer target, so writes
//!   can be pushed to it.

use std::fmt;
use std::rc::Rc;

use tessera_core::alloc::HashMap;
use tessera_core::math::{Affine2, Mat4, Quat, Vec2, Vec3, Vec4, affine2_to_padded_mat3};
use tessera_test_utils::{BufferId, BufferTarget, BufferUsage, RenderDevice};

use crate::Color;
use crate::error::{RenderError, RenderResult};

/// Returned by [`UniformBuffer::offset`] for names that were never registered.
pub const INVALID_OFFSET: usize = usize::MAX;

/// Which block(s) a write addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// Write the same bytes into every block.
    All,
    Index(usize),
}

impl From<usize> for Block {
    fn from(index: usize) -> Self {
        Block::Index(index)
    }
}

/// Location of a value inside a block: a byte offset or a registered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field<'a> {
    Offset(usize),
    Named(&'a str),
}

impl From<usize> for Field<'_> {
    fn from(offset: usize) -> Self {
        Field::Offset(offset)
    }
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(name: &'a str) -> Self {
        Field::Named(name)
    }
}

pub struct UniformBuffer {
    device: Rc<dyn RenderDevice>,
    buffer: BufferId,
    bind_point: u32,
    block_count: usize,
    block_capacity: usize,
    block_stride: usize,
    data: Vec<u8>,
    offsets: HashMap<String, usize>,
    active: bool,
    bound: bool,
    dirty: bool,
    auto_flush: bool,
}

impl UniformBuffer {
    /// Allocate `block_count` blocks of at least `block_capacity` bytes.
    ///
    /// Fails with [`RenderError::BlockOverflow`] if the padded blocks exceed
    /// the device's maximum uniform block size.
    pub fn new(
        device: Rc<dyn RenderDevice>,
        block_capacity: usize,
        block_count: usize,
    ) -> RenderResult<Self> {
        if block_count == 0 {
            return Err(RenderError::BlockOutOfRange { index: 0, count: 0 });
        }

        let limits = device.limits();
        let alignment = limits.uniform_buffer_offset_alignment.max(1);
        let block_stride = block_capacity.max(1).div_ceil(alignment) * alignment;
        let size = block_stride * block_count;
        if size > limits.max_uniform_block_size {
            return Err(RenderError::BlockOverflow {
                required: size,
                limit: limits.max_uniform_block_size,
            });
        }

        let buffer = device.create_buffer()?;
        device.bind_buffer(BufferTarget::Uniform, Some(buffer));
        let allocated = device.allocate_buffer(BufferTarget::Uniform, size, BufferUsage::Stream);
        device.bind_buffer(BufferTarget::Uniform, None);
        if let Err(err) = allocated {
            tracing::error!("Failed to allocate uniform buffer: {}", err);
            device.delete_buffer(buffer);
            return Err(err.into());
        }

        tracing::debug!(
            ?buffer,
            block_capacity,
            block_stride,
            block_count,
            "Created uniform buffer"
        );

        Ok(Self {
            device,
            buffer,
            bind_point: 0,
            block_count,
            block_capacity,
            block_stride,
            data: vec![0; size],
            offsets: HashMap::default(),
            active: false,
            bound: false,
            dirty: false,
            auto_flush: false,
        })
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Usable bytes per block.
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Distance in bytes between consecutive blocks.
    pub fn block_stride(&self) -> usize {
        self.block_stride
    }

    pub fn bind_point(&self) -> u32 {
        self.bind_point
    }

    /// Move the buffer to another bind point, rebinding if currently bound.
    pub fn set_bind_point(&mut self, bind_point: u32) {
        if self.bound {
            self.device.bind_buffer_base(self.bind_point, None);
            self.device.bind_buffer_base(bind_point, Some(self.buffer));
        }
        self.bind_point = bind_point;
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn auto_flush(&self) -> bool {
        self.auto_flush
    }

    /// Push writes to the GPU as they happen while active.
    pub fn set_auto_flush(&mut self, auto_flush: bool) {
        self.auto_flush = auto_flush;
    }

    /// Attach the buffer to its bind point, optionally activating it too.
    pub fn bind(&mut self, activate: bool) {
        self.device.bind_buffer_base(self.bind_point, Some(self.buffer));
        self.bound = true;
        if activate {
            self.activate();
        }
    }

    pub fn unbind(&mut self) {
        if self.active {
            self.deactivate();
        }
        self.device.bind_buffer_base(self.bind_point, None);
        self.bound = false;
    }

    /// Make this buffer the target of uniform buffer writes.
    pub fn activate(&mut self) {
        self.device
            .bind_buffer(BufferTarget::Uniform, Some(self.buffer));
        self.active = true;
        if self.dirty && self.auto_flush {
            self.push();
        }
    }

    pub fn deactivate(&mut self) {
        self.device.bind_buffer(BufferTarget::Uniform, None);
        self.active = false;
    }

    /// Register `name` at `offset` bytes into each block.
    pub fn set_offset(&mut self, name: &str, offset: usize) {
        self.offsets.insert(name.to_string(), offset);
    }

    /// Byte offset of `name`, or [`INVALID_OFFSET`].
    pub fn offset(&self, name: &str) -> usize {
        self.offsets.get(name).copied().unwrap_or(INVALID_OFFSET)
    }

    /// Make block `index` the range seen by shaders at the bind point.
    pub fn select_block(&self, index: usize) -> RenderResult<()> {
        if !self.bound {
            return Err(RenderError::NotBound {
                operation: "select_block",
            });
        }
        self.check_block(index)?;
        self.device.bind_buffer_range(
            self.bind_point,
            self.buffer,
            index * self.block_stride,
            self.block_capacity,
        );
        Ok(())
    }

    /// Write `values` at `field` of `block`.
    ///
    /// Broadcasting with [`Block::All`] while active with auto-flush issues
    /// one GPU write per block; deactivate first when writing in bulk.
    pub fn set_uniformfv(
        &mut self,
        block: Block,
        field: Field<'_>,
        values: &[f32],
    ) -> RenderResult<()> {
        let Some(offset) = self.resolve(field) else {
            return Ok(());
        };
        let bytes: &[u8] = bytemuck::cast_slice(values);
        self.check_range(offset, bytes.len())?;

        let blocks = match block {
            Block::All => 0..self.block_count,
            Block::Index(index) => {
                self.check_block(index)?;
                index..index + 1
            }
        };

        let immediate = self.active && self.auto_flush;
        for index in blocks {
            let start = index * self.block_stride + offset;
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            if immediate {
                self.device
                    .write_buffer(BufferTarget::Uniform, start, bytes);
            }
        }
        if !immediate {
            self.dirty = true;
        }
        Ok(())
    }

    /// Read back `out.len()` floats at `field` of block `index` from the
    /// CPU mirror.
    pub fn get_uniformfv(
        &self,
        index: usize,
        field: Field<'_>,
        out: &mut [f32],
    ) -> RenderResult<()> {
        let Some(offset) = self.resolve(field) else {
            return Ok(());
        };
        let dst: &mut [u8] = bytemuck::cast_slice_mut(out);
        self.check_range(offset, dst.len())?;
        self.check_block(index)?;

        let start = index * self.block_stride + offset;
        dst.copy_from_slice(&self.data[start..start + dst.len()]);
        Ok(())
    }

    pub fn set_uniform_vec2(
        &mut self,
        block: Block,
        field: Field<'_>,
        value: Vec2,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &value.to_array())
    }

    pub fn set_uniform_vec3(
        &mut self,
        block: Block,
        field: Field<'_>,
        value: Vec3,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &value.to_array())
    }

    pub fn set_uniform_vec4(
        &mut self,
        block: Block,
        field: Field<'_>,
        value: Vec4,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &value.to_array())
    }

    pub fn set_uniform_color(
        &mut self,
        block: Block,
        field: Field<'_>,
        color: Color,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &color.to_array())
    }

    pub fn set_uniform_mat4(
        &mut self,
        block: Block,
        field: Field<'_>,
        value: &Mat4,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &value.to_cols_array())
    }

    /// Write an affine transform as a padded 3x3 matrix (12 floats).
    pub fn set_uniform_affine(
        &mut self,
        block: Block,
        field: Field<'_>,
        value: &Affine2,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &affine2_to_padded_mat3(value))
    }

    pub fn set_uniform_quat(
        &mut self,
        block: Block,
        field: Field<'_>,
        value: Quat,
    ) -> RenderResult<()> {
        self.set_uniformfv(block, field, &value.to_array())
    }

    /// Push the whole CPU mirror to the GPU. The buffer must be active.
    pub fn flush(&mut self) -> RenderResult<()> {
        if !self.active {
            return Err(RenderError::NotActive { operation: "flush" });
        }
        self.push();
        Ok(())
    }

    fn push(&mut self) {
        self.device
            .write_buffer(BufferTarget::Uniform, 0, &self.data);
        self.dirty = false;
    }

    fn resolve(&self, field: Field<'_>) -> Option<usize> {
        match field {
            Field::Offset(offset) => Some(offset),
            Field::Named(name) => {
                let offset = self.offsets.get(name).copied();
                if offset.is_none() {
                    tracing::warn!("No uniform block offset registered for '{}'", name);
                }
                offset
            }
        }
    }

    fn check_block(&self, index: usize) -> RenderResult<()> {
        if index >= self.block_count {
            return Err(RenderError::BlockOutOfRange {
                index,
                count: self.block_count,
            });
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> RenderResult<()> {
        let end = offset.saturating_add(len);
        if end > self.block_capacity {
            return Err(RenderError::CapacityExceeded {
                what: "uniform block",
                requested: end,
                capacity: self.block_capacity,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for UniformBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformBuffer")
            .field("buffer", &self.buffer)
            .field("bind_point", &self.bind_point)
            .field("block_count", &self.block_count)
            .field("block_stride", &self.block_stride)
            .field("active", &self.active)
            .field("bound", &self.bound)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        self.device.delete_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_test_utils::{DeviceLimits, MockRenderDevice, RenderCall};

    fn buffer(count: usize) -> (Rc<MockRenderDevice>, UniformBuffer) {
        let mock = Rc::new(MockRenderDevice::new());
        let ubo = UniformBuffer::new(mock.clone(), 160, count).unwrap();
        (mock, ubo)
    }

    #[test]
    fn test_stride_is_aligned() {
        let (_mock, ubo) = buffer(4);
        assert_eq!(ubo.block_stride(), 256);
        assert_eq!(ubo.block_capacity(), 160);
    }

    #[test]
    fn test_overflow_rejected_before_allocation() {
        let mock = Rc::new(MockRenderDevice::new());
        let result = UniformBuffer::new(mock.clone(), 160, 65);
        assert_eq!(
            result.err(),
            Some(RenderError::BlockOverflow {
                required: 256 * 65,
                limit: 16384
            })
        );
        assert_eq!(mock.live_buffers(), 0);
    }

    #[test]
    fn test_small_alignment() {
        let mock = Rc::new(MockRenderDevice::with_limits(DeviceLimits {
            uniform_buffer_offset_alignment: 16,
            ..DeviceLimits::default()
        }));
        let ubo = UniformBuffer::new(mock, 100, 2).unwrap();
        assert_eq!(ubo.block_stride(), 112);
    }

    #[test]
    fn test_roundtrip_before_flush() {
        let (mock, mut ubo) = buffer(4);
        mock.clear_calls();

        ubo.set_uniformfv(Block::Index(2), Field::Offset(8), &[1.0, 2.0, 3.0]).unwrap();
        let mut out = [0.0; 3];
        ubo.get_uniformfv(2, Field::Offset(8), &mut out).unwrap();

        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert!(ubo.is_dirty());
        assert_eq!(mock.count_buffer_writes(BufferTarget::Uniform), 0);
    }

    #[test]
    fn test_named_offsets() {
        let (_mock, mut ubo) = buffer(1);
        ubo.set_offset("x", 10);
        assert_eq!(ubo.offset("x"), 10);
        assert_eq!(ubo.offset("unregistered"), INVALID_OFFSET);
    }

    #[test]
    fn test_unknown_name_is_ignored() {
        let (_mock, mut ubo) = buffer(1);
        assert!(ubo.set_uniform_vec2(Block::Index(0), Field::Named("missing"), Vec2::ONE).is_ok());
        assert!(!ubo.is_dirty());
    }

    #[test]
    fn test_broadcast_writes_every_block() {
        let (_mock, mut ubo) = buffer(3);
        ubo.set_offset("color", 16);
        ubo.set_uniform_color(Block::All, Field::Named("color"), Color::RED).unwrap();

        for index in 0..3 {
            let mut out = [0.0; 4];
            ubo.get_uniformfv(index, Field::Named("color"), &mut out).unwrap();
            assert_eq!(out, Color::RED.to_array());
        }
    }

    #[test]
    fn test_block_out_of_range() {
        let (_mock, mut ubo) = buffer(2);
        assert_eq!(
            ubo.set_uniformfv(Block::Index(2), Field::Offset(0), &[1.0]),
            Err(RenderError::BlockOutOfRange { index: 2, count: 2 })
        );
        assert!(matches!(
            ubo.set_uniformfv(Block::Index(0), Field::Offset(156), &[1.0, 2.0]),
            Err(RenderError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_flush_requires_active() {
        let (mock, mut ubo) = buffer(2);
        assert_eq!(
            ubo.flush(),
            Err(RenderError::NotActive { operation: "flush" })
        );

        ubo.activate();
        ubo.flush().unwrap();
        assert_eq!(mock.count_buffer_writes(BufferTarget::Uniform), 1);
        assert!(!ubo.is_dirty());
    }

    #[test]
    fn test_auto_flush_writes_through() {
        let (mock, mut ubo) = buffer(3);
        ubo.set_auto_flush(true);
        ubo.set_uniformfv(Block::Index(0), Field::Offset(0), &[1.0]).unwrap();

        mock.clear_calls();
        ubo.activate();
        assert_eq!(mock.count_buffer_writes(BufferTarget::Uniform), 1);

        ubo.set_uniformfv(Block::All, Field::Offset(0), &[2.0]).unwrap();
        assert_eq!(mock.count_buffer_writes(BufferTarget::Uniform), 4);
        assert!(!ubo.is_dirty());
    }

    #[test]
    fn test_select_block_binds_range() {
        let (mock, mut ubo) = buffer(4);
        assert!(matches!(
            ubo.select_block(1),
            Err(RenderError::NotBound { .. })
        ));

        ubo.bind(false);
        ubo.select_block(3).unwrap();
        assert!(mock.calls().iter().any(|call| matches!(
            call,
            RenderCall::BindBufferRange {
                offset: 768,
                size: 160,
                ..
            }
        )));
    }
}
