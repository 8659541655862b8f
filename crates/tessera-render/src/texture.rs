//! GPU texture ownership.

use std::fmt;
use std::rc::Rc;

use tessera_test_utils::{PixelFormat, RenderDevice, TextureDescriptor, TextureId};

use crate::error::{RenderError, RenderResult};

/// A 2D texture owned by the renderer.
///
/// The GPU handle is released when the texture is dropped, so a texture
/// shared with a sprite batch (`Rc<Texture>`) lives until the last queued
/// draw that references it has been flushed.
pub struct Texture {
    device: Rc<dyn RenderDevice>,
    id: TextureId,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Texture {
    /// Create a texture, optionally uploading `data`.
    ///
    /// `data` must hold exactly `width * height` texels of `format`.
    pub fn new(
        device: Rc<dyn RenderDevice>,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Option<&[u8]>,
    ) -> RenderResult<Self> {
        if let Some(bytes) = data {
            let expected = width as usize * height as usize * format.bytes_per_pixel();
            if bytes.len() != expected {
                return Err(RenderError::InvalidTextureData {
                    expected,
                    actual: bytes.len(),
                });
            }
        }

        let desc = TextureDescriptor {
            width,
            height,
            format,
        };
        let id = device.create_texture(&desc, data)?;
        tracing::debug!(?id, width, height, ?format, "Created texture");

        Ok(Self {
            device,
            id,
            width,
            height,
            format,
        })
    }

    /// The 2x2 opaque white texture used for untextured paths.
    pub fn blank(device: Rc<dyn RenderDevice>) -> RenderResult<Self> {
        let white = [0xFFu8; 2 * 2 * 4];
        Self::new(device, 2, 2, PixelFormat::Rgba, Some(&white))
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Size in bytes of one texel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn bind(&self, unit: u32) {
        self.device.bind_texture(unit, Some(self.id));
    }

    pub fn unbind(&self, unit: u32) {
        self.device.bind_texture(unit, None);
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.device.delete_texture(self.id);
    }
}
