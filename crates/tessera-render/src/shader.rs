//! Shader programs and the bundled sprite shader.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tessera_core::alloc::HashMap;
use tessera_core::math::{Mat4, Vec2};
use tessera_test_utils::{ProgramId, RenderDevice, UniformLocation, UniformValue};

use crate::error::RenderResult;

/// Vertex stage of the sprite shader.
pub const SPRITE_VERTEX_SOURCE: &str = include_str!("shaders/sprite.vert");
/// Fragment stage of the sprite shader.
pub const SPRITE_FRAGMENT_SOURCE: &str = include_str!("shaders/sprite.frag");

/// Names the sprite shader exposes.
pub mod names {
    pub const POSITION: &str = "aPosition";
    pub const COLOR: &str = "aColor";
    pub const TEXCOORD: &str = "aTexCoord";
    pub const GRADCOORD: &str = "aGradCoord";

    pub const PERSPECTIVE: &str = "uPerspective";
    pub const TYPE: &str = "uType";
    pub const TEXTURE: &str = "uTexture";
    pub const BLUR: &str = "uBlur";

    /// Uniform block holding the scissor and gradient.
    pub const CONTEXT_BLOCK: &str = "uContext";
}

/// A linked shader program.
///
/// Uniform locations are looked up once per name and cached. Names the
/// program does not expose are cached as missing and logged once; setting
/// them afterwards is a silent no-op.
pub struct Shader {
    device: Rc<dyn RenderDevice>,
    program: ProgramId,
    uniforms: RefCell<HashMap<String, Option<UniformLocation>>>,
    bound: Cell<bool>,
}

impl Shader {
    pub fn new(device: Rc<dyn RenderDevice>, vertex: &str, fragment: &str) -> RenderResult<Self> {
        let program = device.create_program(vertex, fragment)?;
        tracing::debug!(?program, "Linked shader program");

        Ok(Self {
            device,
            program,
            uniforms: RefCell::new(HashMap::default()),
            bound: Cell::new(false),
        })
    }

    /// Build the bundled sprite shader.
    pub fn sprite(device: Rc<dyn RenderDevice>) -> RenderResult<Self> {
        Self::new(device, SPRITE_VERTEX_SOURCE, SPRITE_FRAGMENT_SOURCE)
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn bind(&self) {
        self.device.use_program(Some(self.program));
        self.bound.set(true);
    }

    pub fn unbind(&self) {
        self.device.use_program(None);
        self.bound.set(false);
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get()
    }

    /// Location of a vertex attribute, or `None` if the program does not use it.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.device.attribute_location(self.program, name)
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        if let Some(location) = self.uniforms.borrow().get(name) {
            return *location;
        }

        let location = self.device.uniform_location(self.program, name);
        if location.is_none() {
            tracing::warn!(program = ?self.program, "Shader has no uniform named '{}'", name);
        }
        self.uniforms.borrow_mut().insert(name.to_string(), location);
        location
    }

    /// Set a uniform on this program. The program must be bound.
    pub fn set_uniform(&self, name: &str, value: UniformValue) {
        if let Some(location) = self.uniform_location(name) {
            self.device.set_uniform(location, &value);
        }
    }

    pub fn set_uniform_i32(&self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_uniform_f32(&self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_uniform_vec2(&self, name: &str, value: Vec2) {
        self.set_uniform(name, UniformValue::Vec2(value.to_array()));
    }

    pub fn set_uniform_mat4(&self, name: &str, value: &Mat4) {
        self.set_uniform(name, UniformValue::Mat4(value.to_cols_array()));
    }

    /// Attach the named uniform block to `bind_point`.
    ///
    /// Returns `false` (and logs) if the program has no such block.
    pub fn set_uniform_block(&self, name: &str, bind_point: u32) -> bool {
        match self.device.uniform_block_index(self.program, name) {
            Some(index) => {
                self.device
                    .uniform_block_binding(self.program, index, bind_point);
                true
            }
            None => {
                tracing::warn!(program = ?self.program, "Shader has no uniform block named '{}'", name);
                false
            }
        }
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("program", &self.program)
            .field("bound", &self.bound.get())
            .finish()
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.device.delete_program(self.program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_test_utils::{MockRenderDevice, ProgramInterface, RenderCall};

    #[test]
    fn test_missing_uniform_is_noop() {
        let mock = Rc::new(MockRenderDevice::new());
        mock.set_program_interface(ProgramInterface::new(&[], &[names::TYPE], &[]));
        let shader = Shader::sprite(mock.clone()).unwrap();
        shader.bind();

        shader.set_uniform_i32(names::TYPE, 3);
        shader.set_uniform_vec2(names::BLUR, Vec2::ONE);
        shader.set_uniform_vec2(names::BLUR, Vec2::ONE);

        assert_eq!(mock.uniform_values(names::TYPE), vec![UniformValue::Int(3)]);
        assert!(mock.uniform_values(names::BLUR).is_empty());
    }

    #[test]
    fn test_uniform_block_binding() {
        let mock = Rc::new(MockRenderDevice::new());
        mock.set_program_interface(ProgramInterface::new(&[], &[], &[names::CONTEXT_BLOCK]));
        let shader = Shader::sprite(mock.clone()).unwrap();

        assert!(shader.set_uniform_block(names::CONTEXT_BLOCK, 2));
        assert!(!shader.set_uniform_block("uMissing", 2));
        assert_eq!(
            mock.count(|call| matches!(call, RenderCall::UniformBlockBinding { bind_point: 2, .. })),
            1
        );
    }

    #[test]
    fn test_drop_deletes_program() {
        let mock = Rc::new(MockRenderDevice::new());
        let shader = Shader::sprite(mock.clone()).unwrap();
        assert_eq!(mock.live_programs(), 1);
        drop(shader);
        assert_eq!(mock.live_programs(), 0);
    }
}
