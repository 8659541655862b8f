//! Tessera Render
//!
//! A batched 2D renderer for OpenGL-class devices. Shapes are collected by
//! [`SpriteBatch`], which records state changes as drawing contexts and
//! replays them with as few draw calls as the state allows.
//!
//! Every GPU call goes through the [`RenderDevice`] trait, so the batch runs
//! against [`GlowDevice`] in an application and against
//! `tessera_test_utils::MockRenderDevice` in tests.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tessera_core::geometry::Rect;
//! use tessera_render::{Color, SpriteBatch, SpriteBatchDescriptor};
//! use tessera_test_utils::MockRenderDevice;
//!
//! let device = Rc::new(MockRenderDevice::new());
//! let mut batch = SpriteBatch::new(device.clone(), SpriteBatchDescriptor::default()).unwrap();
//! batch.set_viewport(640.0, 480.0);
//!
//! batch.begin().unwrap();
//! batch.set_color(Color::RED);
//! batch.fill_rect(Rect::new(0.0, 0.0, 32.0, 32.0)).unwrap();
//! batch.fill_rect(Rect::new(40.0, 0.0, 32.0, 32.0)).unwrap();
//! batch.end().unwrap();
//!
//! assert_eq!(device.draw_calls().len(), 1);
//! ```

pub mod batch;
pub mod blend;
pub mod color;
pub mod error;
#[cfg(feature = "glow")]
pub mod glow_device;
pub mod gradient;
pub mod poly;
pub mod scissor;
pub mod shader;
pub mod stencil;
pub mod stream_buffer;
pub mod texture;
pub mod uniform_buffer;

pub use batch::{DrawType, SpriteBatch, SpriteBatchDescriptor, SpriteBatchStats, SpriteVertex};
pub use blend::{BlendMode, BlendState};
pub use color::Color;
pub use error::{RenderError, RenderResult};
#[cfg(feature = "glow")]
pub use glow_device::GlowDevice;
pub use gradient::Gradient;
pub use poly::Poly2;
pub use scissor::Scissor;
pub use shader::Shader;
pub use stencil::{StencilEffect, StencilRegion, StencilState, clear_buffer};
pub use stream_buffer::StreamBuffer;
pub use texture::Texture;
pub use uniform_buffer::{Block, Field, INVALID_OFFSET, UniformBuffer};

pub use tessera_test_utils::RenderDevice;
