//! GPU device abstraction and test utilities for Tessera.
//!
//! The renderer never calls a graphics API directly. Every GPU resource in
//! `tessera-render` talks to a [`RenderDevice`], which is either the
//! OpenGL-backed device from `tessera-render` or the recording
//! `MockRenderDevice` from this crate (requires the `mock` feature).
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use tessera_test_utils::{DrawMode, MockRenderDevice, RenderDevice};
//!
//! let mock = MockRenderDevice::new();
//! mock.draw_elements(DrawMode::Triangles, 6, 0);
//!
//! assert_eq!(mock.count_draw_calls(), 1);
//! # }
//! ```
//!
//! # Design
//!
//! ## Plain handles
//!
//! Devices hand out `Copy` integer handles ([`BufferId`], [`TextureId`], ...).
//! Owning wrappers live in the renderer and delete their handles on drop.
//!
//! ## Interior mutability
//!
//! Device methods take `&self`. The mock records calls behind a `Mutex`.
//!
//! ## Object safety
//!
//! [`RenderDevice`] is object-safe and is shared as `Rc<dyn RenderDevice>`.

pub mod gpu_types;
#[cfg(feature = "mock")]
pub mod mock_render;
pub mod render_device;

pub use gpu_types::*;
#[cfg(feature = "mock")]
pub use mock_render::*;
pub use render_device::*;
