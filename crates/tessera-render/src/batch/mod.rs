//! Batched 2D shape renderer.
//!
//! [`SpriteBatch`] collects solid, textured, gradient and scissored shapes
//! into one vertex stream and replays the recorded state changes at flush
//! time:
//!
//! | Step | What happens |
//! |------|--------------|
//! | submit | vertices are transformed and appended on the CPU |
//! | state change | the live drawing context is recorded if geometry is pending |
//! | flush | vertex, index and uniform data are uploaded once |
//! | replay | each recorded context applies its dirty state and draws its range |
//!
//! Gradients and scissors take uniform blocks in order, one per change; the
//! block pointer goes back to the first block after each flush. Running out
//! of blocks, vertices or indices forces an early flush.

mod context;
mod sprite_batch;
mod types;

pub use sprite_batch::SpriteBatch;
pub use types::*;
