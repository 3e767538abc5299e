//! # warpeye engine
//!
//! Everything that decides *what* ends up on screen, with no GL in sight:
//!
//! - `controller` normalizes knob/pad input from the transports (`midi`, `osc`) into a
//!   snapshot the render thread polls once per frame.
//! - `warp` turns that snapshot into a deformed mesh, and hit-tests the mesh for the
//!   point-editing overlay.
//! - `moves` animates the texture offset between keyframes.
//! - `scene` owns the one live (video source, move scheduler) pair and the scene rotation.
//! - `texture` is the contract the scene layer expects from a video source; the binary
//!   provides the ffmpeg + GL implementation.
//!
//! The binary crate owns the window, the event loop, and the draw calls.

pub mod logging;

pub mod assets;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod midi;
pub mod moves;
pub mod osc;
pub mod scene;
pub mod texture;
pub mod validate;
pub mod warp;

pub use error::EngineError;
