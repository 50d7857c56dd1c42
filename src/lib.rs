//! Multi-pass video shader preset pipeline.
//!
//! Renders emulated game video through a chain of post-processing shader
//! passes described by a preset: each pass's output resolution is resolved
//! from its scale policy, intermediate render targets carry the frame from
//! pass to pass, and the terminal pass draws into the caller's on-screen
//! target. Presets are sourced through pluggable loaders keyed by file
//! extension.
//!
//! The GPU is reached through the [`backend::RenderBackend`] capability
//! trait; [`backend::wgpu`] is the production implementation.

pub mod backend;
pub mod chain;
pub mod loader;
pub mod parameters;
pub mod pass_shader;
pub mod pipeline;
pub mod preset;
pub mod types;

pub use backend::{RenderBackend, ShaderTexture};
pub use loader::{PresetLoader, PresetLoaderRegistry};
pub use pipeline::PresetPipeline;
pub use preset::{ShaderPass, ShaderPreset};
pub use types::{Point2, Rect, Size2};
