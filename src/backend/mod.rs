//! Abstract GPU capability surface.
//!
//! The pipeline is written against one polymorphic backend trait, selected at
//! build/configuration time; nothing in the core inspects concrete backend
//! types at runtime. [`wgpu`](self::wgpu) is the production implementation;
//! tests drive the pipeline through a recording mock.

pub mod wgpu;

use std::path::Path;

use anyhow::Result;

use crate::preset::{FboScale, FilterType, ShaderParameters, WrapType};
use crate::types::Rect;

/// Pixel format of an intermediate render target.
///
/// Per-pass policy: a float framebuffer takes priority over sRGB when a pass
/// requests both (float intermediates can hold out-of-range values, which the
/// sRGB encoding cannot).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Rgba8Srgb,
    RgbaFloat32,
}

impl TextureFormat {
    /// Resolve the format for a pass's render target from its framebuffer
    /// policy.
    pub fn for_fbo(fbo: &FboScale) -> Self {
        if fbo.float_framebuffer {
            TextureFormat::RgbaFloat32
        } else if fbo.srgb_framebuffer {
            TextureFormat::Rgba8Srgb
        } else {
            TextureFormat::Rgba8
        }
    }
}

/// Everything a backend needs to allocate one render-target texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureRequest {
    pub size: [u32; 2],
    pub format: TextureFormat,
    pub mipmap: bool,
}

/// A GPU texture usable as a sampled input and/or render target.
pub trait ShaderTexture {
    /// Width in texels.
    fn width(&self) -> f32;

    /// Height in texels.
    fn height(&self) -> f32;
}

/// One vertex of the pass quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Per-frame uniform payload handed to every pass.
///
/// `texture_size` matches `video_size`: samplers receive normalized
/// coordinates, so shaders never see the backing allocation size.
/// `frame_direction` is a constant 1.0; time always flows forward.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub video_size: [f32; 2],
    pub texture_size: [f32; 2],
    pub output_size: [f32; 2],
    pub frame_count: f32,
    pub frame_direction: f32,
}

/// A look-up texture bound by name for one pass. Owned by that pass; LUTs are
/// never shared across passes, so a preset reload cannot leave a dangling
/// reference behind.
pub struct ShaderLutBinding<B: RenderBackend + ?Sized> {
    pub id: String,
    pub texture: B::Texture,
    pub sampler: B::Sampler,
}

/// A complete single-quad draw: one pass rendering `source` into `target`.
pub struct DrawQuad<'a, B: RenderBackend + ?Sized> {
    pub program: &'a B::Program,
    pub vertex_buffer: &'a B::VertexBuffer,
    pub vertices: &'a [Vertex; 4],
    pub uniform_buffer: &'a B::UniformBuffer,
    pub uniforms: &'a FrameUniforms,
    pub mvp: &'a [[f32; 4]; 4],
    pub parameters: &'a ShaderParameters,
    pub sampler: &'a B::Sampler,
    pub source: &'a B::Texture,
    pub luts: &'a [ShaderLutBinding<B>],
    pub target: &'a B::Texture,
}

/// GPU capability set consumed by the pipeline: texture/sampler/program
/// creation, quad submission and viewport state.
///
/// All operations are synchronous and must be called from the thread owning
/// the graphics context.
pub trait RenderBackend {
    type Texture: ShaderTexture;
    type Sampler;
    type Program;
    type VertexBuffer;
    type UniformBuffer;

    /// Allocate a render-target texture.
    fn create_texture(&mut self, request: &TextureRequest) -> Result<Self::Texture>;

    /// Decode an image file into a sampled texture (look-up textures).
    fn load_texture(&mut self, path: &Path, mipmap: bool) -> Result<Self::Texture>;

    fn create_sampler(&mut self, filter: FilterType, wrap: WrapType) -> Result<Self::Sampler>;

    /// Compile a shader program from source text. `path` is the source's
    /// origin, used in diagnostics.
    fn compile_program(&mut self, source: &str, path: &str) -> Result<Self::Program>;

    fn create_vertex_buffer(&mut self, vertex_count: u32) -> Result<Self::VertexBuffer>;

    /// Build the program's vertex input layout. Called once per pass after
    /// compilation, before any draw.
    fn create_input_layout(&mut self, program: &mut Self::Program) -> Result<()>;

    /// Allocate the per-frame uniform buffer for one pass.
    fn create_uniform_buffer(&mut self) -> Result<Self::UniformBuffer>;

    /// Submit a single 4-vertex triangle-strip quad.
    fn draw_quad(&mut self, draw: &DrawQuad<'_, Self>) -> Result<()>;

    fn viewport(&self) -> Rect;

    fn set_viewport(&mut self, rect: Rect);

    fn set_scissors(&mut self, rect: Rect);
}
