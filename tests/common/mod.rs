//! Shared test support: a recording mock backend, preset builders and stub
//! loaders.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};

use video_shader_pipeline::backend::{
    DrawQuad, RenderBackend, ShaderTexture, TextureFormat, TextureRequest,
};
use video_shader_pipeline::loader::{PresetLoader, PresetLoaderRegistry};
use video_shader_pipeline::preset::{
    FboScale, FboScaleAxis, ScaleType, ShaderParameters, ShaderPass, ShaderPreset,
};
use video_shader_pipeline::types::{Point2, Rect};

pub const VIEWPORT: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 640.0,
    height: 480.0,
};

pub const DEST: [Point2; 4] = [
    Point2 { x: 0.0, y: 0.0 },
    Point2 { x: 640.0, y: 0.0 },
    Point2 { x: 640.0, y: 480.0 },
    Point2 { x: 0.0, y: 480.0 },
];

pub struct MockTexture {
    pub id: u32,
    pub width: f32,
    pub height: f32,
}

impl ShaderTexture for MockTexture {
    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }
}

pub struct MockProgram;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CreatedTexture {
    pub id: u32,
    pub size: [u32; 2],
    pub format: TextureFormat,
    pub mipmap: bool,
}

#[derive(Clone, Debug)]
pub struct DrawRecord {
    pub source_id: u32,
    pub target_id: u32,
    pub viewport: Rect,
    pub scissors: Rect,
    pub frame_count: f32,
    pub parameters: ShaderParameters,
}

/// Records every backend call the pipeline makes; failures are injectable.
pub struct MockBackend {
    pub viewport: Rect,
    pub scissors: Rect,
    next_texture_id: u32,
    next_external_id: u32,
    pub created_textures: Vec<CreatedTexture>,
    pub loaded_luts: Vec<PathBuf>,
    pub draws: Vec<DrawRecord>,
    pub programs_compiled: usize,
    pub layouts_created: usize,
    pub vertex_buffers_created: usize,
    pub uniform_buffers_created: usize,
    pub samplers_created: usize,
    pub fail_texture_allocs: bool,
    pub fail_compile: bool,
}

impl MockBackend {
    pub fn new(viewport: Rect) -> Self {
        Self {
            viewport,
            scissors: viewport,
            next_texture_id: 0,
            next_external_id: 0x1000,
            created_textures: Vec::new(),
            loaded_luts: Vec::new(),
            draws: Vec::new(),
            programs_compiled: 0,
            layouts_created: 0,
            vertex_buffers_created: 0,
            uniform_buffers_created: 0,
            samplers_created: 0,
            fail_texture_allocs: false,
            fail_compile: false,
        }
    }

    /// A caller-supplied texture (video source, backbuffer) outside the
    /// pipeline's allocation ledger.
    pub fn external_texture(&mut self, width: f32, height: f32) -> MockTexture {
        let id = self.next_external_id;
        self.next_external_id += 1;
        MockTexture { id, width, height }
    }
}

impl RenderBackend for MockBackend {
    type Texture = MockTexture;
    type Sampler = ();
    type Program = MockProgram;
    type VertexBuffer = ();
    type UniformBuffer = ();

    fn create_texture(&mut self, request: &TextureRequest) -> Result<Self::Texture> {
        if self.fail_texture_allocs {
            bail!("mock texture allocation failure");
        }
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.created_textures.push(CreatedTexture {
            id,
            size: request.size,
            format: request.format,
            mipmap: request.mipmap,
        });
        Ok(MockTexture {
            id,
            width: request.size[0] as f32,
            height: request.size[1] as f32,
        })
    }

    fn load_texture(&mut self, path: &Path, _mipmap: bool) -> Result<Self::Texture> {
        self.loaded_luts.push(path.to_path_buf());
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        Ok(MockTexture {
            id,
            width: 16.0,
            height: 16.0,
        })
    }

    fn create_sampler(
        &mut self,
        _filter: video_shader_pipeline::preset::FilterType,
        _wrap: video_shader_pipeline::preset::WrapType,
    ) -> Result<Self::Sampler> {
        self.samplers_created += 1;
        Ok(())
    }

    fn compile_program(&mut self, _source: &str, path: &str) -> Result<Self::Program> {
        if self.fail_compile {
            bail!("mock compile failure for {path}");
        }
        self.programs_compiled += 1;
        Ok(MockProgram)
    }

    fn create_vertex_buffer(&mut self, _vertex_count: u32) -> Result<Self::VertexBuffer> {
        self.vertex_buffers_created += 1;
        Ok(())
    }

    fn create_input_layout(&mut self, _program: &mut Self::Program) -> Result<()> {
        self.layouts_created += 1;
        Ok(())
    }

    fn create_uniform_buffer(&mut self) -> Result<Self::UniformBuffer> {
        self.uniform_buffers_created += 1;
        Ok(())
    }

    fn draw_quad(&mut self, draw: &DrawQuad<'_, Self>) -> Result<()> {
        self.draws.push(DrawRecord {
            source_id: draw.source.id,
            target_id: draw.target.id,
            viewport: self.viewport,
            scissors: self.scissors,
            frame_count: draw.uniforms.frame_count,
            parameters: draw.parameters.clone(),
        });
        Ok(())
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = rect;
    }

    fn set_scissors(&mut self, rect: Rect) {
        self.scissors = rect;
    }
}

/// A pass scaling its input by `scale` on both axes.
pub fn scaled_pass(source_path: &str, scale: f32) -> ShaderPass {
    ShaderPass {
        source_path: source_path.to_string(),
        vertex_source: "// pass".to_string(),
        fbo: FboScale {
            scale_x: FboScaleAxis {
                scale_type: ScaleType::Input,
                scale,
                abs: 1,
            },
            scale_y: FboScaleAxis {
                scale_type: ScaleType::Input,
                scale,
                abs: 1,
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A chain of `pass_count` identity-scaled passes.
pub fn preset_with_passes(pass_count: usize) -> ShaderPreset {
    ShaderPreset {
        passes: (0..pass_count)
            .map(|i| scaled_pass(&format!("pass{i}.wgsl"), 1.0))
            .collect(),
    }
}

/// Serves one fixed preset for every path; counts invocations.
pub struct FixedPresetLoader {
    preset: ShaderPreset,
    pub loads: AtomicUsize,
}

impl FixedPresetLoader {
    pub fn new(preset: ShaderPreset) -> Self {
        Self {
            preset,
            loads: AtomicUsize::new(0),
        }
    }
}

impl PresetLoader for FixedPresetLoader {
    fn load_preset(&self, _path: &str) -> Result<ShaderPreset> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.preset.clone())
    }
}

/// Fails every load; counts invocations.
pub struct FailingLoader {
    pub loads: AtomicUsize,
}

impl FailingLoader {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
        }
    }
}

impl PresetLoader for FailingLoader {
    fn load_preset(&self, path: &str) -> Result<ShaderPreset> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        bail!("mock parse failure for {path}");
    }
}

/// Registry with a single loader registered for `.vsp`.
pub fn registry_with(loader: Arc<dyn PresetLoader>) -> Arc<PresetLoaderRegistry> {
    let mut registry = PresetLoaderRegistry::new();
    registry.register_loader(loader, "vsp");
    Arc::new(registry)
}

/// Pipeline over a fresh mock backend, serving `preset` for any `.vsp` path.
/// Video size is 160x144 (handheld-sized input makes scaling visible).
pub fn pipeline_from(
    preset: ShaderPreset,
) -> (
    video_shader_pipeline::PresetPipeline<MockBackend>,
    Arc<FixedPresetLoader>,
) {
    let loader = Arc::new(FixedPresetLoader::new(preset));
    let registry = registry_with(loader.clone());
    let backend = MockBackend::new(VIEWPORT);
    (
        video_shader_pipeline::PresetPipeline::new(backend, registry, 160, 144),
        loader,
    )
}
