//! wgpu implementation of the render backend.
//!
//! Shader programs are WGSL modules with `vs_main`/`fs_main` entry points.
//! Sources are validated with naga before they reach the device, and the
//! module's resource bindings are reflected so textures can be bound by name:
//! a texture variable whose name matches a LUT id receives that LUT (its
//! sampler under `<id>_sampler`), every other texture variable receives the
//! source frame, and every other sampler the pass sampler. Preset parameters
//! map onto WGSL pipeline-overridable constants (`override gamma: f32;`) by
//! name; parameter names the module does not declare are skipped.
//!
//! Float framebuffers (`Rgba32Float`) are sampled with filtering samplers, so
//! presets using them need an adapter with `FLOAT32_FILTERABLE`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tracing::warn;

use super::{DrawQuad, FrameUniforms, RenderBackend, ShaderTexture, TextureFormat, TextureRequest};
use crate::preset::{FilterType, WrapType};
use crate::types::Rect;

/// Complete uniform payload for one pass: the projection matrix followed by
/// the per-frame inputs.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PassUniformData {
    mvp: [[f32; 4]; 4],
    frame: FrameUniforms,
}

const UNIFORM_BUFFER_SIZE: u64 = std::mem::size_of::<PassUniformData>() as u64;
const VERTEX_STRIDE: u64 = std::mem::size_of::<super::Vertex>() as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BindingKind {
    UniformBuffer,
    Texture,
    Sampler,
}

#[derive(Clone, Debug)]
struct ReflectedBinding {
    name: String,
    group: u32,
    binding: u32,
    kind: BindingKind,
}

/// A compiled WGSL program plus its reflected binding table and a render
/// pipeline per target format (pipeline creation needs the attachment
/// format, which is only known at draw time).
pub struct WgpuProgram {
    module: wgpu::ShaderModule,
    path: String,
    bindings: Vec<ReflectedBinding>,
    override_names: HashSet<String>,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    layout: Option<wgpu::PipelineLayout>,
    pipelines: RefCell<HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>>,
}

/// A texture plus its default view and cached dimensions.
pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
    format: wgpu::TextureFormat,
}

impl WgpuTexture {
    /// Wrap an existing texture (e.g. the frame source or the surface
    /// backbuffer) for use as a pass input or target.
    pub fn from_texture(texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let size = [texture.width(), texture.height()];
        let format = texture.format();
        Self {
            texture,
            view,
            size,
            format,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl ShaderTexture for WgpuTexture {
    fn width(&self) -> f32 {
        self.size[0] as f32
    }

    fn height(&self) -> f32 {
        self.size[1] as f32
    }
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    viewport: Rect,
    scissors: Rect,
    border_clamp_supported: bool,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, viewport: Rect) -> Self {
        let border_clamp_supported = device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        Self {
            device,
            queue,
            viewport,
            scissors: viewport,
            border_clamp_supported,
        }
    }

    fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::RgbaFloat32 => wgpu::TextureFormat::Rgba32Float,
        }
    }

    fn address_mode(&self, wrap: WrapType) -> wgpu::AddressMode {
        match wrap {
            WrapType::Border if self.border_clamp_supported => wgpu::AddressMode::ClampToBorder,
            WrapType::Border => {
                warn!("ADDRESS_MODE_CLAMP_TO_BORDER not supported; falling back to edge clamp");
                wgpu::AddressMode::ClampToEdge
            }
            WrapType::Edge => wgpu::AddressMode::ClampToEdge,
            WrapType::Repeat => wgpu::AddressMode::Repeat,
            WrapType::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }

    /// Viewport state clamped to the target's bounds; wgpu validates that a
    /// viewport never exceeds the attachment.
    fn clamped_viewport(&self, target: &WgpuTexture) -> Rect {
        let tw = target.size[0] as f32;
        let th = target.size[1] as f32;
        let x = self.viewport.x.clamp(0.0, tw);
        let y = self.viewport.y.clamp(0.0, th);
        Rect::new(
            x,
            y,
            self.viewport.width.clamp(0.0, tw - x).max(1.0),
            self.viewport.height.clamp(0.0, th - y).max(1.0),
        )
    }

    fn pipeline_for(
        &self,
        program: &WgpuProgram,
        format: wgpu::TextureFormat,
        parameters: &crate::preset::ShaderParameters,
    ) -> Result<()> {
        if program.pipelines.borrow().contains_key(&format) {
            return Ok(());
        }

        let layout = program
            .layout
            .as_ref()
            .ok_or_else(|| anyhow!("input layout not created for shader {}", program.path))?;

        // Only overridable constants the module declares may be passed.
        let constants: HashMap<String, f64> = parameters
            .iter()
            .filter(|(name, _)| program.override_names.contains(name.as_str()))
            .map(|(name, value)| (name.clone(), f64::from(*value)))
            .collect();

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2],
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("pass_pipeline:{}", program.path)),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &constants,
                        ..Default::default()
                    },
                    buffers: &[vertex_layout],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &constants,
                        ..Default::default()
                    },
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });

        program.pipelines.borrow_mut().insert(format, pipeline);
        Ok(())
    }
}

/// Reflect a validated module's resource bindings into a name-addressable
/// table.
fn reflect_bindings(module: &naga::Module) -> Vec<ReflectedBinding> {
    let mut bindings = Vec::new();
    for (_, variable) in module.global_variables.iter() {
        let Some(resource) = &variable.binding else {
            continue;
        };
        let name = variable.name.clone().unwrap_or_default();
        let kind = match (&variable.space, &module.types[variable.ty].inner) {
            (naga::AddressSpace::Uniform, _) => BindingKind::UniformBuffer,
            (_, naga::TypeInner::Image { .. }) => BindingKind::Texture,
            (_, naga::TypeInner::Sampler { .. }) => BindingKind::Sampler,
            _ => continue,
        };
        bindings.push(ReflectedBinding {
            name,
            group: resource.group,
            binding: resource.binding,
            kind,
        });
    }
    bindings
}

fn validate_wgsl(source: &str, path: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("invalid WGSL in {path}:\n{}", e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| anyhow!("WGSL validation failed for {path}: {e:?}"))?;

    for stage in [naga::ShaderStage::Vertex, naga::ShaderStage::Fragment] {
        let entry = match stage {
            naga::ShaderStage::Vertex => "vs_main",
            _ => "fs_main",
        };
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.stage == stage && ep.name == entry)
        {
            bail!("shader {path} is missing the {entry} entry point");
        }
    }

    Ok(module)
}

impl RenderBackend for WgpuBackend {
    type Texture = WgpuTexture;
    type Sampler = wgpu::Sampler;
    type Program = WgpuProgram;
    type VertexBuffer = wgpu::Buffer;
    type UniformBuffer = wgpu::Buffer;

    fn create_texture(&mut self, request: &TextureRequest) -> Result<Self::Texture> {
        let format = Self::wgpu_format(request.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("pass_render_target"),
            size: wgpu::Extent3d {
                width: request.size[0],
                height: request.size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Ok(WgpuTexture::from_texture(texture))
    }

    fn load_texture(&mut self, path: &Path, _mipmap: bool) -> Result<Self::Texture> {
        let decoded = image::open(path)
            .with_context(|| format!("failed to open look-up texture {}", path.display()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lut_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &decoded,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Ok(WgpuTexture::from_texture(texture))
    }

    fn create_sampler(&mut self, filter: FilterType, wrap: WrapType) -> Result<Self::Sampler> {
        let address_mode = self.address_mode(wrap);
        let filter_mode = match filter {
            FilterType::Linear => wgpu::FilterMode::Linear,
            FilterType::Nearest | FilterType::None => wgpu::FilterMode::Nearest,
        };
        Ok(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pass_sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter: filter_mode,
            border_color: (address_mode == wgpu::AddressMode::ClampToBorder)
                .then_some(wgpu::SamplerBorderColor::OpaqueBlack),
            ..Default::default()
        }))
    }

    fn compile_program(&mut self, source: &str, path: &str) -> Result<Self::Program> {
        let module = validate_wgsl(source, path)?;
        let bindings = reflect_bindings(&module);
        let override_names: HashSet<String> = module
            .overrides
            .iter()
            .filter_map(|(_, o)| o.name.clone())
            .collect();

        let shader_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(path),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        Ok(WgpuProgram {
            module: shader_module,
            path: path.to_string(),
            bindings,
            override_names,
            group_layouts: Vec::new(),
            layout: None,
            pipelines: RefCell::new(HashMap::new()),
        })
    }

    fn create_vertex_buffer(&mut self, vertex_count: u32) -> Result<Self::VertexBuffer> {
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass_vertices"),
            size: u64::from(vertex_count) * VERTEX_STRIDE,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn create_input_layout(&mut self, program: &mut Self::Program) -> Result<()> {
        let group_count = program
            .bindings
            .iter()
            .map(|b| b.group + 1)
            .max()
            .unwrap_or(0) as usize;

        let mut group_layouts = Vec::with_capacity(group_count);
        for group in 0..group_count as u32 {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = program
                .bindings
                .iter()
                .filter(|b| b.group == group)
                .map(|b| wgpu::BindGroupLayoutEntry {
                    binding: b.binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: match b.kind {
                        BindingKind::UniformBuffer => wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        BindingKind::Texture => wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        BindingKind::Sampler => {
                            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                        }
                    },
                    count: None,
                })
                .collect();

            group_layouts.push(self.device.create_bind_group_layout(
                &wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("pass_group_{group}:{}", program.path)),
                    entries: &entries,
                },
            ));
        }

        let layout_refs: Vec<&wgpu::BindGroupLayout> = group_layouts.iter().collect();
        program.layout = Some(self.device.create_pipeline_layout(
            &wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("pass_layout:{}", program.path)),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            },
        ));
        program.group_layouts = group_layouts;
        Ok(())
    }

    fn create_uniform_buffer(&mut self) -> Result<Self::UniformBuffer> {
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass_uniforms"),
            size: UNIFORM_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn draw_quad(&mut self, draw: &DrawQuad<'_, Self>) -> Result<()> {
        let program = draw.program;
        self.pipeline_for(program, draw.target.format, draw.parameters)?;

        // Corners arrive in TL,TR,BR,BL order; the strip wants TL,TR,BL,BR.
        let strip = [
            draw.vertices[0],
            draw.vertices[1],
            draw.vertices[3],
            draw.vertices[2],
        ];
        self.queue
            .write_buffer(draw.vertex_buffer, 0, bytemuck::cast_slice(&strip));

        let uniform_data = PassUniformData {
            mvp: *draw.mvp,
            frame: *draw.uniforms,
        };
        self.queue
            .write_buffer(draw.uniform_buffer, 0, bytemuck::bytes_of(&uniform_data));

        let mut bind_groups = Vec::with_capacity(program.group_layouts.len());
        for (group, layout) in program.group_layouts.iter().enumerate() {
            let entries: Vec<wgpu::BindGroupEntry> = program
                .bindings
                .iter()
                .filter(|b| b.group as usize == group)
                .map(|b| {
                    let resource = match b.kind {
                        BindingKind::UniformBuffer => draw.uniform_buffer.as_entire_binding(),
                        BindingKind::Texture => {
                            let view = draw
                                .luts
                                .iter()
                                .find(|lut| lut.id == b.name)
                                .map(|lut| lut.texture.view())
                                .unwrap_or_else(|| draw.source.view());
                            wgpu::BindingResource::TextureView(view)
                        }
                        BindingKind::Sampler => {
                            let sampler = draw
                                .luts
                                .iter()
                                .find(|lut| format!("{}_sampler", lut.id) == b.name)
                                .map(|lut| &lut.sampler)
                                .unwrap_or(draw.sampler);
                            wgpu::BindingResource::Sampler(sampler)
                        }
                    };
                    wgpu::BindGroupEntry {
                        binding: b.binding,
                        resource,
                    }
                })
                .collect();

            bind_groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("pass_bind_group_{group}:{}", program.path)),
                layout,
                entries: &entries,
            }));
        }

        let viewport = self.clamped_viewport(draw.target);
        let scissors = {
            let tw = draw.target.size[0];
            let th = draw.target.size[1];
            let x = (self.scissors.x.max(0.0) as u32).min(tw);
            let y = (self.scissors.y.max(0.0) as u32).min(th);
            let w = (self.scissors.width.max(0.0) as u32).min(tw - x).max(1);
            let h = (self.scissors.height.max(0.0) as u32).min(th - y).max(1);
            (x, y, w, h)
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pass_encoder"),
            });
        {
            let pipelines = program.pipelines.borrow();
            let pipeline = pipelines
                .get(&draw.target.format)
                .ok_or_else(|| anyhow!("missing pipeline for format {:?}", draw.target.format))?;

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shader_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: draw.target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(scissors.0, scissors.1, scissors.2, scissors.3);
            pass.set_pipeline(pipeline);
            for (index, bind_group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, bind_group, &[]);
            }
            pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
            pass.draw(0..4, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

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

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PASS: &str = r#"
struct PassInput {
    mvp: mat4x4<f32>,
    video_size: vec2<f32>,
    texture_size: vec2<f32>,
    output_size: vec2<f32>,
    frame_count: f32,
    frame_direction: f32,
}

@group(0) @binding(0) var<uniform> pass_input: PassInput;
@group(1) @binding(0) var frame: texture_2d<f32>;
@group(1) @binding(1) var frame_sampler: sampler;

override gamma: f32 = 2.2;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.position = pass_input.mvp * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let texel = textureSample(frame, frame_sampler, in.uv);
    return vec4<f32>(pow(texel.rgb, vec3<f32>(gamma)), texel.a);
}
"#;

    #[test]
    fn valid_pass_module_reflects_bindings() {
        let module = validate_wgsl(VALID_PASS, "test.wgsl").expect("valid module");
        let bindings = reflect_bindings(&module);

        let uniform = bindings
            .iter()
            .find(|b| b.kind == BindingKind::UniformBuffer)
            .expect("uniform binding");
        assert_eq!((uniform.group, uniform.binding), (0, 0));

        let texture = bindings
            .iter()
            .find(|b| b.kind == BindingKind::Texture)
            .expect("texture binding");
        assert_eq!(texture.name, "frame");
    }

    #[test]
    fn missing_entry_point_is_rejected() {
        let err = validate_wgsl("@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }", "broken.wgsl")
            .unwrap_err();
        assert!(err.to_string().contains("fs_main"));
    }

    #[test]
    fn uniform_payload_is_tightly_packed() {
        // The WGSL PassInput struct layout relies on this exact size.
        assert_eq!(UNIFORM_BUFFER_SIZE, 96);
    }
}
