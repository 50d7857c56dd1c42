//! One pass of the preset chain: a compiled program plus the quad geometry,
//! per-frame uniforms, sampler policy and look-up textures it renders with.
//!
//! Construction is split across the pipeline's build steps: `create` compiles
//! the program, `create_layouts`/`create_buffers` allocate the draw resources,
//! and `attach_sampler` supplies the concrete sampler once the sampler build
//! step has run. After `set_sizes` the pass is ready for per-frame
//! `prepare_parameters` + `render`.

use anyhow::{Result, anyhow, bail};
use tracing::error;

use crate::backend::{DrawQuad, FrameUniforms, RenderBackend, ShaderLutBinding, Vertex};
use crate::preset::{FilterType, ShaderParameters, WrapType};
use crate::types::{Point2, Size2};

const IDENTITY_MVP: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Build the pass quad.
///
/// Non-terminal passes render into an offscreen target and get a quad
/// centered at the origin, sized to the pass's own output resolution. The
/// terminal pass is positioned from the caller's four destination corners
/// (which may be non-axis-aligned after letterboxing or rotation), offset by
/// half the output size to stay in the same centered space. Texture
/// coordinates are fixed regardless of branch.
pub(crate) fn quad_vertices(
    output_size: Size2,
    dest: &[Point2; 4],
    is_last_pass: bool,
) -> [Vertex; 4] {
    let half_w = output_size.x / 2.0;
    let half_h = output_size.y / 2.0;

    let corners = if is_last_pass {
        [
            [dest[0].x - half_w, dest[0].y - half_h],
            [dest[1].x - half_w, dest[1].y - half_h],
            [dest[2].x - half_w, dest[2].y - half_h],
            [dest[3].x - half_w, dest[3].y - half_h],
        ]
    } else {
        [
            [-half_w, -half_h],
            [half_w, -half_h],
            [half_w, half_h],
            [-half_w, half_h],
        ]
    };

    // Corner order: top-left, top-right, bottom-right, bottom-left.
    let tex_coords = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    std::array::from_fn(|i| Vertex {
        position: [corners[i][0], corners[i][1], 0.0],
        tex_coord: tex_coords[i],
    })
}

/// Per-frame uniform payload for a pass.
///
/// `texture_size` mirrors the input size: the backend hands shaders
/// normalized coordinates, so the backing allocation size is irrelevant.
/// `output_size` is the viewport resolution, not the pass's own output.
pub(crate) fn input_uniforms(
    input_size: Size2,
    viewport_size: Size2,
    frame_count_mod: u32,
    mut frame_count: u64,
) -> FrameUniforms {
    if frame_count_mod != 0 {
        frame_count %= u64::from(frame_count_mod);
    }
    FrameUniforms {
        video_size: [input_size.x, input_size.y],
        texture_size: [input_size.x, input_size.y],
        output_size: [viewport_size.x, viewport_size.y],
        frame_count: frame_count as f32,
        frame_direction: 1.0,
    }
}

pub struct PassShader<B: RenderBackend> {
    program: B::Program,
    source_path: String,
    parameters: ShaderParameters,
    filter: FilterType,
    wrap: WrapType,
    sampler: Option<B::Sampler>,
    luts: Vec<ShaderLutBinding<B>>,
    frame_count_mod: u32,
    input_size: Size2,
    output_size: Size2,
    viewport_size: Size2,
    vertices: [Vertex; 4],
    uniforms: FrameUniforms,
    mvp: [[f32; 4]; 4],
    vertex_buffer: Option<B::VertexBuffer>,
    uniform_buffer: Option<B::UniformBuffer>,
}

impl<B: RenderBackend> PassShader<B> {
    /// Compile the pass program and record its draw policy.
    ///
    /// An empty `source_path` is rejected: every pass needs a known origin
    /// for diagnostics. Compile failures are logged with that origin and
    /// surfaced to the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        backend: &mut B,
        source: &str,
        source_path: &str,
        parameters: ShaderParameters,
        filter: FilterType,
        wrap: WrapType,
        luts: Vec<ShaderLutBinding<B>>,
        viewport_size: Size2,
        frame_count_mod: u32,
    ) -> Result<Self> {
        if source_path.is_empty() {
            bail!("refusing to build a shader pass with an empty source path");
        }

        let program = backend.compile_program(source, source_path).map_err(|e| {
            error!(source_path, "failed to compile shader pass: {e:#}");
            e
        })?;

        Ok(Self {
            program,
            source_path: source_path.to_string(),
            parameters,
            filter,
            wrap,
            sampler: None,
            luts,
            frame_count_mod,
            input_size: Size2::default(),
            output_size: Size2::default(),
            viewport_size,
            vertices: [Vertex::default(); 4],
            uniforms: FrameUniforms::default(),
            mvp: IDENTITY_MVP,
            vertex_buffer: None,
            uniform_buffer: None,
        })
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Filter policy for this pass's source sampler.
    pub fn filter(&self) -> FilterType {
        self.filter
    }

    /// Wrap policy for this pass's source sampler.
    pub fn wrap(&self) -> WrapType {
        self.wrap
    }

    /// Vertex buffer and input layout for the pass quad.
    pub fn create_layouts(&mut self, backend: &mut B) -> Result<()> {
        self.vertex_buffer = Some(backend.create_vertex_buffer(4)?);
        backend.create_input_layout(&mut self.program)
    }

    /// Per-frame uniform buffer.
    pub fn create_buffers(&mut self, backend: &mut B) -> Result<()> {
        self.uniform_buffer = Some(backend.create_uniform_buffer()?);
        Ok(())
    }

    /// Attach the sampler created by the pipeline's sampler build step.
    pub fn attach_sampler(&mut self, sampler: B::Sampler) {
        self.sampler = Some(sampler);
    }

    /// Record input/output resolution. Must run before `prepare_parameters`;
    /// the projection tracks the output size.
    pub fn set_sizes(&mut self, prev_size: Size2, next_size: Size2) {
        self.input_size = prev_size;
        self.output_size = next_size;
        self.update_mvp();
    }

    pub fn output_size(&self) -> Size2 {
        self.output_size
    }

    /// Rebuild the quad and per-frame uniforms for the coming draw.
    pub fn prepare_parameters(&mut self, dest: &[Point2; 4], is_last_pass: bool, frame_count: u64) {
        self.vertices = quad_vertices(self.output_size, dest, is_last_pass);
        self.uniforms = input_uniforms(
            self.input_size,
            self.viewport_size,
            self.frame_count_mod,
            frame_count,
        );
    }

    /// Orthographic projection over the pass's output, Y flipped for
    /// top-left-origin texture space.
    pub fn update_mvp(&mut self) {
        if self.output_size.x <= 0.0 || self.output_size.y <= 0.0 {
            self.mvp = IDENTITY_MVP;
            return;
        }
        let x_scale = 2.0 / self.output_size.x;
        let y_scale = -2.0 / self.output_size.y;
        self.mvp = [
            [x_scale, 0.0, 0.0, 0.0],
            [0.0, y_scale, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
    }

    /// Draw `source` through this pass into `target`.
    pub fn render(&self, backend: &mut B, source: &B::Texture, target: &B::Texture) -> Result<()> {
        let sampler = self
            .sampler
            .as_ref()
            .ok_or_else(|| anyhow!("pass {} has no sampler attached", self.source_path))?;
        let vertex_buffer = self
            .vertex_buffer
            .as_ref()
            .ok_or_else(|| anyhow!("pass {} has no vertex buffer", self.source_path))?;
        let uniform_buffer = self
            .uniform_buffer
            .as_ref()
            .ok_or_else(|| anyhow!("pass {} has no uniform buffer", self.source_path))?;

        backend.draw_quad(&DrawQuad {
            program: &self.program,
            vertex_buffer,
            vertices: &self.vertices,
            uniform_buffer,
            uniforms: &self.uniforms,
            mvp: &self.mvp,
            parameters: &self.parameters,
            sampler,
            source,
            luts: &self.luts,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: [Point2; 4] = [
        Point2 { x: 10.0, y: 20.0 },
        Point2 { x: 650.0, y: 20.0 },
        Point2 { x: 650.0, y: 500.0 },
        Point2 { x: 10.0, y: 500.0 },
    ];

    #[test]
    fn intermediate_quad_is_centered_at_origin() {
        let v = quad_vertices(Size2::new(320.0, 240.0), &DEST, false);
        assert_eq!(v[0].position, [-160.0, -120.0, 0.0]);
        assert_eq!(v[1].position, [160.0, -120.0, 0.0]);
        assert_eq!(v[2].position, [160.0, 120.0, 0.0]);
        assert_eq!(v[3].position, [-160.0, 120.0, 0.0]);
    }

    #[test]
    fn terminal_quad_follows_dest_corners() {
        let v = quad_vertices(Size2::new(640.0, 480.0), &DEST, true);
        assert_eq!(v[0].position, [10.0 - 320.0, 20.0 - 240.0, 0.0]);
        assert_eq!(v[2].position, [650.0 - 320.0, 500.0 - 240.0, 0.0]);
    }

    #[test]
    fn tex_coords_are_fixed_for_both_branches() {
        for is_last in [false, true] {
            let v = quad_vertices(Size2::new(100.0, 100.0), &DEST, is_last);
            assert_eq!(v[0].tex_coord, [0.0, 0.0]);
            assert_eq!(v[1].tex_coord, [1.0, 0.0]);
            assert_eq!(v[2].tex_coord, [1.0, 1.0]);
            assert_eq!(v[3].tex_coord, [0.0, 1.0]);
        }
    }

    #[test]
    fn frame_count_modulo_applies_when_set() {
        let u = input_uniforms(Size2::new(160.0, 144.0), Size2::new(640.0, 480.0), 2, 5);
        assert_eq!(u.frame_count, 1.0);
        assert_eq!(u.frame_direction, 1.0);

        let unmodded = input_uniforms(Size2::new(160.0, 144.0), Size2::new(640.0, 480.0), 0, 5);
        assert_eq!(unmodded.frame_count, 5.0);
    }

    #[test]
    fn uniforms_report_viewport_as_output_size() {
        let u = input_uniforms(Size2::new(160.0, 144.0), Size2::new(640.0, 480.0), 0, 0);
        assert_eq!(u.video_size, [160.0, 144.0]);
        assert_eq!(u.texture_size, [160.0, 144.0]);
        assert_eq!(u.output_size, [640.0, 480.0]);
    }
}
