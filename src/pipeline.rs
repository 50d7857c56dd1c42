//! Top-level preset pipeline: owns the pass shaders and the render target
//! chain, drives the per-frame render sequence, and tracks preset lifecycle
//! state.
//!
//! All failures degrade to "render without shader effects": the public
//! surface reports plain `bool` success, and this controller is the only
//! place where internal errors are translated into that signal (and into the
//! failed-path cache that stops broken presets from being rebuilt every
//! frame).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{error, warn};

use crate::backend::{RenderBackend, ShaderLutBinding, ShaderTexture};
use crate::chain::RenderTargetChain;
use crate::loader::PresetLoaderRegistry;
use crate::parameters::resolve_parameters;
use crate::pass_shader::PassShader;
use crate::preset::ShaderPass;
use crate::types::{Point2, Rect, Size2};

/// Lifecycle of the currently selected preset path.
///
/// A single tagged state instead of separate dirty/failed flags, so the two
/// can never contradict each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PipelineState {
    /// No preset selected (empty path). A valid no-op state, not a failure.
    NoPreset,
    /// Path selected, resources not built (or invalidated).
    Dirty,
    /// Chain built and consistent; rendering is a pure per-frame operation.
    Ready,
    /// A build step failed for the current path; don't retry until the path
    /// changes.
    Failed,
}

pub struct PresetPipeline<B: RenderBackend> {
    backend: B,
    loaders: Arc<PresetLoaderRegistry>,

    /// Path of the selected preset; empty means none.
    preset_path: String,
    state: PipelineState,
    /// Paths that failed to build this session. Append-only; bounded in
    /// practice by the user's preset library.
    failed_paths: HashSet<String>,

    passes: Vec<ShaderPass>,
    shaders: Vec<PassShader<B>>,
    chain: RenderTargetChain<B>,

    /// Cached corners of the on-screen quad.
    dest: [Point2; 4],
    /// Size of the source video frame.
    video_size: Size2,
    /// Cached viewport size; a mismatch against the live viewport triggers a
    /// full rebuild.
    output_size: Size2,
    /// Frames elapsed, advanced by `speed` per rendered frame.
    frame_count: f64,
    /// Playback speed multiplier: 1.0 normal, 0.0 paused.
    speed: f64,
}

impl<B: RenderBackend> PresetPipeline<B> {
    pub fn new(
        backend: B,
        loaders: Arc<PresetLoaderRegistry>,
        video_width: u32,
        video_height: u32,
    ) -> Self {
        let output_size = backend.viewport().size();
        Self {
            backend,
            loaders,
            preset_path: String::new(),
            state: PipelineState::NoPreset,
            failed_paths: HashSet::new(),
            passes: Vec::new(),
            shaders: Vec::new(),
            chain: RenderTargetChain::default(),
            dest: [Point2::default(); 4],
            video_size: Size2::new(video_width as f32, video_height as f32),
            output_size,
            frame_count: 0.0,
            speed: 0.0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Full path of the currently selected preset; empty when none.
    pub fn preset_path(&self) -> &str {
        &self.preset_path
    }

    /// Passes of the loaded preset, in render order.
    pub fn passes(&self) -> &[ShaderPass] {
        &self.passes
    }

    /// Playback speed multiplier; the frame counter advances by this much per
    /// rendered frame, so fast-forward and slow-motion animate accordingly.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Size of the source video frames in pixels. Invalidates the chain,
    /// since input-relative pass sizes derive from it.
    pub fn set_video_size(&mut self, video_width: u32, video_height: u32) {
        let new_size = Size2::new(video_width as f32, video_height as f32);
        if new_size != self.video_size {
            self.video_size = new_size;
            self.mark_dirty();
        }
    }

    /// Select the preset to render with from the next frame on. Returns false
    /// when the preset cannot be built; an empty path deselects shading and
    /// also returns false.
    pub fn set_shader_preset(&mut self, path: &str) -> bool {
        self.dispose();
        self.preset_path = path.to_string();
        self.state = if path.is_empty() {
            // Valid "no preset" selection; never recorded as a failure.
            PipelineState::NoPreset
        } else if self.failed_paths.contains(path) {
            PipelineState::Failed
        } else {
            PipelineState::Dirty
        };
        self.update()
    }

    /// Bring resources in sync with the selected preset. Idempotent when the
    /// pipeline is already built; a no-op failure for missing or known-bad
    /// presets.
    pub fn update(&mut self) -> bool {
        match self.state {
            PipelineState::NoPreset | PipelineState::Failed => false,
            PipelineState::Ready => true,
            PipelineState::Dirty => match self.rebuild() {
                Ok(()) => {
                    self.state = PipelineState::Ready;
                    true
                }
                Err(e) => {
                    warn!(
                        preset = %self.preset_path,
                        "failed to build shader preset: {e:#}. Disabling video shaders"
                    );
                    self.dispose();
                    self.failed_paths.insert(self.preset_path.clone());
                    self.state = PipelineState::Failed;
                    false
                }
            },
        }
    }

    /// Render one frame of `source` through the pass chain into `target`,
    /// with the final quad placed at `dest`. Returns false when shading is
    /// unavailable this frame; the caller should then present the raw frame.
    pub fn render_update(
        &mut self,
        dest: &[Point2; 4],
        source: &B::Texture,
        target: &B::Texture,
    ) -> bool {
        let saved_viewport = self.backend.viewport();

        // A resized window invalidates every viewport-derived size; rebuild
        // everything rather than resizing in place.
        self.handle_viewport_change(saved_viewport);

        if !self.update() {
            return false;
        }

        self.prepare_parameters(dest);

        let result = self.render_chain(source, target);

        // The caller's viewport survives the chain regardless of outcome.
        self.backend.set_viewport(saved_viewport);

        match result {
            Ok(()) => {
                self.frame_count += self.speed;
                true
            }
            Err(e) => {
                error!(preset = %self.preset_path, "shader chain render failed: {e:#}");
                false
            }
        }
    }

    fn handle_viewport_change(&mut self, viewport: Rect) {
        let viewport_size = viewport.size();
        if viewport_size != self.output_size {
            self.output_size = viewport_size;
            self.mark_dirty();
        }
    }

    fn mark_dirty(&mut self) {
        if matches!(self.state, PipelineState::Dirty | PipelineState::Ready) {
            self.state = PipelineState::Dirty;
        }
    }

    fn dispose(&mut self) {
        self.shaders.clear();
        self.chain = RenderTargetChain::default();
        self.passes.clear();
    }

    /// The fixed build sequence. Later steps depend on the pass list read in
    /// the first step, and texture creation needs each pass's resolved
    /// policy, so the order is not negotiable.
    fn rebuild(&mut self) -> Result<()> {
        self.dispose();

        self.read_preset().context("failed to read shader preset")?;
        self.create_shaders().context("failed to initialize shaders")?;
        self.create_layouts().context("failed to create layouts")?;
        self.create_buffers().context("failed to initialize buffers")?;
        self.create_shader_textures()
            .context("a shader texture failed to init")?;
        self.create_samplers().context("failed to create samplers")?;

        // Each pass must have a resolved output size, and every pass but the
        // last an intermediate target.
        if self.shaders.len() != self.chain.pass_sizes().len()
            || self.chain.intermediate_count() + 1 != self.shaders.len()
        {
            bail!(
                "pass chain is inconsistent: {} shaders, {} sizes, {} intermediate targets",
                self.shaders.len(),
                self.chain.pass_sizes().len(),
                self.chain.intermediate_count()
            );
        }

        Ok(())
    }

    fn read_preset(&mut self) -> Result<()> {
        let preset = self.loaders.load_preset(&self.preset_path)?;
        if preset.passes.is_empty() {
            bail!("preset '{}' contains no passes", self.preset_path);
        }
        self.passes = preset.passes;
        Ok(())
    }

    fn create_shaders(&mut self) -> Result<()> {
        for pass in &self.passes {
            let mut luts = Vec::with_capacity(pass.luts.len());
            for lut in &pass.luts {
                let sampler = self
                    .backend
                    .create_sampler(lut.filter, lut.wrap)
                    .with_context(|| format!("sampler for look-up texture '{}'", lut.id))?;
                let texture = self
                    .backend
                    .load_texture(Path::new(&lut.path), lut.mipmap)
                    .with_context(|| format!("look-up texture '{}'", lut.id))?;
                luts.push(ShaderLutBinding {
                    id: lut.id.clone(),
                    texture,
                    sampler,
                });
            }

            // Only bind the parameters this pass's source actually declares.
            let parameters = resolve_parameters(&pass.parameters, &pass.vertex_source);

            let shader = PassShader::create(
                &mut self.backend,
                &pass.program_source(),
                &pass.source_path,
                parameters,
                pass.filter,
                pass.wrap,
                luts,
                self.output_size,
                pass.frame_count_mod,
            )?;
            self.shaders.push(shader);
        }
        Ok(())
    }

    fn create_layouts(&mut self) -> Result<()> {
        for shader in &mut self.shaders {
            shader.create_layouts(&mut self.backend)?;
        }
        Ok(())
    }

    fn create_buffers(&mut self) -> Result<()> {
        for shader in &mut self.shaders {
            shader.create_buffers(&mut self.backend)?;
        }
        Ok(())
    }

    fn create_shader_textures(&mut self) -> Result<()> {
        self.chain = RenderTargetChain::build(
            &mut self.backend,
            &self.passes,
            self.video_size,
            self.output_size,
        )?;

        // Wire each pass's input/output resolution through the chain.
        let mut prev_size = self.video_size;
        for (shader, &next_size) in self.shaders.iter_mut().zip(self.chain.pass_sizes()) {
            shader.set_sizes(prev_size, next_size);
            prev_size = next_size;
        }
        Ok(())
    }

    fn create_samplers(&mut self) -> Result<()> {
        for shader in &mut self.shaders {
            let sampler = self
                .backend
                .create_sampler(shader.filter(), shader.wrap())
                .with_context(|| format!("sampler for shader pass {}", shader.source_path()))?;
            shader.attach_sampler(sampler);
        }
        Ok(())
    }

    fn prepare_parameters(&mut self, dest: &[Point2; 4]) {
        self.dest = *dest;

        let pass_count = self.shaders.len();
        let frame_count = self.frame_count.max(0.0) as u64;
        for (pass_idx, shader) in self.shaders.iter_mut().enumerate() {
            let is_last_pass = pass_idx + 1 == pass_count;
            shader.prepare_parameters(&self.dest, is_last_pass, frame_count);
        }
    }

    /// Walk the chain in pass order: the first pass samples the caller's
    /// source, every later pass samples its predecessor's intermediate, and
    /// the terminal pass writes the caller's target.
    fn render_chain(&mut self, source: &B::Texture, target: &B::Texture) -> Result<()> {
        let pass_count = self.shaders.len();

        if pass_count == 1 {
            // Single pass: straight into the target, caller's viewport.
            return self.shaders[0].render(&mut self.backend, source, target);
        }

        render_into(
            &mut self.backend,
            &self.shaders[0],
            source,
            self.chain.intermediate(0),
        )?;

        for pass_idx in 1..pass_count - 1 {
            render_into(
                &mut self.backend,
                &self.shaders[pass_idx],
                self.chain.intermediate(pass_idx - 1),
                self.chain.intermediate(pass_idx),
            )?;
        }

        render_into(
            &mut self.backend,
            &self.shaders[pass_count - 1],
            self.chain.intermediate(pass_count - 2),
            target,
        )
    }
}

/// Render one pass with the viewport and scissor pinned to the destination's
/// exact pixel dimensions.
fn render_into<B: RenderBackend>(
    backend: &mut B,
    shader: &PassShader<B>,
    source: &B::Texture,
    target: &B::Texture,
) -> Result<()> {
    let target_rect = Rect::new(0.0, 0.0, target.width(), target.height());
    backend.set_viewport(target_rect);
    backend.set_scissors(target_rect);
    shader.render(backend, source, target)
}
