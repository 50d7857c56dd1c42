//! Render target chain: per-pass output sizing and the intermediate textures
//! that carry a frame between passes.
//!
//! For a chain of N passes, N−1 intermediate textures are allocated: pass i
//! renders into intermediate i, which pass i+1 samples. The terminal pass
//! renders into the caller-supplied target, so it never needs a backing
//! texture of its own. The chain owns its intermediates exclusively and is
//! rebuilt wholesale whenever the preset or the viewport changes.

use anyhow::{Context, Result};
use tracing::error;

use crate::backend::{RenderBackend, TextureFormat, TextureRequest};
use crate::preset::{ScaleType, ShaderPass};
use crate::types::Size2;

/// Resolve every pass's output resolution, in pass order.
///
/// Per axis: an absolute axis uses its configured pixel count, a
/// viewport-relative axis the current viewport size, and an input-relative
/// axis the previous pass's output (the first pass's input is the source
/// video). When both axis scale factors are exactly zero the pass is treated
/// as unspecified: the terminal pass overrides to the full viewport so it can
/// always emit at display resolution, any other pass keeps the resolved base
/// unchanged. Otherwise the base is multiplied by the per-axis factors.
pub fn resolve_pass_sizes(
    passes: &[ShaderPass],
    video_size: Size2,
    viewport_size: Size2,
) -> Vec<Size2> {
    let mut sizes = Vec::with_capacity(passes.len());
    let mut prev_size = video_size;

    for (pass_idx, pass) in passes.iter().enumerate() {
        let mut scaled = Size2::new(
            match pass.fbo.scale_x.scale_type {
                ScaleType::Absolute => pass.fbo.scale_x.abs as f32,
                ScaleType::Viewport => viewport_size.x,
                ScaleType::Input => prev_size.x,
            },
            match pass.fbo.scale_y.scale_type {
                ScaleType::Absolute => pass.fbo.scale_y.abs as f32,
                ScaleType::Viewport => viewport_size.y,
                ScaleType::Input => prev_size.y,
            },
        );

        if pass.fbo.scale_x.scale == 0.0 && pass.fbo.scale_y.scale == 0.0 {
            // Scale left unspecified. The terminal pass outputs at full
            // viewport resolution; earlier passes keep the resolved base.
            if pass_idx == passes.len() - 1 {
                scaled = viewport_size;
            }
        } else {
            scaled.x *= pass.fbo.scale_x.scale;
            scaled.y *= pass.fbo.scale_y.scale;
        }

        sizes.push(scaled);
        prev_size = scaled;
    }

    sizes
}

pub struct RenderTargetChain<B: RenderBackend> {
    pass_sizes: Vec<Size2>,
    intermediates: Vec<B::Texture>,
}

impl<B: RenderBackend> Default for RenderTargetChain<B> {
    fn default() -> Self {
        Self {
            pass_sizes: Vec::new(),
            intermediates: Vec::new(),
        }
    }
}

impl<B: RenderBackend> RenderTargetChain<B> {
    /// Compute all pass sizes and allocate the chain's intermediate textures.
    ///
    /// Any allocation failure aborts construction; the failing pass's source
    /// path is logged so broken presets can be diagnosed from the log alone.
    pub fn build(
        backend: &mut B,
        passes: &[ShaderPass],
        video_size: Size2,
        viewport_size: Size2,
    ) -> Result<Self> {
        let pass_sizes = resolve_pass_sizes(passes, video_size, viewport_size);

        let mut intermediates = Vec::new();
        if passes.len() > 1 {
            for (pass_idx, pass) in passes[..passes.len() - 1].iter().enumerate() {
                let request = TextureRequest {
                    size: pass_sizes[pass_idx].to_pixels(),
                    format: TextureFormat::for_fbo(&pass.fbo),
                    mipmap: pass.mipmap,
                };
                let texture = backend
                    .create_texture(&request)
                    .map_err(|e| {
                        error!(
                            source_path = %pass.source_path,
                            "failed to create render target texture: {e:#}"
                        );
                        e
                    })
                    .with_context(|| {
                        format!("render target for shader pass {}", pass.source_path)
                    })?;
                intermediates.push(texture);
            }
        }

        Ok(Self {
            pass_sizes,
            intermediates,
        })
    }

    /// Output resolution of every pass, in pass order.
    pub fn pass_sizes(&self) -> &[Size2] {
        &self.pass_sizes
    }

    /// Intermediate texture written by pass `pass_idx` (absent for the
    /// terminal pass).
    pub fn intermediate(&self, pass_idx: usize) -> &B::Texture {
        &self.intermediates[pass_idx]
    }

    pub fn intermediate_count(&self) -> usize {
        self.intermediates.len()
    }
}
