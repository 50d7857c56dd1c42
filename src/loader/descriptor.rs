//! Bundled JSON preset descriptors.
//!
//! A descriptor lists the pass chain with each pass's shader file and
//! sampling/scaling policy, plus a `parameter_overrides` map layering the
//! preset author's values over the shaders' declared defaults:
//!
//! ```json
//! {
//!   "passes": [
//!     {
//!       "shader": "crt_easymode.wgsl",
//!       "filter": "nearest",
//!       "fbo": { "scale_x": { "scale_type": "input", "scale": 2.0 } },
//!       "parameters": [ { "id": "gamma", "initial": 2.2 } ]
//!     }
//!   ],
//!   "parameter_overrides": { "gamma": 2.4 }
//! }
//! ```
//!
//! Shader and LUT paths are resolved relative to the descriptor file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::PresetLoader;
use crate::preset::{
    FboScale, FilterType, ShaderLut, ShaderParameter, ShaderPass, ShaderPreset, WrapType,
};

/// Extension descriptor presets are registered under.
pub const EXTENSION: &str = "vsp";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresetDescriptor {
    passes: Vec<PassDescriptor>,
    parameter_overrides: HashMap<String, f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PassDescriptor {
    shader: String,
    filter: FilterType,
    wrap: WrapType,
    frame_count_mod: u32,
    fbo: FboScale,
    mipmap: bool,
    luts: Vec<ShaderLut>,
    parameters: Vec<ShaderParameter>,
}

/// Resolve a descriptor-relative path against the descriptor's directory.
fn resolve_relative(base_dir: &Path, path: &str) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        path.to_string()
    } else {
        base_dir.join(candidate).to_string_lossy().into_owned()
    }
}

/// Loads JSON preset descriptors bundled with the application.
#[derive(Debug, Default)]
pub struct DescriptorPresetLoader;

impl DescriptorPresetLoader {
    pub fn new() -> Self {
        Self
    }
}

impl PresetLoader for DescriptorPresetLoader {
    fn load_preset(&self, path: &str) -> Result<ShaderPreset> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read preset descriptor {path}"))?;
        let descriptor: PresetDescriptor = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse preset descriptor {path}"))?;

        if descriptor.passes.is_empty() {
            bail!("preset descriptor {path} declares no passes");
        }

        let base_dir = Path::new(path).parent().unwrap_or(Path::new(""));

        let mut passes = Vec::with_capacity(descriptor.passes.len());
        for pass in descriptor.passes {
            if pass.shader.is_empty() {
                bail!("preset descriptor {path} has a pass without a shader file");
            }

            let source_path = resolve_relative(base_dir, &pass.shader);
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read shader source {source_path}"))?;

            let luts = pass
                .luts
                .into_iter()
                .map(|lut| ShaderLut {
                    path: resolve_relative(base_dir, &lut.path),
                    ..lut
                })
                .collect();

            let parameters = pass
                .parameters
                .into_iter()
                .map(|parameter| {
                    let current = descriptor
                        .parameter_overrides
                        .get(&parameter.id)
                        .copied()
                        .unwrap_or(parameter.initial);
                    ShaderParameter {
                        current,
                        ..parameter
                    }
                })
                .collect();

            passes.push(ShaderPass {
                source_path,
                vertex_source: source,
                fragment_source: String::new(),
                filter: pass.filter,
                wrap: pass.wrap,
                frame_count_mod: pass.frame_count_mod,
                fbo: pass.fbo,
                mipmap: pass.mipmap,
                luts,
                parameters,
            });
        }

        Ok(ShaderPreset { passes })
    }
}
