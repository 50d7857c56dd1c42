//! In-memory representation of a shader preset.
//!
//! A preset is an ordered chain of shader passes plus their sampling policy,
//! framebuffer scaling, look-up textures and tunable parameters. Loaders
//! (see [`crate::loader`]) populate this model; the pipeline consumes it and
//! replaces it wholesale whenever a preset is reloaded.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Texture sampling filter requested by a pass or LUT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    None,
    Linear,
    Nearest,
}

/// Texture addressing mode requested by a pass or LUT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapType {
    #[default]
    Border,
    Edge,
    Repeat,
    MirroredRepeat,
}

/// How a pass derives its output resolution along one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    /// Relative to the previous pass's output (the first pass's input is the
    /// source video frame).
    #[default]
    Input,
    /// A fixed pixel count.
    Absolute,
    /// Relative to the current viewport.
    Viewport,
}

/// Per-axis framebuffer scaling policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FboScaleAxis {
    pub scale_type: ScaleType,
    /// Multiplier applied to the resolved base size. Meaningful for
    /// input-relative and viewport-relative axes; `0.0` means unspecified.
    pub scale: f32,
    /// Pixel count for absolute axes.
    pub abs: u32,
}

impl Default for FboScaleAxis {
    fn default() -> Self {
        Self {
            scale_type: ScaleType::Input,
            scale: 1.0,
            abs: 1,
        }
    }
}

/// Framebuffer format and scaling policy for one pass's render target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FboScale {
    pub srgb_framebuffer: bool,
    /// Overrides `srgb_framebuffer` when both are set; shaders storing
    /// out-of-range intermediates need the float format.
    pub float_framebuffer: bool,
    pub scale_x: FboScaleAxis,
    pub scale_y: FboScaleAxis,
}

/// A look-up texture sampled by a pass's shader, bound by name.
///
/// LUT lists are per-pass; the same id in two passes refers to two
/// independent bindings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderLut {
    /// Sampler/uniform name the shader source refers to. Unique within a pass.
    pub id: String,
    pub path: String,
    pub filter: FilterType,
    pub wrap: WrapType,
    pub mipmap: bool,
}

/// A tunable shader parameter.
///
/// `current` is the value to bind: loaders resolve preset-file overrides over
/// the shader's defaults before the pipeline ever sees the parameter. The
/// `minimum <= current <= maximum` relation is the loader's responsibility,
/// not enforced here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderParameter {
    pub id: String,
    pub description: String,
    pub current: f32,
    pub minimum: f32,
    pub initial: f32,
    pub maximum: f32,
    pub step: f32,
}

/// One pass of a shader preset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderPass {
    /// Path the shader source was loaded from. Required for diagnostics; a
    /// pass with an empty source path fails to build.
    pub source_path: String,
    pub vertex_source: String,
    pub fragment_source: String,
    pub filter: FilterType,
    pub wrap: WrapType,
    /// Modulo applied to the frame counter before it reaches the shader.
    /// `0` means no modulo.
    pub frame_count_mod: u32,
    pub fbo: FboScale,
    pub mipmap: bool,
    pub luts: Vec<ShaderLut>,
    pub parameters: Vec<ShaderParameter>,
}

impl ShaderPass {
    /// The complete program text for this pass.
    ///
    /// Most presets carry a single source file containing both entry points,
    /// stored in `vertex_source`. A distinct `fragment_source` is appended
    /// when present.
    pub fn program_source(&self) -> Cow<'_, str> {
        if self.fragment_source.is_empty() || self.fragment_source == self.vertex_source {
            Cow::Borrowed(&self.vertex_source)
        } else {
            Cow::Owned(format!("{}\n{}", self.vertex_source, self.fragment_source))
        }
    }
}

/// A parsed preset: the ordered pass chain. Order defines render order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderPreset {
    pub passes: Vec<ShaderPass>,
}

/// Resolved parameter bindings for one pass, keyed by identifier.
pub type ShaderParameters = HashMap<String, f32>;
