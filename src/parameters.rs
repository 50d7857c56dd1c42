//! Shader parameter scanning and resolution.
//!
//! Shader sources declare their tunable parameters with a textual marker:
//!
//! ```text
//! #pragma parameter gamma "Gamma" 2.2 1.0 3.0 0.05
//! ```
//!
//! Only the identifier matters to this layer; defaults and overrides were
//! already folded into [`ShaderParameter::current`] by the loader. Resolution
//! intersects the identifiers a source actually declares with the preset's
//! parameter list, so a pass is only ever handed values it can consume.

use std::sync::LazyLock;

use regex::Regex;

use crate::preset::{ShaderParameter, ShaderParameters};

static PRAGMA_PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#pragma parameter ([a-zA-Z_][a-zA-Z0-9_]*)").expect("pragma pattern compiles")
});

/// Collect every `#pragma parameter` identifier in `source`, in scan order.
pub fn scan_parameter_names(source: &str) -> Vec<String> {
    PRAGMA_PARAMETER
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Resolve the binding set for one pass.
///
/// For each identifier declared in `source`, the first preset parameter with
/// a matching id contributes its `current` value. Identifiers with no
/// matching parameter are dropped silently. The result is keyed by
/// identifier, so a source that repeats a pragma still yields one binding.
///
/// A preset defining two parameters with the same id is undefined input
/// upstream; the linear scan makes the first definition win.
pub fn resolve_parameters(parameters: &[ShaderParameter], source: &str) -> ShaderParameters {
    let mut resolved = ShaderParameters::new();
    for name in scan_parameter_names(source) {
        if let Some(parameter) = parameters.iter().find(|p| p.id == name) {
            resolved.insert(name, parameter.current);
        }
    }
    resolved
}
