//! Preset loaders and the extension registry that routes preset paths to
//! them.
//!
//! Presets come from pluggable sources (the application's add-ons, bundled
//! descriptor files); each source registers the file extensions it handles.
//! The registry only routes: the on-disk syntax of a preset is entirely the
//! loader's concern.

pub mod descriptor;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::preset::ShaderPreset;

/// A source of shader presets for one or more file extensions.
pub trait PresetLoader {
    /// Parse the preset at `path` into the in-memory model, with parameter
    /// overrides already resolved into each parameter's `current` value.
    fn load_preset(&self, path: &str) -> Result<ShaderPreset>;
}

/// Extension of `path` canonicalized to include the leading separator, e.g.
/// `".vsp"`. Matching is case-sensitive.
fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}

/// Maps file extensions to preset loaders.
///
/// An extension maps to at most one loader; registering a second loader for
/// the same extension replaces the first. One loader may hold any number of
/// extensions.
#[derive(Default)]
pub struct PresetLoaderRegistry {
    loaders: HashMap<String, Arc<dyn PresetLoader>>,
}

impl PresetLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `extension` (with or without a leading `.`) with `loader`.
    /// Empty extensions are ignored.
    pub fn register_loader(&mut self, loader: Arc<dyn PresetLoader>, extension: &str) {
        if extension.is_empty() {
            return;
        }
        let canonical = if extension.starts_with('.') {
            extension.to_string()
        } else {
            format!(".{extension}")
        };
        self.loaders.insert(canonical, loader);
    }

    /// Remove every extension currently mapped to `loader`.
    pub fn unregister_loader(&mut self, loader: &Arc<dyn PresetLoader>) {
        self.loaders
            .retain(|_, registered| !Arc::ptr_eq(registered, loader));
    }

    /// Load the preset at `path` through the loader registered for its
    /// extension. Fails when the path has no extension or no loader is
    /// registered for it.
    pub fn load_preset(&self, path: &str) -> Result<ShaderPreset> {
        let Some(extension) = extension_of(path) else {
            bail!("preset path '{path}' has no file extension");
        };
        let Some(loader) = self.loaders.get(&extension) else {
            bail!("no preset loader registered for '{extension}'");
        };
        loader.load_preset(path)
    }

    /// Whether a loader is registered for `path`'s extension, without
    /// invoking it. Used to filter selectable presets.
    pub fn can_load_preset(&self, path: &str) -> bool {
        extension_of(path)
            .map(|extension| self.loaders.contains_key(&extension))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_includes_leading_separator() {
        assert_eq!(extension_of("shaders/crt.vsp").as_deref(), Some(".vsp"));
        assert_eq!(extension_of("crt.glslp").as_deref(), Some(".glslp"));
    }

    #[test]
    fn extension_is_case_sensitive() {
        assert_eq!(extension_of("crt.VSP").as_deref(), Some(".VSP"));
    }

    #[test]
    fn paths_without_extension_have_none() {
        assert_eq!(extension_of("no_extension"), None);
        assert_eq!(extension_of(""), None);
    }
}
