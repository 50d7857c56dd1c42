//! Bundled JSON descriptor loader, driven through on-disk fixtures.

use std::path::PathBuf;
use std::sync::Arc;

use video_shader_pipeline::loader::descriptor::{DescriptorPresetLoader, EXTENSION};
use video_shader_pipeline::loader::{PresetLoader, PresetLoaderRegistry};
use video_shader_pipeline::preset::{FilterType, ScaleType, WrapType};

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

#[test]
fn descriptor_loads_passes_with_shader_sources() {
    let preset = DescriptorPresetLoader::new()
        .load_preset(&fixture("crt.vsp"))
        .unwrap();

    assert_eq!(preset.passes.len(), 2);

    let first = &preset.passes[0];
    assert!(first.source_path.ends_with("crt_easymode.wgsl"));
    assert!(first.vertex_source.contains("#pragma parameter gamma"));
    assert!(first.vertex_source.contains("fs_main"));
    assert_eq!(first.filter, FilterType::Nearest);
    assert_eq!(first.wrap, WrapType::Edge);
    assert_eq!(first.frame_count_mod, 60);
    assert_eq!(first.fbo.scale_x.scale_type, ScaleType::Input);
    assert_eq!(first.fbo.scale_x.scale, 2.0);

    let second = &preset.passes[1];
    assert!(second.source_path.ends_with("stock.wgsl"));
    assert_eq!(second.filter, FilterType::None);
    assert_eq!(second.frame_count_mod, 0);
}

#[test]
fn parameter_overrides_layer_over_initial_values() {
    let preset = DescriptorPresetLoader::new()
        .load_preset(&fixture("crt.vsp"))
        .unwrap();

    let parameters = &preset.passes[0].parameters;
    let gamma = parameters.iter().find(|p| p.id == "gamma").unwrap();
    let sharpness = parameters.iter().find(|p| p.id == "sharpness").unwrap();

    // "gamma" is overridden by the preset; "sharpness" keeps its initial.
    assert_eq!(gamma.current, 2.4);
    assert_eq!(gamma.initial, 2.2);
    assert_eq!(sharpness.current, 1.0);
}

#[test]
fn lut_paths_resolve_relative_to_the_descriptor() {
    let preset = DescriptorPresetLoader::new()
        .load_preset(&fixture("crt.vsp"))
        .unwrap();

    let lut = &preset.passes[0].luts[0];
    assert_eq!(lut.id, "grade_lut");
    assert!(lut.path.ends_with("grade.png"));
    assert!(lut.path.contains("fixtures"));
    assert_eq!(lut.filter, FilterType::Linear);
}

#[test]
fn descriptor_without_passes_is_rejected() {
    let err = DescriptorPresetLoader::new()
        .load_preset(&fixture("empty.vsp"))
        .unwrap_err();
    assert!(err.to_string().contains("no passes"));
}

#[test]
fn missing_descriptor_file_is_an_error() {
    assert!(
        DescriptorPresetLoader::new()
            .load_preset(&fixture("does_not_exist.vsp"))
            .is_err()
    );
}

#[test]
fn descriptor_loader_registers_under_its_extension() {
    let mut registry = PresetLoaderRegistry::new();
    registry.register_loader(Arc::new(DescriptorPresetLoader::new()), EXTENSION);

    let path = fixture("crt.vsp");
    assert!(registry.can_load_preset(&path));
    assert!(!registry.can_load_preset("crt.slangp"));

    let preset = registry.load_preset(&path).unwrap();
    assert_eq!(preset.passes.len(), 2);
}
