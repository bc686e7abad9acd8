use std::fs;
use std::path::Path;

#[test]
fn validate_all_shaders() {
  let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/shaders");
  assert!(shader_dir.exists(), "shader directory not found: {shader_dir:?}");

  let mut errors = Vec::new();
  let mut validated = 0;
  for entry in fs::read_dir(&shader_dir).unwrap() {
    let path = entry.unwrap().path();
    if path.extension().map_or(false, |ext| ext == "wgsl") {
      validate_shader(&path, &mut errors);
      validated += 1;
    }
  }

  assert_eq!(validated, 3, "expected the velocity, position and render shaders");
  if !errors.is_empty() {
    panic!("shader validation failed:\n{}", errors.join("\n"));
  }
}

fn validate_shader(path: &Path, errors: &mut Vec<String>) {
  let source = fs::read_to_string(path).unwrap();
  let module = match naga::front::wgsl::parse_str(&source) {
    Ok(module) => module,
    Err(e) => {
      errors.push(format!(
        "failed to parse {:?}:\n{}",
        path.file_name().unwrap(),
        e.emit_to_string(&source)
      ));
      return;
    }
  };

  let mut validator = naga::valid::Validator::new(
    naga::valid::ValidationFlags::all(),
    naga::valid::Capabilities::all(),
  );
  if let Err(e) = validator.validate(&module) {
    errors.push(format!("failed to validate {:?}:\n{:?}", path.file_name().unwrap(), e));
  }
}

#[test]
fn kernels_expose_main_entry_points() {
  for source in [
    include_str!("../src/shaders/velocity.wgsl"),
    include_str!("../src/shaders/position.wgsl"),
  ] {
    let module = naga::front::wgsl::parse_str(source).unwrap();
    let entry = module
      .entry_points
      .iter()
      .find(|entry| entry.name == "main")
      .expect("kernel has no main entry point");
    assert_eq!(entry.stage, naga::ShaderStage::Compute);
    assert_eq!(entry.workgroup_size, [8, 8, 1]);
  }
}

#[test]
fn render_shader_has_both_appearances() {
  let module = naga::front::wgsl::parse_str(include_str!("../src/shaders/render.wgsl")).unwrap();
  let names: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
  for name in ["vs_birds", "fs_birds", "vs_sprites", "fs_sprites"] {
    assert!(names.contains(&name), "missing entry point {name}");
  }
}
