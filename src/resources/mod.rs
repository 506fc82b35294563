//! Resource loading helpers.
//!
//! Shader sources and skybox images are read from the `assets/` directory next
//! to the executable, falling back to the copy `build.rs` places in `OUT_DIR`.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, ensure};

/// Directory that holds the `.wgsl` sources.
pub fn default_shader_root() -> PathBuf {
    let local = Path::new("assets").join("shaders");
    if local.exists() {
        local
    } else {
        Path::new(env!("OUT_DIR")).join("assets").join("shaders")
    }
}

pub fn load_shader(root: &Path, file_name: &str) -> Result<String> {
    let path = root.join(file_name);
    std::fs::read_to_string(&path)
        .with_context(|| format!("reading shader source {}", path.display()))
}

/// Loads the six faces of a cube map in +X, -X, +Y, -Y, +Z, -Z order.
///
/// All faces must be square and share one size.
pub fn load_cube_faces<P: AsRef<Path>>(paths: &[P; 6]) -> Result<(u32, Vec<image::RgbaImage>)> {
    let faces = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            image::open(path)
                .with_context(|| format!("loading cube face {}", path.display()))
                .map(|img| img.to_rgba8())
        })
        .collect::<Result<Vec<_>>>()?;
    let size = faces[0].width();
    for face in &faces {
        ensure!(
            face.width() == size && face.height() == size,
            "cube faces must be square and equally sized, got {}x{} next to {}x{}",
            face.width(),
            face.height(),
            size,
            size
        );
    }
    Ok((size, faces))
}
