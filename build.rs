use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

// Shaders every light type and blur pass loads by fixed relative path.
const REQUIRED_SHADERS: &[&str] = &[
    "depth.wgsl",
    "cube_depth.wgsl",
    "linear_depth.wgsl",
    "moments.wgsl",
    "gaussian_blur_h.wgsl",
    "gaussian_blur_v.wgsl",
    "mipmap.wgsl",
];

fn main() -> Result<()> {
    // This tells Cargo to rerun this script if something in /assets/ changes.
    println!("cargo:rerun-if-changed=assets/*");

    let out_dir = env::var("OUT_DIR")?;
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets_src = manifest_dir.join("assets");
    let shaders = assets_src.join("shaders");
    for shader in REQUIRED_SHADERS {
        ensure!(
            shaders.join(shader).exists(),
            "missing required shader source assets/shaders/{}",
            shader
        );
    }

    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    let mut paths_to_copy = Vec::new();
    paths_to_copy.push(assets_src);
    copy_items(&paths_to_copy, out_dir, &copy_options)?;

    Ok(())
}
