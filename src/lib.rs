//! defer-ngin
//!
//! A deferred 3D renderer on top of wgpu. Mesh instances are rasterised into a
//! G-buffer, lit by ambient light, unshadowed point lights and shadow-casting
//! lights with variance shadow maps, and finished by a post-process chain. Every
//! frame stage is timed on the GPU.
//!
//! High-level modules
//! - `gpu`: the GPU capability trait the renderer is written against, plus the
//!   shared program registry
//! - `context`: the wgpu implementation of that trait (window or headless)
//! - `camera`: camera, projection and the camera uniform
//! - `data_structures`: meshes, instances, bounds, transforms and arenas
//! - `lights`: shadow-casting lights, shadow maps and point lights
//! - `blur`: separable gaussian blur of texture mip levels
//! - `scene`: objects and lights of one scene
//! - `pipelines`: the deferred frame pipeline and its stages
//! - `resources`: shader and image loading
//! - `app`: a windowed runner

pub mod app;
pub mod blur;
pub mod camera;
pub mod context;
pub mod data_structures;
pub mod gpu;
pub mod lights;
pub mod pipelines;
pub mod resources;
pub mod scene;
pub mod shared;

// Re-exports commonly used types for convenience in downstream code.
pub use app::{SceneFlow, run};
pub use camera::{Camera, Projection};
pub use context::Context;
pub use data_structures::mesh::{Material, Mesh, MeshVertex};
pub use data_structures::mesh_instance::MeshInstance;
pub use data_structures::transform::Transformation;
pub use gpu::Gpu;
pub use lights::{
    DirectionalLight, Light, LightKind, OmnidirectionalLight, OrthographicLight, PointLight,
    SpotLight,
};
pub use pipelines::{DeferredRenderer, RendererConfig};
pub use scene::Scene;
pub use shared::Shared;

pub use cgmath;
pub use wgpu;
pub use winit;

/// Initialises `env_logger`, tolerating an already installed logger.
pub fn init_logger() {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
}
