//! Engine data structures: meshes, instances, bounds, textures and light storage.
//!
//! - `arena` is a generational slot arena backing light handles
//! - `bounds` holds bounding volumes and their intersection tests
//! - `mesh` contains shared geometry and material definitions
//! - `mesh_instance` places a mesh in the world and answers visibility queries
//! - `skybox` holds the environment cube map
//! - `texture` wraps wgpu textures for the wgpu backend
//! - `transform` holds position, rotation and scale of an instance

pub mod arena;
pub mod bounds;
pub mod mesh;
pub mod mesh_instance;
pub mod skybox;
pub mod texture;
pub mod transform;
