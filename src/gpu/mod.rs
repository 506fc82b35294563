//! GPU capability interface.
//!
//! Everything above this module (lights, blur, scene, frame pipeline) talks to the
//! GPU exclusively through the object-safe [`Gpu`] trait and the opaque handles
//! defined here. [`crate::context::Context`] implements it on top of wgpu; tests
//! implement it with a recorder.
//!
//! The interface covers the small set of capabilities the renderer
//! needs: resource creation, render passes with draws, mip generation, compute
//! dispatches separated by memory barriers and elapsed-time queries.

use std::time::Duration;

use cgmath::{Matrix, Matrix4, SquareMatrix};

use crate::data_structures::mesh::{Material, MeshVertex};

pub mod backend;
pub mod program;

pub use program::{ProgramKey, ProgramRegistry, ProgramTemplate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// Topology of a texture: a single 2D image or the six faces of a cube map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

impl TextureKind {
    pub fn layers(self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_levels: u32,
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    /// Number of levels in a full mip chain for the given size.
    pub fn full_mip_chain(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }
}

/// How a compute program accesses a bound image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

/// A colour attachment of a render pass.
///
/// A cube texture attached with `layer: None` is a layered target: one draw
/// reaches all six faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    Texture {
        texture: TextureId,
        level: u32,
        layer: Option<u32>,
    },
    /// The frame that is presented at the end of [`Gpu::present`].
    Output,
}

impl Attachment {
    pub fn texture(texture: TextureId) -> Self {
        Attachment::Texture {
            texture,
            level: 0,
            layer: Some(0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PassDesc {
    pub label: &'static str,
    pub colors: Vec<Attachment>,
    pub depth: Option<TextureId>,
    /// `Some` clears colour attachments to this value and depth to 1.0, `None` loads.
    pub clear: Option<[f32; 4]>,
}

/// Per-draw uniform block: model matrix, normal matrix and material parameters.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub albedo: [f32; 4],
    // roughness, fresnel reflectance, emission, unused
    pub material: [f32; 4],
}

impl DrawUniforms {
    pub fn from_model(model: &Matrix4<f32>) -> Self {
        let normal = model
            .invert()
            .map(|inverse| inverse.transpose())
            .unwrap_or_else(Matrix4::identity);
        Self {
            model: (*model).into(),
            normal: normal.into(),
            albedo: [1.0; 4],
            material: [0.0; 4],
        }
    }

    pub fn with_material(model: &Matrix4<f32>, material: &Material) -> Self {
        Self {
            albedo: [material.color.x, material.color.y, material.color.z, 1.0],
            material: [material.roughness, material.fresnel, material.emission, 0.0],
            ..Self::from_model(model)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// A shader source file at a fixed path relative to the shader root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderFile {
    pub stage: ShaderStage,
    pub path: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexInput {
    /// Indexed mesh geometry, one [`DrawUniforms`] per draw.
    Mesh,
    /// A single screen covering triangle generated in the vertex shader.
    Fullscreen,
    /// Six vertices per point, expanded to a camera facing quad.
    Billboards,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blend {
    Replace,
    Additive,
    Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthMode {
    None,
    ReadWrite,
    ReadOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Fixed(wgpu::TextureFormat),
    /// Whatever format the presented frame uses.
    Output,
}

/// Resources a program reads, in binding order. Slot `n` of
/// [`Gpu::bind_texture`], [`Gpu::bind_storage_buffer`] and [`Gpu::bind_image`]
/// refers to entry `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Filterable texture sampled through the linear sampler.
    Texture(TextureKind),
    /// 2D float texture read with integer coordinates.
    UnfilterableTexture,
    StorageBuffer,
    /// Compute input image read with integer coordinates.
    ReadImage,
    /// Compute output image.
    WriteImage(wgpu::TextureFormat),
    /// The engine's linear clamp sampler, bound automatically.
    Sampler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Raster {
        input: VertexInput,
        targets: &'static [TargetFormat],
        depth: DepthMode,
        blend: Blend,
    },
    Compute {
        workgroup_size: [u32; 3],
    },
}

/// Everything needed to compile and link a program.
///
/// An empty `sources` list (a source file could not be loaded) must produce an
/// invalid program.
#[derive(Clone, Debug)]
pub struct ProgramDesc {
    pub key: ProgramKey,
    pub label: &'static str,
    pub sources: Vec<(ShaderFile, String)>,
    pub kind: ProgramKind,
    pub bindings: &'static [Binding],
}

/// The GPU capability set consumed by the renderer.
///
/// All calls happen on one thread and are recorded into a single command
/// stream in call order. Render-pass calls (`use_program` .. `draw_*`) are only
/// meaningful between [`Gpu::begin_pass`] and [`Gpu::end_pass`]; compute calls
/// must happen outside a render pass.
pub trait Gpu {
    fn create_program(&mut self, desc: &ProgramDesc) -> ProgramId;
    fn is_program_valid(&self, program: ProgramId) -> bool;

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;
    /// Frees the texture. Its id may be handed out again by `create_texture`.
    fn destroy_texture(&mut self, texture: TextureId);
    /// Uploads tightly packed RGBA8 texels into mip level 0 of `layer`.
    fn write_texture_layer(&mut self, texture: TextureId, layer: u32, rgba: &[u8]);

    fn create_buffer(&mut self, label: &'static str) -> BufferId;
    /// Replaces the full contents of `buffer`; its logical size becomes `data.len()`.
    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]);
    fn buffer_size(&self, buffer: BufferId) -> u64;

    fn upload_geometry(&mut self, label: &str, vertices: &[MeshVertex], indices: &[u32]) -> GeometryId;

    fn create_query(&mut self, label: &'static str) -> QueryId;

    /// Starts a frame. Returns `false` when there is nothing to render into.
    fn acquire_frame(&mut self) -> bool;
    /// Flushes every recorded command to the GPU.
    fn submit(&mut self);
    /// Submits and shows the frame started by [`Gpu::acquire_frame`].
    fn present(&mut self);
    fn output_size(&self) -> (u32, u32);

    fn begin_pass(&mut self, pass: &PassDesc);
    fn end_pass(&mut self);
    fn use_program(&mut self, program: ProgramId);
    /// Sets the uniform block used by following draws and dispatches.
    fn set_uniforms(&mut self, data: &[u8]);
    fn bind_texture(&mut self, slot: u32, texture: TextureId);
    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferId);
    fn set_cull_face(&mut self, enabled: bool);
    fn draw_mesh(&mut self, geometry: GeometryId, uniforms: &DrawUniforms);
    fn draw_fullscreen(&mut self);
    fn draw_points(&mut self, count: u32);

    /// Rebuilds every mip level below the current base level.
    fn generate_mipmaps(&mut self, texture: TextureId);
    /// Selects the first mip level visible to sampling and mip generation.
    fn set_base_level(&mut self, texture: TextureId, level: u32);

    fn bind_image(&mut self, slot: u32, texture: TextureId, level: u32, layer: u32, access: Access);
    fn dispatch(&mut self, program: ProgramId, groups: [u32; 3]);
    /// Makes every write of previous dispatches visible to later commands.
    fn memory_barrier(&mut self);

    fn begin_query(&mut self, query: QueryId);
    fn end_query(&mut self, query: QueryId);
    /// Elapsed GPU time between the last begin/end pair. May stall until the
    /// GPU has finished; `None` when timing is unsupported or nothing was recorded.
    fn query_elapsed(&mut self, query: QueryId) -> Option<Duration>;
}

/// Reinterprets a `Pod` uniform block as bytes for [`Gpu::set_uniforms`].
pub fn uniform_bytes<T: bytemuck::Pod>(value: &T) -> &[u8] {
    bytemuck::bytes_of(value)
}
