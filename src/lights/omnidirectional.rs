//! Omnidirectional light with a cube-map shadow.
//!
//! One layered pass reaches all six faces. Objects are culled by intersecting
//! their world bounds with the light's range sphere. The cube map is mip-mapped
//! but not blurred.

use cgmath::{Deg, EuclideanSpace, Matrix4, Point3, Vector3, perspective};

use crate::camera::OPENGL_TO_WGPU_MATRIX;
use crate::data_structures::bounds::BoundingSphere;
use crate::data_structures::mesh_instance::MeshInstance;
use crate::gpu::{
    Blend, DepthMode, Gpu, ProgramKey, ProgramKind, ProgramTemplate, ShaderFile, ShaderStage,
    TargetFormat, TextureKind, VertexInput, uniform_bytes,
};
use crate::lights::{
    DEFAULT_SHADOW_RESOLUTION, Light, LightKind, ShadowCaster, ShadowLightUniform, ShadowMap,
    render_shadow_casters,
};
use crate::shared::Shared;

pub const DEPTH_PROGRAM: ProgramTemplate = ProgramTemplate {
    key: ProgramKey::Depth(LightKind::Omnidirectional),
    label: "omnidirectional light depth",
    files: &[
        ShaderFile {
            stage: ShaderStage::Vertex,
            path: "cube_depth.wgsl",
        },
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "linear_depth.wgsl",
        },
    ],
    kind: ProgramKind::Raster {
        input: VertexInput::Mesh,
        targets: &[TargetFormat::Fixed(ShadowMap::FORMAT)],
        depth: DepthMode::ReadWrite,
        blend: Blend::Replace,
    },
    bindings: &[],
};

pub const OMNI_NEAR: f32 = 0.5;

/// Look direction and up vector of each cube face, +X, -X, +Y, -Y, +Z, -Z.
pub const CUBE_FACES: [([f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
    ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, 0.0, 1.0], [0.0, -1.0, 0.0]),
    ([0.0, 0.0, -1.0], [0.0, -1.0, 0.0]),
];

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubeDepthUniform {
    pub face_view_proj: [[[f32; 4]; 4]; 6],
    // w: range
    pub position: [f32; 4],
}

#[derive(Clone, Debug)]
pub struct OmnidirectionalLight {
    caster: ShadowCaster,
    range: f32,
    face_views: [Matrix4<f32>; 6],
}

impl OmnidirectionalLight {
    pub fn new(position: impl Into<Vector3<f32>>, color: impl Into<Vector3<f32>>) -> Self {
        let mut caster = ShadowCaster::new(TextureKind::Cube, DEFAULT_SHADOW_RESOLUTION / 2);
        caster.position = position.into();
        caster.color = color.into();
        let mut light = Self {
            caster,
            range: 10.0,
            face_views: [Matrix4::from_scale(1.0); 6],
        };
        light.update_matrices();
        light
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.caster.set_resolution(resolution);
        self
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.set_range(range);
        self
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range;
        self.update_matrices();
    }

    pub fn position(&self) -> Vector3<f32> {
        self.caster.position
    }

    pub fn set_position(&mut self, position: impl Into<Vector3<f32>>) {
        self.caster.position = position.into();
        self.update_matrices();
    }

    pub fn face_views(&self) -> &[Matrix4<f32>; 6] {
        &self.face_views
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.caster.position, self.range)
    }

    fn depth_uniform(&self) -> CubeDepthUniform {
        let projection = OPENGL_TO_WGPU_MATRIX * self.caster.projection;
        CubeDepthUniform {
            face_view_proj: self.face_views.map(|view| (projection * view).into()),
            position: self.caster.position.extend(self.range).into(),
        }
    }
}

impl Light for OmnidirectionalLight {
    fn kind(&self) -> LightKind {
        LightKind::Omnidirectional
    }

    fn caster(&self) -> &ShadowCaster {
        &self.caster
    }

    fn caster_mut(&mut self) -> &mut ShadowCaster {
        &mut self.caster
    }

    fn depth_program(&self) -> &'static ProgramTemplate {
        &DEPTH_PROGRAM
    }

    fn bind(&self, gpu: &mut dyn Gpu, shared: &Shared) {
        let program = self.caster.program(&shared.programs);
        let (Some(pass), Some(program)) = (self.caster.shadow_map().pass(), program) else {
            log::warn!("Binding a cube shadow map that was never initialised");
            return;
        };
        gpu.begin_pass(&pass);
        gpu.use_program(program);
        gpu.set_uniforms(uniform_bytes(&self.depth_uniform()));
        // The per-face y flip mirrors winding.
        gpu.set_cull_face(false);
    }

    fn draw_shadow_map(&self, gpu: &mut dyn Gpu, shared: &mut Shared, objects: &[MeshInstance]) {
        let Some(texture) = self
            .caster
            .shadow_map()
            .texture()
            .filter(|_| self.caster.is_initialized())
        else {
            log::warn!("Drawing a cube shadow map before init(), skipping");
            return;
        };

        gpu.set_base_level(texture, 0);
        self.bind(gpu, shared);
        let sphere = self.bounding_sphere();
        render_shadow_casters(gpu, objects, |object| object.aabb().intersects_sphere(&sphere));
        self.unbind(gpu);

        // TODO: blur the six faces once cube blurring is wired into the light pass sampling.
        gpu.generate_mipmaps(texture);
        gpu.set_base_level(texture, self.caster.sample_level());
    }

    fn update_matrices(&mut self) {
        let far = self.range.max(OMNI_NEAR + f32::EPSILON);
        self.caster.projection = perspective(Deg(90.0), 1.0, OMNI_NEAR, far);
        let eye = Point3::from_vec(self.caster.position);
        self.face_views = CUBE_FACES.map(|(direction, up)| {
            Matrix4::look_to_rh(eye, Vector3::from(direction), Vector3::from(up))
        });
    }

    fn uniform(&self) -> ShadowLightUniform {
        let mut uniform = self
            .caster
            .uniform(LightKind::Omnidirectional, -1.0, self.range);
        uniform.depth_bias_vp = Matrix4::from_scale(1.0).into();
        uniform
    }
}
