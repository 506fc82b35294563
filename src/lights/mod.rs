//! Shadow-casting lights and point lights.
//!
//! All shadow-casting variants implement [`Light`]: `init` allocates the shadow
//! map and fetches the depth program shared by every light of the same kind,
//! `draw_shadow_map` renders the scene objects that can cast into the map and
//! post-processes it into a variance shadow map.
//!
//! Directional, spot and orthographic lights share the planar protocol of
//! [`ShadowCaster`]; omnidirectional lights render into a cube map and cull by
//! range instead of by frustum.

use std::any::Any;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};

use crate::camera::OPENGL_TO_WGPU_MATRIX;
use crate::data_structures::mesh_instance::MeshInstance;
use crate::gpu::{
    Blend, DepthMode, Gpu, ProgramId, ProgramKey, ProgramKind, ProgramRegistry, ProgramTemplate,
    ShaderFile, ShaderStage, TargetFormat, TextureKind, VertexInput, uniform_bytes,
};
use crate::shared::Shared;

pub mod directional;
pub mod omnidirectional;
pub mod orthographic;
pub mod point;
pub mod shadow_map;
pub mod spot;

pub use directional::DirectionalLight;
pub use omnidirectional::OmnidirectionalLight;
pub use orthographic::OrthographicLight;
pub use point::{PointLight, PointLights};
pub use shadow_map::ShadowMap;
pub use spot::SpotLight;

pub const DEFAULT_SHADOW_RESOLUTION: u32 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Spot,
    Orthographic,
    Omnidirectional,
}

impl LightKind {
    pub fn name(self) -> &'static str {
        match self {
            LightKind::Directional => "directional",
            LightKind::Spot => "spot",
            LightKind::Orthographic => "orthographic",
            LightKind::Omnidirectional => "omnidirectional",
        }
    }
}

/// Maps light clip space (wgpu convention) to shadow map texture space.
#[rustfmt::skip]
pub const SHADOW_BIAS_MATRIX: Matrix4<f32> = Matrix4::new(
    0.5,  0.0, 0.0, 0.0,
    0.0, -0.5, 0.0, 0.0,
    0.0,  0.0, 1.0, 0.0,
    0.5,  0.5, 0.0, 1.0,
);

const PLANAR_DEPTH_FILES: &[ShaderFile] = &[
    ShaderFile {
        stage: ShaderStage::Vertex,
        path: "depth.wgsl",
    },
    ShaderFile {
        stage: ShaderStage::Fragment,
        path: "moments.wgsl",
    },
];

/// Depth program of a planar light kind. Each kind gets its own shared instance.
pub(crate) const fn planar_depth_program(kind: LightKind, label: &'static str) -> ProgramTemplate {
    ProgramTemplate {
        key: ProgramKey::Depth(kind),
        label,
        files: PLANAR_DEPTH_FILES,
        kind: ProgramKind::Raster {
            input: VertexInput::Mesh,
            targets: &[TargetFormat::Fixed(ShadowMap::FORMAT)],
            depth: DepthMode::ReadWrite,
            blend: Blend::Replace,
        },
        bindings: &[],
    }
}

/// What the light pass needs to know about a shadow-casting light.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowLightUniform {
    pub color: [f32; 4],
    // w: range
    pub position: [f32; 4],
    // w: cosine of the half cone angle, -1 when unbounded
    pub direction: [f32; 4],
    pub depth_bias_vp: [[f32; 4]; 4],
    // x: sampled mip level, y: minimum variance, z: resolution, w: kind
    pub params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DepthUniform {
    view_proj: [[f32; 4]; 4],
}

/// Downcasting support for boxed lights.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The capability set every shadow-casting light provides.
///
/// Planar lights only state their kind, depth program and matrices; the
/// defaults run the shared [`ShadowCaster`] protocol.
pub trait Light: AsAny {
    fn kind(&self) -> LightKind;
    fn caster(&self) -> &ShadowCaster;
    fn caster_mut(&mut self) -> &mut ShadowCaster;
    /// The depth program shared by every light of this kind.
    fn depth_program(&self) -> &'static ProgramTemplate;
    fn update_matrices(&mut self);

    /// Allocates the shadow map and fetches the shared depth program.
    fn init(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared) {
        let template = self.depth_program();
        self.caster_mut().init_with(gpu, shared, template);
        self.update_matrices();
    }

    /// Binds and clears the shadow target and prepares the depth program.
    fn bind(&self, gpu: &mut dyn Gpu, shared: &Shared) {
        self.caster().bind_planar(gpu, shared);
    }

    fn unbind(&self, gpu: &mut dyn Gpu) {
        self.caster().unbind(gpu);
    }

    /// Frees the shadow map, leaving the light uninitialised.
    fn release(&mut self, gpu: &mut dyn Gpu) {
        self.caster_mut().release(gpu);
    }

    fn draw_shadow_map(&self, gpu: &mut dyn Gpu, shared: &mut Shared, objects: &[MeshInstance]) {
        self.caster().draw_planar(gpu, shared, objects);
    }

    fn uniform(&self) -> ShadowLightUniform {
        self.caster().uniform(self.kind(), -1.0, 0.0)
    }

    fn shadow_map(&self) -> &ShadowMap {
        self.caster().shadow_map()
    }

    fn is_initialized(&self) -> bool {
        self.caster().is_initialized()
    }

    fn is_dynamic(&self) -> bool {
        self.caster().dynamic
    }

    fn set_dynamic(&mut self, dynamic: bool) {
        self.caster_mut().dynamic = dynamic;
    }

    fn color(&self) -> Vector3<f32> {
        self.caster().color
    }

    fn set_color(&mut self, color: Vector3<f32>) {
        self.caster_mut().color = color;
    }
}

/// State shared by all shadow-casting lights.
#[derive(Clone, Debug)]
pub struct ShadowCaster {
    pub color: Vector3<f32>,
    pub position: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub projection: Matrix4<f32>,
    pub view: Matrix4<f32>,
    /// Dynamic lights redraw their shadow map every frame.
    pub dynamic: bool,
    /// Mip level the shadow map is blurred at and sampled from.
    pub downsampling: u32,
    shadow_map: ShadowMap,
    program: Option<ProgramKey>,
}

impl ShadowCaster {
    pub fn new(kind: TextureKind, resolution: u32) -> Self {
        Self {
            color: Vector3::new(1.0, 1.0, 1.0),
            position: Vector3::new(0.0, 0.0, 0.0),
            direction: Vector3::new(0.0, -1.0, 0.0),
            projection: Matrix4::identity(),
            view: Matrix4::identity(),
            dynamic: true,
            downsampling: 1,
            shadow_map: ShadowMap::new(kind, resolution),
            program: None,
        }
    }

    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    /// Changes the shadow map size. Only possible before `init`.
    pub fn set_resolution(&mut self, resolution: u32) {
        if self.shadow_map.is_allocated() {
            log::warn!("Shadow map already allocated, keeping {}", self.shadow_map.resolution());
            return;
        }
        self.shadow_map = ShadowMap::new(self.shadow_map.kind(), resolution);
    }

    /// The current shared depth program. Resolved through the registry so a
    /// recompiled program reaches every light of the kind.
    pub fn program(&self, programs: &ProgramRegistry) -> Option<ProgramId> {
        programs.get(self.program?)
    }

    pub fn is_initialized(&self) -> bool {
        self.program.is_some() && self.shadow_map.is_allocated()
    }

    /// The mip level actually used, clamped to the shadow map's chain.
    pub fn sample_level(&self) -> u32 {
        self.downsampling
            .min(self.shadow_map.mip_levels().saturating_sub(1))
    }

    pub(crate) fn init_with(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared, template: &ProgramTemplate) {
        shared.programs.get_or_init(gpu, template);
        self.program = Some(template.key);
        self.shadow_map.init(gpu);
    }

    pub(crate) fn release(&mut self, gpu: &mut dyn Gpu) {
        self.shadow_map.release(gpu);
        self.program = None;
    }

    /// Light view-projection in wgpu clip space.
    pub fn depth_view_proj(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * self.projection * self.view
    }

    pub fn uniform(&self, kind: LightKind, cos_half_angle: f32, range: f32) -> ShadowLightUniform {
        ShadowLightUniform {
            color: self.color.extend(1.0).into(),
            position: self.position.extend(range).into(),
            direction: unit_or_down(self.direction).extend(cos_half_angle).into(),
            depth_bias_vp: (SHADOW_BIAS_MATRIX * self.depth_view_proj()).into(),
            params: [
                self.sample_level() as f32,
                0.0,
                self.shadow_map.resolution() as f32,
                kind as u32 as f32,
            ],
        }
    }

    pub(crate) fn bind_planar(&self, gpu: &mut dyn Gpu, shared: &Shared) {
        let program = self.program(&shared.programs);
        let (Some(pass), Some(program)) = (self.shadow_map.pass(), program) else {
            log::warn!("Binding a shadow map that was never initialised");
            return;
        };
        gpu.begin_pass(&pass);
        gpu.use_program(program);
        gpu.set_uniforms(uniform_bytes(&DepthUniform {
            view_proj: self.depth_view_proj().into(),
        }));
        gpu.set_cull_face(true);
    }

    pub(crate) fn unbind(&self, gpu: &mut dyn Gpu) {
        gpu.set_cull_face(false);
        gpu.end_pass();
    }

    /// Shared protocol of directional, spot and orthographic lights: draw every
    /// object visible from the light, then mip-map, blur at `downsampling`,
    /// sample from `downsampling` and rebuild the mips below it.
    pub(crate) fn draw_planar(&self, gpu: &mut dyn Gpu, shared: &mut Shared, objects: &[MeshInstance]) {
        let Some(texture) = self.shadow_map.texture().filter(|_| self.is_initialized()) else {
            log::warn!("Drawing a shadow map before init(), skipping");
            return;
        };
        let resolution = self.shadow_map.resolution();
        let level = self.sample_level();

        gpu.set_base_level(texture, 0);
        self.bind_planar(gpu, shared);
        let (projection, view) = (self.projection, self.view);
        render_shadow_casters(gpu, objects, |object| object.is_visible(&projection, &view));
        self.unbind(gpu);

        gpu.generate_mipmaps(texture);
        let Shared { programs, blur } = shared;
        blur.blur(gpu, programs, texture, TextureKind::D2, resolution, resolution, level);
        gpu.set_base_level(texture, level);
        gpu.generate_mipmaps(texture);
    }
}

/// Right-handed view matrix looking from `position` along `direction`.
pub fn light_view(position: Vector3<f32>, direction: Vector3<f32>) -> Matrix4<f32> {
    let direction = unit_or_down(direction);
    let up = if direction.y.abs() > 0.999 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    };
    Matrix4::look_to_rh(Point3::from_vec(position), direction, up)
}

fn unit_or_down(direction: Vector3<f32>) -> Vector3<f32> {
    if direction.magnitude2() > 0.0 {
        direction.normalize()
    } else {
        -Vector3::unit_y()
    }
}

/// Draws every object accepted by `casts` with its model matrix bound.
/// Returns the number of draws issued.
pub(crate) fn render_shadow_casters(
    gpu: &mut dyn Gpu,
    objects: &[MeshInstance],
    mut casts: impl FnMut(&MeshInstance) -> bool,
) -> usize {
    let mut drawn = 0;
    for object in objects.iter().filter(|object| casts(object)) {
        gpu.draw_mesh(object.mesh().geometry(), &object.draw_uniforms());
        drawn += 1;
    }
    drawn
}
