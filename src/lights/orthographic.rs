//! Orthographic light: a directional light that owns its parallel projection box.

use cgmath::{Vector3, ortho};

use crate::gpu::{ProgramTemplate, TextureKind};
use crate::lights::{
    DEFAULT_SHADOW_RESOLUTION, Light, LightKind, ShadowCaster, light_view, planar_depth_program,
};

pub const DEPTH_PROGRAM: ProgramTemplate =
    planar_depth_program(LightKind::Orthographic, "orthographic light depth");

#[derive(Clone, Debug)]
pub struct OrthographicLight {
    caster: ShadowCaster,
    /// Half the width and height of the projection box.
    pub half_extent: f32,
    pub near: f32,
    pub far: f32,
}

impl OrthographicLight {
    pub fn new(
        position: impl Into<Vector3<f32>>,
        direction: impl Into<Vector3<f32>>,
        color: impl Into<Vector3<f32>>,
        half_extent: f32,
    ) -> Self {
        let mut caster = ShadowCaster::new(TextureKind::D2, DEFAULT_SHADOW_RESOLUTION);
        caster.position = position.into();
        caster.direction = direction.into();
        caster.color = color.into();
        let mut light = Self {
            caster,
            half_extent,
            near: 1.0,
            far: 1000.0,
        };
        light.update_matrices();
        light
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.caster.set_resolution(resolution);
        self
    }

    pub fn set_position(&mut self, position: impl Into<Vector3<f32>>) {
        self.caster.position = position.into();
        self.update_matrices();
    }

    pub fn set_direction(&mut self, direction: impl Into<Vector3<f32>>) {
        self.caster.direction = direction.into();
        self.update_matrices();
    }
}

impl Light for OrthographicLight {
    fn kind(&self) -> LightKind {
        LightKind::Orthographic
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

    fn update_matrices(&mut self) {
        let h = self.half_extent;
        self.caster.projection = ortho(-h, h, -h, h, self.near, self.far);
        self.caster.view = light_view(self.caster.position, self.caster.direction);
    }
}
