//! Directional light casting a single 2D variance shadow map.

use cgmath::{Matrix4, Vector3, ortho};

use crate::gpu::{ProgramTemplate, TextureKind};
use crate::lights::{
    DEFAULT_SHADOW_RESOLUTION, Light, LightKind, ShadowCaster, light_view, planar_depth_program,
};

pub const DEPTH_PROGRAM: ProgramTemplate =
    planar_depth_program(LightKind::Directional, "directional light depth");

/// A light shining along one direction from a reference position.
///
/// The projection is not derived from the light; callers fit it to the part of
/// the scene that should receive shadows with [`DirectionalLight::set_projection`].
#[derive(Clone, Debug)]
pub struct DirectionalLight {
    caster: ShadowCaster,
}

impl DirectionalLight {
    pub fn new(
        position: impl Into<Vector3<f32>>,
        direction: impl Into<Vector3<f32>>,
        color: impl Into<Vector3<f32>>,
    ) -> Self {
        let mut caster = ShadowCaster::new(TextureKind::D2, DEFAULT_SHADOW_RESOLUTION);
        caster.position = position.into();
        caster.direction = direction.into();
        caster.color = color.into();
        caster.projection = ortho(-100.0, 100.0, -100.0, 100.0, 1.0, 1000.0);
        let mut light = Self { caster };
        light.update_matrices();
        light
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.caster.set_resolution(resolution);
        self
    }

    pub fn set_projection(&mut self, projection: Matrix4<f32>) {
        self.caster.projection = projection;
    }

    pub fn set_position(&mut self, position: impl Into<Vector3<f32>>) {
        self.caster.position = position.into();
        self.update_matrices();
    }

    pub fn set_direction(&mut self, direction: impl Into<Vector3<f32>>) {
        self.caster.direction = direction.into();
        self.update_matrices();
    }

    pub fn position(&self) -> Vector3<f32> {
        self.caster.position
    }

    pub fn direction(&self) -> Vector3<f32> {
        self.caster.direction
    }
}

impl Light for DirectionalLight {
    fn kind(&self) -> LightKind {
        LightKind::Directional
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
        self.caster.view = light_view(self.caster.position, self.caster.direction);
    }
}
