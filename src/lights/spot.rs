//! Spot light: perspective shadow map limited to a cone.

use cgmath::{Deg, Rad, Vector3, perspective};

use crate::gpu::{ProgramTemplate, TextureKind};
use crate::lights::{
    DEFAULT_SHADOW_RESOLUTION, Light, LightKind, ShadowCaster, ShadowLightUniform, light_view,
    planar_depth_program,
};

pub const DEPTH_PROGRAM: ProgramTemplate = planar_depth_program(LightKind::Spot, "spot light depth");

pub const SPOT_NEAR: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct SpotLight {
    caster: ShadowCaster,
    /// Full opening angle of the cone.
    angle: Rad<f32>,
    range: f32,
}

impl SpotLight {
    pub fn new(
        position: impl Into<Vector3<f32>>,
        direction: impl Into<Vector3<f32>>,
        color: impl Into<Vector3<f32>>,
        range: f32,
    ) -> Self {
        let mut caster = ShadowCaster::new(TextureKind::D2, DEFAULT_SHADOW_RESOLUTION);
        caster.position = position.into();
        caster.direction = direction.into();
        caster.color = color.into();
        let mut light = Self {
            caster,
            angle: Deg(45.0).into(),
            range,
        };
        light.update_matrices();
        light
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.caster.set_resolution(resolution);
        self
    }

    pub fn angle(&self) -> Rad<f32> {
        self.angle
    }

    pub fn set_angle(&mut self, angle: impl Into<Rad<f32>>) {
        self.angle = angle.into();
        self.update_matrices();
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range;
        self.update_matrices();
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

impl Light for SpotLight {
    fn kind(&self) -> LightKind {
        LightKind::Spot
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
        let far = self.range.max(SPOT_NEAR + f32::EPSILON);
        self.caster.projection = perspective(self.angle, 1.0, SPOT_NEAR, far);
        self.caster.view = light_view(self.caster.position, self.caster.direction);
    }

    fn uniform(&self) -> ShadowLightUniform {
        self.caster
            .uniform(LightKind::Spot, (self.angle.0 * 0.5).cos(), self.range)
    }
}
