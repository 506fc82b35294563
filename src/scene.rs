//! Everything that gets rendered: mesh instances, lights and the skybox.
//!
//! Lights live in generational arenas, so a handle keeps pointing at its light
//! while others are added or removed and stops resolving once its own light is
//! gone. Omnidirectional lights are stored apart from the planar ones because
//! the light pass treats them differently.
//!
//! A light's shadow map is first rendered on the `update` after its
//! initialisation; later updates only redraw dynamic lights.

use crate::data_structures::arena::{Arena, Handle};
use crate::data_structures::mesh_instance::MeshInstance;
use crate::data_structures::skybox::Skybox;
use crate::gpu::{BufferId, Gpu};
use crate::lights::{AsAny, Light, OmnidirectionalLight, PointLights};
use crate::shared::Shared;

pub type LightHandle = Handle<Box<dyn Light>>;
pub type OmniLightHandle = Handle<OmnidirectionalLight>;

#[derive(Default)]
pub struct Scene {
    objects: Vec<MeshInstance>,
    lights: Arena<Box<dyn Light>>,
    omni_lights: Arena<OmnidirectionalLight>,
    point_lights: PointLights,
    skybox: Skybox,
    // Initialised lights whose shadow map was never rendered.
    undrawn: Vec<LightHandle>,
    undrawn_omni: Vec<OmniLightHandle>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance and returns its index.
    pub fn add(&mut self, object: MeshInstance) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    /// Removes the instance at `index`, shifting later instances down.
    pub fn remove_object(&mut self, index: usize) -> Option<MeshInstance> {
        (index < self.objects.len()).then(|| self.objects.remove(index))
    }

    pub fn objects(&self) -> &[MeshInstance] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [MeshInstance] {
        &mut self.objects
    }

    pub fn add_light(&mut self, light: impl Light) -> LightHandle {
        self.lights.insert(Box::new(light))
    }

    /// Removes a light and frees its shadow map. The returned light is
    /// uninitialised again and can be re-added.
    pub fn remove_light(
        &mut self,
        gpu: &mut dyn Gpu,
        handle: LightHandle,
    ) -> Option<Box<dyn Light>> {
        let mut light = self.lights.remove(handle)?;
        light.release(gpu);
        self.undrawn.retain(|undrawn| *undrawn != handle);
        Some(light)
    }

    pub fn light(&self, handle: LightHandle) -> Option<&dyn Light> {
        self.lights.get(handle).map(|light| light.as_ref())
    }

    pub fn light_mut(&mut self, handle: LightHandle) -> Option<&mut dyn Light> {
        match self.lights.get_mut(handle) {
            Some(light) => Some(light.as_mut()),
            None => None,
        }
    }

    /// Typed access, e.g. `scene.light_as::<SpotLight>(handle)`.
    pub fn light_as<L: Light>(&self, handle: LightHandle) -> Option<&L> {
        self.light(handle)?.as_any().downcast_ref()
    }

    pub fn light_as_mut<L: Light>(&mut self, handle: LightHandle) -> Option<&mut L> {
        self.light_mut(handle)?.as_any_mut().downcast_mut()
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightHandle, &dyn Light)> {
        self.lights
            .iter()
            .map(|(handle, light)| (handle, light.as_ref()))
    }

    pub fn add_omni_light(&mut self, light: OmnidirectionalLight) -> OmniLightHandle {
        self.omni_lights.insert(light)
    }

    pub fn remove_omni_light(
        &mut self,
        gpu: &mut dyn Gpu,
        handle: OmniLightHandle,
    ) -> Option<OmnidirectionalLight> {
        let mut light = self.omni_lights.remove(handle)?;
        light.release(gpu);
        self.undrawn_omni.retain(|undrawn| *undrawn != handle);
        Some(light)
    }

    pub fn omni_light(&self, handle: OmniLightHandle) -> Option<&OmnidirectionalLight> {
        self.omni_lights.get(handle)
    }

    pub fn omni_light_mut(&mut self, handle: OmniLightHandle) -> Option<&mut OmnidirectionalLight> {
        self.omni_lights.get_mut(handle)
    }

    pub fn omni_lights(&self) -> impl Iterator<Item = (OmniLightHandle, &OmnidirectionalLight)> {
        self.omni_lights.iter()
    }

    pub fn point_lights(&self) -> &PointLights {
        &self.point_lights
    }

    pub fn point_lights_mut(&mut self) -> &mut PointLights {
        &mut self.point_lights
    }

    pub fn point_light_buffer(&self) -> Option<BufferId> {
        self.point_lights.buffer()
    }

    pub fn skybox(&self) -> &Skybox {
        &self.skybox
    }

    pub fn skybox_mut(&mut self) -> &mut Skybox {
        &mut self.skybox
    }

    /// Initialises every light that has not been initialised yet.
    pub fn init_lights(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared) {
        for (handle, light) in self
            .lights
            .iter_mut()
            .filter(|(_, light)| !light.is_initialized())
        {
            light.init(gpu, shared);
            if light.is_initialized() {
                self.undrawn.push(handle);
            }
        }
        for (handle, light) in self
            .omni_lights
            .iter_mut()
            .filter(|(_, light)| !light.is_initialized())
        {
            light.init(gpu, shared);
            if light.is_initialized() {
                self.undrawn_omni.push(handle);
            }
        }
    }

    /// Redraws the shadow maps of every light, or only of dynamic ones.
    pub fn draw_shadow_maps(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared, only_dynamic: bool) {
        if !only_dynamic {
            self.undrawn.clear();
            self.undrawn_omni.clear();
        }
        self.draw_selected(gpu, shared, only_dynamic);
    }

    /// Per-frame update: shadow maps of dynamic and newly initialised lights,
    /// then the point light buffer.
    pub fn update(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared) {
        self.init_lights(gpu, shared);
        self.draw_selected(gpu, shared, true);
        self.undrawn.clear();
        self.undrawn_omni.clear();
        self.point_lights.sync(gpu);
    }

    fn draw_selected(&self, gpu: &mut dyn Gpu, shared: &mut Shared, only_dynamic: bool) {
        let lights = self
            .lights
            .iter()
            .filter(|(handle, light)| {
                !only_dynamic || light.is_dynamic() || self.undrawn.contains(handle)
            })
            .map(|(_, light)| light.as_ref() as &dyn Light);
        let omni_lights = self
            .omni_lights
            .iter()
            .filter(|(handle, light)| {
                !only_dynamic || light.is_dynamic() || self.undrawn_omni.contains(handle)
            })
            .map(|(_, light)| light as &dyn Light);
        for light in lights.chain(omni_lights) {
            light.draw_shadow_map(gpu, shared, &self.objects);
        }
    }
}
