use std::sync::Arc;

use approx::assert_relative_eq;
use cgmath::{Vector3, Vector4};
use defer_ngin::data_structures::bounds::BoundingBox;
use defer_ngin::data_structures::mesh::{Material, Mesh};
use defer_ngin::data_structures::mesh_instance::MeshInstance;
use defer_ngin::gpu::{Attachment, ProgramKey, TextureKind};
use defer_ngin::lights::shadow_map::CLEAR_MOMENTS;
use defer_ngin::lights::{
    DirectionalLight, Light, LightKind, OmnidirectionalLight, OrthographicLight, SHADOW_BIAS_MATRIX,
    SpotLight,
};
use defer_ngin::shared::Shared;

use crate::common::recording_gpu::{Call, RecordingGpu};
use crate::common::{cube_at, init_logger, unit_cube};

mod common;

/// A unit cube with its own geometry, so draws identify the instance.
fn distinct_cube(gpu: &mut RecordingGpu, position: [f32; 3]) -> MeshInstance {
    let mesh = Arc::new(Mesh::from_parts(
        "cube",
        gpu.mesh(),
        36,
        BoundingBox::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0)),
        Material::default(),
    ));
    MeshInstance::new(mesh, position)
}

#[test]
fn planar_shadow_map_follows_the_variance_protocol() {
    init_logger();
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();
    let mesh = unit_cube(&mut gpu);
    let objects = vec![
        cube_at(&mesh, [0.0, 0.0, 0.0]),
        cube_at(&mesh, [3.0, 0.0, 0.0]),
        // Behind the light.
        cube_at(&mesh, [0.0, 30.0, 0.0]),
    ];

    let mut light = SpotLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0, 1.0, 1.0], 40.0)
        .with_resolution(256);
    light.init(&mut gpu, &mut shared);
    gpu.clear();
    light.draw_shadow_map(&mut gpu, &mut shared, &objects);

    let texture = light.shadow_map().texture().unwrap();
    let program = light.caster().program(&shared.programs).unwrap();
    let horizontal = shared.programs.get(ProgramKey::BlurHorizontal).unwrap();
    let vertical = shared.programs.get(ProgramKey::BlurVertical).unwrap();
    let pass = light.shadow_map().pass().unwrap();
    assert_eq!(pass.clear, Some(CLEAR_MOMENTS));
    assert_eq!(
        gpu.commands()
            .into_iter()
            .filter(|call| !matches!(call, Call::CreateProgram(_) | Call::CreateTexture(_)))
            .collect::<Vec<_>>(),
        vec![
            Call::SetBaseLevel(texture, 0),
            Call::BeginPass(pass),
            Call::UseProgram(program),
            Call::SetCullFace(true),
            Call::DrawMesh(mesh.geometry()),
            Call::DrawMesh(mesh.geometry()),
            Call::SetCullFace(false),
            Call::EndPass,
            Call::GenerateMipmaps(texture),
            Call::Dispatch(horizontal, [3, 128, 1]),
            Call::MemoryBarrier,
            Call::Dispatch(vertical, [128, 3, 1]),
            Call::MemoryBarrier,
            Call::SetBaseLevel(texture, 1),
            Call::GenerateMipmaps(texture),
        ]
    );
}

#[test]
fn omni_shadow_map_draws_only_objects_in_range() {
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();
    let near = distinct_cube(&mut gpu, [2.0, 0.0, 0.0]);
    let touching = distinct_cube(&mut gpu, [0.0, 0.0, -5.5]);
    let far = distinct_cube(&mut gpu, [0.0, 20.0, 0.0]);
    let just_outside = distinct_cube(&mut gpu, [6.1, 0.0, 0.0]);
    let expected = [near.mesh().geometry(), touching.mesh().geometry()];
    let objects = vec![near, far, touching, just_outside];

    let mut light = OmnidirectionalLight::new([0.0, 0.0, 0.0], [1.0, 0.5, 0.2])
        .with_range(5.0)
        .with_resolution(128);
    light.init(&mut gpu, &mut shared);
    gpu.clear();
    light.draw_shadow_map(&mut gpu, &mut shared, &objects);

    let drawn = gpu
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::DrawMesh(geometry) => Some(*geometry),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(drawn, expected);
}

#[test]
fn omni_shadow_map_is_not_blurred() {
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();
    let mesh = unit_cube(&mut gpu);
    let objects = vec![cube_at(&mesh, [1.0, 0.0, 0.0])];

    let mut light = OmnidirectionalLight::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]).with_resolution(64);
    light.init(&mut gpu, &mut shared);
    gpu.clear();
    light.draw_shadow_map(&mut gpu, &mut shared, &objects);

    let texture = light.shadow_map().texture().unwrap();
    assert_eq!(gpu.count(|call| matches!(call, Call::Dispatch(..))), 0);
    assert_eq!(gpu.count(|call| *call == Call::GenerateMipmaps(texture)), 1);
    assert_eq!(gpu.calls.last(), Some(&Call::SetBaseLevel(texture, 1)));
    assert!(shared.programs.get(ProgramKey::BlurHorizontal).is_none());

    // The cube map is one layered target.
    let pass = gpu
        .calls
        .iter()
        .find_map(|call| match call {
            Call::BeginPass(pass) => Some(pass.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        pass.colors,
        vec![Attachment::Texture { texture, level: 0, layer: None }]
    );
    assert_eq!(gpu.texture(texture).kind, TextureKind::Cube);
}

#[test]
fn depth_program_is_compiled_once_per_light_kind() {
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();

    let mut lights: Vec<Box<dyn Light>> = vec![
        Box::new(DirectionalLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3]).with_resolution(32)),
        Box::new(DirectionalLight::new([5.0, 10.0, 0.0], [0.0, -1.0, 0.2], [1.0; 3]).with_resolution(32)),
        Box::new(DirectionalLight::new([0.0, 10.0, 5.0], [0.3, -1.0, 0.0], [1.0; 3]).with_resolution(32)),
        Box::new(SpotLight::new([0.0, 5.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0).with_resolution(32)),
        Box::new(SpotLight::new([2.0, 5.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0).with_resolution(32)),
    ];
    for light in &mut lights {
        light.init(&mut gpu, &mut shared);
    }

    assert_eq!(shared.programs.compile_count(ProgramKey::Depth(LightKind::Directional)), 1);
    assert_eq!(shared.programs.compile_count(ProgramKey::Depth(LightKind::Spot)), 1);
    assert_eq!(gpu.compiles_of(ProgramKey::Depth(LightKind::Directional)), 1);
    let first = lights[0].caster().program(&shared.programs);
    assert!(lights[..3].iter().all(|light| light.caster().program(&shared.programs) == first));
    assert_ne!(lights[3].caster().program(&shared.programs), first);
    assert!(lights.iter().all(|light| light.is_initialized()));
}

#[test]
fn invalid_depth_program_is_recompiled_on_next_init() {
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();
    gpu.fail_program(ProgramKey::Depth(LightKind::Orthographic));

    let mut first = OrthographicLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0)
        .with_resolution(32);
    first.init(&mut gpu, &mut shared);
    let invalid = first.caster().program(&shared.programs).unwrap();
    assert!(!defer_ngin::gpu::Gpu::is_program_valid(&gpu, invalid));

    gpu.heal_program(ProgramKey::Depth(LightKind::Orthographic));
    let mut second = OrthographicLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0)
        .with_resolution(32);
    second.init(&mut gpu, &mut shared);
    let mut third = OrthographicLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0)
        .with_resolution(32);
    third.init(&mut gpu, &mut shared);

    assert_eq!(shared.programs.compile_count(ProgramKey::Depth(LightKind::Orthographic)), 2);
    let healed = shared.programs.get(ProgramKey::Depth(LightKind::Orthographic)).unwrap();
    assert_ne!(healed, invalid);
    assert!(defer_ngin::gpu::Gpu::is_program_valid(&gpu, healed));
    // Lights initialised before the recompile follow the shared program.
    for light in [&first, &second, &third] {
        assert_eq!(light.caster().program(&shared.programs), Some(healed));
        assert!(light.is_initialized());
    }

    gpu.clear();
    first.draw_shadow_map(&mut gpu, &mut shared, &[]);
    assert!(gpu.calls.contains(&Call::UseProgram(healed)));
    assert!(!gpu.calls.contains(&Call::UseProgram(invalid)));
}

#[test]
fn drawing_with_an_invalid_program_does_not_panic() {
    init_logger();
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();
    gpu.fail_program(ProgramKey::Depth(LightKind::Directional));
    gpu.fail_program(ProgramKey::BlurVertical);
    let mesh = unit_cube(&mut gpu);
    let objects = vec![cube_at(&mesh, [0.0, 0.0, 0.0])];

    let mut light = DirectionalLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3]).with_resolution(64);
    light.init(&mut gpu, &mut shared);
    light.draw_shadow_map(&mut gpu, &mut shared, &objects);

    assert_eq!(gpu.count(|call| matches!(call, Call::DrawMesh(_))), 1);
    assert_eq!(gpu.count(|call| matches!(call, Call::Dispatch(..))), 2);
}

#[test]
fn drawing_before_init_is_skipped() {
    init_logger();
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();
    let mesh = unit_cube(&mut gpu);
    let objects = vec![cube_at(&mesh, [0.0, 0.0, 0.0])];

    let light = SpotLight::new([0.0, 5.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 10.0);
    light.draw_shadow_map(&mut gpu, &mut shared, &objects);

    assert!(gpu.calls.is_empty());
}

#[test]
fn zero_resolution_shadow_map_is_refused() {
    init_logger();
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();

    let mut light = SpotLight::new([0.0, 5.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 10.0).with_resolution(0);
    light.init(&mut gpu, &mut shared);

    assert!(!light.is_initialized());
    assert!(light.shadow_map().texture().is_none());
    assert_eq!(gpu.count(|call| matches!(call, Call::CreateTexture(_))), 0);
}

#[test]
fn biased_matrix_maps_the_light_axis_to_the_map_centre() {
    let light = SpotLight::new([0.0, 10.0, 0.0], [0.0, -1.0, 0.0], [1.0; 3], 40.0);
    let uniform = light.uniform();
    let biased = cgmath::Matrix4::from(uniform.depth_bias_vp);

    let centre = biased * Vector4::new(0.0, 0.0, 0.0, 1.0);
    assert_relative_eq!(centre.x / centre.w, 0.5, epsilon = 1e-5);
    assert_relative_eq!(centre.y / centre.w, 0.5, epsilon = 1e-5);
    assert!(centre.z / centre.w > 0.0 && centre.z / centre.w < 1.0);

    assert_relative_eq!(SHADOW_BIAS_MATRIX.x.x, 0.5);
    assert_relative_eq!(SHADOW_BIAS_MATRIX.y.y, -0.5);
    // Spot lights carry the cosine of their half cone angle.
    assert_relative_eq!(uniform.direction[3], (std::f32::consts::PI / 8.0).cos(), epsilon = 1e-5);
    assert_relative_eq!(uniform.position[3], 40.0);
}
