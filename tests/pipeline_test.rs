use std::time::Duration;

use approx::assert_relative_eq;
use cgmath::Deg;
use defer_ngin::camera::{Camera, Projection};
use defer_ngin::gpu::{Attachment, ProgramKey, QueryId};
use defer_ngin::lights::{Light, PointLight, SpotLight};
use defer_ngin::pipelines::gui::{Overlay, TimingOverlay};
use defer_ngin::pipelines::timing::{Stage, StageHistory, TimingHistory};
use defer_ngin::pipelines::{DeferredRenderer, RendererConfig};
use defer_ngin::scene::Scene;
use defer_ngin::shared::Shared;

use crate::common::recording_gpu::{Call, RecordingGpu};
use crate::common::{cube_at, init_logger, unit_cube};

mod common;

fn setup() -> (RecordingGpu, DeferredRenderer, Scene, Camera, Projection) {
    init_logger();
    let mut gpu = RecordingGpu::new();
    let renderer = DeferredRenderer::new(
        &mut gpu,
        RendererConfig {
            width: 64,
            height: 48,
            ..Default::default()
        },
    );
    let mut scene = Scene::new();
    let mesh = unit_cube(&mut gpu);
    scene.add(cube_at(&mesh, [0.0, 0.0, -5.0]));
    scene.add(cube_at(&mesh, [0.0, 0.0, 50.0]));
    let camera = Camera::new((0.0, 0.0, 0.0), Deg(-90.0), Deg(0.0));
    let projection = Projection::new(64, 48, Deg(45.0), 0.1, 100.0);
    gpu.clear();
    (gpu, renderer, scene, camera, projection)
}

fn queries(gpu: &RecordingGpu) -> Vec<Call> {
    gpu.calls
        .iter()
        .filter(|call| matches!(call, Call::BeginQuery(_) | Call::EndQuery(_)))
        .cloned()
        .collect()
}

#[test]
fn stages_are_timed_in_order_without_overlap() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();

    assert!(renderer.render(&mut gpu, &mut scene, &camera, &projection, None));

    let expected = Stage::ALL
        .iter()
        .flat_map(|stage| {
            let query = renderer.timings().query(*stage).unwrap();
            [Call::BeginQuery(query), Call::EndQuery(query)]
        })
        .collect::<Vec<_>>();
    assert_eq!(queries(&gpu), expected);
    assert_eq!(expected[0], Call::BeginQuery(QueryId(0)));

    let present = gpu.calls.iter().position(|call| *call == Call::Present).unwrap();
    let last_query = gpu
        .calls
        .iter()
        .rposition(|call| matches!(call, Call::EndQuery(_)))
        .unwrap();
    assert!(last_query < present);
}

#[test]
fn timings_feed_the_history() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    gpu.elapsed = Some(Duration::from_micros(1500));

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);
    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    for stage in Stage::ALL {
        let history = renderer.history().stage(stage);
        assert_eq!(history.len(), 2, "{}", stage.label());
        assert_relative_eq!(history.last().unwrap(), 1.5, epsilon = 1e-4);
    }
    assert_eq!(renderer.history().frame.len(), 1);
}

#[test]
fn missing_timer_support_leaves_history_empty() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    gpu.elapsed = None;

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    assert!(renderer.history().stage(Stage::GBuffer).is_empty());
}

#[test]
fn no_frame_means_no_work() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    gpu.frame_available = false;

    assert!(!renderer.render(&mut gpu, &mut scene, &camera, &projection, None));
    assert_eq!(gpu.calls, vec![Call::AcquireFrame]);
}

#[test]
fn only_visible_objects_reach_the_gbuffer() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    let gbuffer = gpu
        .calls
        .iter()
        .position(|call| matches!(call, Call::BeginPass(pass) if pass.label == "g-buffer"))
        .unwrap();
    let end = gbuffer + gpu.calls[gbuffer..].iter().position(|call| *call == Call::EndPass).unwrap();
    let draws = gpu.calls[gbuffer..end]
        .iter()
        .filter(|call| matches!(call, Call::DrawMesh(_)))
        .count();
    assert_eq!(draws, 1);
    assert_eq!(gpu.calls[gbuffer + 3], Call::SetCullFace(true));
}

#[test]
fn frame_passes_run_in_pipeline_order() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    scene.add_light(SpotLight::new([0.0, 5.0, -5.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0).with_resolution(32));
    let mut overlay = TimingOverlay::default();

    renderer.render(&mut gpu, &mut scene, &camera, &projection, Some(&mut overlay));

    let labels = gpu
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::BeginPass(pass) => Some(pass.label),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec![
            "shadow map",
            "g-buffer",
            "light pass",
            "ambient occlusion",
            "bloom extract",
            "volumetric",
            "composite",
            "timing overlay",
        ]
    );
    assert_eq!(gpu.calls.last(), Some(&Call::Present));
}

#[test]
fn light_pass_adds_one_draw_per_shadow_light() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    scene.add_light(SpotLight::new([0.0, 5.0, -5.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0).with_resolution(32));
    scene.add_light(SpotLight::new([3.0, 5.0, -5.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0).with_resolution(32));

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    let start = gpu
        .calls
        .iter()
        .position(|call| matches!(call, Call::BeginPass(pass) if pass.label == "light pass"))
        .unwrap();
    let end = start + gpu.calls[start..].iter().position(|call| *call == Call::EndPass).unwrap();
    let fullscreen = gpu.calls[start..end]
        .iter()
        .filter(|call| **call == Call::DrawFullscreen)
        .count();
    assert_eq!(fullscreen, 3);
}

#[test]
fn static_light_is_drawn_once_across_frames() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    let light = SpotLight::new([0.0, 5.0, -5.0], [0.0, -1.0, 0.0], [1.0; 3], 20.0).with_resolution(32);
    let handle = scene.add_light(light);
    if let Some(light) = scene.light_mut(handle) {
        light.set_dynamic(false);
    }

    for _ in 0..3 {
        assert!(renderer.render(&mut gpu, &mut scene, &camera, &projection, None));
    }

    let shadow_passes =
        gpu.count(|call| matches!(call, Call::BeginPass(pass) if pass.label == "shadow map"));
    assert_eq!(shadow_passes, 1);
    let map = scene
        .light(handle)
        .and_then(|light| light.shadow_map().texture())
        .unwrap();
    assert_eq!(gpu.count(|call| *call == Call::SetBaseLevel(map, 1)), 1);
}

#[test]
fn debug_lights_draw_billboards_after_the_light_pass() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    renderer.config.debug_lights = true;
    scene.point_lights_mut().push(PointLight::new([0.0, 1.0, -4.0], [1.0; 3], 3.0));
    scene.point_lights_mut().push(PointLight::new([1.0, 1.0, -4.0], [1.0; 3], 3.0));

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    let billboards = gpu
        .calls
        .iter()
        .position(|call| matches!(call, Call::BeginPass(pass) if pass.label == "light billboards"))
        .unwrap();
    let pass = &gpu.calls[billboards..];
    assert!(pass.contains(&Call::SetCullFace(false)));
    assert!(pass.contains(&Call::DrawPoints(2)));
    match &gpu.calls[billboards] {
        Call::BeginPass(desc) => assert_eq!(desc.clear, None),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn disabled_bloom_skips_extraction_and_blur() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    renderer.settings.bloom = -1.0;

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    assert_eq!(gpu.count(|call| matches!(call, Call::Dispatch(..))), 0);
    let extract = renderer.shared().programs.get(ProgramKey::BloomExtract).unwrap();
    assert!(!gpu.calls.contains(&Call::UseProgram(extract)));
}

#[test]
fn bloom_is_blurred_at_its_downsampling_level() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();
    renderer.settings.bloom_blur = 2;
    renderer.settings.bloom_downsampling = 1;

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    let bloom = renderer.post_process().bloom();
    assert_eq!(gpu.count(|call| matches!(call, Call::Dispatch(..))), 4);
    assert!(gpu.calls.contains(&Call::SetBaseLevel(bloom, 1)));
}

#[test]
fn resize_reallocates_targets() {
    let (mut gpu, mut renderer, _scene, _camera, _projection) = setup();

    renderer.resize(&mut gpu, 64, 48);
    assert!(gpu.calls.is_empty());

    let live = gpu.live_textures();
    let old_lit = renderer.light_pass().lit();
    renderer.resize(&mut gpu, 128, 96);
    // G-buffer, lit target and post-process targets are replaced, not leaked.
    assert_eq!(gpu.count(|call| matches!(call, Call::DestroyTexture(_))), 8);
    assert_eq!(gpu.live_textures(), live);
    assert!(gpu.is_destroyed(old_lit));
    assert_eq!(renderer.gbuffer().size(), (128, 96));
    assert_eq!((renderer.config.width, renderer.config.height), (128, 96));
    let lit = gpu.texture(renderer.light_pass().lit());
    assert_eq!((lit.width, lit.height), (128, 96));
    // Programs are shared and not rebuilt.
    assert_eq!(gpu.count(|call| matches!(call, Call::CreateProgram(_))), 0);
}

#[test]
fn composite_writes_the_output() {
    let (mut gpu, mut renderer, mut scene, camera, projection) = setup();

    renderer.render(&mut gpu, &mut scene, &camera, &projection, None);

    let composite = gpu
        .calls
        .iter()
        .find_map(|call| match call {
            Call::BeginPass(pass) if pass.label == "composite" => Some(pass.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(composite.colors, vec![Attachment::Output]);
}

#[test]
fn history_is_bounded() {
    let mut history = TimingHistory::new(3);
    for ms in [1.0, 2.0, 3.0, 4.0] {
        history.push(ms);
    }
    assert_eq!(history.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    assert_relative_eq!(history.average().unwrap(), 3.0);
    assert_eq!(history.max(), Some(4.0));
}

#[test]
fn overlay_scales_bars_to_the_budget() {
    let mut history = StageHistory::new(4);
    let overlay = TimingOverlay {
        budget_ms: 10.0,
        ..Default::default()
    };
    let mut gpu = RecordingGpu::new();
    let mut shared = Shared::default();

    let empty = overlay.uniform(&history);
    assert_eq!(empty.bars, [[0.0; 4]; 2]);

    history.frame.push(25.0);
    let uniform = overlay.uniform(&history);
    // Stage bars come first, the frame bar is clamped.
    assert_relative_eq!(uniform.bars[1][1], 1.0);

    let mut overlay = overlay;
    overlay.draw(&mut gpu, &mut shared, &history);
    assert_eq!(gpu.count(|call| *call == Call::DrawFullscreen), 1);
}
