use approx::assert_relative_eq;
use defer_ngin::blur::{
    Blur, GaussianKernel, HORIZONTAL_PROGRAM, MAX_RADIUS, VERTICAL_PROGRAM, dispatch_groups,
    level_size,
};
use defer_ngin::gpu::{
    Access, ProgramKey, ProgramRegistry, TextureDesc, TextureId, TextureKind,
};

use crate::common::recording_gpu::{Call, RecordingGpu};

mod common;

fn blur_target(gpu: &mut RecordingGpu, kind: TextureKind, size: u32) -> TextureId {
    use defer_ngin::gpu::Gpu;
    gpu.create_texture(&TextureDesc {
        label: "blur target",
        kind,
        width: size,
        height: size,
        format: defer_ngin::blur::IMAGE_FORMAT,
        mip_levels: TextureDesc::full_mip_chain(size, size),
        usage: wgpu::TextureUsages::STORAGE_BINDING,
    })
}

#[test]
fn dispatch_halves_with_each_level() {
    for level in 0..4 {
        let size: u32 = 1024 >> level;
        let (horizontal, vertical) = dispatch_groups(1024, 1024, level).unwrap();
        assert_eq!(horizontal, [size.div_ceil(64) + 1, size, 1], "level {}", level);
        assert_eq!(vertical, [size, size.div_ceil(64) + 1, 1], "level {}", level);
    }
}

#[test]
fn dispatch_of_non_square_and_tiny_levels() {
    let (horizontal, vertical) = dispatch_groups(100, 30, 0).unwrap();
    assert_eq!(horizontal, [3, 30, 1]);
    assert_eq!(vertical, [100, 2, 1]);

    // A zero height means square.
    assert_eq!(level_size(256, 0, 1), (128, 128));
    // Deep levels clamp to a single texel.
    assert_eq!(level_size(4, 4, 10), (1, 1));
    assert_eq!(dispatch_groups(0, 256, 0), None);
}

#[test]
fn kernel_is_normalised_and_symmetric() {
    let kernel = GaussianKernel::new(6, 2.5);
    let total: f32 = (-6..=6).map(|offset| kernel.weight(offset)).sum();

    assert_relative_eq!(total, 1.0, epsilon = 1e-5);
    for offset in 1..=6 {
        assert_eq!(kernel.weight(offset), kernel.weight(-offset));
        assert!(kernel.weight(offset) < kernel.weight(offset - 1));
    }
    assert_eq!(kernel.weight(7), 0.0);
}

#[test]
fn kernel_clamps_its_parameters() {
    let kernel = GaussianKernel::new(100, -1.0);
    assert_eq!(kernel.radius(), MAX_RADIUS);
    assert_eq!(kernel.sigma(), 1.0);
    assert_eq!(kernel.weights().len(), MAX_RADIUS as usize + 1);
}

/// Clamped separable convolution, the same arithmetic the compute passes do.
fn blur_on_cpu(kernel: &GaussianKernel, image: &[f32], width: usize, height: usize) -> Vec<f32> {
    let radius = kernel.radius() as i32;
    let pass = |src: &[f32], dx: i32, dy: i32| {
        let mut dst = vec![0.0; src.len()];
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                dst[y as usize * width + x as usize] = (-radius..=radius)
                    .map(|i| {
                        let sx = (x + i * dx).clamp(0, width as i32 - 1) as usize;
                        let sy = (y + i * dy).clamp(0, height as i32 - 1) as usize;
                        kernel.weight(i) * src[sy * width + sx]
                    })
                    .sum();
            }
        }
        dst
    };
    pass(&pass(image, 1, 0), 0, 1)
}

#[test]
fn constant_image_survives_both_passes() {
    let kernel = GaussianKernel::default();
    let image = vec![0.7; 16 * 9];

    for texel in blur_on_cpu(&kernel, &image, 16, 9) {
        assert_relative_eq!(texel, 0.7, epsilon = 1e-5);
    }
}

#[test]
fn blur_of_a_2d_level_runs_horizontal_then_vertical() {
    let mut gpu = RecordingGpu::new();
    let mut programs = ProgramRegistry::default();
    let mut blur = Blur::default();
    let texture = blur_target(&mut gpu, TextureKind::D2, 512);
    gpu.clear();

    blur.blur(&mut gpu, &mut programs, texture, TextureKind::D2, 512, 512, 1);

    let horizontal = programs.get(ProgramKey::BlurHorizontal).unwrap();
    let vertical = programs.get(ProgramKey::BlurVertical).unwrap();
    let scratch = TextureId(1);
    let (h_groups, v_groups) = dispatch_groups(512, 512, 1).unwrap();
    let compute = gpu
        .calls
        .iter()
        .filter(|call| {
            matches!(
                call,
                Call::BindImage { .. } | Call::Dispatch(..) | Call::MemoryBarrier
            )
        })
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(
        compute,
        vec![
            Call::BindImage { slot: 0, texture, level: 1, layer: 0, access: Access::Read },
            Call::BindImage { slot: 1, texture: scratch, level: 0, layer: 0, access: Access::Write },
            Call::Dispatch(horizontal, h_groups),
            Call::MemoryBarrier,
            Call::BindImage { slot: 0, texture: scratch, level: 0, layer: 0, access: Access::Read },
            Call::BindImage { slot: 1, texture, level: 1, layer: 0, access: Access::Write },
            Call::Dispatch(vertical, v_groups),
            Call::MemoryBarrier,
        ]
    );
    assert_eq!(gpu.texture(scratch).width, 256);
}

#[test]
fn cube_maps_are_blurred_face_by_face() {
    let mut gpu = RecordingGpu::new();
    let mut programs = ProgramRegistry::default();
    let mut blur = Blur::default();
    let texture = blur_target(&mut gpu, TextureKind::Cube, 64);
    gpu.clear();

    blur.blur(&mut gpu, &mut programs, texture, TextureKind::Cube, 64, 64, 0);

    let faces = gpu
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::BindImage { texture: t, layer, access: Access::Write, .. } if *t == texture => {
                Some(*layer)
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(faces, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(gpu.count(|call| matches!(call, Call::Dispatch(..))), 12);
    assert_eq!(gpu.count(|call| *call == Call::MemoryBarrier), 12);

    // Every dispatch is followed by its barrier before anything else runs.
    let commands = gpu.commands();
    for (i, call) in commands.iter().enumerate() {
        if matches!(call, Call::Dispatch(..)) {
            assert_eq!(commands[i + 1], Call::MemoryBarrier);
        }
    }
}

#[test]
fn programs_and_scratch_images_are_created_once() {
    let mut gpu = RecordingGpu::new();
    let mut programs = ProgramRegistry::default();
    let mut blur = Blur::default();
    let texture = blur_target(&mut gpu, TextureKind::D2, 128);

    for _ in 0..3 {
        blur.blur(&mut gpu, &mut programs, texture, TextureKind::D2, 128, 128, 0);
    }
    blur.blur(&mut gpu, &mut programs, texture, TextureKind::D2, 128, 128, 1);

    assert_eq!(programs.compile_count(HORIZONTAL_PROGRAM.key), 1);
    assert_eq!(programs.compile_count(VERTICAL_PROGRAM.key), 1);
    assert_eq!(gpu.compiles_of(ProgramKey::BlurHorizontal), 1);
    assert_eq!(blur.scratch_images(), 2);
}

#[test]
fn zero_width_request_does_nothing() {
    let mut gpu = RecordingGpu::new();
    let mut programs = ProgramRegistry::default();
    let mut blur = Blur::default();

    blur.blur(&mut gpu, &mut programs, TextureId(0), TextureKind::D2, 0, 128, 0);

    assert!(gpu.calls.is_empty());
    assert_eq!(programs.compile_count(ProgramKey::BlurHorizontal), 0);
}
