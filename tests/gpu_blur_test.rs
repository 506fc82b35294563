#[cfg(feature = "integration-tests")]
mod common;

/// Splits RGBA16F texels into their raw half-float bit patterns.
#[cfg(feature = "integration-tests")]
fn halves(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|half| u16::from_le_bytes([half[0], half[1]]))
        .collect()
}

#[test]
#[cfg(feature = "integration-tests")]
fn constant_level_is_unchanged_by_the_gpu_blur() {
    use defer_ngin::Context;
    use defer_ngin::blur::IMAGE_FORMAT;
    use defer_ngin::gpu::{Attachment, Gpu, PassDesc, TextureDesc, TextureKind};
    use defer_ngin::shared::Shared;

    const FILL: [f32; 4] = [0.25, 0.5, 0.75, 1.0];
    // FILL as half floats.
    const FILL_BITS: [u16; 4] = [0x3400, 0x3800, 0x3a00, 0x3c00];
    let (size, level) = (64, 1);

    crate::common::init_logger();
    let mut ctx = futures::executor::block_on(Context::headless(16, 16)).expect("headless context");
    let mut shared = Shared::default();
    let texture = ctx.create_texture(&TextureDesc {
        label: "constant",
        kind: TextureKind::D2,
        width: size,
        height: size,
        format: IMAGE_FORMAT,
        mip_levels: TextureDesc::full_mip_chain(size, size),
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
    });
    ctx.begin_pass(&PassDesc {
        label: "fill",
        colors: vec![Attachment::Texture {
            texture,
            level,
            layer: Some(0),
        }],
        depth: None,
        clear: Some(FILL),
    });
    ctx.end_pass();

    let before = halves(&ctx.read_texture_level(texture, level, 0).expect("read the filled level"));
    let Shared { programs, blur } = &mut shared;
    blur.blur(&mut ctx, programs, texture, TextureKind::D2, size, size, level);
    let after = halves(&ctx.read_texture_level(texture, level, 0).expect("read the blurred level"));

    // 32x32 texels at level 1, four channels each.
    assert_eq!(before.len(), 32 * 32 * 4);
    assert_eq!(after.len(), before.len());
    assert_eq!(blur.scratch_images(), 1);
    for (i, (before, after)) in before.iter().zip(&after).enumerate() {
        assert_eq!(*before, FILL_BITS[i % 4], "fill of channel {}", i);
        // Positive half floats order like their bit patterns; allow one rounding step.
        assert!(
            before.abs_diff(*after) <= 1,
            "texel {} channel {}: {:#06x} became {:#06x}",
            i / 4,
            i % 4,
            before,
            after
        );
    }
}
