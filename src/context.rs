//! Central GPU context: device, queue and the target frames are presented to.
//!
//! A [`Context`] either drives a window surface or renders into an offscreen
//! texture (headless), which is what tests and frame captures use. It
//! implements [`crate::gpu::Gpu`] in [`crate::gpu::backend`].

use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use winit::window::Window;

use crate::gpu::backend::Backend;

/// Timer queries need to be written between passes of one encoder.
const TIMESTAMP_FEATURES: wgpu::Features =
    wgpu::Features::TIMESTAMP_QUERY.union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

pub struct Context {
    pub(crate) window: Option<Arc<Window>>,
    pub surface: Option<wgpu::Surface<'static>>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub(crate) headless: Option<wgpu::Texture>,
    pub(crate) backend: Backend,
}

impl Context {
    /// Creates a context presenting into `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("creating window surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable adapter")?;
        let (device, queue, timestamps) = Self::request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Tone mapping writes linear colour and relies on an sRGB frame.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let backend = Backend::new(&device, &queue, timestamps);
        Ok(Self {
            window: Some(window),
            surface: Some(surface),
            device,
            queue,
            config,
            headless: None,
            backend,
        })
    }

    /// Creates a context rendering into an offscreen `width`x`height` target.
    pub async fn headless(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable adapter")?;
        let (device, queue, timestamps) = Self::request_device(&adapter).await?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: HEADLESS_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let headless = Self::headless_target(&device, &config);
        let backend = Backend::new(&device, &queue, timestamps);
        Ok(Self {
            window: None,
            surface: None,
            device,
            queue,
            config,
            headless: Some(headless),
            backend,
        })
    }

    async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue, bool)> {
        let timestamps = adapter.features().contains(TIMESTAMP_FEATURES);
        if !timestamps {
            log::warn!("Adapter lacks timestamp queries, stage timings stay empty");
        }
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("defer-ngin device"),
                required_features: if timestamps {
                    TIMESTAMP_FEATURES
                } else {
                    wgpu::Features::empty()
                },
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("requesting device")?;
        Ok((device, queue, timestamps))
    }

    fn headless_target(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("headless output"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: config.format,
            usage: config.usage,
            view_formats: &[],
        })
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        self.window.as_ref()
    }

    pub fn timestamps_supported(&self) -> bool {
        self.backend.timestamps_supported()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
        if self.headless.is_some() {
            self.headless = Some(Self::headless_target(&self.device, &self.config));
        }
    }

    /// Reads the last rendered headless frame back to the CPU.
    pub fn read_output(&self) -> Result<image::RgbaImage> {
        let texture = self
            .headless
            .as_ref()
            .ok_or_else(|| anyhow!("only headless contexts can read their output"))?;
        let (width, height) = (self.config.width, self.config.height);
        let pixels = crate::gpu::backend::read_back(
            &self.device,
            &self.queue,
            texture,
            0,
            0,
            (width, height),
            4,
        )?;

        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("readback size does not match {}x{}", width, height))
    }
}
