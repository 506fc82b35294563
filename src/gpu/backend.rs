//! wgpu implementation of [`Gpu`] for [`Context`].
//!
//! Bind group layout shared by every program:
//!
//! * group 0: the block of the last [`Gpu::set_uniforms`] call,
//! * group 1: the [`DrawUniforms`] of the current mesh draw,
//! * group 2: the program's [`Binding`]s, binding `n` is slot `n`.
//!
//! Groups 0 and 1 are slices of two ring buffers bound with dynamic offsets.
//! The rings are written to the GPU once per submit. Raster programs are built
//! twice, with and without back-face culling, so [`Gpu::set_cull_face`] only
//! selects a pipeline.
//!
//! Layered cube passes record their draws and replay them once per face, with
//! the face index passed as instance index.

use std::collections::HashMap;
use std::iter;
use std::mem;
use std::time::Duration;

use anyhow::anyhow;
use wgpu::util::DeviceExt;

use crate::context::Context;
use crate::data_structures::mesh::MeshVertex;
use crate::data_structures::texture::{GpuTexture, create_default_sampler};
use crate::gpu::{
    Access, Attachment, Binding, Blend, BufferId, DepthMode, DrawUniforms, GeometryId, Gpu,
    PassDesc, ProgramDesc, ProgramId, ProgramKind, QueryId, TargetFormat, TextureDesc, TextureId,
    TextureKind, VertexInput,
};

/// Size of one `set_uniforms` block; larger blocks are truncated.
const PASS_SLOT: u64 = 512;
const DRAW_SLOT: u64 = 256;
const INITIAL_SLOTS: u64 = 128;
const MAX_QUERIES: u32 = 32;
const MIN_BUFFER_SIZE: u64 = 32;
const MAX_CACHED_BIND_GROUPS: usize = 1024;

pub(crate) struct Backend {
    pass_ring: UniformRing,
    draw_ring: UniformRing,
    sampler: wgpu::Sampler,
    textures: Vec<Option<GpuTexture>>,
    free_textures: Vec<u32>,
    programs: Vec<Option<GpuProgram>>,
    buffers: Vec<GpuBuffer>,
    geometries: Vec<Geometry>,
    timestamps: Option<Timestamps>,
    query_count: u32,
    mipmaps: MipmapBlitter,
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<wgpu::SurfaceTexture>,
    pass: Pass,
    state: State,
}

impl Backend {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue, timestamps: bool) -> Self {
        let pass_layout = uniform_layout(device, "pass uniforms", PASS_SLOT);
        let draw_layout = uniform_layout(device, "draw uniforms", DRAW_SLOT);
        Self {
            pass_ring: UniformRing::new(device, pass_layout, "pass uniforms", PASS_SLOT, INITIAL_SLOTS),
            draw_ring: UniformRing::new(device, draw_layout, "draw uniforms", DRAW_SLOT, INITIAL_SLOTS * 8),
            sampler: create_default_sampler(device),
            textures: Vec::new(),
            free_textures: Vec::new(),
            programs: Vec::new(),
            buffers: Vec::new(),
            geometries: Vec::new(),
            timestamps: timestamps.then(|| Timestamps::new(device, queue)),
            query_count: 0,
            mipmaps: MipmapBlitter::new(device),
            bind_groups: HashMap::new(),
            encoder: None,
            frame: None,
            pass: Pass::None,
            state: State::default(),
        }
    }

    pub(crate) fn timestamps_supported(&self) -> bool {
        self.timestamps.is_some()
    }

    fn texture(&self, texture: TextureId) -> Option<&GpuTexture> {
        self.textures.get(texture.0 as usize).and_then(Option::as_ref)
    }
}

/// A uniform buffer handed out in fixed-size slots.
struct UniformRing {
    label: &'static str,
    slot: u64,
    capacity: u64,
    layout: wgpu::BindGroupLayout,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    staging: Vec<u8>,
}

impl UniformRing {
    fn new(
        device: &wgpu::Device,
        layout: wgpu::BindGroupLayout,
        label: &'static str,
        slot: u64,
        capacity: u64,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: slot * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(slot),
                }),
            }],
        });
        Self {
            label,
            slot,
            capacity,
            layout,
            buffer,
            bind_group,
            staging: Vec::new(),
        }
    }

    /// Appends `data` and returns its dynamic offset.
    fn push(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) -> u32 {
        if self.staging.len() as u64 >= self.slot * self.capacity {
            // Commands recorded so far keep the full buffer alive.
            self.flush(queue);
            log::debug!("Growing {} to {} slots", self.label, self.capacity * 2);
            *self = Self::new(device, self.layout.clone(), self.label, self.slot, self.capacity * 2);
        }
        let slot = self.slot as usize;
        if data.len() > slot {
            log::warn!("{}: {} byte block truncated to {}", self.label, data.len(), slot);
        }
        let offset = self.staging.len();
        self.staging.extend_from_slice(&data[..data.len().min(slot)]);
        self.staging.resize(offset + slot, 0);
        offset as u32
    }

    fn flush(&mut self, queue: &wgpu::Queue) {
        if !self.staging.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.staging);
            self.staging.clear();
        }
    }
}

enum Pipelines {
    Raster {
        culled: wgpu::RenderPipeline,
        unculled: wgpu::RenderPipeline,
    },
    Compute(wgpu::ComputePipeline),
}

struct GpuProgram {
    label: &'static str,
    pipelines: Pipelines,
    resource_layout: wgpu::BindGroupLayout,
    bindings: &'static [Binding],
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    generation: u32,
    label: &'static str,
}

struct Geometry {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum BoundResource {
    Texture(TextureId, u32),
    Buffer(BufferId, u32),
    Image(TextureId, u32, u32, Access),
    Sampler,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct BindKey {
    program: ProgramId,
    resources: Vec<BoundResource>,
}

#[derive(Default)]
struct State {
    program: Option<ProgramId>,
    cull: bool,
    pass_offset: u32,
    textures: HashMap<u32, TextureId>,
    buffers: HashMap<u32, BufferId>,
    images: HashMap<u32, (TextureId, u32, u32, Access)>,
}

enum Pass {
    None,
    Render(wgpu::RenderPass<'static>),
    Layered { desc: PassDesc, draws: Vec<RecordedDraw> },
    Compute(wgpu::ComputePass<'static>),
}

#[derive(Clone, Copy)]
enum DrawCall {
    Mesh(GeometryId),
    Vertices(u32),
}

struct RecordedDraw {
    pipeline: wgpu::RenderPipeline,
    pass_group: wgpu::BindGroup,
    pass_offset: u32,
    draw_group: wgpu::BindGroup,
    draw_offset: u32,
    resources: wgpu::BindGroup,
    call: DrawCall,
}

fn execute(pass: &mut wgpu::RenderPass<'_>, draw: &RecordedDraw, geometries: &[Geometry], instance: u32) {
    let instances = instance..instance + 1;
    pass.set_pipeline(&draw.pipeline);
    pass.set_bind_group(0, &draw.pass_group, &[draw.pass_offset]);
    pass.set_bind_group(1, &draw.draw_group, &[draw.draw_offset]);
    pass.set_bind_group(2, &draw.resources, &[]);
    match draw.call {
        DrawCall::Mesh(id) => {
            let Some(geometry) = geometries.get(id.0 as usize) else {
                return;
            };
            if geometry.index_count == 0 {
                return;
            }
            pass.set_vertex_buffer(0, geometry.vertices.slice(..));
            pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..geometry.index_count, 0, instances);
        }
        DrawCall::Vertices(count) => pass.draw(0..count, instances),
    }
}

/// Timer queries: query `n` owns timestamps `2n` and `2n + 1`.
struct Timestamps {
    set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    period: f32,
    written: Vec<bool>,
    in_flight: Vec<bool>,
    pending: bool,
    results: Vec<Option<Duration>>,
}

impl Timestamps {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let count = MAX_QUERIES * 2;
        let size = count as u64 * mem::size_of::<u64>() as u64;
        Self {
            set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("stage timestamps"),
                ty: wgpu::QueryType::Timestamp,
                count,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("timestamp resolve"),
                size,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("timestamp readback"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
            period: queue.get_timestamp_period(),
            written: vec![false; MAX_QUERIES as usize],
            in_flight: vec![false; MAX_QUERIES as usize],
            pending: false,
            results: vec![None; MAX_QUERIES as usize],
        }
    }

    fn resolve(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if !self.written.iter().any(|w| *w) {
            return;
        }
        encoder.resolve_query_set(&self.set, 0..MAX_QUERIES * 2, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.readback, 0, self.resolve.size());
        self.in_flight.copy_from_slice(&self.written);
        self.written.fill(false);
        self.pending = true;
    }

    fn read(&mut self, device: &wgpu::Device) {
        self.pending = false;
        let slice = self.readback.slice(..);
        match futures::executor::block_on(map_read(device, slice)) {
            Ok(data) => {
                let ticks = data
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(chunk);
                        u64::from_le_bytes(bytes)
                    })
                    .collect::<Vec<_>>();
                for (query, in_flight) in self.in_flight.iter().enumerate() {
                    if *in_flight {
                        let elapsed = ticks[2 * query + 1].saturating_sub(ticks[2 * query]);
                        let nanos = elapsed as f64 * self.period as f64;
                        self.results[query] = Some(Duration::from_nanos(nanos as u64));
                    }
                }
            }
            Err(e) => log::warn!("Cannot read timestamps: {e:#}"),
        }
        self.readback.unmap();
    }
}

/// Maps `slice` for reading, waits for the GPU and copies the contents out.
/// The caller unmaps the buffer.
pub(crate) async fn map_read(device: &wgpu::Device, slice: wgpu::BufferSlice<'_>) -> anyhow::Result<Vec<u8>> {
    // The mapping has to be requested before polling or the future never resolves.
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).ok();
    });
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    })?;
    rx.receive()
        .await
        .ok_or_else(|| anyhow!("buffer mapping was cancelled"))??;
    let data = slice.get_mapped_range().to_vec();
    Ok(data)
}

/// Copies one level and layer of `texture` into tightly packed rows.
pub(crate) fn read_back(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    mip_level: u32,
    layer: u32,
    (width, height): (u32, u32),
    bytes_per_texel: u32,
) -> anyhow::Result<Vec<u8>> {
    // Rows of a texture copy must be 256 byte aligned.
    let unpadded = width * bytes_per_texel;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (padded * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(iter::once(encoder.finish()));

    let data = futures::executor::block_on(map_read(device, output_buffer.slice(..)))?;
    let mut texels = Vec::with_capacity((unpadded * height) as usize);
    for row in data.chunks_exact(padded as usize) {
        texels.extend_from_slice(&row[..unpadded as usize]);
    }
    output_buffer.unmap();
    Ok(texels)
}

impl Context {
    /// Submits pending work and reads back one level and layer of `texture`,
    /// tightly packed in the texture's own format.
    pub fn read_texture_level(
        &mut self,
        texture: TextureId,
        level: u32,
        layer: u32,
    ) -> anyhow::Result<Vec<u8>> {
        self.submit();
        let target = self
            .backend
            .texture(texture)
            .ok_or_else(|| anyhow!("unknown texture {:?}", texture))?;
        if level >= target.desc.mip_levels.max(1) || layer >= target.desc.kind.layers() {
            return Err(anyhow!("{} has no level {} layer {}", target.desc.label, level, layer));
        }
        let bytes_per_texel = target
            .desc
            .format
            .block_copy_size(None)
            .ok_or_else(|| anyhow!("{:?} cannot be read back", target.desc.format))?;
        read_back(
            &self.device,
            &self.queue,
            &target.texture,
            level,
            layer,
            target.level_size(level),
            bytes_per_texel,
        )
    }
}

/// Downsamples one mip level into the next with a linear filter.
struct MipmapBlitter {
    module: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MipmapBlitter {
    fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mipmap"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/mipmap.wgsl").into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mipmap"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });
        Self {
            module,
            layout,
            pipeline_layout,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        self.pipelines
            .entry(format)
            .or_insert_with(|| {
                mk_render_pipeline(
                    device,
                    "mipmap",
                    &self.pipeline_layout,
                    &self.module,
                    &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    None,
                    &[],
                    None,
                )
            })
            .clone()
    }
}

fn uniform_layout(device: &wgpu::Device, label: &'static str, size: u64) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(size),
            },
            count: None,
        }],
    })
}

fn view_dimension(kind: TextureKind) -> wgpu::TextureViewDimension {
    match kind {
        TextureKind::D2 => wgpu::TextureViewDimension::D2,
        TextureKind::Cube => wgpu::TextureViewDimension::Cube,
    }
}

fn layout_entry(slot: u32, binding: Binding, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    let ty = match binding {
        Binding::Texture(kind) => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: view_dimension(kind),
            multisampled: false,
        },
        Binding::UnfilterableTexture | Binding::ReadImage => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        Binding::StorageBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        Binding::WriteImage(format) => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        Binding::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    };
    wgpu::BindGroupLayoutEntry {
        binding: slot,
        visibility,
        ty,
        count: None,
    }
}

fn blend_state(blend: Blend) -> Option<wgpu::BlendState> {
    match blend {
        Blend::Replace => None,
        Blend::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState { color: add, alpha: add })
        }
        Blend::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
    }
}

fn depth_state(write: bool, compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: GpuTexture::DEPTH_FORMAT,
        depth_write_enabled: Some(write),
        depth_compare: Some(compare),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

#[allow(clippy::too_many_arguments)]
fn mk_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    targets: &[Option<wgpu::ColorTargetState>],
    depth_stencil: Option<wgpu::DepthStencilState>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    cull_mode: Option<wgpu::Face>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

fn new_encoder(device: &wgpu::Device) -> wgpu::CommandEncoder {
    device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Frame Encoder"),
    })
}

impl Context {
    fn texture(&self, texture: TextureId) -> Option<&GpuTexture> {
        let found = self.backend.texture(texture);
        if found.is_none() {
            log::warn!("Unknown texture {:?}", texture);
        }
        found
    }

    fn build_program(&self, desc: &ProgramDesc) -> Option<GpuProgram> {
        if desc.sources.is_empty() {
            log::error!("Program {} has no sources", desc.label);
            return None;
        }
        let source = desc
            .sources
            .iter()
            .map(|(_, source)| source.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let info = futures::executor::block_on(module.get_compilation_info());
        let compile_errors = info
            .messages
            .iter()
            .filter(|message| message.message_type == wgpu::CompilationMessageType::Error)
            .map(|message| message.message.clone())
            .collect::<Vec<_>>();

        let visibility = match desc.kind {
            ProgramKind::Raster { .. } => wgpu::ShaderStages::VERTEX_FRAGMENT,
            ProgramKind::Compute { .. } => wgpu::ShaderStages::COMPUTE,
        };
        let entries = desc
            .bindings
            .iter()
            .enumerate()
            .map(|(slot, binding)| layout_entry(slot as u32, *binding, visibility))
            .collect::<Vec<_>>();
        let resource_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &entries,
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[
                Some(&self.backend.pass_ring.layout),
                Some(&self.backend.draw_ring.layout),
                Some(&resource_layout),
            ],
            immediate_size: 0,
        });

        let pipelines = if compile_errors.is_empty() {
            Some(match desc.kind {
                ProgramKind::Raster {
                    input,
                    targets,
                    depth,
                    blend,
                } => {
                    let blend = blend_state(blend);
                    let targets = targets
                        .iter()
                        .map(|target| {
                            Some(wgpu::ColorTargetState {
                                format: match *target {
                                    TargetFormat::Fixed(format) => format,
                                    TargetFormat::Output => self.config.format,
                                },
                                blend,
                                write_mask: wgpu::ColorWrites::ALL,
                            })
                        })
                        .collect::<Vec<_>>();
                    let vertex_layouts = match input {
                        VertexInput::Mesh => vec![MeshVertex::desc()],
                        VertexInput::Fullscreen | VertexInput::Billboards => Vec::new(),
                    };
                    let depth_stencil = match depth {
                        DepthMode::None => None,
                        DepthMode::ReadWrite => Some(depth_state(true, wgpu::CompareFunction::Less)),
                        DepthMode::ReadOnly => Some(depth_state(false, wgpu::CompareFunction::LessEqual)),
                    };
                    let [culled, unculled] = [Some(wgpu::Face::Back), None].map(|cull_mode| {
                        mk_render_pipeline(
                            &self.device,
                            desc.label,
                            &layout,
                            &module,
                            &targets,
                            depth_stencil.clone(),
                            &vertex_layouts,
                            cull_mode,
                        )
                    });
                    Pipelines::Raster { culled, unculled }
                }
                ProgramKind::Compute { .. } => {
                    Pipelines::Compute(self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(desc.label),
                        layout: Some(&layout),
                        module: &module,
                        entry_point: Some("main"),
                        compilation_options: Default::default(),
                        cache: None,
                    }))
                }
            })
        } else {
            None
        };
        let validation = futures::executor::block_on(scope.pop());

        for message in &compile_errors {
            log::error!("{}: {}", desc.label, message);
        }
        if let Some(error) = validation {
            log::error!("{}: {}", desc.label, error);
            return None;
        }
        Some(GpuProgram {
            label: desc.label,
            pipelines: pipelines?,
            resource_layout,
            bindings: desc.bindings,
        })
    }

    /// Bind group of the resources currently bound for `program`.
    fn resource_bind_group(&mut self, program: ProgramId) -> Option<wgpu::BindGroup> {
        let backend = &mut self.backend;
        let Some(Some(gpu_program)) = backend.programs.get(program.0 as usize) else {
            return None;
        };
        let mut key = BindKey {
            program,
            resources: Vec::with_capacity(gpu_program.bindings.len()),
        };
        for (slot, binding) in gpu_program.bindings.iter().enumerate() {
            let slot = slot as u32;
            let resource = match *binding {
                Binding::Texture(_) | Binding::UnfilterableTexture => {
                    let expected = match *binding {
                        Binding::Texture(kind) => kind,
                        _ => TextureKind::D2,
                    };
                    let bound = backend.state.textures.get(&slot).and_then(|id| {
                        backend
                            .texture(*id)
                            .filter(|t| t.desc.kind == expected && !t.is_depth())
                            .map(|t| (*id, t.base_level))
                    });
                    let Some((id, base_level)) = bound else {
                        log::warn!("{}: no usable texture bound to slot {}", gpu_program.label, slot);
                        return None;
                    };
                    BoundResource::Texture(id, base_level)
                }
                Binding::StorageBuffer => {
                    let bound = backend
                        .state
                        .buffers
                        .get(&slot)
                        .and_then(|id| backend.buffers.get(id.0 as usize).map(|b| (*id, b.generation)));
                    let Some((id, generation)) = bound else {
                        log::warn!("{}: no buffer bound to slot {}", gpu_program.label, slot);
                        return None;
                    };
                    BoundResource::Buffer(id, generation)
                }
                Binding::ReadImage | Binding::WriteImage(_) => {
                    let bound = backend.state.images.get(&slot).copied().filter(|(id, level, layer, _)| {
                        backend
                            .texture(*id)
                            .is_some_and(|t| *level < t.desc.mip_levels.max(1) && *layer < t.desc.kind.layers())
                    });
                    let Some((id, level, layer, access)) = bound else {
                        log::warn!("{}: no valid image bound to slot {}", gpu_program.label, slot);
                        return None;
                    };
                    BoundResource::Image(id, level, layer, access)
                }
                Binding::Sampler => BoundResource::Sampler,
            };
            key.resources.push(resource);
        }

        if let Some(group) = backend.bind_groups.get(&key) {
            return Some(group.clone());
        }

        let views = key
            .resources
            .iter()
            .map(|resource| match *resource {
                BoundResource::Texture(id, _) => backend.texture(id).map(|t| t.sampled_view()),
                BoundResource::Image(id, level, layer, access) => {
                    let usage = match access {
                        Access::Read => wgpu::TextureUsages::TEXTURE_BINDING,
                        Access::Write => wgpu::TextureUsages::STORAGE_BINDING,
                    };
                    backend.texture(id).map(|t| t.level_view(level, layer, usage))
                }
                BoundResource::Buffer(..) | BoundResource::Sampler => None,
            })
            .collect::<Vec<_>>();
        let entries = key
            .resources
            .iter()
            .zip(&views)
            .enumerate()
            .map(|(slot, (resource, view))| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: match (resource, view) {
                    (_, Some(view)) => wgpu::BindingResource::TextureView(view),
                    (BoundResource::Buffer(id, _), None) => backend.buffers[id.0 as usize].buffer.as_entire_binding(),
                    _ => wgpu::BindingResource::Sampler(&backend.sampler),
                },
            })
            .collect::<Vec<_>>();
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(gpu_program.label),
            layout: &gpu_program.resource_layout,
            entries: &entries,
        });

        if backend.bind_groups.len() >= MAX_CACHED_BIND_GROUPS {
            backend.bind_groups.clear();
        }
        backend.bind_groups.insert(key, group.clone());
        Some(group)
    }

    fn output_view(&self) -> Option<wgpu::TextureView> {
        let texture = match (&self.backend.frame, &self.headless) {
            (Some(frame), _) => &frame.texture,
            (None, Some(texture)) => texture,
            (None, None) => {
                log::warn!("No frame acquired to render into");
                return None;
            }
        };
        Some(texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    fn open_render_pass(&mut self, desc: &PassDesc, face: u32) -> Option<wgpu::RenderPass<'static>> {
        let mut views = Vec::with_capacity(desc.colors.len());
        for attachment in &desc.colors {
            views.push(match *attachment {
                Attachment::Output => self.output_view()?,
                Attachment::Texture { texture, level, layer } => self.texture(texture)?.level_view(
                    level,
                    layer.unwrap_or(face),
                    wgpu::TextureUsages::RENDER_ATTACHMENT,
                ),
            });
        }
        let depth_view = match desc.depth {
            Some(depth) => Some(self.texture(depth)?.level_view(0, face, wgpu::TextureUsages::RENDER_ATTACHMENT)),
            None => None,
        };

        let load = match desc.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments = views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect::<Vec<_>>();

        let device = &self.device;
        let encoder = self.backend.encoder.get_or_insert_with(|| new_encoder(device));
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(desc.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if desc.clear.is_some() {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
            multiview_mask: None,
        });
        Some(pass.forget_lifetime())
    }

    /// Ends whatever pass is open; layered passes are replayed here.
    fn close_pass(&mut self) {
        if let Pass::Layered { desc, draws } = mem::replace(&mut self.backend.pass, Pass::None) {
            for face in 0..TextureKind::Cube.layers() {
                let Some(mut pass) = self.open_render_pass(&desc, face) else {
                    return;
                };
                for draw in &draws {
                    execute(&mut pass, draw, &self.backend.geometries, face);
                }
            }
        }
    }

    /// Leaves an open compute pass; refuses inside a render pass.
    fn outside_render_pass(&mut self, what: &str) -> bool {
        match self.backend.pass {
            Pass::Render(_) | Pass::Layered { .. } => {
                log::warn!("{} inside a render pass is ignored", what);
                false
            }
            Pass::Compute(_) => {
                self.close_pass();
                true
            }
            Pass::None => true,
        }
    }

    fn record_draw(&mut self, call: DrawCall, uniforms: Option<&DrawUniforms>) {
        if matches!(self.backend.pass, Pass::None | Pass::Compute(_)) {
            log::warn!("Draw outside a render pass is ignored");
            return;
        }
        let Some(program) = self.backend.state.program else {
            log::warn!("Draw without a program is ignored");
            return;
        };
        let pipeline = match self.backend.programs.get(program.0 as usize) {
            Some(Some(GpuProgram {
                pipelines: Pipelines::Raster { culled, unculled },
                ..
            })) => {
                if self.backend.state.cull {
                    culled.clone()
                } else {
                    unculled.clone()
                }
            }
            Some(Some(gpu_program)) => {
                log::warn!("{} cannot draw, it is a compute program", gpu_program.label);
                return;
            }
            // Invalid programs draw nothing.
            _ => return,
        };
        let Some(resources) = self.resource_bind_group(program) else {
            return;
        };
        let draw_offset = match uniforms {
            Some(uniforms) => self
                .backend
                .draw_ring
                .push(&self.device, &self.queue, bytemuck::bytes_of(uniforms)),
            None => 0,
        };
        let draw = RecordedDraw {
            pipeline,
            pass_group: self.backend.pass_ring.bind_group.clone(),
            pass_offset: self.backend.state.pass_offset,
            draw_group: self.backend.draw_ring.bind_group.clone(),
            draw_offset,
            resources,
            call,
        };
        match &mut self.backend.pass {
            Pass::Render(pass) => execute(pass, &draw, &self.backend.geometries, 0),
            Pass::Layered { draws, .. } => draws.push(draw),
            Pass::None | Pass::Compute(_) => {}
        }
    }
}

impl Gpu for Context {
    fn create_program(&mut self, desc: &ProgramDesc) -> ProgramId {
        let program = self.build_program(desc);
        let id = ProgramId(self.backend.programs.len() as u32);
        self.backend.programs.push(program);
        id
    }

    fn is_program_valid(&self, program: ProgramId) -> bool {
        matches!(self.backend.programs.get(program.0 as usize), Some(Some(_)))
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let texture = Some(GpuTexture::new(&self.device, desc));
        match self.backend.free_textures.pop() {
            Some(index) => {
                self.backend.textures[index as usize] = texture;
                TextureId(index)
            }
            None => {
                self.backend.textures.push(texture);
                TextureId(self.backend.textures.len() as u32 - 1)
            }
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        let backend = &mut self.backend;
        // Dropped, not destroyed: recorded commands may still reference it.
        if backend.textures.get_mut(texture.0 as usize).and_then(Option::take).is_none() {
            log::warn!("Unknown texture {:?}", texture);
            return;
        }
        backend.free_textures.push(texture.0);
        backend.state.textures.retain(|_, bound| *bound != texture);
        backend.state.images.retain(|_, (bound, ..)| *bound != texture);
        backend.bind_groups.retain(|key, _| {
            !key.resources.iter().any(|resource| match *resource {
                BoundResource::Texture(id, _) | BoundResource::Image(id, ..) => id == texture,
                BoundResource::Buffer(..) | BoundResource::Sampler => false,
            })
        });
    }

    fn write_texture_layer(&mut self, texture: TextureId, layer: u32, rgba: &[u8]) {
        let Some(target) = self.texture(texture) else {
            return;
        };
        let (width, height) = (target.desc.width.max(1), target.desc.height.max(1));
        if layer >= target.desc.kind.layers() || rgba.len() != (width * height * 4) as usize {
            log::warn!(
                "Texture {} layer {}: expected {} bytes, got {}",
                target.desc.label,
                layer,
                width * height * 4,
                rgba.len()
            );
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_buffer(&mut self, label: &'static str) -> BufferId {
        let id = BufferId(self.backend.buffers.len() as u32);
        self.backend.buffers.push(GpuBuffer {
            buffer: self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: MIN_BUFFER_SIZE,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size: 0,
            generation: 0,
            label,
        });
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        let Some(entry) = self.backend.buffers.get_mut(buffer.0 as usize) else {
            log::warn!("Unknown buffer {:?}", buffer);
            return;
        };
        let aligned = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if aligned > entry.buffer.size() {
            entry.buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(entry.label),
                size: aligned.next_power_of_two(),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            entry.generation += 1;
        }
        entry.size = data.len() as u64;
        if data.is_empty() {
            return;
        }
        if data.len() as u64 == aligned {
            self.queue.write_buffer(&entry.buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(aligned as usize, 0);
            self.queue.write_buffer(&entry.buffer, 0, &padded);
        }
    }

    fn buffer_size(&self, buffer: BufferId) -> u64 {
        self.backend.buffers.get(buffer.0 as usize).map_or(0, |b| b.size)
    }

    fn upload_geometry(&mut self, label: &str, vertices: &[MeshVertex], indices: &[u32]) -> GeometryId {
        let index_count = if vertices.is_empty() { 0 } else { indices.len() as u32 };
        let geometry = Geometry {
            vertices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Vertex Buffer")),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            indices: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Index Buffer")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count,
        };
        let id = GeometryId(self.backend.geometries.len() as u32);
        self.backend.geometries.push(geometry);
        id
    }

    fn create_query(&mut self, label: &'static str) -> QueryId {
        let id = QueryId(self.backend.query_count);
        self.backend.query_count += 1;
        if id.0 >= MAX_QUERIES && self.backend.timestamps.is_some() {
            log::warn!("Query {} exceeds the {} timer slots and stays empty", label, MAX_QUERIES);
        }
        id
    }

    fn acquire_frame(&mut self) -> bool {
        if self.backend.frame.is_none() {
            if let Some(surface) = &self.surface {
                match surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(frame)
                    | wgpu::CurrentSurfaceTexture::Suboptimal(frame) => self.backend.frame = Some(frame),
                    wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                        surface.configure(&self.device, &self.config);
                        return false;
                    }
                    e => {
                        log::error!("Cannot acquire frame: {e:?}");
                        return false;
                    }
                }
            } else if self.headless.is_none() {
                return false;
            }
        }
        let device = &self.device;
        self.backend.encoder.get_or_insert_with(|| new_encoder(device));
        true
    }

    fn submit(&mut self) {
        self.close_pass();
        let mut encoder = self.backend.encoder.take().unwrap_or_else(|| new_encoder(&self.device));
        if let Some(timestamps) = &mut self.backend.timestamps {
            timestamps.resolve(&mut encoder);
        }
        self.backend.pass_ring.flush(&self.queue);
        self.backend.draw_ring.flush(&self.queue);
        self.queue.submit(iter::once(encoder.finish()));
    }

    fn present(&mut self) {
        self.submit();
        if let Some(frame) = self.backend.frame.take() {
            if let Some(window) = &self.window {
                window.pre_present_notify();
            }
            frame.present();
        }
    }

    fn output_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn begin_pass(&mut self, desc: &PassDesc) {
        if matches!(self.backend.pass, Pass::Render(_) | Pass::Layered { .. }) {
            log::warn!("Pass {} begins before the previous one ended", desc.label);
        }
        self.close_pass();
        let layered = desc.colors.iter().any(|attachment| match *attachment {
            Attachment::Texture {
                texture, layer: None, ..
            } => self
                .backend
                .texture(texture)
                .is_some_and(|t| t.desc.kind == TextureKind::Cube),
            _ => false,
        });
        if layered {
            self.backend.pass = Pass::Layered {
                desc: desc.clone(),
                draws: Vec::new(),
            };
        } else if let Some(pass) = self.open_render_pass(desc, 0) {
            self.backend.pass = Pass::Render(pass);
        }
    }

    fn end_pass(&mut self) {
        if matches!(self.backend.pass, Pass::None) {
            log::warn!("end_pass without an open pass");
        }
        self.close_pass();
    }

    fn use_program(&mut self, program: ProgramId) {
        self.backend.state.program = Some(program);
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.backend.state.pass_offset = self.backend.pass_ring.push(&self.device, &self.queue, data);
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.backend.state.textures.insert(slot, texture);
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.backend.state.buffers.insert(slot, buffer);
    }

    fn set_cull_face(&mut self, enabled: bool) {
        self.backend.state.cull = enabled;
    }

    fn draw_mesh(&mut self, geometry: GeometryId, uniforms: &DrawUniforms) {
        self.record_draw(DrawCall::Mesh(geometry), Some(uniforms));
    }

    fn draw_fullscreen(&mut self) {
        self.record_draw(DrawCall::Vertices(3), None);
    }

    fn draw_points(&mut self, count: u32) {
        if count > 0 {
            self.record_draw(DrawCall::Vertices(count * 6), None);
        }
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        if !self.outside_render_pass("generate_mipmaps") {
            return;
        }
        let Some(target) = self.texture(texture) else {
            return;
        };
        let (format, levels, layers, base) = (
            target.desc.format,
            target.desc.mip_levels.max(1),
            target.desc.kind.layers(),
            target.base_level,
        );
        if base + 1 >= levels {
            return;
        }

        let backend = &mut self.backend;
        let pipeline = backend.mipmaps.pipeline(&self.device, format);
        let device = &self.device;
        let encoder = backend.encoder.get_or_insert_with(|| new_encoder(device));
        let Some(target) = backend.textures.get(texture.0 as usize).and_then(Option::as_ref) else {
            return;
        };
        for layer in 0..layers {
            for level in base + 1..levels {
                let source = target.level_view(level - 1, layer, wgpu::TextureUsages::TEXTURE_BINDING);
                let destination = target.level_view(level, layer, wgpu::TextureUsages::RENDER_ATTACHMENT);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("mipmap"),
                    layout: &backend.mipmaps.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&backend.sampler),
                        },
                    ],
                });
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("mipmap"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &destination,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
    }

    fn set_base_level(&mut self, texture: TextureId, level: u32) {
        match self.backend.textures.get_mut(texture.0 as usize).and_then(Option::as_mut) {
            Some(target) => target.base_level = level.min(target.desc.mip_levels.max(1) - 1),
            None => log::warn!("Unknown texture {:?}", texture),
        }
    }

    fn bind_image(&mut self, slot: u32, texture: TextureId, level: u32, layer: u32, access: Access) {
        self.backend.state.images.insert(slot, (texture, level, layer, access));
    }

    fn dispatch(&mut self, program: ProgramId, groups: [u32; 3]) {
        if !self.outside_render_pass("dispatch") {
            return;
        }
        let pipeline = match self.backend.programs.get(program.0 as usize) {
            Some(Some(GpuProgram {
                pipelines: Pipelines::Compute(pipeline),
                ..
            })) => pipeline.clone(),
            Some(Some(gpu_program)) => {
                log::warn!("{} cannot be dispatched, it is a raster program", gpu_program.label);
                return;
            }
            _ => return,
        };
        let Some(resources) = self.resource_bind_group(program) else {
            return;
        };
        if !matches!(self.backend.pass, Pass::Compute(_)) {
            let device = &self.device;
            let encoder = self.backend.encoder.get_or_insert_with(|| new_encoder(device));
            let pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("compute"),
                timestamp_writes: None,
            });
            self.backend.pass = Pass::Compute(pass.forget_lifetime());
        }
        if let Pass::Compute(pass) = &mut self.backend.pass {
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &self.backend.pass_ring.bind_group, &[self.backend.state.pass_offset]);
            pass.set_bind_group(1, &self.backend.draw_ring.bind_group, &[0]);
            pass.set_bind_group(2, &resources, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
    }

    fn memory_barrier(&mut self) {
        // Passes are synchronised against each other, so ending the compute pass suffices.
        if matches!(self.backend.pass, Pass::Compute(_)) {
            self.close_pass();
        }
    }

    fn begin_query(&mut self, query: QueryId) {
        if query.0 >= MAX_QUERIES || self.backend.timestamps.is_none() {
            return;
        }
        if !self.outside_render_pass("begin_query") {
            return;
        }
        let device = &self.device;
        let encoder = self.backend.encoder.get_or_insert_with(|| new_encoder(device));
        if let Some(timestamps) = &self.backend.timestamps {
            encoder.write_timestamp(&timestamps.set, 2 * query.0);
        }
    }

    fn end_query(&mut self, query: QueryId) {
        if query.0 >= MAX_QUERIES || self.backend.timestamps.is_none() {
            return;
        }
        if !self.outside_render_pass("end_query") {
            return;
        }
        let device = &self.device;
        let encoder = self.backend.encoder.get_or_insert_with(|| new_encoder(device));
        if let Some(timestamps) = &mut self.backend.timestamps {
            encoder.write_timestamp(&timestamps.set, 2 * query.0 + 1);
            timestamps.written[query.0 as usize] = true;
        }
    }

    fn query_elapsed(&mut self, query: QueryId) -> Option<Duration> {
        let timestamps = self.backend.timestamps.as_mut()?;
        if timestamps.pending {
            timestamps.read(&self.device);
        }
        timestamps.results.get(query.0 as usize).copied().flatten()
    }
}
