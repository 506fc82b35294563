use std::collections::HashSet;
use std::time::Duration;

use defer_ngin::data_structures::mesh::MeshVertex;
use defer_ngin::gpu::{
    Access, BufferId, DrawUniforms, GeometryId, Gpu, PassDesc, ProgramDesc, ProgramId, ProgramKey,
    QueryId, TextureDesc, TextureId,
};

/// One recorded call on the [`RecordingGpu`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateProgram(ProgramKey),
    CreateTexture(&'static str),
    DestroyTexture(TextureId),
    WriteTextureLayer(TextureId, u32),
    CreateBuffer(&'static str),
    WriteBuffer(BufferId, usize),
    UploadGeometry(GeometryId),
    CreateQuery(QueryId),
    AcquireFrame,
    Submit,
    Present,
    BeginPass(PassDesc),
    EndPass,
    UseProgram(ProgramId),
    SetUniforms(Vec<u8>),
    BindTexture(u32, TextureId),
    BindStorageBuffer(u32, BufferId),
    SetCullFace(bool),
    DrawMesh(GeometryId),
    DrawFullscreen,
    DrawPoints(u32),
    GenerateMipmaps(TextureId),
    SetBaseLevel(TextureId, u32),
    BindImage {
        slot: u32,
        texture: TextureId,
        level: u32,
        layer: u32,
        access: Access,
    },
    Dispatch(ProgramId, [u32; 3]),
    MemoryBarrier,
    BeginQuery(QueryId),
    EndQuery(QueryId),
}

/// A [`Gpu`] that records every call instead of talking to a device.
///
/// Programs are valid unless their sources are missing or their key was
/// marked with [`RecordingGpu::fail_program`].
pub struct RecordingGpu {
    pub calls: Vec<Call>,
    pub textures: Vec<TextureDesc>,
    pub programs: Vec<(ProgramKey, bool)>,
    pub elapsed: Option<Duration>,
    pub frame_available: bool,
    pub output: (u32, u32),
    failing: HashSet<ProgramKey>,
    destroyed: HashSet<TextureId>,
    buffers: Vec<u64>,
    geometries: u32,
    queries: u32,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            textures: Vec::new(),
            programs: Vec::new(),
            elapsed: Some(Duration::from_micros(500)),
            frame_available: true,
            output: (640, 480),
            failing: HashSet::new(),
            destroyed: HashSet::new(),
            buffers: Vec::new(),
            geometries: 0,
            queries: 0,
        }
    }

    /// Every later compilation of `key` produces an invalid program.
    pub fn fail_program(&mut self, key: ProgramKey) {
        self.failing.insert(key);
    }

    pub fn heal_program(&mut self, key: ProgramKey) {
        self.failing.remove(&key);
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    pub fn compiles_of(&self, key: ProgramKey) -> usize {
        self.programs.iter().filter(|(k, _)| *k == key).count()
    }

    pub fn key_of(&self, program: ProgramId) -> Option<ProgramKey> {
        self.programs.get(program.0 as usize).map(|(key, _)| *key)
    }

    pub fn texture(&self, texture: TextureId) -> &TextureDesc {
        &self.textures[texture.0 as usize]
    }

    /// Textures created and not destroyed since. Ids are never reused.
    pub fn live_textures(&self) -> usize {
        self.textures.len() - self.destroyed.len()
    }

    pub fn is_destroyed(&self, texture: TextureId) -> bool {
        self.destroyed.contains(&texture)
    }

    /// Calls with uniform uploads and bindings filtered out.
    pub fn commands(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| {
                !matches!(
                    call,
                    Call::SetUniforms(_)
                        | Call::BindTexture(..)
                        | Call::BindStorageBuffer(..)
                        | Call::BindImage { .. }
                )
            })
            .cloned()
            .collect()
    }

    pub fn mesh(&mut self) -> GeometryId {
        let id = GeometryId(self.geometries);
        self.geometries += 1;
        id
    }
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpu for RecordingGpu {
    fn create_program(&mut self, desc: &ProgramDesc) -> ProgramId {
        let valid = !desc.sources.is_empty() && !self.failing.contains(&desc.key);
        self.programs.push((desc.key, valid));
        self.calls.push(Call::CreateProgram(desc.key));
        ProgramId(self.programs.len() as u32 - 1)
    }

    fn is_program_valid(&self, program: ProgramId) -> bool {
        self.programs
            .get(program.0 as usize)
            .is_some_and(|(_, valid)| *valid)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        self.textures.push(desc.clone());
        self.calls.push(Call::CreateTexture(desc.label));
        TextureId(self.textures.len() as u32 - 1)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        assert!(
            (texture.0 as usize) < self.textures.len() && self.destroyed.insert(texture),
            "{:?} destroyed twice or never created",
            texture
        );
        self.calls.push(Call::DestroyTexture(texture));
    }

    fn write_texture_layer(&mut self, texture: TextureId, layer: u32, _rgba: &[u8]) {
        self.calls.push(Call::WriteTextureLayer(texture, layer));
    }

    fn create_buffer(&mut self, label: &'static str) -> BufferId {
        self.buffers.push(0);
        self.calls.push(Call::CreateBuffer(label));
        BufferId(self.buffers.len() as u32 - 1)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        self.buffers[buffer.0 as usize] = data.len() as u64;
        self.calls.push(Call::WriteBuffer(buffer, data.len()));
    }

    fn buffer_size(&self, buffer: BufferId) -> u64 {
        self.buffers.get(buffer.0 as usize).copied().unwrap_or(0)
    }

    fn upload_geometry(&mut self, _label: &str, _vertices: &[MeshVertex], _indices: &[u32]) -> GeometryId {
        let id = self.mesh();
        self.calls.push(Call::UploadGeometry(id));
        id
    }

    fn create_query(&mut self, _label: &'static str) -> QueryId {
        let id = QueryId(self.queries);
        self.queries += 1;
        self.calls.push(Call::CreateQuery(id));
        id
    }

    fn acquire_frame(&mut self) -> bool {
        self.calls.push(Call::AcquireFrame);
        self.frame_available
    }

    fn submit(&mut self) {
        self.calls.push(Call::Submit);
    }

    fn present(&mut self) {
        self.calls.push(Call::Present);
    }

    fn output_size(&self) -> (u32, u32) {
        self.output
    }

    fn begin_pass(&mut self, pass: &PassDesc) {
        self.calls.push(Call::BeginPass(pass.clone()));
    }

    fn end_pass(&mut self) {
        self.calls.push(Call::EndPass);
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(Call::UseProgram(program));
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.calls.push(Call::SetUniforms(data.to_vec()));
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.calls.push(Call::BindTexture(slot, texture));
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.calls.push(Call::BindStorageBuffer(slot, buffer));
    }

    fn set_cull_face(&mut self, enabled: bool) {
        self.calls.push(Call::SetCullFace(enabled));
    }

    fn draw_mesh(&mut self, geometry: GeometryId, _uniforms: &DrawUniforms) {
        self.calls.push(Call::DrawMesh(geometry));
    }

    fn draw_fullscreen(&mut self) {
        self.calls.push(Call::DrawFullscreen);
    }

    fn draw_points(&mut self, count: u32) {
        self.calls.push(Call::DrawPoints(count));
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        self.calls.push(Call::GenerateMipmaps(texture));
    }

    fn set_base_level(&mut self, texture: TextureId, level: u32) {
        self.calls.push(Call::SetBaseLevel(texture, level));
    }

    fn bind_image(&mut self, slot: u32, texture: TextureId, level: u32, layer: u32, access: Access) {
        self.calls.push(Call::BindImage {
            slot,
            texture,
            level,
            layer,
            access,
        });
    }

    fn dispatch(&mut self, program: ProgramId, groups: [u32; 3]) {
        self.calls.push(Call::Dispatch(program, groups));
    }

    fn memory_barrier(&mut self) {
        self.calls.push(Call::MemoryBarrier);
    }

    fn begin_query(&mut self, query: QueryId) {
        self.calls.push(Call::BeginQuery(query));
    }

    fn end_query(&mut self, query: QueryId) {
        self.calls.push(Call::EndQuery(query));
    }

    fn query_elapsed(&mut self, _query: QueryId) -> Option<Duration> {
        self.elapsed
    }
}
