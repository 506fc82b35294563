//! Lazily compiled, shared GPU programs.
//!
//! Every light of a kind shares one depth program and every blur shares one
//! horizontal and one vertical compute program. A [`ProgramRegistry`] compiles a
//! program the first time it is requested and hands out the same [`ProgramId`]
//! afterwards. A program that failed to compile is retried on the next request.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::gpu::{Binding, Gpu, ProgramDesc, ProgramId, ProgramKind, ShaderFile};
use crate::lights::LightKind;
use crate::resources;

/// Identity of a shared program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKey {
    Depth(LightKind),
    BlurHorizontal,
    BlurVertical,
    GBuffer,
    LightAmbient,
    LightShadow,
    LightOmni,
    LightDraw,
    Ssao,
    BloomExtract,
    Volumetric,
    Composite,
    Overlay,
}

/// Static description of a program: fixed shader files plus pipeline shape.
#[derive(Clone, Copy, Debug)]
pub struct ProgramTemplate {
    pub key: ProgramKey,
    pub label: &'static str,
    pub files: &'static [ShaderFile],
    pub kind: ProgramKind,
    pub bindings: &'static [Binding],
}

#[derive(Debug)]
pub struct ProgramRegistry {
    shader_root: PathBuf,
    programs: HashMap<ProgramKey, ProgramId>,
    compiles: HashMap<ProgramKey, u32>,
}

impl ProgramRegistry {
    pub fn new(shader_root: impl Into<PathBuf>) -> Self {
        Self {
            shader_root: shader_root.into(),
            programs: HashMap::new(),
            compiles: HashMap::new(),
        }
    }

    pub fn shader_root(&self) -> &std::path::Path {
        &self.shader_root
    }

    pub fn get(&self, key: ProgramKey) -> Option<ProgramId> {
        self.programs.get(&key).copied()
    }

    /// Returns the shared program for `template.key`, compiling it when it does
    /// not exist yet or the previous attempt produced an invalid program.
    ///
    /// Compilation failures are logged; the returned id then refers to an
    /// invalid program and [`Gpu::is_program_valid`] reports `false` for it.
    pub fn get_or_init(&mut self, gpu: &mut dyn Gpu, template: &ProgramTemplate) -> ProgramId {
        if let Some(&id) = self.programs.get(&template.key) {
            if gpu.is_program_valid(id) {
                return id;
            }
        }

        let sources = template
            .files
            .iter()
            .map(|file| {
                resources::load_shader(&self.shader_root, file.path).map(|source| (*file, source))
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap_or_else(|e| {
                log::error!("Cannot load sources of program {}: {:#}", template.label, e);
                Vec::new()
            });

        let id = gpu.create_program(&ProgramDesc {
            key: template.key,
            label: template.label,
            sources,
            kind: template.kind,
            bindings: template.bindings,
        });
        *self.compiles.entry(template.key).or_insert(0) += 1;
        if gpu.is_program_valid(id) {
            log::debug!("Compiled program {}", template.label);
        } else {
            log::error!("Program {} is invalid", template.label);
        }
        self.programs.insert(template.key, id);
        id
    }

    /// How often the program for `key` has been compiled.
    pub fn compile_count(&self, key: ProgramKey) -> u32 {
        self.compiles.get(&key).copied().unwrap_or(0)
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new(resources::default_shader_root())
    }
}
