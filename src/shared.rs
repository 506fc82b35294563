//! Engine-wide state shared by all lights and passes.

use crate::blur::Blur;
use crate::gpu::ProgramRegistry;

/// Shared programs and the blur's scratch images.
///
/// Owned by the [`crate::pipelines::DeferredRenderer`] and lent to lights and
/// the scene whenever they need a program or a blur.
#[derive(Debug, Default)]
pub struct Shared {
    pub programs: ProgramRegistry,
    pub blur: Blur,
}

impl Shared {
    pub fn new(programs: ProgramRegistry) -> Self {
        Self {
            programs,
            blur: Blur::default(),
        }
    }
}
