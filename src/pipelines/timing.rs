//! GPU timing of the frame stages.
//!
//! Every stage is wrapped in one timer query. [`StageTimings::timed`] is the
//! only way to open a query and closes it before returning, so the query of a
//! stage can never overlap the next one.

use std::collections::VecDeque;

use crate::gpu::{Gpu, QueryId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Update,
    GBuffer,
    LightPass,
    PostProcess,
    Gui,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Update,
        Stage::GBuffer,
        Stage::LightPass,
        Stage::PostProcess,
        Stage::Gui,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Update => "update",
            Stage::GBuffer => "g-buffer",
            Stage::LightPass => "light pass",
            Stage::PostProcess => "post process",
            Stage::Gui => "gui",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A bounded series of samples in milliseconds, oldest first.
#[derive(Clone, Debug)]
pub struct TimingHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl TimingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, ms: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    pub fn last(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn average(&self) -> Option<f32> {
        (!self.samples.is_empty())
            .then(|| self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    pub fn max(&self) -> Option<f32> {
        self.samples.iter().copied().reduce(f32::max)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

/// Collected GPU stage times plus the CPU frame time.
#[derive(Clone, Debug)]
pub struct StageHistory {
    stages: Vec<TimingHistory>,
    pub frame: TimingHistory,
}

impl StageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            stages: Stage::ALL.iter().map(|_| TimingHistory::new(capacity)).collect(),
            frame: TimingHistory::new(capacity),
        }
    }

    pub fn stage(&self, stage: Stage) -> &TimingHistory {
        &self.stages[stage.index()]
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut TimingHistory {
        &mut self.stages[stage.index()]
    }
}

#[derive(Debug, Default)]
pub struct StageTimings {
    queries: Vec<QueryId>,
    recorded: [bool; Stage::ALL.len()],
}

impl StageTimings {
    pub fn new(gpu: &mut dyn Gpu) -> Self {
        Self {
            queries: Stage::ALL
                .iter()
                .map(|stage| gpu.create_query(stage.label()))
                .collect(),
            recorded: [false; Stage::ALL.len()],
        }
    }

    pub fn query(&self, stage: Stage) -> Option<QueryId> {
        self.queries.get(stage.index()).copied()
    }

    /// Runs `f` between the begin and end of `stage`'s query.
    pub fn timed<R>(&mut self, gpu: &mut dyn Gpu, stage: Stage, f: impl FnOnce(&mut dyn Gpu) -> R) -> R {
        let Some(query) = self.query(stage) else {
            return f(gpu);
        };
        gpu.begin_query(query);
        let result = f(&mut *gpu);
        gpu.end_query(query);
        self.recorded[stage.index()] = true;
        result
    }

    /// Reads back every stage timed since the last collection. May stall.
    pub fn collect(&mut self, gpu: &mut dyn Gpu, history: &mut StageHistory) {
        for stage in Stage::ALL {
            if !std::mem::take(&mut self.recorded[stage.index()]) {
                continue;
            }
            let Some(query) = self.query(stage) else {
                continue;
            };
            if let Some(elapsed) = gpu.query_elapsed(query) {
                history.stage_mut(stage).push(elapsed.as_secs_f32() * 1000.0);
            }
        }
    }
}
