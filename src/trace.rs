//! Step-by-step explanation of one pipeline run
//!
//! A [`Trace`] is passed explicitly through decoding, every analyzer and
//! fusion. Each step is also emitted as a `tracing` debug event.

use serde::Serialize;
use tracing::debug;

use crate::AnalyzerId;

/// Pipeline stage that produced a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "analyzer", rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Analyzer(AnalyzerId),
    Fusion,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    #[serde(flatten)]
    pub stage: Stage,
    pub message: String,
}

/// Ordered list of pipeline steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        match stage {
            Stage::Analyzer(id) => debug!(stage = "analyzer", analyzer = id.as_str(), "{message}"),
            other => debug!(stage = ?other, "{message}"),
        }
        self.steps.push(TraceStep { stage, message });
    }

    #[inline]
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    /// Messages recorded for one stage, in order
    pub fn messages(&self, stage: Stage) -> impl Iterator<Item = &str> + '_ {
        self.steps
            .iter()
            .filter(move |s| s.stage == stage)
            .map(|s| s.message.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
