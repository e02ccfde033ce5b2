//! Reloading strategy with scripted answers and a call log.

use async_trait::async_trait;
use configer::{ReloadingStrategy, SourceView};
use errors::{ConfigError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyCall {
    SetConfiguration,
    Init,
    NeedReloading,
    ReloadingPerformed,
}

#[derive(Debug, Default)]
struct ProbeState {
    calls: Vec<StrategyCall>,
    answers: VecDeque<bool>,
    fallback: bool,
    fail_next: bool,
    sources: Option<SourceView>,
}

/// Shared handle for scripting a [`ScriptedStrategy`] and inspecting what
/// the manager did with it.
#[derive(Debug, Clone, Default)]
pub struct StrategyProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl StrategyProbe {
    /// Queue answers for the next `need_reloading` calls.
    pub fn answer(&self, answers: &[bool]) {
        self.state.lock().answers.extend(answers.iter().copied());
    }

    /// Answer used once the queue is drained; starts as `false`.
    pub fn set_fallback(&self, due: bool) {
        self.state.lock().fallback = due;
    }

    /// Make the next `need_reloading` call fail with a strategy error.
    pub fn fail_next(&self) {
        self.state.lock().fail_next = true;
    }

    pub fn calls(&self) -> Vec<StrategyCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: StrategyCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn sources(&self) -> Option<SourceView> {
        self.state.lock().sources.clone()
    }
}

pub struct ScriptedStrategy {
    probe: StrategyProbe,
}

impl ScriptedStrategy {
    pub fn new() -> (Self, StrategyProbe) {
        let probe = StrategyProbe::default();
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

#[async_trait]
impl ReloadingStrategy for ScriptedStrategy {
    fn set_configuration(&mut self, sources: SourceView) {
        let mut state = self.probe.state.lock();
        state.calls.push(StrategyCall::SetConfiguration);
        state.sources = Some(sources);
    }

    async fn init(&mut self) -> Result<()> {
        self.probe.state.lock().calls.push(StrategyCall::Init);
        Ok(())
    }

    async fn need_reloading(&mut self) -> Result<bool> {
        let mut state = self.probe.state.lock();
        state.calls.push(StrategyCall::NeedReloading);
        if std::mem::take(&mut state.fail_next) {
            return Err(ConfigError::strategy("scripted failure"));
        }
        let due = match state.answers.pop_front() {
            Some(due) => due,
            None => state.fallback,
        };
        debug!(due, "Scripted need_reloading");
        Ok(due)
    }

    async fn reloading_performed(&mut self) -> Result<()> {
        self.probe.state.lock().calls.push(StrategyCall::ReloadingPerformed);
        Ok(())
    }
}
