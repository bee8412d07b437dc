//! In-memory [`DebugAdapter`] used by tests across the workspace. Every trait call is
//! counted so callers can assert that an operation never reached the adapter.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{
    DebugConfiguration, SessionInfo, SourceBreakpoint, StackFrame, StepType, ThreadInfo,
};
use crate::{DebugAdapter, DebugError, Result};

#[derive(Debug, Clone)]
pub enum ThreadListing {
    Threads(Vec<ThreadInfo>),
    Unsupported,
}

#[derive(Debug)]
struct StubState {
    breakpoints: Vec<SourceBreakpoint>,
    configurations: Vec<DebugConfiguration>,
    session: Option<SessionInfo>,
    threads: ThreadListing,
    frames: Option<Vec<StackFrame>>,
    evaluations: HashMap<String, String>,
    steps: Vec<(i64, StepType)>,
    evaluated: Vec<(String, Option<i64>)>,
    sessions_started: usize,
    breakpoints_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct StubAdapter {
    state: Mutex<StubState>,
    calls: AtomicUsize,
    call_log: Mutex<Vec<&'static str>>,
}

impl Default for StubAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StubAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                breakpoints: Vec::new(),
                configurations: Vec::new(),
                session: None,
                threads: ThreadListing::Threads(Vec::new()),
                frames: None,
                evaluations: HashMap::new(),
                steps: Vec::new(),
                evaluated: Vec::new(),
                sessions_started: 0,
                breakpoints_delay: None,
            }),
            calls: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_session(self, name: &str) -> Self {
        self.state().session = Some(SessionInfo {
            id: "session-1".to_string(),
            name: name.to_string(),
            kind: "stub".to_string(),
            focused_thread_id: None,
        });
        self
    }

    pub fn with_focused_thread(self, thread_id: i64) -> Self {
        if let Some(session) = self.state().session.as_mut() {
            session.focused_thread_id = Some(thread_id);
        }
        self
    }

    pub fn with_threads(self, threads: Vec<ThreadInfo>) -> Self {
        self.state().threads = ThreadListing::Threads(threads);
        self
    }

    pub fn with_unsupported_threads(self) -> Self {
        self.state().threads = ThreadListing::Unsupported;
        self
    }

    /// Makes stack traces succeed for every thread.
    pub fn paused_at(self, frames: Vec<StackFrame>) -> Self {
        self.state().frames = Some(frames);
        self
    }

    pub fn with_configuration(self, name: &str) -> Self {
        self.state()
            .configurations
            .push(DebugConfiguration::new(name, "stub", "launch"));
        self
    }

    pub fn with_evaluation(self, expression: &str, result: &str) -> Self {
        self.state()
            .evaluations
            .insert(expression.to_string(), result.to_string());
        self
    }

    /// Makes every `breakpoints` call take `delay`, simulating a slow host.
    pub fn with_breakpoints_delay(self, delay: Duration) -> Self {
        self.state().breakpoints_delay = Some(delay);
        self
    }

    pub fn with_breakpoint(self, breakpoint: SourceBreakpoint) -> Self {
        self.state().breakpoints.push(breakpoint);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn steps(&self) -> Vec<(i64, StepType)> {
        self.state().steps.clone()
    }

    pub fn evaluated(&self) -> Vec<(String, Option<i64>)> {
        self.state().evaluated.clone()
    }

    pub fn sessions_started(&self) -> usize {
        self.state().sessions_started
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, name: &'static str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name);
    }
}

#[async_trait]
impl DebugAdapter for StubAdapter {
    async fn breakpoints(&self) -> Result<Vec<SourceBreakpoint>> {
        self.record("breakpoints");
        let delay = self.state().breakpoints_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().breakpoints.clone())
    }

    async fn add_breakpoint(&self, breakpoint: SourceBreakpoint) -> Result<SourceBreakpoint> {
        self.record("add_breakpoint");
        let mut state = self.state();
        state
            .breakpoints
            .retain(|bp| !bp.is_at(&breakpoint.path, breakpoint.line));
        state.breakpoints.push(breakpoint.clone());
        Ok(breakpoint)
    }

    async fn remove_breakpoint(&self, path: &Path, line: u32) -> Result<bool> {
        self.record("remove_breakpoint");
        let mut state = self.state();
        let before = state.breakpoints.len();
        state.breakpoints.retain(|bp| !bp.is_at(path, line));
        Ok(state.breakpoints.len() != before)
    }

    async fn configurations(&self) -> Result<Vec<DebugConfiguration>> {
        self.record("configurations");
        Ok(self.state().configurations.clone())
    }

    async fn active_session(&self) -> Option<SessionInfo> {
        self.record("active_session");
        self.state().session.clone()
    }

    async fn start_session(&self, configuration: &DebugConfiguration) -> Result<SessionInfo> {
        self.record("start_session");
        let mut state = self.state();
        state.sessions_started += 1;
        let session = SessionInfo {
            id: format!("session-{}", state.sessions_started),
            name: configuration.name.clone(),
            kind: configuration.kind.clone(),
            focused_thread_id: None,
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn stop_session(&self) -> Result<()> {
        self.record("stop_session");
        self.state().session = None;
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadInfo>> {
        self.record("threads");
        match &self.state().threads {
            ThreadListing::Threads(threads) => Ok(threads.clone()),
            ThreadListing::Unsupported => Err(DebugError::unsupported("threads")),
        }
    }

    async fn stack_trace(&self, thread_id: i64) -> Result<Vec<StackFrame>> {
        self.record("stack_trace");
        self.state()
            .frames
            .clone()
            .ok_or_else(|| DebugError::adapter(format!("Thread {thread_id} is not paused")))
    }

    async fn evaluate(&self, expression: &str, frame_id: Option<i64>) -> Result<String> {
        self.record("evaluate");
        let mut state = self.state();
        state.evaluated.push((expression.to_string(), frame_id));
        state
            .evaluations
            .get(expression)
            .cloned()
            .ok_or_else(|| DebugError::adapter(format!("Cannot evaluate '{expression}'")))
    }

    async fn step(&self, thread_id: i64, step: StepType) -> Result<()> {
        self.record("step");
        self.state().steps.push((thread_id, step));
        Ok(())
    }
}
