use std::path::Path;

use async_trait::async_trait;

use crate::types::{
    DebugConfiguration, SessionInfo, SourceBreakpoint, StackFrame, StepType, ThreadInfo,
};
use crate::Result;

/// Capability surface of the host debugger.
///
/// Implementations own breakpoint storage, the session lifecycle and the request
/// primitives of the running debug adapter. Optional capabilities report
/// [`DebugError::Unsupported`](crate::DebugError::Unsupported) rather than panicking; the
/// operations in [`crate::ops`] decide how each gap is surfaced.
#[async_trait]
pub trait DebugAdapter: Send + Sync {
    /// All known breakpoints, with absolute paths.
    async fn breakpoints(&self) -> Result<Vec<SourceBreakpoint>>;

    /// Store a breakpoint, replacing one already set at the same location.
    async fn add_breakpoint(&self, breakpoint: SourceBreakpoint) -> Result<SourceBreakpoint>;

    /// Returns `false` when no breakpoint existed at `path:line`.
    async fn remove_breakpoint(&self, path: &Path, line: u32) -> Result<bool>;

    async fn configurations(&self) -> Result<Vec<DebugConfiguration>>;

    async fn active_session(&self) -> Option<SessionInfo>;

    async fn start_session(&self, configuration: &DebugConfiguration) -> Result<SessionInfo>;

    async fn stop_session(&self) -> Result<()>;

    async fn threads(&self) -> Result<Vec<ThreadInfo>>;

    /// Fails while the thread is running.
    async fn stack_trace(&self, thread_id: i64) -> Result<Vec<StackFrame>>;

    async fn evaluate(&self, expression: &str, frame_id: Option<i64>) -> Result<String>;

    async fn step(&self, thread_id: i64, step: StepType) -> Result<()>;
}
