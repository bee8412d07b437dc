//! Builds the debug status snapshot. Adapters differ in what they can report: some
//! cannot list threads, and none can produce a stack trace while the debuggee runs.
//! Those gaps are folded into one stable shape here instead of surfacing as errors.

use crate::types::{DebugStatus, SessionInfo, StackFrame, ThreadInfo};
use crate::{DebugBridge, Result};

/// Recomputes the status from the adapter on every call.
pub async fn debug_status(bridge: &DebugBridge) -> Result<DebugStatus> {
    let breakpoints = bridge
        .adapter()
        .breakpoints()
        .await?
        .iter()
        .map(|bp| bridge.describe(bp))
        .collect();

    let Some(session) = bridge.adapter().active_session().await else {
        return Ok(DebugStatus::inactive(breakpoints));
    };

    let threads = normalized_threads(bridge).await;
    let thread_id = active_thread_id(&session, &threads);

    // A stack trace is only obtainable while paused, so its failure means "running".
    let stack_frames = match bridge.adapter().stack_trace(thread_id).await {
        Ok(frames) => Some(relativize_frames(bridge, frames)),
        Err(e) => {
            tracing::debug!("No stack trace for thread {}: {}", thread_id, e);
            None
        }
    };

    Ok(DebugStatus {
        is_active: true,
        is_paused: stack_frames.is_some(),
        active_session: Some(session),
        threads: Some(threads),
        active_thread_id: Some(thread_id),
        stack_frames,
        breakpoints,
    })
}

/// Threads reported by the adapter, or the synthetic `main` thread when listing fails
/// or comes back empty. Both cases are treated the same.
pub(crate) async fn normalized_threads(bridge: &DebugBridge) -> Vec<ThreadInfo> {
    match bridge.adapter().threads().await {
        Ok(threads) if !threads.is_empty() => threads,
        Ok(_) => vec![ThreadInfo::synthetic()],
        Err(e) => {
            tracing::debug!("Thread listing unavailable, using synthetic thread: {}", e);
            vec![ThreadInfo::synthetic()]
        }
    }
}

/// The thread that last stopped, if still listed, else the first one.
pub(crate) fn active_thread_id(session: &SessionInfo, threads: &[ThreadInfo]) -> i64 {
    session
        .focused_thread_id
        .filter(|id| threads.iter().any(|t| t.id == *id))
        .or_else(|| threads.first().map(|t| t.id))
        .unwrap_or(crate::types::SYNTHETIC_THREAD_ID)
}

fn relativize_frames(bridge: &DebugBridge, frames: Vec<StackFrame>) -> Vec<StackFrame> {
    frames
        .into_iter()
        .map(|mut frame| {
            frame.path = frame.path.map(|p| bridge.paths().relativize_str(&p));
            frame
        })
        .collect()
}
