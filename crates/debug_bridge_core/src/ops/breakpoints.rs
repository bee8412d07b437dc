use crate::types::{BreakpointDescriptor, RemovedBreakpoint, SourceBreakpoint};
use crate::{DebugBridge, DebugError, Result};

pub async fn set_breakpoint(
    bridge: &DebugBridge,
    path: &str,
    line: u32,
    condition: Option<String>,
) -> Result<BreakpointDescriptor> {
    if line == 0 {
        return Err(DebugError::InvalidLine(line));
    }

    let condition = condition.filter(|c| !c.trim().is_empty());
    let breakpoint = SourceBreakpoint::new(bridge.paths().resolve(path), line)
        .with_condition(condition);

    tracing::debug!("Setting breakpoint at {}:{}", breakpoint.path.display(), line);
    let stored = bridge.adapter().add_breakpoint(breakpoint).await?;

    Ok(bridge.describe(&stored))
}

pub async fn remove_breakpoint(
    bridge: &DebugBridge,
    path: &str,
    line: u32,
) -> Result<RemovedBreakpoint> {
    let resolved = bridge.paths().resolve(path);
    let display_path = bridge.paths().relativize(&resolved);

    if !bridge.adapter().remove_breakpoint(&resolved, line).await? {
        return Err(DebugError::BreakpointNotFound {
            path: display_path,
            line,
        });
    }

    Ok(RemovedBreakpoint {
        removed: true,
        path: display_path,
        line,
    })
}
