use std::sync::Arc;

use crate::types::{BreakpointDescriptor, SessionInfo, SourceBreakpoint};
use crate::{BridgeConfig, DebugAdapter, DebugError, Result, WorkspacePaths};

/// Entry point for the debug operations in [`crate::ops`]: an adapter plus the workspace
/// context needed to present its data.
#[derive(Clone)]
pub struct DebugBridge {
    adapter: Arc<dyn DebugAdapter>,
    paths: WorkspacePaths,
    config: BridgeConfig,
}

impl DebugBridge {
    pub fn new(adapter: Arc<dyn DebugAdapter>, config: BridgeConfig) -> Self {
        Self {
            adapter,
            paths: WorkspacePaths::new(config.workspace_roots.clone()),
            config,
        }
    }

    pub fn adapter(&self) -> &dyn DebugAdapter {
        self.adapter.as_ref()
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn require_session(&self) -> Result<SessionInfo> {
        self.adapter
            .active_session()
            .await
            .ok_or(DebugError::NoActiveSession)
    }

    pub fn describe(&self, breakpoint: &SourceBreakpoint) -> BreakpointDescriptor {
        BreakpointDescriptor {
            path: self.paths.relativize(&breakpoint.path),
            line: breakpoint.line,
            enabled: breakpoint.enabled,
            condition: breakpoint.condition.clone(),
        }
    }
}

impl std::fmt::Debug for DebugBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugBridge")
            .field("paths", &self.paths)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
