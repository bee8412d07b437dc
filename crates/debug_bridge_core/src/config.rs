use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Roots that breakpoint and frame paths are reported relative to. Relative input
    /// paths resolve against the first one.
    pub workspace_roots: Vec<PathBuf>,
    /// Upper bound for a single facade call. `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workspace_roots: vec![default_workspace_root()],
            call_timeout: None,
        }
    }
}

impl BridgeConfig {
    pub fn new(workspace_roots: Vec<PathBuf>, call_timeout: Option<Duration>) -> Self {
        Self {
            workspace_roots,
            call_timeout,
        }
    }

    pub fn from_env() -> Self {
        let workspace_roots = std::env::var_os("DEBUG_MCP_WORKSPACE")
            .map(|v| std::env::split_paths(&v).collect::<Vec<_>>())
            .filter(|roots| !roots.is_empty())
            .unwrap_or_else(|| vec![default_workspace_root()]);

        let call_timeout = std::env::var("DEBUG_MCP_CALL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            workspace_roots,
            call_timeout,
        }
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
