use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StepType;

/// Thread id substituted when the adapter cannot enumerate threads.
pub const SYNTHETIC_THREAD_ID: i64 = 1;
pub const SYNTHETIC_THREAD_NAME: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointDescriptor {
    pub path: String,
    pub line: u32,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedBreakpoint {
    pub removed: bool,
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: i64,
    pub name: String,
}

impl ThreadInfo {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn synthetic() -> Self {
        Self::new(SYNTHETIC_THREAD_ID, SYNTHETIC_THREAD_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Thread that reported the most recent stop, when the host tracks it.
    #[serde(skip)]
    pub focused_thread_id: Option<i64>,
}

/// A launch configuration as discovered by the host. Fields other than name, type and
/// request are kept opaque and handed back to the adapter on start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_request")]
    pub request: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_request() -> String {
    "launch".to_string()
}

impl DebugConfiguration {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            request: request.into(),
            extra: Map::new(),
        }
    }

    pub fn summary(&self) -> ConfigurationSummary {
        ConfigurationSummary {
            name: self.name.clone(),
            kind: self.kind.clone(),
            request: self.request.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub started: bool,
    pub configuration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStopped {
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    #[serde(rename = "type")]
    pub step: StepType,
    pub thread_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStatus {
    pub is_active: bool,
    pub is_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_session: Option<SessionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<Vec<ThreadInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_thread_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_frames: Option<Vec<StackFrame>>,
    pub breakpoints: Vec<BreakpointDescriptor>,
}

impl DebugStatus {
    pub fn inactive(breakpoints: Vec<BreakpointDescriptor>) -> Self {
        Self {
            is_active: false,
            is_paused: false,
            active_session: None,
            threads: None,
            active_thread_id: None,
            stack_frames: None,
            breakpoints,
        }
    }
}
