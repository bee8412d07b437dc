use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DebugError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    StepOver,
    StepInto,
    StepOut,
    Continue,
    Pause,
}

impl StepType {
    pub const ALL: [StepType; 5] = [
        StepType::StepOver,
        StepType::StepInto,
        StepType::StepOut,
        StepType::Continue,
        StepType::Pause,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::StepOver => "stepOver",
            StepType::StepInto => "stepInto",
            StepType::StepOut => "stepOut",
            StepType::Continue => "continue",
            StepType::Pause => "pause",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = DebugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| DebugError::UnknownStepType(s.to_string()))
    }
}

/// A breakpoint as the adapter host stores it. `path` is always absolute here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBreakpoint {
    pub path: PathBuf,
    pub line: u32,
    pub enabled: bool,
    #[serde(default)]
    pub condition: Option<String>,
}

impl SourceBreakpoint {
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            enabled: true,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Option<String>) -> Self {
        self.condition = condition;
        self
    }

    pub fn is_at(&self, path: &std::path::Path, line: u32) -> bool {
        self.line == line && self.path == path
    }
}
