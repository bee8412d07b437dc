//! Catalog of the tools clients can invoke and their typed arguments.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::protocol::RpcError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointArgs {
    /// Source file, absolute or relative to the workspace root.
    pub path: String,
    /// 1-based line number.
    #[schemars(range(min = 1))]
    pub line: u32,
    /// Expression that must evaluate to true for the breakpoint to stop.
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpointArgs {
    /// Source file, absolute or relative to the workspace root.
    pub path: String,
    /// 1-based line number.
    #[schemars(range(min = 1))]
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateExpressionArgs {
    pub expression: String,
    /// Stack frame to evaluate in. Defaults to the top frame when paused.
    #[serde(default)]
    pub frame_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartDebuggingArgs {
    /// Launch configuration name. Defaults to the first configuration.
    #[serde(default)]
    pub config_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepDebuggerArgs {
    /// One of stepOver, stepInto, stepOut, continue, pause.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Thread to step. Defaults to the first available thread.
    #[serde(default)]
    pub thread_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SetBreakpoint,
    RemoveBreakpoint,
    EvaluateExpression,
    ListDebugConfigurations,
    StartDebugging,
    StopDebugging,
    GetDebugStatus,
    StepDebugger,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::SetBreakpoint,
        ToolKind::RemoveBreakpoint,
        ToolKind::EvaluateExpression,
        ToolKind::ListDebugConfigurations,
        ToolKind::StartDebugging,
        ToolKind::StopDebugging,
        ToolKind::GetDebugStatus,
        ToolKind::StepDebugger,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::SetBreakpoint => "set_breakpoint",
            ToolKind::RemoveBreakpoint => "remove_breakpoint",
            ToolKind::EvaluateExpression => "evaluate_expression",
            ToolKind::ListDebugConfigurations => "list_debug_configurations",
            ToolKind::StartDebugging => "start_debugging",
            ToolKind::StopDebugging => "stop_debugging",
            ToolKind::GetDebugStatus => "get_debug_status",
            ToolKind::StepDebugger => "step_debugger",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::SetBreakpoint => "Set a breakpoint at a source line, optionally conditional",
            ToolKind::RemoveBreakpoint => "Remove the breakpoint at a source line",
            ToolKind::EvaluateExpression => {
                "Evaluate an expression in the active debug session"
            }
            ToolKind::ListDebugConfigurations => "List the launch configurations of the workspace",
            ToolKind::StartDebugging => "Start a debug session from a launch configuration",
            ToolKind::StopDebugging => "Stop the active debug session",
            ToolKind::GetDebugStatus => {
                "Report session, thread, stack and breakpoint state of the debugger"
            }
            ToolKind::StepDebugger => {
                "Step over, into or out of the current line, continue, or pause execution"
            }
        }
    }

    fn input_schema(self) -> Value {
        match self {
            ToolKind::SetBreakpoint => schema_of::<SetBreakpointArgs>(),
            ToolKind::RemoveBreakpoint => schema_of::<RemoveBreakpointArgs>(),
            ToolKind::EvaluateExpression => schema_of::<EvaluateExpressionArgs>(),
            ToolKind::StartDebugging => schema_of::<StartDebuggingArgs>(),
            ToolKind::StepDebugger => schema_of::<StepDebuggerArgs>(),
            ToolKind::ListDebugConfigurations
            | ToolKind::StopDebugging
            | ToolKind::GetDebugStatus => schema_of::<NoArgs>(),
        }
    }
}

fn schema_of<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
    }
    schema
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip)]
    pub kind: ToolKind,
}

impl Tool {
    fn new(kind: ToolKind) -> Self {
        Self {
            name: kind.name().to_string(),
            description: kind.description().to_string(),
            input_schema: kind.input_schema(),
            kind,
        }
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Rejects argument objects lacking a field the schema marks as required.
    pub fn check_required(&self, arguments: &Map<String, Value>) -> Result<(), RpcError> {
        for field in self.required_fields() {
            if arguments.get(field).map_or(true, Value::is_null) {
                return Err(RpcError::invalid_params(format!(
                    "Missing required argument '{field}' for tool {}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: ToolKind::ALL.into_iter().map(Tool::new).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A validated tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    SetBreakpoint(SetBreakpointArgs),
    RemoveBreakpoint(RemoveBreakpointArgs),
    EvaluateExpression(EvaluateExpressionArgs),
    ListDebugConfigurations,
    StartDebugging(StartDebuggingArgs),
    StopDebugging,
    GetDebugStatus,
    StepDebugger(StepDebuggerArgs),
}

impl ToolCall {
    /// Checks required fields against the tool's schema, then decodes the arguments.
    pub fn parse(tool: &Tool, arguments: Option<Value>) -> Result<Self, RpcError> {
        let arguments = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(RpcError::invalid_params(format!(
                    "Arguments for tool {} must be an object",
                    tool.name
                )))
            }
        };
        tool.check_required(&arguments)?;

        let call = match tool.kind {
            ToolKind::SetBreakpoint => ToolCall::SetBreakpoint(decode(tool, arguments)?),
            ToolKind::RemoveBreakpoint => ToolCall::RemoveBreakpoint(decode(tool, arguments)?),
            ToolKind::EvaluateExpression => {
                ToolCall::EvaluateExpression(decode(tool, arguments)?)
            }
            ToolKind::ListDebugConfigurations => ToolCall::ListDebugConfigurations,
            ToolKind::StartDebugging => ToolCall::StartDebugging(decode(tool, arguments)?),
            ToolKind::StopDebugging => ToolCall::StopDebugging,
            ToolKind::GetDebugStatus => ToolCall::GetDebugStatus,
            ToolKind::StepDebugger => ToolCall::StepDebugger(decode(tool, arguments)?),
        };
        Ok(call)
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::SetBreakpoint(_) => ToolKind::SetBreakpoint,
            ToolCall::RemoveBreakpoint(_) => ToolKind::RemoveBreakpoint,
            ToolCall::EvaluateExpression(_) => ToolKind::EvaluateExpression,
            ToolCall::ListDebugConfigurations => ToolKind::ListDebugConfigurations,
            ToolCall::StartDebugging(_) => ToolKind::StartDebugging,
            ToolCall::StopDebugging => ToolKind::StopDebugging,
            ToolCall::GetDebugStatus => ToolKind::GetDebugStatus,
            ToolCall::StepDebugger(_) => ToolKind::StepDebugger,
        }
    }
}

fn decode<T: DeserializeOwned>(tool: &Tool, arguments: Map<String, Value>) -> Result<T, RpcError> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| {
        RpcError::invalid_params(format!("Invalid arguments for tool {}: {e}", tool.name))
    })
}
