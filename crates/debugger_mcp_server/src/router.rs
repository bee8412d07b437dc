//! Validates protocol requests and dispatches tool calls to the debug operations.

use std::future::Future;

use debug_bridge_core::ops::{breakpoints, evaluate, session, status, step};
use debug_bridge_core::{DebugBridge, DebugError};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{
    InitializeResult, Request, RequestId, Response, RpcError, ToolResult, PROTOCOL_VERSION,
};
use crate::registry::{ToolCall, ToolRegistry};

pub struct ProtocolRouter {
    registry: ToolRegistry,
    bridge: DebugBridge,
    /// Serializes request processing.
    dispatch: Mutex<()>,
}

impl ProtocolRouter {
    pub fn new(bridge: DebugBridge) -> Self {
        Self::with_registry(ToolRegistry::new(), bridge)
    }

    pub fn with_registry(registry: ToolRegistry, bridge: DebugBridge) -> Self {
        Self {
            registry,
            bridge,
            dispatch: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &DebugBridge {
        &self.bridge
    }

    /// Handles a raw request body. The body may be a JSON object or a JSON string that
    /// itself contains the JSON object.
    pub async fn handle_body(&self, body: &[u8]) -> Response {
        match parse_body(body) {
            Ok(value) => self.handle_value(value).await,
            Err(error) => {
                debug!("Rejecting unparseable request body: {:?}", error.data);
                Response::failure(None, error)
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Response {
        let echo_id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());

        let request = match validate(value) {
            Ok(request) => request,
            Err(error) => return Response::failure(echo_id, error),
        };

        let _guard = self.dispatch.lock().await;
        debug!("Handling {} (id {:?})", request.method, request.id);
        match self.route(&request.method, request.params).await {
            Ok(result) => Response::success(Some(request.id), result),
            Err(error) => Response::failure(Some(request.id), error),
        }
    }

    async fn route(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => to_value(&InitializeResult::current()),
            "tools/list" => Ok(json!({ "tools": self.registry.tools() })),
            "tools/call" => self.call_tool(params).await,
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let mut params = match params {
            Some(Value::Object(map)) => map,
            _ => return Err(RpcError::invalid_params("Missing tool name")),
        };
        let name = match params.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(RpcError::invalid_params("Tool name must be a string")),
            None => return Err(RpcError::invalid_params("Missing tool name")),
        };
        let tool = self
            .registry
            .get(&name)
            .ok_or_else(|| RpcError::invalid_params(format!("Unknown tool: {name}")))?;
        let call = ToolCall::parse(tool, params.remove("arguments"))?;

        debug!("Calling tool {}", name);
        let result = self.run(&name, self.invoke(call)).await;
        if let Err(e) = &result {
            warn!("Tool {} failed: {}", name, e.message);
        }
        result
    }

    async fn invoke(&self, call: ToolCall) -> Result<Value, RpcError> {
        let bridge = &self.bridge;
        match call {
            ToolCall::SetBreakpoint(args) => text_result(
                breakpoints::set_breakpoint(bridge, &args.path, args.line, args.condition).await,
            ),
            ToolCall::RemoveBreakpoint(args) => {
                text_result(breakpoints::remove_breakpoint(bridge, &args.path, args.line).await)
            }
            ToolCall::EvaluateExpression(args) => {
                let output =
                    evaluate::evaluate_expression(bridge, &args.expression, args.frame_id)
                        .await
                        .map_err(internal)?;
                to_value(&ToolResult::text(output))
            }
            ToolCall::ListDebugConfigurations => {
                text_result(session::list_debug_configurations(bridge).await)
            }
            ToolCall::StartDebugging(args) => {
                text_result(session::start_debugging(bridge, args.config_name.as_deref()).await)
            }
            ToolCall::StopDebugging => text_result(session::stop_debugging(bridge).await),
            ToolCall::GetDebugStatus => text_result(status::debug_status(bridge).await),
            ToolCall::StepDebugger(args) => {
                text_result(step::step_debugger(bridge, &args.step_type, args.thread_id).await)
            }
        }
    }

    async fn run<F>(&self, name: &str, call: F) -> Result<Value, RpcError>
    where
        F: Future<Output = Result<Value, RpcError>>,
    {
        match self.bridge.config().call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(RpcError::internal_error(format!(
                    "Tool call {name} timed out after {}ms",
                    limit.as_millis()
                )))
            }),
            None => call.await,
        }
    }
}

impl std::fmt::Debug for ProtocolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRouter")
            .field("tools", &self.registry.len())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

/// A request that passed envelope validation.
#[derive(Debug)]
struct ValidRequest {
    id: RequestId,
    method: String,
    params: Option<Value>,
}

fn validate(value: Value) -> Result<ValidRequest, RpcError> {
    if !value.is_object() {
        return Err(RpcError::invalid_request("Request must be a JSON object"));
    }
    let request: Request = serde_json::from_value(value)
        .map_err(|e| RpcError::invalid_request(format!("Invalid request: {e}")))?;

    match request.protocol_version.as_deref() {
        Some(PROTOCOL_VERSION) => {}
        Some(other) => {
            return Err(RpcError::invalid_request(format!(
                "Unsupported protocol version: {other}"
            )))
        }
        None => return Err(RpcError::invalid_request("Missing protocolVersion")),
    }
    let id = request
        .id
        .ok_or_else(|| RpcError::invalid_request("Missing request id"))?;
    let method = request
        .method
        .ok_or_else(|| RpcError::invalid_request("Missing method"))?;

    Ok(ValidRequest {
        id,
        method,
        params: request.params,
    })
}

pub(crate) fn parse_body(body: &[u8]) -> Result<Value, RpcError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RpcError::parse_error().with_data(json!(e.to_string())))?;
    match value {
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|e| RpcError::parse_error().with_data(json!(e.to_string()))),
        other => Ok(other),
    }
}

fn text_result<T: Serialize>(result: Result<T, DebugError>) -> Result<Value, RpcError> {
    let value = result.map_err(internal)?;
    let text = serde_json::to_string_pretty(&value)
        .map_err(|e| RpcError::internal_error(format!("Failed to serialize result: {e}")))?;
    to_value(&ToolResult::text(text))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::internal_error(format!("Failed to serialize result: {e}")))
}

fn internal(error: DebugError) -> RpcError {
    RpcError::internal_error(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;
    use debug_bridge_core::testing::StubAdapter;
    use debug_bridge_core::types::{StackFrame, StepType};
    use debug_bridge_core::BridgeConfig;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn router(adapter: Arc<StubAdapter>) -> ProtocolRouter {
        ProtocolRouter::new(DebugBridge::new(
            adapter,
            BridgeConfig::new(vec![PathBuf::from("/work")], None),
        ))
    }

    fn call(id: i64, name: &str, arguments: Value) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        })
    }

    fn result_text(response: &Response) -> String {
        let result = response.result().expect("expected a result");
        result["content"][0]["text"]
            .as_str()
            .expect("text content")
            .to_string()
    }

    fn result_json(response: &Response) -> Value {
        serde_json::from_str(&result_text(response)).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_echoes_id() {
        let router = router(Arc::new(StubAdapter::new()));
        let response = router
            .handle_value(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "id": "init-1",
                "method": "initialize"
            }))
            .await;
        assert_eq!(response.id, Some(RequestId::from("init-1")));
        let result = response.result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "debugger_mcp_server");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_returns_registry() {
        let router = router(Arc::new(StubAdapter::new()));
        let response = router
            .handle_value(json!({"protocolVersion": PROTOCOL_VERSION, "id": 2, "method": "tools/list"}))
            .await;
        let tools = response.result().unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 8);
        assert!(tools.iter().any(|t| t["name"] == "get_debug_status"));
    }

    #[tokio::test]
    async fn test_unsupported_protocol_version_never_reaches_adapter() {
        let adapter = Arc::new(StubAdapter::new().with_session("Launch"));
        let router = router(adapter.clone());
        for version in [json!("1999-01-01"), json!(3), Value::Null] {
            let mut request = call(7, "get_debug_status", json!({}));
            request["protocolVersion"] = version;
            let response = router.handle_value(request).await;
            assert_eq!(response.error().unwrap().code, ErrorCode::InvalidRequest);
            assert_eq!(response.id, Some(RequestId::from(7)));
        }
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_method_and_id_are_invalid_requests() {
        let router = router(Arc::new(StubAdapter::new()));
        let no_method = router
            .handle_value(json!({"protocolVersion": PROTOCOL_VERSION, "id": 1}))
            .await;
        assert_eq!(no_method.error().unwrap().code, ErrorCode::InvalidRequest);

        let no_id = router
            .handle_value(json!({"protocolVersion": PROTOCOL_VERSION, "method": "initialize"}))
            .await;
        assert_eq!(no_id.error().unwrap().code, ErrorCode::InvalidRequest);
        assert_eq!(no_id.id, None);

        let not_object = router.handle_value(json!([1, 2, 3])).await;
        assert_eq!(not_object.error().unwrap().code, ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let router = router(Arc::new(StubAdapter::new()));
        let response = router
            .handle_value(json!({"protocolVersion": PROTOCOL_VERSION, "id": 1, "method": "resources/list"}))
            .await;
        let error = response.error().unwrap();
        assert_eq!(error.code, ErrorCode::MethodNotFound);
        assert_eq!(error.message, "Method not found: resources/list");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_name_are_invalid_params() {
        let adapter = Arc::new(StubAdapter::new());
        let router = router(adapter.clone());
        let unknown = router.handle_value(call(1, "launch_rockets", json!({}))).await;
        assert_eq!(unknown.error().unwrap().code, ErrorCode::InvalidParams);

        let nameless = router
            .handle_value(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "id": 2,
                "method": "tools/call",
                "params": {"arguments": {}}
            }))
            .await;
        assert_eq!(nameless.error().unwrap().code, ErrorCode::InvalidParams);
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_argument_fails_before_adapter() {
        let adapter = Arc::new(StubAdapter::new());
        let router = router(adapter.clone());
        let response = router
            .handle_value(call(3, "set_breakpoint", json!({"path": "a.js"})))
            .await;
        assert_eq!(response.error().unwrap().code, ErrorCode::InvalidParams);
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bogus_step_type_is_internal_error() {
        let router = router(Arc::new(StubAdapter::new().with_session("Launch")));
        let response = router
            .handle_value(call(1, "step_debugger", json!({"type": "bogus"})))
            .await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "id": 1,
                "error": {"code": -32603, "message": "Unknown step type: bogus"}
            })
        );
    }

    #[tokio::test]
    async fn test_breakpoint_visible_in_status_until_removed() {
        let router = router(Arc::new(StubAdapter::new()));
        let set = router
            .handle_value(call(1, "set_breakpoint", json!({"path": "a.js", "line": 10})))
            .await;
        assert_eq!(result_json(&set)["path"], "a.js");

        let status = router.handle_value(call(2, "get_debug_status", json!({}))).await;
        let status = result_json(&status);
        assert_eq!(status["isActive"], false);
        assert_eq!(status["breakpoints"][0]["line"], 10);

        let removed = router
            .handle_value(call(3, "remove_breakpoint", json!({"path": "a.js", "line": 10})))
            .await;
        assert_eq!(
            result_json(&removed),
            json!({"removed": true, "path": "a.js", "line": 10})
        );

        let status = router.handle_value(call(4, "get_debug_status", json!({}))).await;
        assert_eq!(result_json(&status)["breakpoints"], json!([]));

        let again = router
            .handle_value(call(5, "remove_breakpoint", json!({"path": "a.js", "line": 10})))
            .await;
        let error = again.error().unwrap();
        assert_eq!(error.code, ErrorCode::InternalError);
        assert_eq!(error.message, "No breakpoint found at a.js:10");
    }

    #[tokio::test]
    async fn test_status_with_unsupported_threads() {
        let router = router(Arc::new(
            StubAdapter::new().with_session("Launch").with_unsupported_threads(),
        ));
        let response = router.handle_value(call(1, "get_debug_status", json!({}))).await;
        let status = result_json(&response);
        assert_eq!(status["isActive"], true);
        assert_eq!(status["isPaused"], false);
        assert_eq!(status["threads"], json!([{"id": 1, "name": "main"}]));
        assert_eq!(status["activeThreadId"], 1);
    }

    #[tokio::test]
    async fn test_evaluate_result_is_passed_verbatim() {
        let adapter = Arc::new(
            StubAdapter::new()
                .with_session("Launch")
                .paused_at(vec![StackFrame {
                    id: 42,
                    name: "main".into(),
                    path: Some("/work/a.js".into()),
                    line: 3,
                    column: 1,
                }])
                .with_evaluation("answer", "42"),
        );
        let router = router(adapter.clone());
        let response = router
            .handle_value(call(1, "evaluate_expression", json!({"expression": "answer"})))
            .await;
        assert_eq!(result_text(&response), "42");
        assert_eq!(adapter.evaluated(), vec![("answer".to_string(), Some(42))]);
    }

    #[tokio::test]
    async fn test_step_and_session_lifecycle() {
        let adapter = Arc::new(StubAdapter::new().with_configuration("Launch app"));
        let router = router(adapter.clone());

        let listed = router
            .handle_value(call(1, "list_debug_configurations", json!({})))
            .await;
        assert_eq!(
            result_json(&listed),
            json!([{"name": "Launch app", "type": "stub", "request": "launch"}])
        );

        let started = router.handle_value(call(2, "start_debugging", json!({}))).await;
        assert_eq!(
            result_json(&started),
            json!({"started": true, "configuration": "Launch app"})
        );

        let stepped = router
            .handle_value(call(3, "step_debugger", json!({"type": "stepOver", "threadId": 4})))
            .await;
        assert_eq!(result_json(&stepped), json!({"type": "stepOver", "threadId": 4}));
        assert_eq!(adapter.steps(), vec![(4, StepType::StepOver)]);

        let stopped = router.handle_value(call(4, "stop_debugging", json!({}))).await;
        assert_eq!(result_json(&stopped), json!({"stopped": true}));

        let stopped_again = router.handle_value(call(5, "stop_debugging", json!({}))).await;
        assert_eq!(
            stopped_again.error().unwrap().message,
            "No active debug session"
        );
    }

    #[tokio::test]
    async fn test_parse_errors_have_null_id() {
        let router = router(Arc::new(StubAdapter::new()));
        let response = router.handle_body(b"not json").await;
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
        assert_eq!(value["error"]["message"], "Parse error");

        let wrapped = router.handle_body(br#""{not json either""#).await;
        assert_eq!(wrapped.error().unwrap().code, ErrorCode::ParseError);
    }

    #[tokio::test]
    async fn test_body_may_be_json_string_containing_request() {
        let router = router(Arc::new(StubAdapter::new()));
        let inner = json!({"protocolVersion": PROTOCOL_VERSION, "id": 9, "method": "initialize"});
        let body = serde_json::to_vec(&Value::String(inner.to_string())).unwrap();
        let response = router.handle_body(&body).await;
        assert_eq!(response.id, Some(RequestId::from(9)));
        assert!(response.result().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_yields_internal_error() {
        let router = ProtocolRouter::new(DebugBridge::new(
            Arc::new(StubAdapter::new()),
            BridgeConfig::new(vec![PathBuf::from("/work")], Some(Duration::from_millis(50))),
        ));
        let result = router
            .run("get_debug_status", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            })
            .await;
        let error = result.unwrap_err();
        assert_eq!(error.code, ErrorCode::InternalError);
        assert_eq!(error.message, "Tool call get_debug_status timed out after 50ms");
    }
}
