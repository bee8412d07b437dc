//! A [`DebugAdapter`] that drives a Debug Adapter Protocol server over stdio.
//!
//! Breakpoints live in memory on the host and are pushed to the adapter whenever a
//! session is running. Launch configurations come from the workspace's `launch.json`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use debug_bridge_core::types::{
    DebugConfiguration, SessionInfo, SourceBreakpoint, StackFrame, StepType, ThreadInfo,
};
use debug_bridge_core::{DebugAdapter, DebugError, Result};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::launch;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const INITIALIZED_EVENT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const STACK_TRACE_LEVELS: u32 = 64;

/// Launch configuration field naming the adapter command for that configuration.
pub const ADAPTER_COMMAND_FIELD: &str = "adapterCommand";
const WORKSPACE_FOLDER_VAR: &str = "${workspaceFolder}";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// State the reader task learns from adapter events.
#[derive(Debug, Default)]
struct SessionEvents {
    last_stopped_thread: Mutex<Option<i64>>,
    initialized: AtomicBool,
    initialized_notify: Notify,
    terminated: AtomicBool,
}

/// One framed DAP channel: a writer, a reader task and the requests awaiting responses.
struct DapConnection {
    writer: Mutex<Writer>,
    pending: Pending,
    events: Arc<SessionEvents>,
    next_seq: AtomicU64,
    reader_task: JoinHandle<()>,
}

impl DapConnection {
    fn new<R>(reader: R, writer: Writer) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let events = Arc::new(SessionEvents::default());
        let reader_task = tokio::spawn(reader_loop(
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&events),
        ));
        Self {
            writer: Mutex::new(writer),
            pending,
            events,
            next_seq: AtomicU64::new(0),
            reader_task,
        }
    }

    async fn send_request_begin(
        &self,
        command: &str,
        arguments: Value,
    ) -> Result<(u64, oneshot::Receiver<Value>)> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let framed = Framing::encode(&json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(seq, tx);

        let mut writer = self.writer.lock().await;
        let written = match writer.write_all(&framed).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&seq);
            return Err(DebugError::adapter(format!(
                "Failed to send '{command}' to the debug adapter: {e}"
            )));
        }
        debug!("DAP -> {} (seq {})", command, seq);
        Ok((seq, rx))
    }

    async fn await_response(
        &self,
        command: &str,
        seq: u64,
        rx: oneshot::Receiver<Value>,
        wait_timeout: Duration,
    ) -> Result<Value> {
        let response = match timeout(wait_timeout, rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => {
                return Err(DebugError::adapter(format!(
                    "Debug adapter exited while waiting for '{command}'"
                )))
            }
            Err(_) => {
                self.pending.lock().await.remove(&seq);
                return Err(DebugError::Timeout(wait_timeout));
            }
        };

        let success = response
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if !success {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown adapter error");
            if message == "notSupported" {
                return Err(DebugError::unsupported(command));
            }
            return Err(DebugError::adapter(format!("'{command}' failed: {message}")));
        }

        Ok(response.get("body").cloned().unwrap_or(Value::Null))
    }

    /// Sends `command` and returns the body of its response.
    async fn request(&self, command: &str, arguments: Value) -> Result<Value> {
        let (seq, rx) = self.send_request_begin(command, arguments).await?;
        self.await_response(command, seq, rx, REQUEST_TIMEOUT).await
    }

    async fn wait_for_initialized(&self, wait_timeout: Duration) -> bool {
        let notified = self.events.initialized_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.events.initialized.load(Ordering::SeqCst) {
            return true;
        }
        let _ = timeout(wait_timeout, notified).await;
        self.events.initialized.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.events.terminated.load(Ordering::SeqCst)
    }

    async fn last_stopped_thread(&self) -> Option<i64> {
        *self.events.last_stopped_thread.lock().await
    }

    /// Runs the launch handshake: `initialize`, `launch`/`attach`, wait for
    /// `initialized`, push breakpoints, `configurationDone`, then the launch response.
    async fn handshake(
        &self,
        configuration: &DebugConfiguration,
        workspace_root: &Path,
        breakpoints: &BTreeMap<PathBuf, Vec<SourceBreakpoint>>,
    ) -> Result<()> {
        let capabilities = self
            .request("initialize", initialize_args(&configuration.kind))
            .await?;

        let command = match configuration.request.as_str() {
            "attach" => "attach",
            _ => "launch",
        };
        let (launch_seq, launch_rx) = self
            .send_request_begin(command, launch_arguments(configuration, workspace_root)?)
            .await?;

        if !self.wait_for_initialized(INITIALIZED_EVENT_WAIT_TIMEOUT).await {
            warn!("Timed out waiting for the DAP initialized event");
        }

        for (path, file_breakpoints) in breakpoints {
            if let Err(e) = self
                .request("setBreakpoints", set_breakpoints_args(path, file_breakpoints))
                .await
            {
                warn!("Failed to set breakpoints in {}: {}", path.display(), e);
            }
        }

        if capabilities
            .get("supportsConfigurationDoneRequest")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            self.request("configurationDone", json!({})).await?;
        }

        self.await_response(command, launch_seq, launch_rx, LAUNCH_TIMEOUT)
            .await?;
        Ok(())
    }
}

struct DapSession {
    child: Option<Child>,
    connection: DapConnection,
    info: SessionInfo,
}

impl DapSession {
    async fn shutdown(mut self) {
        self.connection.reader_task.abort();
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

/// Hosts at most one DAP session plus the breakpoint store that outlives sessions.
pub struct DapHost {
    workspace_root: PathBuf,
    adapter_command: Option<String>,
    breakpoints: Mutex<BTreeMap<PathBuf, Vec<SourceBreakpoint>>>,
    session: Mutex<Option<DapSession>>,
    next_session_id: AtomicU64,
}

impl DapHost {
    pub fn new(workspace_root: impl Into<PathBuf>, adapter_command: Option<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            adapter_command,
            breakpoints: Mutex::new(BTreeMap::new()),
            session: Mutex::new(None),
            next_session_id: AtomicU64::new(0),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Disconnects and kills the running adapter, if any.
    pub async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            info!("Shutting down debug session '{}'", session.info.name);
            disconnect(session).await;
        }
    }

    fn adapter_command_for(&self, configuration: &DebugConfiguration) -> Result<String> {
        configuration
            .extra
            .get(ADAPTER_COMMAND_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.adapter_command.clone())
            .filter(|cmd| !cmd.trim().is_empty())
            .ok_or_else(|| {
                DebugError::adapter(format!(
                    "No debug adapter command for '{}'. Set {ADAPTER_COMMAND_FIELD} in the launch configuration or DAP_ADAPTER_CMD.",
                    configuration.name
                ))
            })
    }

    fn spawn_adapter(&self, command_line: &str) -> Result<(Child, DapConnection)> {
        let (program, args) = split_command(command_line)
            .ok_or_else(|| DebugError::adapter("Debug adapter command is empty"))?;

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DebugError::adapter(format!("Failed to spawn debug adapter '{program}': {e}"))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DebugError::adapter("Debug adapter has no stdin pipe"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DebugError::adapter("Debug adapter has no stdout pipe"))?;

        if let Some(status) = child.try_wait()? {
            return Err(DebugError::adapter(format!(
                "Debug adapter exited during startup with status: {status}"
            )));
        }

        Ok((child, DapConnection::new(stdout, Box::new(stdin))))
    }

    /// Pushes the breakpoints of `path` to the running session. Failures are logged only;
    /// the host store stays authoritative.
    async fn sync_file(&self, path: &Path) {
        let file_breakpoints = self
            .breakpoints
            .lock()
            .await
            .get(path)
            .cloned()
            .unwrap_or_default();

        let session = self.session.lock().await;
        let Some(session) = session.as_ref().filter(|s| !s.connection.is_terminated()) else {
            return;
        };
        if let Err(e) = session
            .connection
            .request("setBreakpoints", set_breakpoints_args(path, &file_breakpoints))
            .await
        {
            warn!("Failed to sync breakpoints for {}: {}", path.display(), e);
        }
    }

    /// Drops a session whose adapter has terminated.
    async fn reap_terminated(&self) {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(|s| s.connection.is_terminated()) {
            if let Some(session) = slot.take() {
                info!("Debug session '{}' terminated", session.info.name);
                session.shutdown().await;
            }
        }
    }
}

fn live(slot: &Option<DapSession>) -> Result<&DapSession> {
    slot.as_ref()
        .filter(|session| !session.connection.is_terminated())
        .ok_or(DebugError::NoActiveSession)
}

async fn disconnect(session: DapSession) {
    if !session.connection.is_terminated() {
        let sent = match session
            .connection
            .send_request_begin("disconnect", json!({ "terminateDebuggee": true }))
            .await
        {
            Ok((seq, rx)) => {
                session
                    .connection
                    .await_response("disconnect", seq, rx, DISCONNECT_TIMEOUT)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Debug adapter did not acknowledge disconnect: {}", e);
        }
    }
    session.shutdown().await;
}

#[async_trait]
impl DebugAdapter for DapHost {
    async fn breakpoints(&self) -> Result<Vec<SourceBreakpoint>> {
        Ok(self
            .breakpoints
            .lock()
            .await
            .values()
            .flatten()
            .cloned()
            .collect())
    }

    async fn add_breakpoint(&self, breakpoint: SourceBreakpoint) -> Result<SourceBreakpoint> {
        let path = breakpoint.path.clone();
        {
            let mut store = self.breakpoints.lock().await;
            let file = store.entry(path.clone()).or_default();
            file.retain(|bp| bp.line != breakpoint.line);
            file.push(breakpoint.clone());
            file.sort_by_key(|bp| bp.line);
        }
        self.sync_file(&path).await;
        Ok(breakpoint)
    }

    async fn remove_breakpoint(&self, path: &Path, line: u32) -> Result<bool> {
        let removed = {
            let mut store = self.breakpoints.lock().await;
            let Some(file) = store.get_mut(path) else {
                return Ok(false);
            };
            let before = file.len();
            file.retain(|bp| !bp.is_at(path, line));
            let removed = file.len() != before;
            if file.is_empty() {
                store.remove(path);
            }
            removed
        };
        if removed {
            self.sync_file(path).await;
        }
        Ok(removed)
    }

    async fn configurations(&self) -> Result<Vec<DebugConfiguration>> {
        launch::read_configurations(&self.workspace_root).await
    }

    async fn active_session(&self) -> Option<SessionInfo> {
        self.reap_terminated().await;
        let slot = self.session.lock().await;
        let session = slot.as_ref()?;
        let mut info = session.info.clone();
        info.focused_thread_id = session.connection.last_stopped_thread().await;
        Some(info)
    }

    async fn start_session(&self, configuration: &DebugConfiguration) -> Result<SessionInfo> {
        self.reap_terminated().await;
        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(DebugError::SessionAlreadyActive(active.info.name.clone()));
        }

        let command_line = self.adapter_command_for(configuration)?;
        info!("Spawning debug adapter: {}", command_line);
        let (child, connection) = self.spawn_adapter(&command_line)?;

        let breakpoints = self.breakpoints.lock().await.clone();
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = DapSession {
            child: Some(child),
            connection,
            info: SessionInfo {
                id: format!("dap-{id}"),
                name: configuration.name.clone(),
                kind: configuration.kind.clone(),
                focused_thread_id: None,
            },
        };

        if let Err(e) = session
            .connection
            .handshake(configuration, &self.workspace_root, &breakpoints)
            .await
        {
            session.shutdown().await;
            return Err(e);
        }

        let info = session.info.clone();
        *slot = Some(session);
        Ok(info)
    }

    async fn stop_session(&self) -> Result<()> {
        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or(DebugError::NoActiveSession)?;
        info!("Stopping debug session '{}'", session.info.name);
        disconnect(session).await;
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadInfo>> {
        let slot = self.session.lock().await;
        let body = live(&slot)?.connection.request("threads", json!({})).await?;
        parse_threads(&body)
    }

    async fn stack_trace(&self, thread_id: i64) -> Result<Vec<StackFrame>> {
        let slot = self.session.lock().await;
        let body = live(&slot)?
            .connection
            .request(
                "stackTrace",
                json!({ "threadId": thread_id, "startFrame": 0, "levels": STACK_TRACE_LEVELS }),
            )
            .await?;
        parse_stack_frames(&body)
    }

    async fn evaluate(&self, expression: &str, frame_id: Option<i64>) -> Result<String> {
        let slot = self.session.lock().await;
        let mut arguments = json!({ "expression": expression, "context": "repl" });
        if let Some(frame_id) = frame_id {
            arguments["frameId"] = json!(frame_id);
        }
        let body = live(&slot)?.connection.request("evaluate", arguments).await?;
        body.get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DebugError::adapter("evaluate response has no result"))
    }

    async fn step(&self, thread_id: i64, step: StepType) -> Result<()> {
        let slot = self.session.lock().await;
        let session = live(&slot)?;
        session
            .connection
            .request(step_command(step), json!({ "threadId": thread_id }))
            .await?;
        if step == StepType::Continue {
            *session.connection.events.last_stopped_thread.lock().await = None;
        }
        Ok(())
    }
}

async fn reader_loop<R>(mut reader: R, pending: Pending, events: Arc<SessionEvents>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let message = match Framing::decode(&mut reader).await {
            Ok(message) => message,
            Err(e) => {
                debug!("DAP reader stopped: {}", e);
                break;
            }
        };

        match message.get("type").and_then(Value::as_str) {
            Some("response") => {
                if let Some(request_seq) = message.get("request_seq").and_then(Value::as_u64) {
                    if let Some(tx) = pending.lock().await.remove(&request_seq) {
                        let _ = tx.send(message);
                    }
                }
            }
            Some("event") => handle_event(&message, &events).await,
            _ => {}
        }
    }

    events.terminated.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed channel.
    pending.lock().await.clear();
}

async fn handle_event(message: &Value, events: &SessionEvents) {
    let body = message.get("body");
    match message.get("event").and_then(Value::as_str).unwrap_or_default() {
        "initialized" => {
            events.initialized.store(true, Ordering::SeqCst);
            events.initialized_notify.notify_waiters();
        }
        "stopped" => {
            let thread_id = body.and_then(|b| b.get("threadId")).and_then(Value::as_i64);
            debug!("DAP stopped event (thread {:?})", thread_id);
            *events.last_stopped_thread.lock().await = thread_id;
        }
        "continued" => {
            *events.last_stopped_thread.lock().await = None;
        }
        "terminated" | "exited" => {
            events.terminated.store(true, Ordering::SeqCst);
        }
        "output" => {
            if let Some(output) = body.and_then(|b| b.get("output")).and_then(Value::as_str) {
                debug!("debuggee: {}", output.trim_end());
            }
        }
        _ => {}
    }
}

const CONTENT_LENGTH: &str = "Content-Length";

/// Content-Length framing shared by both directions of a DAP channel.
struct Framing;

impl Framing {
    fn encode(message: &Value) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(message)?;
        let mut frame = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len()).into_bytes();
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    async fn decode<R>(reader: &mut R) -> std::io::Result<Value>
    where
        R: AsyncBufRead + Unpin,
    {
        let length = Self::read_headers(reader).await?;
        let mut body = vec![0_u8; length];
        reader.read_exact(&mut body).await?;
        serde_json::from_slice(&body).map_err(invalid_data)
    }

    /// Consumes the header block and returns the announced body length.
    async fn read_headers<R>(reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut length = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some(value) = Self::content_length(header) {
                length = Some(value.parse::<usize>().map_err(invalid_data)?);
            }
        }
        length.ok_or_else(|| invalid_data("missing Content-Length header"))
    }

    fn content_length(header: &str) -> Option<&str> {
        let (name, value) = header.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(CONTENT_LENGTH)
            .then(|| value.trim())
    }
}

fn invalid_data(error: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())
}

fn split_command(command_line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

fn step_command(step: StepType) -> &'static str {
    match step {
        StepType::StepOver => "next",
        StepType::StepInto => "stepIn",
        StepType::StepOut => "stepOut",
        StepType::Continue => "continue",
        StepType::Pause => "pause",
    }
}

fn initialize_args(adapter_id: &str) -> Value {
    json!({
        "adapterID": adapter_id,
        "clientID": crate::protocol::SERVER_NAME,
        "clientName": crate::protocol::SERVER_NAME,
        "locale": "en-US",
        "pathFormat": "path",
        "linesStartAt1": true,
        "columnsStartAt1": true,
        "supportsVariableType": true,
        "supportsRunInTerminalRequest": false,
    })
}

/// The configuration as launch arguments, with `${workspaceFolder}` expanded and
/// host-only fields removed.
fn launch_arguments(configuration: &DebugConfiguration, workspace_root: &Path) -> Result<Value> {
    let mut arguments = serde_json::to_value(configuration)?;
    if let Value::Object(map) = &mut arguments {
        map.remove(ADAPTER_COMMAND_FIELD);
    }
    substitute_workspace(&mut arguments, &workspace_root.to_string_lossy());
    Ok(arguments)
}

fn substitute_workspace(value: &mut Value, root: &str) {
    match value {
        Value::String(s) if s.contains(WORKSPACE_FOLDER_VAR) => {
            *s = s.replace(WORKSPACE_FOLDER_VAR, root);
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute_workspace(v, root)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute_workspace(v, root)),
        _ => {}
    }
}

fn set_breakpoints_args(path: &Path, breakpoints: &[SourceBreakpoint]) -> Value {
    let entries: Vec<Value> = breakpoints
        .iter()
        .filter(|bp| bp.enabled)
        .map(|bp| {
            let mut entry = Map::new();
            entry.insert("line".to_string(), json!(bp.line));
            if let Some(condition) = &bp.condition {
                entry.insert("condition".to_string(), json!(condition));
            }
            Value::Object(entry)
        })
        .collect();
    json!({
        "source": { "path": path.to_string_lossy() },
        "breakpoints": entries,
    })
}

fn parse_threads(body: &Value) -> Result<Vec<ThreadInfo>> {
    let threads = body
        .get("threads")
        .and_then(Value::as_array)
        .ok_or_else(|| DebugError::adapter("threads response has no thread list"))?;
    Ok(threads
        .iter()
        .filter_map(|t| {
            let id = t.get("id").and_then(Value::as_i64)?;
            let name = t.get("name").and_then(Value::as_str).unwrap_or_default();
            Some(ThreadInfo::new(id, name))
        })
        .collect())
}

fn parse_stack_frames(body: &Value) -> Result<Vec<StackFrame>> {
    let frames = body
        .get("stackFrames")
        .and_then(Value::as_array)
        .ok_or_else(|| DebugError::adapter("stackTrace response has no frames"))?;
    Ok(frames
        .iter()
        .filter_map(|f| {
            Some(StackFrame {
                id: f.get("id").and_then(Value::as_i64)?,
                name: f.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                path: f
                    .get("source")
                    .and_then(|s| s.get("path"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                line: json_u32(f.get("line")),
                column: json_u32(f.get("column")),
            })
        })
        .collect())
}

fn json_u32(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}
