//! Debugger control server: exposes a live debug session to automation clients through
//! a JSON request/response protocol carried over HTTP and Server-Sent Events.

pub mod config;
pub mod dap;
pub mod launch;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod transport;

pub use config::ServerConfig;
pub use dap::DapHost;
pub use protocol::{ErrorCode, Request, RequestId, Response, RpcError, PROTOCOL_VERSION};
pub use registry::{Tool, ToolCall, ToolKind, ToolRegistry};
pub use router::ProtocolRouter;
pub use transport::{Listeners, ServerStatus, SseServer, TransportError};
