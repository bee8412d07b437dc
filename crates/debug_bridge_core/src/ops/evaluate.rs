use crate::ops::status::{active_thread_id, normalized_threads};
use crate::{DebugBridge, Result};

/// Evaluates `expression` in the active session. Without an explicit frame the top frame
/// of the active thread is used when execution is paused.
pub async fn evaluate_expression(
    bridge: &DebugBridge,
    expression: &str,
    frame_id: Option<i64>,
) -> Result<String> {
    let session = bridge.require_session().await?;

    let frame_id = match frame_id {
        Some(id) => Some(id),
        None => {
            let threads = normalized_threads(bridge).await;
            let thread_id = active_thread_id(&session, &threads);
            bridge
                .adapter()
                .stack_trace(thread_id)
                .await
                .ok()
                .and_then(|frames| frames.first().map(|frame| frame.id))
        }
    };

    bridge.adapter().evaluate(expression, frame_id).await
}
