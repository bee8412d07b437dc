use crate::ops::status::normalized_threads;
use crate::types::{StepOutcome, StepType};
use crate::{DebugBridge, Result};

/// Issues a step primitive. The step type is validated before the adapter is touched;
/// without an explicit thread the first listed thread (or the synthetic one) is used.
pub async fn step_debugger(
    bridge: &DebugBridge,
    step_type: &str,
    thread_id: Option<i64>,
) -> Result<StepOutcome> {
    let step: StepType = step_type.parse()?;
    bridge.require_session().await?;

    let thread_id = match thread_id {
        Some(id) => id,
        None => normalized_threads(bridge)
            .await
            .first()
            .map(|t| t.id)
            .unwrap_or(crate::types::SYNTHETIC_THREAD_ID),
    };

    tracing::debug!("Stepping thread {} with {}", thread_id, step);
    bridge.adapter().step(thread_id, step).await?;

    Ok(StepOutcome { step, thread_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAdapter;
    use crate::types::ThreadInfo;
    use crate::{BridgeConfig, DebugError};
    use std::sync::Arc;

    fn bridge(adapter: Arc<StubAdapter>) -> DebugBridge {
        DebugBridge::new(adapter, BridgeConfig::new(Vec::new(), None))
    }

    #[tokio::test]
    async fn test_unknown_step_type_fails_before_adapter() {
        let adapter = Arc::new(StubAdapter::new().with_session("app"));
        let err = step_debugger(&bridge(adapter.clone()), "bogus", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown step type: bogus");
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_step_requires_session() {
        let err = step_debugger(&bridge(Arc::new(StubAdapter::new())), "stepOver", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DebugError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_step_uses_first_listed_thread() {
        let adapter = Arc::new(
            StubAdapter::new()
                .with_session("app")
                .with_threads(vec![ThreadInfo::new(5, "a"), ThreadInfo::new(6, "b")]),
        );
        let outcome = step_debugger(&bridge(adapter.clone()), "stepInto", None)
            .await
            .unwrap();
        assert_eq!(outcome.thread_id, 5);
        assert_eq!(adapter.steps(), vec![(5, StepType::StepInto)]);
    }

    #[tokio::test]
    async fn test_step_falls_back_to_synthetic_thread() {
        let adapter = Arc::new(
            StubAdapter::new()
                .with_session("app")
                .with_unsupported_threads(),
        );
        let outcome = step_debugger(&bridge(adapter.clone()), "continue", None)
            .await
            .unwrap();
        assert_eq!(outcome.thread_id, 1);
        assert_eq!(adapter.steps(), vec![(1, StepType::Continue)]);
    }

    #[tokio::test]
    async fn test_step_with_explicit_thread_skips_listing() {
        let adapter = Arc::new(StubAdapter::new().with_session("app"));
        step_debugger(&bridge(adapter.clone()), "pause", Some(12))
            .await
            .unwrap();
        assert_eq!(adapter.steps(), vec![(12, StepType::Pause)]);
        assert!(!adapter.calls().contains(&"threads"));
    }
}
