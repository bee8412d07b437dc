use crate::types::{ConfigurationSummary, SessionStarted, SessionStopped};
use crate::{DebugBridge, DebugError, Result};

pub async fn list_debug_configurations(bridge: &DebugBridge) -> Result<Vec<ConfigurationSummary>> {
    let configurations = bridge.adapter().configurations().await?;
    Ok(configurations.iter().map(|c| c.summary()).collect())
}

/// Starts the named configuration, or the first one when no name is given. Only one
/// session may be active at a time.
pub async fn start_debugging(
    bridge: &DebugBridge,
    config_name: Option<&str>,
) -> Result<SessionStarted> {
    if let Some(active) = bridge.adapter().active_session().await {
        return Err(DebugError::SessionAlreadyActive(active.name));
    }

    let configurations = bridge.adapter().configurations().await?;
    let configuration = match config_name {
        Some(name) => configurations
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DebugError::ConfigurationNotFound(name.to_string()))?,
        None => configurations.first().ok_or(DebugError::NoConfigurations)?,
    };

    tracing::info!("Starting debug session '{}'", configuration.name);
    let session = bridge.adapter().start_session(configuration).await?;

    Ok(SessionStarted {
        started: true,
        configuration: session.name,
    })
}

pub async fn stop_debugging(bridge: &DebugBridge) -> Result<SessionStopped> {
    let session = bridge.require_session().await?;
    tracing::info!("Stopping debug session '{}'", session.name);
    bridge.adapter().stop_session().await?;
    Ok(SessionStopped { stopped: true })
}
