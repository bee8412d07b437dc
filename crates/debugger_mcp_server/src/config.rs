use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6010;
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Command line used to spawn the debug adapter when a launch configuration does not
    /// name one.
    pub adapter_command: Option<String>,
    /// How long `stop` waits for the accept loop before aborting it.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            adapter_command: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("DEBUG_MCP_HOST").unwrap_or(defaults.host);
        let port = std::env::var("DEBUG_MCP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let adapter_command = std::env::var("DAP_ADAPTER_CMD")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty());

        Self {
            host,
            port,
            adapter_command,
            shutdown_grace: defaults.shutdown_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6010);
        assert!(config.adapter_command.is_none());
    }

    #[test]
    fn test_new_config() {
        let config = ServerConfig::new("0.0.0.0", 7000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_from_env() {
        std::env::remove_var("DEBUG_MCP_HOST");
        std::env::remove_var("DEBUG_MCP_PORT");
        std::env::remove_var("DAP_ADAPTER_CMD");

        let config = ServerConfig::from_env();
        assert_eq!(config, ServerConfig::default());

        std::env::set_var("DEBUG_MCP_HOST", "0.0.0.0");
        std::env::set_var("DEBUG_MCP_PORT", "7123");
        std::env::set_var("DAP_ADAPTER_CMD", "codelldb --port 0");

        let config = ServerConfig::from_env();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7123);
        assert_eq!(config.adapter_command.as_deref(), Some("codelldb --port 0"));

        std::env::set_var("DEBUG_MCP_PORT", "not-a-port");
        assert_eq!(ServerConfig::from_env().port, DEFAULT_PORT);

        std::env::remove_var("DEBUG_MCP_HOST");
        std::env::remove_var("DEBUG_MCP_PORT");
        std::env::remove_var("DAP_ADAPTER_CMD");
    }
}
