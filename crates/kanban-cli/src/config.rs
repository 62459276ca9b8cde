//! `kanban.toml` loading and environment overrides.

use kanban_core::{KanbanError, KanbanResult};
use kanban_orchestrator::AgentConfig;
use kanban_tracker::TrackerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level `kanban.toml`. Every section is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct KanbanConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// `[server]`: bind address and API keys. Read once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: vec![],
        }
    }
}

impl Default for KanbanConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4001
}

/// Read `path`; a missing file yields the defaults.
pub fn load_file(path: &Path) -> KanbanResult<KanbanConfig> {
    if !path.exists() {
        return Ok(KanbanConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        KanbanError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        KanbanError::Config(format!("Failed to parse config '{}': {e}", path.display()))
    })
}

/// [`load_file`] plus overrides from the process environment.
pub fn load(path: &Path) -> KanbanResult<KanbanConfig> {
    let mut config = load_file(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

impl KanbanConfig {
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        apply_agent_env(&mut self.agent, &lookup);
        apply_tracker_env(&mut self.tracker, &lookup);
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
    }
}

/// `KANBAN_AGENT_PROGRAM` wins; otherwise `NVM_BIN` replaces the default
/// bare `claude` with `$NVM_BIN/claude`.
pub fn apply_agent_env<F>(agent: &mut AgentConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(program) = lookup("KANBAN_AGENT_PROGRAM").filter(|p| !p.trim().is_empty()) {
        agent.program = program;
    } else if let Some(bin) = lookup("NVM_BIN").filter(|p| !p.trim().is_empty()) {
        if agent.program == AgentConfig::default().program {
            agent.program = Path::new(&bin).join("claude").display().to_string();
        }
    }
}

pub fn apply_tracker_env<F>(tracker: &mut TrackerConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("JIRA_HOST") {
        tracker.host = host;
    }
    if let Some(email) = lookup("JIRA_EMAIL") {
        tracker.email = email;
    }
    if let Some(token) = lookup("JIRA_API_TOKEN") {
        tracker.api_token = token;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_file(Path::new("/nonexistent/kanban.toml")).unwrap();
        assert_eq!(config.server.port, 4001);
        assert_eq!(config.agent.program, "claude");
        assert!(!config.tracker.is_configured());
    }

    #[test]
    fn test_partial_sections() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
data_dir = "/var/lib/kanban"

[server]
port = 8080

[agent]
program = "/opt/claude/bin/claude"
max_concurrent_runs = 2

[tracker]
host = "acme.atlassian.net"
"#
        )
        .unwrap();

        let config = load_file(tmp.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/kanban"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.agent.max_concurrent_runs, 2);
        assert_eq!(config.agent.flags, AgentConfig::default().flags);
        assert!(config.tracker.is_configured());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "[server\nport = ").unwrap();
        let err = load_file(tmp.path()).unwrap_err();
        assert!(matches!(err, KanbanError::Config(_)));
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KanbanConfig::default();
        config.apply_env(env(&[
            ("JIRA_HOST", "acme.atlassian.net"),
            ("JIRA_EMAIL", "dev@example.com"),
            ("JIRA_API_TOKEN", "t0ken"),
            ("PORT", "9000"),
            ("NVM_BIN", "/home/dev/.nvm/versions/node/v20/bin"),
        ]));
        assert_eq!(config.tracker.host, "acme.atlassian.net");
        assert_eq!(config.tracker.api_token, "t0ken");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.agent.program,
            "/home/dev/.nvm/versions/node/v20/bin/claude"
        );
    }

    #[test]
    fn test_explicit_program_beats_nvm_bin() {
        let mut agent = AgentConfig::default();
        apply_agent_env(
            &mut agent,
            &env(&[("KANBAN_AGENT_PROGRAM", "/usr/local/bin/claude"), ("NVM_BIN", "/nvm")]),
        );
        assert_eq!(agent.program, "/usr/local/bin/claude");

        let mut configured = AgentConfig {
            program: "/opt/agent".into(),
            ..AgentConfig::default()
        };
        apply_agent_env(&mut configured, &env(&[("NVM_BIN", "/nvm")]));
        assert_eq!(configured.program, "/opt/agent");
    }

    #[test]
    fn test_bad_port_ignored() {
        let mut config = KanbanConfig::default();
        config.apply_env(env(&[("PORT", "not-a-port")]));
        assert_eq!(config.server.port, 4001);
    }
}
