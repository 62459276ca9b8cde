use kanban_core::{KanbanError, KanbanResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the external agent is invoked.
///
/// The final command line is
/// `program args… <session flag> flags… -p <prompt>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Executable name or path; bare names are looked up on `PATH`.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the session flag (e.g. the CLI script when
    /// `program` is an interpreter).
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments placed after the session flag, before `-p <prompt>`.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
    /// 0 means unbounded.
    #[serde(default)]
    pub max_concurrent_runs: usize,
    /// How much trailing output is kept on the ticket after a run.
    #[serde(default = "default_output_tail_chars")]
    pub output_tail_chars: usize,
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_flags() -> Vec<String> {
    vec![
        "--dangerously-skip-permissions".to_string(),
        "--print".to_string(),
    ]
}

fn default_output_tail_chars() -> usize {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            flags: default_flags(),
            max_concurrent_runs: 0,
            output_tail_chars: default_output_tail_chars(),
        }
    }
}

impl AgentConfig {
    /// Resolve `program` to an executable path.
    ///
    /// A program containing a path separator must exist as a file; a bare
    /// name is searched on `PATH`.
    pub fn resolve_executable(&self) -> KanbanResult<PathBuf> {
        let program = self.program.trim();
        if program.is_empty() {
            return Err(KanbanError::Config("agent program is not set".into()));
        }
        if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
            let path = PathBuf::from(program);
            return if path.is_file() {
                Ok(path)
            } else {
                Err(KanbanError::Config(format!(
                    "agent executable not found: {program}"
                )))
            };
        }
        let search_path = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&search_path)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                KanbanError::Config(format!("agent executable '{program}' not found on PATH"))
            })
    }
}
