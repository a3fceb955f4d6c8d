//! Payload types shared by inbound and outbound messages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// What a terminal session is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalKind {
    #[default]
    Shell,
    Agent,
    DevServer,
}

/// Parameters needed to (re)create a terminal session on the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    pub shell: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
    pub kind: TerminalKind,
    pub project_id: Option<String>,
    pub worktree_id: Option<String>,
    pub agent_type: Option<String>,
}

impl SpawnOptions {
    /// Options for a plain shell of the given size
    pub fn shell(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            ..Default::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_kind(mut self, kind: TerminalKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Backend's view of a live terminal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalInfo {
    pub id: String,
    pub project_id: Option<String>,
    pub kind: TerminalKind,
    pub cwd: Option<PathBuf>,
    pub pid: Option<u32>,
    pub cols: u16,
    pub rows: u16,
    pub agent_state: Option<String>,
    pub is_trashed: bool,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
}

/// Aggregate counters for one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectStats {
    pub terminal_count: u32,
    pub agent_count: u32,
    pub running_agent_count: u32,
    pub trashed_count: u32,
}

/// Active project selection replayed to a fresh backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project_id: String,
    pub project_path: Option<PathBuf>,
}

/// Externally-held channel endpoint handed to the backend (for example a
/// socket path the renderer listens on)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortHandle {
    pub name: String,
    pub endpoint: String,
}

/// Location and size of one shared memory segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDescriptor {
    pub path: PathBuf,
    pub size: usize,
}

/// Typed reply payload delivered through the request broker
#[derive(Debug, Clone, PartialEq)]
pub enum HostReply {
    Terminals(Vec<TerminalInfo>),
    Terminal(Option<TerminalInfo>),
    SerializedState(Option<String>),
    Replayed(u64),
    KilledByProject(u32),
    ProjectStats(ProjectStats),
}
