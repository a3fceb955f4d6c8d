//! Messages sent to the backend host

use super::types::{PortHandle, ProjectContext, SegmentDescriptor, SpawnOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Control message written to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    Spawn {
        id: String,
        options: SpawnOptions,
    },
    Write {
        id: String,
        data: String,
    },
    Resize {
        id: String,
        cols: u16,
        rows: u16,
    },
    Kill {
        id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Trash {
        id: String,
    },
    Restore {
        id: String,
    },
    HealthCheck,
    Dispose,
    PauseAll,
    ResumeAll,
    SetActiveProject {
        #[serde(flatten)]
        context: ProjectContext,
    },
    ConnectPort {
        port: PortHandle,
    },
    InitBuffers {
        segments: Vec<SegmentDescriptor>,
        signal: SegmentDescriptor,
    },
    #[serde(rename_all = "camelCase")]
    ListTerminals {
        request_id: String,
        #[serde(default)]
        project_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetTerminal { request_id: String, id: String },
    #[serde(rename_all = "camelCase")]
    GetSerializedState { request_id: String, id: String },
    #[serde(rename_all = "camelCase")]
    ReplayHistory {
        request_id: String,
        id: String,
        max_lines: u32,
    },
    #[serde(rename_all = "camelCase")]
    KillByProject {
        request_id: String,
        project_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GetProjectStats {
        request_id: String,
        project_id: String,
    },
}

impl ControlMessage {
    /// Wire tag of the message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Write { .. } => "write",
            Self::Resize { .. } => "resize",
            Self::Kill { .. } => "kill",
            Self::Trash { .. } => "trash",
            Self::Restore { .. } => "restore",
            Self::HealthCheck => "health-check",
            Self::Dispose => "dispose",
            Self::PauseAll => "pause-all",
            Self::ResumeAll => "resume-all",
            Self::SetActiveProject { .. } => "set-active-project",
            Self::ConnectPort { .. } => "connect-port",
            Self::InitBuffers { .. } => "init-buffers",
            Self::ListTerminals { .. } => "list-terminals",
            Self::GetTerminal { .. } => "get-terminal",
            Self::GetSerializedState { .. } => "get-serialized-state",
            Self::ReplayHistory { .. } => "replay-history",
            Self::KillByProject { .. } => "kill-by-project",
            Self::GetProjectStats { .. } => "get-project-stats",
        }
    }

    /// Correlation id for broker-backed requests
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::ListTerminals { request_id, .. }
            | Self::GetTerminal { request_id, .. }
            | Self::GetSerializedState { request_id, .. }
            | Self::ReplayHistory { request_id, .. }
            | Self::KillByProject { request_id, .. }
            | Self::GetProjectStats { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    pub fn set_active_project(project_id: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::SetActiveProject {
            context: ProjectContext {
                project_id: project_id.into(),
                project_path: path,
            },
        }
    }
}
