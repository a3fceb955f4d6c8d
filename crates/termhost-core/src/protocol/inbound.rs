//! Messages emitted by the backend host

use super::types::{HostReply, ProjectStats, TerminalInfo};
use serde::{Deserialize, Serialize};

/// Any message read from the backend
///
/// Domain notifications and transport messages are disjoint sets of `type`
/// tags; the router consumes the former, the supervisor handles the latter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Domain(DomainEvent),
    Transport(TransportMessage),
}

/// Notify-only events forwarded to the domain bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    TerminalStatus {
        id: String,
        status: String,
        #[serde(default)]
        buffer_utilization: Option<f64>,
        #[serde(default)]
        pause_duration: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    AgentStateChanged {
        id: String,
        state: String,
        #[serde(default)]
        previous_state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AgentDetected { id: String, agent_type: String },
    #[serde(rename_all = "camelCase")]
    TerminalTrashed {
        id: String,
        #[serde(default)]
        expires_at: Option<u64>,
    },
    TerminalRestored { id: String },
}

impl DomainEvent {
    /// Every `type` tag in this family
    pub const TYPE_TAGS: &'static [&'static str] = &[
        "terminal-status",
        "agent-state-changed",
        "agent-detected",
        "terminal-trashed",
        "terminal-restored",
    ];

    /// Terminal the event refers to
    pub fn terminal_id(&self) -> &str {
        match self {
            Self::TerminalStatus { id, .. }
            | Self::AgentStateChanged { id, .. }
            | Self::AgentDetected { id, .. }
            | Self::TerminalTrashed { id, .. }
            | Self::TerminalRestored { id } => id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TerminalStatus { .. } => "terminal-status",
            Self::AgentStateChanged { .. } => "agent-state-changed",
            Self::AgentDetected { .. } => "agent-detected",
            Self::TerminalTrashed { .. } => "terminal-trashed",
            Self::TerminalRestored { .. } => "terminal-restored",
        }
    }
}

/// Messages owned by the transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportMessage {
    Ready,
    Pong,
    Data {
        id: String,
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    Exit {
        id: String,
        exit_code: Option<i32>,
    },
    Error {
        id: String,
        error: String,
    },
    TerminalPid {
        id: String,
        pid: u32,
    },
    #[serde(rename_all = "camelCase")]
    ListTerminalsResult {
        request_id: String,
        #[serde(default)]
        terminals: Vec<TerminalInfo>,
    },
    #[serde(rename_all = "camelCase")]
    TerminalInfoResult {
        request_id: String,
        #[serde(default)]
        terminal: Option<TerminalInfo>,
    },
    #[serde(rename_all = "camelCase")]
    SerializedStateResult {
        request_id: String,
        #[serde(default)]
        state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ReplayHistoryResult {
        request_id: String,
        #[serde(default)]
        replayed: u64,
    },
    #[serde(rename_all = "camelCase")]
    KillByProjectResult {
        request_id: String,
        #[serde(default)]
        killed: u32,
    },
    #[serde(rename_all = "camelCase")]
    ProjectStatsResult {
        request_id: String,
        #[serde(default)]
        stats: ProjectStats,
    },
}

impl TransportMessage {
    /// Every `type` tag in this family
    pub const TYPE_TAGS: &'static [&'static str] = &[
        "ready",
        "pong",
        "data",
        "exit",
        "error",
        "terminal-pid",
        "list-terminals-result",
        "terminal-info-result",
        "serialized-state-result",
        "replay-history-result",
        "kill-by-project-result",
        "project-stats-result",
    ];

    /// Split a request result into its correlation id and reply payload
    ///
    /// Non-result messages are handed back unchanged.
    pub fn into_reply(self) -> Result<(String, HostReply), Self> {
        match self {
            Self::ListTerminalsResult {
                request_id,
                terminals,
            } => Ok((request_id, HostReply::Terminals(terminals))),
            Self::TerminalInfoResult {
                request_id,
                terminal,
            } => Ok((request_id, HostReply::Terminal(terminal))),
            Self::SerializedStateResult { request_id, state } => {
                Ok((request_id, HostReply::SerializedState(state)))
            }
            Self::ReplayHistoryResult {
                request_id,
                replayed,
            } => Ok((request_id, HostReply::Replayed(replayed))),
            Self::KillByProjectResult { request_id, killed } => {
                Ok((request_id, HostReply::KilledByProject(killed)))
            }
            Self::ProjectStatsResult { request_id, stats } => {
                Ok((request_id, HostReply::ProjectStats(stats)))
            }
            other => Err(other),
        }
    }
}
