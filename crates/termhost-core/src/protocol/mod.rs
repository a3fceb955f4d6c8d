//! Wire protocol between the supervisor and the backend host
//!
//! One JSON object per line, tagged by a kebab-case `type` field with
//! camelCase payload fields.

mod codec;
mod inbound;
mod outbound;
mod types;

pub use codec::{DecodeError, decode_line, encode_line};
pub use inbound::{DomainEvent, InboundMessage, TransportMessage};
pub use outbound::ControlMessage;
pub use types::{
    HostReply, PortHandle, ProjectContext, ProjectStats, SegmentDescriptor, SpawnOptions,
    TerminalInfo, TerminalKind,
};
