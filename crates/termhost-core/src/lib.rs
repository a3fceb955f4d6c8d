//! Termhost core
//!
//! Supervision layer for an out-of-process terminal backend: it launches the
//! host, classifies crashes, restarts with bounded back-off while re-creating
//! sessions, detects silent deadlock with heartbeats, and multiplexes
//! concurrent request/response exchanges over one ordered channel.
//!
//! ```ignore
//! let config = ConfigLoader::new().with_defaults().with_file(path).with_env().load()?;
//! let supervisor = HostSupervisor::new(config)?;
//! supervisor.start().await?;
//! supervisor.wait_for_ready(Duration::from_secs(5)).await;
//! supervisor.spawn("t1", SpawnOptions::shell(80, 24));
//! ```

pub mod backend;
pub mod broker;
pub mod config;
pub mod crash;
pub mod error;
pub mod events;
pub mod protocol;
pub mod router;
pub mod sessions;
pub mod shared;
pub mod supervisor;
pub mod watchdog;

pub use broker::{BrokerError, RequestBroker, generate_id};
pub use config::{ConfigLoader, SupervisorConfig};
pub use crash::{CrashRecord, CrashType, FatalNotice};
pub use error::{HostError, HostResult};
pub use events::{DomainEventBus, EventBus, SupervisorEvent};
pub use protocol::{ControlMessage, DomainEvent, SpawnOptions, TerminalInfo};
pub use supervisor::{HostSupervisor, Readiness, SupervisorHealth};
