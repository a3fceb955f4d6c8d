//! Optional zero-copy output path
//!
//! A fixed set of file-backed shared segments is created once at startup and
//! handed to every backend instance through an `init-buffers` message. The
//! backend writes terminal output into the visual segments and bumps the
//! signal segment; a consumer outside this crate reads them. The supervisor
//! never writes to a segment after handoff.
//!
//! Availability is a capability computed once ([`SharedChannel`]); when it is
//! unavailable every consumer falls back to `data` messages.

use crate::config::SharedBufferConfig;
use crate::error::HostResult;
use crate::protocol::{ControlMessage, SegmentDescriptor};
use memmap2::Mmap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// One mapped segment
#[derive(Debug)]
pub struct SharedSegment {
    path: PathBuf,
    len: usize,
    mmap: Mmap,
}

impl SharedSegment {
    fn create(path: PathBuf, len: usize) -> HostResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(len as u64)?;

        // SAFETY: the mapping is read-only on this side. The file is private
        // to this supervisor and its backend and is never truncated while the
        // mapping lives; the backend only writes within the fixed length.
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self { path, len, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only view of the segment contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn descriptor(&self) -> SegmentDescriptor {
        SegmentDescriptor {
            path: self.path.clone(),
            size: self.len,
        }
    }
}

/// Visual segments plus the signal segment
#[derive(Debug)]
pub struct SharedBufferSet {
    visual: Vec<SharedSegment>,
    signal: SharedSegment,
    // Removes the backing files on drop
    _dir: TempDir,
}

impl SharedBufferSet {
    pub fn create(config: &SharedBufferConfig) -> HostResult<Self> {
        let dir = match &config.directory {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                tempfile::Builder::new()
                    .prefix("termhost-")
                    .tempdir_in(parent)?
            }
            None => tempfile::Builder::new().prefix("termhost-").tempdir()?,
        };

        let visual = (0..config.segment_count)
            .map(|i| {
                SharedSegment::create(dir.path().join(format!("visual-{}.buf", i)), config.segment_size)
            })
            .collect::<HostResult<Vec<_>>>()?;
        let signal = SharedSegment::create(dir.path().join("signal.buf"), config.signal_size)?;

        debug!(
            dir = %dir.path().display(),
            segments = visual.len(),
            segment_size = config.segment_size,
            "created shared buffers"
        );

        Ok(Self {
            visual,
            signal,
            _dir: dir,
        })
    }

    pub fn visual(&self) -> &[SharedSegment] {
        &self.visual
    }

    pub fn signal(&self) -> &SharedSegment {
        &self.signal
    }

    /// Message telling a backend where the segments live
    pub fn init_message(&self) -> ControlMessage {
        ControlMessage::InitBuffers {
            segments: self.visual.iter().map(SharedSegment::descriptor).collect(),
            signal: self.signal.descriptor(),
        }
    }
}

/// Whether the zero-copy path can be used
#[derive(Debug, Clone)]
pub enum SharedChannel {
    Available(Arc<SharedBufferSet>),
    Unavailable { reason: String },
}

impl SharedChannel {
    /// Try to set up the segments; failure is a supported fallback state
    pub fn initialize(config: &SharedBufferConfig) -> Self {
        if !config.enabled {
            return Self::Unavailable {
                reason: "disabled by configuration".to_string(),
            };
        }
        match SharedBufferSet::create(config) {
            Ok(set) => Self::Available(Arc::new(set)),
            Err(e) => {
                warn!(error = %e, "shared buffers unavailable, using message passing");
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Visual segments, empty when unavailable
    pub fn visual_buffers(&self) -> &[SharedSegment] {
        match self {
            Self::Available(set) => set.visual(),
            Self::Unavailable { .. } => &[],
        }
    }

    /// Signal segment, `None` when unavailable
    pub fn signal_buffer(&self) -> Option<&SharedSegment> {
        match self {
            Self::Available(set) => Some(set.signal()),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn init_message(&self) -> Option<ControlMessage> {
        match self {
            Self::Available(set) => Some(set.init_message()),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}
