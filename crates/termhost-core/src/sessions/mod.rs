//! Registry of terminal sessions believed alive on the backend
//!
//! Entries survive backend restarts and are replayed, in insertion order,
//! once the replacement backend reports ready.

use crate::protocol::SpawnOptions;
use std::collections::HashMap;

/// Everything needed to recreate one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescriptor {
    pub id: String,
    pub options: SpawnOptions,
    /// Last known OS pid of the session's shell, if the backend reported it
    pub pid: Option<u32>,
}

/// Insertion-ordered id → descriptor map; at most one descriptor per id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    order: Vec<String>,
    sessions: HashMap<String, SessionDescriptor>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session; re-spawning an existing id replaces it in place
    pub fn insert(&mut self, id: impl Into<String>, options: SpawnOptions) {
        let id = id.into();
        match self.sessions.get_mut(&id) {
            Some(existing) => {
                existing.options = options;
                existing.pid = None;
            }
            None => {
                self.order.push(id.clone());
                self.sessions.insert(
                    id.clone(),
                    SessionDescriptor {
                        id,
                        options,
                        pid: None,
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<SessionDescriptor> {
        let removed = self.sessions.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Drop every session belonging to `project_id`, returning their ids
    pub fn remove_by_project(&mut self, project_id: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .iter()
            .filter(|s| s.options.project_id.as_deref() == Some(project_id))
            .map(|s| s.id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids
    }

    /// Record the OS pid reported for a session
    pub fn set_pid(&mut self, id: &str, pid: u32) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.pid = Some(pid);
                true
            }
            None => false,
        }
    }

    /// Forget every recorded pid; a new backend reports fresh ones
    pub fn clear_pids(&mut self) {
        for session in self.sessions.values_mut() {
            session.pid = None;
        }
    }

    /// Pids of sessions whose owning backend has gone away
    pub fn tracked_pids(&self) -> Vec<u32> {
        self.iter().filter_map(|s| s.pid).collect()
    }

    pub fn get(&self, id: &str) -> Option<&SessionDescriptor> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Sessions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SessionDescriptor> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.sessions.clear();
    }
}
