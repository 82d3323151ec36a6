// crates/server/src/guard.rs
//! Process-wide re-entrancy guard for background stages.
//!
//! One mutex over three flags. Acquiring a kind that is already running
//! yields `None`; callers silently skip the duplicate start. The permit
//! releases its flag on drop, so a panicking task never wedges the guard.

use std::sync::{Arc, Mutex};

/// The background task kinds that must not run concurrently with
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Summarize,
    Promote,
    Daily,
}

impl TaskKind {
    fn index(self) -> usize {
        match self {
            TaskKind::Summarize => 0,
            TaskKind::Promote => 1,
            TaskKind::Daily => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundGuard {
    flags: Arc<Mutex<[bool; 3]>>,
}

impl BackgroundGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a task kind. Returns `None` when that kind is already running.
    pub fn try_acquire(&self, kind: TaskKind) -> Option<TaskPermit> {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        if flags[kind.index()] {
            return None;
        }
        flags[kind.index()] = true;
        Some(TaskPermit {
            flags: Arc::clone(&self.flags),
            kind,
        })
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.flags.lock().unwrap_or_else(|e| e.into_inner())[kind.index()]
    }
}

/// Releases its task kind when dropped.
#[derive(Debug)]
pub struct TaskPermit {
    flags: Arc<Mutex<[bool; 3]>>,
    kind: TaskKind,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.flags.lock().unwrap_or_else(|e| e.into_inner())[self.kind.index()] = false;
    }
}
