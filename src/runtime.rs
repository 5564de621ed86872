//! Host collaborators: notification delivery and flush scheduling.
//!
//! The graph never runs deferred work on its own. It asks a [`Scheduler`]
//! for a phase at most once per turn and the host calls
//! [`Graph::flush`](crate::Graph::flush) when its loop reaches that phase.
//! `Coalesce` must run before `Sync` within a turn.

use std::fmt;

use parking_lot::Mutex;

use crate::types::Identifier;

/// Deferred work phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlushPhase {
    /// Apply queued remote operations.
    Coalesce,
    /// Deliver queued change notifications.
    Sync,
}

impl fmt::Display for FlushPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coalesce => write!(f, "coalesce"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

/// Receives "field of record changed" notifications.
///
/// Fire-and-forget. The graph already coalesces per turn, but sinks must
/// tolerate repeated calls for the same field.
pub trait NotificationSink {
    /// A relationship field of `identifier` changed.
    fn notify_change(&self, identifier: Identifier, field: &str);
}

/// Defers graph work to a later point in the current turn.
pub trait Scheduler {
    /// Request one run of `phase`.
    fn schedule(&self, phase: FlushPhase);
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl NotificationSink for NoOpSink {
    fn notify_change(&self, _identifier: Identifier, _field: &str) {}
}

/// Sink that records notifications for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<(Identifier, String)>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far, in delivery order.
    pub fn notifications(&self) -> Vec<(Identifier, String)> {
        self.seen.lock().clone()
    }

    /// Number of notifications received for one field.
    pub fn count(&self, identifier: Identifier, field: &str) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|(id, f)| *id == identifier && f == field)
            .count()
    }

    /// Total notifications received.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// True if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain and return everything received so far.
    pub fn take(&self) -> Vec<(Identifier, String)> {
        std::mem::take(&mut *self.seen.lock())
    }
}

impl NotificationSink for RecordingSink {
    fn notify_change(&self, identifier: Identifier, field: &str) {
        self.seen.lock().push((identifier, field.to_string()));
    }
}

/// Scheduler that only records requested phases; the host drives flushing.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    requested: Mutex<Vec<FlushPhase>>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Phases requested so far, in order.
    pub fn requested(&self) -> Vec<FlushPhase> {
        self.requested.lock().clone()
    }

    /// Drain and return the requested phases, sorted in execution order.
    pub fn take(&self) -> Vec<FlushPhase> {
        let mut phases = std::mem::take(&mut *self.requested.lock());
        phases.sort();
        phases
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, phase: FlushPhase) {
        self.requested.lock().push(phase);
    }
}
